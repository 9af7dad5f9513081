//! Mask rule mini-language and per-field rule sets.
//!
//! A rule string has the shape `{type}-[^]{replacement}` where `type` is one
//! of `all`, `each`, `start`, `middle`, `end`. A `^` prefix on the replacement
//! switches it to count mode: the replacement length is then a count of
//! original characters rather than literal masking text. `-` or the empty
//! string means "no masking". The semantics are format-compatible with
//! existing field configuration data and must not drift.

use super::error::{MaskError, MaskResult};

/// Apply a mask pattern to a value.
///
/// Character positions are counted in Unicode scalar values, so multi-byte
/// text masks by character, not by byte.
///
/// # Errors
///
/// Returns an error when the pattern is malformed or names an unknown type.
pub fn apply_mask(origin: &str, pattern: &str) -> MaskResult<String> {
    let (mask_type, replacement) = pattern
        .split_once('-')
        .ok_or_else(|| MaskError::InvalidPattern(pattern.to_string()))?;

    if replacement.is_empty() {
        return Err(MaskError::EmptyReplacement(pattern.to_string()));
    }

    let (replacement, is_char_count) = match replacement.strip_prefix('^') {
        Some(rest) => (rest, true),
        None => (replacement, false),
    };
    if replacement.is_empty() {
        return Err(MaskError::EmptyReplacement(pattern.to_string()));
    }

    let count = replacement.chars().count();
    let origin_len = origin.chars().count();

    match mask_type {
        "all" => Ok(replacement.to_string()),
        "each" => {
            if is_char_count {
                // One replacement head char per `count`-sized block.
                let head: String = replacement.chars().take(1).collect();
                Ok(head.repeat(origin_len / count))
            } else {
                Ok(replacement.repeat(origin_len))
            }
        }
        "start" => Ok(mask_run(origin, replacement, count, origin_len, RunAt::Start)),
        "middle" => Ok(mask_run(origin, replacement, count, origin_len, RunAt::Middle)),
        "end" => Ok(mask_run(origin, replacement, count, origin_len, RunAt::End)),
        other => Err(MaskError::InvalidType(other.to_string())),
    }
}

enum RunAt {
    Start,
    Middle,
    End,
}

/// Replace a fixed-length run of characters at the given position. Values
/// shorter than the run are fully replaced, one replacement per character.
fn mask_run(origin: &str, replacement: &str, count: usize, origin_len: usize, at: RunAt) -> String {
    if origin_len < count {
        return replacement.repeat(origin_len);
    }
    let chars: Vec<char> = origin.chars().collect();
    let start = match at {
        RunAt::Start => 0,
        RunAt::Middle => (origin_len - count) / 2,
        RunAt::End => origin_len - count,
    };
    let mut masked = String::with_capacity(origin.len());
    masked.extend(&chars[..start]);
    masked.push_str(replacement);
    masked.extend(&chars[start + count..]);
    masked
}

/// Whether a field rule comes from the service or from a single route.
///
/// Route-scoped rules shadow service-scoped rules of the same name; removing
/// a route-scoped rule falls back to the service-scoped one if present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldScope {
    /// Applies to every route of the service unless shadowed.
    Service,
    /// Applies to one route and shadows a same-named service rule.
    Route,
}

/// A maskable field with one rule per clearance level.
#[derive(Debug, Clone)]
pub struct FieldRule {
    /// Field name, matched anywhere in the document by name only.
    pub name: String,
    /// Rule origin scope.
    pub scope: FieldScope,
    /// Mask pattern per clearance level (index 0 = level 1).
    pub levels: [String; 4],
}

impl FieldRule {
    /// Create a rule with explicit per-level patterns.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        scope: FieldScope,
        levels: [impl Into<String>; 4],
    ) -> Self {
        let [l1, l2, l3, l4] = levels;
        Self {
            name: name.into(),
            scope,
            levels: [l1.into(), l2.into(), l3.into(), l4.into()],
        }
    }

    /// The pattern configured for a clearance level (1-based).
    ///
    /// Out-of-range levels use the most restrictive rule.
    #[must_use]
    pub fn pattern_for(&self, level: u8) -> &str {
        match level {
            1..=4 => &self.levels[(level - 1) as usize],
            _ => &self.levels[3],
        }
    }

    /// Mask a value for the given clearance level.
    ///
    /// A pattern of `-` or the empty string leaves the value unchanged, as
    /// does a malformed pattern (the error is swallowed here so a bad rule
    /// can never take a response down; rule validity is checked at
    /// configuration time).
    #[must_use]
    pub fn mask(&self, value: &str, level: u8) -> String {
        let pattern = self.pattern_for(level);
        if pattern.is_empty() || pattern == "-" {
            return value.to_string();
        }
        apply_mask(value, pattern).unwrap_or_else(|_| value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_replaces_whole_value() {
        assert_eq!(apply_mask("secret", "all-*").unwrap(), "*");
        assert_eq!(apply_mask("secret", "all-###").unwrap(), "###");
    }

    #[test]
    fn test_each_literal_mode() {
        assert_eq!(apply_mask("Alice", "each-*").unwrap(), "*****");
        assert_eq!(apply_mask("ab", "each-xy").unwrap(), "xyxy");
        assert_eq!(apply_mask("", "each-*").unwrap(), "");
    }

    #[test]
    fn test_each_count_mode() {
        // One '*' per two-character block.
        assert_eq!(apply_mask("abcd", "each-^**").unwrap(), "**");
        assert_eq!(apply_mask("abcde", "each-^**").unwrap(), "**");
        assert_eq!(apply_mask("a", "each-^**").unwrap(), "");
    }

    #[test]
    fn test_start_run() {
        assert_eq!(apply_mask("123456", "start-**").unwrap(), "**3456");
        // Shorter than the run: everything is replaced.
        assert_eq!(apply_mask("1", "start-**").unwrap(), "**");
    }

    #[test]
    fn test_middle_run() {
        // len 10, count 4, start (10-4)/2 = 3.
        assert_eq!(apply_mask("1234567890", "middle-****").unwrap(), "123****890");
        assert_eq!(apply_mask("abcde", "middle-#").unwrap(), "ab#de");
    }

    #[test]
    fn test_end_run() {
        assert_eq!(apply_mask("123456", "end-**").unwrap(), "1234**");
    }

    #[test]
    fn test_unicode_counts_characters() {
        assert_eq!(apply_mask("张三丰", "each-*").unwrap(), "***");
        assert_eq!(apply_mask("张三丰", "start-*").unwrap(), "*三丰");
    }

    #[test]
    fn test_invalid_patterns() {
        assert!(matches!(
            apply_mask("x", "nodash"),
            Err(MaskError::InvalidPattern(_))
        ));
        assert!(matches!(
            apply_mask("x", "all-"),
            Err(MaskError::EmptyReplacement(_))
        ));
        assert!(matches!(
            apply_mask("x", "each-^"),
            Err(MaskError::EmptyReplacement(_))
        ));
        assert!(matches!(
            apply_mask("x", "half-*"),
            Err(MaskError::InvalidType(_))
        ));
    }

    #[test]
    fn test_field_rule_level_selection() {
        let rule = FieldRule::new("phone", FieldScope::Route, ["-", "end-****", "middle-****", "all-*"]);
        assert_eq!(rule.mask("13812345678", 1), "13812345678");
        assert_eq!(rule.mask("13812345678", 2), "1381234****");
        assert_eq!(rule.mask("13812345678", 4), "*");
        // Out of range falls back to level 4.
        assert_eq!(rule.mask("13812345678", 9), "*");
    }

    #[test]
    fn test_field_rule_swallows_bad_pattern() {
        let rule = FieldRule::new("x", FieldScope::Service, ["garbage", "-", "-", "-"]);
        assert_eq!(rule.mask("value", 1), "value");
    }
}
