//! Path segmentation and sibling ordering.
//!
//! A path splits on `/`, except that a `{...}`-delimited span counts as one
//! regex segment even if it contains slashes. Sibling ordering is the route
//! specificity contract: literals first (lexical), then regex segments
//! (lexical by raw pattern), then the lone `*` wildcard.

use std::cmp::Ordering;

/// Split a path into segments, keeping `{...}` spans whole.
///
/// Leading and trailing empty segments (from `/a/b` or `a/b/`) are dropped;
/// `/` yields no segments at all (the root route).
#[must_use]
pub fn split_path(path: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;

    for c in path.chars() {
        match c {
            '{' => {
                depth += 1;
                current.push(c);
            }
            '}' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            '/' if depth == 0 => {
                if !current.is_empty() {
                    segments.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(c),
        }
    }
    if !current.is_empty() {
        segments.push(current);
    }
    segments
}

/// Whether a segment is a `{...}` regex token.
#[must_use]
pub fn is_regex_segment(segment: &str) -> bool {
    segment.len() >= 2 && segment.starts_with('{') && segment.ends_with('}')
}

/// Compare two sibling segments for match precedence.
#[must_use]
pub fn compare_segments(a: &str, b: &str) -> Ordering {
    fn rank(s: &str) -> u8 {
        if s == "*" {
            2
        } else if is_regex_segment(s) {
            1
        } else {
            0
        }
    }
    rank(a).cmp(&rank(b)).then_with(|| a.cmp(b))
}

/// Sort siblings into match order.
pub fn sort_segments(segments: &mut [String]) {
    segments.sort_by(|a, b| compare_segments(a, b));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_plain_path() {
        assert_eq!(split_path("/a/b/c"), vec!["a", "b", "c"]);
        assert_eq!(split_path("a/b"), vec!["a", "b"]);
        assert_eq!(split_path("/a/b/"), vec!["a", "b"]);
    }

    #[test]
    fn test_split_root() {
        assert!(split_path("/").is_empty());
        assert!(split_path("").is_empty());
    }

    #[test]
    fn test_split_keeps_regex_spans_whole() {
        assert_eq!(split_path("/a/{\\d+}/c"), vec!["a", "{\\d+}", "c"]);
        // A slash inside braces belongs to the regex, not the path.
        assert_eq!(split_path("/a/{x/y}/c"), vec!["a", "{x/y}", "c"]);
    }

    #[test]
    fn test_sort_order() {
        let mut segs = vec![
            "*".to_string(),
            "{\\d+}".to_string(),
            "zulu".to_string(),
            "alpha".to_string(),
            "{[a-z]+}".to_string(),
        ];
        sort_segments(&mut segs);
        assert_eq!(segs, vec!["alpha", "zulu", "{[a-z]+}", "{\\d+}", "*"]);
    }
}
