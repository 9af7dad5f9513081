//! Streaming JSON masking.
//!
//! [`MaskingWriter`] is a single-pass byte scanner over an outgoing JSON body.
//! It never buffers the whole document: bytes go in chunk by chunk and come
//! back out rewritten, with only the current key/value held in memory. Field
//! matching is by name alone, at any nesting depth, so a configured field
//! masks every occurrence anywhere in the document, including inside arrays
//! of primitives.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};

use super::rule::FieldRule;

/// Where the scanner is in the key/value cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    /// Between values; bytes pass straight through.
    Idle,
    /// Inside the quotes of an object key.
    ReadingKey,
    /// Key closed, waiting for the `:`.
    AwaitingValue,
    /// After the `:`, consuming the value.
    ReadingValue,
}

/// Byte-driven JSON masking state machine.
///
/// Allocate one per response; it is not shared across requests.
pub struct MaskingWriter {
    fields: Arc<HashMap<String, FieldRule>>,
    level: u8,

    state: ScanState,
    in_quotes: bool,
    escaped: bool,
    in_array: bool,
    masking: bool,

    current_key: String,
    value_buf: Vec<u8>,
    /// Whitespace seen mid-value, replayed verbatim once the value's fate is
    /// known so unmasked output stays byte-identical.
    pending_ws: Vec<u8>,

    out: BytesMut,
}

impl MaskingWriter {
    /// Create a writer for one response.
    #[must_use]
    pub fn new(fields: Arc<HashMap<String, FieldRule>>, level: u8) -> Self {
        Self {
            fields,
            level,
            state: ScanState::Idle,
            in_quotes: false,
            escaped: false,
            in_array: false,
            masking: false,
            current_key: String::new(),
            value_buf: Vec::new(),
            pending_ws: Vec::new(),
            out: BytesMut::new(),
        }
    }

    /// Feed a chunk of body bytes, returning the output produced so far.
    pub fn process_chunk(&mut self, chunk: &[u8]) -> Bytes {
        for &b in chunk {
            self.process_byte(b);
        }
        self.out.split().freeze()
    }

    /// Flush whatever remains buffered (for truncated documents) and return it.
    pub fn finish(&mut self) -> Bytes {
        if !self.value_buf.is_empty() {
            let value = std::mem::take(&mut self.value_buf);
            self.out.extend_from_slice(&value);
        }
        if !self.pending_ws.is_empty() {
            let ws = std::mem::take(&mut self.pending_ws);
            self.out.extend_from_slice(&ws);
        }
        self.out.split().freeze()
    }

    fn process_byte(&mut self, c: u8) {
        match c {
            b'\\' => {
                self.escaped = true;
                if self.in_quotes {
                    self.value_buf.push(b'\\');
                }
            }
            b'"' => self.on_quote(),
            b':' => {
                if self.state == ScanState::AwaitingValue && !self.in_quotes {
                    self.state = ScanState::ReadingValue;
                    self.out.extend_from_slice(b":");
                } else if self.state == ScanState::ReadingValue {
                    self.value_buf.push(c);
                } else {
                    self.out.extend_from_slice(b":");
                }
            }
            b',' | b'}' => {
                if self.in_quotes {
                    self.value_buf.push(c);
                } else if self.state == ScanState::ReadingValue {
                    // End of a bare (number/bool/null) value. An empty buffer
                    // means the value was already emitted at its closing
                    // quote; only the delimiter is left to write.
                    if !self.value_buf.is_empty() {
                        self.finalize_value(true);
                    }
                    if !self.in_array {
                        self.state = ScanState::Idle;
                        self.masking = false;
                    }
                    self.out.extend_from_slice(&[c]);
                } else {
                    self.out.extend_from_slice(&[c]);
                }
            }
            b'{' => {
                if self.state == ScanState::ReadingValue {
                    if !self.in_quotes && self.value_buf.is_empty() {
                        // The value is itself an object: composite values are
                        // never masked, nested keys are scanned flat.
                        self.state = ScanState::Idle;
                        self.in_array = false;
                        self.out.extend_from_slice(b"{");
                    } else if self.in_quotes {
                        self.value_buf.push(c);
                    } else {
                        self.out.extend_from_slice(b"{");
                    }
                } else {
                    self.out.extend_from_slice(b"{");
                }
            }
            b'[' => {
                if self.state == ScanState::ReadingValue && self.in_quotes {
                    self.value_buf.push(c);
                } else if self.state == ScanState::ReadingValue && self.value_buf.is_empty() {
                    // Arrays of primitives keep the masking flag live so
                    // every element is masked.
                    self.in_array = true;
                    self.out.extend_from_slice(b"[");
                } else {
                    self.out.extend_from_slice(b"[");
                }
            }
            b']' => {
                if self.state == ScanState::ReadingValue && self.in_quotes {
                    self.value_buf.push(c);
                } else if self.in_array {
                    if self.state == ScanState::ReadingValue && !self.value_buf.is_empty() {
                        self.finalize_value(true);
                    }
                    self.in_array = false;
                    self.state = ScanState::Idle;
                    self.masking = false;
                    self.out.extend_from_slice(b"]");
                } else {
                    self.out.extend_from_slice(b"]");
                }
            }
            b' ' | b'\n' | b'\t' | b'\r' => {
                if self.state == ScanState::ReadingValue && !self.value_buf.is_empty() {
                    if self.in_quotes {
                        self.value_buf.push(c);
                    } else {
                        self.pending_ws.push(c);
                    }
                } else {
                    self.out.extend_from_slice(&[c]);
                }
            }
            _ => {
                self.escaped = false;
                if self.in_quotes || self.state == ScanState::ReadingValue {
                    self.value_buf.push(c);
                } else {
                    self.out.extend_from_slice(&[c]);
                }
            }
        }
    }

    fn on_quote(&mut self) {
        if self.escaped {
            self.escaped = false;
            if self.state == ScanState::ReadingValue || self.state == ScanState::ReadingKey {
                self.value_buf.push(b'"');
            }
            return;
        }

        self.in_quotes = !self.in_quotes;
        if self.in_quotes {
            if self.state != ScanState::ReadingKey && self.state != ScanState::ReadingValue {
                self.state = ScanState::ReadingKey;
            }
            return;
        }

        // Leaving quotes.
        match self.state {
            ScanState::ReadingKey => {
                self.state = ScanState::AwaitingValue;
                self.current_key = String::from_utf8_lossy(&self.value_buf).into_owned();
                self.value_buf.clear();
                self.masking = self.fields.contains_key(&self.current_key);
                self.out.extend_from_slice(b"\"");
                self.out.extend_from_slice(self.current_key.as_bytes());
                self.out.extend_from_slice(b"\"");
            }
            ScanState::ReadingValue => {
                if !self.in_array {
                    self.state = ScanState::Idle;
                }
                self.finalize_value(false);
                if !self.in_array {
                    self.masking = false;
                }
            }
            _ => {
                self.out.extend_from_slice(b"\"");
            }
        }
    }

    /// Emit the buffered value, masked if flagged. String values are always
    /// re-quoted; bare values stay raw unless masked (a masked bare value is
    /// emitted as a quoted string, as the original format does).
    fn finalize_value(&mut self, bare: bool) {
        let raw = std::mem::take(&mut self.value_buf);
        let value = String::from_utf8_lossy(&raw);

        if self.masking {
            let masked = match self.fields.get(&self.current_key) {
                Some(rule) => rule.mask(&value, self.level),
                None => value.into_owned(),
            };
            self.out.extend_from_slice(b"\"");
            self.out.extend_from_slice(masked.as_bytes());
            self.out.extend_from_slice(b"\"");
        } else if bare {
            self.out.extend_from_slice(&raw);
        } else {
            self.out.extend_from_slice(b"\"");
            self.out.extend_from_slice(&raw);
            self.out.extend_from_slice(b"\"");
        }

        if bare && !self.pending_ws.is_empty() {
            let ws = std::mem::take(&mut self.pending_ws);
            self.out.extend_from_slice(&ws);
        }
    }
}

/// Run a complete document through a fresh writer. Used on the buffered
/// response path and in tests.
#[must_use]
pub fn mask_document(body: &[u8], fields: &Arc<HashMap<String, FieldRule>>, level: u8) -> Bytes {
    let mut writer = MaskingWriter::new(Arc::clone(fields), level);
    let mut out = BytesMut::new();
    out.extend_from_slice(&writer.process_chunk(body));
    out.extend_from_slice(&writer.finish());
    out.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::masking::rule::FieldScope;

    fn fields(rules: &[(&str, &str)]) -> Arc<HashMap<String, FieldRule>> {
        let mut map = HashMap::new();
        for (name, pattern) in rules {
            map.insert(
                (*name).to_string(),
                FieldRule::new(*name, FieldScope::Route, [*pattern, "-", "-", "-"]),
            );
        }
        Arc::new(map)
    }

    fn mask(body: &str, rules: &[(&str, &str)]) -> String {
        let fields = fields(rules);
        String::from_utf8(mask_document(body.as_bytes(), &fields, 1).to_vec()).unwrap()
    }

    #[test]
    fn test_string_field_each() {
        assert_eq!(
            mask(r#"{"name":"Alice","age":30}"#, &[("name", "each-*")]),
            r#"{"name":"*****","age":30}"#
        );
    }

    #[test]
    fn test_bare_value_masked_becomes_string() {
        assert_eq!(
            mask(r#"{"age":30,"ok":true}"#, &[("age", "all-*")]),
            r#"{"age":"*","ok":true}"#
        );
    }

    #[test]
    fn test_untouched_document_is_byte_identical() {
        let body = "{\n  \"a\": [1, 2, {\"b\": \"x\"}],\n  \"c\": null\n}";
        assert_eq!(mask(body, &[("missing", "all-*")]), body);
    }

    #[test]
    fn test_array_of_strings_masks_every_element() {
        assert_eq!(
            mask(
                r#"{"phones":["555-1111","555-2222"]}"#,
                &[("phones", "all-*")]
            ),
            r#"{"phones":["*","*"]}"#
        );
    }

    #[test]
    fn test_array_of_numbers_masks_every_element() {
        assert_eq!(
            mask(r#"{"codes":[12,34]}"#, &[("codes", "each-#")]),
            r###"{"codes":["##","##"]}"###
        );
    }

    #[test]
    fn test_nested_field_masked_by_name_only() {
        assert_eq!(
            mask(
                r#"{"user":{"name":"Alice","meta":{"name":"Bob"}}}"#,
                &[("name", "each-*")]
            ),
            r#"{"user":{"name":"*****","meta":{"name":"*****"}}}"#
        );
    }

    #[test]
    fn test_escaped_quote_inside_value() {
        assert_eq!(
            mask(r#"{"note":"say \"hi\"","x":1}"#, &[("name", "all-*")]),
            r#"{"note":"say \"hi\"","x":1}"#
        );
    }

    #[test]
    fn test_structural_bytes_inside_strings() {
        let body = r#"{"data1":"1:2,3{4}5\"6[7]8 9","data2":[[[120.1,30.1]]]}"#;
        assert_eq!(mask(body, &[("nothere", "all-*")]), body);
    }

    #[test]
    fn test_whitespace_around_bare_value_preserved() {
        let body = "{\"age\": 30 , \"b\": 1}";
        assert_eq!(mask(body, &[("zzz", "all-*")]), body);
    }

    #[test]
    fn test_chunk_boundaries_do_not_change_output() {
        let body = r#"{"name":"Alice","list":["a","bb"],"n":7}"#.as_bytes();
        let fields = fields(&[("name", "each-*"), ("list", "all-#")]);

        let whole = mask_document(body, &fields, 1);

        let mut writer = MaskingWriter::new(Arc::clone(&fields), 1);
        let mut chunked = BytesMut::new();
        for piece in body.chunks(3) {
            chunked.extend_from_slice(&writer.process_chunk(piece));
        }
        chunked.extend_from_slice(&writer.finish());

        assert_eq!(whole, chunked.freeze());
    }

    #[test]
    fn test_level_selects_rule() {
        let mut map = HashMap::new();
        map.insert(
            "card".to_string(),
            FieldRule::new("card", FieldScope::Service, ["-", "start-**", "-", "all-*"]),
        );
        let fields = Arc::new(map);

        let body = br#"{"card":"123456"}"#;
        assert_eq!(
            mask_document(body, &fields, 1).as_ref(),
            br#"{"card":"123456"}"#
        );
        assert_eq!(
            mask_document(body, &fields, 2).as_ref(),
            br#"{"card":"**3456"}"#
        );
        assert_eq!(
            mask_document(body, &fields, 4).as_ref(),
            br#"{"card":"*"}"#
        );
    }
}
