//! Token position mini-language and extraction helpers.
//!
//! A position string has the shape `{side}:{location}:{key}`, e.g.
//! `request:header:Authorization`, `request:cookies:sessionId`,
//! `request:body:auth.token`, or `response:body:data.token`. The key keeps
//! any further colons verbatim.

use std::str::FromStr;

use serde_json::Value;

use super::error::{TokenError, TokenResult};

/// Which message carries the token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSide {
    /// Extracted from the inbound request.
    Request,
    /// Extracted from the upstream response body.
    Response,
}

/// Where within the message the token lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenLocation {
    /// A request header value.
    Header,
    /// A query string parameter.
    Query,
    /// The request or response body (form field or JSON path).
    Body,
    /// A request cookie.
    Cookies,
}

/// A parsed token position.
#[derive(Debug, Clone)]
pub struct TokenPosition {
    /// Request or response side.
    pub side: TokenSide,
    /// Location within the message.
    pub location: TokenLocation,
    /// Header name, parameter name, cookie name, or dotted JSON path.
    pub key: String,
}

impl FromStr for TokenPosition {
    type Err = TokenError;

    fn from_str(s: &str) -> TokenResult<Self> {
        let mut parts = s.splitn(3, ':');
        let (Some(side), Some(location), Some(key)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(TokenError::InvalidPosition(s.to_string()));
        };
        if key.is_empty() {
            return Err(TokenError::InvalidPosition(s.to_string()));
        }
        let side = match side {
            "request" => TokenSide::Request,
            "response" => TokenSide::Response,
            _ => return Err(TokenError::InvalidPosition(s.to_string())),
        };
        let location = match location {
            "header" => TokenLocation::Header,
            "query" => TokenLocation::Query,
            "body" => TokenLocation::Body,
            "cookies" => TokenLocation::Cookies,
            _ => return Err(TokenError::InvalidPosition(s.to_string())),
        };
        // Only the response body is readable on the response side.
        if side == TokenSide::Response && location != TokenLocation::Body {
            return Err(TokenError::UnsupportedPosition {
                side: "response".to_string(),
                location: location_name(location).to_string(),
            });
        }
        Ok(Self {
            side,
            location,
            key: key.to_string(),
        })
    }
}

fn location_name(location: TokenLocation) -> &'static str {
    match location {
        TokenLocation::Header => "header",
        TokenLocation::Query => "query",
        TokenLocation::Body => "body",
        TokenLocation::Cookies => "cookies",
    }
}

/// Look up a parameter in an `application/x-www-form-urlencoded` string
/// (query strings use the same encoding).
#[must_use]
pub fn form_value(encoded: &str, key: &str) -> Option<String> {
    for pair in encoded.split('&') {
        let (name, value) = match pair.split_once('=') {
            Some((n, v)) => (n, v),
            None => (pair, ""),
        };
        if percent_decode(name) == key {
            return Some(percent_decode(value));
        }
    }
    None
}

/// Look up a cookie value in a `Cookie` request header.
#[must_use]
pub fn cookie_value(header: &str, key: &str) -> Option<String> {
    for part in header.split(';') {
        let part = part.trim();
        if let Some((name, value)) = part.split_once('=') {
            if name == key {
                return Some(value.to_string());
            }
        }
    }
    None
}

/// Resolve a dotted path within a JSON document and coerce the result to a
/// string. Strings come back verbatim; numbers and booleans are rendered;
/// null, objects, and arrays come back empty. Path segments that are decimal
/// integers index into arrays.
#[must_use]
pub fn json_path_string(doc: &Value, path: &str) -> String {
    let mut current = doc;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => match map.get(segment) {
                Some(v) => v,
                None => return String::new(),
            },
            Value::Array(items) => match segment.parse::<usize>().ok().and_then(|i| items.get(i)) {
                Some(v) => v,
                None => return String::new(),
            },
            _ => return String::new(),
        };
    }
    match current {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

/// Decode `%XX` escapes and `+` as space. Works on bytes throughout; the
/// input may hold multi-byte characters anywhere, including right after `%`.
fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                match (hex_digit(bytes[i + 1]), hex_digit(bytes[i + 2])) {
                    (Some(hi), Some(lo)) => {
                        out.push(hi << 4 | lo);
                        i += 3;
                    }
                    _ => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            other => {
                out.push(other);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_positions() {
        let pos: TokenPosition = "request:header:Authorization".parse().unwrap();
        assert_eq!(pos.side, TokenSide::Request);
        assert_eq!(pos.location, TokenLocation::Header);
        assert_eq!(pos.key, "Authorization");

        let pos: TokenPosition = "response:body:data.token".parse().unwrap();
        assert_eq!(pos.side, TokenSide::Response);
        assert_eq!(pos.key, "data.token");
    }

    #[test]
    fn test_key_keeps_extra_colons() {
        let pos: TokenPosition = "request:cookies:a:b".parse().unwrap();
        assert_eq!(pos.key, "a:b");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!("header:token".parse::<TokenPosition>().is_err());
        assert!("request:header:".parse::<TokenPosition>().is_err());
        assert!("upstream:header:x".parse::<TokenPosition>().is_err());
        assert!("request:trailer:x".parse::<TokenPosition>().is_err());
        assert!(matches!(
            "response:header:x".parse::<TokenPosition>(),
            Err(TokenError::UnsupportedPosition { .. })
        ));
    }

    #[test]
    fn test_form_value() {
        assert_eq!(
            form_value("token=abc&user=bob", "token").as_deref(),
            Some("abc")
        );
        assert_eq!(
            form_value("q=a%20b+c", "q").as_deref(),
            Some("a b c")
        );
        assert!(form_value("a=1", "missing").is_none());
    }

    #[test]
    fn test_form_value_bad_escapes_stay_literal() {
        // A lone or malformed escape is kept as-is rather than rejected.
        assert_eq!(form_value("q=100%", "q").as_deref(), Some("100%"));
        assert_eq!(form_value("q=%ZZx", "q").as_deref(), Some("%ZZx"));
        // Multi-byte characters directly after `%` must not break decoding;
        // lossy UTF-8 conversion of a raw body produces exactly this shape.
        assert_eq!(
            form_value("q=%\u{FFFD}\u{FFFD}", "q").as_deref(),
            Some("%\u{FFFD}\u{FFFD}")
        );
        assert_eq!(form_value("q=%E4%BD%A0", "q").as_deref(), Some("你"));
    }

    #[test]
    fn test_cookie_value() {
        let header = "sessionId=s1; token=t2; theme=dark";
        assert_eq!(cookie_value(header, "token").as_deref(), Some("t2"));
        assert_eq!(cookie_value(header, "sessionId").as_deref(), Some("s1"));
        assert!(cookie_value(header, "absent").is_none());
    }

    #[test]
    fn test_json_path_string() {
        let doc = json!({
            "data": {"token": "tk-1", "count": 5, "active": true},
            "items": [{"id": "first"}]
        });
        assert_eq!(json_path_string(&doc, "data.token"), "tk-1");
        assert_eq!(json_path_string(&doc, "data.count"), "5");
        assert_eq!(json_path_string(&doc, "data.active"), "true");
        assert_eq!(json_path_string(&doc, "items.0.id"), "first");
        assert_eq!(json_path_string(&doc, "data.missing"), "");
        assert_eq!(json_path_string(&doc, "data"), "");
    }
}
