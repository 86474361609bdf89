//! Continuation cursors for keyset pagination
//!
//! A cursor is URL-safe base64 (no padding) over the JSON object
//! `{"<order column>": <value>}`. It holds no server-side state, so a token
//! can be decoded on any instance without touching the database.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde_json::{Map, Value};

use crate::value::SqlValue;

/// Position of the last row returned on the previous page.
#[derive(Debug, Clone, PartialEq)]
pub struct Cursor {
    pub column: String,
    pub value: SqlValue,
}

impl Cursor {
    pub fn new(column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }

    /// Encode into a token safe to place in a query string.
    pub fn encode(&self) -> String {
        let mut object = Map::new();
        object.insert(self.column.clone(), self.value.to_json());
        // Serializing a map of scalars cannot fail.
        let json = Value::Object(object).to_string();
        URL_SAFE_NO_PAD.encode(json.as_bytes())
    }

    /// Decode a token. Anything malformed yields `None`.
    pub fn decode(token: &str) -> Option<Self> {
        let bytes = URL_SAFE_NO_PAD.decode(token.trim().as_bytes()).ok()?;
        let value: Value = serde_json::from_slice(&bytes).ok()?;
        let Value::Object(object) = value else {
            return None;
        };
        if object.len() != 1 {
            return None;
        }
        let (column, value) = object.into_iter().next()?;
        let value = SqlValue::from_json(&value)?;
        if value == SqlValue::Null {
            return None;
        }
        Some(Self { column, value })
    }

    /// Decode a token and keep it only if it points at `column`.
    ///
    /// A cursor minted by a different listing is treated as no cursor.
    pub fn decode_for(token: &str, column: &str) -> Option<SqlValue> {
        match Self::decode(token) {
            Some(cursor) if cursor.column == column => Some(cursor.value),
            Some(cursor) => {
                tracing::debug!(expected = column, found = %cursor.column, "ignoring cursor for another column");
                None
            }
            None => {
                tracing::debug!("ignoring malformed cursor");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_representative_values() {
        let values = [
            SqlValue::Integer(2),
            SqlValue::Integer(-17),
            SqlValue::Real(1_715_000_000.25),
            SqlValue::Text("2024-05-06T10:00:00Z".into()),
            SqlValue::Text("eth0 / wlan0 ?&=".into()),
        ];
        for value in values {
            let cursor = Cursor::new("created_at", value.clone());
            let decoded = Cursor::decode(&cursor.encode()).unwrap();
            assert_eq!(decoded, cursor);
        }
    }

    #[test]
    fn token_is_url_safe() {
        let token = Cursor::new("name", "??>>??~~").encode();
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn decode_is_idempotent() {
        let token = Cursor::new("id", 99_i64).encode();
        assert_eq!(Cursor::decode(&token), Cursor::decode(&token));
    }

    #[test]
    fn malformed_tokens_decode_to_none() {
        assert_eq!(Cursor::decode(""), None);
        assert_eq!(Cursor::decode("not base64!!"), None);
        // valid base64, not JSON
        assert_eq!(Cursor::decode(&URL_SAFE_NO_PAD.encode("hello")), None);
        // JSON but not an object
        assert_eq!(Cursor::decode(&URL_SAFE_NO_PAD.encode("[1,2]")), None);
        // object with two keys
        assert_eq!(
            Cursor::decode(&URL_SAFE_NO_PAD.encode(r#"{"a":1,"b":2}"#)),
            None
        );
        // non-scalar value
        assert_eq!(
            Cursor::decode(&URL_SAFE_NO_PAD.encode(r#"{"id":{"x":1}}"#)),
            None
        );
        assert_eq!(Cursor::decode(&URL_SAFE_NO_PAD.encode(r#"{"id":null}"#)), None);
    }

    #[test]
    fn decode_for_rejects_other_columns() {
        let token = Cursor::new("id", 5_i64).encode();
        assert_eq!(Cursor::decode_for(&token, "id"), Some(SqlValue::Integer(5)));
        assert_eq!(Cursor::decode_for(&token, "last_seen"), None);
    }
}
