//! Opaque cursor codecs.
//!
//! Keyset cursors are base64 over a JSON object that maps each sort column to the
//! value of the last row seen, in sort-key order. Offset cursors are base64 over
//! `arrayconnection:<index>`, the shape used by Relay connection helpers.

use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{PlanError, PlanResult};
use crate::pagination::ordering::OrderColumn;
use crate::plan::value::Scalar;

const OFFSET_PREFIX: &str = "arrayconnection:";

/// The decoded form of a keyset cursor: one value per sort column, in order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Cursor {
    entries: Vec<(String, Scalar)>,
}

impl Cursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a column value.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Scalar>) -> Self {
        self.entries.push((column.into(), value.into()));
        self
    }

    pub fn entries(&self) -> &[(String, Scalar)] {
        &self.entries
    }

    pub fn get(&self, column: &str) -> Option<&Scalar> {
        self.entries
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Encode to an opaque string.
    pub fn encode(&self) -> String {
        // Serializing a map of strings to scalars cannot fail.
        let json = serde_json::to_vec(self).unwrap_or_default();
        STANDARD.encode(json)
    }

    /// Decode an opaque string produced by [`Cursor::encode`].
    pub fn decode(cursor: &str) -> PlanResult<Self> {
        let bytes = STANDARD
            .decode(cursor.trim())
            .map_err(|e| PlanError::cursor(format!("not base64: {}", e)))?;
        let cursor: Cursor = serde_json::from_slice(&bytes)
            .map_err(|e| PlanError::cursor(format!("malformed payload: {}", e)))?;
        if cursor.is_empty() {
            return Err(PlanError::cursor("cursor carries no sort values"));
        }
        Ok(cursor)
    }

    /// Values in sort-key order, checking that the cursor covers exactly the sort columns.
    pub fn values_for(&self, sort_key: &[OrderColumn]) -> PlanResult<Vec<Scalar>> {
        if self.entries.len() != sort_key.len() {
            return Err(PlanError::cursor(format!(
                "cursor has {} values but the sort key has {} columns",
                self.entries.len(),
                sort_key.len()
            )));
        }
        sort_key
            .iter()
            .map(|key| {
                self.get(&key.column).cloned().ok_or_else(|| {
                    PlanError::cursor(format!("cursor is missing sort column '{}'", key.column))
                })
            })
            .collect()
    }
}

impl Serialize for Cursor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (column, value) in &self.entries {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Cursor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct CursorVisitor;

        impl<'de> Visitor<'de> for CursorVisitor {
            type Value = Cursor;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an object of sort column values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Cursor, A::Error> {
                let mut cursor = Cursor::new();
                while let Some((column, value)) = access.next_entry::<String, Scalar>()? {
                    if cursor.get(&column).is_some() {
                        return Err(serde::de::Error::custom(format!(
                            "duplicate column '{}'",
                            column
                        )));
                    }
                    cursor.entries.push((column, value));
                }
                Ok(cursor)
            }
        }

        deserializer.deserialize_map(CursorVisitor)
    }
}

/// Encode a row index as an offset cursor.
pub fn offset_to_cursor(offset: u64) -> String {
    STANDARD.encode(format!("{}{}", OFFSET_PREFIX, offset))
}

/// Decode an offset cursor back into the row index it names.
pub fn cursor_to_offset(cursor: &str) -> PlanResult<u64> {
    let bytes = STANDARD
        .decode(cursor.trim())
        .map_err(|e| PlanError::cursor(format!("not base64: {}", e)))?;
    let text = String::from_utf8(bytes)
        .map_err(|_| PlanError::cursor("offset cursor is not UTF-8"))?;
    text.strip_prefix(OFFSET_PREFIX)
        .and_then(|n| n.parse::<u64>().ok())
        .ok_or_else(|| PlanError::cursor(format!("'{}' is not an offset cursor", text)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;

    #[test]
    fn test_encode_keeps_column_order() {
        let cursor = Cursor::new().with("created_at", "2020-01-01").with("id", 2);
        let json = String::from_utf8(STANDARD.decode(cursor.encode()).unwrap()).unwrap();
        assert_eq!(json, r#"{"created_at":"2020-01-01","id":2}"#);
    }

    #[test]
    fn test_date_round_trip() {
        let date = Utc.with_ymd_and_hms(2019, 12, 31, 23, 59, 58).unwrap();
        let cursor = Cursor::new().with("posted", date).with("id", 9);
        assert_eq!(Cursor::decode(&cursor.encode()).unwrap(), cursor);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        for bad in ["%%%", "bm90IGpzb24=", "e30=", "WzEsMl0="] {
            let err = Cursor::decode(bad).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidCursor, "input {}", bad);
        }
    }

    #[test]
    fn test_values_for_sort_key() {
        let cursor = Cursor::new().with("id", 4).with("name", "x");
        let key = vec![OrderColumn::asc("name"), OrderColumn::desc("id")];
        assert_eq!(
            cursor.values_for(&key).unwrap(),
            vec![Scalar::from("x"), Scalar::Integer(4)]
        );

        let wrong = vec![OrderColumn::asc("id"), OrderColumn::asc("title")];
        assert!(cursor.values_for(&wrong).is_err());
        assert!(cursor.values_for(&[OrderColumn::asc("id")]).is_err());
    }

    #[test]
    fn test_offset_cursor() {
        let cursor = offset_to_cursor(9);
        assert_eq!(cursor, "YXJyYXljb25uZWN0aW9uOjk=");
        assert_eq!(cursor_to_offset(&cursor).unwrap(), 9);
        assert!(cursor_to_offset(&STANDARD.encode("arrayconnection:x")).is_err());
    }

    fn scalar() -> impl Strategy<Value = Scalar> {
        prop_oneof![
            any::<i64>().prop_map(Scalar::Integer),
            ".*".prop_map(Scalar::String),
            (0i64..4_102_444_800).prop_map(|secs| {
                Scalar::Date(Utc.timestamp_opt(secs, 0).unwrap())
            }),
        ]
    }

    proptest! {
        #[test]
        fn prop_decode_inverts_encode(values in prop::collection::vec(scalar(), 1..6)) {
            let cursor = values
                .into_iter()
                .enumerate()
                .fold(Cursor::new(), |c, (i, v)| c.with(format!("c{}", i), v));
            prop_assert_eq!(Cursor::decode(&cursor.encode()).unwrap(), cursor);
        }
    }
}
