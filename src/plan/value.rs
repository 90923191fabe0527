//! Scalar values that flow into generated SQL: cursor components and batch keys.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// A scalar value taken from a row or a cursor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "WireScalar", into = "WireScalar")]
pub enum Scalar {
    Null,
    Integer(i64),
    String(String),
    Date(DateTime<Utc>),
}

/// JSON shape of a scalar. Dates are wrapped so they survive a round trip.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum WireScalar {
    Integer(i64),
    Date {
        #[serde(rename = "$date")]
        date: DateTime<Utc>,
    },
    String(String),
    Null(()),
}

impl From<WireScalar> for Scalar {
    fn from(wire: WireScalar) -> Self {
        match wire {
            WireScalar::Integer(n) => Scalar::Integer(n),
            WireScalar::Date { date } => Scalar::Date(date),
            WireScalar::String(s) => Scalar::String(s),
            WireScalar::Null(()) => Scalar::Null,
        }
    }
}

impl From<Scalar> for WireScalar {
    fn from(value: Scalar) -> Self {
        match value {
            Scalar::Null => WireScalar::Null(()),
            Scalar::Integer(n) => WireScalar::Integer(n),
            Scalar::String(s) => WireScalar::String(s),
            Scalar::Date(date) => WireScalar::Date { date },
        }
    }
}

impl Scalar {
    /// Convert a row value returned by an executor.
    ///
    /// Floats, booleans and nested values have no keyset meaning and yield `None`.
    pub fn from_json(value: &serde_json::Value) -> Option<Scalar> {
        match value {
            serde_json::Value::Null => Some(Scalar::Null),
            serde_json::Value::Number(n) => n.as_i64().map(Scalar::Integer),
            serde_json::Value::String(s) => Some(Scalar::String(s.clone())),
            _ => None,
        }
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Scalar::String(_))
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => f.write_str("null"),
            Scalar::Integer(n) => write!(f, "{}", n),
            Scalar::String(s) => f.write_str(s),
            Scalar::Date(d) => f.write_str(&d.to_rfc3339_opts(SecondsFormat::Millis, true)),
        }
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Scalar::Integer(v)
    }
}

impl From<i32> for Scalar {
    fn from(v: i32) -> Self {
        Scalar::Integer(v as i64)
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Scalar::String(v.to_string())
    }
}

impl From<String> for Scalar {
    fn from(v: String) -> Self {
        Scalar::String(v)
    }
}

impl From<DateTime<Utc>> for Scalar {
    fn from(v: DateTime<Utc>) -> Self {
        Scalar::Date(v)
    }
}

/// Parent key values fetched together in one batched statement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchScope {
    values: Vec<Scalar>,
}

impl BatchScope {
    /// Build a scope, dropping NULLs and repeated keys while keeping first-seen order.
    pub fn new(values: impl IntoIterator<Item = Scalar>) -> Self {
        let mut scope = Self::default();
        for value in values {
            scope.push(value);
        }
        scope
    }

    pub fn push(&mut self, value: Scalar) {
        if value != Scalar::Null && !self.values.contains(&value) {
            self.values.push(value);
        }
    }

    pub fn values(&self) -> &[Scalar] {
        &self.values
    }

    pub fn first(&self) -> Option<&Scalar> {
        self.values.first()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<T: Into<Scalar>> FromIterator<T> for BatchScope {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        BatchScope::new(iter.into_iter().map(Into::into))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_wire_format() {
        let date = Utc.with_ymd_and_hms(2021, 3, 4, 5, 6, 7).unwrap();
        let values = vec![
            Scalar::Integer(7),
            Scalar::from("2021-03-04T05:06:07Z"),
            Scalar::Date(date),
            Scalar::Null,
        ];
        let json = serde_json::to_string(&values).unwrap();
        assert_eq!(
            json,
            r#"[7,"2021-03-04T05:06:07Z",{"$date":"2021-03-04T05:06:07Z"},null]"#
        );
        let back: Vec<Scalar> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, values);
    }

    #[test]
    fn test_batch_scope_dedupes() {
        let scope: BatchScope = vec![3, 1, 3, 2, 1].into_iter().collect();
        assert_eq!(
            scope.values(),
            &[Scalar::Integer(3), Scalar::Integer(1), Scalar::Integer(2)]
        );
    }

    #[test]
    fn test_batch_scope_skips_null() {
        let scope = BatchScope::new(vec![Scalar::Null, Scalar::from("a")]);
        assert_eq!(scope.len(), 1);
        assert!(scope.first().unwrap().is_string());
    }
}
