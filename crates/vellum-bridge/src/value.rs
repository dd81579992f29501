//! Statement parameters and result rows

use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A single SQL value as it travels over the bridge.
///
/// Blobs are carried as byte arrays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SqlValue::Real(v) => Some(*v),
            SqlValue::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            SqlValue::Blob(v) => Some(v),
            _ => None,
        }
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Integer(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Integer(v.into())
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Integer(v as i64)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Real(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        SqlValue::Blob(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

/// One result row; columns keep the order the statement produced them in.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<SqlValue>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            columns: Vec::with_capacity(capacity),
            values: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, column: impl Into<String>, value: SqlValue) {
        self.columns.push(column.into());
        self.values.push(value);
    }

    /// Value of the first column named `column`
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|i| &self.values[i])
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.columns.iter().map(String::as_str).zip(self.values.iter())
    }
}

// On the wire a row is a list of `[column, value]` pairs. A JSON object
// would not survive `serde_json::Value` with column order intact, and a
// join can legitimately yield two columns with the same name.
impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.len()))?;
        for pair in self.iter() {
            seq.serialize_element(&pair)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for Row {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let pairs = Vec::<(String, SqlValue)>::deserialize(deserializer)?;
        let mut row = Row::with_capacity(pairs.len());
        for (column, value) in pairs {
            row.push(column, value);
        }
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_value_wire_shapes() {
        let params: Vec<SqlValue> =
            serde_json::from_value(json!([null, 7, 1.5, "note", [1, 2, 3]])).unwrap();
        assert_eq!(
            params,
            vec![
                SqlValue::Null,
                SqlValue::Integer(7),
                SqlValue::Real(1.5),
                SqlValue::Text("note".to_string()),
                SqlValue::Blob(vec![1, 2, 3]),
            ]
        );
    }

    #[test]
    fn test_row_keeps_column_order() {
        let mut row = Row::new();
        row.push("title", "groceries".into());
        row.push("id", SqlValue::Integer(3));
        row.push("body", SqlValue::Null);

        let value = serde_json::to_value(&row).unwrap();
        assert_eq!(value, json!([["title", "groceries"], ["id", 3], ["body", null]]));

        let back: Row = serde_json::from_value(value).unwrap();
        assert_eq!(back, row);
        assert_eq!(back.columns(), &["title", "id", "body"]);
        assert_eq!(back.get("id"), Some(&SqlValue::Integer(3)));
        assert_eq!(back.get("missing"), None);
    }

    #[test]
    fn test_row_keeps_duplicate_columns() {
        let mut row = Row::new();
        row.push("zeta", "z".into());
        row.push("alpha", "a".into());
        row.push("id", SqlValue::Integer(1));
        row.push("id", SqlValue::Integer(2));

        let back: Row = serde_json::from_value(serde_json::to_value(&row).unwrap()).unwrap();
        assert_eq!(back.columns(), &["zeta", "alpha", "id", "id"]);
        assert_eq!(
            back.values(),
            &[
                SqlValue::Text("z".to_string()),
                SqlValue::Text("a".to_string()),
                SqlValue::Integer(1),
                SqlValue::Integer(2)
            ]
        );
        // lookup by name finds the first of the duplicates
        assert_eq!(back.get("id"), Some(&SqlValue::Integer(1)));
    }

    #[test]
    fn test_conversions() {
        assert_eq!(SqlValue::from(true), SqlValue::Integer(1));
        assert_eq!(SqlValue::from(None::<i64>), SqlValue::Null);
        assert_eq!(SqlValue::from(Some("x")), SqlValue::Text("x".to_string()));
        assert_eq!(SqlValue::Integer(2).as_f64(), Some(2.0));
    }
}
