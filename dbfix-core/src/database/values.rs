//! Dynamically typed SQLite values.
//!
//! SQLite stores a storage class per value rather than per column, so rows
//! copied between containers or exported to JSON are read value by value.

use serde_json::Value as JsonValue;
use sqlx::Row;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteRow};

/// A single SQLite value in one of the five storage classes.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

impl SqlValue {
    /// Reads the value at `index` from a row.
    pub fn from_row(row: &SqliteRow, index: usize) -> Self {
        // Storage classes are tried in order of likelihood; each decode only
        // succeeds for its own class.
        if let Ok(v) = row.try_get::<Option<String>, _>(index) {
            return v.map_or(Self::Null, Self::Text);
        }
        if let Ok(v) = row.try_get::<Option<i64>, _>(index) {
            return v.map_or(Self::Null, Self::Integer);
        }
        if let Ok(v) = row.try_get::<Option<f64>, _>(index) {
            return v.map_or(Self::Null, Self::Real);
        }
        if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(index) {
            return v.map_or(Self::Null, Self::Blob);
        }

        Self::Null
    }

    /// Reads every value of a row in column order.
    pub fn row_values(row: &SqliteRow) -> Vec<Self> {
        (0..row.len()).map(|i| Self::from_row(row, i)).collect()
    }

    /// Binds this value as the next positional parameter of `query`.
    pub fn bind(self, query: SqliteQuery<'_>) -> SqliteQuery<'_> {
        match self {
            Self::Null => query.bind(None::<i64>),
            Self::Integer(v) => query.bind(v),
            Self::Real(v) => query.bind(v),
            Self::Text(v) => query.bind(v),
            Self::Blob(v) => query.bind(v),
        }
    }

    /// Converts to JSON; BLOBs become `base64:`-prefixed strings.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::Null => JsonValue::Null,
            Self::Integer(v) => JsonValue::Number((*v).into()),
            Self::Real(v) => serde_json::Number::from_f64(*v)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Self::Text(v) => JsonValue::String(v.clone()),
            Self::Blob(bytes) => {
                use base64::Engine;
                let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
                JsonValue::String(format!("base64:{}", encoded))
            }
        }
    }
}

impl std::fmt::Display for SqlValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Integer(v) => write!(f, "{}", v),
            Self::Real(v) => write!(f, "{}", v),
            Self::Text(v) => write!(f, "{}", v),
            Self::Blob(v) => write!(f, "<{} byte blob>", v.len()),
        }
    }
}

/// Converts a row to a JSON object keyed by column name.
pub fn row_to_json(row: &SqliteRow) -> JsonValue {
    use sqlx::Column;

    let mut map = serde_json::Map::new();
    for (index, column) in row.columns().iter().enumerate() {
        map.insert(
            column.name().to_string(),
            SqlValue::from_row(row, index).to_json(),
        );
    }
    JsonValue::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::SqlitePool;

    #[test]
    fn test_blob_to_json_is_base64() {
        let value = SqlValue::Blob(vec![0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(value.to_json(), JsonValue::String("base64:3q2+7w==".to_string()));
    }

    #[test]
    fn test_non_finite_real_to_json_is_null() {
        assert_eq!(SqlValue::Real(f64::NAN).to_json(), JsonValue::Null);
        assert_eq!(SqlValue::Real(1.5).to_json(), serde_json::json!(1.5));
    }

    #[test]
    fn test_display() {
        assert_eq!(SqlValue::Text("ok".to_string()).to_string(), "ok");
        assert_eq!(SqlValue::Null.to_string(), "NULL");
        assert_eq!(SqlValue::Blob(vec![1, 2, 3]).to_string(), "<3 byte blob>");
    }

    #[tokio::test]
    async fn test_reads_every_storage_class() {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        let row = sqlx::query("SELECT NULL, 42, 2.5, 'text', x'0102'")
            .fetch_one(&pool)
            .await
            .unwrap();

        assert_eq!(
            SqlValue::row_values(&row),
            vec![
                SqlValue::Null,
                SqlValue::Integer(42),
                SqlValue::Real(2.5),
                SqlValue::Text("text".to_string()),
                SqlValue::Blob(vec![1, 2]),
            ]
        );
    }

    #[tokio::test]
    async fn test_bound_values_round_trip() {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        let values = vec![
            SqlValue::Null,
            SqlValue::Integer(-7),
            SqlValue::Real(0.25),
            SqlValue::Text("héllo".to_string()),
            SqlValue::Blob(vec![0, 255]),
        ];

        let mut query = sqlx::query("SELECT ?, ?, ?, ?, ?");
        for value in values.clone() {
            query = value.bind(query);
        }
        let row = query.fetch_one(&pool).await.unwrap();

        assert_eq!(SqlValue::row_values(&row), values);
    }
}
