//! Business record repository implementation
//!
//! Rows are mapped through JSON: a record serializes to an object whose keys
//! are exactly the table's columns, so one generic code path serves every
//! table.

use libsql::params::Params;
use libsql::{Connection, Value};

use crate::error::{Error, Result};
use crate::models::{RecordPayload, Table};

/// Trait for business record storage operations (async)
#[allow(async_fn_in_trait)]
pub trait RecordRepository {
    /// Insert or update a record by primary key
    async fn upsert(&self, record: &RecordPayload) -> Result<()>;

    /// Insert a record only when its primary key is absent; returns whether it was inserted
    async fn insert_if_absent(&self, record: &RecordPayload) -> Result<bool>;

    /// Get a record by table and primary key, including soft deleted rows
    async fn get(&self, table: Table, id: i64) -> Result<Option<RecordPayload>>;

    /// List every row of a table in primary key order
    async fn list(&self, table: Table) -> Result<Vec<RecordPayload>>;

    /// Remove a row physically
    async fn remove(&self, table: Table, id: i64) -> Result<bool>;
}

/// libSQL implementation of `RecordRepository`
pub struct LibSqlRecordRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlRecordRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn column_values(record: &RecordPayload) -> Result<Vec<Value>> {
        let value = record.to_value()?;
        let object = value.as_object().ok_or_else(|| {
            Error::Validation(format!("{} record is not a JSON object", record.table()))
        })?;

        Ok(record
            .table()
            .columns()
            .iter()
            .map(|column| object.get(*column).map_or(Value::Null, json_to_sql))
            .collect())
    }

    fn select_sql(table: Table) -> String {
        format!("SELECT {} FROM {}", table.columns().join(", "), table)
    }

    fn parse_record(table: Table, row: &libsql::Row) -> Result<RecordPayload> {
        let mut object = serde_json::Map::new();
        for (index, column) in table.columns().iter().enumerate() {
            let index = i32::try_from(index)
                .map_err(|_| Error::Database("column index overflow".to_string()))?;
            object.insert((*column).to_string(), sql_to_json(row.get_value(index)?));
        }
        RecordPayload::from_value(table, serde_json::Value::Object(object))
    }
}

impl RecordRepository for LibSqlRecordRepository<'_> {
    async fn upsert(&self, record: &RecordPayload) -> Result<()> {
        let table = record.table();
        let columns = table.columns();
        let placeholders = vec!["?"; columns.len()].join(", ");
        let updates = columns[1..]
            .iter()
            .map(|column| format!("{column} = excluded.{column}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO {table} ({}) VALUES ({placeholders})
             ON CONFLICT(id) DO UPDATE SET {updates}",
            columns.join(", ")
        );

        self.conn
            .execute(&sql, Params::Positional(Self::column_values(record)?))
            .await?;
        Ok(())
    }

    async fn insert_if_absent(&self, record: &RecordPayload) -> Result<bool> {
        let table = record.table();
        let columns = table.columns();
        let placeholders = vec!["?"; columns.len()].join(", ");
        let sql = format!(
            "INSERT OR IGNORE INTO {table} ({}) VALUES ({placeholders})",
            columns.join(", ")
        );

        let inserted = self
            .conn
            .execute(&sql, Params::Positional(Self::column_values(record)?))
            .await?;
        Ok(inserted > 0)
    }

    async fn get(&self, table: Table, id: i64) -> Result<Option<RecordPayload>> {
        let sql = format!("{} WHERE id = ?", Self::select_sql(table));
        let mut rows = self.conn.query(&sql, [id]).await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_record(table, &row)?)),
            None => Ok(None),
        }
    }

    async fn list(&self, table: Table) -> Result<Vec<RecordPayload>> {
        let sql = format!("{} ORDER BY id ASC", Self::select_sql(table));
        let mut rows = self.conn.query(&sql, ()).await?;

        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(Self::parse_record(table, &row)?);
        }
        Ok(records)
    }

    async fn remove(&self, table: Table, id: i64) -> Result<bool> {
        let removed = self
            .conn
            .execute(&format!("DELETE FROM {table} WHERE id = ?"), [id])
            .await?;
        Ok(removed > 0)
    }
}

fn json_to_sql(value: &serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(flag) => Value::Integer(i64::from(*flag)),
        serde_json::Value::Number(number) => number.as_i64().map_or_else(
            || Value::Real(number.as_f64().unwrap_or_default()),
            Value::Integer,
        ),
        serde_json::Value::String(text) => Value::Text(text.clone()),
        other => Value::Text(other.to_string()),
    }
}

fn sql_to_json(value: Value) -> serde_json::Value {
    match value {
        Value::Null | Value::Blob(_) => serde_json::Value::Null,
        Value::Integer(integer) => serde_json::Value::from(integer),
        Value::Real(real) => serde_json::Number::from_f64(real)
            .map_or(serde_json::Value::Null, serde_json::Value::Number),
        Value::Text(text) => serde_json::Value::String(text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::{Customer, Expense};
    use pretty_assertions::assert_eq;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    fn expense(id: i64, amount: f64) -> RecordPayload {
        RecordPayload::Expenses(Expense {
            id,
            expense_id: Some(format!("EXP-{id}")),
            title: "Packaging tape".to_string(),
            amount,
            category: Some("supplies".to_string()),
            payment_method: None,
            notes: None,
            expense_date: Some("2026-01-05".to_string()),
            created_at: 10,
            updated_at: 10,
            deleted_at: None,
        })
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_upsert_and_get() {
        let db = setup().await;
        let repo = LibSqlRecordRepository::new(db.connection());

        let record = expense(1, 12.5);
        repo.upsert(&record).await.unwrap();

        let fetched = repo.get(Table::Expenses, 1).await.unwrap().unwrap();
        assert_eq!(fetched, record);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_upsert_overwrites_existing_row() {
        let db = setup().await;
        let repo = LibSqlRecordRepository::new(db.connection());

        repo.upsert(&expense(1, 12.5)).await.unwrap();
        repo.upsert(&expense(1, 40.0)).await.unwrap();

        let rows = repo.list(Table::Expenses).await.unwrap();
        assert_eq!(rows, vec![expense(1, 40.0)]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_insert_if_absent_keeps_existing_row() {
        let db = setup().await;
        let repo = LibSqlRecordRepository::new(db.connection());

        assert!(repo.insert_if_absent(&expense(4, 1.0)).await.unwrap());
        assert!(!repo.insert_if_absent(&expense(4, 99.0)).await.unwrap());

        let fetched = repo.get(Table::Expenses, 4).await.unwrap().unwrap();
        assert_eq!(fetched, expense(4, 1.0));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_remove() {
        let db = setup().await;
        let repo = LibSqlRecordRepository::new(db.connection());

        repo.upsert(&RecordPayload::Customers(Customer {
            id: 5,
            customer_id: None,
            name: "Hla".to_string(),
            phone: None,
            address: None,
            city: None,
            social_media_url: None,
            platform: None,
            created_at: 1,
            updated_at: 1,
            deleted_at: None,
        }))
        .await
        .unwrap();

        assert!(repo.remove(Table::Customers, 5).await.unwrap());
        assert!(!repo.remove(Table::Customers, 5).await.unwrap());
        assert!(repo.get(Table::Customers, 5).await.unwrap().is_none());
    }
}
