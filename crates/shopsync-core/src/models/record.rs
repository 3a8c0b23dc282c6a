//! Business records replicated by the sync engine.
//!
//! Each table has its own typed record. Outbox payloads and remote changes
//! carry the record as JSON and are decoded through [`RecordPayload`], keyed
//! by [`Table`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Replicated business tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    ShopSettings,
    Customers,
    Orders,
    OrderItems,
    Expenses,
}

impl Table {
    /// All tables, parents before children.
    pub const ALL: [Self; 5] = [
        Self::ShopSettings,
        Self::Customers,
        Self::Orders,
        Self::OrderItems,
        Self::Expenses,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ShopSettings => "shop_settings",
            Self::Customers => "customers",
            Self::Orders => "orders",
            Self::OrderItems => "order_items",
            Self::Expenses => "expenses",
        }
    }

    /// Column names in storage order; `id` is always first.
    pub const fn columns(self) -> &'static [&'static str] {
        match self {
            Self::ShopSettings => &[
                "id",
                "shop_name",
                "phone",
                "address",
                "customer_id_prefix",
                "order_id_prefix",
                "created_at",
                "updated_at",
            ],
            Self::Customers => &[
                "id",
                "customer_id",
                "name",
                "phone",
                "address",
                "city",
                "social_media_url",
                "platform",
                "created_at",
                "updated_at",
                "deleted_at",
            ],
            Self::Orders => &[
                "id",
                "order_id",
                "customer_id",
                "status",
                "order_from",
                "exchange_rate",
                "shipping_fee",
                "delivery_fee",
                "cargo_fee",
                "service_fee",
                "service_fee_type",
                "product_discount",
                "order_date",
                "created_at",
                "updated_at",
                "deleted_at",
            ],
            Self::OrderItems => &[
                "id",
                "order_id",
                "product_url",
                "product_qty",
                "price",
                "product_weight",
                "created_at",
                "updated_at",
                "deleted_at",
            ],
            Self::Expenses => &[
                "id",
                "expense_id",
                "title",
                "amount",
                "category",
                "payment_method",
                "notes",
                "expense_date",
                "created_at",
                "updated_at",
                "deleted_at",
            ],
        }
    }

    /// Whether rows are soft deleted through a `deleted_at` column.
    pub const fn soft_deletes(self) -> bool {
        !matches!(self, Self::ShopSettings)
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Table {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|table| table.as_str() == s)
            .ok_or_else(|| Error::Validation(format!("unknown table '{s}'")))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShopSettings {
    pub id: i64,
    pub shop_name: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub customer_id_prefix: Option<String>,
    pub order_id_prefix: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: i64,
    pub customer_id: Option<String>,
    pub name: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub social_media_url: Option<String>,
    pub platform: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub deleted_at: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub order_id: Option<String>,
    pub customer_id: Option<i64>,
    pub status: Option<String>,
    pub order_from: Option<String>,
    pub exchange_rate: Option<f64>,
    pub shipping_fee: Option<f64>,
    pub delivery_fee: Option<f64>,
    pub cargo_fee: Option<f64>,
    pub service_fee: Option<f64>,
    pub service_fee_type: Option<String>,
    pub product_discount: Option<f64>,
    pub order_date: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub deleted_at: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub product_url: Option<String>,
    pub product_qty: Option<i64>,
    pub price: Option<f64>,
    pub product_weight: Option<f64>,
    pub created_at: i64,
    pub updated_at: i64,
    pub deleted_at: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    pub id: i64,
    pub expense_id: Option<String>,
    pub title: String,
    pub amount: f64,
    pub category: Option<String>,
    pub payment_method: Option<String>,
    pub notes: Option<String>,
    pub expense_date: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub deleted_at: Option<i64>,
}

/// A record of any replicated table, tagged by its table name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "table_name", content = "record", rename_all = "snake_case")]
pub enum RecordPayload {
    ShopSettings(ShopSettings),
    Customers(Customer),
    Orders(Order),
    OrderItems(OrderItem),
    Expenses(Expense),
}

impl RecordPayload {
    pub const fn table(&self) -> Table {
        match self {
            Self::ShopSettings(_) => Table::ShopSettings,
            Self::Customers(_) => Table::Customers,
            Self::Orders(_) => Table::Orders,
            Self::OrderItems(_) => Table::OrderItems,
            Self::Expenses(_) => Table::Expenses,
        }
    }

    pub const fn record_id(&self) -> i64 {
        match self {
            Self::ShopSettings(record) => record.id,
            Self::Customers(record) => record.id,
            Self::Orders(record) => record.id,
            Self::OrderItems(record) => record.id,
            Self::Expenses(record) => record.id,
        }
    }

    pub const fn updated_at(&self) -> i64 {
        match self {
            Self::ShopSettings(record) => record.updated_at,
            Self::Customers(record) => record.updated_at,
            Self::Orders(record) => record.updated_at,
            Self::OrderItems(record) => record.updated_at,
            Self::Expenses(record) => record.updated_at,
        }
    }

    /// Stamp a local modification time.
    pub fn touch(&mut self, now: i64) {
        match self {
            Self::ShopSettings(record) => record.updated_at = now,
            Self::Customers(record) => record.updated_at = now,
            Self::Orders(record) => record.updated_at = now,
            Self::OrderItems(record) => record.updated_at = now,
            Self::Expenses(record) => record.updated_at = now,
        }
    }

    /// Set `deleted_at`; returns false for tables without soft deletes.
    pub fn mark_deleted(&mut self, now: i64) -> bool {
        let deleted_at = match self {
            Self::ShopSettings(_) => return false,
            Self::Customers(record) => &mut record.deleted_at,
            Self::Orders(record) => &mut record.deleted_at,
            Self::OrderItems(record) => &mut record.deleted_at,
            Self::Expenses(record) => &mut record.deleted_at,
        };
        *deleted_at = Some(now);
        self.touch(now);
        true
    }

    /// Decode the bare record JSON of `table`.
    pub fn from_value(table: Table, value: serde_json::Value) -> Result<Self> {
        let payload = match table {
            Table::ShopSettings => Self::ShopSettings(serde_json::from_value(value)?),
            Table::Customers => Self::Customers(serde_json::from_value(value)?),
            Table::Orders => Self::Orders(serde_json::from_value(value)?),
            Table::OrderItems => Self::OrderItems(serde_json::from_value(value)?),
            Table::Expenses => Self::Expenses(serde_json::from_value(value)?),
        };
        Ok(payload)
    }

    /// Decode a serialized outbox payload of `table`.
    pub fn decode(table: Table, raw: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(raw)?;
        Self::from_value(table, value)
    }

    /// The bare record as a JSON object (without the table tag).
    pub fn to_value(&self) -> Result<serde_json::Value> {
        let value = match self {
            Self::ShopSettings(record) => serde_json::to_value(record)?,
            Self::Customers(record) => serde_json::to_value(record)?,
            Self::Orders(record) => serde_json::to_value(record)?,
            Self::OrderItems(record) => serde_json::to_value(record)?,
            Self::Expenses(record) => serde_json::to_value(record)?,
        };
        Ok(value)
    }

    pub fn encode(&self) -> Result<String> {
        Ok(self.to_value()?.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn customer(id: i64, name: &str) -> Customer {
        Customer {
            id,
            customer_id: Some(format!("SSC-{id:05}")),
            name: name.to_string(),
            phone: None,
            address: None,
            city: Some("Yangon".to_string()),
            social_media_url: None,
            platform: None,
            created_at: 1_700_000_000_000,
            updated_at: 1_700_000_000_000,
            deleted_at: None,
        }
    }

    #[test]
    fn table_parses_known_names() {
        assert_eq!("order_items".parse::<Table>().unwrap(), Table::OrderItems);
        assert!("users".parse::<Table>().is_err());
    }

    #[test]
    fn columns_start_with_id() {
        for table in Table::ALL {
            assert_eq!(table.columns()[0], "id");
            assert!(table.columns().contains(&"updated_at"));
        }
    }

    #[test]
    fn decode_dispatches_on_table() {
        let payload = RecordPayload::Customers(customer(7, "Aye"));
        let raw = payload.encode().unwrap();

        let decoded = RecordPayload::decode(Table::Customers, &raw).unwrap();
        assert_eq!(decoded, payload);
        assert_eq!(decoded.record_id(), 7);

        // A customer body is not a valid expense
        assert!(RecordPayload::decode(Table::Expenses, &raw).is_err());
    }

    #[test]
    fn missing_optional_columns_default_to_none() {
        let value = serde_json::json!({
            "id": 3,
            "order_id": 9,
            "created_at": 1,
            "updated_at": 2
        });
        let decoded = RecordPayload::from_value(Table::OrderItems, value).unwrap();
        match decoded {
            RecordPayload::OrderItems(item) => {
                assert_eq!(item.order_id, 9);
                assert_eq!(item.price, None);
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn tagged_form_names_the_table() {
        let payload = RecordPayload::Customers(customer(1, "Mya"));
        let tagged = serde_json::to_value(&payload).unwrap();
        assert_eq!(tagged["table_name"], "customers");
        assert_eq!(tagged["record"]["name"], "Mya");
    }

    #[test]
    fn mark_deleted_stamps_soft_delete_tables_only() {
        let mut payload = RecordPayload::Customers(customer(2, "Thida"));
        assert!(payload.mark_deleted(42));
        match &payload {
            RecordPayload::Customers(record) => {
                assert_eq!(record.deleted_at, Some(42));
                assert_eq!(record.updated_at, 42);
            }
            other => panic!("unexpected payload {other:?}"),
        }

        let mut settings = RecordPayload::ShopSettings(ShopSettings {
            id: 1,
            shop_name: "Shop".to_string(),
            phone: None,
            address: None,
            customer_id_prefix: None,
            order_id_prefix: None,
            created_at: 1,
            updated_at: 1,
        });
        assert!(!settings.mark_deleted(42));
        assert_eq!(settings.updated_at(), 1);
    }
}
