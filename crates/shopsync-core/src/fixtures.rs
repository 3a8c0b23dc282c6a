//! Shared builders for unit tests

use crate::models::{Customer, Expense, Order, RecordPayload, RemoteTarget, ShopSettings};

pub fn customer(id: i64, name: &str) -> Customer {
    Customer {
        id,
        customer_id: Some(format!("SSC-{id:05}")),
        name: name.to_string(),
        phone: Some("09 420 000 111".to_string()),
        address: None,
        city: Some("Mandalay".to_string()),
        social_media_url: None,
        platform: Some("facebook".to_string()),
        created_at: 1_700_000_000_000,
        updated_at: 1_700_000_000_000,
        deleted_at: None,
    }
}

pub fn customer_record(id: i64, name: &str) -> RecordPayload {
    RecordPayload::Customers(customer(id, name))
}

pub fn order_record(id: i64, customer_id: i64) -> RecordPayload {
    RecordPayload::Orders(Order {
        id,
        order_id: Some(format!("SSO-{id:05}")),
        customer_id: Some(customer_id),
        status: Some("pending".to_string()),
        order_from: Some("taobao".to_string()),
        exchange_rate: Some(620.5),
        shipping_fee: Some(3000.0),
        delivery_fee: None,
        cargo_fee: None,
        service_fee: Some(5.0),
        service_fee_type: Some("percent".to_string()),
        product_discount: None,
        order_date: Some("2026-03-01".to_string()),
        created_at: 1_700_000_000_000,
        updated_at: 1_700_000_000_000,
        deleted_at: None,
    })
}

pub fn expense_record(id: i64, amount: f64) -> RecordPayload {
    RecordPayload::Expenses(Expense {
        id,
        expense_id: Some(format!("EXP-{id:05}")),
        title: "Courier".to_string(),
        amount,
        category: Some("shipping".to_string()),
        payment_method: Some("cash".to_string()),
        notes: None,
        expense_date: Some("2026-03-02".to_string()),
        created_at: 1_700_000_000_000,
        updated_at: 1_700_000_000_000,
        deleted_at: None,
    })
}

pub fn shop_settings_record() -> RecordPayload {
    RecordPayload::ShopSettings(ShopSettings {
        id: 1,
        shop_name: "Golden Parcel".to_string(),
        phone: None,
        address: None,
        customer_id_prefix: Some("GPC".to_string()),
        order_id_prefix: Some("GPO".to_string()),
        created_at: 1_700_000_000_000,
        updated_at: 1_700_000_000_000,
    })
}

pub fn target(url: &str) -> RemoteTarget {
    RemoteTarget::new(url, "anon-key", "service-key").unwrap()
}
