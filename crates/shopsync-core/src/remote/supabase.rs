//! `PostgREST` adapter for Supabase backends

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use zeroize::Zeroizing;

use super::{change_type_for, ConnectionStatus, RemoteAdapter, RemoteConnector, REQUIRED_TABLES};
use crate::error::{Error, Result};
use crate::models::{QueueOperation, RemoteChange, RemoteTarget, Table};
use crate::util::compact_text;

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Supabase REST client authenticated with the service key
pub struct SupabaseAdapter {
    rest_url: String,
    anon_key: String,
    service_key: Zeroizing<String>,
    client: Client,
}

impl SupabaseAdapter {
    pub fn new(target: &RemoteTarget, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| Error::Connectivity(error.to_string()))?;

        Ok(Self {
            rest_url: format!("{}/rest/v1", target.url.trim_end_matches('/')),
            anon_key: target.anon_key.clone(),
            service_key: Zeroizing::new(target.service_key.clone()),
            client,
        })
    }

    fn table_url(&self, table: Table) -> String {
        format!("{}/{table}", self.rest_url)
    }

    fn public_request(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", self.anon_key))
    }

    fn service_request(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", self.service_key.as_str())
            .header("Authorization", format!("Bearer {}", self.service_key.as_str()))
    }

    async fn upsert(&self, table: Table, payload: &str) -> Result<()> {
        let response = self
            .service_request(
                self.client
                    .post(format!("{}?on_conflict=id", self.table_url(table)))
                    .header("Content-Type", "application/json")
                    .header("Prefer", "resolution=merge-duplicates,return=minimal")
                    .body(payload.to_string()),
            )
            .send()
            .await
            .map_err(transport_error)?;
        ensure_success(response).await
    }

    async fn delete(&self, table: Table, record_id: i64) -> Result<()> {
        let response = self
            .service_request(
                self.client
                    .delete(format!("{}?id=eq.{record_id}", self.table_url(table))),
            )
            .send()
            .await
            .map_err(transport_error)?;

        // Already gone
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        ensure_success(response).await
    }
}

#[async_trait]
impl RemoteAdapter for SupabaseAdapter {
    async fn test_connection(&self) -> ConnectionStatus {
        let request = self.public_request(
            self.client
                .get(format!("{}/", self.rest_url))
                .timeout(PROBE_TIMEOUT),
        );
        let response = match request.send().await {
            Ok(response) => response,
            Err(error) => return ConnectionStatus::unreachable(format!("Connection failed: {error}")),
        };

        if !response.status().is_success() {
            return ConnectionStatus::unreachable(format!(
                "Connection failed with status: {}",
                response.status()
            ));
        }

        let body = response.text().await.unwrap_or_default();
        if schema_lists_tables(&body) {
            ConnectionStatus::ready()
        } else {
            ConnectionStatus::missing_tables()
        }
    }

    async fn push(
        &self,
        table: Table,
        operation: QueueOperation,
        record_id: i64,
        payload: &str,
    ) -> Result<()> {
        match operation {
            QueueOperation::Delete if !table.soft_deletes() => self.delete(table, record_id).await,
            // Soft deletes travel as the tombstoned row
            _ => self.upsert(table, payload).await,
        }
    }

    async fn pull(&self, since: i64) -> Result<Vec<RemoteChange>> {
        let mut changes = Vec::new();
        for table in Table::ALL {
            let response = self
                .service_request(self.client.get(format!(
                    "{}?select=*&updated_at=gt.{since}&order=updated_at.asc",
                    self.table_url(table)
                )))
                .send()
                .await
                .map_err(transport_error)?;
            let response = check_status(response).await?;
            let rows = response
                .json::<Vec<serde_json::Value>>()
                .await
                .map_err(transport_error)?;
            changes.extend(rows_to_changes(table, rows));
        }
        Ok(changes)
    }

    async fn truncate_tables(&self) -> Result<()> {
        // Children first
        for table in Table::ALL.into_iter().rev() {
            let response = self
                .service_request(
                    self.client
                        .delete(format!("{}?id=gte.0", self.table_url(table))),
                )
                .send()
                .await
                .map_err(transport_error)?;
            ensure_success(response).await?;
            tracing::info!("Truncated remote table {table}");
        }
        Ok(())
    }
}

/// Builds [`SupabaseAdapter`]s with a fixed request timeout
#[derive(Debug, Clone)]
pub struct SupabaseConnector {
    timeout: Duration,
}

impl SupabaseConnector {
    pub const fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl RemoteConnector for SupabaseConnector {
    fn connect(&self, target: &RemoteTarget) -> Result<Arc<dyn RemoteAdapter>> {
        Ok(Arc::new(SupabaseAdapter::new(target, self.timeout)?))
    }
}

fn schema_lists_tables(body: &str) -> bool {
    REQUIRED_TABLES
        .iter()
        .all(|table| body.contains(&format!("/{table}")))
}

fn rows_to_changes(table: Table, rows: Vec<serde_json::Value>) -> Vec<RemoteChange> {
    rows.into_iter()
        .filter_map(|row| {
            let Some(record_id) = row.get("id").and_then(serde_json::Value::as_i64) else {
                tracing::warn!("Skipping {table} row without an integer id");
                return None;
            };
            let updated_at = row
                .get("updated_at")
                .and_then(serde_json::Value::as_i64)
                .unwrap_or_default();
            let created_at = row
                .get("created_at")
                .and_then(serde_json::Value::as_i64)
                .unwrap_or(updated_at);
            Some(RemoteChange {
                table_name: table,
                record_id,
                change_type: change_type_for(created_at, updated_at),
                payload: row,
            })
        })
        .collect()
}

fn transport_error(error: reqwest::Error) -> Error {
    Error::Connectivity(error.to_string())
}

async fn ensure_success(response: Response) -> Result<()> {
    check_status(response).await.map(|_| ())
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(status_error(status, &body))
}

fn status_error(status: StatusCode, body: &str) -> Error {
    let message = parse_api_error(status, body);
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::Auth(message),
        StatusCode::REQUEST_TIMEOUT | StatusCode::BAD_GATEWAY | StatusCode::GATEWAY_TIMEOUT => {
            Error::Connectivity(message)
        }
        _ => Error::Push(message),
    }
}

#[derive(Debug, Deserialize)]
struct PostgrestErrorResponse {
    message: Option<String>,
    details: Option<String>,
    hint: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<PostgrestErrorResponse>(body) {
        if let Some(message) = payload.message.or(payload.details).or(payload.hint) {
            return format!("{} ({})", compact_text(&message), status.as_u16());
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", compact_text(trimmed), status.as_u16())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChangeType;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn rest_url_is_derived_from_target() {
        let target = RemoteTarget::new("https://demo.supabase.co/", "anon", "service").unwrap();
        let adapter = SupabaseAdapter::new(&target, Duration::from_secs(5)).unwrap();
        assert_eq!(adapter.rest_url, "https://demo.supabase.co/rest/v1");
        assert_eq!(
            adapter.table_url(Table::OrderItems),
            "https://demo.supabase.co/rest/v1/order_items"
        );
    }

    #[test]
    fn status_mapping_separates_auth_from_push_errors() {
        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED, ""),
            Error::Auth(_)
        ));
        assert!(matches!(
            status_error(StatusCode::FORBIDDEN, ""),
            Error::Auth(_)
        ));
        assert!(matches!(
            status_error(StatusCode::GATEWAY_TIMEOUT, ""),
            Error::Connectivity(_)
        ));
        assert!(matches!(
            status_error(StatusCode::CONFLICT, ""),
            Error::Push(_)
        ));
    }

    #[test]
    fn parse_api_error_prefers_postgrest_message() {
        let body = r#"{"code":"23502","message":"null value in column \"name\"","details":null}"#;
        assert_eq!(
            parse_api_error(StatusCode::BAD_REQUEST, body),
            "null value in column \"name\" (400)"
        );
        assert_eq!(parse_api_error(StatusCode::BAD_REQUEST, "  "), "HTTP 400");
        assert_eq!(
            parse_api_error(StatusCode::INTERNAL_SERVER_ERROR, "boom"),
            "boom (500)"
        );
    }

    #[test]
    fn schema_probe_requires_every_table() {
        let full = r#"{"paths":{"/":{},"/shop_settings":{},"/customers":{},"/orders":{},"/order_items":{},"/expenses":{}}}"#;
        assert!(schema_lists_tables(full));

        let partial = r#"{"paths":{"/":{},"/customers":{},"/orders":{}}}"#;
        assert!(!schema_lists_tables(partial));
    }

    #[test]
    fn rows_become_changes() {
        let rows = vec![
            json!({"id": 1, "name": "A", "created_at": 10, "updated_at": 10}),
            json!({"id": 2, "name": "B", "created_at": 10, "updated_at": 25}),
            json!({"name": "no id", "created_at": 1, "updated_at": 1}),
        ];
        let changes = rows_to_changes(Table::Customers, rows);

        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].change_type, ChangeType::New);
        assert_eq!(changes[1].change_type, ChangeType::Modified);
        assert_eq!(changes[1].record_id, 2);
        assert_eq!(changes[1].payload["name"], "B");
    }
}
