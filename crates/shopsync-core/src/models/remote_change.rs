//! Remote-origin change model

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{RecordPayload, Table};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    /// Created remotely; inserted locally only when absent
    New,
    /// Updated remotely; upserted locally by primary key
    Modified,
}

/// A row changed on the remote since the last pull
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteChange {
    pub table_name: Table,
    pub record_id: i64,
    pub change_type: ChangeType,
    /// Bare record JSON of `table_name`
    pub payload: serde_json::Value,
}

impl RemoteChange {
    /// Decode the payload into its typed record.
    pub fn record(&self) -> Result<RecordPayload> {
        RecordPayload::from_value(self.table_name, self.payload.clone())
    }
}
