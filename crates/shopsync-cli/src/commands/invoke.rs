use std::path::Path;

use serde_json::Value;

use crate::commands::common::{open_service, print_json, unlock_for_sync};
use crate::error::CliError;

/// Commands that reach the remote with the active credentials
const REMOTE_COMMANDS: [&str; 6] = [
    "test_sync_connection",
    "trigger_sync_now",
    "trigger_full_sync",
    "truncate_and_sync",
    "fetch_remote_changes",
    "apply_remote_changes",
];

pub fn parse_invoke_args(raw: Option<&str>) -> Result<Value, CliError> {
    let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return Ok(Value::Null);
    };
    let value: Value =
        serde_json::from_str(raw).map_err(|error| CliError::InvalidArgs(error.to_string()))?;
    if !(value.is_object() || value.is_null()) {
        return Err(CliError::InvalidArgs(
            "arguments must be a JSON object".to_string(),
        ));
    }
    Ok(value)
}

pub async fn run_invoke(command: &str, args: Option<&str>, db_path: &Path) -> Result<(), CliError> {
    let args = parse_invoke_args(args)?;
    let service = open_service(db_path).await?;
    if REMOTE_COMMANDS.contains(&command) {
        unlock_for_sync(&service).await?;
    }

    let result = service.invoke(command, args).await;
    service.shutdown().await;
    print_json(&result.map_err(CliError::Command)?)
}
