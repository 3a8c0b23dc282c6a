use std::path::Path;

use crate::commands::common::{open_service, read_master_password, unlock_for_sync};
use crate::error::CliError;

pub async fn run_migrate(
    url: &str,
    anon_key: &str,
    service_key: &str,
    db_path: &Path,
) -> Result<(), CliError> {
    let service = open_service(db_path).await?;
    let master_password = read_master_password("Master password: ")?;

    let result = service
        .migrate_to_new_database(&master_password, url, anon_key, service_key)
        .await;
    service.shutdown().await;
    println!("{}", result?);
    Ok(())
}

pub async fn run_pull(db_path: &Path) -> Result<(), CliError> {
    let service = open_service(db_path).await?;
    unlock_for_sync(&service).await?;

    let result = service.pull_remote_changes().await;
    service.shutdown().await;
    println!("{}", result?);
    Ok(())
}
