use std::path::Path;

use crate::cli::ConfigCommands;
use crate::commands::common::{
    format_config, open_service, print_json, unlock_for_sync, unlock_vault,
};
use crate::error::CliError;

pub async fn run_config(
    command: ConfigCommands,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let service = open_service(db_path).await?;
    match command {
        ConfigCommands::Show => {
            let config = service.get_sync_config().await?;
            if as_json {
                print_json(&config)?;
            } else if let Some(config) = config {
                for line in format_config(&config) {
                    println!("{line}");
                }
            } else {
                println!("Sync is not configured.");
            }
        }
        ConfigCommands::Save {
            url,
            anon_key,
            service_key,
        } => {
            // The new key is sealed whenever a master password exists
            if service.has_master_password().await? {
                unlock_vault(&service).await?;
            }
            service
                .save_sync_config(&url, &anon_key, &service_key)
                .await?;
            println!("Sync config saved for {}", url.trim_end_matches('/'));
        }
        ConfigCommands::Interval { seconds } => {
            service.update_sync_interval(seconds).await?;
            println!("Sync interval set to {seconds}s");
        }
        ConfigCommands::Test => {
            unlock_for_sync(&service).await?;
            let status = service.test_sync_connection().await?;
            if as_json {
                print_json(&status)?;
            } else {
                println!("{}", status.message);
            }
        }
        ConfigCommands::Sql => print!("{}", service.get_migration_sql()),
    }

    service.shutdown().await;
    Ok(())
}
