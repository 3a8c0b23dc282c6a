use std::path::Path;

use shopsync_core::models::QueueStatus;
use shopsync_core::SyncService;

use crate::cli::{QueueStatusArg, SyncCommands};
use crate::commands::common::{
    format_queue_lines, format_session_lines, format_stats, open_service, print_json,
    unlock_for_sync,
};
use crate::error::CliError;

pub async fn run_sync(command: SyncCommands, as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let service = open_service(db_path).await?;

    match command {
        SyncCommands::Now => {
            unlock_for_sync(&service).await?;
            println!("{}", service.trigger_sync_now().await?);
        }
        SyncCommands::Full => {
            unlock_for_sync(&service).await?;
            println!("{}", service.trigger_full_sync().await?);
        }
        SyncCommands::Truncate => {
            unlock_for_sync(&service).await?;
            println!("{}", service.truncate_and_sync().await?);
        }
        SyncCommands::Stats => {
            let stats = service.get_sync_queue_stats().await?;
            if as_json {
                print_json(&stats)?;
            } else {
                println!("{}", format_stats(&stats));
            }
        }
        SyncCommands::Sessions { limit } => run_sessions(&service, limit, as_json).await?,
        SyncCommands::Queue { status, limit } => {
            run_queue(&service, status, limit, as_json).await?;
        }
        SyncCommands::Retry => {
            let count = service.retry_failed_items().await?;
            println!("{count} failed items returned to pending");
        }
        SyncCommands::Clear {
            older_than_days,
            all,
        } => {
            let count = if all {
                service.clean_sync_data().await?
            } else {
                service.clear_synced_items(older_than_days).await?
            };
            println!("{count} entries removed");
        }
    }

    service.shutdown().await;
    Ok(())
}

async fn run_sessions(service: &SyncService, limit: u32, as_json: bool) -> Result<(), CliError> {
    let sessions = service.get_sync_sessions(limit).await?;
    if as_json {
        return print_json(&sessions);
    }
    if sessions.is_empty() {
        println!("No sync sessions recorded.");
        return Ok(());
    }
    for line in format_session_lines(&sessions) {
        println!("{line}");
    }
    Ok(())
}

async fn run_queue(
    service: &SyncService,
    status: Option<QueueStatusArg>,
    limit: u32,
    as_json: bool,
) -> Result<(), CliError> {
    let status = status.map(|status| status.as_str().parse::<QueueStatus>()).transpose()?;
    let items = service.get_sync_queue_items(status, limit).await?;
    if as_json {
        return print_json(&items);
    }
    if items.is_empty() {
        println!("Queue is empty.");
        return Ok(());
    }
    for line in format_queue_lines(&items) {
        println!("{line}");
    }
    Ok(())
}
