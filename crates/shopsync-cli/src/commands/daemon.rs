use std::path::Path;

use crate::commands::common::{open_service, unlock_for_sync};
use crate::error::CliError;

pub async fn run_daemon(db_path: &Path) -> Result<(), CliError> {
    let service = open_service(db_path).await?;
    unlock_for_sync(&service).await?;

    service.start_background_sync().await;
    println!("Background sync running; press Ctrl-C to stop");
    let signal = tokio::signal::ctrl_c().await;

    service.shutdown().await;
    signal?;
    println!("Background sync stopped");
    Ok(())
}
