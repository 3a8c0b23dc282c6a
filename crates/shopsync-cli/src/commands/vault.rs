use std::path::Path;

use crate::cli::VaultCommands;
use crate::commands::common::{open_service, read_master_password, read_secret_line};
use crate::error::CliError;

pub async fn run_vault(command: VaultCommands, db_path: &Path) -> Result<(), CliError> {
    let service = open_service(db_path).await?;

    match command {
        VaultCommands::Set { change } => {
            let current = if change {
                Some(read_secret_line("Current master password: ")?)
            } else {
                None
            };
            let new_master = read_secret_line("New master password: ")?;
            service
                .set_master_password(current.as_deref(), &new_master)
                .await?;
            println!("Master password saved");
        }
        VaultCommands::Verify => {
            let input = read_master_password("Master password: ")?;
            if service.verify_master_password(&input).await? {
                println!("Master password is correct");
            } else {
                service.shutdown().await;
                return Err(CliError::Command("Master password is incorrect".to_string()));
            }
        }
    }

    service.shutdown().await;
    Ok(())
}
