//! `butler validate` — check an agent config document without starting.

use std::collections::BTreeMap;

use crate::cli::ValidateArgs;
use crate::config;
use crate::error::ButlerError;
use crate::validator;

pub async fn execute(args: &ValidateArgs) -> Result<(), ButlerError> {
    let data = tokio::fs::read(&args.config).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ButlerError::ConfigFileNotFound {
                path: args.config.clone(),
            }
        } else {
            ButlerError::Io(e)
        }
    })?;

    let region = validator::validate(&data, "butler.toml", "butler-config")?;
    let (config, _) = config::load(&region, &args.config.display().to_string(), &BTreeMap::new())?;

    println!("{} is valid", args.config.display());
    println!(
        "  scheduler-interval: {}s, status-file: {}",
        config.globals.scheduler_interval,
        config.globals.status_file.display()
    );
    for manager in &config.managers {
        println!(
            "  {}  -> {} ({} primary, {} additional, {} repos)",
            manager.name,
            manager.dest_path.display(),
            manager.primary_config.len(),
            manager.additional_config.len(),
            manager.repos.len()
        );
    }

    Ok(())
}
