use clap::{Args, Subcommand};

use crate::config;
use crate::error::ChatError;

#[derive(Debug, Args, Clone)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigSubcommand,
}

#[derive(Debug, Subcommand, Clone)]
enum ConfigSubcommand {
    /// Parse the config file and validate every profile.
    Check {
        #[arg(long)]
        profile: Option<String>,
    },
}

pub fn run(args: ConfigArgs) -> Result<(), ChatError> {
    match args.command {
        ConfigSubcommand::Check { profile } => {
            let path =
                config::validate_config(profile.as_deref()).map_err(ChatError::Configuration)?;
            println!("config OK: {}", path.display());
            Ok(())
        }
    }
}
