//! Inspect or edit configuration.

use dialoguer::Confirm;

use printwatch_config::Config;

use crate::cli::{ConfigCommand, SetTokenArgs};
use crate::error::CliError;

pub fn handle(cmd: ConfigCommand) -> Result<(), CliError> {
    match cmd {
        ConfigCommand::Show => show(),
        ConfigCommand::Path => {
            println!("{}", printwatch_config::config_path().display());
            Ok(())
        }
        ConfigCommand::SetToken(args) => set_token(&args),
    }
}

fn show() -> Result<(), CliError> {
    let mut cfg = printwatch_config::load_config_or_default();
    redact(&mut cfg);

    let rendered = toml::to_string_pretty(&cfg).map_err(|e| CliError::Internal {
        message: format!("failed to render config: {e}"),
    })?;
    println!("{rendered}");
    Ok(())
}

/// Plaintext tokens never hit the terminal.
fn redact(cfg: &mut Config) {
    for profile in cfg.hubs.values_mut() {
        if profile.token.is_some() {
            profile.token = Some("<set>".into());
        }
    }
}

fn set_token(args: &SetTokenArgs) -> Result<(), CliError> {
    let cfg = printwatch_config::load_config_or_default();

    if !cfg.hubs.contains_key(&args.hub) {
        let proceed = Confirm::new()
            .with_prompt(format!(
                "Hub '{}' is not in the config file yet. Store a token for it anyway?",
                args.hub
            ))
            .default(false)
            .interact()
            .map_err(|e| CliError::Internal {
                message: e.to_string(),
            })?;
        if !proceed {
            return Ok(());
        }
    }

    let token = rpassword::prompt_password(format!("Access token for '{}': ", args.hub))?;
    if token.trim().is_empty() {
        return Err(CliError::Validation {
            field: "token".into(),
            reason: "empty token".into(),
        });
    }

    printwatch_config::store_hub_token(&args.hub, token.trim())?;
    println!("Token for '{}' stored in the system keyring.", args.hub);
    Ok(())
}
