pub mod config_cmd;
pub mod history;
pub mod recipients;
pub mod run;
pub mod status;

use crate::cli::GlobalOpts;
use crate::error::CliError;
use printwatch_config::{Config, HubProfile};

/// Pick the hub profile to operate on: `--hub` if given, otherwise the
/// sole configured hub.
pub fn select_hub<'a>(
    cfg: &'a Config,
    global: &GlobalOpts,
) -> Result<(&'a str, &'a HubProfile), CliError> {
    if cfg.hubs.is_empty() {
        return Err(CliError::NoConfig {
            path: printwatch_config::config_path().display().to_string(),
        });
    }

    if let Some(ref name) = global.hub {
        return cfg
            .hubs
            .get_key_value(name.as_str())
            .map(|(k, v)| (k.as_str(), v))
            .ok_or_else(|| CliError::HubNotFound {
                name: name.clone(),
                available: hub_names(cfg),
            });
    }

    if cfg.hubs.len() == 1 {
        let (name, profile) = cfg.hubs.iter().next().expect("len checked");
        return Ok((name.as_str(), profile));
    }

    Err(CliError::Validation {
        field: "--hub".into(),
        reason: format!("several hubs configured, pick one of: {}", hub_names(cfg)),
    })
}

fn hub_names(cfg: &Config) -> String {
    let mut names: Vec<&str> = cfg.hubs.keys().map(String::as_str).collect();
    names.sort_unstable();
    names.join(", ")
}
