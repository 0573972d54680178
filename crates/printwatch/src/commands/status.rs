//! One-shot snapshot query: connect, fetch all states, print, disconnect.

use tabled::Tabled;
use tokio_util::sync::CancellationToken;

use printwatch_api::hub::HubHandle;
use printwatch_core::{CoreError, DeviceState, StateCache};

use crate::cli::{GlobalOpts, StatusArgs};
use crate::commands::select_hub;
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
struct StatusRow {
    #[tabled(rename = "PRINTER")]
    printer: String,
    #[tabled(rename = "STATUS")]
    status: String,
    #[tabled(rename = "PROGRESS")]
    progress: String,
    #[tabled(rename = "LAYER")]
    layer: String,
    #[tabled(rename = "REMAINING")]
    remaining: String,
    #[tabled(rename = "NOZZLE")]
    nozzle: String,
    #[tabled(rename = "BED")]
    bed: String,
    #[tabled(rename = "FILE")]
    file: String,
}

pub async fn handle(args: &StatusArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = printwatch_config::load_config_or_default();
    let (hub_name, profile) = select_hub(&cfg, global)?;
    let monitor_config = printwatch_config::hub_to_monitor_config(profile, hub_name)?;

    // One-shot session: the auth handshake runs inline, so a bad token
    // fails here instead of spawning a reconnect loop.
    let cancel = CancellationToken::new();
    let handle = HubHandle::connect(
        monitor_config.endpoint,
        monitor_config.access_token,
        monitor_config.reconnect,
        cancel.clone(),
    )
    .await
    .map_err(|e| match e {
        printwatch_api::Error::Authentication { .. } => CliError::AuthFailed {
            hub: hub_name.to_owned(),
        },
        other => CoreError::from(other).into(),
    })?;

    let states = handle
        .request_snapshot()
        .await
        .map_err(CoreError::from)?;
    handle.shutdown();

    let cache = StateCache::new();
    cache.apply_snapshot(&states);

    let mut devices: Vec<std::sync::Arc<DeviceState>> = cache.get_all();
    if let Some(ref prefix) = args.prefix {
        devices.retain(|d| &d.prefix == prefix);
        if devices.is_empty() {
            return Err(CliError::PrinterNotFound {
                prefix: prefix.clone(),
            });
        }
    }

    let owned: Vec<DeviceState> = devices.iter().map(|d| (**d).clone()).collect();
    let names = &monitor_config.printer_names;
    println!(
        "{}",
        output::render_list(global.output, &owned, |d| to_row(d, names))
    );
    Ok(())
}

fn to_row(d: &DeviceState, names: &std::collections::HashMap<String, String>) -> StatusRow {
    let dash = || "-".to_owned();

    StatusRow {
        printer: names.get(&d.prefix).cloned().unwrap_or_else(|| d.prefix.clone()),
        status: crate::output::paint_status(d.status),
        progress: format!("{}%", d.progress_percent),
        layer: match (d.current_layer, d.total_layers) {
            (Some(cur), Some(total)) => format!("{cur}/{total}"),
            (Some(cur), None) => cur.to_string(),
            _ => dash(),
        },
        remaining: d.remaining_secs.map_or_else(dash, |secs| {
            humantime::format_duration(std::time::Duration::from_secs(secs)).to_string()
        }),
        nozzle: d.nozzle_temp.map_or_else(dash, |t| format!("{t:.0}°C")),
        bed: d.bed_temp.map_or_else(dash, |t| format!("{t:.0}°C")),
        file: d.subtask_name.clone().unwrap_or_else(dash),
    }
}
