//! The relay daemon: one monitor per configured hub, until ctrl-c or a
//! terminal hub failure.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info};

use printwatch_api::hub::HubStatus;
use printwatch_api::push::ApnsClient;
use printwatch_core::{CoreError, Monitor, PrintHistory, RecipientStore};

use crate::cli::GlobalOpts;
use crate::error::CliError;

pub async fn handle(global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = printwatch_config::load_config_or_default();
    if cfg.hubs.is_empty() {
        return Err(CliError::NoConfig {
            path: printwatch_config::config_path().display().to_string(),
        });
    }

    let push_config = printwatch_config::push_to_config(&cfg)?;
    let gateway = Arc::new(ApnsClient::new(&push_config).map_err(CoreError::from)?);

    let recipients = Arc::new(RecipientStore::load(printwatch_config::recipients_path(&cfg))?);
    let history_path = printwatch_config::history_path(&cfg);

    // One monitor per hub; they run independently.
    let mut monitors: Vec<Monitor<ApnsClient>> = Vec::new();
    let (term_tx, mut term_rx) = mpsc::channel::<(String, HubStatus)>(4);

    for (name, profile) in &cfg.hubs {
        if global.hub.as_deref().is_some_and(|h| h != name) {
            continue;
        }

        let monitor_config = printwatch_config::hub_to_monitor_config(profile, name)?;
        let monitor = Monitor::new(
            monitor_config,
            Arc::clone(&gateway),
            Arc::clone(&recipients),
            PrintHistory::open(&history_path),
        );

        let status = monitor.connect().await.map_err(|e| match e {
            CoreError::AuthenticationFailed { .. } => CliError::AuthFailed { hub: name.clone() },
            other => other.into(),
        })?;

        watch_for_termination(name.clone(), status, term_tx.clone());
        monitors.push(monitor);
    }
    drop(term_tx);

    if monitors.is_empty() {
        return Err(CliError::HubNotFound {
            name: global.hub.clone().unwrap_or_default(),
            available: cfg.hubs.keys().cloned().collect::<Vec<_>>().join(", "),
        });
    }

    info!(hubs = monitors.len(), "printwatch running");

    let result = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt received, shutting down");
            Ok(())
        }
        Some((hub, status)) = term_rx.recv() => {
            error!(hub = %hub, ?status, "hub terminally unreachable");
            match status {
                HubStatus::AuthFailed => Err(CliError::AuthFailed { hub }),
                _ => Err(CliError::HubTerminated {
                    hub,
                    detail: "reconnect attempts exhausted".into(),
                }),
            }
        }
    };

    for monitor in &monitors {
        monitor.disconnect().await;
    }

    result
}

/// Watch one hub's status stream and report a terminal state.
fn watch_for_termination(
    name: String,
    mut status: tokio::sync::watch::Receiver<HubStatus>,
    term_tx: mpsc::Sender<(String, HubStatus)>,
) {
    tokio::spawn(async move {
        loop {
            let current = status.borrow_and_update().clone();
            if matches!(current, HubStatus::Exhausted | HubStatus::AuthFailed) {
                let _ = term_tx.send((name, current)).await;
                break;
            }
            if status.changed().await.is_err() {
                break;
            }
        }
    });
}
