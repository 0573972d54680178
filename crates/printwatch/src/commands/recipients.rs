//! Manage the registered-recipient table.

use tabled::Tabled;

use printwatch_core::{EventPreferences, RecipientStore, RegisteredRecipient};

use crate::cli::{AddRecipientArgs, GlobalOpts, RecipientsCommand, RemoveRecipientArgs};
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
struct RecipientRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "PRINTER")]
    printer: String,
    #[tabled(rename = "PUSH TOKEN")]
    token: String,
    #[tabled(rename = "EVENTS")]
    events: String,
    #[tabled(rename = "LIVE ACTIVITY")]
    live_activity: String,
}

pub fn handle(cmd: RecipientsCommand, global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = printwatch_config::load_config_or_default();
    let store = RecipientStore::load(printwatch_config::recipients_path(&cfg))
        .map_err(CliError::from)?;

    match cmd {
        RecipientsCommand::List => list(&store, global),
        RecipientsCommand::Add(args) => add(&store, &args),
        RecipientsCommand::Remove(args) => remove(&store, &args),
    }
}

fn list(store: &RecipientStore, global: &GlobalOpts) -> Result<(), CliError> {
    let all = store.all();
    if all.is_empty() {
        println!("No recipients registered.");
        return Ok(());
    }

    println!("{}", output::render_list(global.output, &all, to_row));
    Ok(())
}

fn add(store: &RecipientStore, args: &AddRecipientArgs) -> Result<(), CliError> {
    let mut recipient = RegisteredRecipient::new(&args.push_token, &args.prefix);
    recipient.preferences = EventPreferences {
        on_start: !args.no_start,
        on_complete: !args.no_complete,
        on_failed: !args.no_failed,
        on_paused: !args.no_paused,
        on_milestone: !args.no_milestone,
    };

    let id = recipient.recipient_id;
    store.register(recipient).map_err(CliError::from)?;
    println!("Registered {id} for '{}'", args.prefix);
    Ok(())
}

fn remove(store: &RecipientStore, args: &RemoveRecipientArgs) -> Result<(), CliError> {
    let removed = store.unregister(&args.prefix).map_err(CliError::from)?;
    if removed == 0 {
        return Err(CliError::PrinterNotFound {
            prefix: args.prefix.clone(),
        });
    }
    println!("Removed {removed} recipient(s) for '{}'", args.prefix);
    Ok(())
}

fn to_row(r: &RegisteredRecipient) -> RecipientRow {
    let mut events = Vec::new();
    if r.preferences.on_start {
        events.push("start");
    }
    if r.preferences.on_complete {
        events.push("complete");
    }
    if r.preferences.on_failed {
        events.push("failed");
    }
    if r.preferences.on_paused {
        events.push("paused");
    }
    if r.preferences.on_milestone {
        events.push("milestone");
    }

    RecipientRow {
        id: r.recipient_id.to_string(),
        printer: r.printer_prefix.clone(),
        token: truncate_token(&r.push_token),
        events: events.join(","),
        live_activity: if r.live_activity_token.is_some() {
            "active".into()
        } else {
            "-".into()
        },
    }
}

/// Device tokens are long hex blobs; show enough to tell them apart.
fn truncate_token(token: &str) -> String {
    if token.len() <= 12 {
        token.to_owned()
    } else {
        format!("{}…", &token[..12])
    }
}
