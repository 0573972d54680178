//! Query the print-history log.

use tabled::Tabled;

use printwatch_core::{PrintHistory, PrintRecord};

use crate::cli::{GlobalOpts, HistoryArgs};
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
struct HistoryRow {
    #[tabled(rename = "ENDED")]
    ended: String,
    #[tabled(rename = "PRINTER")]
    printer: String,
    #[tabled(rename = "FILE")]
    file: String,
    #[tabled(rename = "OUTCOME")]
    outcome: String,
    #[tabled(rename = "PROGRESS")]
    progress: String,
    #[tabled(rename = "DURATION")]
    duration: String,
}

pub fn handle(args: &HistoryArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = printwatch_config::load_config_or_default();
    let history = PrintHistory::open(printwatch_config::history_path(&cfg));

    let records = history.recent(args.limit, args.prefix.as_deref())?;
    if records.is_empty() {
        println!("No finished prints recorded.");
        return Ok(());
    }

    println!("{}", output::render_list(global.output, &records, to_row));
    Ok(())
}

fn to_row(r: &PrintRecord) -> HistoryRow {
    HistoryRow {
        ended: r.ended_at.format("%Y-%m-%d %H:%M").to_string(),
        printer: r.prefix.clone(),
        file: r.filename.clone().unwrap_or_else(|| "-".into()),
        outcome: crate::output::paint_status(r.outcome),
        progress: format!("{}%", r.progress_at_end),
        duration: r.duration_secs.map_or_else(
            || "-".into(),
            |secs| humantime::format_duration(std::time::Duration::from_secs(secs)).to_string(),
        ),
    }
}
