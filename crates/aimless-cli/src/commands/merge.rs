use crate::cli::MergeArgs;
use crate::error::{CliError, Result};
use crate::ui::UiEvent;
use crate::utils::progress::CliProgressHandler;
use aimless::engine::logger::LogPaths;
use aimless::workflows::shoot;
use tokio::sync::mpsc;
use tracing::info;

pub async fn run(args: MergeArgs, ui_sender: mpsc::Sender<UiEvent>) -> Result<()> {
    for prefix in &args.workers {
        let paths = LogPaths::for_prefix(prefix);
        if !paths.csv.exists() {
            return Err(CliError::Argument(format!(
                "No worker log found at {}",
                paths.csv.display()
            )));
        }
    }

    let reporter = CliProgressHandler::new(ui_sender).reporter();
    info!(
        "Merging {} worker log(s) into {:?}",
        args.workers.len(),
        &args.output_prefix
    );
    let total = tokio::task::block_in_place(|| {
        shoot::merge(&args.workers, &args.output_prefix, &reporter)
    })?;

    println!(
        "Merged {} entries into {}",
        total,
        LogPaths::for_prefix(&args.output_prefix).csv.display()
    );
    Ok(())
}
