#![cfg(not(tarpaulin_include))]

use pcapdash::config::Config;
use pcapdash::sync::{SyncError, sync_results};
use std::process::ExitCode;

/// One-shot result sync, meant to be run from cron or by hand
///
/// Moves whatever plot files the analysis scripts have produced into the
/// record of the user named by the current-user file, then deletes them.
/// Having nothing to do is a normal outcome for a scheduled pass, so the
/// two soft cases exit zero; only infrastructure faults exit nonzero.
fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    env_logger::init();

    let config = Config::from_env();
    match sync_results(&config) {
        Ok(report) => {
            println!(
                "Update result: matched={} slots={:?} deleted={:?}",
                report.matched, report.slots, report.deleted
            );
            ExitCode::SUCCESS
        }
        Err(err @ (SyncError::NoActiveUser(_) | SyncError::NoArtifactsFound(_))) => {
            println!("{}", err);
            ExitCode::SUCCESS
        }
        Err(err) => {
            log::error!("Error updating result content: {}", err);
            ExitCode::FAILURE
        }
    }
}
