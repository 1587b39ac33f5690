//! # CLI Command Implementations

use crate::api;
use crate::config::{Config, StorageBackend};
use crate::service::AchievementService;
use merit_core::storage::{DETAILS_FILE, REFERENCES_FILE};
use merit_core::{
    ConsistencyChecker, ConsistencyReport, DetailStore, MeritError, ReferenceStore, Status,
    open_data_dir,
};
use serde::Serialize;
use std::collections::BTreeMap;

// =============================================================================
// SERVER COMMAND
// =============================================================================

pub async fn cmd_server(config: &Config, quiet: bool) -> Result<(), MeritError> {
    let service = AchievementService::open(config)?;
    let addr = format!("{}:{}", config.server.host, config.server.port);

    if !quiet {
        println!("Configuration:");
        println!("  Address:  {}", addr);
        println!("  Storage:  {}", config.storage.backend.as_str());
        println!("  Data dir: {}", config.storage.data_dir.display());
        println!(
            "  Budgets:  read {}s, write {}s",
            config.timeouts.read_secs, config.timeouts.write_secs
        );
        println!();
        println!("Press Ctrl+C to stop");
        println!();
    }

    api::run_server(&addr, service, &config.security).await
}

// =============================================================================
// INIT COMMAND
// =============================================================================

/// Create the data directory with empty reference and detail databases.
pub fn cmd_init(config: &Config, force: bool) -> Result<(), MeritError> {
    if config.storage.backend == StorageBackend::Memory {
        println!("Memory storage needs no initialization");
        return Ok(());
    }

    let dir = &config.storage.data_dir;
    let existing: Vec<_> = [REFERENCES_FILE, DETAILS_FILE]
        .into_iter()
        .map(|name| dir.join(name))
        .filter(|path| path.exists())
        .collect();

    if !existing.is_empty() {
        if !force {
            return Err(MeritError::Conflict(format!(
                "data directory {} already initialized. Use --force to overwrite.",
                dir.display()
            )));
        }
        for path in &existing {
            std::fs::remove_file(path).map_err(|e| {
                MeritError::Storage(format!("cannot remove {}: {}", path.display(), e))
            })?;
            tracing::warn!(path = %path.display(), "removed existing database");
        }
    }

    open_data_dir(dir)?;
    println!("Initialized data directory at {}", dir.display());
    Ok(())
}

// =============================================================================
// STATUS COMMAND
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreSummary {
    pub references: usize,
    pub by_status: BTreeMap<Status, usize>,
    pub details: usize,
    pub live_details: usize,
}

impl StoreSummary {
    pub fn collect(
        references: &dyn ReferenceStore,
        details: &dyn DetailStore,
    ) -> Result<Self, MeritError> {
        let mut summary = Self::default();
        for reference in references.scan()? {
            summary.references += 1;
            *summary.by_status.entry(reference.status).or_default() += 1;
        }
        for detail in details.scan()? {
            summary.details += 1;
            if detail.is_live() {
                summary.live_details += 1;
            }
        }
        Ok(summary)
    }
}

pub fn cmd_status(config: &Config, json_mode: bool) -> Result<(), MeritError> {
    let service = open_for_inspection(config)?;
    let workflow = service.workflow();
    let summary = StoreSummary::collect(workflow.references(), workflow.details())?;

    if json_mode {
        print_json(&serde_json::json!({
            "storage": config.storage.backend.as_str(),
            "data_dir": config.storage.data_dir.to_string_lossy(),
            "summary": summary,
        }))?;
        return Ok(());
    }

    println!("Merit Store Status");
    println!("==================");
    println!("Storage:  {}", config.storage.backend.as_str());
    println!("Data dir: {}", config.storage.data_dir.display());
    println!();
    println!("Achievements: {}", summary.references);
    for status in Status::ALL {
        let count = summary.by_status.get(&status).copied().unwrap_or(0);
        println!("  {:<10} {}", status.as_str(), count);
    }
    println!(
        "Details:      {} ({} live)",
        summary.details, summary.live_details
    );
    Ok(())
}

// =============================================================================
// RECONCILE COMMAND
// =============================================================================

/// Print the consistency report. Fails when anything is inconsistent so
/// scripts can alert on the exit code.
pub fn cmd_reconcile(config: &Config, json_mode: bool) -> Result<(), MeritError> {
    let service = open_for_inspection(config)?;
    let workflow = service.workflow();
    let report = ConsistencyChecker::new(workflow.references(), workflow.details()).run()?;

    if json_mode {
        print_json(&report)?;
    } else {
        print_report(&report);
    }

    if report.is_clean() {
        Ok(())
    } else {
        Err(MeritError::Corrupt(format!(
            "{} orphaned details, {} corrupt references, {} ownership mismatches",
            report.orphaned_details.len(),
            report.corrupt_references.len(),
            report.ownership_mismatches.len()
        )))
    }
}

fn print_report(report: &ConsistencyReport) {
    println!("Consistency Report");
    println!("==================");
    println!("References scanned: {}", report.references_scanned);
    println!("Details scanned:    {}", report.details_scanned);
    println!();
    if report.is_clean() {
        println!("No inconsistencies found");
        return;
    }
    for id in &report.orphaned_details {
        println!("orphaned detail     {}", id);
    }
    for corrupt in &report.corrupt_references {
        println!(
            "corrupt reference   {} ({:?}, detail_ref {})",
            corrupt.reference, corrupt.kind, corrupt.detail_ref
        );
    }
    for mismatch in &report.ownership_mismatches {
        println!(
            "ownership mismatch  {} (reference {}, detail {})",
            mismatch.reference, mismatch.reference_student, mismatch.detail_student
        );
    }
}

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Inspection commands never need the directory, so it is left empty.
fn open_for_inspection(config: &Config) -> Result<AchievementService, MeritError> {
    if config.storage.backend == StorageBackend::Memory {
        tracing::warn!("memory storage is empty outside a running server");
    }
    let mut config = config.clone();
    config.directory.path = None;
    AchievementService::open(&config)
}

fn print_json(value: &impl Serialize) -> Result<(), MeritError> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|e| MeritError::Storage(format!("cannot render JSON: {}", e)))?;
    println!("{}", rendered);
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn redb_config(dir: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.storage.backend = StorageBackend::Redb;
        config.storage.data_dir = dir.join("data");
        config
    }

    #[test]
    fn init_refuses_to_overwrite_without_force() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = redb_config(dir.path());

        cmd_init(&config, false).expect("first init");
        assert!(config.storage.data_dir.join(REFERENCES_FILE).exists());
        assert!(config.storage.data_dir.join(DETAILS_FILE).exists());

        let err = cmd_init(&config, false).expect_err("second init");
        assert!(matches!(err, MeritError::Conflict(_)));

        cmd_init(&config, true).expect("forced init");
    }

    #[test]
    fn fresh_store_reconciles_clean() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = redb_config(dir.path());
        cmd_init(&config, false).expect("init");
        cmd_reconcile(&config, true).expect("clean");
        cmd_status(&config, true).expect("status");
    }

    #[test]
    fn empty_memory_store_summarizes_to_zero() {
        let mut config = Config::default();
        config.storage.backend = StorageBackend::Memory;
        let service = AchievementService::open(&config).expect("open");
        let workflow = service.workflow();
        let summary =
            StoreSummary::collect(workflow.references(), workflow.details()).expect("summary");
        assert_eq!(summary, StoreSummary::default());
    }
}
