//! Raw and processed zones on a local filesystem.
//!
//! Layout, relative to the zone root:
//!
//! ```text
//! raw/current/2025-10-19/current_20251019_080000.json
//! raw/forecast/2025-10-19/forecast_20251019_080000.json
//! raw/alerts/2025-10-19/alerts_20251019_080000.json
//! processed/current_weather/2025-10-19/current_weather_20251019_080000.{json,csv}
//! processed/forecast/2025-10-19/forecast_20251019_080000.{json,csv}
//! ```
//!
//! The object-store deployment uses the same keys as prefixes.
//!
//! Empty tables are not written, and a failed run never prunes, so earlier
//! files of the day survive a run that produced nothing.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::{
    model::{ResponseKind, Table},
    pipeline::{RunResult, RunStatus},
};

/// Storage collaborator that receives the output of a run.
pub trait ZoneWriter {
    /// Persist the verbatim source payloads.
    fn write_raw(&self, result: &RunResult) -> Result<WriteReport>;

    /// Persist the normalized tables.
    fn write_processed(&self, result: &RunResult) -> Result<WriteReport>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WriteReport {
    pub written: Vec<PathBuf>,
    /// Older files removed because only the latest run is kept.
    pub deleted: usize,
}

impl WriteReport {
    pub fn merge(mut self, other: WriteReport) -> Self {
        self.written.extend(other.written);
        self.deleted += other.deleted;
        self
    }
}

#[derive(Debug, Clone)]
pub struct LocalZones {
    root: PathBuf,
    keep_latest_only: bool,
}

impl LocalZones {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), keep_latest_only: true }
    }

    pub fn keep_latest_only(mut self, keep: bool) -> Self {
        self.keep_latest_only = keep;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Both zones, raw first.
    pub fn write_all(&self, result: &RunResult) -> Result<WriteReport> {
        Ok(self.write_raw(result)?.merge(self.write_processed(result)?))
    }

    fn dir(&self, zone: &str, table: &str, result: &RunResult) -> Result<PathBuf> {
        let date = result.started_at.format("%Y-%m-%d").to_string();
        let dir = self.root.join(zone).join(table).join(date);
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create zone directory: {}", dir.display()))?;
        Ok(dir)
    }

    /// Delete everything in `dir` that this run did not just write.
    fn prune(&self, dir: &Path, keep: &[PathBuf], result: &RunResult) -> Result<usize> {
        if !self.keep_latest_only {
            return Ok(0);
        }
        if result.status() == RunStatus::Failed {
            tracing::warn!("run failed, keeping earlier files in {}", dir.display());
            return Ok(0);
        }

        let mut deleted = 0;
        let entries = fs::read_dir(dir)
            .with_context(|| format!("Failed to list zone directory: {}", dir.display()))?;
        for entry in entries {
            let path = entry?.path();
            if path.is_file() && !keep.contains(&path) {
                fs::remove_file(&path)
                    .with_context(|| format!("Failed to delete old file: {}", path.display()))?;
                tracing::info!("deleted old file: {}", path.display());
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    fn write_table<T: Table>(&self, rows: &[T], result: &RunResult) -> Result<WriteReport> {
        if rows.is_empty() {
            tracing::info!("no {} rows in this run, nothing written", T::NAME);
            return Ok(WriteReport::default());
        }

        let dir = self.dir("processed", T::NAME, result)?;
        let stem = format!("{}_{}", T::NAME, stamp(result));

        let json_path = dir.join(format!("{stem}.json"));
        write_json(&json_path, rows)?;

        let csv_path = dir.join(format!("{stem}.csv"));
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(&csv_path)
            .with_context(|| format!("Failed to create {}", csv_path.display()))?;
        writer
            .write_record(T::COLUMNS)
            .with_context(|| format!("Failed to write header to {}", csv_path.display()))?;
        for row in rows {
            writer
                .serialize(row)
                .with_context(|| format!("Failed to write row to {}", csv_path.display()))?;
        }
        writer.flush().with_context(|| format!("Failed to flush {}", csv_path.display()))?;

        let written = vec![json_path, csv_path];
        let deleted = self.prune(&dir, &written, result)?;
        Ok(WriteReport { written, deleted })
    }
}

impl ZoneWriter for LocalZones {
    fn write_raw(&self, result: &RunResult) -> Result<WriteReport> {
        let mut report = WriteReport::default();

        for kind in ResponseKind::all() {
            let payloads: Vec<_> = result.raw.iter().filter(|r| r.kind == *kind).collect();
            if payloads.is_empty() {
                continue;
            }

            let dir = self.dir("raw", kind.as_str(), result)?;
            let path = dir.join(format!("{kind}_{}.json", stamp(result)));
            write_json(&path, &payloads)?;

            report.deleted += self.prune(&dir, std::slice::from_ref(&path), result)?;
            report.written.push(path);
        }

        Ok(report)
    }

    fn write_processed(&self, result: &RunResult) -> Result<WriteReport> {
        let current = self.write_table(&result.currents, result)?;
        let forecast = self.write_table(&result.forecasts, result)?;
        Ok(current.merge(forecast))
    }
}

fn stamp(result: &RunResult) -> String {
    result.started_at.format("%Y%m%d_%H%M%S").to_string()
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let body = serde_json::to_vec_pretty(value)
        .with_context(|| format!("Failed to serialize {}", path.display()))?;
    fs::write(path, body).with_context(|| format!("Failed to write {}", path.display()))
}
