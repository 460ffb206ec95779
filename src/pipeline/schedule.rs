//! daily cadence, no catch-up: missed days collapse into today's run

use chrono::NaiveDate;
use std::path::Path;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailySchedule {
    start: Option<NaiveDate>, // nothing is due before this
}

impl Default for DailySchedule {
    fn default() -> Self {
        Self::new()
    }
}

impl DailySchedule {
    pub fn new() -> Self {
        Self { start: None }
    }

    pub fn starting(start: NaiveDate) -> Self {
        Self { start: Some(start) }
    }

    /// the run due today, if any. never yields a date before `today`
    pub fn due(&self, last_run: Option<NaiveDate>, today: NaiveDate) -> Option<NaiveDate> {
        if self.start.is_some_and(|start| today < start) {
            return None;
        }
        match last_run {
            Some(last) if last >= today => None,
            _ => Some(today),
        }
    }
}

/// date of the last successful run, `None` if there never was one
pub fn read_last_run(marker: &Path) -> Result<Option<NaiveDate>> {
    let raw = match std::fs::read_to_string(marker) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map(Some)
        .map_err(|e| Error::Config(format!("bad run marker {}: {e}", marker.display())))
}

pub fn record_run(marker: &Path, date: NaiveDate) -> Result<()> {
    if let Some(parent) = marker.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(marker, format!("{}\n", date.format("%Y-%m-%d")))?;
    Ok(())
}
