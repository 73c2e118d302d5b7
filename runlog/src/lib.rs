//! Core running-log library: markdown table parsing, monthly aggregation,
//! reporting and weight/heart-rate correlation.

use std::fmt;
use std::path::PathBuf;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod aggregate;
pub mod correlation;
pub mod plan;
pub mod report;
pub mod table;

pub use aggregate::{
    aggregate, discover_log_files, load_dataset, Dataset, LogFile, MonthlyAggregate,
};
pub use correlation::{CorrelationReport, Sample, Strength, WeightGoal};
pub use plan::{compare_plan, Entry, PlanComparison, PlanTargets};
pub use report::{render_report, Summary};
pub use table::{format_row, parse_log, parse_row, RowError};

#[derive(Error, Debug)]
pub enum RunlogError {
    #[error("data directory not found: {}", .0.display())]
    MissingDataDir(PathBuf),
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("insufficient data: {found} complete record(s), at least {required} required")]
    InsufficientData { found: usize, required: usize },
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("entry cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, RunlogError>;

/// Where a run took place. Log files carry the localized labels; English
/// names are accepted on input.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum Venue {
    Treadmill,
    Outdoor,
    Track,
    #[default]
    Other,
    Custom(String),
}

impl Venue {
    pub fn from_label(label: &str) -> Self {
        let trimmed = label.trim();
        match trimmed {
            "跑步机" => return Venue::Treadmill,
            "户外" => return Venue::Outdoor,
            "操场" => return Venue::Track,
            "其他" => return Venue::Other,
            _ => {}
        }
        match trimmed.to_ascii_lowercase().as_str() {
            "treadmill" => Venue::Treadmill,
            "outdoor" => Venue::Outdoor,
            "track" => Venue::Track,
            "other" => Venue::Other,
            _ => Venue::Custom(trimmed.to_string()),
        }
    }

    /// Label written into log rows.
    pub fn label(&self) -> &str {
        match self {
            Venue::Treadmill => "跑步机",
            Venue::Outdoor => "户外",
            Venue::Track => "操场",
            Venue::Other => "其他",
            Venue::Custom(text) => text,
        }
    }

    /// English name used in reports.
    pub fn name(&self) -> &str {
        match self {
            Venue::Treadmill => "treadmill",
            Venue::Outdoor => "outdoor",
            Venue::Track => "track",
            Venue::Other => "other",
            Venue::Custom(text) => text,
        }
    }

    /// Entry-menu selection; unknown choices fall back to `Other`.
    pub fn from_menu_choice(choice: &str) -> Self {
        match choice.trim() {
            "1" => Venue::Treadmill,
            "2" => Venue::Outdoor,
            "3" => Venue::Track,
            _ => Venue::Other,
        }
    }
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<Venue> for String {
    fn from(value: Venue) -> Self {
        value.label().to_string()
    }
}

impl From<String> for Venue {
    fn from(value: String) -> Self {
        Venue::from_label(&value)
    }
}

/// One logged run, as parsed from a table row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub date: String,
    pub distance_km: f64,
    pub duration_min: f64,
    pub pace: String,
    pub avg_hr: Option<u16>,
    pub max_hr: Option<u16>,
    pub weight_kg: Option<f64>,
    pub venue: Venue,
    pub feeling: Option<u8>,
    pub note: String,
}

impl Record {
    /// Pace in seconds per kilometre; `None` when the pace text is unusable.
    pub fn pace_seconds(&self) -> Option<u32> {
        parse_pace(&self.pace).filter(|&s| s > 0)
    }

    pub fn day(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(self.date.trim(), "%Y-%m-%d").ok()
    }
}

/// Parse `M:SS` into seconds. Extra `:`-separated parts are ignored.
pub fn parse_pace(text: &str) -> Option<u32> {
    let mut parts = text.split(':');
    let minutes: u32 = parts.next()?.trim().parse().ok()?;
    let seconds: u32 = parts.next()?.trim().parse().ok()?;
    minutes.checked_mul(60)?.checked_add(seconds)
}

pub fn format_pace(seconds: u32) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

/// Pace for a run of `distance_km` taking `duration_min`, truncated to whole seconds.
pub fn pace_for(distance_km: f64, duration_min: f64) -> Option<String> {
    if !(distance_km > 0.0) || !duration_min.is_finite() || duration_min < 0.0 {
        return None;
    }
    let pace_minutes = duration_min / distance_km;
    if !pace_minutes.is_finite() {
        return None;
    }
    let minutes = pace_minutes.trunc();
    let seconds = ((pace_minutes - minutes) * 60.0).trunc();
    Some(format!("{}:{:02}", minutes as u64, seconds as u64))
}

/// Shortest decimal text for `value`, keeping one fractional digit on whole
/// numbers (`5.0`, `70.5`).
pub fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{:.1}", value)
    } else {
        format!("{}", value)
    }
}
