//! New-entry construction and the comparison of a run against the training
//! plan's heart-rate and pace targets.

use serde::{Deserialize, Serialize};

use crate::table::is_header_label;
use crate::{format_number, format_pace, pace_for, Record, Result, RunlogError, Venue};

const RULE: &str = "============================================================";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlanTargets {
    pub hr_min: u16,
    pub hr_max: u16,
    /// Fastest acceptable pace, seconds per km.
    pub pace_fast_s: u32,
    /// Slowest acceptable pace, seconds per km.
    pub pace_slow_s: u32,
}

impl Default for PlanTargets {
    fn default() -> Self {
        Self {
            hr_min: 145,
            hr_max: 155,
            pace_fast_s: 6 * 60 + 15,
            pace_slow_s: 6 * 60 + 45,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum HeartRateVerdict {
    Missing,
    OnTarget(u16),
    Below { hr: u16, by: u16 },
    Above { hr: u16, by: u16 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum PaceVerdict {
    Unknown,
    OnTarget,
    TooFast { by: u32 },
    Slow { by: u32 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct PlanComparison {
    pub heart_rate: HeartRateVerdict,
    pub pace: PaceVerdict,
}

pub fn compare_plan(
    avg_hr: Option<u16>,
    pace_seconds: Option<u32>,
    targets: &PlanTargets,
) -> PlanComparison {
    let heart_rate = match avg_hr {
        None => HeartRateVerdict::Missing,
        Some(hr) if hr < targets.hr_min => HeartRateVerdict::Below {
            hr,
            by: targets.hr_min - hr,
        },
        Some(hr) if hr > targets.hr_max => HeartRateVerdict::Above {
            hr,
            by: hr - targets.hr_max,
        },
        Some(hr) => HeartRateVerdict::OnTarget(hr),
    };
    let pace = match pace_seconds {
        None => PaceVerdict::Unknown,
        Some(p) if p < targets.pace_fast_s => PaceVerdict::TooFast {
            by: targets.pace_fast_s - p,
        },
        Some(p) if p > targets.pace_slow_s => PaceVerdict::Slow {
            by: p - targets.pace_slow_s,
        },
        Some(_) => PaceVerdict::OnTarget,
    };
    PlanComparison { heart_rate, pace }
}

/// Field values collected for a new log row.
#[derive(Clone, Debug, Default)]
pub struct Entry {
    pub date: String,
    pub distance_km: f64,
    pub duration_min: f64,
    pub avg_hr: Option<u16>,
    pub max_hr: Option<u16>,
    pub weight_kg: Option<f64>,
    pub venue: Venue,
    pub feeling: Option<u8>,
    pub note: String,
}

impl Entry {
    /// Validate the entry and derive its pace. The resulting record always
    /// renders to a row the table parser reads back unchanged; zero readings
    /// are treated as not recorded.
    pub fn into_record(self) -> Result<Record> {
        let date = self.date.trim().to_string();
        if date.is_empty() || date.contains('|') || is_header_label(&date) {
            return Err(RunlogError::InvalidInput(format!(
                "not a usable date: {:?}",
                self.date
            )));
        }
        if !(self.distance_km.is_finite() && self.distance_km > 0.0) {
            return Err(RunlogError::InvalidInput(format!(
                "distance must be a positive number of km, got {}",
                self.distance_km
            )));
        }
        // Rows carry the duration with two decimals.
        let duration_min = format!("{:.2}", self.duration_min)
            .parse::<f64>()
            .unwrap_or(f64::NAN);
        if !(duration_min.is_finite() && duration_min > 0.0) {
            return Err(RunlogError::InvalidInput(format!(
                "duration must be a positive number of minutes, got {}",
                self.duration_min
            )));
        }
        let weight_kg = match self.weight_kg {
            Some(w) if !w.is_finite() || w < 0.0 => {
                return Err(RunlogError::InvalidInput(format!(
                    "weight must be a finite, non-negative number of kg, got {}",
                    w
                )))
            }
            other => other.filter(|&w| w > 0.0),
        };
        let feeling = self.feeling.filter(|&f| f != 0);
        if let Some(feeling) = feeling {
            if feeling > 10 {
                return Err(RunlogError::InvalidInput(format!(
                    "feeling must be between 1 and 10, got {}",
                    feeling
                )));
            }
        }
        let pace = pace_for(self.distance_km, duration_min).ok_or_else(|| {
            RunlogError::InvalidInput("cannot derive a pace from the distance".into())
        })?;
        Ok(Record {
            date,
            distance_km: self.distance_km,
            duration_min,
            pace,
            avg_hr: self.avg_hr.filter(|&v| v > 0),
            max_hr: self.max_hr.filter(|&v| v > 0),
            weight_kg,
            venue: self.venue,
            feeling,
            note: self.note.trim().replace('|', "/"),
        })
    }
}

pub fn render_plan_comparison(
    record: &Record,
    comparison: &PlanComparison,
    targets: &PlanTargets,
) -> String {
    let mut out = String::new();
    out.push_str(&format!("{}\nPlan comparison\n{}\n\n", RULE, RULE));

    out.push_str("This run:\n");
    out.push_str(&format!("  Distance: {} km\n", format_number(record.distance_km)));
    out.push_str(&format!("  Pace: {}\n", record.pace));
    match record.avg_hr {
        Some(hr) => out.push_str(&format!("  Heart rate: {} bpm\n\n", hr)),
        None => out.push_str("  Heart rate: not recorded\n\n"),
    }

    out.push_str("Plan targets:\n");
    out.push_str(&format!(
        "  Heart rate: {}-{} bpm\n",
        targets.hr_min, targets.hr_max
    ));
    out.push_str(&format!(
        "  Pace: {} - {}\n\n",
        format_pace(targets.pace_fast_s),
        format_pace(targets.pace_slow_s)
    ));

    out.push_str("Result:\n");
    match comparison.heart_rate {
        HeartRateVerdict::OnTarget(hr) => {
            out.push_str(&format!("  OK   heart rate on target: {} bpm\n", hr));
        }
        HeartRateVerdict::Below { hr, by } => {
            out.push_str(&format!("  LOW  heart rate: {} bpm ({} bpm under target)\n", hr, by));
            out.push_str("       You can pick up the pace a little.\n");
        }
        HeartRateVerdict::Above { hr, by } => {
            out.push_str(&format!("  HIGH heart rate: {} bpm ({} bpm over target)\n", hr, by));
            out.push_str("       Slow down next time and keep the heart rate in check.\n");
        }
        HeartRateVerdict::Missing => out.push_str("  --   no heart-rate data recorded\n"),
    }
    match comparison.pace {
        PaceVerdict::OnTarget => {
            out.push_str(&format!("  OK   pace on target: {}\n", record.pace));
        }
        PaceVerdict::TooFast { by } => {
            out.push_str(&format!("  FAST pace: {} ({} s/km too fast)\n", record.pace, by));
            out.push_str("       Ease off; heart-rate control comes first.\n");
        }
        PaceVerdict::Slow { .. } => {
            out.push_str(&format!("  SLOW pace: {}\n", record.pace));
            out.push_str("       A slow pace is fine; heart-rate control matters more.\n");
        }
        PaceVerdict::Unknown => {}
    }
    out.push_str(&format!("\n{}\n", RULE));
    out
}
