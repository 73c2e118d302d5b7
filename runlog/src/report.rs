//! Descriptive statistics over a [`Dataset`] and their text rendering.

use serde::Serialize;

use crate::{format_number, Dataset, Record};

const RECENT_RUNS: usize = 5;
const RULE_WIDTH: usize = 60;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Overall {
    pub count: usize,
    pub total_distance: f64,
    pub total_duration: f64,
    pub avg_distance: f64,
    pub avg_duration: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HeartRateSummary {
    pub samples: usize,
    pub mean_avg_hr: f64,
    /// Highest max-HR among runs with heart-rate data, when any recorded one.
    pub peak_max_hr: Option<u16>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WeightSummary {
    pub latest: f64,
    pub max: f64,
    pub min: f64,
    /// Last minus first weight, in list order.
    pub change: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MonthRow {
    pub month: String,
    pub count: usize,
    pub total_distance: f64,
    pub avg_hr: Option<f64>,
    pub avg_feeling: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Summary {
    pub overall: Option<Overall>,
    pub heart_rate: Option<HeartRateSummary>,
    pub weight: Option<WeightSummary>,
    pub months: Vec<MonthRow>,
    /// Most recent runs first.
    pub recent: Vec<Record>,
}

impl Summary {
    pub fn from_dataset(dataset: &Dataset) -> Self {
        let records = &dataset.records;
        Self {
            overall: overall(records),
            heart_rate: heart_rate(records),
            weight: weight(records),
            months: dataset
                .monthly
                .iter()
                .map(|(month, agg)| MonthRow {
                    month: month.clone(),
                    count: agg.count,
                    total_distance: agg.total_distance,
                    avg_hr: agg.avg_hr(),
                    avg_feeling: agg.avg_feeling(),
                })
                .collect(),
            recent: records.iter().rev().take(RECENT_RUNS).cloned().collect(),
        }
    }
}

fn overall(records: &[Record]) -> Option<Overall> {
    if records.is_empty() {
        return None;
    }
    let count = records.len();
    let total_distance: f64 = records.iter().map(|r| r.distance_km).sum();
    let total_duration: f64 = records.iter().map(|r| r.duration_min).sum();
    Some(Overall {
        count,
        total_distance,
        total_duration,
        avg_distance: total_distance / count as f64,
        avg_duration: total_duration / count as f64,
    })
}

fn heart_rate(records: &[Record]) -> Option<HeartRateSummary> {
    let with_hr: Vec<&Record> = records.iter().filter(|r| r.avg_hr.is_some()).collect();
    if with_hr.is_empty() {
        return None;
    }
    let sum: u64 = with_hr
        .iter()
        .filter_map(|r| r.avg_hr)
        .map(u64::from)
        .sum();
    Some(HeartRateSummary {
        samples: with_hr.len(),
        mean_avg_hr: sum as f64 / with_hr.len() as f64,
        peak_max_hr: with_hr.iter().filter_map(|r| r.max_hr).max(),
    })
}

fn weight(records: &[Record]) -> Option<WeightSummary> {
    let weights: Vec<f64> = records.iter().filter_map(|r| r.weight_kg).collect();
    let (&first, &latest) = (weights.first()?, weights.last()?);
    Some(WeightSummary {
        latest,
        max: weights.iter().copied().fold(f64::MIN, f64::max),
        min: weights.iter().copied().fold(f64::MAX, f64::min),
        change: latest - first,
    })
}

fn rule(ch: char) -> String {
    std::iter::repeat(ch).take(RULE_WIDTH).collect()
}

fn or_dash(value: Option<String>) -> String {
    value.unwrap_or_else(|| "-".into())
}

/// Human-readable report. Sections without data are left out.
pub fn render_report(summary: &Summary) -> String {
    let mut out = String::new();
    out.push_str(&format!("{}\n", rule('=')));
    out.push_str("Running report\n");
    out.push_str(&format!("{}\n\n", rule('=')));

    if let Some(all) = summary.overall.as_ref() {
        out.push_str("[Overall]\n");
        out.push_str(&format!("Runs: {}\n", all.count));
        out.push_str(&format!("Total distance: {:.2} km\n", all.total_distance));
        out.push_str(&format!(
            "Total duration: {:.0} min ({:.1} h)\n",
            all.total_duration,
            all.total_duration / 60.0
        ));
        out.push_str(&format!("Average distance: {:.2} km\n", all.avg_distance));
        out.push_str(&format!("Average duration: {:.0} min\n\n", all.avg_duration));
    }

    if let Some(hr) = summary.heart_rate.as_ref() {
        out.push_str(&format!("Average heart rate: {:.0} bpm\n", hr.mean_avg_hr));
        if let Some(peak) = hr.peak_max_hr {
            out.push_str(&format!("Peak heart rate: {} bpm\n", peak));
        }
        out.push('\n');
    }

    if let Some(w) = summary.weight.as_ref() {
        out.push_str(&format!("Latest weight: {:.1} kg\n", w.latest));
        out.push_str(&format!("Max weight: {:.1} kg\n", w.max));
        out.push_str(&format!("Min weight: {:.1} kg\n", w.min));
        out.push_str(&format!("Weight change: {:+.1} kg\n\n", w.change));
    }

    if !summary.months.is_empty() {
        out.push_str("[Monthly]\n");
        out.push_str(&format!(
            "{:<12} {:>6} {:>14} {:>10} {:>10}\n",
            "Month", "Runs", "Distance (km)", "Avg HR", "Avg feel"
        ));
        out.push_str(&format!("{}\n", rule('-')));
        for row in &summary.months {
            out.push_str(&format!(
                "{:<12} {:>6} {:>14.2} {:>10} {:>10}\n",
                row.month,
                row.count,
                row.total_distance,
                or_dash(row.avg_hr.map(|v| format!("{:.0}", v))),
                or_dash(row.avg_feeling.map(|v| format!("{:.1}", v))),
            ));
        }
        out.push('\n');
    }

    if !summary.recent.is_empty() {
        out.push_str(&format!("[Last {} runs]\n", RECENT_RUNS));
        for r in &summary.recent {
            out.push_str(&format!(
                "{}: {}km, {}, HR {} bpm, feeling {}/10\n",
                r.date,
                format_number(r.distance_km),
                r.pace,
                or_dash(r.avg_hr.map(|v| v.to_string())),
                or_dash(r.feeling.map(|v| v.to_string())),
            ));
        }
        out.push('\n');
    }

    out.push_str(&format!("{}\n", rule('=')));
    out
}
