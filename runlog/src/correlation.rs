//! Weight / heart-rate / pace correlation over runs that recorded all three.

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::{format_pace, Record, Result, RunlogError};

pub const MIN_SAMPLES: usize = 2;

const RULE: &str = "============================================================";

/// A run with weight, average heart rate and a usable pace.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Sample {
    pub date: String,
    pub weight_kg: f64,
    pub avg_hr: u16,
    pub pace_seconds: u32,
    pub distance_km: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WeightGoal {
    pub target_weight_kg: f64,
    pub target_hr: u16,
}

impl Default for WeightGoal {
    fn default() -> Self {
        Self {
            target_weight_kg: 78.0,
            target_hr: 150,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Strength {
    Strong,
    Moderate,
    Weak,
}

impl Strength {
    pub fn classify(r: f64) -> Self {
        let magnitude = r.abs();
        if magnitude > 0.7 {
            Strength::Strong
        } else if magnitude > 0.4 {
            Strength::Moderate
        } else {
            Strength::Weak
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Strength::Strong => "strong",
            Strength::Moderate => "moderate",
            Strength::Weak => "weak",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Trend {
    Falling,
    Rising,
    Steady,
}

impl Trend {
    fn of(change: f64) -> Self {
        if change < 0.0 {
            Trend::Falling
        } else if change > 0.0 {
            Trend::Rising
        } else {
            Trend::Steady
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Projection {
    /// Heart-rate change per kg, from the first and last sample only.
    pub hr_per_kg: f64,
    pub target_weight_kg: f64,
    pub target_hr: u16,
    /// Only present while the latest weight is above the target.
    pub predicted_hr: Option<f64>,
}

impl Projection {
    pub fn reaches_target(&self) -> Option<bool> {
        self.predicted_hr.map(|hr| hr <= f64::from(self.target_hr))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CorrelationReport {
    pub samples: usize,
    pub weight_first: f64,
    pub weight_last: f64,
    pub weight_change: f64,
    pub hr_first: u16,
    pub hr_last: u16,
    pub hr_change: i32,
    pub pace_first: u32,
    pub pace_last: u32,
    pub pace_change: i64,
    pub weight_hr: Option<f64>,
    pub weight_pace: Option<f64>,
    pub projection: Option<Projection>,
    pub weight_trend: Trend,
    pub hr_trend: Trend,
}

/// Runs carrying weight, heart rate and pace, sorted by date text.
pub fn select_samples(records: &[Record]) -> Result<Vec<Sample>> {
    let mut samples: Vec<Sample> = records
        .iter()
        .filter_map(|r| {
            Some(Sample {
                date: r.date.clone(),
                weight_kg: r.weight_kg?,
                avg_hr: r.avg_hr?,
                pace_seconds: r.pace_seconds()?,
                distance_km: r.distance_km,
            })
        })
        .collect();
    if samples.len() < MIN_SAMPLES {
        return Err(RunlogError::InsufficientData {
            found: samples.len(),
            required: MIN_SAMPLES,
        });
    }
    samples.sort_by(|a, b| a.date.cmp(&b.date));
    Ok(samples)
}

struct Moments {
    x_mean: f64,
    y_mean: f64,
    sxx: f64,
    syy: f64,
    sxy: f64,
}

fn moments(xs: &[f64], ys: &[f64]) -> Option<Moments> {
    if xs.len() != ys.len() || xs.len() < 2 {
        return None;
    }
    let x = Array1::from_vec(xs.to_vec());
    let y = Array1::from_vec(ys.to_vec());
    let x_mean = x.mean()?;
    let y_mean = y.mean()?;
    let dx = &x - x_mean;
    let dy = &y - y_mean;
    Some(Moments {
        x_mean,
        y_mean,
        sxx: dx.dot(&dx),
        syy: dy.dot(&dy),
        sxy: dx.dot(&dy),
    })
}

const ZERO_VARIANCE: f64 = 1e-12;

/// Pearson correlation coefficient; `None` if either series is constant.
pub fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    let m = moments(xs, ys)?;
    if m.sxx < ZERO_VARIANCE || m.syy < ZERO_VARIANCE {
        return None;
    }
    Some((m.sxy / (m.sxx * m.syy).sqrt()).clamp(-1.0, 1.0))
}

/// Least-squares line `y = slope * x + intercept`.
pub fn linear_fit(xs: &[f64], ys: &[f64]) -> Option<(f64, f64)> {
    let m = moments(xs, ys)?;
    if m.sxx < ZERO_VARIANCE {
        return None;
    }
    let slope = m.sxy / m.sxx;
    Some((slope, m.y_mean - slope * m.x_mean))
}

pub fn analyze(samples: &[Sample], goal: &WeightGoal) -> Result<CorrelationReport> {
    let (first, last) = match (samples.first(), samples.last()) {
        (Some(first), Some(last)) if samples.len() >= MIN_SAMPLES => (first, last),
        _ => {
            return Err(RunlogError::InsufficientData {
                found: samples.len(),
                required: MIN_SAMPLES,
            })
        }
    };

    let weights: Vec<f64> = samples.iter().map(|s| s.weight_kg).collect();
    let hrs: Vec<f64> = samples.iter().map(|s| f64::from(s.avg_hr)).collect();
    let paces: Vec<f64> = samples.iter().map(|s| f64::from(s.pace_seconds)).collect();

    let weight_change = last.weight_kg - first.weight_kg;
    let hr_change = i32::from(last.avg_hr) - i32::from(first.avg_hr);
    let pace_change = i64::from(last.pace_seconds) - i64::from(first.pace_seconds);

    let projection = if weight_change != 0.0 {
        let hr_per_kg = f64::from(hr_change) / weight_change;
        let excess = last.weight_kg - goal.target_weight_kg;
        Some(Projection {
            hr_per_kg,
            target_weight_kg: goal.target_weight_kg,
            target_hr: goal.target_hr,
            predicted_hr: (excess > 0.0).then(|| f64::from(last.avg_hr) - hr_per_kg * excess),
        })
    } else {
        None
    };

    Ok(CorrelationReport {
        samples: samples.len(),
        weight_first: first.weight_kg,
        weight_last: last.weight_kg,
        weight_change,
        hr_first: first.avg_hr,
        hr_last: last.avg_hr,
        hr_change,
        pace_first: first.pace_seconds,
        pace_last: last.pace_seconds,
        pace_change,
        weight_hr: pearson(&weights, &hrs),
        weight_pace: pearson(&weights, &paces),
        projection,
        weight_trend: Trend::of(weight_change),
        hr_trend: Trend::of(f64::from(hr_change)),
    })
}

fn describe(out: &mut String, name: &str, r: Option<f64>) {
    match r {
        Some(r) => {
            out.push_str(&format!("Weight vs {} correlation: {:.3}\n", name, r));
            let line = match Strength::classify(r) {
                Strength::Strong => format!("  -> strong: weight clearly affects {}\n", name),
                Strength::Moderate => {
                    format!("  -> moderate: weight has some effect on {}\n", name)
                }
                Strength::Weak => format!("  -> weak: weight has little effect on {}\n", name),
            };
            out.push_str(&line);
        }
        None => out.push_str(&format!(
            "Weight vs {} correlation: n/a (one series is constant)\n",
            name
        )),
    }
}

pub fn render_correlation(report: &CorrelationReport) -> String {
    let mut out = String::new();
    out.push_str(&format!("{}\nWeight / heart rate / pace analysis\n{}\n\n", RULE, RULE));
    out.push_str(&format!("Runs analysed: {}\n\n", report.samples));

    out.push_str("[Weight]\n");
    out.push_str(&format!("Start: {:.1} kg\n", report.weight_first));
    out.push_str(&format!("Current: {:.1} kg\n", report.weight_last));
    out.push_str(&format!("Change: {:+.1} kg\n\n", report.weight_change));

    out.push_str("[Heart rate]\n");
    out.push_str(&format!("Start: {} bpm\n", report.hr_first));
    out.push_str(&format!("Current: {} bpm\n", report.hr_last));
    out.push_str(&format!("Change: {:+} bpm\n\n", report.hr_change));

    out.push_str("[Pace]\n");
    out.push_str(&format!("Start: {}\n", format_pace(report.pace_first)));
    out.push_str(&format!("Current: {}\n", format_pace(report.pace_last)));
    out.push_str(&format!("Change: {:+} s/km\n\n", report.pace_change));

    out.push_str("[Correlation]\n");
    describe(&mut out, "heart rate", report.weight_hr);
    describe(&mut out, "pace", report.weight_pace);
    out.push('\n');

    if let Some(p) = report.projection.as_ref() {
        out.push_str("[Projection]\n");
        out.push_str(&format!("Heart-rate change per kg: {:.1} bpm\n", p.hr_per_kg));
        if let Some(predicted) = p.predicted_hr {
            out.push_str(&format!(
                "Expected heart rate at {} kg: {:.0} bpm\n",
                p.target_weight_kg, predicted
            ));
            if p.reaches_target() == Some(true) {
                out.push_str(&format!("  OK: should reach the {} bpm target\n", p.target_hr));
            } else {
                out.push_str(&format!(
                    "  WARN: {:.0} bpm expected, still above the {} bpm target\n",
                    predicted, p.target_hr
                ));
            }
        }
        out.push('\n');
    }

    out.push_str("[Guidance]\n");
    out.push_str(match report.weight_trend {
        Trend::Falling => "OK: weight is coming down, keep it up\n",
        Trend::Rising => "WARN: weight is going up, review your diet\n",
        Trend::Steady => "-> weight is stable\n",
    });
    out.push_str(match report.hr_trend {
        Trend::Falling => "OK: heart rate is dropping, aerobic fitness is improving\n",
        Trend::Rising => "WARN: heart rate is rising, watch the training load\n",
        Trend::Steady => "-> heart rate is stable\n",
    });
    out.push_str(&format!("\n{}\n", RULE));
    out
}
