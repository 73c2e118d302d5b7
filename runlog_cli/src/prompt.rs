//! Line-oriented prompts for recording a new run.

use std::io::{BufRead, Write};
use std::str::FromStr;

use anyhow::{Context, Result};
use runlog::plan::{render_plan_comparison, PlanTargets};
use runlog::{compare_plan, format_row, pace_for, Entry, Record, RunlogError, Venue};

const RULE: &str = "============================================================";

pub struct Prompter<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Prompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Print `label` and read one trimmed line. End of input is reported as
    /// [`RunlogError::Cancelled`].
    fn ask(&mut self, label: &str) -> Result<String> {
        write!(self.output, "{}", label)?;
        self.output.flush()?;
        let mut line = String::new();
        let read = self
            .input
            .read_line(&mut line)
            .context("failed to read input")?;
        if read == 0 {
            return Err(RunlogError::Cancelled.into());
        }
        Ok(line.trim().to_string())
    }

    fn ask_required<T: FromStr>(&mut self, label: &str, field: &str) -> Result<T> {
        let answer = self.ask(label)?;
        answer.parse().map_err(|_| not_a_number(field, &answer))
    }

    /// Empty answers and `-` mean "not recorded".
    fn ask_optional<T: FromStr>(&mut self, label: &str, field: &str) -> Result<Option<T>> {
        let answer = self.ask(label)?;
        if answer.is_empty() || answer == "-" {
            return Ok(None);
        }
        answer
            .parse()
            .map(Some)
            .map_err(|_| not_a_number(field, &answer))
    }

    /// Walk through every field of a new run. `today` fills in an empty date.
    pub fn collect_entry(&mut self, today: &str) -> Result<Entry> {
        writeln!(self.output, "{}\nNew running record\n{}\n", RULE, RULE)?;

        let date = self.ask("Date (empty for today): ")?;
        let date = if date.is_empty() { today.to_string() } else { date };

        let distance_km: f64 = self.ask_required("Distance (km): ", "distance")?;
        let duration_min: f64 = self.ask_required("Duration (min): ", "duration")?;
        if let Some(pace) = pace_for(distance_km, duration_min) {
            writeln!(self.output, "Pace: {}", pace)?;
        }

        let avg_hr: Option<u16> = self.ask_optional("Average HR (bpm): ", "average heart rate")?;
        let max_hr: Option<u16> = self.ask_optional("Max HR (bpm): ", "max heart rate")?;
        let weight_kg: Option<f64> = self.ask_optional("Weight (kg): ", "weight")?;

        writeln!(self.output, "\nVenue:")?;
        writeln!(self.output, "1. treadmill")?;
        writeln!(self.output, "2. outdoor")?;
        writeln!(self.output, "3. track")?;
        writeln!(self.output, "4. other")?;
        let venue = Venue::from_menu_choice(&self.ask("Choose venue (1-4): ")?);

        let feeling: Option<u8> = self.ask_optional("Feeling (1-10): ", "feeling")?;
        let note = self.ask("Note: ")?;

        Ok(Entry {
            date,
            distance_km,
            duration_min,
            avg_hr,
            max_hr,
            weight_kg,
            venue,
            feeling,
            note,
        })
    }

    /// Collect an entry, print its table row and compare it with `targets`.
    pub fn run(&mut self, today: &str, targets: &PlanTargets) -> Result<Record> {
        let record = self.collect_entry(today)?.into_record()?;
        let row = format_row(&record);

        writeln!(self.output, "\n{}\nNew row:\n{}\n{}\n", RULE, RULE, row)?;
        let comparison = compare_plan(record.avg_hr, record.pace_seconds(), targets);
        write!(
            self.output,
            "{}",
            render_plan_comparison(&record, &comparison, targets)
        )?;
        writeln!(self.output, "\nAdd this row to the month's log file:\n{}", row)?;
        writeln!(self.output, "\nLog file location: data/YYYY/MM-Month.md")?;
        self.output.flush()?;
        Ok(record)
    }
}

fn not_a_number(field: &str, answer: &str) -> anyhow::Error {
    RunlogError::InvalidInput(format!("{} must be a number, got {:?}", field, answer)).into()
}

/// True when `err` is the end-of-input cancellation.
pub fn is_cancelled(err: &anyhow::Error) -> bool {
    matches!(err.downcast_ref::<RunlogError>(), Some(RunlogError::Cancelled))
}
