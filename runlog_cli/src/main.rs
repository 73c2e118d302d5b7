use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::Local;
use clap::{ArgAction, Parser, Subcommand, ValueHint};
use runlog::correlation::{analyze, render_correlation, select_samples, WeightGoal};
use runlog::{
    load_dataset, parse_pace, render_report, Dataset, PlanTargets, Record, RunlogError, Summary,
};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

mod charts;
mod prompt;

use charts::Chart;
use prompt::Prompter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Running log reports, charts and entry", long_about = None)]
struct Cli {
    /// Directory holding `<year>/<MM-Month>.md` log files
    #[arg(long, global = true, default_value = "data", value_hint = ValueHint::DirPath)]
    data_dir: PathBuf,
    /// Enable debug logging
    #[arg(short, long, global = true, action = ArgAction::SetTrue)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print overall, monthly and recent-run statistics
    Analyze(AnalyzeArgs),
    /// Render distance, pace, heart-rate, weight, monthly and feeling charts
    Visualize(VisualizeArgs),
    /// Relate weight changes to heart rate and pace
    Correlate(CorrelateArgs),
    /// Interactively record a run and compare it with the training plan
    Log(LogArgs),
    /// Write every parsed record as CSV
    Export(ExportArgs),
}

#[derive(Parser, Debug)]
struct AnalyzeArgs {
    /// Emit the summary as JSON
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,
}

#[derive(Parser, Debug)]
struct VisualizeArgs {
    /// Directory the PNG files are written to
    #[arg(short, long, default_value = "output", value_hint = ValueHint::DirPath)]
    output_dir: PathBuf,
}

#[derive(Parser, Debug)]
struct CorrelateArgs {
    /// Directory the correlation chart is written to
    #[arg(short, long, default_value = "output", value_hint = ValueHint::DirPath)]
    output_dir: PathBuf,
    /// Goal weight in kg used for the heart-rate projection
    #[arg(long, default_value_t = 78.0)]
    target_weight: f64,
    /// Heart rate (bpm) the projection is compared against
    #[arg(long, default_value_t = 150)]
    target_hr: u16,
    /// Skip the correlation chart
    #[arg(long, action = ArgAction::SetTrue)]
    no_plot: bool,
}

#[derive(Parser, Debug)]
struct LogArgs {
    #[arg(long, default_value_t = 145)]
    hr_min: u16,
    #[arg(long, default_value_t = 155)]
    hr_max: u16,
    /// Fastest planned pace (M:SS per km)
    #[arg(long, default_value = "6:15", value_parser = pace_arg)]
    pace_fast: u32,
    /// Slowest planned pace (M:SS per km)
    #[arg(long, default_value = "6:45", value_parser = pace_arg)]
    pace_slow: u32,
}

#[derive(Parser, Debug)]
struct ExportArgs {
    /// CSV destination; `-` writes to stdout
    #[arg(short, long, default_value = "-", value_hint = ValueHint::FilePath)]
    output: PathBuf,
}

fn pace_arg(text: &str) -> Result<u32, String> {
    parse_pace(text)
        .filter(|&s| s > 0)
        .ok_or_else(|| format!("expected a pace like 6:15, got {:?}", text))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    let data_dir = cli.data_dir;
    match cli.command {
        Command::Analyze(args) => handle_analyze(&data_dir, args),
        Command::Visualize(args) => handle_visualize(&data_dir, args),
        Command::Correlate(args) => handle_correlate(&data_dir, args),
        Command::Log(args) => handle_log(args),
        Command::Export(args) => handle_export(&data_dir, args),
    }
}

/// Load every log under `data_dir`. `Ok(None)` means there is nothing to
/// report and a message has already been printed.
fn load_records(data_dir: &Path) -> Result<Option<Dataset>> {
    let dataset = match load_dataset(data_dir) {
        Ok(dataset) => dataset,
        Err(RunlogError::MissingDataDir(path)) => {
            println!("Data directory not found: {}", path.display());
            return Ok(None);
        }
        Err(err) => {
            return Err(err).with_context(|| format!("failed to load {}", data_dir.display()))
        }
    };
    if dataset.is_empty() {
        println!("No running records found in {}", data_dir.display());
        return Ok(None);
    }
    info!(
        "Loaded {} records from {} files",
        dataset.records.len(),
        dataset.files_read
    );
    Ok(Some(dataset))
}

fn handle_analyze(data_dir: &Path, args: AnalyzeArgs) -> Result<()> {
    let Some(dataset) = load_records(data_dir)? else {
        return Ok(());
    };
    let summary = Summary::from_dataset(&dataset);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print!("{}", render_report(&summary));
    }
    Ok(())
}

fn render_and_report(chart: Chart, dataset: &Dataset, out_dir: &Path) -> bool {
    match charts::render_chart(chart, dataset, out_dir) {
        Ok(Some(path)) => {
            println!("Wrote {}", path.display());
            true
        }
        Ok(None) => {
            debug!("No data for {}; skipped", chart.file_name());
            false
        }
        Err(err) => {
            warn!("Skipping {}: {}", chart.file_name(), err);
            false
        }
    }
}

fn handle_visualize(data_dir: &Path, args: VisualizeArgs) -> Result<()> {
    let Some(dataset) = load_records(data_dir)? else {
        return Ok(());
    };
    println!("Rendering charts for {} runs", dataset.records.len());
    let written = Chart::TRENDS
        .iter()
        .filter(|chart| render_and_report(**chart, &dataset, &args.output_dir))
        .count();
    println!(
        "{} chart(s) written to {}",
        written,
        args.output_dir.display()
    );
    Ok(())
}

fn handle_correlate(data_dir: &Path, args: CorrelateArgs) -> Result<()> {
    let Some(dataset) = load_records(data_dir)? else {
        return Ok(());
    };
    println!("Found {} running records\n", dataset.records.len());

    let samples = match select_samples(&dataset.records) {
        Ok(samples) => samples,
        Err(RunlogError::InsufficientData { found, required }) => {
            println!(
                "Not enough data: {} run(s) with weight, heart rate and pace; at least {} needed.",
                found, required
            );
            println!("Log your weight with each run to track how it affects heart rate and pace.");
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    };

    let goal = WeightGoal {
        target_weight_kg: args.target_weight,
        target_hr: args.target_hr,
    };
    let report = analyze(&samples, &goal)?;
    print!("{}", render_correlation(&report));

    if !args.no_plot {
        render_and_report(Chart::WeightHrCorrelation, &dataset, &args.output_dir);
    }
    Ok(())
}

fn handle_log(args: LogArgs) -> Result<()> {
    if args.hr_min > args.hr_max {
        return Err(anyhow!("--hr-min must not exceed --hr-max"));
    }
    if args.pace_fast > args.pace_slow {
        return Err(anyhow!("--pace-fast must not be slower than --pace-slow"));
    }
    let targets = PlanTargets {
        hr_min: args.hr_min,
        hr_max: args.hr_max,
        pace_fast_s: args.pace_fast,
        pace_slow_s: args.pace_slow,
    };
    let today = Local::now().format("%Y-%m-%d").to_string();

    let result = {
        let stdin = io::stdin();
        let stdout = io::stdout();
        let mut prompter = Prompter::new(stdin.lock(), stdout.lock());
        prompter.run(&today, &targets)
    };
    match result {
        Ok(_) => Ok(()),
        Err(err) if prompt::is_cancelled(&err) => {
            println!("\n\nEntry cancelled");
            Ok(())
        }
        Err(err) => Err(err),
    }
}

fn write_csv<W: Write>(records: &[Record], writer: W) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for record in records {
        csv_writer.serialize(record)?;
    }
    csv_writer.flush()?;
    Ok(())
}

fn handle_export(data_dir: &Path, args: ExportArgs) -> Result<()> {
    let Some(dataset) = load_records(data_dir)? else {
        return Ok(());
    };
    if args.output.as_os_str() == "-" {
        let stdout = io::stdout();
        write_csv(&dataset.records, stdout.lock())?;
    } else {
        let file = File::create(&args.output)
            .with_context(|| format!("failed to create {}", args.output.display()))?;
        write_csv(&dataset.records, file)?;
        info!(
            "Exported {} records to {}",
            dataset.records.len(),
            args.output.display()
        );
    }
    Ok(())
}
