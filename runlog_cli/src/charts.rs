//! PNG trend charts rendered with plotters.

use std::fs;
use std::panic;
use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{Duration, NaiveDate};
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters_backend::{
    text_anchor, BackendColor, BackendCoord, BackendStyle, BackendTextStyle, DrawingBackend,
    DrawingErrorKind,
};
use runlog::correlation::{linear_fit, pearson, select_samples, Sample};
use runlog::{format_pace, Dataset, Record};

const TREND_SIZE: (u32, u32) = (1600, 800);
const STACKED_SIZE: (u32, u32) = (1600, 1400);

const DISTANCE_COLOR: RGBColor = RGBColor(31, 119, 180);
const PACE_COLOR: RGBColor = RGBColor(255, 140, 0);
const AVG_HR_COLOR: RGBColor = RGBColor(220, 20, 60);
const MAX_HR_COLOR: RGBColor = RGBColor(139, 0, 0);
const WEIGHT_COLOR: RGBColor = RGBColor(34, 139, 34);
const MONTH_DISTANCE_COLOR: RGBColor = RGBColor(70, 130, 180);
const MONTH_COUNT_COLOR: RGBColor = RGBColor(255, 127, 80);
const FEELING_COLOR: RGBColor = RGBColor(128, 0, 128);
const TREND_LINE_COLOR: RGBColor = RGBColor(200, 0, 0);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Chart {
    DistanceTrend,
    PaceTrend,
    HeartRateTrend,
    WeightTrend,
    MonthlySummary,
    FeelingDistribution,
    WeightHrCorrelation,
}

impl Chart {
    /// Charts produced by `visualize`.
    pub const TRENDS: [Chart; 6] = [
        Chart::DistanceTrend,
        Chart::PaceTrend,
        Chart::HeartRateTrend,
        Chart::WeightTrend,
        Chart::MonthlySummary,
        Chart::FeelingDistribution,
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            Chart::DistanceTrend => "distance_trend.png",
            Chart::PaceTrend => "pace_trend.png",
            Chart::HeartRateTrend => "heart_rate_trend.png",
            Chart::WeightTrend => "weight_trend.png",
            Chart::MonthlySummary => "monthly_summary.png",
            Chart::FeelingDistribution => "feeling_distribution.png",
            Chart::WeightHrCorrelation => "weight_hr_correlation.png",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum YFormat {
    Whole,
    OneDecimal,
    Pace,
}

impl YFormat {
    fn label(self, value: f64) -> String {
        match self {
            YFormat::Whole => format!("{:.0}", value),
            YFormat::OneDecimal => format!("{:.1}", value),
            YFormat::Pace => format_pace((value * 60.0).round().max(0.0) as u32),
        }
    }
}

#[derive(Clone, Debug)]
struct Line {
    label: &'static str,
    points: Vec<(f64, f64)>,
    color: RGBColor,
}

#[derive(Clone, Debug)]
struct MonthBar {
    month: String,
    distance: f64,
    count: usize,
}

#[derive(Clone, Debug)]
enum Plot {
    Trend {
        title: &'static str,
        y_desc: &'static str,
        base: NaiveDate,
        lines: Vec<Line>,
        invert_y: bool,
        y_format: YFormat,
    },
    Monthly(Vec<MonthBar>),
    Feeling([usize; 10]),
    Correlation(Vec<Sample>),
}

impl Plot {
    fn size(&self) -> (u32, u32) {
        match self {
            Plot::Monthly(_) | Plot::Correlation(_) => STACKED_SIZE,
            _ => TREND_SIZE,
        }
    }

    fn draw<DB>(&self, root: DrawingArea<DB, Shift>) -> Result<()>
    where
        DB: DrawingBackend,
        DB::ErrorType: 'static,
    {
        match self {
            Plot::Trend {
                title,
                y_desc,
                base,
                lines,
                invert_y,
                y_format,
            } => draw_trend(root, title, y_desc, *base, lines, *invert_y, *y_format),
            Plot::Monthly(bars) => draw_monthly(root, bars),
            Plot::Feeling(counts) => draw_feeling(root, counts),
            Plot::Correlation(samples) => draw_correlation(root, samples),
        }
    }
}

/// Render `chart` into `out_dir`.
///
/// Returns `Ok(None)` without touching the filesystem when the data needed by
/// the chart is absent.
pub fn render_chart(
    chart: Chart,
    dataset: &Dataset,
    out_dir: &Path,
) -> Result<Option<PathBuf>, String> {
    let Some(plot) = prepare(chart, dataset) else {
        return Ok(None);
    };
    fs::create_dir_all(out_dir)
        .map_err(|e| format!("failed to create {}: {}", out_dir.display(), e))?;
    let path = out_dir.join(chart.file_name());

    let render = || -> Result<(), String> {
        let backend = BitMapBackend::new(&path, plot.size());
        let root = FontSafeBackend::new(backend).into_drawing_area();
        plot.draw(root).map_err(|e| format!("plotting error: {}", e))
    };
    panic::catch_unwind(panic::AssertUnwindSafe(render))
        .map_err(|_| "plotting backend panicked".to_string())??;
    Ok(Some(path))
}

fn prepare(chart: Chart, dataset: &Dataset) -> Option<Plot> {
    let records = &dataset.records;
    match chart {
        Chart::DistanceTrend => {
            let (base, points) = dated_points(records, |r| Some(r.distance_km))?;
            Some(Plot::Trend {
                title: "Distance",
                y_desc: "Distance (km)",
                base,
                lines: vec![Line {
                    label: "Distance",
                    points,
                    color: DISTANCE_COLOR,
                }],
                invert_y: false,
                y_format: YFormat::OneDecimal,
            })
        }
        Chart::PaceTrend => {
            let (base, points) =
                dated_points(records, |r| r.pace_seconds().map(|s| f64::from(s) / 60.0))?;
            Some(Plot::Trend {
                title: "Pace",
                y_desc: "Pace (min/km)",
                base,
                lines: vec![Line {
                    label: "Pace",
                    points,
                    color: PACE_COLOR,
                }],
                // Faster is better, so lower paces go up.
                invert_y: true,
                y_format: YFormat::Pace,
            })
        }
        Chart::HeartRateTrend => {
            let (base, avg) = dated_points(records, |r| r.avg_hr.map(f64::from))?;
            let mut lines = vec![Line {
                label: "Average HR",
                points: avg,
                color: AVG_HR_COLOR,
            }];
            let all_have_max = records
                .iter()
                .filter(|r| r.avg_hr.is_some() && r.day().is_some())
                .all(|r| r.max_hr.is_some());
            if all_have_max {
                if let Some((_, max)) = dated_points(records, |r| {
                    r.avg_hr?;
                    r.max_hr.map(f64::from)
                }) {
                    lines.push(Line {
                        label: "Max HR",
                        points: max,
                        color: MAX_HR_COLOR,
                    });
                }
            }
            Some(Plot::Trend {
                title: "Heart rate",
                y_desc: "Heart rate (bpm)",
                base,
                lines,
                invert_y: false,
                y_format: YFormat::Whole,
            })
        }
        Chart::WeightTrend => {
            let (base, points) = dated_points(records, |r| r.weight_kg)?;
            Some(Plot::Trend {
                title: "Weight",
                y_desc: "Weight (kg)",
                base,
                lines: vec![Line {
                    label: "Weight",
                    points,
                    color: WEIGHT_COLOR,
                }],
                invert_y: false,
                y_format: YFormat::OneDecimal,
            })
        }
        Chart::MonthlySummary => {
            if dataset.monthly.is_empty() {
                return None;
            }
            Some(Plot::Monthly(
                dataset
                    .monthly
                    .iter()
                    .map(|(month, agg)| MonthBar {
                        month: month.clone(),
                        distance: agg.total_distance,
                        count: agg.count,
                    })
                    .collect(),
            ))
        }
        Chart::FeelingDistribution => {
            let counts = feeling_counts(records);
            if counts.iter().all(|&c| c == 0) {
                return None;
            }
            Some(Plot::Feeling(counts))
        }
        Chart::WeightHrCorrelation => select_samples(records).ok().map(Plot::Correlation),
    }
}

/// Points keyed by days since the earliest dated record, sorted by date.
/// Records whose date does not parse are left out.
fn dated_points<F>(records: &[Record], value: F) -> Option<(NaiveDate, Vec<(f64, f64)>)>
where
    F: Fn(&Record) -> Option<f64>,
{
    let mut dated: Vec<(NaiveDate, f64)> = records
        .iter()
        .filter_map(|r| Some((r.day()?, value(r)?)))
        .collect();
    dated.sort_by_key(|(day, _)| *day);
    let base = dated.first()?.0;
    let points = dated
        .into_iter()
        .map(|(day, v)| ((day - base).num_days() as f64, v))
        .collect();
    Some((base, points))
}

fn feeling_counts(records: &[Record]) -> [usize; 10] {
    let mut counts = [0usize; 10];
    for score in records.iter().filter_map(|r| r.feeling) {
        if (1..=10).contains(&score) {
            counts[usize::from(score) - 1] += 1;
        }
    }
    counts
}

fn line_style(color: RGBAColor) -> ShapeStyle {
    ShapeStyle {
        color,
        filled: false,
        stroke_width: 2,
    }
}

fn padded_range<I>(values: I, frac: f64, min_pad: f64) -> (f64, f64)
where
    I: IntoIterator<Item = f64>,
{
    let (lo, hi) = values
        .into_iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    if !lo.is_finite() || !hi.is_finite() {
        return (0.0, 1.0);
    }
    let pad = ((hi - lo) * frac).max(min_pad);
    (lo - pad, hi + pad)
}

fn date_label(base: NaiveDate, offset_days: f64) -> String {
    base.checked_add_signed(Duration::days(offset_days.round() as i64))
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

fn draw_trend<DB>(
    root: DrawingArea<DB, Shift>,
    title: &str,
    y_desc: &str,
    base: NaiveDate,
    lines: &[Line],
    invert_y: bool,
    y_format: YFormat,
) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    root.fill(&WHITE)?;
    let sign = if invert_y { -1.0 } else { 1.0 };
    let (x_min, x_max) = padded_range(
        lines.iter().flat_map(|l| l.points.iter().map(|p| p.0)),
        0.02,
        1.0,
    );
    let (y_min, y_max) = padded_range(
        lines
            .iter()
            .flat_map(|l| l.points.iter().map(move |p| sign * p.1)),
        0.08,
        0.5,
    );

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 32))
        .margin(25)
        .set_label_area_size(LabelAreaPosition::Left, 80)
        .set_label_area_size(LabelAreaPosition::Bottom, 60)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)?;

    chart
        .configure_mesh()
        .light_line_style(&BLACK.mix(0.05))
        .x_desc("Date")
        .y_desc(y_desc)
        .x_label_formatter(&|v| date_label(base, *v))
        .y_label_formatter(&|v| y_format.label(sign * *v))
        .draw()?;

    for line in lines {
        let color = line.color;
        let points: Vec<(f64, f64)> = line.points.iter().map(|&(x, y)| (x, sign * y)).collect();
        chart
            .draw_series(LineSeries::new(points.iter().copied(), line_style(color.to_rgba())))?
            .label(line.label)
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 30, y)], color));
        chart.draw_series(points.iter().map(|&p| Circle::new(p, 4, color.filled())))?;
    }

    if lines.len() > 1 {
        chart
            .configure_series_labels()
            .background_style(&WHITE.mix(0.8))
            .border_style(&BLACK.mix(0.3))
            .position(SeriesLabelPosition::UpperLeft)
            .draw()?;
    }

    root.present()?;
    Ok(())
}

fn draw_monthly<DB>(root: DrawingArea<DB, Shift>, bars: &[MonthBar]) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    root.fill(&WHITE)?;
    let (upper, lower) = root.split_vertically(STACKED_SIZE.1 / 2);
    let months: Vec<String> = bars.iter().map(|b| b.month.clone()).collect();
    let n = months.len() as i32;
    let month_label = |v: &SegmentValue<i32>| match v {
        SegmentValue::CenterOf(i) | SegmentValue::Exact(i) => {
            months.get(*i as usize).cloned().unwrap_or_default()
        }
        SegmentValue::Last => String::new(),
    };

    let panels: [(&str, &str, RGBColor, Vec<f64>); 2] = [
        (
            "Monthly distance",
            "Distance (km)",
            MONTH_DISTANCE_COLOR,
            bars.iter().map(|b| b.distance).collect(),
        ),
        (
            "Monthly runs",
            "Runs",
            MONTH_COUNT_COLOR,
            bars.iter().map(|b| b.count as f64).collect(),
        ),
    ];

    for ((title, y_desc, color, values), area) in panels.iter().zip([&upper, &lower]) {
        let y_max = values.iter().copied().fold(0.0, f64::max).max(1.0) * 1.1;
        let mut chart = ChartBuilder::on(area)
            .caption(*title, ("sans-serif", 30))
            .margin(20)
            .set_label_area_size(LabelAreaPosition::Left, 80)
            .set_label_area_size(LabelAreaPosition::Bottom, 60)
            .build_cartesian_2d((0..n).into_segmented(), 0.0..y_max)?;
        chart
            .configure_mesh()
            .disable_x_mesh()
            .light_line_style(&BLACK.mix(0.05))
            .x_labels(months.len())
            .x_label_formatter(&month_label)
            .y_label_formatter(&|v| format!("{:.0}", v))
            .x_desc("Month")
            .y_desc(*y_desc)
            .draw()?;
        chart.draw_series(
            Histogram::vertical(&chart)
                .style(color.mix(0.7).filled())
                .margin(8)
                .data(values.iter().enumerate().map(|(i, &v)| (i as i32, v))),
        )?;
    }

    root.present()?;
    Ok(())
}

fn draw_feeling<DB>(root: DrawingArea<DB, Shift>, counts: &[usize; 10]) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    root.fill(&WHITE)?;
    let y_max = counts.iter().copied().max().unwrap_or(0).max(1) as f64 * 1.15;
    let mut chart = ChartBuilder::on(&root)
        .caption("Feeling scores", ("sans-serif", 32))
        .margin(25)
        .set_label_area_size(LabelAreaPosition::Left, 70)
        .set_label_area_size(LabelAreaPosition::Bottom, 60)
        .build_cartesian_2d((1..11).into_segmented(), 0.0..y_max)?;
    chart
        .configure_mesh()
        .disable_x_mesh()
        .light_line_style(&BLACK.mix(0.05))
        .x_labels(10)
        .x_label_formatter(&|v: &SegmentValue<i32>| match v {
            SegmentValue::CenterOf(i) | SegmentValue::Exact(i) => i.to_string(),
            SegmentValue::Last => String::new(),
        })
        .y_label_formatter(&|v| format!("{:.0}", v))
        .x_desc("Score")
        .y_desc("Runs")
        .draw()?;
    chart.draw_series(
        Histogram::vertical(&chart)
            .style(FEELING_COLOR.mix(0.7).filled())
            .margin(10)
            .data(
                counts
                    .iter()
                    .enumerate()
                    .map(|(i, &c)| (i as i32 + 1, c as f64)),
            ),
    )?;
    root.present()?;
    Ok(())
}

fn draw_correlation<DB>(root: DrawingArea<DB, Shift>, samples: &[Sample]) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    root.fill(&WHITE)?;
    let (upper, lower) = root.split_vertically(STACKED_SIZE.1 / 2);
    let weights: Vec<f64> = samples.iter().map(|s| s.weight_kg).collect();
    let hrs: Vec<f64> = samples.iter().map(|s| f64::from(s.avg_hr)).collect();
    let weight_points: Vec<(f64, f64)> = weights
        .iter()
        .enumerate()
        .map(|(i, &w)| (i as f64, w))
        .collect();
    let hr_points: Vec<(f64, f64)> = hrs.iter().enumerate().map(|(i, &h)| (i as f64, h)).collect();

    let x_range = -0.5..(samples.len() as f64 - 0.5);
    let (w_min, w_max) = padded_range(weights.iter().copied(), 0.1, 0.5);
    let (h_min, h_max) = padded_range(hrs.iter().copied(), 0.1, 2.0);

    let mut chart = ChartBuilder::on(&upper)
        .caption("Weight and heart rate by session", ("sans-serif", 30))
        .margin(20)
        .set_label_area_size(LabelAreaPosition::Left, 80)
        .set_label_area_size(LabelAreaPosition::Right, 80)
        .set_label_area_size(LabelAreaPosition::Bottom, 60)
        .build_cartesian_2d(x_range.clone(), w_min..w_max)?
        .set_secondary_coord(x_range, h_min..h_max);
    chart
        .configure_mesh()
        .light_line_style(&BLACK.mix(0.05))
        .x_labels(samples.len().min(20))
        .x_label_formatter(&|v| format!("{:.0}", v + 1.0))
        .y_label_formatter(&|v| format!("{:.1}", v))
        .x_desc("Session")
        .y_desc("Weight (kg)")
        .draw()?;
    chart
        .configure_secondary_axes()
        .y_label_formatter(&|v| format!("{:.0}", v))
        .y_desc("Heart rate (bpm)")
        .draw()?;
    chart
        .draw_series(LineSeries::new(
            weight_points.iter().copied(),
            line_style(WEIGHT_COLOR.to_rgba()),
        ))?
        .label("Weight")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 30, y)], WEIGHT_COLOR));
    chart.draw_series(
        weight_points
            .iter()
            .map(|&p| Circle::new(p, 5, WEIGHT_COLOR.filled())),
    )?;
    chart
        .draw_secondary_series(LineSeries::new(
            hr_points.iter().copied(),
            line_style(AVG_HR_COLOR.to_rgba()),
        ))?
        .label("Heart rate")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 30, y)], AVG_HR_COLOR));
    chart.draw_secondary_series(
        hr_points
            .iter()
            .map(|&p| Circle::new(p, 5, AVG_HR_COLOR.filled())),
    )?;
    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK.mix(0.3))
        .position(SeriesLabelPosition::UpperRight)
        .draw()?;

    let mut scatter = ChartBuilder::on(&lower)
        .caption("Weight vs heart rate", ("sans-serif", 30))
        .margin(20)
        .set_label_area_size(LabelAreaPosition::Left, 80)
        .set_label_area_size(LabelAreaPosition::Bottom, 60)
        .build_cartesian_2d(w_min..w_max, h_min..h_max)?;
    scatter
        .configure_mesh()
        .light_line_style(&BLACK.mix(0.05))
        .x_label_formatter(&|v| format!("{:.1}", v))
        .y_label_formatter(&|v| format!("{:.0}", v))
        .x_desc("Weight (kg)")
        .y_desc("Heart rate (bpm)")
        .draw()?;
    scatter.draw_series(samples.iter().map(|s| {
        Circle::new(
            (s.weight_kg, f64::from(s.avg_hr)),
            6,
            FEELING_COLOR.mix(0.6).filled(),
        )
    }))?;
    if let Some((slope, intercept)) = linear_fit(&weights, &hrs) {
        let lo = weights.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = weights.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        scatter
            .draw_series(LineSeries::new(
                vec![(lo, slope * lo + intercept), (hi, slope * hi + intercept)],
                line_style(TREND_LINE_COLOR.mix(0.8)),
            ))?
            .label("Trend")
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 30, y)], TREND_LINE_COLOR));
        scatter
            .configure_series_labels()
            .background_style(&WHITE.mix(0.8))
            .border_style(&BLACK.mix(0.3))
            .position(SeriesLabelPosition::UpperRight)
            .draw()?;
    }
    if let Some(r) = pearson(&weights, &hrs) {
        lower.draw(&Text::new(
            format!("r = {:.3}", r),
            (120, 70),
            ("sans-serif", 22),
        ))?;
    }

    root.present()?;
    Ok(())
}

/// Wraps a backend so text still renders, with built-in bitmap glyphs, when
/// the system font stack fails or panics.
struct FontSafeBackend<DB> {
    inner: DB,
}

impl<DB> FontSafeBackend<DB> {
    fn new(inner: DB) -> Self {
        Self { inner }
    }
}

impl<DB: DrawingBackend> DrawingBackend for FontSafeBackend<DB> {
    type ErrorType = DB::ErrorType;

    fn get_size(&self) -> (u32, u32) {
        self.inner.get_size()
    }

    fn ensure_prepared(&mut self) -> Result<(), DrawingErrorKind<Self::ErrorType>> {
        self.inner.ensure_prepared()
    }

    fn present(&mut self) -> Result<(), DrawingErrorKind<Self::ErrorType>> {
        self.inner.present()
    }

    fn draw_pixel(
        &mut self,
        point: BackendCoord,
        color: BackendColor,
    ) -> Result<(), DrawingErrorKind<DB::ErrorType>> {
        self.inner.draw_pixel(point, color)
    }

    fn draw_line<S: BackendStyle>(
        &mut self,
        from: BackendCoord,
        to: BackendCoord,
        style: &S,
    ) -> Result<(), DrawingErrorKind<DB::ErrorType>> {
        self.inner.draw_line(from, to, style)
    }

    fn draw_rect<S: BackendStyle>(
        &mut self,
        upper_left: BackendCoord,
        bottom_right: BackendCoord,
        style: &S,
        fill: bool,
    ) -> Result<(), DrawingErrorKind<DB::ErrorType>> {
        self.inner.draw_rect(upper_left, bottom_right, style, fill)
    }

    fn draw_path<S: BackendStyle, I: IntoIterator<Item = BackendCoord>>(
        &mut self,
        path: I,
        style: &S,
    ) -> Result<(), DrawingErrorKind<DB::ErrorType>> {
        self.inner.draw_path(path, style)
    }

    fn draw_circle<S: BackendStyle>(
        &mut self,
        center: BackendCoord,
        radius: u32,
        style: &S,
        fill: bool,
    ) -> Result<(), DrawingErrorKind<Self::ErrorType>> {
        self.inner.draw_circle(center, radius, style, fill)
    }

    fn blit_bitmap(
        &mut self,
        pos: BackendCoord,
        (iw, ih): (u32, u32),
        src: &[u8],
    ) -> Result<(), DrawingErrorKind<Self::ErrorType>> {
        self.inner.blit_bitmap(pos, (iw, ih), src)
    }

    fn draw_text<TStyle: BackendTextStyle>(
        &mut self,
        text: &str,
        style: &TStyle,
        pos: BackendCoord,
    ) -> Result<(), DrawingErrorKind<Self::ErrorType>> {
        match panic::catch_unwind(panic::AssertUnwindSafe(|| {
            self.inner.draw_text(text, style, pos)
        })) {
            Ok(Err(DrawingErrorKind::FontError(_))) | Err(_) => {
                self.draw_text_fallback(text, style, pos)
            }
            Ok(result) => result,
        }
    }

    fn estimate_text_size<TStyle: BackendTextStyle>(
        &self,
        text: &str,
        style: &TStyle,
    ) -> Result<(u32, u32), DrawingErrorKind<Self::ErrorType>> {
        match panic::catch_unwind(panic::AssertUnwindSafe(|| {
            self.inner.estimate_text_size(text, style)
        })) {
            Ok(Ok(size)) => Ok(size),
            _ => {
                let (w, h) = fallback_text_size(text, fallback_scale(style.size()));
                Ok((w.max(0) as u32, h.max(0) as u32))
            }
        }
    }
}

impl<DB: DrawingBackend> FontSafeBackend<DB> {
    fn draw_text_fallback<TStyle: BackendTextStyle>(
        &mut self,
        text: &str,
        style: &TStyle,
        pos: BackendCoord,
    ) -> Result<(), DrawingErrorKind<DB::ErrorType>> {
        let color = style.color();
        if color.alpha == 0.0 || text.trim().is_empty() {
            return Ok(());
        }

        let scale = fallback_scale(style.size());
        let (width, height) = fallback_text_size(text, scale);
        let dx = match style.anchor().h_pos {
            text_anchor::HPos::Left => 0,
            text_anchor::HPos::Right => -width,
            text_anchor::HPos::Center => -width / 2,
        };
        let dy = match style.anchor().v_pos {
            text_anchor::VPos::Top => 0,
            text_anchor::VPos::Center => -(height / 2),
            text_anchor::VPos::Bottom => -height,
        };

        let mut cursor_x = pos.0 + dx;
        let top_y = pos.1 + dy;
        for ch in text.chars() {
            match fallback_glyph(ch) {
                Some(glyph) => {
                    for (row, pattern) in glyph.rows.iter().enumerate() {
                        for col in 0..glyph.width {
                            if pattern & (1 << (glyph.width - 1 - col)) != 0 {
                                self.draw_scaled_pixel_block(
                                    cursor_x + col as i32 * scale,
                                    top_y + row as i32 * scale,
                                    scale,
                                    color,
                                )?;
                            }
                        }
                    }
                    cursor_x += scale * (glyph.width as i32 + 1);
                }
                None => cursor_x += scale * FALLBACK_SPACE_WIDTH,
            }
        }
        Ok(())
    }

    fn draw_scaled_pixel_block(
        &mut self,
        x: i32,
        y: i32,
        scale: i32,
        color: BackendColor,
    ) -> Result<(), DrawingErrorKind<DB::ErrorType>> {
        for dx in 0..scale {
            for dy in 0..scale {
                self.inner.draw_pixel((x + dx, y + dy), color)?;
            }
        }
        Ok(())
    }
}

const FALLBACK_FONT_HEIGHT: usize = 7;
const FALLBACK_SPACE_WIDTH: i32 = 3;

#[derive(Clone, Copy)]
struct Glyph {
    width: u8,
    rows: [u8; FALLBACK_FONT_HEIGHT],
}

fn fallback_scale(font_size: f64) -> i32 {
    (font_size * 0.75 / FALLBACK_FONT_HEIGHT as f64).round().max(1.0) as i32
}

fn fallback_text_size(text: &str, scale: i32) -> (i32, i32) {
    let width: i32 = text
        .chars()
        .map(|ch| match fallback_glyph(ch) {
            Some(glyph) => glyph.width as i32 + 1,
            None => FALLBACK_SPACE_WIDTH,
        })
        .sum();
    (width * scale, FALLBACK_FONT_HEIGHT as i32 * scale)
}

const GLYPHS: &[(char, u8, [u8; FALLBACK_FONT_HEIGHT])] = &[
    ('A', 5, [0b01110, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001]),
    ('B', 5, [0b11110, 0b10001, 0b10001, 0b11110, 0b10001, 0b10001, 0b11110]),
    ('C', 5, [0b01110, 0b10001, 0b10000, 0b10000, 0b10000, 0b10001, 0b01110]),
    ('D', 5, [0b11100, 0b10010, 0b10001, 0b10001, 0b10001, 0b10010, 0b11100]),
    ('E', 5, [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b11111]),
    ('F', 5, [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000]),
    ('G', 5, [0b01110, 0b10001, 0b10000, 0b10111, 0b10001, 0b10001, 0b01111]),
    ('H', 5, [0b10001, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001]),
    ('I', 3, [0b111, 0b010, 0b010, 0b010, 0b010, 0b010, 0b111]),
    ('J', 5, [0b00111, 0b00010, 0b00010, 0b00010, 0b00010, 0b10010, 0b01100]),
    ('K', 5, [0b10001, 0b10010, 0b10100, 0b11000, 0b10100, 0b10010, 0b10001]),
    ('L', 5, [0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b11111]),
    ('M', 5, [0b10001, 0b11011, 0b10101, 0b10001, 0b10001, 0b10001, 0b10001]),
    ('N', 5, [0b10001, 0b11001, 0b10101, 0b10011, 0b10001, 0b10001, 0b10001]),
    ('O', 5, [0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110]),
    ('P', 5, [0b11110, 0b10001, 0b10001, 0b11110, 0b10000, 0b10000, 0b10000]),
    ('Q', 5, [0b01110, 0b10001, 0b10001, 0b10001, 0b10101, 0b10010, 0b01101]),
    ('R', 5, [0b11110, 0b10001, 0b10001, 0b11110, 0b10100, 0b10010, 0b10001]),
    ('S', 5, [0b01111, 0b10000, 0b10000, 0b01110, 0b00001, 0b00001, 0b11110]),
    ('T', 5, [0b11111, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100]),
    ('U', 5, [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110]),
    ('V', 5, [0b10001, 0b10001, 0b10001, 0b10001, 0b01010, 0b01010, 0b00100]),
    ('W', 5, [0b10001, 0b10001, 0b10001, 0b10001, 0b10101, 0b11011, 0b10001]),
    ('X', 5, [0b10001, 0b10001, 0b01010, 0b00100, 0b01010, 0b10001, 0b10001]),
    ('Y', 5, [0b10001, 0b10001, 0b01010, 0b00100, 0b00100, 0b00100, 0b00100]),
    ('Z', 5, [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b10000, 0b11111]),
    ('0', 5, [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110]),
    ('1', 3, [0b010, 0b110, 0b010, 0b010, 0b010, 0b010, 0b111]),
    ('2', 5, [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111]),
    ('3', 5, [0b11110, 0b00001, 0b00001, 0b00110, 0b00001, 0b00001, 0b11110]),
    ('4', 5, [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010]),
    ('5', 5, [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110]),
    ('6', 5, [0b01110, 0b10001, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110]),
    ('7', 5, [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000]),
    ('8', 5, [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110]),
    ('9', 5, [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b10001, 0b01110]),
    ('-', 3, [0b000, 0b000, 0b000, 0b111, 0b000, 0b000, 0b000]),
    ('+', 3, [0b000, 0b000, 0b010, 0b111, 0b010, 0b000, 0b000]),
    ('=', 3, [0b000, 0b000, 0b111, 0b000, 0b111, 0b000, 0b000]),
    ('/', 3, [0b001, 0b001, 0b010, 0b010, 0b100, 0b100, 0b100]),
    ('(', 3, [0b001, 0b010, 0b100, 0b100, 0b100, 0b010, 0b001]),
    (')', 3, [0b100, 0b010, 0b001, 0b001, 0b001, 0b010, 0b100]),
    (':', 1, [0b0, 0b1, 0b0, 0b0, 0b0, 0b1, 0b0]),
    ('.', 1, [0b0, 0b0, 0b0, 0b0, 0b0, 0b0, 0b1]),
    (',', 2, [0b00, 0b00, 0b00, 0b00, 0b00, 0b01, 0b10]),
    ('%', 5, [0b11001, 0b11010, 0b00010, 0b00100, 0b01000, 0b01011, 0b10011]),
];

fn fallback_glyph(ch: char) -> Option<Glyph> {
    let upper = ch.to_ascii_uppercase();
    GLYPHS
        .iter()
        .find(|(c, _, _)| *c == upper)
        .map(|&(_, width, rows)| Glyph { width, rows })
}

#[cfg(test)]
mod tests {
    use super::*;
    use runlog::{aggregate, Venue};

    fn run(date: &str, hr: Option<u16>, max_hr: Option<u16>, feeling: Option<u8>) -> Record {
        Record {
            date: date.into(),
            distance_km: 5.0,
            duration_min: 30.0,
            pace: "6:00".into(),
            avg_hr: hr,
            max_hr,
            weight_kg: None,
            venue: Venue::Outdoor,
            feeling,
            note: String::new(),
        }
    }

    fn dataset(records: Vec<Record>) -> Dataset {
        aggregate(vec![("2024-03".to_string(), records)])
    }

    #[test]
    fn test_empty_dataset_skips_every_chart() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("output");
        let empty = Dataset::default();
        for chart in Chart::TRENDS.iter().chain([Chart::WeightHrCorrelation].iter()) {
            assert!(prepare(*chart, &empty).is_none());
            assert_eq!(render_chart(*chart, &empty, &out), Ok(None));
        }
        assert!(!out.exists());
    }

    #[test]
    fn test_renders_every_chart_to_png() {
        let mut march = Vec::new();
        let mut april = Vec::new();
        for (i, day) in [2u32, 5, 9, 14].iter().enumerate() {
            let date = format!("2024-03-{:02}", day);
            let mut r = run(&date, Some(150 - i as u16), Some(165), Some(7));
            r.weight_kg = Some(80.2 - i as f64 * 0.3);
            r.pace = format!("6:{:02}", 10 + i);
            march.push(r);
        }
        for (i, day) in [1u32, 8].iter().enumerate() {
            let date = format!("2024-04-{:02}", day);
            let mut r = run(&date, Some(146 - i as u16), Some(160), Some(8));
            r.weight_kg = Some(79.0 - i as f64 * 0.2);
            april.push(r);
        }
        let data = aggregate(vec![
            ("2024-03".to_string(), march),
            ("2024-04".to_string(), april),
        ]);

        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("charts");
        for chart in Chart::TRENDS.iter().chain([Chart::WeightHrCorrelation].iter()) {
            let path = render_chart(*chart, &data, &out).unwrap().unwrap();
            assert_eq!(path, out.join(chart.file_name()));
            let size = fs::metadata(&path).unwrap().len();
            assert!(size > 0, "{} is empty", chart.file_name());
        }
    }

    #[test]
    fn test_charts_skip_absent_fields() {
        let data = dataset(vec![run("2024-03-01", None, None, None)]);
        assert!(prepare(Chart::DistanceTrend, &data).is_some());
        assert!(prepare(Chart::PaceTrend, &data).is_some());
        assert!(prepare(Chart::HeartRateTrend, &data).is_none());
        assert!(prepare(Chart::WeightTrend, &data).is_none());
        assert!(prepare(Chart::FeelingDistribution, &data).is_none());
        assert!(prepare(Chart::MonthlySummary, &data).is_some());
        assert!(prepare(Chart::WeightHrCorrelation, &data).is_none());
    }

    #[test]
    fn test_max_hr_series_needs_every_value() {
        let partial = dataset(vec![
            run("2024-03-01", Some(150), Some(165), None),
            run("2024-03-03", Some(148), None, None),
        ]);
        match prepare(Chart::HeartRateTrend, &partial) {
            Some(Plot::Trend { lines, .. }) => assert_eq!(lines.len(), 1),
            other => panic!("unexpected plot: {:?}", other),
        }

        let full = dataset(vec![
            run("2024-03-01", Some(150), Some(165), None),
            run("2024-03-03", Some(148), Some(160), None),
            run("2024-03-04", None, None, None),
        ]);
        match prepare(Chart::HeartRateTrend, &full) {
            Some(Plot::Trend { lines, .. }) => {
                assert_eq!(lines.len(), 2);
                assert_eq!(lines[1].points, vec![(0.0, 165.0), (2.0, 160.0)]);
            }
            other => panic!("unexpected plot: {:?}", other),
        }
    }

    #[test]
    fn test_dated_points_sort_and_skip_bad_dates() {
        let records = vec![
            run("2024-03-05", None, None, None),
            run("not a date", None, None, None),
            run("2024-03-01", None, None, None),
        ];
        let (base, points) = dated_points(&records, |r| Some(r.distance_km)).unwrap();
        assert_eq!(base, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert_eq!(points, vec![(0.0, 5.0), (4.0, 5.0)]);
        assert_eq!(date_label(base, 4.0), "2024-03-05");
    }

    #[test]
    fn test_feeling_counts() {
        let records = vec![
            run("2024-03-01", None, None, Some(7)),
            run("2024-03-02", None, None, Some(7)),
            run("2024-03-03", None, None, Some(10)),
            run("2024-03-04", None, None, None),
        ];
        let counts = feeling_counts(&records);
        assert_eq!(counts[6], 2);
        assert_eq!(counts[9], 1);
        assert_eq!(counts.iter().sum::<usize>(), 3);
    }

    #[test]
    fn test_padded_range_handles_single_value() {
        assert_eq!(padded_range([5.0], 0.1, 1.0), (4.0, 6.0));
        assert_eq!(padded_range(Vec::<f64>::new(), 0.1, 1.0), (0.0, 1.0));
        let (lo, hi) = padded_range([0.0, 10.0], 0.1, 0.5);
        assert!((lo + 1.0).abs() < 1e-9 && (hi - 11.0).abs() < 1e-9);
    }

    #[test]
    fn test_pace_axis_labels() {
        assert_eq!(YFormat::Pace.label(6.0 + 7.0 / 60.0), "6:07");
        assert_eq!(YFormat::Whole.label(149.6), "150");
    }

    #[test]
    fn test_fallback_glyphs() {
        assert!(fallback_glyph('a').is_some());
        assert!(fallback_glyph('Q').is_some());
        assert!(fallback_glyph('~').is_none());
        assert_eq!(fallback_text_size("AB", 2), (24, 14));
        assert_eq!(Chart::WeightHrCorrelation.file_name(), "weight_hr_correlation.png");
    }
}
