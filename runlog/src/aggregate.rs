//! Walks a `data/<year>/<MM-name>.md` tree and folds every parsed record into
//! a flat list plus per-month rollups.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};

use crate::table::parse_log;
use crate::{Record, Result, RunlogError};

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct MonthlyAggregate {
    pub total_distance: f64,
    pub total_duration: f64,
    pub count: usize,
    pub hr_sum: u64,
    pub hr_count: usize,
    pub weights: Vec<f64>,
    pub feelings: Vec<u8>,
}

impl MonthlyAggregate {
    fn add(&mut self, record: &Record) {
        self.total_distance += record.distance_km;
        self.total_duration += record.duration_min;
        self.count += 1;
        if let Some(hr) = record.avg_hr {
            self.hr_sum += u64::from(hr);
            self.hr_count += 1;
        }
        if let Some(weight) = record.weight_kg {
            self.weights.push(weight);
        }
        if let Some(feeling) = record.feeling {
            self.feelings.push(feeling);
        }
    }

    pub fn avg_hr(&self) -> Option<f64> {
        if self.hr_count == 0 {
            None
        } else {
            Some(self.hr_sum as f64 / self.hr_count as f64)
        }
    }

    pub fn avg_feeling(&self) -> Option<f64> {
        if self.feelings.is_empty() {
            None
        } else {
            let sum: u32 = self.feelings.iter().map(|&f| u32::from(f)).sum();
            Some(sum as f64 / self.feelings.len() as f64)
        }
    }
}

/// A month file found under the data directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogFile {
    pub month: String,
    pub path: PathBuf,
}

#[derive(Clone, Debug, Default)]
pub struct Dataset {
    /// Records in discovery order (year, then file name, then row).
    pub records: Vec<Record>,
    pub monthly: BTreeMap<String, MonthlyAggregate>,
    pub files_read: usize,
}

impl Dataset {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// `"{year}-{MM}"` where `MM` is the first two characters of the file name.
pub fn month_key(year: &str, file_name: &str) -> String {
    let month: String = file_name.chars().take(2).collect();
    format!("{}-{}", year, month)
}

fn sorted_entries(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir)? {
        match entry {
            Ok(entry) => paths.push(entry.path()),
            Err(err) => warn!("skipping unreadable entry in {}: {}", dir.display(), err),
        }
    }
    paths.sort();
    Ok(paths)
}

/// List every month file below `data_dir`, in year then file-name order.
pub fn discover_log_files(data_dir: &Path) -> Result<Vec<LogFile>> {
    if !data_dir.is_dir() {
        return Err(RunlogError::MissingDataDir(data_dir.to_path_buf()));
    }
    let years = sorted_entries(data_dir).map_err(|source| RunlogError::Io {
        path: data_dir.to_path_buf(),
        source,
    })?;

    let mut files = Vec::new();
    for year_path in years {
        if !year_path.is_dir() {
            continue;
        }
        let Some(year) = year_path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let months = match sorted_entries(&year_path) {
            Ok(months) => months,
            Err(err) => {
                warn!("skipping {}: {}", year_path.display(), err);
                continue;
            }
        };
        for path in months {
            let is_markdown = path.extension().and_then(|e| e.to_str()) == Some("md");
            if !is_markdown || !path.is_file() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            files.push(LogFile {
                month: month_key(year, name),
                path,
            });
        }
    }
    Ok(files)
}

/// Fold per-file record batches into a [`Dataset`].
pub fn aggregate<I>(batches: I) -> Dataset
where
    I: IntoIterator<Item = (String, Vec<Record>)>,
{
    let mut dataset = Dataset::default();
    for (month, records) in batches {
        dataset.files_read += 1;
        if records.is_empty() {
            continue;
        }
        let entry = dataset.monthly.entry(month).or_default();
        for record in &records {
            entry.add(record);
        }
        dataset.records.extend(records);
    }
    dataset
}

/// Read and parse every month file under `data_dir`.
///
/// Files that cannot be read are logged and skipped.
pub fn load_dataset(data_dir: &Path) -> Result<Dataset> {
    let files = discover_log_files(data_dir)?;
    let mut batches = Vec::with_capacity(files.len());
    for file in files {
        match fs::read_to_string(&file.path) {
            Ok(text) => {
                let records = parse_log(&text);
                debug!("{}: {} record(s)", file.path.display(), records.len());
                batches.push((file.month, records));
            }
            Err(err) => warn!("skipping {}: {}", file.path.display(), err),
        }
    }
    Ok(aggregate(batches))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Venue;

    const HEADER: &str = "| 日期 | 距离 | 时长 | 配速 | 平均心率 | 最大心率 | 体重 | 场地 | 感受 | 备注 |\n\
                          |---|---|---|---|---|---|---|---|---|---|\n";

    fn write_month(root: &Path, year: &str, name: &str, rows: &[&str]) {
        let dir = root.join(year);
        fs::create_dir_all(&dir).unwrap();
        let mut text = format!("# {}\n\n{}", name, HEADER);
        for row in rows {
            text.push_str(row);
            text.push('\n');
        }
        fs::write(dir.join(name), text).unwrap();
    }

    fn record(distance: f64, hr: Option<u16>, feeling: Option<u8>) -> Record {
        Record {
            date: "2024-01-01".into(),
            distance_km: distance,
            duration_min: distance * 6.0,
            pace: "6:00".into(),
            avg_hr: hr,
            max_hr: None,
            weight_kg: None,
            venue: Venue::Outdoor,
            feeling,
            note: String::new(),
        }
    }

    #[test]
    fn test_month_key() {
        assert_eq!(month_key("2024", "03-March.md"), "2024-03");
        assert_eq!(month_key("2024", "11月.md"), "2024-11");
    }

    #[test]
    fn test_aggregate_empty() {
        let dataset = aggregate(Vec::new());
        assert!(dataset.is_empty());
        assert!(dataset.monthly.is_empty());
        assert_eq!(dataset.files_read, 0);
    }

    #[test]
    fn test_aggregate_monthly_rollup() {
        let dataset = aggregate(vec![
            (
                "2024-01".to_string(),
                vec![record(5.0, Some(150), Some(8)), record(10.0, None, Some(6))],
            ),
            ("2024-02".to_string(), vec![record(7.5, Some(140), None)]),
            ("2024-01".to_string(), vec![record(2.5, Some(160), None)]),
        ]);

        assert_eq!(dataset.records.len(), 4);
        assert_eq!(dataset.files_read, 3);
        let jan = &dataset.monthly["2024-01"];
        assert_eq!(jan.count, 3);
        assert!((jan.total_distance - 17.5).abs() < 1e-9);
        assert_eq!(jan.avg_hr(), Some(155.0));
        assert_eq!(jan.avg_feeling(), Some(7.0));
        let feb = &dataset.monthly["2024-02"];
        assert_eq!(feb.avg_feeling(), None);
        assert_eq!(feb.hr_count, 1);
    }

    #[test]
    fn test_empty_file_adds_no_month() {
        let dataset = aggregate(vec![("2024-07".to_string(), Vec::new())]);
        assert_eq!(dataset.files_read, 1);
        assert!(dataset.monthly.is_empty());
    }

    #[test]
    fn test_missing_data_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("nope");
        match load_dataset(&missing) {
            Err(RunlogError::MissingDataDir(path)) => assert_eq!(path, missing),
            other => panic!("unexpected result: {:?}", other.map(|d| d.records.len())),
        }
    }

    #[test]
    fn test_load_dataset_walks_years_and_months() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        write_month(
            root,
            "2024",
            "03-March.md",
            &[
                "| 2024-03-02 | 7.0 | 42.00 | 6:00 | 150 | 165 | 80.2 | 户外 | 8 | |",
                "| 2024-03-05 | oops | 31.5 | 6:18 | - | - | - | 跑步机 | - | |",
            ],
        );
        write_month(
            root,
            "2024",
            "04-April.md",
            &["| 2024-04-02 | 5.0 | 30.00 | 6:00 | 148 | 160 | 79.0 | 户外 | 7 | |"],
        );
        write_month(
            root,
            "2023",
            "12-December.md",
            &["| 2023-12-30 | 3.0 | 20.00 | 6:40 | - | - | - | 操场 | - | |"],
        );
        fs::write(root.join("2024").join("plan.txt"), "not a log").unwrap();
        fs::write(root.join("README.md"), "top-level file").unwrap();

        let files = discover_log_files(root).unwrap();
        let months: Vec<&str> = files.iter().map(|f| f.month.as_str()).collect();
        assert_eq!(months, vec!["2023-12", "2024-03", "2024-04"]);

        let dataset = load_dataset(root).unwrap();
        assert_eq!(dataset.files_read, 3);
        assert_eq!(dataset.records.len(), 3);
        assert_eq!(dataset.records[0].date, "2023-12-30");
        assert_eq!(dataset.monthly["2024-03"].count, 1);
        assert_eq!(dataset.monthly["2024-04"].weights, vec![79.0]);
    }

    #[test]
    fn test_unreadable_file_is_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        write_month(
            root,
            "2024",
            "05-May.md",
            &["| 2024-05-02 | 5.0 | 30.00 | 6:00 | - | - | - | 户外 | - | |"],
        );
        fs::write(root.join("2024").join("06-June.md"), [0xff, 0xfe, 0x00]).unwrap();

        let dataset = load_dataset(root).unwrap();
        assert_eq!(dataset.records.len(), 1);
        assert!(!dataset.monthly.contains_key("2024-06"));
    }
}
