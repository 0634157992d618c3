//! Durable track history: a per-day index plus one CSV file per track.
//!
//! # Layout
//! ```text
//! <root>/<YYYY-MM-DD>_TrackIndex.csv                  one row per track
//! <root>/<YYYY-MM-DD>_targets_tracked/T<n>_<HHMMSS>.csv   one row per observation
//! ```
//!
//! Track files are append-only and flushed after every row. The index gets a
//! provisional row when a track is born and that row is rewritten in place
//! when the track expires (the whole index is rewritten; track counts per day
//! are small).
//!
//! The read path ([`load_track_history`]) accepts any file with the track row
//! shape, with or without a header, and expresses every row relative to the
//! first row's timestamp.

use crate::types::TrackId;
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

pub const INDEX_HEADER: [&str; 5] = [
    "first_seen_iso",
    "serial",
    "last_seen_iso",
    "duration",
    "verbose_file",
];

pub const TRACK_HEADER: [&str; 7] = [
    "timestamp_iso",
    "x_mm",
    "y_mm",
    "range_mm",
    "speed_mm_s",
    "accel_mm_s2",
    "raw_hex",
];

/// Index timestamps are kept to whole seconds.
const INDEX_TIME_FMT: &str = "%Y-%m-%dT%H:%M:%S";
const ROW_TIME_FMT: &str = "%Y-%m-%dT%H:%M:%S%.3f";
/// Numeric timestamps above this are taken to be milliseconds.
const MILLIS_THRESHOLD: f64 = 1e11;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("i/o error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("csv error in {}: {source}", .path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("{} is empty", .0.display())]
    Empty(PathBuf),
    #[error("{} holds only a header row", .0.display())]
    HeaderOnly(PathBuf),
    #[error("{}:{line}: unparsable timestamp {value:?}", .path.display())]
    BadTimestamp {
        path: PathBuf,
        line: usize,
        value: String,
    },
    #[error("{}:{line}: bad {column} value {value:?}", .path.display())]
    BadField {
        path: PathBuf,
        line: usize,
        column: &'static str,
        value: String,
    },
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> HistoryError + '_ {
    move |source| HistoryError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn csv_err(path: &Path) -> impl FnOnce(csv::Error) -> HistoryError + '_ {
    move |source| HistoryError::Csv {
        path: path.to_path_buf(),
        source,
    }
}

// ---------------------------------------------------------------------------
// Index
// ---------------------------------------------------------------------------

/// One row of the per-day track index.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRecord {
    #[serde(rename = "first_seen_iso")]
    pub first_seen: String,
    pub serial: String,
    #[serde(rename = "last_seen_iso")]
    pub last_seen: String,
    /// `HH:MM:SS`
    pub duration: String,
    /// File name inside the day directory
    #[serde(rename = "verbose_file")]
    pub history_file: String,
}

impl IndexRecord {
    /// Row written at track birth: last seen = first seen, zero duration.
    pub fn provisional(id: TrackId, first_seen: DateTime<Local>, history_file: &str) -> Self {
        let first = first_seen.format(INDEX_TIME_FMT).to_string();
        Self {
            last_seen: first.clone(),
            first_seen: first,
            serial: id.to_string(),
            duration: format_duration(0),
            history_file: history_file.to_owned(),
        }
    }

    /// Fill in last seen and the whole-second duration since first seen.
    pub fn finalize(&mut self, last_seen: DateTime<Local>) {
        self.last_seen = last_seen.format(INDEX_TIME_FMT).to_string();
        let secs = match (parse_index_time(&self.first_seen), parse_index_time(&self.last_seen)) {
            (Some(first), Some(last)) => (last - first).num_seconds().max(0),
            _ => 0,
        };
        self.duration = format_duration(secs);
    }

    pub fn track_id(&self) -> Option<TrackId> {
        TrackId::parse(&self.serial)
    }

    pub fn duration_secs(&self) -> Option<i64> {
        let mut parts = self.duration.split(':').map(|p| p.parse::<i64>().ok());
        let (h, m, s) = (parts.next()??, parts.next()??, parts.next()??);
        Some(h * 3600 + m * 60 + s)
    }

    fn matches(&self, id: TrackId, first_seen: DateTime<Local>) -> bool {
        self.serial == id.to_string()
            && self.first_seen == first_seen.format(INDEX_TIME_FMT).to_string()
    }
}

fn parse_index_time(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, INDEX_TIME_FMT).ok()
}

fn format_duration(secs: i64) -> String {
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Filesystem layout for one day of tracking.
#[derive(Clone, Debug)]
pub struct HistoryStore {
    day: NaiveDate,
    day_dir: PathBuf,
    index_path: PathBuf,
}

impl HistoryStore {
    /// Open (creating if needed) the store for `day` under `root`.
    pub fn open(root: impl AsRef<Path>, day: NaiveDate) -> Result<Self, HistoryError> {
        let root = root.as_ref();
        let stamp = day.format("%Y-%m-%d");
        let day_dir = root.join(format!("{stamp}_targets_tracked"));
        fs::create_dir_all(&day_dir).map_err(io_err(&day_dir))?;

        let index_path = root.join(format!("{stamp}_TrackIndex.csv"));
        if !index_path.exists() {
            let mut wtr = csv::Writer::from_path(&index_path).map_err(csv_err(&index_path))?;
            wtr.write_record(INDEX_HEADER)
                .map_err(csv_err(&index_path))?;
            wtr.flush().map_err(io_err(&index_path))?;
            debug!(path = %index_path.display(), "created track index");
        }

        Ok(Self {
            day,
            day_dir,
            index_path,
        })
    }

    pub fn day(&self) -> NaiveDate {
        self.day
    }

    pub fn day_dir(&self) -> &Path {
        &self.day_dir
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    /// Highest serial recorded in the index, or 0 when the index is missing,
    /// unreadable or corrupt. A corrupt index can therefore lead to serial
    /// reuse.
    pub fn max_serial(&self) -> u64 {
        self.scan_max_serial().unwrap_or_else(|e| {
            warn!(error = %e, "track index unreadable, restarting serials at 1");
            0
        })
    }

    fn scan_max_serial(&self) -> Result<u64, HistoryError> {
        let mut max = 0;
        for (i, record) in self.read_index()?.iter().enumerate() {
            if !record.serial.starts_with('T') {
                continue;
            }
            let id = record.track_id().ok_or_else(|| HistoryError::BadField {
                path: self.index_path.clone(),
                line: i + 2,
                column: "serial",
                value: record.serial.clone(),
            })?;
            max = max.max(id.0);
        }
        Ok(max)
    }

    pub fn read_index(&self) -> Result<Vec<IndexRecord>, HistoryError> {
        let path = &self.index_path;
        let mut rdr = csv::Reader::from_path(path).map_err(csv_err(path))?;
        rdr.deserialize()
            .collect::<Result<Vec<IndexRecord>, _>>()
            .map_err(csv_err(path))
    }

    /// Create the history file for a newly born track and write its header.
    pub fn create_track_log(
        &self,
        id: TrackId,
        first_seen: DateTime<Local>,
    ) -> Result<TrackLog, HistoryError> {
        let file_name = format!("{id}_{}.csv", first_seen.format("%H%M%S"));
        let path = self.day_dir.join(&file_name);
        let file = File::create(&path).map_err(io_err(&path))?;
        let mut writer = csv::Writer::from_writer(file);
        writer.write_record(TRACK_HEADER).map_err(csv_err(&path))?;
        writer.flush().map_err(io_err(&path))?;
        Ok(TrackLog {
            path,
            file_name,
            writer,
        })
    }

    pub fn append_index(&self, record: &IndexRecord) -> Result<(), HistoryError> {
        let path = &self.index_path;
        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(path)
            .map_err(io_err(path))?;
        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        wtr.serialize(record).map_err(csv_err(path))?;
        wtr.flush().map_err(io_err(path))
    }

    /// Rewrite the provisional row of a track with its final last-seen time
    /// and duration. Returns `false` when no matching row exists. The index
    /// keeps its row count.
    pub fn finalize_index(
        &self,
        id: TrackId,
        first_seen: DateTime<Local>,
        last_seen: DateTime<Local>,
    ) -> Result<bool, HistoryError> {
        let mut records = self.read_index()?;
        let Some(record) = records.iter_mut().find(|r| r.matches(id, first_seen)) else {
            return Ok(false);
        };
        record.finalize(last_seen);
        self.rewrite_index(&records)?;
        Ok(true)
    }

    fn rewrite_index(&self, records: &[IndexRecord]) -> Result<(), HistoryError> {
        let tmp = self.index_path.with_extension("csv.tmp");
        {
            let mut wtr = csv::WriterBuilder::new()
                .has_headers(false)
                .from_path(&tmp)
                .map_err(csv_err(&tmp))?;
            wtr.write_record(INDEX_HEADER).map_err(csv_err(&tmp))?;
            for record in records {
                wtr.serialize(record).map_err(csv_err(&tmp))?;
            }
            wtr.flush().map_err(io_err(&tmp))?;
        }
        fs::rename(&tmp, &self.index_path).map_err(io_err(&self.index_path))
    }

    /// History files referenced by the index that still exist, newest first.
    pub fn recent_recordings(&self, limit: usize) -> Vec<PathBuf> {
        let records = match self.read_index() {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "cannot list recent recordings");
                return Vec::new();
            }
        };
        records
            .iter()
            .rev()
            .map(|r| self.day_dir.join(&r.history_file))
            .filter(|p| p.is_file())
            .take(limit)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Per-track log
// ---------------------------------------------------------------------------

/// One observation as persisted in a track file.
#[derive(Clone, Debug)]
pub struct HistoryRow<'a> {
    pub timestamp: DateTime<Local>,
    pub x_mm: i32,
    pub y_mm: i32,
    pub range_mm: f64,
    pub speed_mm_s: f64,
    pub accel_mm_s2: f64,
    pub raw_hex: &'a str,
}

impl HistoryRow<'_> {
    fn to_record(&self) -> [String; 7] {
        [
            self.timestamp.format(ROW_TIME_FMT).to_string(),
            self.x_mm.to_string(),
            self.y_mm.to_string(),
            (self.range_mm.trunc() as i64).to_string(),
            format!("{:.3}", self.speed_mm_s),
            format!("{:.3}", self.accel_mm_s2),
            self.raw_hex.to_owned(),
        ]
    }
}

/// Open, append-only history file owned by a live track.
#[derive(Debug)]
pub struct TrackLog {
    path: PathBuf,
    file_name: String,
    writer: csv::Writer<File>,
}

impl TrackLog {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name relative to the day directory (as referenced by the index).
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Append one row and flush it to the file.
    pub fn append(&mut self, row: &HistoryRow<'_>) -> Result<(), HistoryError> {
        self.writer
            .write_record(&row.to_record())
            .map_err(csv_err(&self.path))?;
        self.writer.flush().map_err(io_err(&self.path))
    }

    /// Flush and close the file.
    pub fn close(mut self) -> Result<PathBuf, HistoryError> {
        self.writer.flush().map_err(io_err(&self.path))?;
        Ok(self.path)
    }
}

// ---------------------------------------------------------------------------
// Read path
// ---------------------------------------------------------------------------

/// One persisted row, timed relative to the first row of its file.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedSample {
    /// Seconds since the first row
    pub t_rel: f64,
    pub x_mm: f64,
    pub y_mm: f64,
    pub range_mm: Option<f64>,
    pub speed_mm_s: Option<f64>,
    pub accel_mm_s2: Option<f64>,
    pub raw_hex: Option<String>,
}

/// Parse a timestamp cell into epoch seconds.
///
/// ISO-8601 (with or without offset) is converted directly; plain numbers are
/// epoch seconds, or milliseconds when larger than 1e11.
pub fn parse_timestamp(raw: &str) -> Option<f64> {
    let s = raw.trim();
    if s.contains('T') {
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Some(dt.timestamp_micros() as f64 / 1e6);
        }
        return NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|dt| dt.and_utc().timestamp_micros() as f64 / 1e6);
    }
    let value: f64 = s.parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    Some(if value > MILLIS_THRESHOLD {
        value / 1000.0
    } else {
        value
    })
}

/// Timestamp of a row and the column where its data fields start. The
/// timestamp normally sits in column 0; rows with a leading label column
/// carry it in column 1.
fn row_time(record: &csv::StringRecord) -> Option<(f64, usize)> {
    if let Some(t) = record.get(0).and_then(parse_timestamp) {
        return Some((t, 1));
    }
    record.get(1).and_then(parse_timestamp).map(|t| (t, 2))
}

fn optional_number(record: &csv::StringRecord, col: usize) -> Option<f64> {
    record
        .get(col)
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse().ok())
}

fn required_number(
    record: &csv::StringRecord,
    col: usize,
    column: &'static str,
    path: &Path,
    line: usize,
) -> Result<f64, HistoryError> {
    let raw = record.get(col).unwrap_or("");
    raw.parse().map_err(|_| HistoryError::BadField {
        path: path.to_path_buf(),
        line,
        column,
        value: raw.to_owned(),
    })
}

/// Load a per-track history file for replay.
pub fn load_track_history(path: &Path) -> Result<Vec<RecordedSample>, HistoryError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(csv_err(path))?;

    let rows: Vec<csv::StringRecord> = rdr
        .records()
        .filter(|r| !matches!(r, Ok(rec) if rec.iter().all(str::is_empty)))
        .collect::<Result<_, _>>()
        .map_err(csv_err(path))?;

    let Some(first) = rows.first() else {
        return Err(HistoryError::Empty(path.to_path_buf()));
    };
    let skip = usize::from(row_time(first).is_none());
    if rows.len() == skip {
        return Err(HistoryError::HeaderOnly(path.to_path_buf()));
    }

    let mut t0 = None;
    let mut samples = Vec::with_capacity(rows.len() - skip);
    for (i, record) in rows.iter().enumerate().skip(skip) {
        let line = i + 1;
        let (t, col) = row_time(record).ok_or_else(|| HistoryError::BadTimestamp {
            path: path.to_path_buf(),
            line,
            value: record.get(0).unwrap_or("").to_owned(),
        })?;
        let t0 = *t0.get_or_insert(t);

        samples.push(RecordedSample {
            t_rel: t - t0,
            x_mm: required_number(record, col, "x_mm", path, line)?,
            y_mm: required_number(record, col + 1, "y_mm", path, line)?,
            range_mm: optional_number(record, col + 2),
            speed_mm_s: optional_number(record, col + 3),
            accel_mm_s2: optional_number(record, col + 4),
            raw_hex: record
                .get(col + 5)
                .filter(|s| !s.is_empty())
                .map(str::to_owned),
        });
    }

    debug!(path = %path.display(), rows = samples.len(), "loaded track history");
    Ok(samples)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveTime, TimeZone};

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    fn at(h: u32, m: u32, s: u32, ms: u32) -> DateTime<Local> {
        let t = NaiveTime::from_hms_milli_opt(h, m, s, ms).unwrap();
        Local.from_local_datetime(&day().and_time(t)).unwrap()
    }

    fn write(path: &Path, text: &str) {
        fs::write(path, text).unwrap();
    }

    #[test]
    fn open_creates_layout_and_header() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::open(dir.path(), day()).unwrap();
        assert!(store.day_dir().ends_with("2024-06-01_targets_tracked"));
        assert!(store.day_dir().is_dir());
        let text = fs::read_to_string(store.index_path()).unwrap();
        assert_eq!(text.trim(), INDEX_HEADER.join(","));
        assert_eq!(store.max_serial(), 0);
    }

    #[test]
    fn max_serial_scans_existing_rows() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::open(dir.path(), day()).unwrap();
        for (n, secs) in [(3, 1), (11, 2), (7, 3)] {
            let rec = IndexRecord::provisional(TrackId(n), at(10, 0, secs, 0), "f.csv");
            store.append_index(&rec).unwrap();
        }
        assert_eq!(store.max_serial(), 11);

        // Reopening the same day keeps the index.
        let reopened = HistoryStore::open(dir.path(), day()).unwrap();
        assert_eq!(reopened.max_serial(), 11);
    }

    #[test]
    fn corrupt_index_degrades_to_zero() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::open(dir.path(), day()).unwrap();
        write(
            store.index_path(),
            "first_seen_iso,serial,last_seen_iso,duration,verbose_file\n\
             2024-06-01T10:00:00,T5,2024-06-01T10:00:00,00:00:00,a.csv\n\
             garbage line without enough fields\n",
        );
        assert_eq!(store.max_serial(), 0);

        write(
            store.index_path(),
            "first_seen_iso,serial,last_seen_iso,duration,verbose_file\n\
             2024-06-01T10:00:00,Tbogus,2024-06-01T10:00:00,00:00:00,a.csv\n",
        );
        assert_eq!(store.max_serial(), 0);
    }

    #[test]
    fn finalize_rewrites_row_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::open(dir.path(), day()).unwrap();
        let first_a = at(9, 59, 0, 0);
        let first_b = at(10, 0, 0, 250);
        store
            .append_index(&IndexRecord::provisional(TrackId(1), first_a, "T1_095900.csv"))
            .unwrap();
        store
            .append_index(&IndexRecord::provisional(TrackId(2), first_b, "T2_100000.csv"))
            .unwrap();

        let found = store
            .finalize_index(TrackId(2), first_b, at(10, 1, 5, 900))
            .unwrap();
        assert!(found);

        let rows = store.read_index().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].duration, "00:00:00");
        assert_eq!(rows[1].serial, "T2");
        assert_eq!(rows[1].first_seen, "2024-06-01T10:00:00");
        assert_eq!(rows[1].last_seen, "2024-06-01T10:01:05");
        assert_eq!(rows[1].duration, "00:01:05");
        assert_eq!(rows[1].duration_secs(), Some(65));

        assert!(!store
            .finalize_index(TrackId(9), first_b, at(10, 2, 0, 0))
            .unwrap());
    }

    #[test]
    fn track_log_rows_are_flushed_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::open(dir.path(), day()).unwrap();
        let mut log = store.create_track_log(TrackId(4), at(12, 30, 15, 0)).unwrap();
        assert_eq!(log.file_name(), "T4_123015.csv");

        log.append(&HistoryRow {
            timestamp: at(12, 30, 15, 120),
            x_mm: -300,
            y_mm: 400,
            range_mm: 500.9,
            speed_mm_s: 0.0,
            accel_mm_s2: 0.0,
            raw_hex: "aaff",
        })
        .unwrap();

        let text = fs::read_to_string(log.path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], TRACK_HEADER.join(","));
        assert_eq!(
            lines[1],
            "2024-06-01T12:30:15.120,-300,400,500,0.000,0.000,aaff"
        );
        let path = log.close().unwrap();
        assert!(path.is_file());
    }

    #[test]
    fn recent_recordings_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::open(dir.path(), day()).unwrap();
        for n in 1..=3 {
            let log = store.create_track_log(TrackId(n), at(8, 0, n as u32, 0)).unwrap();
            store
                .append_index(&IndexRecord::provisional(TrackId(n), at(8, 0, n as u32, 0), log.file_name()))
                .unwrap();
        }
        store
            .append_index(&IndexRecord::provisional(TrackId(4), at(8, 0, 9, 0), "missing.csv"))
            .unwrap();

        let recent = store.recent_recordings(2);
        let names: Vec<_> = recent
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["T3_080003.csv", "T2_080002.csv"]);
    }

    #[test]
    fn timestamps_parse_iso_and_numbers() {
        let a = parse_timestamp("2024-06-01T10:00:00.500").unwrap();
        let b = parse_timestamp("2024-06-01T10:00:02").unwrap();
        assert!((b - a - 1.5).abs() < 1e-9);
        assert!(parse_timestamp("2024-06-01T10:00:00+02:00").is_some());
        assert_eq!(parse_timestamp("12.5"), Some(12.5));
        assert_eq!(parse_timestamp("1717236000123"), Some(1717236000.123));
        assert_eq!(parse_timestamp("x_mm"), None);
        assert_eq!(parse_timestamp("timestamp_iso"), None);
    }

    #[test]
    fn load_with_header_and_iso_times() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.csv");
        write(
            &path,
            "timestamp_iso,x_mm,y_mm,range_mm,speed_mm_s,accel_mm_s2,raw_hex\n\
             2024-06-01T10:00:00.000,0,1000,1000,0.000,0.000,aaff\n\
             2024-06-01T10:00:00.250,100,1000,1004,400.000,1600.000,\n\
             2024-06-01T10:00:01.000,200,1000,1019,133.333,-355.556,aaff\n",
        );
        let rows = load_track_history(&path).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].t_rel, 0.0);
        assert!((rows[1].t_rel - 0.25).abs() < 1e-9);
        assert!((rows[2].t_rel - 1.0).abs() < 1e-9);
        assert_eq!(rows[1].x_mm, 100.0);
        assert_eq!(rows[1].speed_mm_s, Some(400.0));
        assert_eq!(rows[1].raw_hex, None);
        assert_eq!(rows[2].raw_hex.as_deref(), Some("aaff"));
    }

    #[test]
    fn load_headerless_millisecond_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ms.csv");
        write(&path, "1717236000000,5,6\n1717236000500,7,8\n");
        let rows = load_track_history(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert!((rows[1].t_rel - 0.5).abs() < 1e-6);
        assert_eq!((rows[1].x_mm, rows[1].y_mm), (7.0, 8.0));
        assert_eq!(rows[1].range_mm, None);
    }

    #[test]
    fn malformed_inputs_are_rejected() {
        let dir = tempfile::tempdir().unwrap();

        let empty = dir.path().join("empty.csv");
        write(&empty, "");
        assert!(matches!(load_track_history(&empty), Err(HistoryError::Empty(_))));

        let header_only = dir.path().join("header.csv");
        write(&header_only, &format!("{}\n", TRACK_HEADER.join(",")));
        assert!(matches!(
            load_track_history(&header_only),
            Err(HistoryError::HeaderOnly(_))
        ));

        let bad_time = dir.path().join("bad_time.csv");
        write(&bad_time, "timestamp_iso,x_mm,y_mm\n2024-06-01T10:00:00,1,2\nyesterday,nope,3,4\n");
        assert!(matches!(
            load_track_history(&bad_time),
            Err(HistoryError::BadTimestamp { line: 3, .. })
        ));

        let bad_x = dir.path().join("bad_x.csv");
        write(&bad_x, "2024-06-01T10:00:00,abc,2\n");
        assert!(matches!(
            load_track_history(&bad_x),
            Err(HistoryError::BadField { column: "x_mm", .. })
        ));

        assert!(matches!(
            load_track_history(&dir.path().join("missing.csv")),
            Err(HistoryError::Csv { .. })
        ));
    }
}
