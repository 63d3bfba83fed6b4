use crate::core::io::records::{self, ResultRecord};
use crate::core::io::xyz::{self, XyzError, XyzFrame};
use crate::core::models::configuration::Configuration;
use crate::core::models::outcome::ShootingResult;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum LogError {
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Coordinate archive {path:?} is unreadable: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: XyzError,
    },

    #[error("Metadata table {path:?} is unreadable: {source}")]
    Table {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Log pair {prefix:?} is misaligned: {records} records but {frames} frames")]
    Misaligned {
        prefix: PathBuf,
        records: usize,
        frames: usize,
    },

    #[error("Metadata table {path:?} has index {found} at row {row}")]
    NonSequential {
        path: PathBuf,
        row: usize,
        found: usize,
    },

    #[error("Aggregation cursor {path:?} does not hold a row count: {content:?}")]
    Cursor { path: PathBuf, content: String },
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> LogError + '_ {
    move |source| LogError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// File names of the coordinate archive and metadata table sharing one prefix.
///
/// `cursor` names the side file in which aggregation records how many of
/// this pair's entries have reached the master log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogPaths {
    pub prefix: PathBuf,
    pub xyz: PathBuf,
    pub csv: PathBuf,
    pub cursor: PathBuf,
}

impl LogPaths {
    pub fn for_prefix(prefix: impl AsRef<Path>) -> Self {
        let prefix = prefix.as_ref().to_path_buf();
        let with_ext = |ext: &str| {
            let mut name: OsString = prefix.clone().into_os_string();
            name.push(ext);
            PathBuf::from(name)
        };
        Self {
            xyz: with_ext(".xyz"),
            csv: with_ext(".csv"),
            cursor: with_ext(".agg"),
            prefix,
        }
    }
}

/// What an existing log pair already held when it was opened.
#[derive(Debug, Default, Clone)]
pub struct LogContents {
    pub records: Vec<ResultRecord>,
    pub frames: Vec<XyzFrame>,
}

impl LogContents {
    pub fn accepted_count(&self) -> usize {
        self.records.iter().filter(|r| r.accepted).count()
    }

    /// Frames of every accepted attempt, in log order.
    pub fn accepted_frames(&self) -> impl Iterator<Item = &XyzFrame> {
        self.records
            .iter()
            .zip(&self.frames)
            .filter(|(r, _)| r.accepted)
            .map(|(_, f)| f)
    }
}

/// Append-only writer for one coordinate archive + metadata table pair.
///
/// Each entry is written frame first, then record, and both files are synced
/// before returning. A crash between the two writes leaves exactly one
/// dangling frame, which [`ResultsLogger::open`] removes.
pub struct ResultsLogger {
    paths: LogPaths,
    xyz: File,
    csv: csv::Writer<File>,
    next_index: usize,
}

impl std::fmt::Debug for ResultsLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultsLogger")
            .field("paths", &self.paths)
            .field("next_index", &self.next_index)
            .finish()
    }
}

impl ResultsLogger {
    /// Opens a log pair for appending, resuming whatever it already holds.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Misaligned`] when the pair cannot be brought back
    /// to one frame per record by dropping a single trailing frame.
    pub fn open(prefix: impl AsRef<Path>) -> Result<(Self, LogContents), LogError> {
        let paths = LogPaths::for_prefix(prefix);
        create_parent(&paths.xyz)?;

        let records = read_existing_records(&paths.csv)?;
        let frames = repair_archive(&paths, records.len())?;
        let contents = LogContents { records, frames };
        if !contents.records.is_empty() {
            info!(
                prefix = %paths.prefix.display(),
                records = contents.records.len(),
                accepted = contents.accepted_count(),
                "Resuming existing log"
            );
        }

        let logger = Self::with_files(paths, contents.records.len(), false)?;
        Ok((logger, contents))
    }

    /// Creates an empty log pair, discarding any existing files.
    pub fn create(prefix: impl AsRef<Path>) -> Result<Self, LogError> {
        let paths = LogPaths::for_prefix(prefix);
        create_parent(&paths.xyz)?;
        Self::with_files(paths, 0, true)
    }

    fn with_files(paths: LogPaths, next_index: usize, truncate: bool) -> Result<Self, LogError> {
        let open = |path: &Path| {
            let mut options = OpenOptions::new();
            if truncate {
                options.write(true).create(true).truncate(true);
            } else {
                options.append(true).create(true);
            }
            options.open(path).map_err(io_error(path))
        };
        let xyz = open(&paths.xyz)?;
        let csv_file = open(&paths.csv)?;
        let empty = csv_file.metadata().map_err(io_error(&paths.csv))?.len() == 0;
        Ok(Self {
            xyz,
            csv: records::record_writer(csv_file, empty),
            next_index,
            paths,
        })
    }

    pub fn paths(&self) -> &LogPaths {
        &self.paths
    }

    /// Index the next entry will receive; equal to the number of entries logged.
    pub fn next_index(&self) -> usize {
        self.next_index
    }

    /// Logs one shooting attempt started from `base`.
    pub fn log_attempt(
        &mut self,
        base: &Configuration,
        result: &ShootingResult,
        accepted: bool,
    ) -> Result<ResultRecord, LogError> {
        let record = ResultRecord::new(
            self.next_index,
            accepted,
            result.basin_fwd(),
            result.basin_rev(),
            base.box_dims(),
        );
        self.append(&XyzFrame::from_configuration(base), record)
    }

    /// Appends a frame and its record, renumbering the record with this log's next index.
    pub fn append(
        &mut self,
        frame: &XyzFrame,
        mut record: ResultRecord,
    ) -> Result<ResultRecord, LogError> {
        record.index = self.next_index;

        let mut block = Vec::new();
        xyz::write_frame(&mut block, frame).map_err(io_error(&self.paths.xyz))?;
        self.xyz
            .write_all(&block)
            .and_then(|_| self.xyz.sync_data())
            .map_err(io_error(&self.paths.xyz))?;

        self.csv
            .serialize(&record)
            .map_err(|source| LogError::Table {
                path: self.paths.csv.clone(),
                source,
            })?;
        self.csv
            .flush()
            .and_then(|_| self.csv.get_ref().sync_data())
            .map_err(io_error(&self.paths.csv))?;

        self.next_index += 1;
        Ok(record)
    }
}

fn create_parent(path: &Path) -> Result<(), LogError> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => {
            fs::create_dir_all(dir).map_err(io_error(dir))
        }
        _ => Ok(()),
    }
}

fn read_existing_records(path: &Path) -> Result<Vec<ResultRecord>, LogError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(io_error(path)(e)),
    };
    let records = records::read_records(file).map_err(|source| LogError::Table {
        path: path.to_path_buf(),
        source,
    })?;
    if let Some((row, record)) = records.iter().enumerate().find(|(i, r)| r.index != *i) {
        return Err(LogError::NonSequential {
            path: path.to_path_buf(),
            row,
            found: record.index,
        });
    }
    Ok(records)
}

/// Reads the archive and cuts it back to `n_records` complete frames.
fn repair_archive(paths: &LogPaths, n_records: usize) -> Result<Vec<XyzFrame>, LogError> {
    let text = match fs::read_to_string(&paths.xyz) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(io_error(&paths.xyz)(e)),
    };
    let mut scan = xyz::scan_frames(&text, None).map_err(|source| LogError::Archive {
        path: paths.xyz.clone(),
        source,
    })?;

    let n_frames = scan.frames.len();
    if n_frames < n_records || n_frames > n_records + 1 {
        return Err(LogError::Misaligned {
            prefix: paths.prefix.clone(),
            records: n_records,
            frames: n_frames,
        });
    }

    let keep_bytes = match n_records {
        0 => 0,
        n => scan.ends[n - 1],
    };
    if keep_bytes < text.len() {
        warn!(
            path = %paths.xyz.display(),
            dropped_bytes = text.len() - keep_bytes,
            "Dropping coordinate data without a matching record"
        );
        let file = OpenOptions::new()
            .write(true)
            .open(&paths.xyz)
            .map_err(io_error(&paths.xyz))?;
        file.set_len(keep_bytes as u64)
            .and_then(|_| file.sync_all())
            .map_err(io_error(&paths.xyz))?;
    }
    scan.frames.truncate(n_records);
    debug!(path = %paths.xyz.display(), frames = n_records, "Coordinate archive checked");
    Ok(scan.frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::outcome::TrajectoryOutcome;
    use crate::engine::testing::argon_pair;
    use tempfile::tempdir;

    fn result(fwd: Option<i32>, rev: Option<i32>) -> ShootingResult {
        let frames = [argon_pair(1.0), argon_pair(2.0)];
        ShootingResult {
            fwd: Some(TrajectoryOutcome::new(fwd, frames.clone())),
            rev: Some(TrajectoryOutcome::new(rev, frames)),
        }
    }

    fn read_back(paths: &LogPaths) -> (Vec<ResultRecord>, Vec<XyzFrame>) {
        let records = records::read_records(File::open(&paths.csv).unwrap()).unwrap();
        let frames = xyz::read_frames(&mut File::open(&paths.xyz).unwrap()).unwrap();
        (records, frames)
    }

    #[test]
    fn each_attempt_writes_one_aligned_frame_and_record() {
        let dir = tempdir().unwrap();
        let prefix = dir.path().join("nested/run0");
        let (mut logger, contents) = ResultsLogger::open(&prefix).unwrap();
        assert!(contents.records.is_empty());

        for i in 0..3 {
            let record = logger
                .log_attempt(&argon_pair(i as f64), &result(Some(1), None), i == 1)
                .unwrap();
            assert_eq!(record.index, i);
        }

        let (records, frames) = read_back(logger.paths());
        assert_eq!(records.len(), 3);
        assert_eq!(frames.len(), 3);
        for (i, (record, frame)) in records.iter().zip(&frames).enumerate() {
            assert_eq!(record.index, i);
            assert_eq!(frame.positions[0].x, i as f64);
            assert_eq!(record.basin_rev, None);
        }
        assert!(records[1].accepted && !records[0].accepted);
    }

    #[test]
    fn reopening_resumes_indices_and_reports_contents() {
        let dir = tempdir().unwrap();
        let prefix = dir.path().join("w");
        {
            let (mut logger, _) = ResultsLogger::open(&prefix).unwrap();
            logger.log_attempt(&argon_pair(0.0), &result(Some(1), Some(2)), true).unwrap();
            logger.log_attempt(&argon_pair(1.0), &result(Some(1), Some(1)), false).unwrap();
        }

        let (mut logger, contents) = ResultsLogger::open(&prefix).unwrap();
        assert_eq!(logger.next_index(), 2);
        assert_eq!(contents.accepted_count(), 1);
        let accepted: Vec<_> = contents.accepted_frames().collect();
        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].positions[0].x, 0.0);

        logger.log_attempt(&argon_pair(2.0), &result(None, None), false).unwrap();
        let (records, frames) = read_back(logger.paths());
        assert_eq!(records.len(), 3);
        assert_eq!(frames.len(), 3);
        assert_eq!(records[2].index, 2);
    }

    #[test]
    fn dangling_frame_is_dropped_on_open() {
        let dir = tempdir().unwrap();
        let prefix = dir.path().join("w");
        {
            let (mut logger, _) = ResultsLogger::open(&prefix).unwrap();
            logger.log_attempt(&argon_pair(0.0), &result(Some(1), Some(2)), true).unwrap();
        }
        let paths = LogPaths::for_prefix(&prefix);
        let mut file = OpenOptions::new().append(true).open(&paths.xyz).unwrap();
        xyz::write_configuration(&mut file, &argon_pair(9.0)).unwrap();
        file.write_all(b"2\npartial").unwrap();

        let (logger, contents) = ResultsLogger::open(&prefix).unwrap();
        assert_eq!(logger.next_index(), 1);
        assert_eq!(contents.frames.len(), 1);
        let (records, frames) = read_back(&paths);
        assert_eq!(records.len(), frames.len());
    }

    #[test]
    fn missing_frames_are_reported_as_misaligned() {
        let dir = tempdir().unwrap();
        let prefix = dir.path().join("w");
        {
            let (mut logger, _) = ResultsLogger::open(&prefix).unwrap();
            logger.log_attempt(&argon_pair(0.0), &result(Some(1), Some(2)), true).unwrap();
            logger.log_attempt(&argon_pair(1.0), &result(Some(1), Some(2)), true).unwrap();
        }
        let paths = LogPaths::for_prefix(&prefix);
        fs::write(&paths.xyz, "").unwrap();

        match ResultsLogger::open(&prefix) {
            Err(LogError::Misaligned { records, frames, .. }) => {
                assert_eq!((records, frames), (2, 0));
            }
            other => panic!("unexpected result: {:?}", other.map(|(l, _)| l)),
        }
    }

    #[test]
    fn create_discards_previous_contents() {
        let dir = tempdir().unwrap();
        let prefix = dir.path().join("master");
        {
            let (mut logger, _) = ResultsLogger::open(&prefix).unwrap();
            logger.log_attempt(&argon_pair(0.0), &result(Some(1), Some(2)), true).unwrap();
        }
        let mut logger = ResultsLogger::create(&prefix).unwrap();
        assert_eq!(logger.next_index(), 0);
        logger.log_attempt(&argon_pair(5.0), &result(None, Some(2)), false).unwrap();
        let (records, frames) = read_back(logger.paths());
        assert_eq!(records.len(), 1);
        assert_eq!(frames[0].positions[0].x, 5.0);
    }

    #[test]
    fn log_paths_append_extensions_to_prefix() {
        let paths = LogPaths::for_prefix("out/results.run");
        assert_eq!(paths.xyz, PathBuf::from("out/results.run.xyz"));
        assert_eq!(paths.csv, PathBuf::from("out/results.run.csv"));
    }
}
