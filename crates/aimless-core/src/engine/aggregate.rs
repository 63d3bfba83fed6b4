//! Following worker logs into the cumulative master log.

use super::logger::{LogError, LogPaths, ResultsLogger};
use super::progress::{Progress, ProgressReporter};
use crate::core::io::records::{self, ResultRecord};
use crate::core::io::xyz::{self, XyzFrame};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

/// Read position inside one worker's log pair.
///
/// Only entries whose record line is complete and whose frame is fully
/// written are returned, so a tail can follow a pair while it is being appended.
#[derive(Debug, Clone)]
pub struct LogTail {
    paths: LogPaths,
    csv_offset: u64,
    xyz_offset: u64,
    /// Entries of the pair that precede the read position.
    rows: usize,
    tracked: bool,
}

impl LogTail {
    /// A tail that will return every entry of the pair.
    pub fn from_start(paths: LogPaths) -> Self {
        Self {
            paths,
            csv_offset: 0,
            xyz_offset: 0,
            rows: 0,
            tracked: false,
        }
    }

    /// A tail positioned just after the first `rows` entries of the pair.
    ///
    /// Its position is written to the pair's cursor file by
    /// [`LogTail::save_cursor`]. A pair holding fewer than `rows` entries was
    /// replaced since the cursor was saved, so it is read from the start.
    pub fn tracked(paths: LogPaths, rows: usize) -> Result<Self, LogError> {
        let mut tail = Self {
            tracked: true,
            ..Self::from_start(paths)
        };
        if rows == 0 {
            return Ok(tail);
        }

        let csv_bytes = read_from(&tail.paths.csv, 0)?;
        let line_ends: Vec<usize> = csv_bytes
            .iter()
            .enumerate()
            .filter(|(_, b)| **b == b'\n')
            .map(|(i, _)| i + 1)
            .collect();
        let xyz_bytes = read_from(&tail.paths.xyz, 0)?;
        let text = String::from_utf8_lossy(&xyz_bytes);
        let scan = xyz::scan_frames(&text, Some(rows)).map_err(|source| LogError::Archive {
            path: tail.paths.xyz.clone(),
            source,
        })?;

        // One header line precedes the records.
        if line_ends.len() <= rows || scan.frames.len() < rows {
            warn!(
                prefix = %tail.paths.prefix.display(),
                cursor = rows,
                "Worker log is shorter than its aggregation cursor; reading it from the start"
            );
            return Ok(tail);
        }
        tail.csv_offset = line_ends[rows] as u64;
        tail.xyz_offset = scan.ends[rows - 1] as u64;
        tail.rows = rows;
        Ok(tail)
    }

    /// Number of entries before the read position, as saved by [`LogTail::save_cursor`].
    ///
    /// A missing cursor file means nothing has been copied yet.
    pub fn read_cursor(paths: &LogPaths) -> Result<usize, LogError> {
        let text = match std::fs::read_to_string(&paths.cursor) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(source) => {
                return Err(LogError::Io {
                    path: paths.cursor.clone(),
                    source,
                });
            }
        };
        text.trim().parse().map_err(|_| LogError::Cursor {
            path: paths.cursor.clone(),
            content: text.trim().to_string(),
        })
    }

    /// Records the read position in the pair's cursor file; a no-op for untracked tails.
    pub fn save_cursor(&self) -> Result<(), LogError> {
        if !self.tracked {
            return Ok(());
        }
        let mut staging = self.paths.cursor.clone().into_os_string();
        staging.push(".tmp");
        let staging = PathBuf::from(staging);
        let to_log_error = |source: io::Error| LogError::Io {
            path: self.paths.cursor.clone(),
            source,
        };
        let mut file = File::create(&staging).map_err(to_log_error)?;
        writeln!(file, "{}", self.rows)
            .and_then(|_| file.sync_data())
            .map_err(to_log_error)?;
        std::fs::rename(&staging, &self.paths.cursor).map_err(to_log_error)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn paths(&self) -> &LogPaths {
        &self.paths
    }

    /// Returns the entries appended since the previous poll.
    pub fn poll(&mut self) -> Result<Vec<(XyzFrame, ResultRecord)>, LogError> {
        let csv_bytes = read_from(&self.paths.csv, self.csv_offset)?;
        let Some(last_newline) = csv_bytes.iter().rposition(|&b| b == b'\n') else {
            return Ok(Vec::new());
        };
        let complete = &csv_bytes[..=last_newline];

        let mut line_ends: Vec<usize> = complete
            .iter()
            .enumerate()
            .filter(|(_, b)| **b == b'\n')
            .map(|(i, _)| i + 1)
            .collect();
        let mut body_start = 0;
        if self.csv_offset == 0 {
            body_start = line_ends.remove(0);
        }
        if line_ends.is_empty() {
            self.csv_offset += body_start as u64;
            return Ok(Vec::new());
        }

        let rows = records::parse_rows(&complete[body_start..]).map_err(|source| {
            LogError::Table {
                path: self.paths.csv.clone(),
                source,
            }
        })?;

        let xyz_bytes = read_from(&self.paths.xyz, self.xyz_offset)?;
        let text = String::from_utf8_lossy(&xyz_bytes);
        let scan = xyz::scan_frames(&text, Some(rows.len())).map_err(|source| {
            LogError::Archive {
                path: self.paths.xyz.clone(),
                source,
            }
        })?;

        let ready = scan.frames.len().min(rows.len());
        if ready == 0 {
            self.csv_offset += body_start as u64;
            return Ok(Vec::new());
        }
        self.csv_offset += line_ends[ready - 1] as u64;
        self.xyz_offset += scan.ends[ready - 1] as u64;
        self.rows += ready;
        trace!(path = %self.paths.prefix.display(), entries = ready, "Read new log entries");

        Ok(scan.frames.into_iter().zip(rows).take(ready).collect())
    }
}

fn read_from(path: &Path, offset: u64) -> Result<Vec<u8>, LogError> {
    let to_log_error = |source: io::Error| LogError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(to_log_error(e)),
    };
    let mut bytes = Vec::new();
    file.seek(SeekFrom::Start(offset))
        .and_then(|_| file.read_to_end(&mut bytes))
        .map_err(to_log_error)?;
    Ok(bytes)
}

/// Copies worker entries into the master log as they appear.
///
/// The master is written by this value alone. Entries keep the order in which
/// each worker produced them and are renumbered by the master log. After a
/// worker's entries reach the master, its tail's cursor is saved, so an
/// interrupted run loses nothing; a crash between the two writes copies that
/// batch again on the next run.
pub struct Aggregator {
    tails: Vec<LogTail>,
    master: ResultsLogger,
    poll_interval: Duration,
    reporter: Arc<ProgressReporter>,
    merged: usize,
}

impl Aggregator {
    pub fn new(
        tails: Vec<LogTail>,
        master: ResultsLogger,
        poll_interval: Duration,
        reporter: Arc<ProgressReporter>,
    ) -> Self {
        Self {
            tails,
            master,
            poll_interval,
            reporter,
            merged: 0,
        }
    }

    /// Total number of entries the master log holds.
    pub fn master_len(&self) -> usize {
        self.master.next_index()
    }

    /// Copies everything currently available, visiting workers in turn.
    pub fn drain(&mut self) -> Result<usize, LogError> {
        let mut appended = 0;
        for tail in &mut self.tails {
            let entries = tail.poll()?;
            if entries.is_empty() {
                continue;
            }
            for (frame, record) in &entries {
                self.master.append(frame, record.clone())?;
            }
            tail.save_cursor()?;
            appended += entries.len();
        }
        if appended > 0 {
            self.merged += appended;
            debug!(appended, total = self.master.next_index(), "Aggregated worker entries");
            self.reporter.report(Progress::RecordsMerged {
                total: self.master.next_index(),
            });
        }
        Ok(appended)
    }

    /// Polls until `shutdown` turns true (or its sender is dropped), then drains once more.
    ///
    /// Returns the number of entries copied during this run.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<usize, LogError> {
        info!(
            workers = self.tails.len(),
            master = %self.master.paths().prefix.display(),
            "Aggregator started"
        );
        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {
                    tokio::task::block_in_place(|| self.drain())?;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        tokio::task::block_in_place(|| self.drain())?;
        info!(merged = self.merged, total = self.master_len(), "Aggregator finished");
        Ok(self.merged)
    }
}
