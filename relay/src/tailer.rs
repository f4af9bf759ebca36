//! Incremental log tailing.
//!
//! A [`LogTailer`] remembers how far into a log file it has read and, when
//! polled, returns exactly the bytes appended since then. Polling is used
//! instead of filesystem notifications because those are unreliable for
//! files written by other processes.
//!
//! [`LineAssembler`] turns the raw chunks into lines. A line split across
//! two chunks is held back until its newline arrives, or until a poll finds
//! no further growth, in which case the pending text is released as-is.
//!
//! [`run_tailer`] drives both on a fixed interval and forwards the lines to
//! the dispatch loop over a channel.

use crate::endpoint::EndpointId;
use crate::error::RelayError;
use log::{debug, warn};
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};

/// Messages sent from tailer tasks to the dispatch loop
#[derive(Debug)]
pub enum TailEvent {
    Lines {
        source: EndpointId,
        lines: Vec<String>,
    },
    /// The tailer stopped after a read error and will not resume.
    Failed {
        source: EndpointId,
        error: RelayError,
    },
}

#[derive(Debug)]
pub struct LogTailer {
    path: PathBuf,
    file: File,
    offset: u64,
}

impl LogTailer {
    /// Opens `path` and starts at its current end; existing content is
    /// never replayed.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, RelayError> {
        let path = path.into();
        let file = File::open(&path)
            .await
            .map_err(|e| RelayError::LogOpen(path.clone(), e))?;
        let offset = file
            .metadata()
            .await
            .map_err(|e| RelayError::LogOpen(path.clone(), e))?
            .len();

        Ok(Self { path, file, offset })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Returns the bytes appended since the last poll, if any.
    ///
    /// A file that shrank below the offset was truncated or rotated: it is
    /// reopened and tailing resumes from its new end.
    pub async fn poll(&mut self) -> Result<Option<Vec<u8>>, RelayError> {
        let size = fs::metadata(&self.path)
            .await
            .map_err(|e| RelayError::LogRead(self.path.clone(), e))?
            .len();

        if size < self.offset {
            warn!(
                "Log {} shrank from {} to {} bytes, resuming from its end",
                self.path.display(),
                self.offset,
                size
            );
            self.file = File::open(&self.path)
                .await
                .map_err(|e| RelayError::LogRead(self.path.clone(), e))?;
            self.offset = size;
            return Ok(None);
        }

        let delta = size - self.offset;
        if delta == 0 {
            return Ok(None);
        }

        self.file
            .seek(SeekFrom::Start(self.offset))
            .await
            .map_err(|e| RelayError::LogRead(self.path.clone(), e))?;

        let mut chunk = Vec::with_capacity(delta as usize);
        (&mut self.file)
            .take(delta)
            .read_to_end(&mut chunk)
            .await
            .map_err(|e| RelayError::LogRead(self.path.clone(), e))?;

        self.offset += chunk.len() as u64;

        if chunk.is_empty() {
            Ok(None)
        } else {
            Ok(Some(chunk))
        }
    }
}

/// Reassembles lines from chunks that may end mid-line.
#[derive(Debug, Default)]
pub struct LineAssembler {
    partial: Vec<u8>,
}

impl LineAssembler {
    /// Appends a chunk and returns every line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.partial.extend_from_slice(chunk);

        let Some(last_newline) = self.partial.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };

        let rest = self.partial.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.partial, rest);
        split_lines(&complete)
    }

    /// Releases a pending unterminated line.
    pub fn flush(&mut self) -> Option<String> {
        if self.partial.is_empty() {
            return None;
        }
        let pending = std::mem::take(&mut self.partial);
        split_lines(&pending).pop()
    }

    pub fn has_partial(&self) -> bool {
        !self.partial.is_empty()
    }
}

/// Splits text on newlines, dropping carriage returns and blank lines.
pub fn split_lines(bytes: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(bytes)
        .split('\n')
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect()
}

/// Polls `tailer` every `poll_interval` and forwards new lines to `events`.
///
/// Returns after a read error (reported as [`TailEvent::Failed`]) or once the
/// receiving side is gone.
pub async fn run_tailer(
    source: EndpointId,
    mut tailer: LogTailer,
    poll_interval: Duration,
    events: mpsc::UnboundedSender<TailEvent>,
) {
    let mut ticker = interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut assembler = LineAssembler::default();

    loop {
        ticker.tick().await;

        let lines = match tailer.poll().await {
            Ok(Some(chunk)) => assembler.push(&chunk),
            Ok(None) => assembler.flush().into_iter().collect(),
            Err(error) => {
                let _ = events.send(TailEvent::Failed { source, error });
                return;
            }
        };

        if lines.is_empty() {
            continue;
        }

        if events.send(TailEvent::Lines { source, lines }).is_err() {
            debug!("Dispatch loop closed, stopping tailer for {}", tailer.path().display());
            return;
        }
    }
}
