//! Append-only JSON-lines log of deleted records.

use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::types::{DeletionLogEntry, UnscrobblerResult};

/// Best-effort writer of one JSON object per deletion.
///
/// A failing write is logged and closes the sink; it never stops the
/// deletion loop.
pub struct DeletionLogSink {
    writer: Option<Box<dyn Write + Send>>,
    entries_written: u64,
}

impl DeletionLogSink {
    /// A sink that drops every entry.
    pub fn disabled() -> Self {
        Self {
            writer: None,
            entries_written: 0,
        }
    }

    pub fn from_writer<W: Write + Send + 'static>(writer: W) -> Self {
        Self {
            writer: Some(Box::new(writer)),
            entries_written: 0,
        }
    }

    /// Create `path` for writing. Fails if the file already exists so a
    /// previous run's log is never overwritten.
    pub fn create_exclusive(path: &Path) -> UnscrobblerResult<Self> {
        let file = OpenOptions::new().write(true).create_new(true).open(path)?;
        Ok(Self::from_writer(BufWriter::new(file)))
    }

    pub fn is_open(&self) -> bool {
        self.writer.is_some()
    }

    pub fn entries_written(&self) -> u64 {
        self.entries_written
    }

    /// Append `entry` as one line.
    pub fn record(&mut self, entry: &DeletionLogEntry) {
        let Some(writer) = self.writer.as_mut() else {
            return;
        };

        let result = serde_json::to_vec(entry)
            .map_err(std::io::Error::from)
            .and_then(|mut line| {
                line.push(b'\n');
                writer.write_all(&line)?;
                writer.flush()
            });

        match result {
            Ok(()) => self.entries_written += 1,
            Err(e) => {
                tracing::warn!("Deletion log write failed, disabling the log: {e}");
                self.writer = None;
            }
        }
    }

    /// Flush and release the destination. Later `record` calls are no-ops.
    pub fn close(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.flush() {
                tracing::warn!("Failed to flush deletion log: {e}");
            }
        }
    }
}

impl Drop for DeletionLogSink {
    fn drop(&mut self) {
        self.close();
    }
}
