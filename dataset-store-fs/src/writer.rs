//! Data file writer
//!
//! Each write channel appends to its own data file. Records go to a hidden
//! in-progress file which is renamed to `<uuid>.<ext>` when the channel
//! closes, so readers only ever see complete files. A channel that never
//! receives a record leaves no file behind.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

use dataset_store_core::{Error, Format, RecordWriter, Result};

/// An open data file and where it gets published
struct PendingFile {
    writer: BufWriter<File>,
    in_progress: PathBuf,
    target: PathBuf,
}

/// Write channel over one filesystem dataset
pub struct DataFileWriter {
    /// Dataset name, for errors and logs
    dataset: String,

    /// Dataset directory
    dir: PathBuf,

    /// Record framing
    format: Format,

    /// Buffer size for the data file
    buffer_size: usize,

    /// Fsync on close
    sync_on_close: bool,

    /// File opened by the first write
    pending: Option<PendingFile>,

    /// Records written so far
    records: usize,

    /// Whether `close` has run
    closed: bool,
}

impl DataFileWriter {
    /// Create a writer for the dataset stored in `dir`
    pub fn new(dataset: &str, dir: &Path, format: Format, buffer_size: usize, sync_on_close: bool) -> Self {
        Self {
            dataset: dataset.to_string(),
            dir: dir.to_path_buf(),
            format,
            buffer_size,
            sync_on_close,
            pending: None,
            records: 0,
            closed: false,
        }
    }

    /// Number of records written through this channel
    pub fn records_written(&self) -> usize {
        self.records
    }

    fn open_pending(&self) -> Result<PendingFile> {
        let file_name = format!("{}.{}", Uuid::new_v4(), self.format.extension());
        let in_progress = self.dir.join(format!(".{}.inprogress", file_name));
        let target = self.dir.join(file_name);

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&in_progress)
            .map_err(|e| Error::record_io(&self.dataset, e))?;

        debug!(dataset = %self.dataset, file = %target.display(), "opened data file");
        Ok(PendingFile {
            writer: BufWriter::with_capacity(self.buffer_size, file),
            in_progress,
            target,
        })
    }

    fn publish(&self, pending: PendingFile) -> Result<()> {
        let PendingFile { writer, in_progress, target } = pending;

        let file = writer.into_inner().map_err(|e| Error::record_io(&self.dataset, e.into_error()))?;
        if self.sync_on_close {
            file.sync_all().map_err(|e| Error::record_io(&self.dataset, e))?;
        }
        drop(file);

        fs::rename(&in_progress, &target).map_err(|e| Error::record_io(&self.dataset, e))?;
        debug!(dataset = %self.dataset, file = %target.display(), records = self.records, "published data file");
        Ok(())
    }
}

impl RecordWriter for DataFileWriter {
    fn write(&mut self, record: &[u8]) -> Result<()> {
        if self.closed {
            return Err(Error::record_io(&self.dataset, "write after close"));
        }
        if self.pending.is_none() {
            self.pending = Some(self.open_pending()?);
        }
        let Some(pending) = self.pending.as_mut() else {
            return Err(Error::record_io(&self.dataset, "data file not open"));
        };

        let framed = match self.format {
            Format::Json => pending
                .writer
                .write_all(record)
                .and_then(|()| pending.writer.write_all(b"\n")),
            Format::Bincode => {
                let len = u32::try_from(record.len()).map_err(|_| {
                    Error::record_io(&self.dataset, format!("record of {} bytes exceeds the frame limit", record.len()))
                })?;
                pending
                    .writer
                    .write_all(&len.to_le_bytes())
                    .and_then(|()| pending.writer.write_all(record))
            }
        };
        framed.map_err(|e| Error::record_io(&self.dataset, e))?;

        self.records += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        match self.pending.take() {
            Some(pending) => self.publish(pending),
            None => Ok(()),
        }
    }
}

impl Drop for DataFileWriter {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.close() {
                warn!(dataset = %self.dataset, error = %e, "failed to close data file writer on drop");
            }
        }
    }
}
