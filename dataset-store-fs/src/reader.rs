//! Data file reader
//!
//! A read channel lists the dataset's data files once when it opens and
//! streams them in file name order. Files written after that point are not
//! seen by the channel.

use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use tracing::debug;

use dataset_store_core::{Error, Format, RecordReader, Result};

/// Visible data files of `format` in `dir`, sorted by file name
pub(crate) fn list_data_files(dir: &Path, format: Format) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        let matches = path.extension().map_or(false, |ext| ext == format.extension());
        if !hidden && matches {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Read channel over one filesystem dataset
pub struct DataFileReader {
    dataset: String,
    format: Format,
    buffer_size: usize,
    pending: VecDeque<PathBuf>,
    current: Option<BufReader<File>>,
    buffer: Vec<u8>,
}

impl DataFileReader {
    /// Open a reader over the data files currently in `dir`
    pub fn open(dataset: &str, dir: &Path, format: Format, buffer_size: usize) -> Result<Self> {
        let files = list_data_files(dir, format).map_err(|e| Error::record_io(dataset, e))?;
        debug!(dataset = %dataset, files = files.len(), "opened dataset reader");

        Ok(Self {
            dataset: dataset.to_string(),
            format,
            buffer_size,
            pending: files.into(),
            current: None,
            buffer: Vec::new(),
        })
    }

    /// Data files not yet opened by this channel
    pub fn remaining_files(&self) -> usize {
        self.pending.len()
    }

    /// Advance to the next file, returning false when none are left
    fn open_next(&mut self) -> Result<bool> {
        let Some(path) = self.pending.pop_front() else {
            return Ok(false);
        };
        let file = File::open(&path).map_err(|e| Error::record_io(&self.dataset, e))?;
        self.current = Some(BufReader::with_capacity(self.buffer_size, file));
        Ok(true)
    }

    fn truncated(&self) -> Error {
        Error::record_io(
            &self.dataset,
            io::Error::new(io::ErrorKind::UnexpectedEof, "truncated record frame"),
        )
    }

    /// Read one frame from the current file, `None` at end of file
    fn read_frame(&mut self) -> Result<Option<Vec<u8>>> {
        let Some(reader) = self.current.as_mut() else {
            return Ok(None);
        };

        match self.format {
            Format::Json => loop {
                self.buffer.clear();
                let n = reader
                    .read_until(b'\n', &mut self.buffer)
                    .map_err(|e| Error::record_io(&self.dataset, e))?;
                if n == 0 {
                    return Ok(None);
                }
                if self.buffer.last() != Some(&b'\n') {
                    return Err(self.truncated());
                }
                self.buffer.pop();
                if self.buffer.iter().all(u8::is_ascii_whitespace) {
                    continue;
                }
                return Ok(Some(self.buffer.clone()));
            },
            Format::Bincode => {
                let mut len = [0u8; 4];
                let complete = fill_or_eof(reader, &mut len).map_err(|e| Error::record_io(&self.dataset, e))?;
                if !complete {
                    return Ok(None);
                }

                // The prefix is untrusted, grow with the bytes actually present
                let expected = u64::from(u32::from_le_bytes(len));
                let mut record = Vec::new();
                let read = reader
                    .by_ref()
                    .take(expected)
                    .read_to_end(&mut record)
                    .map_err(|e| Error::record_io(&self.dataset, e))?;
                if read as u64 != expected {
                    return Err(self.truncated());
                }
                Ok(Some(record))
            }
        }
    }
}

/// Fill `buf` completely, or return `Ok(false)` on a clean end of stream
fn fill_or_eof<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated record frame")),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(true)
}

impl RecordReader for DataFileReader {
    fn next_record(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            if self.current.is_none() && !self.open_next()? {
                return Ok(None);
            }
            if let Some(record) = self.read_frame()? {
                return Ok(Some(record));
            }
            self.current = None;
        }
    }

    fn close(&mut self) -> Result<()> {
        self.current = None;
        self.pending.clear();
        Ok(())
    }
}
