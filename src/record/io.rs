//! Line-oriented JSONL reading and writing.

use crate::config::types::{Result, SieveError};
use crate::record::DatasetEntry;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Lines of a JSONL file. Lines that are not valid UTF-8 are counted in
/// `undecodable` and left out of `lines`.
#[derive(Debug, Default)]
pub struct InputLines {
    pub lines: Vec<String>,
    pub undecodable: usize,
}

/// Read every line of a JSONL file (newlines stripped, blank lines kept).
pub fn read_lines(path: &Path) -> Result<InputLines> {
    let file = File::open(path).map_err(|e| {
        SieveError::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to open {}: {}", path.display(), e),
        ))
    })?;
    let mut reader = BufReader::new(file);
    let mut input = InputLines::default();
    let mut buf = Vec::new();
    let mut lineno = 0usize;

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        lineno += 1;
        if buf.last() == Some(&b'\n') {
            buf.pop();
            if buf.last() == Some(&b'\r') {
                buf.pop();
            }
        }
        match String::from_utf8(std::mem::take(&mut buf)) {
            Ok(line) => input.lines.push(line),
            Err(e) => {
                input.undecodable += 1;
                log::warn!("Skipping line {} of {}: {}", lineno, path.display(), e.utf8_error());
            }
        }
    }
    Ok(input)
}

/// Record sink writing one JSON object per line, flushed after every record.
pub struct JsonlWriter {
    inner: BufWriter<File>,
    written: usize,
}

impl JsonlWriter {
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(path).map_err(|e| {
            SieveError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to create {}: {}", path.display(), e),
            ))
        })?;
        Ok(Self {
            inner: BufWriter::new(file),
            written: 0,
        })
    }

    pub fn write(&mut self, entry: &DatasetEntry) -> Result<()> {
        serde_json::to_writer(&mut self.inner, entry)?;
        self.inner.write_all(b"\n")?;
        self.inner.flush()?;
        self.written += 1;
        Ok(())
    }

    pub fn written(&self) -> usize {
        self.written
    }
}
