// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Incremental log tailing for live observers.

use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// New lines since the last read, plus whether the file was replaced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogRead {
    pub lines: Vec<String>,
    /// True when the file shrank or was swapped out and the offset was
    /// reset to zero before reading.
    pub reset: bool,
}

/// Tracks a byte offset into a growing log file and yields new complete
/// lines. Partial trailing lines stay buffered on disk until their
/// newline arrives.
#[derive(Debug, Clone)]
pub struct LogTailer {
    path: PathBuf,
    offset: u64,
}

impl LogTailer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), offset: 0 }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Read whatever complete lines have appeared since the last call.
    /// A missing file reads as empty.
    pub fn read_new(&mut self) -> std::io::Result<LogRead> {
        let Ok(metadata) = std::fs::metadata(&self.path) else {
            return Ok(LogRead::default());
        };

        let mut reset = false;
        if metadata.len() < self.offset {
            // Truncated or replaced: start over from the beginning.
            self.offset = 0;
            reset = true;
        }

        let mut file = std::fs::File::open(&self.path)?;
        file.seek(SeekFrom::Start(self.offset))?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;

        // Only consume up to the last complete line; a partial trailing
        // line (possibly mid-codepoint) waits for its newline.
        let consumed = match buf.iter().rposition(|b| *b == b'\n') {
            Some(last_newline) => last_newline + 1,
            None => return Ok(LogRead { lines: Vec::new(), reset }),
        };
        self.offset += consumed as u64;

        let text = String::from_utf8_lossy(&buf[..consumed]);
        let lines = text.lines().map(str::to_string).collect();
        Ok(LogRead { lines, reset })
    }
}

#[cfg(test)]
#[path = "tailer_tests.rs"]
mod tests;
