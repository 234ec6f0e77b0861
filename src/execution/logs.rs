//! Append-only log buffers and offset-based pagination over them.
//!
//! A reader polls with the `next_offset` of its previous page. Because the
//! buffer can keep growing until the execution reaches a terminal status,
//! `eof` is derived on every read from the status and the buffer length at
//! that moment.

use serde::{Deserialize, Serialize};

use crate::execution::ExecutionStatus;

/// Ordered log lines of one execution, indexed from 0.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogBuffer {
    lines: Vec<String>,
}

impl LogBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append<I>(&mut self, lines: I)
    where
        I: IntoIterator<Item = String>,
    {
        self.lines.extend(lines);
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Read up to `limit` lines starting at `offset`.
    pub fn page(&self, offset: usize, limit: usize, status: ExecutionStatus) -> LogPage {
        let total = self.lines.len();
        let end = total.min(offset.saturating_add(limit));
        let lines = if offset < end {
            self.lines[offset..end].to_vec()
        } else {
            Vec::new()
        };

        LogPage {
            lines,
            next_offset: end,
            eof: status.is_terminal() && end >= total,
        }
    }
}

/// One slice of an execution's log stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogPage {
    pub lines: Vec<String>,
    pub next_offset: usize,
    /// True once the execution is terminal and this read reached the end.
    pub eof: bool,
}
