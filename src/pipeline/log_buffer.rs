//! Bounded in-memory tail of pipeline output

use crate::truncate::tail_bytes;
use std::collections::VecDeque;

/// Ordered output lines whose cumulative size stays within `2 * max_log_chars` bytes
///
/// Each line costs its byte length plus one for the newline. When a push
/// takes the total over the bound, the oldest half of the retained lines
/// (by count) is dropped, repeatedly if needed. A single line that alone
/// exceeds the bound keeps only its tail.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    lines: VecDeque<String>,
    bytes: usize,
    limit: usize,
}

impl LogBuffer {
    pub fn new(max_log_chars: usize) -> Self {
        Self {
            lines: VecDeque::new(),
            bytes: 0,
            limit: max_log_chars.saturating_mul(2),
        }
    }

    pub fn push(&mut self, line: String) {
        self.bytes += line.len() + 1;
        self.lines.push_back(line);
        self.compact();
    }

    fn compact(&mut self) {
        while self.bytes > self.limit {
            match self.lines.len() {
                0 => break,
                1 => {
                    self.shrink_last_line();
                    break;
                }
                n => self.drop_oldest(n / 2),
            }
        }
    }

    fn drop_oldest(&mut self, count: usize) {
        for line in self.lines.drain(..count) {
            self.bytes -= line.len() + 1;
        }
    }

    fn shrink_last_line(&mut self) {
        if self.limit == 0 {
            self.lines.clear();
            self.bytes = 0;
            return;
        }
        if let Some(line) = self.lines.back_mut() {
            let kept = tail_bytes(line, self.limit - 1).to_string();
            *line = kept;
            self.bytes = line.len() + 1;
        }
    }

    /// Cumulative size of the retained lines, newline included
    pub fn byte_size(&self) -> usize {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    /// Retained lines joined with `\n`
    pub fn into_text(self) -> String {
        Vec::from(self.lines).join("\n")
    }
}
