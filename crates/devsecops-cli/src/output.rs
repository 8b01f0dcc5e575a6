use std::io::{self, Write};

use serde::Serialize;

/// Line-oriented result printer for batch commands.
///
/// Every failed item is counted; the count becomes the process exit code.
pub struct Report<W: Write> {
    out: W,
    failures: u32,
}

impl<W: Write> Report<W> {
    pub fn new(out: W) -> Self {
        Self { out, failures: 0 }
    }

    /// Item already present, nothing changed
    pub fn ok(&mut self, name: &str) -> io::Result<()> {
        writeln!(self.out, "{} ok", name)
    }

    pub fn added(&mut self, name: &str) -> io::Result<()> {
        writeln!(self.out, "{} added", name)
    }

    pub fn failed(&mut self, name: &str) -> io::Result<()> {
        self.failures += 1;
        writeln!(self.out, "{}: failed", name)
    }

    pub fn line(&mut self, text: &str) -> io::Result<()> {
        writeln!(self.out, "{}", text)
    }

    /// Pretty-printed JSON listing
    pub fn json<T: Serialize>(&mut self, value: &T) -> io::Result<()> {
        serde_json::to_writer_pretty(&mut self.out, value)?;
        writeln!(self.out)
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }
}
