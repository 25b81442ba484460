//! Shared terminal writer.
//!
//! Every user-visible line goes through a [`Console`]. Clones share the same
//! underlying writer, so lines emitted from the receive loop and the command
//! loop never interleave mid-line.

use std::io::{self, Write};
use std::sync::Arc;

use parking_lot::Mutex;

/// Prompt printed after every command and after each displayed inbound message.
pub const PROMPT: &str = "(type &help for assistance)> ";

/// Cloneable handle to the terminal (or a test buffer).
#[derive(Clone)]
pub struct Console {
    out: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl Console {
    /// Console writing to the process's standard output.
    #[must_use]
    pub fn stdout() -> Self {
        Self::from_writer(io::stdout())
    }

    /// Console writing to an arbitrary writer.
    pub fn from_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            out: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    /// Console writing into an in-memory buffer, plus a handle to read it.
    #[must_use]
    pub fn capture() -> (Self, Capture) {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let console = Self::from_writer(SharedBuffer(Arc::clone(&buffer)));
        (console, Capture { buffer })
    }

    /// Print one line.
    pub fn line(&self, text: &str) {
        let mut out = self.out.lock();
        if let Err(e) = writeln!(out, "{text}").and_then(|()| out.flush()) {
            tracing::warn!(error = %e, "console write failed");
        }
    }

    /// Print an empty line.
    pub fn blank(&self) {
        self.line("");
    }

    /// Print the input prompt without a trailing newline.
    pub fn prompt(&self) {
        let mut out = self.out.lock();
        if let Err(e) = write!(out, "{PROMPT}").and_then(|()| out.flush()) {
            tracing::warn!(error = %e, "console write failed");
        }
    }
}

/// Read side of [`Console::capture`].
#[derive(Clone)]
pub struct Capture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl Capture {
    /// Everything written so far, lossily decoded.
    #[must_use]
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock()).into_owned()
    }

    /// Written output split into lines, with prompts stripped.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.contents()
            .lines()
            .map(|l| l.replace(PROMPT, ""))
            .collect()
    }

    /// Returns `true` if any written line contains `needle`.
    #[must_use]
    pub fn contains(&self, needle: &str) -> bool {
        self.contents().contains(needle)
    }

    /// Discard everything written so far.
    pub fn clear(&self) {
        self.buffer.lock().clear();
    }
}

struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
