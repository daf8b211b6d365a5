//! Stderr capture and exit reasons for provider processes.

use std::collections::VecDeque;
use std::fmt;
use std::process::ExitStatus;
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

/// Why a provider process is no longer running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExitReason {
    /// The process exited with a status code.
    Exited { code: i32 },
    /// The process was terminated by a signal.
    Signaled { signal: i32 },
    /// The process could not be launched at all.
    LaunchError { message: String },
    /// The platform reported neither a code nor a signal.
    Unknown,
}

impl ExitReason {
    pub fn launch_error(message: impl Into<String>) -> Self {
        Self::LaunchError {
            message: message.into(),
        }
    }
}

impl From<ExitStatus> for ExitReason {
    fn from(status: ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return Self::Exited { code };
        }

        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return Self::Signaled { signal };
            }
        }

        Self::Unknown
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exited { code } => write!(f, "exited with code {code}"),
            Self::Signaled { signal } => write!(f, "terminated by signal {signal}"),
            Self::LaunchError { message } => write!(f, "launch error: {message}"),
            Self::Unknown => f.write_str("exited (unknown status)"),
        }
    }
}

/// Ring buffer holding the most recent stderr lines of one process.
///
/// Written from the stderr reader task, read when a failure is reported.
#[derive(Debug)]
pub struct DiagnosticBuffer {
    capacity: usize,
    lines: Mutex<VecDeque<String>>,
}

impl DiagnosticBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            lines: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Add a line, removing the oldest if at capacity.
    pub fn push(&self, line: impl Into<String>) {
        let mut lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        if lines.len() >= self.capacity {
            lines.pop_front();
        }
        lines.push_back(line.into());
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Render the buffered lines plus the exit reason, if any.
    ///
    /// Returns an empty string when there is nothing to report.
    pub fn render(&self, exit: Option<&ExitReason>) -> String {
        let lines = self.lines();
        let mut out = String::new();

        if !lines.is_empty() {
            out.push_str("stderr (most recent last):\n");
            for line in &lines {
                out.push_str("  ");
                out.push_str(line);
                out.push('\n');
            }
        }

        if let Some(reason) = exit {
            out.push_str("process ");
            out.push_str(&reason.to_string());
            out.push('\n');
        }

        out.trim_end().to_string()
    }
}
