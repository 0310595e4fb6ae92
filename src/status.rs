use std::io::{self, IsTerminal, Write};

use crossterm::ExecutableCommand;
use crossterm::cursor::MoveToColumn;
use crossterm::style::Print;
use crossterm::terminal::{Clear, ClearType};

use crate::app::{ProgressEvent, ProgressSink};

/// One transient line on stderr, rewritten per event and wiped on `clear`.
/// Does nothing when stderr is not a terminal.
pub struct StatusLine {
    enabled: bool,
}

impl StatusLine {
    pub fn new() -> Self {
        Self {
            enabled: io::stderr().is_terminal(),
        }
    }

    fn redraw(&self, message: Option<&str>) -> io::Result<()> {
        let mut stderr = io::stderr();
        stderr
            .execute(MoveToColumn(0))?
            .execute(Clear(ClearType::CurrentLine))?;
        if let Some(message) = message {
            stderr.execute(Print(message))?;
        }
        stderr.flush()
    }
}

impl Default for StatusLine {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for StatusLine {
    fn event(&self, event: ProgressEvent) {
        if self.enabled {
            let _ = self.redraw(Some(event.message.trim()));
        }
    }

    fn clear(&self) {
        if self.enabled {
            let _ = self.redraw(None);
        }
    }
}
