//! Diagnostic collection and rendering.
//!
//! The [`Handler`] collects [`Diagnostic`] records during a compile.
//! Errors are counted, not thrown: the parser reports and recovers,
//! and the driver decides afterwards whether the error count permits
//! code generation.
//!
//! A rendered error looks like:
//!
//! ```text
//! ERROR at line 20: Expected ')' after array subscript
//!   20 PRINT A(1
//!             ^
//! ```

use std::cell::RefCell;
use std::fmt;

/// Diagnostic severity level.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    /// Prevents code generation.
    Error,
    /// Reported but does not block the compile.
    Warning,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Error => write!(f, "ERROR"),
            Level::Warning => write!(f, "WARNING"),
        }
    }
}

/// A single diagnostic with enough context to render a caret line.
#[derive(Clone, Debug)]
pub struct Diagnostic {
    pub level: Level,
    pub message: String,
    /// BASIC line number the diagnostic belongs to (0 if unknown).
    pub basic_line: u16,
    /// Copy of the offending physical source line.
    pub source_line: String,
    /// Caret column within `source_line` (0-based).
    pub column: usize,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>, basic_line: u16) -> Self {
        Self {
            level: Level::Error,
            message: message.into(),
            basic_line,
            source_line: String::new(),
            column: 0,
        }
    }

    pub fn warning(message: impl Into<String>, basic_line: u16) -> Self {
        Self {
            level: Level::Warning,
            message: message.into(),
            basic_line,
            source_line: String::new(),
            column: 0,
        }
    }

    /// Attach the source line copy and caret column.
    pub fn with_source(mut self, source_line: impl Into<String>, column: usize) -> Self {
        self.source_line = source_line.into();
        self.column = column;
        self
    }

    /// Render in the fixed three-line format used by the toolchain.
    pub fn render(&self) -> String {
        let mut out = format!("{} at line {}: {}\n", self.level, self.basic_line, self.message);
        if !self.source_line.is_empty() {
            out.push_str("  ");
            out.push_str(&self.source_line);
            out.push('\n');
            out.push_str("  ");
            for _ in 0..self.column {
                out.push(' ');
            }
            out.push('^');
            out.push('\n');
        }
        out
    }
}

/// Collects diagnostics for one compile.
///
/// Interior mutability lets phases that only hold `&Handler` report
/// errors; the whole pipeline is single-threaded.
#[derive(Default)]
pub struct Handler {
    diagnostics: RefCell<Vec<Diagnostic>>,
}

impl Handler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&self, diagnostic: Diagnostic) {
        self.diagnostics.borrow_mut().push(diagnostic);
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .borrow()
            .iter()
            .any(|d| d.level == Level::Error)
    }

    pub fn error_count(&self) -> usize {
        self.diagnostics
            .borrow()
            .iter()
            .filter(|d| d.level == Level::Error)
            .count()
    }

    pub fn warning_count(&self) -> usize {
        self.diagnostics
            .borrow()
            .iter()
            .filter(|d| d.level == Level::Warning)
            .count()
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics.borrow().clone()
    }

    /// Render every collected diagnostic to `out` in emission order.
    pub fn render_all(&self, out: &mut dyn std::io::Write) -> std::io::Result<()> {
        for diag in self.diagnostics.borrow().iter() {
            out.write_all(diag.render().as_bytes())?;
        }
        Ok(())
    }
}
