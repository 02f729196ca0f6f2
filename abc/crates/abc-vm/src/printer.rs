//! Print formatter state.
//!
//! Classic BASIC number formatting is contextual: a number gets a
//! leading sign-field space unless the "after tab" flag is set, and a
//! trailing space unless a newline, tab, or no-separator opcode comes
//! next. The flag is set by `,`-tabs, `TAB()`, the no-separator
//! opcode, and by a just-printed number, and cleared by printed
//! strings, which is what makes `PRINT 1;2` come out as ` 1 2` while
//! `PRINT "A";"B"` is `AB`.

/// Default output width used by `TAB()` wrapping.
pub const DEFAULT_WIDTH: usize = 80;

#[derive(Clone, Debug)]
pub struct PrintState {
    /// Current column, 1-based.
    pub column: usize,
    /// Output width for TAB wrapping.
    pub width: usize,
    /// Current output channel; 0 is the VM's standard output.
    pub channel: u8,
    /// Suppress the leading space of the next number.
    pub after_tab: bool,
    /// A PRINT has produced output since the last newline.
    pub needs_newline: bool,
    /// Last character written.
    pub last_char: char,
}

impl PrintState {
    pub fn new() -> Self {
        Self {
            column: 1,
            width: DEFAULT_WIDTH,
            channel: 0,
            after_tab: false,
            needs_newline: false,
            last_char: '\0',
        }
    }

    /// Track a run of printed text.
    pub fn advance(&mut self, text: &str) {
        self.column += text.chars().count();
        if let Some(last) = text.chars().last() {
            self.last_char = last;
        }
    }

    /// Reset at a newline; output reverts to the standard channel.
    pub fn newline(&mut self) {
        self.column = 1;
        self.after_tab = false;
        self.needs_newline = false;
        self.last_char = '\n';
        self.channel = 0;
    }
}

impl Default for PrintState {
    fn default() -> Self {
        Self::new()
    }
}
