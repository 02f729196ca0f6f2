//! Runtime error kinds.
//!
//! Display strings are the classic BASIC error texts; they are what a
//! program without an armed TRAP sees on stderr after `ERROR - `.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("STACK UNDERFLOW")]
    StackUnderflow,

    #[error("STRING STACK UNDERFLOW")]
    StringStackUnderflow,

    #[error("DIVISION BY ZERO")]
    DivisionByZero,

    #[error("LOG OF NEGATIVE NUMBER")]
    LogOfNegative,

    #[error("SQRT OF NEGATIVE NUMBER")]
    SqrtOfNegative,

    #[error("ARRAY BOUNDS ERROR")]
    ArrayBounds,

    #[error("OUT OF DATA")]
    OutOfData,

    #[error("UNDEF'D STATEMENT")]
    UndefinedStatement,

    #[error("RETURN WITHOUT GOSUB")]
    ReturnWithoutGosub,

    #[error("NEXT variable mismatch: expected {expected}, got {found}")]
    NextMismatch { expected: String, found: String },

    #[error("NEXT WITHOUT FOR")]
    NextWithoutFor,

    #[error("ILLEGAL ADDRESS IN PEEK")]
    IllegalPeekAddress,

    #[error("ILLEGAL ADDRESS IN POKE")]
    IllegalPokeAddress,

    #[error("Invalid channel number")]
    InvalidChannel,

    #[error("Channel not open")]
    ChannelNotOpen,

    #[error("Cannot open file '{0}'")]
    CannotOpenFile(String),

    #[error("Cannot delete file '{0}'")]
    CannotDeleteFile(String),

    #[error("Unsupported XIO command {0}")]
    UnsupportedXio(u8),

    #[error("unknown opcode 0x{0:02X}")]
    UnknownOpcode(u8),

    /// An instruction operand pointed outside its pool or table. A
    /// compiler-produced image never does this; a corrupt or
    /// hand-assembled one might.
    #[error("invalid instruction operand")]
    InvalidOperand,

    #[error("I/O ERROR")]
    Io(#[from] std::io::Error),
}
