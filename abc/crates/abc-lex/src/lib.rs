//! abc-lex - Lexical analyzer for classic line-numbered BASIC.
//!
//! The lexer turns source text into a stream of [`Token`]s with
//! one-token lookahead (`peek` / `bump`). Two things distinguish it
//! from a conventional tokenizer:
//!
//! - **Newlines are tokens.** A physical newline produces
//!   [`TokenKind::Eol`]; the parser uses it to delimit program lines.
//!   Colons separate statements within a line and are tokens too.
//! - **Keywords need no separators.** Classic BASIC allows keywords to
//!   butt directly against identifiers and numbers (`FOR I=1TO10`,
//!   `IFFPRINT` meaning `IF F PRINT`). Keyword recognition is
//!   longest-match with implicit separation; see [`lexer`] for the
//!   exact algorithm.
//!
//! The lexer never fails: unknown characters are recorded and
//! skipped, and an unterminated string literal is closed at EOF.

pub mod cursor;
pub mod lexer;
pub mod token;

pub use lexer::Lexer;
pub use token::{keyword_token, token_name, Token, TokenKind};
