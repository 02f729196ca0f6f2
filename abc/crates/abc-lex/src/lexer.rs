//! The BASIC lexer.
//!
//! Keyword recognition is longest-match with implicit separation. At
//! the start of a word the lexer probes keyword spellings of
//! increasing length; a match followed by a non-letter is a clean
//! boundary and is taken immediately, while a match followed by a
//! letter is remembered and only wins once every longer probe has
//! failed (`PRINTX` lexes as `PRINT` `X`). If no keyword starts the
//! word, the lexer consumes identifier characters one at a time and
//! cuts the identifier as soon as a keyword begins at the current
//! position, which is what makes `IFFPRINT` come out as `IF` `F`
//! `PRINT` and `SFANDCINT` as `SF` `AND` `CINT`.
//!
//! The whole lexer is `Clone`; the parser snapshots it before trying
//! a grammar alternative and restores the snapshot to backtrack.

use abc_util::Span;

use crate::cursor::Cursor;
use crate::token::{keyword_token, Token, TokenKind, MAX_KEYWORD_PROBE};

fn is_ident_cont(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Lexer with one-token lookahead.
#[derive(Clone)]
pub struct Lexer<'a> {
    cursor: Cursor<'a>,
    current: Token,
    /// Characters no token could start with, recorded and skipped.
    unknown: Vec<(char, Span)>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        let mut lexer = Self {
            cursor: Cursor::new(source),
            current: Token::new(TokenKind::Eof, Span::DUMMY),
            unknown: Vec::new(),
        };
        lexer.current = lexer.read_token();
        lexer
    }

    /// The token the lexer is positioned on.
    pub fn peek(&self) -> &Token {
        &self.current
    }

    /// Consume the current token and return it.
    pub fn bump(&mut self) -> Token {
        let next = self.read_token();
        std::mem::replace(&mut self.current, next)
    }

    /// Unknown characters skipped so far.
    pub fn unknown_chars(&self) -> &[(char, Span)] {
        &self.unknown
    }

    fn skip_blanks(&mut self) {
        loop {
            match self.cursor.current() {
                b' ' | b'\t' | b'\r' => self.cursor.bump(),
                _ => break,
            }
        }
    }

    /// Consume to end of the physical line without eating the newline.
    fn take_rest_of_line(&mut self) -> String {
        let start = self.cursor;
        while !self.cursor.is_at_end() && self.cursor.current() != b'\n' {
            self.cursor.bump();
        }
        String::from_utf8_lossy(self.cursor.bytes_since(&start))
            .trim_start()
            .to_string()
    }

    fn read_token(&mut self) -> Token {
        loop {
            self.skip_blanks();
            let span = self.cursor.span();

            if self.cursor.is_at_end() {
                return Token::new(TokenKind::Eof, span);
            }

            match self.cursor.current() {
                b'\n' => {
                    self.cursor.bump();
                    return Token::new(TokenKind::Eol, span);
                }
                // Apostrophe comment, aliased to REM.
                b'\'' => {
                    self.cursor.bump();
                    let text = self.take_rest_of_line();
                    return Token::with_text(TokenKind::Rem, text, span);
                }
                b'"' => return self.read_string(span),
                b'0'..=b'9' => return self.read_number(span),
                b'.' if self.cursor.peek_at(1).is_ascii_digit() => return self.read_number(span),
                b'<' if self.cursor.peek_at(1) == b'=' => {
                    self.cursor.bump();
                    self.cursor.bump();
                    return Token::new(TokenKind::LessEq, span);
                }
                b'<' if self.cursor.peek_at(1) == b'>' => {
                    self.cursor.bump();
                    self.cursor.bump();
                    return Token::new(TokenKind::NotEq, span);
                }
                b'>' if self.cursor.peek_at(1) == b'=' => {
                    self.cursor.bump();
                    self.cursor.bump();
                    return Token::new(TokenKind::GreaterEq, span);
                }
                b',' => return self.single(TokenKind::Comma, span),
                b':' => return self.single(TokenKind::Colon, span),
                b';' => return self.single(TokenKind::Semicolon, span),
                b'#' => return self.single(TokenKind::Hash, span),
                b'<' => return self.single(TokenKind::Less, span),
                b'>' => return self.single(TokenKind::Greater, span),
                b'=' => return self.single(TokenKind::Eq, span),
                b'^' => return self.single(TokenKind::Caret, span),
                b'*' => return self.single(TokenKind::Star, span),
                b'+' => return self.single(TokenKind::Plus, span),
                b'-' => return self.single(TokenKind::Minus, span),
                b'/' => return self.single(TokenKind::Slash, span),
                b'(' => return self.single(TokenKind::LParen, span),
                b')' => return self.single(TokenKind::RParen, span),
                b'$' => return self.single(TokenKind::Dollar, span),
                b'?' => return self.single(TokenKind::Question, span),
                b if b.is_ascii_alphabetic() => return self.read_word(span),
                other => {
                    self.unknown.push((other as char, span));
                    self.cursor.bump();
                }
            }
        }
    }

    fn single(&mut self, kind: TokenKind, span: Span) -> Token {
        self.cursor.bump();
        Token::new(kind, span)
    }

    fn read_string(&mut self, span: Span) -> Token {
        self.cursor.bump();
        let start = self.cursor;
        // Runs to the next quote; newlines are allowed inside and the
        // closing quote is optional at EOF.
        while !self.cursor.is_at_end() && self.cursor.current() != b'"' {
            self.cursor.bump();
        }
        let text = String::from_utf8_lossy(self.cursor.bytes_since(&start)).into_owned();
        if self.cursor.current() == b'"' {
            self.cursor.bump();
        }
        Token::with_text(TokenKind::String, text, span)
    }

    fn read_number(&mut self, span: Span) -> Token {
        let start = self.cursor;
        while self.cursor.current().is_ascii_digit() {
            self.cursor.bump();
        }
        if self.cursor.current() == b'.' {
            self.cursor.bump();
            while self.cursor.current().is_ascii_digit() {
                self.cursor.bump();
            }
        }
        // Exponent only counts when at least one digit follows it.
        let exp = self.cursor.current();
        if exp == b'e' || exp == b'E' {
            let sign = self.cursor.peek_at(1);
            let digits_at = if sign == b'+' || sign == b'-' { 2 } else { 1 };
            if self.cursor.peek_at(digits_at).is_ascii_digit() {
                self.cursor.bump();
                if sign == b'+' || sign == b'-' {
                    self.cursor.bump();
                }
                while self.cursor.current().is_ascii_digit() {
                    self.cursor.bump();
                }
            }
        }
        let text = String::from_utf8_lossy(self.cursor.bytes_since(&start)).into_owned();
        let value = text.parse::<f64>().unwrap_or(0.0);
        Token::with_value(TokenKind::Number, value, span)
    }

    fn read_word(&mut self, span: Span) -> Token {
        let start = self.cursor;
        let bytes = start.rest_bytes();

        // Keyword probe lengths run up to the first non-word character,
        // or to the probe window when the word is longer than that.
        let probe_max = match bytes
            .iter()
            .take(MAX_KEYWORD_PROBE)
            .position(|&b| !is_ident_cont(b) && b != b'$')
        {
            Some(i) => i,
            None => MAX_KEYWORD_PROBE - 1,
        }
        .min(bytes.len());

        let mut best: Option<(usize, TokenKind)> = None;
        for len in 1..=probe_max {
            if let Some(kind) = keyword_token(&bytes[..len]) {
                let boundary = !bytes
                    .get(len)
                    .map_or(false, |b| b.is_ascii_alphabetic());
                if boundary {
                    best = Some((len, kind));
                    break;
                }
                if best.map_or(true, |(best_len, _)| len > best_len) {
                    best = Some((len, kind));
                }
            }
        }

        if let Some((len, kind)) = best {
            for _ in 0..len {
                self.cursor.bump();
            }
            if kind == TokenKind::Rem {
                let text = self.take_rest_of_line();
                return Token::with_text(TokenKind::Rem, text, span);
            }
            return Token::new(kind, span);
        }

        // Identifier: consume one character at a time and cut as soon
        // as a keyword starts at the current position.
        while is_ident_cont(self.cursor.current()) {
            self.cursor.bump();
            let rest = self.cursor.rest_bytes();
            let cap = rest.len().min(MAX_KEYWORD_PROBE);
            let mut keyword_ahead = false;
            for len in 1..=cap {
                if keyword_token(&rest[..len]).is_some() {
                    keyword_ahead = true;
                    break;
                }
            }
            if keyword_ahead {
                break;
            }
        }
        if self.cursor.current() == b'$' {
            self.cursor.bump();
        }
        let text = String::from_utf8_lossy(self.cursor.bytes_since(&start)).into_owned();
        Token::with_text(TokenKind::Ident, text, span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let mut lexer = Lexer::new(source);
        let mut out = Vec::new();
        loop {
            let tok = lexer.bump();
            let done = tok.kind == TokenKind::Eof;
            out.push(tok.kind);
            if done {
                break;
            }
        }
        out
    }

    fn texts(source: &str) -> Vec<String> {
        let mut lexer = Lexer::new(source);
        let mut out = Vec::new();
        while lexer.peek().kind != TokenKind::Eof {
            let tok = lexer.bump();
            out.push(tok.text.unwrap_or_default());
        }
        out
    }

    // =========================================================================
    // KEYWORD SPLITTING
    // =========================================================================

    #[test]
    fn test_keyword_butted_against_identifier() {
        assert_eq!(
            kinds("IFFPRINT"),
            vec![
                TokenKind::If,
                TokenKind::Ident,
                TokenKind::Print,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_identifier_cut_before_keyword() {
        assert_eq!(
            kinds("SFANDCINT"),
            vec![
                TokenKind::Ident,
                TokenKind::And,
                TokenKind::Int,
                TokenKind::Eof
            ]
        );
        assert_eq!(texts("SFANDCINT")[0], "SF");
    }

    #[test]
    fn test_for_without_spaces() {
        assert_eq!(
            kinds("FORI=1TO10"),
            vec![
                TokenKind::For,
                TokenKind::Ident,
                TokenKind::Eq,
                TokenKind::Number,
                TokenKind::To,
                TokenKind::Number,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_keyword_prefix_of_identifier_wins() {
        // PRINTX is PRINT followed by the variable X.
        assert_eq!(
            kinds("PRINTX"),
            vec![TokenKind::Print, TokenKind::Ident, TokenKind::Eof]
        );
    }

    #[test]
    fn test_plain_identifier() {
        let mut lexer = Lexer::new("COUNT2");
        let tok = lexer.bump();
        assert_eq!(tok.kind, TokenKind::Ident);
        assert_eq!(tok.text(), "COUNT2");
    }

    #[test]
    fn test_string_typed_identifier() {
        let mut lexer = Lexer::new("NAME$ = 1");
        let tok = lexer.bump();
        assert_eq!(tok.kind, TokenKind::Ident);
        assert_eq!(tok.text(), "NAME$");
    }

    #[test]
    fn test_dollar_function_keywords() {
        assert_eq!(
            kinds("MID$(A$,1,2)"),
            vec![
                TokenKind::MidFn,
                TokenKind::LParen,
                TokenKind::Ident,
                TokenKind::Comma,
                TokenKind::Number,
                TokenKind::Comma,
                TokenKind::Number,
                TokenKind::RParen,
                TokenKind::Eof
            ]
        );
    }

    // =========================================================================
    // LITERALS
    // =========================================================================

    #[test]
    fn test_number_forms() {
        let mut lexer = Lexer::new("10 .5 1.25e3 2E-2");
        assert_eq!(lexer.bump().value, 10.0);
        assert_eq!(lexer.bump().value, 0.5);
        assert_eq!(lexer.bump().value, 1250.0);
        assert_eq!(lexer.bump().value, 0.02);
    }

    #[test]
    fn test_exponent_needs_digits() {
        // "1E" is the number 1 followed by the identifier E.
        assert_eq!(
            kinds("1E"),
            vec![TokenKind::Number, TokenKind::Ident, TokenKind::Eof]
        );
    }

    #[test]
    fn test_string_literal() {
        let mut lexer = Lexer::new("\"HELLO, WORLD\"");
        let tok = lexer.bump();
        assert_eq!(tok.kind, TokenKind::String);
        assert_eq!(tok.text(), "HELLO, WORLD");
    }

    #[test]
    fn test_string_unterminated_at_eof() {
        let mut lexer = Lexer::new("\"OPEN ENDED");
        let tok = lexer.bump();
        assert_eq!(tok.kind, TokenKind::String);
        assert_eq!(tok.text(), "OPEN ENDED");
        assert_eq!(lexer.peek().kind, TokenKind::Eof);
    }

    #[test]
    fn test_string_spans_newline() {
        let mut lexer = Lexer::new("\"A\nB\"");
        assert_eq!(lexer.bump().text(), "A\nB");
    }

    // =========================================================================
    // COMMENTS AND STRUCTURE
    // =========================================================================

    #[test]
    fn test_rem_swallows_line() {
        assert_eq!(
            kinds("REM PRINT 1\nEND"),
            vec![
                TokenKind::Rem,
                TokenKind::Eol,
                TokenKind::End,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_apostrophe_comment() {
        let mut lexer = Lexer::new("' NOTES GO HERE\n");
        let tok = lexer.bump();
        assert_eq!(tok.kind, TokenKind::Rem);
        assert_eq!(tok.text(), "NOTES GO HERE");
        assert_eq!(lexer.peek().kind, TokenKind::Eol);
    }

    #[test]
    fn test_operators_and_separators() {
        assert_eq!(
            kinds("<= <> >= < > = ^ : ; # ?"),
            vec![
                TokenKind::LessEq,
                TokenKind::NotEq,
                TokenKind::GreaterEq,
                TokenKind::Less,
                TokenKind::Greater,
                TokenKind::Eq,
                TokenKind::Caret,
                TokenKind::Colon,
                TokenKind::Semicolon,
                TokenKind::Hash,
                TokenKind::Question,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_unknown_characters_skipped() {
        let mut lexer = Lexer::new("10 @ PRINT");
        assert_eq!(lexer.bump().kind, TokenKind::Number);
        assert_eq!(lexer.bump().kind, TokenKind::Print);
        assert_eq!(lexer.unknown_chars().len(), 1);
        assert_eq!(lexer.unknown_chars()[0].0, '@');
    }

    #[test]
    fn test_clone_restores_position() {
        let mut lexer = Lexer::new("10 PRINT 20");
        lexer.bump();
        let saved = lexer.clone();
        lexer.bump();
        lexer.bump();
        assert_eq!(lexer.peek().kind, TokenKind::Eof);
        let mut lexer = saved;
        assert_eq!(lexer.bump().kind, TokenKind::Print);
    }

    // =========================================================================
    // ROBUSTNESS
    // =========================================================================

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn lexing_always_terminates(source in ".{0,200}") {
                let mut lexer = Lexer::new(&source);
                let mut steps = 0usize;
                while lexer.peek().kind != TokenKind::Eof {
                    lexer.bump();
                    steps += 1;
                    prop_assert!(steps <= source.len() + 1);
                }
            }

            #[test]
            fn numbers_round_trip_through_lexer(value in 0.0f64..1e12) {
                let source = format!("{value}");
                let mut lexer = Lexer::new(&source);
                let tok = lexer.bump();
                prop_assert_eq!(tok.kind, TokenKind::Number);
                prop_assert!((tok.value - value).abs() <= value.abs() * 1e-12);
            }
        }
    }
}
