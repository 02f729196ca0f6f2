//! abc-par - Table-driven parser for classic line-numbered BASIC.
//!
//! The grammar lives in [`grammar`] as byte-coded rule tables; this
//! crate interprets them with a backtracking recursive descent engine.
//! On entry to a rule the engine snapshots the lexer; when a terminal
//! fails to match or a sub-rule fails, it restores the snapshot and
//! retries from the next `Alt` marker. Restoring a snapshot re-lexes
//! from the saved byte offset, so tentative token text is never kept.
//!
//! Expressions are parsed by the Pratt sub-parser in [`expr`], wired
//! into the tables as a dedicated step. Three constructs are handled
//! directly rather than through tables, each for a concrete reason:
//!
//! - `PRINT` must record separators (`,` `;`) in source order and
//!   detect a trailing separator, which suppresses the newline;
//! - `REM` text is swallowed by the lexer, so the statement just
//!   wraps the comment token;
//! - the IF consequent parses statements until `ELSE`, a colon
//!   followed by `ELSE`, or end of line.
//!
//! `parse_program` enforces the line structure: every non-blank line
//! starts with an integer line number in 0..=32767, strictly
//! increasing. Errors are reported through the [`Handler`] with the
//! offending source line and a caret column, and the parser recovers
//! by skipping to the next end of line. After a clean parse, constant
//! GOTO/GOSUB/ON targets are checked against the set of line numbers
//! actually seen.

pub mod ast;
pub mod expr;
pub mod grammar;

use abc_lex::{token_name, Lexer, Token, TokenKind};
use abc_util::{Diagnostic, Handler, Span};
use rustc_hash::FxHashSet;

pub use ast::{Node, NodeKind};
pub use grammar::Nt;

use grammar::Step;

/// Backtracking depth bound; pathological inputs fail instead of
/// overflowing the stack.
const MAX_PARSE_DEPTH: u32 = 2000;

struct PendingError {
    message: String,
    span: Span,
}

/// The parser. One instance parses one source buffer.
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    source_lines: Vec<&'a str>,
    handler: &'a Handler,
    current_line: u16,
    previous_line: i32,
    known_lines: FxHashSet<u16>,
    pending: Option<PendingError>,
    depth: u32,
}

fn next_alternative(rule: &[Step], mut i: usize) -> Option<usize> {
    while i < rule.len() {
        if matches!(rule[i], Step::Alt) {
            return Some(i + 1);
        }
        i += 1;
    }
    None
}

/// Node for a matched terminal.
fn token_node(tok: Token) -> Node {
    match tok.kind {
        TokenKind::Ident => Node::variable(tok.text.unwrap_or_default()),
        TokenKind::Number => Node::number(tok.value),
        TokenKind::String => Node::string(tok.text.unwrap_or_default()),
        kind => Node::operator(kind),
    }
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str, handler: &'a Handler) -> Self {
        Self {
            lexer: Lexer::new(source),
            source_lines: source.lines().collect(),
            handler,
            current_line: 0,
            previous_line: 0,
            known_lines: FxHashSet::default(),
            pending: None,
            depth: 0,
        }
    }

    // =========================================================================
    // ERROR PLUMBING
    // =========================================================================

    pub(crate) fn set_error(&mut self, message: impl Into<String>) {
        let span = self.lexer.peek().span;
        match &mut self.pending {
            // The first error in a statement pins the position; later
            // ones may refine the message.
            Some(pending) => pending.message = message.into(),
            None => {
                self.pending = Some(PendingError {
                    message: message.into(),
                    span,
                })
            }
        }
    }

    fn set_error_at(&mut self, message: impl Into<String>, span: Span) {
        self.pending = Some(PendingError {
            message: message.into(),
            span,
        });
    }

    pub(crate) fn clear_error(&mut self) {
        self.pending = None;
    }

    pub(crate) fn has_pending_error(&self) -> bool {
        self.pending.is_some()
    }

    pub(crate) fn flush_error(&mut self) {
        if let Some(pending) = self.pending.take() {
            let source_line = self.source_line(pending.span.line);
            self.handler.emit(
                Diagnostic::error(pending.message, self.current_line)
                    .with_source(source_line, pending.span.column as usize),
            );
        }
    }

    fn source_line(&self, line: u32) -> String {
        self.source_lines
            .get(line.saturating_sub(1) as usize)
            .copied()
            .unwrap_or("")
            .to_string()
    }

    pub(crate) fn eat(&mut self, kind: TokenKind) -> bool {
        if self.lexer.peek().kind == kind {
            self.lexer.bump();
            true
        } else {
            false
        }
    }

    // =========================================================================
    // RULE ENGINE
    // =========================================================================

    /// Interpret the rule table for `nt`.
    ///
    /// Produces an `Expression` node whose children are, in order:
    /// nodes for matched terminals, nodes for matched sub-rules, and
    /// Pratt results for expression steps. Returns `None` when no
    /// alternative matches; the lexer is left where the last
    /// alternative gave up.
    fn parse_nonterminal(&mut self, nt: Nt) -> Option<Node> {
        match nt {
            Nt::Statement => return self.parse_statement(),
            Nt::IfBody => return self.parse_if_body(),
            _ => {}
        }

        self.depth += 1;
        if self.depth > MAX_PARSE_DEPTH {
            self.set_error("Recursion depth exceeded");
            self.depth -= 1;
            return None;
        }

        let rule = grammar::rule(nt);
        let mut node = Node::new(NodeKind::Expression);
        let saved = self.lexer.clone();
        let mut i = 0usize;
        let mut alt_start = 0usize;

        let result = loop {
            if i >= rule.len() {
                break Some(node);
            }
            match rule[i] {
                Step::Alt => {
                    if i > alt_start {
                        // The previous alternative ran to completion.
                        break Some(node);
                    }
                    alt_start = i + 1;
                    i = alt_start;
                }
                Step::Eps => break Some(node),
                Step::Expr => match self.parse_expr() {
                    Some(child) => {
                        node.add_child(child);
                        i += 1;
                    }
                    None => {
                        self.clear_error();
                        match next_alternative(rule, i) {
                            Some(next) => {
                                self.lexer = saved.clone();
                                node.children.clear();
                                alt_start = next;
                                i = next;
                            }
                            None => break None,
                        }
                    }
                },
                Step::N(child_nt) => match self.parse_nonterminal(child_nt) {
                    Some(child) => {
                        node.add_child(child);
                        i += 1;
                    }
                    None => match next_alternative(rule, i) {
                        Some(next) => {
                            self.clear_error();
                            self.lexer = saved.clone();
                            node.children.clear();
                            alt_start = next;
                            i = next;
                        }
                        None => break None,
                    },
                },
                Step::T(expected) => {
                    if self.lexer.peek().kind == expected {
                        let tok = self.lexer.bump();
                        node.add_child(token_node(tok));
                        i += 1;
                    } else {
                        match next_alternative(rule, i) {
                            Some(next) => {
                                self.lexer = saved.clone();
                                node.children.clear();
                                alt_start = next;
                                i = next;
                            }
                            None => break None,
                        }
                    }
                }
            }
        };

        self.depth -= 1;
        result
    }

    // =========================================================================
    // STATEMENTS
    // =========================================================================

    /// Parse one statement. Returns `None` at end of statement or on
    /// error (with a pending diagnostic in the latter case).
    pub fn parse_statement(&mut self) -> Option<Node> {
        let tok = self.lexer.peek().clone();

        match tok.kind {
            TokenKind::Eol | TokenKind::Eof | TokenKind::Colon => return None,
            TokenKind::Number => {
                self.set_error(
                    "Unexpected line number in statement (line numbers only allowed at start of line)",
                );
                return None;
            }
            TokenKind::Print | TokenKind::Question => return self.parse_print(),
            TokenKind::Rem => {
                // The lexer swallowed the comment into the token text.
                self.lexer.bump();
                let mut stmt = Node::statement(TokenKind::Rem, self.current_line);
                stmt.add_child(Node::string(tok.text.unwrap_or_default()));
                return Some(stmt);
            }
            _ => {}
        }

        let Some(rule_nt) = grammar::statement_rule(tok.kind) else {
            let message = if tok.kind == TokenKind::Ident {
                "Unknown statement".to_string()
            } else {
                format!("Unknown or misplaced {}", token_name(tok.kind))
            };
            self.set_error(message);
            self.lexer.bump();
            return None;
        };

        let mut stmt = Node::statement(tok.kind, self.current_line);

        // An identifier at statement position is an implied LET; the
        // LET rule consumes the identifier itself.
        if tok.kind != TokenKind::Ident {
            self.lexer.bump();
        }

        match self.parse_nonterminal(rule_nt) {
            Some(result) => {
                stmt.children.extend(result.children);
                Some(stmt)
            }
            None => {
                if !self.has_pending_error() {
                    self.report_statement_failure(&stmt, &tok);
                }
                None
            }
        }
    }

    fn report_statement_failure(&mut self, stmt: &Node, start: &Token) {
        let found = self.lexer.peek().kind;
        if stmt.token == TokenKind::Ident {
            let name = start.text();
            let message = match found {
                TokenKind::LParen => format!("Unknown function '{name}'"),
                TokenKind::Eol | TokenKind::Eof | TokenKind::Colon => {
                    format!("Unknown statement '{name}' (or missing '=' for assignment)")
                }
                TokenKind::Comma | TokenKind::Semicolon => {
                    format!("Unknown statement '{name}'")
                }
                other => format!(
                    "Expected '=' but found {} (for variable '{name}' assignment)",
                    token_name(other)
                ),
            };
            self.set_error_at(message, start.span);
        } else {
            let message = format!("Syntax error in {} statement", token_name(stmt.token));
            self.set_error(message);
        }
    }

    /// PRINT is parsed directly: items and separators are collected in
    /// source order so the compiler can see a trailing separator, and
    /// `PRINT #channel,` needs special handling up front. A matched
    /// channel is recorded as a leading `#` operator node followed by
    /// the channel expression.
    fn parse_print(&mut self) -> Option<Node> {
        let tok = self.lexer.bump();
        let mut stmt = Node::statement(tok.kind, self.current_line);

        if self.lexer.peek().kind == TokenKind::Hash {
            self.lexer.bump();
            let Some(channel) = self.parse_expr() else {
                self.set_error("Expected channel number after #");
                return Some(stmt);
            };
            if !self.eat(TokenKind::Comma) {
                self.set_error("Expected comma after channel number in PRINT#");
                return Some(stmt);
            }
            stmt.add_child(Node::operator(TokenKind::Hash));
            stmt.add_child(channel);
        }

        loop {
            match self.lexer.peek().kind {
                TokenKind::Eol | TokenKind::Eof | TokenKind::Colon | TokenKind::Else => break,
                kind @ (TokenKind::Semicolon | TokenKind::Comma) => {
                    stmt.add_child(Node::operator(kind));
                    self.lexer.bump();
                }
                _ => match self.parse_expr() {
                    Some(item) => stmt.add_child(item),
                    None => break,
                },
            }
        }

        Some(stmt)
    }

    /// IF consequent: a bare line number (GOTO shorthand) or
    /// statements up to `ELSE`, a colon directly before `ELSE`, or end
    /// of line.
    fn parse_if_body(&mut self) -> Option<Node> {
        if self.lexer.peek().kind == TokenKind::Number {
            let tok = self.lexer.bump();
            return Some(Node::number(tok.value));
        }

        let mut node = Node::new(NodeKind::Expression);
        loop {
            match self.lexer.peek().kind {
                TokenKind::Else | TokenKind::Eol | TokenKind::Eof => break,
                TokenKind::Colon => {
                    if self.else_follows_colon() {
                        break;
                    }
                    self.lexer.bump();
                    continue;
                }
                _ => {}
            }

            match self.parse_statement() {
                Some(child) => node.add_child(child),
                None => {
                    if self.has_pending_error() {
                        return None;
                    }
                    break;
                }
            }

            match self.lexer.peek().kind {
                TokenKind::Colon => {
                    if self.else_follows_colon() {
                        break;
                    }
                    self.lexer.bump();
                }
                _ => break,
            }
        }
        Some(node)
    }

    fn else_follows_colon(&mut self) -> bool {
        let saved = self.lexer.clone();
        self.lexer.bump();
        let is_else = self.lexer.peek().kind == TokenKind::Else;
        self.lexer = saved;
        is_else
    }

    // =========================================================================
    // PROGRAM STRUCTURE
    // =========================================================================

    /// Parse the whole program.
    ///
    /// The returned root is a pseudo-statement whose children are the
    /// program's statements in source order, each tagged with its
    /// BASIC line number. Errors are reported through the handler; the
    /// caller decides whether the error count permits compilation.
    pub fn parse_program(&mut self) -> Node {
        let mut program = Node::new(NodeKind::Statement);

        loop {
            match self.lexer.peek().kind {
                TokenKind::Eof => break,
                TokenKind::Eol => {
                    self.lexer.bump();
                    continue;
                }
                TokenKind::Number => {}
                other => {
                    self.set_error(format!(
                        "Program line must start with a line number (found {})",
                        token_name(other)
                    ));
                    self.flush_error();
                    self.recover_to_eol();
                    continue;
                }
            }

            let tok = self.lexer.bump();
            if !self.record_line_number(tok.value, tok.span) {
                self.recover_to_eol();
                continue;
            }

            // Statements on this line, separated by colons.
            loop {
                match self.lexer.peek().kind {
                    TokenKind::Eol => {
                        self.lexer.bump();
                        break;
                    }
                    TokenKind::Eof => break,
                    TokenKind::Colon => {
                        self.lexer.bump();
                        continue;
                    }
                    _ => {}
                }

                if let Some(stmt) = self.parse_statement() {
                    program.add_child(stmt);
                }

                if self.has_pending_error() {
                    self.flush_error();
                    self.recover_to_eol();
                    break;
                }

                match self.lexer.peek().kind {
                    TokenKind::Colon => {
                        self.lexer.bump();
                    }
                    TokenKind::Eol => {
                        self.lexer.bump();
                        break;
                    }
                    TokenKind::Eof => break,
                    other => {
                        self.set_error(format!(
                            "Unexpected {} after statement (expected colon or end of line)",
                            token_name(other)
                        ));
                        self.flush_error();
                        self.recover_to_eol();
                        break;
                    }
                }
            }
        }

        self.report_unknown_chars();
        if !self.handler.has_errors() {
            self.validate_line_refs(&program);
        }
        program
    }

    fn record_line_number(&mut self, value: f64, span: Span) -> bool {
        let line = value as i64;
        if !(0..=32767).contains(&line) {
            self.set_error_at(format!("Line number {line} exceeds maximum (32767)"), span);
            self.flush_error();
            return false;
        }
        let line = line as u16;
        self.current_line = line;

        if self.previous_line > 0 && i32::from(line) <= self.previous_line {
            let message = if i32::from(line) == self.previous_line {
                format!("Duplicate line number {line}")
            } else {
                format!(
                    "Line number {line} must be greater than previous line {}",
                    self.previous_line
                )
            };
            self.set_error_at(message, span);
            self.flush_error();
            return false;
        }
        if !self.known_lines.insert(line) {
            self.set_error_at(format!("Duplicate line number {line}"), span);
            self.flush_error();
            return false;
        }
        self.previous_line = i32::from(line);
        true
    }

    fn recover_to_eol(&mut self) {
        loop {
            match self.lexer.peek().kind {
                TokenKind::Eof => break,
                TokenKind::Eol => {
                    self.lexer.bump();
                    break;
                }
                _ => {
                    self.lexer.bump();
                }
            }
        }
        self.clear_error();
    }

    fn report_unknown_chars(&self) {
        let mut seen = FxHashSet::default();
        for (ch, span) in self.lexer.unknown_chars() {
            if seen.insert((span.line, span.column)) {
                self.handler.emit(
                    Diagnostic::warning(format!("Unknown character '{ch}'"), 0)
                        .with_source(self.source_line(span.line), span.column as usize),
                );
            }
        }
    }

    // =========================================================================
    // CROSS-REFERENCE VALIDATION
    // =========================================================================

    fn validate_line_refs(&self, node: &Node) {
        if node.kind == NodeKind::Statement {
            match node.token {
                TokenKind::Goto | TokenKind::Gosub => {
                    if let Some(target) = node
                        .children
                        .first()
                        .filter(|c| c.kind == NodeKind::Constant && c.token == TokenKind::Number)
                    {
                        self.check_target(
                            target.value,
                            if node.token == TokenKind::Goto {
                                "GOTO"
                            } else {
                                "GOSUB"
                            },
                            node.line,
                        );
                    }
                }
                TokenKind::On => {
                    if let Some(targets) = node.children.get(2) {
                        self.check_on_targets(targets, node.line);
                    }
                }
                _ => {}
            }
        }
        for child in &node.children {
            self.validate_line_refs(child);
        }
    }

    fn check_target(&self, value: f64, context: &str, line: u16) {
        let target = value as i64;
        let known =
            (0..=32767).contains(&target) && self.known_lines.contains(&(target as u16));
        if !known {
            self.handler.emit(Diagnostic::error(
                format!("Undefined line number {target} in {context}"),
                line,
            ));
        }
    }

    fn check_on_targets(&self, node: &Node, line: u16) {
        if node.kind == NodeKind::Constant && node.token == TokenKind::Number {
            self.check_target(node.value, "ON statement", line);
        }
        for child in &node.children {
            self.check_on_targets(child, line);
        }
    }
}
