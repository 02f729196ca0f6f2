//! Expression parsing: a Pratt-style precedence climber driven by the
//! operator table.
//!
//! The grammar tables hand every `<EXP>` position to this sub-parser
//! ([`Step::Expr`](crate::grammar::Step)). Each token's table row
//! names a null-denotation action (what the token means in prefix
//! position) and a left-denotation action (what it means in infix
//! position); both are closed enums dispatched here.
//!
//! `^` is right-associative and recurses at its own binding power;
//! every other binary operator recurses one level tighter.

use abc_lex::TokenKind;

use crate::ast::{Node, NodeKind};
use crate::grammar::{function_info, operator_entry, LedAction, NudAction, UNARY_BP};
use crate::Parser;

impl<'a> Parser<'a> {
    /// Parse a complete expression.
    pub fn parse_expr(&mut self) -> Option<Node> {
        self.parse_expr_bp(0)
    }

    /// Parse an expression consuming only operators with left binding
    /// power of at least `min_bp`.
    pub(crate) fn parse_expr_bp(&mut self, min_bp: u8) -> Option<Node> {
        let kind = self.lexer.peek().kind;
        let entry = match operator_entry(kind) {
            Some(entry) if entry.nud != NudAction::None => entry,
            _ => {
                self.set_error("Expected expression");
                return None;
            }
        };

        let mut left = match entry.nud {
            NudAction::NumberLiteral => {
                let tok = self.lexer.bump();
                Node::number(tok.value)
            }
            NudAction::StringLiteral => {
                let tok = self.lexer.bump();
                Node::string(tok.text.unwrap_or_default())
            }
            NudAction::Variable => self.parse_variable()?,
            NudAction::Parenthesized => self.parse_parenthesized()?,
            NudAction::UnaryPlus => {
                self.lexer.bump();
                // +expr is just expr.
                self.parse_expr_bp(UNARY_BP)?
            }
            NudAction::UnaryMinus => {
                self.lexer.bump();
                let operand = self.parse_expr_bp(UNARY_BP)?;
                let mut node = Node::operator(TokenKind::Minus);
                node.add_child(operand);
                node
            }
            NudAction::UnaryNot => {
                self.lexer.bump();
                let operand = self.parse_expr_bp(UNARY_BP)?;
                let mut node = Node::operator(TokenKind::Not);
                node.add_child(operand);
                node
            }
            NudAction::FunctionCall => self.parse_function_call()?,
            NudAction::None => unreachable!(),
        };

        loop {
            let Some(entry) = operator_entry(self.lexer.peek().kind) else {
                break;
            };
            if entry.led != LedAction::BinaryOp || entry.lbp < min_bp {
                break;
            }
            left = self.parse_binary(left)?;
        }

        Some(left)
    }

    fn parse_parenthesized(&mut self) -> Option<Node> {
        self.lexer.bump();
        let expr = self.parse_expr()?;
        if !self.eat(TokenKind::RParen) {
            self.set_error("Expected ')'");
        }
        Some(expr)
    }

    fn parse_binary(&mut self, left: Node) -> Option<Node> {
        let op = self.lexer.peek().kind;
        let lbp = operator_entry(op).map_or(0, |e| e.lbp);
        self.lexer.bump();

        let right = if op == TokenKind::Caret {
            // Right-associative.
            self.parse_expr_bp(lbp)?
        } else {
            self.parse_expr_bp(lbp + 1)?
        };

        let mut node = Node::operator(op);
        node.add_child(left);
        node.add_child(right);
        Some(node)
    }

    /// Variable reference with an optional subscript list, which marks
    /// an array access.
    pub(crate) fn parse_variable(&mut self) -> Option<Node> {
        let tok = self.lexer.bump();
        let mut var = Node::variable(tok.text.unwrap_or_default());

        if self.lexer.peek().kind == TokenKind::LParen {
            self.lexer.bump();
            if self.lexer.peek().kind != TokenKind::RParen {
                let subscript = self.parse_expr()?;
                var.add_child(subscript);
                if self.lexer.peek().kind == TokenKind::Comma {
                    self.lexer.bump();
                    let subscript = self.parse_expr()?;
                    var.add_child(subscript);
                }
            }
            if !self.eat(TokenKind::RParen) {
                self.set_error("Expected ')' after array subscript");
            }
        }

        Some(var)
    }

    /// `name ( arg [, arg]* )` with arity validation against the
    /// function table.
    fn parse_function_call(&mut self) -> Option<Node> {
        let kind = self.lexer.peek().kind;
        let Some(info) = function_info(kind) else {
            self.set_error("Unknown function");
            return None;
        };

        let mut call = Node::new(NodeKind::FunctionCall);
        call.token = kind;
        self.lexer.bump();

        if self.lexer.peek().kind == TokenKind::LParen {
            self.lexer.bump();
            if self.lexer.peek().kind != TokenKind::RParen {
                let arg = self.parse_expr()?;
                call.add_child(arg);
                while self.lexer.peek().kind == TokenKind::Comma {
                    self.lexer.bump();
                    let arg = self.parse_expr()?;
                    call.add_child(arg);
                }
            }
            if !self.eat(TokenKind::RParen) {
                self.set_error("Expected ')' after function argument");
                return Some(call);
            }
        }

        let argc = call.children.len();
        if argc < info.min_args as usize || argc > info.max_args as usize {
            let msg = if info.min_args == info.max_args {
                format!(
                    "{} expects {} argument{}, got {}",
                    info.name,
                    info.min_args,
                    if info.min_args == 1 { "" } else { "s" },
                    argc
                )
            } else {
                format!(
                    "{} expects {}-{} arguments, got {}",
                    info.name, info.min_args, info.max_args, argc
                )
            };
            self.set_error(msg);
        }

        Some(call)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use abc_util::Handler;

    fn parse(source: &str) -> (Option<Node>, Handler) {
        let handler = Handler::new();
        let node = {
            let mut parser = Parser::new(source, &handler);
            let node = parser.parse_expr();
            if parser.has_pending_error() {
                parser.flush_error();
            }
            node
        };
        (node, handler)
    }

    fn parse_ok(source: &str) -> Node {
        let (node, handler) = parse(source);
        assert!(!handler.has_errors(), "unexpected errors for {source:?}");
        node.expect("expression should parse")
    }

    fn assert_op(node: &Node, token: TokenKind) {
        assert_eq!(node.kind, NodeKind::Operator, "{}", node.dump());
        assert_eq!(node.token, token, "{}", node.dump());
    }

    // =========================================================================
    // ATOMS
    // =========================================================================

    #[test]
    fn test_number_atom() {
        let node = parse_ok("42");
        assert_eq!(node.kind, NodeKind::Constant);
        assert_eq!(node.value, 42.0);
    }

    #[test]
    fn test_string_atom() {
        let node = parse_ok("\"HI\"");
        assert_eq!(node.kind, NodeKind::Constant);
        assert_eq!(node.token, TokenKind::String);
        assert_eq!(node.text(), "HI");
    }

    #[test]
    fn test_simple_variable() {
        let node = parse_ok("X");
        assert_eq!(node.kind, NodeKind::Variable);
        assert_eq!(node.text(), "X");
        assert!(node.children.is_empty());
    }

    #[test]
    fn test_array_access_1d() {
        let node = parse_ok("A(3)");
        assert_eq!(node.kind, NodeKind::Variable);
        assert_eq!(node.children.len(), 1);
    }

    #[test]
    fn test_array_access_2d() {
        let node = parse_ok("A(I,J+1)");
        assert_eq!(node.children.len(), 2);
    }

    // =========================================================================
    // PRECEDENCE AND ASSOCIATIVITY
    // =========================================================================

    #[test]
    fn test_multiplication_binds_tighter() {
        let node = parse_ok("1+2*3");
        assert_op(&node, TokenKind::Plus);
        assert_op(&node.children[1], TokenKind::Star);
    }

    #[test]
    fn test_subtraction_left_associative() {
        let node = parse_ok("10-3-2");
        assert_op(&node, TokenKind::Minus);
        assert_op(&node.children[0], TokenKind::Minus);
    }

    #[test]
    fn test_power_right_associative() {
        let node = parse_ok("2^3^2");
        assert_op(&node, TokenKind::Caret);
        assert_op(&node.children[1], TokenKind::Caret);
    }

    #[test]
    fn test_comparison_below_arithmetic() {
        let node = parse_ok("A+1<B*2");
        assert_op(&node, TokenKind::Less);
    }

    #[test]
    fn test_and_or_lowest() {
        let node = parse_ok("A<1 AND B>2 OR C=3");
        assert_op(&node, TokenKind::Or);
        assert_op(&node.children[0], TokenKind::And);
    }

    #[test]
    fn test_parentheses_override() {
        let node = parse_ok("(1+2)*3");
        assert_op(&node, TokenKind::Star);
        assert_op(&node.children[0], TokenKind::Plus);
    }

    #[test]
    fn test_unary_minus() {
        let node = parse_ok("-X+1");
        assert_op(&node, TokenKind::Plus);
        let neg = &node.children[0];
        assert_op(neg, TokenKind::Minus);
        assert_eq!(neg.children.len(), 1);
    }

    #[test]
    fn test_unary_not() {
        let node = parse_ok("NOT A=1");
        // NOT binds tighter than =, matching classic BASIC.
        assert_op(&node, TokenKind::Eq);
        assert_op(&node.children[0], TokenKind::Not);
    }

    #[test]
    fn test_unary_plus_is_transparent() {
        let node = parse_ok("+5");
        assert_eq!(node.kind, NodeKind::Constant);
        assert_eq!(node.value, 5.0);
    }

    // =========================================================================
    // FUNCTION CALLS
    // =========================================================================

    #[test]
    fn test_function_call() {
        let node = parse_ok("SIN(X)");
        assert_eq!(node.kind, NodeKind::FunctionCall);
        assert_eq!(node.token, TokenKind::Sin);
        assert_eq!(node.children.len(), 1);
    }

    #[test]
    fn test_mid_accepts_two_or_three_args() {
        assert_eq!(parse_ok("MID$(A$,2)").children.len(), 2);
        assert_eq!(parse_ok("MID$(A$,2,3)").children.len(), 3);
    }

    #[test]
    fn test_mid_arity_errors() {
        let (_, handler) = parse("MID$(A$)");
        assert!(handler.has_errors());
        let msg = &handler.diagnostics()[0].message;
        assert_eq!(msg, "MID$ expects 2-3 arguments, got 1");

        let (_, handler) = parse("MID$(A$,1,2,3)");
        assert!(handler.has_errors());
    }

    #[test]
    fn test_fixed_arity_error_message() {
        let (_, handler) = parse("SIN(1,2)");
        assert_eq!(
            handler.diagnostics()[0].message,
            "SIN expects 1 argument, got 2"
        );
    }

    #[test]
    fn test_string_comparison_parses() {
        let node = parse_ok("A$=\"YES\"");
        assert_op(&node, TokenKind::Eq);
        assert_eq!(node.children[0].text(), "A$");
    }

    #[test]
    fn test_missing_expression_reports() {
        let (node, handler) = parse("*");
        assert!(node.is_none());
        assert!(handler.has_errors());
    }
}
