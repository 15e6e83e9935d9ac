//! Hand-written recursive-descent parser producing `dana::ast` nodes
//! (spec section 4.1).
//!
//! Operator precedence (tightest to loosest), per `SPEC_FULL.md` section
//! 4.1's resolution of Open Question 2:
//! primary/call/subscript/attribute, unary, `**`, `*` `/` `%`, `+` `-`,
//! `|` (pipeline), comparisons, `and`, `or`.

use std::fmt;

use crate::ast::*;
use crate::lexer::{Position, Token, TokenKind};

#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub position: Position,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.message, self.position)
    }
}

impl std::error::Error for ParseError {}

pub type ParseResult<T> = Result<T, ParseError>;

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    pub fn parse_program(mut self) -> ParseResult<Block> {
        let mut statements = Vec::new();
        self.skip_newlines();
        while !self.is_eof() {
            statements.push(self.statement()?);
            self.skip_newlines();
        }
        Ok(statements)
    }

    // --- token-stream plumbing -------------------------------------------------

    fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn kind(&self) -> &TokenKind {
        &self.current().kind
    }

    fn position(&self) -> Position {
        self.current().position
    }

    fn is_eof(&self) -> bool {
        matches!(self.kind(), TokenKind::Eof)
    }

    fn advance(&mut self) -> Token {
        let tok = self.current().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(self.kind()) == std::mem::discriminant(kind)
    }

    fn matches(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> ParseResult<Token> {
        if self.check(&kind) {
            Ok(self.advance())
        } else {
            Err(ParseError {
                message: format!("expected {kind}, found {}", self.kind()),
                position: self.position(),
            })
        }
    }

    fn expect_ident(&mut self) -> ParseResult<String> {
        match self.kind().clone() {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(name)
            }
            other => Err(ParseError {
                message: format!("expected identifier, found {other}"),
                position: self.position(),
            }),
        }
    }

    fn skip_newlines(&mut self) {
        while matches!(self.kind(), TokenKind::Newline) {
            self.advance();
        }
    }

    fn expect_block(&mut self) -> ParseResult<Block> {
        self.expect(TokenKind::Colon)?;
        self.skip_newlines();
        self.expect(TokenKind::Indent)?;
        let mut statements = Vec::new();
        self.skip_newlines();
        while !matches!(self.kind(), TokenKind::Dedent) {
            statements.push(self.statement()?);
            self.skip_newlines();
        }
        self.expect(TokenKind::Dedent)?;
        Ok(statements)
    }

    // --- statements -------------------------------------------------------------

    fn statement(&mut self) -> ParseResult<Statement> {
        match self.kind().clone() {
            TokenKind::If => self.if_stmt(),
            TokenKind::While => self.while_stmt(),
            TokenKind::For => self.for_stmt(),
            TokenKind::Def => self.func_def().map(|f| Statement::FunctionDef(std::rc::Rc::new(f))),
            TokenKind::Struct => self.struct_def(),
            TokenKind::Return => self.return_stmt(),
            TokenKind::Import => self.import_stmt(),
            TokenKind::With => self.with_stmt(),
            TokenKind::Try => self.try_stmt(),
            TokenKind::Pass => {
                self.advance();
                Ok(Statement::Pass)
            }
            TokenKind::Break => {
                self.advance();
                Ok(Statement::Break)
            }
            TokenKind::Continue => {
                self.advance();
                Ok(Statement::Continue)
            }
            _ => self.assignment_or_expr_stmt(),
        }
    }

    fn if_stmt(&mut self) -> ParseResult<Statement> {
        let position = self.position();
        self.advance(); // if
        let mut branches = Vec::new();
        let cond = self.expr()?;
        let body = self.expect_block()?;
        branches.push((cond, body));
        let mut else_branch = None;
        loop {
            match self.kind() {
                TokenKind::Elif => {
                    self.advance();
                    let cond = self.expr()?;
                    let body = self.expect_block()?;
                    branches.push((cond, body));
                }
                TokenKind::Else => {
                    self.advance();
                    else_branch = Some(self.expect_block()?);
                    break;
                }
                _ => break,
            }
        }
        Ok(Statement::If {
            branches,
            else_branch,
            position,
        })
    }

    fn while_stmt(&mut self) -> ParseResult<Statement> {
        let position = self.position();
        self.advance();
        let condition = self.expr()?;
        let body = self.expect_block()?;
        Ok(Statement::While {
            condition,
            body,
            position,
        })
    }

    fn for_stmt(&mut self) -> ParseResult<Statement> {
        let position = self.position();
        self.advance();
        let target = self.target()?;
        self.expect(TokenKind::In)?;
        let iterable = self.expr()?;
        let body = self.expect_block()?;
        Ok(Statement::For {
            target,
            iterable,
            body,
            position,
        })
    }

    fn params(&mut self) -> ParseResult<Vec<Param>> {
        self.expect(TokenKind::LParen)?;
        let mut params = Vec::new();
        while !self.check(&TokenKind::RParen) {
            let name = self.expect_ident()?;
            let annotation = if self.matches(&TokenKind::Colon) {
                Some(self.type_annotation()?)
            } else {
                None
            };
            let default = if self.matches(&TokenKind::Eq) {
                Some(self.expr()?)
            } else {
                None
            };
            params.push(Param {
                name,
                annotation,
                default,
            });
            if !self.matches(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(params)
    }

    fn func_def(&mut self) -> ParseResult<FunctionDef> {
        let position = self.position();
        self.advance(); // def
        let receiver = if self.check(&TokenKind::LParen) {
            self.advance();
            let name = self.expect_ident()?;
            self.expect(TokenKind::Colon)?;
            let ty = self.expect_ident()?;
            self.expect(TokenKind::RParen)?;
            Some(Receiver { name, ty })
        } else {
            None
        };
        let name = self.expect_ident()?;
        let params = self.params()?;
        let return_type = if self.matches(&TokenKind::Arrow) {
            Some(self.type_annotation()?)
        } else {
            None
        };
        let body = self.expect_block()?;
        Ok(FunctionDef {
            name,
            receiver,
            params,
            return_type,
            body,
            position,
        })
    }

    fn struct_def(&mut self) -> ParseResult<Statement> {
        let position = self.position();
        self.advance(); // struct
        let name = self.expect_ident()?;
        self.expect(TokenKind::Colon)?;
        self.skip_newlines();
        self.expect(TokenKind::Indent)?;
        let mut fields = Vec::new();
        self.skip_newlines();
        while !matches!(self.kind(), TokenKind::Dedent) {
            let field_name = self.expect_ident()?;
            let annotation = if self.matches(&TokenKind::Colon) {
                Some(self.type_annotation()?)
            } else {
                None
            };
            let default = if self.matches(&TokenKind::Eq) {
                Some(self.expr()?)
            } else {
                None
            };
            fields.push(StructField {
                name: field_name,
                annotation,
                default,
            });
            self.skip_newlines();
        }
        self.expect(TokenKind::Dedent)?;
        Ok(Statement::StructDef(StructDef {
            name,
            fields,
            position,
        }))
    }

    fn return_stmt(&mut self) -> ParseResult<Statement> {
        let position = self.position();
        self.advance();
        let value = if matches!(self.kind(), TokenKind::Newline | TokenKind::Eof | TokenKind::Dedent)
        {
            None
        } else {
            Some(self.expr()?)
        };
        Ok(Statement::Return { value, position })
    }

    fn import_stmt(&mut self) -> ParseResult<Statement> {
        let position = self.position();
        self.advance();
        let mut path = vec![self.expect_ident()?];
        while self.matches(&TokenKind::Dot) {
            path.push(self.expect_ident()?);
        }
        let alias = if self.matches(&TokenKind::As) {
            Some(self.expect_ident()?)
        } else {
            None
        };
        Ok(Statement::Import {
            path,
            alias,
            position,
        })
    }

    fn with_stmt(&mut self) -> ParseResult<Statement> {
        let position = self.position();
        self.advance();
        let mut bindings = Vec::new();
        loop {
            let checkpoint = self.pos;
            if let TokenKind::Ident(name) = self.kind().clone() {
                self.advance();
                if self.matches(&TokenKind::Eq) {
                    let value = self.expr()?;
                    bindings.push(WithBinding {
                        name: Some(name),
                        value,
                    });
                } else {
                    self.pos = checkpoint;
                    bindings.push(WithBinding {
                        name: None,
                        value: self.expr()?,
                    });
                }
            } else {
                bindings.push(WithBinding {
                    name: None,
                    value: self.expr()?,
                });
            }
            if !self.matches(&TokenKind::Comma) {
                break;
            }
        }
        let body = self.expect_block()?;
        Ok(Statement::With {
            bindings,
            body,
            position,
        })
    }

    fn try_stmt(&mut self) -> ParseResult<Statement> {
        let position = self.position();
        self.advance();
        let body = self.expect_block()?;
        let mut handlers = Vec::new();
        while matches!(self.kind(), TokenKind::Except) {
            self.advance();
            let mut kind = None;
            let mut bind_as = None;
            if !self.check(&TokenKind::Colon) {
                kind = Some(self.expect_ident()?);
                if self.matches(&TokenKind::As) {
                    bind_as = Some(self.expect_ident()?);
                }
            }
            let handler_body = self.expect_block()?;
            handlers.push(ExceptClause {
                kind,
                bind_as,
                body: handler_body,
            });
        }
        let finally = if matches!(self.kind(), TokenKind::Finally) {
            self.advance();
            Some(self.expect_block()?)
        } else {
            None
        };
        Ok(Statement::Try {
            body,
            handlers,
            finally,
            position,
        })
    }

    fn type_annotation(&mut self) -> ParseResult<TypeAnnotation> {
        let name = self.expect_ident()?;
        if self.matches(&TokenKind::LBracket) {
            let mut args = vec![self.type_annotation()?];
            while self.matches(&TokenKind::Comma) {
                args.push(self.type_annotation()?);
            }
            self.expect(TokenKind::RBracket)?;
            Ok(TypeAnnotation::Generic(name, args))
        } else {
            Ok(TypeAnnotation::Named(name))
        }
    }

    /// Disambiguates `target = expr`, `target op= expr`, `target: type =
    /// expr` from a bare expression statement by speculatively parsing an
    /// expression first and checking what follows it.
    fn assignment_or_expr_stmt(&mut self) -> ParseResult<Statement> {
        let position = self.position();
        let expr = self.expr()?;

        let compound_op = match self.kind() {
            TokenKind::PlusEq => Some(CompoundOp::Add),
            TokenKind::MinusEq => Some(CompoundOp::Sub),
            TokenKind::StarEq => Some(CompoundOp::Mul),
            TokenKind::SlashEq => Some(CompoundOp::Div),
            _ => None,
        };
        if let Some(op) = compound_op {
            self.advance();
            let target = expr_to_target(expr)?;
            let value = self.expr()?;
            return Ok(Statement::CompoundAssignment {
                target,
                op,
                value,
                position,
            });
        }

        if matches!(self.kind(), TokenKind::Colon) && is_bare_name(&expr) {
            self.advance();
            let annotation = Some(self.type_annotation()?);
            self.expect(TokenKind::Eq)?;
            let value = self.expr()?;
            let target = expr_to_target(expr)?;
            return Ok(Statement::Assignment {
                target,
                annotation,
                value,
                position,
            });
        }

        if matches!(self.kind(), TokenKind::Eq) {
            self.advance();
            let target = expr_to_target(expr)?;
            let value = self.expr()?;
            return Ok(Statement::Assignment {
                target,
                annotation: None,
                value,
                position,
            });
        }

        Ok(Statement::Expression(expr))
    }

    fn target(&mut self) -> ParseResult<Target> {
        let expr = self.postfix()?;
        expr_to_target(expr)
    }

    // --- expressions (precedence climbing) --------------------------------------

    fn expr(&mut self) -> ParseResult<Expr> {
        self.or_expr()
    }

    fn or_expr(&mut self) -> ParseResult<Expr> {
        let mut left = self.and_expr()?;
        while matches!(self.kind(), TokenKind::Or) {
            let position = self.position();
            self.advance();
            let right = self.and_expr()?;
            left = Expr::Binary(BinOp::Or, Box::new(left), Box::new(right), position);
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> ParseResult<Expr> {
        let mut left = self.not_expr()?;
        while matches!(self.kind(), TokenKind::And) {
            let position = self.position();
            self.advance();
            let right = self.not_expr()?;
            left = Expr::Binary(BinOp::And, Box::new(left), Box::new(right), position);
        }
        Ok(left)
    }

    fn not_expr(&mut self) -> ParseResult<Expr> {
        if matches!(self.kind(), TokenKind::Not) {
            let position = self.position();
            self.advance();
            let operand = self.not_expr()?;
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(operand), position));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> ParseResult<Expr> {
        let mut left = self.pipeline()?;
        loop {
            let op = match self.kind() {
                TokenKind::Lt => BinOp::Lt,
                TokenKind::LtEq => BinOp::LtEq,
                TokenKind::Gt => BinOp::Gt,
                TokenKind::GtEq => BinOp::GtEq,
                TokenKind::EqEq => BinOp::Eq,
                TokenKind::NotEq => BinOp::NotEq,
                TokenKind::In => BinOp::In,
                TokenKind::Not if matches!(self.peek_next(), TokenKind::In) => BinOp::NotIn,
                _ => break,
            };
            let position = self.position();
            if op == BinOp::NotIn {
                self.advance(); // not
                self.advance(); // in
            } else {
                self.advance();
            }
            let right = self.pipeline()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right), position);
        }
        Ok(left)
    }

    fn peek_next(&self) -> TokenKind {
        self.tokens
            .get(self.pos + 1)
            .map(|t| t.kind.clone())
            .unwrap_or(TokenKind::Eof)
    }

    fn pipeline(&mut self) -> ParseResult<Expr> {
        let mut left = self.sum()?;
        while matches!(self.kind(), TokenKind::Pipe) {
            let position = self.position();
            self.advance();
            let right = self.sum()?;
            left = Expr::Binary(BinOp::Pipe, Box::new(left), Box::new(right), position);
        }
        Ok(left)
    }

    fn sum(&mut self) -> ParseResult<Expr> {
        let mut left = self.term()?;
        loop {
            let op = match self.kind() {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break,
            };
            let position = self.position();
            self.advance();
            let right = self.term()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right), position);
        }
        Ok(left)
    }

    fn term(&mut self) -> ParseResult<Expr> {
        let mut left = self.unary()?;
        loop {
            let op = match self.kind() {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                TokenKind::Percent => BinOp::Mod,
                _ => break,
            };
            let position = self.position();
            self.advance();
            let right = self.unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right), position);
        }
        Ok(left)
    }

    fn unary(&mut self) -> ParseResult<Expr> {
        if matches!(self.kind(), TokenKind::Minus) {
            let position = self.position();
            self.advance();
            let operand = self.unary()?;
            return Ok(Expr::Unary(UnaryOp::Neg, Box::new(operand), position));
        }
        self.power()
    }

    fn power(&mut self) -> ParseResult<Expr> {
        let base = self.postfix()?;
        if matches!(self.kind(), TokenKind::StarStar) {
            let position = self.position();
            self.advance();
            let exponent = self.unary()?; // right-assoc
            return Ok(Expr::Binary(
                BinOp::Pow,
                Box::new(base),
                Box::new(exponent),
                position,
            ));
        }
        Ok(base)
    }

    fn postfix(&mut self) -> ParseResult<Expr> {
        let mut expr = self.primary()?;
        loop {
            match self.kind() {
                TokenKind::Dot => {
                    let position = self.position();
                    self.advance();
                    let name = self.expect_ident()?;
                    expr = Expr::Attribute(Box::new(expr), name, position);
                }
                TokenKind::LBracket => {
                    let position = self.position();
                    self.advance();
                    let index = self.expr()?;
                    self.expect(TokenKind::RBracket)?;
                    expr = Expr::Subscript(Box::new(expr), Box::new(index), position);
                }
                TokenKind::LParen => {
                    let position = self.position();
                    self.advance();
                    let args = self.arglist()?;
                    self.expect(TokenKind::RParen)?;
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                        position,
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn arglist(&mut self) -> ParseResult<Vec<Arg>> {
        let mut args = Vec::new();
        while !self.check(&TokenKind::RParen) {
            let checkpoint = self.pos;
            if let TokenKind::Ident(name) = self.kind().clone() {
                self.advance();
                if self.matches(&TokenKind::Eq) {
                    let value = self.expr()?;
                    args.push(Arg {
                        name: Some(name),
                        value,
                    });
                    if !self.matches(&TokenKind::Comma) {
                        break;
                    }
                    continue;
                }
                self.pos = checkpoint;
            }
            let value = self.expr()?;
            args.push(Arg { name: None, value });
            if !self.matches(&TokenKind::Comma) {
                break;
            }
        }
        Ok(args)
    }

    fn primary(&mut self) -> ParseResult<Expr> {
        let position = self.position();
        match self.kind().clone() {
            TokenKind::Int(n) => {
                self.advance();
                Ok(Expr::Literal(Literal::Int(n), position))
            }
            TokenKind::Float(n) => {
                self.advance();
                Ok(Expr::Literal(Literal::Float(n), position))
            }
            TokenKind::Str(s) => {
                self.advance();
                Ok(Expr::Literal(Literal::Str(s), position))
            }
            TokenKind::True => {
                self.advance();
                Ok(Expr::Literal(Literal::Bool(true), position))
            }
            TokenKind::False => {
                self.advance();
                Ok(Expr::Literal(Literal::Bool(false), position))
            }
            TokenKind::Null => {
                self.advance();
                Ok(Expr::Literal(Literal::Null, position))
            }
            TokenKind::Ident(_) => {
                let name = self.scoped_name()?;
                Ok(Expr::Name(name))
            }
            TokenKind::Lambda => self.lambda(),
            TokenKind::LParen => {
                self.advance();
                let first = self.expr()?;
                if self.matches(&TokenKind::Comma) {
                    let mut items = vec![first];
                    while !self.check(&TokenKind::RParen) {
                        items.push(self.expr()?);
                        if !self.matches(&TokenKind::Comma) {
                            break;
                        }
                    }
                    self.expect(TokenKind::RParen)?;
                    Ok(Expr::Tuple(items, position))
                } else {
                    self.expect(TokenKind::RParen)?;
                    Ok(first)
                }
            }
            TokenKind::LBracket => self.list_or_comprehension(),
            TokenKind::LBrace => self.set_or_mapping(),
            other => Err(ParseError {
                message: format!("unexpected token {other}"),
                position,
            }),
        }
    }

    fn scoped_name(&mut self) -> ParseResult<ScopedName> {
        let position = self.position();
        let first = self.expect_ident()?;
        if matches!(self.kind(), TokenKind::Colon) {
            if let Some(scope) = ScopeKind::from_prefix(&first) {
                if let TokenKind::Ident(_) = self.peek_next() {
                    self.advance(); // colon
                    let name = self.expect_ident()?;
                    return Ok(ScopedName {
                        scope: Some(scope),
                        name,
                        position,
                    });
                }
            }
        }
        Ok(ScopedName {
            scope: None,
            name: first,
            position,
        })
    }

    fn lambda(&mut self) -> ParseResult<Expr> {
        let position = self.position();
        self.advance();
        let mut params = Vec::new();
        while !self.check(&TokenKind::Colon) {
            let name = self.expect_ident()?;
            params.push(Param {
                name,
                annotation: None,
                default: None,
            });
            if !self.matches(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::Colon)?;
        let body = self.expr()?;
        Ok(Expr::Lambda {
            params,
            body: Box::new(body),
            position,
        })
    }

    fn list_or_comprehension(&mut self) -> ParseResult<Expr> {
        let position = self.position();
        self.advance(); // [
        if self.matches(&TokenKind::RBracket) {
            return Ok(Expr::List(Vec::new(), position));
        }
        let first = self.expr()?;
        if matches!(self.kind(), TokenKind::For) {
            self.advance();
            let target = self.target()?;
            self.expect(TokenKind::In)?;
            let iterable = self.expr()?;
            let condition = if self.matches(&TokenKind::If) {
                Some(Box::new(self.expr()?))
            } else {
                None
            };
            self.expect(TokenKind::RBracket)?;
            return Ok(Expr::Comprehension {
                element: Box::new(first),
                clause: ComprehensionClause {
                    target,
                    iterable: Box::new(iterable),
                    condition,
                },
                position,
            });
        }
        let mut items = vec![first];
        while self.matches(&TokenKind::Comma) {
            if self.check(&TokenKind::RBracket) {
                break;
            }
            items.push(self.expr()?);
        }
        self.expect(TokenKind::RBracket)?;
        Ok(Expr::List(items, position))
    }

    fn set_or_mapping(&mut self) -> ParseResult<Expr> {
        let position = self.position();
        self.advance(); // {
        if self.matches(&TokenKind::RBrace) {
            return Ok(Expr::Mapping(Vec::new(), position));
        }
        let first_key = self.expr()?;
        if self.matches(&TokenKind::Colon) {
            let first_value = self.expr()?;
            let mut entries = vec![(first_key, first_value)];
            while self.matches(&TokenKind::Comma) {
                if self.check(&TokenKind::RBrace) {
                    break;
                }
                let key = self.expr()?;
                self.expect(TokenKind::Colon)?;
                let value = self.expr()?;
                entries.push((key, value));
            }
            self.expect(TokenKind::RBrace)?;
            Ok(Expr::Mapping(entries, position))
        } else {
            let mut items = vec![first_key];
            while self.matches(&TokenKind::Comma) {
                if self.check(&TokenKind::RBrace) {
                    break;
                }
                items.push(self.expr()?);
            }
            self.expect(TokenKind::RBrace)?;
            Ok(Expr::Set(items, position))
        }
    }
}

fn is_bare_name(expr: &Expr) -> bool {
    matches!(expr, Expr::Name(_))
}

fn expr_to_target(expr: Expr) -> ParseResult<Target> {
    match expr {
        Expr::Name(name) => Ok(Target::Name(name)),
        Expr::Attribute(base, field, position) => {
            Ok(Target::Attribute(Box::new(expr_to_target(*base)?), field, position))
        }
        Expr::Subscript(base, index, position) => {
            Ok(Target::Subscript(Box::new(expr_to_target(*base)?), index, position))
        }
        other => Err(ParseError {
            message: "invalid assignment target".to_string(),
            position: other.position(),
        }),
    }
}

/// Convenience entry point: lex then parse a full program.
pub fn parse(source: &str) -> ParseResult<Block> {
    let tokens = crate::lexer::Lexer::new(source)
        .lex()
        .map_err(|e| ParseError {
            message: e.message,
            position: e.position,
        })?;
    Parser::new(tokens).parse_program()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_assignment() {
        let program = parse("x = 1 + 2\n").unwrap();
        assert_eq!(program.len(), 1);
        assert!(matches!(program[0], Statement::Assignment { .. }));
    }

    #[test]
    fn parses_pipeline_tighter_than_comparison() {
        // x | f < 3  =>  (x | f) < 3
        let program = parse("y = x | f < 3\n").unwrap();
        let Statement::Assignment { value, .. } = &program[0] else {
            panic!("expected assignment");
        };
        match value {
            Expr::Binary(BinOp::Lt, lhs, _, _) => {
                assert!(matches!(**lhs, Expr::Binary(BinOp::Pipe, _, _, _)));
            }
            other => panic!("expected a Lt at the top, got {other:?}"),
        }
    }

    #[test]
    fn parses_if_elif_else() {
        let program = parse("if a:\n    pass\nelif b:\n    pass\nelse:\n    pass\n").unwrap();
        let Statement::If {
            branches,
            else_branch,
            ..
        } = &program[0]
        else {
            panic!("expected if");
        };
        assert_eq!(branches.len(), 2);
        assert!(else_branch.is_some());
    }

    #[test]
    fn parses_with_multi_binding() {
        let program = parse("with a = use(\"llm.x\"), b = use(\"mcp.y\"):\n    pass\n").unwrap();
        let Statement::With { bindings, .. } = &program[0] else {
            panic!("expected with");
        };
        assert_eq!(bindings.len(), 2);
    }

    #[test]
    fn parses_not_in() {
        let program = parse("x = a not in b\n").unwrap();
        let Statement::Assignment { value, .. } = &program[0] else {
            panic!("expected assignment");
        };
        assert!(matches!(value, Expr::Binary(BinOp::NotIn, _, _, _)));
    }

    #[test]
    fn parses_compound_assignment() {
        let program = parse("a[b] += 1\n").unwrap();
        assert!(matches!(program[0], Statement::CompoundAssignment { .. }));
    }
}
