use crate::ast::*;
use crate::error::CompileError;
use crate::lexer::token::{Span, Token, TokenKind};

pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
    errors: Vec<CompileError>,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            current: 0,
            errors: Vec::new(),
        }
    }

    /// Parse the whole script. The root node is always a block.
    pub fn parse(mut self) -> Result<Program, Vec<CompileError>> {
        let start = self.current_span();
        let mut statements = Vec::new();
        while !self.is_at_end() {
            match self.statement() {
                Ok(stmt) => statements.push(stmt),
                Err(e) => {
                    self.errors.push(e);
                    self.synchronize();
                }
            }
        }
        let span = self.span_from(start);
        if self.errors.is_empty() {
            Ok(Program {
                body: Block { statements, span },
            })
        } else {
            Err(self.errors)
        }
    }

    fn statement(&mut self) -> Result<Stmt, CompileError> {
        match self.peek().kind {
            TokenKind::If => self.if_statement().map(Stmt::If),
            TokenKind::While => self.while_statement(),
            TokenKind::For => self.for_statement(),
            TokenKind::Function => self.function_definition(),
            TokenKind::LeftBrace => self.block().map(Stmt::Block),
            TokenKind::Var | TokenKind::Const | TokenKind::Let => {
                let decl = self.var_declaration(true)?;
                Ok(Stmt::VarDecl(decl))
            }
            TokenKind::Return | TokenKind::Break | TokenKind::Continue => {
                let token = self.peek();
                Err(CompileError::parse(
                    format!("'{}' is reserved and not supported here", token.lexeme),
                    token.span.offset,
                    token.span.len.max(1),
                ))
            }
            TokenKind::Identifier if self.peek().lexeme == "import" => {
                if self.peek_next().kind == TokenKind::String {
                    self.import_statement()
                } else {
                    self.expression_statement()
                }
            }
            TokenKind::Identifier if self.peek_next().kind == TokenKind::Equal => {
                self.assignment_statement()
            }
            _ => self.expression_statement(),
        }
    }

    fn if_statement(&mut self) -> Result<IfStmt, CompileError> {
        let start = self.current_span();
        self.advance(); // consume 'if'
        self.consume(TokenKind::LeftParen, "'(' after 'if'")?;
        let condition = self.expression()?;
        self.consume(TokenKind::RightParen, "')' after if condition")?;
        let then_block = self.block()?;

        let else_branch = if self.match_token(TokenKind::Else) {
            if self.check(TokenKind::If) {
                Some(ElseBranch::If(Box::new(self.if_statement()?)))
            } else {
                Some(ElseBranch::Block(self.block()?))
            }
        } else {
            None
        };

        let span = self.span_from(start);
        Ok(IfStmt {
            condition,
            then_block,
            else_branch,
            span,
        })
    }

    fn while_statement(&mut self) -> Result<Stmt, CompileError> {
        let start = self.current_span();
        self.advance(); // consume 'while'
        self.consume(TokenKind::LeftParen, "'(' after 'while'")?;
        let condition = self.expression()?;
        self.consume(TokenKind::RightParen, "')' after while condition")?;
        let body = self.block()?;
        let span = self.span_from(start);
        Ok(Stmt::While(WhileStmt {
            condition,
            body,
            span,
        }))
    }

    fn for_statement(&mut self) -> Result<Stmt, CompileError> {
        let start = self.current_span();
        self.advance(); // consume 'for'
        self.consume(TokenKind::LeftParen, "'(' after 'for'")?;

        let init = if self.match_token(TokenKind::Semicolon) {
            None
        } else {
            let stmt = if matches!(
                self.peek().kind,
                TokenKind::Var | TokenKind::Const | TokenKind::Let
            ) {
                Stmt::VarDecl(self.var_declaration(false)?)
            } else {
                let expr = self.expression()?;
                let span = expr.span();
                Stmt::Expression(ExprStmt {
                    expression: expr,
                    span,
                })
            };
            self.consume(TokenKind::Semicolon, "';' after for initializer")?;
            Some(Box::new(stmt))
        };

        let condition = if self.check(TokenKind::Semicolon) {
            None
        } else {
            Some(self.expression()?)
        };
        self.consume(TokenKind::Semicolon, "';' after for condition")?;

        let increment = if self.check(TokenKind::RightParen) {
            None
        } else {
            Some(self.expression()?)
        };
        self.consume(TokenKind::RightParen, "')' after for clauses")?;

        let body = self.block()?;
        let span = self.span_from(start);
        Ok(Stmt::For(ForStmt {
            init,
            condition,
            increment,
            body,
            span,
        }))
    }

    fn function_definition(&mut self) -> Result<Stmt, CompileError> {
        let start = self.current_span();
        self.advance(); // consume 'function'
        let name = self.expect_identifier("function name")?;

        self.consume(TokenKind::LeftParen, "'(' after function name")?;
        let mut params = Vec::new();
        if !self.check(TokenKind::RightParen) {
            loop {
                if params.len() >= 255 {
                    let span = self.current_span();
                    return Err(CompileError::parse(
                        "can't have more than 255 parameters",
                        span.offset,
                        span.len,
                    ));
                }
                params.push(self.expect_identifier("parameter name")?);
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "')' after parameters")?;

        let body = self.block()?;
        let span = self.span_from(start);
        Ok(Stmt::FunctionDef(FunctionDef {
            name,
            params,
            body,
            span,
        }))
    }

    /// Variable declaration. The terminating `;` is suppressed in the
    /// `for`-header variant.
    fn var_declaration(&mut self, require_semicolon: bool) -> Result<VarDecl, CompileError> {
        let start = self.current_span();
        self.advance(); // consume 'var' / 'const' / 'let'
        let name = self.expect_identifier("variable name")?;

        let initializer = if self.match_token(TokenKind::Equal) {
            Some(self.expression()?)
        } else {
            None
        };

        if require_semicolon {
            self.consume(TokenKind::Semicolon, "';' after variable declaration")?;
        }
        let span = self.span_from(start);
        Ok(VarDecl {
            name,
            initializer,
            span,
        })
    }

    fn import_statement(&mut self) -> Result<Stmt, CompileError> {
        let start = self.current_span();
        self.advance(); // consume 'import'
        let path_token = self.advance().clone();
        self.consume(TokenKind::Semicolon, "';' after import path")?;
        let span = self.span_from(start);
        Ok(Stmt::Import(ImportStmt {
            path: path_token.lexeme,
            span,
        }))
    }

    fn assignment_statement(&mut self) -> Result<Stmt, CompileError> {
        let expr = self.assignment_expression_only()?;
        self.consume(TokenKind::Semicolon, "';' after assignment")?;
        let span = expr.span();
        Ok(Stmt::Expression(ExprStmt {
            expression: expr,
            span,
        }))
    }

    /// `name = expression` where the current token is known to be an
    /// identifier followed by `=`.
    fn assignment_expression_only(&mut self) -> Result<Expr, CompileError> {
        let name_token = self.advance().clone();
        self.advance(); // consume '='
        let value = self.expression()?;
        let span = Span::new(
            name_token.span.offset,
            value.span().offset + value.span().len - name_token.span.offset,
        );
        Ok(Expr::Assign(AssignExpr {
            name: name_token.lexeme,
            value: Box::new(value),
            span,
        }))
    }

    fn expression_statement(&mut self) -> Result<Stmt, CompileError> {
        let expression = self.expression()?;
        self.consume(TokenKind::Semicolon, "';' after expression")?;
        let span = expression.span();
        Ok(Stmt::Expression(ExprStmt { expression, span }))
    }

    fn block(&mut self) -> Result<Block, CompileError> {
        let start = self.current_span();
        self.consume(TokenKind::LeftBrace, "'{' to start block")?;
        let mut statements = Vec::new();
        while !self.check(TokenKind::RightBrace) && !self.is_at_end() {
            statements.push(self.statement()?);
        }
        self.consume(TokenKind::RightBrace, "'}' after block")?;
        let span = self.span_from(start);
        Ok(Block { statements, span })
    }

    // --- Expressions, lowest to highest precedence ---

    fn expression(&mut self) -> Result<Expr, CompileError> {
        self.assignment()
    }

    fn assignment(&mut self) -> Result<Expr, CompileError> {
        let expr = self.or()?;

        if self.match_token(TokenKind::Equal) {
            let value = self.assignment()?;
            let span = Span::new(
                expr.span().offset,
                value.span().offset + value.span().len - expr.span().offset,
            );
            return match expr {
                Expr::Variable(v) => Ok(Expr::Assign(AssignExpr {
                    name: v.name,
                    value: Box::new(value),
                    span,
                })),
                _ => Err(CompileError::parse(
                    "invalid assignment target",
                    span.offset,
                    span.len,
                )),
            };
        }

        Ok(expr)
    }

    fn or(&mut self) -> Result<Expr, CompileError> {
        let mut expr = self.and()?;
        while self.match_token(TokenKind::OrOr) {
            let right = self.and()?;
            expr = binary(expr, BinaryOp::Or, right);
        }
        Ok(expr)
    }

    fn and(&mut self) -> Result<Expr, CompileError> {
        let mut expr = self.equality()?;
        while self.match_token(TokenKind::AndAnd) {
            let right = self.equality()?;
            expr = binary(expr, BinaryOp::And, right);
        }
        Ok(expr)
    }

    fn equality(&mut self) -> Result<Expr, CompileError> {
        let mut expr = self.comparison()?;
        while let Some(op) = self.match_binary_op(&[TokenKind::EqualEqual, TokenKind::BangEqual]) {
            let right = self.comparison()?;
            expr = binary(expr, op, right);
        }
        Ok(expr)
    }

    fn comparison(&mut self) -> Result<Expr, CompileError> {
        let mut expr = self.term()?;
        while let Some(op) = self.match_binary_op(&[
            TokenKind::Greater,
            TokenKind::GreaterEqual,
            TokenKind::Less,
            TokenKind::LessEqual,
        ]) {
            let right = self.term()?;
            expr = binary(expr, op, right);
        }
        Ok(expr)
    }

    fn term(&mut self) -> Result<Expr, CompileError> {
        let mut expr = self.factor()?;
        while let Some(op) = self.match_binary_op(&[TokenKind::Plus, TokenKind::Minus]) {
            let right = self.factor()?;
            expr = binary(expr, op, right);
        }
        Ok(expr)
    }

    fn factor(&mut self) -> Result<Expr, CompileError> {
        let mut expr = self.unary()?;
        while let Some(op) =
            self.match_binary_op(&[TokenKind::Star, TokenKind::Slash, TokenKind::Percent])
        {
            let right = self.unary()?;
            expr = binary(expr, op, right);
        }
        Ok(expr)
    }

    fn unary(&mut self) -> Result<Expr, CompileError> {
        if self.check(TokenKind::Bang) || self.check(TokenKind::Minus) {
            let start = self.current_span();
            let op = if self.match_token(TokenKind::Bang) {
                UnaryOp::Not
            } else {
                self.advance();
                UnaryOp::Negate
            };
            let operand = self.unary()?;
            let span = Span::new(
                start.offset,
                operand.span().offset + operand.span().len - start.offset,
            );
            return Ok(Expr::Unary(UnaryExpr {
                operator: op,
                operand: Box::new(operand),
                span,
            }));
        }
        self.postfix()
    }

    /// Zero or more `[index]` suffixes, composing left-to-right.
    fn postfix(&mut self) -> Result<Expr, CompileError> {
        let mut expr = self.primary()?;
        while self.match_token(TokenKind::LeftBracket) {
            let index = self.expression()?;
            self.consume(TokenKind::RightBracket, "']' after index")?;
            let span = Span::new(
                expr.span().offset,
                self.previous_span().offset + self.previous_span().len - expr.span().offset,
            );
            expr = Expr::Index(IndexExpr {
                object: Box::new(expr),
                index: Box::new(index),
                span,
            });
        }
        Ok(expr)
    }

    fn primary(&mut self) -> Result<Expr, CompileError> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Number => {
                self.advance();
                let value: f64 = token
                    .lexeme
                    .parse()
                    .expect("scanner guarantees valid number");
                Ok(Expr::Literal(LiteralExpr {
                    value: LiteralValue::Number(value),
                    span: token.span,
                }))
            }
            TokenKind::String => {
                self.advance();
                Ok(Expr::Literal(LiteralExpr {
                    value: LiteralValue::String(token.lexeme),
                    span: token.span,
                }))
            }
            TokenKind::True => {
                self.advance();
                Ok(Expr::Literal(LiteralExpr {
                    value: LiteralValue::Bool(true),
                    span: token.span,
                }))
            }
            TokenKind::False => {
                self.advance();
                Ok(Expr::Literal(LiteralExpr {
                    value: LiteralValue::Bool(false),
                    span: token.span,
                }))
            }
            TokenKind::Null => {
                self.advance();
                Ok(Expr::Literal(LiteralExpr {
                    value: LiteralValue::Null,
                    span: token.span,
                }))
            }
            TokenKind::Identifier => {
                self.advance();
                if self.match_token(TokenKind::LeftParen) {
                    self.finish_call(token)
                } else {
                    Ok(Expr::Variable(VariableExpr {
                        name: token.lexeme,
                        span: token.span,
                    }))
                }
            }
            TokenKind::LeftParen => {
                self.advance();
                let expr = self.expression()?;
                self.consume(TokenKind::RightParen, "')' after expression")?;
                Ok(expr)
            }
            TokenKind::LeftBracket => {
                self.advance();
                let mut elements = Vec::new();
                if !self.check(TokenKind::RightBracket) {
                    loop {
                        elements.push(self.expression()?);
                        if !self.match_token(TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.consume(TokenKind::RightBracket, "']' after array elements")?;
                let span = Span::new(
                    token.span.offset,
                    self.previous_span().offset + self.previous_span().len - token.span.offset,
                );
                Ok(Expr::Array(ArrayExpr { elements, span }))
            }
            _ => Err(CompileError::parse(
                format!("expected expression, found '{}'", token.lexeme),
                token.span.offset,
                token.span.len.max(1),
            )),
        }
    }

    fn finish_call(&mut self, name_token: Token) -> Result<Expr, CompileError> {
        let mut arguments = Vec::new();
        if !self.check(TokenKind::RightParen) {
            loop {
                if arguments.len() >= 255 {
                    let span = self.current_span();
                    return Err(CompileError::parse(
                        "can't have more than 255 arguments",
                        span.offset,
                        span.len,
                    ));
                }
                arguments.push(self.expression()?);
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "')' after arguments")?;
        let span = Span::new(
            name_token.span.offset,
            self.previous_span().offset + self.previous_span().len - name_token.span.offset,
        );
        Ok(Expr::Call(CallExpr {
            callee: name_token.lexeme,
            arguments,
            span,
        }))
    }

    // --- Helper methods ---

    fn peek(&self) -> &Token {
        &self.tokens[self.current]
    }

    fn peek_next(&self) -> &Token {
        if self.current + 1 < self.tokens.len() {
            &self.tokens[self.current + 1]
        } else {
            &self.tokens[self.tokens.len() - 1]
        }
    }

    fn is_at_end(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        &self.tokens[self.current - 1]
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn match_token(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn match_binary_op(&mut self, kinds: &[TokenKind]) -> Option<BinaryOp> {
        for &kind in kinds {
            if self.check(kind) {
                self.advance();
                return Some(token_to_binary_op(kind));
            }
        }
        None
    }

    fn consume(&mut self, kind: TokenKind, message: &str) -> Result<&Token, CompileError> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            let token = self.peek();
            Err(CompileError::parse(
                format!("expected {message}, found '{}'", token.lexeme),
                token.span.offset,
                token.span.len.max(1),
            ))
        }
    }

    fn expect_identifier(&mut self, context: &str) -> Result<String, CompileError> {
        if self.check(TokenKind::Identifier) {
            let token = self.advance().clone();
            Ok(token.lexeme)
        } else {
            let token = self.peek();
            Err(CompileError::parse(
                format!("expected {context}"),
                token.span.offset,
                token.span.len.max(1),
            ))
        }
    }

    fn current_span(&self) -> Span {
        self.peek().span
    }

    fn previous_span(&self) -> Span {
        self.tokens[self.current - 1].span
    }

    fn span_from(&self, start: Span) -> Span {
        if self.current == 0 {
            return start;
        }
        let prev = self.previous_span();
        Span::new(start.offset, prev.offset + prev.len - start.offset)
    }

    /// Skip tokens until a likely statement boundary: just past a `;`, or
    /// just before a statement keyword or closing `}`.
    fn synchronize(&mut self) {
        self.advance();
        while !self.is_at_end() {
            if self.tokens[self.current - 1].kind == TokenKind::Semicolon {
                return;
            }
            match self.peek().kind {
                TokenKind::If
                | TokenKind::While
                | TokenKind::For
                | TokenKind::Function
                | TokenKind::Var
                | TokenKind::Const
                | TokenKind::Let
                | TokenKind::RightBrace => return,
                _ => {
                    self.advance();
                }
            }
        }
    }
}

fn binary(left: Expr, op: BinaryOp, right: Expr) -> Expr {
    let span = Span::new(
        left.span().offset,
        right.span().offset + right.span().len - left.span().offset,
    );
    Expr::Binary(BinaryExpr {
        left: Box::new(left),
        operator: op,
        right: Box::new(right),
        span,
    })
}

fn token_to_binary_op(kind: TokenKind) -> BinaryOp {
    match kind {
        TokenKind::Plus => BinaryOp::Add,
        TokenKind::Minus => BinaryOp::Subtract,
        TokenKind::Star => BinaryOp::Multiply,
        TokenKind::Slash => BinaryOp::Divide,
        TokenKind::Percent => BinaryOp::Modulo,
        TokenKind::EqualEqual => BinaryOp::Equal,
        TokenKind::BangEqual => BinaryOp::NotEqual,
        TokenKind::Less => BinaryOp::Less,
        TokenKind::LessEqual => BinaryOp::LessEqual,
        TokenKind::Greater => BinaryOp::Greater,
        TokenKind::GreaterEqual => BinaryOp::GreaterEqual,
        _ => unreachable!("only called with matched operator tokens"),
    }
}
