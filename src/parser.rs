use std::rc::Rc;

use crate::{
    ast::{
        BinaryOp, CaptureMode, CaptureSpec, Expr, ExprKind, FunctionDecl, FunctorDecl, LambdaExpr,
        Literal, Param, Program, Stmt, StmtKind, TypeExpr, TypeExprKind, UnaryOp,
    },
    diagnostics::{Diagnostic, DiagnosticKind, SourceSpan},
    lexer::{Keyword, Lexer, Token, TokenKind},
};

pub fn parse_program(source: &str) -> Result<Program, Diagnostic> {
    let tokens = Lexer::new(source).tokenize()?;
    Parser::new(tokens).parse_program()
}

struct Parser {
    tokens: Vec<Token>,
    current: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, current: 0 }
    }

    fn parse_program(&mut self) -> Result<Program, Diagnostic> {
        let mut items = Vec::new();
        while !self.check(TokenKind::Eof) {
            items.push(self.parse_top_item()?);
        }
        Ok(Program { items })
    }

    // Function and functor declarations are global, so they are only accepted
    // here, never inside a block or body.
    fn parse_top_item(&mut self) -> Result<Stmt, Diagnostic> {
        if let Some(token) = self.peek() {
            match &token.kind {
                TokenKind::Keyword(Keyword::Fn) => return self.parse_function(),
                TokenKind::Keyword(Keyword::Functor) => return self.parse_functor(),
                _ => {}
            }
        }
        self.parse_statement()
    }

    fn parse_block(&mut self) -> Result<(Vec<Stmt>, SourceSpan), Diagnostic> {
        let lbrace = self.consume(TokenKind::LBrace, "expected `{` to start block")?;
        let start = lbrace.span.start;
        let mut items = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::Eof) {
            items.push(self.parse_statement()?);
        }
        let rbrace = self.consume(TokenKind::RBrace, "expected `}` to close block")?;
        Ok((
            items,
            SourceSpan {
                start,
                end: rbrace.span.end,
            },
        ))
    }

    fn parse_statement(&mut self) -> Result<Stmt, Diagnostic> {
        if let Some(token) = self.peek() {
            match &token.kind {
                TokenKind::Keyword(Keyword::Var) => return self.parse_var_decl(),
                TokenKind::Keyword(Keyword::Fn) => {
                    // `fn` also begins a pointer type, but as a statement head
                    // it can only be a declaration.
                    let token = token.clone();
                    return Err(self.error(
                        &token,
                        "function declarations are only allowed at top level",
                    ));
                }
                TokenKind::Keyword(Keyword::Functor) => {
                    let token = token.clone();
                    return Err(self.error(
                        &token,
                        "functor declarations are only allowed at top level",
                    ));
                }
                TokenKind::Keyword(Keyword::If) => return self.parse_if(),
                TokenKind::Keyword(Keyword::While) => return self.parse_while(),
                TokenKind::Keyword(Keyword::Return) => return self.parse_return(),
                TokenKind::Keyword(Keyword::Break) => {
                    let token = self.advance();
                    self.consume_optional_semicolon();
                    return Ok(Stmt {
                        span: token.span,
                        kind: StmtKind::Break,
                    });
                }
                TokenKind::Keyword(Keyword::Continue) => {
                    let token = self.advance();
                    self.consume_optional_semicolon();
                    return Ok(Stmt {
                        span: token.span,
                        kind: StmtKind::Continue,
                    });
                }
                TokenKind::LBrace => {
                    let (items, span) = self.parse_block()?;
                    return Ok(Stmt {
                        kind: StmtKind::Block(items),
                        span,
                    });
                }
                _ => {}
            }
        }
        self.parse_expression_statement()
    }

    fn parse_var_decl(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.consume_keyword(Keyword::Var)?.span.start;
        let mutable = self.matches_keyword(Keyword::Mut);
        let name_token = self.consume_identifier("expected variable name")?;
        let annotation = if self.matches(TokenKind::Colon) {
            Some(self.parse_type_expr()?)
        } else {
            None
        };
        let initializer = if self.matches(TokenKind::Assign) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        self.consume_optional_semicolon();
        let end = initializer
            .as_ref()
            .map(|expr| expr.span.end)
            .or_else(|| annotation.as_ref().map(|ann| ann.span.end))
            .unwrap_or(name_token.span.end);
        Ok(Stmt {
            kind: StmtKind::VarDecl {
                name: name_token.lexeme.clone(),
                mutable,
                annotation,
                initializer,
            },
            span: SourceSpan { start, end },
        })
    }

    fn parse_function(&mut self) -> Result<Stmt, Diagnostic> {
        let start_token = self.consume_keyword(Keyword::Fn)?;
        let name_token = self.consume_identifier("expected function name")?;
        self.consume(TokenKind::LParen, "expected `(` after function name")?;
        let params = self.parse_params(TokenKind::RParen)?;
        self.consume(TokenKind::RParen, "expected `)` after parameters")?;
        let return_type = if self.matches(TokenKind::Arrow) {
            Some(self.parse_type_expr()?)
        } else {
            None
        };
        let (body, span) = self.parse_block()?;
        let span = SourceSpan {
            start: start_token.span.start,
            end: span.end,
        };
        Ok(Stmt {
            span,
            kind: StmtKind::Function(Rc::new(FunctionDecl {
                name: name_token.lexeme.clone(),
                params,
                return_type,
                body,
                span,
            })),
        })
    }

    fn parse_functor(&mut self) -> Result<Stmt, Diagnostic> {
        let start_token = self.consume_keyword(Keyword::Functor)?;
        let name_token = self.consume_identifier("expected functor name")?;
        self.consume(TokenKind::LParen, "expected `(` after functor name")?;
        let fields = self.parse_params(TokenKind::RParen)?;
        self.consume(TokenKind::RParen, "expected `)` after functor fields")?;
        self.consume(TokenKind::LParen, "expected `(` to open call parameters")?;
        let params = self.parse_params(TokenKind::RParen)?;
        self.consume(TokenKind::RParen, "expected `)` after call parameters")?;
        let return_type = if self.matches(TokenKind::Arrow) {
            Some(self.parse_type_expr()?)
        } else {
            None
        };
        let (body, span) = self.parse_block()?;
        let span = SourceSpan {
            start: start_token.span.start,
            end: span.end,
        };
        Ok(Stmt {
            span,
            kind: StmtKind::Functor(Rc::new(FunctorDecl {
                name: name_token.lexeme.clone(),
                fields,
                params,
                return_type,
                body,
                span,
            })),
        })
    }

    fn parse_params(&mut self, terminator: TokenKind) -> Result<Vec<Param>, Diagnostic> {
        let mut params = Vec::new();
        if !self.check(terminator) {
            loop {
                let name = self.consume_identifier("expected parameter name")?;
                self.consume(TokenKind::Colon, "expected `:` after parameter name")?;
                let annotation = self.parse_type_expr()?;
                let span = SourceSpan {
                    start: name.span.start,
                    end: annotation.span.end,
                };
                params.push(Param {
                    name: name.lexeme.clone(),
                    annotation,
                    span,
                });
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        Ok(params)
    }

    fn parse_if(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.consume_keyword(Keyword::If)?.span.start;
        let condition = self.parse_expression()?;
        let (then_branch, then_span) = self.parse_block()?;
        let else_branch = if self.matches_keyword(Keyword::Else) {
            if self.check(TokenKind::Keyword(Keyword::If)) {
                Some(vec![self.parse_if()?])
            } else {
                let (branch, _) = self.parse_block()?;
                Some(branch)
            }
        } else {
            None
        };
        let end = else_branch
            .as_ref()
            .and_then(|branch| branch.last().map(|stmt| stmt.span.end))
            .unwrap_or(then_span.end);
        Ok(Stmt {
            span: SourceSpan { start, end },
            kind: StmtKind::If {
                condition,
                then_branch,
                else_branch,
            },
        })
    }

    fn parse_while(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.consume_keyword(Keyword::While)?.span.start;
        let condition = self.parse_expression()?;
        let (body, span) = self.parse_block()?;
        Ok(Stmt {
            span: SourceSpan {
                start,
                end: span.end,
            },
            kind: StmtKind::While { condition, body },
        })
    }

    fn parse_return(&mut self) -> Result<Stmt, Diagnostic> {
        let token = self.consume_keyword(Keyword::Return)?;
        let expr = if self.check(TokenKind::Semicolon)
            || self.check(TokenKind::RBrace)
            || self.check(TokenKind::Eof)
        {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.consume_optional_semicolon();
        let end = expr.as_ref().map(|e| e.span.end).unwrap_or(token.span.end);
        Ok(Stmt {
            span: SourceSpan {
                start: token.span.start,
                end,
            },
            kind: StmtKind::Return(expr),
        })
    }

    fn parse_expression_statement(&mut self) -> Result<Stmt, Diagnostic> {
        let expr = self.parse_expression()?;
        self.consume_optional_semicolon();
        Ok(Stmt {
            span: expr.span,
            kind: StmtKind::Expr(expr),
        })
    }

    fn parse_expression(&mut self) -> Result<Expr, Diagnostic> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> Result<Expr, Diagnostic> {
        let expr = self.parse_binary_level(0)?;
        if self.matches(TokenKind::Assign) {
            let equals = self.previous().span;
            let value = self.parse_assignment()?;
            match expr.kind {
                ExprKind::Variable(_) => Ok(Expr {
                    span: SourceSpan {
                        start: expr.span.start,
                        end: value.span.end,
                    },
                    kind: ExprKind::Assign {
                        target: Box::new(expr),
                        value: Box::new(value),
                    },
                }),
                _ => Err(
                    Diagnostic::new(DiagnosticKind::Parser, "invalid assignment target")
                        .with_span(equals),
                ),
            }
        } else {
            Ok(expr)
        }
    }

    /// Left-associative binary operators by precedence level, loosest first.
    const BINARY_LEVELS: &'static [&'static [(TokenKind, BinaryOp)]] = &[
        &[(TokenKind::DoublePipe, BinaryOp::Or)],
        &[(TokenKind::DoubleAmpersand, BinaryOp::And)],
        &[
            (TokenKind::EqualEqual, BinaryOp::Equal),
            (TokenKind::BangEqual, BinaryOp::NotEqual),
        ],
        &[
            (TokenKind::LessEqual, BinaryOp::LessEqual),
            (TokenKind::GreaterEqual, BinaryOp::GreaterEqual),
            (TokenKind::Less, BinaryOp::Less),
            (TokenKind::Greater, BinaryOp::Greater),
        ],
        &[
            (TokenKind::Plus, BinaryOp::Add),
            (TokenKind::Minus, BinaryOp::Sub),
        ],
        &[
            (TokenKind::Star, BinaryOp::Mul),
            (TokenKind::Slash, BinaryOp::Div),
            (TokenKind::Percent, BinaryOp::Mod),
        ],
    ];

    fn parse_binary_level(&mut self, level: usize) -> Result<Expr, Diagnostic> {
        let Some(operators) = Self::BINARY_LEVELS.get(level) else {
            return self.parse_unary();
        };
        let mut expr = self.parse_binary_level(level + 1)?;
        'scan: loop {
            for (kind, op) in operators.iter() {
                if self.matches(kind.clone()) {
                    let right = self.parse_binary_level(level + 1)?;
                    expr = binary(op.clone(), expr, right);
                    continue 'scan;
                }
            }
            break;
        }
        Ok(expr)
    }

    fn parse_unary(&mut self) -> Result<Expr, Diagnostic> {
        if self.matches(TokenKind::Minus) {
            let operator = self.previous().span;
            let right = self.parse_unary()?;
            Ok(Expr {
                span: SourceSpan {
                    start: operator.start,
                    end: right.span.end,
                },
                kind: ExprKind::Unary {
                    op: UnaryOp::Negate,
                    expr: Box::new(right),
                },
            })
        } else if self.matches(TokenKind::Bang) {
            let operator = self.previous().span;
            let right = self.parse_unary()?;
            Ok(Expr {
                span: SourceSpan {
                    start: operator.start,
                    end: right.span.end,
                },
                kind: ExprKind::Unary {
                    op: UnaryOp::Not,
                    expr: Box::new(right),
                },
            })
        } else {
            self.parse_call()
        }
    }

    fn parse_call(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.parse_primary()?;
        while self.matches(TokenKind::LParen) {
            let mut args = Vec::new();
            if !self.check(TokenKind::RParen) {
                loop {
                    args.push(self.parse_expression()?);
                    if !self.matches(TokenKind::Comma) {
                        break;
                    }
                }
            }
            let paren = self.consume(TokenKind::RParen, "expected `)` after arguments")?;
            expr = Expr {
                span: SourceSpan {
                    start: expr.span.start,
                    end: paren.span.end,
                },
                kind: ExprKind::Call {
                    callee: Box::new(expr),
                    args,
                },
            };
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, Diagnostic> {
        if let Some(token) = self.peek() {
            match &token.kind {
                TokenKind::Keyword(Keyword::True) => {
                    let tok = self.advance();
                    Ok(Expr {
                        span: tok.span,
                        kind: ExprKind::Literal(Literal::Bool(true)),
                    })
                }
                TokenKind::Keyword(Keyword::False) => {
                    let tok = self.advance();
                    Ok(Expr {
                        span: tok.span,
                        kind: ExprKind::Literal(Literal::Bool(false)),
                    })
                }
                TokenKind::Number => {
                    let tok = self.advance();
                    let digits = tok.lexeme.replace('_', "");
                    let literal = if tok.lexeme.contains(['.', 'e', 'E']) {
                        let value: f64 = digits.parse().map_err(|_| {
                            Diagnostic::new(
                                DiagnosticKind::Parser,
                                "malformed float literal",
                            )
                            .with_span(tok.span)
                        })?;
                        Literal::Float(value)
                    } else {
                        let value: i64 = digits.parse().map_err(|_| {
                            Diagnostic::new(
                                DiagnosticKind::Parser,
                                "integer literal out of range",
                            )
                            .with_span(tok.span)
                        })?;
                        Literal::Int(value)
                    };
                    Ok(Expr {
                        span: tok.span,
                        kind: ExprKind::Literal(literal),
                    })
                }
                TokenKind::String => {
                    let tok = self.advance();
                    Ok(Expr {
                        span: tok.span,
                        kind: ExprKind::Literal(Literal::Str(tok.lexeme.clone())),
                    })
                }
                TokenKind::Identifier => {
                    let tok = self.advance();
                    Ok(Expr {
                        span: tok.span,
                        kind: ExprKind::Variable(tok.lexeme.clone()),
                    })
                }
                TokenKind::LParen => {
                    let lparen = self.advance();
                    let inner = self.parse_expression()?;
                    let rparen = self.consume(TokenKind::RParen, "expected `)` after expression")?;
                    Ok(Expr {
                        span: SourceSpan {
                            start: lparen.span.start,
                            end: rparen.span.end,
                        },
                        kind: ExprKind::Group(Box::new(inner)),
                    })
                }
                TokenKind::LBracket => self.parse_lambda(),
                _ => {
                    let token = token.clone();
                    Err(self.error(&token, "unexpected token in expression"))
                }
            }
        } else {
            Err(self.error_eof("unexpected end of expression"))
        }
    }

    /// `[captures](params) mut -> type { body }`, with `mut` and the return
    /// annotation both optional.
    fn parse_lambda(&mut self) -> Result<Expr, Diagnostic> {
        let lbracket = self.consume(TokenKind::LBracket, "expected `[` to start capture list")?;
        let mut captures = Vec::new();
        if !self.check(TokenKind::RBracket) {
            loop {
                captures.push(self.parse_capture_spec()?);
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RBracket, "expected `]` after capture list")?;
        if captures.len() > 1 {
            if let Some(all) = captures
                .iter()
                .find(|spec| matches!(spec, CaptureSpec::All { .. }))
            {
                return Err(Diagnostic::new(
                    DiagnosticKind::Parser,
                    "capture-all cannot be combined with named captures",
                )
                .with_span(all.span()));
            }
        }
        self.consume(TokenKind::LParen, "expected `(` after capture list")?;
        let params = self.parse_params(TokenKind::RParen)?;
        self.consume(TokenKind::RParen, "expected `)` after lambda parameters")?;
        let mutable = self.matches_keyword(Keyword::Mut);
        let return_type = if self.matches(TokenKind::Arrow) {
            Some(self.parse_type_expr()?)
        } else {
            None
        };
        let (body, body_span) = self.parse_block()?;
        let span = SourceSpan {
            start: lbracket.span.start,
            end: body_span.end,
        };
        Ok(Expr {
            span,
            kind: ExprKind::Lambda(Rc::new(LambdaExpr {
                captures,
                params,
                return_type,
                mutable,
                body,
                span,
            })),
        })
    }

    fn parse_capture_spec(&mut self) -> Result<CaptureSpec, Diagnostic> {
        if self.matches(TokenKind::Assign) {
            return Ok(CaptureSpec::All {
                mode: CaptureMode::ByValue,
                span: self.previous().span,
            });
        }
        if self.matches(TokenKind::Ampersand) {
            let amp_span = self.previous().span;
            if self.check(TokenKind::Identifier) {
                let name = self.advance();
                return Ok(CaptureSpec::Named {
                    mode: CaptureMode::ByReference,
                    name: name.lexeme.clone(),
                    span: SourceSpan {
                        start: amp_span.start,
                        end: name.span.end,
                    },
                });
            }
            return Ok(CaptureSpec::All {
                mode: CaptureMode::ByReference,
                span: amp_span,
            });
        }
        let name = self.consume_identifier("expected capture item")?;
        Ok(CaptureSpec::Named {
            mode: CaptureMode::ByValue,
            name: name.lexeme.clone(),
            span: name.span,
        })
    }

    fn parse_type_expr(&mut self) -> Result<TypeExpr, Diagnostic> {
        if self.matches_keyword(Keyword::Box) {
            let start = self.previous().span.start;
            self.consume_keyword(Keyword::Fn)?;
            let (params, ret, end) = self.parse_signature_tail()?;
            return Ok(TypeExpr {
                kind: TypeExprKind::BoxFn { params, ret },
                span: SourceSpan { start, end },
            });
        }
        if self.matches_keyword(Keyword::Fn) {
            let start = self.previous().span.start;
            let (params, ret, end) = self.parse_signature_tail()?;
            return Ok(TypeExpr {
                kind: TypeExprKind::Pointer { params, ret },
                span: SourceSpan { start, end },
            });
        }
        let ident = self.consume_identifier("expected type name")?;
        Ok(TypeExpr {
            kind: TypeExprKind::Named(ident.lexeme.clone()),
            span: ident.span,
        })
    }

    fn parse_signature_tail(
        &mut self,
    ) -> Result<(Vec<TypeExpr>, Option<Box<TypeExpr>>, usize), Diagnostic> {
        self.consume(TokenKind::LParen, "expected `(` in function type")?;
        let mut params = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                params.push(self.parse_type_expr()?);
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        let rparen = self.consume(TokenKind::RParen, "expected `)` in function type")?;
        let mut end = rparen.span.end;
        let ret = if self.matches(TokenKind::Arrow) {
            let ty = self.parse_type_expr()?;
            end = ty.span.end;
            Some(Box::new(ty))
        } else {
            None
        };
        Ok((params, ret, end))
    }

    fn consume_optional_semicolon(&mut self) {
        let _ = self.matches(TokenKind::Semicolon);
    }

    fn matches(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn matches_keyword(&mut self, keyword: Keyword) -> bool {
        if let Some(Token {
            kind: TokenKind::Keyword(k),
            ..
        }) = self.peek()
        {
            if *k == keyword {
                self.advance();
                return true;
            }
        }
        false
    }

    fn consume(&mut self, kind: TokenKind, message: &str) -> Result<Token, Diagnostic> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self
                .peek()
                .cloned()
                .map(|tok| self.error(&tok, message))
                .unwrap_or_else(|| self.error_eof(message)))
        }
    }

    fn consume_keyword(&mut self, keyword: Keyword) -> Result<Token, Diagnostic> {
        if let Some(token) = self.peek() {
            if token.kind == TokenKind::Keyword(keyword.clone()) {
                Ok(self.advance())
            } else {
                let token = token.clone();
                Err(self.error(&token, &format!("expected keyword `{keyword:?}`")))
            }
        } else {
            Err(self.error_eof("unexpected end of input"))
        }
    }

    fn consume_identifier(&mut self, message: &str) -> Result<Token, Diagnostic> {
        if self.check(TokenKind::Identifier) {
            Ok(self.advance())
        } else {
            Err(self
                .peek()
                .cloned()
                .map(|tok| self.error(&tok, message))
                .unwrap_or_else(|| self.error_eof(message)))
        }
    }

    fn check(&self, kind: TokenKind) -> bool {
        if let Some(token) = self.peek() {
            token.kind == kind
        } else {
            false
        }
    }

    fn advance(&mut self) -> Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.previous().clone()
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.current - 1]
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.current)
    }

    fn is_at_end(&self) -> bool {
        matches!(self.peek().map(|t| &t.kind), Some(TokenKind::Eof) | None)
    }

    fn error(&self, token: &Token, message: &str) -> Diagnostic {
        Diagnostic::new(DiagnosticKind::Parser, message.to_string()).with_span(token.span)
    }

    fn error_eof(&self, message: &str) -> Diagnostic {
        Diagnostic::new(DiagnosticKind::Parser, message.to_string())
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr {
        span: SourceSpan {
            start: left.span.start,
            end: right.span.end,
        },
        kind: ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
    }
}
