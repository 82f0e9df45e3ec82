//! Recursive-descent parser for Tarn.
//!
//! Statements are separated by newlines, so the parser threads explicit
//! newline handling: it skips them freely inside delimiters and requires
//! them between statements. Expressions are parsed with one function per
//! precedence level; assignment is the only right-associative level.

use crate::ast::*;
use crate::token::{line_col, tokenize, SpannedToken, Token};
use crate::{ParseError, Result};

/// Parses a complete source file into a [`Program`].
pub fn parse_program(source: &str) -> Result<Program> {
    Parser::new(source)?.parse()
}

pub struct Parser<'a> {
    source: &'a str,
    tokens: Vec<SpannedToken>,
    pos: usize,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str) -> Result<Self> {
        let tokens = tokenize(source)?;
        Ok(Self {
            source,
            tokens,
            pos: 0,
        })
    }

    // =========================================
    // Helpers
    // =========================================

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|t| &t.value)
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn advance(&mut self) -> Option<&Token> {
        if self.pos < self.tokens.len() {
            self.pos += 1;
            self.tokens.get(self.pos - 1).map(|t| &t.value)
        } else {
            None
        }
    }

    /// Compares token kinds only; use the dedicated helpers for tokens that
    /// carry payloads.
    fn check(&self, kind: &Token) -> bool {
        match self.peek() {
            Some(tok) => std::mem::discriminant(tok) == std::mem::discriminant(kind),
            None => false,
        }
    }

    fn match_token(&mut self, kind: &Token) -> bool {
        if self.check(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &Token, expected: &str) -> Result<()> {
        if self.match_token(kind) {
            Ok(())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn expect_ident(&mut self, expected: &str) -> Result<String> {
        match self.peek() {
            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.unexpected(expected)),
        }
    }

    fn skip_newlines(&mut self) {
        while self.check(&Token::Newline) {
            self.pos += 1;
        }
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        match self.tokens.get(self.pos) {
            Some(tok) => {
                let (line, column) = line_col(self.source, tok.span.start);
                ParseError::UnexpectedToken {
                    expected: expected.to_string(),
                    found: tok.value.to_string(),
                    line,
                    column,
                }
            }
            None => ParseError::UnexpectedEof {
                expected: expected.to_string(),
            },
        }
    }

    fn current_position(&self) -> (usize, usize) {
        match self.tokens.get(self.pos) {
            Some(tok) => line_col(self.source, tok.span.start),
            None => line_col(self.source, self.source.len()),
        }
    }

    // =========================================
    // Items
    // =========================================

    pub fn parse(&mut self) -> Result<Program> {
        let mut items = Vec::new();
        self.skip_newlines();
        while !self.is_at_end() {
            items.push(self.parse_item()?);
            self.skip_newlines();
        }
        Ok(Program { items })
    }

    fn parse_item(&mut self) -> Result<Item> {
        match self.peek() {
            Some(Token::Fun) => Ok(Item::Function(self.parse_function()?)),
            Some(Token::Struct) => Ok(Item::Struct(self.parse_struct()?)),
            _ => Err(self.unexpected("`fun` or `struct`")),
        }
    }

    fn parse_function(&mut self) -> Result<Function> {
        self.expect(&Token::Fun, "`fun`")?;
        let name = self.expect_ident("a function name")?;
        self.expect(&Token::LParen, "`(`")?;
        let mut params = Vec::new();
        self.skip_newlines();
        if !self.check(&Token::RParen) {
            loop {
                let pname = self.expect_ident("a parameter name")?;
                self.expect(&Token::Colon, "`:`")?;
                let ty = self.parse_type()?;
                params.push(Param { name: pname, ty });
                self.skip_newlines();
                if !self.match_token(&Token::Comma) {
                    break;
                }
                self.skip_newlines();
            }
        }
        self.expect(&Token::RParen, "`)`")?;
        let return_type = if self.match_token(&Token::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };
        self.skip_newlines();
        let body = self.parse_block()?;
        Ok(Function {
            name,
            params,
            return_type,
            body,
        })
    }

    fn parse_struct(&mut self) -> Result<StructDef> {
        self.expect(&Token::Struct, "`struct`")?;
        let name = self.expect_ident("a struct name")?;
        self.skip_newlines();
        self.expect(&Token::LBrace, "`{`")?;
        let mut fields = Vec::new();
        self.skip_newlines();
        while !self.check(&Token::RBrace) {
            let fname = self.expect_ident("a field name")?;
            self.expect(&Token::Colon, "`:`")?;
            let ty = self.parse_type()?;
            fields.push(Field { name: fname, ty });
            if self.check(&Token::RBrace) {
                break;
            }
            if !self.match_token(&Token::Comma) {
                self.expect(&Token::Newline, "`,` or a newline")?;
            }
            self.skip_newlines();
        }
        self.expect(&Token::RBrace, "`}`")?;
        Ok(StructDef { name, fields })
    }

    // =========================================
    // Statements
    // =========================================

    fn parse_statement(&mut self) -> Result<Stmt> {
        match self.peek() {
            Some(Token::Val) => self.parse_val(),
            Some(Token::Var) => self.parse_var(),
            Some(Token::Return) => self.parse_return(),
            Some(Token::While) => self.parse_while(),
            Some(Token::Do) => self.parse_do_while(),
            _ => Ok(Stmt::Expr(self.parse_expression()?)),
        }
    }

    fn parse_val(&mut self) -> Result<Stmt> {
        self.advance();
        let name = self.expect_ident("a binding name")?;
        let ty = if self.match_token(&Token::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };
        self.expect(&Token::Eq, "`=`")?;
        let init = self.parse_expression()?;
        Ok(Stmt::Val { name, ty, init })
    }

    fn parse_var(&mut self) -> Result<Stmt> {
        self.advance();
        let name = self.expect_ident("a binding name")?;
        let ty = if self.match_token(&Token::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };
        let init = if self.match_token(&Token::Eq) {
            Some(self.parse_expression()?)
        } else if ty.is_some() {
            // `var x: T` starts out zero-initialized
            None
        } else {
            return Err(self.unexpected("an initializer or a type annotation"));
        };
        Ok(Stmt::Var { name, ty, init })
    }

    fn parse_return(&mut self) -> Result<Stmt> {
        self.advance();
        if self.check(&Token::Newline) || self.check(&Token::RBrace) || self.is_at_end() {
            Ok(Stmt::Return(None))
        } else {
            Ok(Stmt::Return(Some(self.parse_expression()?)))
        }
    }

    fn parse_while(&mut self) -> Result<Stmt> {
        self.advance();
        self.expect(&Token::LParen, "`(`")?;
        let cond = self.parse_expression()?;
        self.expect(&Token::RParen, "`)`")?;
        self.skip_newlines();
        let body = Box::new(self.parse_statement()?);
        Ok(Stmt::While { cond, body })
    }

    fn parse_do_while(&mut self) -> Result<Stmt> {
        self.advance();
        self.skip_newlines();
        let body = self.parse_block()?;
        self.skip_newlines();
        self.expect(&Token::While, "`while`")?;
        self.expect(&Token::LParen, "`(`")?;
        let cond = self.parse_expression()?;
        self.expect(&Token::RParen, "`)`")?;
        Ok(Stmt::DoWhile { body, cond })
    }

    // =========================================
    // Expressions
    // =========================================

    fn parse_expression(&mut self) -> Result<Expr> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> Result<Expr> {
        let target = self.parse_logical_or()?;

        let op = match self.peek() {
            Some(Token::Eq) => None,
            Some(Token::PlusEq) => Some(BinaryOp::Add),
            Some(Token::MinusEq) => Some(BinaryOp::Sub),
            Some(Token::StarEq) => Some(BinaryOp::Mul),
            Some(Token::SlashEq) => Some(BinaryOp::Div),
            Some(Token::PercentEq) => Some(BinaryOp::Rem),
            Some(Token::AmpEq) => Some(BinaryOp::BitAnd),
            Some(Token::PipeEq) => Some(BinaryOp::BitOr),
            Some(Token::CaretEq) => Some(BinaryOp::BitXor),
            Some(Token::ShlEq) => Some(BinaryOp::Shl),
            Some(Token::ShrEq) => Some(BinaryOp::Shr),
            _ => return Ok(target),
        };
        self.advance();

        // Right-associative: `a = b = c` assigns `c` to `b` first.
        let value = self.parse_assignment()?;
        Ok(Expr::Assign {
            op,
            target: Box::new(target),
            value: Box::new(value),
        })
    }

    fn parse_logical_or(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_logical_and()?;
        while self.match_token(&Token::OrOr) {
            let rhs = self.parse_logical_and()?;
            lhs = binary(BinaryOp::Or, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_logical_and(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_bit_or()?;
        while self.match_token(&Token::AndAnd) {
            let rhs = self.parse_bit_or()?;
            lhs = binary(BinaryOp::And, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_bit_or(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_bit_xor()?;
        while self.match_token(&Token::Pipe) {
            let rhs = self.parse_bit_xor()?;
            lhs = binary(BinaryOp::BitOr, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_bit_xor(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_bit_and()?;
        while self.match_token(&Token::Caret) {
            let rhs = self.parse_bit_and()?;
            lhs = binary(BinaryOp::BitXor, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_bit_and(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_equality()?;
        while self.match_token(&Token::Amp) {
            let rhs = self.parse_equality()?;
            lhs = binary(BinaryOp::BitAnd, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_comparison()?;
        loop {
            let op = match self.peek() {
                Some(Token::EqEq) => BinaryOp::Eq,
                Some(Token::NotEq) => BinaryOp::Ne,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.parse_comparison()?;
            lhs = binary(op, lhs, rhs);
        }
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_shift()?;
        loop {
            let op = match self.peek() {
                Some(Token::Lt) => BinaryOp::Lt,
                Some(Token::LtEq) => BinaryOp::Le,
                Some(Token::Gt) => BinaryOp::Gt,
                Some(Token::GtEq) => BinaryOp::Ge,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.parse_shift()?;
            lhs = binary(op, lhs, rhs);
        }
    }

    fn parse_shift(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                Some(Token::Shl) => BinaryOp::Shl,
                Some(Token::Shr) => BinaryOp::Shr,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.parse_additive()?;
            lhs = binary(op, lhs, rhs);
        }
    }

    fn parse_additive(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.parse_multiplicative()?;
            lhs = binary(op, lhs, rhs);
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                Some(Token::Percent) => BinaryOp::Rem,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = binary(op, lhs, rhs);
        }
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        let op = match self.peek() {
            Some(Token::Minus) => Some(UnaryOp::Neg),
            Some(Token::Tilde) => Some(UnaryOp::BitNot),
            Some(Token::Bang) => Some(UnaryOp::Not),
            Some(Token::PlusPlus) => Some(UnaryOp::PreInc),
            Some(Token::MinusMinus) => Some(UnaryOp::PreDec),
            Some(Token::Star) => Some(UnaryOp::Deref),
            Some(Token::Amp) => Some(UnaryOp::AddrOf),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary {
                op,
                operand: Box::new(operand),
            });
        }
        self.parse_postfix()
    }

    /// Member access and `as` casts bind tighter than any other operator and
    /// chain left-to-right.
    fn parse_postfix(&mut self) -> Result<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.match_token(&Token::Dot) {
                let member = self.parse_primary()?;
                expr = Expr::Member {
                    base: Box::new(expr),
                    member: Box::new(member),
                };
            } else if self.match_token(&Token::As) {
                let ty = self.parse_type()?;
                expr = Expr::Cast {
                    expr: Box::new(expr),
                    ty,
                };
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let token = match self.peek() {
            Some(t) => t.clone(),
            None => return Err(self.unexpected("an expression")),
        };
        match token {
            Token::Int(v) => {
                self.pos += 1;
                Ok(Expr::Int(v))
            }
            Token::UInt(v) => {
                self.pos += 1;
                Ok(Expr::UInt(v))
            }
            Token::Long(v) => {
                self.pos += 1;
                Ok(Expr::Long(v))
            }
            Token::ULong(v) => {
                self.pos += 1;
                Ok(Expr::ULong(v))
            }
            Token::Double(v) => {
                self.pos += 1;
                Ok(Expr::Double(v))
            }
            Token::Bool(v) => {
                self.pos += 1;
                Ok(Expr::Bool(v))
            }
            Token::Char(v) => {
                self.pos += 1;
                Ok(Expr::Char(v))
            }
            Token::Str(_) => {
                let (line, column) = self.current_position();
                Err(ParseError::StringLiteral { line, column })
            }
            Token::Ident(name) => {
                self.pos += 1;
                if self.check(&Token::LParen) {
                    self.parse_call(name)
                } else if self.check(&Token::LBrace) {
                    self.parse_struct_literal(name)
                } else {
                    Ok(Expr::Name(name))
                }
            }
            Token::LParen => {
                self.pos += 1;
                self.skip_newlines();
                let expr = self.parse_expression()?;
                self.skip_newlines();
                self.expect(&Token::RParen, "`)`")?;
                Ok(expr)
            }
            Token::LBrace => self.parse_block(),
            Token::If => self.parse_if(),
            Token::SizeOf => {
                self.pos += 1;
                self.expect(&Token::LParen, "`(`")?;
                let ty = self.parse_type()?;
                self.expect(&Token::RParen, "`)`")?;
                Ok(Expr::SizeOf(ty))
            }
            _ => Err(self.unexpected("an expression")),
        }
    }

    fn parse_call(&mut self, callee: String) -> Result<Expr> {
        self.expect(&Token::LParen, "`(`")?;
        let mut args = Vec::new();
        self.skip_newlines();
        if !self.check(&Token::RParen) {
            loop {
                args.push(self.parse_expression()?);
                self.skip_newlines();
                if !self.match_token(&Token::Comma) {
                    break;
                }
                self.skip_newlines();
            }
        }
        self.expect(&Token::RParen, "`)`")?;
        Ok(Expr::Call { callee, args })
    }

    fn parse_struct_literal(&mut self, name: String) -> Result<Expr> {
        self.expect(&Token::LBrace, "`{`")?;
        let mut inits = Vec::new();
        self.skip_newlines();
        if !self.check(&Token::RBrace) {
            loop {
                let fname = self.expect_ident("a field name")?;
                self.expect(&Token::Colon, "`:`")?;
                let value = self.parse_expression()?;
                inits.push(FieldInit {
                    name: fname,
                    value,
                });
                self.skip_newlines();
                if !self.match_token(&Token::Comma) {
                    break;
                }
                self.skip_newlines();
            }
        }
        self.expect(&Token::RBrace, "`}`")?;
        Ok(Expr::StructLiteral { name, inits })
    }

    fn parse_if(&mut self) -> Result<Expr> {
        self.expect(&Token::If, "`if`")?;
        self.expect(&Token::LParen, "`(`")?;
        let cond = self.parse_expression()?;
        self.expect(&Token::RParen, "`)`")?;
        self.skip_newlines();
        let then_body = Box::new(self.parse_statement()?);

        // `else` may sit on the next line; rewind if it never shows up.
        let saved = self.pos;
        self.skip_newlines();
        let else_body = if self.match_token(&Token::Else) {
            self.skip_newlines();
            Some(Box::new(self.parse_statement()?))
        } else {
            self.pos = saved;
            None
        };

        Ok(Expr::If {
            cond: Box::new(cond),
            then_body,
            else_body,
        })
    }

    // =========================================
    // Blocks and types
    // =========================================

    fn parse_block(&mut self) -> Result<Expr> {
        self.expect(&Token::LBrace, "`{`")?;
        let mut statements = Vec::new();
        self.skip_newlines();
        while !self.check(&Token::RBrace) {
            statements.push(self.parse_statement()?);
            if self.check(&Token::RBrace) {
                break;
            }
            self.expect(&Token::Newline, "a newline or `}`")?;
            self.skip_newlines();
        }
        self.expect(&Token::RBrace, "`}`")?;
        Ok(Expr::Block(statements))
    }

    fn parse_type(&mut self) -> Result<TypeExpr> {
        if self.match_token(&Token::Amp) {
            let is_const = self.match_token(&Token::Const);
            let inner = self.parse_type()?;
            return Ok(TypeExpr::Reference {
                inner: Box::new(inner),
                is_const,
            });
        }
        if self.match_token(&Token::AndAnd) {
            // `&&T` is two reference layers, same as `& & T`
            let inner = self.parse_type()?;
            return Ok(TypeExpr::Reference {
                inner: Box::new(TypeExpr::Reference {
                    inner: Box::new(inner),
                    is_const: false,
                }),
                is_const: false,
            });
        }
        if self.match_token(&Token::Star) {
            let is_const = self.match_token(&Token::Const);
            let inner = self.parse_type()?;
            return Ok(TypeExpr::Pointer {
                inner: Box::new(inner),
                is_const,
            });
        }
        if self.match_token(&Token::LParen) {
            let inner = self.parse_type()?;
            self.expect(&Token::RParen, "`)`")?;
            return Ok(inner);
        }
        let name = self.expect_ident("a type name")?;
        Ok(TypeExpr::Named(name))
    }
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}
