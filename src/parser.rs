/*!
Recursive‑descent parser
========================

One token of lookahead, one method per grammar rule. The parser is an
iterator over top‑level declarations: each `next()` yields either a complete
statement or a parse error. After an error the parser **synchronizes**
(discards tokens up to a statement boundary) and resumes with the next
declaration, at whatever nesting level the error happened, so error cascades
stay bounded to roughly one per broken statement.

### Logging Policy

| Location                     | Level  | Purpose                                   |
|------------------------------|--------|-------------------------------------------|
| `Parser::new`, `parse_program` | `info` | Lifecycle milestones.                   |
| `declaration`, `statement`   | `debug`| High‑level descent into grammar branches. |
| Error paths (`consume`, etc.)| `debug`| Context before returning structured error.|

Grammar (EBNF)
--------------

```text
program        → declaration* EOF ;
declaration    → classDecl | funDecl | varDecl | statement ;
classDecl      → "class" IDENT "{" ( varDecl | method )* "}" ;
funDecl        → "fun" IDENT function ;
method         → IDENT function ;
function       → "(" parameters? ")" block ;
varDecl        → "var" IDENT ( "=" expression )? ";" ;
statement      → exprStmt | forStmt | ifStmt | printStmt
               | returnStmt | whileStmt | block ;
forStmt        → "for" "(" ( varDecl | exprStmt | ";" )
                 expression? ";" expression? ")" statement ;
ifStmt         → "if" "(" expression ")" statement ( "else" statement )? ;
printStmt      → "print" expression ";" ;
returnStmt     → "return" expression? ";" ;
whileStmt      → "while" "(" expression ")" statement ;
block          → "{" declaration* "}" ;
expression     → assignment ;
assignment     → ( call "." )? IDENT "=" assignment | logic_or ;
logic_or       → logic_and ( "or" logic_and )* ;
logic_and      → equality  ( "and" equality )* ;
equality       → comparison ( ( "!=" | "==" ) comparison )* ;
comparison     → term ( ( ">" | ">=" | "<" | "<=" ) term )* ;
term           → factor ( ( "-" | "+" ) factor )* ;
factor         → unary ( ( "/" | "*" ) unary )* ;
unary          → ( "!" | "-" ) unary | call ;
call           → primary ( "(" arguments? ")" | "." IDENT )* ;
primary        → NUMBER | STRING | "true" | "false" | "nil" | "this"
               | IDENT | "(" expression ")" | "fun" function ;
```
*/

use std::collections::VecDeque;
use std::rc::Rc;

use crate::ast::{AssignTarget, ClassDecl, Expr, FunctionDecl, LiteralValue, Stmt, VarDecl};
use crate::error::{LoxError, Result};
use crate::reporter::Reporter;
use crate::stack::ensure_sufficient_stack;
use crate::token::{Literal, Token, TokenType};

use log::{debug, info};

/// Maximum number of parameters or call arguments.
pub const MAX_ARITY: usize = 255;

/// Top‑level parser over an immutable slice of tokens.
pub struct Parser<'a> {
    tokens: &'a [Token],
    current: usize,

    /// Nesting depth of function bodies; `return` is only legal above zero.
    function_depth: usize,

    /// Stand-in returned by `peek` if the slice does not end with `EOF`.
    eof: Token,

    /// Items waiting to be yielded: errors recovered inside a declaration
    /// come out ahead of the declaration itself.
    pending: VecDeque<Result<Stmt>>,
}

impl<'a> Parser<'a> {
    /// Construct a new parser.
    pub fn new(tokens: &'a [Token]) -> Self {
        info!("Parser created with {} tokens", tokens.len());

        let line = tokens.last().map_or(1, |t| t.line);

        Self {
            tokens,
            current: 0,
            function_depth: 0,
            eof: Token::new(TokenType::EOF, "", None, line),
            pending: VecDeque::new(),
        }
    }

    // ──────────────────────── declaration rules ───────────────────

    /// Parse one declaration. On error the parser synchronizes, queues the
    /// error and returns `None`, so an enclosing block keeps going.
    fn declaration(&mut self) -> Option<Stmt> {
        debug!("Entering declaration");

        let result = ensure_sufficient_stack(|| {
            if self.matches(TokenType::CLASS) {
                self.class_declaration()
            } else if self.check(TokenType::FUN) && self.check_next(TokenType::IDENTIFIER) {
                self.advance();
                self.function().map(|decl| Stmt::Function(Rc::new(decl)))
            } else if self.matches(TokenType::VAR) {
                self.var_declaration().map(Stmt::Var)
            } else {
                self.statement()
            }
        });

        match result {
            Ok(stmt) => Some(stmt),
            Err(e) => {
                self.synchronize();
                self.pending.push_back(Err(e));
                None
            }
        }
    }

    fn class_declaration(&mut self) -> Result<Stmt> {
        let name: Token = self.consume(TokenType::IDENTIFIER, "Expect class name.")?;

        self.consume(TokenType::LEFT_BRACE, "Expect '{' before class body.")?;

        let mut fields: Vec<VarDecl> = Vec::new();
        let mut methods: Vec<Rc<FunctionDecl>> = Vec::new();

        while !self.check(TokenType::RIGHT_BRACE) && !self.is_at_end() {
            if self.matches(TokenType::VAR) {
                fields.push(self.var_declaration()?);
            } else {
                methods.push(Rc::new(self.function()?));
            }
        }

        self.consume(TokenType::RIGHT_BRACE, "Expect '}' after class body.")?;

        debug!(
            "Parsed class '{}' with {} field(s) and {} method(s)",
            name.lexeme,
            fields.len(),
            methods.len()
        );

        Ok(Stmt::Class(Rc::new(ClassDecl {
            name,
            fields,
            methods,
        })))
    }

    /// `IDENT "(" parameters? ")" block`, shared by functions and methods.
    fn function(&mut self) -> Result<FunctionDecl> {
        let name: Token = self.consume(TokenType::IDENTIFIER, "Expect function name.")?;

        self.function_rest(name)
    }

    /// Parameter list and body, after the name (or `fun` keyword) was consumed.
    fn function_rest(&mut self, name: Token) -> Result<FunctionDecl> {
        self.consume(TokenType::LEFT_PAREN, "Expect '(' after function name.")?;

        let mut params: Vec<Token> = Vec::new();

        if !self.check(TokenType::RIGHT_PAREN) {
            loop {
                if params.len() >= MAX_ARITY {
                    return Err(self.error_at_peek("Can't have more than 255 parameters."));
                }

                params.push(self.consume(TokenType::IDENTIFIER, "Expect parameter name.")?);

                if !self.matches(TokenType::COMMA) {
                    break;
                }
            }
        }

        self.consume(TokenType::RIGHT_PAREN, "Expect ')' after parameters.")?;
        self.consume(TokenType::LEFT_BRACE, "Expect '{' before function body.")?;

        self.function_depth += 1;
        let body = self.block();
        self.function_depth -= 1;

        Ok(FunctionDecl {
            name,
            params,
            body: body?,
        })
    }

    fn var_declaration(&mut self) -> Result<VarDecl> {
        let name: Token = self.consume(TokenType::IDENTIFIER, "Expect variable name.")?;

        let initializer: Expr = if self.matches(TokenType::EQUAL) {
            self.expression()?
        } else {
            Expr::Empty
        };

        self.consume(
            TokenType::SEMICOLON,
            "Expect ';' after variable declaration.",
        )?;

        Ok(VarDecl { name, initializer })
    }

    // ───────────────────────── statement rules ────────────────────

    fn statement(&mut self) -> Result<Stmt> {
        debug!("Entering statement at line {}", self.peek().line);

        ensure_sufficient_stack(|| {
            if self.matches(TokenType::FOR) {
                self.for_statement()
            } else if self.matches(TokenType::IF) {
                self.if_statement()
            } else if self.matches(TokenType::WHILE) {
                self.while_statement()
            } else if self.matches(TokenType::RETURN) {
                self.return_statement()
            } else if self.matches(TokenType::LEFT_BRACE) {
                let brace: Token = self.previous().clone();

                Ok(Stmt::Block {
                    brace,
                    statements: self.block()?,
                })
            } else if self.matches(TokenType::PRINT) {
                self.print_statement()
            } else {
                self.expression_statement()
            }
        })
    }

    /// `for (init; cond; incr) body` becomes
    /// `{ init; while (cond) { body; incr; } }`.
    fn for_statement(&mut self) -> Result<Stmt> {
        let keyword: Token = self.previous().clone();

        self.consume(TokenType::LEFT_PAREN, "Expect '(' after 'for'.")?;

        let initializer: Option<Stmt> = if self.matches(TokenType::SEMICOLON) {
            None
        } else if self.matches(TokenType::VAR) {
            Some(Stmt::Var(self.var_declaration()?))
        } else {
            Some(self.expression_statement()?)
        };

        let condition: Expr = if !self.check(TokenType::SEMICOLON) {
            self.expression()?
        } else {
            Expr::Literal(LiteralValue::True)
        };
        self.consume(TokenType::SEMICOLON, "Expect ';' after loop condition.")?;

        let increment: Option<(Token, Expr)> = if !self.check(TokenType::RIGHT_PAREN) {
            let indicator: Token = self.peek().clone();
            Some((indicator, self.expression()?))
        } else {
            None
        };
        self.consume(TokenType::RIGHT_PAREN, "Expect ')' after for clauses.")?;

        let mut body: Stmt = self.statement()?;

        if let Some((indicator, expr)) = increment {
            body = Stmt::Block {
                brace: keyword.clone(),
                statements: vec![body, Stmt::Expression { indicator, expr }],
            };
        }

        let mut statements: Vec<Stmt> = Vec::with_capacity(2);
        statements.extend(initializer);
        statements.push(Stmt::While {
            keyword: keyword.clone(),
            condition,
            body: Box::new(body),
        });

        Ok(Stmt::Block {
            brace: keyword,
            statements,
        })
    }

    fn print_statement(&mut self) -> Result<Stmt> {
        let keyword: Token = self.previous().clone();
        let expr: Expr = self.expression()?;

        self.consume(TokenType::SEMICOLON, "Expect ';' after value.")?;

        Ok(Stmt::Print { keyword, expr })
    }

    fn expression_statement(&mut self) -> Result<Stmt> {
        let indicator: Token = self.peek().clone();
        let expr: Expr = self.expression()?;

        self.consume(TokenType::SEMICOLON, "Expect ';' after expression.")?;

        Ok(Stmt::Expression { indicator, expr })
    }

    fn if_statement(&mut self) -> Result<Stmt> {
        let keyword: Token = self.previous().clone();

        self.consume(TokenType::LEFT_PAREN, "Expect '(' after 'if'.")?;
        let condition: Expr = self.expression()?;
        self.consume(TokenType::RIGHT_PAREN, "Expect ')' after if condition.")?;

        let then_branch: Box<Stmt> = Box::new(self.statement()?);
        let else_branch: Box<Stmt> = if self.matches(TokenType::ELSE) {
            Box::new(self.statement()?)
        } else {
            Box::new(Stmt::Block {
                brace: keyword.clone(),
                statements: Vec::new(),
            })
        };

        Ok(Stmt::If {
            keyword,
            condition,
            then_branch,
            else_branch,
        })
    }

    fn while_statement(&mut self) -> Result<Stmt> {
        let keyword: Token = self.previous().clone();

        self.consume(TokenType::LEFT_PAREN, "Expect '(' after 'while'.")?;
        let condition: Expr = self.expression()?;
        self.consume(TokenType::RIGHT_PAREN, "Expect ')' after condition.")?;
        let body: Box<Stmt> = Box::new(self.statement()?);

        Ok(Stmt::While {
            keyword,
            condition,
            body,
        })
    }

    fn return_statement(&mut self) -> Result<Stmt> {
        let keyword: Token = self.previous().clone();

        if self.function_depth == 0 {
            return Err(LoxError::parse(
                keyword.line,
                keyword.location(),
                "Can't return from top-level code.",
            ));
        }

        let value: Expr = if !self.check(TokenType::SEMICOLON) {
            self.expression()?
        } else {
            Expr::Empty
        };

        self.consume(TokenType::SEMICOLON, "Expect ';' after return value.")?;

        Ok(Stmt::Return { keyword, value })
    }

    fn block(&mut self) -> Result<Vec<Stmt>> {
        let mut statements: Vec<Stmt> = Vec::new();

        while !self.check(TokenType::RIGHT_BRACE) && !self.is_at_end() {
            statements.extend(self.declaration());
        }

        self.consume(TokenType::RIGHT_BRACE, "Expect '}' after block.")?;

        Ok(statements)
    }

    // ─────────────────────── expression rules ─────────────────────

    fn expression(&mut self) -> Result<Expr> {
        ensure_sufficient_stack(|| self.assignment())
    }

    fn assignment(&mut self) -> Result<Expr> {
        let expr: Expr = self.logical_or()?;

        if self.matches(TokenType::EQUAL) {
            let equals: Token = self.previous().clone();
            let value: Expr = self.assignment()?;

            let target: AssignTarget = match expr {
                Expr::Variable(name) => AssignTarget::Variable(name),

                Expr::Property { object, name } => AssignTarget::Property { object, name },

                _ => {
                    debug!("Rejecting assignment target at line {}", equals.line);

                    return Err(LoxError::parse(
                        equals.line,
                        equals.location(),
                        "Invalid assignment target.",
                    ));
                }
            };

            return Ok(Expr::Assign {
                target,
                equals,
                value: Box::new(value),
            });
        }

        Ok(expr)
    }

    fn logical_or(&mut self) -> Result<Expr> {
        let mut expr: Expr = self.logical_and()?;

        while self.matches(TokenType::OR) {
            let operator: Token = self.previous().clone();
            let right: Expr = self.logical_and()?;

            expr = Expr::Logical {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }

        Ok(expr)
    }

    fn logical_and(&mut self) -> Result<Expr> {
        let mut expr: Expr = self.equality()?;

        while self.matches(TokenType::AND) {
            let operator: Token = self.previous().clone();
            let right: Expr = self.equality()?;

            expr = Expr::Logical {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }

        Ok(expr)
    }

    /// One left-associative binary precedence level.
    fn binary_level(
        &mut self,
        operators: &[TokenType],
        operand: fn(&mut Self) -> Result<Expr>,
    ) -> Result<Expr> {
        let mut expr: Expr = operand(self)?;

        while operators.iter().any(|&tt| self.check(tt)) {
            let operator: Token = self.advance().clone();
            let right: Expr = operand(self)?;

            expr = Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }

        Ok(expr)
    }

    fn equality(&mut self) -> Result<Expr> {
        self.binary_level(
            &[TokenType::BANG_EQUAL, TokenType::EQUAL_EQUAL],
            Self::comparison,
        )
    }

    fn comparison(&mut self) -> Result<Expr> {
        self.binary_level(
            &[
                TokenType::GREATER,
                TokenType::GREATER_EQUAL,
                TokenType::LESS,
                TokenType::LESS_EQUAL,
            ],
            Self::term,
        )
    }

    fn term(&mut self) -> Result<Expr> {
        self.binary_level(&[TokenType::MINUS, TokenType::PLUS], Self::factor)
    }

    fn factor(&mut self) -> Result<Expr> {
        self.binary_level(&[TokenType::STAR, TokenType::SLASH], Self::unary)
    }

    fn unary(&mut self) -> Result<Expr> {
        ensure_sufficient_stack(|| {
            if self.matches(TokenType::BANG) || self.matches(TokenType::MINUS) {
                let operator: Token = self.previous().clone();
                let right: Expr = self.unary()?;

                return Ok(Expr::Unary {
                    operator,
                    right: Box::new(right),
                });
            }

            self.call()
        })
    }

    fn call(&mut self) -> Result<Expr> {
        let mut expr: Expr = self.primary()?;

        loop {
            if self.matches(TokenType::LEFT_PAREN) {
                expr = self.finish_call(expr)?;
            } else if self.matches(TokenType::DOT) {
                let name: Token =
                    self.consume(TokenType::IDENTIFIER, "Expect property name after '.'.")?;

                expr = Expr::Property {
                    object: Box::new(expr),
                    name,
                };
            } else {
                break;
            }
        }

        Ok(expr)
    }

    fn finish_call(&mut self, callee: Expr) -> Result<Expr> {
        let mut arguments: Vec<Expr> = Vec::new();

        if !self.check(TokenType::RIGHT_PAREN) {
            loop {
                if arguments.len() >= MAX_ARITY {
                    return Err(self.error_at_peek("Can't have more than 255 arguments."));
                }

                arguments.push(self.expression()?);

                if !self.matches(TokenType::COMMA) {
                    break;
                }
            }
        }

        let paren: Token = self.consume(TokenType::RIGHT_PAREN, "Expect ')' after arguments.")?;

        Ok(Expr::Call {
            callee: Box::new(callee),
            paren,
            arguments,
        })
    }

    fn primary(&mut self) -> Result<Expr> {
        if self.matches(TokenType::FALSE) {
            return Ok(Expr::Literal(LiteralValue::False));
        }
        if self.matches(TokenType::TRUE) {
            return Ok(Expr::Literal(LiteralValue::True));
        }
        if self.matches(TokenType::NIL) {
            return Ok(Expr::Literal(LiteralValue::Nil));
        }

        if self.matches(TokenType::NUMBER) || self.matches(TokenType::STRING) {
            return match &self.previous().literal {
                Some(Literal::Number(n)) => Ok(Expr::Literal(LiteralValue::Number(*n))),
                Some(Literal::Str(s)) => Ok(Expr::Literal(LiteralValue::Str(Rc::clone(s)))),
                None => Err(self.error_at_previous("Literal token without a value.")),
            };
        }

        if self.matches(TokenType::THIS) {
            return Ok(Expr::This(self.previous().clone()));
        }

        if self.matches(TokenType::IDENTIFIER) {
            return Ok(Expr::Variable(self.previous().clone()));
        }

        if self.matches(TokenType::FUN) {
            let keyword: Token = self.previous().clone();

            return Ok(Expr::Function(Rc::new(self.function_rest(keyword)?)));
        }

        if self.matches(TokenType::LEFT_PAREN) {
            let expr: Expr = self.expression()?;

            self.consume(TokenType::RIGHT_PAREN, "Expect ')' after expression.")?;

            return Ok(Expr::Grouping(Box::new(expr)));
        }

        Err(self.error_at_peek("Expect expression."))
    }

    // ────────────────────── utility helpers ───────────────────────

    #[inline(always)]
    fn matches(&mut self, ttype: TokenType) -> bool {
        if self.check(ttype) {
            self.advance();

            return true;
        }

        false
    }

    fn consume(&mut self, ttype: TokenType, message: &str) -> Result<Token> {
        if self.check(ttype) {
            return Ok(self.advance().clone());
        }

        debug!(
            "Expected {:?}, found {:?} at line {}",
            ttype,
            self.peek().token_type,
            self.peek().line
        );

        Err(self.error_at_peek(message))
    }

    fn error_at_peek(&self, message: &str) -> LoxError {
        let token: &Token = self.peek();

        LoxError::parse(token.line, token.location(), message)
    }

    fn error_at_previous(&self, message: &str) -> LoxError {
        let token: &Token = self.previous();

        LoxError::parse(token.line, token.location(), message)
    }

    #[inline(always)]
    fn check(&self, ttype: TokenType) -> bool {
        if self.is_at_end() {
            return false;
        }

        self.peek().token_type == ttype
    }

    #[inline(always)]
    fn check_next(&self, ttype: TokenType) -> bool {
        self.tokens
            .get(self.current + 1)
            .is_some_and(|t| t.token_type == ttype)
    }

    #[inline(always)]
    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.current += 1;
        }

        self.previous()
    }

    #[inline(always)]
    fn is_at_end(&self) -> bool {
        self.peek().token_type == TokenType::EOF
    }

    #[inline(always)]
    fn peek(&self) -> &Token {
        self.tokens.get(self.current).unwrap_or(&self.eof)
    }

    #[inline(always)]
    fn previous(&self) -> &Token {
        self.current
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .unwrap_or_else(|| self.peek())
    }

    /// Discards tokens until it thinks it is at a statement boundary.
    fn synchronize(&mut self) {
        debug!("Synchronizing after parse error at line {}", self.peek().line);

        self.advance(); // skip the token that caused the error

        while !self.is_at_end() {
            if self.previous().token_type == TokenType::SEMICOLON {
                return;
            }

            match self.peek().token_type {
                TokenType::CLASS
                | TokenType::FUN
                | TokenType::VAR
                | TokenType::FOR
                | TokenType::IF
                | TokenType::WHILE
                | TokenType::PRINT
                | TokenType::RETURN => return,
                _ => {}
            }

            self.advance();
        }
    }
}

impl Iterator for Parser<'_> {
    type Item = Result<Stmt>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.pending.pop_front() {
                return Some(item);
            }

            if self.is_at_end() {
                return None;
            }

            if let Some(stmt) = self.declaration() {
                self.pending.push_back(Ok(stmt));
            }
        }
    }
}

/// Parse every declaration in `tokens`. Each parse error goes to `reporter`
/// as soon as it is found; the statements that did parse are still returned
/// alongside the error count.
pub fn parse_program(tokens: &[Token], reporter: &mut dyn Reporter) -> (Vec<Stmt>, usize) {
    let mut statements: Vec<Stmt> = Vec::new();
    let mut errors: usize = 0;

    for result in Parser::new(tokens) {
        match result {
            Ok(stmt) => statements.push(stmt),
            Err(e) => {
                errors += 1;
                reporter.static_error(&e);
            }
        }
    }

    info!(
        "Parsed {} statement(s) with {} error(s)",
        statements.len(),
        errors
    );

    (statements, errors)
}
