//! Abstract syntax tree: closed sum types for expressions and statements.
//!
//! Nodes are data only. The AST owns its tokens so that function bodies can
//! outlive the token buffer they were parsed from (a function declared on one
//! REPL line is called on a later one), which is why function and class
//! declarations sit behind an `Rc`.

use std::rc::Rc;

use crate::token::{Token, TokenType};

/// A **literal constant** that appears directly in the source code.
#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    /// Numeric literal, stored as IEEE‑754 `f64`.
    Number(f64),

    /// String literal without surrounding quotes.
    Str(Rc<str>),

    True,

    False,

    Nil,
}

/// Left-hand side of an assignment. Only these two shapes are assignable.
#[derive(Debug, Clone, PartialEq)]
pub enum AssignTarget {
    /// `name = value`
    Variable(Token),

    /// `object.name = value`
    Property { object: Box<Expr>, name: Token },
}

/// **Abstract‑Syntax‑Tree node** representing every kind of *expression*.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Absent expression (`var x;`, `return;`). Evaluates to nil.
    Empty,

    /// A literal constant: number, string, `true`, `false`, or `nil`.
    Literal(LiteralValue),

    /// Variable access.
    Variable(Token),

    /// Parenthesised sub‑expression.
    Grouping(Box<Expr>),

    /// Prefix unary operator expression, e.g. `!isReady` or `-42`.
    Unary { operator: Token, right: Box<Expr> },

    /// Infix binary operator expression, e.g. `a + b`, `x <= y`.
    Binary {
        left: Box<Expr>,
        operator: Token,
        right: Box<Expr>,
    },

    /// Short‑circuiting `and` / `or`.
    Logical {
        left: Box<Expr>,
        operator: Token, // `AND` or `OR`
        right: Box<Expr>,
    },

    /// Assignment to a variable or a property. Right-associative.
    Assign {
        target: AssignTarget,
        equals: Token,
        value: Box<Expr>,
    },

    /// Function‑ or method‑call expression.
    Call {
        callee: Box<Expr>,
        /// The closing `)`, kept for error locations.
        paren: Token,
        arguments: Vec<Expr>,
    },

    /// `object.name`
    Property { object: Box<Expr>, name: Token },

    /// The `this` keyword.
    This(Token),

    /// Anonymous function: `fun (a, b) { ... }`.
    Function(Rc<FunctionDecl>),
}

/// `fun name(params) { body }`, a class method, or an anonymous function.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    /// The name token; for anonymous functions this is the `fun` keyword.
    pub name: Token,

    /// Parameter name tokens (at most 255).
    pub params: Vec<Token>,

    pub body: Vec<Stmt>,
}

impl FunctionDecl {
    pub fn is_anonymous(&self) -> bool {
        self.name.token_type == TokenType::FUN
    }
}

/// `var name = initializer;`
#[derive(Debug, Clone, PartialEq)]
pub struct VarDecl {
    pub name: Token,
    pub initializer: Expr,
}

/// `class Name { var field = default; method() { ... } }`
#[derive(Debug, Clone, PartialEq)]
pub struct ClassDecl {
    pub name: Token,

    /// Field defaults, evaluated once when the class statement runs.
    pub fields: Vec<VarDecl>,

    pub methods: Vec<Rc<FunctionDecl>>,
}

/// **Abstract‑Syntax‑Tree node** for *statements*. Each variant keeps an
/// indicator token used only for diagnostics.
///
/// There is no `for` variant: the parser desugars `for` into a block holding
/// the initializer and a `while` loop.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// Stand‑alone expression terminated by a semicolon. `indicator` is the
    /// expression's first token.
    Expression { indicator: Token, expr: Expr },

    Print { keyword: Token, expr: Expr },

    Var(VarDecl),

    /// Braced scope; also produced by `for` desugaring, where `brace` is the
    /// `for` keyword.
    Block { brace: Token, statements: Vec<Stmt> },

    /// The parser fills a missing `else` with an empty block.
    If {
        keyword: Token,
        condition: Expr,
        then_branch: Box<Stmt>,
        else_branch: Box<Stmt>,
    },

    While {
        keyword: Token,
        condition: Expr,
        body: Box<Stmt>,
    },

    Function(Rc<FunctionDecl>),

    Class(Rc<ClassDecl>),

    /// `value` is `Expr::Empty` for a bare `return;`.
    Return { keyword: Token, value: Expr },
}

impl Stmt {
    pub fn indicator(&self) -> &Token {
        match self {
            Stmt::Expression { indicator, .. } => indicator,
            Stmt::Print { keyword, .. }
            | Stmt::If { keyword, .. }
            | Stmt::While { keyword, .. }
            | Stmt::Return { keyword, .. } => keyword,
            Stmt::Var(decl) => &decl.name,
            Stmt::Block { brace, .. } => brace,
            Stmt::Function(decl) => &decl.name,
            Stmt::Class(decl) => &decl.name,
        }
    }

    /// Short statement-kind label for traces and tree dumps.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Stmt::Expression { .. } => "ExprStmt",
            Stmt::Print { .. } => "PrintStmt",
            Stmt::Var(_) => "VarStmt",
            Stmt::Block { .. } => "BlockStmt",
            Stmt::If { .. } => "IfStmt",
            Stmt::While { .. } => "WhileStmt",
            Stmt::Function(_) => "FuncStmt",
            Stmt::Class(_) => "ClassStmt",
            Stmt::Return { .. } => "ReturnStmt",
        }
    }
}
