use crate::ast::{AssignTarget, Expr, FunctionDecl, LiteralValue, Stmt};

/// Renders expressions in Lisp-like prefix form and statements as an
/// indented tree.
pub struct AstPrinter;

impl AstPrinter {
    pub fn print(expr: &Expr) -> String {
        match expr {
            Expr::Empty => "<empty>".into(),

            // ── literals ────────────────────────────────────────────────
            Expr::Literal(lit) => match lit {
                LiteralValue::True => "true".into(),

                LiteralValue::False => "false".into(),

                LiteralValue::Nil => "nil".into(),

                LiteralValue::Str(s) => format!("{}", s),

                LiteralValue::Number(n) => {
                    if n.fract() == 0.0 {
                        // 3.0 → 3.0
                        format!("{:.1}", n)
                    } else {
                        n.to_string()
                    }
                }
            },

            Expr::Grouping(inner) => format!("(group {})", Self::print(inner)),

            Expr::Unary { operator, right } => {
                format!("({} {})", operator.lexeme, Self::print(right))
            }

            Expr::Binary {
                left,
                operator,
                right,
            }
            | Expr::Logical {
                left,
                operator,
                right,
            } => format!(
                "({} {} {})",
                operator.lexeme,
                Self::print(left),
                Self::print(right)
            ),

            Expr::Variable(name) => name.lexeme.to_string(),

            Expr::Assign { target, value, .. } => match target {
                AssignTarget::Variable(name) => {
                    format!("(= {} {})", name.lexeme, Self::print(value))
                }
                AssignTarget::Property { object, name } => format!(
                    "(= (. {} {}) {})",
                    Self::print(object),
                    name.lexeme,
                    Self::print(value)
                ),
            },

            Expr::Call {
                callee, arguments, ..
            } => {
                let mut s = format!("(call {}", Self::print(callee));
                for arg in arguments {
                    s.push(' ');
                    s.push_str(&Self::print(arg));
                }
                s.push(')');
                s
            }

            Expr::Property { object, name } => {
                format!("(. {} {})", Self::print(object), name.lexeme)
            }

            Expr::This(_) => "this".into(),

            Expr::Function(decl) => format!("(fun ({}))", params(decl)),
        }
    }

    /// Tree dump of a statement list, one node per line.
    pub fn print_program(statements: &[Stmt]) -> String {
        let mut out = String::new();
        let count = statements.len();

        for (i, stmt) in statements.iter().enumerate() {
            Self::print_stmt(stmt, "", i + 1 == count, &mut out);
        }

        out
    }

    /// One-line label of a statement, without its nested statements.
    pub fn summarize(stmt: &Stmt) -> String {
        match stmt {
            Stmt::Expression { expr, .. } => format!("Expr {}", Self::print(expr)),
            Stmt::Print { expr, .. } => format!("Print {}", Self::print(expr)),
            Stmt::Var(decl) => format!("Var {} = {}", decl.name.lexeme, Self::print(&decl.initializer)),
            Stmt::Block { .. } => "Block".to_string(),
            Stmt::If { condition, .. } => format!("If {}", Self::print(condition)),
            Stmt::While { condition, .. } => format!("While {}", Self::print(condition)),
            Stmt::Function(decl) => format!("Fun {}({})", decl.name.lexeme, params(decl)),
            Stmt::Class(decl) => format!("Class {}", decl.name.lexeme),
            Stmt::Return { value, .. } => format!("Return {}", Self::print(value)),
        }
    }

    fn print_stmt(stmt: &Stmt, prefix: &str, last: bool, out: &mut String) {
        let branch = if last { "└─ " } else { "├─ " };

        out.push_str(prefix);
        out.push_str(branch);
        out.push_str(&Self::summarize(stmt));
        out.push('\n');

        let child_prefix = format!("{}{}", prefix, if last { "   " } else { "│  " });

        let children: Vec<&Stmt> = match stmt {
            Stmt::Block { statements, .. } => statements.iter().collect(),
            Stmt::If {
                then_branch,
                else_branch,
                ..
            } => vec![then_branch.as_ref(), else_branch.as_ref()],
            Stmt::While { body, .. } => vec![body.as_ref()],
            Stmt::Function(decl) => decl.body.iter().collect(),
            Stmt::Class(decl) => {
                for field in &decl.fields {
                    out.push_str(&child_prefix);
                    out.push_str(&format!(
                        "├─ Field {} = {}\n",
                        field.name.lexeme,
                        Self::print(&field.initializer)
                    ));
                }

                let count = decl.methods.len();
                for (i, method) in decl.methods.iter().enumerate() {
                    let inner = Stmt::Function(method.clone());
                    Self::print_stmt(&inner, &child_prefix, i + 1 == count, out);
                }

                Vec::new()
            }
            _ => Vec::new(),
        };

        let count = children.len();
        for (i, child) in children.into_iter().enumerate() {
            Self::print_stmt(child, &child_prefix, i + 1 == count, out);
        }
    }
}

fn params(decl: &FunctionDecl) -> String {
    decl.params
        .iter()
        .map(|param| &*param.lexeme)
        .collect::<Vec<&str>>()
        .join(", ")
}
