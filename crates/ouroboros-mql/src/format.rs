//! Canonical textual rendering of expression trees, used in error messages.

use std::fmt;

use bson::Bson;

use crate::expr::{CollectionKind, Constant, Expr, UnaryOp};

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Constant(c) => write!(f, "{}", c),
            Expr::Parameter(p) => write!(f, "{}", p.name),
            Expr::Member { target, name } => write!(f, "{}.{}", target, name),
            Expr::Call { target, method, args } if method == "OfType" => {
                let type_name = args
                    .first()
                    .and_then(|a| a.as_constant())
                    .and_then(Constant::as_str)
                    .unwrap_or("?");
                write!(f, "{}.OfType<{}>()", target, type_name)
            }
            Expr::Call { target, method, args } => {
                write!(f, "{}.{}(", target, method)?;
                write_list(f, args)?;
                write!(f, ")")
            }
            Expr::StaticCall { class, method, args } => {
                write!(f, "{}.{}(", class, method)?;
                write_list(f, args)?;
                write!(f, ")")
            }
            Expr::Index { target, index } => write!(f, "{}[{}]", target, index),
            Expr::Unary { op: UnaryOp::Not, operand } => write!(f, "Not({})", operand),
            Expr::Unary { op: UnaryOp::Negate, operand } => write!(f, "-{}", operand),
            Expr::Convert { operand, value_type } => write!(f, "Convert({}, {})", operand, value_type),
            Expr::Quote(inner) => write!(f, "{}", inner),
            Expr::Binary { op, left, right } => write!(f, "({} {} {})", left, op.symbol(), right),
            Expr::Conditional { test, if_true, if_false } => {
                write!(f, "IIF({}, {}, {})", test, if_true, if_false)
            }
            Expr::New { type_name, members } => {
                match type_name {
                    Some(name) => write!(f, "new {} {{", name)?,
                    None => write!(f, "new {{")?,
                }
                for (i, (name, value)) in members.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, " {} = {}", name, value)?;
                }
                write!(f, " }}")
            }
            Expr::NewCollection { kind, source, items } => {
                let kind = match kind {
                    CollectionKind::Array => "[]",
                    CollectionKind::List => "List",
                    CollectionKind::HashSet => "HashSet",
                };
                match source {
                    Some(source) => write!(f, "new {}({})", kind, source),
                    None => {
                        write!(f, "new {} {{", kind)?;
                        write_list(f, items)?;
                        write!(f, "}}")
                    }
                }
            }
            Expr::Lambda(lambda) => {
                match lambda.params.as_slice() {
                    [p] => write!(f, "{}", p.name)?,
                    params => {
                        write!(f, "(")?;
                        for (i, p) in params.iter().enumerate() {
                            if i > 0 {
                                write!(f, ", ")?;
                            }
                            write!(f, "{}", p.name)?;
                        }
                        write!(f, ")")?;
                    }
                }
                write!(f, " => {}", lambda.body)
            }
            Expr::TypeIs { operand, type_name, exact: false } => {
                write!(f, "({} Is {})", operand, type_name)
            }
            Expr::TypeIs { operand, type_name, exact: true } => {
                write!(f, "({}.GetType() == typeof({}))", operand, type_name)
            }
            Expr::Inject(doc) => write!(f, "Inject({})", doc),
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Bson::String(s) => write!(f, "\"{}\"", s),
            Bson::Null => write!(f, "null"),
            Bson::Boolean(b) => write!(f, "{}", if *b { "True" } else { "False" }),
            Bson::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            other => write!(f, "{}", other),
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Expr]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}
