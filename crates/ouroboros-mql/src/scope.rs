//! Lambda scope tracking
//!
//! Every nested collection lambda (`Any`, `All`, `Where`, `Select`, ...)
//! pushes a [`Frame`] binding its parameters. A scope is an immutable stack:
//! `push` returns a new scope and leaves the caller's untouched, so a builder
//! can try one rendering and fall back to another from the same starting
//! point.
//!
//! A parameter reference is *local* when the innermost frame binds it and
//! *foreign* when only an enclosing frame does. Foreign references are
//! rejected with `IllegalScopeReference`.

use bson::Bson;
use ouroboros_common::{Result, TranslationError};

use crate::expr::{Expr, Lambda};

/// What a lambda parameter stands for while its body is translated
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    /// Fields render as dotted paths below `prefix`, relative to the root
    /// document or to the element of the enclosing `$elemMatch`
    Document { prefix: Vec<String> },
    /// Aggregation variable, referenced as `$$name`
    Variable(String),
    /// Aggregation sub-expression standing in for the parameter
    Computed(Bson),
    /// Grouping parameter; `Key` is the group key, the elements are the grouped documents
    Group,
    /// Item of a local collection, only meaningful to client-side patterns such as `$in`
    Local,
}

impl Binding {
    pub fn root() -> Self {
        Binding::Document { prefix: Vec::new() }
    }
}

/// Parameters introduced by one lambda
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    bindings: Vec<(String, Binding)>,
    elem_match: bool,
}

impl Frame {
    pub fn new(param: impl Into<String>, binding: Binding) -> Self {
        Self {
            bindings: vec![(param.into(), binding)],
            elem_match: false,
        }
    }

    pub fn bind(mut self, param: impl Into<String>, binding: Binding) -> Self {
        self.bindings.push((param.into(), binding));
        self
    }

    /// Marks the frame as the body of an `$elemMatch` (or a path collapsed into one)
    pub fn elem_match(mut self, flag: bool) -> Self {
        self.elem_match = flag;
        self
    }

    fn binding(&self, param: &str) -> Option<&Binding> {
        self.bindings
            .iter()
            .rev()
            .find(|(name, _)| name == param)
            .map(|(_, b)| b)
    }
}

/// Ownership of a parameter reference relative to the innermost frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Ownership<'a> {
    Local(&'a Binding),
    Foreign,
    Unbound,
}

/// Immutable stack of lambda frames
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scope {
    frames: Vec<Frame>,
}

impl Scope {
    /// Scope of a root lambda whose parameter is the whole document
    pub fn root(param: impl Into<String>) -> Self {
        Self::default().push(Frame::new(param, Binding::root()))
    }

    pub fn push(&self, frame: Frame) -> Scope {
        let mut frames = self.frames.clone();
        frames.push(frame);
        Scope { frames }
    }

    /// Adds a binding to the innermost frame instead of opening a new one
    pub fn bind_local(&self, param: impl Into<String>, binding: Binding) -> Scope {
        let mut frames = self.frames.clone();
        match frames.last_mut() {
            Some(frame) => frame.bindings.push((param.into(), binding)),
            None => frames.push(Frame::new(param, binding)),
        }
        Scope { frames }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// True while translating inside an `$elemMatch` body
    pub fn in_elem_match(&self) -> bool {
        self.frames.last().map(|f| f.elem_match).unwrap_or(false)
    }

    pub fn classify(&self, param: &str) -> Ownership<'_> {
        let Some((innermost, outer)) = self.frames.split_last() else {
            return Ownership::Unbound;
        };
        if let Some(binding) = innermost.binding(param) {
            return Ownership::Local(binding);
        }
        if outer.iter().any(|f| f.binding(param).is_some()) {
            Ownership::Foreign
        } else {
            Ownership::Unbound
        }
    }

    /// Binding of a parameter referenced by `expr`, rejecting foreign references
    pub fn resolve(&self, param: &str, expr: &Expr) -> Result<&Binding> {
        match self.classify(param) {
            Ownership::Local(binding) => Ok(binding),
            Ownership::Foreign => Err(TranslationError::illegal_scope(expr.to_string(), param)),
            Ownership::Unbound => Err(TranslationError::unsupported(format!(
                "{} references unbound parameter '{}'",
                expr, param
            ))),
        }
    }

    /// Walks a lambda body and rejects any member chain rooted at a parameter
    /// of an enclosing lambda.
    ///
    /// Lambdas applied to local collections are evaluated client-side, so their
    /// parameters join the current frame rather than opening a new one.
    pub fn check(&self, expr: &Expr) -> Result<()> {
        if let Some(param) = chain_root(expr) {
            if self.classify(param) == Ownership::Foreign {
                return Err(TranslationError::illegal_scope(expr.to_string(), param));
            }
        }
        match expr {
            Expr::Constant(_) | Expr::Parameter(_) | Expr::Inject(_) => Ok(()),
            Expr::Member { target, .. } => self.check(target),
            Expr::Index { target, index } => {
                self.check(target)?;
                self.check(index)
            }
            Expr::Call { target, args, .. } => {
                self.check(target)?;
                let local = target.is_local();
                for arg in args {
                    match arg.as_lambda() {
                        Some(lambda) => {
                            let scope = if local {
                                lambda
                                    .params
                                    .iter()
                                    .fold(self.clone(), |s, p| s.bind_local(&p.name, Binding::Local))
                            } else {
                                self.push(lambda_frame(lambda))
                            };
                            scope.check(&lambda.body)?;
                        }
                        None => self.check(arg)?,
                    }
                }
                Ok(())
            }
            Expr::StaticCall { args, .. } => match expr.as_extension_call() {
                Some(call) => self.check(&call),
                None => args.iter().try_for_each(|a| self.check(a)),
            },
            Expr::Unary { operand, .. } | Expr::Convert { operand, .. } | Expr::Quote(operand) => {
                self.check(operand)
            }
            Expr::Binary { left, right, .. } => {
                self.check(left)?;
                self.check(right)
            }
            Expr::Conditional { test, if_true, if_false } => {
                self.check(test)?;
                self.check(if_true)?;
                self.check(if_false)
            }
            Expr::New { members, .. } => members.iter().try_for_each(|(_, e)| self.check(e)),
            Expr::NewCollection { source, items, .. } => {
                if let Some(source) = source {
                    self.check(source)?;
                }
                items.iter().try_for_each(|i| self.check(i))
            }
            Expr::Lambda(lambda) => self.push(lambda_frame(lambda)).check(&lambda.body),
            Expr::TypeIs { operand, .. } => self.check(operand),
        }
    }
}

fn lambda_frame(lambda: &Lambda) -> Frame {
    let mut params = lambda.params.iter();
    let mut frame = match params.next() {
        Some(first) => Frame::new(&first.name, Binding::root()),
        None => Frame {
            bindings: Vec::new(),
            elem_match: false,
        },
    };
    for p in params {
        frame = frame.bind(&p.name, Binding::root());
    }
    frame
}

/// Parameter at the root of a member/index chain
fn chain_root(expr: &Expr) -> Option<&str> {
    match expr {
        Expr::Parameter(p) => Some(&p.name),
        Expr::Member { target, .. } | Expr::Index { target, .. } => chain_root(target),
        Expr::Convert { operand, .. } | Expr::Quote(operand) => chain_root(operand),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Param;
    use crate::types::ValueType;

    #[test]
    fn test_root_is_local() {
        let scope = Scope::root("x");
        assert_eq!(scope.classify("x"), Ownership::Local(&Binding::root()));
        assert_eq!(scope.classify("y"), Ownership::Unbound);
    }

    #[test]
    fn test_outer_parameter_is_foreign() {
        let scope = Scope::root("x").push(Frame::new("g", Binding::root()).elem_match(true));
        assert_eq!(scope.classify("x"), Ownership::Foreign);
        assert!(scope.in_elem_match());
    }

    #[test]
    fn test_push_leaves_original_untouched() {
        let root = Scope::root("x");
        let inner = root.push(Frame::new("g", Binding::Variable("g".into())));
        assert_eq!(root.depth(), 1);
        assert_eq!(inner.depth(), 2);
    }

    #[test]
    fn test_resolve_reports_foreign_reference() {
        let x = Param::new("x", ValueType::document("Root"));
        let scope = Scope::root("x").push(Frame::new("g", Binding::root()));
        let expr = Expr::param(&x).member("A");
        let err = scope.resolve("x", &expr).unwrap_err();
        assert_eq!(err, TranslationError::illegal_scope("x.A", "x"));
    }

    #[test]
    fn test_check_reports_outer_member_chain() {
        let x = Param::new("x", ValueType::document("Root"));
        let g = Param::new("g", ValueType::document("C"));
        let body = Expr::param(&x).member("G").call(
            "Any",
            vec![Expr::lambda(vec![g], Expr::param(&x).member("A").eq(Expr::int(2)))],
        );
        let err = Scope::root("x").check(&body).unwrap_err();
        assert_eq!(err, TranslationError::illegal_scope("x.A", "x"));
    }

    #[test]
    fn test_check_accepts_local_collection_lambda() {
        let x = Param::new("x", ValueType::document("Root"));
        let i = Param::new("i", ValueType::Int32);
        let local = Expr::local_array(vec![Bson::Int32(1), Bson::Int32(2)], ValueType::Int32);
        let body = local.call(
            "Any",
            vec![Expr::lambda(
                vec![i.clone()],
                Expr::param(&x).member("L").call("Contains", vec![Expr::param(&i)]),
            )],
        );
        assert!(Scope::root("x").check(&body).is_ok());
    }

    #[test]
    fn test_check_accepts_own_parameter() {
        let x = Param::new("x", ValueType::document("Root"));
        let g = Param::new("g", ValueType::document("C"));
        let body = Expr::param(&x).member("G").call(
            "Any",
            vec![Expr::lambda(vec![g.clone()], Expr::param(&g).member("D").eq(Expr::string("Don't")))],
        );
        assert!(Scope::root("x").check(&body).is_ok());
    }

    #[test]
    fn test_shadowing_prefers_innermost() {
        let scope = Scope::root("x").push(Frame::new("x", Binding::Variable("x".into())));
        assert_eq!(scope.classify("x"), Ownership::Local(&Binding::Variable("x".into())));
    }
}
