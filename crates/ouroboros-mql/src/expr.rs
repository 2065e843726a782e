//! Expression tree model
//!
//! A closed tagged union over the host-language expression nodes the
//! translators understand. Trees are immutable once built; translators only
//! borrow them.
//!
//! # Examples
//!
//! ```ignore
//! use ouroboros_mql::{Expr, Param, ValueType};
//!
//! let x = Param::new("x", ValueType::document("Root"));
//! // x => x.A == 1 && x.B == 11
//! let predicate = Expr::lambda(
//!     vec![x.clone()],
//!     Expr::param(&x).member("A").eq(Expr::int(1))
//!         .and_also(Expr::param(&x).member("B").eq(Expr::int(11))),
//! );
//! ```

use bson::{Bson, Document as BsonDocument};

use crate::types::ValueType;

/// Lambda parameter with its nominal type
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub value_type: ValueType,
}

impl Param {
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
        }
    }
}

/// Literal value with its host type
#[derive(Debug, Clone, PartialEq)]
pub struct Constant {
    pub value: Bson,
    pub value_type: ValueType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Lambda {
    pub params: Vec<Param>,
    pub body: Box<Expr>,
}

impl Lambda {
    /// The single parameter of a one-argument lambda
    pub fn single_param(&self) -> Option<&Param> {
        match self.params.as_slice() {
            [p] => Some(p),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Negate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    /// Short-circuit `&&`
    AndAlso,
    /// Short-circuit `||`
    OrElse,
    /// `&` (logical on booleans, bitwise on integers)
    And,
    /// `|` (logical on booleans, bitwise on integers)
    Or,
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    /// `??`
    Coalesce,
}

impl BinaryOp {
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Equal
                | BinaryOp::NotEqual
                | BinaryOp::GreaterThan
                | BinaryOp::GreaterThanOrEqual
                | BinaryOp::LessThan
                | BinaryOp::LessThanOrEqual
        )
    }

    /// Operator to use when the operands are swapped (`1 < x` becomes `x > 1`)
    pub fn flip(&self) -> BinaryOp {
        match self {
            BinaryOp::GreaterThan => BinaryOp::LessThan,
            BinaryOp::GreaterThanOrEqual => BinaryOp::LessThanOrEqual,
            BinaryOp::LessThan => BinaryOp::GreaterThan,
            BinaryOp::LessThanOrEqual => BinaryOp::GreaterThanOrEqual,
            other => *other,
        }
    }

    /// Host-language operator symbol
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::GreaterThan => ">",
            BinaryOp::GreaterThanOrEqual => ">=",
            BinaryOp::LessThan => "<",
            BinaryOp::LessThanOrEqual => "<=",
            BinaryOp::AndAlso => "&&",
            BinaryOp::OrElse => "||",
            BinaryOp::And => "&",
            BinaryOp::Or => "|",
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
            BinaryOp::Coalesce => "??",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionKind {
    Array,
    List,
    HashSet,
}

/// Expression node
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Constant(Constant),
    Parameter(Param),
    Member {
        target: Box<Expr>,
        name: String,
    },
    /// Instance or extension-method call; the receiver (or source sequence) is `target`
    Call {
        target: Box<Expr>,
        method: String,
        args: Vec<Expr>,
    },
    /// Static method call such as `Math.Abs(x)` or `String.IsNullOrEmpty(s)`
    StaticCall {
        class: String,
        method: String,
        args: Vec<Expr>,
    },
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Convert {
        operand: Box<Expr>,
        value_type: ValueType,
    },
    Quote(Box<Expr>),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Conditional {
        test: Box<Expr>,
        if_true: Box<Expr>,
        if_false: Box<Expr>,
    },
    /// Object construction: anonymous type, member init or constructor call
    New {
        type_name: Option<String>,
        members: Vec<(String, Expr)>,
    },
    /// Collection construction: `new[] { .. }`, `new List<T>(source)`, `new HashSet<T>(source)`
    NewCollection {
        kind: CollectionKind,
        source: Option<Box<Expr>>,
        items: Vec<Expr>,
    },
    Lambda(Lambda),
    /// `x is T`, or `x.GetType() == typeof(T)` when `exact`
    TypeIs {
        operand: Box<Expr>,
        type_name: String,
        exact: bool,
    },
    /// Pre-built filter document spliced in verbatim
    Inject(BsonDocument),
}

impl Expr {
    pub fn constant(value: impl Into<Bson>, value_type: ValueType) -> Self {
        Expr::Constant(Constant {
            value: value.into(),
            value_type,
        })
    }

    pub fn int(value: i32) -> Self {
        Expr::constant(value, ValueType::Int32)
    }

    pub fn long(value: i64) -> Self {
        Expr::constant(value, ValueType::Int64)
    }

    pub fn double(value: f64) -> Self {
        Expr::constant(value, ValueType::Double)
    }

    pub fn string(value: impl Into<String>) -> Self {
        Expr::constant(value.into(), ValueType::String)
    }

    pub fn char(value: char) -> Self {
        Expr::constant(value.to_string(), ValueType::Char)
    }

    pub fn bool(value: bool) -> Self {
        Expr::constant(value, ValueType::Boolean)
    }

    pub fn null(value_type: ValueType) -> Self {
        Expr::constant(Bson::Null, value_type)
    }

    pub fn date(value: chrono::DateTime<chrono::Utc>) -> Self {
        Expr::constant(bson::DateTime::from_chrono(value), ValueType::DateTime)
    }

    /// Enum literal given by its numeric value
    pub fn enum_value(enum_name: impl Into<String>, value: i32) -> Self {
        Expr::constant(value, ValueType::enumeration(enum_name))
    }

    /// Local collection of literals
    pub fn local_array(values: Vec<Bson>, item_type: ValueType) -> Self {
        Expr::constant(Bson::Array(values), ValueType::array(item_type))
    }

    pub fn param(param: &Param) -> Self {
        Expr::Parameter(param.clone())
    }

    pub fn lambda(params: Vec<Param>, body: Expr) -> Self {
        Expr::Lambda(Lambda {
            params,
            body: Box::new(body),
        })
    }

    pub fn static_call(class: impl Into<String>, method: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::StaticCall {
            class: class.into(),
            method: method.into(),
            args,
        }
    }

    pub fn new_object(type_name: Option<&str>, members: Vec<(&str, Expr)>) -> Self {
        Expr::New {
            type_name: type_name.map(str::to_string),
            members: members
                .into_iter()
                .map(|(name, e)| (name.to_string(), e))
                .collect(),
        }
    }

    pub fn new_collection(kind: CollectionKind, source: Option<Expr>, items: Vec<Expr>) -> Self {
        Expr::NewCollection {
            kind,
            source: source.map(Box::new),
            items,
        }
    }

    pub fn member(self, name: impl Into<String>) -> Self {
        Expr::Member {
            target: Box::new(self),
            name: name.into(),
        }
    }

    pub fn call(self, method: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Call {
            target: Box::new(self),
            method: method.into(),
            args,
        }
    }

    /// `source.OfType<T>()`
    pub fn of_type(self, type_name: impl Into<String>) -> Self {
        self.call("OfType", vec![Expr::string(type_name)])
    }

    pub fn index(self, index: Expr) -> Self {
        Expr::Index {
            target: Box::new(self),
            index: Box::new(index),
        }
    }

    pub fn convert(self, value_type: ValueType) -> Self {
        Expr::Convert {
            operand: Box::new(self),
            value_type,
        }
    }

    pub fn quote(self) -> Self {
        Expr::Quote(Box::new(self))
    }

    pub fn not(self) -> Self {
        Expr::Unary {
            op: UnaryOp::Not,
            operand: Box::new(self),
        }
    }

    pub fn negate(self) -> Self {
        Expr::Unary {
            op: UnaryOp::Negate,
            operand: Box::new(self),
        }
    }

    pub fn is_type(self, type_name: impl Into<String>) -> Self {
        Expr::TypeIs {
            operand: Box::new(self),
            type_name: type_name.into(),
            exact: false,
        }
    }

    /// `self.GetType() == typeof(T)`
    pub fn is_exact_type(self, type_name: impl Into<String>) -> Self {
        Expr::TypeIs {
            operand: Box::new(self),
            type_name: type_name.into(),
            exact: true,
        }
    }

    pub fn conditional(test: Expr, if_true: Expr, if_false: Expr) -> Self {
        Expr::Conditional {
            test: Box::new(test),
            if_true: Box::new(if_true),
            if_false: Box::new(if_false),
        }
    }

    pub fn binary(self, op: BinaryOp, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(self),
            right: Box::new(right),
        }
    }

    pub fn eq(self, right: Expr) -> Self {
        self.binary(BinaryOp::Equal, right)
    }

    pub fn ne(self, right: Expr) -> Self {
        self.binary(BinaryOp::NotEqual, right)
    }

    pub fn gt(self, right: Expr) -> Self {
        self.binary(BinaryOp::GreaterThan, right)
    }

    pub fn ge(self, right: Expr) -> Self {
        self.binary(BinaryOp::GreaterThanOrEqual, right)
    }

    pub fn lt(self, right: Expr) -> Self {
        self.binary(BinaryOp::LessThan, right)
    }

    pub fn le(self, right: Expr) -> Self {
        self.binary(BinaryOp::LessThanOrEqual, right)
    }

    pub fn and_also(self, right: Expr) -> Self {
        self.binary(BinaryOp::AndAlso, right)
    }

    pub fn or_else(self, right: Expr) -> Self {
        self.binary(BinaryOp::OrElse, right)
    }

    pub fn bit_and(self, right: Expr) -> Self {
        self.binary(BinaryOp::And, right)
    }

    pub fn add(self, right: Expr) -> Self {
        self.binary(BinaryOp::Add, right)
    }

    pub fn subtract(self, right: Expr) -> Self {
        self.binary(BinaryOp::Subtract, right)
    }

    pub fn multiply(self, right: Expr) -> Self {
        self.binary(BinaryOp::Multiply, right)
    }

    pub fn divide(self, right: Expr) -> Self {
        self.binary(BinaryOp::Divide, right)
    }

    pub fn modulo(self, right: Expr) -> Self {
        self.binary(BinaryOp::Modulo, right)
    }

    pub fn coalesce(self, right: Expr) -> Self {
        self.binary(BinaryOp::Coalesce, right)
    }

    /// Removes `Quote` and `Convert` wrappers
    pub fn strip(&self) -> &Expr {
        match self {
            Expr::Quote(inner) => inner.strip(),
            Expr::Convert { operand, .. } => operand.strip(),
            other => other,
        }
    }

    /// The literal behind this node, looking through `Quote`/`Convert`
    pub fn as_constant(&self) -> Option<&Constant> {
        match self.strip() {
            Expr::Constant(c) => Some(c),
            _ => None,
        }
    }

    /// Value known at translation time: a literal, a negated literal, or an
    /// object/collection built only from literals
    pub fn evaluate_local(&self) -> Option<Constant> {
        match self.strip() {
            Expr::Constant(c) => Some(c.clone()),
            Expr::Unary { op: UnaryOp::Negate, operand } => {
                let c = operand.evaluate_local()?;
                // integer negation wraps like the host's unchecked arithmetic
                let value = match c.value {
                    Bson::Int32(n) => Bson::Int32(n.wrapping_neg()),
                    Bson::Int64(n) => Bson::Int64(n.wrapping_neg()),
                    Bson::Double(n) => Bson::Double(-n),
                    _ => return None,
                };
                Some(Constant {
                    value,
                    value_type: c.value_type,
                })
            }
            Expr::New {
                type_name: Some(name),
                members,
            } => {
                let mut fields = BsonDocument::new();
                for (member, value) in members {
                    fields.insert(member.clone(), value.evaluate_local()?.value);
                }
                Some(Constant {
                    value: Bson::Document(fields),
                    value_type: ValueType::document(name.clone()),
                })
            }
            Expr::NewCollection { source: Some(source), .. } => source.evaluate_local(),
            Expr::NewCollection { source: None, items, .. } => {
                let values = items.iter().map(Expr::evaluate_local).collect::<Option<Vec<_>>>()?;
                let item_type = values
                    .first()
                    .map(|c| c.value_type.clone())
                    .unwrap_or(ValueType::Any);
                Some(Constant {
                    value: Bson::Array(values.into_iter().map(|c| c.value).collect()),
                    value_type: ValueType::array(item_type),
                })
            }
            _ => None,
        }
    }

    /// Whether this node is evaluated client-side rather than by the server
    pub fn is_local(&self) -> bool {
        self.evaluate_local().is_some()
    }

    pub fn as_lambda(&self) -> Option<&Lambda> {
        match self {
            Expr::Lambda(l) => Some(l),
            Expr::Quote(inner) => inner.as_lambda(),
            _ => None,
        }
    }

    /// Parameter and body of a one-argument lambda
    pub fn as_unary_lambda(&self) -> Option<(&Param, &Expr)> {
        let lambda = self.as_lambda()?;
        Some((lambda.single_param()?, &lambda.body))
    }

    /// True for the bare parameter `p`
    pub fn is_parameter(&self, param: &str) -> bool {
        matches!(self.strip(), Expr::Parameter(p) if p.name == param)
    }

    /// Rewrites `Enumerable.M(source, args..)` into the receiver form `source.M(args..)`
    pub fn as_extension_call(&self) -> Option<Expr> {
        match self {
            Expr::StaticCall { class, method, args }
                if (class == "Enumerable" || class == "Queryable")
                    && !args.is_empty()
                    && method != "Range"
                    && method != "Repeat" =>
            {
                Some(Expr::Call {
                    target: Box::new(args[0].clone()),
                    method: method.clone(),
                    args: args[1..].to_vec(),
                })
            }
            _ => None,
        }
    }
}

impl Constant {
    pub fn as_i64(&self) -> Option<i64> {
        match &self.value {
            Bson::Int32(n) => Some(*n as i64),
            Bson::Int64(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.value.as_bool()
    }

    pub fn as_str(&self) -> Option<&str> {
        self.value.as_str()
    }

    pub fn is_null(&self) -> bool {
        matches!(self.value, Bson::Null)
    }

    /// Reads a `StringComparison` argument given by name or by number
    pub fn string_comparison(&self) -> Option<StringComparison> {
        match &self.value {
            Bson::String(name) if name == "Ordinal" => Some(StringComparison::Ordinal),
            Bson::String(name) if name == "OrdinalIgnoreCase" => Some(StringComparison::OrdinalIgnoreCase),
            Bson::Int32(4) => Some(StringComparison::Ordinal),
            Bson::Int32(5) => Some(StringComparison::OrdinalIgnoreCase),
            _ => None,
        }
    }
}

/// String comparison modes with a server equivalent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringComparison {
    Ordinal,
    OrdinalIgnoreCase,
}
