//! Field resolution
//!
//! Turns a chain of member accesses rooted at a lambda parameter into the
//! stored element path and the codec of its leaf, using the serializer
//! registry. Also infers the nominal type of arbitrary expression nodes,
//! which the builders use to pick between operators (`$concat` vs `$add`,
//! `$strLenBytes` vs `$size`, ...).

use ouroboros_common::{Result, TranslationError};

use crate::expr::{BinaryOp, Constant, Expr, UnaryOp};
use crate::registry::SerializerRegistry;
use crate::types::{DictionaryRepresentation, Representation, ValueType};

/// Stored location of a member chain
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedField {
    /// Lambda parameter the chain is rooted at
    pub parameter: String,
    /// Element names from the parameter to the leaf
    pub path: Vec<String>,
    pub value_type: ValueType,
    pub representation: Representation,
    /// The path contains an array position (`M.1`)
    pub positional: bool,
}

impl ResolvedField {
    fn root(parameter: &str, value_type: ValueType) -> Self {
        Self {
            parameter: parameter.to_string(),
            path: Vec::new(),
            value_type,
            representation: Representation::Default,
            positional: false,
        }
    }

    /// Dot-separated element path
    pub fn dotted(&self) -> String {
        self.path.join(".")
    }

    fn child(mut self, element: String, value_type: ValueType, representation: Representation) -> Self {
        self.path.push(element);
        self.value_type = value_type;
        self.representation = representation;
        self
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FieldResolver<'a> {
    registry: &'a SerializerRegistry,
}

const DATE_PARTS: &[&str] = &[
    "Year",
    "Month",
    "Day",
    "Hour",
    "Minute",
    "Second",
    "Millisecond",
    "DayOfYear",
    "DayOfWeek",
];

impl<'a> FieldResolver<'a> {
    pub fn new(registry: &'a SerializerRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &'a SerializerRegistry {
        self.registry
    }

    /// Element name, type and representation of `member` on a value of type `base`.
    ///
    /// Returns `Ok(None)` when `base` has no stored members (scalars, arrays).
    pub fn member_element(
        &self,
        base: &ValueType,
        member: &str,
    ) -> Result<Option<(String, ValueType, Representation)>> {
        match base.underlying() {
            ValueType::Document(type_name) => match self.registry.member(type_name, member) {
                Some(m) => Ok(Some((m.element_name.clone(), m.value_type.clone(), m.representation))),
                None if self.registry.document(type_name).is_some() => Err(TranslationError::unsupported(format!(
                    "{} has no mapped member '{}'",
                    type_name, member
                ))),
                None => Ok(Some((member.to_string(), ValueType::Any, Representation::Default))),
            },
            ValueType::Any => Ok(Some((member.to_string(), ValueType::Any, Representation::Default))),
            _ => Ok(None),
        }
    }

    /// Resolves `expr` to a stored field, or `None` when it is not a plain member chain
    pub fn resolve(&self, expr: &Expr) -> Result<Option<ResolvedField>> {
        match expr {
            Expr::Quote(inner) => self.resolve(inner),
            Expr::Convert { operand, .. } => self.resolve(operand),
            Expr::Parameter(p) => Ok(Some(ResolvedField::root(&p.name, p.value_type.clone()))),
            Expr::Member { target, name } => {
                let Some(base) = self.resolve(target)? else {
                    return Ok(None);
                };
                if base.value_type.is_nullable() && name == "Value" {
                    let inner = base.value_type.underlying().clone();
                    return Ok(Some(ResolvedField { value_type: inner, ..base }));
                }
                match self.member_element(&base.value_type, name)? {
                    Some((element, value_type, representation)) => {
                        Ok(Some(base.child(element, value_type, representation)))
                    }
                    None => Ok(None),
                }
            }
            Expr::Index { target, index } => {
                let Some(base) = self.resolve(target)? else {
                    return Ok(None);
                };
                let Some(key) = index.as_constant() else {
                    return Ok(None);
                };
                Ok(self.index_into(base, key))
            }
            Expr::Call { target, method, args } => match (method.as_str(), args.as_slice()) {
                ("ElementAt", [index]) => {
                    let Some(base) = self.resolve(target)? else {
                        return Ok(None);
                    };
                    Ok(index.as_constant().and_then(|key| self.index_into(base, key)))
                }
                ("OfType", [type_name]) => {
                    let Some(base) = self.resolve(target)? else {
                        return Ok(None);
                    };
                    match type_name.as_constant().and_then(Constant::as_str) {
                        Some(name) => Ok(Some(ResolvedField {
                            value_type: ValueType::array(ValueType::document(name)),
                            ..base
                        })),
                        None => Ok(None),
                    }
                }
                ("Select", [selector]) => self.resolve_select(target, selector),
                _ => Ok(None),
            },
            _ => Ok(None),
        }
    }

    fn index_into(&self, base: ResolvedField, key: &Constant) -> Option<ResolvedField> {
        match base.value_type.underlying().clone() {
            ValueType::Array(item) => {
                let position = key.as_i64()?;
                let mut field = base.child(position.to_string(), *item, Representation::Default);
                field.positional = true;
                Some(field)
            }
            ValueType::Dictionary {
                value,
                representation: DictionaryRepresentation::Document,
            } => {
                let key = key.as_str()?.to_string();
                Some(base.child(key, *value, Representation::Default))
            }
            _ => None,
        }
    }

    /// `source.Select(p => p.Member...)` over an array resolves to `source.Member...`
    fn resolve_select(&self, source: &Expr, selector: &Expr) -> Result<Option<ResolvedField>> {
        let Some(lambda) = selector.as_lambda() else {
            return Ok(None);
        };
        let Some(param) = lambda.single_param() else {
            return Ok(None);
        };
        let Some(base) = self.resolve(source)? else {
            return Ok(None);
        };
        if !base.value_type.is_array() {
            return Ok(None);
        }
        let Some(inner) = self.resolve(&lambda.body)? else {
            return Ok(None);
        };
        if inner.parameter != param.name {
            return Err(TranslationError::illegal_scope(
                lambda.body.to_string(),
                inner.parameter,
            ));
        }
        if inner.path.is_empty() {
            return Ok(Some(base));
        }
        let mut path = base.path;
        path.extend(inner.path);
        Ok(Some(ResolvedField {
            parameter: base.parameter,
            path,
            value_type: ValueType::array(inner.value_type),
            representation: inner.representation,
            positional: base.positional || inner.positional,
        }))
    }

    /// Nominal type of an expression node
    pub fn type_of(&self, expr: &Expr) -> ValueType {
        match expr {
            Expr::Constant(c) => c.value_type.clone(),
            Expr::Parameter(p) => p.value_type.clone(),
            Expr::Quote(inner) => self.type_of(inner),
            Expr::Convert { value_type, .. } => value_type.clone(),
            Expr::Member { target, name } => self.member_type(&self.type_of(target), name),
            Expr::Call { target, method, args } => self.call_type(target, method, args),
            Expr::StaticCall { class, method, args } => {
                if let Some(call) = expr.as_extension_call() {
                    return self.type_of(&call);
                }
                match (class.as_str(), method.as_str()) {
                    ("Math", "Abs" | "Ceiling" | "Floor" | "Truncate") => {
                        args.first().map(|a| self.type_of(a)).unwrap_or(ValueType::Double)
                    }
                    ("Math", _) => ValueType::Double,
                    ("Enumerable", "Range") => ValueType::array(ValueType::Int32),
                    ("String", "Concat") => ValueType::String,
                    _ => ValueType::Boolean,
                }
            }
            Expr::Index { target, .. } => match self.type_of(target).underlying() {
                ValueType::Array(item) => (**item).clone(),
                ValueType::Dictionary { value, .. } => (**value).clone(),
                ValueType::String => ValueType::Char,
                _ => ValueType::Any,
            },
            Expr::Unary { op: UnaryOp::Not, operand } => {
                let t = self.type_of(operand);
                if t.is_integer() {
                    t
                } else {
                    ValueType::Boolean
                }
            }
            Expr::Unary { op: UnaryOp::Negate, operand } => self.type_of(operand),
            Expr::Binary { op, left, right } => {
                let (l, r) = (self.type_of(left), self.type_of(right));
                match op {
                    _ if op.is_comparison() => ValueType::Boolean,
                    BinaryOp::AndAlso | BinaryOp::OrElse => ValueType::Boolean,
                    BinaryOp::And | BinaryOp::Or => l,
                    BinaryOp::Add if l.is_string() || r.is_string() => ValueType::String,
                    BinaryOp::Add if l.is_date() => ValueType::DateTime,
                    BinaryOp::Coalesce => l.underlying().clone(),
                    _ => l.promote(&r),
                }
            }
            Expr::Conditional { if_true, .. } => self.type_of(if_true),
            Expr::New { type_name, .. } => match type_name {
                Some(name) if self.registry.document(name).is_some() => ValueType::document(name.clone()),
                _ => ValueType::Any,
            },
            Expr::NewCollection { source, items, .. } => {
                if let Some(source) = source {
                    return self.type_of(source);
                }
                let item = items.first().map(|i| self.type_of(i)).unwrap_or(ValueType::Any);
                ValueType::array(item)
            }
            Expr::Lambda(lambda) => self.type_of(&lambda.body),
            Expr::TypeIs { .. } | Expr::Inject(_) => ValueType::Boolean,
        }
    }

    fn member_type(&self, base: &ValueType, name: &str) -> ValueType {
        if base.is_nullable() {
            match name {
                "Value" => return base.underlying().clone(),
                "HasValue" => return ValueType::Boolean,
                _ => {}
            }
        }
        match base.underlying() {
            ValueType::Document(type_name) => self
                .registry
                .member(type_name, name)
                .map(|m| m.value_type.clone())
                .unwrap_or(ValueType::Any),
            ValueType::String if name == "Length" => ValueType::Int32,
            ValueType::Array(_) if name == "Length" || name == "Count" => ValueType::Int32,
            ValueType::Dictionary { .. } if name == "Count" => ValueType::Int32,
            ValueType::DateTime if DATE_PARTS.contains(&name) => ValueType::Int32,
            ValueType::DateTime if name == "Date" => ValueType::DateTime,
            _ => ValueType::Any,
        }
    }

    fn call_type(&self, target: &Expr, method: &str, args: &[Expr]) -> ValueType {
        let source = self.type_of(target);
        let item = || source.item_type().cloned().unwrap_or(ValueType::Any);
        let selector = |i: usize| args.get(i).and_then(|a| a.as_lambda()).map(|l| self.type_of(&l.body));
        match method {
            "Any" | "All" | "Contains" | "StartsWith" | "EndsWith" | "Equals" | "ContainsKey" | "HasFlag"
            | "SetEquals" | "IsSubsetOf" | "IsSupersetOf" | "IsMatch" => ValueType::Boolean,
            "Count" | "IndexOf" | "IndexOfAny" | "CompareTo" => ValueType::Int32,
            "LongCount" => ValueType::Int64,
            "ToLower" | "ToUpper" | "ToLowerInvariant" | "ToUpperInvariant" | "Trim" | "TrimStart"
            | "TrimEnd" | "Substring" | "ToString" => ValueType::String,
            "Split" => ValueType::array(ValueType::String),
            "First" | "Last" | "Single" | "ElementAt" | "FirstOrDefault" | "LastOrDefault"
            | "ElementAtOrDefault" => item(),
            "Select" | "Zip" => ValueType::array(
                selector(if method == "Zip" { 1 } else { 0 }).unwrap_or(ValueType::Any),
            ),
            "SelectMany" => selector(0).unwrap_or(ValueType::Any),
            "OfType" => match args.first().and_then(|a| a.as_constant()).and_then(Constant::as_str) {
                Some(name) => ValueType::array(ValueType::document(name)),
                None => source,
            },
            "Sum" | "Min" | "Max" => selector(0).unwrap_or_else(item),
            "Average" | "StandardDeviationPopulation" | "StandardDeviationSample" => ValueType::Double,
            "AddDays" | "AddHours" | "AddMinutes" | "AddSeconds" | "AddMilliseconds" => ValueType::DateTime,
            "Aggregate" => match args.len() {
                3 => selector(2).unwrap_or(ValueType::Any),
                2 => self.type_of(&args[0]),
                _ => item(),
            },
            "GetType" => ValueType::Any,
            _ => source,
        }
    }
}
