//! Aggregation expressions
//!
//! Translates selector lambdas into `$project` and `$group` stage bodies,
//! together with the [`ResultShape`] needed to read the stage output back.
//!
//! Field references render as `"$path"`. Lambda parameters introduced by
//! `$map`, `$filter` and `$reduce` render as `"$$name"`, and members read
//! from a computed value go through a `$let` binding named `item`.
//!
//! # Examples
//!
//! ```ignore
//! let builder = ExpressionBuilder::new(&registry, &options);
//! // x => new { A = x.A, N = x.C.E.F + 1 }
//! let (stage, _) = builder.project(&selector)?;
//! assert_eq!(stage, doc! { "A": "$A", "N": { "$add": ["$C.E.F", 1] }, "_id": 0 });
//! ```

mod group;
mod methods;

#[cfg(test)]
mod tests;

use bson::{doc, Bson, Document};
use ouroboros_common::{Result, TranslationError};

use crate::expr::{BinaryOp, CollectionKind, Constant, Expr, UnaryOp};
use crate::field::FieldResolver;
use crate::options::TranslationOptions;
use crate::registry::SerializerRegistry;
use crate::scope::{Binding, Scope};
use crate::shape::{ResultDeserializer, ResultShape};
use crate::types::ValueType;

/// Name bound by `$let` and `$map` when the host expression does not name one
const ITEM: &str = "item";

fn unsupported(node: &Expr) -> TranslationError {
    TranslationError::unsupported(node.to_string())
}

/// `{ operator: operand }`
fn operator(name: &str, operand: impl Into<Bson>) -> Bson {
    let mut doc = Document::new();
    doc.insert(name, operand.into());
    Bson::Document(doc)
}

/// Literal as an aggregation operand; strings that look like field paths are quoted
fn literal(value: &Bson) -> Bson {
    match value {
        Bson::String(s) if s.starts_with('$') => operator("$literal", s.as_str()),
        other => other.clone(),
    }
}

/// Value placed directly under a stage member, where bare numbers and
/// booleans would read as inclusion flags
fn stage_value(value: Bson) -> Bson {
    match value {
        Bson::Document(_) | Bson::String(_) | Bson::Array(_) => value,
        other => operator("$literal", other),
    }
}

fn variable(name: &str, path: &[String]) -> String {
    if path.is_empty() {
        format!("$${}", name)
    } else {
        format!("$${}.{}", name, path.join("."))
    }
}

/// `path` read from a computed value
fn let_member(value: Bson, path: &[String]) -> Bson {
    let mut vars = Document::new();
    vars.insert(ITEM, value);
    doc! { "$let": { "vars": vars, "in": variable(ITEM, path) } }.into()
}

/// Nodes that may name a stored field directly
fn is_reference(node: &Expr) -> bool {
    match node {
        Expr::Parameter(_) => true,
        Expr::Member { target, .. } | Expr::Index { target, .. } => is_reference(target),
        Expr::Convert { operand, .. } | Expr::Quote(operand) => is_reference(operand),
        Expr::Call { target, method, .. } => {
            (method == "Select" || method == "ElementAt") && is_reference(target)
        }
        _ => false,
    }
}

const DATE_PARTS: &[(&str, &str)] = &[
    ("Year", "$year"),
    ("Month", "$month"),
    ("Day", "$dayOfMonth"),
    ("Hour", "$hour"),
    ("Minute", "$minute"),
    ("Second", "$second"),
    ("Millisecond", "$millisecond"),
    ("DayOfYear", "$dayOfYear"),
    ("DayOfWeek", "$dayOfWeek"),
];

/// Translates selectors into aggregation expressions
#[derive(Debug, Clone, Copy)]
pub struct ExpressionBuilder<'a> {
    resolver: FieldResolver<'a>,
    options: &'a TranslationOptions,
}

impl<'a> ExpressionBuilder<'a> {
    pub fn new(registry: &'a SerializerRegistry, options: &'a TranslationOptions) -> Self {
        Self {
            resolver: FieldResolver::new(registry),
            options,
        }
    }

    /// Translates `x => selector` into a `$project` stage body.
    ///
    /// Constructed objects project one member per constructor member; any
    /// other selector is projected as `value`.
    pub fn project(&self, selector: &Expr) -> Result<(Document, ResultDeserializer)> {
        let (param, body) = selector.as_unary_lambda().ok_or_else(|| unsupported(selector))?;
        tracing::debug!(selector = %selector, "translating projection");

        let scope = Scope::root(&param.name);
        scope.check(body)?;

        let mut projection = Document::new();
        let shape = match body.strip() {
            Expr::New { type_name, members } if !members.is_empty() => {
                let mut shape = Vec::with_capacity(members.len());
                for (name, member) in members {
                    let element = self.output_element(type_name.as_deref(), name)?;
                    projection.insert(element.clone(), stage_value(self.expr(member, &scope)?));
                    shape.push((name.clone(), ResultShape::computed(element)));
                }
                ResultShape::Object(shape)
            }
            other => {
                projection.insert("value", stage_value(self.expr(other, &scope)?));
                ResultShape::computed("value")
            }
        };
        if !projection.contains_key("_id") {
            projection.insert("_id", 0);
        }

        tracing::debug!(projection = %projection, "translated projection");
        Ok((projection, ResultDeserializer::new(shape)))
    }

    /// Element name of a constructed member; registered classes use their member maps
    fn output_element(&self, type_name: Option<&str>, member: &str) -> Result<String> {
        let Some(type_name) = type_name else {
            return Ok(member.to_string());
        };
        if self.resolver.registry().document(type_name).is_none() {
            return Ok(member.to_string());
        }
        Ok(self
            .resolver
            .member_element(&ValueType::document(type_name), member)?
            .map(|(element, _, _)| element)
            .unwrap_or_else(|| member.to_string()))
    }

    pub(crate) fn expr(&self, node: &Expr, scope: &Scope) -> Result<Bson> {
        if let Some(reference) = self.field_ref(node, scope)? {
            return Ok(reference);
        }
        match node {
            Expr::Quote(inner) | Expr::Convert { operand: inner, .. } => self.expr(inner, scope),
            Expr::Constant(c) => Ok(literal(&c.value)),
            Expr::Member { target, name } => self.member(node, target, name, scope),
            Expr::Index { target, index } => self.element_at(node, target, index, scope),
            Expr::Call { target, method, args } => self.call(node, target, method, args, scope),
            Expr::StaticCall { class, method, args } => match node.as_extension_call() {
                Some(call) => self.expr(&call, scope),
                None => self.static_call(node, class, method, args, scope),
            },
            Expr::Unary {
                op: UnaryOp::Not,
                operand,
            } => Ok(operator("$not", vec![self.expr(operand, scope)?])),
            Expr::Unary {
                op: UnaryOp::Negate,
                operand,
            } => Ok(operator("$subtract", vec![Bson::Int32(0), self.expr(operand, scope)?])),
            Expr::Binary { op, left, right } => self.binary(node, *op, left, right, scope),
            Expr::Conditional {
                test,
                if_true,
                if_false,
            } => Ok(operator(
                "$cond",
                vec![
                    self.expr(test, scope)?,
                    self.expr(if_true, scope)?,
                    self.expr(if_false, scope)?,
                ],
            )),
            Expr::New { type_name, members } => {
                let mut object = Document::new();
                for (name, member) in members {
                    let element = self.output_element(type_name.as_deref(), name)?;
                    object.insert(element, stage_value(self.expr(member, scope)?));
                }
                Ok(Bson::Document(object))
            }
            Expr::NewCollection { kind, source, items } => match source {
                Some(source) => {
                    let values = self.expr(source, scope)?;
                    Ok(match kind {
                        CollectionKind::HashSet => operator("$setUnion", vec![values]),
                        _ => values,
                    })
                }
                None => items
                    .iter()
                    .map(|item| self.expr(item, scope))
                    .collect::<Result<Vec<_>>>()
                    .map(Bson::Array),
            },
            Expr::Parameter(_) | Expr::Lambda(_) | Expr::TypeIs { .. } | Expr::Inject(_) => {
                Err(unsupported(node))
            }
        }
    }

    /// Field or variable reference for a plain member chain
    fn field_ref(&self, node: &Expr, scope: &Scope) -> Result<Option<Bson>> {
        if !is_reference(node) {
            return Ok(None);
        }
        let Some(field) = self.resolver.resolve(node)? else {
            return Ok(None);
        };
        if field.positional {
            return Ok(None);
        }
        let reference = match scope.resolve(&field.parameter, node)? {
            Binding::Document { prefix } => {
                let mut path = prefix.clone();
                path.extend(field.path);
                if path.is_empty() {
                    Bson::String("$$ROOT".to_string())
                } else {
                    Bson::String(format!("${}", path.join(".")))
                }
            }
            Binding::Variable(name) => Bson::String(variable(name, &field.path)),
            Binding::Computed(value) if field.path.is_empty() => value.clone(),
            Binding::Computed(value) => let_member(value.clone(), &field.path),
            Binding::Group | Binding::Local => return Err(unsupported(node)),
        };
        Ok(Some(reference))
    }

    fn member(&self, node: &Expr, target: &Expr, name: &str, scope: &Scope) -> Result<Bson> {
        let target_type = self.resolver.type_of(target);
        if target_type.is_nullable() {
            match name {
                "Value" => return self.expr(target, scope),
                "HasValue" => return Ok(operator("$ne", vec![self.expr(target, scope)?, Bson::Null])),
                _ => {}
            }
        }
        match target_type.underlying() {
            ValueType::DateTime => return self.date_part(node, target, name, scope),
            ValueType::String if name == "Length" => {
                return Ok(operator(
                    self.options.string_translation_mode.str_len(),
                    self.expr(target, scope)?,
                ))
            }
            ValueType::Array(_) if name == "Length" || name == "Count" => {
                return Ok(operator("$size", self.expr(target, scope)?))
            }
            _ => {}
        }

        let Some((element, _, _)) = self.resolver.member_element(&target_type, name)? else {
            return Err(unsupported(node));
        };
        if let Expr::Call {
            target: source,
            method,
            args,
        } = target.strip()
        {
            let position = match method.as_str() {
                "First" | "FirstOrDefault" => Some(0),
                "Last" | "LastOrDefault" => Some(-1),
                _ => None,
            };
            if let Some(position) = position.filter(|_| args.is_empty()) {
                if let Some(Bson::String(path)) = self.field_ref(source, scope)? {
                    return Ok(operator(
                        "$arrayElemAt",
                        vec![Bson::String(format!("{}.{}", path, element)), Bson::Int32(position)],
                    ));
                }
            }
        }
        Ok(let_member(self.expr(target, scope)?, &[element]))
    }

    fn date_part(&self, node: &Expr, date: &Expr, name: &str, scope: &Scope) -> Result<Bson> {
        let Some((_, part)) = DATE_PARTS.iter().find(|(member, _)| *member == name) else {
            return Err(unsupported(node));
        };
        let value = operator(part, self.expr(date, scope)?);
        if name == "DayOfWeek" {
            // the server counts Sunday as 1
            return Ok(operator("$subtract", vec![value, Bson::Int32(1)]));
        }
        Ok(value)
    }

    fn element_at(&self, node: &Expr, target: &Expr, index: &Expr, scope: &Scope) -> Result<Bson> {
        if !self.resolver.type_of(target).is_array() {
            return Err(unsupported(node));
        }
        Ok(operator(
            "$arrayElemAt",
            vec![self.expr(target, scope)?, self.expr(index, scope)?],
        ))
    }

    fn binary(&self, node: &Expr, op: BinaryOp, left: &Expr, right: &Expr, scope: &Scope) -> Result<Bson> {
        let name = self.binary_operator(op, left, right).ok_or_else(|| unsupported(node))?;
        let (l, r) = if op.is_comparison() {
            (
                self.compared(left, right, scope)?,
                self.compared(right, left, scope)?,
            )
        } else {
            (self.expr(left, scope)?, self.expr(right, scope)?)
        };

        let flattens = matches!(name, "$add" | "$concat" | "$multiply" | "$and" | "$or");
        let mut operands = Vec::new();
        match l {
            Bson::Document(mut nested)
                if flattens
                    && matches!(left.strip(), Expr::Binary { .. })
                    && nested.len() == 1
                    && nested.contains_key(name) =>
            {
                match nested.remove(name) {
                    Some(Bson::Array(items)) => operands.extend(items),
                    Some(other) => operands.push(other),
                    None => {}
                }
            }
            other => operands.push(other),
        }
        operands.push(r);
        Ok(operator(name, operands))
    }

    fn binary_operator(&self, op: BinaryOp, left: &Expr, right: &Expr) -> Option<&'static str> {
        let boolean = self.resolver.type_of(left).is_boolean();
        Some(match op {
            BinaryOp::Add
                if self.resolver.type_of(left).is_string() || self.resolver.type_of(right).is_string() =>
            {
                "$concat"
            }
            BinaryOp::Add => "$add",
            BinaryOp::Subtract => "$subtract",
            BinaryOp::Multiply => "$multiply",
            BinaryOp::Divide => "$divide",
            BinaryOp::Modulo => "$mod",
            BinaryOp::AndAlso => "$and",
            BinaryOp::OrElse => "$or",
            BinaryOp::And if boolean => "$and",
            BinaryOp::Or if boolean => "$or",
            BinaryOp::Equal => "$eq",
            BinaryOp::NotEqual => "$ne",
            BinaryOp::GreaterThan => "$gt",
            BinaryOp::GreaterThanOrEqual => "$gte",
            BinaryOp::LessThan => "$lt",
            BinaryOp::LessThanOrEqual => "$lte",
            BinaryOp::Coalesce => "$ifNull",
            BinaryOp::And | BinaryOp::Or => return None,
        })
    }

    /// Operand of a comparison; a literal compared with a stored field is
    /// serialized the way the field stores it
    fn compared(&self, side: &Expr, other: &Expr, scope: &Scope) -> Result<Bson> {
        let Some(constant) = side.as_constant() else {
            return self.expr(side, scope);
        };
        match self.resolver.resolve(other)? {
            Some(field) => {
                let registry = self.resolver.registry();
                let coerced = registry.coerce(&constant.value, &constant.value_type, &field.value_type);
                let serialized = registry.serialize_value(&coerced, &field.value_type, field.representation)?;
                Ok(literal(&serialized))
            }
            None => Ok(literal(&constant.value)),
        }
    }
}

/// Zero value used as the seed of `Aggregate` without one
fn default_value(value_type: &ValueType) -> Bson {
    match value_type.underlying() {
        ValueType::Int32 | ValueType::Enum(_) => Bson::Int32(0),
        ValueType::Int64 => Bson::Int64(0),
        ValueType::Double => Bson::Double(0.0),
        ValueType::String => Bson::String(String::new()),
        ValueType::Boolean => Bson::Boolean(false),
        _ => Bson::Null,
    }
}

/// Numeric value of a literal
fn numeric(c: &Constant) -> Option<f64> {
    match c.value {
        Bson::Int32(n) => Some(n as f64),
        Bson::Int64(n) => Some(n as f64),
        Bson::Double(n) => Some(n),
        _ => None,
    }
}
