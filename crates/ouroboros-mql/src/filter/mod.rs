//! Filter translation
//!
//! Recursive descent from a boolean lambda (`x => ...`) to a find filter
//! document. Every node either matches one of the rules below or the whole
//! translation fails with `UnsupportedExpression`; nothing is approximated.
//!
//! Nested collection predicates (`coll.Any(p)`) translate their body in a new
//! scope frame marked as an `$elemMatch` boundary. Inside such a body, a
//! further `sub.Any(q)` whose predicate is a single field test is collapsed
//! to the dotted path `sub.field`.
//!
//! # Examples
//!
//! ```ignore
//! let builder = FilterBuilder::new(&registry, &options);
//! // x => x.A == 1 && x.B == 11
//! assert_eq!(builder.translate(&predicate)?, doc! { "A": 1, "B": 11 });
//! ```

mod logic;
mod regex;


pub use logic::{and_all, match_all, match_nothing, negate, or_all};

use bson::{doc, Bson, Document};
use ouroboros_common::{Result, TranslationError};

use crate::expr::{BinaryOp, Constant, Expr, Lambda, StringComparison, UnaryOp};
use crate::field::FieldResolver;
use crate::options::TranslationOptions;
use crate::registry::SerializerRegistry;
use crate::scope::{Binding, Frame, Scope};
use crate::types::{DictionaryRepresentation, Representation, ValueType};

use self::logic::{boolean, field, field_op, is_operator_doc};
use self::regex::{anchor, escape, regex, trim_pattern};

/// Stored field addressed from the current filter level
#[derive(Debug, Clone)]
struct FilterField {
    segments: Vec<String>,
    value_type: ValueType,
    representation: Representation,
}

impl FilterField {
    fn name(&self) -> String {
        self.segments.join(".")
    }

    fn child(&self, suffix: &str) -> String {
        if self.segments.is_empty() {
            suffix.to_string()
        } else {
            format!("{}.{}", self.name(), suffix)
        }
    }

    /// The same location viewed as one element of the stored array
    fn item(&self) -> FilterField {
        FilterField {
            value_type: self.value_type.item_type().cloned().unwrap_or(ValueType::Any),
            ..self.clone()
        }
    }
}

type ComparisonRule<'a> =
    fn(&FilterBuilder<'a>, BinaryOp, &Expr, &Constant, &Scope) -> Result<Option<Document>>;

/// Translates boolean lambdas into find filter documents
#[derive(Debug, Clone, Copy)]
pub struct FilterBuilder<'a> {
    resolver: FieldResolver<'a>,
    options: &'a TranslationOptions,
}

fn unsupported(node: &Expr) -> TranslationError {
    TranslationError::unsupported(node.to_string())
}

impl<'a> FilterBuilder<'a> {
    pub fn new(registry: &'a SerializerRegistry, options: &'a TranslationOptions) -> Self {
        Self {
            resolver: FieldResolver::new(registry),
            options,
        }
    }

    /// Translates `x => predicate` into a filter document
    pub fn translate(&self, predicate: &Expr) -> Result<Document> {
        let (param, body) = predicate.as_unary_lambda().ok_or_else(|| unsupported(predicate))?;
        tracing::debug!(predicate = %predicate, "translating filter");

        let scope = Scope::root(&param.name);
        scope.check(body)?;
        let filter = self.build(body, &scope)?;

        tracing::debug!(filter = %filter, "translated filter");
        Ok(filter)
    }

    fn build(&self, expr: &Expr, scope: &Scope) -> Result<Document> {
        match expr {
            Expr::Quote(inner) | Expr::Convert { operand: inner, .. } => self.build(inner, scope),
            Expr::Constant(c) => c.as_bool().map(boolean).ok_or_else(|| unsupported(expr)),
            Expr::Inject(filter) => Ok(filter.clone()),
            Expr::Unary { op: UnaryOp::Not, operand } => self.build_not(expr, operand, scope),
            Expr::Binary { op, left, right } => match op {
                BinaryOp::AndAlso => Ok(and_all([self.build(left, scope)?, self.build(right, scope)?])),
                BinaryOp::OrElse => Ok(or_all([self.build(left, scope)?, self.build(right, scope)?])),
                BinaryOp::And if self.resolver.type_of(left).is_boolean() => {
                    Ok(and_all([self.build(left, scope)?, self.build(right, scope)?]))
                }
                BinaryOp::Or if self.resolver.type_of(left).is_boolean() => {
                    Ok(or_all([self.build(left, scope)?, self.build(right, scope)?]))
                }
                op if op.is_comparison() => self.build_comparison(expr, *op, left, right, scope),
                _ => Err(unsupported(expr)),
            },
            Expr::Call { target, method, args } => self.build_call(expr, target, method, args, scope),
            Expr::StaticCall { class, method, args } => match expr.as_extension_call() {
                Some(call) => self.build(&call, scope),
                None => self.build_static(expr, class, method, args, scope),
            },
            Expr::TypeIs { operand, type_name, exact } => {
                self.type_check(expr, operand, type_name, *exact, scope)
            }
            Expr::Member { target, name }
                if name == "HasValue" && self.resolver.type_of(target).is_nullable() =>
            {
                let stored = self.require_field(target, scope)?;
                Ok(field_op(stored.name(), "$ne", Bson::Null))
            }
            Expr::Member { .. } | Expr::Parameter(_) | Expr::Index { .. } => {
                let stored = self.require_field(expr, scope)?;
                match stored.value_type.underlying() {
                    ValueType::Boolean | ValueType::Any => Ok(field(stored.name(), true)),
                    _ => Err(unsupported(expr)),
                }
            }
            _ => Err(unsupported(expr)),
        }
    }

    fn build_not(&self, node: &Expr, operand: &Expr, scope: &Scope) -> Result<Document> {
        match operand.strip() {
            Expr::Unary { op: UnaryOp::Not, operand: inner } => self.build(inner, scope),
            _ if self.resolver.type_of(operand).is_integer() => Err(unsupported(node)),
            _ => Ok(negate(self.build(operand, scope)?)),
        }
    }

    // ---- fields and values ----

    fn field(&self, expr: &Expr, scope: &Scope) -> Result<Option<FilterField>> {
        let Some(resolved) = self.resolver.resolve(expr)? else {
            return Ok(None);
        };
        match scope.resolve(&resolved.parameter, expr)? {
            Binding::Document { prefix } => {
                let mut segments = prefix.clone();
                segments.extend(resolved.path);
                Ok(Some(FilterField {
                    segments,
                    value_type: resolved.value_type,
                    representation: resolved.representation,
                }))
            }
            _ => Err(unsupported(expr)),
        }
    }

    fn require_field(&self, expr: &Expr, scope: &Scope) -> Result<FilterField> {
        self.field(expr, scope)?.ok_or_else(|| unsupported(expr))
    }

    /// Serializes a literal the way the field stores it
    fn serialize(&self, stored: &FilterField, value: &Constant) -> Result<Bson> {
        let registry = self.resolver.registry();
        let coerced = registry.coerce(&value.value, &value.value_type, &stored.value_type);
        registry.serialize_value(&coerced, &stored.value_type, stored.representation)
    }

    fn serialize_items(&self, node: &Expr, stored: &FilterField, values: &Constant) -> Result<Vec<Bson>> {
        let Bson::Array(items) = &values.value else {
            return Err(unsupported(node));
        };
        let item_type = values.value_type.item_type().cloned().unwrap_or(ValueType::Any);
        items
            .iter()
            .map(|item| {
                self.serialize(
                    stored,
                    &Constant {
                        value: item.clone(),
                        value_type: item_type.clone(),
                    },
                )
            })
            .collect()
    }

    // ---- comparisons ----

    fn build_comparison(
        &self,
        node: &Expr,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
        scope: &Scope,
    ) -> Result<Document> {
        let (op, left, right) = if Expr::evaluate_local(left).is_some() && Expr::evaluate_local(right).is_none() {
            (op.flip(), right, left)
        } else {
            (op, left, right)
        };
        let value = Expr::evaluate_local(right).ok_or_else(|| unsupported(node))?;

        let rules: [ComparisonRule<'a>; 9] = [
            Self::array_length,
            Self::modulo,
            Self::compare_to,
            Self::index_of,
            Self::char_index,
            Self::string_length,
            Self::case_insensitive,
            Self::bits,
            Self::boolean_test,
        ];
        for rule in rules {
            if let Some(filter) = rule(self, op, left, &value, scope)? {
                return Ok(filter);
            }
        }
        self.plain_comparison(node, op, left, &value, scope)
    }

    fn plain_comparison(
        &self,
        node: &Expr,
        op: BinaryOp,
        left: &Expr,
        value: &Constant,
        scope: &Scope,
    ) -> Result<Document> {
        let stored = self.field(left, scope)?.ok_or_else(|| unsupported(node))?;
        let serialized = self.serialize(&stored, value)?;
        let operator = match op {
            BinaryOp::Equal => return Ok(field(stored.name(), serialized)),
            BinaryOp::NotEqual => "$ne",
            BinaryOp::GreaterThan => "$gt",
            BinaryOp::GreaterThanOrEqual => "$gte",
            BinaryOp::LessThan => "$lt",
            BinaryOp::LessThanOrEqual => "$lte",
            _ => return Err(unsupported(node)),
        };
        Ok(field_op(stored.name(), operator, serialized))
    }

    /// `a.Length`, `a.Count` and `a.Count()` on arrays
    fn array_length(&self, op: BinaryOp, left: &Expr, value: &Constant, scope: &Scope) -> Result<Option<Document>> {
        let source = match left.strip() {
            Expr::Member { target, name } if name == "Length" || name == "Count" => target,
            Expr::Call { target, method, args } if method == "Count" && args.is_empty() => target,
            _ => return Ok(None),
        };
        if !self.resolver.type_of(source).is_array() {
            return Ok(None);
        }
        let Some(n) = value.as_i64() else {
            return Ok(None);
        };
        let stored = self.require_field(source, scope)?;
        let name = stored.name();
        Ok(Some(match op {
            // no array has a negative length
            BinaryOp::Equal if n < 0 => match_nothing(),
            BinaryOp::NotEqual if n < 0 => match_all(),
            BinaryOp::GreaterThan if n < 0 => match_all(),
            BinaryOp::LessThanOrEqual if n < 0 => match_nothing(),
            BinaryOp::Equal => field_op(name, "$size", value.value.clone()),
            BinaryOp::NotEqual => field_op(name, "$not", doc! { "$size": value.value.clone() }),
            BinaryOp::GreaterThan => field_op(stored.child(&n.to_string()), "$exists", true),
            BinaryOp::GreaterThanOrEqual if n <= 0 => match_all(),
            BinaryOp::GreaterThanOrEqual => field_op(stored.child(&(n - 1).to_string()), "$exists", true),
            BinaryOp::LessThan if n <= 0 => match_nothing(),
            BinaryOp::LessThan => field_op(stored.child(&(n - 1).to_string()), "$exists", false),
            BinaryOp::LessThanOrEqual => field_op(stored.child(&n.to_string()), "$exists", false),
            _ => return Ok(None),
        }))
    }

    /// `x.P % d == r`
    fn modulo(&self, op: BinaryOp, left: &Expr, value: &Constant, scope: &Scope) -> Result<Option<Document>> {
        let Expr::Binary { op: BinaryOp::Modulo, left: dividend, right: divisor } = left.strip() else {
            return Ok(None);
        };
        let (Some(divisor), Some(remainder)) = (
            Expr::evaluate_local(divisor).and_then(|c| c.as_i64()),
            value.as_i64(),
        ) else {
            return Ok(None);
        };
        let stored = self.require_field(dividend, scope)?;
        let modulo = doc! { "$mod": [divisor, remainder] };
        Ok(match op {
            BinaryOp::Equal => Some(field(stored.name(), modulo)),
            BinaryOp::NotEqual => Some(field_op(stored.name(), "$not", modulo)),
            _ => None,
        })
    }

    /// `x.A.CompareTo(v) op 0`
    fn compare_to(&self, op: BinaryOp, left: &Expr, value: &Constant, scope: &Scope) -> Result<Option<Document>> {
        let Expr::Call { target, method, args } = left.strip() else {
            return Ok(None);
        };
        if method != "CompareTo" || args.len() != 1 || value.as_i64() != Some(0) {
            return Ok(None);
        }
        let Some(operand) = Expr::evaluate_local(&args[0]) else {
            return Ok(None);
        };
        self.plain_comparison(left, op, target, &operand, scope).map(Some)
    }

    /// `s.IndexOf(c|str[, start[, count]]) == n`
    fn index_of(&self, op: BinaryOp, left: &Expr, value: &Constant, scope: &Scope) -> Result<Option<Document>> {
        let Expr::Call { target, method, args } = left.strip() else {
            return Ok(None);
        };
        if (method != "IndexOf" && method != "IndexOfAny")
            || op != BinaryOp::Equal
            || !self.resolver.type_of(target).is_string()
        {
            return Ok(None);
        }
        let Some(index) = value.as_i64() else {
            return Ok(None);
        };
        let Some(constants) = args.iter().map(Expr::evaluate_local).collect::<Option<Vec<_>>>() else {
            return Ok(None);
        };
        let (needle, start, count) = match constants.as_slice() {
            [needle] => (needle, None, None),
            [needle, start] => (needle, start.as_i64(), None),
            [needle, start, count] => (needle, start.as_i64(), count.as_i64()),
            _ => return Ok(None),
        };
        if (args.len() > 1 && start.is_none()) || (args.len() > 2 && count.is_none()) {
            return Ok(None);
        }
        let pattern = match needle.value_type.underlying() {
            ValueType::String => match needle.as_str() {
                Some(text) => regex::index_of_string(text, index, start, count),
                None => return Ok(None),
            },
            _ => match chars_of(needle) {
                Some(chars) => regex::index_of_chars(&chars, index, start, count),
                None => return Ok(None),
            },
        };
        let stored = self.require_field(target, scope)?;
        Ok(Some(match pattern {
            Some(pattern) => field(stored.name(), regex(pattern, "s")),
            None => match_nothing(),
        }))
    }

    /// `s[i] == 'c'`
    fn char_index(&self, op: BinaryOp, left: &Expr, value: &Constant, scope: &Scope) -> Result<Option<Document>> {
        let Expr::Index { target, index } = left.strip() else {
            return Ok(None);
        };
        if !self.resolver.type_of(target).is_string() {
            return Ok(None);
        }
        let Some(position) = Expr::evaluate_local(index).and_then(|c| c.as_i64()) else {
            return Ok(None);
        };
        let c = match &value.value {
            Bson::String(s) if s.chars().count() == 1 => s.chars().next(),
            Bson::Int32(n) => u32::try_from(*n).ok().and_then(char::from_u32),
            _ => None,
        };
        let Some(c) = c else {
            return Ok(None);
        };
        let negated = match op {
            BinaryOp::Equal => false,
            BinaryOp::NotEqual => true,
            _ => return Ok(None),
        };
        let stored = self.require_field(target, scope)?;
        Ok(Some(field(stored.name(), regex(regex::char_at(position, c, negated), "s"))))
    }

    /// `s.Length op n`
    fn string_length(&self, op: BinaryOp, left: &Expr, value: &Constant, scope: &Scope) -> Result<Option<Document>> {
        let source = match left.strip() {
            Expr::Member { target, name } if name == "Length" => target,
            Expr::Call { target, method, args } if method == "Count" && args.is_empty() => target,
            _ => return Ok(None),
        };
        if !self.resolver.type_of(source).is_string() {
            return Ok(None);
        }
        let Some(pattern) = value.as_i64().and_then(|n| regex::length(op, n)) else {
            return Ok(None);
        };
        let stored = self.require_field(source, scope)?;
        let filter = field(stored.name(), regex(pattern, "s"));
        Ok(Some(if op == BinaryOp::NotEqual { negate(filter) } else { filter }))
    }

    /// `s.ToLower() == "lit"` and friends
    fn case_insensitive(&self, op: BinaryOp, left: &Expr, value: &Constant, scope: &Scope) -> Result<Option<Document>> {
        let Expr::Call { target, method, args } = left.strip() else {
            return Ok(None);
        };
        let lower = match method.as_str() {
            "ToLower" | "ToLowerInvariant" => true,
            "ToUpper" | "ToUpperInvariant" => false,
            _ => return Ok(None),
        };
        if !args.is_empty() || !matches!(op, BinaryOp::Equal | BinaryOp::NotEqual) {
            return Ok(None);
        }
        let stored = self.require_field(target, scope)?;
        let equal = op == BinaryOp::Equal;
        match &value.value {
            Bson::String(text) => {
                let case_matches = if lower {
                    *text == text.to_lowercase()
                } else {
                    *text == text.to_uppercase()
                };
                if !case_matches {
                    return Ok(Some(boolean(!equal)));
                }
                let filter = field(stored.name(), regex(format!("^{}$", escape(text)), "i"));
                Ok(Some(if equal { filter } else { negate(filter) }))
            }
            Bson::Null if equal => Ok(Some(field(stored.name(), Bson::Null))),
            Bson::Null => Ok(Some(field_op(stored.name(), "$ne", Bson::Null))),
            _ => Err(unsupported(left)),
        }
    }

    /// `(x.P & mask) == 0 | mask`, `!= 0 | mask`
    fn bits(&self, op: BinaryOp, left: &Expr, value: &Constant, scope: &Scope) -> Result<Option<Document>> {
        let Expr::Binary { op: BinaryOp::And, left: operand, right: mask } = left.strip() else {
            return Ok(None);
        };
        if !self.resolver.type_of(operand).is_integer() {
            return Ok(None);
        }
        let Some(mask) = Expr::evaluate_local(mask) else {
            return Ok(None);
        };
        let (Some(bits), Some(compared)) = (mask.as_i64(), value.as_i64()) else {
            return Ok(None);
        };
        let operator = match (op, compared == 0, compared == bits) {
            (BinaryOp::Equal, true, _) => "$bitsAllClear",
            (BinaryOp::Equal, _, true) => "$bitsAllSet",
            (BinaryOp::NotEqual, true, _) => "$bitsAnySet",
            (BinaryOp::NotEqual, _, true) => "$bitsAnyClear",
            _ => return Ok(None),
        };
        let stored = self.require_field(operand, scope)?;
        Ok(Some(field_op(stored.name(), operator, mask.value)))
    }

    /// A boolean-valued call compared with `true` or `false`
    fn boolean_test(&self, op: BinaryOp, left: &Expr, value: &Constant, scope: &Scope) -> Result<Option<Document>> {
        let Some(expected) = value.as_bool() else {
            return Ok(None);
        };
        let is_test = match left.strip() {
            Expr::Call { .. } | Expr::StaticCall { .. } | Expr::TypeIs { .. } => true,
            Expr::Member { name, .. } => name == "HasValue",
            _ => false,
        };
        if !is_test {
            return Ok(None);
        }
        let positive = match op {
            BinaryOp::Equal => expected,
            BinaryOp::NotEqual => !expected,
            _ => return Ok(None),
        };
        let filter = self.build(left, scope)?;
        Ok(Some(if positive { filter } else { negate(filter) }))
    }

    // ---- method calls ----

    fn build_call(&self, node: &Expr, target: &Expr, method: &str, args: &[Expr], scope: &Scope) -> Result<Document> {
        match (method, args) {
            ("Any", []) => {
                let stored = self.require_field(target, scope)?;
                if !stored.value_type.is_array() {
                    return Err(unsupported(node));
                }
                Ok(field(stored.name(), doc! { "$ne": null, "$not": { "$size": 0 } }))
            }
            ("Any", [predicate]) => self.build_any(node, target, predicate, scope),
            ("All", [predicate]) => self.build_all(node, target, predicate, scope),
            ("Contains", [item]) => self.build_contains(node, target, item, scope),
            ("StartsWith" | "EndsWith", [needle]) => self.string_match(node, target, method, needle, scope),
            ("ContainsKey", [key]) => self.contains_key(node, target, key, scope),
            ("Equals", [other]) => self.build_comparison(node, BinaryOp::Equal, target, other, scope),
            ("Equals", [other, comparison]) => self.string_equals(node, target, other, comparison, scope),
            ("In", [values]) => self.build_in(node, target, values, scope),
            ("HasFlag", [flag]) => {
                let stored = self.require_field(target, scope)?;
                let flag = Expr::evaluate_local(flag).ok_or_else(|| unsupported(node))?;
                Ok(field_op(stored.name(), "$bitsAllSet", flag.value))
            }
            _ => Err(unsupported(node)),
        }
    }

    fn build_static(&self, node: &Expr, class: &str, method: &str, args: &[Expr], scope: &Scope) -> Result<Document> {
        match (class, method, args) {
            ("String", "IsNullOrEmpty", [text]) => {
                let stored = self.require_field(text, scope)?;
                Ok(field_op(stored.name(), "$in", vec![Bson::Null, Bson::String(String::new())]))
            }
            ("Regex", "IsMatch", [input, pattern, rest @ ..]) if rest.len() <= 1 => {
                let pattern = Expr::evaluate_local(pattern)
                    .and_then(|c| c.as_str().map(str::to_string))
                    .ok_or_else(|| unsupported(node))?;
                let options = match rest.first() {
                    None => String::new(),
                    Some(options) => match Expr::evaluate_local(options).map(|c| c.value) {
                        Some(Bson::Int32(flags)) => regex::options_from_flags(flags as i64),
                        Some(Bson::Int64(flags)) => regex::options_from_flags(flags),
                        Some(Bson::String(letters)) => letters,
                        _ => return Err(unsupported(node)),
                    },
                };
                let stored = self.require_field(input, scope)?;
                Ok(field(stored.name(), regex(pattern, &options)))
            }
            ("String" | "Object", "Equals", [a, b]) => self.build_comparison(node, BinaryOp::Equal, a, b, scope),
            ("String", "Equals", [a, b, comparison]) => self.string_equals(node, a, b, comparison, scope),
            _ => Err(unsupported(node)),
        }
    }

    /// `coll.Any(p)`
    fn build_any(&self, node: &Expr, source: &Expr, predicate: &Expr, scope: &Scope) -> Result<Document> {
        let lambda = predicate.as_lambda().ok_or_else(|| unsupported(node))?;
        let param = lambda.single_param().ok_or_else(|| unsupported(node))?;
        if let Some(values) = Expr::evaluate_local(source) {
            return self.local_membership(node, &values, lambda, "$in", scope);
        }

        let (source, discriminator) = match source.strip() {
            Expr::Call { target, method, args } if method == "OfType" && args.len() == 1 => {
                (target.as_ref(), self.of_type_discriminator(node, target, &args[0])?)
            }
            _ => (source, None),
        };
        let stored = self.require_field(source, scope)?;
        if !stored.value_type.is_array() {
            return Err(unsupported(node));
        }

        if discriminator.is_none() && scope.in_elem_match() && collapsible(&lambda.body) {
            let frame = Frame::new(
                &param.name,
                Binding::Document {
                    prefix: stored.segments.clone(),
                },
            )
            .elem_match(true);
            let collapsed = self.build(&lambda.body, &scope.push(frame))?;
            let accepted =
                collapsed.len() == 1 && collapsed.keys().all(|k| !k.is_empty() && !k.starts_with('$'));
            tracing::trace!(path = %stored.name(), accepted, "collapsing nested $elemMatch");
            if accepted {
                return Ok(collapsed);
            }
        }

        let frame = Frame::new(&param.name, Binding::root()).elem_match(true);
        let body = self.build(&lambda.body, &scope.push(frame))?;
        let body = match discriminator {
            Some(discriminator) => and_all([discriminator, body]),
            None => body,
        };
        Ok(field_op(stored.name(), "$elemMatch", elem_match_body(node, body)?))
    }

    /// `coll.All(p)`: no element fails `p`
    fn build_all(&self, node: &Expr, source: &Expr, predicate: &Expr, scope: &Scope) -> Result<Document> {
        let lambda = predicate.as_lambda().ok_or_else(|| unsupported(node))?;
        let param = lambda.single_param().ok_or_else(|| unsupported(node))?;
        if let Some(values) = Expr::evaluate_local(source) {
            return self.local_membership(node, &values, lambda, "$all", scope);
        }
        let stored = self.require_field(source, scope)?;
        if !stored.value_type.is_array() {
            return Err(unsupported(node));
        }
        let frame = Frame::new(&param.name, Binding::root()).elem_match(true);
        let failing = negate(self.build(&lambda.body, &scope.push(frame))?);
        Ok(field_op(
            stored.name(),
            "$not",
            doc! { "$elemMatch": elem_match_body(node, failing)? },
        ))
    }

    /// `local.Any(i => x.L.Contains(i))`, `local.All(i => x.L.Contains(i))`, `local.Any(i => x.P == i)`
    fn local_membership(
        &self,
        node: &Expr,
        values: &Constant,
        lambda: &Lambda,
        operator: &str,
        scope: &Scope,
    ) -> Result<Document> {
        let param = lambda.single_param().ok_or_else(|| unsupported(node))?;
        let (target, through_array) = match lambda.body.strip() {
            Expr::Call { target, method, args }
                if method == "Contains" && args.len() == 1 && args[0].is_parameter(&param.name) =>
            {
                (target.as_ref(), true)
            }
            Expr::Binary { op: BinaryOp::Equal, left, right } if operator == "$in" && right.is_parameter(&param.name) => {
                (left.as_ref(), false)
            }
            Expr::Binary { op: BinaryOp::Equal, left, right } if operator == "$in" && left.is_parameter(&param.name) => {
                (right.as_ref(), false)
            }
            _ => return Err(unsupported(node)),
        };
        let scope = scope.bind_local(&param.name, Binding::Local);
        let stored = self.require_field(target, &scope)?;
        let element = if through_array { stored.item() } else { stored };
        let items = self.serialize_items(node, &element, values)?;
        Ok(field_op(element.name(), operator, items))
    }

    fn of_type_discriminator(&self, node: &Expr, source: &Expr, type_arg: &Expr) -> Result<Option<Document>> {
        let actual = type_arg
            .as_constant()
            .and_then(Constant::as_str)
            .ok_or_else(|| unsupported(node))?;
        let nominal = match self.resolver.type_of(source).item_type().map(ValueType::underlying) {
            Some(ValueType::Document(name)) => name.clone(),
            _ => return Err(unsupported(node)),
        };
        let registry = self.resolver.registry();
        let element = registry.discriminator_element(&nominal, &self.options.discriminator_element);
        Ok(registry
            .discriminator(&nominal, actual)?
            .map(|discriminator| field(element, discriminator)))
    }

    fn build_contains(&self, node: &Expr, target: &Expr, item: &Expr, scope: &Scope) -> Result<Document> {
        let target_type = self.resolver.type_of(target);
        if target_type.is_dictionary() {
            return self.contains_key(node, target, item, scope);
        }
        if target_type.is_string() {
            return self.string_match(node, target, "Contains", item, scope);
        }
        if Expr::evaluate_local(target).is_some() {
            return self.build_in(node, item, target, scope);
        }
        let stored = self.require_field(target, scope)?;
        if !stored.value_type.is_array() {
            return Err(unsupported(node));
        }
        let value = Expr::evaluate_local(item).ok_or_else(|| unsupported(node))?;
        let element = stored.item();
        Ok(field(element.name(), self.serialize(&element, &value)?))
    }

    /// `local.Contains(x.P)` or `x.P.In(local)`
    fn build_in(&self, node: &Expr, item: &Expr, values: &Expr, scope: &Scope) -> Result<Document> {
        let values = Expr::evaluate_local(values).ok_or_else(|| unsupported(node))?;
        let stored = self.require_field(item, scope)?;
        let items = self.serialize_items(node, &stored, &values)?;
        Ok(field_op(stored.name(), "$in", items))
    }

    fn contains_key(&self, node: &Expr, target: &Expr, key: &Expr, scope: &Scope) -> Result<Document> {
        let stored = self.require_field(target, scope)?;
        let key = Expr::evaluate_local(key).ok_or_else(|| unsupported(node))?;
        match stored.value_type.underlying() {
            ValueType::Dictionary {
                representation: DictionaryRepresentation::Document,
                ..
            } => {
                let key = key.as_str().ok_or_else(|| unsupported(node))?;
                Ok(field_op(stored.child(key), "$exists", true))
            }
            ValueType::Dictionary {
                representation: DictionaryRepresentation::ArrayOfDocuments,
                ..
            } => Ok(field(stored.child("k"), key.value)),
            _ => Err(unsupported(node)),
        }
    }

    /// `Contains`, `StartsWith` and `EndsWith` on a string, through any
    /// `ToLower`/`ToUpper`/`Trim*` receivers
    fn string_match(&self, node: &Expr, target: &Expr, method: &str, needle: &Expr, scope: &Scope) -> Result<Document> {
        let needle = Expr::evaluate_local(needle).ok_or_else(|| unsupported(node))?;
        let escaped = escape(needle.as_str().ok_or_else(|| unsupported(node))?);
        let mut pattern = match method {
            "Contains" => format!(".*{}.*", escaped),
            "EndsWith" => format!(".*{}", escaped),
            "StartsWith" => format!("{}.*", escaped),
            _ => return Err(unsupported(node)),
        };

        let mut case_insensitive = false;
        let mut receiver = target;
        loop {
            match receiver.strip() {
                Expr::Call { target: inner, method, args }
                    if args.is_empty()
                        && matches!(
                            method.as_str(),
                            "ToLower" | "ToLowerInvariant" | "ToUpper" | "ToUpperInvariant"
                        ) =>
                {
                    case_insensitive = true;
                    receiver = inner.as_ref();
                }
                Expr::Call { target: inner, method, args }
                    if matches!(method.as_str(), "Trim" | "TrimStart" | "TrimEnd") =>
                {
                    let chars = match args.as_slice() {
                        [] => Vec::new(),
                        [chars] => Expr::evaluate_local(chars)
                            .as_ref()
                            .and_then(chars_of)
                            .ok_or_else(|| unsupported(node))?,
                        _ => return Err(unsupported(node)),
                    };
                    let trim = trim_pattern(&chars);
                    if method != "TrimEnd" {
                        pattern = format!("{}{}", trim, pattern);
                    }
                    if method != "TrimStart" {
                        pattern = format!("{}{}", pattern, trim);
                    }
                    receiver = inner.as_ref();
                }
                _ => break,
            }
        }

        let stored = self.require_field(receiver, scope)?;
        let options = if case_insensitive { "is" } else { "s" };
        Ok(field(stored.name(), regex(anchor(&pattern), options)))
    }

    /// `a.Equals(b, StringComparison)`
    fn string_equals(&self, node: &Expr, a: &Expr, b: &Expr, comparison: &Expr, scope: &Scope) -> Result<Document> {
        let mode = Expr::evaluate_local(comparison)
            .as_ref()
            .and_then(Constant::string_comparison)
            .ok_or_else(|| unsupported(node))?;
        match mode {
            StringComparison::Ordinal => self.build_comparison(node, BinaryOp::Equal, a, b, scope),
            StringComparison::OrdinalIgnoreCase => {
                let (target, value) = match (Expr::evaluate_local(a), Expr::evaluate_local(b)) {
                    (None, Some(value)) => (a, value),
                    (Some(value), None) => (b, value),
                    _ => return Err(unsupported(node)),
                };
                let stored = self.require_field(target, scope)?;
                match value.value {
                    Bson::String(text) => Ok(field(stored.name(), regex(format!("^{}$", escape(&text)), "i"))),
                    Bson::Null => Ok(field(stored.name(), Bson::Null)),
                    _ => Err(unsupported(node)),
                }
            }
        }
    }

    /// `x is T` / `x.GetType() == typeof(T)`
    fn type_check(&self, node: &Expr, operand: &Expr, type_name: &str, exact: bool, scope: &Scope) -> Result<Document> {
        let nominal = match self.resolver.type_of(operand).underlying() {
            ValueType::Document(name) => name.clone(),
            _ => return Err(unsupported(node)),
        };
        let registry = self.resolver.registry();
        let Some(discriminator) = registry.discriminator(&nominal, type_name)? else {
            return Ok(match_all());
        };
        let element = registry.discriminator_element(&nominal, &self.options.discriminator_element);
        let stored = self.require_field(operand, scope)?;
        let path = stored.child(&element);
        if exact {
            Ok(and_all([
                field_op(format!("{}.0", path), "$exists", false),
                field(path, discriminator),
            ]))
        } else {
            Ok(field(path, discriminator))
        }
    }
}

/// Characters of a `char` or `char[]` literal
fn chars_of(c: &Constant) -> Option<Vec<char>> {
    match &c.value {
        Bson::String(s) if c.value_type.underlying() == &ValueType::Char => Some(s.chars().collect()),
        Bson::Array(items) => items
            .iter()
            .map(|item| item.as_str().and_then(|s| s.chars().next()))
            .collect(),
        _ => None,
    }
}

/// Predicates that may be rendered as a dotted path inside an enclosing `$elemMatch`
fn collapsible(body: &Expr) -> bool {
    match body {
        Expr::Binary { op, .. } => op.is_comparison(),
        Expr::Call { method, args, .. } => match method.as_str() {
            "Any" => args.len() == 1,
            "Contains" | "StartsWith" | "EndsWith" => true,
            _ => false,
        },
        Expr::Convert { operand, .. } | Expr::Quote(operand) => collapsible(operand),
        Expr::Unary {
            op: UnaryOp::Not,
            operand,
        } => collapsible(operand),
        _ => false,
    }
}

/// Turns a translated element predicate into an `$elemMatch` operand.
///
/// Predicates over scalar elements address the element itself with the
/// empty field name; the operators under it become the operand directly.
fn elem_match_body(node: &Expr, mut body: Document) -> Result<Document> {
    if !body.contains_key("") {
        if mentions_element(&body) {
            return Err(unsupported(node));
        }
        return Ok(body);
    }
    if body.len() != 1 {
        return Err(unsupported(node));
    }
    match body.remove("") {
        Some(Bson::Document(ops)) if is_operator_doc(&ops) => Ok(ops),
        Some(Bson::RegularExpression(re)) => Ok(doc! { "$regex": re }),
        Some(value) => Ok(doc! { "$eq": value }),
        None => Err(unsupported(node)),
    }
}

/// True when a logical operator nests a test on the bare element
fn mentions_element(filter: &Document) -> bool {
    filter.iter().any(|(key, value)| {
        key.is_empty()
            || (key.starts_with('$')
                && match value {
                    Bson::Array(items) => items.iter().any(|item| match item {
                        Bson::Document(nested) => mentions_element(nested),
                        _ => false,
                    }),
                    _ => false,
                })
    })
}
