//! Method and static calls in aggregation expressions

use bson::{doc, Bson, Document};
use ouroboros_common::Result;

use super::{default_value, literal, numeric, operator, unsupported, ExpressionBuilder, ITEM};
use crate::expr::{Constant, Expr, StringComparison};
use crate::scope::{Binding, Frame, Scope};
use crate::types::ValueType;

const MILLIS_PER_SECOND: i64 = 1_000;
const MILLIS_PER_MINUTE: i64 = 60 * MILLIS_PER_SECOND;
const MILLIS_PER_HOUR: i64 = 60 * MILLIS_PER_MINUTE;
const MILLIS_PER_DAY: i64 = 24 * MILLIS_PER_HOUR;

/// Server reducer for a projection-mode aggregate or a group accumulator
pub(super) fn reducer(method: &str) -> Option<&'static str> {
    Some(match method {
        "Sum" => "$sum",
        "Average" => "$avg",
        "Min" => "$min",
        "Max" => "$max",
        "StandardDeviationPopulation" => "$stdDevPop",
        "StandardDeviationSample" => "$stdDevSamp",
        _ => return None,
    })
}

fn set_operator(method: &str) -> Option<&'static str> {
    Some(match method {
        "Union" => "$setUnion",
        "Intersect" => "$setIntersection",
        "Except" => "$setDifference",
        "SetEquals" => "$setEquals",
        "IsSubsetOf" => "$setIsSubset",
        _ => return None,
    })
}

/// String form of a `char`, `char[]` with one element, or string literal
fn separator(c: &Constant) -> Option<Bson> {
    match &c.value {
        Bson::String(s) => Some(Bson::String(s.clone())),
        Bson::Array(items) if items.len() == 1 => items[0].as_str().map(|s| Bson::String(s.to_string())),
        _ => None,
    }
}

impl<'a> ExpressionBuilder<'a> {
    pub(super) fn call(
        &self,
        node: &Expr,
        target: &Expr,
        method: &str,
        args: &[Expr],
        scope: &Scope,
    ) -> Result<Bson> {
        match (method, args) {
            ("CompareTo", [other]) => {
                return Ok(operator(
                    "$cmp",
                    vec![self.expr(target, scope)?, self.expr(other, scope)?],
                ))
            }
            ("Equals", [other]) => {
                return Ok(operator(
                    "$eq",
                    vec![self.compared(target, other, scope)?, self.compared(other, target, scope)?],
                ))
            }
            ("Equals", [other, comparison]) => {
                return self.string_equals(node, target, other, comparison, scope)
            }
            _ => {}
        }

        if let Some(values) = target.evaluate_local() {
            return match (method, args) {
                ("Contains", [item]) => Ok(operator(
                    "$in",
                    vec![self.expr(item, scope)?, operator("$literal", values.value)],
                )),
                _ => Err(unsupported(node)),
            };
        }

        let target_type = self.resolver.type_of(target);
        match target_type.underlying() {
            ValueType::String => self.string_method(node, target, method, args, scope),
            ValueType::DateTime => self.date_method(node, target, method, args, scope),
            ValueType::Array(_) => self.array_method(node, target, method, args, scope),
            _ => Err(unsupported(node)),
        }
    }

    fn string_method(&self, node: &Expr, target: &Expr, method: &str, args: &[Expr], scope: &Scope) -> Result<Bson> {
        let mode = self.options.string_translation_mode;
        let text = self.expr(target, scope)?;
        match (method, args) {
            ("ToLower" | "ToLowerInvariant", []) => Ok(operator("$toLower", text)),
            ("ToUpper" | "ToUpperInvariant", []) => Ok(operator("$toUpper", text)),
            ("Trim" | "TrimStart" | "TrimEnd", _) if args.len() <= 1 => {
                let name = match method {
                    "TrimStart" => "$ltrim",
                    "TrimEnd" => "$rtrim",
                    _ => "$trim",
                };
                let mut trim = doc! { "input": text };
                if let Some(chars) = args.first() {
                    let chars = chars.as_constant().ok_or_else(|| unsupported(node))?;
                    let chars: String = match &chars.value {
                        Bson::String(s) => s.clone(),
                        Bson::Array(items) => items.iter().filter_map(Bson::as_str).collect(),
                        _ => return Err(unsupported(node)),
                    };
                    trim.insert("chars", chars);
                }
                Ok(operator(name, trim))
            }
            ("Substring", [start]) => {
                let start = self.expr(start, scope)?;
                let length = operator(
                    "$subtract",
                    vec![operator(mode.str_len(), text.clone()), start.clone()],
                );
                Ok(operator(mode.substr(), vec![text, start, length]))
            }
            ("Substring", [start, length]) => Ok(operator(
                mode.substr(),
                vec![text, self.expr(start, scope)?, self.expr(length, scope)?],
            )),
            ("IndexOf", [value, rest @ ..]) if rest.len() <= 2 => {
                let mut operands = vec![text, self.expr(value, scope)?];
                if let Some(start) = rest.first() {
                    let start = self.expr(start, scope)?;
                    operands.push(start.clone());
                    if let Some(count) = rest.get(1) {
                        operands.push(operator("$add", vec![start, self.expr(count, scope)?]));
                    }
                }
                Ok(operator(mode.index_of(), operands))
            }
            ("Contains", [value]) => Ok(operator(
                "$gte",
                vec![
                    operator(mode.index_of(), vec![text, self.expr(value, scope)?]),
                    Bson::Int32(0),
                ],
            )),
            ("StartsWith", [value]) => Ok(operator(
                "$eq",
                vec![
                    operator(mode.index_of(), vec![text, self.expr(value, scope)?]),
                    Bson::Int32(0),
                ],
            )),
            ("Split", [separators]) => {
                let delimiter = separators
                    .as_constant()
                    .and_then(separator)
                    .ok_or_else(|| unsupported(node))?;
                Ok(operator("$split", vec![text, delimiter]))
            }
            _ => Err(unsupported(node)),
        }
    }

    fn string_equals(&self, node: &Expr, a: &Expr, b: &Expr, comparison: &Expr, scope: &Scope) -> Result<Bson> {
        let mode = comparison
            .as_constant()
            .and_then(Constant::string_comparison)
            .ok_or_else(|| unsupported(node))?;
        let operands = vec![self.compared(a, b, scope)?, self.compared(b, a, scope)?];
        Ok(match mode {
            StringComparison::Ordinal => operator("$eq", operands),
            StringComparison::OrdinalIgnoreCase => {
                operator("$eq", vec![operator("$strcasecmp", operands), Bson::Int32(0)])
            }
        })
    }

    fn date_method(&self, node: &Expr, target: &Expr, method: &str, args: &[Expr], scope: &Scope) -> Result<Bson> {
        let unit = match (method, args) {
            ("AddDays", [_]) => MILLIS_PER_DAY,
            ("AddHours", [_]) => MILLIS_PER_HOUR,
            ("AddMinutes", [_]) => MILLIS_PER_MINUTE,
            ("AddSeconds", [_]) => MILLIS_PER_SECOND,
            ("AddMilliseconds", [_]) => 1,
            ("ToString", [format]) => {
                return Ok(doc! {
                    "$dateToString": {
                        "format": self.expr(format, scope)?,
                        "date": self.expr(target, scope)?,
                    }
                }
                .into())
            }
            _ => return Err(unsupported(node)),
        };
        let date = self.expr(target, scope)?;
        let delta = &args[0];
        let offset = match delta.as_constant().and_then(numeric) {
            Some(amount) => {
                let millis = (amount * unit as f64).round() as i64;
                if millis < 0 {
                    operator("$subtract", vec![Bson::Int64(0), Bson::Int64(-millis)])
                } else {
                    Bson::Int64(millis)
                }
            }
            None => operator("$multiply", vec![self.expr(delta, scope)?, Bson::Int64(unit)]),
        };
        Ok(operator("$add", vec![date, offset]))
    }

    /// Translates the body of `param => body` with `param` bound to `$$param`
    fn lambda_body(&self, node: &Expr, lambda: &Expr, scope: &Scope) -> Result<(String, Bson)> {
        let (param, body) = lambda.as_unary_lambda().ok_or_else(|| unsupported(node))?;
        let frame = Frame::new(&param.name, Binding::Variable(param.name.clone()));
        Ok((param.name.clone(), self.expr(body, &scope.push(frame))?))
    }

    fn map(&self, node: &Expr, input: Bson, selector: &Expr, scope: &Scope) -> Result<Bson> {
        let (name, body) = self.lambda_body(node, selector, scope)?;
        Ok(doc! { "$map": { "input": input, "as": name, "in": body } }.into())
    }

    fn filter(&self, node: &Expr, input: Bson, predicate: &Expr, scope: &Scope) -> Result<Bson> {
        let (name, cond) = self.lambda_body(node, predicate, scope)?;
        Ok(doc! { "$filter": { "input": input, "as": name, "cond": cond } }.into())
    }

    fn array_method(&self, node: &Expr, target: &Expr, method: &str, args: &[Expr], scope: &Scope) -> Result<Bson> {
        if let ("Take", [count]) = (method, args) {
            if let Expr::Call {
                target: source,
                method: inner,
                args: skip,
            } = target.strip()
            {
                if inner == "Skip" && skip.len() == 1 {
                    return Ok(operator(
                        "$slice",
                        vec![
                            self.expr(source, scope)?,
                            self.expr(&skip[0], scope)?,
                            self.expr(count, scope)?,
                        ],
                    ));
                }
            }
        }
        if let Some(name) = reducer(method) {
            let values = match args {
                [] => self.expr(target, scope)?,
                [selector] => {
                    let selected = target.clone().call("Select", vec![selector.clone()]);
                    self.expr(&selected, scope)?
                }
                _ => return Err(unsupported(node)),
            };
            return Ok(operator(name, values));
        }

        let array = self.expr(target, scope)?;
        if let (Some(name), [other]) = (set_operator(method), args) {
            return Ok(operator(name, vec![array, self.expr(other, scope)?]));
        }
        match (method, args) {
            ("Count" | "LongCount", []) => Ok(operator("$size", array)),
            ("Count" | "LongCount", [predicate]) => {
                Ok(operator("$size", self.filter(node, array, predicate, scope)?))
            }
            ("Any", []) => Ok(operator(
                "$gt",
                vec![operator("$size", array), Bson::Int32(0)],
            )),
            ("Any", [predicate]) => Ok(operator(
                "$anyElementTrue",
                vec![self.map(node, array, predicate, scope)?],
            )),
            ("All", [predicate]) => Ok(operator(
                "$allElementsTrue",
                vec![self.map(node, array, predicate, scope)?],
            )),
            ("Contains", [value]) => {
                let equal = operator("$eq", vec![Bson::String(format!("$${}", ITEM)), self.expr(value, scope)?]);
                Ok(operator(
                    "$anyElementTrue",
                    vec![Bson::Document(doc! { "$map": { "input": array, "as": ITEM, "in": equal } })],
                ))
            }
            ("ElementAt" | "ElementAtOrDefault", [index]) => Ok(operator(
                "$arrayElemAt",
                vec![array, self.expr(index, scope)?],
            )),
            ("First" | "FirstOrDefault", []) => Ok(operator("$arrayElemAt", vec![array, Bson::Int32(0)])),
            ("Last" | "LastOrDefault", []) => Ok(operator("$arrayElemAt", vec![array, Bson::Int32(-1)])),
            ("First" | "FirstOrDefault", [predicate]) => Ok(operator(
                "$arrayElemAt",
                vec![self.filter(node, array, predicate, scope)?, Bson::Int32(0)],
            )),
            ("Last" | "LastOrDefault", [predicate]) => Ok(operator(
                "$arrayElemAt",
                vec![self.filter(node, array, predicate, scope)?, Bson::Int32(-1)],
            )),
            ("Take", [count]) => Ok(operator("$slice", vec![array, self.expr(count, scope)?])),
            ("Skip", [count]) => Ok(operator(
                "$slice",
                vec![array, self.expr(count, scope)?, Bson::Int32(i32::MAX)],
            )),
            ("Concat", [other]) => Ok(operator(
                "$concatArrays",
                vec![array, self.expr(other, scope)?],
            )),
            ("IsSupersetOf", [other]) => Ok(operator(
                "$setIsSubset",
                vec![self.expr(other, scope)?, array],
            )),
            ("Distinct" | "ToHashSet", []) => Ok(operator("$setUnion", vec![array])),
            ("Reverse", []) => Ok(operator("$reverseArray", array)),
            ("ToList" | "ToArray" | "AsEnumerable", []) => Ok(array),
            ("Where", [predicate]) => self.filter(node, array, predicate, scope),
            ("Select", [selector]) => self.map(node, array, selector, scope),
            ("OfType", [type_name]) => self.of_type(node, target, array, type_name),
            ("Aggregate", _) => self.reduce(node, target, array, args, scope),
            ("Zip", [other, selector]) => self.zip(node, array, other, selector, scope),
            _ => Err(unsupported(node)),
        }
    }

    fn of_type(&self, node: &Expr, target: &Expr, array: Bson, type_arg: &Expr) -> Result<Bson> {
        let actual = type_arg
            .as_constant()
            .and_then(Constant::as_str)
            .ok_or_else(|| unsupported(node))?;
        let nominal = match self.resolver.type_of(target).item_type().map(ValueType::underlying) {
            Some(ValueType::Document(name)) => name.clone(),
            _ => return Err(unsupported(node)),
        };
        let registry = self.resolver.registry();
        let Some(discriminator) = registry.discriminator(&nominal, actual)? else {
            return Ok(array);
        };
        let element = registry.discriminator_element(&nominal, &self.options.discriminator_element);
        let cond = operator(
            "$eq",
            vec![Bson::String(format!("$${}.{}", ITEM, element)), discriminator],
        );
        Ok(doc! { "$filter": { "input": array, "as": ITEM, "cond": cond } }.into())
    }

    /// `source.Aggregate([seed, ]func[, result])`
    fn reduce(&self, node: &Expr, source: &Expr, array: Bson, args: &[Expr], scope: &Scope) -> Result<Bson> {
        let (seed, func, result) = match args {
            [func] => (None, func, None),
            [seed, func] => (Some(seed), func, None),
            [seed, func, result] => (Some(seed), func, Some(result)),
            _ => return Err(unsupported(node)),
        };
        let lambda = func.as_lambda().ok_or_else(|| unsupported(node))?;
        let [accumulator, item] = lambda.params.as_slice() else {
            return Err(unsupported(node));
        };

        let initial = match seed {
            Some(seed) => self.expr(seed, scope)?,
            None => default_value(
                self.resolver
                    .type_of(source)
                    .item_type()
                    .unwrap_or(&ValueType::Any),
            ),
        };
        let frame = Frame::new(&accumulator.name, Binding::Variable("value".to_string()))
            .bind(&item.name, Binding::Variable("this".to_string()));
        let body = self.expr(&lambda.body, &scope.push(frame))?;
        let reduced: Bson = doc! {
            "$reduce": { "input": array, "initialValue": initial, "in": body }
        }
        .into();

        let Some(result) = result else {
            return Ok(reduced);
        };
        let (param, body) = result.as_unary_lambda().ok_or_else(|| unsupported(node))?;
        let frame = Frame::new(&param.name, Binding::Variable(param.name.clone()));
        let body = self.expr(body, &scope.push(frame))?;
        let mut vars = Document::new();
        vars.insert(param.name.clone(), reduced);
        Ok(doc! { "$let": { "vars": vars, "in": body } }.into())
    }

    /// `first.Zip(second, (a, b) => ...)`
    fn zip(&self, node: &Expr, first: Bson, second: &Expr, selector: &Expr, scope: &Scope) -> Result<Bson> {
        let lambda = selector.as_lambda().ok_or_else(|| unsupported(node))?;
        let [left, right] = lambda.params.as_slice() else {
            return Err(unsupported(node));
        };
        let pair = format!("{}_{}", left.name, right.name);
        let element = |position: i32| operator("$arrayElemAt", vec![Bson::String(format!("$${}", pair)), Bson::Int32(position)]);
        let frame = Frame::new(&left.name, Binding::Computed(element(0)))
            .bind(&right.name, Binding::Computed(element(1)));
        let body = self.expr(&lambda.body, &scope.push(frame))?;
        let inputs = vec![first, self.expr(second, scope)?];
        Ok(doc! {
            "$map": {
                "input": { "$zip": { "inputs": inputs } },
                "as": pair,
                "in": body,
            }
        }
        .into())
    }

    pub(super) fn static_call(
        &self,
        node: &Expr,
        class: &str,
        method: &str,
        args: &[Expr],
        scope: &Scope,
    ) -> Result<Bson> {
        match (class, method, args) {
            ("Math", "Abs" | "Ceiling" | "Floor" | "Truncate", [value]) => {
                let name = match method {
                    "Abs" => "$abs",
                    "Ceiling" => "$ceil",
                    "Floor" => "$floor",
                    _ => "$trunc",
                };
                Ok(operator(name, self.expr(value, scope)?))
            }
            ("Math", "Exp" | "Log" | "Log10" | "Sqrt", [value]) => {
                let name = match method {
                    "Exp" => "$exp",
                    "Log" => "$ln",
                    "Log10" => "$log10",
                    _ => "$sqrt",
                };
                Ok(operator(name, vec![self.expr(value, scope)?]))
            }
            ("Math", "Log", [value, base]) => {
                let base = match base.as_constant().and_then(numeric) {
                    Some(b) => Bson::Double(b),
                    None => self.expr(base, scope)?,
                };
                Ok(operator("$log", vec![self.expr(value, scope)?, base]))
            }
            ("Math", "Pow", [value, exponent]) => Ok(operator(
                "$pow",
                vec![self.expr(value, scope)?, self.expr(exponent, scope)?],
            )),
            ("Enumerable", "Range", [start, count]) => {
                let start = self.expr(start, scope)?;
                let end = operator("$add", vec![start.clone(), self.expr(count, scope)?]);
                Ok(operator("$range", vec![start, end]))
            }
            ("String", "IsNullOrEmpty", [text]) => {
                let text = self.expr(text, scope)?;
                Ok(operator(
                    "$or",
                    vec![
                        operator("$eq", vec![text.clone(), Bson::Null]),
                        operator("$eq", vec![text, literal(&Bson::String(String::new()))]),
                    ],
                ))
            }
            ("String", "Concat", parts) if !parts.is_empty() => parts
                .iter()
                .map(|part| self.expr(part, scope))
                .collect::<Result<Vec<_>>>()
                .map(|parts| operator("$concat", parts)),
            ("String" | "Object", "Equals", [a, b]) => Ok(operator(
                "$eq",
                vec![self.compared(a, b, scope)?, self.compared(b, a, scope)?],
            )),
            ("String", "Equals", [a, b, comparison]) => self.string_equals(node, a, b, comparison, scope),
            _ => Err(unsupported(node)),
        }
    }
}
