//! `$group` stages

use bson::{doc, Bson, Document};
use ouroboros_common::Result;

use super::methods::reducer;
use super::{operator, stage_value, unsupported, ExpressionBuilder};
use crate::expr::{CollectionKind, Expr, Param};
use crate::scope::{Binding, Frame, Scope};
use crate::shape::{ResultDeserializer, ResultShape};
use crate::types::ValueType;

/// Members read from the group key: `g.Key` or `g.Key.A.B`
fn key_path(node: &Expr, group: &str) -> Option<Vec<String>> {
    match node.strip() {
        Expr::Member { target, name } if target.is_parameter(group) && name == "Key" => Some(Vec::new()),
        Expr::Member { target, name } => {
            let mut path = key_path(target, group)?;
            path.push(name.clone());
            Some(path)
        }
        _ => None,
    }
}

/// Where accumulated values come from: the grouped documents themselves,
/// or a projection of them through `g.Select(selector)`
enum Source<'e> {
    Documents,
    Selected(&'e Expr),
}

fn source<'e>(target: &'e Expr, group: &str) -> Option<Source<'e>> {
    if target.is_parameter(group) {
        return Some(Source::Documents);
    }
    match target.strip() {
        Expr::Call {
            target: inner,
            method,
            args,
        } if method == "Select" && args.len() == 1 && inner.is_parameter(group) => {
            Some(Source::Selected(&args[0]))
        }
        _ => None,
    }
}

impl<'a> ExpressionBuilder<'a> {
    /// Translates `GroupBy(key).Select(selector)` into a `$group` stage body.
    ///
    /// `key` is `x => key` over the grouped documents. `selector` is
    /// `g => result` where `g` carries the key and the grouped documents.
    pub fn group(&self, key: &Expr, selector: &Expr) -> Result<(Document, ResultDeserializer)> {
        let (key_param, key_body) = key.as_unary_lambda().ok_or_else(|| unsupported(key))?;
        let (group_param, body) = selector.as_unary_lambda().ok_or_else(|| unsupported(selector))?;
        tracing::debug!(key = %key, selector = %selector, "translating group");

        let key_scope = Scope::root(&key_param.name);
        key_scope.check(key_body)?;
        let group_scope = Scope::default().push(Frame::new(&group_param.name, Binding::Group));
        group_scope.check(body)?;

        let mut stage = doc! { "_id": stage_value(self.expr(key_body, &key_scope)?) };
        let mut member = |name: &str, value: &Expr| -> Result<ResultShape> {
            if let Some(path) = key_path(value, &group_param.name) {
                return Ok(ResultShape::Key { path });
            }
            if name == "_id" {
                return Err(unsupported(value));
            }
            stage.insert(name, self.accumulator(value, group_param)?);
            Ok(ResultShape::computed(name))
        };

        let shape = match body.strip() {
            Expr::New { members, .. } if !members.is_empty() => {
                let mut shape = Vec::with_capacity(members.len());
                for (name, value) in members {
                    shape.push((name.clone(), member(name, value)?));
                }
                ResultShape::Object(shape)
            }
            other => member("value", other)?,
        };

        tracing::debug!(group = %stage, "translated group");
        Ok((stage, ResultDeserializer::new(shape)))
    }

    /// Accumulator computing one output member from the grouping parameter
    fn accumulator(&self, node: &Expr, group: &Param) -> Result<Bson> {
        let g = group.name.as_str();
        if node.is_parameter(g) {
            return Ok(operator("$push", "$$ROOT"));
        }
        match node.strip() {
            Expr::StaticCall { .. } => match node.strip().as_extension_call() {
                Some(call) => self.accumulator(&call, group),
                None => Err(unsupported(node)),
            },
            Expr::Call { target, method, args } => {
                let from = source(target, g).ok_or_else(|| unsupported(node))?;
                self.aggregate_call(node, from, method, args)
            }
            Expr::NewCollection {
                kind,
                source: Some(items),
                ..
            } => {
                let from = source(items, g).ok_or_else(|| unsupported(node))?;
                let name = match kind {
                    CollectionKind::HashSet => "$addToSet",
                    CollectionKind::List | CollectionKind::Array => "$push",
                };
                Ok(operator(name, self.values(node, &from)?))
            }
            Expr::Member { .. } => self.first_member(node, group),
            _ => Err(unsupported(node)),
        }
    }

    /// Per-document value fed to an accumulator
    fn values(&self, node: &Expr, source: &Source<'_>) -> Result<Bson> {
        match source {
            Source::Documents => Ok(Bson::String("$$ROOT".to_string())),
            Source::Selected(selector) => self.item_lambda(node, selector),
        }
    }

    /// Body of `x => body` evaluated against each grouped document
    fn item_lambda(&self, node: &Expr, lambda: &Expr) -> Result<Bson> {
        let (param, body) = lambda.as_unary_lambda().ok_or_else(|| unsupported(node))?;
        self.expr(body, &Scope::root(&param.name))
    }

    fn aggregate_call(&self, node: &Expr, source: Source<'_>, method: &str, args: &[Expr]) -> Result<Bson> {
        if let Some(name) = reducer(method) {
            let values = match (&source, args) {
                (Source::Selected(_), []) => self.values(node, &source)?,
                (Source::Documents, [selector]) => self.item_lambda(node, selector)?,
                _ => return Err(unsupported(node)),
            };
            return Ok(operator(name, values));
        }
        match (method, args) {
            ("Count" | "LongCount", []) => Ok(operator("$sum", 1)),
            ("Count" | "LongCount", [predicate]) if matches!(source, Source::Documents) => {
                let test = self.item_lambda(node, predicate)?;
                Ok(operator("$sum", operator("$cond", vec![test, Bson::Int32(1), Bson::Int32(0)])))
            }
            ("First" | "FirstOrDefault", []) => Ok(operator("$first", self.values(node, &source)?)),
            ("Last" | "LastOrDefault", []) => Ok(operator("$last", self.values(node, &source)?)),
            ("Distinct" | "ToHashSet", []) => Ok(operator("$addToSet", self.values(node, &source)?)),
            ("ToList" | "ToArray" | "AsEnumerable", []) => Ok(operator("$push", self.values(node, &source)?)),
            ("Select", [selector]) if matches!(source, Source::Documents) => {
                Ok(operator("$push", self.item_lambda(node, selector)?))
            }
            _ => Err(unsupported(node)),
        }
    }

    /// `g.First().A.B` and `g.Last().A.B`
    fn first_member(&self, node: &Expr, group: &Param) -> Result<Bson> {
        let mut members = Vec::new();
        let mut current = node.strip();
        while let Expr::Member { target, name } = current {
            members.push(name.clone());
            current = target.strip();
        }
        let Expr::Call { target, method, args } = current else {
            return Err(unsupported(node));
        };
        let name = match method.as_str() {
            "First" | "FirstOrDefault" => "$first",
            "Last" | "LastOrDefault" => "$last",
            _ => return Err(unsupported(node)),
        };
        if !args.is_empty() || !target.is_parameter(&group.name) {
            return Err(unsupported(node));
        }

        let item_type = group.value_type.item_type().cloned().unwrap_or(ValueType::Any);
        let item = Param::new(&group.name, item_type);
        let chain = members
            .into_iter()
            .rev()
            .fold(Expr::param(&item), |target, member| target.member(member));
        Ok(operator(name, self.expr(&chain, &Scope::root(&item.name))?))
    }
}
