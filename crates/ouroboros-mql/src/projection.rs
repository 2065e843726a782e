//! Find projections
//!
//! Plans the inclusion document for a `find` whose selector only copies
//! stored fields. Selectors that need the whole document, or compute
//! anything, are left to the caller: the planner returns `None` and the
//! selector runs client-side over full documents.

use bson::Document;
use mongodb::options::FindOptions;
use ouroboros_common::{Result, TranslationError};

use crate::expr::Expr;
use crate::field::FieldResolver;
use crate::registry::SerializerRegistry;
use crate::scope::Scope;
use crate::shape::{ResultDeserializer, ResultShape};

/// Inclusion projection and the deserializer for the documents it returns
#[derive(Debug, Clone, PartialEq)]
pub struct FindProjection {
    pub projection: Document,
    pub deserializer: ResultDeserializer,
}

impl FindProjection {
    /// Find options carrying the inclusion projection
    pub fn to_find_options(&self) -> FindOptions {
        let mut options = FindOptions::default();
        options.projection = Some(self.projection.clone());
        options
    }
}

/// Plans find projections for selectors
#[derive(Debug, Clone, Copy)]
pub struct ProjectionPlanner<'a> {
    resolver: FieldResolver<'a>,
}

impl<'a> ProjectionPlanner<'a> {
    pub fn new(registry: &'a SerializerRegistry) -> Self {
        Self {
            resolver: FieldResolver::new(registry),
        }
    }

    /// Plans `x => selector`; `None` means fetch whole documents
    pub fn plan(&self, selector: &Expr) -> Result<Option<FindProjection>> {
        let Some((param, body)) = selector.as_unary_lambda() else {
            return Err(TranslationError::unsupported(selector.to_string()));
        };
        tracing::debug!(selector = %selector, "planning find projection");
        Scope::root(&param.name).check(body)?;

        let mut paths = Vec::new();
        let shape = match self.shape(body, &param.name, &mut paths)? {
            Some(shape) if !shape.contains_identity() => shape,
            _ => {
                tracing::debug!("selector needs whole documents");
                return Ok(None);
            }
        };

        let projection = inclusion(&paths);
        tracing::debug!(projection = %projection, "planned find projection");
        Ok(Some(FindProjection {
            projection,
            deserializer: ResultDeserializer::new(shape),
        }))
    }

    /// Shape of a selected value, collecting the stored paths it reads.
    /// `None` means the value is computed.
    fn shape(&self, node: &Expr, param: &str, paths: &mut Vec<Vec<String>>) -> Result<Option<ResultShape>> {
        if let Expr::New { members, .. } = node.strip() {
            let mut shape = Vec::with_capacity(members.len());
            for (name, member) in members {
                match self.shape(member, param, paths)? {
                    Some(member) => shape.push((name.clone(), member)),
                    None => return Ok(None),
                }
            }
            return Ok(Some(ResultShape::Object(shape)));
        }

        let Some(field) = self.resolver.resolve(node)? else {
            return Ok(None);
        };
        if field.parameter != param || field.positional {
            return Ok(None);
        }
        if field.path.is_empty() {
            return Ok(Some(ResultShape::Identity));
        }
        if !paths.contains(&field.path) {
            paths.push(field.path.clone());
        }
        Ok(Some(ResultShape::Field { path: field.path }))
    }
}

/// `{ path: 1, ..., _id: 0 }`, dropping paths already covered by an ancestor
fn inclusion(paths: &[Vec<String>]) -> Document {
    let mut projection = Document::new();
    let covered = |path: &Vec<String>| {
        paths
            .iter()
            .any(|other| other.len() < path.len() && path.starts_with(other))
    };
    for path in paths.iter().filter(|p| !covered(p)) {
        projection.insert(path.join("."), 1);
    }
    if !paths.iter().any(|p| p.first().map(String::as_str) == Some("_id")) {
        projection.insert("_id", 0);
    }
    projection
}
