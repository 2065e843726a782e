//! Expression to MongoDB query translation for ouroboros
//!
//! This crate turns host-language expression trees into MongoDB query
//! documents:
//!
//! - **Filters**: boolean predicates become `find` / `$match` filter documents
//! - **Projections**: selectors become `$project` stage bodies
//! - **Groups**: key and result selectors become `$group` stage bodies
//! - **Find projections**: selectors that only copy stored fields become
//!   inclusion projections
//!
//! Every output that changes the returned document layout comes with a
//! [`ResultDeserializer`] that reads values back into the selected shape.
//!
//! # Architecture
//!
//! ```text
//!   Expr (expression tree)
//!      |
//!   Scope (lambda frames, foreign reference checks)
//!      |
//!   FieldResolver (member chains -> element paths, via SerializerRegistry)
//!      |
//!   FilterBuilder / ExpressionBuilder / ProjectionPlanner
//!      |
//!   bson::Document + ResultDeserializer
//! ```
//!
//! Translation is synchronous and performs no I/O. A [`Translator`] only
//! reads its registry and options, so one instance can serve many threads.
//!
//! # Example
//!
//! ```ignore
//! use ouroboros_mql::{Expr, Param, SerializerRegistry, Translator, ValueType};
//! use bson::doc;
//!
//! let translator = Translator::new(SerializerRegistry::new());
//! let x = Param::new("x", ValueType::Any);
//! let predicate = Expr::lambda(
//!     vec![x.clone()],
//!     Expr::param(&x).member("A").eq(Expr::int(1))
//!         .and_also(Expr::param(&x).member("B").eq(Expr::int(11))),
//! );
//! assert_eq!(translator.filter(&predicate)?, doc! { "A": 1, "B": 11 });
//! ```

pub mod aggregate;
pub mod expr;
pub mod field;
pub mod filter;
mod format;
pub mod options;
pub mod projection;
pub mod registry;
pub mod scope;
pub mod shape;
pub mod types;

#[cfg(test)]
mod test_fixtures;

use std::sync::Arc;

use bson::Document;

pub use aggregate::ExpressionBuilder;
pub use expr::{BinaryOp, CollectionKind, Constant, Expr, Lambda, Param, StringComparison, UnaryOp};
pub use field::{FieldResolver, ResolvedField};
pub use filter::FilterBuilder;
pub use options::{StringTranslationMode, TranslationOptions};
pub use ouroboros_common::{Result, TranslationError};
pub use projection::{FindProjection, ProjectionPlanner};
pub use registry::{DocumentMap, EnumMap, MemberMap, SerializerRegistry};
pub use scope::{Binding, Frame, Scope};
pub use shape::{ResultDeserializer, ResultShape};
pub use types::{DictionaryRepresentation, Representation, ValueType};

/// Entry point bundling a serializer registry with translation options
#[derive(Debug, Clone)]
pub struct Translator {
    registry: Arc<SerializerRegistry>,
    options: TranslationOptions,
}

impl Translator {
    pub fn new(registry: impl Into<Arc<SerializerRegistry>>) -> Self {
        Self {
            registry: registry.into(),
            options: TranslationOptions::default(),
        }
    }

    pub fn with_options(mut self, options: TranslationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn registry(&self) -> &SerializerRegistry {
        &self.registry
    }

    pub fn options(&self) -> &TranslationOptions {
        &self.options
    }

    /// Filter document for `x => predicate`
    pub fn filter(&self, predicate: &Expr) -> Result<Document> {
        FilterBuilder::new(&self.registry, &self.options).translate(predicate)
    }

    /// `$project` stage body for `x => selector`
    pub fn project(&self, selector: &Expr) -> Result<(Document, ResultDeserializer)> {
        ExpressionBuilder::new(&self.registry, &self.options).project(selector)
    }

    /// `$group` stage body for `GroupBy(key).Select(selector)`
    pub fn group(&self, key: &Expr, selector: &Expr) -> Result<(Document, ResultDeserializer)> {
        ExpressionBuilder::new(&self.registry, &self.options).group(key, selector)
    }

    /// Inclusion projection for `x => selector`, or `None` when the
    /// selector needs whole documents
    pub fn find_projection(&self, selector: &Expr) -> Result<Option<FindProjection>> {
        ProjectionPlanner::new(&self.registry).plan(selector)
    }
}
