//! Boolean algebra over filter documents.
//!
//! AND merges clauses into a single document whenever no field collides,
//! OR always renders an explicit `$or` array, and negation picks the
//! complementary operator when the server has one.

use bson::{doc, Bson, Document};

/// Filter matching every document
pub fn match_all() -> Document {
    Document::new()
}

/// Filter matching no document (and still usable with the `_id` index)
pub fn match_nothing() -> Document {
    doc! { "_id": { "$type": -1 } }
}

pub fn boolean(value: bool) -> Document {
    if value {
        match_all()
    } else {
        match_nothing()
    }
}

/// `{ name: value }`
pub fn field(name: impl Into<String>, value: impl Into<Bson>) -> Document {
    let mut filter = Document::new();
    filter.insert(name.into(), value.into());
    filter
}

/// `{ name: { operator: value } }`
pub fn field_op(name: impl Into<String>, operator: &str, value: impl Into<Bson>) -> Document {
    field(name, field(operator, value))
}

/// True for a non-empty document whose keys are all operators
pub fn is_operator_doc(doc: &Document) -> bool {
    !doc.is_empty() && doc.keys().all(|k| k.starts_with('$'))
}

fn single<'d>(doc: &'d Document, key: &str) -> Option<&'d Bson> {
    if doc.len() == 1 {
        doc.get(key)
    } else {
        None
    }
}

pub fn and_all(clauses: impl IntoIterator<Item = Document>) -> Document {
    let mut merged = Document::new();
    for clause in clauses {
        add_clause(&mut merged, clause);
    }
    merged
}

fn add_clause(target: &mut Document, clause: Document) {
    if clause.is_empty() {
        return;
    }
    if let Some(Bson::Array(items)) = single(&clause, "$and") {
        for item in items.clone() {
            match item {
                Bson::Document(nested) => add_clause(target, nested),
                other => append_and(target, field("$and", vec![other])),
            }
        }
        return;
    }
    if single(target, "$and").is_some() {
        append_and(target, clause);
        return;
    }
    for (name, value) in clause {
        add_element(target, name, value);
    }
}

fn append_and(target: &mut Document, clause: Document) {
    if let Some(Bson::Array(items)) = target.get_mut("$and") {
        items.push(Bson::Document(clause));
    }
}

fn add_element(target: &mut Document, name: String, value: Bson) {
    if !target.contains_key(&name) {
        target.insert(name, value);
        return;
    }
    if let (Some(Bson::Document(existing)), Bson::Document(incoming)) = (target.get_mut(&name), &value) {
        if is_operator_doc(existing)
            && is_operator_doc(incoming)
            && incoming.keys().all(|k| !existing.contains_key(k))
        {
            for (op, v) in incoming {
                existing.insert(op.clone(), v.clone());
            }
            return;
        }
    }
    promote(target, name, value);
}

/// Rewrites `target` into `$and` form, one clause per existing element, then appends the new element
fn promote(target: &mut Document, name: String, value: Bson) {
    let existing = std::mem::take(target);
    let mut clauses: Vec<Bson> = existing
        .into_iter()
        .map(|(k, v)| Bson::Document(field(k, v)))
        .collect();
    clauses.push(Bson::Document(field(name, value)));
    target.insert("$and", clauses);
}

pub fn or_all(clauses: impl IntoIterator<Item = Document>) -> Document {
    let mut items = Vec::new();
    for clause in clauses {
        match single(&clause, "$or") {
            Some(Bson::Array(nested)) => items.extend(nested.iter().cloned()),
            _ => items.push(Bson::Document(clause)),
        }
    }
    doc! { "$or": items }
}

pub fn negate(filter: Document) -> Document {
    if filter.len() != 1 {
        return doc! { "$nor": [filter] };
    }
    let Some((name, value)) = filter.iter().next().map(|(k, v)| (k.clone(), v.clone())) else {
        return doc! { "$nor": [filter] };
    };
    if name.starts_with('$') {
        return match (name.as_str(), value) {
            ("$or", Bson::Array(items)) => doc! { "$nor": items },
            ("$nor", Bson::Array(items)) => doc! { "$or": items },
            _ => doc! { "$nor": [filter] },
        };
    }
    match value {
        Bson::Document(ops) if is_operator_doc(&ops) => negate_operators(name, ops, filter),
        Bson::RegularExpression(re) => field_op(name, "$not", re),
        other => field_op(name, "$ne", other),
    }
}

fn negate_operators(name: String, ops: Document, original: Document) -> Document {
    if ops.len() != 1 {
        return doc! { "$nor": [original] };
    }
    let Some((op, value)) = ops.iter().next().map(|(k, v)| (k.clone(), v.clone())) else {
        return doc! { "$nor": [original] };
    };
    match (op.as_str(), value) {
        ("$exists", Bson::Boolean(exists)) => field_op(name, "$exists", !exists),
        ("$in", values) => field_op(name, "$nin", values),
        ("$nin", values) => field_op(name, "$in", values),
        ("$ne" | "$not", inner) => field(name, inner),
        _ => field_op(name, "$not", ops),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_and_merges_disjoint_fields() {
        assert_eq!(and_all([doc! { "A": 1 }, doc! { "B": 11 }]), doc! { "A": 1, "B": 11 });
    }

    #[test]
    fn test_and_merges_operator_documents() {
        let merged = and_all([doc! { "A": { "$gt": 1 } }, doc! { "A": { "$lt": 5 } }]);
        assert_eq!(merged, doc! { "A": { "$gt": 1, "$lt": 5 } });
    }

    #[test]
    fn test_and_promotes_colliding_fields() {
        let merged = and_all([doc! { "A": 1, "B": 2 }, doc! { "A": 3 }]);
        assert_eq!(merged, doc! { "$and": [{ "A": 1 }, { "B": 2 }, { "A": 3 }] });
    }

    #[test]
    fn test_and_promotes_repeated_operator() {
        let merged = and_all([doc! { "A": { "$ne": 1 } }, doc! { "A": { "$ne": 2 } }]);
        assert_eq!(merged, doc! { "$and": [{ "A": { "$ne": 1 } }, { "A": { "$ne": 2 } }] });
    }

    #[test]
    fn test_and_appends_to_existing_and() {
        let merged = and_all([
            doc! { "A": 1 },
            doc! { "A": 2 },
            doc! { "B": 3 },
        ]);
        assert_eq!(merged, doc! { "$and": [{ "A": 1 }, { "A": 2 }, { "B": 3 }] });
    }

    #[test]
    fn test_and_flattens_nested_and_and_skips_empty() {
        let merged = and_all([doc! {}, doc! { "$and": [{ "A": 1 }, { "B": 2 }] }]);
        assert_eq!(merged, doc! { "A": 1, "B": 2 });
    }

    #[test]
    fn test_or_flattens_nested_or() {
        let filter = or_all([doc! { "$or": [{ "A": 1 }, { "A": 2 }] }, doc! { "B": 3 }]);
        assert_eq!(filter, doc! { "$or": [{ "A": 1 }, { "A": 2 }, { "B": 3 }] });
    }

    #[test]
    fn test_negate_complementary_operators() {
        assert_eq!(negate(doc! { "A": 1 }), doc! { "A": { "$ne": 1 } });
        assert_eq!(negate(doc! { "A": { "$ne": 1 } }), doc! { "A": 1 });
        assert_eq!(negate(doc! { "A": { "$in": [1, 2] } }), doc! { "A": { "$nin": [1, 2] } });
        assert_eq!(negate(doc! { "A": { "$exists": true } }), doc! { "A": { "$exists": false } });
        assert_eq!(negate(doc! { "A": { "$gt": 1 } }), doc! { "A": { "$not": { "$gt": 1 } } });
    }

    #[test]
    fn test_negate_logical_operators() {
        assert_eq!(
            negate(doc! { "$or": [{ "A": 1 }, { "B": 2 }] }),
            doc! { "$nor": [{ "A": 1 }, { "B": 2 }] }
        );
        assert_eq!(negate(doc! { "$nor": [{ "A": 1 }] }), doc! { "$or": [{ "A": 1 }] });
        assert_eq!(negate(doc! { "A": 1, "B": 11 }), doc! { "$nor": [{ "A": 1, "B": 11 }] });
    }

    #[test]
    fn test_negate_multi_operator_field() {
        let filter = doc! { "G": { "$ne": null, "$not": { "$size": 0 } } };
        assert_eq!(negate(filter.clone()), doc! { "$nor": [filter] });
    }

    #[test]
    fn test_double_negation_of_match_nothing() {
        assert_eq!(
            negate(match_nothing()),
            doc! { "_id": { "$not": { "$type": -1 } } }
        );
    }
}
