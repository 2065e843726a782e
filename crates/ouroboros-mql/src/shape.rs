//! Result shapes
//!
//! A translated projection or group stage returns documents whose layout
//! differs from the value the selector describes: group keys come back in
//! `_id`, scalar selectors come back wrapped in a `value` member, and find
//! projections return the stored element paths. A [`ResultShape`] records
//! where each member of the selected value lives in the returned document,
//! and a [`ResultDeserializer`] uses it to rebuild the value.
//!
//! # Example
//!
//! ```ignore
//! let (stage, deserializer) = translator.group(&key, &selector)?;
//! // server returns { "_id": "a", "Count": 3 }
//! let row: KeyCount = deserializer.deserialize(returned)?;
//! ```

use bson::{Bson, Document};
use ouroboros_common::{Result, TranslationError};
use serde::de::DeserializeOwned;

/// Where a selected value lives in a returned document
#[derive(Debug, Clone, PartialEq)]
pub enum ResultShape {
    /// The returned document itself
    Identity,
    /// Stored field copied by a find projection; arrays along the path are
    /// mapped over the same way the server applies dotted inclusions
    Field { path: Vec<String> },
    /// Output member computed by the server
    Computed { path: Vec<String> },
    /// The group key (`_id`) or one of its members
    Key { path: Vec<String> },
    /// Object assembled from named members
    Object(Vec<(String, ResultShape)>),
}

impl ResultShape {
    pub fn computed(element: impl Into<String>) -> Self {
        ResultShape::Computed {
            path: vec![element.into()],
        }
    }

    /// True when the shape needs the whole document anywhere in its tree
    pub fn contains_identity(&self) -> bool {
        match self {
            ResultShape::Identity => true,
            ResultShape::Object(members) => members.iter().any(|(_, m)| m.contains_identity()),
            _ => false,
        }
    }

    fn extract(&self, document: &Document) -> Result<Bson> {
        match self {
            ResultShape::Identity => Ok(Bson::Document(document.clone())),
            ResultShape::Field { path } => lookup(document, path, true),
            ResultShape::Computed { path } => lookup(document, path, false),
            ResultShape::Key { path } => match document.get("_id") {
                Some(Bson::Document(key)) => lookup(key, path, false),
                Some(key) if path.is_empty() => Ok(key.clone()),
                Some(key) => Err(TranslationError::Deserialization(format!(
                    "group key {} has no member {}",
                    key,
                    path.join(".")
                ))),
                None => Ok(Bson::Null),
            },
            ResultShape::Object(members) => {
                let mut object = Document::new();
                for (name, member) in members {
                    object.insert(name.clone(), member.extract(document)?);
                }
                Ok(Bson::Document(object))
            }
        }
    }
}

/// Reads `path` from `document`. Missing members read as null.
fn lookup(document: &Document, path: &[String], map_arrays: bool) -> Result<Bson> {
    let Some((head, rest)) = path.split_first() else {
        return Ok(Bson::Document(document.clone()));
    };
    match document.get(head) {
        None | Some(Bson::Null) => Ok(Bson::Null),
        Some(value) if rest.is_empty() => Ok(value.clone()),
        Some(Bson::Document(nested)) => lookup(nested, rest, map_arrays),
        Some(Bson::Array(items)) if map_arrays => items
            .iter()
            .map(|item| match item {
                Bson::Document(nested) => lookup(nested, rest, map_arrays),
                other => Err(not_a_document(head, other)),
            })
            .collect::<Result<Vec<_>>>()
            .map(Bson::Array),
        Some(other) => Err(not_a_document(head, other)),
    }
}

fn not_a_document(element: &str, value: &Bson) -> TranslationError {
    TranslationError::Deserialization(format!(
        "expected a document at '{}', found {:?}",
        element,
        value.element_type()
    ))
}

/// Rebuilds selected values from returned documents
#[derive(Debug, Clone, PartialEq)]
pub struct ResultDeserializer {
    shape: ResultShape,
}

impl ResultDeserializer {
    pub fn new(shape: ResultShape) -> Self {
        Self { shape }
    }

    pub fn shape(&self) -> &ResultShape {
        &self.shape
    }

    /// Rearranges a returned document into the selected value
    pub fn reshape(&self, document: &Document) -> Result<Bson> {
        self.shape.extract(document)
    }

    /// Rearranges a returned document and decodes it into `T`
    pub fn deserialize<T: DeserializeOwned>(&self, document: &Document) -> Result<T> {
        let value = self.reshape(document)?;
        Ok(bson::from_bson(value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use serde::Deserialize;

    fn path(p: &str) -> Vec<String> {
        p.split('.').map(str::to_string).collect()
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct KeyCount {
        #[serde(rename = "Id")]
        id: String,
        #[serde(rename = "Count")]
        count: i32,
    }

    #[test]
    fn test_group_key_is_renamed() {
        let deserializer = ResultDeserializer::new(ResultShape::Object(vec![
            ("Id".to_string(), ResultShape::Key { path: vec![] }),
            ("Count".to_string(), ResultShape::computed("Count")),
        ]));
        let row: KeyCount = deserializer
            .deserialize(&doc! { "_id": "a", "Count": 3 })
            .unwrap();
        assert_eq!(
            row,
            KeyCount {
                id: "a".to_string(),
                count: 3
            }
        );
    }

    #[test]
    fn test_composite_key_is_expanded() {
        let deserializer = ResultDeserializer::new(ResultShape::Object(vec![
            ("X".to_string(), ResultShape::Key { path: path("X") }),
            ("Y".to_string(), ResultShape::Key { path: path("Y") }),
        ]));
        let value = deserializer
            .reshape(&doc! { "_id": { "X": 1, "Y": "b" } })
            .unwrap();
        assert_eq!(value, Bson::Document(doc! { "X": 1, "Y": "b" }));
    }

    #[test]
    fn test_scalar_value_is_unwrapped() {
        let deserializer = ResultDeserializer::new(ResultShape::computed("value"));
        let n: i64 = deserializer.deserialize(&doc! { "value": 7_i64 }).unwrap();
        assert_eq!(n, 7);
    }

    #[test]
    fn test_field_paths_map_over_arrays() {
        let deserializer = ResultDeserializer::new(ResultShape::Object(vec![
            ("F".to_string(), ResultShape::Field { path: path("G.E.F") }),
            ("A".to_string(), ResultShape::Field { path: path("A") }),
        ]));
        let returned = doc! { "A": "a", "G": [{ "E": { "F": 1 } }, { "E": { "F": 2 } }] };
        assert_eq!(
            deserializer.reshape(&returned).unwrap(),
            Bson::Document(doc! { "F": [1, 2], "A": "a" })
        );
    }

    #[test]
    fn test_missing_members_read_as_null() {
        let deserializer = ResultDeserializer::new(ResultShape::Field { path: path("C.D") });
        assert_eq!(deserializer.reshape(&doc! {}).unwrap(), Bson::Null);
    }

    #[test]
    fn test_scalar_in_the_middle_of_a_path_is_an_error() {
        let deserializer = ResultDeserializer::new(ResultShape::Field { path: path("A.B") });
        let err = deserializer.reshape(&doc! { "A": 1 }).unwrap_err();
        assert!(matches!(err, TranslationError::Deserialization(_)));
    }

    #[test]
    fn test_type_mismatch_is_a_deserialization_error() {
        let deserializer = ResultDeserializer::new(ResultShape::computed("value"));
        let err = deserializer
            .deserialize::<i32>(&doc! { "value": "text" })
            .unwrap_err();
        assert!(matches!(err, TranslationError::Deserialization(_)));
    }

    #[test]
    fn test_identity_detection() {
        let shape = ResultShape::Object(vec![
            ("A".to_string(), ResultShape::Field { path: path("A") }),
            ("Self".to_string(), ResultShape::Identity),
        ]);
        assert!(shape.contains_identity());
        assert!(!ResultShape::computed("value").contains_identity());
    }
}
