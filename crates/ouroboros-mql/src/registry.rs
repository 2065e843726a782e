//! Serializer registry
//!
//! Maps host document types to stored element names and value codecs. The
//! registry is built once, then shared read-only by every translation (it is
//! `Send + Sync`, so an `Arc<SerializerRegistry>` can serve concurrent callers).
//!
//! Value coercion between host types goes through explicitly registered
//! converters keyed by `(source type, target type)`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bson::{oid::ObjectId, Bson, Document as BsonDocument};
use ouroboros_common::{Result, TranslationError};

use crate::types::{Representation, ValueType};

/// Conversion function applied to a literal before it is embedded in a query
pub type Converter = Arc<dyn Fn(&Bson) -> Option<Bson> + Send + Sync>;

/// Default discriminator element name
pub const DEFAULT_DISCRIMINATOR_ELEMENT: &str = "_t";

/// Stored layout of a single member
#[derive(Debug, Clone, PartialEq)]
pub struct MemberMap {
    pub member_name: String,
    pub element_name: String,
    pub value_type: ValueType,
    pub representation: Representation,
}

impl MemberMap {
    pub fn new(member_name: impl Into<String>, value_type: ValueType) -> Self {
        let member_name = member_name.into();
        Self {
            element_name: member_name.clone(),
            member_name,
            value_type,
            representation: Representation::Default,
        }
    }

    /// Store the member under a different element name
    pub fn element(mut self, element_name: impl Into<String>) -> Self {
        self.element_name = element_name.into();
        self
    }

    /// Override the stored representation
    pub fn representation(mut self, representation: Representation) -> Self {
        self.representation = representation;
        self
    }
}

/// Stored layout of a document type
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentMap {
    pub name: String,
    pub base: Option<String>,
    pub discriminator: Option<String>,
    pub discriminator_element: Option<String>,
    pub members: Vec<MemberMap>,
}

impl DocumentMap {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base: None,
            discriminator: None,
            discriminator_element: None,
            members: Vec::new(),
        }
    }

    /// Declare the base type; members of the base are inherited
    pub fn base(mut self, base: impl Into<String>) -> Self {
        self.base = Some(base.into());
        self
    }

    /// Discriminator value stored for this type (defaults to the type name)
    pub fn discriminator(mut self, value: impl Into<String>) -> Self {
        self.discriminator = Some(value.into());
        self
    }

    /// Discriminator element name for this hierarchy
    pub fn discriminator_element(mut self, element: impl Into<String>) -> Self {
        self.discriminator_element = Some(element.into());
        self
    }

    /// Identifier member `Id`, stored as `_id`
    pub fn id(self, value_type: ValueType) -> Self {
        self.member_map(MemberMap::new("Id", value_type).element("_id"))
    }

    pub fn member(self, member_name: impl Into<String>, value_type: ValueType) -> Self {
        self.member_map(MemberMap::new(member_name, value_type))
    }

    pub fn member_map(mut self, member: MemberMap) -> Self {
        self.members.push(member);
        self
    }
}

/// Named enum with its numeric values
#[derive(Debug, Clone, PartialEq)]
pub struct EnumMap {
    pub name: String,
    pub variants: Vec<(String, i64)>,
}

impl EnumMap {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            variants: Vec::new(),
        }
    }

    pub fn variant(mut self, name: impl Into<String>, value: i64) -> Self {
        self.variants.push((name.into(), value));
        self
    }

    pub fn value_of(&self, name: &str) -> Option<i64> {
        self.variants
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }

    pub fn name_of(&self, value: i64) -> Option<&str> {
        self.variants
            .iter()
            .find(|(_, v)| *v == value)
            .map(|(n, _)| n.as_str())
    }
}

/// Registry of document maps, enum maps and value converters
#[derive(Clone)]
pub struct SerializerRegistry {
    documents: HashMap<String, DocumentMap>,
    enums: HashMap<String, EnumMap>,
    converters: HashMap<(ValueType, ValueType), Converter>,
}

impl fmt::Debug for SerializerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerializerRegistry")
            .field("documents", &self.documents.keys().collect::<Vec<_>>())
            .field("enums", &self.enums.keys().collect::<Vec<_>>())
            .field("converters", &self.converters.len())
            .finish()
    }
}

impl Default for SerializerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SerializerRegistry {
    /// Creates a registry with the built-in converters
    pub fn new() -> Self {
        Self::empty()
            .converter(ValueType::Int32, ValueType::Int64, |v| {
                v.as_i32().map(|n| Bson::Int64(n as i64))
            })
            .converter(ValueType::Int32, ValueType::Double, |v| {
                v.as_i32().map(|n| Bson::Double(n as f64))
            })
            .converter(ValueType::Int64, ValueType::Double, |v| {
                v.as_i64().map(|n| Bson::Double(n as f64))
            })
            .converter(ValueType::Int64, ValueType::Int32, |v| {
                v.as_i64()
                    .and_then(|n| i32::try_from(n).ok())
                    .map(Bson::Int32)
            })
            .converter(ValueType::Char, ValueType::String, |v| Some(v.clone()))
            .converter(ValueType::String, ValueType::ObjectId, |v| {
                v.as_str()
                    .and_then(|s| ObjectId::parse_str(s).ok())
                    .map(Bson::ObjectId)
            })
    }

    /// Creates a registry without any converters
    pub fn empty() -> Self {
        Self {
            documents: HashMap::new(),
            enums: HashMap::new(),
            converters: HashMap::new(),
        }
    }

    pub fn register(mut self, map: DocumentMap) -> Self {
        self.documents.insert(map.name.clone(), map);
        self
    }

    pub fn register_enum(mut self, map: EnumMap) -> Self {
        self.enums.insert(map.name.clone(), map);
        self
    }

    /// Registers a conversion applied to literals of type `from` compared against `to`
    pub fn converter<F>(mut self, from: ValueType, to: ValueType, convert: F) -> Self
    where
        F: Fn(&Bson) -> Option<Bson> + Send + Sync + 'static,
    {
        self.converters.insert((from, to), Arc::new(convert));
        self
    }

    pub fn document(&self, name: &str) -> Option<&DocumentMap> {
        self.documents.get(name)
    }

    pub fn enumeration(&self, name: &str) -> Option<&EnumMap> {
        self.enums.get(name)
    }

    /// Looks up a member on a document type, walking its base types
    pub fn member(&self, type_name: &str, member_name: &str) -> Option<&MemberMap> {
        let mut current = self.documents.get(type_name);
        while let Some(map) = current {
            if let Some(member) = map.members.iter().find(|m| m.member_name == member_name) {
                return Some(member);
            }
            current = map.base.as_deref().and_then(|b| self.documents.get(b));
        }
        None
    }

    /// True when `actual` is `nominal` or derives from it
    pub fn is_assignable(&self, nominal: &str, actual: &str) -> bool {
        let mut current = Some(actual);
        while let Some(name) = current {
            if name == nominal {
                return true;
            }
            current = self.documents.get(name).and_then(|m| m.base.as_deref());
        }
        false
    }

    /// Discriminator element name for a type hierarchy
    pub fn discriminator_element(&self, type_name: &str, default: &str) -> String {
        let mut current = self.documents.get(type_name);
        while let Some(map) = current {
            if let Some(element) = &map.discriminator_element {
                return element.clone();
            }
            current = map.base.as_deref().and_then(|b| self.documents.get(b));
        }
        default.to_string()
    }

    /// Discriminator value identifying `actual` among values of `nominal`.
    ///
    /// Returns `None` when every value of the nominal type qualifies.
    pub fn discriminator(&self, nominal: &str, actual: &str) -> Result<Option<Bson>> {
        if nominal == actual {
            return Ok(None);
        }
        if !self.is_assignable(nominal, actual) {
            return Err(TranslationError::unsupported(format!(
                "{} does not derive from {}",
                actual, nominal
            )));
        }
        let value = self
            .documents
            .get(actual)
            .and_then(|m| m.discriminator.clone())
            .unwrap_or_else(|| actual.to_string());
        Ok(Some(Bson::String(value)))
    }

    /// Converts a literal of type `from` so it can be compared against a value of type `to`.
    ///
    /// Without a registered converter the literal is returned unchanged.
    pub fn coerce(&self, value: &Bson, from: &ValueType, to: &ValueType) -> Bson {
        let (from_u, to_u) = (from.underlying(), to.underlying());
        if matches!(value, Bson::Null) || from_u == to_u || *from_u == ValueType::Any || *to_u == ValueType::Any {
            return value.clone();
        }
        match (from_u, to_u) {
            (ValueType::Int32 | ValueType::Int64 | ValueType::String, ValueType::Enum(_)) => {
                return value.clone()
            }
            (ValueType::Array(from_item), ValueType::Array(to_item)) => {
                if let Bson::Array(items) = value {
                    return Bson::Array(
                        items
                            .iter()
                            .map(|item| self.coerce(item, from_item, to_item))
                            .collect(),
                    );
                }
            }
            _ => {}
        }
        match self.converters.get(&(from_u.clone(), to_u.clone())) {
            Some(convert) => match convert(value) {
                Some(converted) => converted,
                None => {
                    tracing::warn!(from = %from_u, to = %to_u, "converter rejected literal, embedding it unchanged");
                    value.clone()
                }
            },
            None => {
                tracing::warn!(from = %from_u, to = %to_u, "no converter registered, embedding literal unchanged");
                value.clone()
            }
        }
    }

    /// Serializes a host literal the way a member of type `value_type` stores it
    pub fn serialize_value(
        &self,
        value: &Bson,
        value_type: &ValueType,
        representation: Representation,
    ) -> Result<Bson> {
        if matches!(value, Bson::Null) {
            return Ok(Bson::Null);
        }
        match value_type {
            ValueType::Nullable(inner) => self.serialize_value(value, inner, representation),
            ValueType::Enum(name) => self.serialize_enum(value, name, representation),
            ValueType::Document(name) => match value {
                Bson::Document(fields) => Ok(Bson::Document(self.serialize_document(fields, name)?)),
                other => Ok(other.clone()),
            },
            ValueType::Array(item) => match value {
                Bson::Array(items) => items
                    .iter()
                    .map(|v| self.serialize_value(v, item, representation))
                    .collect::<Result<Vec<_>>>()
                    .map(Bson::Array),
                other => self.serialize_value(other, item, representation),
            },
            ValueType::Dictionary { value: item, .. } => match value {
                Bson::Document(entries) => {
                    let mut out = BsonDocument::new();
                    for (k, v) in entries {
                        out.insert(k.clone(), self.serialize_value(v, item, representation)?);
                    }
                    Ok(Bson::Document(out))
                }
                other => Ok(other.clone()),
            },
            _ => apply_representation(value, representation),
        }
    }

    fn serialize_document(&self, fields: &BsonDocument, type_name: &str) -> Result<BsonDocument> {
        let mut out = BsonDocument::new();
        for (name, value) in fields {
            match self.member(type_name, name) {
                Some(member) => {
                    let serialized =
                        self.serialize_value(value, &member.value_type, member.representation)?;
                    out.insert(member.element_name.clone(), serialized);
                }
                None => {
                    out.insert(name.clone(), value.clone());
                }
            }
        }
        Ok(out)
    }

    fn serialize_enum(&self, value: &Bson, name: &str, representation: Representation) -> Result<Bson> {
        let map = self.enums.get(name);
        let number = match value {
            Bson::Int32(n) => *n as i64,
            Bson::Int64(n) => *n,
            Bson::String(s) => map.and_then(|m| m.value_of(s)).ok_or_else(|| {
                TranslationError::unsupported(format!("'{}' is not a value of enum {}", s, name))
            })?,
            other => {
                return Err(TranslationError::unsupported(format!(
                    "{} is not a value of enum {}",
                    other, name
                )))
            }
        };
        Ok(match representation {
            Representation::String => match map.and_then(|m| m.name_of(number)) {
                Some(variant) => Bson::String(variant.to_string()),
                None => Bson::String(number.to_string()),
            },
            Representation::Int64 => Bson::Int64(number),
            _ => match i32::try_from(number) {
                Ok(n) => Bson::Int32(n),
                Err(_) => Bson::Int64(number),
            },
        })
    }
}

fn apply_representation(value: &Bson, representation: Representation) -> Result<Bson> {
    Ok(match (representation, value) {
        (Representation::Default, v) => v.clone(),
        (Representation::String, Bson::String(s)) => Bson::String(s.clone()),
        (Representation::String, Bson::ObjectId(oid)) => Bson::String(oid.to_hex()),
        (Representation::String, Bson::Int32(n)) => Bson::String(n.to_string()),
        (Representation::String, Bson::Int64(n)) => Bson::String(n.to_string()),
        (Representation::String, Bson::Double(n)) => Bson::String(n.to_string()),
        (Representation::Int64, Bson::Int32(n)) => Bson::Int64(*n as i64),
        (Representation::Int32, Bson::Int64(n)) => i32::try_from(*n)
            .map(Bson::Int32)
            .map_err(|_| TranslationError::unsupported(format!("{} does not fit in Int32", n)))?,
        (Representation::ObjectId, Bson::String(s)) => ObjectId::parse_str(s)
            .map(Bson::ObjectId)
            .map_err(|_| TranslationError::unsupported(format!("'{}' is not a valid ObjectId", s)))?,
        (_, v) => v.clone(),
    })
}
