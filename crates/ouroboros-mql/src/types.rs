//! Nominal value types shared by the expression model and the serializer registry.

use std::fmt;

/// How a dictionary member is laid out in the stored document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DictionaryRepresentation {
    /// `{ key: value, ... }`
    #[default]
    Document,
    /// `[ { k: key, v: value }, ... ]`
    ArrayOfDocuments,
}

/// Storage override applied by a member codec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Representation {
    /// Store the natural BSON type of the value
    #[default]
    Default,
    /// Store as a string (enum names, ObjectIds as hex, numbers as text)
    String,
    /// Store as a 32-bit integer
    Int32,
    /// Store as a 64-bit integer
    Int64,
    /// Store a hex string as an ObjectId
    ObjectId,
}

/// Nominal type of a value as seen by the host program
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueType {
    Int32,
    Int64,
    Double,
    Decimal,
    String,
    Char,
    Boolean,
    DateTime,
    ObjectId,
    /// Named enum registered in the serializer registry
    Enum(String),
    /// Named document type registered in the serializer registry
    Document(String),
    /// Any sequence (array, list, set)
    Array(Box<ValueType>),
    /// String-keyed dictionary
    Dictionary {
        value: Box<ValueType>,
        representation: DictionaryRepresentation,
    },
    /// Nullable wrapper around a value type
    Nullable(Box<ValueType>),
    /// Unknown or anonymous shape; member names are used verbatim as element names
    Any,
}

impl ValueType {
    pub fn document(name: impl Into<String>) -> Self {
        ValueType::Document(name.into())
    }

    pub fn enumeration(name: impl Into<String>) -> Self {
        ValueType::Enum(name.into())
    }

    pub fn array(item: ValueType) -> Self {
        ValueType::Array(Box::new(item))
    }

    pub fn nullable(inner: ValueType) -> Self {
        ValueType::Nullable(Box::new(inner))
    }

    pub fn dictionary(value: ValueType, representation: DictionaryRepresentation) -> Self {
        ValueType::Dictionary {
            value: Box::new(value),
            representation,
        }
    }

    /// Strips a `Nullable` wrapper
    pub fn underlying(&self) -> &ValueType {
        match self {
            ValueType::Nullable(inner) => inner.underlying(),
            other => other,
        }
    }

    /// Item type of a sequence
    pub fn item_type(&self) -> Option<&ValueType> {
        match self.underlying() {
            ValueType::Array(item) => Some(item),
            _ => None,
        }
    }

    pub fn is_nullable(&self) -> bool {
        matches!(self, ValueType::Nullable(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self.underlying(), ValueType::Array(_))
    }

    pub fn is_string(&self) -> bool {
        matches!(self.underlying(), ValueType::String)
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self.underlying(), ValueType::Boolean)
    }

    pub fn is_date(&self) -> bool {
        matches!(self.underlying(), ValueType::DateTime)
    }

    pub fn is_dictionary(&self) -> bool {
        matches!(self.underlying(), ValueType::Dictionary { .. })
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self.underlying(),
            ValueType::Int32 | ValueType::Int64 | ValueType::Enum(_)
        )
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self.underlying(),
            ValueType::Int32 | ValueType::Int64 | ValueType::Double | ValueType::Decimal
        )
    }

    /// Result type of arithmetic between two numeric operands
    pub fn promote(&self, other: &ValueType) -> ValueType {
        let rank = |t: &ValueType| match t.underlying() {
            ValueType::Decimal => 4,
            ValueType::Double => 3,
            ValueType::Int64 => 2,
            ValueType::Int32 => 1,
            _ => 0,
        };
        if rank(other) > rank(self) {
            other.underlying().clone()
        } else {
            self.underlying().clone()
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Int32 => write!(f, "Int32"),
            ValueType::Int64 => write!(f, "Int64"),
            ValueType::Double => write!(f, "Double"),
            ValueType::Decimal => write!(f, "Decimal"),
            ValueType::String => write!(f, "String"),
            ValueType::Char => write!(f, "Char"),
            ValueType::Boolean => write!(f, "Boolean"),
            ValueType::DateTime => write!(f, "DateTime"),
            ValueType::ObjectId => write!(f, "ObjectId"),
            ValueType::Enum(name) | ValueType::Document(name) => write!(f, "{}", name),
            ValueType::Array(item) => write!(f, "{}[]", item),
            ValueType::Dictionary { value, .. } => write!(f, "Dictionary<String, {}>", value),
            ValueType::Nullable(inner) => write!(f, "Nullable<{}>", inner),
            ValueType::Any => write!(f, "Object"),
        }
    }
}
