//! Document model shared by the unit tests

use crate::expr::{Expr, Param};
use crate::registry::{DocumentMap, EnumMap, MemberMap, SerializerRegistry};
use crate::types::{DictionaryRepresentation, Representation, ValueType};

pub fn registry() -> SerializerRegistry {
    SerializerRegistry::new()
        .register_enum(
            EnumMap::new("Level")
                .variant("Low", 1)
                .variant("Medium", 2)
                .variant("High", 3),
        )
        .register_enum(
            EnumMap::new("Access")
                .variant("None", 0)
                .variant("Read", 1)
                .variant("Write", 2)
                .variant("Admin", 4),
        )
        .register(
            DocumentMap::new("Root")
                .id(ValueType::Int32)
                .member("A", ValueType::String)
                .member("B", ValueType::String)
                .member("C", ValueType::document("C"))
                .member("Level", ValueType::enumeration("Level"))
                .member_map(
                    MemberMap::new("LevelName", ValueType::enumeration("Level"))
                        .representation(Representation::String),
                )
                .member("Access", ValueType::enumeration("Access"))
                .member("G", ValueType::array(ValueType::document("C")))
                .member("J", ValueType::DateTime)
                .member("K", ValueType::Boolean)
                .member("L", ValueType::array(ValueType::Int32))
                .member("M", ValueType::array(ValueType::Int32))
                .member("O", ValueType::array(ValueType::Int64))
                .member("P", ValueType::Int32)
                .member("Q", ValueType::nullable(ValueType::Int32))
                .member("R", ValueType::nullable(ValueType::DateTime))
                .member(
                    "T",
                    ValueType::dictionary(ValueType::Int32, DictionaryRepresentation::Document),
                )
                .member(
                    "U",
                    ValueType::dictionary(ValueType::Int32, DictionaryRepresentation::ArrayOfDocuments),
                )
                .member("Y", ValueType::Double)
                .member_map(MemberMap::new("Z", ValueType::Int64).element("z"))
                .member("Children", ValueType::array(ValueType::document("Child"))),
        )
        .register(
            DocumentMap::new("C")
                .member("D", ValueType::String)
                .member("E", ValueType::document("E"))
                .member("S", ValueType::array(ValueType::document("C")))
                .member("X", ValueType::array(ValueType::document("V"))),
        )
        .register(
            DocumentMap::new("E")
                .member("F", ValueType::Int32)
                .member("H", ValueType::Int32)
                .member("I", ValueType::array(ValueType::String)),
        )
        .register(DocumentMap::new("V").base("C").member("W", ValueType::String))
        .register(DocumentMap::new("Child").member("A", ValueType::String))
        .register(
            DocumentMap::new("OtherChild")
                .base("Child")
                .discriminator("Other")
                .member("N", ValueType::Int32),
        )
}

/// `x`, the root document parameter
pub fn root() -> Param {
    Param::new("x", ValueType::document("Root"))
}

pub fn x() -> Expr {
    Expr::param(&root())
}

/// `x => body`
pub fn predicate(body: Expr) -> Expr {
    Expr::lambda(vec![root()], body)
}

pub fn param(name: &str, type_name: &str) -> Param {
    Param::new(name, ValueType::document(type_name))
}
