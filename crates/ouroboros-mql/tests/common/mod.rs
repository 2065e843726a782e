//! Shared document model for the integration tests

#![allow(dead_code)]

use ouroboros_mql::{DocumentMap, Expr, Param, SerializerRegistry, Translator, ValueType};

pub fn registry() -> SerializerRegistry {
    SerializerRegistry::new()
        .register(
            DocumentMap::new("Root")
                .id(ValueType::Int32)
                .member("A", ValueType::Int32)
                .member("B", ValueType::Int32)
                .member("Name", ValueType::String)
                .member("Tags", ValueType::array(ValueType::String))
                .member("G", ValueType::array(ValueType::document("C")))
                .member("Created", ValueType::DateTime)
                .member("Active", ValueType::Boolean)
                .member("Score", ValueType::Double),
        )
        .register(
            DocumentMap::new("C")
                .member("D", ValueType::String)
                .member("E", ValueType::Int32),
        )
}

pub fn translator() -> Translator {
    Translator::new(registry())
}

pub fn root() -> Param {
    Param::new("x", ValueType::document("Root"))
}

pub fn x() -> Expr {
    Expr::param(&root())
}

/// `x => body`
pub fn lambda(body: Expr) -> Expr {
    Expr::lambda(vec![root()], body)
}

/// `name => body` over an element of `G`
pub fn element(name: &str, body: impl FnOnce(Expr) -> Expr) -> Expr {
    let p = Param::new(name, ValueType::document("C"));
    let e = Expr::param(&p);
    Expr::lambda(vec![p], body(e))
}

pub fn group_param() -> Param {
    Param::new("g", ValueType::array(ValueType::document("Root")))
}
