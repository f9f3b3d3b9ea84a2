//! Loom: a small scripting language for server-rendered pages, compiled to Go.

pub mod dsl;
pub mod embed;
pub mod error;
pub mod paths;
pub mod settings;
