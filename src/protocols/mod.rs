//! The protocols bundled with the crate.
//!
//! Each submodule defines one protocol as a [`crate::protocol::Performative`]
//! enum plus its roles and, where needed, its custom payload types. They
//! double as worked examples for defining protocols out of tree: a protocol
//! is just an enum implementing the trait, no registration step involved.

pub mod default;
pub mod http;
pub mod signing;
