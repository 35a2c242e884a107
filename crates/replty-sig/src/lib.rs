//! Method signature database for the replty analyzer.
//!
//! Signatures are declared types of methods: parameter types, block types
//! and return types, possibly generic over the owning class's type
//! parameters. They are loaded from JSON documents, merged into a
//! [`SignatureDb`] and published through a [`SignatureStore`] that tracks
//! the load state and lets readers proceed without a database while a
//! background load runs.

pub mod db;
pub mod decl;
pub mod error;
pub mod store;
pub mod types;

pub use crate::db::{Ancestor, SignatureDb};
pub use crate::decl::{ClassDecl, InterfaceDecl, TypeRef};
pub use crate::error::SigError;
pub use crate::store::{LoadState, SignatureStore};
pub use crate::types::{BlockType, FunctionType, Literal, MethodDef, MethodType, TypeExpr};
