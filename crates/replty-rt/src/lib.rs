//! Execution-context snapshot for the replty analyzer.
//!
//! This crate models the live state a REPL session exposes to completion:
//! classes and modules ([`Module`]), objects ([`Object`]), the built-in class
//! table ([`core()`]) and the binding at the cursor ([`Binding`]).
//!
//! Everything here is `Send + Sync`. The analyzer only ever reads; the
//! mutating methods exist so a host (or a test) can build the snapshot.

pub mod binding;
pub mod builtins;
pub mod module;
pub mod object;

pub use crate::binding::Binding;
pub use crate::builtins::{core, Core};
pub use crate::module::Module;
pub use crate::object::{Object, Value};
