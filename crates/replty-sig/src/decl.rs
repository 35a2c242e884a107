//! Class, module and interface declarations.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{MethodDef, TypeExpr};

/// A reference to a declared type with its type arguments, as written in
/// `superclass` and `include` clauses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeRef {
    pub name: String,
    #[serde(default)]
    pub args: Vec<TypeExpr>,
}

impl TypeRef {
    pub fn named(name: &str) -> Self {
        TypeRef {
            name: name.to_string(),
            args: Vec::new(),
        }
    }
}

/// A class or module declaration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassDecl {
    pub name: String,
    pub type_params: Vec<String>,
    pub superclass: Option<TypeRef>,
    /// Mixed-in modules, in declaration order.
    pub includes: Vec<TypeRef>,
    pub instance_methods: BTreeMap<String, MethodDef>,
    pub singleton_methods: BTreeMap<String, MethodDef>,
}

impl ClassDecl {
    pub fn new(name: &str) -> Self {
        ClassDecl {
            name: name.to_string(),
            ..ClassDecl::default()
        }
    }

    /// Fold a reopened declaration of the same class into this one. Later
    /// method definitions replace earlier ones.
    pub fn merge(&mut self, other: ClassDecl) {
        if self.type_params.is_empty() {
            self.type_params = other.type_params;
        }
        if self.superclass.is_none() {
            self.superclass = other.superclass;
        }
        for include in other.includes {
            if !self.includes.contains(&include) {
                self.includes.push(include);
            }
        }
        self.instance_methods.extend(other.instance_methods);
        self.singleton_methods.extend(other.singleton_methods);
    }
}

/// An interface (`_Each[Elem]`): a named bundle of method signatures.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterfaceDecl {
    pub name: String,
    pub type_params: Vec<String>,
    pub methods: BTreeMap<String, MethodDef>,
}
