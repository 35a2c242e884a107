//! The in-memory signature database.
//!
//! A database is built from one or more JSON documents of the shape
//!
//! ```json
//! { "classes": [ClassDecl, ...], "interfaces": [InterfaceDecl, ...] }
//! ```
//!
//! Declarations of the same class across documents are merged. Once built,
//! a database is immutable.

use std::path::{Path, PathBuf};

use replty_common::Visibility;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Deserialize;
use tracing::{debug, info};

use crate::decl::{ClassDecl, InterfaceDecl, TypeRef};
use crate::error::SigError;
use crate::types::{MethodDef, TypeExpr};

#[derive(Deserialize, Default)]
#[serde(default)]
struct Document {
    classes: Vec<ClassDecl>,
    interfaces: Vec<InterfaceDecl>,
}

/// A declared ancestor together with the substitution that maps its type
/// parameters into the descendant's terms.
#[derive(Debug, Clone)]
pub struct Ancestor {
    pub name: String,
    pub substitution: FxHashMap<String, TypeExpr>,
}

#[derive(Debug, Default, Clone)]
pub struct SignatureDb {
    classes: FxHashMap<String, ClassDecl>,
    interfaces: FxHashMap<String, InterfaceDecl>,
}

impl SignatureDb {
    pub fn new() -> Self {
        SignatureDb::default()
    }

    // ── Building ───────────────────────────────────────────────────────

    pub fn add_class(&mut self, decl: ClassDecl) {
        match self.classes.get_mut(&decl.name) {
            Some(existing) => existing.merge(decl),
            None => {
                self.classes.insert(decl.name.clone(), decl);
            }
        }
    }

    pub fn add_interface(&mut self, decl: InterfaceDecl) {
        self.interfaces.insert(decl.name.clone(), decl);
    }

    pub fn from_json_str(json: &str) -> Result<Self, SigError> {
        let mut db = SignatureDb::new();
        db.extend_from_json_str(json, None)?;
        Ok(db)
    }

    /// Parse one document and merge it in. `path` is only used for error
    /// reporting.
    pub fn extend_from_json_str(&mut self, json: &str, path: Option<&Path>) -> Result<(), SigError> {
        let doc: Document = serde_json::from_str(json).map_err(|e| SigError::Parse {
            path: path.map(Path::to_path_buf),
            message: e.to_string(),
        })?;
        for class in doc.classes {
            self.add_class(class);
        }
        for interface in doc.interfaces {
            self.add_interface(interface);
        }
        Ok(())
    }

    /// Load a single document, or every `*.json` file of a directory in
    /// name order.
    pub fn extend_from_path(&mut self, path: &Path) -> Result<(), SigError> {
        let io_err = |source| SigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if path.is_dir() {
            let mut files: Vec<PathBuf> = std::fs::read_dir(path)
                .map_err(io_err)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
                .collect();
            files.sort();
            for file in files {
                self.extend_from_path(&file)?;
            }
            return Ok(());
        }
        let content = std::fs::read_to_string(path).map_err(io_err)?;
        debug!(path = %path.display(), "parsing signature document");
        self.extend_from_json_str(&content, Some(path))
    }

    pub fn from_path(path: &Path) -> Result<Self, SigError> {
        Self::load(&[path.to_path_buf()])
    }

    /// Build a database from several files or directories. The first
    /// failure aborts the load.
    pub fn load(paths: &[PathBuf]) -> Result<Self, SigError> {
        let mut db = SignatureDb::new();
        for path in paths {
            db.extend_from_path(path)?;
        }
        info!(
            classes = db.classes.len(),
            interfaces = db.interfaces.len(),
            "signature database built"
        );
        Ok(db)
    }

    // ── Queries ────────────────────────────────────────────────────────

    pub fn class(&self, name: &str) -> Option<&ClassDecl> {
        self.classes.get(name)
    }

    pub fn interface(&self, name: &str) -> Option<&InterfaceDecl> {
        self.interfaces.get(name)
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    /// Declared generic parameter names of a class, module or interface.
    pub fn type_params(&self, name: &str) -> &[String] {
        if let Some(class) = self.classes.get(name) {
            &class.type_params
        } else if let Some(interface) = self.interfaces.get(name) {
            &interface.type_params
        } else {
            &[]
        }
    }

    /// Declared ancestors of `name`, most specific first: the class itself,
    /// its includes (last included first), then the superclass chain.
    pub fn ancestors(&self, name: &str) -> Vec<Ancestor> {
        let mut out = Vec::new();
        let mut seen = FxHashSet::default();
        self.collect_ancestors(&TypeRef::named(name), &FxHashMap::default(), &mut out, &mut seen);
        out
    }

    fn collect_ancestors(
        &self,
        reference: &TypeRef,
        outer: &FxHashMap<String, TypeExpr>,
        out: &mut Vec<Ancestor>,
        seen: &mut FxHashSet<String>,
    ) {
        let Some(decl) = self.classes.get(&reference.name) else {
            return;
        };
        if !seen.insert(decl.name.clone()) {
            return;
        }
        let substitution: FxHashMap<String, TypeExpr> = decl
            .type_params
            .iter()
            .zip(&reference.args)
            .map(|(param, arg)| (param.clone(), arg.substitute(outer)))
            .collect();
        out.push(Ancestor {
            name: decl.name.clone(),
            substitution: substitution.clone(),
        });
        for include in decl.includes.iter().rev() {
            self.collect_ancestors(include, &substitution, out, seen);
        }
        if let Some(superclass) = &decl.superclass {
            self.collect_ancestors(superclass, &substitution, out, seen);
        }
    }

    /// Find method `name` on `type_name`. Instance lookups walk the declared
    /// ancestors and express the result in `type_name`'s own generic
    /// parameters; singleton lookups walk the superclass chain.
    pub fn lookup(&self, type_name: &str, method: &str, singleton: bool) -> Option<MethodDef> {
        if singleton {
            return self
                .superclass_chain(type_name)
                .into_iter()
                .find_map(|decl| decl.singleton_methods.get(method).cloned());
        }
        self.ancestors(type_name).into_iter().find_map(|ancestor| {
            let decl = self.classes.get(&ancestor.name)?;
            let def = decl.instance_methods.get(method)?;
            Some(def.substitute(&ancestor.substitution))
        })
    }

    /// All method names visible on `type_name`, with the visibility of the
    /// most specific definition.
    pub fn methods(&self, type_name: &str, singleton: bool) -> Vec<(String, Visibility)> {
        let mut seen = FxHashSet::default();
        let mut out = Vec::new();
        let mut visit = |table: &std::collections::BTreeMap<String, MethodDef>| {
            for (name, def) in table {
                if seen.insert(name.clone()) {
                    out.push((name.clone(), def.visibility));
                }
            }
        };
        if singleton {
            for decl in self.superclass_chain(type_name) {
                visit(&decl.singleton_methods);
            }
        } else {
            for ancestor in self.ancestors(type_name) {
                if let Some(decl) = self.classes.get(&ancestor.name) {
                    visit(&decl.instance_methods);
                }
            }
        }
        out.sort();
        out
    }

    fn superclass_chain(&self, name: &str) -> Vec<&ClassDecl> {
        let mut chain = Vec::new();
        let mut seen = FxHashSet::default();
        let mut current = self.classes.get(name);
        while let Some(decl) = current {
            if !seen.insert(decl.name.as_str()) {
                break;
            }
            chain.push(decl);
            current = decl
                .superclass
                .as_ref()
                .and_then(|s| self.classes.get(&s.name));
        }
        chain
    }
}
