//! Classes and modules of the live object model.
//!
//! A [`Module`] is a cheap handle (`Arc`) to shared module data. Identity is
//! pointer identity: two handles are equal iff they refer to the same
//! module, regardless of name.
//!
//! ## Lock Design
//!
//! All mutable tables of a module sit behind a single `RwLock` so readers
//! always see a consistent method/constant view. Readers never hold the lock
//! across calls into other modules.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use parking_lot::RwLock;
use replty_common::Visibility;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::object::Object;

// ---------------------------------------------------------------------------
// ModuleData
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Tables {
    includes: Vec<Module>,
    instance_methods: FxHashMap<String, Visibility>,
    singleton_methods: FxHashMap<String, Visibility>,
    constants: FxHashMap<String, Object>,
    class_variables: FxHashMap<String, Object>,
    instance_variables: FxHashMap<String, Object>,
}

struct ModuleData {
    name: Option<String>,
    /// `Some` for classes. The superclass of `BasicObject` is `None`.
    class: Option<Option<Module>>,
    tables: RwLock<Tables>,
}

// ---------------------------------------------------------------------------
// Module
// ---------------------------------------------------------------------------

/// A class or module value.
#[derive(Clone)]
pub struct Module(Arc<ModuleData>);

impl Module {
    fn with(name: Option<&str>, class: Option<Option<Module>>) -> Self {
        Module(Arc::new(ModuleData {
            name: name.map(str::to_string),
            class,
            tables: RwLock::new(Tables::default()),
        }))
    }

    /// Create a class. `name` is `None` for anonymous classes.
    pub fn new_class(name: Option<&str>, superclass: Option<&Module>) -> Self {
        Module::with(name, Some(superclass.cloned()))
    }

    /// Create a (non-class) module.
    pub fn new_module(name: Option<&str>) -> Self {
        Module::with(name, None)
    }

    pub fn name(&self) -> Option<&str> {
        self.0.name.as_deref()
    }

    pub fn is_class(&self) -> bool {
        self.0.class.is_some()
    }

    pub fn superclass(&self) -> Option<Module> {
        self.0.class.as_ref().and_then(|s| s.clone())
    }

    /// Pointer identity, usable as a hash key.
    pub fn id(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    pub fn ptr_eq(&self, other: &Module) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    // ── Mutation (used while building a snapshot) ──────────────────────

    pub fn include(&self, module: &Module) {
        let mut tables = self.0.tables.write();
        if !tables.includes.iter().any(|m| m.ptr_eq(module)) {
            tables.includes.push(module.clone());
        }
    }

    pub fn define_method(&self, name: &str, visibility: Visibility) {
        self.0
            .tables
            .write()
            .instance_methods
            .insert(name.to_string(), visibility);
    }

    pub fn define_methods(&self, names: &[&str], visibility: Visibility) {
        let mut tables = self.0.tables.write();
        for name in names {
            tables.instance_methods.insert(name.to_string(), visibility);
        }
    }

    pub fn define_singleton_method(&self, name: &str, visibility: Visibility) {
        self.0
            .tables
            .write()
            .singleton_methods
            .insert(name.to_string(), visibility);
    }

    pub fn set_const(&self, name: &str, value: Object) {
        self.0
            .tables
            .write()
            .constants
            .insert(name.to_string(), value);
    }

    pub fn set_class_variable(&self, name: &str, value: Object) {
        self.0
            .tables
            .write()
            .class_variables
            .insert(name.to_string(), value);
    }

    pub fn set_instance_variable(&self, name: &str, value: Object) {
        self.0
            .tables
            .write()
            .instance_variables
            .insert(name.to_string(), value);
    }

    // ── Reads ──────────────────────────────────────────────────────────

    /// Method resolution order: self, included modules (newest first, each
    /// with its own ancestors), then the superclass chain. Duplicates keep
    /// their first position.
    pub fn ancestors(&self) -> Vec<Module> {
        let mut out = Vec::new();
        let mut seen = FxHashSet::default();
        self.collect_ancestors(&mut out, &mut seen);
        out
    }

    fn collect_ancestors(&self, out: &mut Vec<Module>, seen: &mut FxHashSet<usize>) {
        if seen.insert(self.id()) {
            out.push(self.clone());
        }
        let includes = self.0.tables.read().includes.clone();
        for module in includes.iter().rev() {
            module.collect_ancestors(out, seen);
        }
        if let Some(superclass) = self.superclass() {
            superclass.collect_ancestors(out, seen);
        }
    }

    /// Whether `other` appears in this module's ancestors.
    pub fn inherits(&self, other: &Module) -> bool {
        self.ancestors().iter().any(|m| m.ptr_eq(other))
    }

    /// Visibility of instance method `name` as seen from an instance, found
    /// at the first ancestor defining it.
    pub fn instance_method_visibility(&self, name: &str) -> Option<Visibility> {
        self.ancestors()
            .iter()
            .find_map(|m| m.0.tables.read().instance_methods.get(name).copied())
    }

    /// Public and protected instance methods, including inherited ones.
    pub fn instance_methods(&self) -> Vec<String> {
        self.collect_methods(Table::Instance, |v| !v.is_private())
    }

    pub fn private_instance_methods(&self) -> Vec<String> {
        self.collect_methods(Table::Instance, Visibility::is_private)
    }

    /// Singleton methods defined on this module and, for classes, on its
    /// superclasses.
    pub fn singleton_methods(&self) -> Vec<String> {
        self.collect_methods(Table::Singleton, |v| !v.is_private())
    }

    pub fn private_singleton_methods(&self) -> Vec<String> {
        self.collect_methods(Table::Singleton, Visibility::is_private)
    }

    fn own_methods(&self, table: Table) -> Vec<(String, Visibility)> {
        let tables = self.0.tables.read();
        let map = match table {
            Table::Instance => &tables.instance_methods,
            Table::Singleton => &tables.singleton_methods,
        };
        sorted(map.iter().map(|(k, v)| (k.clone(), *v)))
    }

    /// Methods defined directly on this module (not inherited).
    pub fn own_instance_methods(&self) -> Vec<(String, Visibility)> {
        self.own_methods(Table::Instance)
    }

    /// The first definition of a name along the chain decides its visibility.
    fn collect_methods(&self, table: Table, keep: impl Fn(Visibility) -> bool) -> Vec<String> {
        let chain = match table {
            Table::Instance => self.ancestors(),
            Table::Singleton => self.superclass_chain(),
        };
        let mut seen: FxHashSet<String> = FxHashSet::default();
        let mut out = Vec::new();
        for module in chain {
            for (name, visibility) in module.own_methods(table) {
                if seen.insert(name.clone()) && keep(visibility) {
                    out.push(name);
                }
            }
        }
        out.sort();
        out
    }

    fn superclass_chain(&self) -> Vec<Module> {
        let mut chain = vec![self.clone()];
        let mut current = self.superclass();
        while let Some(module) = current {
            current = module.superclass();
            chain.push(module);
        }
        chain
    }

    pub fn const_get(&self, name: &str) -> Option<Object> {
        self.0.tables.read().constants.get(name).cloned()
    }

    pub fn constants(&self) -> Vec<String> {
        let mut names: Vec<String> = self.0.tables.read().constants.keys().cloned().collect();
        names.sort();
        names
    }

    /// Class variable lookup through the ancestor chain.
    pub fn class_variable_get(&self, name: &str) -> Option<Object> {
        self.ancestors()
            .iter()
            .find_map(|m| m.0.tables.read().class_variables.get(name).cloned())
    }

    pub fn class_variables(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for module in self.ancestors() {
            for name in module.0.tables.read().class_variables.keys() {
                if !names.contains(name) {
                    names.push(name.clone());
                }
            }
        }
        names.sort();
        names
    }

    pub fn instance_variable_get(&self, name: &str) -> Option<Object> {
        self.0.tables.read().instance_variables.get(name).cloned()
    }

    pub fn instance_variables(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .0
            .tables
            .read()
            .instance_variables
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

#[derive(Clone, Copy)]
enum Table {
    Instance,
    Singleton,
}

fn sorted(items: impl Iterator<Item = (String, Visibility)>) -> Vec<(String, Visibility)> {
    let mut v: Vec<_> = items.collect();
    v.sort_by(|a, b| a.0.cmp(&b.0));
    v
}

impl PartialEq for Module {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Module {}

impl Hash for Module {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name}"),
            None if self.is_class() => write!(f, "#<Class:{:#x}>", self.id()),
            None => write!(f, "#<Module:{:#x}>", self.id()),
        }
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Module({self})")
    }
}
