//! Live objects.
//!
//! An [`Object`] is either a class/module value or an instance. Instances
//! carry a payload for the built-in value classes (arrays, hashes, ...) plus
//! per-object singleton methods and instance variables. Containers may hold
//! themselves; nothing in this crate traverses them recursively.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use replty_common::Visibility;
use rustc_hash::FxHashMap;

use crate::builtins::core;
use crate::module::Module;

/// Payload of an instance.
pub enum Value {
    Nil,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Symbol(String),
    Array(RwLock<Vec<Object>>),
    Hash(RwLock<Vec<(Object, Object)>>),
    Range(Object, Object),
    /// An instance of a user class with no built-in payload.
    Plain,
}

pub struct Instance {
    class: Module,
    value: Value,
    singleton_methods: RwLock<FxHashMap<String, Visibility>>,
    instance_variables: RwLock<FxHashMap<String, Object>>,
}

#[derive(Clone)]
pub enum Object {
    Module(Module),
    Instance(Arc<Instance>),
}

impl Object {
    pub fn new(class: &Module, value: Value) -> Self {
        Object::Instance(Arc::new(Instance {
            class: class.clone(),
            value,
            singleton_methods: RwLock::new(FxHashMap::default()),
            instance_variables: RwLock::new(FxHashMap::default()),
        }))
    }

    // ── Constructors for built-in values ───────────────────────────────

    pub fn nil() -> Self {
        core().nil.clone()
    }

    pub fn bool(value: bool) -> Self {
        if value {
            core().true_.clone()
        } else {
            core().false_.clone()
        }
    }

    pub fn integer(value: i64) -> Self {
        Object::new(&core().integer, Value::Integer(value))
    }

    pub fn float(value: f64) -> Self {
        Object::new(&core().float, Value::Float(value))
    }

    pub fn string(value: &str) -> Self {
        Object::new(&core().string, Value::String(value.to_string()))
    }

    pub fn symbol(value: &str) -> Self {
        Object::new(&core().symbol, Value::Symbol(value.to_string()))
    }

    pub fn array(items: Vec<Object>) -> Self {
        Object::new(&core().array, Value::Array(RwLock::new(items)))
    }

    pub fn hash(pairs: Vec<(Object, Object)>) -> Self {
        Object::new(&core().hash, Value::Hash(RwLock::new(pairs)))
    }

    pub fn range(first: Object, last: Object) -> Self {
        Object::new(&core().range, Value::Range(first, last))
    }

    /// A plain instance of `class`.
    pub fn instance_of(class: &Module) -> Self {
        Object::new(class, Value::Plain)
    }

    pub fn module(module: &Module) -> Self {
        Object::Module(module.clone())
    }

    // ── Identity ───────────────────────────────────────────────────────

    pub fn id(&self) -> usize {
        match self {
            Object::Module(m) => m.id(),
            Object::Instance(i) => Arc::as_ptr(i) as usize,
        }
    }

    pub fn ptr_eq(&self, other: &Object) -> bool {
        self.id() == other.id()
    }

    // ── Reads ──────────────────────────────────────────────────────────

    /// The object's class. Module values answer `Class` or `Module`.
    pub fn class(&self) -> Module {
        match self {
            Object::Module(m) if m.is_class() => core().class.clone(),
            Object::Module(_) => core().module.clone(),
            Object::Instance(i) => i.class.clone(),
        }
    }

    pub fn as_module(&self) -> Option<&Module> {
        match self {
            Object::Module(m) => Some(m),
            Object::Instance(_) => None,
        }
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            Object::Module(_) => None,
            Object::Instance(i) => Some(&i.value),
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self.value(), Some(Value::Nil))
    }

    /// Snapshot of an array's elements.
    pub fn array_items(&self) -> Option<Vec<Object>> {
        match self.value()? {
            Value::Array(items) => Some(items.read().clone()),
            _ => None,
        }
    }

    /// Snapshot of a hash's entries.
    pub fn hash_pairs(&self) -> Option<Vec<(Object, Object)>> {
        match self.value()? {
            Value::Hash(pairs) => Some(pairs.read().clone()),
            _ => None,
        }
    }

    pub fn range_bounds(&self) -> Option<(Object, Object)> {
        match self.value()? {
            Value::Range(first, last) => Some((first.clone(), last.clone())),
            _ => None,
        }
    }

    /// Append to an array in place. No-op on anything else.
    pub fn push(&self, item: Object) {
        if let Some(Value::Array(items)) = self.value() {
            items.write().push(item);
        }
    }

    /// Add a hash entry in place. No-op on anything else.
    pub fn insert(&self, key: Object, value: Object) {
        if let Some(Value::Hash(pairs)) = self.value() {
            pairs.write().push((key, value));
        }
    }

    pub fn define_singleton_method(&self, name: &str, visibility: Visibility) {
        match self {
            Object::Module(m) => m.define_singleton_method(name, visibility),
            Object::Instance(i) => {
                i.singleton_methods
                    .write()
                    .insert(name.to_string(), visibility);
            }
        }
    }

    /// Public and protected singleton methods of this very object.
    pub fn singleton_methods(&self) -> Vec<String> {
        match self {
            Object::Module(m) => m.singleton_methods(),
            Object::Instance(i) => filtered(&i.singleton_methods.read(), |v| !v.is_private()),
        }
    }

    pub fn private_singleton_methods(&self) -> Vec<String> {
        match self {
            Object::Module(m) => m.private_singleton_methods(),
            Object::Instance(i) => filtered(&i.singleton_methods.read(), Visibility::is_private),
        }
    }

    /// Everything callable with an explicit receiver.
    pub fn methods(&self) -> Vec<String> {
        merged(self.singleton_methods(), self.class().instance_methods())
    }

    pub fn private_methods(&self) -> Vec<String> {
        merged(
            self.private_singleton_methods(),
            self.class().private_instance_methods(),
        )
    }

    pub fn set_instance_variable(&self, name: &str, value: Object) {
        match self {
            Object::Module(m) => m.set_instance_variable(name, value),
            Object::Instance(i) => {
                i.instance_variables.write().insert(name.to_string(), value);
            }
        }
    }

    pub fn instance_variable_get(&self, name: &str) -> Option<Object> {
        match self {
            Object::Module(m) => m.instance_variable_get(name),
            Object::Instance(i) => i.instance_variables.read().get(name).cloned(),
        }
    }

    pub fn instance_variables(&self) -> Vec<String> {
        match self {
            Object::Module(m) => m.instance_variables(),
            Object::Instance(i) => {
                let mut names: Vec<String> = i.instance_variables.read().keys().cloned().collect();
                names.sort();
                names
            }
        }
    }
}

fn filtered(table: &FxHashMap<String, Visibility>, keep: impl Fn(Visibility) -> bool) -> Vec<String> {
    let mut names: Vec<String> = table
        .iter()
        .filter(|(_, v)| keep(**v))
        .map(|(k, _)| k.clone())
        .collect();
    names.sort();
    names
}

fn merged(mut a: Vec<String>, b: Vec<String>) -> Vec<String> {
    a.extend(b);
    a.sort();
    a.dedup();
    a
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Object::Module(m) => write!(f, "{m}"),
            Object::Instance(i) => match &i.value {
                Value::Nil => write!(f, "nil"),
                Value::Bool(b) => write!(f, "{b}"),
                Value::Integer(n) => write!(f, "{n}"),
                Value::Float(n) => write!(f, "{n:?}"),
                Value::String(s) => write!(f, "{s:?}"),
                Value::Symbol(s) => write!(f, ":{s}"),
                Value::Array(_) => write!(f, "#<{} ...>", i.class),
                Value::Hash(_) => write!(f, "#<{} ...>", i.class),
                Value::Range(..) => write!(f, "#<{} ...>", i.class),
                Value::Plain => write!(f, "#<{}>", i.class),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nil_and_booleans_are_shared() {
        assert!(Object::nil().ptr_eq(&Object::nil()));
        assert!(Object::bool(true).ptr_eq(&Object::bool(true)));
        assert!(!Object::bool(true).ptr_eq(&Object::bool(false)));
        assert!(Object::nil().is_nil());
    }

    #[test]
    fn module_values_report_class_or_module() {
        let c = core();
        assert!(Object::module(&c.string).class().ptr_eq(&c.class));
        assert!(Object::module(&c.kernel).class().ptr_eq(&c.module));
    }

    #[test]
    fn self_referential_array() {
        let a = Object::array(vec![Object::integer(1)]);
        a.push(a.clone());
        let items = a.array_items().unwrap();
        assert_eq!(items.len(), 2);
        assert!(items[1].ptr_eq(&a));
    }

    #[test]
    fn singleton_methods_join_method_list() {
        let s = Object::string("x");
        s.define_singleton_method("shout", Visibility::Public);
        s.define_singleton_method("secret", Visibility::Private);
        let methods = s.methods();
        assert!(methods.contains(&"shout".to_string()));
        assert!(methods.contains(&"upcase".to_string()));
        assert!(!methods.contains(&"secret".to_string()));
        assert!(s.private_methods().contains(&"secret".to_string()));
        assert!(!Object::string("y").methods().contains(&"shout".to_string()));
    }
}
