//! Flow-sensitive variable scopes.
//!
//! A [`Scope`] maps variable names to [`Type`]s and chains to a parent
//! frame. Reads fall through to the parent; writes always land in the scope
//! they are made on, tagged with the level of the scope that owns the
//! variable. When a child scope is merged back ([`Scope::update`],
//! [`Scope::run_branches`]), only entries owned at or above the parent's
//! level propagate.
//!
//! The chain bottoms out in a [`RootScope`], which answers from the live
//! [`Binding`] the analysis started from.
//!
//! ## Jumps
//!
//! `break`, `next` and `return` are modelled as writes to reserved labels
//! ([`BREAK`], [`NEXT`], [`RETURN`]). A scope that declares a label in its
//! table owns it; [`Scope::terminate_with`] records the jumping scope's
//! changes as a pending branch on the owner, and [`Scope::merge_jumps`]
//! folds those branches in once the owning construct is done.

use std::cell::RefCell;
use std::convert::Infallible;

use replty_common::{sample, OBJECT_TO_TYPE_SAMPLE_SIZE};
use replty_rt::{core, Binding, Module, Object};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::types::{type_from_object, union_type_from_objects, Type};

pub const BREAK: &str = "%break";
pub const NEXT: &str = "%next";
pub const RETURN: &str = "%return";

/// What a table key names, decided by its spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameKind {
    Local,
    Instance,
    Class,
    Global,
    Const,
    /// Jump labels such as `%break`.
    Internal,
}

pub fn name_kind(name: &str) -> NameKind {
    if name.starts_with("@@") {
        NameKind::Class
    } else if name.starts_with('@') {
        NameKind::Instance
    } else if name.starts_with('$') {
        NameKind::Global
    } else if name.starts_with('%') {
        NameKind::Internal
    } else if name.contains("::") || name.starts_with(|c: char| c.is_ascii_uppercase()) {
        NameKind::Const
    } else {
        NameKind::Local
    }
}

fn const_key(module: &Module, name: &str) -> String {
    format!("{}::{}", module.id(), name)
}

/// Owning level and value of each entry. Labels start out as `None`.
pub type Changes = FxHashMap<String, (usize, Option<Type>)>;

/// A link in the scope chain.
pub trait Frame {
    fn level(&self) -> usize;
    /// Level of the scope that owns `name`.
    fn level_of(&self, name: &str) -> usize;
    fn lookup(&self, name: &str) -> Option<Type>;
    fn lookup_const(&self, module: &Module, name: &str) -> Option<Type>;
    /// Record a jump to `label` carrying `value`. Returns the owner's level
    /// when some frame declares the label.
    fn store_jump(&mut self, label: &str, value: &Type, changes: &Changes) -> Option<usize>;
    fn self_type(&self) -> Type;
    /// Innermost first, ending with `Object`.
    fn module_nesting(&self) -> Vec<Module>;
    fn local_variables(&self) -> Vec<String>;
    fn instance_variables(&self) -> Vec<String>;
    fn class_variables(&self) -> Vec<String>;
    fn global_variables(&self) -> Vec<String>;
    fn constants_of(&self, module: &Module) -> Vec<String>;
}

// ── Root ───────────────────────────────────────────────────────────────

/// The bottom of every scope chain: the live binding, read lazily and
/// cached per name.
pub struct RootScope<'b> {
    binding: &'b Binding,
    locals: Vec<String>,
    uninitialized: FxHashSet<String>,
    cache: RefCell<FxHashMap<String, Type>>,
}

impl<'b> RootScope<'b> {
    /// `program_locals` are the locals the analyzed code declares; those
    /// the binding does not know yet read as `nil`.
    pub fn new(binding: &'b Binding, program_locals: &[String]) -> Self {
        let bound: Vec<&str> = binding.local_variables();
        let mut locals: Vec<String> = Vec::new();
        let mut uninitialized = FxHashSet::default();
        for name in program_locals {
            if !bound.contains(&name.as_str()) {
                uninitialized.insert(name.clone());
            }
            if !locals.contains(name) {
                locals.push(name.clone());
            }
        }
        for name in bound {
            if !locals.iter().any(|l| l == name) {
                locals.push(name.to_string());
            }
        }
        RootScope {
            binding,
            locals,
            uninitialized,
            cache: RefCell::new(FxHashMap::default()),
        }
    }

    fn class_variable_owner(&self) -> Module {
        if let Some(innermost) = self.binding.nesting().last() {
            return innermost.clone();
        }
        let receiver = self.binding.receiver();
        match receiver.as_module() {
            Some(m) => m.clone(),
            None => receiver.class(),
        }
    }

    fn read(&self, name: &str) -> Option<Type> {
        let from = |object: Option<Object>| object.map_or_else(Type::nil, |o| type_from_object(&o));
        match name_kind(name) {
            NameKind::Local => {
                if self.uninitialized.contains(name) {
                    Some(Type::nil())
                } else {
                    Some(from(self.binding.local_variable_get(name).cloned()))
                }
            }
            NameKind::Instance => Some(from(self.binding.receiver().instance_variable_get(name))),
            NameKind::Class => Some(from(self.class_variable_owner().class_variable_get(name))),
            NameKind::Global => Some(from(self.binding.global_variable_get(name).cloned())),
            NameKind::Const | NameKind::Internal => None,
        }
    }
}

impl Frame for RootScope<'_> {
    fn level(&self) -> usize {
        0
    }

    fn level_of(&self, _name: &str) -> usize {
        0
    }

    fn lookup(&self, name: &str) -> Option<Type> {
        if let Some(ty) = self.cache.borrow().get(name) {
            return Some(ty.clone());
        }
        let ty = self.read(name)?;
        self.cache.borrow_mut().insert(name.to_string(), ty.clone());
        Some(ty)
    }

    fn lookup_const(&self, module: &Module, name: &str) -> Option<Type> {
        let value = if module.ptr_eq(&core().object) {
            self.binding.const_get(name)
        } else {
            module.const_get(name)
        };
        value.map(|v| type_from_object(&v))
    }

    fn store_jump(&mut self, _label: &str, _value: &Type, _changes: &Changes) -> Option<usize> {
        None
    }

    fn self_type(&self) -> Type {
        type_from_object(self.binding.receiver())
    }

    fn module_nesting(&self) -> Vec<Module> {
        let mut nesting: Vec<Module> = self.binding.nesting().iter().rev().cloned().collect();
        nesting.push(core().object.clone());
        nesting
    }

    fn local_variables(&self) -> Vec<String> {
        self.locals.clone()
    }

    fn instance_variables(&self) -> Vec<String> {
        self.binding.receiver().instance_variables()
    }

    fn class_variables(&self) -> Vec<String> {
        self.class_variable_owner().class_variables()
    }

    fn global_variables(&self) -> Vec<String> {
        self.binding
            .global_variables()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    fn constants_of(&self, module: &Module) -> Vec<String> {
        if module.ptr_eq(&core().object) {
            self.binding.constants()
        } else {
            module.constants()
        }
    }
}

// ── Scope ──────────────────────────────────────────────────────────────

pub struct Scope<'s> {
    parent: &'s mut (dyn Frame + 's),
    level: usize,
    table: Changes,
    /// The mergeable changes, frozen when the scope terminated.
    frozen: Option<Changes>,
    jump_branches: Vec<Changes>,
    terminated: bool,
    trace_lvar: bool,
    trace_ivar: bool,
    self_type: Option<Type>,
    nesting: Option<Module>,
}

impl<'s> Scope<'s> {
    pub fn new(parent: &'s mut (dyn Frame + 's)) -> Self {
        let level = parent.level() + 1;
        Scope {
            parent,
            level,
            table: Changes::default(),
            frozen: None,
            jump_branches: Vec::new(),
            terminated: false,
            trace_lvar: true,
            trace_ivar: true,
            self_type: None,
            nesting: None,
        }
    }

    /// A scope that owns the given names. A `None` value declares a name
    /// (typically a jump label) without binding it.
    pub fn with_table<I>(parent: &'s mut (dyn Frame + 's), table: I) -> Self
    where
        I: IntoIterator<Item = (String, Option<Type>)>,
    {
        let mut scope = Scope::new(parent);
        let level = scope.level;
        scope.table = table
            .into_iter()
            .map(|(name, value)| (name, (level, value)))
            .collect();
        scope
    }

    /// Whether this scope's own locals are listed as visible and whether
    /// parent locals show through.
    pub fn trace_lvar(mut self, on: bool) -> Self {
        self.trace_lvar = on;
        self
    }

    /// With ivar tracing off, instance variables belong to this scope and
    /// unknown ones are read from the objects behind `self`.
    pub fn trace_ivar(mut self, on: bool) -> Self {
        self.trace_ivar = on;
        self
    }

    pub fn with_self_type(mut self, self_type: Option<Type>) -> Self {
        self.self_type = self_type;
        self
    }

    pub fn with_nesting(mut self, module: Module) -> Self {
        self.nesting = Some(module);
        self
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn has_own(&self, name: &str) -> bool {
        self.table.contains_key(name)
    }

    // ── Reads and writes ───────────────────────────────────────────────

    pub fn get(&self, name: &str) -> Option<Type> {
        self.lookup(name)
    }

    pub fn set(&mut self, name: &str, ty: Type) {
        self.set_entry(name, Some(ty));
    }

    fn set_entry(&mut self, name: &str, value: Option<Type>) {
        let level = self.level_of(name);
        self.table.insert(name.to_string(), (level, value));
    }

    /// Constant `name` under `module`, as written by the analyzed code or
    /// found live.
    pub fn get_const(&self, module: &Module, name: &str) -> Option<Type> {
        self.lookup_const(module, name)
    }

    /// Constants propagate through every merge.
    pub fn set_const(&mut self, module: &Module, name: &str, ty: Type) {
        self.table.insert(const_key(module, name), (0, Some(ty)));
    }

    /// Lexical lookup through the module nesting, innermost first.
    pub fn resolve_const(&self, name: &str) -> Option<Type> {
        self.module_nesting()
            .iter()
            .find_map(|module| self.lookup_const(module, name))
    }

    /// This scope's mergeable changes, for [`Scope::update`] on the parent.
    pub fn finish(self) -> Changes {
        match self.frozen {
            Some(frozen) => frozen,
            None => self.table,
        }
    }

    // ── Termination and jumps ──────────────────────────────────────────

    /// Control never falls through the end of this scope.
    pub fn terminate(&mut self) {
        if self.terminated {
            return;
        }
        self.terminated = true;
        self.frozen = Some(self.table.clone());
    }

    /// Jump to `label` with `value`, then terminate.
    pub fn terminate_with(&mut self, label: &str, value: Type) {
        if self.terminated {
            return;
        }
        let changes = self.table.clone();
        if let Some(owner) = Frame::store_jump(self, label, &value, &changes) {
            self.table.insert(label.to_string(), (owner, Some(value)));
        }
        self.terminate();
    }

    /// Fold pending jump branches into this scope. Without termination the
    /// fall-through path counts as one more branch.
    pub fn merge_jumps(&mut self) {
        let mut branches = std::mem::take(&mut self.jump_branches);
        if self.terminated {
            if let Some(frozen) = self.frozen.take() {
                self.table = frozen;
            }
            self.merge(&branches);
        } else {
            branches.push(Changes::default());
            self.merge(&branches);
        }
    }

    /// Merge another scope's changes, as if it ran in sequence after this
    /// one.
    pub fn update(&mut self, changes: &Changes) {
        let current = self.level;
        for (name, (level, value)) in changes {
            if *level <= current {
                self.set_entry(name, value.clone());
            }
        }
    }

    fn merge(&mut self, branches: &[Changes]) {
        let current = self.level;
        let mut merged: FxHashMap<String, Vec<Option<Type>>> = FxHashMap::default();
        for changes in branches {
            for (name, (level, value)) in changes {
                if *level > current {
                    continue;
                }
                merged.entry(name.clone()).or_default().push(value.clone());
            }
        }
        for (name, mut values) in merged {
            if values.len() != branches.len() {
                values.push(self.lookup(&name));
            }
            let values: Vec<Type> = values.into_iter().flatten().collect();
            if !values.is_empty() {
                self.set_entry(&name, Some(Type::union(values)));
            }
        }
    }

    // ── Branching ──────────────────────────────────────────────────────

    /// Run `count` sibling branches, each in a fresh child scope, and merge
    /// the ones that fall through. If none does, this scope terminates.
    pub fn try_run_branches<R, E>(
        &mut self,
        count: usize,
        mut branch: impl FnMut(usize, &mut Scope<'_>) -> Result<R, E>,
    ) -> Result<Vec<R>, E> {
        let mut results = Vec::new();
        let mut changes = Vec::new();
        for i in 0..count {
            let mut child = Scope::new(self);
            let result = branch(i, &mut child)?;
            if child.is_terminated() {
                continue;
            }
            results.push(result);
            changes.push(child.finish());
        }
        if changes.is_empty() {
            self.terminate();
        }
        self.merge(&changes);
        Ok(results)
    }

    pub fn run_branches<R>(&mut self, count: usize, mut branch: impl FnMut(usize, &mut Scope<'_>) -> R) -> Vec<R> {
        match self.try_run_branches::<R, Infallible>(count, |i, s| Ok(branch(i, s))) {
            Ok(results) => results,
            Err(never) => match never {},
        }
    }

    /// Run `body` as a branch that may or may not execute. Returns its
    /// result unless it terminated.
    pub fn try_conditional<R, E>(
        &mut self,
        body: impl FnOnce(&mut Scope<'_>) -> Result<R, E>,
    ) -> Result<Option<R>, E> {
        let mut body = Some(body);
        let results = self.try_run_branches(2, |i, s| match (i, body.take()) {
            (0, Some(body)) => body(s).map(Some),
            _ => Ok(None),
        })?;
        Ok(results.into_iter().flatten().next())
    }

    pub fn conditional<R>(&mut self, body: impl FnOnce(&mut Scope<'_>) -> R) -> Option<R> {
        match self.try_conditional::<R, Infallible>(|s| Ok(body(s))) {
            Ok(result) => result,
            Err(never) => match never {},
        }
    }

    // ── Views ──────────────────────────────────────────────────────────

    pub fn local_variables(&self) -> Vec<String> {
        sorted(Frame::local_variables(self))
    }

    pub fn instance_variables(&self) -> Vec<String> {
        sorted(Frame::instance_variables(self))
    }

    pub fn class_variables(&self) -> Vec<String> {
        sorted(Frame::class_variables(self))
    }

    pub fn global_variables(&self) -> Vec<String> {
        sorted(Frame::global_variables(self))
    }

    /// Constant names visible lexically from here.
    pub fn constants(&self) -> Vec<String> {
        sorted(
            self.module_nesting()
                .iter()
                .flat_map(|module| self.constants_of(module))
                .collect(),
        )
    }

    fn own_names(&self, kind: NameKind) -> Vec<String> {
        self.table
            .keys()
            .filter(|name| name_kind(name) == kind)
            .cloned()
            .collect()
    }

    /// An owned view of everything visible from this scope.
    pub fn snapshot(&self) -> ScopeSnapshot {
        let local_variables = self.local_variables();
        let instance_variables = self.instance_variables();
        let class_variables = self.class_variables();
        let global_variables = self.global_variables();
        let mut variables = FxHashMap::default();
        for name in local_variables
            .iter()
            .chain(&instance_variables)
            .chain(&class_variables)
            .chain(&global_variables)
        {
            if let Some(ty) = self.lookup(name) {
                variables.insert(name.clone(), ty);
            }
        }
        ScopeSnapshot {
            self_type: self.self_type(),
            module_nesting: self.module_nesting(),
            constants: self.constants(),
            local_variables,
            instance_variables,
            class_variables,
            global_variables,
            variables,
        }
    }
}

impl Frame for Scope<'_> {
    fn level(&self) -> usize {
        self.level
    }

    fn level_of(&self, name: &str) -> usize {
        match name_kind(name) {
            NameKind::Instance if !self.trace_ivar => return self.level,
            NameKind::Global => return 0,
            NameKind::Local if !self.trace_lvar && !self.table.contains_key(name) => return self.level,
            _ => {}
        }
        match self.table.get(name) {
            Some((level, _)) => *level,
            None => self.parent.level_of(name),
        }
    }

    fn lookup(&self, name: &str) -> Option<Type> {
        if let Some((_, value)) = self.table.get(name) {
            return value.clone();
        }
        if name_kind(name) == NameKind::Instance && !self.trace_ivar {
            return Some(instance_variable_of(&self.self_type(), name));
        }
        self.parent.lookup(name)
    }

    fn lookup_const(&self, module: &Module, name: &str) -> Option<Type> {
        match self.table.get(&const_key(module, name)) {
            Some((_, value)) => value.clone(),
            None => self.parent.lookup_const(module, name),
        }
    }

    fn store_jump(&mut self, label: &str, value: &Type, changes: &Changes) -> Option<usize> {
        if self.terminated {
            return None;
        }
        if self.table.contains_key(label) {
            let mut branch = changes.clone();
            branch.insert(label.to_string(), (self.level, Some(value.clone())));
            self.jump_branches.push(branch);
            Some(self.level)
        } else {
            self.parent.store_jump(label, value, changes)
        }
    }

    fn self_type(&self) -> Type {
        match &self.self_type {
            Some(ty) => ty.clone(),
            None => self.parent.self_type(),
        }
    }

    fn module_nesting(&self) -> Vec<Module> {
        let mut nesting = self.parent.module_nesting();
        if let Some(module) = &self.nesting {
            nesting.insert(0, module.clone());
        }
        nesting
    }

    fn local_variables(&self) -> Vec<String> {
        let mut names = self.own_names(NameKind::Local);
        if self.trace_lvar {
            names.extend(self.parent.local_variables());
        }
        names
    }

    fn instance_variables(&self) -> Vec<String> {
        let mut names = self.own_names(NameKind::Instance);
        if self.trace_ivar {
            names.extend(self.parent.instance_variables());
        } else {
            names.extend(
                objects_of(&self.self_type())
                    .iter()
                    .flat_map(Object::instance_variables),
            );
        }
        names
    }

    fn class_variables(&self) -> Vec<String> {
        let mut names = self.own_names(NameKind::Class);
        names.extend(self.parent.class_variables());
        names
    }

    fn global_variables(&self) -> Vec<String> {
        let mut names = self.own_names(NameKind::Global);
        names.extend(self.parent.global_variables());
        names
    }

    fn constants_of(&self, module: &Module) -> Vec<String> {
        let prefix = format!("{}::", module.id());
        let mut names: Vec<String> = self
            .table
            .keys()
            .filter_map(|key| key.strip_prefix(&prefix).map(str::to_string))
            .collect();
        names.extend(self.parent.constants_of(module));
        names
    }
}

fn sorted(mut names: Vec<String>) -> Vec<String> {
    names.sort();
    names.dedup();
    names
}

/// The live objects a type was sampled from; class objects for singletons.
fn objects_of(ty: &Type) -> Vec<Object> {
    ty.types()
        .iter()
        .flat_map(|member| match member {
            Type::Singleton(m) => vec![Object::module(m)],
            Type::Instance(i) => sample(i.samples(), OBJECT_TO_TYPE_SAMPLE_SIZE),
            Type::Union(_) => Vec::new(),
        })
        .collect()
}

fn instance_variable_of(self_type: &Type, name: &str) -> Type {
    let values: Vec<Object> = objects_of(self_type)
        .iter()
        .filter_map(|o| o.instance_variable_get(name))
        .collect();
    if values.is_empty() {
        Type::nil()
    } else {
        union_type_from_objects(&values)
    }
}

/// An owned copy of what a scope could see, handed to callers after the
/// scope chain is gone.
#[derive(Debug, Clone)]
pub struct ScopeSnapshot {
    pub self_type: Type,
    pub module_nesting: Vec<Module>,
    pub local_variables: Vec<String>,
    pub instance_variables: Vec<String>,
    pub class_variables: Vec<String>,
    pub global_variables: Vec<String>,
    pub constants: Vec<String>,
    variables: FxHashMap<String, Type>,
}

impl ScopeSnapshot {
    /// Type of a visible variable.
    pub fn get(&self, name: &str) -> Option<&Type> {
        self.variables.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_kinds() {
        assert_eq!(name_kind("a"), NameKind::Local);
        assert_eq!(name_kind("_x"), NameKind::Local);
        assert_eq!(name_kind("@a"), NameKind::Instance);
        assert_eq!(name_kind("@@a"), NameKind::Class);
        assert_eq!(name_kind("$a"), NameKind::Global);
        assert_eq!(name_kind("Foo"), NameKind::Const);
        assert_eq!(name_kind(BREAK), NameKind::Internal);
    }

    #[test]
    fn root_reads_the_binding() {
        let receiver = Object::instance_of(&core().object);
        receiver.set_instance_variable("@x", Object::integer(1));
        let binding = Binding::new(receiver)
            .with_local("a", Object::string("s"))
            .with_global("$g", Object::symbol("g"));
        let root = RootScope::new(&binding, &["b".to_string()]);
        assert!(root.lookup("a").unwrap().is_instance_of(&core().string));
        assert_eq!(root.lookup("b"), Some(Type::nil()));
        assert!(root.lookup("@x").unwrap().is_instance_of(&core().integer));
        assert_eq!(root.lookup("@missing"), Some(Type::nil()));
        assert!(root.lookup("$g").unwrap().is_instance_of(&core().symbol));
        assert_eq!(root.lookup(BREAK), None);
        assert_eq!(Frame::local_variables(&root), vec!["b", "a"]);
    }

    #[test]
    fn writes_stay_local_until_merged() {
        let binding = Binding::top_level();
        let mut root = RootScope::new(&binding, &[]);
        let mut scope = Scope::with_table(&mut root, [("a".to_string(), Some(Type::integer()))]);
        let changes = {
            let mut child = Scope::new(&mut scope);
            child.set("a", Type::string());
            assert_eq!(child.get("a"), Some(Type::string()));
            child.finish()
        };
        assert_eq!(scope.get("a"), Some(Type::integer()));
        scope.update(&changes);
        assert_eq!(scope.get("a"), Some(Type::string()));
    }
}
