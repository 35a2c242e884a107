//! The execution-context snapshot handed to the analyzer.

use std::path::{Path, PathBuf};

use crate::builtins::core;
use crate::module::Module;
use crate::object::Object;

/// Receiver, variables and constants visible at the point of completion.
#[derive(Clone, Debug)]
pub struct Binding {
    receiver: Object,
    locals: Vec<(String, Object)>,
    globals: Vec<(String, Object)>,
    constants: Vec<(String, Object)>,
    nesting: Vec<Module>,
    source_file: Option<PathBuf>,
}

impl Binding {
    pub fn new(receiver: Object) -> Self {
        Binding {
            receiver,
            locals: Vec::new(),
            globals: Vec::new(),
            constants: Vec::new(),
            nesting: Vec::new(),
            source_file: None,
        }
    }

    /// A top-level binding whose receiver is a plain `Object` ("main").
    pub fn top_level() -> Self {
        Binding::new(Object::instance_of(&core().object))
    }

    pub fn with_local(mut self, name: &str, value: Object) -> Self {
        set(&mut self.locals, name, value);
        self
    }

    pub fn with_global(mut self, name: &str, value: Object) -> Self {
        set(&mut self.globals, name, value);
        self
    }

    /// A top-level constant, e.g. a class defined earlier in the session.
    pub fn with_constant(mut self, name: &str, value: Object) -> Self {
        set(&mut self.constants, name, value);
        self
    }

    /// Lexical module nesting, outermost first.
    pub fn with_nesting(mut self, nesting: Vec<Module>) -> Self {
        self.nesting = nesting;
        self
    }

    /// The file the code is evaluated in, if any.
    pub fn with_source_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.source_file = Some(path.into());
        self
    }

    pub fn source_file(&self) -> Option<&Path> {
        self.source_file.as_deref()
    }

    pub fn receiver(&self) -> &Object {
        &self.receiver
    }

    pub fn nesting(&self) -> &[Module] {
        &self.nesting
    }

    pub fn local_variables(&self) -> Vec<&str> {
        self.locals.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn local_variable_get(&self, name: &str) -> Option<&Object> {
        get(&self.locals, name)
    }

    pub fn global_variables(&self) -> Vec<&str> {
        self.globals.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn global_variable_get(&self, name: &str) -> Option<&Object> {
        get(&self.globals, name)
    }

    /// Lexical constant lookup: innermost nesting first, then the session's
    /// top-level constants, then the built-ins.
    pub fn const_get(&self, name: &str) -> Option<Object> {
        self.nesting
            .iter()
            .rev()
            .find_map(|m| m.const_get(name))
            .or_else(|| get(&self.constants, name).cloned())
            .or_else(|| core().object.const_get(name))
    }

    /// Every constant name `const_get` could answer.
    pub fn constants(&self) -> Vec<String> {
        let mut names: Vec<String> = self.nesting.iter().flat_map(|m| m.constants()).collect();
        names.extend(self.constants.iter().map(|(n, _)| n.clone()));
        names.extend(core().object.constants());
        names.sort();
        names.dedup();
        names
    }
}

fn set(table: &mut Vec<(String, Object)>, name: &str, value: Object) {
    match table.iter_mut().find(|(n, _)| n == name) {
        Some(slot) => slot.1 = value,
        None => table.push((name.to_string(), value)),
    }
}

fn get<'a>(table: &'a [(String, Object)], name: &str) -> Option<&'a Object> {
    table.iter().find(|(n, _)| n == name).map(|(_, v)| v)
}
