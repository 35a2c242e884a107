//! Signature resolution.
//!
//! Finds the declared signatures of a method for a receiver type, scores
//! overloads against the argument types at a call site, and interprets
//! declared type expressions as [`Type`]s.
//!
//! A missing signature database is not an error: every query simply finds
//! nothing, and callers fall back to what the live objects tell them.

use replty_common::{sample, Visibility, OBJECT_TO_TYPE_SAMPLE_SIZE};
use replty_rt::{core, Binding, Module, Object};
use replty_sig::{Literal, MethodDef, MethodType, SignatureDb, TypeExpr};
use rustc_hash::FxHashMap;
use tracing::trace;

use crate::types::{union_type_from_objects, DeclaredMethods, Type};

/// Generic variable bindings, by variable name.
pub type TypeVars = FxHashMap<String, Type>;

/// Interface expansion re-enters return-type inference; this bounds it.
const MAX_INTERFACE_DEPTH: usize = 4;

impl DeclaredMethods for SignatureDb {
    fn declared_methods(&self, class_name: &str, singleton: bool) -> Vec<(String, Visibility)> {
        self.methods(class_name, singleton)
    }
}

/// One overload selected for a call, with the argument alignment it was
/// scored on.
#[derive(Debug, Clone)]
pub struct MethodMatch {
    pub method: MethodType,
    /// The union member the method was found on.
    pub receiver: Type,
    pub given: Vec<Type>,
    pub expected: Vec<TypeExpr>,
    pub score: f64,
}

#[derive(Clone, Copy)]
pub struct Resolver<'a> {
    db: Option<&'a SignatureDb>,
    binding: Option<&'a Binding>,
}

impl<'a> Resolver<'a> {
    pub fn new(db: Option<&'a SignatureDb>) -> Self {
        Resolver { db, binding: None }
    }

    /// Resolve class names in signatures against `binding`'s constants
    /// before the built-ins.
    pub fn with_binding(mut self, binding: &'a Binding) -> Self {
        self.binding = Some(binding);
        self
    }

    pub fn db(&self) -> Option<&'a SignatureDb> {
        self.db
    }

    /// The declared-method source for [`Type::methods`].
    pub fn declared(&self) -> &'a dyn DeclaredMethods {
        match self.db {
            Some(db) => db,
            None => &(),
        }
    }

    // ── Lookup ─────────────────────────────────────────────────────────

    /// The class or module a signature names, `A::B` paths included.
    pub fn resolve_class(&self, name: &str) -> Option<Module> {
        let mut segments = name.trim_start_matches("::").split("::");
        let first = segments.next()?;
        let mut current = match self.binding {
            Some(binding) => binding.const_get(first),
            None => core().object.const_get(first),
        }?;
        for segment in segments {
            current = current.as_module()?.const_get(segment)?;
        }
        current.as_module().cloned()
    }

    /// First declaration of `name` along `module`'s live ancestors.
    pub fn find_method(&self, module: &Module, name: &str, singleton: bool) -> Option<MethodDef> {
        let db = self.db?;
        let found = module
            .ancestors()
            .iter()
            .filter_map(|ancestor| ancestor.name())
            .find_map(|ancestor| db.lookup(ancestor, name, singleton));
        if found.is_some() || !singleton {
            return found;
        }
        // Class objects answer the instance methods of Class/Module too.
        let meta = if module.is_class() { "Class" } else { "Module" };
        db.lookup(meta, name, false)
    }

    /// Each member of `ty` with the module to search and whether the search
    /// is for singleton methods.
    fn receivers(ty: &Type) -> Vec<(Type, Module, bool)> {
        ty.types()
            .into_iter()
            .filter_map(|member| {
                let (module, singleton) = match &member {
                    Type::Singleton(m) => (m.clone(), true),
                    Type::Instance(i) => (i.class().clone(), false),
                    Type::Union(_) => return None,
                };
                Some((member, module, singleton))
            })
            .collect()
    }

    /// Union of the declared return types of every overload of `name`.
    pub fn method_return_type(&self, ty: &Type, name: &str) -> Type {
        let mut types = Vec::new();
        for (receiver, module, singleton) in Self::receivers(ty) {
            if let Some(def) = self.find_method(&module, name, singleton) {
                for overload in &def.overloads {
                    types.push(self.apply_return_type(
                        &overload.function.return_type,
                        &receiver,
                        &TypeVars::default(),
                    ));
                }
            }
        }
        Type::union(types)
    }

    /// Keyword parameter names accepted by any overload of `name`.
    pub fn keyword_names(&self, ty: &Type, name: &str) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for (_, module, singleton) in Self::receivers(ty) {
            let Some(def) = self.find_method(&module, name, singleton) else {
                continue;
            };
            for overload in &def.overloads {
                let function = &overload.function;
                for key in function.required_keywords.keys().chain(function.optional_keywords.keys()) {
                    if !names.contains(key) {
                        names.push(key.clone());
                    }
                }
            }
        }
        names.sort();
        names
    }

    /// Whether any member of `ty` has a public method `name`.
    fn responds_to(&self, ty: &Type, name: &str) -> bool {
        Self::receivers(ty).iter().any(|(_, module, singleton)| {
            let live = if *singleton {
                Object::module(module).methods().iter().any(|m| m == name)
            } else {
                module
                    .instance_method_visibility(name)
                    .is_some_and(|v| !v.is_private())
            };
            live || self.find_method(module, name, *singleton).is_some()
        })
    }

    // ── Overload scoring ───────────────────────────────────────────────

    /// Score every overload of `name` on every member of `ty` and keep all
    /// candidates with the best score.
    ///
    /// `args` holds one entry per positional argument; `None` marks a splat
    /// of unknown length. `kwargs` are the literal keyword arguments.
    pub fn resolve_method(
        &self,
        ty: &Type,
        name: &str,
        args: &[Option<Type>],
        kwargs: Option<&[(String, Type)]>,
        has_block: bool,
    ) -> Vec<MethodMatch> {
        let has_splat = args.iter().any(Option::is_none);
        let mut candidates: Vec<MethodMatch> = Vec::new();

        for (receiver, module, singleton) in Self::receivers(ty) {
            let Some(def) = self.find_method(&module, name, singleton) else {
                continue;
            };
            for method in def.overloads {
                let function = &method.function;
                let mut args: Vec<Option<Type>> = args.to_vec();
                if let Some(kwargs) = kwargs.filter(|kw| !kw.is_empty()) {
                    if !function.accepts_keywords() {
                        let values = Type::union(kwargs.iter().map(|(_, t)| t.clone()));
                        args.push(Some(Type::instance_with(
                            &core().hash,
                            vec![("K".to_string(), Type::symbol()), ("V".to_string(), values)],
                        )));
                    }
                }

                let mut score = 0.0;
                if method.block.is_some() == has_block {
                    score += 2.0;
                }
                let reqs = &function.required_positionals;
                let opts = &function.optional_positionals;
                let trailings = &function.trailing_positionals;
                let mut given: Vec<Type> = Vec::new();
                let mut expected: Vec<TypeExpr> = Vec::new();

                if has_splat {
                    let known = args.iter().filter(|a| a.is_some()).count();
                    if known <= reqs.len() + opts.len() + trailings.len() {
                        score += 1.0;
                    }
                } else if reqs.len() + trailings.len() <= args.len()
                    && (function.rest_positionals.is_some()
                        || args.len() <= reqs.len() + opts.len() + trailings.len())
                {
                    score += 2.0;
                    let args: Vec<Type> = args.into_iter().flatten().collect();
                    let centers = &args[reqs.len()..args.len() - trailings.len()];
                    let taken = centers.len().min(opts.len());
                    given.extend(args[..reqs.len()].iter().cloned());
                    given.extend(centers[..taken].iter().cloned());
                    given.extend(args[args.len() - trailings.len()..].iter().cloned());
                    expected.extend(reqs.iter().cloned());
                    expected.extend(opts[..taken].iter().cloned());
                    expected.extend(trailings.iter().cloned());
                    if let Some(rest) = &function.rest_positionals {
                        given.push(Type::union(centers[taken..].iter().cloned()));
                        expected.push(rest.clone());
                    }
                    if !given.is_empty() {
                        let compatible = given
                            .iter()
                            .zip(&expected)
                            .filter(|(t, e)| self.compatible(t, e, &receiver))
                            .count();
                        score += compatible as f64 / given.len() as f64;
                    }
                }
                candidates.push(MethodMatch {
                    method,
                    receiver: receiver.clone(),
                    given,
                    expected,
                    score,
                });
            }
        }

        let best = candidates
            .iter()
            .map(|c| c.score)
            .fold(f64::NEG_INFINITY, f64::max);
        candidates.retain(|c| c.score == best);
        trace!(
            method = name,
            receiver = %ty,
            candidates = candidates.len(),
            score = best,
            "resolved overloads"
        );
        candidates
    }

    /// A given argument type fits an expected one when they intersect or the
    /// argument offers the implicit conversion the parameter accepts.
    fn compatible(&self, given: &Type, expected: &TypeExpr, receiver: &Type) -> bool {
        let expected = self.apply_return_type(expected, receiver, &TypeVars::default());
        if intersect(given, &expected) {
            return true;
        }
        let conversions = [
            (Type::string(), "to_str"),
            (Type::integer(), "to_int"),
            (Type::array(), "to_ary"),
        ];
        conversions
            .iter()
            .any(|(target, method)| intersect(target, &expected) && self.responds_to(given, method))
    }

    // ── Declared types as types ────────────────────────────────────────

    /// Interpret a declared type expression for `receiver`. Generic
    /// variables come from `vars` first, then from the receiver's params.
    pub fn apply_return_type(&self, expr: &TypeExpr, receiver: &Type, vars: &TypeVars) -> Type {
        let c = core();
        match expr {
            TypeExpr::SelfType => receiver.clone(),
            TypeExpr::Bottom | TypeExpr::Nil => Type::nil(),
            TypeExpr::Any | TypeExpr::Void | TypeExpr::Top => Type::object(),
            TypeExpr::Class => receiver.transform(|member| match member {
                Type::Singleton(m) if m.is_class() => Type::class(),
                Type::Singleton(_) => Type::module(),
                Type::Instance(i) => Type::singleton(i.class()),
                Type::Union(_) => Type::object(),
            }),
            TypeExpr::Instance => receiver.transform(|member| match member {
                Type::Singleton(m) if m.is_class() => Type::instance(m),
                Type::Instance(i) => Type::instance(i.class()),
                _ => Type::object(),
            }),
            TypeExpr::Bool => Type::boolean(),
            TypeExpr::Union { types } | TypeExpr::Intersection { types } => {
                Type::union(types.iter().map(|t| self.apply_return_type(t, receiver, vars)))
            }
            TypeExpr::Proc => Type::proc_(),
            TypeExpr::Tuple { types } => {
                Type::array_of(types.iter().map(|t| self.apply_return_type(t, receiver, vars)))
            }
            TypeExpr::Record { .. } => Type::instance_with(
                &c.hash,
                vec![("K".to_string(), Type::symbol()), ("V".to_string(), Type::object())],
            ),
            TypeExpr::Literal { value } => match value {
                Literal::Integer(_) => Type::integer(),
                Literal::Float(_) => Type::float(),
                Literal::String(_) => Type::string(),
                Literal::Symbol(_) => Type::symbol(),
                Literal::Bool(true) => Type::true_(),
                Literal::Bool(false) => Type::false_(),
            },
            TypeExpr::Variable { name } => match vars.get(name) {
                Some(ty) => ty.clone(),
                None => receiver.param(name).unwrap_or_else(Type::object),
            },
            TypeExpr::Optional { inner } => {
                Type::union([self.apply_return_type(inner, receiver, vars), Type::nil()])
            }
            TypeExpr::Alias { name } => match name.as_str() {
                "int" => Type::integer(),
                "boolish" => Type::boolean(),
                "string" => Type::string(),
                _ => Type::object(),
            },
            TypeExpr::Interface { .. } => Type::object(),
            TypeExpr::ClassInstance { name, args } => {
                let Some(class) = self.resolve_class(name) else {
                    return Type::object();
                };
                if args.is_empty() {
                    return Type::instance(&class);
                }
                let param_names: &[String] = self.db.map_or(&[], |db| db.type_params(name));
                let params = param_names
                    .iter()
                    .enumerate()
                    .map(|(i, param)| {
                        let ty = args
                            .get(i)
                            .map_or_else(Type::object, |a| self.apply_return_type(a, receiver, vars));
                        (param.clone(), ty)
                    })
                    .collect();
                Type::instance_with(&class, params)
            }
            TypeExpr::ClassSingleton { name } => self
                .resolve_class(name)
                .map_or_else(Type::object, |m| Type::singleton(&m)),
        }
    }

    // ── Unification ────────────────────────────────────────────────────

    /// Bind the generic variables `vars` by walking each declared
    /// expression against the concrete type in the same position.
    pub fn unify_free_variables(&self, vars: &[String], exprs: &[TypeExpr], values: &[Type]) -> TypeVars {
        let mut acc: FxHashMap<String, Vec<Type>> = FxHashMap::default();
        for (expr, value) in exprs.iter().zip(values) {
            self.unify_into(vars, expr, value, &mut acc, 0);
        }
        acc.into_iter()
            .map(|(name, types)| (name, Type::union(types)))
            .collect()
    }

    fn unify_into(
        &self,
        vars: &[String],
        expr: &TypeExpr,
        value: &Type,
        acc: &mut FxHashMap<String, Vec<Type>>,
        depth: usize,
    ) {
        match expr {
            TypeExpr::Variable { name } => {
                if vars.contains(name) {
                    acc.entry(name.clone()).or_default().push(value.clone());
                }
            }
            TypeExpr::ClassInstance { name, args } => {
                let (Some(db), Some(instance)) = (self.db, value.as_instance()) else {
                    return;
                };
                for (param, arg) in db.type_params(name).iter().zip(args) {
                    if let Some(v) = instance.param(param) {
                        let v = v.clone();
                        self.unify_into(vars, arg, &v, acc, depth);
                    }
                }
            }
            TypeExpr::Tuple { types } => {
                if !value.is_instance_of(&core().array) {
                    return;
                }
                if let Some(elem) = value.param("Elem") {
                    for t in types {
                        self.unify_into(vars, t, &elem, acc, depth);
                    }
                }
            }
            TypeExpr::Interface { name, args } => {
                if depth >= MAX_INTERFACE_DEPTH {
                    return;
                }
                let Some(interface) = self.db.and_then(|db| db.interface(name)) else {
                    return;
                };
                // interface param -> caller's variable
                let convert: Vec<(String, String)> = interface
                    .type_params
                    .iter()
                    .zip(args)
                    .filter_map(|(param, arg)| match arg {
                        TypeExpr::Variable { name } => Some((param.clone(), name.clone())),
                        _ => None,
                    })
                    .collect();
                if convert.is_empty() {
                    return;
                }
                let inner_vars: Vec<String> = convert.iter().map(|(p, _)| p.clone()).collect();
                let mut inner: FxHashMap<String, Vec<Type>> = FxHashMap::default();
                for (method_name, def) in &interface.methods {
                    let returned = self.method_return_type(value, method_name);
                    for overload in &def.overloads {
                        self.unify_into(
                            &inner_vars,
                            &overload.function.return_type,
                            &returned,
                            &mut inner,
                            depth + 1,
                        );
                    }
                }
                for (from, to) in convert {
                    if let Some(types) = inner.remove(&from) {
                        acc.entry(to).or_default().extend(types);
                    }
                }
            }
            _ => {}
        }
    }
}

/// Whether two types can describe the same value: they share a class
/// object, or one side's instance classes inherit from the other's.
pub fn intersect(a: &Type, b: &Type) -> bool {
    let (a, b) = (a.types(), b.types());
    let singletons = |types: &[Type]| -> Vec<Module> { types.iter().filter_map(Type::as_singleton).cloned().collect() };
    let classes = |types: &[Type]| -> Vec<Module> {
        types
            .iter()
            .filter_map(Type::as_instance)
            .map(|i| i.class().clone())
            .collect()
    };
    let (sa, sb) = (singletons(&a), singletons(&b));
    if sa.iter().any(|x| sb.iter().any(|y| x.ptr_eq(y))) {
        return true;
    }
    let (ca, cb) = (classes(&a), classes(&b));
    let reaches = |from: &[Module], to: &[Module]| {
        from.iter()
            .any(|class| class.ancestors().iter().any(|anc| to.iter().any(|t| t.ptr_eq(anc))))
    };
    reaches(&ca, &cb) || reaches(&cb, &ca)
}

/// Result types of the well-known conversion methods.
pub fn conversion_type(name: &str) -> Option<Type> {
    match name {
        "to_s" | "to_str" => Some(Type::string()),
        "to_a" | "to_ary" => Some(Type::array()),
        "to_h" | "to_hash" => Some(Type::hash()),
        "to_i" | "to_int" => Some(Type::integer()),
        "to_f" => Some(Type::float()),
        "to_c" => Some(Type::complex()),
        "to_r" => Some(Type::rational()),
        _ => None,
    }
}

fn is_reader_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_lowercase() || c == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// For a reader-like `name`, the union of the `@name` instance variables
/// found on the type's sampled objects.
pub fn accessor_method_return_type(ty: &Type, name: &str) -> Option<Type> {
    if !is_reader_name(name) {
        return None;
    }
    let objects: Vec<Object> = ty
        .types()
        .iter()
        .flat_map(|member| match member {
            Type::Singleton(m) => vec![Object::module(m)],
            Type::Instance(i) => sample(i.samples(), OBJECT_TO_TYPE_SAMPLE_SIZE),
            Type::Union(_) => Vec::new(),
        })
        .collect();
    let ivar = format!("@{name}");
    let values: Vec<Object> = objects
        .iter()
        .filter_map(|o| o.instance_variable_get(&ivar))
        .collect();
    if values.is_empty() {
        None
    } else {
        Some(union_type_from_objects(&values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use replty_sig::{ClassDecl, FunctionType};

    fn overload(params: Vec<TypeExpr>, ret: TypeExpr) -> MethodType {
        MethodType {
            function: FunctionType {
                required_positionals: params,
                return_type: ret,
                ..FunctionType::default()
            },
            ..MethodType::default()
        }
    }

    fn db() -> SignatureDb {
        let mut integer = ClassDecl::new("Integer");
        integer.instance_methods.insert(
            "add".into(),
            MethodDef::new(vec![
                overload(
                    vec![TypeExpr::class("Integer", vec![]), TypeExpr::class("Integer", vec![])],
                    TypeExpr::class("Integer", vec![]),
                ),
                overload(
                    vec![TypeExpr::class("String", vec![]), TypeExpr::class("String", vec![])],
                    TypeExpr::class("String", vec![]),
                ),
            ]),
        );
        let mut array = ClassDecl::new("Array");
        array.type_params = vec!["Elem".into()];
        array
            .instance_methods
            .insert("first".into(), MethodDef::new(vec![overload(vec![], TypeExpr::variable("Elem"))]));
        let mut db = SignatureDb::new();
        db.add_class(integer);
        db.add_class(array);
        db
    }

    #[test]
    fn best_overload_wins_alone() {
        let db = db();
        let resolver = Resolver::new(Some(&db));
        let args = [Some(Type::integer()), Some(Type::integer())];
        let matches = resolver.resolve_method(&Type::integer(), "add", &args, None, false);
        assert_eq!(matches.len(), 1);
        assert_eq!(
            matches[0].method.function.return_type,
            TypeExpr::class("Integer", vec![])
        );
    }

    #[test]
    fn ties_keep_every_overload() {
        let db = db();
        let resolver = Resolver::new(Some(&db));
        let args = [Some(Type::nil()), Some(Type::nil())];
        let matches = resolver.resolve_method(&Type::integer(), "add", &args, None, false);
        assert_eq!(matches.len(), 2);
    }

    #[test]
    fn element_variable_resolves_through_receiver_params() {
        let db = db();
        let resolver = Resolver::new(Some(&db));
        let receiver = Type::array_of([Type::integer(), Type::string()]);
        let ty = resolver.method_return_type(&receiver, "first");
        assert_eq!(ty, Type::union([Type::integer(), Type::string()]));
    }

    #[test]
    fn no_database_finds_nothing() {
        let resolver = Resolver::new(None);
        assert!(resolver
            .resolve_method(&Type::integer(), "add", &[], None, false)
            .is_empty());
        assert_eq!(resolver.method_return_type(&Type::integer(), "add"), Type::object());
    }

    #[test]
    fn intersect_follows_inheritance_both_ways() {
        let c = core();
        let numeric = Type::instance(&c.numeric);
        assert!(intersect(&Type::integer(), &numeric));
        assert!(intersect(&numeric, &Type::integer()));
        assert!(!intersect(&Type::integer(), &Type::string()));
        assert!(intersect(&Type::singleton(&c.array), &Type::singleton(&c.array)));
    }

    #[test]
    fn class_marker_maps_between_singleton_and_instance() {
        let c = core();
        let resolver = Resolver::new(None);
        let vars = TypeVars::default();
        assert_eq!(
            resolver.apply_return_type(&TypeExpr::Class, &Type::string(), &vars),
            Type::singleton(&c.string)
        );
        assert_eq!(
            resolver.apply_return_type(&TypeExpr::Instance, &Type::singleton(&c.string), &vars),
            Type::string()
        );
        assert_eq!(
            resolver.apply_return_type(&TypeExpr::Class, &Type::singleton(&c.kernel), &vars),
            Type::module()
        );
    }

    #[test]
    fn unknown_class_names_degrade_to_object() {
        let resolver = Resolver::new(None);
        let ty = resolver.apply_return_type(
            &TypeExpr::class("NoSuchThing", vec![]),
            &Type::nil(),
            &TypeVars::default(),
        );
        assert_eq!(ty, Type::object());
    }

    #[test]
    fn accessor_reads_sampled_ivars() {
        let object = Object::instance_of(&core().object);
        object.set_instance_variable("@name", Object::string("x"));
        let ty = crate::types::type_from_object(&object);
        assert_eq!(accessor_method_return_type(&ty, "name"), Some(Type::string()));
        assert_eq!(accessor_method_return_type(&ty, "other"), None);
        assert_eq!(accessor_method_return_type(&ty, "Name"), None);
    }
}
