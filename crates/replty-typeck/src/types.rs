//! The type model: what a value could be at runtime.
//!
//! A [`Type`] is one of
//! - `Singleton(M)`: the class or module object `M` itself,
//! - `Instance(C, params, samples)`: an instance of class `C`,
//! - `Union(types)`: any of several Singleton/Instance members.
//!
//! Unions are always flat. Building one merges instances of the same class
//! (params unioned, samples concatenated), deduplicates singletons by
//! identity and collapses degenerate results: no members is `Object`, one
//! member is that member.
//!
//! Generic params of an instance are derived lazily from its sampled live
//! objects and cached inside the value. Expansion only goes one level deep
//! per access, so self-referential containers never recurse unboundedly.

use std::fmt;
use std::sync::{Arc, OnceLock};

use replty_common::{sample, Visibility, OBJECT_TO_TYPE_SAMPLE_SIZE};
use replty_rt::{core, Module, Object, Value};
use rustc_hash::FxHashSet;

/// A source of statically declared method names, kept apart from the
/// methods discovered on live objects.
pub trait DeclaredMethods {
    /// Methods declared for instances of `class_name` (or for the class
    /// object itself when `singleton` is set), with their visibility.
    fn declared_methods(&self, class_name: &str, singleton: bool) -> Vec<(String, Visibility)>;
}

/// No declarations at all, used while signatures are not loaded.
impl DeclaredMethods for () {
    fn declared_methods(&self, _class_name: &str, _singleton: bool) -> Vec<(String, Visibility)> {
        Vec::new()
    }
}

// ── Instance types ─────────────────────────────────────────────────────

struct InstanceData {
    class: Module,
    raw_params: Vec<(String, Type)>,
    samples: Vec<Object>,
    params: OnceLock<Vec<(String, Type)>>,
}

/// An instance of a class, with explicit generic params and live samples.
#[derive(Clone)]
pub struct InstanceType(Arc<InstanceData>);

impl InstanceType {
    pub fn new(class: &Module) -> Self {
        InstanceType::build(class, Vec::new(), Vec::new())
    }

    pub fn with_params(class: &Module, params: Vec<(String, Type)>) -> Self {
        InstanceType::build(class, params, Vec::new())
    }

    pub fn with_samples(class: &Module, samples: Vec<Object>) -> Self {
        InstanceType::build(class, Vec::new(), samples)
    }

    fn build(class: &Module, raw_params: Vec<(String, Type)>, samples: Vec<Object>) -> Self {
        InstanceType(Arc::new(InstanceData {
            class: class.clone(),
            raw_params,
            samples,
            params: OnceLock::new(),
        }))
    }

    pub fn class(&self) -> &Module {
        &self.0.class
    }

    /// Params given at construction, before sample expansion.
    pub fn raw_params(&self) -> &[(String, Type)] {
        &self.0.raw_params
    }

    pub fn samples(&self) -> &[Object] {
        &self.0.samples
    }

    /// Generic params, expanded from the samples on first access.
    pub fn params(&self) -> &[(String, Type)] {
        self.0.params.get_or_init(|| self.expand_params())
    }

    pub fn param(&self, name: &str) -> Option<&Type> {
        self.params()
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, t)| t)
    }

    /// Whether `params()` has been computed yet.
    pub fn params_resolved(&self) -> bool {
        self.0.params.get().is_some()
    }

    fn expand_params(&self) -> Vec<(String, Type)> {
        let data = &self.0;
        let mut params = data.raw_params.clone();
        if data.samples.is_empty() {
            return params;
        }
        let c = core();
        if data.class.ptr_eq(&c.array) {
            let items: Vec<Object> = data
                .samples
                .iter()
                .filter_map(Object::array_items)
                .flat_map(|items| sample(&items, OBJECT_TO_TYPE_SAMPLE_SIZE))
                .collect();
            merge_param(&mut params, "Elem", union_type_from_objects(&items));
        } else if data.class.ptr_eq(&c.hash) {
            let pairs: Vec<(Object, Object)> = data
                .samples
                .iter()
                .filter_map(Object::hash_pairs)
                .flat_map(|pairs| sample(&pairs, OBJECT_TO_TYPE_SAMPLE_SIZE))
                .collect();
            let keys: Vec<Object> = pairs.iter().map(|(k, _)| k.clone()).collect();
            let values: Vec<Object> = pairs.into_iter().map(|(_, v)| v).collect();
            merge_param(&mut params, "K", union_type_from_objects(&keys));
            merge_param(&mut params, "V", union_type_from_objects(&values));
        }
        params
    }

    fn is_container(&self) -> bool {
        let c = core();
        self.0.class.ptr_eq(&c.array) || self.0.class.ptr_eq(&c.hash)
    }

    fn is_nil(&self) -> bool {
        self.0.class.ptr_eq(&core().nil_class)
    }
}

fn merge_param(params: &mut Vec<(String, Type)>, name: &str, ty: Type) {
    match params.iter_mut().find(|(n, _)| n == name) {
        Some(slot) => slot.1 = Type::union([slot.1.clone(), ty]),
        None => params.push((name.to_string(), ty)),
    }
}

/// How deep equality follows params before trusting the class alone.
/// Self-referential containers expand forever otherwise.
const EQ_PARAM_DEPTH: usize = 8;

impl InstanceType {
    fn eq_within(&self, other: &Self, depth: usize) -> bool {
        if Arc::ptr_eq(&self.0, &other.0) {
            return true;
        }
        if !self.0.class.ptr_eq(&other.0.class) {
            return false;
        }
        if depth == 0 {
            return true;
        }
        let (a, b) = (self.params(), other.params());
        a.len() == b.len()
            && a.iter().all(|(name, ty)| {
                b.iter()
                    .any(|(other_name, other_ty)| name == other_name && type_eq(ty, other_ty, depth - 1))
            })
    }
}

/// Same class and same resolved params. Where the params came from
/// (explicit or sampled) does not matter.
impl PartialEq for InstanceType {
    fn eq(&self, other: &Self) -> bool {
        self.eq_within(other, EQ_PARAM_DEPTH)
    }
}

impl fmt::Display for InstanceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = core();
        let class = &self.0.class;
        if class.ptr_eq(&c.nil_class) {
            return write!(f, "nil");
        }
        if class.ptr_eq(&c.true_class) {
            return write!(f, "true");
        }
        if class.ptr_eq(&c.false_class) {
            return write!(f, "false");
        }
        if self.is_container() && !self.0.samples.is_empty() && !self.params_resolved() {
            return write!(f, "{}[unresolved]", class);
        }
        let params = self.params();
        if params.is_empty() {
            return write!(f, "{}", class);
        }
        let inner: Vec<String> = params.iter().map(|(k, v)| format!("{k}: {v}")).collect();
        write!(f, "{}[{}]", class, inner.join(", "))
    }
}

impl fmt::Debug for InstanceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

// ── Type ───────────────────────────────────────────────────────────────

#[derive(Clone)]
pub enum Type {
    Singleton(Module),
    Instance(InstanceType),
    /// Two or more members, none of them a union.
    Union(Vec<Type>),
}

impl Type {
    pub fn singleton(module: &Module) -> Type {
        Type::Singleton(module.clone())
    }

    pub fn instance(class: &Module) -> Type {
        Type::Instance(InstanceType::new(class))
    }

    pub fn instance_with(class: &Module, params: Vec<(String, Type)>) -> Type {
        Type::Instance(InstanceType::with_params(class, params))
    }

    /// Flatten and merge `types` into one type.
    pub fn union<I: IntoIterator<Item = Type>>(types: I) -> Type {
        let mut singletons: Vec<Module> = Vec::new();
        let mut groups: Vec<(Module, Vec<InstanceType>)> = Vec::new();
        let flat = types.into_iter().flat_map(|ty| match ty {
            Type::Union(members) => members,
            other => vec![other],
        });
        for member in flat {
            match member {
                Type::Singleton(m) => {
                    if !singletons.iter().any(|s| s.ptr_eq(&m)) {
                        singletons.push(m);
                    }
                }
                Type::Instance(i) => match groups.iter_mut().find(|(c, _)| c.ptr_eq(i.class())) {
                    Some((_, members)) => members.push(i),
                    None => groups.push((i.class().clone(), vec![i])),
                },
                Type::Union(_) => {}
            }
        }

        let mut members: Vec<Type> = singletons.into_iter().map(Type::Singleton).collect();
        members.extend(
            groups
                .into_iter()
                .map(|(class, instances)| Type::Instance(merge_instances(&class, instances))),
        );
        match members.len() {
            0 => Type::object(),
            1 => members.pop().unwrap_or_else(Type::object),
            _ => Type::Union(members),
        }
    }

    /// The members of this type; a single-element list unless a union.
    pub fn types(&self) -> Vec<Type> {
        match self {
            Type::Union(members) => members.clone(),
            other => vec![other.clone()],
        }
    }

    pub fn as_instance(&self) -> Option<&InstanceType> {
        match self {
            Type::Instance(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_singleton(&self) -> Option<&Module> {
        match self {
            Type::Singleton(m) => Some(m),
            _ => None,
        }
    }

    /// Whether this is an instance of exactly `class`.
    pub fn is_instance_of(&self, class: &Module) -> bool {
        self.as_instance().is_some_and(|i| i.class().ptr_eq(class))
    }

    pub fn nillable(&self) -> bool {
        self.types()
            .iter()
            .any(|t| t.as_instance().is_some_and(InstanceType::is_nil))
    }

    /// This type without its `nil` members.
    pub fn nonnillable(&self) -> Type {
        Type::union(
            self.types()
                .into_iter()
                .filter(|t| !t.as_instance().is_some_and(InstanceType::is_nil)),
        )
    }

    /// Map `f` over every member and union the results.
    pub fn transform(&self, f: impl Fn(&Type) -> Type) -> Type {
        Type::union(self.types().iter().map(f))
    }

    /// Param `name` of an instance type; unions join their members' params.
    pub fn param(&self, name: &str) -> Option<Type> {
        match self {
            Type::Instance(i) => i.param(name).cloned(),
            Type::Singleton(_) => None,
            Type::Union(members) => {
                let found: Vec<Type> = members.iter().filter_map(|m| m.param(name)).collect();
                if found.is_empty() {
                    None
                } else {
                    Some(Type::union(found))
                }
            }
        }
    }

    // ── Capabilities ───────────────────────────────────────────────────

    /// Names callable with an explicit receiver.
    pub fn methods(&self, declared: &dyn DeclaredMethods) -> Vec<String> {
        self.collect_methods(declared, false)
    }

    /// Names callable from inside, private ones included.
    pub fn all_methods(&self, declared: &dyn DeclaredMethods) -> Vec<String> {
        self.collect_methods(declared, true)
    }

    fn collect_methods(&self, declared: &dyn DeclaredMethods, private: bool) -> Vec<String> {
        let mut names: FxHashSet<String> = FxHashSet::default();
        for member in self.types() {
            match &member {
                Type::Singleton(m) => {
                    let object = Object::module(m);
                    names.extend(object.methods());
                    if private {
                        names.extend(object.private_methods());
                    }
                    names.extend(declared_names(declared, m, true, private));
                }
                Type::Instance(i) => {
                    let class = i.class();
                    names.extend(declared_names(declared, class, false, private));
                    names.extend(class.instance_methods());
                    if private {
                        names.extend(class.private_instance_methods());
                    }
                    for object in sample(i.samples(), OBJECT_TO_TYPE_SAMPLE_SIZE) {
                        names.extend(object.singleton_methods());
                        if private {
                            names.extend(object.private_singleton_methods());
                        }
                    }
                }
                Type::Union(_) => {}
            }
        }
        let mut names: Vec<String> = names.into_iter().collect();
        names.sort();
        names
    }

    /// Constants reachable through `::` on this type.
    pub fn constants(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .types()
            .iter()
            .filter_map(Type::as_singleton)
            .flat_map(Module::constants)
            .collect();
        names.sort();
        names.dedup();
        names
    }

    // ── Well-known types ───────────────────────────────────────────────

    pub fn nil() -> Type {
        Type::instance(&core().nil_class)
    }

    pub fn object() -> Type {
        Type::instance(&core().object)
    }

    pub fn true_() -> Type {
        Type::instance(&core().true_class)
    }

    pub fn false_() -> Type {
        Type::instance(&core().false_class)
    }

    pub fn boolean() -> Type {
        Type::union([Type::true_(), Type::false_()])
    }

    pub fn symbol() -> Type {
        Type::instance(&core().symbol)
    }

    pub fn string() -> Type {
        Type::instance(&core().string)
    }

    pub fn integer() -> Type {
        Type::instance(&core().integer)
    }

    pub fn float() -> Type {
        Type::instance(&core().float)
    }

    pub fn rational() -> Type {
        Type::instance(&core().rational)
    }

    pub fn complex() -> Type {
        Type::instance(&core().complex)
    }

    pub fn range() -> Type {
        Type::instance(&core().range)
    }

    pub fn regexp() -> Type {
        Type::instance(&core().regexp)
    }

    pub fn array() -> Type {
        Type::instance(&core().array)
    }

    pub fn hash() -> Type {
        Type::instance(&core().hash)
    }

    pub fn class() -> Type {
        Type::instance(&core().class)
    }

    pub fn module() -> Type {
        Type::instance(&core().module)
    }

    pub fn proc_() -> Type {
        Type::instance(&core().proc_)
    }

    /// `Array[Elem: union of types]`.
    pub fn array_of<I: IntoIterator<Item = Type>>(types: I) -> Type {
        Type::instance_with(&core().array, vec![("Elem".to_string(), Type::union(types))])
    }
}

fn merge_instances(class: &Module, mut instances: Vec<InstanceType>) -> InstanceType {
    if instances.len() == 1 {
        if let Some(only) = instances.pop() {
            return only;
        }
    }
    let mut params: Vec<(String, Vec<Type>)> = Vec::new();
    let mut samples: Vec<Object> = Vec::new();
    for instance in &instances {
        for (name, ty) in instance.raw_params() {
            match params.iter_mut().find(|(n, _)| n == name) {
                Some((_, types)) => types.push(ty.clone()),
                None => params.push((name.clone(), vec![ty.clone()])),
            }
        }
        samples.extend(instance.samples().iter().cloned());
    }
    let params = params
        .into_iter()
        .map(|(name, types)| (name, Type::union(types)))
        .collect();
    InstanceType::build(class, params, samples)
}

fn declared_names(
    declared: &dyn DeclaredMethods,
    module: &Module,
    singleton: bool,
    private: bool,
) -> Vec<String> {
    let mut out = Vec::new();
    for ancestor in module.ancestors() {
        let Some(name) = ancestor.name() else {
            continue;
        };
        for (method, visibility) in declared.declared_methods(name, singleton) {
            if private || !visibility.is_private() {
                out.push(method);
            }
        }
        if singleton {
            // Singleton lookups already walk the declared superclass chain.
            break;
        }
    }
    out
}

impl PartialEq for Type {
    /// Set equality over members.
    fn eq(&self, other: &Self) -> bool {
        type_eq(self, other, EQ_PARAM_DEPTH)
    }
}

fn type_eq(a: &Type, b: &Type, depth: usize) -> bool {
    let (a, b) = (a.types(), b.types());
    a.len() == b.len() && a.iter().all(|x| b.iter().any(|y| member_eq(x, y, depth)))
}

fn member_eq(a: &Type, b: &Type, depth: usize) -> bool {
    match (a, b) {
        (Type::Singleton(x), Type::Singleton(y)) => x.ptr_eq(y),
        (Type::Instance(x), Type::Instance(y)) => x.eq_within(y, depth),
        _ => false,
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Singleton(m) => write!(f, "{}.itself", m),
            Type::Instance(i) => write!(f, "{}", i),
            Type::Union(members) => {
                let mut names: Vec<String> = members.iter().map(ToString::to_string).collect();
                names.sort();
                write!(f, "{}", names.join(" | "))
            }
        }
    }
}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

// ── Live objects ───────────────────────────────────────────────────────

/// The type of one live object. Containers keep the object as a sample so
/// their element types can be derived later.
pub fn type_from_object(object: &Object) -> Type {
    match object {
        Object::Module(m) => Type::Singleton(m.clone()),
        Object::Instance(_) => {
            let class = match object.value() {
                Some(Value::Array(_)) => core().array.clone(),
                Some(Value::Hash(_)) => core().hash.clone(),
                _ => object.class(),
            };
            Type::Instance(InstanceType::with_samples(&class, vec![object.clone()]))
        }
    }
}

/// The union of the types of (a bounded sample of) `objects`.
pub fn union_type_from_objects(objects: &[Object]) -> Type {
    let picked = sample(objects, OBJECT_TO_TYPE_SAMPLE_SIZE);
    let mut modules: Vec<Module> = Vec::new();
    let mut groups: Vec<(Module, Vec<Object>)> = Vec::new();
    for object in picked {
        match &object {
            Object::Module(m) => {
                if !modules.iter().any(|x| x.ptr_eq(m)) {
                    modules.push(m.clone());
                }
            }
            Object::Instance(_) => {
                let class = object.class();
                match groups.iter_mut().find(|(c, _)| c.ptr_eq(&class)) {
                    Some((_, members)) => members.push(object),
                    None => groups.push((class, vec![object])),
                }
            }
        }
    }
    let instances = groups
        .into_iter()
        .map(|(class, samples)| Type::Instance(InstanceType::with_samples(&class, samples)));
    Type::union(instances.chain(modules.into_iter().map(Type::Singleton)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_flattens_and_merges_same_class() {
        let nested = Type::union([Type::union([Type::integer(), Type::string()]), Type::string(), Type::nil()]);
        assert_eq!(nested.types().len(), 3);
        assert_eq!(nested, Type::union([Type::nil(), Type::integer(), Type::string()]));
    }

    #[test]
    fn degenerate_unions_collapse() {
        assert!(matches!(Type::union([Type::integer()]), Type::Instance(_)));
        assert_eq!(Type::union(Vec::new()), Type::object());
    }

    #[test]
    fn same_class_params_are_unioned() {
        let merged = Type::union([
            Type::array_of([Type::integer()]),
            Type::array_of([Type::string()]),
        ]);
        assert_eq!(merged.to_string(), "Array[Elem: Integer | String]");
    }

    #[test]
    fn singletons_deduplicate_by_identity() {
        let c = core();
        let t = Type::union([Type::singleton(&c.array), Type::singleton(&c.array), Type::array()]);
        assert_eq!(t.types().len(), 2);
        assert_eq!(t.to_string(), "Array | Array.itself");
    }

    #[test]
    fn nilability() {
        let t = Type::union([Type::nil(), Type::integer()]);
        assert!(t.nillable());
        assert_eq!(t.nonnillable(), Type::integer());
        assert!(!Type::integer().nillable());
    }

    #[test]
    fn transform_maps_members() {
        let c = core();
        let t = Type::union([Type::integer(), Type::string()]);
        let classes = t.transform(|m| match m {
            Type::Instance(i) => Type::singleton(i.class()),
            other => other.clone(),
        });
        assert_eq!(
            classes,
            Type::union([Type::singleton(&c.integer), Type::singleton(&c.string)])
        );
    }

    #[test]
    fn samples_are_expanded_lazily() {
        let array = Object::array(vec![Object::integer(1), Object::string("a")]);
        let t = type_from_object(&array);
        assert_eq!(t.to_string(), "Array[unresolved]");
        let inner = t.param("Elem").unwrap();
        assert_eq!(inner, Type::union([Type::integer(), Type::string()]));
        assert_eq!(t.to_string(), "Array[Elem: Integer | String]");
    }

    #[test]
    fn sampled_instances_equal_declared_ones() {
        assert_eq!(type_from_object(&Object::integer(7)), Type::integer());
        let array = type_from_object(&Object::array(vec![Object::integer(1)]));
        assert_eq!(array, Type::array_of([Type::integer()]));
        assert_ne!(array, Type::array_of([Type::string()]));
        assert_ne!(type_from_object(&Object::string("s")), Type::integer());
    }

    #[test]
    fn self_referential_arrays_compare_without_looping() {
        let a = Object::array(Vec::new());
        a.push(a.clone());
        let b = Object::array(Vec::new());
        b.push(b.clone());
        assert_eq!(type_from_object(&a), type_from_object(&b));
    }

    #[test]
    fn hash_samples_expand_keys_and_values() {
        let hash = Object::hash(vec![(Object::string("a"), Object::symbol("b"))]);
        let t = type_from_object(&hash);
        t.param("K");
        assert_eq!(t.to_string(), "Hash[K: String, V: Symbol]");
    }

    #[test]
    fn modules_become_singletons() {
        let t = type_from_object(&Object::module(&core().array));
        assert_eq!(t.to_string(), "Array.itself");
    }

    #[test]
    fn union_from_objects_groups_by_class() {
        let objects = vec![
            Object::integer(1),
            Object::integer(2),
            Object::nil(),
            Object::module(&core().string),
        ];
        let t = union_type_from_objects(&objects);
        assert_eq!(t.to_string(), "Integer | String.itself | nil");
        let ints = t.types().into_iter().find(|m| m.is_instance_of(&core().integer)).unwrap();
        assert_eq!(ints.as_instance().unwrap().samples().len(), 2);
    }

    #[test]
    fn declared_and_live_methods_are_combined() {
        struct Decl;
        impl DeclaredMethods for Decl {
            fn declared_methods(&self, class_name: &str, _: bool) -> Vec<(String, Visibility)> {
                if class_name == "Integer" {
                    vec![
                        ("declared_only".to_string(), Visibility::Public),
                        ("hidden".to_string(), Visibility::Private),
                    ]
                } else {
                    Vec::new()
                }
            }
        }
        let t = Type::integer();
        let methods = t.methods(&Decl);
        assert!(methods.contains(&"declared_only".to_string()));
        assert!(methods.contains(&"times".to_string()));
        assert!(!methods.contains(&"hidden".to_string()));
        assert!(t.all_methods(&Decl).contains(&"hidden".to_string()));
    }

    #[test]
    fn sampled_singleton_methods_are_listed() {
        let object = Object::instance_of(&core().object);
        object.define_singleton_method("only_on_me", Visibility::Public);
        let t = type_from_object(&object);
        assert!(t.methods(&()).contains(&"only_on_me".to_string()));
        assert!(!Type::object().methods(&()).contains(&"only_on_me".to_string()));
    }
}
