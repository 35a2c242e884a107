//! Type expressions and method types as they appear in signature files.
//!
//! These are declared types, not inferred ones. The analyzer interprets them
//! against a receiver type when it needs a concrete answer.

use std::collections::BTreeMap;

use replty_common::Visibility;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// A literal type such as `1`, `"a"` or `:sym`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Literal {
    Integer(i64),
    Float(f64),
    String(String),
    Symbol(String),
    Bool(bool),
}

/// A declared type expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TypeExpr {
    /// `self`
    #[serde(rename = "self")]
    SelfType,
    /// `instance`: an instance of the receiver's class.
    Instance,
    /// `class`: the receiver's class object.
    Class,
    Bool,
    Nil,
    /// `bot`: the method never returns normally.
    #[serde(alias = "bot")]
    Bottom,
    #[serde(alias = "untyped")]
    Any,
    Void,
    Top,
    Union { types: Vec<TypeExpr> },
    Intersection { types: Vec<TypeExpr> },
    Optional { inner: Box<TypeExpr> },
    Tuple { types: Vec<TypeExpr> },
    Record { fields: BTreeMap<String, TypeExpr> },
    Literal { value: Literal },
    /// A generic variable (`Elem`, `K`, ...).
    Variable { name: String },
    /// `Array[Integer]`
    ClassInstance {
        name: String,
        #[serde(default)]
        args: Vec<TypeExpr>,
    },
    /// `singleton(String)`
    ClassSingleton { name: String },
    /// `_Each[Elem]`
    Interface {
        name: String,
        #[serde(default)]
        args: Vec<TypeExpr>,
    },
    /// A named alias such as `int` or `string`.
    Alias { name: String },
    Proc,
}

impl Default for TypeExpr {
    fn default() -> Self {
        TypeExpr::Any
    }
}

impl TypeExpr {
    pub fn variable(name: &str) -> Self {
        TypeExpr::Variable {
            name: name.to_string(),
        }
    }

    pub fn class(name: &str, args: Vec<TypeExpr>) -> Self {
        TypeExpr::ClassInstance {
            name: name.to_string(),
            args,
        }
    }

    /// Replace generic variables named in `map`.
    pub fn substitute(&self, map: &FxHashMap<String, TypeExpr>) -> TypeExpr {
        let all = |types: &[TypeExpr]| -> Vec<TypeExpr> { types.iter().map(|t| t.substitute(map)).collect() };
        match self {
            TypeExpr::Variable { name } => map.get(name).cloned().unwrap_or_else(|| self.clone()),
            TypeExpr::Union { types } => TypeExpr::Union { types: all(types) },
            TypeExpr::Intersection { types } => TypeExpr::Intersection { types: all(types) },
            TypeExpr::Tuple { types } => TypeExpr::Tuple { types: all(types) },
            TypeExpr::Optional { inner } => TypeExpr::Optional {
                inner: Box::new(inner.substitute(map)),
            },
            TypeExpr::Record { fields } => TypeExpr::Record {
                fields: fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.substitute(map)))
                    .collect(),
            },
            TypeExpr::ClassInstance { name, args } => TypeExpr::ClassInstance {
                name: name.clone(),
                args: all(args),
            },
            TypeExpr::Interface { name, args } => TypeExpr::Interface {
                name: name.clone(),
                args: all(args),
            },
            _ => self.clone(),
        }
    }

    fn collect_variables(&self, out: &mut Vec<String>) {
        match self {
            TypeExpr::Variable { name } => {
                if !out.contains(name) {
                    out.push(name.clone());
                }
            }
            TypeExpr::Union { types }
            | TypeExpr::Intersection { types }
            | TypeExpr::Tuple { types }
            | TypeExpr::ClassInstance { args: types, .. }
            | TypeExpr::Interface { args: types, .. } => {
                for t in types {
                    t.collect_variables(out);
                }
            }
            TypeExpr::Optional { inner } => inner.collect_variables(out),
            TypeExpr::Record { fields } => {
                for t in fields.values() {
                    t.collect_variables(out);
                }
            }
            _ => {}
        }
    }
}

/// Parameter and return types of a callable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FunctionType {
    pub required_positionals: Vec<TypeExpr>,
    pub optional_positionals: Vec<TypeExpr>,
    pub rest_positionals: Option<TypeExpr>,
    pub trailing_positionals: Vec<TypeExpr>,
    pub required_keywords: BTreeMap<String, TypeExpr>,
    pub optional_keywords: BTreeMap<String, TypeExpr>,
    pub rest_keywords: Option<TypeExpr>,
    pub return_type: TypeExpr,
}

impl FunctionType {
    pub fn returning(return_type: TypeExpr) -> Self {
        FunctionType {
            return_type,
            ..FunctionType::default()
        }
    }

    pub fn accepts_keywords(&self) -> bool {
        !self.required_keywords.is_empty()
            || !self.optional_keywords.is_empty()
            || self.rest_keywords.is_some()
    }

    fn exprs(&self) -> impl Iterator<Item = &TypeExpr> {
        self.required_positionals
            .iter()
            .chain(&self.optional_positionals)
            .chain(&self.rest_positionals)
            .chain(&self.trailing_positionals)
            .chain(self.required_keywords.values())
            .chain(self.optional_keywords.values())
            .chain(&self.rest_keywords)
            .chain(std::iter::once(&self.return_type))
    }

    fn substitute(&self, map: &FxHashMap<String, TypeExpr>) -> FunctionType {
        let all = |types: &[TypeExpr]| -> Vec<TypeExpr> { types.iter().map(|t| t.substitute(map)).collect() };
        let keywords = |kw: &BTreeMap<String, TypeExpr>| -> BTreeMap<String, TypeExpr> {
            kw.iter()
                .map(|(k, v)| (k.clone(), v.substitute(map)))
                .collect()
        };
        FunctionType {
            required_positionals: all(&self.required_positionals),
            optional_positionals: all(&self.optional_positionals),
            rest_positionals: self.rest_positionals.as_ref().map(|t| t.substitute(map)),
            trailing_positionals: all(&self.trailing_positionals),
            required_keywords: keywords(&self.required_keywords),
            optional_keywords: keywords(&self.optional_keywords),
            rest_keywords: self.rest_keywords.as_ref().map(|t| t.substitute(map)),
            return_type: self.return_type.substitute(map),
        }
    }
}

/// The block a method accepts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockType {
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub function: FunctionType,
    /// Type of `self` inside the block, for `instance_eval`-style blocks.
    #[serde(default)]
    pub self_type: Option<TypeExpr>,
}

/// One overload of a method.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MethodType {
    #[serde(default)]
    pub type_params: Vec<String>,
    #[serde(default)]
    pub function: FunctionType,
    #[serde(default)]
    pub block: Option<BlockType>,
}

impl MethodType {
    pub fn returning(return_type: TypeExpr) -> Self {
        MethodType {
            function: FunctionType::returning(return_type),
            ..MethodType::default()
        }
    }

    /// Every generic variable mentioned by the parameters, return type and
    /// block, in first-seen order.
    pub fn free_variables(&self) -> Vec<String> {
        let mut out = Vec::new();
        for t in self.function.exprs() {
            t.collect_variables(&mut out);
        }
        if let Some(block) = &self.block {
            for t in block.function.exprs() {
                t.collect_variables(&mut out);
            }
            if let Some(self_type) = &block.self_type {
                self_type.collect_variables(&mut out);
            }
        }
        out
    }

    /// Whether the declared return type is `bot`.
    pub fn returns_bottom(&self) -> bool {
        self.function.return_type == TypeExpr::Bottom
    }

    /// Substitute class-level generic variables. The method's own type
    /// parameters shadow entries of `map`.
    pub fn substitute(&self, map: &FxHashMap<String, TypeExpr>) -> MethodType {
        if map.is_empty() {
            return self.clone();
        }
        let mut map = map.clone();
        for p in &self.type_params {
            map.remove(p);
        }
        MethodType {
            type_params: self.type_params.clone(),
            function: self.function.substitute(&map),
            block: self.block.as_ref().map(|b| BlockType {
                required: b.required,
                function: b.function.substitute(&map),
                self_type: b.self_type.as_ref().map(|t| t.substitute(&map)),
            }),
        }
    }
}

/// All overloads of one method name on one type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MethodDef {
    pub overloads: Vec<MethodType>,
    #[serde(default)]
    pub visibility: Visibility,
}

impl MethodDef {
    pub fn new(overloads: Vec<MethodType>) -> Self {
        MethodDef {
            overloads,
            visibility: Visibility::Public,
        }
    }

    pub fn substitute(&self, map: &FxHashMap<String, TypeExpr>) -> MethodDef {
        MethodDef {
            overloads: self.overloads.iter().map(|m| m.substitute(map)).collect(),
            visibility: self.visibility,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_expr_json_shape() {
        let json = r#"{"kind":"class_instance","name":"Array","args":[{"kind":"variable","name":"Elem"}]}"#;
        let parsed: TypeExpr = serde_json::from_str(json).unwrap();
        assert_eq!(parsed, TypeExpr::class("Array", vec![TypeExpr::variable("Elem")]));

        let parsed: TypeExpr = serde_json::from_str(r#"{"kind":"self"}"#).unwrap();
        assert_eq!(parsed, TypeExpr::SelfType);
        let parsed: TypeExpr = serde_json::from_str(r#"{"kind":"untyped"}"#).unwrap();
        assert_eq!(parsed, TypeExpr::Any);
        let parsed: TypeExpr = serde_json::from_str(r#"{"kind":"bot"}"#).unwrap();
        assert_eq!(parsed, TypeExpr::Bottom);
        let parsed: TypeExpr = serde_json::from_str(r#"{"kind":"bottom"}"#).unwrap();
        assert_eq!(parsed, TypeExpr::Bottom);
    }

    #[test]
    fn free_variables_cover_params_block_and_return() {
        let method = MethodType {
            type_params: vec!["U".into()],
            function: FunctionType {
                required_positionals: vec![TypeExpr::variable("Elem")],
                return_type: TypeExpr::class("Array", vec![TypeExpr::variable("U")]),
                ..FunctionType::default()
            },
            block: Some(BlockType {
                required: true,
                function: FunctionType {
                    required_positionals: vec![TypeExpr::variable("Elem")],
                    return_type: TypeExpr::variable("U"),
                    ..FunctionType::default()
                },
                self_type: None,
            }),
        };
        assert_eq!(method.free_variables(), vec!["Elem", "U"]);
    }

    #[test]
    fn substitution_respects_method_type_params() {
        let method = MethodType {
            type_params: vec!["U".into()],
            function: FunctionType {
                required_positionals: vec![TypeExpr::variable("Elem")],
                return_type: TypeExpr::variable("U"),
                ..FunctionType::default()
            },
            block: None,
        };
        let mut map = FxHashMap::default();
        map.insert("Elem".to_string(), TypeExpr::class("Integer", vec![]));
        map.insert("U".to_string(), TypeExpr::Nil);
        let substituted = method.substitute(&map);
        assert_eq!(
            substituted.function.required_positionals,
            vec![TypeExpr::class("Integer", vec![])]
        );
        assert_eq!(substituted.function.return_type, TypeExpr::variable("U"));
    }
}
