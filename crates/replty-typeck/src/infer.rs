//! The flow evaluator.
//!
//! One top-down pass from the program root toward the target node. Every
//! statement lexically before the target is evaluated against a [`Scope`],
//! so by the time the target is reached the scope holds the types of all
//! variables as the code before the cursor leaves them. The pass stops as
//! soon as the target has a type.
//!
//! Method and class bodies are skipped unless the target lies inside them.
//! Loops run once, as a branch that may or may not execute; there is no
//! fixed-point iteration.

use std::ptr;

use replty_ast::{CallOperator, Node, NodeKind, Parameters};
use replty_rt::{core, Binding, Module};
use rustc_hash::FxHashSet;
use tracing::trace;

use crate::error::AnalysisError;
use crate::resolve::{accessor_method_return_type, conversion_type, Resolver, TypeVars};
use crate::scope::{Frame, RootScope, Scope, ScopeSnapshot, BREAK, NEXT, RETURN};
use crate::types::Type;

/// Why evaluation stopped early.
enum Halt {
    /// The target was reached.
    Found(Type, ScopeSnapshot),
    Error(AnalysisError),
}

type Eval<T = Type> = Result<T, Halt>;

/// The block passed to a call.
enum BlockArg<'n> {
    /// `{ |x| ... }` / `do |x| ... end`
    Node(&'n Node),
    /// `&:name`
    Symbol { name: String, node: &'n Node },
    /// `&expr` with anything else.
    Opaque,
}

/// What the evaluator found at the target.
#[derive(Debug, Clone)]
pub struct TargetType {
    pub ty: Type,
    pub scope: ScopeSnapshot,
    /// Type of the probe node, if it was evaluated before the target.
    pub probed: Option<Type>,
}

/// Evaluate `root` until `target` has a type.
///
/// `path` is the ancestor chain of the node to dig into (the target and its
/// ancestors, or a longer chain that contains the target). `probe` names an
/// extra node whose type should be recorded on the way.
pub fn evaluate_target(
    resolver: Resolver<'_>,
    binding: &Binding,
    root: &Node,
    path: &[&Node],
    target: &Node,
    probe: Option<&Node>,
    max_depth: usize,
) -> Result<Option<TargetType>, AnalysisError> {
    let mut evaluator = Evaluator {
        resolver,
        dig: path.iter().map(|n| *n as *const Node).collect(),
        target: target as *const Node,
        probe: probe.map(|p| (p as *const Node, None)),
        depth: 0,
        max_depth,
    };
    let mut base = RootScope::new(binding, &root.declared_locals());
    let labels = [BREAK, NEXT, RETURN].map(|l| (l.to_string(), None));
    let mut scope = Scope::with_table(&mut base, labels);
    match evaluator.evaluate(root, &mut scope) {
        Ok(_) => Ok(None),
        Err(Halt::Found(ty, scope)) => Ok(Some(TargetType {
            ty,
            scope,
            probed: evaluator.probe.and_then(|(_, ty)| ty),
        })),
        Err(Halt::Error(err)) => Err(err),
    }
}

struct Evaluator<'a> {
    resolver: Resolver<'a>,
    dig: FxHashSet<*const Node>,
    target: *const Node,
    probe: Option<(*const Node, Option<Type>)>,
    depth: usize,
    max_depth: usize,
}

impl<'a> Evaluator<'a> {
    fn evaluate(&mut self, node: &Node, scope: &mut Scope<'_>) -> Eval {
        if self.depth >= self.max_depth {
            return Err(Halt::Error(AnalysisError::DepthLimit {
                limit: self.max_depth,
                span: node.range,
            }));
        }
        self.depth += 1;
        let result = self.evaluate_node(node, scope);
        self.depth -= 1;
        let ty = result?;

        if let Some((probe, slot)) = &mut self.probe {
            if ptr::eq(*probe, node) {
                *slot = Some(ty.clone());
            }
        }
        if ptr::eq(self.target, node) {
            return Err(Halt::Found(ty, scope.snapshot()));
        }
        Ok(ty)
    }

    fn digs_into(&self, node: &Node) -> bool {
        self.dig.contains(&(node as *const Node))
    }

    fn evaluate_opt(&mut self, node: Option<&Node>, scope: &mut Scope<'_>) -> Eval {
        match node {
            Some(node) => self.evaluate(node, scope),
            None => Ok(Type::nil()),
        }
    }

    fn evaluate_node(&mut self, node: &Node, scope: &mut Scope<'_>) -> Eval {
        use NodeKind::*;

        match &node.kind {
            Program(statements) => self.evaluate(statements, scope),
            Statements(items) => {
                let mut last = Type::nil();
                for item in items {
                    last = self.evaluate(item, scope)?;
                }
                Ok(last)
            }
            Parentheses(inner) | Else(inner) => self.evaluate_opt(inner.as_deref(), scope),

            // ── Literals ───────────────────────────────────────────────
            Nil => Ok(Type::nil()),
            True => Ok(Type::true_()),
            False => Ok(Type::false_()),
            SelfRef => Ok(scope.self_type()),
            Integer(_) => Ok(Type::integer()),
            Float(_) => Ok(Type::float()),
            Rational(_) => Ok(Type::rational()),
            Imaginary(_) => Ok(Type::complex()),
            Str { .. } | XStr(_) => Ok(Type::string()),
            Symbol { .. } => Ok(Type::symbol()),
            Regexp(_) => Ok(Type::regexp()),
            InterpolatedStr(parts) | InterpolatedSymbol(parts) | InterpolatedRegexp(parts) => {
                for part in parts {
                    self.evaluate(part, scope)?;
                }
                Ok(match &node.kind {
                    InterpolatedSymbol(_) => Type::symbol(),
                    InterpolatedRegexp(_) => Type::regexp(),
                    _ => Type::string(),
                })
            }
            Array(items) => {
                let elem = self.evaluate_list_splat_items(items, scope)?;
                Ok(Type::array_of([elem]))
            }
            Hash(items) | KeywordHash(items) => self.evaluate_hash(items, scope),
            Range { left, right, .. } => {
                let mut bounds = Vec::new();
                for bound in [left, right].into_iter().flatten() {
                    bounds.push(self.evaluate(bound, scope)?);
                }
                let elem = Type::union(bounds).nonnillable();
                Ok(Type::instance_with(&core().range, vec![("Elem".to_string(), elem)]))
            }

            // ── Variables and constants ────────────────────────────────
            VarRead { name, .. } | VarTarget { name, .. } => Ok(scope.get(name).unwrap_or_else(Type::nil)),
            VarWrite { name, value, .. } => {
                let ty = self.evaluate(value, scope)?;
                scope.set(name, ty.clone());
                Ok(ty)
            }
            VarOpWrite {
                name,
                operator,
                value,
                ..
            } => {
                let left = scope.get(name).unwrap_or_else(Type::nil);
                let right = self.evaluate(value, scope)?;
                let ty = self.method_call(&left, operator, &[Some(right)], None, None, scope, false)?;
                scope.set(name, ty.clone());
                Ok(ty)
            }
            VarOrWrite { name, value, .. } => {
                let left = scope.get(name).unwrap_or_else(Type::nil);
                let right = scope.try_conditional(|s| self.evaluate(value, s))?;
                let kept = left
                    .types()
                    .into_iter()
                    .filter(|t| !t.is_instance_of(&core().nil_class));
                let ty = Type::union(kept.chain(right));
                scope.set(name, ty.clone());
                Ok(ty)
            }
            VarAndWrite { name, value, .. } => {
                let left = scope.get(name).unwrap_or_else(Type::nil);
                let right = scope.try_conditional(|s| self.evaluate(value, s))?;
                let ty = Type::union(std::iter::once(left).chain(right));
                scope.set(name, ty.clone());
                Ok(ty)
            }
            ConstRead(name) => Ok(scope.resolve_const(name).unwrap_or_else(Type::nil)),
            ConstPath { parent, name } => match parent {
                Some(parent) => {
                    let parent = self.evaluate(parent, scope)?;
                    Ok(parent
                        .as_singleton()
                        .and_then(|m| scope.get_const(m, name))
                        .unwrap_or_else(Type::nil))
                }
                None => Ok(scope.get_const(&core().object, name).unwrap_or_else(Type::nil)),
            },
            ConstWrite { name, value } => {
                let ty = self.evaluate(value, scope)?;
                let module = innermost_module(scope);
                scope.set_const(&module, name, ty.clone());
                Ok(ty)
            }
            ConstTarget(_) => Ok(Type::nil()),

            // ── Calls ──────────────────────────────────────────────────
            Call(_) => self.evaluate_call(node, scope),
            Arguments(items) => {
                for item in items {
                    self.evaluate(item, scope)?;
                }
                Ok(Type::nil())
            }
            BlockArgument(inner) => {
                self.evaluate_opt(inner.as_deref(), scope)?;
                Ok(Type::proc_())
            }
            Lambda { parameters, body } => {
                let mut table = declared_nil(node);
                table.extend([BREAK, NEXT, RETURN].map(|l| (l.to_string(), None)));
                let changes = {
                    let mut lambda_scope = Scope::with_table(scope, table);
                    lambda_scope.try_conditional(|s| {
                        self.assign_parameters(parameters, s, &[]);
                        self.evaluate_opt(body.as_deref(), s)
                    })?;
                    lambda_scope.merge_jumps();
                    lambda_scope.finish()
                };
                scope.update(&changes);
                Ok(Type::proc_())
            }
            Yield(args) | Super(args) => {
                self.evaluate_opt(args.as_deref(), scope)?;
                Ok(Type::object())
            }

            // ── Control flow ───────────────────────────────────────────
            If {
                predicate,
                statements,
                subsequent,
            } => {
                self.evaluate(predicate, scope)?;
                self.evaluate_branches(statements.as_deref(), subsequent.as_deref(), scope)
            }
            Unless {
                predicate,
                statements,
                else_clause,
            } => {
                self.evaluate(predicate, scope)?;
                self.evaluate_branches(statements.as_deref(), else_clause.as_deref(), scope)
            }
            Case {
                predicate,
                conditions,
                else_clause,
            } => {
                self.evaluate_opt(predicate.as_deref(), scope)?;
                let types = scope.try_run_branches(conditions.len() + 1, |i, s| match conditions.get(i) {
                    Some(when) => self.evaluate(when, s),
                    None => self.evaluate_opt(else_clause.as_deref(), s),
                })?;
                Ok(Type::union(types))
            }
            When {
                conditions,
                statements,
            } => {
                for condition in conditions {
                    self.evaluate(condition, scope)?;
                }
                self.evaluate_opt(statements.as_deref(), scope)
            }
            While {
                predicate,
                statements,
            }
            | Until {
                predicate,
                statements,
            } => {
                let (changes, breaks) = {
                    let mut inner = Scope::with_table(scope, [BREAK, NEXT].map(|l| (l.to_string(), None)));
                    self.evaluate(predicate, &mut inner)?;
                    if let Some(body) = statements {
                        inner.try_conditional(|s| self.evaluate(body, s))?;
                    }
                    inner.merge_jumps();
                    let breaks = inner.get(BREAK);
                    (inner.finish(), breaks)
                };
                scope.update(&changes);
                Ok(breaks.map_or_else(Type::nil, |b| Type::union([b, Type::nil()])))
            }
            For {
                index,
                collection,
                statements,
            } => {
                let collection = self.evaluate(collection, scope)?;
                let (changes, breaks) = {
                    let mut inner = Scope::with_table(scope, [BREAK, NEXT].map(|l| (l.to_string(), None)));
                    let (elem, non_array) = self.partition_to_array(&collection, "to_ary", &mut inner)?;
                    let elem = Type::union(elem.into_iter().chain(non_array));
                    self.assign_target(index, elem, &mut inner)?;
                    if let Some(body) = statements {
                        inner.try_conditional(|s| self.evaluate(body, s))?;
                    }
                    inner.merge_jumps();
                    let breaks = inner.get(BREAK);
                    (inner.finish(), breaks)
                };
                scope.update(&changes);
                Ok(match breaks {
                    Some(breaks) => Type::union([breaks, collection]),
                    None => collection,
                })
            }
            And { left, right } => {
                self.evaluate(left, scope)?;
                let right = scope.try_conditional(|s| self.evaluate(right, s))?;
                Ok(Type::union(right.into_iter().chain([Type::nil(), Type::false_()])))
            }
            Or { left, right } => {
                let left = self.evaluate(left, scope)?;
                let right = scope.try_conditional(|s| self.evaluate(right, s))?;
                Ok(Type::union(std::iter::once(left).chain(right)))
            }
            Return(value) | Break(value) | Next(value) => {
                let value = self.evaluate_jump_value(value.as_deref(), scope)?;
                let label = match &node.kind {
                    Return(_) => RETURN,
                    Break(_) => BREAK,
                    _ => NEXT,
                };
                scope.terminate_with(label, value);
                Ok(Type::nil())
            }

            // ── Exceptions ─────────────────────────────────────────────
            Begin {
                statements,
                rescue_clause,
                else_clause,
                ensure_clause,
            } => {
                let mut ty = self.evaluate_opt(statements.as_deref(), scope)?;
                if let Some(rescue) = rescue_clause {
                    let types = match else_clause {
                        Some(otherwise) => scope.try_run_branches(2, |i, s| {
                            if i == 0 {
                                self.evaluate(rescue, s)
                            } else {
                                self.evaluate(otherwise, s)
                            }
                        })?,
                        None => {
                            let rescued = scope.try_conditional(|s| self.evaluate(rescue, s))?;
                            std::iter::once(ty).chain(rescued).collect()
                        }
                    };
                    ty = Type::union(types);
                }
                if let Some(ensure) = ensure_clause {
                    self.evaluate(ensure, scope)?;
                }
                Ok(ty)
            }
            Rescue { subsequent, .. } => match subsequent {
                Some(next) => {
                    let types = scope.try_run_branches(2, |i, s| {
                        if i == 0 {
                            self.evaluate_rescue(node, s)
                        } else {
                            self.evaluate(next, s)
                        }
                    })?;
                    Ok(Type::union(types))
                }
                None => self.evaluate_rescue(node, scope),
            },
            RescueModifier {
                expression,
                rescue_expression,
            } => {
                let ty = self.evaluate(expression, scope)?;
                let rescued = scope.try_conditional(|s| self.evaluate(rescue_expression, s))?;
                Ok(Type::union(std::iter::once(ty).chain(rescued)))
            }

            // ── Definitions ────────────────────────────────────────────
            Def {
                receiver,
                parameters,
                body,
                ..
            } => self.evaluate_def(node, receiver.as_deref(), parameters, body.as_deref(), scope),
            Class {
                constant_path,
                superclass,
                body,
            } => self.evaluate_class_module(constant_path, superclass.as_deref(), body.as_deref(), true, scope),
            Module { constant_path, body } => {
                self.evaluate_class_module(constant_path, None, body.as_deref(), false, scope)
            }

            // ── Misc ───────────────────────────────────────────────────
            MultiWrite { targets, value } => self.evaluate_multi_write(targets, value, scope),
            Defined(inner) => {
                scope.try_conditional(|s| self.evaluate(inner, s))?;
                Ok(Type::union([Type::string(), Type::nil()]))
            }
            Missing => Ok(Type::nil()),
            Assoc { .. } | AssocSplat(_) | Splat(_) | Block { .. } => {
                for child in node.children() {
                    self.evaluate(child, scope)?;
                }
                Ok(Type::object())
            }
        }
    }

    // ── Collections ────────────────────────────────────────────────────

    /// Element type of a list that may contain `*splat` items.
    fn evaluate_list_splat_items(&mut self, items: &[Node], scope: &mut Scope<'_>) -> Eval {
        let mut types = Vec::new();
        for item in items {
            match &item.kind {
                NodeKind::Splat(inner) => {
                    let Some(inner) = inner else { continue };
                    let splat = self.evaluate(inner, scope)?;
                    let (elem, non_array) = self.partition_to_array(&splat.nonnillable(), "to_a", scope)?;
                    types.extend(elem);
                    types.extend(non_array);
                }
                _ => types.push(self.evaluate(item, scope)?),
            }
        }
        Ok(Type::union(types))
    }

    /// Split `value` into the element type of its array members (after
    /// converting with `method` where that yields an array) and the union of
    /// members that are not arrays.
    fn partition_to_array(
        &mut self,
        value: &Type,
        method: &str,
        scope: &mut Scope<'_>,
    ) -> Eval<(Option<Type>, Option<Type>)> {
        let array = &core().array;
        let mut elems = Vec::new();
        let mut others = Vec::new();
        for member in value.types() {
            if member.is_instance_of(array) {
                elems.push(member.param("Elem").unwrap_or_else(Type::object));
                continue;
            }
            let converted = self.method_call(&member, method, &[], None, None, scope, false)?;
            if converted.is_instance_of(array) {
                elems.push(converted.param("Elem").unwrap_or_else(Type::object));
            } else {
                others.push(member);
            }
        }
        let elem = (!elems.is_empty()).then(|| Type::union(elems));
        let other = (!others.is_empty()).then(|| Type::union(others));
        Ok((elem, other))
    }

    /// `size` values for destructuring `value`: the first may be the value
    /// itself, the rest are array elements.
    fn sized_splat(&mut self, value: &Type, method: &str, size: usize, scope: &mut Scope<'_>) -> Eval<Vec<Type>> {
        let (elem, non_array) = self.partition_to_array(value, method, scope)?;
        let first = Type::union(elem.iter().cloned().chain(non_array));
        let mut values = vec![first];
        if let Some(elem) = elem {
            values.extend(std::iter::repeat(elem).take(size.saturating_sub(1)));
        }
        Ok(values)
    }

    fn evaluate_hash(&mut self, items: &[Node], scope: &mut Scope<'_>) -> Eval {
        let mut keys = Vec::new();
        let mut values = Vec::new();
        for item in items {
            match &item.kind {
                NodeKind::Assoc { key, value } => {
                    keys.push(self.evaluate(key, scope)?);
                    values.push(self.evaluate(value, scope)?);
                }
                NodeKind::AssocSplat(inner) => {
                    let Some(inner) = inner else { continue };
                    let splat = self.evaluate(inner, scope)?;
                    let hash = self.method_call(&splat, "to_hash", &[], None, None, scope, false)?;
                    if let Some(k) = hash.param("K") {
                        keys.push(k);
                    }
                    if let Some(v) = hash.param("V") {
                        values.push(v);
                    }
                }
                _ => {
                    self.evaluate(item, scope)?;
                }
            }
        }
        if keys.is_empty() && values.is_empty() {
            return Ok(Type::hash());
        }
        Ok(Type::instance_with(
            &core().hash,
            vec![
                ("K".to_string(), Type::union(keys)),
                ("V".to_string(), Type::union(values)),
            ],
        ))
    }

    // ── Branches and jumps ─────────────────────────────────────────────

    fn evaluate_branches(&mut self, then: Option<&Node>, otherwise: Option<&Node>, scope: &mut Scope<'_>) -> Eval {
        let types = scope.try_run_branches(2, |i, s| {
            let branch = if i == 0 { then } else { otherwise };
            self.evaluate_opt(branch, s)
        })?;
        Ok(Type::union(types))
    }

    /// The value carried by `break`/`next`/`return`.
    fn evaluate_jump_value(&mut self, value: Option<&Node>, scope: &mut Scope<'_>) -> Eval {
        let Some(value) = value else {
            return Ok(Type::nil());
        };
        match &value.kind {
            NodeKind::Arguments(items) => match items.as_slice() {
                [single] if !matches!(single.kind, NodeKind::Splat(_)) => self.evaluate(single, scope),
                _ => {
                    let elem = self.evaluate_list_splat_items(items, scope)?;
                    Ok(Type::array_of([elem]))
                }
            },
            _ => self.evaluate(value, scope),
        }
    }

    fn evaluate_rescue(&mut self, node: &Node, scope: &mut Scope<'_>) -> Eval {
        let NodeKind::Rescue {
            exceptions,
            reference,
            statements,
            ..
        } = &node.kind
        else {
            return Ok(Type::nil());
        };
        let classes = self.evaluate_list_splat_items(exceptions, scope)?;
        if let Some(reference) = reference {
            let mut errors: Vec<Type> = classes
                .types()
                .iter()
                .filter_map(|t| t.as_singleton().filter(|m| m.is_class()).map(Type::instance))
                .collect();
            if errors.is_empty() {
                errors.push(Type::instance(&core().standard_error));
            }
            self.assign_target(reference, Type::union(errors), scope)?;
        }
        self.evaluate_opt(statements.as_deref(), scope)
    }

    // ── Assignment ─────────────────────────────────────────────────────

    fn assign_target(&mut self, target: &Node, value: Type, scope: &mut Scope<'_>) -> Eval<()> {
        match &target.kind {
            NodeKind::VarTarget { name, .. } => scope.set(name, value),
            NodeKind::ConstTarget(name) => {
                let module = innermost_module(scope);
                scope.set_const(&module, name, value);
            }
            NodeKind::Splat(Some(inner)) => self.assign_target(inner, Type::array_of([value]), scope)?,
            NodeKind::MultiWrite { targets, .. } => {
                let values = self.sized_splat(&value, "to_ary", targets.len(), scope)?;
                self.assign_targets(targets, &values, scope)?;
            }
            // Attribute targets only need their receiver.
            NodeKind::Call(call) => {
                if let Some(receiver) = &call.receiver {
                    self.evaluate(receiver, scope)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn assign_targets(&mut self, targets: &[Node], values: &[Type], scope: &mut Scope<'_>) -> Eval<()> {
        let value_at = |i: usize| values.get(i).cloned().unwrap_or_else(Type::nil);
        match targets.iter().position(|t| matches!(t.kind, NodeKind::Splat(_))) {
            None => {
                for (i, target) in targets.iter().enumerate() {
                    self.assign_target(target, value_at(i), scope)?;
                }
            }
            Some(rest) => {
                let posts = targets.len() - rest - 1;
                for (i, target) in targets[..rest].iter().enumerate() {
                    self.assign_target(target, value_at(i), scope)?;
                }
                let middle_end = values.len().saturating_sub(posts).max(rest);
                let middle: Vec<Type> = values.get(rest..middle_end).unwrap_or_default().to_vec();
                if let NodeKind::Splat(Some(inner)) = &targets[rest].kind {
                    self.assign_target(inner, Type::array_of(middle), scope)?;
                }
                for (j, target) in targets[rest + 1..].iter().enumerate() {
                    self.assign_target(target, value_at(middle_end + j), scope)?;
                }
            }
        }
        Ok(())
    }

    fn evaluate_multi_write(&mut self, targets: &[Node], value: &Node, scope: &mut Scope<'_>) -> Eval {
        let (values, result) = match &value.kind {
            NodeKind::Array(items) if !items.iter().any(|i| matches!(i.kind, NodeKind::Splat(_))) => {
                let mut values = Vec::new();
                for item in items {
                    values.push(self.evaluate(item, scope)?);
                }
                let result = Type::array_of(values.clone());
                (values, result)
            }
            _ => {
                let ty = self.evaluate(value, scope)?;
                (self.sized_splat(&ty, "to_ary", targets.len(), scope)?, ty)
            }
        };
        self.assign_targets(targets, &values, scope)?;
        Ok(result)
    }

    /// Bind block, lambda or method parameters to the given argument types.
    fn assign_parameters(&mut self, params: &Parameters, scope: &mut Scope<'_>, args: &[Type]) {
        let positional = params.required.len() + params.optional.len() + params.post.len() + usize::from(params.rest.is_some());
        let mut args: Vec<Type> = args.to_vec();
        if positional >= 2 && args.len() == 1 {
            let first = args.remove(0);
            args = self.splat_values(&first, positional);
        }

        let take = |args: &mut Vec<Type>, n: usize| -> Vec<Type> { args.drain(..n.min(args.len())).collect() };
        let reqs = take(&mut args, params.required.len());
        let (opts, rest, posts) = if params.rest.is_some() {
            let opts = take(&mut args, params.optional.len());
            let posts_at = args.len().saturating_sub(params.post.len());
            let posts = args.split_off(posts_at);
            (opts, args, posts)
        } else {
            let posts_at = args.len().saturating_sub(params.post.len());
            let posts = args.split_off(posts_at);
            (args, Vec::new(), posts)
        };

        for (i, name) in params.required.iter().enumerate() {
            scope.set(name, reqs.get(i).cloned().unwrap_or_else(Type::object));
        }
        for (i, name) in params.optional.iter().enumerate() {
            scope.set(name, opts.get(i).cloned().unwrap_or_else(Type::object));
        }
        for (i, name) in params.post.iter().enumerate() {
            scope.set(name, posts.get(i).cloned().unwrap_or_else(Type::object));
        }
        if let Some(name) = &params.rest {
            scope.set(name, Type::array_of(rest));
        }
        for name in &params.keywords {
            scope.set(name, Type::object());
        }
        if let Some(name) = &params.keyword_rest {
            scope.set(
                name,
                Type::instance_with(
                    &core().hash,
                    vec![("K".to_string(), Type::symbol()), ("V".to_string(), Type::object())],
                ),
            );
        }
        if let Some(name) = &params.block {
            scope.set(name, Type::proc_());
        }
    }

    /// Destructure one block argument over several parameters, using only
    /// declared signatures.
    fn splat_values(&self, value: &Type, size: usize) -> Vec<Type> {
        let array = &core().array;
        let mut elems = Vec::new();
        let mut others = Vec::new();
        for member in value.types() {
            if member.is_instance_of(array) {
                elems.push(member.param("Elem").unwrap_or_else(Type::object));
            } else {
                let converted = self.resolver.method_return_type(&member, "to_ary");
                if converted.is_instance_of(array) {
                    elems.push(converted.param("Elem").unwrap_or_else(Type::object));
                } else {
                    others.push(member);
                }
            }
        }
        let elem = (!elems.is_empty()).then(|| Type::union(elems));
        let first = Type::union(elem.iter().cloned().chain(others));
        let mut values = vec![first];
        if let Some(elem) = elem {
            values.extend(std::iter::repeat(elem).take(size.saturating_sub(1)));
        }
        values
    }

    // ── Calls ──────────────────────────────────────────────────────────

    fn evaluate_call(&mut self, node: &Node, scope: &mut Scope<'_>) -> Eval {
        let NodeKind::Call(call) = &node.kind else {
            return Ok(Type::object());
        };
        let receiver = match &call.receiver {
            Some(receiver) => self.evaluate(receiver, scope)?,
            None => scope.self_type(),
        };
        if call.operator == Some(CallOperator::SafeNav) {
            let nonnil = receiver.nonnillable();
            let result = scope.try_conditional(|s| self.evaluate_method(node, &nonnil, s))?;
            let mut types: Vec<Type> = result.into_iter().collect();
            if receiver.nillable() {
                types.push(Type::nil());
            }
            return Ok(Type::union(types));
        }
        self.evaluate_method(node, &receiver, scope)
    }

    fn evaluate_method(&mut self, node: &Node, receiver: &Type, scope: &mut Scope<'_>) -> Eval {
        let NodeKind::Call(call) = &node.kind else {
            return Ok(Type::object());
        };
        let mut arguments: Vec<&Node> = call.argument_nodes().iter().collect();
        let keyword_hash = match arguments.last().copied() {
            Some(Node {
                kind: NodeKind::KeywordHash(items),
                ..
            }) => {
                arguments.pop();
                Some(items)
            }
            _ => None,
        };

        let mut args: Vec<Option<Type>> = Vec::new();
        for arg in arguments {
            match &arg.kind {
                NodeKind::Splat(inner) => {
                    self.evaluate_opt(inner.as_deref(), scope)?;
                    args.push(None);
                }
                _ => args.push(Some(self.evaluate(arg, scope)?)),
            }
        }

        let mut kwargs: Option<Vec<(String, Type)>> = None;
        if let Some(items) = keyword_hash {
            let mut pairs = Vec::new();
            for item in items {
                match &item.kind {
                    NodeKind::Assoc { key, value } => match &key.kind {
                        NodeKind::Symbol { value: name, .. } => {
                            pairs.push((name.clone(), self.evaluate(value, scope)?));
                        }
                        _ => {
                            self.evaluate(key, scope)?;
                            self.evaluate(value, scope)?;
                        }
                    },
                    _ => {
                        self.evaluate(item, scope)?;
                    }
                }
            }
            kwargs = Some(pairs);
        }

        let block = match call.block.as_deref() {
            Some(block @ Node {
                kind: NodeKind::Block { .. },
                ..
            }) => Some(BlockArg::Node(block)),
            Some(Node {
                kind: NodeKind::BlockArgument(inner),
                ..
            }) => match inner.as_deref() {
                Some(sym @ Node {
                    kind: NodeKind::Symbol { value, .. },
                    ..
                }) => Some(BlockArg::Symbol {
                    name: value.clone(),
                    node: sym,
                }),
                Some(other) => {
                    self.evaluate(other, scope)?;
                    Some(BlockArg::Opaque)
                }
                None => Some(BlockArg::Opaque),
            },
            _ => None,
        };

        let result = self.method_call(receiver, &call.name, &args, kwargs.as_deref(), block, scope, true)?;
        if call.is_attribute_write() {
            return Ok(args.last().cloned().flatten().unwrap_or_else(Type::nil));
        }
        Ok(result)
    }

    /// Type of calling `name` on `receiver`, running the block (if any)
    /// with the parameter types the selected signatures declare.
    ///
    /// With `name_match` off, only declared signatures are consulted; the
    /// name-based fallbacks are skipped.
    #[allow(clippy::too_many_arguments)]
    fn method_call(
        &mut self,
        receiver: &Type,
        name: &str,
        args: &[Option<Type>],
        kwargs: Option<&[(String, Type)]>,
        block: Option<BlockArg<'_>>,
        scope: &mut Scope<'_>,
        name_match: bool,
    ) -> Eval {
        let matches = self
            .resolver
            .resolve_method(receiver, name, args, kwargs, block.is_some());
        let mut types = Vec::new();
        let mut breaks = Vec::new();
        let mut block_called = false;
        let mut bottoms = 0;

        for candidate in &matches {
            let mut vars: TypeVars = candidate
                .receiver
                .as_instance()
                .map(|i| i.params().iter().cloned().collect())
                .unwrap_or_default();
            let free: Vec<String> = candidate
                .method
                .free_variables()
                .into_iter()
                .filter(|v| !vars.contains_key(v))
                .collect();
            vars.extend(
                self.resolver
                    .unify_free_variables(&free, &candidate.expected, &candidate.given),
            );

            if let (Some(block), Some(block_type)) = (&block, &candidate.method.block) {
                let params: Vec<Type> = block_type
                    .function
                    .required_positionals
                    .iter()
                    .map(|p| self.resolver.apply_return_type(p, &candidate.receiver, &vars))
                    .collect();
                let self_type = block_type
                    .self_type
                    .as_ref()
                    .map(|t| self.resolver.apply_return_type(t, &candidate.receiver, &vars));
                let (response, block_breaks) = self.call_block(block, &params, self_type, scope)?;
                block_called = true;
                breaks.extend(block_breaks);
                let unbound: Vec<String> = free.iter().filter(|v| !vars.contains_key(*v)).cloned().collect();
                let unified = self.resolver.unify_free_variables(
                    &unbound,
                    std::slice::from_ref(&block_type.function.return_type),
                    std::slice::from_ref(&response),
                );
                vars.extend(unified);
            }

            if candidate.method.returns_bottom() {
                bottoms += 1;
            } else {
                types.push(self.resolver.apply_return_type(
                    &candidate.method.function.return_type,
                    &candidate.receiver,
                    &vars,
                ));
            }
        }

        if !block_called {
            if let Some(block) = &block {
                let (_, block_breaks) = self.call_block(block, &[], None, scope)?;
                breaks.extend(block_breaks);
            }
        }

        if name == "new" {
            for member in receiver.types() {
                if let Type::Singleton(class) = member {
                    if class.is_class() {
                        types.push(Type::instance(&class));
                    }
                }
            }
        }
        if matches.is_empty() && types.is_empty() && name_match {
            if let Some(ty) = conversion_type(name).or_else(|| accessor_method_return_type(receiver, name)) {
                types.push(ty);
            }
        }

        let terminates = !matches.is_empty() && bottoms == matches.len();
        if terminates && breaks.is_empty() {
            scope.terminate();
        }
        trace!(method = name, receiver = %receiver, matches = matches.len(), terminates, "method call");
        types.extend(breaks);
        Ok(Type::union(types))
    }

    /// Run a block with `args`. Returns the block's result type and the
    /// type of any `break` out of it.
    fn call_block(
        &mut self,
        block: &BlockArg<'_>,
        args: &[Type],
        self_type: Option<Type>,
        scope: &mut Scope<'_>,
    ) -> Eval<(Type, Option<Type>)> {
        match block {
            BlockArg::Opaque => Ok((Type::object(), None)),
            BlockArg::Symbol { name, node } => {
                let receiver = args.first().cloned().unwrap_or_else(Type::object);
                if ptr::eq(self.target, *node) {
                    return Err(Halt::Found(receiver, scope.snapshot()));
                }
                let rest: Vec<Option<Type>> = args.iter().skip(1).cloned().map(Some).collect();
                let ty = self.method_call(&receiver, name, &rest, None, None, scope, true)?;
                Ok((ty, None))
            }
            BlockArg::Node(node) => {
                let NodeKind::Block { parameters, body } = &node.kind else {
                    return Ok((Type::object(), None));
                };
                let result = scope.try_conditional(|s| {
                    let mut table = declared_nil(node);
                    table.extend([BREAK, NEXT].map(|l| (l.to_string(), None)));
                    let trace_ivar = self_type.is_none();
                    let (result, nexts, breaks, terminated, changes) = {
                        let mut block_scope = Scope::with_table(s, table)
                            .with_self_type(self_type.clone())
                            .trace_ivar(trace_ivar);
                        if parameters.is_empty() {
                            assign_numbered_parameters(body.as_deref(), &mut block_scope, args);
                        } else {
                            self.assign_parameters(parameters, &mut block_scope, args);
                        }
                        let result = self.evaluate_opt(body.as_deref(), &mut block_scope)?;
                        block_scope.merge_jumps();
                        let nexts = block_scope.get(NEXT);
                        let breaks = block_scope.get(BREAK);
                        let terminated = block_scope.is_terminated();
                        (result, nexts, breaks, terminated, block_scope.finish())
                    };
                    s.update(&changes);
                    let value = if terminated {
                        Type::union(nexts)
                    } else {
                        Type::union(std::iter::once(result).chain(nexts))
                    };
                    Ok((value, breaks))
                })?;
                Ok(result.unwrap_or_else(|| (Type::nil(), None)))
            }
        }
    }

    // ── Definitions ────────────────────────────────────────────────────

    fn evaluate_def(
        &mut self,
        node: &Node,
        receiver: Option<&Node>,
        parameters: &Parameters,
        body: Option<&Node>,
        scope: &mut Scope<'_>,
    ) -> Eval {
        let self_type = match receiver {
            Some(receiver) => self.evaluate(receiver, scope)?,
            None => scope.self_type().transform(|member| match member {
                Type::Singleton(m) if m.is_class() => Type::instance(m),
                other => other.clone(),
            }),
        };
        let Some(body) = body.filter(|b| self.digs_into(b)) else {
            return Ok(Type::symbol());
        };

        let mut table = declared_nil(node);
        table.extend([BREAK, NEXT, RETURN].map(|l| (l.to_string(), None)));
        let changes = {
            let mut method_scope = Scope::with_table(scope, table)
                .with_self_type(Some(self_type))
                .trace_lvar(false)
                .trace_ivar(false);
            self.assign_parameters(parameters, &mut method_scope, &[]);
            method_scope.try_conditional(|s| self.evaluate(body, s))?;
            method_scope.merge_jumps();
            method_scope.finish()
        };
        scope.update(&changes);
        Ok(Type::symbol())
    }

    fn evaluate_class_module(
        &mut self,
        constant_path: &Node,
        superclass: Option<&Node>,
        body: Option<&Node>,
        is_class: bool,
        scope: &mut Scope<'_>,
    ) -> Eval {
        let (owner, name) = match &constant_path.kind {
            NodeKind::ConstRead(name) => (innermost_module(scope), name.clone()),
            NodeKind::ConstPath { parent: Some(parent), name } => {
                let parent = self.evaluate(parent, scope)?;
                match parent.as_singleton() {
                    Some(m) => (m.clone(), name.clone()),
                    None => return Ok(Type::nil()),
                }
            }
            NodeKind::ConstPath { parent: None, name } => (core().object.clone(), name.clone()),
            // `class (expr)::Name` while still typing the expression
            _ => {
                self.evaluate(constant_path, scope)?;
                return Ok(Type::nil());
            }
        };
        let existing = self.evaluate(constant_path, scope)?;
        let superclass = match superclass {
            Some(node) => self.evaluate(node, scope)?.as_singleton().filter(|m| m.is_class()).cloned(),
            None => None,
        };

        let module = match existing.as_singleton() {
            Some(m) if m.is_class() == is_class => m.clone(),
            _ => {
                let full_name = match owner.name() {
                    Some(outer) if !owner.ptr_eq(&core().object) => format!("{}::{}", outer, name),
                    _ => name.clone(),
                };
                let module = if is_class {
                    let parent = superclass.unwrap_or_else(|| core().object.clone());
                    Module::new_class(Some(&full_name), Some(&parent))
                } else {
                    Module::new_module(Some(&full_name))
                };
                scope.set_const(&owner, &name, Type::singleton(&module));
                module
            }
        };

        let Some(body) = body.filter(|b| self.digs_into(b)) else {
            return Ok(Type::nil());
        };
        let (result, changes) = {
            let locals = body.declared_locals().into_iter().map(|l| (l, Some(Type::nil())));
            let mut module_scope = Scope::with_table(scope, locals)
                .with_self_type(Some(Type::singleton(&module)))
                .with_nesting(module)
                .trace_lvar(false)
                .trace_ivar(false);
            let result = self.evaluate(body, &mut module_scope)?;
            (result, module_scope.finish())
        };
        scope.update(&changes);
        Ok(result)
    }
}

/// The scope-opening node's declared locals, all bound to nil.
fn declared_nil(node: &Node) -> Vec<(String, Option<Type>)> {
    node.declared_locals()
        .into_iter()
        .map(|name| (name, Some(Type::nil())))
        .collect()
}

fn innermost_module(scope: &Scope<'_>) -> Module {
    scope
        .module_nesting()
        .into_iter()
        .next()
        .unwrap_or_else(|| core().object.clone())
}

/// Bind `_1`.. and `it` for a block without declared parameters, as far as
/// its body uses them.
fn assign_numbered_parameters(body: Option<&Node>, scope: &mut Scope<'_>, args: &[Type]) {
    let Some(body) = body else { return };
    let mut max = 0;
    let mut uses_it = false;
    let mut visit = vec![body];
    while let Some(node) = visit.pop() {
        let name = match &node.kind {
            NodeKind::VarRead { name, .. } => Some(name.as_str()),
            NodeKind::Call(call) if call.receiver.is_none() && call.arguments.is_none() => Some(call.name.as_str()),
            _ => None,
        };
        match name {
            Some("it") => uses_it = true,
            Some(n) => {
                if let Some(i) = n.strip_prefix('_').and_then(|d| d.parse::<usize>().ok()) {
                    if (1..=9).contains(&i) {
                        max = max.max(i);
                    }
                }
            }
            None => {}
        }
        visit.extend(node.children().into_iter().filter(|c| !c.opens_scope()));
    }
    let arg = |i: usize| args.get(i).cloned().unwrap_or_else(Type::object);
    for i in 0..max {
        scope.set(&format!("_{}", i + 1), arg(i));
    }
    if uses_it {
        scope.set("it", arg(0));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use replty_ast::node::build::*;
    use replty_ast::{layout, locate, TextSize};
    use replty_rt::Object;

    fn type_at_end(program_node: Node, binding: &Binding) -> Option<Type> {
        let (src, ast) = layout(program_node);
        let path = locate(&ast, TextSize::of(src.as_str()))?;
        let target = *path.last()?;
        let found = evaluate_target(Resolver::new(None), binding, &ast, &path, target, None, 64).ok()??;
        Some(found.ty)
    }

    #[test]
    fn literal_and_variable_types() {
        let binding = Binding::top_level();
        let ty = type_at_end(program(vec![lvar_write("a", string("x")), lvar("a")]), &binding);
        assert_eq!(ty, Some(Type::string()));
    }

    #[test]
    fn binding_locals_are_read_live() {
        let binding = Binding::top_level().with_local("n", Object::integer(3));
        let ty = type_at_end(program(vec![lvar("n")]), &binding).unwrap();
        assert!(ty.is_instance_of(&core().integer));
    }

    #[test]
    fn if_without_else_joins_nil() {
        let binding = Binding::top_level();
        let ty = type_at_end(
            program(vec![
                if_(true_(), vec![lvar_write("a", int(1))], None),
                lvar("a"),
            ]),
            &binding,
        )
        .unwrap();
        assert_eq!(ty, Type::union([Type::integer(), Type::nil()]));
    }

    #[test]
    fn depth_limit_is_reported() {
        let mut node = int(1);
        for _ in 0..20 {
            node = parens(node);
        }
        let (src, ast) = layout(program(vec![node]));
        let path = locate(&ast, TextSize::of(src.as_str())).unwrap();
        let target = *path.last().unwrap();
        let err = evaluate_target(Resolver::new(None), &Binding::top_level(), &ast, &path, target, None, 8).unwrap_err();
        assert!(matches!(err, AnalysisError::DepthLimit { limit: 8, .. }));
    }
}
