//! replty type completion: flow-sensitive type inference for REPL input.
//!
//! Given the AST of the code typed so far, the cursor offset and a snapshot
//! of the live execution context, this crate works out what the cursor is
//! completing (a method on some receiver, a local, a constant, ...) and the
//! types involved, then lists candidate names.
//!
//! # Architecture
//!
//! - [`types`]: the type model (`Type`: singleton, instance, union) and
//!   type derivation from live objects
//! - [`resolve`]: signature lookup, overload scoring and generic unification
//! - [`scope`]: flow-sensitive variable scopes with branch, merge and jump
//!   primitives
//! - [`infer`]: the flow evaluator, a single pass from the root to the target
//! - [`error`]: analysis errors
//! - [`diagnostics`]: ariadne rendering of analysis errors
//! - [`config`]: analyzer settings
//! - [`require`]: file completion for `require` and `require_relative`
//!
//! [`Completor`] ties these together and is the entry point for callers.

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod infer;
pub mod require;
pub mod resolve;
pub mod scope;
pub mod types;

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use replty_ast::{locate, CallOperator, Node, NodeKind, TextSize, VarKind};
use replty_rt::{core, Binding};
use replty_sig::{LoadState, SignatureDb, SignatureStore};
use tracing::debug;

pub use crate::config::AnalyzerConfig;
pub use crate::error::AnalysisError;
pub use crate::resolve::Resolver;
pub use crate::scope::ScopeSnapshot;
pub use crate::types::Type;

use crate::infer::{evaluate_target, TargetType};
use crate::types::DeclaredMethods;

/// What the cursor is completing.
#[derive(Debug, Clone)]
pub enum Target {
    /// The unterminated string argument of `require`/`require_relative`.
    Require { method: String, path: String },
    Symbol { name: String },
    /// A method on `receiver`. `self_call` is set for an explicit `self.`,
    /// which also offers private methods.
    Call { name: String, receiver: Type, self_call: bool },
    /// `Recv::name`, which may be a method or a constant.
    CallOrConst { name: String, receiver: Type, self_call: bool },
    /// A bare identifier. `kwarg` holds the receiver and method name of the
    /// call whose argument list the identifier sits in.
    LvarOrMethod { name: String, kwarg: Option<(Type, String)> },
    /// A constant, under `receiver` when qualified.
    Const { name: String, receiver: Option<Type> },
    Gvar { name: String },
    Ivar { name: String },
    Cvar { name: String },
}

impl Target {
    /// The partial name typed at the cursor.
    pub fn name(&self) -> &str {
        match self {
            Target::Require { path, .. } => path,
            Target::Symbol { name }
            | Target::Call { name, .. }
            | Target::CallOrConst { name, .. }
            | Target::LvarOrMethod { name, .. }
            | Target::Const { name, .. }
            | Target::Gvar { name }
            | Target::Ivar { name }
            | Target::Cvar { name } => name,
        }
    }
}

/// The result of one completion request.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub target: Target,
    /// The scope at the target, when one was evaluated.
    pub scope: Option<ScopeSnapshot>,
    db: Option<Arc<SignatureDb>>,
    /// Directories a `require` target is completed against.
    require_roots: Vec<PathBuf>,
}

impl Analysis {
    fn declared(&self) -> &dyn DeclaredMethods {
        match &self.db {
            Some(db) => &**db,
            None => &(),
        }
    }

    /// Candidate names starting with the typed prefix, sorted and without
    /// duplicates.
    pub fn candidates(&self) -> Vec<String> {
        let declared = self.declared();
        let mut names: Vec<String> = match &self.target {
            Target::Require { path, .. } => require::path_completions(path, &self.require_roots),
            Target::Symbol { .. } => Vec::new(),
            Target::Call {
                receiver,
                self_call,
                ..
            } => {
                if *self_call {
                    receiver.all_methods(declared)
                } else {
                    receiver.methods(declared)
                }
            }
            Target::CallOrConst {
                receiver,
                self_call,
                ..
            } => {
                let mut names = if *self_call {
                    receiver.all_methods(declared)
                } else {
                    receiver.methods(declared)
                };
                names.extend(receiver.constants());
                names
            }
            Target::LvarOrMethod { kwarg, .. } => {
                let mut names = Vec::new();
                if let Some(scope) = &self.scope {
                    names.extend(scope.local_variables.iter().cloned());
                    names.extend(scope.self_type.all_methods(declared));
                }
                if let Some((receiver, method)) = kwarg {
                    let resolver = Resolver::new(self.db.as_deref());
                    names.extend(
                        resolver
                            .keyword_names(receiver, method)
                            .into_iter()
                            .map(|k| format!("{}:", k)),
                    );
                }
                names
            }
            Target::Const { receiver, .. } => match (receiver, &self.scope) {
                (Some(receiver), _) => receiver.constants(),
                (None, Some(scope)) => scope.constants.clone(),
                (None, None) => Vec::new(),
            },
            Target::Gvar { .. } => self.scope_names(|s| &s.global_variables),
            Target::Ivar { .. } => self.scope_names(|s| &s.instance_variables),
            Target::Cvar { .. } => self.scope_names(|s| &s.class_variables),
        };
        let prefix = self.target.name();
        names.retain(|n| n.starts_with(prefix));
        names.sort();
        names.dedup();
        names
    }

    fn scope_names(&self, pick: impl Fn(&ScopeSnapshot) -> &Vec<String>) -> Vec<String> {
        self.scope.as_ref().map(|s| pick(s).clone()).unwrap_or_default()
    }
}

/// The completion engine: owns the signature store and records the last
/// analysis error.
pub struct Completor {
    store: Arc<SignatureStore>,
    config: AnalyzerConfig,
    last_error: Mutex<Option<AnalysisError>>,
}

impl Completor {
    /// A completor with its own store. Starts a background signature load
    /// when the config asks for one.
    pub fn new(config: AnalyzerConfig) -> Self {
        let store = Arc::new(SignatureStore::new());
        if config.preload && !config.signature_paths.is_empty() {
            store.preload(config.signature_paths.clone());
        }
        Completor::with_store(store, config)
    }

    /// A completor over an existing (possibly shared) store.
    pub fn with_store(store: Arc<SignatureStore>, config: AnalyzerConfig) -> Self {
        Completor {
            store,
            config,
            last_error: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn signature_state(&self) -> LoadState {
        self.store.state()
    }

    /// Load the configured signatures on the calling thread.
    pub fn load_signatures(&self) -> Result<(), AnalysisError> {
        self.store
            .load_paths(&self.config.signature_paths)
            .map_err(AnalysisError::from)
    }

    /// Start loading the configured signatures in the background. Returns
    /// `false` if a load was already started.
    pub fn preload_signatures(&self) -> bool {
        self.store.preload(self.config.signature_paths.clone())
    }

    /// The error that made the last failed request answer `None`.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().as_ref().map(ToString::to_string)
    }

    /// Take the last recorded error, leaving none.
    pub fn take_last_error(&self) -> Option<AnalysisError> {
        self.last_error.lock().take()
    }

    pub fn info(&self) -> String {
        format!("replty {}: {}", env!("CARGO_PKG_VERSION"), self.store.state())
    }

    /// Analyze the code in `ast` for completion at byte `offset`.
    ///
    /// Returns `None` when the cursor is not on something completable, or
    /// when analysis failed; in the latter case the error is kept for
    /// [`Completor::last_error`].
    pub fn analyze(&self, ast: &Node, offset: TextSize, binding: &Binding) -> Option<Analysis> {
        match self.try_analyze(ast, offset, binding) {
            Ok(analysis) => analysis,
            Err(err) => {
                debug!(error = %err, "completion analysis failed");
                *self.last_error.lock() = Some(err);
                None
            }
        }
    }

    fn try_analyze(&self, ast: &Node, offset: TextSize, binding: &Binding) -> Result<Option<Analysis>, AnalysisError> {
        if offset > ast.range.end() {
            return Err(AnalysisError::OffsetOutOfRange {
                offset,
                len: ast.range.end(),
            });
        }
        let Some(path) = locate(ast, offset) else {
            return Ok(None);
        };
        let Some((&target, parents)) = path.split_last() else {
            return Ok(None);
        };

        let db = self.store.get_arc();
        let resolver = Resolver::new(db.as_deref()).with_binding(binding);
        let evaluate = |node: &Node, probe: Option<&Node>| -> Result<Option<TargetType>, AnalysisError> {
            evaluate_target(resolver, binding, ast, &path, node, probe, self.config.max_depth)
        };
        let analysis = |target: Target, scope: Option<ScopeSnapshot>| Analysis {
            target,
            scope,
            db: db.clone(),
            require_roots: Vec::new(),
        };

        let result = match &target.kind {
            NodeKind::Str { content, closed: false } => match parents {
                [.., call, args] => match (&call.kind, &args.kind) {
                    (NodeKind::Call(c), NodeKind::Arguments(items))
                        if c.receiver.is_none()
                            && items.len() == 1
                            && matches!(c.name.as_str(), "require" | "require_relative") =>
                    {
                        let require_roots = if c.name == "require_relative" {
                            require::relative_root(binding.source_file()).into_iter().collect()
                        } else {
                            self.config.load_paths.clone()
                        };
                        Some(Analysis {
                            require_roots,
                            ..analysis(
                                Target::Require {
                                    method: c.name.clone(),
                                    path: content.clone(),
                                },
                                None,
                            )
                        })
                    }
                    _ => None,
                },
                _ => None,
            },
            NodeKind::Symbol { value, closed: false } => {
                if matches!(parents.last().map(|p| &p.kind), Some(NodeKind::BlockArgument(_))) {
                    evaluate(target, None)?.map(|found| {
                        analysis(
                            Target::Call {
                                name: value.clone(),
                                receiver: found.ty,
                                self_call: false,
                            },
                            Some(found.scope),
                        )
                    })
                } else if value.is_empty() {
                    None
                } else {
                    Some(analysis(Target::Symbol { name: value.clone() }, None))
                }
            }
            NodeKind::Call(call) if call.parenthesized => None,
            NodeKind::Call(call) => match call.receiver.as_deref() {
                None => self.lvar_or_method(&call.name, target, parents, &evaluate)?.map(|(t, s)| analysis(t, s)),
                Some(receiver) => evaluate(receiver, None)?.map(|found| {
                    let self_call = matches!(receiver.kind, NodeKind::SelfRef);
                    let name = call.name.clone();
                    let target = match call.operator {
                        Some(CallOperator::DoubleColon) => Target::CallOrConst {
                            name,
                            receiver: found.ty,
                            self_call,
                        },
                        Some(CallOperator::SafeNav) => Target::Call {
                            name,
                            receiver: found.ty.nonnillable(),
                            self_call,
                        },
                        _ => Target::Call {
                            name,
                            receiver: found.ty,
                            self_call,
                        },
                    };
                    analysis(target, Some(found.scope))
                }),
            },
            NodeKind::VarRead { kind, name } | NodeKind::VarTarget { kind, name } => match kind {
                VarKind::Local => self.lvar_or_method(name, target, parents, &evaluate)?.map(|(t, s)| analysis(t, s)),
                _ => evaluate(target, None)?.map(|found| {
                    let name = name.clone();
                    let target = match kind {
                        VarKind::Instance => Target::Ivar { name },
                        VarKind::Class => Target::Cvar { name },
                        _ => Target::Gvar { name },
                    };
                    analysis(target, Some(found.scope))
                }),
            },
            NodeKind::ConstRead(name) | NodeKind::ConstTarget(name) => evaluate(target, None)?.map(|found| {
                analysis(
                    Target::Const {
                        name: name.clone(),
                        receiver: None,
                    },
                    Some(found.scope),
                )
            }),
            NodeKind::ConstPath { parent, name } => {
                let receiver = match parent.as_deref() {
                    Some(parent) => match evaluate(parent, None)? {
                        Some(found) => found.ty,
                        None => return Ok(None),
                    },
                    None => Type::singleton(&core().object),
                };
                evaluate(target, None)?.map(|found| {
                    analysis(
                        Target::Const {
                            name: name.clone(),
                            receiver: Some(receiver),
                        },
                        Some(found.scope),
                    )
                })
            }
            _ => None,
        };
        Ok(result)
    }

    /// A bare identifier. Inside a call's argument list, also work out the
    /// called method's receiver so keyword names can be offered.
    fn lvar_or_method<F>(
        &self,
        name: &str,
        target: &Node,
        parents: &[&Node],
        evaluate: &F,
    ) -> Result<Option<(Target, Option<ScopeSnapshot>)>, AnalysisError>
    where
        F: Fn(&Node, Option<&Node>) -> Result<Option<TargetType>, AnalysisError>,
    {
        let kwarg_call = match parents {
            [.., call, args] => match (&call.kind, &args.kind) {
                (NodeKind::Call(c), NodeKind::Arguments(_)) => Some(c),
                _ => None,
            },
            _ => None,
        };
        let probe = kwarg_call.and_then(|c| c.receiver.as_deref());
        let Some(found) = evaluate(target, probe)? else {
            return Ok(None);
        };
        let kwarg = kwarg_call.and_then(|c| {
            let receiver = match &c.receiver {
                Some(_) => found.probed.clone()?,
                None => found.scope.self_type.clone(),
            };
            Some((receiver, c.name.clone()))
        });
        Ok(Some((
            Target::LvarOrMethod {
                name: name.to_string(),
                kwarg,
            },
            Some(found.scope),
        )))
    }
}

impl std::fmt::Debug for Completor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completor")
            .field("signatures", &self.store.state())
            .field("config", &self.config)
            .finish()
    }
}
