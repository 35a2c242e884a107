//! AST node definitions.
//!
//! Every node carries its byte range in the source text. Node kinds follow
//! the shapes the flow evaluator dispatches on; anything the parser cannot
//! express is reported as [`NodeKind::Missing`].

use rowan::TextRange;

/// Which variable table a variable node refers to.
///
/// The variable's name keeps its sigil (`@x`, `@@x`, `$x`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VarKind {
    Local,
    Instance,
    Class,
    Global,
}

/// The operator between a call's receiver and its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallOperator {
    /// `a.b`
    Dot,
    /// `a&.b`
    SafeNav,
    /// `A::b`
    DoubleColon,
}

impl CallOperator {
    pub fn as_str(self) -> &'static str {
        match self {
            CallOperator::Dot => ".",
            CallOperator::SafeNav => "&.",
            CallOperator::DoubleColon => "::",
        }
    }
}

/// Parameter names of a def, block or lambda.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parameters {
    pub required: Vec<String>,
    pub optional: Vec<String>,
    pub rest: Option<String>,
    pub post: Vec<String>,
    pub keywords: Vec<String>,
    pub keyword_rest: Option<String>,
    pub block: Option<String>,
}

impl Parameters {
    /// Only required positionals, the common block shape `|a, b|`.
    pub fn positional<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        Parameters {
            required: names.into_iter().map(Into::into).collect(),
            ..Parameters::default()
        }
    }

    /// All declared names in declaration order.
    pub fn names(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        out.extend(self.required.iter().map(String::as_str));
        out.extend(self.optional.iter().map(String::as_str));
        out.extend(self.rest.as_deref());
        out.extend(self.post.iter().map(String::as_str));
        out.extend(self.keywords.iter().map(String::as_str));
        out.extend(self.keyword_rest.as_deref());
        out.extend(self.block.as_deref());
        out
    }

    pub fn is_empty(&self) -> bool {
        self.names().is_empty()
    }
}

/// A method call, with or without receiver.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub receiver: Option<Box<Node>>,
    pub operator: Option<CallOperator>,
    pub name: String,
    /// An [`NodeKind::Arguments`] node.
    pub arguments: Option<Box<Node>>,
    /// A [`NodeKind::Block`] or [`NodeKind::BlockArgument`] node.
    pub block: Option<Box<Node>>,
    pub parenthesized: bool,
}

impl Call {
    pub fn argument_nodes(&self) -> &[Node] {
        match self.arguments.as_deref() {
            Some(Node {
                kind: NodeKind::Arguments(args),
                ..
            }) => args,
            _ => &[],
        }
    }

    /// `a.b = v` and `a[i] = v` style calls.
    pub fn is_attribute_write(&self) -> bool {
        self.receiver.is_some()
            && self.name.ends_with('=')
            && !matches!(self.name.as_str(), "==" | "!=" | "===" | "<=" | ">=")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub range: TextRange,
}

type Child = Option<Box<Node>>;

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Program(Box<Node>),
    Statements(Vec<Node>),
    Parentheses(Child),

    Nil,
    True,
    False,
    SelfRef,
    Integer(i64),
    Float(f64),
    Rational(String),
    Imaginary(String),
    Str { content: String, closed: bool },
    InterpolatedStr(Vec<Node>),
    XStr(String),
    /// `closed` is only true for a completed quoted symbol such as `:"a b"`.
    Symbol { value: String, closed: bool },
    InterpolatedSymbol(Vec<Node>),
    Regexp(String),
    InterpolatedRegexp(Vec<Node>),

    Array(Vec<Node>),
    Hash(Vec<Node>),
    Assoc { key: Box<Node>, value: Box<Node> },
    AssocSplat(Child),
    Splat(Child),
    Range { left: Child, right: Child, exclusive: bool },

    VarRead { kind: VarKind, name: String },
    VarWrite { kind: VarKind, name: String, value: Box<Node> },
    VarTarget { kind: VarKind, name: String },
    VarOpWrite { kind: VarKind, name: String, operator: String, value: Box<Node> },
    VarOrWrite { kind: VarKind, name: String, value: Box<Node> },
    VarAndWrite { kind: VarKind, name: String, value: Box<Node> },

    ConstRead(String),
    ConstPath { parent: Child, name: String },
    ConstWrite { name: String, value: Box<Node> },
    ConstTarget(String),

    Call(Call),
    Arguments(Vec<Node>),
    KeywordHash(Vec<Node>),
    BlockArgument(Child),
    Block { parameters: Parameters, body: Child },
    Lambda { parameters: Parameters, body: Child },

    If { predicate: Box<Node>, statements: Child, subsequent: Child },
    Unless { predicate: Box<Node>, statements: Child, else_clause: Child },
    Else(Child),
    Case { predicate: Child, conditions: Vec<Node>, else_clause: Child },
    When { conditions: Vec<Node>, statements: Child },
    While { predicate: Box<Node>, statements: Child },
    Until { predicate: Box<Node>, statements: Child },
    For { index: Box<Node>, collection: Box<Node>, statements: Child },
    And { left: Box<Node>, right: Box<Node> },
    Or { left: Box<Node>, right: Box<Node> },

    /// Value is an [`NodeKind::Arguments`] node when present.
    Return(Child),
    Break(Child),
    Next(Child),

    Begin { statements: Child, rescue_clause: Child, else_clause: Child, ensure_clause: Child },
    Rescue { exceptions: Vec<Node>, reference: Child, statements: Child, subsequent: Child },
    RescueModifier { expression: Box<Node>, rescue_expression: Box<Node> },

    Def { name: String, receiver: Child, parameters: Parameters, body: Child },
    Class { constant_path: Box<Node>, superclass: Child, body: Child },
    Module { constant_path: Box<Node>, body: Child },

    MultiWrite { targets: Vec<Node>, value: Box<Node> },
    Defined(Box<Node>),
    Yield(Child),
    Super(Child),
    Missing,
}

impl Node {
    /// A node with an empty range, to be placed by [`crate::layout`].
    pub fn new(kind: NodeKind) -> Self {
        Node {
            kind,
            range: TextRange::default(),
        }
    }

    pub fn boxed(kind: NodeKind) -> Box<Node> {
        Box::new(Node::new(kind))
    }

    /// Non-null children in source order.
    pub fn children(&self) -> Vec<&Node> {
        use NodeKind::*;

        let mut out: Vec<&Node> = Vec::new();
        fn opt<'a>(out: &mut Vec<&'a Node>, child: &'a Child) {
            if let Some(c) = child {
                out.push(c);
            }
        }

        match &self.kind {
            Program(s) => out.push(s),
            Statements(items) | InterpolatedStr(items) | InterpolatedSymbol(items)
            | InterpolatedRegexp(items) | Array(items) | Hash(items) | Arguments(items)
            | KeywordHash(items) => out.extend(items.iter()),
            Parentheses(c) | AssocSplat(c) | Splat(c) | BlockArgument(c) | Else(c)
            | Return(c) | Break(c) | Next(c) | Yield(c) | Super(c) => opt(&mut out, c),
            Assoc { key, value } => {
                out.push(key);
                out.push(value);
            }
            Range { left, right, .. } => {
                opt(&mut out, left);
                opt(&mut out, right);
            }
            VarWrite { value, .. }
            | VarOpWrite { value, .. }
            | VarOrWrite { value, .. }
            | VarAndWrite { value, .. }
            | ConstWrite { value, .. } => out.push(value),
            ConstPath { parent, .. } => opt(&mut out, parent),
            Call(call) => {
                opt(&mut out, &call.receiver);
                opt(&mut out, &call.arguments);
                opt(&mut out, &call.block);
            }
            Block { body, .. } | Lambda { body, .. } => opt(&mut out, body),
            If {
                predicate,
                statements,
                subsequent,
            } => {
                out.push(predicate);
                opt(&mut out, statements);
                opt(&mut out, subsequent);
            }
            Unless {
                predicate,
                statements,
                else_clause,
            } => {
                out.push(predicate);
                opt(&mut out, statements);
                opt(&mut out, else_clause);
            }
            Case {
                predicate,
                conditions,
                else_clause,
            } => {
                opt(&mut out, predicate);
                out.extend(conditions.iter());
                opt(&mut out, else_clause);
            }
            When {
                conditions,
                statements,
            } => {
                out.extend(conditions.iter());
                opt(&mut out, statements);
            }
            While {
                predicate,
                statements,
            }
            | Until {
                predicate,
                statements,
            } => {
                out.push(predicate);
                opt(&mut out, statements);
            }
            For {
                index,
                collection,
                statements,
            } => {
                out.push(index);
                out.push(collection);
                opt(&mut out, statements);
            }
            And { left, right } | Or { left, right } => {
                out.push(left);
                out.push(right);
            }
            Begin {
                statements,
                rescue_clause,
                else_clause,
                ensure_clause,
            } => {
                opt(&mut out, statements);
                opt(&mut out, rescue_clause);
                opt(&mut out, else_clause);
                opt(&mut out, ensure_clause);
            }
            Rescue {
                exceptions,
                reference,
                statements,
                subsequent,
            } => {
                out.extend(exceptions.iter());
                opt(&mut out, reference);
                opt(&mut out, statements);
                opt(&mut out, subsequent);
            }
            RescueModifier {
                expression,
                rescue_expression,
            } => {
                out.push(expression);
                out.push(rescue_expression);
            }
            Def { receiver, body, .. } => {
                opt(&mut out, receiver);
                opt(&mut out, body);
            }
            Class {
                constant_path,
                superclass,
                body,
            } => {
                out.push(constant_path);
                opt(&mut out, superclass);
                opt(&mut out, body);
            }
            Module {
                constant_path,
                body,
            } => {
                out.push(constant_path);
                opt(&mut out, body);
            }
            MultiWrite { targets, value } => {
                out.extend(targets.iter());
                out.push(value);
            }
            Defined(inner) => out.push(inner),
            Nil | True | False | SelfRef | Integer(_) | Float(_) | Rational(_)
            | Imaginary(_) | Str { .. } | XStr(_) | Symbol { .. } | Regexp(_)
            | VarRead { .. } | VarTarget { .. } | ConstRead(_) | ConstTarget(_) | Missing => {}
        }
        out
    }

    /// Whether this node starts a new local-variable scope.
    pub fn opens_scope(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::Program(_)
                | NodeKind::Def { .. }
                | NodeKind::Block { .. }
                | NodeKind::Lambda { .. }
                | NodeKind::Class { .. }
                | NodeKind::Module { .. }
        )
    }

    /// Local variable names introduced by this scope-opening node: its
    /// parameters followed by every local written in its body, without
    /// crossing into nested scope-opening nodes. First occurrence wins.
    pub fn declared_locals(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        let body = match &self.kind {
            NodeKind::Def {
                parameters, body, ..
            }
            | NodeKind::Block { parameters, body }
            | NodeKind::Lambda { parameters, body } => {
                for name in parameters.names() {
                    push_unique(&mut names, name);
                }
                body.as_deref()
            }
            NodeKind::Class { body, .. } | NodeKind::Module { body, .. } => body.as_deref(),
            NodeKind::Program(stmts) => Some(&**stmts),
            _ => Some(self),
        };
        if let Some(body) = body {
            collect_local_writes(body, &mut names);
        }
        names
    }

    /// Depth-first search for the first node satisfying `pred`.
    pub fn find(&self, pred: &dyn Fn(&Node) -> bool) -> Option<&Node> {
        if pred(self) {
            return Some(self);
        }
        self.children().into_iter().find_map(|c| c.find(pred))
    }
}

fn push_unique(names: &mut Vec<String>, name: &str) {
    if !names.iter().any(|n| n == name) {
        names.push(name.to_string());
    }
}

fn collect_local_writes(node: &Node, names: &mut Vec<String>) {
    match &node.kind {
        NodeKind::VarWrite {
            kind: VarKind::Local,
            name,
            ..
        }
        | NodeKind::VarTarget {
            kind: VarKind::Local,
            name,
        }
        | NodeKind::VarOpWrite {
            kind: VarKind::Local,
            name,
            ..
        }
        | NodeKind::VarOrWrite {
            kind: VarKind::Local,
            name,
            ..
        }
        | NodeKind::VarAndWrite {
            kind: VarKind::Local,
            name,
            ..
        } => push_unique(names, name),
        _ => {}
    }
    for child in node.children() {
        if !child.opens_scope() {
            collect_local_writes(child, names);
        }
    }
}

/// Range-less node constructors, for building trees in tests and demos.
///
/// Pair with [`crate::layout`] to obtain source text and real ranges.
pub mod build {
    use super::*;

    fn b(kind: NodeKind) -> Box<Node> {
        Node::boxed(kind)
    }

    fn statements_opt(body: Vec<Node>) -> Child {
        if body.is_empty() {
            None
        } else {
            Some(b(NodeKind::Statements(body)))
        }
    }

    pub fn program(statements: Vec<Node>) -> Node {
        Node::new(NodeKind::Program(b(NodeKind::Statements(statements))))
    }

    pub fn stmts(statements: Vec<Node>) -> Node {
        Node::new(NodeKind::Statements(statements))
    }

    pub fn parens(inner: Node) -> Node {
        Node::new(NodeKind::Parentheses(Some(Box::new(stmts(vec![inner])))))
    }

    pub fn nil() -> Node {
        Node::new(NodeKind::Nil)
    }

    pub fn true_() -> Node {
        Node::new(NodeKind::True)
    }

    pub fn false_() -> Node {
        Node::new(NodeKind::False)
    }

    pub fn self_() -> Node {
        Node::new(NodeKind::SelfRef)
    }

    pub fn int(value: i64) -> Node {
        Node::new(NodeKind::Integer(value))
    }

    pub fn float(value: f64) -> Node {
        Node::new(NodeKind::Float(value))
    }

    pub fn string(content: &str) -> Node {
        Node::new(NodeKind::Str {
            content: content.to_string(),
            closed: true,
        })
    }

    /// A string literal still missing its closing quote.
    pub fn open_string(content: &str) -> Node {
        Node::new(NodeKind::Str {
            content: content.to_string(),
            closed: false,
        })
    }

    pub fn sym(value: &str) -> Node {
        Node::new(NodeKind::Symbol {
            value: value.to_string(),
            closed: false,
        })
    }

    pub fn regexp(source: &str) -> Node {
        Node::new(NodeKind::Regexp(source.to_string()))
    }

    pub fn array(items: Vec<Node>) -> Node {
        Node::new(NodeKind::Array(items))
    }

    pub fn hash(pairs: Vec<(Node, Node)>) -> Node {
        Node::new(NodeKind::Hash(
            pairs.into_iter().map(|(k, v)| assoc(k, v)).collect(),
        ))
    }

    pub fn assoc(key: Node, value: Node) -> Node {
        Node::new(NodeKind::Assoc {
            key: Box::new(key),
            value: Box::new(value),
        })
    }

    pub fn keyword_hash(pairs: Vec<(Node, Node)>) -> Node {
        Node::new(NodeKind::KeywordHash(
            pairs.into_iter().map(|(k, v)| assoc(k, v)).collect(),
        ))
    }

    pub fn splat(inner: Node) -> Node {
        Node::new(NodeKind::Splat(Some(Box::new(inner))))
    }

    pub fn range(left: Node, right: Node) -> Node {
        Node::new(NodeKind::Range {
            left: Some(Box::new(left)),
            right: Some(Box::new(right)),
            exclusive: false,
        })
    }

    pub fn var(kind: VarKind, name: &str) -> Node {
        Node::new(NodeKind::VarRead {
            kind,
            name: name.to_string(),
        })
    }

    pub fn lvar(name: &str) -> Node {
        var(VarKind::Local, name)
    }

    pub fn ivar(name: &str) -> Node {
        var(VarKind::Instance, name)
    }

    pub fn cvar(name: &str) -> Node {
        var(VarKind::Class, name)
    }

    pub fn gvar(name: &str) -> Node {
        var(VarKind::Global, name)
    }

    pub fn var_write(kind: VarKind, name: &str, value: Node) -> Node {
        Node::new(NodeKind::VarWrite {
            kind,
            name: name.to_string(),
            value: Box::new(value),
        })
    }

    pub fn lvar_write(name: &str, value: Node) -> Node {
        var_write(VarKind::Local, name, value)
    }

    pub fn ivar_write(name: &str, value: Node) -> Node {
        var_write(VarKind::Instance, name, value)
    }

    pub fn lvar_target(name: &str) -> Node {
        Node::new(NodeKind::VarTarget {
            kind: VarKind::Local,
            name: name.to_string(),
        })
    }

    pub fn or_write(kind: VarKind, name: &str, value: Node) -> Node {
        Node::new(NodeKind::VarOrWrite {
            kind,
            name: name.to_string(),
            value: Box::new(value),
        })
    }

    pub fn op_write(kind: VarKind, name: &str, operator: &str, value: Node) -> Node {
        Node::new(NodeKind::VarOpWrite {
            kind,
            name: name.to_string(),
            operator: operator.to_string(),
            value: Box::new(value),
        })
    }

    pub fn multi_write(targets: Vec<Node>, value: Node) -> Node {
        Node::new(NodeKind::MultiWrite {
            targets,
            value: Box::new(value),
        })
    }

    pub fn const_(name: &str) -> Node {
        Node::new(NodeKind::ConstRead(name.to_string()))
    }

    pub fn const_path(parent: Option<Node>, name: &str) -> Node {
        Node::new(NodeKind::ConstPath {
            parent: parent.map(Box::new),
            name: name.to_string(),
        })
    }

    pub fn const_write(name: &str, value: Node) -> Node {
        Node::new(NodeKind::ConstWrite {
            name: name.to_string(),
            value: Box::new(value),
        })
    }

    fn arguments(args: Vec<Node>) -> Child {
        if args.is_empty() {
            None
        } else {
            Some(b(NodeKind::Arguments(args)))
        }
    }

    /// `receiver<op>name(args)`; parenthesized whenever there are arguments.
    pub fn call(receiver: Option<Node>, operator: CallOperator, name: &str, args: Vec<Node>) -> Node {
        let parenthesized = !args.is_empty();
        Node::new(NodeKind::Call(Call {
            operator: receiver.as_ref().map(|_| operator),
            receiver: receiver.map(Box::new),
            name: name.to_string(),
            arguments: arguments(args),
            block: None,
            parenthesized,
        }))
    }

    /// `recv.name(args)`
    pub fn send(receiver: Node, name: &str, args: Vec<Node>) -> Node {
        call(Some(receiver), CallOperator::Dot, name, args)
    }

    /// Receiver-less `name(args)`.
    pub fn fcall(name: &str, args: Vec<Node>) -> Node {
        call(None, CallOperator::Dot, name, args)
    }

    /// Receiver-less `name args`, without parentheses.
    pub fn command(name: &str, args: Vec<Node>) -> Node {
        let mut node = fcall(name, args);
        if let NodeKind::Call(call) = &mut node.kind {
            call.parenthesized = false;
        }
        node
    }

    /// A bare identifier that could be a local or a method call.
    pub fn ident(name: &str) -> Node {
        fcall(name, vec![])
    }

    /// Attach a block (or block argument) to a call node.
    pub fn with_block(mut node: Node, block: Node) -> Node {
        if let NodeKind::Call(call) = &mut node.kind {
            call.block = Some(Box::new(block));
        }
        node
    }

    pub fn block(params: &[&str], body: Vec<Node>) -> Node {
        Node::new(NodeKind::Block {
            parameters: Parameters::positional(params.iter().copied()),
            body: statements_opt(body),
        })
    }

    pub fn block_arg(inner: Node) -> Node {
        Node::new(NodeKind::BlockArgument(Some(Box::new(inner))))
    }

    pub fn lambda(params: &[&str], body: Vec<Node>) -> Node {
        Node::new(NodeKind::Lambda {
            parameters: Parameters::positional(params.iter().copied()),
            body: statements_opt(body),
        })
    }

    pub fn if_(predicate: Node, then: Vec<Node>, otherwise: Option<Vec<Node>>) -> Node {
        Node::new(NodeKind::If {
            predicate: Box::new(predicate),
            statements: statements_opt(then),
            subsequent: otherwise.map(|body| b(NodeKind::Else(statements_opt(body)))),
        })
    }

    pub fn unless(predicate: Node, then: Vec<Node>) -> Node {
        Node::new(NodeKind::Unless {
            predicate: Box::new(predicate),
            statements: statements_opt(then),
            else_clause: None,
        })
    }

    pub fn case(predicate: Option<Node>, whens: Vec<(Vec<Node>, Vec<Node>)>, otherwise: Option<Vec<Node>>) -> Node {
        Node::new(NodeKind::Case {
            predicate: predicate.map(Box::new),
            conditions: whens
                .into_iter()
                .map(|(conditions, body)| {
                    Node::new(NodeKind::When {
                        conditions,
                        statements: statements_opt(body),
                    })
                })
                .collect(),
            else_clause: otherwise.map(|body| b(NodeKind::Else(statements_opt(body)))),
        })
    }

    pub fn while_(predicate: Node, body: Vec<Node>) -> Node {
        Node::new(NodeKind::While {
            predicate: Box::new(predicate),
            statements: statements_opt(body),
        })
    }

    pub fn until(predicate: Node, body: Vec<Node>) -> Node {
        Node::new(NodeKind::Until {
            predicate: Box::new(predicate),
            statements: statements_opt(body),
        })
    }

    pub fn for_(index: &str, collection: Node, body: Vec<Node>) -> Node {
        Node::new(NodeKind::For {
            index: Box::new(lvar_target(index)),
            collection: Box::new(collection),
            statements: statements_opt(body),
        })
    }

    pub fn and(left: Node, right: Node) -> Node {
        Node::new(NodeKind::And {
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    pub fn or(left: Node, right: Node) -> Node {
        Node::new(NodeKind::Or {
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    pub fn break_(value: Option<Node>) -> Node {
        Node::new(NodeKind::Break(value.and_then(|v| arguments(vec![v]))))
    }

    pub fn next(value: Option<Node>) -> Node {
        Node::new(NodeKind::Next(value.and_then(|v| arguments(vec![v]))))
    }

    pub fn return_(value: Option<Node>) -> Node {
        Node::new(NodeKind::Return(value.and_then(|v| arguments(vec![v]))))
    }

    pub fn begin(body: Vec<Node>, rescue: Option<Node>, ensure: Option<Vec<Node>>) -> Node {
        Node::new(NodeKind::Begin {
            statements: statements_opt(body),
            rescue_clause: rescue.map(Box::new),
            else_clause: None,
            ensure_clause: ensure.and_then(statements_opt),
        })
    }

    /// `begin ... rescue ... else ... end`
    pub fn begin_else(body: Vec<Node>, rescue: Node, otherwise: Vec<Node>) -> Node {
        Node::new(NodeKind::Begin {
            statements: statements_opt(body),
            rescue_clause: Some(Box::new(rescue)),
            else_clause: Some(b(NodeKind::Else(statements_opt(otherwise)))),
            ensure_clause: None,
        })
    }

    pub fn rescue(exceptions: Vec<Node>, reference: Option<&str>, body: Vec<Node>) -> Node {
        Node::new(NodeKind::Rescue {
            exceptions,
            reference: reference.map(|name| Box::new(lvar_target(name))),
            statements: statements_opt(body),
            subsequent: None,
        })
    }

    pub fn rescue_modifier(expression: Node, rescue_expression: Node) -> Node {
        Node::new(NodeKind::RescueModifier {
            expression: Box::new(expression),
            rescue_expression: Box::new(rescue_expression),
        })
    }

    pub fn def(name: &str, params: &[&str], body: Vec<Node>) -> Node {
        Node::new(NodeKind::Def {
            name: name.to_string(),
            receiver: None,
            parameters: Parameters::positional(params.iter().copied()),
            body: statements_opt(body),
        })
    }

    pub fn def_self(name: &str, params: &[&str], body: Vec<Node>) -> Node {
        let mut node = def(name, params, body);
        if let NodeKind::Def { receiver, .. } = &mut node.kind {
            *receiver = Some(Box::new(self_()));
        }
        node
    }

    pub fn class(name: &str, superclass: Option<Node>, body: Vec<Node>) -> Node {
        Node::new(NodeKind::Class {
            constant_path: Box::new(const_(name)),
            superclass: superclass.map(Box::new),
            body: statements_opt(body),
        })
    }

    pub fn module(name: &str, body: Vec<Node>) -> Node {
        Node::new(NodeKind::Module {
            constant_path: Box::new(const_(name)),
            body: statements_opt(body),
        })
    }

    pub fn yield_(args: Vec<Node>) -> Node {
        Node::new(NodeKind::Yield(arguments(args)))
    }

    pub fn missing() -> Node {
        Node::new(NodeKind::Missing)
    }
}

#[cfg(test)]
mod tests {
    use super::build::*;
    use super::*;

    #[test]
    fn children_are_in_source_order() {
        let node = with_block(
            send(lvar("a"), "each", vec![int(1)]),
            block(&["x"], vec![lvar("x")]),
        );
        let kinds: Vec<&str> = node
            .children()
            .iter()
            .map(|c| match &c.kind {
                NodeKind::VarRead { .. } => "var",
                NodeKind::Arguments(_) => "args",
                NodeKind::Block { .. } => "block",
                _ => "other",
            })
            .collect();
        assert_eq!(kinds, vec!["var", "args", "block"]);
    }

    #[test]
    fn declared_locals_stop_at_nested_scopes() {
        let ast = program(vec![
            lvar_write("a", int(1)),
            if_(true_(), vec![lvar_write("b", int(2))], None),
            with_block(
                send(lvar("a"), "tap", vec![]),
                block(&["x"], vec![lvar_write("inner", int(3))]),
            ),
            def("m", &["p"], vec![lvar_write("q", int(4))]),
            multi_write(vec![lvar_target("c"), lvar_target("a")], array(vec![])),
        ]);
        assert_eq!(ast.declared_locals(), vec!["a", "b", "c"]);

        let def_node = ast
            .find(&|n| matches!(n.kind, NodeKind::Def { .. }))
            .unwrap();
        assert_eq!(def_node.declared_locals(), vec!["p", "q"]);

        let block_node = ast
            .find(&|n| matches!(n.kind, NodeKind::Block { .. }))
            .unwrap();
        assert_eq!(block_node.declared_locals(), vec!["x", "inner"]);
    }

    #[test]
    fn rescue_reference_is_a_local() {
        let ast = program(vec![begin(
            vec![int(1)],
            Some(rescue(vec![const_("StandardError")], Some("e"), vec![])),
            None,
        )]);
        assert_eq!(ast.declared_locals(), vec!["e"]);
    }

    #[test]
    fn attribute_write_detection() {
        let write = send(lvar("a"), "b=", vec![int(1)]);
        let eq = send(lvar("a"), "==", vec![int(1)]);
        let NodeKind::Call(w) = &write.kind else { unreachable!() };
        let NodeKind::Call(e) = &eq.kind else { unreachable!() };
        assert!(w.is_attribute_write());
        assert!(!e.is_attribute_write());
    }
}
