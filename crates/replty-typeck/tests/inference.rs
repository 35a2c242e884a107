//! End-to-end completion: build an AST, lay it out, analyze at the cursor.

use std::sync::Arc;

use replty_ast::node::build::*;
use replty_ast::{layout, CallOperator, Node, NodeKind, TextSize, VarKind};
use replty_rt::{core, Binding, Module, Object};
use replty_sig::{SignatureDb, SignatureStore};
use replty_typeck::{Analysis, AnalyzerConfig, Completor, Target, Type};

// ── Helpers ────────────────────────────────────────────────────────────

const CORE_SIGNATURES: &str = include_str!("fixtures/core.json");

fn completor() -> Completor {
    let db = SignatureDb::from_json_str(CORE_SIGNATURES).unwrap();
    Completor::with_store(Arc::new(SignatureStore::with_db(db)), AnalyzerConfig::default())
}

/// Analyze with the cursor at the end of the source.
fn analyze(program_body: Vec<Node>, binding: &Binding) -> Option<Analysis> {
    let (src, ast) = layout(program(program_body));
    completor().analyze(&ast, TextSize::of(src.as_str()), binding)
}

/// Analyze with the cursor at the end of the first node matching `pred`.
fn analyze_at(program_body: Vec<Node>, binding: &Binding, pred: &dyn Fn(&Node) -> bool) -> Option<Analysis> {
    let (_, ast) = layout(program(program_body));
    let offset = ast.find(pred).unwrap().range.end();
    completor().analyze(&ast, offset, binding)
}

fn receiver_of(analysis: &Analysis) -> &Type {
    match &analysis.target {
        Target::Call { receiver, .. } | Target::CallOrConst { receiver, .. } => receiver,
        other => panic!("expected a method target, got {:?}", other),
    }
}

fn dot(receiver: Node) -> Node {
    send(receiver, "", vec![])
}

fn has(candidates: &[String], name: &str) -> bool {
    candidates.iter().any(|c| c == name)
}

/// A `recv.` node with nothing typed after the dot.
fn is_dot(node: &Node) -> bool {
    matches!(&node.kind, NodeKind::Call(c) if c.name.is_empty())
}

/// The receiver type of `name.` typed after `body`.
fn type_after(mut body: Vec<Node>, name: &str) -> Type {
    body.push(dot(lvar(name)));
    let binding = Binding::top_level();
    let analysis = analyze(body, &binding).unwrap();
    receiver_of(&analysis).clone()
}

// ── Method targets ─────────────────────────────────────────────────────

#[test]
fn method_on_assigned_local() {
    let binding = Binding::top_level();
    let analysis = analyze(vec![lvar_write("a", int(1)), dot(lvar("a"))], &binding).unwrap();
    assert_eq!(receiver_of(&analysis), &Type::integer());

    let candidates = analysis.candidates();
    assert!(has(&candidates, "abs"));
    assert!(has(&candidates, "between?"));
    assert!(!has(&candidates, "puts"));
}

#[test]
fn explicit_self_offers_private_methods() {
    let binding = Binding::top_level();
    let analysis = analyze(vec![dot(self_())], &binding).unwrap();
    assert!(matches!(analysis.target, Target::Call { self_call: true, .. }));
    let candidates = analysis.candidates();
    assert!(has(&candidates, "puts"));
    assert!(has(&candidates, "rand"));
}

#[test]
fn prefix_filters_candidates() {
    let binding = Binding::top_level();
    let analysis = analyze(vec![send(string("s"), "up", vec![])], &binding).unwrap();
    assert_eq!(analysis.target.name(), "up");
    assert_eq!(analysis.candidates(), ["upcase"]);
}

#[test]
fn block_parameter_takes_element_type() {
    let binding = Binding::top_level();
    let mapped = with_block(
        send(array(vec![int(1), int(2)]), "map", vec![]),
        block(&["x"], vec![dot(lvar("x"))]),
    );
    let analysis = analyze_at(vec![mapped], &binding, &is_dot).unwrap();
    assert_eq!(receiver_of(&analysis), &Type::integer());
}

#[test]
fn generic_result_follows_block_return_type() {
    let binding = Binding::top_level();
    let mapped = with_block(
        send(array(vec![int(1)]), "map", vec![]),
        block(&["x"], vec![send(lvar("x"), "to_s", vec![])]),
    );
    let analysis = analyze(vec![lvar_write("s", mapped), dot(lvar("s"))], &binding).unwrap();
    let receiver = receiver_of(&analysis);
    assert!(receiver.is_instance_of(&core().array));
    assert_eq!(receiver.param("Elem"), Some(Type::string()));
    assert!(has(&analysis.candidates(), "first"));
}

#[test]
fn overload_is_chosen_by_argument_type() {
    let sum = send(int(1), "+", vec![int(2)]);
    assert_eq!(type_after(vec![lvar_write("x", sum)], "x"), Type::integer());
}

#[test]
fn convertible_argument_keeps_tied_overloads() {
    // Float converts through to_int, so the Integer overload scores as well.
    let sum = send(int(1), "+", vec![float(2.0)]);
    assert_eq!(
        type_after(vec![lvar_write("x", sum)], "x"),
        Type::union([Type::float(), Type::integer()])
    );
}

#[test]
fn conditional_assignment_is_nillable() {
    let binding = Binding::top_level();
    let analysis = analyze(
        vec![
            if_(fcall("rand", vec![]), vec![lvar_write("a", int(1))], None),
            dot(lvar("a")),
        ],
        &binding,
    )
    .unwrap();
    let receiver = receiver_of(&analysis);
    assert!(receiver.nillable());
    assert_eq!(receiver.nonnillable(), Type::integer());

    let candidates = analysis.candidates();
    assert!(has(&candidates, "abs"));
    assert!(has(&candidates, "to_a"));
}

#[test]
fn safe_navigation_drops_nil() {
    let binding = Binding::top_level();
    let analysis = analyze(
        vec![
            if_(fcall("rand", vec![]), vec![lvar_write("a", int(1))], None),
            call(Some(lvar("a")), CallOperator::SafeNav, "", vec![]),
        ],
        &binding,
    )
    .unwrap();
    assert_eq!(receiver_of(&analysis), &Type::integer());
}

#[test]
fn symbol_block_argument_completes_on_element() {
    let binding = Binding::top_level();
    let mapped = with_block(send(array(vec![string("a")]), "map", vec![]), block_arg(sym("up")));
    let analysis = analyze(vec![mapped], &binding).unwrap();
    assert_eq!(receiver_of(&analysis), &Type::string());
    assert_eq!(analysis.candidates(), ["upcase"]);
}

#[test]
fn double_colon_offers_methods_and_constants() {
    let settings = Module::new_module(Some("Settings"));
    settings.set_const("Timeout", Object::integer(30));
    let binding = Binding::top_level().with_constant("Settings", Object::module(&settings));
    let analysis = analyze(
        vec![call(Some(const_("Settings")), CallOperator::DoubleColon, "", vec![])],
        &binding,
    )
    .unwrap();
    assert!(matches!(analysis.target, Target::CallOrConst { .. }));
    let candidates = analysis.candidates();
    assert!(has(&candidates, "Timeout"));
    assert!(has(&candidates, "constants"));
}

// ── Control flow ───────────────────────────────────────────────────────

#[test]
fn or_assignment_replaces_nil() {
    let body = vec![
        lvar_write("a", nil()),
        or_write(VarKind::Local, "a", int(1)),
    ];
    assert_eq!(type_after(body, "a"), Type::integer());

    let body = vec![
        if_(fcall("rand", vec![]), vec![lvar_write("a", string("s"))], None),
        or_write(VarKind::Local, "a", int(1)),
    ];
    assert_eq!(type_after(body, "a"), Type::union([Type::string(), Type::integer()]));
}

#[test]
fn next_keeps_assignments_made_before_it() {
    let body = vec![
        lvar_write("x", int(1)),
        while_(true_(), vec![lvar_write("x", string("s")), next(None)]),
    ];
    assert_eq!(type_after(body, "x"), Type::union([Type::integer(), Type::string()]));
}

#[test]
fn break_value_is_the_loop_value() {
    let body = vec![lvar_write("r", while_(true_(), vec![break_(Some(string("s")))]))];
    let ty = type_after(body, "r");
    assert!(ty.nillable());
    assert_eq!(ty.nonnillable(), Type::string());
}

#[test]
fn until_body_may_not_run() {
    let body = vec![
        lvar_write("x", nil()),
        until(lvar("x"), vec![lvar_write("x", int(1))]),
    ];
    let ty = type_after(body, "x");
    assert!(ty.nillable());
    assert_eq!(ty.nonnillable(), Type::integer());
}

#[test]
fn for_index_takes_the_element_type() {
    let body = vec![for_("word", array(vec![string("a"), string("b")]), vec![])];
    assert_eq!(type_after(body, "word"), Type::string());
}

#[test]
fn case_joins_every_when_and_the_else() {
    let body = vec![case(
        Some(fcall("rand", vec![])),
        vec![
            (vec![int(1)], vec![lvar_write("a", string("s"))]),
            (vec![int(2)], vec![lvar_write("a", sym("t"))]),
        ],
        Some(vec![lvar_write("a", int(3))]),
    )];
    assert_eq!(
        type_after(body, "a"),
        Type::union([Type::string(), Type::symbol(), Type::integer()])
    );
}

#[test]
fn rescue_binds_the_exception_and_ensure_always_runs() {
    let program_body = || {
        vec![begin(
            vec![lvar_write("a", int(1))],
            Some(rescue(vec![], Some("e"), vec![lvar_write("b", lvar("e"))])),
            Some(vec![lvar_write("c", sym("done"))]),
        )]
    };
    let b = type_after(program_body(), "b");
    assert!(b.nillable());
    assert!(b.nonnillable().is_instance_of(&core().standard_error));
    assert_eq!(type_after(program_body(), "a"), Type::integer());
    assert_eq!(type_after(program_body(), "c"), Type::symbol());
}

#[test]
fn begin_else_is_an_alternative_to_rescue() {
    let body = vec![begin_else(
        vec![lvar_write("a", int(1))],
        rescue(vec![], None, vec![]),
        vec![lvar_write("a", string("s"))],
    )];
    assert_eq!(type_after(body, "a"), Type::union([Type::integer(), Type::string()]));
}

#[test]
fn multiple_assignment_with_splat() {
    let program_body = || {
        vec![multi_write(
            vec![lvar_target("a"), splat(lvar_target("b")), lvar_target("c")],
            array(vec![int(1), string("s"), sym("x"), float(2.0)]),
        )]
    };
    assert_eq!(type_after(program_body(), "a"), Type::integer());
    let b = type_after(program_body(), "b");
    assert!(b.is_instance_of(&core().array));
    assert_eq!(b.param("Elem"), Some(Type::union([Type::string(), Type::symbol()])));
    assert_eq!(type_after(program_body(), "c"), Type::float());
}

#[test]
fn never_returning_call_ends_the_branch() {
    let body = vec![
        lvar_write("a", int(1)),
        if_(
            fcall("rand", vec![]),
            vec![lvar_write("a", string("s")), fcall("raise", vec![])],
            None,
        ),
    ];
    assert_eq!(type_after(body, "a"), Type::integer());
}

// ── Variables ──────────────────────────────────────────────────────────

#[test]
fn binding_locals_are_live() {
    let binding = Binding::top_level().with_local("name", Object::string("x"));
    let analysis = analyze(vec![dot(lvar("name"))], &binding).unwrap();
    assert!(receiver_of(&analysis).is_instance_of(&core().string));

    let analysis = analyze(vec![ident("na")], &binding).unwrap();
    assert!(matches!(analysis.target, Target::LvarOrMethod { .. }));
    assert_eq!(analysis.candidates(), ["name"]);
}

#[test]
fn locals_inside_def_hide_outer_locals() {
    let binding = Binding::top_level();
    let analysis = analyze_at(
        vec![
            lvar_write("outer", int(1)),
            def("run", &["other"], vec![ident("o")]),
        ],
        &binding,
        &|n: &Node| matches!(&n.kind, NodeKind::Call(c) if c.name == "o"),
    )
    .unwrap();
    let candidates = analysis.candidates();
    assert!(has(&candidates, "other"));
    assert!(!has(&candidates, "outer"));
}

#[test]
fn keyword_names_are_offered_inside_arguments() {
    let binding = Binding::top_level();
    let encode = send(string("a"), "encode", vec![string("utf-8"), ident("re")]);
    let analysis = analyze_at(vec![encode], &binding, &|n: &Node| {
        matches!(&n.kind, NodeKind::Call(c) if c.name == "re")
    })
    .unwrap();
    match &analysis.target {
        Target::LvarOrMethod { kwarg: Some((receiver, method)), .. } => {
            assert_eq!(receiver, &Type::string());
            assert_eq!(method, "encode");
        }
        other => panic!("expected a keyword target, got {:?}", other),
    }
    assert!(has(&analysis.candidates(), "replace:"));
}

#[test]
fn instance_variables_come_from_the_receiver() {
    let receiver = Object::instance_of(&core().object);
    receiver.set_instance_variable("@count", Object::integer(1));
    let binding = Binding::new(receiver);
    let analysis = analyze(vec![var(VarKind::Instance, "@co")], &binding).unwrap();
    assert!(matches!(analysis.target, Target::Ivar { .. }));
    assert_eq!(analysis.candidates(), ["@count"]);
}

#[test]
fn instance_variable_assigned_earlier_is_typed() {
    let binding = Binding::top_level();
    let analysis = analyze(vec![ivar_write("@items", array(vec![int(1)])), dot(ivar("@items"))], &binding).unwrap();
    let receiver = receiver_of(&analysis);
    assert!(receiver.is_instance_of(&core().array));
    assert_eq!(receiver.param("Elem"), Some(Type::integer()));
}

#[test]
fn global_variables_are_listed() {
    let binding = Binding::top_level().with_global("$stdout", Object::string("io"));
    let analysis = analyze(vec![gvar("$std")], &binding).unwrap();
    assert!(matches!(analysis.target, Target::Gvar { .. }));
    assert_eq!(analysis.candidates(), ["$stdout"]);
}

// ── Constants ──────────────────────────────────────────────────────────

#[test]
fn class_defined_in_code_is_a_constant() {
    let binding = Binding::top_level();
    let analysis = analyze(vec![class("Widget", None, vec![]), const_("Wid")], &binding).unwrap();
    assert!(matches!(analysis.target, Target::Const { receiver: None, .. }));
    assert_eq!(analysis.candidates(), ["Widget"]);
}

#[test]
fn constant_path_lists_module_constants() {
    let settings = Module::new_module(Some("Settings"));
    settings.set_const("Timeout", Object::integer(30));
    settings.set_const("Retries", Object::integer(3));
    let binding = Binding::top_level().with_constant("Settings", Object::module(&settings));
    let analysis = analyze(vec![const_path(Some(const_("Settings")), "T")], &binding).unwrap();
    assert_eq!(analysis.candidates(), ["Timeout"]);
}

#[test]
fn new_on_a_code_defined_class_gives_an_instance() {
    let binding = Binding::top_level();
    let analysis = analyze(
        vec![
            class("Widget", None, vec![]),
            lvar_write("w", send(const_("Widget"), "new", vec![])),
            dot(lvar("w")),
        ],
        &binding,
    )
    .unwrap();
    let receiver = receiver_of(&analysis);
    let class = receiver.as_instance().unwrap().class();
    assert_eq!(class.name(), Some("Widget"));
}

// ── Other targets ──────────────────────────────────────────────────────

#[test]
fn require_argument() {
    let binding = Binding::top_level();
    let analysis = analyze(vec![command("require", vec![open_string("set")])], &binding).unwrap();
    match &analysis.target {
        Target::Require { method, path } => {
            assert_eq!(method, "require");
            assert_eq!(path, "set");
        }
        other => panic!("expected a require target, got {:?}", other),
    }
    assert!(analysis.candidates().is_empty());
}

#[test]
fn require_lists_files_on_the_load_path() {
    let dir = tempfile::tempdir().unwrap();
    let lib = dir.path().join("lib");
    std::fs::create_dir_all(lib.join("set")).unwrap();
    std::fs::write(lib.join("set.rb"), "").unwrap();
    std::fs::write(lib.join("set/sorted.rb"), "").unwrap();
    std::fs::write(lib.join("socket.rb"), "").unwrap();
    let config = AnalyzerConfig {
        load_paths: vec![lib],
        ..AnalyzerConfig::default()
    };
    let completor = Completor::with_store(Arc::new(SignatureStore::new()), config);

    let binding = Binding::top_level();
    let (src, ast) = layout(program(vec![command("require", vec![open_string("se")])]));
    let analysis = completor.analyze(&ast, TextSize::of(src.as_str()), &binding).unwrap();
    assert_eq!(analysis.candidates(), ["set", "set/", "set/sorted"]);
}

#[test]
fn require_relative_starts_from_the_source_file() {
    let dir = tempfile::tempdir().unwrap();
    let app = dir.path().join("app");
    std::fs::create_dir_all(&app).unwrap();
    std::fs::write(app.join("main.rb"), "").unwrap();
    std::fs::write(app.join("helper.rb"), "").unwrap();

    let binding = Binding::top_level().with_source_file(app.join("main.rb"));
    let analysis = analyze(
        vec![command("require_relative", vec![open_string("hel")])],
        &binding,
    )
    .unwrap();
    assert!(matches!(&analysis.target, Target::Require { method, .. } if method == "require_relative"));
    assert_eq!(analysis.candidates(), ["helper"]);
}

#[test]
fn bare_symbol() {
    let binding = Binding::top_level();
    let analysis = analyze(vec![sym("fo")], &binding).unwrap();
    assert!(matches!(&analysis.target, Target::Symbol { name } if name == "fo"));
}

#[test]
fn nothing_to_complete() {
    let binding = Binding::top_level();
    assert!(analyze(vec![fcall("foo", vec![int(1)])], &binding).is_none());
    assert!(analyze(vec![int(1)], &binding).is_none());
    assert!(analyze(vec![sym("")], &binding).is_none());
}

#[test]
fn repeated_requests_agree() {
    let binding = Binding::top_level().with_local("items", Object::array(vec![Object::integer(1), Object::string("a")]));
    let (src, ast) = layout(program(vec![dot(send(lvar("items"), "first", vec![]))]));
    let completor = completor();
    let offset = TextSize::of(src.as_str());
    let first = completor.analyze(&ast, offset, &binding).unwrap();
    let second = completor.analyze(&ast, offset, &binding).unwrap();
    assert_eq!(receiver_of(&first), receiver_of(&second));
    let members = receiver_of(&first).types();
    assert_eq!(members.len(), 2);
    assert!(members.iter().any(|t| t.is_instance_of(&core().integer)));
    assert!(members.iter().any(|t| t.is_instance_of(&core().string)));
    assert_eq!(first.candidates(), second.candidates());
}

// ── Failures ───────────────────────────────────────────────────────────

#[test]
fn offset_past_the_end_is_recorded() {
    let binding = Binding::top_level();
    let (src, ast) = layout(program(vec![dot(int(1))]));
    let completor = completor();
    let past = TextSize::of(src.as_str()) + TextSize::from(5);
    assert!(completor.analyze(&ast, past, &binding).is_none());
    let message = completor.last_error().unwrap();
    assert!(message.contains("out of range"), "{}", message);
}

#[test]
fn deep_nesting_hits_the_depth_limit() {
    let binding = Binding::top_level();
    let mut expr = dot(int(1));
    for _ in 0..20 {
        expr = parens(expr);
    }
    let (_, ast) = layout(program(vec![expr]));
    let offset = ast
        .find(&|n: &Node| matches!(&n.kind, NodeKind::Call(c) if c.name.is_empty()))
        .unwrap()
        .range
        .end();
    let db = SignatureDb::from_json_str(CORE_SIGNATURES).unwrap();
    let config = AnalyzerConfig {
        max_depth: 8,
        ..AnalyzerConfig::default()
    };
    let completor = Completor::with_store(Arc::new(SignatureStore::with_db(db)), config);
    assert!(completor.analyze(&ast, offset, &binding).is_none());
    assert!(completor.last_error().unwrap().contains("depth limit of 8"));
}

#[test]
fn works_without_signatures() {
    let binding = Binding::top_level();
    let completor = Completor::new(AnalyzerConfig::default());
    assert!(completor.info().contains("signatures not loaded"));

    let (src, ast) = layout(program(vec![lvar_write("apple", int(1)), ident("ap")]));
    let analysis = completor.analyze(&ast, TextSize::of(src.as_str()), &binding).unwrap();
    assert_eq!(analysis.candidates(), ["apple"]);

    let (src, ast) = layout(program(vec![dot(int(1))]));
    let analysis = completor.analyze(&ast, TextSize::of(src.as_str()), &binding).unwrap();
    assert!(has(&analysis.candidates(), "times"));
}
