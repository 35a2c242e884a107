//! Render an AST to source text.
//!
//! The printer walks the tree once, emitting Ruby-like source and recording
//! the byte range covered by each node as it goes. The output is not meant
//! to be pretty; it is meant to give every node a faithful, non-overlapping
//! range so cursor offsets computed against the text line up with the tree.

use rowan::{TextRange, TextSize};

use crate::node::{Node, NodeKind, Parameters};

/// Render `node` to text, returning the text and the node with every range
/// filled in.
pub fn layout(mut node: Node) -> (String, Node) {
    let mut printer = Printer { out: String::new() };
    printer.node(&mut node);
    (printer.out, node)
}

struct Printer {
    out: String,
}

impl Printer {
    fn pos(&self) -> TextSize {
        TextSize::of(self.out.as_str())
    }

    fn text(&mut self, s: &str) {
        self.out.push_str(s);
    }

    fn node(&mut self, node: &mut Node) {
        let start = self.pos();
        self.kind(&mut node.kind);
        node.range = TextRange::new(start, self.pos());
    }

    fn opt(&mut self, node: &mut Option<Box<Node>>) {
        if let Some(n) = node {
            self.node(n);
        }
    }

    fn list(&mut self, nodes: &mut [Node], sep: &str) {
        for (i, n) in nodes.iter_mut().enumerate() {
            if i > 0 {
                self.text(sep);
            }
            self.node(n);
        }
    }

    /// Statements on their own lines, then a newline.
    fn body(&mut self, body: &mut Option<Box<Node>>) {
        if let Some(b) = body {
            self.node(b);
            self.text("\n");
        }
    }

    fn params(&mut self, params: &Parameters) {
        let mut parts: Vec<String> = Vec::new();
        parts.extend(params.required.iter().cloned());
        parts.extend(params.optional.iter().map(|p| format!("{p} = nil")));
        parts.extend(params.rest.iter().map(|p| format!("*{p}")));
        parts.extend(params.post.iter().cloned());
        parts.extend(params.keywords.iter().map(|p| format!("{p}: nil")));
        parts.extend(params.keyword_rest.iter().map(|p| format!("**{p}")));
        parts.extend(params.block.iter().map(|p| format!("&{p}")));
        self.text(&parts.join(", "));
    }

    fn if_chain(&mut self, node: &mut Node, keyword: &str) {
        let start = self.pos();
        match &mut node.kind {
            NodeKind::If {
                predicate,
                statements,
                subsequent,
            } => {
                self.text(keyword);
                self.text(" ");
                self.node(predicate);
                self.text("\n");
                self.body(statements);
                if let Some(sub) = subsequent {
                    if matches!(sub.kind, NodeKind::If { .. }) {
                        self.if_chain(sub, "elsif");
                    } else {
                        self.node(sub);
                    }
                }
            }
            _ => self.kind(&mut node.kind),
        }
        node.range = TextRange::new(start, self.pos());
    }

    fn kind(&mut self, kind: &mut NodeKind) {
        use NodeKind::*;

        match kind {
            Program(s) => self.node(s),
            Statements(items) => self.list(items, "\n"),
            Parentheses(inner) => {
                self.text("(");
                self.opt(inner);
                self.text(")");
            }
            Nil => self.text("nil"),
            True => self.text("true"),
            False => self.text("false"),
            SelfRef => self.text("self"),
            Integer(i) => self.text(&i.to_string()),
            Float(f) => self.text(&format!("{f:?}")),
            Rational(r) => self.text(&format!("{r}r")),
            Imaginary(i) => self.text(&format!("{i}i")),
            Str { content, closed } => {
                self.text("\"");
                self.text(content);
                if *closed {
                    self.text("\"");
                }
            }
            InterpolatedStr(parts) => {
                self.text("\"");
                self.interpolated(parts);
                self.text("\"");
            }
            XStr(s) => self.text(&format!("`{s}`")),
            Symbol { value, closed } => {
                if *closed {
                    self.text(&format!(":\"{value}\""));
                } else {
                    self.text(&format!(":{value}"));
                }
            }
            InterpolatedSymbol(parts) => {
                self.text(":\"");
                self.interpolated(parts);
                self.text("\"");
            }
            Regexp(s) => self.text(&format!("/{s}/")),
            InterpolatedRegexp(parts) => {
                self.text("/");
                self.interpolated(parts);
                self.text("/");
            }
            Array(items) => {
                self.text("[");
                self.list(items, ", ");
                self.text("]");
            }
            Hash(items) => {
                self.text("{");
                self.list(items, ", ");
                self.text("}");
            }
            Assoc { key, value } => {
                self.node(key);
                self.text(" => ");
                self.node(value);
            }
            AssocSplat(inner) => {
                self.text("**");
                self.opt(inner);
            }
            Splat(inner) => {
                self.text("*");
                self.opt(inner);
            }
            Range {
                left,
                right,
                exclusive,
            } => {
                self.opt(left);
                self.text(if *exclusive { "..." } else { ".." });
                self.opt(right);
            }
            VarRead { name, .. } | VarTarget { name, .. } | ConstRead(name) | ConstTarget(name) => {
                self.text(name)
            }
            VarWrite { name, value, .. } | ConstWrite { name, value } => {
                self.text(name);
                self.text(" = ");
                self.node(value);
            }
            VarOpWrite {
                name,
                operator,
                value,
                ..
            } => {
                self.text(&format!("{name} {operator}= "));
                self.node(value);
            }
            VarOrWrite { name, value, .. } => {
                self.text(&format!("{name} ||= "));
                self.node(value);
            }
            VarAndWrite { name, value, .. } => {
                self.text(&format!("{name} &&= "));
                self.node(value);
            }
            ConstPath { parent, name } => {
                self.opt(parent);
                self.text("::");
                self.text(name);
            }
            Call(call) => {
                if let Some(receiver) = &mut call.receiver {
                    self.node(receiver);
                    self.text(call.operator.map_or(".", |op| op.as_str()));
                }
                self.text(&call.name);
                let block_is_arg = matches!(
                    call.block.as_deref(),
                    Some(Node {
                        kind: NodeKind::BlockArgument(_),
                        ..
                    })
                );
                let has_args = call.arguments.is_some() || block_is_arg;
                if call.parenthesized {
                    self.text("(");
                } else if has_args {
                    self.text(" ");
                }
                self.opt(&mut call.arguments);
                if block_is_arg {
                    if call.arguments.is_some() {
                        self.text(", ");
                    }
                    self.opt(&mut call.block);
                }
                if call.parenthesized {
                    self.text(")");
                }
                if !block_is_arg && call.block.is_some() {
                    self.text(" ");
                    self.opt(&mut call.block);
                }
            }
            Arguments(items) | KeywordHash(items) => self.list(items, ", "),
            BlockArgument(inner) => {
                self.text("&");
                self.opt(inner);
            }
            Block { parameters, body } => {
                self.text("{");
                if !parameters.is_empty() {
                    self.text(" |");
                    self.params(parameters);
                    self.text("|");
                }
                self.text("\n");
                self.body(body);
                self.text("}");
            }
            Lambda { parameters, body } => {
                self.text("->(");
                self.params(parameters);
                self.text(") {\n");
                self.body(body);
                self.text("}");
            }
            If {
                predicate,
                statements,
                subsequent,
            } => {
                self.text("if ");
                self.node(predicate);
                self.text("\n");
                self.body(statements);
                if let Some(sub) = subsequent {
                    if matches!(sub.kind, NodeKind::If { .. }) {
                        self.if_chain(sub, "elsif");
                    } else {
                        self.node(sub);
                    }
                }
                self.text("end");
            }
            Unless {
                predicate,
                statements,
                else_clause,
            } => {
                self.text("unless ");
                self.node(predicate);
                self.text("\n");
                self.body(statements);
                self.opt(else_clause);
                self.text("end");
            }
            Else(body) => {
                self.text("else\n");
                self.body(body);
            }
            Case {
                predicate,
                conditions,
                else_clause,
            } => {
                self.text("case");
                if let Some(p) = predicate {
                    self.text(" ");
                    self.node(p);
                }
                self.text("\n");
                for when in conditions.iter_mut() {
                    self.node(when);
                }
                self.opt(else_clause);
                self.text("end");
            }
            When {
                conditions,
                statements,
            } => {
                self.text("when ");
                self.list(conditions, ", ");
                self.text("\n");
                self.body(statements);
            }
            While {
                predicate,
                statements,
            } => {
                self.text("while ");
                self.node(predicate);
                self.text("\n");
                self.body(statements);
                self.text("end");
            }
            Until {
                predicate,
                statements,
            } => {
                self.text("until ");
                self.node(predicate);
                self.text("\n");
                self.body(statements);
                self.text("end");
            }
            For {
                index,
                collection,
                statements,
            } => {
                self.text("for ");
                self.node(index);
                self.text(" in ");
                self.node(collection);
                self.text("\n");
                self.body(statements);
                self.text("end");
            }
            And { left, right } => {
                self.node(left);
                self.text(" && ");
                self.node(right);
            }
            Or { left, right } => {
                self.node(left);
                self.text(" || ");
                self.node(right);
            }
            Return(value) => self.keyword_with_args("return", value),
            Break(value) => self.keyword_with_args("break", value),
            Next(value) => self.keyword_with_args("next", value),
            Begin {
                statements,
                rescue_clause,
                else_clause,
                ensure_clause,
            } => {
                self.text("begin\n");
                self.body(statements);
                self.opt(rescue_clause);
                self.opt(else_clause);
                if let Some(ensure) = ensure_clause {
                    self.text("ensure\n");
                    self.node(ensure);
                    self.text("\n");
                }
                self.text("end");
            }
            Rescue {
                exceptions,
                reference,
                statements,
                subsequent,
            } => {
                self.text("rescue");
                if !exceptions.is_empty() {
                    self.text(" ");
                    self.list(exceptions, ", ");
                }
                if let Some(r) = reference {
                    self.text(" => ");
                    self.node(r);
                }
                self.text("\n");
                self.body(statements);
                self.opt(subsequent);
            }
            RescueModifier {
                expression,
                rescue_expression,
            } => {
                self.node(expression);
                self.text(" rescue ");
                self.node(rescue_expression);
            }
            Def {
                name,
                receiver,
                parameters,
                body,
            } => {
                self.text("def ");
                if let Some(r) = receiver {
                    self.node(r);
                    self.text(".");
                }
                self.text(name);
                self.text("(");
                self.params(parameters);
                self.text(")\n");
                self.body(body);
                self.text("end");
            }
            Class {
                constant_path,
                superclass,
                body,
            } => {
                self.text("class ");
                self.node(constant_path);
                if let Some(s) = superclass {
                    self.text(" < ");
                    self.node(s);
                }
                self.text("\n");
                self.body(body);
                self.text("end");
            }
            Module {
                constant_path,
                body,
            } => {
                self.text("module ");
                self.node(constant_path);
                self.text("\n");
                self.body(body);
                self.text("end");
            }
            MultiWrite { targets, value } => {
                self.list(targets, ", ");
                self.text(" = ");
                self.node(value);
            }
            Defined(inner) => {
                self.text("defined?(");
                self.node(inner);
                self.text(")");
            }
            Yield(args) => {
                self.text("yield");
                if args.is_some() {
                    self.text("(");
                    self.opt(args);
                    self.text(")");
                }
            }
            Super(args) => {
                self.text("super");
                if args.is_some() {
                    self.text("(");
                    self.opt(args);
                    self.text(")");
                }
            }
            Missing => {}
        }
    }

    fn keyword_with_args(&mut self, keyword: &str, args: &mut Option<Box<Node>>) {
        self.text(keyword);
        if args.is_some() {
            self.text(" ");
            self.opt(args);
        }
    }

    fn interpolated(&mut self, parts: &mut [Node]) {
        for part in parts.iter_mut() {
            let start = self.pos();
            match &mut part.kind {
                NodeKind::Str { content, .. } => self.text(content),
                _ => {
                    self.text("#{");
                    self.node(part);
                    self.text("}");
                    continue;
                }
            }
            part.range = TextRange::new(start, self.pos());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::build::*;
    use crate::CallOperator;

    #[test]
    fn renders_control_flow() {
        let (src, _) = layout(program(vec![
            lvar_write("a", int(1)),
            if_(
                lvar("a"),
                vec![lvar_write("b", string("x"))],
                Some(vec![lvar_write("b", sym("y"))]),
            ),
            with_block(
                send(lvar("a"), "times", vec![]),
                block(&["i"], vec![next(Some(lvar("i")))]),
            ),
        ]));
        insta::assert_snapshot!(src, @r###"
        a = 1
        if a
        b = "x"
        else
        b = :y
        end
        a.times { |i|
        next i
        }
        "###);
    }

    #[test]
    fn ranges_cover_rendered_text() {
        let (src, ast) = layout(program(vec![send(
            lvar("foo"),
            "bar",
            vec![int(1), keyword_hash(vec![(sym("k"), nil())])],
        )]));
        assert_eq!(src, "foo.bar(1, :k => nil)");
        assert_eq!(usize::from(ast.range.end()), src.len());

        let int_node = ast.find(&|n| matches!(n.kind, NodeKind::Integer(1))).unwrap();
        assert_eq!(&src[usize::from(int_node.range.start())..usize::from(int_node.range.end())], "1");
    }

    #[test]
    fn unclosed_forms_end_at_cursor() {
        let (src, _) = layout(program(vec![command("require", vec![open_string("se")])]));
        assert_eq!(src, "require \"se");

        let (src, _) = layout(program(vec![call(
            Some(const_("File")),
            CallOperator::DoubleColon,
            "",
            vec![],
        )]));
        assert_eq!(src, "File::");
    }

    #[test]
    fn block_argument_follows_arguments() {
        let (src, _) = layout(program(vec![with_block(
            send(lvar("a"), "map", vec![]),
            block_arg(sym("up")),
        )]));
        assert_eq!(src, "a.map &:up");
    }
}
