//! Graph builder that turns a bundle body into a [`DependencyMap`]
//!
//! Top-level statements are processed left to right. Each binding is
//! collected in its own root frame that binds only the binding's name, so
//! references to sibling top-level names survive as dependency edges.

use std::sync::LazyLock;

use log::{debug, trace, warn};
use regex::Regex;
use tree_sitter::Node;

use crate::{
    ambient_globals::AmbientGlobals,
    dependency_map::{Declaration, DependencyMap, UnnamedChunk},
    error::{Location, Result, SplitError},
    syntax::{NodeCategory, error_kind, first_error, named_children, parse},
    types::{FxIndexSet, Span},
    visitors::{Reference, ReferenceCollector, ReferenceKind},
};

/// Identifier-shaped tokens, used on text the grammar cannot parse
static IDENTIFIER_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z_$][A-Za-z0-9_$]*").expect("identifier token pattern is valid")
});

/// Closing text of an immediately invoked function the grammar cannot parse
const UNPARSEABLE_CLOSURE_END: &str = "}());";

/// `var name = (function` at the start of a line
static CLOSURE_BINDING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^var\s+([A-Za-z_$][\w$]*)\s*=\s*\(\s*function\b")
        .expect("closure binding pattern is valid")
});

/// Builds a [`DependencyMap`] from source text
#[derive(Debug)]
pub struct GraphBuilder<'a> {
    ambient: &'a AmbientGlobals,
    map: DependencyMap,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(ambient: &'a AmbientGlobals) -> Self {
        Self {
            ambient,
            map: DependencyMap::default(),
        }
    }

    /// Build the map for `source`
    pub fn build(mut self, source: &str) -> Result<DependencyMap> {
        let mut base = 0;
        'segments: loop {
            let tree = parse(&source[base..])?;
            let root = tree.root_node();
            trace!(
                "Building graph from {} top-level statements at byte {base}",
                root.named_child_count()
            );
            let mut collector = ReferenceCollector::for_segment(source, base);

            for statement in named_children(root) {
                if statement.has_error() {
                    let error = first_error(statement).unwrap_or(statement);
                    let error_start = base + error.start_byte();
                    if let Some(resume) = self.skip_unparseable_closure(source, base, error_start)? {
                        base = resume;
                        continue 'segments;
                    }
                    return Err(SplitError::unsupported(
                        &error_kind(error),
                        source,
                        error_start,
                    ));
                }
                self.process_statement(&mut collector, statement)?;
            }
            break;
        }
        self.resolve_opaque_needs(source);

        debug!(
            "Dependency map built: {} declarations, {} unnamed chunks",
            self.map.declarations.len(),
            self.map.unnamed.len()
        );
        Ok(self.map)
    }

    /// Synthesize a declaration for a `var x = (function ... }());` statement
    /// around `error_start` the parser rejected, returning the offset to
    /// resume parsing at.
    ///
    /// Error recovery may attribute the error to a later node than the `var`,
    /// so the statement is found textually: the last line starting with the
    /// binding at or before the error whose closing marker lies past it.
    /// Anything already recorded from that line on is discarded.
    fn skip_unparseable_closure(
        &mut self,
        source: &str,
        base: usize,
        error_start: usize,
    ) -> Result<Option<usize>> {
        let Some(captures) = CLOSURE_BINDING
            .captures_iter(&source[base..])
            .take_while(|captures| {
                captures
                    .get(0)
                    .is_some_and(|binding| base + binding.start() <= error_start)
            })
            .last()
        else {
            return Ok(None);
        };
        let (Some(binding), Some(name)) = (captures.get(0), captures.get(1)) else {
            return Ok(None);
        };
        let start = base + binding.start();
        let Some(marker) = source[start..].find(UNPARSEABLE_CLOSURE_END) else {
            return Ok(None);
        };
        let end = start + marker + UNPARSEABLE_CLOSURE_END.len();
        if end <= error_start {
            return Ok(None);
        }

        let name = name.as_str();
        warn!(
            "Could not parse `{name}` at {}; kept bytes {start}..{end} verbatim with no \
             dependencies",
            Location::of(source, start)
        );
        self.map.discard_from(start);
        let declaration = Declaration {
            opaque: true,
            ..Declaration::new(name, Span::new(start, end))
        };
        self.map.insert(declaration, source)?;
        Ok(Some(end))
    }

    /// Opaque declarations need every declared name their text mentions.
    ///
    /// Token matching over-approximates (property names, strings), which
    /// only keeps more code alive.
    fn resolve_opaque_needs(&mut self, source: &str) {
        let resolved: Vec<(String, FxIndexSet<String>)> = self
            .map
            .declarations
            .values()
            .filter(|declaration| declaration.opaque)
            .map(|declaration| {
                let text = &source[declaration.span.start..declaration.span.end];
                let needs = IDENTIFIER_TOKEN
                    .find_iter(text)
                    .map(|token| token.as_str())
                    .filter(|token| *token != declaration.name.as_str() && self.map.contains(token))
                    .map(str::to_owned)
                    .collect();
                (declaration.name.clone(), needs)
            })
            .collect();
        for (name, needs) in resolved {
            trace!("Opaque `{name}` needs {needs:?}");
            if let Some(declaration) = self.map.declarations.get_mut(&name) {
                declaration.needs = needs;
            }
        }
    }

    fn process_statement(
        &mut self,
        collector: &mut ReferenceCollector<'_>,
        statement: Node<'_>,
    ) -> Result<()> {
        match NodeCategory::of(statement.kind()) {
            NodeCategory::VarDeclaration | NodeCategory::LexicalDeclaration => {
                self.process_binding(collector, statement, None)
            }
            NodeCategory::FunctionDeclaration | NodeCategory::ClassDeclaration => {
                self.process_named(collector, statement, statement)
            }
            NodeCategory::ExportStatement => self.process_export(collector, statement),
            NodeCategory::Leaf => Ok(()),
            NodeCategory::Unsupported => Err(collector.unsupported(statement)),
            _ => {
                let references = collector.collect_expression(statement)?;
                let (needs, _) = self.summarize(references);
                trace!("Unnamed chunk at {} needs {needs:?}", statement.start_byte());
                self.map.unnamed.push(UnnamedChunk {
                    span: collector.span(statement),
                    needs,
                });
                Ok(())
            }
        }
    }

    /// `var` / `let` / `const`, optionally wrapped in `export`
    fn process_binding(
        &mut self,
        collector: &mut ReferenceCollector<'_>,
        statement: Node<'_>,
        export: Option<Node<'_>>,
    ) -> Result<()> {
        let declarators: Vec<Node<'_>> = named_children(statement)
            .into_iter()
            .filter(|child| child.kind() != "comment")
            .collect();
        if declarators.is_empty() {
            return Err(collector.malformed(statement, "binding statement without declarators"));
        }
        if declarators.len() > 1 && export.is_some() {
            return Err(collector.malformed(
                statement,
                "exported binding statement with several declarators",
            ));
        }
        let keyword = match statement.child(0) {
            Some(keyword) => collector.text(keyword),
            None => return Err(collector.malformed(statement, "missing binding keyword")),
        };

        for &declarator in &declarators {
            if declarator.kind() != "variable_declarator" {
                return Err(collector.malformed(declarator, "expected a variable declarator"));
            }
            let name_node = collector.required_field(declarator, "name")?;
            if name_node.kind() != "identifier" {
                return Err(collector.malformed(
                    declarator,
                    "top-level binding must be a single identifier",
                ));
            }
            let name = collector.text(name_node);
            let references = collector.collect_isolated(&[name], |c| {
                match declarator.child_by_field_name("value") {
                    Some(value) => c.visit(value),
                    None => Ok(()),
                }
            })?;

            let (span, detached_keyword) = if declarators.len() == 1 {
                (collector.span(export.unwrap_or(statement)), None)
            } else {
                (collector.span(declarator), Some(keyword.to_owned()))
            };
            self.declare(collector, name, span, references, detached_keyword)?;
        }
        Ok(())
    }

    /// Function and class declarations; `outer` is the statement whose range
    /// the declaration owns
    fn process_named(
        &mut self,
        collector: &mut ReferenceCollector<'_>,
        declaration: Node<'_>,
        outer: Node<'_>,
    ) -> Result<()> {
        let name = collector.text(collector.required_field(declaration, "name")?);
        let references = collector.collect_isolated(&[name], |c| c.visit(declaration))?;
        let span = collector.span(outer);
        self.declare(collector, name, span, references, None)
    }

    fn process_export(
        &mut self,
        collector: &mut ReferenceCollector<'_>,
        statement: Node<'_>,
    ) -> Result<()> {
        if statement.child_by_field_name("source").is_some() {
            return Err(collector.unsupported(statement));
        }
        let span = collector.span(statement);
        let is_default = {
            let mut cursor = statement.walk();
            statement
                .children(&mut cursor)
                .any(|child| child.kind() == "default")
        };

        if let Some(declaration) = statement.child_by_field_name("declaration") {
            if is_default {
                let own_name = declaration
                    .child_by_field_name("name")
                    .map(|name| collector.text(name));
                let bound: Vec<&str> = own_name.into_iter().collect();
                let references =
                    collector.collect_isolated(&bound, |c| c.visit(declaration))?;
                return self.declare(collector, "default", span, references, None);
            }
            return match NodeCategory::of(declaration.kind()) {
                NodeCategory::VarDeclaration | NodeCategory::LexicalDeclaration => {
                    self.process_binding(collector, declaration, Some(statement))
                }
                NodeCategory::FunctionDeclaration | NodeCategory::ClassDeclaration => {
                    self.process_named(collector, declaration, statement)
                }
                _ => Err(collector.unsupported(declaration)),
            };
        }

        if let Some(value) = statement.child_by_field_name("value") {
            let references = collector.collect_expression(value)?;
            return self.declare(collector, "default", span, references, None);
        }

        let mut exported = 0;
        for clause in named_children(statement) {
            if clause.kind() != "export_clause" {
                continue;
            }
            for specifier in named_children(clause) {
                if specifier.kind() != "export_specifier" {
                    continue;
                }
                let local = collector.required_field(specifier, "name")?;
                let alias = specifier.child_by_field_name("alias").unwrap_or(local);
                let references = collector.collect_isolated(&[], |c| c.visit(specifier))?;
                self.declare(collector, collector.text(alias), span, references, None)?;
                exported += 1;
            }
        }
        if exported == 0 {
            return Err(collector.malformed(statement, "export without exported names"));
        }
        Ok(())
    }

    fn declare(
        &mut self,
        collector: &ReferenceCollector<'_>,
        name: &str,
        span: Span,
        references: Vec<Reference>,
        detached_keyword: Option<String>,
    ) -> Result<()> {
        let (needs, writes) = self.summarize(references);
        trace!("Declaration `{name}` at {span} needs {needs:?}");
        let declaration = Declaration {
            needs,
            writes,
            detached_keyword,
            ..Declaration::new(name, span)
        };
        self.map.insert(declaration, collector.full_text())
    }

    /// Split free references into (needs, writes), dropping ambient names
    fn summarize(&self, references: Vec<Reference>) -> (FxIndexSet<String>, FxIndexSet<String>) {
        let mut needs = FxIndexSet::default();
        let mut writes = FxIndexSet::default();
        for reference in references {
            if self.ambient.contains(&reference.name) {
                continue;
            }
            if reference.kind == ReferenceKind::Write {
                writes.insert(reference.name.clone());
            }
            needs.insert(reference.name);
        }
        (needs, writes)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn build(source: &str) -> DependencyMap {
        GraphBuilder::new(&AmbientGlobals::default())
            .build(source)
            .expect("build")
    }

    fn needs<'m>(map: &'m DependencyMap, name: &str) -> Vec<&'m str> {
        map.get(name)
            .unwrap_or_else(|| panic!("no declaration `{name}`"))
            .needs
            .iter()
            .map(String::as_str)
            .collect()
    }

    #[test]
    fn test_sibling_top_level_names_are_edges() {
        let map = build("var a = 1;\nfunction f(x) { return a + g(x); }\nfunction g(y) { return f(y); }");
        assert_eq!(needs(&map, "f"), vec!["a", "g"]);
        assert_eq!(needs(&map, "g"), vec!["f"]);
        assert!(needs(&map, "a").is_empty());
    }

    #[test]
    fn test_self_reference_is_not_an_edge() {
        let map = build("function loop(n) { return n ? loop(n - 1) : done; }");
        assert_eq!(needs(&map, "loop"), vec!["done"]);
    }

    #[test]
    fn test_spans_cover_whole_statements() {
        let source = "var a = 1;\nfunction f() { return a; }\nclass C extends f {}";
        let map = build(source);
        let text = |name: &str| {
            let span = map.get(name).expect("declaration").span;
            &source[span.start..span.end]
        };
        assert_eq!(text("a"), "var a = 1;");
        assert_eq!(text("f"), "function f() { return a; }");
        assert_eq!(text("C"), "class C extends f {}");
        assert_eq!(needs(&map, "C"), vec!["f"]);
    }

    #[test]
    fn test_multi_declarator_statement_is_detached() {
        let source = "var a = 1, b = a + c;";
        let map = build(source);
        let b = map.get("b").expect("b");
        assert_eq!(&source[b.span.start..b.span.end], "b = a + c");
        assert_eq!(b.detached_keyword.as_deref(), Some("var"));
        assert_eq!(needs(&map, "b"), vec!["a", "c"]);
    }

    #[test]
    fn test_unnamed_chunks_and_writes() {
        let source = "var flag = false;\n_Platform_effectManagers['Task'] = make(flag);\n\
                      function touch() { flag = true; }";
        let map = build(source);
        assert_eq!(map.unnamed.len(), 1);
        let unnamed: Vec<_> = map.unnamed[0].needs.iter().map(String::as_str).collect();
        assert_eq!(unnamed, vec!["_Platform_effectManagers", "make", "flag"]);
        let touch = map.get("touch").expect("touch");
        assert!(touch.writes.contains("flag"));
    }

    #[test]
    fn test_comments_and_empty_statements_are_skipped() {
        let map = build("// header\n;\nvar a = 1; /* trailing */");
        assert_eq!(map.declarations.len(), 1);
        assert!(map.unnamed.is_empty());
    }

    #[test]
    fn test_export_forms() {
        let map = build(
            "const a = 1;\nexport const b = a;\nexport function c() { return b; }\n\
             export { a as d };\nexport default c;",
        );
        assert_eq!(needs(&map, "b"), vec!["a"]);
        assert_eq!(needs(&map, "c"), vec!["b"]);
        assert_eq!(needs(&map, "d"), vec!["a"]);
        assert_eq!(needs(&map, "default"), vec!["c"]);
    }

    #[test]
    fn test_destructured_top_level_binding_is_malformed() {
        let err = GraphBuilder::new(&AmbientGlobals::default())
            .build("var { a, b } = pair;")
            .expect_err("destructuring at top level");
        assert!(matches!(err, SplitError::MalformedDeclaration { .. }));
    }

    #[test]
    fn test_parse_error_is_located() {
        let err = GraphBuilder::new(&AmbientGlobals::default())
            .build("var a = 1;\nvar b = (;\n")
            .expect_err("syntax error");
        match err {
            SplitError::UnsupportedSyntax { location, .. } => assert_eq!(location.line, 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unparseable_closure_is_kept_opaque() {
        let source = "var a = 1;\nvar _Json_weird = (function () { return 1 +; }());\n\
                      var b = _Json_weird + a;";
        let map = build(source);
        let weird = map.get("_Json_weird").expect("opaque declaration");
        assert!(weird.opaque);
        assert!(weird.needs.is_empty());
        assert_eq!(
            &source[weird.span.start..weird.span.end],
            "var _Json_weird = (function () { return 1 +; }());"
        );
        assert_eq!(needs(&map, "b"), vec!["_Json_weird", "a"]);
        assert_eq!(
            map.declarations.keys().collect::<Vec<_>>(),
            vec!["a", "_Json_weird", "b"]
        );
    }

    #[test]
    fn test_unparseable_closure_needs_declared_names_it_mentions() {
        let source = "var check = 1;\nvar _Json_weird = (function () { return check(x, later) @ 1; }());\n\
                      function later() { return 0; }";
        let map = build(source);
        assert_eq!(needs(&map, "_Json_weird"), vec!["check", "later"]);
    }

    #[test]
    fn test_builder_is_debuggable() {
        let ambient = AmbientGlobals::default();
        let builder = GraphBuilder::new(&ambient);
        assert!(format!("{builder:?}").starts_with("GraphBuilder"));
    }

    #[test]
    fn test_configured_ambient_names_are_not_edges() {
        let ambient = AmbientGlobals::with_extra(["ResizeObserver"]);
        let map = GraphBuilder::new(&ambient)
            .build("var watch = new ResizeObserver(cb);")
            .expect("build");
        assert_eq!(needs(&map, "watch"), vec!["cb"]);
    }
}
