//! Chunk assembly: from name sets back to module source text
//!
//! Declarations are projected to byte ranges of the bundle body, sorted by
//! position and concatenated. Sorting is required: the Elm runtime relies on
//! definition order for `var` initializers that call earlier helpers.

use cow_utils::CowUtils;
use log::trace;

use crate::{
    dependency_map::DependencyMap,
    error::{Result, SplitError},
    syntax::{error_kind, first_error, parse},
    types::{FxIndexMap, FxIndexSet},
    visitors::{ReferenceCollector, ReferenceKind},
};

/// A range of the body projected for output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub start: usize,
    pub end: usize,
    /// Text emitted instead of the verbatim range
    pub replacement: Option<String>,
}

/// Import of the shared module into a program module
#[derive(Debug, Clone, Copy)]
pub struct SharedImport<'a> {
    /// Namespace alias, e.g. `shared`
    pub alias: &'a str,
    /// File name relative to the program module
    pub file_name: &'a str,
    /// Names the program reads from the shared module
    pub names: &'a FxIndexSet<String>,
}

/// Renders module texts out of one body and its dependency map
#[derive(Debug)]
pub struct ChunkAssembler<'a> {
    map: &'a DependencyMap,
    body: &'a str,
    replacements: &'a FxIndexMap<String, String>,
}

impl<'a> ChunkAssembler<'a> {
    pub fn new(
        map: &'a DependencyMap,
        body: &'a str,
        replacements: &'a FxIndexMap<String, String>,
    ) -> Self {
        Self {
            map,
            body,
            replacements,
        }
    }

    /// Chunks for `names` and `extra`, sorted by position with duplicate
    /// ranges removed
    pub fn emit<I, S>(&self, names: I, extra: Vec<Chunk>) -> Vec<Chunk>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut chunks = extra;
        for name in names {
            let name = name.as_ref();
            let Some(declaration) = self.map.get(name) else {
                trace!("`{name}` has no declaration, nothing to emit");
                continue;
            };
            let span = declaration.span;
            let replacement = match (self.replacements.get(name), &declaration.detached_keyword) {
                (Some(literal), _) => Some(literal.clone()),
                (None, Some(keyword)) => {
                    Some(format!("{keyword} {};", &self.body[span.start..span.end]))
                }
                (None, None) => None,
            };
            chunks.push(Chunk {
                start: span.start,
                end: span.end,
                replacement,
            });
        }

        chunks.sort_by_key(|chunk| (chunk.start, chunk.end));
        chunks.dedup_by(|next, kept| next.start == kept.start && next.end == kept.end);
        chunks
    }

    /// One chunk per unnamed statement, in source order
    pub fn unnamed_chunks(&self) -> Vec<Chunk> {
        self.map
            .unnamed
            .iter()
            .map(|chunk| Chunk {
                start: chunk.span.start,
                end: chunk.span.end,
                replacement: None,
            })
            .collect()
    }

    /// Text of one chunk
    pub fn text_of<'c>(&self, chunk: &'c Chunk) -> &'c str
    where
        'a: 'c,
    {
        chunk
            .replacement
            .as_deref()
            .unwrap_or(&self.body[chunk.start..chunk.end])
    }

    /// Concatenate chunk texts, one per line
    pub fn render(&self, chunks: &[Chunk]) -> String {
        chunks
            .iter()
            .map(|chunk| self.text_of(chunk))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// The shared module: shared declarations, every unnamed chunk and an
    /// export list in declaration order
    pub fn shared_module(&self, shared: &FxIndexSet<String>) -> String {
        let chunks = self.emit(shared, self.unnamed_chunks());
        let exported: Vec<&str> = self
            .map
            .declarations
            .keys()
            .filter(|name| shared.contains(*name))
            .map(String::as_str)
            .collect();

        let mut text = self.render(&chunks);
        if !text.is_empty() {
            text.push('\n');
        }
        if exported.is_empty() {
            text.push_str("export {};\n");
        } else {
            text.push_str("export {\n");
            for name in exported {
                text.push_str("  ");
                text.push_str(name);
                text.push_str(",\n");
            }
            text.push_str("};\n");
        }
        text
    }

    /// A program module. With `import` the private names are emitted and
    /// shared references are qualified chunk by chunk; without it (single
    /// program) the unnamed chunks are included and nothing is rewritten.
    pub fn program_module(
        &self,
        program: &str,
        names: &FxIndexSet<String>,
        init: &str,
        import: Option<SharedImport<'_>>,
    ) -> Result<String> {
        let exports = entry_exports(program, init);
        let Some(import) = import else {
            let chunks = self.emit(names, self.unnamed_chunks());
            let mut text = self.render(&chunks);
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(&exports);
            return Ok(text);
        };

        let mut text = format!(
            "import * as {} from \"./{}\";\n",
            import.alias, import.file_name
        );
        for chunk in self.emit(names, Vec::new()) {
            text.push_str(&rewrite_shared_references(
                self.text_of(&chunk),
                import.names,
                import.alias,
            )?);
            text.push('\n');
        }
        text.push_str(&rewrite_shared_references(
            &exports,
            import.names,
            import.alias,
        )?);
        Ok(text)
    }
}

/// Identifier a program's export binding is declared under
pub fn program_ident(program: &str) -> String {
    program.cow_replace('.', "_").into_owned()
}

/// `export const X = { init }`, the `Elm` namespace object and the default
/// export
fn entry_exports(program: &str, init: &str) -> String {
    let ident = program_ident(program);
    let namespace = program
        .rsplit('.')
        .fold(ident.clone(), |inner, segment| format!("{{ {segment}: {inner} }}"));
    format!(
        "export const {ident} = {{ init: {init} }};\nexport const Elm = {namespace};\nexport \
         default Elm;\n"
    )
}

/// Prefix every free reference to a name in `shared` with `alias.`.
///
/// Shorthand properties are expanded so the key survives; a write to a
/// shared name cannot be expressed through a namespace import and fails.
pub fn rewrite_shared_references(
    text: &str,
    shared: &FxIndexSet<String>,
    alias: &str,
) -> Result<String> {
    let tree = parse(text)?;
    if let Some(error) = first_error(tree.root_node()) {
        return Err(SplitError::unsupported(
            &error_kind(error),
            text,
            error.start_byte(),
        ));
    }

    let mut references: Vec<_> = ReferenceCollector::new(text)
        .collect_program(tree.root_node())?
        .into_iter()
        .filter(|reference| shared.contains(&reference.name))
        .collect();
    references.sort_by_key(|reference| reference.start);

    let mut rewritten = String::with_capacity(text.len() + references.len() * (alias.len() + 1));
    let mut cursor = 0;
    for reference in references {
        rewritten.push_str(&text[cursor..reference.start]);
        match reference.kind {
            ReferenceKind::Read => {
                rewritten.push_str(alias);
                rewritten.push('.');
                rewritten.push_str(&reference.name);
            }
            ReferenceKind::Shorthand => {
                rewritten.push_str(&reference.name);
                rewritten.push_str(": ");
                rewritten.push_str(alias);
                rewritten.push('.');
                rewritten.push_str(&reference.name);
            }
            ReferenceKind::Write => {
                return Err(SplitError::malformed(
                    "assignment",
                    format!("program code assigns shared name `{}`", reference.name),
                    text,
                    reference.start,
                ));
            }
        }
        cursor = reference.end;
    }
    rewritten.push_str(&text[cursor..]);
    Ok(rewritten)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn set(names: &[&str]) -> FxIndexSet<String> {
        names.iter().map(|name| (*name).to_owned()).collect()
    }

    const BODY: &str = "var a = 1;\nvar b = a + 1, c = 2;\nfunction f() { return b; }\nregister(f);";

    #[test]
    fn test_emit_sorts_and_deduplicates() {
        let map = DependencyMap::build(BODY).expect("build");
        let replacements = FxIndexMap::default();
        let assembler = ChunkAssembler::new(&map, BODY, &replacements);

        let chunks = assembler.emit(["f", "a", "f"], assembler.unnamed_chunks());
        let starts: Vec<usize> = chunks.iter().map(|chunk| chunk.start).collect();
        assert_eq!(starts, vec![0, 33, 60]);
        assert_eq!(
            assembler.render(&chunks),
            "var a = 1;\nfunction f() { return b; }\nregister(f);"
        );
    }

    #[test]
    fn test_detached_declarators_are_rewrapped() {
        let map = DependencyMap::build(BODY).expect("build");
        let replacements = FxIndexMap::default();
        let assembler = ChunkAssembler::new(&map, BODY, &replacements);
        let chunks = assembler.emit(["c", "b"], Vec::new());
        assert_eq!(assembler.render(&chunks), "var b = a + 1;\nvar c = 2;");
    }

    #[test]
    fn test_replacement_text_wins() {
        let map = DependencyMap::build(BODY).expect("build");
        let mut replacements = FxIndexMap::default();
        replacements.insert("a".to_owned(), "var a = globalThis.seed;".to_owned());
        let assembler = ChunkAssembler::new(&map, BODY, &replacements);
        let chunks = assembler.emit(["a"], Vec::new());
        assert_eq!(assembler.render(&chunks), "var a = globalThis.seed;");
    }

    #[test]
    fn test_render_is_deterministic() {
        let map = DependencyMap::build(BODY).expect("build");
        let replacements = FxIndexMap::default();
        let assembler = ChunkAssembler::new(&map, BODY, &replacements);
        let names = set(&["f", "b", "a"]);
        let first = assembler.render(&assembler.emit(&names, Vec::new()));
        let second = assembler.render(&assembler.emit(&names, Vec::new()));
        assert_eq!(first, second);
    }

    #[test]
    fn test_shared_module_shape() {
        let map = DependencyMap::build(BODY).expect("build");
        let replacements = FxIndexMap::default();
        let assembler = ChunkAssembler::new(&map, BODY, &replacements);
        let text = assembler.shared_module(&set(&["f", "a"]));
        insta::assert_snapshot!(text, @r"
        var a = 1;
        function f() { return b; }
        register(f);
        export {
          a,
          f,
        };
        ");
    }

    #[test]
    fn test_rewrite_qualifies_free_shared_names_only() {
        let text = "function g(a) { return a + b + { b }.b; }\nvar h = b;";
        let rewritten =
            rewrite_shared_references(text, &set(&["a", "b"]), "shared").expect("rewrite");
        assert_eq!(
            rewritten,
            "function g(a) { return a + shared.b + { b: shared.b }.b; }\nvar h = shared.b;"
        );
    }

    #[test]
    fn test_rewrite_rejects_writes_to_shared_names() {
        let err = rewrite_shared_references("function g() { b = 1; }", &set(&["b"]), "shared")
            .expect_err("write to shared");
        assert!(matches!(err, SplitError::MalformedDeclaration { .. }));
    }

    #[test]
    fn test_program_module_with_import() {
        let map = DependencyMap::build(BODY).expect("build");
        let replacements = FxIndexMap::default();
        let assembler = ChunkAssembler::new(&map, BODY, &replacements);
        let shared = set(&["a", "f"]);
        let text = assembler
            .program_module(
                "Page.Home",
                &set(&["b"]),
                "f(0)",
                Some(SharedImport {
                    alias: "shared",
                    file_name: "main.shared.js",
                    names: &shared,
                }),
            )
            .expect("module");
        insta::assert_snapshot!(text, @r#"
        import * as shared from "./main.shared.js";
        var b = shared.a + 1;
        export const Page_Home = { init: shared.f(0) };
        export const Elm = { Page: { Home: Page_Home } };
        export default Elm;
        "#);
    }

    #[test]
    fn test_program_ident() {
        assert_eq!(program_ident("Main"), "Main");
        assert_eq!(program_ident("Page.Home"), "Page_Home");
    }
}
