#![allow(clippy::disallowed_methods)]

use std::fs;

use elm_split::{Config, SplitError, SplitOutcome, Splitter, report::Report};
use pretty_assertions::assert_eq;
use rustc_hash::FxHashSet;
use tempfile::TempDir;

const TWO_PROGRAMS: &str = include_str!("fixtures/two_programs.js");
const SINGLE_PROGRAM: &str = include_str!("fixtures/single_program.js");
const ESCAPE_HATCH: &str = include_str!("fixtures/escape_hatch.js");
const DISJOINT: &str = include_str!("fixtures/disjoint.js");

/// `var`/`function` names a module declares at the top level
fn declared_names(module: &str) -> FxHashSet<&str> {
    module
        .lines()
        .filter_map(|line| {
            line.strip_prefix("var ")
                .or_else(|| line.strip_prefix("function "))
        })
        .filter_map(|rest| rest.split([' ', '(']).next())
        .collect()
}

#[test]
fn test_two_programs_split_into_three_modules() {
    let result = Splitter::default()
        .split(TWO_PROGRAMS, "two_programs")
        .unwrap();

    assert_eq!(result.outcome, SplitOutcome::SplitProgramsOneShared);
    assert_eq!(result.programs, vec!["Clock", "Counter"]);
    let files: Vec<_> = result.modules.iter().map(|m| m.file_name.as_str()).collect();
    assert_eq!(
        files,
        vec![
            "two_programs.shared.js",
            "two_programs.Clock.js",
            "two_programs.Counter.js"
        ]
    );

    let shared = &result.modules[0].contents;
    assert_eq!(result.modules[0].program, None);
    assert!(shared.starts_with("function F(arity, fun, wrapper) {"));
    assert!(shared.contains("_Platform_effectManagers['Task'] = { tag: 0 };\nexport {\n"));
    assert!(shared.ends_with(
        "export {\n  F,\n  F2,\n  A2,\n  _Platform_effectManagers,\n  _Scheduler_guid,\n  \
         _Platform_worker,\n  $elm$core$Basics$identity,\n};\n"
    ));
    assert!(!shared.contains("$author$project$"));
    assert!(!shared.contains("function _Platform_export"));
}

#[test]
fn test_program_modules_import_the_shared_namespace() {
    let result = Splitter::default()
        .split(TWO_PROGRAMS, "two_programs")
        .unwrap();

    assert_eq!(
        result.modules[1].contents,
        concat!(
            "import * as shared from \"./two_programs.shared.js\";\n",
            "var $author$project$Clock$tick = function (n) { return n * 2; };\n",
            "var $author$project$Clock$main = shared.A2(shared._Platform_worker, { init: \
             $author$project$Clock$tick }, shared.$elm$core$Basics$identity);\n",
            "export const Clock = { init: $author$project$Clock$main(0) };\n",
            "export const Elm = { Clock: Clock };\n",
            "export default Elm;\n",
        )
    );
    assert_eq!(
        result.modules[2].contents,
        concat!(
            "import * as shared from \"./two_programs.shared.js\";\n",
            "var $elm$core$Basics$add = shared.F2(function (a, b) { return a + b; });\n",
            "var $author$project$Counter$step = $elm$core$Basics$add(1);\n",
            "var $author$project$Counter$main = shared.A2(shared._Platform_worker, { init: \
             $author$project$Counter$step }, shared.$elm$core$Basics$identity);\n",
            "export const Counter = { init: $author$project$Counter$main(0) };\n",
            "export const Elm = { Counter: Counter };\n",
            "export default Elm;\n",
        )
    );
}

#[test]
fn test_no_declaration_is_emitted_twice() {
    let result = Splitter::default()
        .split(TWO_PROGRAMS, "two_programs")
        .unwrap();

    let sets: Vec<_> = result
        .modules
        .iter()
        .map(|module| declared_names(&module.contents))
        .collect();
    for (i, left) in sets.iter().enumerate() {
        for right in &sets[i + 1..] {
            assert!(
                left.is_disjoint(right),
                "declared twice: {:?}",
                left.intersection(right).collect::<Vec<_>>()
            );
        }
    }
    let everything: FxHashSet<&str> = sets.into_iter().flatten().collect();
    assert!(!everything.contains("$author$project$Unused$value"));
}

#[test]
fn test_single_program_is_reduced_to_live_code() {
    let result = Splitter::default().split(SINGLE_PROGRAM, "app").unwrap();

    assert_eq!(result.outcome, SplitOutcome::SingleProgramReduced);
    assert_eq!(result.modules.len(), 1);
    let module = &result.modules[0];
    assert_eq!(module.file_name, "app.Main.js");
    assert_eq!(module.program.as_deref(), Some("Main"));
    assert_eq!(
        module.contents,
        concat!(
            "function F2(fun) {\n",
            "  return function (a) { return function (b) { return fun(a, b); }; };\n",
            "}\n",
            "var _Platform_effectManagers = {};\n",
            "var $elm$core$Basics$add = F2(function (a, b) { return a + b; });\n",
            "var $elm$core$String$fromInt = function (n) { return String(n); };\n",
            "var $author$project$Main$view = function (model) { return \
             $elm$core$String$fromInt($elm$core$Basics$add(model)(1)); };\n",
            "var $author$project$Main$main = { view: $author$project$Main$view };\n",
            "_Platform_effectManagers['Time'] = { init: 0 };\n",
            "export const Main = { init: $author$project$Main$main };\n",
            "export const Elm = { Main: Main };\n",
            "export default Elm;\n",
        )
    );
    assert!(module.contents.len() < SINGLE_PROGRAM.len());
}

#[test]
fn test_unparseable_closure_lives_in_the_shared_module() {
    let result = Splitter::default().split(ESCAPE_HATCH, "json").unwrap();

    let shared = &result.modules[0].contents;
    assert!(shared.contains(
        "var _Json_wrap = (function () { return function (x) { return _Json_check(x) @ 1; }; \
         }());\n"
    ));
    assert!(shared.contains("function _Json_check(value) { return value; }"));
    assert!(shared.contains("function _Json_unwrap(value) { return value; }"));
    assert!(shared.contains("  _Json_wrap,\n  _Json_check,\n"));

    assert_eq!(result.modules[1].file_name, "json.Admin.js");
    let admin = &result.modules[1].contents;
    assert!(!admin.contains("var _Json_wrap"));
    assert!(admin.contains(
        "var $author$project$Admin$main = { decoder: shared.$elm$json$Json$Decode$value, raw: \
         shared._Json_wrap };"
    ));
    assert!(!result.modules[2].contents.contains("_Json_"));
}

#[test]
fn test_disjoint_programs_share_only_runtime_code() {
    let result = Splitter::default().split(DISJOINT, "disjoint").unwrap();

    assert_eq!(result.outcome, SplitOutcome::SplitProgramsOneShared);
    assert_eq!(
        result.modules[0].contents,
        concat!(
            "var _Platform_effectManagers = {};\n",
            "_Platform_effectManagers['Task'] = { tag: 0 };\n",
            "export {\n",
            "  _Platform_effectManagers,\n",
            "};\n",
        )
    );
    assert_eq!(
        result.modules[1].contents,
        concat!(
            "import * as shared from \"./disjoint.shared.js\";\n",
            "var $author$project$Alpha$view = function (n) { return n + 1; };\n",
            "var $author$project$Alpha$main = { view: $author$project$Alpha$view };\n",
            "export const Alpha = { init: $author$project$Alpha$main };\n",
            "export const Elm = { Alpha: Alpha };\n",
            "export default Elm;\n",
        )
    );
    let alpha = declared_names(&result.modules[1].contents);
    let beta = declared_names(&result.modules[2].contents);
    assert!(alpha.is_disjoint(&beta));
    assert!(beta.contains("$author$project$Beta$label"));
}

#[test]
fn test_unknown_name_in_top_level_statement_fails() {
    let body = "(function(scope){\n'use strict';\nvar a = 1;\nvar b = 2;\nregister(a);\n";
    let two = format!("{body}_Platform_export({{'One':{{'init':a}},'Two':{{'init':b}}}});}}(this));");
    let one = format!("{body}_Platform_export({{'One':{{'init':a}}}});}}(this));");

    for source in [two, one] {
        let err = Splitter::default().split(&source, "main").unwrap_err();
        match err {
            SplitError::UnknownIdentifier {
                name,
                referenced_by,
            } => {
                assert_eq!(name, "register");
                assert_eq!(referenced_by, "top-level statement");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}

#[test]
fn test_unknown_identifier_names_its_referrer() {
    let source = "(function(scope){\n'use strict';\nvar $author$project$Main$main = \
                  $elm$core$Missing$thing(1);\n_Platform_export({'Main':{'init':$author$project$\
                  Main$main},'Other':{'init':$author$project$Main$main}});}(this));";
    let err = Splitter::default().split(source, "main").unwrap_err();
    match err {
        SplitError::UnknownIdentifier {
            name,
            referenced_by,
        } => {
            assert_eq!(name, "$elm$core$Missing$thing");
            assert_eq!(referenced_by, "$author$project$Main$main");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_syntax_error_is_located_in_the_bundle() {
    let source = "(function(scope){\n'use strict';\nvar a = 1;\nvar b = (;\n\
                  _Platform_export({'Main':{'init':a}});}(this));";
    let err = Splitter::default().split(source, "main").unwrap_err();
    match err {
        SplitError::UnsupportedSyntax { location, .. } => assert_eq!(location.line, 4),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_configured_alias_and_forced_names() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("elm-split.toml");
    fs::write(
        &config_path,
        "shared-alias = \"common\"\nforced-shared = [\"$author$project$Clock$tick\"]\n",
    )
    .unwrap();
    let config = Config::layered(&[], Some(&config_path)).unwrap();

    let result = Splitter::new(config)
        .split(TWO_PROGRAMS, "two_programs")
        .unwrap();
    let clock = &result.modules[1].contents;
    assert!(clock.starts_with("import * as common from \"./two_programs.shared.js\";\n"));
    assert!(clock.contains("{ init: common.$author$project$Clock$tick }"));
    assert!(!clock.contains("var $author$project$Clock$tick"));
    assert!(
        result.modules[0]
            .contents
            .contains("var $author$project$Clock$tick = function (n) { return n * 2; };")
    );
    // the default runtime slots were replaced, so `_Scheduler_guid` is shared
    // only because both programs reach it
    assert!(result.modules[0].contents.contains("  _Scheduler_guid,\n"));
}

#[test]
fn test_modules_and_report_written_to_disk() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("two_programs.js");
    fs::write(&input, TWO_PROGRAMS).unwrap();

    let result = Splitter::default()
        .split(&fs::read_to_string(&input).unwrap(), "two_programs")
        .unwrap();
    for module in &result.modules {
        fs::write(temp_dir.path().join(&module.file_name), &module.contents).unwrap();
    }
    let report = Report::success(&input, TWO_PROGRAMS.len(), &result, temp_dir.path(), false);

    assert_eq!(report.output.files.len(), 3);
    for file in &report.output.files {
        let written = fs::read_to_string(&file.path).unwrap();
        assert_eq!(written.len(), file.bytes);
    }
    let human = report.to_human();
    assert!(human.contains("2 program(s)"));
    assert!(human.contains("[shared]"));
    assert!(human.contains("two_programs.Counter.js"));
}
