//! Whole-pipeline tests: units in, module or diagnostics out

use ac_ast::{BinaryOp, BodyBuilder, FunctionDecl, Item, SourceUnit};
use ac_driver::{CompileOptions, DiagnosticKind, Session, load_units};
use ac_span::FileId;
use std::path::PathBuf;

fn unit(name: &str, file: u32, items: Vec<Item>) -> SourceUnit {
    let mut unit = SourceUnit::new(name, FileId(file));
    unit.items = items;
    unit
}

fn session() -> Session {
    Session::new(CompileOptions {
        module_name: "demo".to_string(),
        ..CompileOptions::default()
    })
}

fn constant_fn(name: &str, value: i64) -> FunctionDecl {
    // fn <name>() -> int { <value> }
    let mut b = BodyBuilder::new(FileId(0));
    let tail = b.int(value);
    let int = b.ty("int");
    b.finish_function(name, vec![], Some(int), vec![], Some(tail))
}

fn bad_initializer() -> FunctionDecl {
    // fn f() { let y: int = true; }
    let mut b = BodyBuilder::new(FileId(0));
    let init = b.bool(true);
    let int = b.ty("int");
    let stmt = b.let_("y", Some(int), Some(init));
    b.finish_function("f", vec![], None, vec![stmt], None)
}

fn caller(callee: &str) -> FunctionDecl {
    // fn main() -> int { <callee>() + 1 }
    let mut b = BodyBuilder::new(FileId(0));
    let target = b.var(callee);
    let call = b.call(target, vec![]);
    let one = b.int(1);
    let sum = b.binary(BinaryOp::Add, call, one);
    let int = b.ty("int");
    b.finish_function("main", vec![], Some(int), vec![], Some(sum))
}

fn program() -> Vec<SourceUnit> {
    vec![
        unit("util", 0, vec![constant_fn("one", 1).into(), constant_fn("two", 2).into()]),
        unit("more", 1, vec![constant_fn("three", 3).into()]),
        unit("main", 2, vec![caller("util::two").into()]),
    ]
}

#[test]
fn test_program_compiles() {
    let compiled = session().compile(&program()).unwrap();
    let text = compiled.text();
    assert!(text.starts_with("; ModuleID = 'demo'\n"), "{text}");
    assert!(text.contains("define i32 @main()"), "{text}");
    assert!(text.contains("call i32 @acorn_coded__util__two_op__cl___i32()"), "{text}");
    assert_eq!(compiled.module.functions.len(), 4);
}

#[test]
fn test_output_is_independent_of_worker_count() {
    let units = program();
    let serial = Session::new(CompileOptions {
        jobs: Some(1),
        ..CompileOptions::default()
    });
    let parallel = Session::new(CompileOptions {
        jobs: Some(4),
        ..CompileOptions::default()
    });
    let first = serial.compile(&units).unwrap();
    let second = parallel.compile(&units).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.text(), second.text());
}

#[test]
fn test_duplicate_local_is_one_diagnostic() {
    let mut b = BodyBuilder::new(FileId(0));
    let one = b.int(1);
    let first = b.let_("x", None, Some(one));
    let two = b.int(2);
    let second = b.let_("x", None, Some(two));
    let f = b.finish_function("f", vec![], None, vec![first, second], None);

    let diagnostics = session().compile(&[unit("main", 0, vec![f.into()])]).unwrap_err();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].kind, DiagnosticKind::DuplicateDeclaration);
    assert_eq!(diagnostics[0].unit.as_deref(), Some("main"));
}

#[test]
fn test_bool_initializer_is_one_mismatch() {
    let diagnostics = session()
        .compile(&[unit("main", 0, vec![bad_initializer().into()])])
        .unwrap_err();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].kind, DiagnosticKind::TypeMismatch);
    assert_eq!(diagnostics[0].message, "mismatched types: expected i32, found bool");
}

#[test]
fn test_number_plus_function_is_rejected() {
    // fn g() {}  fn f() -> int { return 1 + g; }
    let g = BodyBuilder::new(FileId(0)).finish_function("g", vec![], None, vec![], None);
    let mut b = BodyBuilder::new(FileId(0));
    let one = b.int(1);
    let g_ref = b.var("g");
    let sum = b.binary(BinaryOp::Add, one, g_ref);
    let ret = b.ret(Some(sum));
    let int = b.ty("int");
    let f = b.finish_function("f", vec![], Some(int), vec![ret], None);

    let diagnostics = session()
        .compile(&[unit("main", 0, vec![g.into(), f.into()])])
        .unwrap_err();
    let kinds: Vec<_> = diagnostics.iter().map(|d| d.kind).collect();
    assert_eq!(kinds, vec![DiagnosticKind::TypeMismatch]);
}

#[test]
fn test_one_bad_unit_blocks_the_module() {
    let mut units = program();
    units.push(unit("broken", 3, vec![bad_initializer().into()]));
    let diagnostics = session().compile(&units).unwrap_err();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].unit.as_deref(), Some("broken"));
}

#[test]
fn test_diagnostics_follow_unit_order() {
    let units = [
        unit("first", 0, vec![bad_initializer().into()]),
        unit("second", 1, vec![caller("nowhere").into()]),
    ];
    let diagnostics = session().compile(&units).unwrap_err();
    let summary: Vec<_> = diagnostics
        .iter()
        .map(|d| (d.unit.as_deref().unwrap_or_default(), d.kind))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("first", DiagnosticKind::TypeMismatch),
            ("second", DiagnosticKind::UnboundName),
        ]
    );
}

#[test]
fn test_two_entry_points_clash() {
    let units = [
        unit("a", 0, vec![constant_fn("main", 0).into()]),
        unit("b", 1, vec![constant_fn("main", 1).into()]),
    ];
    let diagnostics = session().compile(&units).unwrap_err();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].kind, DiagnosticKind::DuplicateDeclaration);
    assert_eq!(diagnostics[0].unit.as_deref(), Some("b"));
    assert_eq!(diagnostics[0].message, "`main` is declared more than once");
}

#[test]
fn test_build_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("Acorn.toml"), "module_name = \"disk\"\noutput = \"out/demo.ll\"\n")
        .unwrap();
    let paths: Vec<PathBuf> = program()
        .iter()
        .map(|unit| {
            let path = dir.path().join(format!("{}.json", unit.name));
            std::fs::write(&path, serde_json::to_string(unit).unwrap()).unwrap();
            path
        })
        .collect();

    let options = CompileOptions::discover(dir.path()).unwrap();
    let loaded = load_units(&paths).unwrap();
    let compiled = Session::new(options.clone()).compile(&loaded.units).unwrap();
    let output = dir.path().join(&options.output);
    compiled.write(&output).unwrap();

    let written = std::fs::read_to_string(output).unwrap();
    assert!(written.starts_with("; ModuleID = 'disk'\n"));
    assert_eq!(written, compiled.text());
}
