//! Body checking tests

use ac_ast::{
    Attribute, BinaryOp, BodyBuilder, FieldDecl, FunctionDecl, Item, SourceUnit, StructDecl,
    UnaryOp,
};
use ac_intern::Interner;
use ac_span::FileId;
use ac_symbols::UnitId;
use ac_ty::{Declarations, ResolvedAst, Ty, TypeError, TypeResolver};
use expect_test::{expect, Expect};

fn unit(items: Vec<Item>) -> SourceUnit {
    let mut unit = SourceUnit::new("main", FileId(0));
    unit.items = items;
    unit
}

fn errors(unit: &SourceUnit) -> Vec<TypeError> {
    let decls = Declarations::collect(&Interner::new(), std::slice::from_ref(unit));
    match TypeResolver::new(&decls).resolve(UnitId(0), unit) {
        Ok(_) => Vec::new(),
        Err(errors) => errors,
    }
}

fn check_errors(unit: &SourceUnit, expect: Expect) {
    let rendered: Vec<String> = errors(unit).iter().map(ToString::to_string).collect();
    expect.assert_eq(&rendered.join("\n"));
}

fn resolved<R>(unit: &SourceUnit, inspect: impl FnOnce(&ResolvedAst<'_>, &Declarations) -> R) -> R {
    let decls = Declarations::collect(&Interner::new(), std::slice::from_ref(unit));
    let resolved = TypeResolver::new(&decls)
        .resolve(UnitId(0), unit)
        .unwrap_or_else(|errors| panic!("unexpected errors: {errors:?}"));
    inspect(&resolved, &decls)
}

fn extern_fn(name: &str, params: &[&str], ret: Option<&str>, varargs: bool) -> Item {
    let mut b = BodyBuilder::new(FileId(0));
    let params = params
        .iter()
        .enumerate()
        .map(|(idx, ty)| {
            let ty = match ty.strip_prefix('*') {
                Some(pointee) => {
                    let pointee = b.ty(pointee);
                    b.ptr_ty(pointee)
                }
                None => b.ty(ty),
            };
            b.param(&format!("p{idx}"), ty)
        })
        .collect();
    let return_type = ret.map(|ret| b.ty(ret));
    Item::Function(FunctionDecl {
        name: name.into(),
        params,
        return_type,
        body: None,
        attributes: if varargs { vec![Attribute::Varargs] } else { vec![] },
        span: b.span(),
    })
}

#[test]
fn test_bool_initializer_for_int() {
    // fn f() { let y: int = true; }
    let mut b = BodyBuilder::new(FileId(0));
    let init = b.bool(true);
    let int = b.ty("int");
    let stmt = b.let_("y", Some(int), Some(init));
    let let_span = b.stmt_span_of(stmt);
    let f = b.finish_function("f", vec![], None, vec![stmt], None);

    let errors = errors(&unit(vec![f.into()]));
    assert_eq!(errors.len(), 1);
    assert!(matches!(
        &errors[0],
        TypeError::TypeMismatch { expected, found, .. } if expected == "i32" && found == "bool"
    ));
    assert_eq!(errors[0].span(), let_span);
}

#[test]
fn test_bad_assignment_points_at_assignment() {
    // fn f() { let x: int = 1; x = true; }
    let mut b = BodyBuilder::new(FileId(0));
    let one = b.int(1);
    let int = b.ty("int");
    let decl = b.let_("x", Some(int), Some(one));
    let target = b.var("x");
    let value = b.bool(true);
    let assign = b.assign(target, value);
    let assign_span = b.span_of(assign);
    let value_span = b.span_of(value);
    let stmt = b.expr_stmt(assign);
    let f = b.finish_function("f", vec![], None, vec![decl, stmt], None);

    let errors = errors(&unit(vec![f.into()]));
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].span(), assign_span);
    assert_ne!(errors[0].span(), value_span);
}

#[test]
fn test_numeric_plus_function() {
    // fn g() {}  fn f() -> int { return 1 + g; }
    let g = BodyBuilder::new(FileId(0)).finish_function("g", vec![], None, vec![], None);
    let mut b = BodyBuilder::new(FileId(0));
    let one = b.int(1);
    let g_ref = b.var("g");
    let sum = b.binary(BinaryOp::Add, one, g_ref);
    let sum_span = b.span_of(sum);
    let ret = b.ret(Some(sum));
    let int = b.ty("int");
    let f = b.finish_function("f", vec![], Some(int), vec![ret], None);

    let unit = unit(vec![g.into(), f.into()]);
    check_errors(
        &unit,
        expect!["mismatched types: expected a numeric type, found fn() -> unit"],
    );
    let errors = errors(&unit);
    assert_eq!(errors[0].span(), sum_span);
}

#[test]
fn test_oversized_literals_in_bodies() {
    // fn big() -> int { 5000000000 }  fn small() -> i8 { 300i8 }
    let mut b = BodyBuilder::new(FileId(0));
    let tail = b.int(5_000_000_000);
    let int = b.ty("int");
    let big = b.finish_function("big", vec![], Some(int), vec![], Some(tail));
    let mut b = BodyBuilder::new(FileId(0));
    let tail = b.int_sized(300, 8);
    let i8 = b.ty("i8");
    let small = b.finish_function("small", vec![], Some(i8), vec![], Some(tail));

    check_errors(
        &unit(vec![big.into(), small.into()]),
        expect![[r#"
            mismatched types: expected an integer that fits i32, found 5000000000
            mismatched types: expected an integer that fits i8, found 300"#]],
    );
}

#[test]
fn test_unrelated_operands_point_at_binary() {
    // fn f(p: *int) -> bool { p == 1.5 }
    let mut b = BodyBuilder::new(FileId(0));
    let int = b.ty("int");
    let ptr = b.ptr_ty(int);
    let param = b.param("p", ptr);
    let p = b.var("p");
    let half = b.float(1.5);
    let eq = b.binary(BinaryOp::Eq, p, half);
    let eq_span = b.span_of(eq);
    let ret = b.ty("bool");
    let f = b.finish_function("f", vec![param], Some(ret), vec![], Some(eq));

    let errors = errors(&unit(vec![f.into()]));
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0], TypeError::TypeMismatch { .. }));
    assert_eq!(errors[0].span(), eq_span);
}

#[test]
fn test_duplicate_local_in_one_block() {
    let mut b = BodyBuilder::new(FileId(0));
    let one = b.int(1);
    let first = b.let_("x", None, Some(one));
    let two = b.int(2);
    let second = b.let_("x", None, Some(two));
    let f = b.finish_function("f", vec![], None, vec![first, second], None);

    check_errors(&unit(vec![f.into()]), expect!["`x` is declared more than once"]);
}

#[test]
fn test_shadowing_in_nested_block_reads_outer_first() {
    // fn f() -> i64 { let x = 1; { let x: i64 = x; x } }
    let mut b = BodyBuilder::new(FileId(0));
    let one = b.int(1);
    let outer = b.let_("x", None, Some(one));
    let read_outer = b.var("x");
    let i64_ty = b.ty("i64");
    let inner = b.let_("x", Some(i64_ty), Some(read_outer));
    let read_inner = b.var("x");
    let block = b.block(vec![inner], Some(read_inner));
    let ret = b.ty("i64");
    let f = b.finish_function("f", vec![], Some(ret), vec![outer], Some(block));
    let unit = unit(vec![f.into()]);

    resolved(&unit, |resolved, _| {
        let function = &resolved.functions[0];
        assert_ne!(function.refs[&read_outer], function.refs[&read_inner]);
        assert_eq!(function.ty(read_inner), &Ty::I64);
        assert_eq!(function.coercion(read_outer), Some(&Ty::I64));
    });
}

#[test]
fn test_unbound_name_suggests() {
    let mut b = BodyBuilder::new(FileId(0));
    let one = b.int(1);
    let counter = b.let_("counter", None, Some(one));
    let typo = b.var("countr");
    let stmt = b.expr_stmt(typo);
    let f = b.finish_function("f", vec![], None, vec![counter, stmt], None);

    let errors = errors(&unit(vec![f.into()]));
    assert!(matches!(
        &errors[..],
        [TypeError::UnboundName { suggestions, .. }] if suggestions == &["counter".to_string()]
    ));
}

#[test]
fn test_missing_return_on_some_path() {
    // fn f(x: int) -> int { if x > 0 { return 1; } }
    let mut b = BodyBuilder::new(FileId(0));
    let x = b.var("x");
    let zero = b.int(0);
    let cond = b.binary(BinaryOp::Gt, x, zero);
    let one = b.int(1);
    let ret = b.ret(Some(one));
    let then = b.block(vec![ret], None);
    let if_expr = b.if_else(cond, then, None);
    let stmt = b.expr_stmt(if_expr);
    let int = b.ty("int");
    let param = b.param("x", int);
    let int = b.ty("int");
    let f = b.finish_function("f", vec![param], Some(int), vec![stmt], None);

    check_errors(
        &unit(vec![f.into()]),
        expect!["function returns i32 but this path yields unit"],
    );
}

#[test]
fn test_both_branches_return() {
    // fn f(c: bool) -> int { if c { return 1; } else { return 2; } }
    let mut b = BodyBuilder::new(FileId(0));
    let c = b.var("c");
    let one = b.int(1);
    let ret_one = b.ret(Some(one));
    let then = b.block(vec![ret_one], None);
    let two = b.int(2);
    let ret_two = b.ret(Some(two));
    let other = b.block(vec![ret_two], None);
    let if_expr = b.if_else(c, then, Some(other));
    let stmt = b.expr_stmt(if_expr);
    let bool_ty = b.ty("bool");
    let param = b.param("c", bool_ty);
    let int = b.ty("int");
    let f = b.finish_function("f", vec![param], Some(int), vec![stmt], None);
    let unit = unit(vec![f.into()]);

    resolved(&unit, |resolved, _| {
        let function = &resolved.functions[0];
        assert!(function.diverges(if_expr));
        assert!(function.diverges(resolved.decl(function).unwrap().body.as_ref().unwrap().root));
    });
}

#[test]
fn test_infinite_loop_needs_no_return() {
    // fn f() -> int { while true {} }
    let mut b = BodyBuilder::new(FileId(0));
    let cond = b.bool(true);
    let body = b.block(vec![], None);
    let looped = b.while_loop(cond, body);
    let stmt = b.expr_stmt(looped);
    let int = b.ty("int");
    let f = b.finish_function("f", vec![], Some(int), vec![stmt], None);
    let unit = unit(vec![f.into()]);

    resolved(&unit, |resolved, _| {
        let function = &resolved.functions[0];
        assert!(function.infinite_loops.contains(&looped));
        assert!(function.diverges(looped));
    });
}

#[test]
fn test_storage_plan() {
    // fn f(n: int) {
    //     let total = 0;
    //     let fixed = 1;
    //     let seen = 2;
    //     let p = &seen;
    //     while total < n { total = total + fixed; }
    // }
    let mut b = BodyBuilder::new(FileId(0));
    let zero = b.int(0);
    let total = b.let_("total", None, Some(zero));
    let one = b.int(1);
    let fixed = b.let_("fixed", None, Some(one));
    let two = b.int(2);
    let seen = b.let_("seen", None, Some(two));
    let seen_ref = b.var("seen");
    let addr = b.unary(UnaryOp::AddrOf, seen_ref);
    let p = b.let_("p", None, Some(addr));
    let total_read = b.var("total");
    let n = b.var("n");
    let cond = b.binary(BinaryOp::Lt, total_read, n);
    let total_target = b.var("total");
    let total_rhs = b.var("total");
    let fixed_read = b.var("fixed");
    let sum = b.binary(BinaryOp::Add, total_rhs, fixed_read);
    let assign = b.assign(total_target, sum);
    let assign_stmt = b.expr_stmt(assign);
    let body = b.block(vec![assign_stmt], None);
    let looped = b.while_loop(cond, body);
    let loop_stmt = b.expr_stmt(looped);
    let int = b.ty("int");
    let param = b.param("n", int);
    let f = b.finish_function(
        "f",
        vec![param],
        None,
        vec![total, fixed, seen, p, loop_stmt],
        None,
    );
    let unit = unit(vec![f.into()]);

    resolved(&unit, |resolved, _| {
        let function = &resolved.functions[0];
        let resident = |stmt| function.is_memory_resident(function.lets[&stmt]);
        assert!(resident(total));
        assert!(resident(seen));
        assert!(!resident(fixed));
        assert!(!resident(p));
        assert!(!function.is_memory_resident(function.params[0]));
    });
}

#[test]
fn test_break_outside_loop() {
    let mut b = BodyBuilder::new(FileId(0));
    let brk = b.break_();
    let stmt = b.expr_stmt(brk);
    let f = b.finish_function("f", vec![], None, vec![stmt], None);

    check_errors(&unit(vec![f.into()]), expect!["`break` outside of a loop"]);
}

#[test]
fn test_call_arity_and_varargs() {
    // printf("%d", 1, 2.0f32); add(1);
    let printf = extern_fn("printf", &["*i8"], Some("i32"), true);
    let add = extern_fn("add", &["int", "int"], Some("int"), false);
    let mut b = BodyBuilder::new(FileId(0));
    let callee = b.var("printf");
    let fmt = b.cstr("%d");
    let one = b.int(1);
    let half = b.literal(ac_ast::Literal::Float {
        value: 0.5,
        bits: Some(32),
    });
    let call = b.call(callee, vec![fmt, one, half]);
    let printf_stmt = b.expr_stmt(call);
    let add_ref = b.var("add");
    let one = b.int(1);
    let bad_call = b.call(add_ref, vec![one]);
    let add_stmt = b.expr_stmt(bad_call);
    let f = b.finish_function("f", vec![], None, vec![printf_stmt, add_stmt], None);

    check_errors(
        &unit(vec![printf, add, f.into()]),
        expect!["this function takes 2 arguments but 1 were supplied"],
    );
}

#[test]
fn test_varargs_promotion_recorded() {
    let printf = extern_fn("printf", &["*i8"], Some("i32"), true);
    let mut b = BodyBuilder::new(FileId(0));
    let callee = b.var("printf");
    let fmt = b.cstr("%f");
    let half = b.literal(ac_ast::Literal::Float {
        value: 0.5,
        bits: Some(32),
    });
    let flag = b.bool(true);
    let wide = b.int_sized(1, 64);
    let call = b.call(callee, vec![fmt, half, flag, wide]);
    let stmt = b.expr_stmt(call);
    let f = b.finish_function("f", vec![], None, vec![stmt], None);
    let unit = unit(vec![printf, f.into()]);

    resolved(&unit, |resolved, _| {
        let function = &resolved.functions[0];
        assert_eq!(function.coercion(half), Some(&Ty::F64));
        assert_eq!(function.coercion(flag), Some(&Ty::I32));
        assert_eq!(function.coercion(wide), None);
        assert_eq!(function.coercion(fmt), None);
        assert_eq!(function.ty(call), &Ty::I32);
    });
}

fn point() -> Item {
    let mut b = BodyBuilder::new(FileId(0));
    let fields = ["x", "y"]
        .into_iter()
        .map(|name| {
            let ty = b.ty("int");
            FieldDecl {
                name: name.into(),
                ty,
                span: b.span(),
            }
        })
        .collect();
    Item::Struct(StructDecl {
        name: "Point".into(),
        fields,
        span: b.span(),
    })
}

#[test]
fn test_field_assignment_makes_resident() {
    // fn f() -> int { let p = Point { x: 1, y: 2 }; p.y = 3; p.x }
    let mut b = BodyBuilder::new(FileId(0));
    let one = b.int(1);
    let two = b.int(2);
    let lit = b.struct_literal("Point", vec![("x", one), ("y", two)]);
    let p = b.let_("p", None, Some(lit));
    let base = b.var("p");
    let field = b.field(base, "y");
    let three = b.int(3);
    let assign = b.assign(field, three);
    let assign_stmt = b.expr_stmt(assign);
    let base = b.var("p");
    let read = b.field(base, "x");
    let int = b.ty("int");
    let f = b.finish_function("f", vec![], Some(int), vec![p, assign_stmt], Some(read));
    let unit = unit(vec![point(), f.into()]);

    resolved(&unit, |resolved, decls| {
        let function = &resolved.functions[0];
        assert!(function.is_memory_resident(function.lets[&p]));
        assert_eq!(function.fields[&read].index, 0);
        assert_eq!(
            decls.display(function.ty(lit)).to_string(),
            "main::Point"
        );
    });
}

#[test]
fn test_struct_literal_errors() {
    // Point { x: 1, z: 2 }
    let mut b = BodyBuilder::new(FileId(0));
    let one = b.int(1);
    let two = b.int(2);
    let lit = b.struct_literal("Point", vec![("x", one), ("z", two)]);
    let stmt = b.expr_stmt(lit);
    let f = b.finish_function("f", vec![], None, vec![stmt], None);

    check_errors(
        &unit(vec![point(), f.into()]),
        expect![[r#"
            no field `z` on type main::Point
            mismatched types: expected an initializer for field `y`, found none"#]],
    );
}

#[test]
fn test_assign_to_non_place() {
    // 1 = 2;
    let mut b = BodyBuilder::new(FileId(0));
    let one = b.int(1);
    let two = b.int(2);
    let assign = b.assign(one, two);
    let stmt = b.expr_stmt(assign);
    let f = b.finish_function("f", vec![], None, vec![stmt], None);

    check_errors(&unit(vec![f.into()]), expect!["expression is not a place"]);
}

#[test]
fn test_error_sentinel_suppresses_cascade() {
    // let a = missing; let b: bool = a + 1;
    let mut b = BodyBuilder::new(FileId(0));
    let missing = b.var("missing");
    let a = b.let_("a", None, Some(missing));
    let a_ref = b.var("a");
    let one = b.int(1);
    let sum = b.binary(BinaryOp::Add, a_ref, one);
    let bool_ty = b.ty("bool");
    let second = b.let_("b", Some(bool_ty), Some(sum));
    let f = b.finish_function("f", vec![], None, vec![a, second], None);

    check_errors(&unit(vec![f.into()]), expect!["cannot find `missing` in this scope"]);
}

#[test]
fn test_qualified_call_across_units() {
    let add = extern_fn("add", &["int", "int"], Some("int"), false);
    let mut math = SourceUnit::new("math", FileId(1));
    math.items = vec![add];

    let mut b = BodyBuilder::new(FileId(0));
    let callee = b.var("math::add");
    let one = b.int(1);
    let two = b.int(2);
    let call = b.call(callee, vec![one, two]);
    let int = b.ty("int");
    let f = b.finish_function("main", vec![], Some(int), vec![], Some(call));
    let main = unit(vec![f.into()]);

    let units = [math, main];
    let decls = Declarations::collect(&Interner::new(), &units);
    let resolved = TypeResolver::new(&decls).resolve(UnitId(1), &units[1]).unwrap();
    assert_eq!(resolved.functions[0].ty(call), &Ty::I32);
}
