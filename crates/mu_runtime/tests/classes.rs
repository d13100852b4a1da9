mod common;

use common::{context, eval_on, output_of, print};
use mu_runtime::registration::add_field;
use mu_runtime::{
    ArgumentVector, AstBuilder, CallEnvironment, ClassDecl, Context, Decl, EvalResult, Exception,
    FunctionDecl, InterfaceDecl, Process, RegistrationError, RunError, Thread, Value,
};
use smallvec::smallvec;

/// `Named` and `Sized` are unrelated bases; `Box` derives from both and
/// overrides `area`.
fn declare_shapes(b: &mut AstBuilder<'_>) {
    b.begin_class("Named", &[]).unwrap();
    b.field("label", "string").unwrap();
    b.begin_method("describe", "string", &[]).unwrap();
    let body = b.ret(Some(b.reference("label")));
    b.end_function(body);
    b.end_class().unwrap();

    b.begin_class("Sized", &[]).unwrap();
    b.field("size", "int").unwrap();
    b.begin_method("area", "int", &[]).unwrap();
    let body = b.ret(Some(b.reference("size")));
    b.end_function(body);
    b.end_class().unwrap();

    b.begin_class("Box", &["Named", "Sized"]).unwrap();
    b.begin_method("area", "int", &[]).unwrap();
    let body = b.ret(Some(b.call("*", vec![b.reference("size"), b.reference("size")])));
    b.end_function(body);
    b.end_class().unwrap();
}

fn new_box(b: &AstBuilder<'_>) -> Vec<mu_runtime::Ast> {
    vec![
        b.declare("bx", None, Some(b.new_object("Box", vec![]))),
        b.assign(b.member(b.reference("bx"), "size"), b.int(3)),
        b.assign(b.member(b.reference("bx"), "label"), b.string("box")),
    ]
}

#[test]
fn dispatch_through_either_base() {
    let out = output_of(|b| {
        declare_shapes(b);
        let mut top = new_box(b);
        top.push(b.declare("s", Some("Sized"), Some(b.reference("bx"))));
        top.push(b.declare("n", Some("Named"), Some(b.reference("bx"))));
        top.push(print(b, b.member_call(b.reference("s"), "area", vec![])));
        top.push(print(b, b.member_call(b.reference("n"), "describe", vec![])));
        top.push(print(b, b.member(b.reference("s"), "size")));
        top
    });
    assert_eq!(out, "9\nbox\n3\n");
}

#[test]
fn downcast_checks_the_runtime_class() {
    let process = Process::new(context());
    let result = eval_on(&process, |b| {
        declare_shapes(b);
        b.begin_class("Other", &[]).unwrap();
        b.end_class().unwrap();
        let mut top = new_box(b);
        top.push(b.declare("s", Some("Sized"), Some(b.reference("bx"))));
        let back = b.cast("Box", b.reference("s"));
        top.push(print(b, b.member(back, "label")));
        top.push(b.declare("o", None, Some(b.new_object("Other", vec![]))));
        top.push(b.cast("Box", b.reference("o")));
        top
    });
    assert_eq!(process.take_output(), "box\n");
    match result {
        Err(RunError::Exception(Exception::BadDynamicCast { from, to })) => {
            assert_eq!(from, "Other");
            assert_eq!(to, "Box");
        }
        other => panic!("expected a bad cast, got {other:?}"),
    }
}

#[test]
fn constructor_runs_with_arguments() {
    let out = output_of(|b| {
        b.begin_class("Counter", &[]).unwrap();
        b.field("count", "int").unwrap();
        b.begin_method("Counter", "void", &[("start", "int")]).unwrap();
        let body = b.assign(b.reference("count"), b.reference("start"));
        b.end_function(body);
        b.end_class().unwrap();
        let c = b.new_object("Counter", vec![b.int(41)]);
        vec![print(b, b.member(c, "count"))]
    });
    assert_eq!(out, "41\n");
}

#[test]
fn freeze_is_idempotent_and_final() {
    let ctx = context();
    let root = ctx.root();
    let point = ctx
        .declare_class(root, ClassDecl::new("Point").field("x", "int").field("y", "int"))
        .unwrap();
    let size = ctx.read().class(point).and_then(|c| c.instance_size());
    assert!(size.is_some());
    ctx.freeze(point).unwrap();
    assert_eq!(ctx.read().class(point).and_then(|c| c.instance_size()), size);

    let err = add_field(&mut ctx.write(), point, "z", "int");
    assert!(matches!(err, Err(RegistrationError::ClassFrozen(_))));

    let err = ctx.declare_class(root, ClassDecl::new("Point"));
    assert!(matches!(err, Err(RegistrationError::Duplicate(_))));
}

fn arity(_: &mut Thread, args: &[Value]) -> EvalResult {
    Ok(Value::Int(args.len() as i32))
}

#[test]
fn native_methods_receive_this() {
    let ctx = context();
    let root = ctx.root();
    ctx.declare_class(
        root,
        ClassDecl::new("Probe").method(FunctionDecl::method("count", arity, "int", &["int"])),
    )
    .unwrap();
    let out = {
        let process = Process::new(ctx.clone());
        eval_on(&process, |b| {
            let probe = b.new_object("Probe", vec![]);
            vec![print(b, b.member_call(probe, "count", vec![b.int(7)]))]
        })
        .unwrap();
        process.take_output()
    };
    assert_eq!(out, "2\n");
}

fn shapes_process() -> (Process, mu_runtime::SymbolId) {
    let ctx: std::sync::Arc<Context> = context();
    let process = Process::new(ctx);
    let mut global = None;
    eval_on(&process, |b| {
        declare_shapes(b);
        global = Some(b.global("shape", "Sized").unwrap());
        let mut top = new_box(b);
        top.push(b.assign(b.reference("shape"), b.reference("bx")));
        top
    })
    .unwrap();
    (process, global.unwrap())
}

#[test]
fn host_calls_methods_by_name() {
    let (process, global) = shapes_process();
    let shape = process.global(global).unwrap();
    assert!(matches!(shape, Value::Object(_)));

    let mut args: ArgumentVector = smallvec![shape];
    assert_eq!(process.call_method_by_name("area", &mut args).unwrap(), Value::Int(9));
    assert_eq!(args.as_slice(), &[Value::Int(9)]);

    let mut args: ArgumentVector = smallvec![shape];
    let err = process.call_method_by_name("volume", &mut args);
    assert!(matches!(
        err,
        Err(RunError::Exception(Exception::NoSuchMethod { .. }))
    ));

    let mut args: ArgumentVector = smallvec![Value::Nil];
    let err = process.call_method_by_name("area", &mut args);
    assert!(matches!(
        err,
        Err(RunError::Exception(Exception::NilMethodInvocation(_)))
    ));
}

#[test]
fn host_calls_functions() {
    let process = Process::new(context());
    let mut square = None;
    eval_on(&process, |b| {
        square = Some(b.begin_function("square", "int", &[("x", "int")]).unwrap());
        let body = b.ret(Some(b.call("*", vec![b.reference("x"), b.reference("x")])));
        b.end_function(body);
        vec![]
    })
    .unwrap();
    let mut args: ArgumentVector = smallvec![Value::Int(12)];
    let result = process.call(square.unwrap(), &mut args).unwrap();
    assert_eq!(result, Value::Int(144));
    assert_eq!(args.len(), 1);
}

#[test]
fn interface_conformance_is_cached_until_the_interface_changes() {
    let ctx = context();
    let root = ctx.root();
    let shape = ctx
        .declare_interface(root, InterfaceDecl::new("Shape").method("count", "int", &["int"]))
        .unwrap();
    let probe = ctx
        .declare_class(
            root,
            ClassDecl::new("Probe").method(FunctionDecl::method("count", arity, "int", &["int"])),
        )
        .unwrap();
    let derived = ctx
        .declare_class(root, ClassDecl::new("Derived").field("extra", "int").extends("Probe"))
        .unwrap();

    let entries = ctx.read().implementation(derived, shape).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].this_offset, 0);
    assert!(ctx.read().implementation(probe, shape).is_some());

    ctx.add_symbols(shape, [Decl::from(FunctionDecl::abstract_method("volume", "int", &[]))])
        .unwrap();
    assert!(ctx.read().implementation(probe, shape).is_none());
    assert!(ctx.read().implementation(derived, shape).is_none());
    assert!(!ctx.read().conforms(probe, shape));
}
