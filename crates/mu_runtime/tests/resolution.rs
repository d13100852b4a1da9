mod common;

use common::{context, eval_on, print};
use mu_runtime::{
    ArgumentVector, AstBuilder, CallEnvironment, Process, RegistrationError, ResolveError,
    RunError,
};
use mu_syntax::SourceFile;
use smallvec::smallvec;

fn resolve_error(result: Result<mu_runtime::Value, RunError>) -> ResolveError {
    match result {
        Err(RunError::Resolve(e)) => e,
        other => panic!("expected a resolution error, got {other:?}"),
    }
}

#[test]
fn misspelled_call_reports_position_and_suggestion() {
    let process = Process::new(context());
    let result = eval_on(&process, |b| {
        b.in_file("main.mu").at(3, 7);
        vec![b.call("pritn", vec![b.int(1)])]
    });
    let e = resolve_error(result);
    let d = e.first().unwrap();
    let pos = d.pos.as_ref().unwrap();
    assert_eq!((pos.line, pos.column), (3, 7));
    assert_eq!(pos.file.as_deref(), Some("main.mu"));
    assert!(d.message.contains("pritn"), "{}", d.message);
    assert!(d.help.as_deref().unwrap_or("").contains("print"), "{:?}", d.help);

    let source = SourceFile::new("main.mu", "\n\n\n       pritn(1);\n".to_string());
    let rendered = e.render(Some(&source));
    assert!(rendered.contains("  |        pritn(1);"), "{rendered}");
    assert!(rendered.contains("Did you mean"), "{rendered}");
}

#[test]
fn failed_unit_installs_nothing() {
    let process = Process::new(context());
    let mut helper = None;
    let result = eval_on(&process, |b| {
        helper = Some(b.begin_function("helper", "int", &[]).unwrap());
        let body = b.ret(Some(b.int(5)));
        b.end_function(body);
        vec![b.reference("undefined_name")]
    });
    resolve_error(result);
    assert!(process.root().is_none());
    let mut args: ArgumentVector = smallvec![];
    assert!(matches!(
        process.call(helper.unwrap(), &mut args),
        Err(RunError::Internal(_))
    ));
    assert_eq!(process.context().find("helper"), None);
}

#[test]
fn failed_unit_can_be_retried_with_the_same_declarations() {
    let process = Process::new(context());
    let declare_helper = |b: &mut AstBuilder<'_>| {
        b.begin_function("helper", "int", &[]).unwrap();
        let body = b.ret(Some(b.int(5)));
        b.end_function(body);
        b.begin_class("P", &[]).unwrap();
        b.field("x", "int").unwrap();
        b.end_class().unwrap();
    };
    let failed = eval_on(&process, |b| {
        declare_helper(b);
        vec![b.reference("undefined_name")]
    });
    resolve_error(failed);

    eval_on(&process, |b| {
        declare_helper(b);
        let p = b.new_object("P", vec![]);
        vec![
            b.declare("p", Some("P"), Some(p)),
            print(b, b.call("helper", vec![])),
        ]
    })
    .unwrap();
    assert_eq!(process.take_output(), "5\n");
}

#[test]
fn builder_dropped_unfinished_takes_its_declarations_back() {
    let process = Process::new(context());
    {
        let mut b = process.context().builder();
        b.begin_function("helper", "int", &[]).unwrap();
        let body = b.ret(Some(b.int(1)));
        b.end_function(body);
    }
    assert_eq!(process.context().find("helper"), None);
}

#[test]
fn identical_signature_is_a_duplicate() {
    let process = Process::new(context());
    let mut b = process.context().builder();
    b.begin_function("f", "int", &[("x", "int")]).unwrap();
    let body = b.ret(Some(b.reference("x")));
    b.end_function(body);
    assert!(matches!(
        b.begin_function("f", "float", &[("y", "int")]),
        Err(RegistrationError::Duplicate(_))
    ));
    b.begin_function("f", "int", &[("x", "float")]).unwrap();
}

#[test]
fn user_names_may_reuse_builtin_names() {
    let process = Process::new(context());
    eval_on(&process, |b| {
        b.global("head", "int").unwrap();
        let xs = b.list(vec![b.int(1), b.int(2), b.int(3)]);
        vec![
            b.declare("xs", Some("[int]"), Some(xs)),
            b.assign(b.reference("head"), b.int(9)),
            b.declare("tail", Some("int"), Some(b.int(4))),
            print(b, b.call("head", vec![b.reference("xs")])),
            print(b, b.call("tail", vec![b.reference("xs")])),
            print(b, b.call("+", vec![b.reference("head"), b.reference("tail")])),
        ]
    })
    .unwrap();
    assert_eq!(process.take_output(), "1\n[2, 3]\n13\n");
}

#[test]
fn calling_a_plain_variable_is_rejected() {
    let process = Process::new(context());
    let result = eval_on(&process, |b| {
        vec![
            b.declare("n", Some("int"), Some(b.int(1))),
            b.call("n", vec![]),
        ]
    });
    resolve_error(result);
}

#[test]
fn return_type_mismatch_is_rejected() {
    let process = Process::new(context());
    let result = eval_on(&process, |b| {
        b.begin_function("f", "int", &[]).unwrap();
        let body = b.ret(Some(b.string("text")));
        b.end_function(body);
        vec![]
    });
    let e = resolve_error(result);
    assert!(e.to_string().contains("int"), "{e}");
}

#[test]
fn break_outside_a_loop_is_rejected() {
    let process = Process::new(context());
    let result = eval_on(&process, |b| vec![b.brk()]);
    resolve_error(result);
}

#[test]
fn condition_must_be_bool() {
    let process = Process::new(context());
    let result = eval_on(&process, |b| {
        vec![b.if_else(b.string("yes"), print(b, b.int(1)), None)]
    });
    resolve_error(result);
}

fn declare_pair(b: &mut AstBuilder<'_>) {
    b.begin_class("First", &[]).unwrap();
    b.field("a", "int").unwrap();
    b.end_class().unwrap();
    b.begin_class("Second", &[]).unwrap();
    b.field("b", "int").unwrap();
    b.end_class().unwrap();
    b.begin_class("Both", &["First", "Second"]).unwrap();
    b.end_class().unwrap();
}

#[test]
fn lists_convert_only_without_pointer_adjustment() {
    let process = Process::new(context());
    let ok = eval_on(&process, |b| {
        declare_pair(b);
        let xs = b.list(vec![b.new_object("Both", vec![])]);
        vec![b.declare("firsts", Some("[First]"), Some(xs))]
    });
    assert!(ok.is_ok(), "{ok:?}");

    let process = Process::new(context());
    let err = eval_on(&process, |b| {
        declare_pair(b);
        let xs = b.list(vec![b.new_object("Both", vec![])]);
        vec![b.declare("seconds", Some("[Second]"), Some(xs))]
    });
    resolve_error(err);
}

#[test]
fn later_units_see_earlier_functions() {
    let process = Process::new(context());
    eval_on(&process, |b| {
        b.begin_function("twice", "int", &[("x", "int")]).unwrap();
        let body = b.ret(Some(b.call("*", vec![b.reference("x"), b.int(2)])));
        b.end_function(body);
        vec![]
    })
    .unwrap();
    eval_on(&process, |b| vec![print(b, b.call("twice", vec![b.int(21)]))]).unwrap();
    assert_eq!(process.take_output(), "42\n");
}
