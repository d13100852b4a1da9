mod common;

use common::{context, eval_on, output_of, print};
use mu_runtime::{Exception, Process, RunError, Value};

#[test]
fn arithmetic_follows_overloads() {
    let out = output_of(|b| {
        let product = b.call("*", vec![b.int(2), b.int(3)]);
        let sum = b.call("+", vec![b.int(1), product]);
        let mixed = b.call("+", vec![b.float(0.5), b.int(1)]);
        vec![print(b, sum), print(b, mixed)]
    });
    assert_eq!(out, "7\n1.5\n");
}

#[test]
fn arguments_evaluate_left_to_right() {
    let out = output_of(|b| {
        b.begin_function("trace", "int", &[("x", "int")]).unwrap();
        let body = b.block(vec![
            print(b, b.reference("x")),
            b.ret(Some(b.reference("x"))),
        ]);
        b.end_function(body);
        let lhs = b.call("trace", vec![b.int(1)]);
        let rhs = b.call("trace", vec![b.int(2)]);
        vec![print(b, b.call("-", vec![lhs, rhs]))]
    });
    assert_eq!(out, "1\n2\n-1\n");
}

#[test]
fn while_loop_with_assignment() {
    let out = output_of(|b| {
        let decl = b.declare("i", Some("int"), Some(b.int(0)));
        let cond = b.call("<", vec![b.reference("i"), b.int(3)]);
        let step = b.assign(
            b.reference("i"),
            b.call("+", vec![b.reference("i"), b.int(1)]),
        );
        let body = b.block(vec![print(b, b.reference("i")), step]);
        vec![decl, b.while_loop(cond, body)]
    });
    assert_eq!(out, "0\n1\n2\n");
}

#[test]
fn break_and_continue_inside_for_each() {
    let out = output_of(|b| {
        let xs = b.list(vec![b.int(1), b.int(2), b.int(3), b.int(4)]);
        b.push_scope();
        let skip = b.if_else(
            b.call("==", vec![b.reference("x"), b.int(2)]),
            b.cont(),
            None,
        );
        let stop = b.if_else(
            b.call("==", vec![b.reference("x"), b.int(4)]),
            b.brk(),
            None,
        );
        let body = b.block(vec![skip, stop, print(b, b.reference("x"))]);
        b.pop_scope();
        vec![b.for_each("x", xs, body)]
    });
    assert_eq!(out, "1\n3\n");
}

#[test]
fn recursive_function() {
    let out = output_of(|b| {
        b.begin_function("fact", "int", &[("n", "int")]).unwrap();
        let recurse = b.call(
            "*",
            vec![
                b.reference("n"),
                b.call("fact", vec![b.call("-", vec![b.reference("n"), b.int(1)])]),
            ],
        );
        let body = b.if_else(
            b.call("<=", vec![b.reference("n"), b.int(1)]),
            b.ret(Some(b.int(1))),
            Some(b.ret(Some(recurse))),
        );
        b.end_function(body);
        vec![print(b, b.call("fact", vec![b.int(10)]))]
    });
    assert_eq!(out, "3628800\n");
}

#[test]
fn closures_capture_by_value() {
    let out = output_of(|b| {
        let x = b.declare("x", None, Some(b.int(1)));
        b.begin_lambda("int", &[("y", "int")]).unwrap();
        let body = b.ret(Some(b.call("+", vec![b.reference("x"), b.reference("y")])));
        let lambda = b.end_lambda(body).unwrap();
        let f = b.declare("f", None, Some(lambda));
        let change = b.assign(b.reference("x"), b.int(100));
        let call = b.call("f", vec![b.int(10)]);
        vec![x, f, change, print(b, call), print(b, b.reference("x"))]
    });
    assert_eq!(out, "11\n100\n");
}

#[test]
fn caught_division_by_zero_binds_message() {
    let out = output_of(|b| {
        let body = print(b, b.call("/", vec![b.int(1), b.int(0)]));
        b.push_scope();
        let handler = print(b, b.reference("e"));
        b.pop_scope();
        vec![
            b.try_catch(body, Some(("e", "string")), handler),
            print(b, b.string("after")),
        ]
    });
    assert_eq!(out, "division by zero\nafter\n");
}

#[test]
fn typed_handler_skips_other_values() {
    let out = output_of(|b| {
        let inner_body = b.throw(b.int(42));
        b.push_scope();
        let inner_handler = print(b, b.reference("s"));
        b.pop_scope();
        let inner = b.try_catch(inner_body, Some(("s", "bool")), inner_handler);
        b.push_scope();
        let outer_handler = print(b, b.reference("n"));
        b.pop_scope();
        vec![b.try_catch(inner, Some(("n", "int")), outer_handler)]
    });
    assert_eq!(out, "42\n");
}

#[test]
fn uncaught_exception_reaches_the_host() {
    let process = Process::new(context());
    let result = eval_on(&process, |b| {
        vec![
            print(b, b.string("before")),
            b.call("/", vec![b.int(1), b.int(0)]),
            print(b, b.string("never")),
        ]
    });
    assert!(matches!(
        result,
        Err(RunError::Exception(Exception::DivisionByZero))
    ));
    assert_eq!(process.take_output(), "before\n");
}

#[test]
fn list_index_out_of_range() {
    let process = Process::new(context());
    let result = eval_on(&process, |b| {
        let xs = b.list(vec![b.int(5), b.int(6)]);
        vec![b.index(xs, b.int(7))]
    });
    assert!(matches!(
        result,
        Err(RunError::Exception(Exception::OutOfRange(7)))
    ));
}

#[test]
fn last_statement_is_the_result() {
    let process = Process::new(context());
    let result = eval_on(&process, |b| {
        let decl = b.declare("s", None, Some(b.string("ab")));
        let joined = b.call("+", vec![b.reference("s"), b.string("cd")]);
        vec![decl, b.call("size", vec![joined])]
    });
    assert_eq!(result.unwrap(), Value::Int(4));
}

#[test]
fn deep_recursion_overflows() {
    let process = Process::new(context());
    let result = eval_on(&process, |b| {
        b.begin_function("down", "int", &[("n", "int")]).unwrap();
        let body = b.ret(Some(b.call(
            "down",
            vec![b.call("+", vec![b.reference("n"), b.int(1)])],
        )));
        b.end_function(body);
        vec![b.call("down", vec![b.int(0)])]
    });
    assert!(matches!(
        result,
        Err(RunError::Exception(Exception::StackOverflow))
    ));
}

fn declare_depth(b: &mut mu_runtime::AstBuilder<'_>) -> mu_runtime::SymbolId {
    let depth = b.begin_function("depth", "int", &[("n", "int")]).unwrap();
    let recurse = b.call(
        "+",
        vec![
            b.int(1),
            b.call("depth", vec![b.call("-", vec![b.reference("n"), b.int(1)])]),
        ],
    );
    let body = b.if_else(
        b.call("<=", vec![b.reference("n"), b.int(0)]),
        b.ret(Some(b.int(0))),
        Some(b.ret(Some(recurse))),
    );
    b.end_function(body);
    depth
}

#[test]
fn recursion_just_below_the_limit_completes() {
    let out = output_of(|b| {
        declare_depth(b);
        vec![print(b, b.call("depth", vec![b.int(2000)]))]
    });
    assert_eq!(out, "2000\n");
}

#[test]
fn stack_overflow_on_a_worker_is_recoverable() {
    let process = Process::new(context());
    let mut depth = None;
    eval_on(&process, |b| {
        depth = Some(declare_depth(b));
        vec![]
    })
    .unwrap();
    let depth = depth.unwrap();
    let job = process.spawn_function(depth, vec![Value::Int(1_000_000)]).unwrap();
    assert!(matches!(
        job.join(),
        Err(RunError::Exception(Exception::StackOverflow))
    ));
    // The worker survives and takes the next job.
    let job = process.spawn_function(depth, vec![Value::Int(10)]).unwrap();
    assert_eq!(job.join().unwrap(), Value::Int(10));
}

fn declare_digits(b: &mut mu_runtime::AstBuilder<'_>) {
    b.begin_function("digits", "int", &[("a", "int"), ("b", "int"), ("c", "int")])
        .unwrap();
    let hundreds = b.call("*", vec![b.reference("a"), b.int(100)]);
    let tens = b.call("*", vec![b.reference("b"), b.int(10)]);
    let sum = b.call("+", vec![hundreds, tens]);
    let body = b.ret(Some(b.call("+", vec![sum, b.reference("c")])));
    b.end_function(body);
}

#[test]
fn partial_application_fixes_arguments_in_place() {
    let out = output_of(|b| {
        declare_digits(b);
        let g = b.partial(b.reference("digits"), vec![Some(b.int(1)), None, Some(b.int(3))]);
        let h = b.partial(b.reference("g"), vec![Some(b.int(5))]);
        vec![
            b.declare("g", None, Some(g)),
            b.declare("h", None, Some(h)),
            print(b, b.call("g", vec![b.int(2)])),
            print(b, b.call("g", vec![b.int(7)])),
            print(b, b.apply(b.reference("h"), vec![])),
        ]
    });
    assert_eq!(out, "123\n173\n153\n");
}

#[test]
fn partial_application_of_a_closure_keeps_its_captures() {
    let out = output_of(|b| {
        let base = b.declare("base", None, Some(b.int(1000)));
        b.begin_lambda("int", &[("x", "int"), ("y", "int")]).unwrap();
        let sum = b.call("+", vec![b.reference("base"), b.reference("x")]);
        let body = b.ret(Some(b.call("-", vec![sum, b.reference("y")])));
        let lambda = b.end_lambda(body).unwrap();
        let f = b.declare("f", None, Some(lambda));
        let minus = b.partial(b.reference("f"), vec![None, Some(b.int(1))]);
        vec![
            base,
            f,
            b.declare("dec", Some("(int;int)"), Some(minus)),
            b.call("gc", vec![]),
            print(b, b.call("dec", vec![b.int(10)])),
        ]
    });
    assert_eq!(out, "1009\n");
}

#[test]
fn partial_application_checks_fixed_argument_types() {
    let process = Process::new(context());
    eval_on(&process, |b| {
        declare_digits(b);
        vec![]
    })
    .unwrap();
    let result = eval_on(&process, |b| {
        let g = b.partial(b.reference("digits"), vec![Some(b.string("x")), None, None]);
        vec![b.declare("g", None, Some(g))]
    });
    assert!(matches!(result, Err(RunError::Resolve(_))), "{result:?}");

    let result = eval_on(&process, |b| {
        let g = b.partial(b.reference("digits"), vec![None, None]);
        vec![b.declare("g", None, Some(g))]
    });
    assert!(matches!(result, Err(RunError::Resolve(_))), "{result:?}");
}
