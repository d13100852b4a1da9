mod common;

use common::{output_of, print};
use proptest::prelude::*;
use proptest::test_runner::Config as ProptestConfig;

fn rendered(xs: &[i32]) -> String {
    let parts: Vec<String> = xs.iter().map(|x| x.to_string()).collect();
    format!("[{}]", parts.join(", "))
}

#[test]
fn cons_shares_the_tail() {
    let out = output_of(|b| {
        let tail = b.declare("tail", None, Some(b.list(vec![b.int(2), b.int(3)])));
        let a = b.declare("a", None, Some(b.call("cons", vec![b.int(1), b.reference("tail")])));
        let c = b.declare("c", None, Some(b.call("cons", vec![b.int(9), b.reference("tail")])));
        vec![
            tail,
            a,
            c,
            print(b, b.reference("a")),
            print(b, b.reference("c")),
            print(b, b.call("head", vec![b.reference("c")])),
            print(b, b.call("tail", vec![b.call("tail", vec![b.reference("a")])])),
            print(b, b.call("is_empty", vec![b.call("tail", vec![b.reference("tail")])])),
            b.declare("rest", None, Some(b.call("tail", vec![b.reference("a")]))),
            b.assign(b.reference("a"), b.list(vec![b.int(7)])),
            print(b, b.reference("rest")),
            print(b, b.reference("a")),
            print(b, b.reference("c")),
        ]
    });
    assert_eq!(
        out,
        "[1, 2, 3]\n[9, 2, 3]\n9\n[3]\nfalse\n[2, 3]\n[7]\n[9, 2, 3]\n"
    );
}

#[test]
fn head_of_empty_list_is_nil_reference() {
    let process = mu_runtime::Process::new(common::context());
    let result = common::eval_on(&process, |b| {
        let empty = b.declare("xs", Some("[int]"), None);
        vec![empty, b.call("head", vec![b.reference("xs")])]
    });
    assert!(matches!(
        result,
        Err(mu_runtime::RunError::Exception(mu_runtime::Exception::NilReference))
    ));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn list_builtins_match_vec(xs in proptest::collection::vec(-1000i32..1000, 1..12)) {
        let out = output_of(|b| {
            let elements = xs.iter().map(|&x| b.int(x)).collect();
            let decl = b.declare("xs", None, Some(b.list(elements)));
            vec![
                decl,
                print(b, b.call("reverse", vec![b.reference("xs")])),
                print(b, b.call("size", vec![b.reference("xs")])),
                print(b, b.call("+", vec![b.reference("xs"), b.reference("xs")])),
                print(b, b.index(b.reference("xs"), b.int(0))),
            ]
        });
        let mut reversed = xs.clone();
        reversed.reverse();
        let doubled: Vec<i32> = xs.iter().chain(xs.iter()).copied().collect();
        let expected = format!(
            "{}\n{}\n{}\n{}\n",
            rendered(&reversed),
            xs.len(),
            rendered(&doubled),
            xs[0]
        );
        prop_assert_eq!(out, expected);
    }
}
