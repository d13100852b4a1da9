mod common;

use common::{context, eval_on, print, process_with};
use mu_runtime::docs::{DocSink, DocumentationLoader};
use mu_runtime::{
    ArchiveError, CollectorKind, Decl, FunctionDecl, Process, SymbolId, SymbolTable, Thread,
    Value, EvalResult,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

const COLLECTORS: [CollectorKind; 2] = [CollectorKind::Tracing, CollectorKind::RefCount];

#[test]
fn acyclic_garbage_is_freed_by_both_collectors() {
    for kind in COLLECTORS {
        let process = process_with(&context(), kind);
        eval_on(&process, |b| {
            vec![
                b.declare("xs", None, Some(b.list(vec![b.int(1), b.int(2), b.int(3)]))),
                b.declare("s", None, Some(b.string("text"))),
            ]
        })
        .unwrap();
        assert!(process.live_objects() >= 4, "{kind:?}");
        assert!(process.collect_garbage().is_some());
        assert_eq!(process.live_objects(), 0, "{kind:?}");
    }
}

#[test]
fn gc_builtin_frees_dropped_lists() {
    for kind in COLLECTORS {
        let process = process_with(&context(), kind);
        eval_on(&process, |b| {
            let decl = b.declare("xs", None, Some(b.list(vec![b.int(1), b.int(2), b.int(3)])));
            let keep = b.declare("ys", None, Some(b.list(vec![b.int(4)])));
            let drop = b.assign(b.reference("xs"), b.nil());
            let freed = b.call(">=", vec![b.call("gc", vec![]), b.int(3)]);
            vec![decl, keep, drop, print(b, freed), print(b, b.reference("ys"))]
        })
        .unwrap();
        assert_eq!(process.take_output(), "true\n[4]\n", "{kind:?}");
    }
}

fn build_cycle(process: &Process) -> (SymbolId, SymbolId) {
    let mut globals = None;
    eval_on(process, |b| {
        b.begin_class("Link", &[]).unwrap();
        b.field("next", "Link").unwrap();
        b.field("id", "int").unwrap();
        b.end_class().unwrap();
        let head = b.global("head", "Link").unwrap();
        let copy = b.global("copy", "Link").unwrap();
        globals = Some((head, copy));
        let link = |name: &str, id: i32| {
            vec![
                b.declare(name, None, Some(b.new_object("Link", vec![]))),
                b.assign(b.member(b.reference(name), "id"), b.int(id)),
            ]
        };
        let mut top = link("a", 1);
        top.extend(link("c", 2));
        top.push(b.assign(b.member(b.reference("a"), "next"), b.reference("c")));
        top.push(b.assign(b.member(b.reference("c"), "next"), b.reference("a")));
        top.push(b.assign(b.reference("head"), b.reference("a")));
        top
    })
    .unwrap();
    globals.unwrap()
}

#[test]
fn only_tracing_reclaims_cycles() {
    for kind in COLLECTORS {
        let process = process_with(&context(), kind);
        let (head, _) = build_cycle(&process);
        process.collect_garbage();
        assert_eq!(process.live_objects(), 2, "{kind:?}");

        process.set_global(head, Value::Nil).unwrap();
        process.collect_garbage();
        let expected = match kind {
            CollectorKind::Tracing => 0,
            CollectorKind::RefCount => 2,
        };
        assert_eq!(process.live_objects(), expected, "{kind:?}");
    }
}

#[test]
fn archive_preserves_cycles() {
    let ctx = context();
    let process = Process::new(ctx.clone());
    let (head, copy) = build_cycle(&process);
    let link = ctx.find("Link").unwrap();

    let value = process.global(head).unwrap();
    let bytes = process.serialize(value, link).unwrap();
    let restored = process.deserialize(&bytes, link).unwrap();
    assert_ne!(restored, value);
    assert_eq!(process.serialize(restored, link).unwrap(), bytes);

    process.set_global(copy, restored).unwrap();
    process.unpin(restored);
    eval_on(&process, |b| {
        let next = b.member(b.reference("copy"), "next");
        let around = b.member(b.member(b.member(b.reference("copy"), "next"), "next"), "id");
        vec![print(b, b.member(next, "id")), print(b, around)]
    })
    .unwrap();
    assert_eq!(process.take_output(), "2\n1\n");
}

#[test]
fn archive_writes_shared_strings_once() {
    let ctx = context();
    let process = Process::new(ctx.clone());
    let mut words = None;
    eval_on(&process, |b| {
        words = Some(b.global("words", "[string]").unwrap());
        let w = b.declare("w", None, Some(b.string("hello")));
        let list = b.list(vec![b.reference("w"), b.reference("w"), b.string("bye")]);
        vec![w, b.assign(b.reference("words"), list)]
    })
    .unwrap();
    let ty = ctx.lookup_type("[string]").unwrap();
    let bytes = process.serialize(process.global(words.unwrap()).unwrap(), ty).unwrap();
    let hits = bytes.windows(5).filter(|w| *w == b"hello").count();
    assert_eq!(hits, 1);

    let restored = process.deserialize(&bytes, ty).unwrap();
    assert_eq!(process.serialize(restored, ty).unwrap(), bytes);

    let truncated = process.deserialize(&bytes[..bytes.len() - 1], ty);
    assert_eq!(truncated, Err(ArchiveError::UnexpectedEof));
}

#[test]
fn duplicate_copies_globals() {
    let process = Process::new(context());
    let mut counter = None;
    eval_on(&process, |b| {
        counter = Some(b.global("counter", "int").unwrap());
        vec![b.assign(b.reference("counter"), b.int(1))]
    })
    .unwrap();
    let counter = counter.unwrap();
    let copy = process.duplicate();
    copy.set_global(counter, Value::Int(5)).unwrap();
    assert_eq!(process.global(counter), Some(Value::Int(1)));
    assert_eq!(copy.global(counter), Some(Value::Int(5)));
}

fn area(_: &mut Thread, args: &[Value]) -> EvalResult {
    match args.first() {
        Some(Value::Float(r)) => Ok(Value::Float(3.0 * r * r)),
        _ => Ok(Value::Float(0.0)),
    }
}

struct CountingLoader {
    calls: Arc<AtomicUsize>,
}

impl DocumentationLoader for CountingLoader {
    fn load(&self, table: &SymbolTable, module: SymbolId, docs: &mut DocSink<'_>) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(area) = table.find_qualified("geometry.area") {
            if table.module_of(area) == module {
                docs.add(area, "Area of a circle.");
            }
        }
    }
}

#[test]
fn documentation_loads_once_per_module() {
    let ctx = context();
    let root = ctx.root();
    let geometry = ctx.add_module(root, "geometry").unwrap();
    let ids = ctx
        .add_symbols(geometry, [Decl::from(FunctionDecl::native("area", area, "float", &["float"]))])
        .unwrap();
    let process = Process::new(ctx.clone());
    let calls = Arc::new(AtomicUsize::new(0));
    process.set_documentation_loader(Box::new(CountingLoader {
        calls: calls.clone(),
    }));

    for _ in 0..3 {
        assert_eq!(process.document_symbol(ids[0]).as_deref(), Some("Area of a circle."));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let print = ctx.find("print").unwrap();
    assert_eq!(process.document_symbol(print), None);
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    process.add_documentation(print, "Writes a value.");
    assert_eq!(process.document_symbol(print).as_deref(), Some("Writes a value."));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
