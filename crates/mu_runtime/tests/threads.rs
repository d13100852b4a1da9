mod common;

use common::{context, eval_on};
use mu_runtime::{
    Decl, EvalResult, FunctionDecl, Process, ProcessConfig, RunError, SymbolId, Thread,
    ThreadState, Value,
};
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct Spinner {
    work: SymbolId,
    counter: SymbolId,
    stop: SymbolId,
}

/// Declares `work`, which counts in a global until `stop` is set.
fn spinner(process: &Process) -> Spinner {
    let mut symbols = None;
    eval_on(process, |b| {
        let counter = b.global("counter", "int").unwrap();
        let stop = b.global("stop", "bool").unwrap();
        let work = b.begin_function("work", "int", &[]).unwrap();
        let step = b.assign(
            b.reference("counter"),
            b.call("+", vec![b.reference("counter"), b.int(1)]),
        );
        let spin = b.while_loop(b.call("!", vec![b.reference("stop")]), step);
        let body = b.block(vec![spin, b.ret(Some(b.reference("counter")))]);
        b.end_function(body);
        symbols = Some(Spinner {
            work,
            counter,
            stop,
        });
        vec![]
    })
    .unwrap();
    symbols.unwrap()
}

fn counter(process: &Process, s: &Spinner) -> i32 {
    match process.global(s.counter) {
        Some(Value::Int(n)) => n,
        other => panic!("counter is {other:?}"),
    }
}

fn wait_for(mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !done() {
        assert!(Instant::now() < deadline, "timed out");
        std::thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn suspended_threads_make_no_progress() {
    let process = Process::new(context());
    let s = spinner(&process);
    let jobs = [
        process.spawn_function(s.work, vec![]).unwrap(),
        process.spawn_function(s.work, vec![]).unwrap(),
    ];
    wait_for(|| counter(&process, &s) > 0);

    process.suspend_all();
    for job in &jobs {
        assert_eq!(job.state(), ThreadState::Suspended);
    }
    let before = counter(&process, &s);
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(counter(&process, &s), before);

    process.resume_all();
    wait_for(|| counter(&process, &s) > before);

    process.set_global(s.stop, Value::Bool(true)).unwrap();
    for job in jobs {
        let result = job.join().unwrap();
        assert!(matches!(result, Value::Int(n) if n > before));
    }
}

#[test]
fn collection_while_a_worker_runs() {
    let process = Process::new(context());
    let s = spinner(&process);
    let job = process.spawn_function(s.work, vec![]).unwrap();
    wait_for(|| counter(&process, &s) > 0);
    assert!(process.collect_garbage().is_some());
    process.set_global(s.stop, Value::Bool(true)).unwrap();
    assert!(job.join().is_ok());
}

#[test]
fn thread_pool_is_bounded() {
    let config = ProcessConfig {
        max_process_threads: 1,
        ..ProcessConfig::default()
    };
    let process = Process::with_config(context(), config);
    let s = spinner(&process);
    let first = process.spawn_function(s.work, vec![]).unwrap();
    let second = process.spawn_function(s.work, vec![]);
    assert!(matches!(second, Err(RunError::ThreadLimit(1))));

    process.set_global(s.stop, Value::Bool(true)).unwrap();
    first.join().unwrap();
    // The idle worker is reused.
    let again = process.spawn_function(s.work, vec![]).unwrap();
    assert!(again.join().is_ok());
}

static OBSERVED: Mutex<Option<(u32, Vec<(u32, ThreadState)>)>> = Mutex::new(None);

/// Stops every other thread, records the states it sees, then releases them.
fn freeze_others(thread: &mut Thread, _: &[Value]) -> EvalResult {
    thread.suspend_all();
    let states = thread.thread_states();
    thread.resume_all();
    let suspended = states
        .iter()
        .filter(|(_, state)| *state == ThreadState::Suspended)
        .count();
    *OBSERVED.lock().unwrap() = Some((thread.id(), states));
    Ok(Value::Int(suspended as i32))
}

#[test]
fn native_on_a_worker_suspends_the_others() {
    let process = Process::new(context());
    let s = spinner(&process);
    let freeze = process
        .context()
        .add_symbols(
            process.context().root(),
            [Decl::from(FunctionDecl::native(
                "freeze_others",
                freeze_others,
                "int",
                &[],
            ))],
        )
        .unwrap()[0];
    let jobs = [
        process.spawn_function(s.work, vec![]).unwrap(),
        process.spawn_function(s.work, vec![]).unwrap(),
    ];
    wait_for(|| counter(&process, &s) > 0);

    let result = process.spawn_function(freeze, vec![]).unwrap().join();
    assert!(matches!(result, Ok(Value::Int(2))), "{result:?}");
    let (caller, states) = OBSERVED.lock().unwrap().take().unwrap();
    for (id, state) in &states {
        if *id == caller {
            assert_eq!(*state, ThreadState::Running);
        } else {
            assert_ne!(*state, ThreadState::Running, "thread {id}");
        }
    }

    let before = counter(&process, &s);
    wait_for(|| counter(&process, &s) > before);
    process.set_global(s.stop, Value::Bool(true)).unwrap();
    for job in jobs {
        assert!(job.join().is_ok());
    }
}
