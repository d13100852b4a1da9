#![allow(dead_code)]

use mu_runtime::{
    Ast, AstBuilder, CollectorKind, Context, Process, ProcessConfig, RunError, Value,
};
use std::sync::Arc;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn context() -> Arc<Context> {
    init_logging();
    Context::new("test")
}

pub fn process_with(context: &Arc<Context>, collector: CollectorKind) -> Process {
    Process::with_config(
        context.clone(),
        ProcessConfig {
            collector,
            ..ProcessConfig::default()
        },
    )
}

/// Builds a unit with `build` and evaluates it on `process`.
pub fn eval_on(
    process: &Process,
    build: impl FnOnce(&mut AstBuilder<'_>) -> Vec<Ast>,
) -> Result<Value, RunError> {
    let mut b = process.context().builder();
    let top = build(&mut b);
    let unit = b.finish(top);
    process.evaluate(unit)
}

/// Evaluates a unit on a fresh process and returns its printed output.
pub fn output_of(build: impl FnOnce(&mut AstBuilder<'_>) -> Vec<Ast>) -> String {
    let process = Process::new(context());
    if let Err(e) = eval_on(&process, build) {
        panic!("evaluation failed: {e}");
    }
    process.take_output()
}

pub fn print(b: &AstBuilder<'_>, value: Ast) -> Ast {
    b.call("print", vec![value])
}
