//! The boundary through which host code calls into the runtime.

use crate::errors::{Exception, RunError};
use crate::process::Process;
use mu_core::{SymbolId, Value};
use smallvec::SmallVec;

/// Arguments of a host call. On success the vector is cleared and holds
/// the result as its only element.
pub type ArgumentVector = SmallVec<[Value; 8]>;

pub trait CallEnvironment {
    /// Calls `function` with the arguments in `args`.
    fn call(&self, function: SymbolId, args: &mut ArgumentVector) -> Result<Value, RunError>;

    /// Calls the method `name` on the receiver in `args[0]`, dispatching on
    /// the receiver's runtime class.
    fn call_method_by_name(&self, name: &str, args: &mut ArgumentVector) -> Result<Value, RunError>;
}

impl CallEnvironment for Process {
    fn call(&self, function: SymbolId, args: &mut ArgumentVector) -> Result<Value, RunError> {
        let mut thread = self.new_application_thread()?;
        let result = thread.run_function(function, args);
        self.release_application_thread(thread);
        let value = result?;
        args.clear();
        args.push(value);
        Ok(value)
    }

    fn call_method_by_name(&self, name: &str, args: &mut ArgumentVector) -> Result<Value, RunError> {
        let mut thread = self.new_application_thread()?;
        let result = match args.split_first() {
            Some((&receiver, rest)) => thread.run_method(receiver, name, rest),
            None => Err(Exception::NilMethodInvocation(name.to_string()).into()),
        };
        self.release_application_thread(thread);
        let value = result?;
        args.clear();
        args.push(value);
        Ok(value)
    }
}
