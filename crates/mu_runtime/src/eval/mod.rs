//! Evaluation functions installed on resolved nodes.

pub mod call;
pub mod control;
pub mod data;
pub mod object;

pub use control::CatchMode;
pub use data::{RepFuncs, rep_funcs};
