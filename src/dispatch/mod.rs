//! Single-flight external action dispatch.

pub mod dispatcher;
pub mod process;

pub use dispatcher::{ActionDispatcher, ActionEvent, RunDisposition, RunId};
pub use process::{ChildOutput, ProcessControl, ProcessExit, RunningProcess, SystemProcessControl};
