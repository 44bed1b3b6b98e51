pub mod context;
pub mod dag;
pub mod node;

pub use context::{CtxHandle, RunContext};
pub use dag::Dag;
pub use node::{DagNode, NodeFn, RetryPolicy};
