//! Invocation correlation
//!
//! Matches asynchronous executor responses, streamed and final, back to the
//! dispatch that triggered them.

mod invoker;
mod registry;

pub use invoker::{DispatchInvoker, InvocationHandle};
pub use registry::{InvocationKey, InvocationRegistry, InvocationState, SettledInvocation};
