//! Attribute Protocol types shared with the stack ([Vol 3] Part F).
//!
//! Only the parts of ATT needed to describe handle and status semantics are
//! modeled here. PDU encoding is the stack's responsibility.

pub use {consts::*, handle::*};

mod consts;
mod handle;
