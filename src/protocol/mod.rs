//! Line-protocol engine (C6/C9): framing, per-connection session state,
//! and command dispatch.

pub mod commands;
pub mod framing;
pub mod session;

pub use commands::{dispatch, Dispatched, InstantMessageQueues};
pub use framing::{Framing, ReadWrite};
pub use session::{AuthState, KeepaliveMode, Session, StreamState};
