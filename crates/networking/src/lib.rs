//! Peer-to-peer transport abstraction for the mining protocol: a transport-
//! agnostic [`P2P`] trait plus an in-process [`LocalP2P`] implementation for
//! single-binary simulations and tests.

pub mod local;
pub mod message;
pub mod traits;

pub use local::LocalP2P;
pub use message::Message;
pub use traits::{NetworkError, P2P};
