//! # hadron node client
//!
//! Client side of the websocket JSON-RPC session a light client keeps open to
//! a remote ledger node.
//!
//! One [`NodeConnection`] owns one socket and multiplexes over it:
//! - **Atom subscriptions**, keyed by a connection-local subscriber id and
//!   indexed by destination address: the node pushes `Atoms.subscribeUpdate`
//!   notifications which are fanned out as [`AtomUpdate`] streams.
//! - **Atom submissions**, each with its own last-value-cached state stream
//!   driven by `AtomSubmissionState.onNext` notifications.
//!
//! Active work (subscriptions plus in-flight submissions) is reference
//! counted; when the count stays at zero for the configured grace period the
//! connection closes itself. Transport failure is terminal: every pending
//! stream errors with "Socket closed" and no reconnection is attempted here.
//!
//! [`AtomUpdate`]: hadron_common::types::AtomUpdate

pub mod config;
pub mod connection;
pub mod errors;
pub mod rpc_types;
pub mod submission;

pub use config::NodeClientConfig;
pub use connection::{AtomUpdateStream, ConnectionEvent, NodeConnection, SubmissionStream};
pub use errors::{NodeClientError, RpcRequestError, StreamError};
pub use submission::SubmissionState;
