//! gRPC push distribution for remote robot strategy processes.
//!
//! The service keeps one outbound call channel per registered robot and
//! forwards market, trade, and order events plus lifecycle notifications
//! without ever blocking the producer on a slow or unreachable peer.

pub mod connection;
pub mod conversions;
pub mod service;
pub mod transport;

use thiserror::Error;

// Re-export generated protos so robot implementations can use them.
pub mod proto {
    tonic::include_proto!("robopush.rpc.v1");
}

pub use connection::{CallKind, CallOutcome, RobotConnection};
pub use service::{ConnectionSnapshot, PushConfig, PushHandle, PushService};

/// Result alias used across the push core.
pub type PushResult<T> = Result<T, PushError>;

/// Failure variants surfaced by the push core.
///
/// Delivery failures are deliberately absent: every notification call is
/// fire-and-forget and its outcome is only ever observed by the owning
/// connection's completion drain worker.
#[derive(Debug, Error)]
pub enum PushError {
    /// The connect request named a host/port that does not form a valid URI.
    #[error("invalid robot endpoint '{0}'")]
    InvalidEndpoint(String),
    /// The service actor has shut down and can no longer accept commands.
    #[error("push service is no longer running")]
    ServiceStopped,
}
