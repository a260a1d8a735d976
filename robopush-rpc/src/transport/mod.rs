//! Transport seam between connection logic and the wire protocol.

use async_trait::async_trait;
use tonic::Status;

use crate::proto::{OrderEvent, PingReply, PingRequest, TickEvent, TradeEvent};

pub mod grpc;

/// Transport-agnostic interface for delivering notifications to one robot.
///
/// This mirrors the robot service call surface so the connection and
/// health-check logic can be exercised against in-process fakes, and so
/// gRPC could later be swapped for shared memory or another transport.
#[async_trait]
pub trait RobotTransport: Send + Sync {
    /// Health-check round trip.
    async fn on_ping(&self, req: PingRequest) -> Result<PingReply, Status>;

    /// Pushes a market data tick.
    async fn on_tick(&self, req: TickEvent) -> Result<(), Status>;

    /// Pushes an execution report.
    async fn on_trade(&self, req: TradeEvent) -> Result<(), Status>;

    /// Pushes an order state update.
    async fn on_order(&self, req: OrderEvent) -> Result<(), Status>;

    /// Tells the robot its registration is live.
    async fn on_init(&self) -> Result<(), Status>;

    /// Announces that automatic trading has started.
    async fn on_start(&self) -> Result<(), Status>;

    /// Announces that automatic trading has stopped.
    async fn on_stop(&self) -> Result<(), Status>;
}
