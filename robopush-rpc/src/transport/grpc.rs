use std::time::Duration;

use async_trait::async_trait;
use tonic::metadata::MetadataValue;
use tonic::transport::Channel;
use tonic::{Request, Status};
use tracing::debug;

use crate::proto::robot_service_client::RobotServiceClient;
use crate::proto::{Empty, OrderEvent, PingReply, PingRequest, TickEvent, TradeEvent};
use crate::transport::RobotTransport;
use crate::{PushError, PushResult};

/// A gRPC-based robot transport over a plaintext lazily-connected channel.
///
/// The channel is created at registration time from the robot's advertised
/// `host:port`; actual TCP establishment is deferred to the first call, so
/// an unreachable robot surfaces as per-call failures rather than a connect
/// error.
pub struct GrpcTransport {
    robot_id: String,
    client: RobotServiceClient<Channel>,
    timeout: Duration,
}

impl GrpcTransport {
    /// Builds a transport targeting `endpoint` (e.g. `http://127.0.0.1:9000`).
    pub fn new(robot_id: &str, endpoint: &str, timeout: Duration) -> PushResult<Self> {
        let channel = Channel::from_shared(endpoint.to_string())
            .map_err(|_| PushError::InvalidEndpoint(endpoint.to_string()))?
            .connect_lazy();
        debug!(robot_id, endpoint, "created lazy robot channel");
        Ok(Self {
            robot_id: robot_id.to_string(),
            client: RobotServiceClient::new(channel),
            timeout,
        })
    }

    /// Wraps a payload with the per-call deadline and identifying metadata.
    fn request<T>(&self, payload: T) -> Request<T> {
        let mut request = Request::new(payload);
        request.set_timeout(self.timeout);
        if let Ok(value) = MetadataValue::try_from(self.robot_id.as_str()) {
            request.metadata_mut().insert("robot-id", value);
        }
        request
    }
}

#[async_trait]
impl RobotTransport for GrpcTransport {
    async fn on_ping(&self, req: PingRequest) -> Result<PingReply, Status> {
        let response = self.client.clone().on_ping(self.request(req)).await?;
        Ok(response.into_inner())
    }

    async fn on_tick(&self, req: TickEvent) -> Result<(), Status> {
        self.client.clone().on_tick(self.request(req)).await?;
        Ok(())
    }

    async fn on_trade(&self, req: TradeEvent) -> Result<(), Status> {
        self.client.clone().on_trade(self.request(req)).await?;
        Ok(())
    }

    async fn on_order(&self, req: OrderEvent) -> Result<(), Status> {
        self.client.clone().on_order(self.request(req)).await?;
        Ok(())
    }

    async fn on_init(&self) -> Result<(), Status> {
        self.client.clone().on_init(self.request(Empty {})).await?;
        Ok(())
    }

    async fn on_start(&self) -> Result<(), Status> {
        self.client.clone().on_start(self.request(Empty {})).await?;
        Ok(())
    }

    async fn on_stop(&self) -> Result<(), Status> {
        self.client.clone().on_stop(self.request(Empty {})).await?;
        Ok(())
    }
}
