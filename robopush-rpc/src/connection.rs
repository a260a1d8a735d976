//! One registered robot: its transport, subscription, and drain worker.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tonic::Status;
use tracing::{debug, error, info, warn};

use robopush_core::{ConnectRequest, Order, Subscription, Tick, Trade};

use crate::proto::PingRequest;
use crate::transport::grpc::GrpcTransport;
use crate::transport::RobotTransport;
use crate::PushResult;

/// Which notification a completed call was carrying.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CallKind {
    Ping,
    Tick,
    Trade,
    Order,
    Init,
    Start,
    Stop,
}

impl CallKind {
    /// Label used in log output.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CallKind::Ping => "ping",
            CallKind::Tick => "tick",
            CallKind::Trade => "trade",
            CallKind::Order => "order",
            CallKind::Init => "init",
            CallKind::Start => "start",
            CallKind::Stop => "stop",
        }
    }
}

/// The result of one finished asynchronous call.
///
/// Owned by exactly one drain iteration: the issuing side moves it into the
/// connection's completion channel, the drain worker consumes it, and it is
/// dropped. Transport failures and deadline expiries both arrive here as an
/// error [`Status`]; they never reach the issuing context, which returned
/// long before the call completed.
#[derive(Debug)]
pub struct CallOutcome {
    pub kind: CallKind,
    pub result: Result<(), Status>,
}

/// In-process representation of one remote robot.
///
/// The transport, completion channel, and drain worker are created together
/// and torn down together; no call can be issued once [`RobotConnection::
/// close`] has consumed the connection.
pub struct RobotConnection {
    robot_id: String,
    owner_id: String,
    subscription: Subscription,
    transport: Arc<dyn RobotTransport>,
    ping_failures: Arc<AtomicU32>,
    completions: mpsc::UnboundedSender<CallOutcome>,
    drain: JoinHandle<()>,
}

impl RobotConnection {
    /// Opens a connection to the robot advertised in `request`.
    ///
    /// The underlying channel is lazy: an unreachable robot is observed
    /// through failed calls (and the ping failure counter), not here.
    pub fn connect(
        owner_id: &str,
        request: &ConnectRequest,
        call_timeout: Duration,
    ) -> PushResult<Self> {
        let endpoint = format!("http://{}:{}", request.robot_ip, request.robot_port);
        let transport = GrpcTransport::new(&request.robot_id, &endpoint, call_timeout)?;
        Ok(Self::with_transport(
            owner_id,
            request.robot_id.clone(),
            request.subscription(),
            Arc::new(transport),
        ))
    }

    /// Builds a connection over an arbitrary transport and starts its
    /// completion drain worker.
    pub fn with_transport(
        owner_id: &str,
        robot_id: String,
        subscription: Subscription,
        transport: Arc<dyn RobotTransport>,
    ) -> Self {
        let (completions, rx) = mpsc::unbounded_channel();
        let ping_failures = Arc::new(AtomicU32::new(0));
        let drain = tokio::spawn(drain_completions(
            robot_id.clone(),
            rx,
            ping_failures.clone(),
        ));
        info!(robot_id = %robot_id, owner_id, "robot connection opened");
        Self {
            robot_id,
            owner_id: owner_id.to_string(),
            subscription,
            transport,
            ping_failures,
            completions,
            drain,
        }
    }

    /// Issues a health-check call. Failure accounting happens on the drain
    /// worker: +1 on error, reset to 0 on success.
    pub fn send_ping(&self, message: &str) {
        let transport = self.transport.clone();
        let request = PingRequest {
            message: message.to_string(),
        };
        self.issue(CallKind::Ping, async move {
            transport.on_ping(request).await.map(|_| ())
        });
    }

    /// Forwards a market data tick.
    pub fn send_tick(&self, tick: &Tick) {
        let transport = self.transport.clone();
        let event = tick.clone().into();
        self.issue(CallKind::Tick, async move {
            transport.on_tick(event).await
        });
    }

    /// Forwards an execution report.
    pub fn send_trade(&self, trade: &Trade) {
        let transport = self.transport.clone();
        let event = trade.clone().into();
        self.issue(CallKind::Trade, async move {
            transport.on_trade(event).await
        });
    }

    /// Forwards an order state update.
    pub fn send_order(&self, order: &Order) {
        let transport = self.transport.clone();
        let event = order.clone().into();
        self.issue(CallKind::Order, async move {
            transport.on_order(event).await
        });
    }

    /// Tells the robot its registration is live.
    pub fn send_init(&self) {
        let transport = self.transport.clone();
        self.issue(CallKind::Init, async move { transport.on_init().await });
    }

    /// Announces that automatic trading has started.
    pub fn send_start(&self) {
        let transport = self.transport.clone();
        self.issue(CallKind::Start, async move { transport.on_start().await });
    }

    /// Announces that automatic trading has stopped.
    pub fn send_stop(&self) {
        let transport = self.transport.clone();
        self.issue(CallKind::Stop, async move { transport.on_stop().await });
    }

    /// Spawns the call and routes its outcome into the completion channel.
    /// The caller returns immediately; the outcome is consumed by this
    /// connection's drain worker in channel-delivery order.
    fn issue<F>(&self, kind: CallKind, call: F)
    where
        F: Future<Output = Result<(), Status>> + Send + 'static,
    {
        let completions = self.completions.clone();
        tokio::spawn(async move {
            let result = call.await;
            // The drain worker may already be shutting down; outcomes
            // arriving after that point are discarded by design.
            let _ = completions.send(CallOutcome { kind, result });
        });
    }

    #[must_use]
    pub fn robot_id(&self) -> &str {
        &self.robot_id
    }

    #[must_use]
    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    #[must_use]
    pub fn subscription(&self) -> &Subscription {
        &self.subscription
    }

    /// Whether events for `symbol`/`exchange` should reach this robot.
    #[must_use]
    pub fn is_subscribed(&self, symbol: &str, exchange: &str) -> bool {
        self.subscription.matches(symbol, exchange)
    }

    #[must_use]
    pub fn wants_log(&self) -> bool {
        self.subscription.want_log
    }

    #[must_use]
    pub fn wants_tick(&self) -> bool {
        self.subscription.want_tick
    }

    #[must_use]
    pub fn wants_trade(&self) -> bool {
        self.subscription.want_trade
    }

    /// Consecutive failed pings since the last successful one.
    #[must_use]
    pub fn ping_failures(&self) -> u32 {
        self.ping_failures.load(Ordering::Relaxed)
    }

    /// Tears the connection down: signals completion-channel shutdown,
    /// waits for in-flight outcomes to drain, and joins the worker before
    /// releasing connection state.
    pub async fn close(self) {
        let Self {
            robot_id,
            completions,
            drain,
            ..
        } = self;
        drop(completions);
        if let Err(err) = drain.await {
            warn!(robot_id = %robot_id, error = %err, "completion drain worker aborted");
        }
        debug!(robot_id = %robot_id, "robot connection closed");
    }
}

/// Blocks on the connection's completion channel and handles each finished
/// call in arrival order. Exits once every sender (the connection plus any
/// still-in-flight call tasks) has gone away.
async fn drain_completions(
    robot_id: String,
    mut rx: mpsc::UnboundedReceiver<CallOutcome>,
    ping_failures: Arc<AtomicU32>,
) {
    debug!(robot_id = %robot_id, "completion drain worker started");
    while let Some(outcome) = rx.recv().await {
        match (outcome.kind, outcome.result) {
            (CallKind::Ping, Err(status)) => {
                let failures = ping_failures.fetch_add(1, Ordering::Relaxed) + 1;
                error!(
                    robot_id = %robot_id,
                    failures,
                    code = ?status.code(),
                    message = status.message(),
                    "robot ping failed"
                );
                // Disconnect-on-threshold is intentionally absent; the
                // counter is exposed for operators but nothing acts on it.
            }
            (CallKind::Ping, Ok(())) => {
                ping_failures.store(0, Ordering::Relaxed);
            }
            (kind, Err(status)) => {
                warn!(
                    robot_id = %robot_id,
                    call = kind.as_str(),
                    code = ?status.code(),
                    message = status.message(),
                    "robot notification failed"
                );
            }
            (kind, Ok(())) => {
                debug!(robot_id = %robot_id, call = kind.as_str(), "robot notification delivered");
            }
        }
    }
    debug!(robot_id = %robot_id, "completion drain worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicBool;
    use std::sync::atomic::AtomicUsize;

    use crate::proto::{OrderEvent, PingReply, TickEvent, TradeEvent};

    #[derive(Default)]
    struct ScriptedTransport {
        fail_pings: AtomicBool,
        pings: AtomicUsize,
        ticks: AtomicUsize,
    }

    #[async_trait]
    impl RobotTransport for ScriptedTransport {
        async fn on_ping(&self, _req: PingRequest) -> Result<PingReply, Status> {
            self.pings.fetch_add(1, Ordering::SeqCst);
            if self.fail_pings.load(Ordering::SeqCst) {
                Err(Status::deadline_exceeded("robot did not reply"))
            } else {
                Ok(PingReply {
                    message: "pong".into(),
                })
            }
        }

        async fn on_tick(&self, _req: TickEvent) -> Result<(), Status> {
            self.ticks.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn on_trade(&self, _req: TradeEvent) -> Result<(), Status> {
            Ok(())
        }

        async fn on_order(&self, _req: OrderEvent) -> Result<(), Status> {
            Ok(())
        }

        async fn on_init(&self) -> Result<(), Status> {
            Ok(())
        }

        async fn on_start(&self) -> Result<(), Status> {
            Ok(())
        }

        async fn on_stop(&self) -> Result<(), Status> {
            Ok(())
        }
    }

    fn subscription() -> Subscription {
        Subscription {
            symbol: "*".into(),
            exchange: "NASDAQ".into(),
            want_log: false,
            want_tick: true,
            want_trade: true,
        }
    }

    async fn wait_until(mut probe: impl FnMut() -> bool) {
        for _ in 0..250 {
            if probe() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("condition not reached within 5s");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn ping_failures_increment_and_reset() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.fail_pings.store(true, Ordering::SeqCst);
        let connection = RobotConnection::with_transport(
            "session-1",
            "R1".into(),
            subscription(),
            transport.clone(),
        );

        connection.send_ping("push");
        wait_until(|| connection.ping_failures() == 1).await;

        connection.send_ping("push");
        wait_until(|| connection.ping_failures() == 2).await;

        transport.fail_pings.store(false, Ordering::SeqCst);
        connection.send_ping("push");
        wait_until(|| connection.ping_failures() == 0).await;

        assert_eq!(transport.pings.load(Ordering::SeqCst), 3);
        connection.close().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn close_waits_for_in_flight_completions() {
        let transport = Arc::new(ScriptedTransport::default());
        let connection = RobotConnection::with_transport(
            "session-1",
            "R1".into(),
            subscription(),
            transport.clone(),
        );

        let tick = Tick {
            symbol: "AAPL".into(),
            exchange: "NASDAQ".into(),
            last_price: rust_decimal::Decimal::from(190),
            volume: rust_decimal::Decimal::ONE,
            bid_price: rust_decimal::Decimal::from(189),
            ask_price: rust_decimal::Decimal::from(191),
            exchange_timestamp: chrono::Utc::now(),
            received_at: chrono::Utc::now(),
        };
        connection.send_tick(&tick);
        connection.send_tick(&tick);

        // Teardown must drain the queued completions and join the worker
        // without panicking, even with calls still in flight.
        tokio::time::timeout(Duration::from_secs(5), connection.close())
            .await
            .expect("close should finish once in-flight calls drain");
        assert_eq!(transport.ticks.load(Ordering::SeqCst), 2);
    }
}
