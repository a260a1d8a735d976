//! Registry actor owning every robot connection.
//!
//! All registry mutation and event fan-out happen on one spawned task; the
//! rest of the platform talks to it through a cloneable [`PushHandle`].
//! Single ownership of the connection map replaces the original runtime
//! owner-thread assertion: there is no other path to the registry, so no
//! locks are needed.

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use robopush_core::{ConnectRequest, Order, Subscription, Tick, Trade};

use crate::connection::RobotConnection;
use crate::{PushError, PushResult};

/// Tuning knobs for the push service.
#[derive(Clone, Debug, Deserialize)]
pub struct PushConfig {
    /// Period of the health-check timer.
    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,
    /// Deadline attached to every outbound call at issue time.
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
    /// Capacity of the command channel feeding the registry actor.
    #[serde(default = "default_command_capacity")]
    pub command_capacity: usize,
    /// Payload carried by every health-check ping.
    #[serde(default = "default_ping_message")]
    pub ping_message: String,
}

fn default_ping_interval_ms() -> u64 {
    5_000
}

fn default_call_timeout_ms() -> u64 {
    500
}

fn default_command_capacity() -> usize {
    1_024
}

fn default_ping_message() -> String {
    "push".to_string()
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            ping_interval_ms: default_ping_interval_ms(),
            call_timeout_ms: default_call_timeout_ms(),
            command_capacity: default_command_capacity(),
            ping_message: default_ping_message(),
        }
    }
}

impl PushConfig {
    fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms.max(1))
    }

    fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms.max(1))
    }
}

/// Read-only view of one registered connection.
#[derive(Clone, Debug)]
pub struct ConnectionSnapshot {
    pub robot_id: String,
    pub owner_id: String,
    pub subscription: Subscription,
    pub ping_failures: u32,
}

enum Command {
    Connect {
        owner_id: String,
        request: ConnectRequest,
    },
    Disconnect {
        robot_id: String,
    },
    SessionClosed,
    Tick(Tick),
    Trade(Trade),
    Order(Order),
    AutoTradingStart,
    AutoTradingStop,
    Shutdown,
    Inspect {
        robot_id: String,
        reply: oneshot::Sender<Option<ConnectionSnapshot>>,
    },
    Count {
        reply: oneshot::Sender<usize>,
    },
}

/// Owner of the registry actor task.
pub struct PushService {
    handle: PushHandle,
    task: Option<JoinHandle<()>>,
}

impl PushService {
    /// Starts the registry actor and its periodic health-check timer.
    pub fn spawn(config: PushConfig) -> Self {
        let (sender, rx) = mpsc::channel(config.command_capacity.max(1));
        let worker = PushWorker {
            config,
            rx,
            connections: HashMap::new(),
        };
        let task = tokio::spawn(worker.run());
        Self {
            handle: PushHandle { sender },
            task: Some(task),
        }
    }

    /// Returns a handle that can be cloned and used across tasks.
    #[must_use]
    pub fn handle(&self) -> PushHandle {
        self.handle.clone()
    }

    /// Stops the timer and tears down every connection, joining each
    /// connection's drain worker before the registry is dropped.
    ///
    /// Outstanding [`PushHandle`] clones observe [`PushError::ServiceStopped`]
    /// on their next use.
    pub async fn shutdown(self) {
        let Self { handle, task } = self;
        let _ = handle.send(Command::Shutdown).await;
        drop(handle);
        if let Some(task) = task {
            if let Err(err) = task.await {
                warn!(error = %err, "push service task aborted");
            }
        }
    }
}

/// Cloneable entry point into the registry actor.
///
/// Registry mutations are awaited sends; event notifications use `try_send`
/// so a producer is never blocked by a saturated service (matching the
/// fire-and-forget contract of the outbound side).
#[derive(Clone)]
pub struct PushHandle {
    sender: mpsc::Sender<Command>,
}

impl PushHandle {
    /// Registers (or replaces) the robot described by `request`.
    pub async fn connect_robot(
        &self,
        owner_id: impl Into<String>,
        request: ConnectRequest,
    ) -> PushResult<()> {
        self.send(Command::Connect {
            owner_id: owner_id.into(),
            request,
        })
        .await
    }

    /// Removes and tears down the named connection; absent ids are a no-op.
    pub async fn disconnect_robot(&self, robot_id: impl Into<String>) -> PushResult<()> {
        self.send(Command::Disconnect {
            robot_id: robot_id.into(),
        })
        .await
    }

    /// Bulk disconnect used when the owning trading session ends.
    pub async fn on_session_closed(&self) -> PushResult<()> {
        self.send(Command::SessionClosed).await
    }

    /// Broadcasts the start of automatic trading to every robot.
    pub async fn on_auto_trading_start(&self) -> PushResult<()> {
        self.send(Command::AutoTradingStart).await
    }

    /// Broadcasts the end of automatic trading to every robot.
    pub async fn on_auto_trading_stop(&self) -> PushResult<()> {
        self.send(Command::AutoTradingStop).await
    }

    /// Fans a tick out to every subscribed robot. Never blocks.
    pub fn on_tick(&self, tick: Tick) {
        self.enqueue(Command::Tick(tick), "tick");
    }

    /// Fans an execution report out to every subscribed robot. Never blocks.
    pub fn on_trade(&self, trade: Trade) {
        self.enqueue(Command::Trade(trade), "trade");
    }

    /// Fans an order update out to every subscribed robot. Never blocks.
    pub fn on_order(&self, order: Order) {
        self.enqueue(Command::Order(order), "order");
    }

    /// Point-in-time view of one connection, if registered.
    pub async fn snapshot(&self, robot_id: impl Into<String>) -> PushResult<Option<ConnectionSnapshot>> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Inspect {
            robot_id: robot_id.into(),
            reply,
        })
        .await?;
        response.await.map_err(|_| PushError::ServiceStopped)
    }

    /// Number of currently registered connections.
    pub async fn connection_count(&self) -> PushResult<usize> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Count { reply }).await?;
        response.await.map_err(|_| PushError::ServiceStopped)
    }

    async fn send(&self, command: Command) -> PushResult<()> {
        self.sender
            .send(command)
            .await
            .map_err(|_| PushError::ServiceStopped)
    }

    fn enqueue(&self, command: Command, label: &'static str) {
        match self.sender.try_send(command) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!("push command channel saturated; dropping {label} event");
            }
            Err(TrySendError::Closed(_)) => {
                warn!("push service stopped; ignoring {label} event");
            }
        }
    }
}

struct PushWorker {
    config: PushConfig,
    rx: mpsc::Receiver<Command>,
    connections: HashMap<String, RobotConnection>,
}

impl PushWorker {
    async fn run(mut self) {
        let mut health = interval(self.config.ping_interval());
        health.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            ping_interval_ms = self.config.ping_interval_ms,
            call_timeout_ms = self.config.call_timeout_ms,
            "push service started"
        );

        loop {
            tokio::select! {
                command = self.rx.recv() => {
                    match command {
                        Some(Command::Shutdown) | None => break,
                        Some(command) => self.handle_command(command).await,
                    }
                }
                _ = health.tick() => self.ping_all(),
            }
        }

        self.close_all().await;
        info!("push service stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect { owner_id, request } => self.connect(owner_id, request).await,
            Command::Disconnect { robot_id } => self.disconnect(&robot_id).await,
            Command::SessionClosed => self.close_all().await,
            Command::Tick(tick) => self.fan_out_tick(&tick),
            Command::Trade(trade) => self.fan_out_trade(&trade),
            Command::Order(order) => self.fan_out_order(&order),
            Command::AutoTradingStart => self.broadcast_start(),
            Command::AutoTradingStop => self.broadcast_stop(),
            Command::Inspect { robot_id, reply } => {
                let _ = reply.send(self.snapshot(&robot_id));
            }
            Command::Count { reply } => {
                let _ = reply.send(self.connections.len());
            }
            // Intercepted by the run loop before dispatch.
            Command::Shutdown => {}
        }
    }

    /// Replacement is never additive: any prior connection for the same
    /// robot id is fully torn down (worker joined) before the new one is
    /// created and inserted.
    async fn connect(&mut self, owner_id: String, request: ConnectRequest) {
        let robot_id = request.robot_id.clone();
        if let Some(previous) = self.connections.remove(&robot_id) {
            info!(robot_id = %robot_id, "replacing existing robot connection");
            previous.close().await;
        }

        match RobotConnection::connect(&owner_id, &request, self.config.call_timeout()) {
            Ok(connection) => {
                connection.send_init();
                self.connections.insert(robot_id, connection);
            }
            Err(err) => {
                warn!(robot_id = %robot_id, error = %err, "rejecting robot connect request");
            }
        }
    }

    async fn disconnect(&mut self, robot_id: &str) {
        match self.connections.remove(robot_id) {
            Some(connection) => {
                info!(robot_id, "disconnecting robot");
                connection.close().await;
            }
            None => {
                debug!(robot_id, "disconnect for unknown robot ignored");
            }
        }
    }

    async fn close_all(&mut self) {
        if self.connections.is_empty() {
            return;
        }
        info!(count = self.connections.len(), "closing all robot connections");
        for (_, connection) in self.connections.drain() {
            connection.close().await;
        }
    }

    /// One shared ping payload per timer tick, sent to every connection.
    fn ping_all(&self) {
        for connection in self.connections.values() {
            connection.send_ping(&self.config.ping_message);
        }
    }

    fn fan_out_tick(&self, tick: &Tick) {
        for connection in self.connections.values() {
            if connection.wants_tick() && connection.is_subscribed(&tick.symbol, &tick.exchange) {
                connection.send_tick(tick);
            }
        }
    }

    fn fan_out_trade(&self, trade: &Trade) {
        for connection in self.connections.values() {
            if connection.wants_trade() && connection.is_subscribed(&trade.symbol, &trade.exchange)
            {
                connection.send_trade(trade);
            }
        }
    }

    /// Order flow rides the trade handler flag; the connect request carries
    /// no separate order flag.
    fn fan_out_order(&self, order: &Order) {
        for connection in self.connections.values() {
            if connection.wants_trade() && connection.is_subscribed(&order.symbol, &order.exchange)
            {
                connection.send_order(order);
            }
        }
    }

    fn broadcast_start(&self) {
        info!(count = self.connections.len(), "broadcasting auto trading start");
        for connection in self.connections.values() {
            connection.send_start();
        }
    }

    fn broadcast_stop(&self) {
        info!(count = self.connections.len(), "broadcasting auto trading stop");
        for connection in self.connections.values() {
            connection.send_stop();
        }
    }

    fn snapshot(&self, robot_id: &str) -> Option<ConnectionSnapshot> {
        self.connections.get(robot_id).map(|connection| ConnectionSnapshot {
            robot_id: connection.robot_id().to_string(),
            owner_id: connection.owner_id().to_string(),
            subscription: connection.subscription().clone(),
            ping_failures: connection.ping_failures(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_match_contract() {
        let config = PushConfig::default();
        assert_eq!(config.ping_interval_ms, 5_000);
        assert_eq!(config.call_timeout_ms, 500);
        assert_eq!(config.ping_interval(), Duration::from_secs(5));
        assert_eq!(config.call_timeout(), Duration::from_millis(500));
    }

    #[test]
    fn config_fills_missing_fields_from_defaults() {
        let config: PushConfig = serde_json::from_str(r#"{"ping_interval_ms": 100}"#).unwrap();
        assert_eq!(config.ping_interval_ms, 100);
        assert_eq!(config.call_timeout_ms, 500);
        assert_eq!(config.ping_message, "push");
    }
}
