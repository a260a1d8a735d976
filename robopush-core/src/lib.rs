//! Fundamental data types shared across the push distribution workspace.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Alias for price precision.
pub type Price = Decimal;
/// Alias for quantity precision.
pub type Quantity = Decimal;
/// Alias used for human-readable market symbols (e.g., `AAPL`).
pub type Symbol = String;
/// Stable external identifier of a robot strategy process.
pub type RobotId = String;
/// Identifier of the logical trading session that owns a connection.
pub type OwnerId = String;

/// Symbol value that subscribes a robot to every instrument.
pub const WILDCARD_SYMBOL: &str = "*";

/// The side of an order or trade.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Buy,
    Sell,
}

/// Lifecycle states an order moves through at the venue.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    PendingNew,
    Accepted,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
}

/// A single top-of-book market data update.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Tick {
    pub symbol: Symbol,
    pub exchange: String,
    pub last_price: Price,
    pub volume: Quantity,
    pub bid_price: Price,
    pub ask_price: Price,
    pub exchange_timestamp: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
}

/// An execution report for a filled (or partially filled) order.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Trade {
    pub trade_id: String,
    pub order_id: String,
    pub symbol: Symbol,
    pub exchange: String,
    pub side: Side,
    pub price: Price,
    pub quantity: Quantity,
    pub executed_at: DateTime<Utc>,
}

/// The current state of a working order.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Order {
    pub order_id: String,
    pub symbol: Symbol,
    pub exchange: String,
    pub side: Side,
    pub price: Price,
    pub quantity: Quantity,
    pub filled_quantity: Quantity,
    pub status: OrderStatus,
    pub updated_at: DateTime<Utc>,
}

/// Per-robot filter controlling which events are forwarded.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Subscription {
    /// `"*"` subscribes to every symbol; anything else is an exact match.
    pub symbol: Symbol,
    /// Carried for diagnostics but not compared by [`Subscription::matches`].
    pub exchange: String,
    pub want_log: bool,
    pub want_tick: bool,
    pub want_trade: bool,
}

impl Subscription {
    /// Whether an event for `symbol`/`exchange` should reach this robot.
    ///
    /// Matching is wildcard-or-exact on the symbol only. The exchange field
    /// is carried on the subscription but deliberately not compared here;
    /// the upstream connect protocol never defined exchange scoping.
    #[must_use]
    pub fn matches(&self, symbol: &str, _exchange: &str) -> bool {
        self.symbol == WILDCARD_SYMBOL || self.symbol == symbol
    }
}

/// Inbound request to register a robot for event push.
///
/// This is the sole configuration surface for a connection; there is no
/// dynamic reconfiguration once the robot is registered.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ConnectRequest {
    pub robot_id: RobotId,
    pub robot_ip: String,
    pub robot_port: u16,
    pub symbol: Symbol,
    pub exchange: String,
    #[serde(default)]
    pub want_log: bool,
    #[serde(default)]
    pub want_tick: bool,
    #[serde(default)]
    pub want_trade: bool,
}

impl ConnectRequest {
    /// The event filter this request asks for.
    #[must_use]
    pub fn subscription(&self) -> Subscription {
        Subscription {
            symbol: self.symbol.clone(),
            exchange: self.exchange.clone(),
            want_log: self.want_log,
            want_tick: self.want_tick,
            want_trade: self.want_trade,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subscription(symbol: &str) -> Subscription {
        Subscription {
            symbol: symbol.to_string(),
            exchange: "NASDAQ".to_string(),
            want_log: false,
            want_tick: true,
            want_trade: true,
        }
    }

    #[test]
    fn wildcard_matches_any_symbol() {
        let sub = subscription(WILDCARD_SYMBOL);
        assert!(sub.matches("AAPL", "NASDAQ"));
        assert!(sub.matches("MSFT", "NASDAQ"));
        assert!(sub.matches("TSLA", "NYSE"));
    }

    #[test]
    fn exact_symbol_matches_only_itself() {
        let sub = subscription("AAPL");
        assert!(sub.matches("AAPL", "NASDAQ"));
        assert!(!sub.matches("MSFT", "NASDAQ"));
    }

    #[test]
    fn exchange_is_not_compared() {
        // Documented limitation: a subscription scoped to NASDAQ still
        // matches the same symbol reported by a different exchange.
        let sub = subscription("AAPL");
        assert!(sub.matches("AAPL", "NYSE"));
        assert!(sub.matches("AAPL", ""));
    }

    #[test]
    fn connect_request_builds_subscription() {
        let request: ConnectRequest = serde_json::from_str(
            r#"{
                "robot_id": "R1",
                "robot_ip": "127.0.0.1",
                "robot_port": 9000,
                "symbol": "*",
                "exchange": "NASDAQ",
                "want_tick": true
            }"#,
        )
        .unwrap();
        let sub = request.subscription();
        assert_eq!(sub.symbol, "*");
        assert!(sub.want_tick);
        assert!(!sub.want_trade);
        assert!(!sub.want_log);
    }
}
