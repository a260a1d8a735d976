//! Conversions between core domain types and their proto encodings.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::proto;
use robopush_core::{Order, OrderStatus, Side, Tick, Trade};

// --- Helpers ---

pub fn to_decimal_proto(d: Decimal) -> proto::Decimal {
    proto::Decimal {
        value: d.to_string(),
    }
}

pub fn from_decimal_proto(d: proto::Decimal) -> Decimal {
    Decimal::from_str(&d.value).unwrap_or(Decimal::ZERO)
}

pub fn to_timestamp_proto(dt: DateTime<Utc>) -> prost_types::Timestamp {
    prost_types::Timestamp {
        seconds: dt.timestamp(),
        nanos: dt.timestamp_subsec_nanos() as i32,
    }
}

pub fn from_timestamp_proto(ts: prost_types::Timestamp) -> DateTime<Utc> {
    let nanos = ts.nanos.clamp(0, 999_999_999);
    DateTime::<Utc>::from_timestamp(ts.seconds, nanos as u32)
        .unwrap_or_else(|| DateTime::<Utc>::from_timestamp(0, 0).unwrap())
}

// --- Enums ---

fn side_to_proto(s: Side) -> proto::Side {
    match s {
        Side::Buy => proto::Side::Buy,
        Side::Sell => proto::Side::Sell,
    }
}

fn order_status_to_proto(status: OrderStatus) -> proto::OrderStatus {
    match status {
        OrderStatus::PendingNew => proto::OrderStatus::PendingNew,
        OrderStatus::Accepted => proto::OrderStatus::Accepted,
        OrderStatus::PartiallyFilled => proto::OrderStatus::PartiallyFilled,
        OrderStatus::Filled => proto::OrderStatus::Filled,
        OrderStatus::Canceled => proto::OrderStatus::Canceled,
        OrderStatus::Rejected => proto::OrderStatus::Rejected,
    }
}

// --- Structs to Proto ---

impl From<Tick> for proto::TickEvent {
    fn from(t: Tick) -> Self {
        Self {
            symbol: t.symbol,
            exchange: t.exchange,
            last_price: Some(to_decimal_proto(t.last_price)),
            volume: Some(to_decimal_proto(t.volume)),
            bid_price: Some(to_decimal_proto(t.bid_price)),
            ask_price: Some(to_decimal_proto(t.ask_price)),
            exchange_timestamp: Some(to_timestamp_proto(t.exchange_timestamp)),
            received_at: Some(to_timestamp_proto(t.received_at)),
        }
    }
}

impl From<Trade> for proto::TradeEvent {
    fn from(t: Trade) -> Self {
        Self {
            trade_id: t.trade_id,
            order_id: t.order_id,
            symbol: t.symbol,
            exchange: t.exchange,
            side: side_to_proto(t.side) as i32,
            price: Some(to_decimal_proto(t.price)),
            quantity: Some(to_decimal_proto(t.quantity)),
            executed_at: Some(to_timestamp_proto(t.executed_at)),
        }
    }
}

impl From<Order> for proto::OrderEvent {
    fn from(o: Order) -> Self {
        Self {
            order_id: o.order_id,
            symbol: o.symbol,
            exchange: o.exchange,
            side: side_to_proto(o.side) as i32,
            price: Some(to_decimal_proto(o.price)),
            quantity: Some(to_decimal_proto(o.quantity)),
            filled_quantity: Some(to_decimal_proto(o.filled_quantity)),
            status: order_status_to_proto(o.status) as i32,
            updated_at: Some(to_timestamp_proto(o.updated_at)),
        }
    }
}
