use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A new market observation for one symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub symbol: String,
    pub price: Decimal,
    pub timestamp: i64,
}

/// Trade recommendation produced by an Analyzer shard.
///
/// `strength` is signed: the sign is the direction, the magnitude the
/// conviction, and 0 means "no action".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: String,
    pub price: Decimal,
    pub strength: f64,
    pub timestamp: i64,
}

/// Executed-trade record produced by the Broker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub symbol: String,
    pub price: Decimal,
    pub quantity: Decimal,
    pub strength: f64,
    pub commission: Decimal,
    pub tax: Decimal,
    pub slippage: Decimal,
    pub cash: Decimal,
    pub timestamp: i64,
}

impl Order {
    pub fn side(&self) -> Option<OrderSide> {
        if self.quantity > Decimal::ZERO {
            Some(OrderSide::Buy)
        } else if self.quantity < Decimal::ZERO {
            Some(OrderSide::Sell)
        } else {
            None
        }
    }
}

/// Authoritative post-trade position for a symbol, fed back to its shard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantityUpdate {
    pub symbol: String,
    pub quantity: Decimal,
}

/// Cash snapshot, sent once by the Broker at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashSnapshot {
    pub cash: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// Every event exchanged between workers.
///
/// A message is built once and moved into the channel; the receiver owns it.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Tick(Tick),
    Signal(Signal),
    Order(Order),
    Quantity(QuantityUpdate),
    Reset,
    Quit,
    Cash(CashSnapshot),
}

impl Message {
    pub fn tick(symbol: impl Into<String>, price: Decimal, timestamp: i64) -> Self {
        Self::Tick(Tick {
            symbol: symbol.into(),
            price,
            timestamp,
        })
    }

    pub fn quantity(symbol: impl Into<String>, quantity: Decimal) -> Self {
        Self::Quantity(QuantityUpdate {
            symbol: symbol.into(),
            quantity,
        })
    }

    /// Returns the message kind for logging and diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Tick(_) => "TICK",
            Self::Signal(_) => "SIGNAL",
            Self::Order(_) => "ORDER",
            Self::Quantity(_) => "QUANTITY",
            Self::Reset => "RESET",
            Self::Quit => "QUIT",
            Self::Cash(_) => "CASH",
        }
    }

    /// Symbol carried by symbol-keyed messages
    pub fn symbol(&self) -> Option<&str> {
        match self {
            Self::Tick(t) => Some(&t.symbol),
            Self::Signal(s) => Some(&s.symbol),
            Self::Order(o) => Some(&o.symbol),
            Self::Quantity(q) => Some(&q.symbol),
            Self::Reset | Self::Quit | Self::Cash(_) => None,
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tick(t) => write!(f, "TICK({} @ {}, t={})", t.symbol, t.price, t.timestamp),
            Self::Signal(s) => write!(
                f,
                "SIGNAL({} @ {}, strength={:.4}, t={})",
                s.symbol, s.price, s.strength, s.timestamp
            ),
            Self::Order(o) => write!(
                f,
                "ORDER({} {} @ {}, cash={}, t={})",
                o.symbol, o.quantity, o.price, o.cash, o.timestamp
            ),
            Self::Quantity(q) => write!(f, "QUANTITY({} = {})", q.symbol, q.quantity),
            Self::Reset => write!(f, "RESET"),
            Self::Quit => write!(f, "QUIT"),
            Self::Cash(c) => write!(f, "CASH({})", c.cash),
        }
    }
}
