//! Wire format of saga messages.
//!
//! Every frame is `{instance_id}#{token}#{kind}#{payload}`. Only the first
//! three `#` are separators, so the payload may contain `#` while instance
//! ids and tokens may not.

use std::fmt;
use std::str::FromStr;

use common::{ItemPrices, OrderId, UserId};
use serde::{Deserialize, Serialize};

use crate::error::EnvelopeError;

const SEPARATOR: char = '#';

/// Topic the payment worker consumes.
pub const PAYMENT_TOPIC: &str = "PAYMENT";
/// Topic the stock worker consumes.
pub const STOCK_TOPIC: &str = "STOCK";
const ORDER_TOPIC_PREFIX: &str = "ORDER.";

/// Pub/sub destination of a saga message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Outcome topic of one gateway instance.
    Order(String),
    Payment,
    Stock,
}

impl Topic {
    pub fn order(instance_id: impl Into<String>) -> Self {
        Topic::Order(instance_id.into())
    }

    /// Channel name on the transport.
    pub fn name(&self) -> String {
        match self {
            Topic::Order(instance) => format!("{ORDER_TOPIC_PREFIX}{instance}"),
            Topic::Payment => PAYMENT_TOPIC.to_string(),
            Topic::Stock => STOCK_TOPIC.to_string(),
        }
    }

    /// Low-cardinality label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Topic::Order(_) => "order",
            Topic::Payment => "payment",
            Topic::Stock => "stock",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Final classification of a saga, reported back to the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Success,
    BadRequest,
    Internal,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::BadRequest => "bad_request",
            Outcome::Internal => "internal",
        }
    }

    /// Message kind carrying this outcome.
    pub fn kind(&self) -> MessageKind {
        match self {
            Outcome::Success => MessageKind::OrderSuccess,
            Outcome::BadRequest => MessageKind::OrderBadRequest,
            Outcome::Internal => MessageKind::OrderInternal,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind field of a saga message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Pay,
    PayRevert,
    Stock,
    OrderSuccess,
    OrderBadRequest,
    OrderInternal,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Pay => "PAY",
            MessageKind::PayRevert => "PAY_REVERT",
            MessageKind::Stock => "STOCK",
            MessageKind::OrderSuccess => "ORDER_SUCCESS",
            MessageKind::OrderBadRequest => "ORDER_BADREQUEST",
            MessageKind::OrderInternal => "ORDER_INTERNAL",
        }
    }

    /// The outcome an `ORDER_*` kind reports, `None` for step kinds.
    pub fn outcome(&self) -> Option<Outcome> {
        match self {
            MessageKind::OrderSuccess => Some(Outcome::Success),
            MessageKind::OrderBadRequest => Some(Outcome::BadRequest),
            MessageKind::OrderInternal => Some(Outcome::Internal),
            _ => None,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageKind {
    type Err = EnvelopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PAY" => Ok(MessageKind::Pay),
            "PAY_REVERT" => Ok(MessageKind::PayRevert),
            "STOCK" => Ok(MessageKind::Stock),
            "ORDER_SUCCESS" => Ok(MessageKind::OrderSuccess),
            "ORDER_BADREQUEST" => Ok(MessageKind::OrderBadRequest),
            "ORDER_INTERNAL" => Ok(MessageKind::OrderInternal),
            other => Err(EnvelopeError::UnknownKind(other.to_string())),
        }
    }
}

/// Immutable order data carried through a checkout saga.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSnapshot {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub items: ItemPrices,
    pub cost: i64,
}

impl OrderSnapshot {
    pub fn to_json(&self) -> Result<String, EnvelopeError> {
        serde_json::to_string(self).map_err(|e| EnvelopeError::InvalidPayload(e.to_string()))
    }

    pub fn from_json(payload: &str) -> Result<Self, EnvelopeError> {
        serde_json::from_str(payload).map_err(|e| EnvelopeError::InvalidPayload(e.to_string()))
    }
}

/// A decoded saga message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub instance_id: String,
    pub token: String,
    pub kind: MessageKind,
    pub payload: String,
}

impl Envelope {
    /// Builds a step message carrying the order snapshot.
    pub fn step(
        instance_id: impl Into<String>,
        token: impl Into<String>,
        kind: MessageKind,
        snapshot: &OrderSnapshot,
    ) -> Result<Self, EnvelopeError> {
        Ok(Self {
            instance_id: instance_id.into(),
            token: token.into(),
            kind,
            payload: snapshot.to_json()?,
        })
    }

    /// Builds an outcome message. Outcomes carry no payload.
    pub fn outcome(instance_id: impl Into<String>, token: impl Into<String>, outcome: Outcome) -> Self {
        Self {
            instance_id: instance_id.into(),
            token: token.into(),
            kind: outcome.kind(),
            payload: String::new(),
        }
    }

    /// Derives a message for the same saga with a different kind, keeping the
    /// payload.
    pub fn with_kind(&self, kind: MessageKind) -> Self {
        Self {
            kind,
            ..self.clone()
        }
    }

    /// Outcome message answering this one.
    pub fn reply(&self, outcome: Outcome) -> Self {
        Self::outcome(self.instance_id.clone(), self.token.clone(), outcome)
    }

    /// Outcome topic of the gateway that started this saga.
    pub fn reply_topic(&self) -> Topic {
        Topic::order(self.instance_id.clone())
    }

    /// Decodes the payload as an order snapshot.
    pub fn snapshot(&self) -> Result<OrderSnapshot, EnvelopeError> {
        OrderSnapshot::from_json(&self.payload)
    }

    /// Encodes the frame, rejecting ids that would break the field layout.
    pub fn encode(&self) -> Result<String, EnvelopeError> {
        check_field("instance id", &self.instance_id)?;
        check_field("token", &self.token)?;
        Ok(format!(
            "{}{SEPARATOR}{}{SEPARATOR}{}{SEPARATOR}{}",
            self.instance_id, self.token, self.kind, self.payload
        ))
    }

    pub fn parse(frame: &str) -> Result<Self, EnvelopeError> {
        let mut parts = frame.splitn(4, SEPARATOR);
        let (Some(instance_id), Some(token), Some(kind), Some(payload)) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(EnvelopeError::MalformedFrame(frame.to_string()));
        };

        Ok(Self {
            instance_id: instance_id.to_string(),
            token: token.to_string(),
            kind: kind.parse()?,
            payload: payload.to_string(),
        })
    }
}

fn check_field(field: &'static str, value: &str) -> Result<(), EnvelopeError> {
    if value.contains(SEPARATOR) {
        return Err(EnvelopeError::ReservedSeparator {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}
