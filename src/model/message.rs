/// Discriminates the envelope shapes the Dispatcher correlates on.
/// Wire bytes are out of scope; this is the in-process shape the core
/// pattern-matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde_repr::Serialize_repr, serde_repr::Deserialize_repr)]
#[repr(u8)]
pub enum MessageType {
  Request = 0,
  OneWayRequest = 1,
  Reply = 2,
  SubscriptionRequest = 3,
  MulticastSubscriptionRequest = 4,
  SubscriptionReply = 5,
  SubscriptionStop = 6,
  Publication = 7,
  MulticastPublication = 8,
}

/// A correlated envelope. Argument/return value
/// encoding lives in `payload`, which this core never decodes — it only
/// reads the correlation ids it needs from it.
#[derive(Debug, Clone)]
pub struct Message {
  pub message_type: MessageType,
  pub sender_id: String,
  pub recipient_id: String,
  pub request_reply_id: Option<String>,
  pub expiry_date_ms: i64,
  pub creator_user_id: Option<String>,
  pub payload: MessagePayload,
}

/// Opaque-to-the-core payload. The Dispatcher matches on the variant to
/// pull out whichever correlation id it needs; the carried bytes are
/// handed untouched to the generated proxy/provider layer (out of scope).
#[derive(Debug, Clone)]
pub enum MessagePayload {
  Request { method_name: String, params: Vec<u8> },
  Reply { response: Result<Vec<u8>, crate::error::MiddlewareError> },
  SubscriptionRequest { subscription_id: String, attribute_name: String, qos: super::qos::SubscriptionQos },
  MulticastSubscriptionRequest { subscription_id: String, multicast_id: String },
  SubscriptionReply { subscription_id: String, error: Option<String> },
  SubscriptionStop { subscription_id: String },
  Publication(SubscriptionPublication),
  MulticastPublication { multicast_id: String, response: Result<Vec<u8>, PublicationError> },
}

/// Error carried inside a `Publication`/`MulticastPublication` payload —
/// distinct from `MiddlewareError`, which is this core's own local-side
/// error type; `PublicationError` crosses the wire from the provider.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PublicationError {
  pub message: String,
}

/// A decoded publication awaiting dispatch to its subscription.
#[derive(Debug, Clone)]
pub struct SubscriptionPublication {
  pub subscription_id: String,
  pub response: Result<Vec<u8>, PublicationError>,
}
