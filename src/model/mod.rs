//! Data model for the middleware core.

mod discovery;
mod message;
mod qos;
mod version;

pub use discovery::{
  ArbitrationResult, ArbitrationStrategy, DiscoveryEntry, DiscoveryEntryWithMetaInfo,
  DiscoveryScope, ProviderQos, ProviderScope, SystemDiscoveryQos, NO_EXPIRY,
};
pub use discovery::DiscoveryQos;
pub use message::{Message, MessagePayload, MessageType, PublicationError, SubscriptionPublication};
pub use qos::{DiscoveryQosBuilder, SubscriptionQos, SubscriptionQosBuilder};
pub use version::Version;

/// Capabilities-directory seed shape. A host
/// application may `serde_json::from_str::<CapabilitiesInjection>` a file
/// to seed a local `DiscoveryAsync` implementation; the core never reads
/// the file itself.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CapabilitiesInjection {
  pub entries: Vec<DiscoveryEntry>,
}

/// Access-control boundary shape, named only — storage, loading, and
/// enforcement are explicitly out of scope for this crate.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AccessControlEntry {
  pub domain: String,
  pub interface_name: String,
  pub role: String,
}
