use std::collections::HashMap;

use super::version::Version;

/// `expiryDateMs` sentinel meaning "never expires".
pub const NO_EXPIRY: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde_repr::Serialize_repr, serde_repr::Deserialize_repr)]
#[repr(u8)]
pub enum ProviderScope {
  Local = 0,
  Global = 1,
}

/// QoS offered by a single provider registration.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ProviderQos {
  /// Ordered sequence of (name, value) pairs; order matters for keyword
  /// matching determinism, hence `Vec` rather than `HashMap`.
  pub custom_parameters: Vec<(String, String)>,
  pub priority: i64,
  pub scope: ProviderScope,
  pub supports_on_change_subscriptions: bool,
}

impl ProviderQos {
  pub fn custom_parameter(&self, name: &str) -> Option<&str> {
    self
      .custom_parameters
      .iter()
      .find(|(n, _)| n == name)
      .map(|(_, v)| v.as_str())
  }
}

/// A single capabilities-directory record.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DiscoveryEntry {
  pub version: Version,
  pub domain: String,
  pub interface_name: String,
  pub participant_id: String,
  pub provider_qos: ProviderQos,
  pub last_seen_ms: i64,
  pub expiry_date_ms: i64,
  pub public_key_id: String,
}

/// `DiscoveryEntry` plus `is_local`, as returned by the lookup collaborator.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DiscoveryEntryWithMetaInfo {
  pub entry: DiscoveryEntry,
  pub is_local: bool,
}

impl DiscoveryEntryWithMetaInfo {
  pub fn participant_id(&self) -> &str {
    &self.entry.participant_id
  }

  pub fn provider_version(&self) -> Version {
    self.entry.version
  }

  pub fn provider_qos(&self) -> &ProviderQos {
    &self.entry.provider_qos
  }
}

/// Selection strategy for arbitration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde_repr::Serialize_repr, serde_repr::Deserialize_repr)]
#[repr(u8)]
pub enum ArbitrationStrategy {
  NotSet = 0,
  FixedParticipant = 1,
  HighestPriority = 2,
  Keyword = 3,
  LocalOnly = 4,
}

/// Which directories a lookup consults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde_repr::Serialize_repr, serde_repr::Deserialize_repr)]
#[repr(u8)]
pub enum DiscoveryScope {
  LocalOnly = 0,
  LocalThenGlobal = 1,
  LocalAndGlobal = 2,
  GlobalOnly = 3,
}

/// Client-supplied discovery parameters.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DiscoveryQos {
  pub cache_max_age_ms: i64,
  pub discovery_timeout_ms: i64,
  pub retry_interval_ms: i64,
  pub arbitration_strategy: ArbitrationStrategy,
  pub discovery_scope: DiscoveryScope,
  pub provider_must_support_on_change: bool,
  pub custom_parameters: HashMap<String, String>,
}

impl DiscoveryQos {
  pub fn custom_parameter(&self, name: &str) -> Option<&str> {
    self.custom_parameters.get(name).map(String::as_str)
  }
}

/// Reduced QoS handed down to the discovery collaborator's lookup call.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemDiscoveryQos {
  pub cache_max_age_ms: i64,
  pub discovery_timeout_ms: i64,
  pub discovery_scope: DiscoveryScope,
  pub provider_must_support_on_change: bool,
}

impl From<&DiscoveryQos> for SystemDiscoveryQos {
  fn from(qos: &DiscoveryQos) -> Self {
    SystemDiscoveryQos {
      cache_max_age_ms: qos.cache_max_age_ms,
      discovery_timeout_ms: qos.discovery_timeout_ms,
      discovery_scope: qos.discovery_scope,
      provider_must_support_on_change: qos.provider_must_support_on_change,
    }
  }
}

/// Non-empty, ordered selection result; first element is the primary choice.
#[derive(Debug, Clone, PartialEq)]
pub struct ArbitrationResult {
  entries: Vec<DiscoveryEntryWithMetaInfo>,
}

impl ArbitrationResult {
  /// Panics if `entries` is empty: an `ArbitrationResult` is a non-empty
  /// type by construction. Callers that may have an
  /// empty selection should not construct this type at all.
  pub fn new(entries: Vec<DiscoveryEntryWithMetaInfo>) -> Self {
    assert!(!entries.is_empty(), "ArbitrationResult must not be empty");
    ArbitrationResult { entries }
  }

  pub fn primary(&self) -> &DiscoveryEntryWithMetaInfo {
    &self.entries[0]
  }

  pub fn entries(&self) -> &[DiscoveryEntryWithMetaInfo] {
    &self.entries
  }

  pub fn into_entries(self) -> Vec<DiscoveryEntryWithMetaInfo> {
    self.entries
  }
}
