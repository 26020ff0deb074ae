//! Unified error taxonomy for the middleware core: a single sum type
//! keyed on kind, rather than a class hierarchy plus a separately
//! modelled application-exception wrapper.

use std::collections::BTreeSet;

use crate::model::Version;

/// Errors returned by the discovery lookup collaborator (`DiscoveryAsync`).
///
/// Hard vs. soft classification (whether the Arbitrator retries or gives
/// up) is the Arbitrator's job, not this type's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde_repr::Serialize_repr, serde_repr::Deserialize_repr)]
#[repr(u8)]
pub enum DiscoveryError {
  NoEntryForParticipant = 0,
  NoEntryForSelectedBackends = 1,
  UnknownGbid = 2,
  InvalidGbid = 3,
  InternalError = 4,
}

impl std::fmt::Display for DiscoveryError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let literal = match self {
      DiscoveryError::NoEntryForParticipant => "NO_ENTRY_FOR_PARTICIPANT",
      DiscoveryError::NoEntryForSelectedBackends => "NO_ENTRY_FOR_SELECTED_BACKENDS",
      DiscoveryError::UnknownGbid => "UNKNOWN_GBID",
      DiscoveryError::InvalidGbid => "INVALID_GBID",
      DiscoveryError::InternalError => "INTERNAL_ERROR",
    };
    f.write_str(literal)
  }
}

/// The unified error kind surfaced by every blocking / callback API in the
/// core.
#[derive(Debug, Clone, thiserror::Error)]
pub enum MiddlewareError {
  /// A blocking wait exceeded its deadline.
  #[error("{0}")]
  Timeout(String),

  /// A structured error returned by the discovery directory itself (as
  /// opposed to a generic failure reaching it). Carries enough
  /// information for the Arbitrator to classify it as soft (retry) or
  /// hard (give up).
  #[error("DiscoveryError: {0}")]
  Discovery(DiscoveryError),

  /// Arbitration exhausted with no compatible provider, and no incompatible
  /// version was ever observed (or observing them is not meaningful, e.g.
  /// no entries were returned at all).
  #[error("{0}")]
  DiscoveryFailed(String),

  /// Arbitration exhausted; at least one entry was seen but every one of
  /// them failed the version filter. Carries the exact set of observed
  /// incompatible provider versions.
  #[error("no compatible provider found, incompatible versions observed: {0:?}")]
  NoCompatibleProvider(BTreeSet<Version>),

  /// A periodic subscription's missed-publication scheduler fired.
  #[error("publication missed for subscription {0}")]
  PublicationMissed(String),

  /// The message router failed to (un)register a multicast receiver.
  #[error("{0}")]
  SubscriptionSetupFailed(String),

  /// QoS or parameter validation failed before any work was enqueued.
  #[error("{0}")]
  InvalidArgument(String),

  /// The owning component was stopped while this operation was pending.
  #[error("{0}")]
  ShutdownInProgress(String),

  /// Unexpected internal state; should be logged loudly at the call site.
  #[error("internal error: {0}")]
  InternalError(String),
}

impl MiddlewareError {
  pub fn shutdown_in_progress(interface_name: &str) -> Self {
    MiddlewareError::ShutdownInProgress(format!(
      "Shutting Down Arbitration for interface {interface_name}"
    ))
  }

  pub fn arbitration_timeout() -> Self {
    MiddlewareError::Timeout("Arbitration could not be finished in time.".to_owned())
  }
}

/// Errors returned synchronously by a `MessageRouter` implementation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RoutingError {
  #[error("router unavailable: {0}")]
  Unavailable(String),
  #[error("routing failed: {0}")]
  Failed(String),
}
