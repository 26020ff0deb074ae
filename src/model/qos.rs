use std::collections::HashMap;

use super::discovery::{ArbitrationStrategy, DiscoveryQos, DiscoveryScope, NO_EXPIRY};

/// Per-subscription QoS. `expiry_date_ms` on every
/// variant must satisfy the invariant checked by `validate`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum SubscriptionQos {
  OnChange {
    expiry_date_ms: i64,
    publication_ttl_ms: i64,
    min_interval_ms: i64,
  },
  Periodic {
    expiry_date_ms: i64,
    publication_ttl_ms: i64,
    period_ms: i64,
    alert_after_interval_ms: i64,
  },
  Multicast {
    expiry_date_ms: i64,
    publication_ttl_ms: i64,
    partitions: Vec<String>,
  },
}

impl SubscriptionQos {
  pub fn expiry_date_ms(&self) -> i64 {
    match self {
      SubscriptionQos::OnChange { expiry_date_ms, .. }
      | SubscriptionQos::Periodic { expiry_date_ms, .. }
      | SubscriptionQos::Multicast { expiry_date_ms, .. } => *expiry_date_ms,
    }
  }

  pub fn publication_ttl_ms(&self) -> i64 {
    match self {
      SubscriptionQos::OnChange {
        publication_ttl_ms, ..
      }
      | SubscriptionQos::Periodic {
        publication_ttl_ms, ..
      }
      | SubscriptionQos::Multicast {
        publication_ttl_ms, ..
      } => *publication_ttl_ms,
    }
  }

  /// `expiry_date_ms == NO_EXPIRY || expiry_date_ms > now_ms` per the
  /// registration invariant.
  pub fn validate(&self, now_ms: i64) -> Result<(), String> {
    let expiry = self.expiry_date_ms();
    if expiry == NO_EXPIRY || expiry > now_ms {
      Ok(())
    } else {
      Err(format!(
        "expiryDateMs {expiry} is not in the future (now = {now_ms})"
      ))
    }
  }

  /// The alert window for missed-publication detection, if this variant
  /// defines one (only `Periodic` does).
  pub fn alert_after_interval_ms(&self) -> Option<i64> {
    match self {
      SubscriptionQos::Periodic {
        alert_after_interval_ms,
        ..
      } => Some(*alert_after_interval_ms),
      _ => None,
    }
  }
}

/// Builder for `DiscoveryQos`, filling in the library defaults.
#[derive(Debug, Default, Clone)]
pub struct DiscoveryQosBuilder {
  cache_max_age_ms: Option<i64>,
  discovery_timeout_ms: Option<i64>,
  retry_interval_ms: Option<i64>,
  arbitration_strategy: Option<ArbitrationStrategy>,
  discovery_scope: Option<DiscoveryScope>,
  provider_must_support_on_change: Option<bool>,
  custom_parameters: HashMap<String, String>,
}

impl DiscoveryQosBuilder {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_cache_max_age_ms(mut self, v: i64) -> Self {
    self.cache_max_age_ms = Some(v);
    self
  }

  pub fn with_discovery_timeout_ms(mut self, v: i64) -> Self {
    self.discovery_timeout_ms = Some(v);
    self
  }

  pub fn with_retry_interval_ms(mut self, v: i64) -> Self {
    self.retry_interval_ms = Some(v);
    self
  }

  pub fn with_arbitration_strategy(mut self, v: ArbitrationStrategy) -> Self {
    self.arbitration_strategy = Some(v);
    self
  }

  pub fn with_discovery_scope(mut self, v: DiscoveryScope) -> Self {
    self.discovery_scope = Some(v);
    self
  }

  pub fn with_provider_must_support_on_change(mut self, v: bool) -> Self {
    self.provider_must_support_on_change = Some(v);
    self
  }

  pub fn with_custom_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.custom_parameters.insert(name.into(), value.into());
    self
  }

  pub fn build(self) -> DiscoveryQos {
    DiscoveryQos {
      cache_max_age_ms: self.cache_max_age_ms.unwrap_or(0),
      discovery_timeout_ms: self.discovery_timeout_ms.unwrap_or(30_000),
      retry_interval_ms: self.retry_interval_ms.unwrap_or(1_000),
      arbitration_strategy: self.arbitration_strategy.unwrap_or(ArbitrationStrategy::NotSet),
      discovery_scope: self.discovery_scope.unwrap_or(DiscoveryScope::LocalThenGlobal),
      provider_must_support_on_change: self.provider_must_support_on_change.unwrap_or(false),
      custom_parameters: self.custom_parameters,
    }
  }
}

/// Builder for `SubscriptionQos`. The `kind` chosen by whichever
/// `periodic()`/`on_change()`/`multicast()` method is called last wins.
#[derive(Debug, Clone)]
pub struct SubscriptionQosBuilder {
  expiry_date_ms: i64,
  publication_ttl_ms: i64,
  min_interval_ms: i64,
  period_ms: i64,
  alert_after_interval_ms: i64,
  partitions: Vec<String>,
}

impl Default for SubscriptionQosBuilder {
  fn default() -> Self {
    SubscriptionQosBuilder {
      expiry_date_ms: NO_EXPIRY,
      publication_ttl_ms: 10_000,
      min_interval_ms: 0,
      period_ms: 0,
      alert_after_interval_ms: 0,
      partitions: Vec::new(),
    }
  }
}

impl SubscriptionQosBuilder {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_expiry_date_ms(mut self, v: i64) -> Self {
    self.expiry_date_ms = v;
    self
  }

  pub fn with_publication_ttl_ms(mut self, v: i64) -> Self {
    self.publication_ttl_ms = v;
    self
  }

  pub fn with_min_interval_ms(mut self, v: i64) -> Self {
    self.min_interval_ms = v;
    self
  }

  pub fn with_period_ms(mut self, v: i64) -> Self {
    self.period_ms = v;
    self
  }

  pub fn with_alert_after_interval_ms(mut self, v: i64) -> Self {
    self.alert_after_interval_ms = v;
    self
  }

  pub fn with_partitions(mut self, partitions: Vec<String>) -> Self {
    self.partitions = partitions;
    self
  }

  pub fn build_on_change(self) -> SubscriptionQos {
    SubscriptionQos::OnChange {
      expiry_date_ms: self.expiry_date_ms,
      publication_ttl_ms: self.publication_ttl_ms,
      min_interval_ms: self.min_interval_ms,
    }
  }

  pub fn build_periodic(self) -> SubscriptionQos {
    SubscriptionQos::Periodic {
      expiry_date_ms: self.expiry_date_ms,
      publication_ttl_ms: self.publication_ttl_ms,
      period_ms: self.period_ms,
      alert_after_interval_ms: self.alert_after_interval_ms,
    }
  }

  pub fn build_multicast(self) -> SubscriptionQos {
    SubscriptionQos::Multicast {
      expiry_date_ms: self.expiry_date_ms,
      publication_ttl_ms: self.publication_ttl_ms,
      partitions: self.partitions,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn discovery_qos_builder_fills_defaults() {
    let qos = DiscoveryQosBuilder::new().build();
    assert_eq!(qos.discovery_timeout_ms, 30_000);
    assert_eq!(qos.retry_interval_ms, 1_000);
    assert_eq!(qos.arbitration_strategy, ArbitrationStrategy::NotSet);
  }

  #[test]
  fn subscription_qos_validate_rejects_past_expiry() {
    let qos = SubscriptionQosBuilder::new()
      .with_expiry_date_ms(100)
      .build_on_change();
    assert!(qos.validate(200).is_err());
    assert!(qos.validate(50).is_ok());
  }

  #[test]
  fn subscription_qos_no_expiry_always_valid() {
    let qos = SubscriptionQosBuilder::new().build_periodic();
    assert!(qos.validate(i64::MAX).is_ok());
  }
}
