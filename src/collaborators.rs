//! External collaborator traits standing in for the
//! generated proxy layer, the message router's transport I/O, and the
//! application-level subscription listener. None of these are
//! implemented by this crate beyond the test fakes in `fakes` below.

use crate::concurrent::Future;
use crate::error::{MiddlewareError, RoutingError};
use crate::model::{DiscoveryEntryWithMetaInfo, Message, SystemDiscoveryQos};

pub type BoxSuccessFn = Box<dyn FnOnce() + Send>;
pub type BoxErrorFn = Box<dyn FnOnce(&MiddlewareError) + Send>;

/// Resolves participant ids and domain+interface lookups against a local
/// and/or global capabilities directory.
pub trait DiscoveryAsync: Send + Sync {
  fn lookup_participant(
    &self,
    participant_id: &str,
    qos: &SystemDiscoveryQos,
    gbids: &[String],
  ) -> Future<DiscoveryEntryWithMetaInfo>;

  fn lookup_domains(
    &self,
    domains: &[String],
    interface_name: &str,
    qos: &SystemDiscoveryQos,
    gbids: &[String],
  ) -> Future<Vec<DiscoveryEntryWithMetaInfo>>;
}

/// Routes outbound envelopes and manages multicast receiver registration
/// on the transport.
pub trait MessageRouter: Send + Sync {
  fn route(&self, message: Message) -> Result<(), RoutingError>;

  fn add_multicast_receiver(
    &self,
    multicast_id: &str,
    subscriber_id: &str,
    provider_id: &str,
    on_success: BoxSuccessFn,
    on_error: BoxErrorFn,
  );

  fn remove_multicast_receiver(
    &self,
    multicast_id: &str,
    subscriber_id: &str,
    provider_id: &str,
    on_success: BoxSuccessFn,
    on_error: BoxErrorFn,
  );
}

/// Application-supplied subscription callback.
pub trait SubscriptionListener: Send + Sync {
  fn on_subscribed(&self, _subscription_id: &str) {}
  fn on_receive(&self, values: &[u8]);
  fn on_error(&self, error: &MiddlewareError);
}

/// Dispatch target for inbound `Request`/`OneWayRequest` messages.
/// Registration and lookup are the generated-code seam; this crate only
/// defines the trait and the table (see `dispatch::Dispatcher`).
pub trait RequestInterpreter: Send + Sync {
  fn interface_name(&self) -> &str;
  fn major_version(&self) -> u32;
  fn invoke(&self, method_name: &str, params: &[u8]) -> Result<Vec<u8>, MiddlewareError>;
}
