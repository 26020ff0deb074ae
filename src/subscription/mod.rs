//! Client-side subscription lifecycle. `Arc::new_cyclic` gives scheduled
//! runnables a `Weak<SubscriptionManager>` back-reference without
//! creating a reference cycle.

pub mod multicast;

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use crate::collaborators::{MessageRouter, SubscriptionListener};
use crate::concurrent::DelayedScheduler;
use crate::error::MiddlewareError;
use crate::model::{PublicationError, SubscriptionQos, NO_EXPIRY};

fn now_ms() -> i64 {
  chrono::Utc::now().timestamp_millis()
}

struct SubscriptionState {
  time_of_last_publication_ms: i64,
  is_stopped: bool,
  end_runnable_handle: crate::concurrent::RunnableHandle,
  missed_publication_runnable_handle: crate::concurrent::RunnableHandle,
  multicast_id: Option<String>,
  subscriber_participant_id: String,
  provider_participant_id: String,
}

struct Subscription {
  listener: Arc<dyn SubscriptionListener>,
  state: Mutex<SubscriptionState>,
}

/// Tracks client-side subscriptions, fires missed-publication alerts, and
/// fans out multicast publications to every registered listener.
pub struct SubscriptionManager {
  subscriptions: Mutex<HashMap<String, Arc<Subscription>>>,
  multicast_subscribers: Mutex<HashMap<String, HashSet<String>>>,
  message_router: Arc<dyn MessageRouter>,
  missed_publication_scheduler: Arc<DelayedScheduler>,
  self_weak: Weak<SubscriptionManager>,
}

impl SubscriptionManager {
  pub fn new(message_router: Arc<dyn MessageRouter>, scheduler_pool_size: usize) -> Arc<Self> {
    Arc::new_cyclic(|self_weak| SubscriptionManager {
      subscriptions: Mutex::new(HashMap::new()),
      multicast_subscribers: Mutex::new(HashMap::new()),
      message_router,
      missed_publication_scheduler: Arc::new(DelayedScheduler::new(scheduler_pool_size)),
      self_weak: self_weak.clone(),
    })
  }

  pub fn shutdown(&self) {
    self.missed_publication_scheduler.shutdown();
  }

  /// Registers a unicast (attribute/broadcast) subscription. Rejects an
  /// already-past `expiry_date_ms` with `InvalidArgument`.
  pub fn register_subscription(
    &self,
    subscription_id: &str,
    listener: Arc<dyn SubscriptionListener>,
    qos: SubscriptionQos,
  ) -> Result<(), MiddlewareError> {
    let now = now_ms();
    qos.validate(now).map_err(MiddlewareError::InvalidArgument)?;

    if self.subscriptions.lock().expect("subscription mutex poisoned").contains_key(subscription_id) {
      self.unregister_subscription(subscription_id);
    }

    let subscription = Arc::new(Subscription {
      listener,
      state: Mutex::new(SubscriptionState {
        time_of_last_publication_ms: now,
        is_stopped: false,
        end_runnable_handle: crate::concurrent::INVALID_RUNNABLE_HANDLE,
        missed_publication_runnable_handle: crate::concurrent::INVALID_RUNNABLE_HANDLE,
        multicast_id: None,
        subscriber_participant_id: String::new(),
        provider_participant_id: String::new(),
      }),
    });

    self
      .subscriptions
      .lock()
      .expect("subscription mutex poisoned")
      .insert(subscription_id.to_owned(), subscription.clone());
    trace!("Subscription registered. ID={subscription_id}");

    let expiry_date_ms = qos.expiry_date_ms();
    let period_ms = match &qos {
      SubscriptionQos::Periodic { period_ms, .. } => *period_ms,
      _ => 0,
    };
    let alert_after_interval_ms = qos.alert_after_interval_ms().unwrap_or(0);
    let scheduled_missed = alert_after_interval_ms > 0 && period_ms > 0;

    if scheduled_missed {
      trace!("Will notify if updates are missed.");
      let handle = schedule_missed_publication_check(
        self.self_weak.clone(),
        subscription.clone(),
        subscription_id.to_owned(),
        expiry_date_ms,
        period_ms,
        alert_after_interval_ms,
        alert_after_interval_ms,
      );
      subscription.state.lock().expect("subscription mutex poisoned").missed_publication_runnable_handle = handle;
    } else if expiry_date_ms != NO_EXPIRY {
      let delay_ms = (expiry_date_ms - now_ms()).max(0);
      let subscription_id_owned = subscription_id.to_owned();
      let manager = self.self_weak.clone();
      let handle = self.missed_publication_scheduler.schedule(Duration::from_millis(delay_ms as u64), move || {
        if let Some(manager) = manager.upgrade() {
          trace!("Publication expired / interrupted. Expiring on subscription id={subscription_id_owned}");
          manager.unregister_subscription(&subscription_id_owned);
        } else {
          error!("Failed to expire subscription {subscription_id_owned}: manager is gone");
        }
      });
      subscription.state.lock().expect("subscription mutex poisoned").end_runnable_handle = handle;
    }

    Ok(())
  }

  /// Registers a multicast subscription, deduplicating message-router
  /// registration when multiple subscriptions share a `multicast_id`.
  pub fn register_multicast_subscription(
    &self,
    subscription_id: &str,
    subscribe_to_name: &str,
    subscriber_participant_id: &str,
    provider_participant_id: &str,
    partitions: &[String],
    listener: Arc<dyn SubscriptionListener>,
    qos: SubscriptionQos,
    on_success: crate::collaborators::BoxSuccessFn,
    on_error: crate::collaborators::BoxErrorFn,
  ) -> Result<(), MiddlewareError> {
    multicast::validate_partitions(partitions).map_err(MiddlewareError::InvalidArgument)?;
    let multicast_id = multicast::build_id(provider_participant_id, subscribe_to_name, partitions);

    let mut multicast_subscribers = self.multicast_subscribers.lock().expect("subscription mutex poisoned");

    if let Some(existing) = self.subscriptions.lock().expect("subscription mutex poisoned").get(subscription_id).cloned() {
      let old_multicast_id = existing.state.lock().expect("subscription mutex poisoned").multicast_id.clone();
      if old_multicast_id.as_deref() != Some(multicast_id.as_str()) {
        drop(multicast_subscribers);
        self.unregister_subscription(subscription_id);
        multicast_subscribers = self.multicast_subscribers.lock().expect("subscription mutex poisoned");
      } else {
        self.subscriptions.lock().expect("subscription mutex poisoned").remove(subscription_id);
        stop_subscription(&self.missed_publication_scheduler, &existing);
      }
    }

    self.register_subscription(subscription_id, listener, qos)?;

    let subscription = self
      .subscriptions
      .lock()
      .expect("subscription mutex poisoned")
      .get(subscription_id)
      .cloned()
      .expect("register_subscription just inserted this id");
    {
      let mut state = subscription.state.lock().expect("subscription mutex poisoned");
      state.multicast_id = Some(multicast_id.clone());
      state.subscriber_participant_id = subscriber_participant_id.to_owned();
      state.provider_participant_id = provider_participant_id.to_owned();
    }

    let receivers = multicast_subscribers.entry(multicast_id.clone()).or_default();
    if !receivers.contains(subscription_id) {
      self.message_router.add_multicast_receiver(
        &multicast_id,
        subscriber_participant_id,
        provider_participant_id,
        on_success,
        on_error,
      );
      receivers.insert(subscription_id.to_owned());
    } else {
      on_success();
    }

    Ok(())
  }

  /// Removes a subscription, unscheduling its runnables and, for
  /// multicast subscriptions, deregistering the message-router receiver
  /// once the last subscriber for that `multicast_id` is gone.
  pub fn unregister_subscription(&self, subscription_id: &str) {
    let subscription = match self.subscriptions.lock().expect("subscription mutex poisoned").remove(subscription_id) {
      Some(s) => s,
      None => {
        trace!("Called unregister on a non/no longer existent subscription, used id={subscription_id}");
        return;
      }
    };

    let mut multicast_subscribers = self.multicast_subscribers.lock().expect("subscription mutex poisoned");
    let multicast_id = subscription.state.lock().expect("subscription mutex poisoned").multicast_id.clone();

    if let Some(multicast_id) = multicast_id {
      stop_subscription(&self.missed_publication_scheduler, &subscription);

      let now_empty = match multicast_subscribers.get_mut(&multicast_id) {
        Some(receivers) => {
          receivers.remove(subscription_id);
          receivers.is_empty()
        }
        None => {
          error!("No multicast subscriber found for subscriptionId={subscription_id}, multicastId={multicast_id}");
          return;
        }
      };
      if now_empty {
        multicast_subscribers.remove(&multicast_id);
      }
      drop(multicast_subscribers);

      let (subscriber_participant_id, provider_participant_id) = {
        let state = subscription.state.lock().expect("subscription mutex poisoned");
        (state.subscriber_participant_id.clone(), state.provider_participant_id.clone())
      };
      let subscription_id_owned = subscription_id.to_owned();
      let multicast_id_owned = multicast_id.clone();
      let on_success: crate::collaborators::BoxSuccessFn = Box::new(move || {
        trace!("Multicast receiver unregistered. ID={subscription_id_owned}, multicastId={multicast_id_owned}");
      });
      let listener = subscription.listener.clone();
      let subscription_id_for_error = subscription_id.to_owned();
      let multicast_id_for_error = multicast_id.clone();
      let on_error: crate::collaborators::BoxErrorFn = Box::new(move |error| {
        let message = format!(
          "Unsubscribe from subscription (ID={subscription_id_for_error}, multicastId={multicast_id_for_error}) failed. Could not remove multicast receiver: {error}"
        );
        listener.on_error(&MiddlewareError::SubscriptionSetupFailed(message));
      });
      self.message_router.remove_multicast_receiver(
        &multicast_id,
        &subscriber_participant_id,
        &provider_participant_id,
        on_success,
        on_error,
      );
      return;
    }
    drop(multicast_subscribers);

    stop_subscription(&self.missed_publication_scheduler, &subscription);
  }

  /// Updates the last-publication timestamp, resetting the
  /// missed-publication clock.
  pub fn touch_subscription_state(&self, subscription_id: &str) {
    trace!("Touching subscription state for id={subscription_id}");
    if let Some(subscription) = self.subscriptions.lock().expect("subscription mutex poisoned").get(subscription_id) {
      subscription.state.lock().expect("subscription mutex poisoned").time_of_last_publication_ms = now_ms();
    }
  }

  fn listener_for(&self, subscription_id: &str) -> Option<Arc<dyn SubscriptionListener>> {
    self
      .subscriptions
      .lock()
      .expect("subscription mutex poisoned")
      .get(subscription_id)
      .map(|s| s.listener.clone())
  }

  /// Matches `multicast_id` (a concrete, published id) against every
  /// registered receiver pattern, not just an exact key lookup: a
  /// subscriber that registered with `+`/`*` wildcard partitions matches
  /// any published id whose partition prefix agrees (§3).
  fn listeners_for_multicast(&self, multicast_id: &str) -> Vec<Arc<dyn SubscriptionListener>> {
    let subscription_ids: Vec<String> = self
      .multicast_subscribers
      .lock()
      .expect("subscription mutex poisoned")
      .iter()
      .filter(|(pattern, _)| multicast::matches(pattern, multicast_id))
      .flat_map(|(_, ids)| ids.iter().cloned())
      .collect();
    subscription_ids
      .into_iter()
      .filter_map(|id| self.listener_for(&id))
      .collect()
  }

  /// Dispatches a unicast publication to its subscription's listener.
  pub fn dispatch_publication(&self, subscription_id: &str, response: Result<Vec<u8>, PublicationError>) {
    self.touch_subscription_state(subscription_id);
    let Some(listener) = self.listener_for(subscription_id) else {
      warn!("Trying to access a non existing subscription callback for id={subscription_id}");
      return;
    };
    deliver(&listener, response);
  }

  /// Dispatches a multicast publication to every subscriber of
  /// `multicast_id`, exactly once each.
  pub fn dispatch_multicast_publication(&self, multicast_id: &str, response: Result<Vec<u8>, PublicationError>) {
    let listeners = self.listeners_for_multicast(multicast_id);
    if listeners.is_empty() {
      warn!("Trying to access a non existing subscription callback for multicast id={multicast_id}");
      return;
    }
    for listener in listeners {
      deliver(&listener, response.clone());
    }
  }
}

fn deliver(listener: &Arc<dyn SubscriptionListener>, response: Result<Vec<u8>, PublicationError>) {
  match response {
    Ok(values) => listener.on_receive(&values),
    Err(error) => listener.on_error(&MiddlewareError::InternalError(error.message)),
  }
}

fn stop_subscription(scheduler: &DelayedScheduler, subscription: &Subscription) {
  let mut state = subscription.state.lock().expect("subscription mutex poisoned");
  state.is_stopped = true;
  if state.end_runnable_handle != crate::concurrent::INVALID_RUNNABLE_HANDLE {
    scheduler.unschedule(state.end_runnable_handle);
    state.end_runnable_handle = crate::concurrent::INVALID_RUNNABLE_HANDLE;
  }
  if state.missed_publication_runnable_handle != crate::concurrent::INVALID_RUNNABLE_HANDLE {
    scheduler.unschedule(state.missed_publication_runnable_handle);
    state.missed_publication_runnable_handle = crate::concurrent::INVALID_RUNNABLE_HANDLE;
  }
}

#[allow(clippy::too_many_arguments)]
fn schedule_missed_publication_check(
  manager: Weak<SubscriptionManager>,
  subscription: Arc<Subscription>,
  subscription_id: String,
  expiry_date_ms: i64,
  expected_interval_ms: i64,
  alert_after_interval_ms: i64,
  delay_ms: i64,
) -> crate::concurrent::RunnableHandle {
  let Some(mgr) = manager.upgrade() else {
    return crate::concurrent::INVALID_RUNNABLE_HANDLE;
  };
  mgr.missed_publication_scheduler.schedule(Duration::from_millis(delay_ms.max(0) as u64), move || {
    run_missed_publication_check(
      manager,
      subscription,
      subscription_id,
      expiry_date_ms,
      expected_interval_ms,
      alert_after_interval_ms,
    );
  })
}

fn run_missed_publication_check(
  manager: Weak<SubscriptionManager>,
  subscription: Arc<Subscription>,
  subscription_id: String,
  expiry_date_ms: i64,
  expected_interval_ms: i64,
  alert_after_interval_ms: i64,
) {
  let now = now_ms();
  let (is_stopped, time_of_last_publication_ms) = {
    let state = subscription.state.lock().expect("subscription mutex poisoned");
    (state.is_stopped, state.time_of_last_publication_ms)
  };
  let expired = expiry_date_ms != NO_EXPIRY && now >= expiry_date_ms;
  if expired || is_stopped {
    trace!("Publication expired / interrupted. Expiring on subscription id={subscription_id}");
    return;
  }

  trace!("Running MissedPublicationRunnable for subscription id={subscription_id}");
  let time_since_last_publication = now - time_of_last_publication_ms;
  let delay = if time_since_last_publication < alert_after_interval_ms {
    trace!("Publication in time for subscription id={subscription_id}");
    alert_after_interval_ms - time_since_last_publication
  } else {
    trace!("Publication missed for subscription id={subscription_id}");
    subscription
      .listener
      .on_error(&MiddlewareError::PublicationMissed(subscription_id.clone()));
    alert_after_interval_ms - (time_since_last_publication % expected_interval_ms)
  };

  let handle = schedule_missed_publication_check(
    manager.clone(),
    subscription.clone(),
    subscription_id,
    expiry_date_ms,
    expected_interval_ms,
    alert_after_interval_ms,
    delay,
  );
  if let Some(_mgr) = manager.upgrade() {
    subscription.state.lock().expect("subscription mutex poisoned").missed_publication_runnable_handle = handle;
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::collaborators::fakes::FakeMessageRouter;
  use crate::model::SubscriptionQosBuilder;
  use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
  use std::sync::mpsc;

  struct RecordingListener {
    received: Mutex<Vec<Vec<u8>>>,
    errors: Mutex<Vec<String>>,
    error_count: AtomicUsize,
  }

  impl RecordingListener {
    fn new() -> Self {
      RecordingListener {
        received: Mutex::new(Vec::new()),
        errors: Mutex::new(Vec::new()),
        error_count: AtomicUsize::new(0),
      }
    }
  }

  impl SubscriptionListener for RecordingListener {
    fn on_receive(&self, values: &[u8]) {
      self.received.lock().unwrap().push(values.to_vec());
    }

    fn on_error(&self, error: &MiddlewareError) {
      self.error_count.fetch_add(1, AtomicOrdering::SeqCst);
      self.errors.lock().unwrap().push(error.to_string());
    }
  }

  #[test]
  fn dispatch_publication_delivers_to_registered_listener() {
    let router = Arc::new(FakeMessageRouter::new());
    let manager = SubscriptionManager::new(router, 1);
    let listener = Arc::new(RecordingListener::new());
    let qos = SubscriptionQosBuilder::new().build_on_change();
    manager.register_subscription("sub1", listener.clone(), qos).unwrap();

    manager.dispatch_publication("sub1", Ok(vec![1, 2, 3]));

    assert_eq!(listener.received.lock().unwrap().len(), 1);
    manager.shutdown();
  }

  #[test]
  fn register_subscription_rejects_past_expiry() {
    let router = Arc::new(FakeMessageRouter::new());
    let manager = SubscriptionManager::new(router, 1);
    let listener = Arc::new(RecordingListener::new());
    let qos = SubscriptionQosBuilder::new().with_expiry_date_ms(1).build_on_change();
    let result = manager.register_subscription("sub1", listener, qos);
    assert!(matches!(result, Err(MiddlewareError::InvalidArgument(_))));
    manager.shutdown();
  }

  #[test]
  fn missed_publication_fires_after_repeated_silence() {
    let router = Arc::new(FakeMessageRouter::new());
    let manager = SubscriptionManager::new(router, 2);
    let listener = Arc::new(RecordingListener::new());
    let qos = SubscriptionQosBuilder::new()
      .with_period_ms(30)
      .with_alert_after_interval_ms(50)
      .build_periodic();
    manager.register_subscription("sub1", listener.clone(), qos).unwrap();

    std::thread::sleep(Duration::from_millis(250));
    let fired = listener.error_count.load(AtomicOrdering::SeqCst);
    assert!(fired >= 2, "expected at least 2 missed-publication alerts, got {fired}");
    manager.unregister_subscription("sub1");
    manager.shutdown();
  }

  #[test]
  fn periodic_subscription_without_missed_publication_check_still_expires() {
    let router = Arc::new(FakeMessageRouter::new());
    let manager = SubscriptionManager::new(router, 1);
    let listener = Arc::new(RecordingListener::new());
    let now = now_ms();
    // alert_after_interval_ms and period_ms left at their 0 default: no
    // missed-publication runnable is scheduled, but the end runnable must
    // still fire once expiry_date_ms is reached.
    let qos = SubscriptionQosBuilder::new().with_expiry_date_ms(now + 50).build_periodic();
    manager.register_subscription("sub1", listener, qos).unwrap();
    assert!(manager.subscriptions.lock().unwrap().contains_key("sub1"));

    std::thread::sleep(Duration::from_millis(250));
    assert!(
      !manager.subscriptions.lock().unwrap().contains_key("sub1"),
      "expiring periodic subscription should have been unregistered by its end runnable"
    );
    manager.shutdown();
  }

  #[test]
  fn multicast_publication_reaches_every_listener_exactly_once() {
    let router = Arc::new(FakeMessageRouter::new());
    let manager = SubscriptionManager::new(router, 1);

    let listeners: Vec<_> = (0..3).map(|_| Arc::new(RecordingListener::new())).collect();
    for (i, listener) in listeners.iter().enumerate() {
      let qos = SubscriptionQosBuilder::new().build_multicast();
      manager
        .register_multicast_subscription(
          &format!("sub{i}"),
          "event",
          "consumer1",
          "provider1",
          &[],
          listener.clone(),
          qos,
          Box::new(|| {}),
          Box::new(|_| {}),
        )
        .unwrap();
    }

    manager.dispatch_multicast_publication("provider1/event", Ok(vec![9]));

    for listener in &listeners {
      assert_eq!(listener.received.lock().unwrap().len(), 1);
    }
    manager.shutdown();
  }

  #[test]
  fn wildcard_multicast_subscription_matches_concrete_published_partitions() {
    let router = Arc::new(FakeMessageRouter::new());
    let manager = SubscriptionManager::new(router, 1);
    let listener = Arc::new(RecordingListener::new());
    let qos = SubscriptionQosBuilder::new().build_multicast();
    manager
      .register_multicast_subscription(
        "sub1",
        "event",
        "consumer1",
        "provider1",
        &["+".to_owned()],
        listener.clone(),
        qos,
        Box::new(|| {}),
        Box::new(|_| {}),
      )
      .unwrap();

    manager.dispatch_multicast_publication("provider1/event/east", Ok(vec![1]));
    manager.dispatch_multicast_publication("provider1/event/west", Ok(vec![2]));

    assert_eq!(listener.received.lock().unwrap().len(), 2);
    manager.shutdown();
  }

  #[test]
  fn unregister_removes_multicast_receiver_when_last_subscriber_leaves() {
    let (tx, rx) = mpsc::channel();
    struct TrackingRouter {
      tx: Mutex<mpsc::Sender<()>>,
    }
    impl MessageRouter for TrackingRouter {
      fn route(&self, _message: crate::model::Message) -> Result<(), crate::error::RoutingError> {
        Ok(())
      }
      fn add_multicast_receiver(
        &self,
        _multicast_id: &str,
        _subscriber_id: &str,
        _provider_id: &str,
        on_success: crate::collaborators::BoxSuccessFn,
        _on_error: crate::collaborators::BoxErrorFn,
      ) {
        on_success();
      }
      fn remove_multicast_receiver(
        &self,
        _multicast_id: &str,
        _subscriber_id: &str,
        _provider_id: &str,
        on_success: crate::collaborators::BoxSuccessFn,
        _on_error: crate::collaborators::BoxErrorFn,
      ) {
        self.tx.lock().unwrap().send(()).unwrap();
        on_success();
      }
    }

    let router = Arc::new(TrackingRouter { tx: Mutex::new(tx) });
    let manager = SubscriptionManager::new(router, 1);
    let listener = Arc::new(RecordingListener::new());
    let qos = SubscriptionQosBuilder::new().build_multicast();
    manager
      .register_multicast_subscription(
        "sub1", "event", "consumer1", "provider1", &[], listener, qos,
        Box::new(|| {}), Box::new(|_| {}),
      )
      .unwrap();

    manager.unregister_subscription("sub1");
    rx.recv_timeout(Duration::from_secs(1)).expect("router should have been asked to remove the receiver");
    manager.shutdown();
  }
}
