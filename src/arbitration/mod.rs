//! Provider discovery & arbitration. `Arc<Inner>` gives every worker
//! thread shared ownership of the arbitrator's state, `AtomicBool` flags
//! replace what would otherwise be plain bools mutated only from a
//! single worker thread, and the pending-future slot is guarded by a
//! plain `Mutex`.

mod strategy;

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::collaborators::DiscoveryAsync;
use crate::concurrent::{Future, Semaphore};
use crate::error::MiddlewareError;
use crate::model::{ArbitrationResult, ArbitrationStrategy, DiscoveryEntryWithMetaInfo, DiscoveryQos, SystemDiscoveryQos, Version};

enum PendingFuture {
  Participant(Future<DiscoveryEntryWithMetaInfo>),
  Domains(Future<Vec<DiscoveryEntryWithMetaInfo>>),
}

impl PendingFuture {
  fn cancel(&self, error: MiddlewareError) {
    match self {
      PendingFuture::Participant(f) => f.cancel(error),
      PendingFuture::Domains(f) => f.cancel(error),
    }
  }
}

type OnSuccess = Box<dyn FnOnce(ArbitrationResult) + Send>;
type OnError = Box<dyn FnOnce(MiddlewareError) + Send>;

struct Inner {
  domains: Vec<String>,
  interface_name: String,
  interface_version: Version,
  discovery_proxy: Weak<dyn DiscoveryAsync>,
  discovery_qos: DiscoveryQos,
  system_discovery_qos: SystemDiscoveryQos,
  gbids: Vec<String>,

  pending_future: Mutex<Option<PendingFuture>>,
  discovered_incompatible_versions: Mutex<BTreeSet<Version>>,
  arbitration_error: Mutex<Option<MiddlewareError>>,
  semaphore: Semaphore,

  arbitration_running: AtomicBool,
  arbitration_stopped: AtomicBool,
  arbitration_finished: AtomicBool,
  arbitration_failed_forever: AtomicBool,
  filter_by_version_and_strategy: AtomicBool,

  start_time: Mutex<Option<Instant>>,
  callbacks: Mutex<Option<(OnSuccess, OnError)>>,
  callback_fired: Mutex<bool>,
}

/// Resolves `(domain, interfaceName)` or a fixed participant id to a
/// policy-selected, version-compatible provider, retrying until
/// `discovery_timeout_ms` elapses.
pub struct Arbitrator {
  inner: Arc<Inner>,
  thread: Mutex<Option<JoinHandle<()>>>,
}

impl Arbitrator {
  /// Fails synchronously with `InvalidArgument` if `discovery_qos`
  /// requires a custom parameter its strategy needs (`"keyword"` for
  /// `Keyword`, `"fixedParticipantId"` for `FixedParticipant`) and it is
  /// missing.
  pub fn new(
    domains: Vec<String>,
    interface_name: String,
    interface_version: Version,
    discovery_proxy: Weak<dyn DiscoveryAsync>,
    discovery_qos: DiscoveryQos,
    gbids: Vec<String>,
  ) -> Result<Self, MiddlewareError> {
    strategy::validate_strategy_construction(discovery_qos.arbitration_strategy, &discovery_qos.custom_parameters)
      .map_err(MiddlewareError::InvalidArgument)?;

    let system_discovery_qos = SystemDiscoveryQos::from(&discovery_qos);

    Ok(Arbitrator {
      inner: Arc::new(Inner {
        domains,
        interface_name,
        interface_version,
        discovery_proxy,
        discovery_qos,
        system_discovery_qos,
        gbids,
        pending_future: Mutex::new(None),
        discovered_incompatible_versions: Mutex::new(BTreeSet::new()),
        arbitration_error: Mutex::new(None),
        semaphore: Semaphore::new(0),
        arbitration_running: AtomicBool::new(false),
        arbitration_stopped: AtomicBool::new(false),
        arbitration_finished: AtomicBool::new(false),
        arbitration_failed_forever: AtomicBool::new(false),
        filter_by_version_and_strategy: AtomicBool::new(true),
        start_time: Mutex::new(None),
        callbacks: Mutex::new(None),
        callback_fired: Mutex::new(false),
      }),
      thread: Mutex::new(None),
    })
  }

  /// Starts (or no-ops with a logged error if already running) the
  /// retry/timeout loop on a dedicated worker thread.
  pub fn start(
    &self,
    on_success: impl FnOnce(ArbitrationResult) + Send + 'static,
    on_error: impl FnOnce(MiddlewareError) + Send + 'static,
  ) {
    self.start_filtered(on_success, on_error, true);
  }

  /// As `start`, but `filter_by_version_and_strategy = false` skips the
  /// version filter and strategy selection, returning every entry found
  /// (used by callers building a proxy without pre-selecting a single
  /// provider, e.g. a guided proxy builder).
  pub fn start_filtered(
    &self,
    on_success: impl FnOnce(ArbitrationResult) + Send + 'static,
    on_error: impl FnOnce(MiddlewareError) + Send + 'static,
    filter_by_version_and_strategy: bool,
  ) {
    if self.inner.arbitration_running.swap(true, Ordering::SeqCst) {
      error!(
        "Arbitration already running for domain = [{}], interface = {}, GBIDs = >{}<. A second arbitration will not be started.",
        self.inner.domains.join(", "),
        self.inner.interface_name,
        self.inner.gbids.join(", ")
      );
      self.inner.arbitration_running.store(true, Ordering::SeqCst);
      return;
    }

    info!(
      "Arbitration started for domain = [{}], interface = {}, GBIDs = >{}<, version = {}.",
      self.inner.domains.join(", "),
      self.inner.interface_name,
      self.inner.gbids.join(", "),
      self.inner.interface_version
    );

    *self.inner.start_time.lock().expect("arbitrator mutex poisoned") = Some(Instant::now());
    self.inner.arbitration_stopped.store(false, Ordering::SeqCst);
    self.inner.arbitration_finished.store(false, Ordering::SeqCst);
    self.inner.arbitration_failed_forever.store(false, Ordering::SeqCst);
    self
      .inner
      .filter_by_version_and_strategy
      .store(filter_by_version_and_strategy, Ordering::SeqCst);
    *self.inner.callbacks.lock().expect("arbitrator mutex poisoned") =
      Some((Box::new(on_success), Box::new(on_error)));

    let inner = self.inner.clone();
    let handle = std::thread::spawn(move || run(inner));
    *self.thread.lock().expect("arbitrator mutex poisoned") = Some(handle);
  }

  /// Stops arbitration: cancels any pending discovery call, wakes the
  /// retry-interval wait, and joins the worker thread. Idempotent.
  pub fn stop(&self) {
    debug!(
      "StopArbitrator for domain: [{}], interface: {}, GBIDs = >{}<",
      self.inner.domains.join(", "),
      self.inner.interface_name,
      self.inner.gbids.join(", ")
    );
    {
      let pending = self.inner.pending_future.lock().expect("arbitrator mutex poisoned");
      self.inner.arbitration_stopped.store(true, Ordering::SeqCst);
      if let Some(future) = pending.as_ref() {
        future.cancel(MiddlewareError::shutdown_in_progress(&self.inner.interface_name));
      }
    }
    self.inner.semaphore.notify();

    if let Some(handle) = self.thread.lock().expect("arbitrator mutex poisoned").take() {
      let _ = handle.join();
    }
  }
}

impl Drop for Arbitrator {
  fn drop(&mut self) {
    self.stop();
  }
}

fn fire_once(inner: &Inner, outcome: Result<ArbitrationResult, MiddlewareError>) {
  let mut fired = inner.callback_fired.lock().expect("arbitrator mutex poisoned");
  if *fired {
    return;
  }
  *fired = true;
  if let Some((on_success, on_error)) = inner.callbacks.lock().expect("arbitrator mutex poisoned").take() {
    match outcome {
      Ok(result) => on_success(result),
      Err(error) => on_error(error),
    }
  }
}

fn run(inner: Arc<Inner>) {
  trace!(
    "Entering arbitration thread for domain: [{}], interface: {}, GBIDs = >{}<",
    inner.domains.join(", "),
    inner.interface_name,
    inner.gbids.join(", ")
  );

  while !inner.arbitration_stopped.load(Ordering::SeqCst) {
    attempt_arbitration(&inner);

    if inner.arbitration_finished.load(Ordering::SeqCst) {
      return;
    }
    if inner.arbitration_stopped.load(Ordering::SeqCst) {
      break;
    }

    let duration_ms = duration_ms(&inner);
    let timeout_ms = inner.discovery_qos.discovery_timeout_ms;
    if timeout_ms <= duration_ms {
      break;
    } else if inner.arbitration_failed_forever.load(Ordering::SeqCst) {
      break;
    } else if timeout_ms - duration_ms <= inner.discovery_qos.retry_interval_ms {
      break;
    } else {
      trace!("Rescheduling arbitration with delay {}ms", inner.discovery_qos.retry_interval_ms);
      inner
        .semaphore
        .wait_for(Duration::from_millis(inner.discovery_qos.retry_interval_ms.max(0) as u64));
    }
  }

  if inner.arbitration_stopped.load(Ordering::SeqCst) {
    fire_once(&inner, Err(MiddlewareError::shutdown_in_progress(&inner.interface_name)));
  } else if inner.discovered_incompatible_versions.lock().expect("arbitrator mutex poisoned").is_empty() {
    let error = inner
      .arbitration_error
      .lock()
      .expect("arbitrator mutex poisoned")
      .clone()
      .unwrap_or_else(MiddlewareError::arbitration_timeout);
    fire_once(&inner, Err(error));
  } else {
    let versions = inner.discovered_incompatible_versions.lock().expect("arbitrator mutex poisoned").clone();
    fire_once(&inner, Err(MiddlewareError::NoCompatibleProvider(versions)));
  }

  inner.arbitration_running.store(false, Ordering::SeqCst);
  debug!(
    "Exiting arbitration thread for domain: [{}], interface: {}, GBIDs = >{}<",
    inner.domains.join(", "),
    inner.interface_name,
    inner.gbids.join(", ")
  );
}

fn duration_ms(inner: &Inner) -> i64 {
  let start = inner.start_time.lock().expect("arbitrator mutex poisoned");
  match *start {
    Some(start) => start.elapsed().as_millis() as i64,
    None => 0,
  }
}

fn attempt_arbitration(inner: &Arc<Inner>) {
  let is_fixed_participant = inner.discovery_qos.arbitration_strategy == ArbitrationStrategy::FixedParticipant;
  let fixed_participant_id = if is_fixed_participant {
    inner.discovery_qos.custom_parameter("fixedParticipantId").unwrap_or("").to_owned()
  } else {
    String::new()
  };

  debug!(
    "DISCOVERY lookup for domain: [{}], interface: {}, GBIDs = >{}<",
    inner.domains.join(", "),
    inner.interface_name,
    inner.gbids.join(", ")
  );

  let discovery_proxy = match inner.discovery_proxy.upgrade() {
    Some(proxy) => proxy,
    None => {
      *inner.arbitration_error.lock().expect("arbitrator mutex poisoned") =
        Some(MiddlewareError::InternalError("discoveryProxy not available".to_owned()));
      error!("discoveryProxy not available, continuing.");
      return;
    }
  };

  let wait_time_ms = inner.discovery_qos.discovery_timeout_ms - duration_ms(inner);
  if wait_time_ms <= 0 {
    // No attempt is made at all; leave `arbitration_error` untouched so the
    // terminal error defaults to `Timeout` per the boundary behaviour for
    // `discoveryTimeoutMs <= 0`.
    return;
  }
  let wait_time = Duration::from_millis(wait_time_ms as u64);

  let result = if is_fixed_participant {
    let future = discovery_proxy.lookup_participant(&fixed_participant_id, &inner.system_discovery_qos, &inner.gbids);
    {
      let mut pending = inner.pending_future.lock().expect("arbitrator mutex poisoned");
      if inner.arbitration_stopped.load(Ordering::SeqCst) {
        return;
      }
      *pending = Some(PendingFuture::Participant(future.clone()));
    }
    let outcome = future.get_with_timeout(wait_time);
    *inner.pending_future.lock().expect("arbitrator mutex poisoned") = None;
    outcome.and_then(|entry| {
      if inner.filter_by_version_and_strategy.load(Ordering::SeqCst) && entry.entry.interface_name != inner.interface_name {
        inner.arbitration_failed_forever.store(true, Ordering::SeqCst);
        return Err(MiddlewareError::DiscoveryFailed(format!(
          "incompatible interface returned, expected: {} actual: {}",
          inner.interface_name, entry.entry.interface_name
        )));
      }
      Ok(vec![entry])
    })
  } else {
    let future = discovery_proxy.lookup_domains(&inner.domains, &inner.interface_name, &inner.system_discovery_qos, &inner.gbids);
    {
      let mut pending = inner.pending_future.lock().expect("arbitrator mutex poisoned");
      if inner.arbitration_stopped.load(Ordering::SeqCst) {
        return;
      }
      *pending = Some(PendingFuture::Domains(future.clone()));
    }
    let outcome = future.get_with_timeout(wait_time);
    *inner.pending_future.lock().expect("arbitrator mutex poisoned") = None;
    outcome
  };

  match result {
    Ok(entries) => receive_capabilities_lookup_results(inner, entries),
    Err(error) => classify_error(inner, error, is_fixed_participant, &fixed_participant_id),
  }
}

fn classify_error(inner: &Inner, error: MiddlewareError, is_fixed_participant: bool, fixed_participant_id: &str) {
  let target = if is_fixed_participant {
    format!("participantId: {fixed_participant_id}")
  } else {
    format!("domain: [{}], interface: {}", inner.domains.join(", "), inner.interface_name)
  };
  let prefix = format!("Unable to lookup provider ({target}). ");

  match error {
    MiddlewareError::Discovery(discovery_error) => {
      use crate::error::DiscoveryError::*;
      let message = format!("{prefix}DiscoveryError: {discovery_error}");
      match discovery_error {
        NoEntryForParticipant | NoEntryForSelectedBackends => {
          inner.discovered_incompatible_versions.lock().expect("arbitrator mutex poisoned").clear();
          info!("{message}, continuing.");
        }
        UnknownGbid | InvalidGbid | InternalError => {
          inner.discovered_incompatible_versions.lock().expect("arbitrator mutex poisoned").clear();
          error!("{message}, giving up.");
          inner.arbitration_failed_forever.store(true, Ordering::SeqCst);
        }
      }
      *inner.arbitration_error.lock().expect("arbitrator mutex poisoned") = Some(MiddlewareError::DiscoveryFailed(message));
    }
    other => {
      let message = format!("{prefix}{other}");
      if inner.arbitration_failed_forever.load(Ordering::SeqCst) {
        error!("{message}, giving up.");
      } else {
        error!("{message}, continuing.");
      }
      *inner.arbitration_error.lock().expect("arbitrator mutex poisoned") = Some(MiddlewareError::DiscoveryFailed(message));
    }
  }
}

fn receive_capabilities_lookup_results(inner: &Inner, discovery_entries: Vec<DiscoveryEntryWithMetaInfo>) {
  inner.discovered_incompatible_versions.lock().expect("arbitrator mutex poisoned").clear();

  if discovery_entries.is_empty() {
    let message = format!(
      "No entries found for domain: [{}], interface: {}",
      inner.domains.join(", "),
      inner.interface_name
    );
    *inner.arbitration_error.lock().expect("arbitrator mutex poisoned") = Some(MiddlewareError::DiscoveryFailed(message));
    return;
  }

  let filtered = filter_by_support_on_change(inner, discovery_entries);
  if filtered.is_empty() {
    let message = "There was more than one entries in capabilitiesEntries, but none supported on change subscriptions.".to_owned();
    warn!("{message}");
    *inner.arbitration_error.lock().expect("arbitrator mutex poisoned") = Some(MiddlewareError::DiscoveryFailed(message));
    return;
  }

  let selected = if inner.filter_by_version_and_strategy.load(Ordering::SeqCst) {
    let by_version = filter_by_version(inner, filtered);
    if by_version.is_empty() {
      let message = "There was more than one entries in capabilitiesEntries, but none was compatible.".to_owned();
      warn!("{message}");
      *inner.arbitration_error.lock().expect("arbitrator mutex poisoned") = Some(MiddlewareError::DiscoveryFailed(message));
      return;
    }
    match strategy::select(inner.discovery_qos.arbitration_strategy, &inner.discovery_qos.custom_parameters, &by_version) {
      Some(entry) => vec![entry],
      None => {
        let message = "no compatible provider found".to_owned();
        warn!("{message}");
        *inner.arbitration_error.lock().expect("arbitrator mutex poisoned") = Some(MiddlewareError::DiscoveryFailed(message));
        Vec::new()
      }
    }
  } else {
    filtered
  };

  if !selected.is_empty() {
    fire_once(inner, Ok(ArbitrationResult::new(selected)));
    inner.arbitration_finished.store(true, Ordering::SeqCst);
  }
}

fn filter_by_support_on_change(inner: &Inner, entries: Vec<DiscoveryEntryWithMetaInfo>) -> Vec<DiscoveryEntryWithMetaInfo> {
  if !inner.discovery_qos.provider_must_support_on_change {
    return entries;
  }
  entries
    .into_iter()
    .filter(|entry| entry.provider_qos().supports_on_change_subscriptions)
    .collect()
}

fn filter_by_version(inner: &Inner, entries: Vec<DiscoveryEntryWithMetaInfo>) -> Vec<DiscoveryEntryWithMetaInfo> {
  let mut filtered = Vec::new();
  for entry in entries {
    let provider_version = entry.provider_version();
    if provider_version.is_compatible_with(inner.interface_version) {
      filtered.push(entry);
    } else {
      trace!(
        "Skipping capabilitiesEntry with incompatible version, expected: {}",
        inner.interface_version
      );
      inner.discovered_incompatible_versions.lock().expect("arbitrator mutex poisoned").insert(provider_version);
    }
  }
  filtered
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::collaborators::fakes::FakeDiscovery;
  use crate::model::{DiscoveryEntry, DiscoveryQosBuilder, ProviderQos, ProviderScope};
  use std::sync::mpsc;

  fn entry(participant_id: &str, priority: i64, version: Version, is_local: bool) -> DiscoveryEntryWithMetaInfo {
    DiscoveryEntryWithMetaInfo {
      entry: DiscoveryEntry {
        version,
        domain: "domain".to_owned(),
        interface_name: "iface".to_owned(),
        participant_id: participant_id.to_owned(),
        provider_qos: ProviderQos {
          custom_parameters: Vec::new(),
          priority,
          scope: ProviderScope::Global,
          supports_on_change_subscriptions: true,
        },
        last_seen_ms: 0,
        expiry_date_ms: -1,
        public_key_id: String::new(),
      },
      is_local,
    }
  }

  #[test]
  fn picks_highest_priority_among_compatible_entries() {
    let discovery = Arc::new(FakeDiscovery::new());
    discovery.push_domain_response(Ok(vec![
      entry("low", 1, Version::new(1, 0), false),
      entry("high", 9, Version::new(1, 0), false),
    ]));

    let qos = DiscoveryQosBuilder::new().with_discovery_timeout_ms(500).build();
    let arbitrator = Arbitrator::new(
      vec!["domain".to_owned()],
      "iface".to_owned(),
      Version::new(1, 0),
      Arc::downgrade(&(discovery.clone() as Arc<dyn DiscoveryAsync>)),
      qos,
      vec!["gbid1".to_owned()],
    )
    .unwrap();

    let (tx, rx) = mpsc::channel();
    arbitrator.start(
      move |result| tx.send(Ok(result)).unwrap(),
      move |_err| {},
    );
    let result = rx.recv_timeout(Duration::from_secs(2)).expect("arbitration should finish").unwrap();
    assert_eq!(result.primary().participant_id(), "high");
  }

  #[test]
  fn version_mismatch_yields_no_compatible_provider_with_exact_versions() {
    let discovery = Arc::new(FakeDiscovery::new());
    discovery.push_domain_response(Ok(vec![
      entry("old", 0, Version::new(1, 0), false),
      entry("newer-major", 0, Version::new(2, 0), false),
    ]));

    let qos = DiscoveryQosBuilder::new().with_discovery_timeout_ms(200).with_retry_interval_ms(500).build();
    let arbitrator = Arbitrator::new(
      vec!["domain".to_owned()],
      "iface".to_owned(),
      Version::new(1, 5),
      Arc::downgrade(&(discovery.clone() as Arc<dyn DiscoveryAsync>)),
      qos,
      Vec::new(),
    )
    .unwrap();

    let (tx, rx) = mpsc::channel();
    arbitrator.start(move |_result| {}, move |err| tx.send(err).unwrap());
    let error = rx.recv_timeout(Duration::from_secs(2)).expect("arbitration should finish");
    match error {
      MiddlewareError::NoCompatibleProvider(versions) => {
        assert!(versions.contains(&Version::new(1, 0)));
        assert!(versions.contains(&Version::new(2, 0)));
      }
      other => panic!("expected NoCompatibleProvider, got {other:?}"),
    }
  }

  #[test]
  fn stop_cancels_in_flight_arbitration_with_shutdown_message() {
    let discovery = Arc::new(FakeDiscovery::new());
    // No responses pushed: the fake will error every call, forcing continuous retries.
    let qos = DiscoveryQosBuilder::new().with_discovery_timeout_ms(60_000).with_retry_interval_ms(50).build();
    let arbitrator = Arc::new(
      Arbitrator::new(
        vec!["domain".to_owned()],
        "iface".to_owned(),
        Version::new(1, 0),
        Arc::downgrade(&(discovery.clone() as Arc<dyn DiscoveryAsync>)),
        qos,
        Vec::new(),
      )
      .unwrap(),
    );

    let (tx, rx) = mpsc::channel();
    arbitrator.start(move |_result| {}, move |err| tx.send(err).unwrap());
    std::thread::sleep(Duration::from_millis(30));
    arbitrator.stop();

    let error = rx.recv_timeout(Duration::from_secs(2)).expect("arbitration should report shutdown");
    match error {
      MiddlewareError::ShutdownInProgress(message) => {
        assert!(message.contains("Shutting Down Arbitration for interface iface"));
      }
      other => panic!("expected ShutdownInProgress, got {other:?}"),
    }
  }

  #[test]
  fn non_positive_discovery_timeout_fails_immediately_with_timeout_and_no_query() {
    let discovery = Arc::new(FakeDiscovery::new());
    let qos = DiscoveryQosBuilder::new().with_discovery_timeout_ms(0).with_retry_interval_ms(1_000).build();
    let arbitrator = Arbitrator::new(
      vec!["domain".to_owned()],
      "iface".to_owned(),
      Version::new(1, 0),
      Arc::downgrade(&(discovery.clone() as Arc<dyn DiscoveryAsync>)),
      qos,
      Vec::new(),
    )
    .unwrap();

    let (tx, rx) = mpsc::channel();
    arbitrator.start(move |_result| {}, move |err| tx.send(err).unwrap());
    let error = rx.recv_timeout(Duration::from_secs(2)).expect("arbitration should finish");
    assert!(matches!(error, MiddlewareError::Timeout(_)), "expected Timeout, got {error:?}");
    assert_eq!(discovery.domain_call_count(), 0, "no discovery lookup should have been issued");
  }

  #[test]
  fn fixed_participant_strategy_looks_up_by_participant_id_and_bypasses_selection() {
    let discovery = Arc::new(FakeDiscovery::new());
    discovery.push_participant_response(Ok(entry("fixed-1", 0, Version::new(1, 0), false)));

    let qos = DiscoveryQosBuilder::new()
      .with_discovery_timeout_ms(500)
      .with_arbitration_strategy(ArbitrationStrategy::FixedParticipant)
      .with_custom_parameter("fixedParticipantId", "fixed-1")
      .build();
    let arbitrator = Arbitrator::new(
      vec!["domain".to_owned()],
      "iface".to_owned(),
      Version::new(1, 0),
      Arc::downgrade(&(discovery.clone() as Arc<dyn DiscoveryAsync>)),
      qos,
      Vec::new(),
    )
    .unwrap();

    let (tx, rx) = mpsc::channel();
    arbitrator.start(move |result| tx.send(Ok(result)).unwrap(), move |_err| {});
    let result = rx.recv_timeout(Duration::from_secs(2)).expect("arbitration should finish").unwrap();
    assert_eq!(result.primary().participant_id(), "fixed-1");
  }

  #[test]
  fn fixed_participant_with_mismatched_interface_fails_forever() {
    let mut mismatched = entry("fixed-1", 0, Version::new(1, 0), false);
    mismatched.entry.interface_name = "otherInterface".to_owned();
    let discovery = Arc::new(FakeDiscovery::new());
    discovery.push_participant_response(Ok(mismatched));

    let qos = DiscoveryQosBuilder::new()
      .with_discovery_timeout_ms(5_000)
      .with_retry_interval_ms(50)
      .with_arbitration_strategy(ArbitrationStrategy::FixedParticipant)
      .with_custom_parameter("fixedParticipantId", "fixed-1")
      .build();
    let arbitrator = Arbitrator::new(
      vec!["domain".to_owned()],
      "iface".to_owned(),
      Version::new(1, 0),
      Arc::downgrade(&(discovery.clone() as Arc<dyn DiscoveryAsync>)),
      qos,
      Vec::new(),
    )
    .unwrap();

    let (tx, rx) = mpsc::channel();
    arbitrator.start(move |_result| {}, move |err| tx.send(err).unwrap());
    let error = rx.recv_timeout(Duration::from_secs(2)).expect("arbitration should finish");
    assert!(matches!(error, MiddlewareError::DiscoveryFailed(_)), "expected DiscoveryFailed, got {error:?}");
    assert_eq!(discovery.domain_call_count(), 0);
  }
}
