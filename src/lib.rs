//! `meshlink` is the hard engineering core of a service-oriented
//! communication middleware: the part that resolves a domain+interface
//! (or a fixed participant id) to a provider, tracks subscription
//! lifecycles, and correlates inbound replies/publications to the right
//! waiting caller.
//!
//! What this crate does *not* do: it never touches the wire. Transport
//! I/O, the on-wire envelope encoding, the generated per-interface
//! proxy/stub code, and access-control enforcement are all external
//! collaborators whose contracts are defined in [`collaborators`]. A
//! host application wires a concrete [`collaborators::DiscoveryAsync`]
//! and [`collaborators::MessageRouter`] implementation into an
//! [`arbitration::Arbitrator`], a [`subscription::SubscriptionManager`],
//! and a [`dispatch::Dispatcher`] to get a working consumer-side proxy
//! runtime.
//!
//! # Layering
//!
//! - [`concurrent`] — the blocking-concurrency primitives
//!   ([`concurrent::Semaphore`], [`concurrent::Future`],
//!   [`concurrent::DelayedScheduler`]) everything else is built from.
//! - [`model`] — the data model: discovery entries, QoS, subscription
//!   QoS, and the in-process message envelope shape.
//! - [`error`] — the unified error taxonomy every blocking/callback API
//!   surfaces.
//! - [`collaborators`] — the narrow traits through which this crate
//!   talks to the discovery directory, the message router, and
//!   application-supplied subscription listeners.
//! - [`arbitration`] — provider discovery and arbitration: the
//!   retry/timeout loop that turns a domain+interface into a single
//!   selected [`model::DiscoveryEntryWithMetaInfo`].
//! - [`subscription`] — client-side subscription lifecycle: missed-
//!   publication detection, multicast fan-out, and router coordination.
//! - [`dispatch`] — correlates inbound messages by kind and id to the
//!   right future, subscription, or request interpreter.

pub mod arbitration;
pub mod collaborators;
pub mod concurrent;
pub mod dispatch;
pub mod error;
pub mod model;
pub mod subscription;

pub use arbitration::Arbitrator;
pub use dispatch::Dispatcher;
pub use error::MiddlewareError;
pub use subscription::SubscriptionManager;
