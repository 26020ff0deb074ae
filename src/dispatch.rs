//! Correlates inbound envelopes to pending `Future`s, active subscriptions,
//! and registered request interpreters.

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::collaborators::{MessageRouter, RequestInterpreter};
use crate::error::MiddlewareError;
use crate::model::{Message, MessagePayload, MessageType};
use crate::subscription::SubscriptionManager;

/// Callback target for a correlated `Reply`. One-shot:
/// the Dispatcher removes the entry from its table before invoking it.
pub trait ReplyCaller: Send + Sync {
  fn on_success(&self, response: Vec<u8>);
  fn on_error(&self, error: MiddlewareError);
}

struct ReplyCallerEntry {
  caller: Arc<dyn ReplyCaller>,
  expiry_date_ms: i64,
}

/// Per-inbound-dispatch context, set by the Dispatcher immediately before
/// invoking a provider callback for a `Request`/`OneWayRequest` and
/// cleared unconditionally on the way out, even on panic.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
  pub creator_user_id: Option<String>,
}

thread_local! {
  static CALL_CONTEXT: RefCell<Option<CallContext>> = const { RefCell::new(None) };
}

/// RAII guard that clears the thread-local `CallContext` on drop rather
/// than relying on manual cleanup at every exit path.
struct CallContextGuard;

impl CallContextGuard {
  fn enter(context: CallContext) -> Self {
    CALL_CONTEXT.with(|cell| *cell.borrow_mut() = Some(context));
    CallContextGuard
  }
}

impl Drop for CallContextGuard {
  fn drop(&mut self) {
    CALL_CONTEXT.with(|cell| *cell.borrow_mut() = None);
  }
}

/// Reads the `CallContext` active for the current inbound dispatch, if
/// any. Only meaningful when called from within a `RequestInterpreter`
/// invoked by `Dispatcher::receive`.
pub fn current_call_context() -> Option<CallContext> {
  CALL_CONTEXT.with(|cell| cell.borrow().clone())
}

type InterpreterKey = (String, u32);

/// Correlates inbound `Message`s to pending replies, the
/// `SubscriptionManager`, and registered `RequestInterpreter`s.
pub struct Dispatcher {
  reply_callers: std::sync::Mutex<HashMap<String, ReplyCallerEntry>>,
  interpreters: RwLock<HashMap<InterpreterKey, Arc<dyn RequestInterpreter>>>,
  subscription_manager: std::sync::Weak<SubscriptionManager>,
  message_router: std::sync::Weak<dyn MessageRouter>,
}

impl Dispatcher {
  pub fn new(subscription_manager: std::sync::Weak<SubscriptionManager>, message_router: std::sync::Weak<dyn MessageRouter>) -> Self {
    Dispatcher {
      reply_callers: std::sync::Mutex::new(HashMap::new()),
      interpreters: RwLock::new(HashMap::new()),
      subscription_manager,
      message_router,
    }
  }

  /// Registers `caller` to receive the `Reply` correlated by
  /// `request_reply_id`. `expiry_date_ms` bounds how long the entry
  /// survives `expire_stale_reply_callers`.
  pub fn add_reply_caller(&self, request_reply_id: &str, caller: Arc<dyn ReplyCaller>, expiry_date_ms: i64) {
    self.reply_callers.lock().expect("dispatcher mutex poisoned").insert(
      request_reply_id.to_owned(),
      ReplyCallerEntry { caller, expiry_date_ms },
    );
  }

  /// Removes a reply caller without invoking it (used when a caller
  /// gives up waiting before any reply arrives).
  pub fn remove_reply_caller(&self, request_reply_id: &str) {
    self.reply_callers.lock().expect("dispatcher mutex poisoned").remove(request_reply_id);
  }

  /// Registers a `RequestInterpreter` for `(interface_name, major_version)`.
  pub fn register_request_interpreter(&self, interpreter: Arc<dyn RequestInterpreter>) {
    self
      .interpreters
      .write()
      .expect("dispatcher mutex poisoned")
      .insert((interpreter.interface_name().to_owned(), interpreter.major_version()), interpreter);
  }

  pub fn unregister_request_interpreter(&self, interface_name: &str, major_version: u32) {
    self
      .interpreters
      .write()
      .expect("dispatcher mutex poisoned")
      .remove(&(interface_name.to_owned(), major_version));
  }

  /// Dispatches one inbound `Message` to whichever collaborator
  /// correlates with it: a pending reply caller, the
  /// `SubscriptionManager`, or a registered `RequestInterpreter`.
  pub fn receive(&self, message: Message) {
    match message.message_type {
      MessageType::Reply => self.handle_reply(message),
      MessageType::SubscriptionReply => self.handle_subscription_reply(message),
      MessageType::Publication => self.handle_publication(message),
      MessageType::MulticastPublication => self.handle_multicast_publication(message),
      MessageType::Request | MessageType::OneWayRequest => self.handle_request(message),
      MessageType::SubscriptionRequest
      | MessageType::MulticastSubscriptionRequest
      | MessageType::SubscriptionStop => {
        trace!("Dispatcher ignoring provider-side message type on the consumer path");
      }
    }
  }

  fn handle_reply(&self, message: Message) {
    let Some(request_reply_id) = message.request_reply_id else {
      error!("Reply message missing requestReplyId");
      return;
    };
    let entry = self.reply_callers.lock().expect("dispatcher mutex poisoned").remove(&request_reply_id);
    let Some(entry) = entry else {
      warn!("No reply caller registered for requestReplyId={request_reply_id}");
      return;
    };
    match message.payload {
      MessagePayload::Reply { response } => match response {
        Ok(bytes) => entry.caller.on_success(bytes),
        Err(error) => entry.caller.on_error(error),
      },
      other => error!("Reply message carried unexpected payload: {other:?}"),
    }
  }

  fn handle_subscription_reply(&self, message: Message) {
    if let MessagePayload::SubscriptionReply { subscription_id, error } = message.payload {
      if let Some(error) = error {
        warn!("Subscription request failed for id={subscription_id}: {error}");
      } else {
        trace!("Subscription request acknowledged for id={subscription_id}");
      }
    }
  }

  fn handle_publication(&self, message: Message) {
    let Some(manager) = self.subscription_manager.upgrade() else {
      warn!("Dropping publication: SubscriptionManager is gone");
      return;
    };
    if let MessagePayload::Publication(publication) = message.payload {
      manager.dispatch_publication(&publication.subscription_id, publication.response);
    }
  }

  fn handle_multicast_publication(&self, message: Message) {
    let Some(manager) = self.subscription_manager.upgrade() else {
      warn!("Dropping multicast publication: SubscriptionManager is gone");
      return;
    };
    if let MessagePayload::MulticastPublication { multicast_id, response } = message.payload {
      manager.dispatch_multicast_publication(&multicast_id, response);
    }
  }

  fn handle_request(&self, message: Message) {
    let is_one_way = message.message_type == MessageType::OneWayRequest;
    let MessagePayload::Request { method_name, params } = message.payload else {
      error!("Request message carried unexpected payload");
      return;
    };
    let interface_name = message.recipient_id.clone();
    let interpreter = self
      .interpreters
      .read()
      .expect("dispatcher mutex poisoned")
      .iter()
      .find(|((name, _), _)| *name == interface_name)
      .map(|(_, interpreter)| interpreter.clone());

    let Some(interpreter) = interpreter else {
      warn!("No RequestInterpreter registered for interface={interface_name}");
      return;
    };

    let outcome = {
      let _guard = CallContextGuard::enter(CallContext {
        creator_user_id: message.creator_user_id,
      });
      interpreter.invoke(&method_name, &params)
    };

    if is_one_way {
      return;
    }

    let Some(request_reply_id) = message.request_reply_id else {
      error!("Request message missing requestReplyId, cannot send Reply");
      return;
    };
    let Some(router) = self.message_router.upgrade() else {
      warn!("Dropping Reply for requestReplyId={request_reply_id}: MessageRouter is gone");
      return;
    };
    let reply = Message {
      message_type: MessageType::Reply,
      sender_id: message.recipient_id,
      recipient_id: message.sender_id,
      request_reply_id: Some(request_reply_id.clone()),
      expiry_date_ms: message.expiry_date_ms,
      creator_user_id: None,
      payload: MessagePayload::Reply { response: outcome },
    };
    if let Err(error) = router.route(reply) {
      error!("Failed to route Reply for requestReplyId={request_reply_id}: {error}");
    }
  }

  /// Drops reply callers whose `expiry_date_ms` has passed. Intended to
  /// be invoked periodically by the owning application.
  pub fn expire_stale_reply_callers(&self, now_ms: i64) {
    let mut callers = self.reply_callers.lock().expect("dispatcher mutex poisoned");
    let expired: Vec<String> = callers
      .iter()
      .filter(|(_, entry)| entry.expiry_date_ms != crate::model::NO_EXPIRY && entry.expiry_date_ms <= now_ms)
      .map(|(id, _)| id.clone())
      .collect();
    for id in &expired {
      if let Some(entry) = callers.remove(id) {
        debug!("Reply caller for requestReplyId={id} expired without a reply");
        entry.caller.on_error(MiddlewareError::arbitration_timeout());
      }
    }
  }
}
