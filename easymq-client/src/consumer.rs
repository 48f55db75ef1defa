use crate::error::{CallbackError, Error, Result};
use crate::message::Message;
use std::collections::HashMap;
use std::fmt;

/// What the dispatch loop should do with the subscription after a delivery
/// was handled.
#[derive(Debug, PartialEq)]
pub enum ConsumerAction {
    /// Keep the subscription and wait for the next delivery.
    Continue,
    /// Cancel this consumer. The dispatch loop sends the cancel on behalf of
    /// the handler and returns normally once no consumer remains.
    Cancel,
}

pub type ConsumerResult = std::result::Result<ConsumerAction, CallbackError>;

/// Handler of delivered messages.
///
/// `on_message` runs on the dispatch loop, one invocation at a time, in
/// delivery order. Returning an error aborts the loop and surfaces the
/// failure to the caller of [`crate::Channel::wait`].
pub trait Consumer: Send {
    fn on_message(&mut self, message: Message) -> ConsumerResult;
}

impl<F> Consumer for F
where
    F: FnMut(Message) -> ConsumerResult + Send,
{
    fn on_message(&mut self, message: Message) -> ConsumerResult {
        self(message)
    }
}

pub(crate) struct ConsumerEntry {
    pub(crate) queue_name: String,
    pub(crate) active: bool,
    handler: Box<dyn Consumer>,
}

impl fmt::Debug for ConsumerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConsumerEntry {{ queue_name={:?}, active={} }}", self.queue_name, self.active)
    }
}

/// Consumers of a channel by consumer tag.
#[derive(Default)]
pub(crate) struct ConsumerRegistry {
    consumers: HashMap<String, ConsumerEntry>,
}

impl ConsumerRegistry {
    pub(crate) fn register(&mut self, consumer_tag: &str, queue_name: &str, handler: Box<dyn Consumer>) -> Result<()> {
        if self.consumers.contains_key(consumer_tag) {
            return Err(Error::ConsumerConflict(consumer_tag.to_string()));
        }

        self.consumers.insert(
            consumer_tag.to_string(),
            ConsumerEntry {
                queue_name: queue_name.to_string(),
                active: true,
                handler,
            },
        );

        Ok(())
    }

    pub(crate) fn remove(&mut self, consumer_tag: &str) -> Result<ConsumerEntry> {
        self.consumers
            .remove(consumer_tag)
            .ok_or_else(|| Error::NotFound(consumer_tag.to_string()))
    }

    pub(crate) fn contains(&self, consumer_tag: &str) -> bool {
        self.consumers.contains_key(consumer_tag)
    }

    /// Invokes the handler of the given consumer. `None` means the tag is
    /// unknown or inactive, the delivery race documented on
    /// [`crate::Channel::wait`].
    pub(crate) fn dispatch(&mut self, consumer_tag: &str, message: Message) -> Option<ConsumerResult> {
        match self.consumers.get_mut(consumer_tag) {
            Some(entry) if entry.active => Some(entry.handler.on_message(message)),
            _ => None,
        }
    }

    pub(crate) fn has_active(&self) -> bool {
        self.consumers.values().any(|entry| entry.active)
    }

    pub(crate) fn tags(&self) -> Vec<String> {
        self.consumers.keys().cloned().collect()
    }
}
