use crate::consumer::{Consumer, ConsumerAction, ConsumerRegistry};
use crate::error::{ConnectionError, Error, PublishError, Result};
use crate::message::Message;
use crate::processor::{self, RequestSink};
use crate::state::DeliverySignal;
use easymq_codec::frame;
use log::debug;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;

/// Specify if a declared queue survives a server restart.
pub struct Durable(pub bool);

/// Outcome of processing one delivery signal in the dispatch loop.
enum Flow {
    Continue,
    Stop,
}

/// Cloneable handle for stopping a running dispatch loop from the outside,
/// typically on process shutdown. The loop completes the callback currently
/// executing and returns normally.
#[derive(Clone)]
pub struct WaitHandle {
    stop: mpsc::UnboundedSender<()>,
}

impl WaitHandle {
    pub fn stop(&self) {
        let _ = self.stop.send(());
    }
}

/// The one channel of a session.
///
/// The channel tracks the queues declared on it and the consumers
/// registered on it, and runs the dispatch loop which feeds delivered
/// messages to the consumer callbacks.
pub struct Channel {
    number: frame::Channel,
    sink: RequestSink,
    frame_max: usize,
    open: bool,
    /// Declared queues with their durability.
    queues: HashMap<String, bool>,
    consumers: ConsumerRegistry,
    deliveries: mpsc::UnboundedReceiver<DeliverySignal>,
    stop_tx: mpsc::UnboundedSender<()>,
    stop_rx: mpsc::UnboundedReceiver<()>,
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Channel {{ number={}, open={}, consumers={:?} }}",
            self.number,
            self.open,
            self.consumers.tags()
        )
    }
}

impl Channel {
    pub(crate) fn new(
        number: frame::Channel,
        sink: RequestSink,
        frame_max: usize,
        deliveries: mpsc::UnboundedReceiver<DeliverySignal>,
    ) -> Channel {
        let (stop_tx, stop_rx) = mpsc::unbounded_channel();

        Channel {
            number,
            sink,
            frame_max,
            open: true,
            queues: HashMap::new(),
            consumers: ConsumerRegistry::default(),
            deliveries,
            stop_tx,
            stop_rx,
        }
    }

    /// Declares a queue. Re-declaring with the same durability is a no-op;
    /// re-declaring with a conflicting durability fails.
    pub async fn queue_declare(&mut self, queue_name: &str, durable: Durable) -> Result<()> {
        self.ensure_open()?;

        if queue_name.len() > frame::SHORT_STRING_MAX {
            return Err(Error::Declare(format!(
                "queue name of {} bytes exceeds the {} byte limit",
                queue_name.len(),
                frame::SHORT_STRING_MAX
            )));
        }

        match self.queues.get(queue_name) {
            Some(&declared) if declared == durable.0 => return Ok(()),
            Some(_) => {
                return Err(Error::Declare(format!(
                    "queue {:?} is already declared with conflicting durability",
                    queue_name
                )))
            }
            None => (),
        }

        let declare = frame::QueueDeclareArgs::default()
            .queue_name(queue_name)
            .durable(durable.0)
            .frame(self.number);

        processor::call(&self.sink, declare).await?;

        self.queues.insert(queue_name.to_string(), durable.0);

        Ok(())
    }

    /// Publishes a message directly to a declared queue (default exchange
    /// routing). Bodies exceeding the negotiated frame size are rejected,
    /// not chunked.
    pub async fn publish(&mut self, message: Message, queue_name: &str) -> Result<()> {
        self.ensure_open()?;

        if !self.queues.contains_key(queue_name) {
            return Err(Error::Declare(format!("queue {:?} is not declared", queue_name)));
        }

        let body = message.into_body();

        if body.len() > self.frame_max {
            return Err(Error::Publish(PublishError::TooLarge {
                size: body.len(),
                frame_max: self.frame_max,
            }));
        }

        let publish = frame::BasicPublishArgs::default()
            .routing_key(queue_name)
            .body(body)
            .frame(self.number);

        processor::call(&self.sink, publish).await
    }

    /// Registers a consumer callback on a queue, declaring the queue as a
    /// durable one when it was not declared yet. Returns the consumer tag,
    /// generated when not supplied.
    pub async fn consume<C>(&mut self, queue_name: &str, consumer_tag: Option<&str>, handler: C) -> Result<String>
    where
        C: Consumer + 'static,
    {
        self.ensure_open()?;

        let tag = match consumer_tag {
            Some(tag) => tag.to_string(),
            None => format!("emq-ctag-{}", rand::random::<u64>()),
        };

        if tag.len() > frame::SHORT_STRING_MAX {
            return Err(Error::Declare(format!(
                "consumer tag of {} bytes exceeds the {} byte limit",
                tag.len(),
                frame::SHORT_STRING_MAX
            )));
        }

        if self.consumers.contains(&tag) {
            return Err(Error::ConsumerConflict(tag));
        }

        if !self.queues.contains_key(queue_name) {
            self.queue_declare(queue_name, Durable(true)).await?;
        }

        let consume = frame::BasicConsumeArgs::default()
            .queue_name(queue_name)
            .consumer_tag(&tag)
            .frame(self.number);

        processor::call(&self.sink, consume).await?;

        self.consumers.register(&tag, queue_name, Box::new(handler))?;

        Ok(tag)
    }

    /// Cancels a consumer. Deliveries already in flight for this tag are
    /// dropped silently by the dispatch loop.
    pub async fn cancel(&mut self, consumer_tag: &str) -> Result<()> {
        self.ensure_open()?;

        if !self.consumers.contains(consumer_tag) {
            return Err(Error::NotFound(consumer_tag.to_string()));
        }

        processor::call(&self.sink, frame::BasicCancelArgs::new(consumer_tag).frame(self.number)).await?;

        let entry = self.consumers.remove(consumer_tag)?;

        debug!("Canceled consumer {} on queue {}", consumer_tag, entry.queue_name);

        Ok(())
    }

    /// Handle for stopping a running [`Channel::wait`] from another task.
    pub fn stop_handle(&self) -> WaitHandle {
        WaitHandle {
            stop: self.stop_tx.clone(),
        }
    }

    /// Runs the dispatch loop until no active consumer remains or the loop
    /// is stopped via a [`WaitHandle`].
    ///
    /// Deliveries are dispatched strictly in the order they arrive, one
    /// callback at a time, run to completion before the next frame is
    /// processed. A delivery whose consumer was canceled while the frame
    /// was in flight is dropped silently, that is the benign race between
    /// cancel and deliver. A failing callback aborts the loop immediately
    /// and the failure is returned to the caller; no further frames are
    /// processed.
    pub async fn wait(&mut self) -> Result<()> {
        loop {
            if !self.consumers.has_active() {
                return Ok(());
            }

            let signal = tokio::select! {
                biased;
                _ = self.stop_rx.recv() => return Ok(()),
                signal = self.deliveries.recv() => signal,
            };

            if let Flow::Stop = self.on_signal(signal).await? {
                return Ok(());
            }
        }
    }

    /// Same as [`Channel::wait`] but returns normally once the deadline
    /// expires, having dispatched whatever completed before it.
    pub async fn wait_with_timeout(&mut self, timeout: Duration) -> Result<()> {
        let sleep = tokio::time::sleep(timeout);
        tokio::pin!(sleep);

        loop {
            if !self.consumers.has_active() {
                return Ok(());
            }

            let signal = tokio::select! {
                biased;
                _ = self.stop_rx.recv() => return Ok(()),
                _ = &mut sleep => return Ok(()),
                signal = self.deliveries.recv() => signal,
            };

            if let Flow::Stop = self.on_signal(signal).await? {
                return Ok(());
            }
        }
    }

    /// Cancels all active consumers and releases the channel handle.
    pub async fn close(&mut self) -> Result<()> {
        if !self.open {
            return Ok(());
        }

        for tag in self.consumers.tags() {
            processor::call(&self.sink, frame::BasicCancelArgs::new(&tag).frame(self.number)).await?;
            self.consumers.remove(&tag)?;
        }

        processor::call(
            &self.sink,
            frame::channel_close(self.number, frame::REPLY_SUCCESS, "Normal close"),
        )
        .await?;

        self.open = false;

        Ok(())
    }

    async fn on_signal(&mut self, signal: Option<DeliverySignal>) -> Result<Flow> {
        match signal {
            Some(DeliverySignal::Delivered { consumer_tag, message }) => {
                match self.consumers.dispatch(&consumer_tag, message) {
                    Some(Ok(ConsumerAction::Continue)) => Ok(Flow::Continue),
                    Some(Ok(ConsumerAction::Cancel)) => {
                        self.cancel(&consumer_tag).await?;

                        Ok(Flow::Continue)
                    }
                    Some(Err(e)) => Err(Error::Callback(e)),
                    None => {
                        // Cancel raced with a delivery already on the wire.
                        debug!("Dropping delivery for canceled consumer {}", consumer_tag);

                        Ok(Flow::Continue)
                    }
                }
            }
            Some(DeliverySignal::ChannelClosed { code, reason }) => {
                self.open = false;

                closed_flow(code, reason)
            }
            Some(DeliverySignal::ConnectionClosed { code, reason }) => {
                self.open = false;

                closed_flow(code, reason)
            }
            None => Err(Error::connection_lost()),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(Error::State("channel is closed".to_string()))
        }
    }
}

fn closed_flow(code: u16, reason: String) -> Result<Flow> {
    if code == frame::REPLY_SUCCESS {
        Ok(Flow::Stop)
    } else {
        Err(Error::Connection(ConnectionError::Closed { code, reason }))
    }
}
