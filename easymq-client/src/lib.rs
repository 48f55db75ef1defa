//! Client library of the easymq protocol.
//!
//! The entry point is [`Session`], a connection to the server which
//! multiplexes a single [`Channel`]. The channel declares queues, publishes
//! messages and registers consumer callbacks; [`Channel::wait`] runs the
//! dispatch loop which feeds deliveries to the callbacks one at a time, in
//! arrival order.
//!
//! Usage
//! ```no_run
//! use easymq_client::*;
//!
//! async fn hello() -> Result<()> {
//!     let mut session = Session::open(ConnectionParams::default()).await?;
//!     let mut channel = session.channel().await?;
//!
//!     channel.queue_declare("main", Durable(true)).await?;
//!     channel.publish("Hello world!".into(), "main").await?;
//!
//!     channel
//!         .consume("main", None, |message: Message| -> ConsumerResult {
//!             println!("{:?}", message.body());
//!             Ok(ConsumerAction::Cancel)
//!         })
//!         .await?;
//!
//!     channel.wait().await?;
//!
//!     session.close().await?;
//!
//!     Ok(())
//! }
//! ```
mod dev;
pub use dev::setup_logger;

mod channel;
pub use channel::{Channel, Durable, WaitHandle};

mod config;
pub use config::ConnectionParams;

mod consumer;
pub use consumer::{Consumer, ConsumerAction, ConsumerResult};

mod error;
pub use error::{CallbackError, ConnectionError, Error, PublishError, Result};

mod message;
pub use message::Message;

mod processor;

mod session;
pub use session::{Session, SessionState};

mod state;

use easymq_codec::frame;

/// Wire channel number
pub type ChannelNumber = frame::Channel;
/// Identifier the server assigns to each delivery on a channel
pub type DeliveryTag = frame::DeliveryTag;
