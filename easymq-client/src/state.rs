//! `state` module represents the client state machine which handles incoming
//! commands (from the client api side) and incoming wire frames from the
//! network/server side.
//!
//! Everything which comes from the server or goes to the server is a wire
//! `Frame`; everything which talks to the client api is a typed struct or a
//! signal on the delivery stream.

use crate::config::ConnectionParams;
use crate::error::{ConnectionError, Error, Result};
use crate::message::Message;
use easymq_codec::frame::{self, Frame};
use log::debug;
use tokio::sync::{mpsc, oneshot};

/// Frame size the client offers during tuning.
pub(crate) const FRAME_MAX: u32 = 131_072;

#[derive(Debug)]
enum Phase {
    Uninitialized,
    Started,
    Open,
    Closing,
}

/// The limits agreed during the handshake.
#[derive(Debug)]
pub(crate) struct Negotiated {
    pub(crate) frame_max: u32,
}

/// A signal routed from the socket loop to the dispatch loop.
#[derive(Debug)]
pub(crate) enum DeliverySignal {
    Delivered { consumer_tag: String, message: Message },
    ChannelClosed { code: u16, reason: String },
    ConnectionClosed { code: u16, reason: String },
}

pub(crate) struct ClientState {
    phase: Phase,
    params: ConnectionParams,
    frame_max: u32,
    /// Channel for sending out frames to the server.
    outgoing: mpsc::Sender<Frame>,
    /// Notified when the connection opening process finishes, with the
    /// negotiated limits or the handshake failure.
    connected: Option<oneshot::Sender<Result<Negotiated>>>,
    /// Signal stream consumed by the dispatch loop.
    deliveries: mpsc::UnboundedSender<DeliverySignal>,
}

impl std::fmt::Debug for ClientState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ClientState {{ phase={:?}, vhost={}, frame_max={} }}",
            &self.phase, &self.params.virtual_host, self.frame_max
        )
    }
}

pub(crate) fn new(outgoing: mpsc::Sender<Frame>, deliveries: mpsc::UnboundedSender<DeliverySignal>) -> ClientState {
    ClientState {
        phase: Phase::Uninitialized,
        params: ConnectionParams::default(),
        frame_max: FRAME_MAX,
        outgoing,
        connected: None,
        deliveries,
    }
}

impl ClientState {
    /// Starts the handshake by sending the protocol header. The rest of the
    /// handshake is driven by the incoming `Connection.Start` and
    /// `Connection.Tune` frames; `connected` is notified at the end.
    pub(crate) async fn start(
        &mut self,
        params: ConnectionParams,
        connected: oneshot::Sender<Result<Negotiated>>,
    ) -> Result<()> {
        self.params = params;
        self.connected = Some(connected);

        self.send_out(Frame::Header).await
    }

    pub(crate) async fn connection_start(&mut self, args: frame::ConnectionStartArgs) -> Result<()> {
        let supported = frame::ConnectionStartArgs::default();

        if args.version_major != supported.version_major || args.version_minor != supported.version_minor {
            self.fail_connect(Error::Connection(ConnectionError::Handshake {
                code: frame::CHANNEL_ERROR,
                reason: format!(
                    "protocol version mismatch, server speaks {}.{}",
                    args.version_major, args.version_minor
                ),
            }));

            return Ok(());
        }

        self.phase = Phase::Started;

        let start_ok = frame::ConnectionStartOkArgs::new(&self.params.username, &self.params.password)
            .virtual_host(&self.params.virtual_host)
            .frame();

        self.send_out(start_ok).await
    }

    pub(crate) async fn connection_tune(&mut self, args: frame::ConnectionTuneArgs) -> Result<()> {
        self.frame_max = args.frame_max.min(FRAME_MAX);

        self.send_out(
            frame::ConnectionTuneOkArgs {
                frame_max: self.frame_max,
            }
            .frame(),
        )
        .await?;

        self.phase = Phase::Open;

        if let Some(connected) = self.connected.take() {
            let _ = connected.send(Ok(Negotiated {
                frame_max: self.frame_max,
            }));
        }

        Ok(())
    }

    /// Sent by the client.
    pub(crate) async fn connection_close(&mut self, args: frame::CloseArgs) -> Result<()> {
        self.phase = Phase::Closing;

        self.send_out(frame::connection_close(args.code, &args.text)).await
    }

    pub(crate) async fn connection_close_ok(&mut self) -> Result<()> {
        let _ = self.deliveries.send(DeliverySignal::ConnectionClosed {
            code: frame::REPLY_SUCCESS,
            reason: "Normal close".to_string(),
        });

        Ok(())
    }

    /// The server is closing the connection, either a handshake rejection or
    /// an unrecoverable error.
    pub(crate) async fn handle_connection_close(&mut self, args: frame::CloseArgs) -> Result<()> {
        self.fail_connect(Error::Connection(ConnectionError::Handshake {
            code: args.code,
            reason: args.text.clone(),
        }));

        let _ = self.deliveries.send(DeliverySignal::ConnectionClosed {
            code: args.code,
            reason: args.text,
        });

        self.send_out(frame::connection_close_ok()).await
    }

    pub(crate) async fn channel_open(&mut self, channel: frame::Channel) -> Result<()> {
        self.send_out(frame::channel_open(channel)).await
    }

    pub(crate) async fn channel_open_ok(&mut self, _channel: frame::Channel) -> Result<()> {
        Ok(())
    }

    pub(crate) async fn channel_close(&mut self, channel: frame::Channel, args: frame::CloseArgs) -> Result<()> {
        self.send_out(frame::channel_close(channel, args.code, &args.text)).await
    }

    pub(crate) async fn channel_close_ok(&mut self, _channel: frame::Channel) -> Result<()> {
        let _ = self.deliveries.send(DeliverySignal::ChannelClosed {
            code: frame::REPLY_SUCCESS,
            reason: "Normal close".to_string(),
        });

        Ok(())
    }

    /// The server closed the channel because of an exception.
    pub(crate) async fn handle_channel_close(&mut self, channel: frame::Channel, args: frame::CloseArgs) -> Result<()> {
        let _ = self.deliveries.send(DeliverySignal::ChannelClosed {
            code: args.code,
            reason: args.text,
        });

        self.send_out(frame::channel_close_ok(channel)).await
    }

    pub(crate) async fn queue_declare(&mut self, channel: frame::Channel, args: frame::QueueDeclareArgs) -> Result<()> {
        self.send_out(args.frame(channel)).await
    }

    pub(crate) async fn queue_declare_ok(&mut self, _args: frame::QueueDeclareOkArgs) -> Result<()> {
        Ok(())
    }

    pub(crate) async fn basic_consume(&mut self, channel: frame::Channel, args: frame::BasicConsumeArgs) -> Result<()> {
        self.send_out(args.frame(channel)).await
    }

    pub(crate) async fn basic_consume_ok(&mut self, _args: frame::BasicConsumeOkArgs) -> Result<()> {
        Ok(())
    }

    pub(crate) async fn basic_cancel(&mut self, channel: frame::Channel, args: frame::BasicCancelArgs) -> Result<()> {
        self.send_out(args.frame(channel)).await
    }

    pub(crate) async fn basic_cancel_ok(&mut self, _args: frame::BasicCancelOkArgs) -> Result<()> {
        Ok(())
    }

    pub(crate) async fn basic_publish(&mut self, channel: frame::Channel, args: frame::BasicPublishArgs) -> Result<()> {
        self.send_out(args.frame(channel)).await
    }

    pub(crate) async fn basic_publish_ok(&mut self) -> Result<()> {
        Ok(())
    }

    pub(crate) async fn basic_deliver(&mut self, _channel: frame::Channel, args: frame::BasicDeliverArgs) -> Result<()> {
        let message = Message::delivered(args.body, args.routing_key, args.delivery_tag);

        if self
            .deliveries
            .send(DeliverySignal::Delivered {
                consumer_tag: args.consumer_tag,
                message,
            })
            .is_err()
        {
            debug!("Dropping delivery, the dispatch stream is gone");
        }

        Ok(())
    }

    async fn send_out(&self, frame: Frame) -> Result<()> {
        self.outgoing.send(frame).await.map_err(|_| Error::connection_lost())
    }

    fn fail_connect(&mut self, error: Error) {
        if let Some(connected) = self.connected.take() {
            let _ = connected.send(Err(error));
        }
    }
}
