use crate::channel::Channel;
use crate::config::ConnectionParams;
use crate::error::{ConnectionError, Error, Result};
use crate::processor::{self, Param, Request, RequestSink};
use crate::state::{DeliverySignal, Negotiated};
use easymq_codec::frame;
use log::error;
use std::fmt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

/// The channel number of the one channel a session multiplexes.
const SINGLE_CHANNEL: frame::Channel = 1;

/// Lifecycle state of a [`Session`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SessionState {
    Closed,
    Connecting,
    Open,
    Closing,
    Failed,
}

/// A connection to a server.
///
/// A session owns the transport for its whole lifetime and multiplexes
/// exactly one [`Channel`]. All operations on the session and its channel
/// fail with a state error once the session is no longer open.
///
/// The transport is released on every exit path: on [`Session::close`], on
/// an unrecoverable transport failure, and when the session is dropped
/// without closing (the socket task exits as soon as the last request
/// handle is gone).
///
/// ```no_run
/// use easymq_client::{ConnectionParams, Session};
///
/// async fn publish() -> easymq_client::Result<()> {
///     let mut session = Session::open(ConnectionParams::default()).await?;
///     let mut channel = session.channel().await?;
///
///     channel.queue_declare("main", easymq_client::Durable(true)).await?;
///     channel.publish("Hello world!".into(), "main").await?;
///
///     session.close().await?;
///
///     Ok(())
/// }
/// ```
pub struct Session {
    state: SessionState,
    request_sink: Option<RequestSink>,
    frame_max: usize,
    deliveries: Option<mpsc::UnboundedReceiver<DeliverySignal>>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Session {{ state={:?}, frame_max={} }}", self.state, self.frame_max)
    }
}

impl Session {
    /// Connects to the server and performs the handshake. The optional
    /// timeout of the parameters is one deadline covering both the TCP
    /// connect and the handshake.
    pub async fn open(params: ConnectionParams) -> Result<Session> {
        params.validate()?;

        let deadline = params.timeout.map(|timeout| Instant::now() + timeout);
        let connecting = TcpStream::connect(params.address());

        let socket = match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, connecting)
                .await
                .map_err(|_| Error::Connection(ConnectionError::Timeout))?,
            None => connecting.await,
        }
        .map_err(|e| Error::Connection(ConnectionError::Network(e.to_string())))?;

        Session::handshake(params, socket, deadline).await
    }

    /// Opens a session over an already established byte stream. This is the
    /// seam where another transport can be substituted for TCP, tests run
    /// the same session over an in-memory duplex stream.
    pub async fn open_with<S>(params: ConnectionParams, io: S) -> Result<Session>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        params.validate()?;

        let deadline = params.timeout.map(|timeout| Instant::now() + timeout);

        Session::handshake(params, io, deadline).await
    }

    async fn handshake<S>(params: ConnectionParams, io: S, deadline: Option<Instant>) -> Result<Session>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (request_sink, request_stream) = mpsc::channel(1);
        let (delivery_sink, delivery_stream) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            if let Err(e) = processor::socket_loop(io, request_stream, delivery_sink).await {
                error!("Error {:?}", e);
            }
        });

        let (connected_tx, connected_rx) = oneshot::channel();

        request_sink
            .send(Request {
                param: Param::Start(params, connected_tx),
                response: None,
            })
            .await
            .map_err(|_| Error::connection_lost())?;

        let negotiating = async {
            match connected_rx.await {
                Ok(result) => result,
                Err(_) => Err(Error::connection_lost()),
            }
        };

        let Negotiated { frame_max } = match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, negotiating)
                .await
                .map_err(|_| Error::Connection(ConnectionError::Timeout))??,
            None => negotiating.await?,
        };

        Ok(Session {
            state: SessionState::Open,
            request_sink: Some(request_sink),
            frame_max: frame_max as usize,
            deliveries: Some(delivery_stream),
        })
    }

    /// Lifecycle state of the session. Once the socket task is gone without
    /// an orderly close, an open session reports `Failed`.
    pub fn state(&self) -> SessionState {
        match &self.request_sink {
            Some(sink) if self.state == SessionState::Open && sink.is_closed() => SessionState::Failed,
            _ => self.state,
        }
    }

    /// Opens the single channel of the session lazily and hands it out.
    ///
    /// A session multiplexes at most one live channel; a second call fails
    /// with a state error while the first one is outstanding.
    pub async fn channel(&mut self) -> Result<Channel> {
        let state = self.state();

        if state != SessionState::Open {
            return Err(Error::State(format!("session is {:?}", state)));
        }

        let sink = match &self.request_sink {
            Some(sink) => sink.clone(),
            None => return Err(Error::State("session is closed".to_string())),
        };

        let deliveries = match self.deliveries.take() {
            Some(deliveries) => deliveries,
            None => return Err(Error::State("channel is already open".to_string())),
        };

        if let Err(e) = processor::call(&sink, frame::channel_open(SINGLE_CHANNEL)).await {
            self.deliveries = Some(deliveries);

            if let Error::Connection(_) = e {
                self.state = SessionState::Failed;
            }

            return Err(e);
        }

        Ok(Channel::new(SINGLE_CHANNEL, sink, self.frame_max, deliveries))
    }

    /// Closes the session and releases the transport. Calling it twice is a
    /// no-op.
    pub async fn close(&mut self) -> Result<()> {
        if self.state == SessionState::Closed {
            return Ok(());
        }

        self.state = SessionState::Closing;

        let result = match self.request_sink.take() {
            Some(sink) => processor::call(&sink, frame::connection_close(frame::REPLY_SUCCESS, "Normal close")).await,
            None => Ok(()),
        };

        // The request sink is gone at this point, so the socket loop winds
        // down and closes the stream whatever the close call returned.
        self.state = SessionState::Closed;

        result
    }
}
