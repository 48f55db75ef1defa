use crate::config::ConnectionParams;
use crate::error::{Error, Result};
use crate::state::{self, ClientState, DeliverySignal, Negotiated};
use easymq_codec::codec::FrameCodec;
use easymq_codec::frame::{self, Frame, MethodFrameArgs};
use futures::stream::{SplitSink, StreamExt};
use futures::SinkExt;
use log::{debug, error, trace};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::Framed;

pub(crate) type RequestSink = mpsc::Sender<Request>;

/// Response channel for passing errors to the client API.
pub(crate) type Response = oneshot::Sender<Result<()>>;

pub(crate) enum Param {
    /// Run the handshake; the oneshot is notified with the negotiated
    /// limits or the handshake failure.
    Start(ConnectionParams, oneshot::Sender<Result<Negotiated>>),
    /// Send a frame to the server.
    Frame(Frame),
}

/// Represents a client request, typically send a frame and wait for the
/// answer of the server.
pub(crate) struct Request {
    pub(crate) param: Param,
    pub(crate) response: Option<Response>,
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.param {
            Param::Start(params, _) => write!(f, "Request{{Start={{username={:?}}}}}", params.username),
            Param::Frame(frame) => write!(f, "Request{{Frame={:?}}}", frame),
        }
    }
}

/// The socket loop owns the transport stream for the whole session. It is
/// the only reader of the inbound stream; it multiplexes between frames
/// coming from the server and requests coming from the client API, and it
/// winds down, releasing the transport, when the request sink is dropped or
/// the server closes the stream.
pub(crate) async fn socket_loop<S>(
    io: S,
    mut requests: mpsc::Receiver<Request>,
    delivery_sink: mpsc::UnboundedSender<DeliverySignal>,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let (mut sink, mut stream) = Framed::new(io, FrameCodec {}).split();
    let (out_tx, mut out_rx) = mpsc::channel(1);
    let mut client = state::new(out_tx, delivery_sink);
    let feedback = Arc::new(Mutex::new(HashMap::<frame::Channel, Response>::new()));

    // I/O output port, handles outgoing frames sent via a channel.
    tokio::spawn(async move {
        if let Err(e) = handle_outgoing(&mut sink, &mut out_rx).await {
            error!("Error {:?}", e);
        }
    });

    loop {
        tokio::select! {
            // Receiving incoming frames. Here we can handle any IO error and
            // the closing of the input stream (server closes the stream).
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(frame)) => {
                        notify_waiter(&frame, &feedback);

                        if let Err(e) = handle_in_frame(frame, &mut client).await {
                            error!("Error {:?}", e);
                        }
                    }
                    Some(Err(e)) => {
                        error!("Error {:?}", e);

                        break;
                    }
                    None => {
                        break;
                    }
                }
            }
            req = requests.recv() => {
                match req {
                    Some(request) => {
                        debug!("Incoming client request {:?}", request);

                        if let Err(e) = handle_request(request, &mut client, &feedback).await {
                            error!("Error {:?}", e);
                        }
                    }
                    None => {
                        // All client handles are gone, release the transport.
                        break;
                    }
                }
            }
        }
    }

    // Unblock everyone still waiting for a response.
    for (_, fb) in feedback.lock().unwrap().drain() {
        let _ = fb.send(Err(Error::connection_lost()));
    }

    Ok(())
}

async fn handle_outgoing<S>(
    sink: &mut SplitSink<Framed<S, FrameCodec>, Frame>,
    outgoing: &mut mpsc::Receiver<Frame>,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    while let Some(f) = outgoing.recv().await {
        if let Err(e) = sink.send(f).await {
            error!("Error {:?}", e);
        }
    }

    Ok(())
}

async fn handle_request(
    request: Request,
    client: &mut ClientState,
    feedback: &Arc<Mutex<HashMap<frame::Channel, Response>>>,
) -> Result<()> {
    match request.param {
        Param::Start(params, connected) => {
            client.start(params, connected).await?;
        }
        Param::Frame(frame) => {
            let channel = frame_channel(&frame);

            handle_out_frame(frame, client).await?;
            register_waiter(feedback, channel, request.response);
        }
    }

    Ok(())
}

/// Unblock the client API call which is waiting for the response on this
/// channel. A `Connection.Close` coming from the server notifies all the
/// calls which wait on any channel (otherwise the client API would remain
/// blocked); a `Channel.Close` fails the one blocked on that channel; any
/// other method frame is the positive reply. Deliveries are not responses,
/// they never unblock a waiter.
fn notify_waiter(frame: &Frame, feedback: &Arc<Mutex<HashMap<frame::Channel, Response>>>) {
    trace!("Notify waiter by {:?}", frame);

    match frame {
        Frame::Method(_, frame::CONNECTION_CLOSE, MethodFrameArgs::ConnectionClose(args)) => {
            for (_, fb) in feedback.lock().unwrap().drain() {
                let _ = fb.send(Err(Error::from_close(args)));
            }
        }
        Frame::Method(channel, frame::CHANNEL_CLOSE, MethodFrameArgs::ChannelClose(args)) => {
            if let Some(fb) = feedback.lock().unwrap().remove(channel) {
                let _ = fb.send(Err(Error::from_close(args)));
            }
        }
        Frame::Method(_, frame::BASIC_DELIVER, _) => (),
        Frame::Method(channel, _, _) => {
            if let Some(fb) = feedback.lock().unwrap().remove(channel) {
                let _ = fb.send(Ok(()));
            }
        }
        Frame::Header => (),
    }
}

fn register_waiter(
    feedback: &Arc<Mutex<HashMap<frame::Channel, Response>>>,
    channel: Option<frame::Channel>,
    response_channel: Option<Response>,
) {
    trace!("Register waiter on channel {:?}", channel);

    if let Some(ch) = channel {
        if let Some(chan) = response_channel {
            feedback.lock().unwrap().insert(ch, chan);
        }
    }
}

fn frame_channel(f: &Frame) -> Option<frame::Channel> {
    match f {
        Frame::Header => Some(0),
        Frame::Method(channel, _, _) => Some(*channel),
    }
}

/// Handle frames coming from the server side.
async fn handle_in_frame(f: Frame, cs: &mut ClientState) -> Result<()> {
    use frame::MethodFrameArgs::*;

    debug!("Incoming frame {:?}", f);

    match f {
        Frame::Header => Ok(()),
        Frame::Method(ch, _, args) => match args {
            ConnectionStart(args) => cs.connection_start(args).await,
            ConnectionTune(args) => cs.connection_tune(args).await,
            ConnectionClose(args) => cs.handle_connection_close(args).await,
            ConnectionCloseOk => cs.connection_close_ok().await,
            ChannelOpenOk => cs.channel_open_ok(ch).await,
            ChannelClose(args) => cs.handle_channel_close(ch, args).await,
            ChannelCloseOk => cs.channel_close_ok(ch).await,
            QueueDeclareOk(args) => cs.queue_declare_ok(args).await,
            BasicConsumeOk(args) => cs.basic_consume_ok(args).await,
            BasicCancelOk(args) => cs.basic_cancel_ok(args).await,
            BasicPublishOk => cs.basic_publish_ok().await,
            BasicDeliver(args) => cs.basic_deliver(ch, args).await,
            args => unimplemented!("{:?}", args),
        },
    }
}

async fn handle_out_frame(f: Frame, cs: &mut ClientState) -> Result<()> {
    use frame::MethodFrameArgs::*;

    debug!("Outgoing frame {:?}", f);

    match f {
        Frame::Method(ch, _, args) => match args {
            ConnectionClose(args) => cs.connection_close(args).await,
            ChannelOpen => cs.channel_open(ch).await,
            ChannelClose(args) => cs.channel_close(ch, args).await,
            QueueDeclare(args) => cs.queue_declare(ch, args).await,
            BasicConsume(args) => cs.basic_consume(ch, args).await,
            BasicCancel(args) => cs.basic_cancel(ch, args).await,
            BasicPublish(args) => cs.basic_publish(ch, args).await,
            args => unreachable!("{:?}", args),
        },
        Frame::Header => unreachable!("Header is sent by the handshake"),
    }
}

/// Send a frame and wait until the server responds on the same channel.
pub(crate) async fn call(sink: &RequestSink, f: Frame) -> Result<()> {
    let (tx, rx) = oneshot::channel();

    sink.send(Request {
        param: Param::Frame(f),
        response: Some(tx),
    })
    .await
    .map_err(|_| Error::connection_lost())?;

    match rx.await {
        Ok(response) => response,
        Err(_) => Err(Error::connection_lost()),
    }
}
