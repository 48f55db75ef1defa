use easymq_codec::codec::FrameCodec;
use easymq_codec::frame::{self, Frame, MethodFrameArgs};
use futures::{SinkExt, StreamExt};
use std::collections::{HashMap, VecDeque};
use tokio::io::DuplexStream;
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;

pub struct BrokerConfig {
    pub username: String,
    pub password: String,
    pub frame_max: u32,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            username: "guest".to_string(),
            password: "guest".to_string(),
            frame_max: 131_072,
        }
    }
}

struct Queue {
    durable: bool,
    pending: VecDeque<Vec<u8>>,
    consumer_tag: Option<String>,
}

pub fn start() -> (DuplexStream, JoinHandle<()>) {
    start_with(BrokerConfig::default())
}

/// Spawns an in-memory server speaking the wire protocol over a duplex
/// stream, enough of one to drive the client through its whole lifecycle
/// without a network. The join handle completes when the server releases
/// the stream.
pub fn start_with(config: BrokerConfig) -> (DuplexStream, JoinHandle<()>) {
    let (client_io, server_io) = tokio::io::duplex(65_536);

    let handle = tokio::spawn(async move {
        serve(server_io, config).await;
    });

    (client_io, handle)
}

async fn serve(io: DuplexStream, config: BrokerConfig) {
    let mut framed = Framed::new(io, FrameCodec {});
    let mut queues: HashMap<String, Queue> = HashMap::new();
    let mut delivery_tag = 1u64;

    while let Some(Ok(frame)) = framed.next().await {
        match frame {
            Frame::Header => {
                send(&mut framed, frame::ConnectionStartArgs::default().frame()).await;
            }
            Frame::Method(ch, _, args) => match args {
                MethodFrameArgs::ConnectionStartOk(args) => {
                    if args.username == config.username && args.password == config.password {
                        send(
                            &mut framed,
                            frame::ConnectionTuneArgs {
                                frame_max: config.frame_max,
                            }
                            .frame(),
                        )
                        .await;
                    } else {
                        send(
                            &mut framed,
                            frame::connection_close(frame::ACCESS_REFUSED, "Access refused"),
                        )
                        .await;
                    }
                }
                MethodFrameArgs::ConnectionClose(_) => {
                    send(&mut framed, frame::connection_close_ok()).await;

                    break;
                }
                MethodFrameArgs::ConnectionCloseOk => break,
                MethodFrameArgs::ChannelOpen => {
                    send(&mut framed, frame::channel_open_ok(ch)).await;
                }
                MethodFrameArgs::ChannelClose(_) => {
                    send(&mut framed, frame::channel_close_ok(ch)).await;
                }
                MethodFrameArgs::QueueDeclare(args) => {
                    if args.queue_name.starts_with("reserved") {
                        send(
                            &mut framed,
                            frame::channel_close(ch, frame::PRECONDITION_FAILED, "Queue name is reserved"),
                        )
                        .await;

                        continue;
                    }

                    let durable = args.flags.contains(frame::QueueDeclareFlags::DURABLE);

                    match queues.get(&args.queue_name) {
                        Some(queue) if queue.durable != durable => {
                            send(
                                &mut framed,
                                frame::channel_close(ch, frame::PRECONDITION_FAILED, "Durability conflict"),
                            )
                            .await;

                            continue;
                        }
                        Some(_) => (),
                        None => {
                            queues.insert(
                                args.queue_name.clone(),
                                Queue {
                                    durable,
                                    pending: VecDeque::new(),
                                    consumer_tag: None,
                                },
                            );
                        }
                    }

                    send(
                        &mut framed,
                        frame::QueueDeclareOkArgs {
                            queue_name: args.queue_name,
                        }
                        .frame(ch),
                    )
                    .await;
                }
                MethodFrameArgs::BasicConsume(args) => {
                    send(&mut framed, frame::BasicConsumeOkArgs::new(&args.consumer_tag).frame(ch)).await;

                    let backlog = match queues.get_mut(&args.queue_name) {
                        Some(queue) => {
                            queue.consumer_tag = Some(args.consumer_tag.clone());

                            queue.pending.drain(..).collect()
                        }
                        None => vec![],
                    };

                    for body in backlog {
                        deliver(&mut framed, ch, &args.consumer_tag, &args.queue_name, body, &mut delivery_tag).await;
                    }
                }
                MethodFrameArgs::BasicCancel(args) => {
                    for queue in queues.values_mut() {
                        if queue.consumer_tag.as_deref() == Some(&args.consumer_tag) {
                            queue.consumer_tag = None;
                        }
                    }

                    send(&mut framed, frame::BasicCancelOkArgs::new(&args.consumer_tag).frame(ch)).await;
                }
                MethodFrameArgs::BasicPublish(args) => {
                    send(&mut framed, frame::basic_publish_ok(ch)).await;

                    let consumer = match queues.get_mut(&args.routing_key) {
                        Some(queue) => match &queue.consumer_tag {
                            Some(tag) => Some(tag.clone()),
                            None => {
                                queue.pending.push_back(args.body);

                                continue;
                            }
                        },
                        None => None,
                    };

                    if let Some(tag) = consumer {
                        deliver(&mut framed, ch, &tag, &args.routing_key, args.body, &mut delivery_tag).await;
                    }
                }
                _ => (),
            },
        }
    }
}

async fn deliver(
    framed: &mut Framed<DuplexStream, FrameCodec>,
    channel: frame::Channel,
    consumer_tag: &str,
    queue_name: &str,
    body: Vec<u8>,
    delivery_tag: &mut u64,
) {
    let args = frame::BasicDeliverArgs {
        consumer_tag: consumer_tag.to_string(),
        delivery_tag: *delivery_tag,
        routing_key: queue_name.to_string(),
        body,
    };

    *delivery_tag += 1;

    send(framed, args.frame(channel)).await;
}

async fn send(framed: &mut Framed<DuplexStream, FrameCodec>, frame: Frame) {
    framed.send(frame).await.unwrap();
}
