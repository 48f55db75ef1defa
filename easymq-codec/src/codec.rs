use crate::frame::*;
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

const FRAME_METHOD_FRAME: u8 = 0x01;
const FRAME_VERSION_HEADER: u8 = 0x45;
const FRAME_SEPARATOR: u8 = 0xCE;

/// The protocol header is the literal preamble, `b"EMQ\x00"` followed by the
/// protocol version the client supports.
pub const PROTOCOL_HEADER: [u8; 8] = [0x45, 0x4D, 0x51, 0x00, 0x00, 0x00, 0x00, 0x01];

/// EasyMQ frame encoder and decoder.
pub struct FrameCodec {}

impl Encoder<Frame> for FrameCodec {
    type Error = std::io::Error;

    fn encode(&mut self, event: Frame, buf: &mut BytesMut) -> Result<(), Self::Error> {
        match event {
            Frame::Header => {
                buf.put(&PROTOCOL_HEADER[..]);
            }
            Frame::Method(channel, class_method, args) => {
                let mut payload = BytesMut::with_capacity(4096);
                payload.put_u32(class_method);
                encode_method_frame_args(&mut payload, args)?;

                buf.put_u8(FRAME_METHOD_FRAME);
                buf.put_u16(channel);
                buf.put_u32(payload.len() as u32);
                buf.put(payload);
                buf.put_u8(FRAME_SEPARATOR);
            }
        }

        Ok(())
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < 7 || !is_full_frame(src) {
            return Ok(None);
        }

        match src.get_u8() {
            FRAME_METHOD_FRAME => {
                let channel = src.get_u16();
                let frame_len = src.get_u32() as usize;

                let mut frame_buf = src.split_to(frame_len);
                let frame = decode_method_frame(&mut frame_buf, channel)?;

                let _frame_separator = src.get_u8();

                Ok(Some(frame))
            }
            FRAME_VERSION_HEADER => {
                let mut head = [0u8; 7];
                src.copy_to_slice(&mut head);

                if head[..3] != PROTOCOL_HEADER[1..4] {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        "Bad protocol header",
                    ));
                }

                Ok(Some(Frame::Header))
            }
            f => Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Unknown frame {}", f),
            )),
        }
    }
}

/// Check if the buffer contains the full frame. We can do that easily since
/// the method frame header contains the length information.
fn is_full_frame(src: &BytesMut) -> bool {
    match src[0] {
        FRAME_VERSION_HEADER => src.len() >= 8,
        _ => {
            let mut bs = [0u8; 4];
            bs.copy_from_slice(&src[3..7]);

            let len = u32::from_be_bytes(bs) as usize;

            src.len() >= len + 8
        }
    }
}

fn decode_method_frame(src: &mut BytesMut, channel: u16) -> Result<Frame, std::io::Error> {
    let class_method = src.get_u32();

    let args = match class_method {
        CONNECTION_START => MethodFrameArgs::ConnectionStart(ConnectionStartArgs {
            version_major: src.get_u8(),
            version_minor: src.get_u8(),
        }),
        CONNECTION_START_OK => MethodFrameArgs::ConnectionStartOk(ConnectionStartOkArgs {
            virtual_host: get_short_string(src),
            username: get_short_string(src),
            password: get_short_string(src),
        }),
        CONNECTION_TUNE => MethodFrameArgs::ConnectionTune(ConnectionTuneArgs {
            frame_max: src.get_u32(),
        }),
        CONNECTION_TUNE_OK => MethodFrameArgs::ConnectionTuneOk(ConnectionTuneOkArgs {
            frame_max: src.get_u32(),
        }),
        CONNECTION_CLOSE => MethodFrameArgs::ConnectionClose(decode_close_args(src)),
        CONNECTION_CLOSE_OK => MethodFrameArgs::ConnectionCloseOk,
        CHANNEL_OPEN => MethodFrameArgs::ChannelOpen,
        CHANNEL_OPEN_OK => MethodFrameArgs::ChannelOpenOk,
        CHANNEL_CLOSE => MethodFrameArgs::ChannelClose(decode_close_args(src)),
        CHANNEL_CLOSE_OK => MethodFrameArgs::ChannelCloseOk,
        QUEUE_DECLARE => MethodFrameArgs::QueueDeclare(QueueDeclareArgs {
            queue_name: get_short_string(src),
            flags: QueueDeclareFlags::from_bits_truncate(src.get_u8()),
        }),
        QUEUE_DECLARE_OK => MethodFrameArgs::QueueDeclareOk(QueueDeclareOkArgs {
            queue_name: get_short_string(src),
        }),
        BASIC_CONSUME => MethodFrameArgs::BasicConsume(BasicConsumeArgs {
            queue_name: get_short_string(src),
            consumer_tag: get_short_string(src),
        }),
        BASIC_CONSUME_OK => MethodFrameArgs::BasicConsumeOk(BasicConsumeOkArgs {
            consumer_tag: get_short_string(src),
        }),
        BASIC_CANCEL => MethodFrameArgs::BasicCancel(BasicCancelArgs {
            consumer_tag: get_short_string(src),
        }),
        BASIC_CANCEL_OK => MethodFrameArgs::BasicCancelOk(BasicCancelOkArgs {
            consumer_tag: get_short_string(src),
        }),
        BASIC_PUBLISH => MethodFrameArgs::BasicPublish(BasicPublishArgs {
            routing_key: get_short_string(src),
            body: get_body(src),
        }),
        BASIC_PUBLISH_OK => MethodFrameArgs::BasicPublishOk,
        BASIC_DELIVER => MethodFrameArgs::BasicDeliver(BasicDeliverArgs {
            consumer_tag: get_short_string(src),
            delivery_tag: src.get_u64(),
            routing_key: get_short_string(src),
            body: get_body(src),
        }),
        cm => {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Unknown class method {:08X}", cm),
            ))
        }
    };

    Ok(Frame::Method(channel, class_method, args))
}

fn decode_close_args(src: &mut BytesMut) -> CloseArgs {
    CloseArgs {
        code: src.get_u16(),
        text: get_short_string(src),
    }
}

fn encode_method_frame_args(buf: &mut BytesMut, args: MethodFrameArgs) -> Result<(), std::io::Error> {
    match args {
        MethodFrameArgs::ConnectionStart(args) => {
            buf.put_u8(args.version_major);
            buf.put_u8(args.version_minor);
        }
        MethodFrameArgs::ConnectionStartOk(args) => {
            put_short_string(buf, &args.virtual_host)?;
            put_short_string(buf, &args.username)?;
            put_short_string(buf, &args.password)?;
        }
        MethodFrameArgs::ConnectionTune(args) => buf.put_u32(args.frame_max),
        MethodFrameArgs::ConnectionTuneOk(args) => buf.put_u32(args.frame_max),
        MethodFrameArgs::ConnectionClose(args) | MethodFrameArgs::ChannelClose(args) => {
            buf.put_u16(args.code);
            put_short_string(buf, &args.text)?;
        }
        MethodFrameArgs::QueueDeclare(args) => {
            put_short_string(buf, &args.queue_name)?;
            buf.put_u8(args.flags.bits());
        }
        MethodFrameArgs::QueueDeclareOk(args) => put_short_string(buf, &args.queue_name)?,
        MethodFrameArgs::BasicConsume(args) => {
            put_short_string(buf, &args.queue_name)?;
            put_short_string(buf, &args.consumer_tag)?;
        }
        MethodFrameArgs::BasicConsumeOk(args) => put_short_string(buf, &args.consumer_tag)?,
        MethodFrameArgs::BasicCancel(args) => put_short_string(buf, &args.consumer_tag)?,
        MethodFrameArgs::BasicCancelOk(args) => put_short_string(buf, &args.consumer_tag)?,
        MethodFrameArgs::BasicPublish(args) => {
            put_short_string(buf, &args.routing_key)?;
            put_body(buf, &args.body);
        }
        MethodFrameArgs::BasicDeliver(args) => {
            put_short_string(buf, &args.consumer_tag)?;
            buf.put_u64(args.delivery_tag);
            put_short_string(buf, &args.routing_key)?;
            put_body(buf, &args.body);
        }
        MethodFrameArgs::ConnectionCloseOk
        | MethodFrameArgs::ChannelOpen
        | MethodFrameArgs::ChannelOpenOk
        | MethodFrameArgs::ChannelCloseOk
        | MethodFrameArgs::BasicPublishOk => (),
    }

    Ok(())
}

fn get_short_string(src: &mut BytesMut) -> String {
    let len = src.get_u8() as usize;
    let bytes = src.split_to(len);

    String::from_utf8_lossy(&bytes).to_string()
}

fn put_short_string(buf: &mut BytesMut, s: &str) -> Result<(), std::io::Error> {
    if s.len() > SHORT_STRING_MAX {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("String of {} bytes does not fit a short string", s.len()),
        ));
    }

    buf.put_u8(s.len() as u8);
    buf.put(s.as_bytes());

    Ok(())
}

fn get_body(src: &mut BytesMut) -> Vec<u8> {
    let len = src.get_u32() as usize;
    let bytes = src.split_to(len);

    bytes.to_vec()
}

fn put_body(buf: &mut BytesMut, body: &[u8]) {
    buf.put_u32(body.len() as u32);
    buf.put(body);
}
