pub const CONNECTION_START: u32 = 0x000A000A;
pub const CONNECTION_START_OK: u32 = 0x000A000B;
pub const CONNECTION_TUNE: u32 = 0x000A001E;
pub const CONNECTION_TUNE_OK: u32 = 0x000A001F;
pub const CONNECTION_CLOSE: u32 = 0x000A0032;
pub const CONNECTION_CLOSE_OK: u32 = 0x000A0033;

pub const CHANNEL_OPEN: u32 = 0x0014000A;
pub const CHANNEL_OPEN_OK: u32 = 0x0014000B;
pub const CHANNEL_CLOSE: u32 = 0x00140028;
pub const CHANNEL_CLOSE_OK: u32 = 0x00140029;

pub const QUEUE_DECLARE: u32 = 0x0032000A;
pub const QUEUE_DECLARE_OK: u32 = 0x0032000B;

pub const BASIC_CONSUME: u32 = 0x003C0014;
pub const BASIC_CONSUME_OK: u32 = 0x003C0015;
pub const BASIC_CANCEL: u32 = 0x003C001E;
pub const BASIC_CANCEL_OK: u32 = 0x003C001F;
pub const BASIC_PUBLISH: u32 = 0x003C0028;
pub const BASIC_PUBLISH_OK: u32 = 0x003C0029;
pub const BASIC_DELIVER: u32 = 0x003C003C;

/// Reply code of an orderly close.
pub const REPLY_SUCCESS: u16 = 200;
/// The peer refused a message because it exceeds the negotiated frame size.
pub const CONTENT_TOO_LARGE: u16 = 311;
/// Authentication or virtual host access failure.
pub const ACCESS_REFUSED: u16 = 403;
/// Queue or consumer cannot be found.
pub const NOT_FOUND: u16 = 404;
/// The request conflicts with the current state of the resource.
pub const PRECONDITION_FAILED: u16 = 406;
/// The peer referred to a non-existing or not-opened channel.
pub const CHANNEL_ERROR: u16 = 504;

pub type Channel = u16;
pub type ClassMethod = u32;
pub type DeliveryTag = u64;

/// Longest string a length-prefixed short string can carry on the wire.
pub const SHORT_STRING_MAX: usize = 255;

/// Represents an EasyMQ wire frame.
#[derive(PartialEq)]
pub enum Frame {
    /// Header is to be sent to the server at first, announcing the protocol
    /// version we support.
    Header,
    /// Represents the RPC frames. Connection based calls have a channel
    /// number 0, otherwise channel is the current channel on which the
    /// frames are sent. The RPC arguments are represented in
    /// `MethodFrameArgs`.
    Method(Channel, ClassMethod, MethodFrameArgs),
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Frame::Header => write!(f, "Header"),
            Frame::Method(ch, cm, args) => write!(f, "Method(channel={}, {:08X}, {:?})", ch, cm, args),
        }
    }
}

/// Represents all types of method frame arguments.
#[derive(Debug, PartialEq)]
pub enum MethodFrameArgs {
    ConnectionStart(ConnectionStartArgs),
    ConnectionStartOk(ConnectionStartOkArgs),
    ConnectionTune(ConnectionTuneArgs),
    ConnectionTuneOk(ConnectionTuneOkArgs),
    ConnectionClose(CloseArgs),
    ConnectionCloseOk,
    ChannelOpen,
    ChannelOpenOk,
    ChannelClose(CloseArgs),
    ChannelCloseOk,
    QueueDeclare(QueueDeclareArgs),
    QueueDeclareOk(QueueDeclareOkArgs),
    BasicConsume(BasicConsumeArgs),
    BasicConsumeOk(BasicConsumeOkArgs),
    BasicCancel(BasicCancelArgs),
    BasicCancelOk(BasicCancelOkArgs),
    BasicPublish(BasicPublishArgs),
    BasicPublishOk,
    BasicDeliver(BasicDeliverArgs),
}

#[derive(Debug, PartialEq)]
pub struct ConnectionStartArgs {
    pub version_major: u8,
    pub version_minor: u8,
}

impl Default for ConnectionStartArgs {
    fn default() -> Self {
        Self {
            version_major: 0,
            version_minor: 1,
        }
    }
}

impl ConnectionStartArgs {
    pub fn frame(self) -> Frame {
        Frame::Method(0, CONNECTION_START, MethodFrameArgs::ConnectionStart(self))
    }
}

#[derive(Debug, Default, PartialEq)]
pub struct ConnectionStartOkArgs {
    pub virtual_host: String,
    pub username: String,
    pub password: String,
}

impl ConnectionStartOkArgs {
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            virtual_host: "/".to_string(),
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    pub fn virtual_host(mut self, virtual_host: &str) -> Self {
        self.virtual_host = virtual_host.to_string();
        self
    }

    pub fn frame(self) -> Frame {
        Frame::Method(0, CONNECTION_START_OK, MethodFrameArgs::ConnectionStartOk(self))
    }
}

#[derive(Debug, Default, PartialEq)]
pub struct ConnectionTuneArgs {
    pub frame_max: u32,
}

impl ConnectionTuneArgs {
    pub fn frame(self) -> Frame {
        Frame::Method(0, CONNECTION_TUNE, MethodFrameArgs::ConnectionTune(self))
    }
}

#[derive(Debug, Default, PartialEq)]
pub struct ConnectionTuneOkArgs {
    pub frame_max: u32,
}

impl ConnectionTuneOkArgs {
    pub fn frame(self) -> Frame {
        Frame::Method(0, CONNECTION_TUNE_OK, MethodFrameArgs::ConnectionTuneOk(self))
    }
}

/// Arguments of `Connection.Close` and `Channel.Close`.
#[derive(Debug, Default, PartialEq)]
pub struct CloseArgs {
    pub code: u16,
    pub text: String,
}

impl CloseArgs {
    pub fn new(code: u16, text: &str) -> Self {
        Self {
            code,
            text: text.to_string(),
        }
    }
}

bitflags! {
    #[derive(Copy, Clone, Debug, Default, PartialEq)]
    pub struct QueueDeclareFlags: u8 {
        const DURABLE = 0b0000_0001;
    }
}

#[derive(Debug, Default, PartialEq)]
pub struct QueueDeclareArgs {
    pub queue_name: String,
    pub flags: QueueDeclareFlags,
}

impl QueueDeclareArgs {
    pub fn queue_name(mut self, queue_name: &str) -> Self {
        self.queue_name = queue_name.to_string();
        self
    }

    pub fn durable(mut self, durable: bool) -> Self {
        self.flags.set(QueueDeclareFlags::DURABLE, durable);
        self
    }

    pub fn frame(self, channel: Channel) -> Frame {
        Frame::Method(channel, QUEUE_DECLARE, MethodFrameArgs::QueueDeclare(self))
    }
}

#[derive(Debug, Default, PartialEq)]
pub struct QueueDeclareOkArgs {
    pub queue_name: String,
}

impl QueueDeclareOkArgs {
    pub fn frame(self, channel: Channel) -> Frame {
        Frame::Method(channel, QUEUE_DECLARE_OK, MethodFrameArgs::QueueDeclareOk(self))
    }
}

#[derive(Debug, Default, PartialEq)]
pub struct BasicConsumeArgs {
    pub queue_name: String,
    pub consumer_tag: String,
}

impl BasicConsumeArgs {
    pub fn queue_name(mut self, queue_name: &str) -> Self {
        self.queue_name = queue_name.to_string();
        self
    }

    pub fn consumer_tag(mut self, consumer_tag: &str) -> Self {
        self.consumer_tag = consumer_tag.to_string();
        self
    }

    pub fn frame(self, channel: Channel) -> Frame {
        Frame::Method(channel, BASIC_CONSUME, MethodFrameArgs::BasicConsume(self))
    }
}

#[derive(Debug, Default, PartialEq)]
pub struct BasicConsumeOkArgs {
    pub consumer_tag: String,
}

impl BasicConsumeOkArgs {
    pub fn new(consumer_tag: &str) -> Self {
        Self {
            consumer_tag: consumer_tag.to_string(),
        }
    }

    pub fn frame(self, channel: Channel) -> Frame {
        Frame::Method(channel, BASIC_CONSUME_OK, MethodFrameArgs::BasicConsumeOk(self))
    }
}

#[derive(Debug, Default, PartialEq)]
pub struct BasicCancelArgs {
    pub consumer_tag: String,
}

impl BasicCancelArgs {
    pub fn new(consumer_tag: &str) -> Self {
        Self {
            consumer_tag: consumer_tag.to_string(),
        }
    }

    pub fn frame(self, channel: Channel) -> Frame {
        Frame::Method(channel, BASIC_CANCEL, MethodFrameArgs::BasicCancel(self))
    }
}

#[derive(Debug, Default, PartialEq)]
pub struct BasicCancelOkArgs {
    pub consumer_tag: String,
}

impl BasicCancelOkArgs {
    pub fn new(consumer_tag: &str) -> Self {
        Self {
            consumer_tag: consumer_tag.to_string(),
        }
    }

    pub fn frame(self, channel: Channel) -> Frame {
        Frame::Method(channel, BASIC_CANCEL_OK, MethodFrameArgs::BasicCancelOk(self))
    }
}

/// The message body travels inline in the publish frame, there is no
/// separate content frame pair. The negotiated frame max bounds the body.
#[derive(Debug, Default, PartialEq)]
pub struct BasicPublishArgs {
    pub routing_key: String,
    pub body: Vec<u8>,
}

impl BasicPublishArgs {
    pub fn routing_key(mut self, routing_key: &str) -> Self {
        self.routing_key = routing_key.to_string();
        self
    }

    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    pub fn frame(self, channel: Channel) -> Frame {
        Frame::Method(channel, BASIC_PUBLISH, MethodFrameArgs::BasicPublish(self))
    }
}

#[derive(Debug, Default, PartialEq)]
pub struct BasicDeliverArgs {
    pub consumer_tag: String,
    pub delivery_tag: DeliveryTag,
    pub routing_key: String,
    pub body: Vec<u8>,
}

impl BasicDeliverArgs {
    pub fn frame(self, channel: Channel) -> Frame {
        Frame::Method(channel, BASIC_DELIVER, MethodFrameArgs::BasicDeliver(self))
    }
}

pub fn connection_close(code: u16, text: &str) -> Frame {
    Frame::Method(0, CONNECTION_CLOSE, MethodFrameArgs::ConnectionClose(CloseArgs::new(code, text)))
}

pub fn connection_close_ok() -> Frame {
    Frame::Method(0, CONNECTION_CLOSE_OK, MethodFrameArgs::ConnectionCloseOk)
}

pub fn channel_open(channel: Channel) -> Frame {
    Frame::Method(channel, CHANNEL_OPEN, MethodFrameArgs::ChannelOpen)
}

pub fn channel_open_ok(channel: Channel) -> Frame {
    Frame::Method(channel, CHANNEL_OPEN_OK, MethodFrameArgs::ChannelOpenOk)
}

pub fn channel_close(channel: Channel, code: u16, text: &str) -> Frame {
    Frame::Method(channel, CHANNEL_CLOSE, MethodFrameArgs::ChannelClose(CloseArgs::new(code, text)))
}

pub fn channel_close_ok(channel: Channel) -> Frame {
    Frame::Method(channel, CHANNEL_CLOSE_OK, MethodFrameArgs::ChannelCloseOk)
}

pub fn basic_publish_ok(channel: Channel) -> Frame {
    Frame::Method(channel, BASIC_PUBLISH_OK, MethodFrameArgs::BasicPublishOk)
}
