use easymq_codec::frame;
use std::fmt;

/// Type alias for the result of every fallible client operation.
pub type Result<T> = std::result::Result<T, Error>;

/// A sendable, syncable boxed error, the fault type a consumer callback can
/// raise to abort the dispatch loop.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

/// Every failure the client surfaces. Each variant is one kind of the error
/// taxonomy, so callers can match on what went wrong instead of parsing
/// reason strings.
#[derive(Debug)]
pub enum Error {
    /// Transport or handshake failure.
    Connection(ConnectionError),
    /// Operation attempted on a session or channel in the wrong lifecycle
    /// state.
    State(String),
    /// Conflicting queue declaration, or an operation targeting a queue
    /// which was never declared on this channel.
    Declare(String),
    /// Publish failure.
    Publish(PublishError),
    /// A consumer tag is already registered on this channel.
    ConsumerConflict(String),
    /// Cancel of a consumer tag which is not registered.
    NotFound(String),
    /// A consumer callback failed during dispatch; the wait loop aborted.
    Callback(CallbackError),
}

#[derive(Debug)]
pub enum ConnectionError {
    /// The open deadline expired before the handshake completed.
    Timeout,
    /// Connection refused, reset or another socket level failure.
    Network(String),
    /// The server rejected the handshake, authentication failure or
    /// protocol version mismatch.
    Handshake { code: u16, reason: String },
    /// The connection went away while an operation was in flight.
    Closed { code: u16, reason: String },
}

#[derive(Debug)]
pub enum PublishError {
    /// The message body exceeds the negotiated frame size. Oversized bodies
    /// are rejected, never chunked.
    TooLarge { size: usize, frame_max: usize },
    /// The server refused the publish.
    Rejected { code: u16, reason: String },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Connection(e) => write!(f, "connection error: {}", e),
            Error::State(reason) => write!(f, "state error: {}", reason),
            Error::Declare(reason) => write!(f, "declare error: {}", reason),
            Error::Publish(e) => write!(f, "publish error: {}", e),
            Error::ConsumerConflict(tag) => write!(f, "consumer tag {:?} is already registered", tag),
            Error::NotFound(tag) => write!(f, "consumer tag {:?} is not registered", tag),
            Error::Callback(e) => write!(f, "consumer callback failed: {}", e),
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionError::Timeout => write!(f, "timed out"),
            ConnectionError::Network(reason) => write!(f, "{}", reason),
            ConnectionError::Handshake { code, reason } => write!(f, "handshake failed with {} {}", code, reason),
            ConnectionError::Closed { code, reason } => write!(f, "connection closed with {} {}", code, reason),
        }
    }
}

impl fmt::Display for PublishError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublishError::TooLarge { size, frame_max } => {
                write!(f, "body of {} bytes exceeds the negotiated frame size {}", size, frame_max)
            }
            PublishError::Rejected { code, reason } => write!(f, "rejected with {} {}", code, reason),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Callback(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl Error {
    /// Maps a `Connection.Close` or `Channel.Close` reply arriving from the
    /// server to the taxonomy kind the blocked caller should see.
    pub(crate) fn from_close(args: &frame::CloseArgs) -> Error {
        match args.code {
            frame::CONTENT_TOO_LARGE => Error::Publish(PublishError::Rejected {
                code: args.code,
                reason: args.text.clone(),
            }),
            frame::PRECONDITION_FAILED => Error::Declare(args.text.clone()),
            _ => Error::Connection(ConnectionError::Closed {
                code: args.code,
                reason: args.text.clone(),
            }),
        }
    }

    pub(crate) fn connection_lost() -> Error {
        Error::Connection(ConnectionError::Closed {
            code: frame::CHANNEL_ERROR,
            reason: "connection lost".to_string(),
        })
    }
}
