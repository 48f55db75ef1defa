use easymq_codec::frame::DeliveryTag;

/// A message published by the application or delivered to a consumer.
///
/// The body is an opaque byte sequence, the client never assumes any text
/// encoding. A message is immutable once constructed; the delivery tag is
/// present only on messages the server delivered.
#[derive(Debug, Default)]
pub struct Message {
    body: Vec<u8>,
    routing_key: Option<String>,
    delivery_tag: Option<DeliveryTag>,
}

impl Message {
    pub fn new(body: impl Into<Vec<u8>>) -> Message {
        Message {
            body: body.into(),
            routing_key: None,
            delivery_tag: None,
        }
    }

    pub fn with_routing_key(mut self, routing_key: &str) -> Message {
        self.routing_key = Some(routing_key.to_string());
        self
    }

    pub(crate) fn delivered(body: Vec<u8>, routing_key: String, delivery_tag: DeliveryTag) -> Message {
        Message {
            body,
            routing_key: Some(routing_key),
            delivery_tag: Some(delivery_tag),
        }
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Consumes the message, handing the body over to the caller. Callbacks
    /// which need the payload beyond their own invocation should take it
    /// this way instead of borrowing.
    pub fn into_body(self) -> Vec<u8> {
        self.body
    }

    pub fn routing_key(&self) -> Option<&str> {
        self.routing_key.as_deref()
    }

    pub fn delivery_tag(&self) -> Option<DeliveryTag> {
        self.delivery_tag
    }
}

impl From<&str> for Message {
    fn from(value: &str) -> Self {
        Message::new(value.as_bytes().to_vec())
    }
}
