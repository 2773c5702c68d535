//! Inbound frame classification.

use axum::extract::ws::Message;
use tracing::debug;

/// What the read loop should do with one inbound frame.
#[derive(Debug, PartialEq, Eq)]
pub enum Inbound {
    /// A text payload to decode as a client event.
    Text(String),
    /// The peer started the close handshake.
    Close,
    /// Ping, pong or a frame with nothing to decode.
    Skip,
}

/// Classify a frame. UTF-8 binary frames are treated as text.
pub fn classify(msg: Message) -> Inbound {
    match msg {
        Message::Text(text) => Inbound::Text(text.as_str().to_owned()),
        Message::Binary(data) => match String::from_utf8(data.to_vec()) {
            Ok(text) => Inbound::Text(text),
            Err(_) => {
                debug!(len = data.len(), "ignoring non-UTF-8 binary frame");
                Inbound::Skip
            }
        },
        Message::Close(_) => Inbound::Close,
        Message::Ping(_) | Message::Pong(_) => Inbound::Skip,
    }
}
