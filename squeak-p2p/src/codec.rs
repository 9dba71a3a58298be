//! Frames a duplex byte stream into [`Message`] values: a 4-byte big-endian
//! length prefix (via `tokio_util`'s `LengthDelimitedCodec`) around a
//! `bincode`-encoded payload.

use bytes::{Bytes, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

use crate::message::Message;

/// Upper bound on a single frame, chosen generously above the largest
/// `squeak` message (item ciphertext plus a 1MB-ish block header) while
/// still refusing to let a malicious peer claim an unbounded length prefix
/// and exhaust memory.
const MAX_FRAME_LENGTH: usize = 16 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed message: {0}")]
    Bincode(#[from] bincode::Error),
}

/// A [`Decoder`]/[`Encoder`] pair for [`Message`], built atop
/// [`LengthDelimitedCodec`] for the framing.
pub struct MessageCodec {
    framing: LengthDelimitedCodec,
}

impl MessageCodec {
    pub fn new() -> Self {
        Self {
            framing: LengthDelimitedCodec::builder()
                .max_frame_length(MAX_FRAME_LENGTH)
                .new_codec(),
        }
    }
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>, CodecError> {
        match self.framing.decode(src)? {
            Some(frame) => {
                let message = bincode::deserialize(&frame)?;
                Ok(Some(message))
            }
            None => Ok(None),
        }
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), CodecError> {
        let bytes = bincode::serialize(&item)?;
        self.framing.encode(Bytes::from(bytes), dst)
    }
}

#[cfg(test)]
mod test {
    use squeak_common::Hash32;

    use super::*;
    use crate::message::{InvEntry, InvType};

    #[test]
    fn encode_then_decode_round_trips() {
        let mut codec = MessageCodec::new();
        let mut buf = BytesMut::new();
        let msg = Message::Inv {
            entries: vec![InvEntry {
                inv_type: InvType::Item,
                hash: Hash32::digest(b"round-trip"),
            }],
        };
        codec.encode(msg, &mut buf).unwrap();

        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        match decoded {
            Message::Inv { entries } => assert_eq!(entries.len(), 1),
            _ => panic!("expected Inv"),
        }
        assert!(buf.is_empty());
    }

    #[test]
    fn partial_frame_yields_none() {
        let mut codec = MessageCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(Message::Verack, &mut buf).unwrap();
        let mut truncated = buf.split_to(buf.len() - 1);
        assert!(codec.decode(&mut truncated).unwrap().is_none());
    }
}
