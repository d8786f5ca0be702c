use ring::digest;

use crate::msgs::enums::HandshakeType;
use crate::msgs::handshake::HandshakeHeader;

/// Keeps every handshake message exchanged so far, header included,
/// so the transcript can be hashed once the suite's hash is known.
#[derive(Clone, Debug, Default)]
pub(crate) struct HandshakeHash {
    buffer: Vec<u8>,
}

impl HandshakeHash {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Add a message we received, given its body.
    pub(crate) fn add_message(&mut self, typ: HandshakeType, body: &[u8]) {
        self.buffer
            .extend_from_slice(&HandshakeHeader::frame(typ, body));
    }

    /// Add an already framed message.
    pub(crate) fn add_raw(&mut self, encoded: &[u8]) {
        self.buffer.extend_from_slice(encoded);
    }

    /// Hash everything so far with `alg`.
    pub(crate) fn get_hash(&self, alg: &'static digest::Algorithm) -> digest::Digest {
        digest::digest(alg, &self.buffer)
    }

    pub(crate) fn len(&self) -> usize {
        self.buffer.len()
    }
}
