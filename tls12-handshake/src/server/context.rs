use std::collections::HashMap;
use std::mem;

use pki_types::CertificateDer;
use ring::digest;

use crate::error::Error;
use crate::hash_hs::HandshakeHash;
use crate::msgs::codec::Codec;
use crate::msgs::enums::{HandshakeType, SignatureScheme};
use crate::msgs::handshake::{ClientHelloPayload, HandshakeHeader, Random};
use crate::server::HandshakeStage;
use crate::suites::SupportedCipherSuite;

/// A message the server produced, ready for the record layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboundMessage {
    /// The stage that produced it.
    pub stage: HandshakeStage,
    /// The encoded message, handshake header included.
    pub bytes: Vec<u8>,
}

/// Everything one connection's handshake has seen and decided so far.
///
/// Owned by a single connection and never shared.  Create one with
/// [`crate::HandshakeEngine::new_context`].
#[derive(Debug)]
pub struct HandshakeContext {
    stage: HandshakeStage,
    buffers: HashMap<HandshakeStage, Vec<u8>>,
    order: Vec<HandshakeStage>,
    steps: usize,
    failed: Option<Error>,
    outgoing: Vec<OutboundMessage>,
    pub(crate) transcript: HandshakeHash,

    pub(crate) client_hello: Option<ClientHelloPayload>,
    pub(crate) client_random: Option<Random>,
    pub(crate) server_random: Option<Random>,
    pub(crate) suite: Option<&'static SupportedCipherSuite>,
    pub(crate) signature_scheme: Option<SignatureScheme>,
    pub(crate) alpn_protocol: Option<Vec<u8>>,
    pub(crate) server_name: Option<String>,
    pub(crate) using_ems: bool,
    pub(crate) server_certificate: Vec<CertificateDer<'static>>,
    pub(crate) client_auth_requested: bool,
    pub(crate) client_certificates: Vec<CertificateDer<'static>>,
    pub(crate) client_key_exchange: Option<Vec<u8>>,
    pub(crate) client_verify_scheme: Option<SignatureScheme>,
    pub(crate) client_verify_data: Option<[u8; 12]>,
}

impl HandshakeContext {
    pub(crate) fn new(initial_stage: HandshakeStage) -> Self {
        Self {
            stage: initial_stage,
            buffers: HashMap::new(),
            order: Vec::new(),
            steps: 0,
            failed: None,
            outgoing: Vec::new(),
            transcript: HandshakeHash::new(),
            client_hello: None,
            client_random: None,
            server_random: None,
            suite: None,
            signature_scheme: None,
            alpn_protocol: None,
            server_name: None,
            using_ems: false,
            server_certificate: Vec::new(),
            client_auth_requested: false,
            client_certificates: Vec::new(),
            client_key_exchange: None,
            client_verify_scheme: None,
            client_verify_data: None,
        }
    }

    /// The stage the state machine expects next.
    pub fn stage(&self) -> HandshakeStage {
        self.stage
    }

    /// Stages processed so far, in order.  Only ever appended to.
    pub fn order(&self) -> &[HandshakeStage] {
        &self.order
    }

    /// Steps executed so far.
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// The error that ended this handshake, if one did.
    pub fn error(&self) -> Option<&Error> {
        self.failed.as_ref()
    }

    /// Whether the client's Finished has been processed.
    pub fn is_complete(&self) -> bool {
        self.order.last() == Some(&HandshakeStage::Finished)
    }

    /// Whether the next step needs a message from the client.  When this
    /// is false, [`crate::HandshakeEngine::advance`] has work to do.
    pub fn awaiting_peer(&self) -> bool {
        match self.stage {
            HandshakeStage::ClientHello
            | HandshakeStage::ClientKeyExchange
            | HandshakeStage::CertificateVerify
            | HandshakeStage::ChangeCipherSpec
            | HandshakeStage::Finished => true,
            HandshakeStage::Certificate => self
                .order
                .contains(&HandshakeStage::ServerHelloDone),
            HandshakeStage::ServerHello
            | HandshakeStage::CertificateRequest
            | HandshakeStage::ServerHelloDone
            | HandshakeStage::Transition => false,
        }
    }

    /// The most recent ClientHello.
    pub fn client_hello(&self) -> Option<&ClientHelloPayload> {
        self.client_hello.as_ref()
    }

    /// The client random.
    pub fn client_random(&self) -> Option<&Random> {
        self.client_random.as_ref()
    }

    /// The server random.
    pub fn server_random(&self) -> Option<&Random> {
        self.server_random.as_ref()
    }

    /// The negotiated cipher suite.
    pub fn suite(&self) -> Option<&'static SupportedCipherSuite> {
        self.suite
    }

    /// The signature scheme chosen for our own signatures.
    pub fn signature_scheme(&self) -> Option<SignatureScheme> {
        self.signature_scheme
    }

    /// The negotiated ALPN protocol.
    pub fn alpn_protocol(&self) -> Option<&[u8]> {
        self.alpn_protocol.as_deref()
    }

    /// The host name that selected our certificate.
    pub fn server_name(&self) -> Option<&str> {
        self.server_name.as_deref()
    }

    /// Whether both sides agreed on the extended master secret.
    pub fn using_ems(&self) -> bool {
        self.using_ems
    }

    /// The chain we sent.
    pub fn server_certificate(&self) -> &[CertificateDer<'static>] {
        &self.server_certificate
    }

    /// The chain the client sent; empty if it sent none.
    pub fn client_certificates(&self) -> &[CertificateDer<'static>] {
        &self.client_certificates
    }

    /// The client's key exchange value.
    pub fn client_key_exchange(&self) -> Option<&[u8]> {
        self.client_key_exchange.as_deref()
    }

    /// The scheme the client signed CertificateVerify with.
    pub fn client_verify_scheme(&self) -> Option<SignatureScheme> {
        self.client_verify_scheme
    }

    /// The verify data from the client's Finished.
    pub fn client_verify_data(&self) -> Option<&[u8; 12]> {
        self.client_verify_data.as_ref()
    }

    /// Hash of every handshake message so far, using the negotiated
    /// suite's PRF hash.  `None` until a suite is chosen.
    pub fn transcript_hash(&self) -> Option<digest::Digest> {
        let suite = self.suite?;
        Some(
            self.transcript
                .get_hash(suite.info.prf_hash()),
        )
    }

    /// Take the messages produced since the last call.
    pub fn take_outgoing(&mut self) -> Vec<OutboundMessage> {
        mem::take(&mut self.outgoing)
    }

    /// Store the body of a received message until its handler runs.
    pub(crate) fn set_buffer(&mut self, stage: HandshakeStage, body: &[u8]) -> Result<(), Error> {
        if self.buffers.contains_key(&stage) {
            return Err(Error::DuplicateMessage(stage));
        }

        self.buffers.insert(stage, body.to_vec());
        Ok(())
    }

    /// Consume the stored body for `stage`.
    pub(crate) fn take_buffer(&mut self, stage: HandshakeStage) -> Result<Vec<u8>, Error> {
        self.buffers
            .remove(&stage)
            .ok_or(Error::MissingMessage(stage))
    }

    pub(crate) fn discard_buffer(&mut self, stage: HandshakeStage) {
        self.buffers.remove(&stage);
    }

    /// Append `stage` to the processed history.
    pub(crate) fn record(&mut self, stage: HandshakeStage) {
        self.order.push(stage);
    }

    /// Encode `payload` as a handshake message of type `typ`, add it to
    /// the transcript and queue it for sending.
    pub(crate) fn emit<'a>(&mut self, stage: HandshakeStage, typ: HandshakeType, payload: &impl Codec<'a>) {
        let bytes = HandshakeHeader::frame(typ, &payload.get_encoding());
        self.transcript.add_raw(&bytes);
        self.outgoing
            .push(OutboundMessage { stage, bytes });
    }

    /// Fails if this handshake can take no more input.
    pub(crate) fn check_usable(&self) -> Result<(), Error> {
        if let Some(err) = &self.failed {
            return Err(err.clone());
        }

        match self.is_complete() {
            true => Err(Error::HandshakeAlreadyComplete),
            false => Ok(()),
        }
    }

    pub(crate) fn set_stage(&mut self, stage: HandshakeStage) {
        self.stage = stage;
    }

    pub(crate) fn count_step(&mut self) {
        self.steps += 1;
    }

    pub(crate) fn fail(&mut self, err: Error) {
        self.failed.get_or_insert(err);
    }

    #[cfg(test)]
    pub(crate) fn pending_buffers(&self) -> usize {
        self.buffers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msgs::base::Payload;

    #[test]
    fn one_buffer_per_stage() {
        let mut cx = HandshakeContext::new(HandshakeStage::ClientHello);
        cx.set_buffer(HandshakeStage::ClientHello, &[1, 2, 3])
            .unwrap();
        assert_eq!(
            cx.set_buffer(HandshakeStage::ClientHello, &[4]),
            Err(Error::DuplicateMessage(HandshakeStage::ClientHello))
        );

        assert_eq!(cx.take_buffer(HandshakeStage::ClientHello), Ok(vec![1, 2, 3]));
        assert_eq!(
            cx.take_buffer(HandshakeStage::ClientHello),
            Err(Error::MissingMessage(HandshakeStage::ClientHello))
        );
        cx.set_buffer(HandshakeStage::ClientHello, &[4])
            .unwrap();
    }

    #[test]
    fn certificate_belongs_to_the_client_after_server_hello_done() {
        let mut cx = HandshakeContext::new(HandshakeStage::Certificate);
        assert!(!cx.awaiting_peer());
        cx.record(HandshakeStage::ServerHelloDone);
        assert!(cx.awaiting_peer());
    }

    #[test]
    fn first_failure_sticks() {
        let mut cx = HandshakeContext::new(HandshakeStage::ClientHello);
        assert_eq!(cx.check_usable(), Ok(()));
        cx.fail(Error::NoCommonCipherSuite);
        cx.fail(Error::NotFound);
        assert_eq!(cx.error(), Some(&Error::NoCommonCipherSuite));
        assert_eq!(cx.check_usable(), Err(Error::NoCommonCipherSuite));
    }

    #[test]
    fn emitted_messages_are_framed_and_drained() {
        let mut cx = HandshakeContext::new(HandshakeStage::ServerHelloDone);
        cx.emit(
            HandshakeStage::ServerHelloDone,
            HandshakeType::ServerHelloDone,
            &Payload::empty(),
        );
        let out = cx.take_outgoing();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].bytes, vec![0x0e, 0x00, 0x00, 0x00]);
        assert!(cx.take_outgoing().is_empty());
        assert!(cx.transcript_hash().is_none());
    }
}
