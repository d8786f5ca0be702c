use std::fmt;
use std::sync::Arc;

use crate::error::{Error, InvalidMessage};
use crate::log::{debug, trace, warn};
use crate::msgs::handshake::HandshakeHeader;
use crate::server::state::{HandshakeStates, StateMachine};
use crate::server::{hs, tls12, HandshakeContext, HandshakeStage, ServerConfig};

/// Drives server handshakes.
///
/// One engine is built at startup and shared between every connection
/// (it is `Send + Sync`; wrap it in an `Arc` to hand it to tasks).  Each
/// connection owns its own [`HandshakeContext`], created with
/// [`HandshakeEngine::new_context`], and feeds it the client's messages
/// one at a time:
///
/// - [`HandshakeEngine::process_message`] (or
///   [`HandshakeEngine::process_handshake`] for header-prefixed bytes)
///   runs the client's message through the state machine;
/// - [`HandshakeEngine::advance`] then produces the server's next flight,
///   collected with [`HandshakeContext::take_outgoing`].
///
/// Any error poisons the context: later calls return the same error.
pub struct HandshakeEngine {
    config: Arc<ServerConfig>,
    states: HandshakeStates,
}

impl HandshakeEngine {
    /// Make a new engine using `config`.
    ///
    /// Fails with [`Error::UnregisteredState`] if some stage ends up with
    /// no handler.
    pub fn new(config: Arc<ServerConfig>) -> Result<Self, Error> {
        let mut states = HandshakeStates::new();
        states.register(Box::new(hs::ExpectClientHello))?;
        states.register(Box::new(hs::EmitServerHello))?;
        states.register(Box::new(tls12::CertificateState))?;
        states.register(Box::new(tls12::EmitCertificateRequest))?;
        states.register(Box::new(tls12::EmitServerHelloDone))?;
        states.register(Box::new(tls12::ExpectClientKx))?;
        states.register(Box::new(tls12::Transition))?;
        states.register(Box::new(tls12::ExpectCertificateVerify))?;
        states.register(Box::new(tls12::ExpectCcs))?;
        states.register(Box::new(tls12::ExpectFinished))?;
        states.check_complete()?;

        debug!("Handshake engine ready: {:?}", config);
        Ok(Self { config, states })
    }

    /// The config this engine was built with.
    pub fn config(&self) -> &Arc<ServerConfig> {
        &self.config
    }

    /// Start a new handshake at the configured initial stage.
    pub fn new_context(&self) -> HandshakeContext {
        HandshakeContext::new(self.config.initial_stage)
    }

    /// Process one message from the client.
    ///
    /// `stage` says which message `body` is; `body` excludes the handshake
    /// header.  The message must be the one the handshake expects next,
    /// and the server must have sent everything it owes first (see
    /// [`HandshakeEngine::advance`]).
    pub fn process_message(
        &self,
        cx: &mut HandshakeContext,
        stage: HandshakeStage,
        body: &[u8],
    ) -> Result<(), Error> {
        cx.check_usable()?;

        if !cx.awaiting_peer() {
            let err = Error::ServerFlightPending(cx.stage());
            return Err(self.poison(cx, err));
        }

        if let Err(err) = cx.set_buffer(stage, body) {
            return Err(self.poison(cx, err));
        }
        trace!("Stored {:?} message of {} bytes", stage, body.len());

        let mut machine = StateMachine::new(&self.states, &self.config);
        machine.post(stage);
        let result = machine.start(cx);
        if result.is_err() {
            cx.discard_buffer(stage);
        }

        result
    }

    /// Process one handshake message, handshake header included.
    ///
    /// A length field that disagrees with the bytes supplied is logged
    /// and otherwise ignored: all of `bytes` after the header is taken as
    /// the body.
    pub fn process_handshake(&self, cx: &mut HandshakeContext, bytes: &[u8]) -> Result<(), Error> {
        cx.check_usable()?;

        let (header, body) = match HandshakeHeader::read(bytes) {
            Ok(parsed) => parsed,
            Err(err) => return Err(self.poison(cx, err)),
        };
        if header.length as usize != body.len() {
            debug!(
                "{:?} header claims {} bytes, got {}",
                header.typ,
                header.length,
                body.len()
            );
        }

        let stage = match HandshakeStage::from_handshake_type(header.typ) {
            Some(stage) => stage,
            None => {
                let err = InvalidMessage::UnknownHandshakeType(u8::from(header.typ));
                return Err(self.poison(cx, err));
            }
        };

        self.process_message(cx, stage, body)
    }

    /// Produce the server's messages up to the next point where a client
    /// message is needed.  Does nothing if the client is already owed the
    /// next move.
    pub fn advance(&self, cx: &mut HandshakeContext) -> Result<(), Error> {
        cx.check_usable()?;

        let mut machine = StateMachine::new(&self.states, &self.config);
        while !cx.awaiting_peer() {
            machine.post(cx.stage());
            machine.start(cx)?;
        }

        Ok(())
    }

    fn poison(&self, cx: &mut HandshakeContext, err: impl Into<Error>) -> Error {
        let err = err.into();
        warn!("Rejected client message at {:?}: {}", cx.stage(), err);
        cx.fail(err.clone());
        err
    }
}

impl fmt::Debug for HandshakeEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandshakeEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
