use std::collections::{HashMap, VecDeque};

use crate::error::Error;
use crate::log::{trace, warn};
use crate::msgs::enums::HandshakeType;
use crate::server::{HandshakeContext, ServerConfig};

/// The most steps one handshake may execute unless configured otherwise:
/// one per message type plus transitions.
pub const MAX_HANDSHAKE_STEPS: usize = 16;

/// A stage of the server handshake: the message the state machine
/// expects to process next.
///
/// Each stage has a stable numeric id.  Stages that correspond to a
/// handshake message use its wire type; the others use reserved values
/// outside the handshake type space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum HandshakeStage {
    /// ClientHello, from the client.
    ClientHello = 0x01,
    /// ServerHello, from us.
    ServerHello = 0x02,
    /// Certificate, from us and (with client auth) from the client.
    Certificate = 0x0b,
    /// CertificateRequest, from us.
    CertificateRequest = 0x0d,
    /// ServerHelloDone, from us.
    ServerHelloDone = 0x0e,
    /// CertificateVerify, from the client.
    CertificateVerify = 0x0f,
    /// ClientKeyExchange, from the client.
    ClientKeyExchange = 0x10,
    /// Finished, from the client.
    Finished = 0x14,
    /// ChangeCipherSpec, from the client.  Not a handshake message on
    /// the wire, but ordered like one.
    ChangeCipherSpec = 0xf0,
    /// Synthetic stage deciding what follows ClientKeyExchange.
    Transition = 0xff,
}

impl HandshakeStage {
    /// Every stage.
    pub const ALL: &'static [Self] = &[
        Self::ClientHello,
        Self::ServerHello,
        Self::Certificate,
        Self::CertificateRequest,
        Self::ServerHelloDone,
        Self::ClientKeyExchange,
        Self::CertificateVerify,
        Self::ChangeCipherSpec,
        Self::Finished,
        Self::Transition,
    ];

    /// This stage's numeric id.
    pub fn id(self) -> u8 {
        self as u8
    }

    /// The stage with numeric id `id`.
    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL
            .iter()
            .find(|stage| stage.id() == id)
            .copied()
    }

    /// The handshake message type carried at this stage, if any.
    pub fn handshake_type(self) -> Option<HandshakeType> {
        match self {
            Self::ChangeCipherSpec | Self::Transition => None,
            other => Some(HandshakeType::from(other.id())),
        }
    }

    /// The stage at which a handshake message of type `typ` is processed.
    pub fn from_handshake_type(typ: HandshakeType) -> Option<Self> {
        Self::from_id(u8::from(typ)).filter(|stage| stage.handshake_type().is_some())
    }
}

/// What a state handler gets to work with.
pub(crate) struct ServerContext<'a> {
    pub(crate) config: &'a ServerConfig,
    pub(crate) hs: &'a mut HandshakeContext,
}

/// Handles one stage of the handshake.
///
/// A handler parses the message stored for its stage (if it is a client
/// message) or produces ours, records the stage, writes whatever it
/// derived into the context, and names the next stage.
pub(crate) trait State: Send + Sync {
    /// The stage this handler is registered under.
    fn stage(&self) -> HandshakeStage;

    fn handle(&self, cx: &mut ServerContext<'_>) -> Result<HandshakeStage, Error>;
}

/// The stage-to-handler table.
pub(crate) struct HandshakeStates {
    handlers: HashMap<HandshakeStage, Box<dyn State>>,
}

impl HandshakeStates {
    pub(crate) fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub(crate) fn register(&mut self, handler: Box<dyn State>) -> Result<(), Error> {
        let stage = handler.stage();
        if self.handlers.contains_key(&stage) {
            return Err(Error::DuplicateState(stage));
        }

        self.handlers.insert(stage, handler);
        Ok(())
    }

    /// Fails naming the first stage with no handler.
    pub(crate) fn check_complete(&self) -> Result<(), Error> {
        match HandshakeStage::ALL
            .iter()
            .find(|stage| !self.handlers.contains_key(*stage))
        {
            Some(missing) => Err(Error::UnregisteredState(*missing)),
            None => Ok(()),
        }
    }

    fn get(&self, stage: HandshakeStage) -> Option<&dyn State> {
        self.handlers
            .get(&stage)
            .map(|h| h.as_ref())
    }
}

/// Runs posted stages against a context, one at a time.
///
/// The machine stops at the first handler error and refuses to run once
/// the context has executed `max_steps` steps.  A failure poisons the
/// context.
pub(crate) struct StateMachine<'a> {
    states: &'a HandshakeStates,
    config: &'a ServerConfig,
    pending: VecDeque<HandshakeStage>,
}

impl<'a> StateMachine<'a> {
    pub(crate) fn new(states: &'a HandshakeStates, config: &'a ServerConfig) -> Self {
        Self {
            states,
            config,
            pending: VecDeque::new(),
        }
    }

    /// Enqueue one step.
    pub(crate) fn post(&mut self, stage: HandshakeStage) {
        self.pending.push_back(stage);
    }

    /// Run every pending step.
    pub(crate) fn start(&mut self, hs: &mut HandshakeContext) -> Result<(), Error> {
        while let Some(stage) = self.pending.pop_front() {
            if let Err(err) = self.step(stage, hs) {
                warn!("Handshake failed at {:?}: {}", stage, err);
                self.pending.clear();
                hs.fail(err.clone());
                return Err(err);
            }
        }

        Ok(())
    }

    fn step(&mut self, stage: HandshakeStage, hs: &mut HandshakeContext) -> Result<(), Error> {
        if hs.is_complete() {
            return Err(Error::HandshakeAlreadyComplete);
        }

        if stage != hs.stage() {
            return Err(Error::InappropriateHandshakeMessage {
                expect_types: vec![hs.stage()],
                got_type: stage,
            });
        }

        if hs.steps() >= self.config.max_steps {
            return Err(Error::StepLimitReached(self.config.max_steps));
        }
        hs.count_step();

        let handler = self
            .states
            .get(stage)
            .ok_or(Error::UnregisteredState(stage))?;
        let next = handler.handle(&mut ServerContext {
            config: self.config,
            hs,
        })?;

        trace!("{:?} -> {:?}", stage, next);
        hs.set_stage(next);

        // Transition has no message of its own; resolve it straight away.
        if next == HandshakeStage::Transition {
            self.pending.push_front(next);
        }

        Ok(())
    }
}
