use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use crate::modules::ModuleId;
use crate::msgs::enums::{ExtensionType, ProtocolVersion, SignatureScheme};
use crate::server::HandshakeStage;

/// The handshake engine reports all errors using this type.
///
/// Configuration errors come out of startup-time calls (registries,
/// [`crate::ServerConfigBuilder::build`], [`crate::HandshakeEngine::new`]) and
/// mean the engine must not start accepting connections.  Every other
/// variant is fatal to the handshake in which it occurred, and to nothing
/// else.  Use [`Error::kind`] to tell these groups apart.
#[non_exhaustive]
#[derive(Debug, PartialEq, Clone)]
pub enum Error {
    /// We received a handshake message that isn't valid right now.
    /// `expect_types` lists the stages the state machine was waiting
    /// for; `got_type` is what was posted.
    InappropriateHandshakeMessage {
        /// Which stages we expected
        expect_types: Vec<HandshakeStage>,
        /// What was posted
        got_type: HandshakeStage,
    },

    /// The peer sent us a handshake message with invalid contents.
    InvalidMessage(InvalidMessage),

    /// The state machine executed its configured maximum number of steps.
    StepLimitReached(usize),

    /// A message was posted after Finished was processed.
    HandshakeAlreadyComplete,

    /// A peer message was posted while the server still has messages of
    /// its own to send, starting with this stage.
    ServerFlightPending(HandshakeStage),

    /// A message of this type was stored while an earlier one was still
    /// waiting to be consumed.
    DuplicateMessage(HandshakeStage),

    /// A state handler ran but the buffer it consumes was never stored.
    MissingMessage(HandshakeStage),

    /// The client offered no cipher suite we support.
    NoCommonCipherSuite,

    /// The client offered no signature scheme we support.
    NoCommonSignatureScheme,

    /// The peer signed with a scheme we never offered.
    UnsupportedSignatureScheme(SignatureScheme),

    /// The client's highest version is older than TLS 1.2.
    UnsupportedProtocolVersion(ProtocolVersion),

    /// The client offered ALPN protocols, but none of ours.
    NoApplicationProtocol,

    /// No registered certificate matched the selection criterion.
    NotFound,

    /// An extension decoder with this id is already registered.
    DuplicateExtension(ExtensionType),

    /// A module with this id is already registered.
    DuplicateModule(ModuleId),

    /// A module initializer failed.
    ModuleInit(ModuleId, OtherError),

    /// A module initializer produced a module of the wrong kind.
    ModuleKindMismatch {
        /// The id the module was registered under
        expected: ModuleId,
        /// The id of the module the initializer returned
        got: ModuleId,
    },

    /// A required module was never initialized.
    MissingModule(ModuleId),

    /// A state handler is already registered for this stage.
    DuplicateState(HandshakeStage),

    /// No state handler is registered for this stage.
    UnregisteredState(HandshakeStage),

    /// We failed to acquire random bytes from the system.
    FailedToGetRandomBytes,

    /// A catch-all error for unlikely errors.
    General(String),
}

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Startup-time mistakes; the engine must not accept connections.
    Configuration,
    /// Bad bytes from the peer.
    MalformedInput,
    /// A message arrived in the wrong order, or the step ceiling was hit.
    FlowOrder,
    /// The peer is well-formed but we share nothing with it.
    Negotiation,
    /// A local failure during one handshake; other connections may still
    /// succeed.
    Internal,
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DuplicateExtension(_)
            | Self::DuplicateModule(_)
            | Self::ModuleInit(..)
            | Self::ModuleKindMismatch { .. }
            | Self::MissingModule(_)
            | Self::DuplicateState(_)
            | Self::UnregisteredState(_)
            | Self::General(_) => ErrorKind::Configuration,
            Self::FailedToGetRandomBytes => ErrorKind::Internal,
            Self::InvalidMessage(_) | Self::DuplicateMessage(_) | Self::MissingMessage(_) => {
                ErrorKind::MalformedInput
            }
            Self::InappropriateHandshakeMessage { .. }
            | Self::StepLimitReached(_)
            | Self::HandshakeAlreadyComplete
            | Self::ServerFlightPending(_) => ErrorKind::FlowOrder,
            Self::NoCommonCipherSuite
            | Self::NoCommonSignatureScheme
            | Self::UnsupportedSignatureScheme(_)
            | Self::UnsupportedProtocolVersion(_)
            | Self::NoApplicationProtocol
            | Self::NotFound => ErrorKind::Negotiation,
        }
    }
}

/// A corrupt TLS handshake message that resulted in an error.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InvalidMessage {
    /// The message is shorter than the smallest message of its kind.
    MalformedMessage,
    /// A declared length ran past the end of the buffer, for the named field.
    TruncatedField(&'static str),
    /// A session id longer than 32 bytes.
    InvalidSessionId,
    /// A cipher suite list whose length is not a multiple of two.
    MalformedCipherSuiteList,
    /// The bytes consumed did not add up to the message length.
    TrailingOrMissingData,
    /// Trailing data found for the named structure.
    TrailingData(&'static str),
    /// The same extension appeared twice in one hello.
    DuplicateExtension(ExtensionType),
    /// A list that must not be empty was empty.
    IllegalEmptyList(&'static str),
    /// The ChangeCipherSpec body was not the single byte 0x01.
    InvalidCcs,
    /// The handshake header named a message type this engine doesn't handle.
    UnknownHandshakeType(u8),
    /// A server name could not be decoded.
    InvalidServerName,
}

impl From<InvalidMessage> for Error {
    #[inline]
    fn from(e: InvalidMessage) -> Self {
        Self::InvalidMessage(e)
    }
}

fn join<T: fmt::Debug>(items: &[T]) -> String {
    items
        .iter()
        .map(|x| format!("{:?}", x))
        .collect::<Vec<String>>()
        .join(" or ")
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::InappropriateHandshakeMessage {
                ref expect_types,
                ref got_type,
            } => write!(
                f,
                "received unexpected handshake message: got {:?} when expecting {}",
                got_type,
                join::<HandshakeStage>(expect_types)
            ),
            Self::InvalidMessage(ref typ) => {
                write!(f, "received corrupt message of type {:?}", typ)
            }
            Self::StepLimitReached(limit) => {
                write!(f, "handshake exceeded its limit of {} steps", limit)
            }
            Self::HandshakeAlreadyComplete => write!(f, "handshake already complete"),
            Self::ServerFlightPending(ref stage) => {
                write!(f, "server must send {:?} before receiving more messages", stage)
            }
            Self::DuplicateMessage(ref stage) => {
                write!(f, "a {:?} message is already pending", stage)
            }
            Self::MissingMessage(ref stage) => write!(f, "no {:?} message was stored", stage),
            Self::NoCommonCipherSuite => write!(f, "no cipher suites in common"),
            Self::NoCommonSignatureScheme => write!(f, "no signature schemes in common"),
            Self::UnsupportedSignatureScheme(ref scheme) => {
                write!(f, "peer used unoffered signature scheme {:?}", scheme)
            }
            Self::UnsupportedProtocolVersion(ref version) => {
                write!(f, "peer offered unsupported protocol version {:?}", version)
            }
            Self::NoApplicationProtocol => write!(f, "no application protocols in common"),
            Self::NotFound => write!(f, "no matching certificate"),
            Self::DuplicateExtension(ref typ) => {
                write!(f, "extension {:?} is already registered", typ)
            }
            Self::DuplicateModule(ref id) => write!(f, "module {:?} is already registered", id),
            Self::ModuleInit(ref id, ref err) => {
                write!(f, "failed to initialize module {:?}: {}", id, err)
            }
            Self::ModuleKindMismatch {
                ref expected,
                ref got,
            } => write!(
                f,
                "module registered as {:?} initialized as {:?}",
                expected, got
            ),
            Self::MissingModule(ref id) => write!(f, "required module {:?} is missing", id),
            Self::DuplicateState(ref stage) => {
                write!(f, "a handler for {:?} is already registered", stage)
            }
            Self::UnregisteredState(ref stage) => {
                write!(f, "no handler registered for {:?}", stage)
            }
            Self::FailedToGetRandomBytes => write!(f, "failed to get random bytes"),
            Self::General(ref err) => write!(f, "unexpected error: {}", err),
        }
    }
}

impl StdError for Error {}

/// Any other error that cannot be expressed by a more specific [`Error`]
/// variant, such as a module initializer's own failure.
///
/// Enums holding this type will never compare equal to each other.
#[derive(Debug, Clone)]
pub struct OtherError(Arc<dyn StdError + Send + Sync>);

impl OtherError {
    /// Create a new `OtherError` from any error type.
    pub fn new(err: impl StdError + Send + Sync + 'static) -> Self {
        Self(Arc::new(err))
    }
}

impl PartialEq<Self> for OtherError {
    fn eq(&self, _other: &Self) -> bool {
        false
    }
}

impl fmt::Display for OtherError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl StdError for OtherError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(self.0.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::{Error, ErrorKind, InvalidMessage, OtherError};
    use crate::modules::ModuleId;
    use crate::server::HandshakeStage;

    #[test]
    fn smoke() {
        let all = vec![
            Error::InappropriateHandshakeMessage {
                expect_types: vec![HandshakeStage::ClientHello, HandshakeStage::Finished],
                got_type: HandshakeStage::ServerHello,
            },
            Error::InvalidMessage(InvalidMessage::MalformedCipherSuiteList),
            Error::StepLimitReached(16),
            Error::HandshakeAlreadyComplete,
            Error::DuplicateMessage(HandshakeStage::ClientHello),
            Error::NoCommonCipherSuite,
            Error::NotFound,
            Error::MissingModule(ModuleId::Certificates),
            Error::ModuleInit(
                ModuleId::Certificates,
                OtherError::new(std::io::Error::from(std::io::ErrorKind::NotFound)),
            ),
            Error::General("undocumented error".to_string()),
        ];

        for err in all {
            println!("{:?}:", err);
            println!("  fmt '{}'", err);
        }
    }

    #[test]
    fn display_names_the_expected_stages() {
        let err = Error::InappropriateHandshakeMessage {
            expect_types: vec![HandshakeStage::ClientHello, HandshakeStage::Finished],
            got_type: HandshakeStage::ServerHello,
        };
        assert_eq!(
            err.to_string(),
            "received unexpected handshake message: got ServerHello when expecting ClientHello or Finished"
        );
    }

    #[test]
    fn kinds_separate_bad_order_from_bad_bytes() {
        assert_eq!(Error::StepLimitReached(16).kind(), ErrorKind::FlowOrder);
        assert_eq!(
            Error::from(InvalidMessage::TrailingOrMissingData).kind(),
            ErrorKind::MalformedInput
        );
        assert_eq!(
            Error::MissingModule(ModuleId::CipherSuites).kind(),
            ErrorKind::Configuration
        );
        assert_eq!(Error::NoCommonCipherSuite.kind(), ErrorKind::Negotiation);
        assert_eq!(Error::FailedToGetRandomBytes.kind(), ErrorKind::Internal);
    }

    #[test]
    fn other_errors_never_compare_equal() {
        let a = OtherError::new(std::io::Error::from(std::io::ErrorKind::Other));
        assert_ne!(a, a.clone());
    }
}
