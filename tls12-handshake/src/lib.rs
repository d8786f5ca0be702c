//! # tls12-handshake
//!
//! A server-side TLS 1.2 handshake engine.  It parses the handshake messages
//! a client sends, enforces their legal order through an explicit state
//! machine, and consults pluggable capability modules (cipher suites,
//! certificates, signature algorithms) and extension decoders to decide
//! what the server offers and accepts.
//!
//! Reading bytes from the network, record-layer framing and all symmetric
//! cryptography live outside this crate.  A connection handler hands each
//! received handshake message to [`HandshakeEngine::process_message`] (or the
//! raw header-prefixed bytes to [`HandshakeEngine::process_handshake`]), then
//! calls [`HandshakeEngine::advance`] to produce the server's next flight.
//!
//! ## Getting started
//!
//! ```no_run
//! use std::sync::Arc;
//! use tls12_handshake::{
//!     CertPaths, CertificateStore, CipherSuiteCatalog, CipherSuiteConfig, HandshakeEngine,
//!     HandshakeStage, ModuleId, ModuleRegistry, ServerConfig, SignatureAlgorithmCatalog,
//! };
//!
//! # fn main() -> Result<(), tls12_handshake::Error> {
//! let mut modules = ModuleRegistry::new();
//! modules.init_module(
//!     ModuleId::CipherSuites,
//!     CipherSuiteCatalog::init,
//!     CipherSuiteConfig::default(),
//! )?;
//! modules.init_module(
//!     ModuleId::Certificates,
//!     CertificateStore::init,
//!     vec![CertPaths::new("certs/server.crt", "certs/server.key")],
//! )?;
//! modules.init_module(
//!     ModuleId::SignatureAlgorithms,
//!     SignatureAlgorithmCatalog::init,
//!     SignatureAlgorithmCatalog::DEFAULT_SCHEMES.to_vec(),
//! )?;
//!
//! let config = ServerConfig::builder()
//!     .with_modules(modules)
//!     .build()?;
//! let engine = HandshakeEngine::new(Arc::new(config))?;
//!
//! let mut cx = engine.new_context();
//! # let client_hello_body: Vec<u8> = vec![];
//! engine.process_message(&mut cx, HandshakeStage::ClientHello, &client_hello_body)?;
//! engine.advance(&mut cx)?;
//! for message in cx.take_outgoing() {
//!     // hand `message.bytes` to the record layer
//!     # let _ = message;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Crate features
//!
//! - `logging` (enabled by default): make the engine emit log output via
//!   the `log` crate.  Protocol-level detail is logged at `trace!` and
//!   `debug!`, recoverable problems (such as an extension that fails to
//!   decode) at `warn!`.  The crate never installs a logger itself.

#![forbid(unsafe_code)]
#![warn(
    clippy::clone_on_ref_ptr,
    clippy::use_self,
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_qualifications
)]
#![allow(clippy::new_without_default, clippy::single_component_path_imports)]

// log for logging (optional).
#[cfg(feature = "logging")]
use log;

#[cfg(not(feature = "logging"))]
mod log {
    macro_rules! trace    ( ($($tt:tt)*) => {{}} );
    macro_rules! debug    ( ($($tt:tt)*) => {{}} );
    macro_rules! warn     ( ($($tt:tt)*) => {{}} );
    macro_rules! error    ( ($($tt:tt)*) => {{}} );
    #[allow(unused_imports)]
    pub(crate) use {debug, error, trace, warn};
}

#[macro_use]
mod msgs;
mod certs;
mod error;
mod extensions;
mod hash_hs;
mod modules;
mod sigalgs;
mod suites;

/// Items for use in a server.
pub mod server;

/// All defined cipher suites appear in this module.
///
/// [`ALL_CIPHER_SUITES`] is provided as an array of all of these values.
pub mod cipher_suite {
    pub use crate::suites::{
        TLS_DHE_RSA_WITH_AES_128_CBC_SHA, TLS_DHE_RSA_WITH_AES_128_CBC_SHA256,
        TLS_DHE_RSA_WITH_AES_128_GCM_SHA256, TLS_DHE_RSA_WITH_AES_256_CBC_SHA,
        TLS_DHE_RSA_WITH_AES_256_CBC_SHA256, TLS_DHE_RSA_WITH_AES_256_GCM_SHA384,
        TLS_DHE_RSA_WITH_CHACHA20_POLY1305_SHA256, TLS_RSA_WITH_AES_128_CBC_SHA,
        TLS_RSA_WITH_AES_128_CBC_SHA256, TLS_RSA_WITH_AES_128_GCM_SHA256,
        TLS_RSA_WITH_AES_256_CBC_SHA, TLS_RSA_WITH_AES_256_CBC_SHA256,
        TLS_RSA_WITH_AES_256_GCM_SHA384,
    };
}

/// Low-level TLS message parsing and encoding functions.
///
/// The contents of this module DO NOT form part of the stable interface.
pub mod internal {
    /// Wire codec and handshake message payloads.
    pub mod msgs {
        pub use crate::msgs::base::{Payload, PayloadU16, PayloadU8};
        pub use crate::msgs::codec::{Codec, Reader};
        pub use crate::msgs::handshake::{
            CertificatePayload, CertificateRequestPayload, ChangeCipherSpecPayload,
            ClientHelloPayload, ClientKeyExchangePayload, DigitallySignedStruct,
            FinishedPayload, HandshakeHeader, Random, ServerExtension, ServerHelloPayload,
            SessionId,
        };
    }
}

// The public interface is:
pub use crate::certs::{CertPaths, CertificateCriterion, CertificateRecord, CertificateStore};
pub use crate::error::{Error, ErrorKind, InvalidMessage, OtherError};
pub use crate::extensions::{ExtensionData, ExtensionDecoder, ExtensionRegistry};
pub use crate::modules::{Capabilities, Module, ModuleId, ModuleRegistry};
pub use crate::msgs::enums::{
    CipherSuite, ClientCertificateType, Compression, ECPointFormat, ExtensionType,
    HandshakeType, NamedGroup, ProtocolVersion, SignatureScheme,
};
pub use crate::server::{
    HandshakeContext, HandshakeEngine, HandshakeStage, OutboundMessage, ServerConfig,
    ServerConfigBuilder, MAX_HANDSHAKE_STEPS,
};
pub use crate::sigalgs::SignatureAlgorithmCatalog;
pub use crate::suites::{
    Authentication, BlockMode, BulkCipher, CipherSuiteCatalog, CipherSuiteConfig, HashAlgorithm,
    KeyExchange, MacMode, SuiteInfo, SupportedCipherSuite, ALL_CIPHER_SUITES,
};
