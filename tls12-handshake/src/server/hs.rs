use ring::rand::{SecureRandom, SystemRandom};

use crate::error::Error;
use crate::log::{debug, trace};
use crate::modules::{Capabilities, ModuleId};
use crate::msgs::enums::{Compression, HandshakeType, ProtocolVersion};
use crate::msgs::handshake::{
    ClientHelloPayload, Random, ServerExtension, ServerHelloPayload, SessionId,
};
use crate::server::state::{ServerContext, State};
use crate::server::{HandshakeStage, ServerConfig};

/// Parses the ClientHello.
pub(super) struct ExpectClientHello;

impl State for ExpectClientHello {
    fn stage(&self) -> HandshakeStage {
        HandshakeStage::ClientHello
    }

    fn handle(&self, cx: &mut ServerContext<'_>) -> Result<HandshakeStage, Error> {
        let body = cx
            .hs
            .take_buffer(HandshakeStage::ClientHello)?;
        let hello = ClientHelloPayload::parse(&body, &cx.config.extensions, &cx.config.modules)?;
        debug!(
            "Received ClientHello: version {:?}, {} cipher suites, {} extensions",
            hello.client_version,
            hello.cipher_suites.len(),
            hello.extensions.len()
        );

        cx.hs
            .transcript
            .add_message(HandshakeType::ClientHello, &body);
        cx.hs.client_random = Some(hello.random);
        cx.hs.client_hello = Some(hello);
        cx.hs.record(HandshakeStage::ClientHello);
        Ok(HandshakeStage::ServerHello)
    }
}

/// Negotiates parameters and sends ServerHello.
pub(super) struct EmitServerHello;

impl State for EmitServerHello {
    fn stage(&self) -> HandshakeStage {
        HandshakeStage::ServerHello
    }

    fn handle(&self, cx: &mut ServerContext<'_>) -> Result<HandshakeStage, Error> {
        let config = cx.config;
        let hello = cx
            .hs
            .client_hello
            .as_ref()
            .ok_or(Error::MissingMessage(HandshakeStage::ClientHello))?;

        if u16::from(hello.client_version) < u16::from(ProtocolVersion::TLSv1_2) {
            return Err(Error::UnsupportedProtocolVersion(hello.client_version));
        }

        let suite = config
            .modules
            .cipher_suites()
            .ok_or(Error::MissingModule(ModuleId::CipherSuites))?
            .choose(&hello.cipher_suites)
            .ok_or(Error::NoCommonCipherSuite)?;
        debug!("decided upon suite {:?}", suite);

        let sigscheme = config
            .modules
            .signature_algorithms()
            .ok_or(Error::MissingModule(ModuleId::SignatureAlgorithms))?
            .choose(hello.signature_schemes())
            .ok_or(Error::NoCommonSignatureScheme)?;
        debug!("decided upon signature scheme {:?}", sigscheme);

        let mut ep = ExtensionProcessing::new();
        ep.process_common(config, hello)?;

        let mut random = [0u8; 32];
        SystemRandom::new()
            .fill(&mut random)
            .map_err(|_| Error::FailedToGetRandomBytes)?;

        let sh = ServerHelloPayload {
            server_version: ProtocolVersion::TLSv1_2,
            random: Random::from(random),
            session_id: SessionId::empty(),
            cipher_suite: suite.suite,
            compression_method: Compression::Null,
            extensions: ep.extensions,
        };
        trace!("sending server hello {:?}", sh);

        cx.hs
            .emit(HandshakeStage::ServerHello, HandshakeType::ServerHello, &sh);
        cx.hs.server_random = Some(sh.random);
        cx.hs.suite = Some(suite);
        cx.hs.signature_scheme = Some(sigscheme);
        cx.hs.alpn_protocol = ep.alpn_protocol;
        cx.hs.using_ems = ep.using_ems;
        cx.hs.record(HandshakeStage::ServerHello);
        Ok(HandshakeStage::Certificate)
    }
}

/// Works out which ServerHello extensions answer the client's.
struct ExtensionProcessing {
    extensions: Vec<ServerExtension>,
    alpn_protocol: Option<Vec<u8>>,
    using_ems: bool,
}

impl ExtensionProcessing {
    fn new() -> Self {
        Self {
            extensions: Vec::new(),
            alpn_protocol: None,
            using_ems: false,
        }
    }

    fn process_common(
        &mut self,
        config: &ServerConfig,
        hello: &ClientHelloPayload,
    ) -> Result<(), Error> {
        if hello.server_names().is_some() {
            self.extensions
                .push(ServerExtension::ServerNameAck);
        }

        if let Some(offered) = hello.alpn_protocols() {
            if !config.alpn_protocols.is_empty() {
                let chosen = config
                    .alpn_protocols
                    .iter()
                    .find(|ours| offered.contains(ours))
                    .ok_or(Error::NoApplicationProtocol)?;
                debug!("Chosen ALPN protocol {:?}", String::from_utf8_lossy(chosen));
                self.extensions
                    .push(ServerExtension::Protocol(chosen.clone()));
                self.alpn_protocol = Some(chosen.clone());
            }
        }

        if hello.ems_support_offered() {
            self.extensions
                .push(ServerExtension::ExtendedMasterSecretAck);
            self.using_ems = true;
        }

        if hello.secure_renegotiation_offered() {
            self.extensions
                .push(ServerExtension::RenegotiationInfo(Vec::new()));
        }

        Ok(())
    }
}
