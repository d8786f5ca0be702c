use crate::certs::CertificateCriterion;
use crate::error::{Error, InvalidMessage};
use crate::log::{debug, trace};
use crate::modules::{Capabilities, ModuleId};
use crate::msgs::base::Payload;
use crate::msgs::codec::{Codec, Reader};
use crate::msgs::enums::{ClientCertificateType, HandshakeType};
use crate::msgs::handshake::{
    CertificatePayload, CertificateRequestPayload, ChangeCipherSpecPayload,
    ClientKeyExchangePayload, DigitallySignedStruct, FinishedPayload,
};
use crate::server::state::{ServerContext, State};
use crate::server::HandshakeStage;
use crate::suites::KeyExchange;

/// Decode `body` as exactly one `T`.
fn read_exact<'a, T: Codec<'a>>(body: &'a [u8], name: &'static str) -> Result<T, InvalidMessage> {
    let mut r = Reader::init(body);
    let value = T::read(&mut r)?;
    r.expect_empty(name)?;
    Ok(value)
}

/// Certificate is sent by us after ServerHello, and by the client after
/// our ServerHelloDone when we asked for one.
pub(super) struct CertificateState;

impl State for CertificateState {
    fn stage(&self) -> HandshakeStage {
        HandshakeStage::Certificate
    }

    fn handle(&self, cx: &mut ServerContext<'_>) -> Result<HandshakeStage, Error> {
        match cx.hs.awaiting_peer() {
            true => expect_certificate(cx),
            false => emit_certificate(cx),
        }
    }
}

fn emit_certificate(cx: &mut ServerContext<'_>) -> Result<HandshakeStage, Error> {
    let modules = &cx.config.modules;
    let server_name = cx
        .hs
        .client_hello
        .as_ref()
        .and_then(|hello| hello.server_names())
        .and_then(|names| names.first())
        .cloned();

    let (record, matched) = match &server_name {
        Some(name) => match modules.find_certificate(&CertificateCriterion::ServerName(name)) {
            Ok(record) => (record, true),
            Err(Error::NotFound) => {
                debug!("No certificate for {:?}; using the default", name);
                (modules.find_certificate(&CertificateCriterion::Any)?, false)
            }
            Err(err) => return Err(err),
        },
        None => (modules.find_certificate(&CertificateCriterion::Any)?, false),
    };
    debug!(
        "Selected certificate CN={:?} for server name {:?}",
        record.common_name(),
        server_name
    );

    let chain = record.chain().to_vec();
    let payload = CertificatePayload(chain.clone());
    cx.hs
        .emit(HandshakeStage::Certificate, HandshakeType::Certificate, &payload);
    cx.hs.server_certificate = chain;
    if matched {
        cx.hs.server_name = server_name;
    }
    cx.hs.record(HandshakeStage::Certificate);

    match cx.config.client_auth {
        true => Ok(HandshakeStage::CertificateRequest),
        false => Ok(HandshakeStage::ServerHelloDone),
    }
}

fn expect_certificate(cx: &mut ServerContext<'_>) -> Result<HandshakeStage, Error> {
    let body = cx
        .hs
        .take_buffer(HandshakeStage::Certificate)?;
    let chain = read_exact::<CertificatePayload>(&body, "CertificatePayload")?;
    trace!("Received client certificate chain of {} certs", chain.0.len());

    cx.hs
        .transcript
        .add_message(HandshakeType::Certificate, &body);
    cx.hs.client_certificates = chain.0;
    cx.hs.record(HandshakeStage::Certificate);
    Ok(HandshakeStage::ClientKeyExchange)
}

/// Asks the client for a certificate.
pub(super) struct EmitCertificateRequest;

impl State for EmitCertificateRequest {
    fn stage(&self) -> HandshakeStage {
        HandshakeStage::CertificateRequest
    }

    fn handle(&self, cx: &mut ServerContext<'_>) -> Result<HandshakeStage, Error> {
        let sigschemes = cx
            .config
            .modules
            .signature_algorithms()
            .ok_or(Error::MissingModule(ModuleId::SignatureAlgorithms))?
            .schemes()
            .to_vec();

        let cr = CertificateRequestPayload {
            certtypes: vec![
                ClientCertificateType::RSASign,
                ClientCertificateType::ECDSASign,
            ],
            sigschemes,
            canames: Vec::new(),
        };
        trace!("Sending CertificateRequest {:?}", cr);

        cx.hs.emit(
            HandshakeStage::CertificateRequest,
            HandshakeType::CertificateRequest,
            &cr,
        );
        cx.hs.client_auth_requested = true;
        cx.hs
            .record(HandshakeStage::CertificateRequest);
        Ok(HandshakeStage::ServerHelloDone)
    }
}

/// Ends our flight.
pub(super) struct EmitServerHelloDone;

impl State for EmitServerHelloDone {
    fn stage(&self) -> HandshakeStage {
        HandshakeStage::ServerHelloDone
    }

    fn handle(&self, cx: &mut ServerContext<'_>) -> Result<HandshakeStage, Error> {
        cx.hs.emit(
            HandshakeStage::ServerHelloDone,
            HandshakeType::ServerHelloDone,
            &Payload::empty(),
        );
        cx.hs.record(HandshakeStage::ServerHelloDone);

        match cx.hs.client_auth_requested {
            true => Ok(HandshakeStage::Certificate),
            false => Ok(HandshakeStage::ClientKeyExchange),
        }
    }
}

/// Takes the client's key exchange value.  Deriving secrets from it is
/// left to the caller.
pub(super) struct ExpectClientKx;

impl State for ExpectClientKx {
    fn stage(&self) -> HandshakeStage {
        HandshakeStage::ClientKeyExchange
    }

    fn handle(&self, cx: &mut ServerContext<'_>) -> Result<HandshakeStage, Error> {
        let body = cx
            .hs
            .take_buffer(HandshakeStage::ClientKeyExchange)?;
        let ckx = ClientKeyExchangePayload::read_bytes(&body)?;

        let dhe = cx
            .hs
            .suite
            .is_some_and(|suite| suite.info.key_exchange == KeyExchange::Dhe);
        if dhe && ckx.bytes().is_empty() {
            return Err(InvalidMessage::IllegalEmptyList("ClientKeyExchange").into());
        }
        trace!("Received {} bytes of client key exchange", ckx.bytes().len());

        cx.hs
            .transcript
            .add_message(HandshakeType::ClientKeyExchange, &body);
        cx.hs.client_key_exchange = Some(ckx.bytes().to_vec());
        cx.hs
            .record(HandshakeStage::ClientKeyExchange);
        Ok(HandshakeStage::Transition)
    }
}

/// Decides whether CertificateVerify follows the key exchange.
pub(super) struct Transition;

impl State for Transition {
    fn stage(&self) -> HandshakeStage {
        HandshakeStage::Transition
    }

    fn handle(&self, cx: &mut ServerContext<'_>) -> Result<HandshakeStage, Error> {
        match cx.hs.client_certificates.is_empty() {
            true => Ok(HandshakeStage::ChangeCipherSpec),
            false => Ok(HandshakeStage::CertificateVerify),
        }
    }
}

/// Checks the client signed with a scheme we offered.  The signature
/// itself is checked by the caller.
pub(super) struct ExpectCertificateVerify;

impl State for ExpectCertificateVerify {
    fn stage(&self) -> HandshakeStage {
        HandshakeStage::CertificateVerify
    }

    fn handle(&self, cx: &mut ServerContext<'_>) -> Result<HandshakeStage, Error> {
        let body = cx
            .hs
            .take_buffer(HandshakeStage::CertificateVerify)?;
        let sig = DigitallySignedStruct::read_bytes(&body)?;

        let sigalgs = cx
            .config
            .modules
            .signature_algorithms()
            .ok_or(Error::MissingModule(ModuleId::SignatureAlgorithms))?;
        if !sigalgs.supports(sig.scheme) {
            return Err(Error::UnsupportedSignatureScheme(sig.scheme));
        }
        if sig.signature().is_empty() {
            return Err(InvalidMessage::IllegalEmptyList("Signature").into());
        }
        trace!("Received CertificateVerify using {:?}", sig.scheme);

        cx.hs
            .transcript
            .add_message(HandshakeType::CertificateVerify, &body);
        cx.hs.client_verify_scheme = Some(sig.scheme);
        cx.hs
            .record(HandshakeStage::CertificateVerify);
        Ok(HandshakeStage::ChangeCipherSpec)
    }
}

/// The client's ChangeCipherSpec.
pub(super) struct ExpectCcs;

impl State for ExpectCcs {
    fn stage(&self) -> HandshakeStage {
        HandshakeStage::ChangeCipherSpec
    }

    fn handle(&self, cx: &mut ServerContext<'_>) -> Result<HandshakeStage, Error> {
        let body = cx
            .hs
            .take_buffer(HandshakeStage::ChangeCipherSpec)?;
        ChangeCipherSpecPayload::read_bytes(&body)?;

        cx.hs
            .record(HandshakeStage::ChangeCipherSpec);
        Ok(HandshakeStage::Finished)
    }
}

/// The client's Finished; the last message this engine handles.
pub(super) struct ExpectFinished;

impl State for ExpectFinished {
    fn stage(&self) -> HandshakeStage {
        HandshakeStage::Finished
    }

    fn handle(&self, cx: &mut ServerContext<'_>) -> Result<HandshakeStage, Error> {
        let body = cx
            .hs
            .take_buffer(HandshakeStage::Finished)?;
        let finished = FinishedPayload::read_bytes(&body)?;
        debug!("Received client Finished {:?}", finished);

        cx.hs
            .transcript
            .add_message(HandshakeType::Finished, &body);
        cx.hs.client_verify_data = Some(finished.0);
        cx.hs.record(HandshakeStage::Finished);
        Ok(HandshakeStage::Finished)
    }
}
