use std::collections::{HashMap, HashSet};
use std::fmt;

use pki_types::CertificateDer;

use crate::error::InvalidMessage;
use crate::extensions::{ExtensionData, ExtensionRegistry};
use crate::log::{trace, warn};
use crate::modules::Capabilities;
use crate::msgs::base::{hex, PayloadU16, PayloadU8};
use crate::msgs::codec::{self, Codec, Reader};
use crate::msgs::enums::{
    CipherSuite, ClientCertificateType, Compression, ECPointFormat, ExtensionType, HandshakeType,
    ProtocolVersion, SignatureScheme,
};

/// The four-byte header in front of every handshake message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HandshakeHeader {
    /// The message type byte.
    pub typ: HandshakeType,
    /// The length the header declares for the body.
    pub length: u32,
}

impl HandshakeHeader {
    /// Encoded size of the header.
    pub const LEN: usize = 4;

    /// Split `bytes` into a header and the remaining body.
    ///
    /// The length is the first four bytes read as a big-endian `u32`
    /// with the type byte masked off.  `bytes` is never modified.  The
    /// returned body is everything after the header, whatever the
    /// declared length says.
    pub fn read(bytes: &[u8]) -> Result<(Self, &[u8]), InvalidMessage> {
        let (raw, body) = match bytes {
            [typ, a, b, c, body @ ..] => ([*typ, *a, *b, *c], body),
            _ => return Err(InvalidMessage::TruncatedField("HandshakeHeader")),
        };

        let header = Self {
            typ: HandshakeType::from(raw[0]),
            length: u32::from_be_bytes(raw) & 0x00ff_ffff,
        };
        Ok((header, body))
    }

    /// Prefix `body` with a header for `typ`.
    pub fn frame(typ: HandshakeType, body: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(Self::LEN + body.len());
        typ.encode(&mut bytes);
        codec::u24(body.len() as u32).encode(&mut bytes);
        bytes.extend_from_slice(body);
        bytes
    }
}

/// The 32 byte random value sent in each hello.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Random(pub [u8; 32]);

impl fmt::Debug for Random {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        hex(f, &self.0)
    }
}

impl Codec<'_> for Random {
    fn encode(&self, bytes: &mut Vec<u8>) {
        bytes.extend_from_slice(&self.0);
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, InvalidMessage> {
        let Some(bytes) = r.take(32) else {
            return Err(InvalidMessage::TruncatedField("Random"));
        };

        let mut opaque = [0; 32];
        opaque.clone_from_slice(bytes);
        Ok(Self(opaque))
    }
}

impl From<[u8; 32]> for Random {
    #[inline]
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

/// A session id of between zero and 32 bytes.  Empty means absent.
#[derive(Copy, Clone, Eq)]
pub struct SessionId {
    len: usize,
    data: [u8; 32],
}

impl SessionId {
    /// The longest session id the protocol allows.
    pub const MAX_LEN: usize = 32;

    /// A zero-length session id.
    pub fn empty() -> Self {
        Self {
            data: [0u8; 32],
            len: 0,
        }
    }

    /// Whether this id has no bytes.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        hex(f, self.as_ref())
    }
}

impl PartialEq for SessionId {
    fn eq(&self, other: &Self) -> bool {
        self.as_ref() == other.as_ref()
    }
}

impl AsRef<[u8]> for SessionId {
    fn as_ref(&self) -> &[u8] {
        &self.data[..self.len]
    }
}

impl Codec<'_> for SessionId {
    fn encode(&self, bytes: &mut Vec<u8>) {
        debug_assert!(self.len <= Self::MAX_LEN);
        PayloadU8::encode_slice(self.as_ref(), bytes);
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, InvalidMessage> {
        let len = usize::from(u8::read(r)?);
        if len > Self::MAX_LEN {
            return Err(InvalidMessage::InvalidSessionId);
        }

        let bytes = r.take_field(len, "SessionId")?;
        let mut out = [0u8; 32];
        out[..len].clone_from_slice(bytes);
        Ok(Self { data: out, len })
    }
}

/// A decoded ClientHello.
#[derive(Clone, Debug, PartialEq)]
pub struct ClientHelloPayload {
    /// The version the client offered, kept verbatim.
    pub client_version: ProtocolVersion,
    /// The client random.
    pub random: Random,
    /// The session id; empty if the client sent none.
    pub session_id: SessionId,
    /// Offered cipher suites, in client preference order.
    pub cipher_suites: Vec<CipherSuite>,
    /// Extensions we recognised and decoded, keyed by type.
    pub extensions: HashMap<ExtensionType, ExtensionData>,
}

impl ClientHelloPayload {
    /// The smallest body that can hold a ClientHello.
    pub const MIN_LEN: usize = 38;

    /// Decode a ClientHello body (header already stripped).
    ///
    /// Extension payloads go to the decoder registered in `extensions`
    /// for their type.  Types with no decoder are skipped, and so are
    /// payloads their decoder rejects; neither fails the parse.
    /// `capabilities` is only used to name things in trace output.
    #[cfg_attr(not(feature = "logging"), allow(unused_variables))]
    pub fn parse(
        body: &[u8],
        extensions: &ExtensionRegistry,
        capabilities: &dyn Capabilities,
    ) -> Result<Self, InvalidMessage> {
        if body.len() < Self::MIN_LEN {
            return Err(InvalidMessage::MalformedMessage);
        }

        let mut r = Reader::init(body);

        let client_version = ProtocolVersion::read(&mut r)?;
        trace!("ClientHello version: {:?}", client_version);

        let random = Random::read(&mut r)?;
        trace!("ClientHello random: {:?}", random);

        let session_id = SessionId::read(&mut r)?;
        trace!("ClientHello session id: {:?}", session_id);

        let cipher_suites = read_cipher_suites(&mut r)?;
        trace!(
            "ClientHello cipher suites: {:?}",
            cipher_suites
                .iter()
                .map(|cs| capabilities
                    .suite_name(*cs)
                    .unwrap_or("unknown"))
                .collect::<Vec<_>>()
        );

        let compression = codec::read_payload_u8(&mut r, "CompressionMethods")?;
        trace!("ClientHello compression methods: {:?}", compression);

        let extensions = match r.left() {
            0 | 1 => HashMap::new(),
            _ => read_extensions(&mut r, extensions)?,
        };

        if r.used() != body.len() {
            return Err(InvalidMessage::TrailingOrMissingData);
        }

        Ok(Self {
            client_version,
            random,
            session_id,
            cipher_suites,
            extensions,
        })
    }

    /// The decoded payload of extension `typ`, if present.
    pub fn extension(&self, typ: ExtensionType) -> Option<&ExtensionData> {
        self.extensions.get(&typ)
    }

    /// Host names from the server_name extension.
    pub fn server_names(&self) -> Option<&[String]> {
        match self.extension(ExtensionType::ServerName)? {
            ExtensionData::ServerName(names) => Some(names),
            _ => None,
        }
    }

    /// Schemes from the signature_algorithms extension.
    pub fn signature_schemes(&self) -> Option<&[SignatureScheme]> {
        match self.extension(ExtensionType::SignatureAlgorithms)? {
            ExtensionData::SignatureAlgorithms(schemes) => Some(schemes),
            _ => None,
        }
    }

    /// Protocol names from the ALPN extension.
    pub fn alpn_protocols(&self) -> Option<&[Vec<u8>]> {
        match self.extension(ExtensionType::ALProtocolNegotiation)? {
            ExtensionData::Alpn(protocols) => Some(protocols),
            _ => None,
        }
    }

    /// Whether the client asked for the extended master secret.
    pub fn ems_support_offered(&self) -> bool {
        matches!(
            self.extension(ExtensionType::ExtendedMasterSecret),
            Some(ExtensionData::ExtendedMasterSecret)
        )
    }

    /// Whether the client signalled secure renegotiation, by extension
    /// or by the signalling cipher suite value.
    pub fn secure_renegotiation_offered(&self) -> bool {
        matches!(
            self.extension(ExtensionType::RenegotiationInfo),
            Some(ExtensionData::RenegotiationInfo(_))
        ) || self
            .cipher_suites
            .contains(&CipherSuite::TLS_EMPTY_RENEGOTIATION_INFO_SCSV)
    }
}

fn read_cipher_suites(r: &mut Reader<'_>) -> Result<Vec<CipherSuite>, InvalidMessage> {
    let len = u16::read(r)
        .map_err(|_| InvalidMessage::TruncatedField("CipherSuites"))?;
    if len % 2 != 0 {
        return Err(InvalidMessage::MalformedCipherSuiteList);
    }

    let mut sub = r.sub(usize::from(len), "CipherSuites")?;
    let mut suites = Vec::with_capacity(usize::from(len / 2));
    while sub.any_left() {
        suites.push(CipherSuite::read(&mut sub)?);
    }
    Ok(suites)
}

#[cfg_attr(not(feature = "logging"), allow(unused_variables))]
fn read_extensions(
    r: &mut Reader<'_>,
    registry: &ExtensionRegistry,
) -> Result<HashMap<ExtensionType, ExtensionData>, InvalidMessage> {
    let declared = usize::from(u16::read(r)?);
    if declared != r.left() {
        return Err(InvalidMessage::TrailingOrMissingData);
    }

    let mut block = Reader::init(r.rest());
    let mut seen = HashSet::new();
    let mut out = HashMap::new();

    while block.any_left() {
        let typ = ExtensionType::read(&mut block)
            .map_err(|_| InvalidMessage::TrailingOrMissingData)?;
        let payload = codec::read_payload_u16(&mut block, "Extension")
            .map_err(|_| InvalidMessage::TrailingOrMissingData)?;

        let Some(decoder) = registry.get(typ) else {
            trace!("Skipping unsupported extension {:?} ({} bytes)", typ, payload.len());
            continue;
        };

        // only repeats of extensions we act on are an error
        if !seen.insert(typ) {
            return Err(InvalidMessage::DuplicateExtension(typ));
        }

        match decoder.decode(payload) {
            Ok(data) => {
                trace!("ClientHello {}: {}", decoder.name(), decoder.render(&data));
                out.insert(typ, data);
            }
            Err(err) => {
                warn!("Ignoring {} extension that failed to decode: {:?}", decoder.name(), err);
            }
        }
    }

    Ok(out)
}

/// An extension the server sends in its ServerHello.
#[derive(Clone, Debug, PartialEq)]
pub enum ServerExtension {
    /// Empty acknowledgement of the client's server_name.
    ServerNameAck,
    /// The point formats we accept.
    EcPointFormats(Vec<ECPointFormat>),
    /// The single ALPN protocol we selected.
    Protocol(Vec<u8>),
    /// Empty acknowledgement of extended_master_secret.
    ExtendedMasterSecretAck,
    /// Renegotiated connection data; empty on an initial handshake.
    RenegotiationInfo(Vec<u8>),
    /// Anything else.
    Unknown(ExtensionType, Vec<u8>),
}

impl ServerExtension {
    /// The extension type this is sent as.
    pub fn ext_type(&self) -> ExtensionType {
        match self {
            Self::ServerNameAck => ExtensionType::ServerName,
            Self::EcPointFormats(_) => ExtensionType::ECPointFormats,
            Self::Protocol(_) => ExtensionType::ALProtocolNegotiation,
            Self::ExtendedMasterSecretAck => ExtensionType::ExtendedMasterSecret,
            Self::RenegotiationInfo(_) => ExtensionType::RenegotiationInfo,
            Self::Unknown(typ, _) => *typ,
        }
    }
}

impl Codec<'_> for ServerExtension {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.ext_type().encode(bytes);

        let mut body = Vec::new();
        match self {
            Self::ServerNameAck | Self::ExtendedMasterSecretAck => {}
            Self::EcPointFormats(formats) => codec::encode_vec_u8(&mut body, formats),
            Self::Protocol(protocol) => {
                let mut list = Vec::new();
                PayloadU8::encode_slice(protocol, &mut list);
                PayloadU16::encode_slice(&list, &mut body);
            }
            Self::RenegotiationInfo(data) => PayloadU8::encode_slice(data, &mut body),
            Self::Unknown(_, data) => body.extend_from_slice(data),
        }

        PayloadU16::encode_slice(&body, bytes);
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, InvalidMessage> {
        let typ = ExtensionType::read(r)?;
        let payload = codec::read_payload_u16(r, "ServerExtension")?;
        let mut sub = Reader::init(payload);

        let ext = match typ {
            ExtensionType::ServerName => Self::ServerNameAck,
            ExtensionType::ExtendedMasterSecret => Self::ExtendedMasterSecretAck,
            ExtensionType::ECPointFormats => {
                Self::EcPointFormats(codec::read_vec_u8(&mut sub, "ECPointFormats")?)
            }
            ExtensionType::ALProtocolNegotiation => {
                let len = usize::from(u16::read(&mut sub)?);
                let mut list = sub.sub(len, "ALPN")?;
                let protocol = PayloadU8::read(&mut list)?;
                list.expect_empty("ALPN")?;
                Self::Protocol(protocol.0)
            }
            ExtensionType::RenegotiationInfo => {
                Self::RenegotiationInfo(PayloadU8::read(&mut sub)?.0)
            }
            _ => Self::Unknown(typ, sub.rest().to_vec()),
        };

        sub.expect_empty("ServerExtension")?;
        Ok(ext)
    }
}

/// The server's ServerHello.
#[derive(Clone, Debug, PartialEq)]
pub struct ServerHelloPayload {
    /// Negotiated protocol version.
    pub server_version: ProtocolVersion,
    /// The server random.
    pub random: Random,
    /// Session id; empty because we do not resume.
    pub session_id: SessionId,
    /// The suite we picked.
    pub cipher_suite: CipherSuite,
    /// Always null compression.
    pub compression_method: Compression,
    /// Extensions we answer with.
    pub extensions: Vec<ServerExtension>,
}

impl Codec<'_> for ServerHelloPayload {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.server_version.encode(bytes);
        self.random.encode(bytes);
        self.session_id.encode(bytes);
        self.cipher_suite.encode(bytes);
        self.compression_method.encode(bytes);

        if !self.extensions.is_empty() {
            codec::encode_vec_u16(bytes, &self.extensions);
        }
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, InvalidMessage> {
        let ret = Self {
            server_version: ProtocolVersion::read(r)?,
            random: Random::read(r)?,
            session_id: SessionId::read(r)?,
            cipher_suite: CipherSuite::read(r)?,
            compression_method: Compression::read(r)?,
            extensions: match r.any_left() {
                true => codec::read_vec_u16(r, "ServerExtensions")?,
                false => Vec::new(),
            },
        };

        r.expect_empty("ServerHelloPayload")?;
        Ok(ret)
    }
}

/// A chain of DER certificates, leaf first.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CertificatePayload(pub Vec<CertificateDer<'static>>);

impl Codec<'_> for CertificatePayload {
    fn encode(&self, bytes: &mut Vec<u8>) {
        codec::encode_vec_u24(bytes, &self.0);
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, InvalidMessage> {
        let len = usize::from(codec::u24::read(r)?);
        let mut sub = r.sub(len, "CertificatePayload")?;

        let mut chain = Vec::new();
        while sub.any_left() {
            chain.push(CertificateDer::read(&mut sub)?.into_owned());
        }
        Ok(Self(chain))
    }
}

/// The server's CertificateRequest.
#[derive(Clone, Debug, PartialEq)]
pub struct CertificateRequestPayload {
    /// Certificate types we accept.
    pub certtypes: Vec<ClientCertificateType>,
    /// Signature schemes we accept in CertificateVerify.
    pub sigschemes: Vec<SignatureScheme>,
    /// Acceptable issuer names, DER encoded.
    pub canames: Vec<PayloadU16>,
}

impl Codec<'_> for CertificateRequestPayload {
    fn encode(&self, bytes: &mut Vec<u8>) {
        codec::encode_vec_u8(bytes, &self.certtypes);
        codec::encode_vec_u16(bytes, &self.sigschemes);
        codec::encode_vec_u16(bytes, &self.canames);
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, InvalidMessage> {
        let certtypes = codec::read_vec_u8(r, "ClientCertificateTypes")?;
        let sigschemes: Vec<SignatureScheme> = codec::read_vec_u16(r, "SignatureSchemes")?;
        let canames = codec::read_vec_u16(r, "DistinguishedNames")?;

        if sigschemes.is_empty() {
            return Err(InvalidMessage::IllegalEmptyList("SignatureSchemes"));
        }

        Ok(Self {
            certtypes,
            sigschemes,
            canames,
        })
    }
}

/// The client's key exchange value, opaque to this crate.
#[derive(Clone, Debug, PartialEq)]
pub struct ClientKeyExchangePayload(pub PayloadU16);

impl ClientKeyExchangePayload {
    /// The exchanged bytes, without their length prefix.
    pub fn bytes(&self) -> &[u8] {
        &self.0 .0
    }
}

impl Codec<'_> for ClientKeyExchangePayload {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.0.encode(bytes);
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, InvalidMessage> {
        let payload = codec::read_payload_u16(r, "ClientKeyExchange")?;
        r.expect_empty("ClientKeyExchange")?;
        Ok(Self(PayloadU16::new(payload.to_vec())))
    }
}

/// A signature along with the scheme that made it.
#[derive(Clone, Debug, PartialEq)]
pub struct DigitallySignedStruct {
    /// The scheme.
    pub scheme: SignatureScheme,
    sig: PayloadU16,
}

impl DigitallySignedStruct {
    /// Pair `sig` with `scheme`.
    pub fn new(scheme: SignatureScheme, sig: Vec<u8>) -> Self {
        Self {
            scheme,
            sig: PayloadU16::new(sig),
        }
    }

    /// The signature bytes.
    pub fn signature(&self) -> &[u8] {
        &self.sig.0
    }
}

impl Codec<'_> for DigitallySignedStruct {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.scheme.encode(bytes);
        self.sig.encode(bytes);
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, InvalidMessage> {
        let scheme = SignatureScheme::read(r)?;
        let sig = PayloadU16::read(r)?;
        r.expect_empty("DigitallySignedStruct")?;

        Ok(Self { scheme, sig })
    }
}

/// The body of a ChangeCipherSpec message: the single byte 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChangeCipherSpecPayload;

impl Codec<'_> for ChangeCipherSpecPayload {
    fn encode(&self, bytes: &mut Vec<u8>) {
        1u8.encode(bytes);
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, InvalidMessage> {
        match r.rest() {
            [1] => Ok(Self),
            _ => Err(InvalidMessage::InvalidCcs),
        }
    }
}

/// The verify data carried by Finished.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct FinishedPayload(pub [u8; 12]);

impl fmt::Debug for FinishedPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        hex(f, &self.0)
    }
}

impl Codec<'_> for FinishedPayload {
    fn encode(&self, bytes: &mut Vec<u8>) {
        bytes.extend_from_slice(&self.0);
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, InvalidMessage> {
        let bytes = r.take_field(12, "Finished")?;
        r.expect_empty("Finished")?;

        let mut verify_data = [0u8; 12];
        verify_data.copy_from_slice(bytes);
        Ok(Self(verify_data))
    }
}
