use std::collections::HashMap;
use std::fmt;

use pki_types::DnsName;

use crate::error::{Error, InvalidMessage};
use crate::log::debug;
use crate::msgs::base::PayloadU8;
use crate::msgs::codec::{self, Codec, Reader};
use crate::msgs::enums::{ECPointFormat, ExtensionType, NamedGroup, ServerNameType, SignatureScheme};
use crate::sigalgs;

/// The decoded payload of one ClientHello extension.
#[non_exhaustive]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExtensionData {
    /// server_name: the host names offered.
    ServerName(Vec<String>),
    /// supported_groups.
    SupportedGroups(Vec<NamedGroup>),
    /// ec_point_formats.
    EcPointFormats(Vec<ECPointFormat>),
    /// signature_algorithms.
    SignatureAlgorithms(Vec<SignatureScheme>),
    /// application_layer_protocol_negotiation: protocol names in client order.
    Alpn(Vec<Vec<u8>>),
    /// extended_master_secret (always empty).
    ExtendedMasterSecret,
    /// renegotiation_info.
    RenegotiationInfo(Vec<u8>),
    /// The payload of an extension decoded by an application-supplied decoder.
    Opaque(Vec<u8>),
}

/// Turns the payload of one extension type into [`ExtensionData`].
///
/// Decoders are registered once at startup and then shared between all
/// connections, hence `Send + Sync`.
pub trait ExtensionDecoder: Send + Sync {
    /// The extension type this decoder handles.
    fn ext_type(&self) -> ExtensionType;

    /// A short name used in log output.
    fn name(&self) -> &'static str;

    /// Decode `payload`, the extension body without its type and length.
    ///
    /// An error here is not fatal to the handshake: the extension is
    /// treated as absent.
    fn decode(&self, payload: &[u8]) -> Result<ExtensionData, InvalidMessage>;

    /// Render decoded data for diagnostics.
    fn render(&self, data: &ExtensionData) -> String {
        format!("{:?}", data)
    }
}

/// Maps extension types to their decoders.
pub struct ExtensionRegistry {
    decoders: HashMap<ExtensionType, Box<dyn ExtensionDecoder>>,
}

impl ExtensionRegistry {
    /// An empty registry.  Every extension will be skipped.
    pub fn new() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// A registry holding decoders for server_name, supported_groups,
    /// ec_point_formats, signature_algorithms, ALPN, extended_master_secret
    /// and renegotiation_info.
    pub fn with_defaults() -> Result<Self, Error> {
        let defaults: [Box<dyn ExtensionDecoder>; 7] = [
            Box::new(ServerNameDecoder),
            Box::new(SupportedGroupsDecoder),
            Box::new(EcPointFormatsDecoder),
            Box::new(SignatureAlgorithmsDecoder),
            Box::new(AlpnDecoder),
            Box::new(ExtendedMasterSecretDecoder),
            Box::new(RenegotiationInfoDecoder),
        ];

        let mut registry = Self::new();
        for decoder in defaults {
            registry.register(decoder)?;
        }
        Ok(registry)
    }

    /// Add `decoder`.
    ///
    /// Fails with [`Error::DuplicateExtension`] if a decoder for the same
    /// type is already present; the existing one is kept.
    pub fn register(&mut self, decoder: Box<dyn ExtensionDecoder>) -> Result<(), Error> {
        let typ = decoder.ext_type();
        if self.decoders.contains_key(&typ) {
            return Err(Error::DuplicateExtension(typ));
        }

        debug!("Registered decoder {} for {:?}", decoder.name(), typ);
        self.decoders.insert(typ, decoder);
        Ok(())
    }

    /// The decoder for `typ`, if any.
    pub fn get(&self, typ: ExtensionType) -> Option<&dyn ExtensionDecoder> {
        self.decoders.get(&typ).map(|d| d.as_ref())
    }

    /// Number of registered decoders.
    pub fn len(&self) -> usize {
        self.decoders.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }
}

impl fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(
                self.decoders
                    .iter()
                    .map(|(typ, d)| (typ, d.name())),
            )
            .finish()
    }
}

struct ServerNameDecoder;

impl ExtensionDecoder for ServerNameDecoder {
    fn ext_type(&self) -> ExtensionType {
        ExtensionType::ServerName
    }

    fn name(&self) -> &'static str {
        "server_name"
    }

    fn decode(&self, payload: &[u8]) -> Result<ExtensionData, InvalidMessage> {
        let mut r = Reader::init(payload);
        let len = usize::from(u16::read(&mut r)?);
        let mut list = r.sub(len, "ServerNameList")?;
        r.expect_empty("ServerNameList")?;

        let mut names = Vec::new();
        while list.any_left() {
            let typ = ServerNameType::read(&mut list)?;
            let raw = codec::read_payload_u16(&mut list, "ServerName")?;
            if typ != ServerNameType::HostName {
                continue;
            }

            let name = std::str::from_utf8(raw).map_err(|_| InvalidMessage::InvalidServerName)?;
            let dns_name = DnsName::try_from(name).map_err(|_| InvalidMessage::InvalidServerName)?;
            names.push(dns_name.as_ref().to_owned());
        }

        if names.is_empty() {
            return Err(InvalidMessage::IllegalEmptyList("ServerNames"));
        }
        Ok(ExtensionData::ServerName(names))
    }

    fn render(&self, data: &ExtensionData) -> String {
        match data {
            ExtensionData::ServerName(names) => names.join(", "),
            other => format!("{:?}", other),
        }
    }
}

struct SupportedGroupsDecoder;

impl ExtensionDecoder for SupportedGroupsDecoder {
    fn ext_type(&self) -> ExtensionType {
        ExtensionType::EllipticCurves
    }

    fn name(&self) -> &'static str {
        "supported_groups"
    }

    fn decode(&self, payload: &[u8]) -> Result<ExtensionData, InvalidMessage> {
        let mut r = Reader::init(payload);
        let groups = codec::read_vec_u16(&mut r, "NamedGroups")?;
        r.expect_empty("NamedGroups")?;
        Ok(ExtensionData::SupportedGroups(groups))
    }
}

struct EcPointFormatsDecoder;

impl ExtensionDecoder for EcPointFormatsDecoder {
    fn ext_type(&self) -> ExtensionType {
        ExtensionType::ECPointFormats
    }

    fn name(&self) -> &'static str {
        "ec_point_formats"
    }

    fn decode(&self, payload: &[u8]) -> Result<ExtensionData, InvalidMessage> {
        let mut r = Reader::init(payload);
        let formats = codec::read_vec_u8(&mut r, "ECPointFormats")?;
        r.expect_empty("ECPointFormats")?;
        Ok(ExtensionData::EcPointFormats(formats))
    }
}

struct SignatureAlgorithmsDecoder;

impl ExtensionDecoder for SignatureAlgorithmsDecoder {
    fn ext_type(&self) -> ExtensionType {
        ExtensionType::SignatureAlgorithms
    }

    fn name(&self) -> &'static str {
        "signature_algorithms"
    }

    fn decode(&self, payload: &[u8]) -> Result<ExtensionData, InvalidMessage> {
        let mut r = Reader::init(payload);
        let schemes: Vec<SignatureScheme> = codec::read_vec_u16(&mut r, "SignatureSchemes")?;
        r.expect_empty("SignatureSchemes")?;

        if schemes.is_empty() {
            return Err(InvalidMessage::IllegalEmptyList("SignatureSchemes"));
        }
        Ok(ExtensionData::SignatureAlgorithms(schemes))
    }

    fn render(&self, data: &ExtensionData) -> String {
        match data {
            ExtensionData::SignatureAlgorithms(schemes) => schemes
                .iter()
                .map(|s| sigalgs::scheme_name(*s))
                .collect::<Vec<_>>()
                .join(", "),
            other => format!("{:?}", other),
        }
    }
}

struct AlpnDecoder;

impl ExtensionDecoder for AlpnDecoder {
    fn ext_type(&self) -> ExtensionType {
        ExtensionType::ALProtocolNegotiation
    }

    fn name(&self) -> &'static str {
        "application_layer_protocol_negotiation"
    }

    fn decode(&self, payload: &[u8]) -> Result<ExtensionData, InvalidMessage> {
        let mut r = Reader::init(payload);
        let protocols: Vec<PayloadU8> = codec::read_vec_u16(&mut r, "ProtocolNames")?;
        r.expect_empty("ProtocolNames")?;

        if protocols.is_empty() || protocols.iter().any(|p| p.0.is_empty()) {
            return Err(InvalidMessage::IllegalEmptyList("ProtocolNames"));
        }
        Ok(ExtensionData::Alpn(
            protocols
                .into_iter()
                .map(|p| p.0)
                .collect(),
        ))
    }

    fn render(&self, data: &ExtensionData) -> String {
        match data {
            ExtensionData::Alpn(protocols) => protocols
                .iter()
                .map(|p| String::from_utf8_lossy(p).into_owned())
                .collect::<Vec<_>>()
                .join(", "),
            other => format!("{:?}", other),
        }
    }
}

struct ExtendedMasterSecretDecoder;

impl ExtensionDecoder for ExtendedMasterSecretDecoder {
    fn ext_type(&self) -> ExtensionType {
        ExtensionType::ExtendedMasterSecret
    }

    fn name(&self) -> &'static str {
        "extended_master_secret"
    }

    fn decode(&self, payload: &[u8]) -> Result<ExtensionData, InvalidMessage> {
        Reader::init(payload).expect_empty("ExtendedMasterSecret")?;
        Ok(ExtensionData::ExtendedMasterSecret)
    }

    fn render(&self, _data: &ExtensionData) -> String {
        "offered".to_string()
    }
}

struct RenegotiationInfoDecoder;

impl ExtensionDecoder for RenegotiationInfoDecoder {
    fn ext_type(&self) -> ExtensionType {
        ExtensionType::RenegotiationInfo
    }

    fn name(&self) -> &'static str {
        "renegotiation_info"
    }

    fn decode(&self, payload: &[u8]) -> Result<ExtensionData, InvalidMessage> {
        let mut r = Reader::init(payload);
        let info = PayloadU8::read(&mut r)?;
        r.expect_empty("RenegotiationInfo")?;
        Ok(ExtensionData::RenegotiationInfo(info.0))
    }
}
