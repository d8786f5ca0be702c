#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rcgen::{Certificate, CertificateParams, DnType};
use tls12_handshake::internal::msgs::{
    CertificatePayload, ClientKeyExchangePayload, Codec, DigitallySignedStruct, PayloadU16,
};
use tls12_handshake::{
    CertPaths, CertificateRecord, CertificateStore, CipherSuiteCatalog, CipherSuiteConfig,
    HandshakeEngine, Module, ModuleId, ModuleRegistry, ServerConfig, ServerConfigBuilder,
    SignatureAlgorithmCatalog, SignatureScheme,
};

pub fn init_logging() {
    let _ = env_logger::builder()
        .is_test(true)
        .try_init();
}

fn generate(common_name: &str, sans: &[&str]) -> Certificate {
    let mut params = CertificateParams::new(
        sans.iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>(),
    );
    params
        .distinguished_name
        .push(DnType::CommonName, common_name);
    Certificate::from_params(params).unwrap()
}

/// A self-signed certificate record for `common_name`, valid for `sans`.
pub fn make_record(common_name: &str, sans: &[&str]) -> CertificateRecord {
    let cert = generate(common_name, sans);
    let chain = vec![CertificateDer::from(cert.serialize_der().unwrap())];
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(cert.serialize_private_key_der()));
    CertificateRecord::from_der(chain, key).unwrap()
}

/// Writes a self-signed certificate and its key as PEM files under the
/// temp directory.
pub fn write_pem_pair(common_name: &str, sans: &[&str]) -> CertPaths {
    static COUNTER: AtomicUsize = AtomicUsize::new(0);

    let cert = generate(common_name, sans);
    let dir = std::env::temp_dir().join(format!(
        "tls12-handshake-{}-{}",
        std::process::id(),
        COUNTER.fetch_add(1, Ordering::SeqCst)
    ));
    std::fs::create_dir_all(&dir).unwrap();

    let cert_path: PathBuf = dir.join("server.crt");
    let key_path: PathBuf = dir.join("server.key");
    std::fs::write(&cert_path, cert.serialize_pem().unwrap()).unwrap();
    std::fs::write(&key_path, cert.serialize_private_key_pem()).unwrap();
    CertPaths::new(cert_path, key_path)
}

/// Every module, with `records` as the certificate store.
pub fn make_modules(records: Vec<CertificateRecord>) -> ModuleRegistry {
    let mut modules = ModuleRegistry::new();
    modules
        .init_module(
            ModuleId::CipherSuites,
            CipherSuiteCatalog::init,
            CipherSuiteConfig::default(),
        )
        .unwrap();
    modules
        .init_module(
            ModuleId::Certificates,
            |records| CertificateStore::from_records(records).map(Module::Certificates),
            records,
        )
        .unwrap();
    modules
        .init_module(
            ModuleId::SignatureAlgorithms,
            SignatureAlgorithmCatalog::init,
            SignatureAlgorithmCatalog::DEFAULT_SCHEMES.to_vec(),
        )
        .unwrap();
    modules
}

pub fn default_builder() -> ServerConfigBuilder {
    ServerConfig::builder().with_modules(make_modules(vec![make_record(
        "default",
        &["default.example.com"],
    )]))
}

pub fn make_engine(builder: ServerConfigBuilder) -> HandshakeEngine {
    init_logging();
    HandshakeEngine::new(Arc::new(builder.build().unwrap())).unwrap()
}

/// Builds ClientHello bodies.
#[derive(Clone, Debug)]
pub struct ClientHelloBuilder {
    version: [u8; 2],
    random: [u8; 32],
    session_id: Vec<u8>,
    suites: Vec<u16>,
    extensions: Vec<(u16, Vec<u8>)>,
}

impl ClientHelloBuilder {
    pub fn new() -> Self {
        Self {
            version: [0x03, 0x03],
            random: [0; 32],
            session_id: Vec::new(),
            suites: vec![0x002f, 0x0035],
            extensions: Vec::new(),
        }
    }

    pub fn version(mut self, version: [u8; 2]) -> Self {
        self.version = version;
        self
    }

    pub fn session_id(mut self, id: &[u8]) -> Self {
        self.session_id = id.to_vec();
        self
    }

    pub fn suites(mut self, suites: &[u16]) -> Self {
        self.suites = suites.to_vec();
        self
    }

    pub fn extension(mut self, typ: u16, payload: &[u8]) -> Self {
        self.extensions
            .push((typ, payload.to_vec()));
        self
    }

    pub fn sni(self, name: &str) -> Self {
        let mut entry = vec![0x00];
        entry.extend_from_slice(&(name.len() as u16).to_be_bytes());
        entry.extend_from_slice(name.as_bytes());
        let mut payload = (entry.len() as u16).to_be_bytes().to_vec();
        payload.extend_from_slice(&entry);
        self.extension(0x0000, &payload)
    }

    pub fn sigalgs(self, schemes: &[SignatureScheme]) -> Self {
        let mut list = Vec::new();
        for scheme in schemes {
            scheme.encode(&mut list);
        }
        let mut payload = (list.len() as u16).to_be_bytes().to_vec();
        payload.extend_from_slice(&list);
        self.extension(0x000d, &payload)
    }

    pub fn alpn(self, protocols: &[&[u8]]) -> Self {
        let mut list = Vec::new();
        for p in protocols {
            list.push(p.len() as u8);
            list.extend_from_slice(p);
        }
        let mut payload = (list.len() as u16).to_be_bytes().to_vec();
        payload.extend_from_slice(&list);
        self.extension(0x0010, &payload)
    }

    pub fn ems(self) -> Self {
        self.extension(0x0017, &[])
    }

    pub fn build(&self) -> Vec<u8> {
        let mut body = self.version.to_vec();
        body.extend_from_slice(&self.random);
        body.push(self.session_id.len() as u8);
        body.extend_from_slice(&self.session_id);
        body.extend_from_slice(&((self.suites.len() * 2) as u16).to_be_bytes());
        for suite in &self.suites {
            body.extend_from_slice(&suite.to_be_bytes());
        }
        body.extend_from_slice(&[0x01, 0x00]);

        if !self.extensions.is_empty() {
            let mut block = Vec::new();
            for (typ, payload) in &self.extensions {
                block.extend_from_slice(&typ.to_be_bytes());
                block.extend_from_slice(&(payload.len() as u16).to_be_bytes());
                block.extend_from_slice(payload);
            }
            body.extend_from_slice(&(block.len() as u16).to_be_bytes());
            body.extend_from_slice(&block);
        }
        body
    }

    /// The body with a handshake header in front.
    pub fn build_framed(&self) -> Vec<u8> {
        let body = self.build();
        let mut out = vec![0x01];
        out.extend_from_slice(&(body.len() as u32).to_be_bytes()[1..]);
        out.extend_from_slice(&body);
        out
    }
}

pub fn client_key_exchange(value: &[u8]) -> Vec<u8> {
    ClientKeyExchangePayload(PayloadU16::new(value.to_vec())).get_encoding()
}

pub fn client_certificate(chain: &[CertificateDer<'static>]) -> Vec<u8> {
    CertificatePayload(chain.to_vec()).get_encoding()
}

pub fn certificate_verify(scheme: SignatureScheme) -> Vec<u8> {
    DigitallySignedStruct::new(scheme, vec![0x42; 64]).get_encoding()
}

pub const CCS: &[u8] = &[0x01];
pub const FINISHED: &[u8] = &[0xab; 12];
