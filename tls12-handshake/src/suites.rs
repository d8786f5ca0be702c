use std::fmt;

use ring::digest;

use crate::error::Error;
use crate::log::debug;
use crate::modules::Module;
use crate::msgs::enums::CipherSuite;

/// How record integrity is protected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MacMode {
    /// Encrypt-then-MAC (RFC 7366).
    Etm,
    /// MAC-then-encrypt, the TLS 1.2 default for block ciphers.
    Mte,
    /// The cipher is an AEAD.
    Aead,
}

/// How the bulk cipher is run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockMode {
    /// Cipher block chaining.
    Cbc,
    /// Galois/counter mode.
    Gcm,
    /// A stream cipher.
    Stream,
}

/// The hash used by the suite's MAC and PRF.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HashAlgorithm {
    /// SHA-1
    Sha1,
    /// SHA-256
    Sha256,
    /// SHA-384
    Sha384,
}

/// The bulk cipher.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BulkCipher {
    /// AES
    Aes,
    /// ChaCha20
    ChaCha20,
}

/// How the premaster secret is agreed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyExchange {
    /// RSA key transport.
    Rsa,
    /// Finite-field ephemeral Diffie-Hellman.
    Dhe,
}

/// How the server authenticates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Authentication {
    /// An RSA certificate.
    Rsa,
}

/// Static description of a cipher suite.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SuiteInfo {
    /// MAC mode.
    pub mac: MacMode,
    /// Block mode.
    pub mode: BlockMode,
    /// Hash.
    pub hash: HashAlgorithm,
    /// Bulk cipher.
    pub cipher: BulkCipher,
    /// Encryption key length in bytes.
    pub key_size: usize,
    /// MAC key length in bytes; zero for AEADs.
    pub mac_key_size: usize,
    /// Fixed IV length in bytes.
    pub iv_size: usize,
    /// Key exchange.
    pub key_exchange: KeyExchange,
    /// Authentication.
    pub auth: Authentication,
}

impl SuiteInfo {
    /// The hash the TLS 1.2 PRF uses with this suite, which is never
    /// weaker than SHA-256.
    pub fn prf_hash(&self) -> &'static digest::Algorithm {
        match self.hash {
            HashAlgorithm::Sha384 => &digest::SHA384,
            HashAlgorithm::Sha1 | HashAlgorithm::Sha256 => &digest::SHA256,
        }
    }
}

/// A TLS 1.2 cipher suite supported by this crate.
#[derive(PartialEq, Eq)]
pub struct SupportedCipherSuite {
    /// The wire identifier.
    pub suite: CipherSuite,
    /// The IANA name.
    pub name: &'static str,
    /// What the suite is made of.
    pub info: SuiteInfo,
}

impl fmt::Debug for SupportedCipherSuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

const fn cbc(
    key_size: usize,
    hash: HashAlgorithm,
    mac_key_size: usize,
    key_exchange: KeyExchange,
) -> SuiteInfo {
    SuiteInfo {
        mac: MacMode::Mte,
        mode: BlockMode::Cbc,
        hash,
        cipher: BulkCipher::Aes,
        key_size,
        mac_key_size,
        iv_size: 16,
        key_exchange,
        auth: Authentication::Rsa,
    }
}

const fn gcm(key_size: usize, hash: HashAlgorithm, key_exchange: KeyExchange) -> SuiteInfo {
    SuiteInfo {
        mac: MacMode::Aead,
        mode: BlockMode::Gcm,
        hash,
        cipher: BulkCipher::Aes,
        key_size,
        mac_key_size: 0,
        iv_size: 4,
        key_exchange,
        auth: Authentication::Rsa,
    }
}

/// TLS_DHE_RSA_WITH_AES_256_GCM_SHA384
pub static TLS_DHE_RSA_WITH_AES_256_GCM_SHA384: SupportedCipherSuite = SupportedCipherSuite {
    suite: CipherSuite::TLS_DHE_RSA_WITH_AES_256_GCM_SHA384,
    name: "TLS_DHE_RSA_WITH_AES_256_GCM_SHA384",
    info: gcm(32, HashAlgorithm::Sha384, KeyExchange::Dhe),
};

/// TLS_DHE_RSA_WITH_AES_128_GCM_SHA256
pub static TLS_DHE_RSA_WITH_AES_128_GCM_SHA256: SupportedCipherSuite = SupportedCipherSuite {
    suite: CipherSuite::TLS_DHE_RSA_WITH_AES_128_GCM_SHA256,
    name: "TLS_DHE_RSA_WITH_AES_128_GCM_SHA256",
    info: gcm(16, HashAlgorithm::Sha256, KeyExchange::Dhe),
};

/// TLS_DHE_RSA_WITH_CHACHA20_POLY1305_SHA256
pub static TLS_DHE_RSA_WITH_CHACHA20_POLY1305_SHA256: SupportedCipherSuite =
    SupportedCipherSuite {
        suite: CipherSuite::TLS_DHE_RSA_WITH_CHACHA20_POLY1305_SHA256,
        name: "TLS_DHE_RSA_WITH_CHACHA20_POLY1305_SHA256",
        info: SuiteInfo {
            mac: MacMode::Aead,
            mode: BlockMode::Stream,
            hash: HashAlgorithm::Sha256,
            cipher: BulkCipher::ChaCha20,
            key_size: 32,
            mac_key_size: 0,
            iv_size: 12,
            key_exchange: KeyExchange::Dhe,
            auth: Authentication::Rsa,
        },
    };

/// TLS_RSA_WITH_AES_256_GCM_SHA384
pub static TLS_RSA_WITH_AES_256_GCM_SHA384: SupportedCipherSuite = SupportedCipherSuite {
    suite: CipherSuite::TLS_RSA_WITH_AES_256_GCM_SHA384,
    name: "TLS_RSA_WITH_AES_256_GCM_SHA384",
    info: gcm(32, HashAlgorithm::Sha384, KeyExchange::Rsa),
};

/// TLS_RSA_WITH_AES_128_GCM_SHA256
pub static TLS_RSA_WITH_AES_128_GCM_SHA256: SupportedCipherSuite = SupportedCipherSuite {
    suite: CipherSuite::TLS_RSA_WITH_AES_128_GCM_SHA256,
    name: "TLS_RSA_WITH_AES_128_GCM_SHA256",
    info: gcm(16, HashAlgorithm::Sha256, KeyExchange::Rsa),
};

/// TLS_DHE_RSA_WITH_AES_256_CBC_SHA256
pub static TLS_DHE_RSA_WITH_AES_256_CBC_SHA256: SupportedCipherSuite = SupportedCipherSuite {
    suite: CipherSuite::TLS_DHE_RSA_WITH_AES_256_CBC_SHA256,
    name: "TLS_DHE_RSA_WITH_AES_256_CBC_SHA256",
    info: cbc(32, HashAlgorithm::Sha256, 32, KeyExchange::Dhe),
};

/// TLS_DHE_RSA_WITH_AES_128_CBC_SHA256
pub static TLS_DHE_RSA_WITH_AES_128_CBC_SHA256: SupportedCipherSuite = SupportedCipherSuite {
    suite: CipherSuite::TLS_DHE_RSA_WITH_AES_128_CBC_SHA256,
    name: "TLS_DHE_RSA_WITH_AES_128_CBC_SHA256",
    info: cbc(16, HashAlgorithm::Sha256, 32, KeyExchange::Dhe),
};

/// TLS_RSA_WITH_AES_256_CBC_SHA256
pub static TLS_RSA_WITH_AES_256_CBC_SHA256: SupportedCipherSuite = SupportedCipherSuite {
    suite: CipherSuite::TLS_RSA_WITH_AES_256_CBC_SHA256,
    name: "TLS_RSA_WITH_AES_256_CBC_SHA256",
    info: cbc(32, HashAlgorithm::Sha256, 32, KeyExchange::Rsa),
};

/// TLS_RSA_WITH_AES_128_CBC_SHA256
pub static TLS_RSA_WITH_AES_128_CBC_SHA256: SupportedCipherSuite = SupportedCipherSuite {
    suite: CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA256,
    name: "TLS_RSA_WITH_AES_128_CBC_SHA256",
    info: cbc(16, HashAlgorithm::Sha256, 32, KeyExchange::Rsa),
};

/// TLS_DHE_RSA_WITH_AES_256_CBC_SHA
pub static TLS_DHE_RSA_WITH_AES_256_CBC_SHA: SupportedCipherSuite = SupportedCipherSuite {
    suite: CipherSuite::TLS_DHE_RSA_WITH_AES_256_CBC_SHA,
    name: "TLS_DHE_RSA_WITH_AES_256_CBC_SHA",
    info: cbc(32, HashAlgorithm::Sha1, 20, KeyExchange::Dhe),
};

/// TLS_DHE_RSA_WITH_AES_128_CBC_SHA
pub static TLS_DHE_RSA_WITH_AES_128_CBC_SHA: SupportedCipherSuite = SupportedCipherSuite {
    suite: CipherSuite::TLS_DHE_RSA_WITH_AES_128_CBC_SHA,
    name: "TLS_DHE_RSA_WITH_AES_128_CBC_SHA",
    info: cbc(16, HashAlgorithm::Sha1, 20, KeyExchange::Dhe),
};

/// TLS_RSA_WITH_AES_256_CBC_SHA
pub static TLS_RSA_WITH_AES_256_CBC_SHA: SupportedCipherSuite = SupportedCipherSuite {
    suite: CipherSuite::TLS_RSA_WITH_AES_256_CBC_SHA,
    name: "TLS_RSA_WITH_AES_256_CBC_SHA",
    info: cbc(32, HashAlgorithm::Sha1, 20, KeyExchange::Rsa),
};

/// TLS_RSA_WITH_AES_128_CBC_SHA
pub static TLS_RSA_WITH_AES_128_CBC_SHA: SupportedCipherSuite = SupportedCipherSuite {
    suite: CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA,
    name: "TLS_RSA_WITH_AES_128_CBC_SHA",
    info: cbc(16, HashAlgorithm::Sha1, 20, KeyExchange::Rsa),
};

/// Every suite this crate knows, in the server's default preference order.
pub static ALL_CIPHER_SUITES: &[&SupportedCipherSuite] = &[
    &TLS_DHE_RSA_WITH_AES_256_GCM_SHA384,
    &TLS_DHE_RSA_WITH_AES_128_GCM_SHA256,
    &TLS_DHE_RSA_WITH_CHACHA20_POLY1305_SHA256,
    &TLS_RSA_WITH_AES_256_GCM_SHA384,
    &TLS_RSA_WITH_AES_128_GCM_SHA256,
    &TLS_DHE_RSA_WITH_AES_256_CBC_SHA256,
    &TLS_DHE_RSA_WITH_AES_128_CBC_SHA256,
    &TLS_RSA_WITH_AES_256_CBC_SHA256,
    &TLS_RSA_WITH_AES_128_CBC_SHA256,
    &TLS_DHE_RSA_WITH_AES_256_CBC_SHA,
    &TLS_DHE_RSA_WITH_AES_128_CBC_SHA,
    &TLS_RSA_WITH_AES_256_CBC_SHA,
    &TLS_RSA_WITH_AES_128_CBC_SHA,
];

/// Configuration for [`CipherSuiteCatalog::init`].
#[derive(Clone, Debug)]
pub struct CipherSuiteConfig {
    /// Enabled suites, in server preference order.
    pub suites: Vec<&'static SupportedCipherSuite>,
    /// Weight given to the client's preference order.
    pub client_weight: u8,
    /// Weight given to the server's preference order.  The server's order
    /// is used when this is strictly greater than `client_weight`.
    pub server_weight: u8,
}

impl Default for CipherSuiteConfig {
    fn default() -> Self {
        Self {
            suites: ALL_CIPHER_SUITES.to_vec(),
            client_weight: 1,
            server_weight: 2,
        }
    }
}

/// The cipher suites this server will negotiate.
#[derive(Clone, Debug)]
pub struct CipherSuiteCatalog {
    suites: Vec<&'static SupportedCipherSuite>,
    prefer_server: bool,
}

impl CipherSuiteCatalog {
    /// Module initializer for [`crate::ModuleId::CipherSuites`].
    pub fn init(config: CipherSuiteConfig) -> Result<Module, Error> {
        Self::new(config).map(Module::CipherSuites)
    }

    /// Build a catalog from `config`.
    pub fn new(config: CipherSuiteConfig) -> Result<Self, Error> {
        if config.suites.is_empty() {
            return Err(Error::General("no cipher suites configured".into()));
        }

        let prefer_server = config.server_weight > config.client_weight;
        debug!(
            "Cipher suites: {:?}, preferring {} order",
            config.suites,
            if prefer_server { "server" } else { "client" }
        );

        Ok(Self {
            suites: config.suites,
            prefer_server,
        })
    }

    /// Enabled suites, in server preference order.
    pub fn suites(&self) -> &[&'static SupportedCipherSuite] {
        &self.suites
    }

    /// Whether selection follows the server's order.
    pub fn prefers_server_order(&self) -> bool {
        self.prefer_server
    }

    /// Look up an enabled suite by identifier.
    pub fn find(&self, suite: CipherSuite) -> Option<&'static SupportedCipherSuite> {
        self.suites
            .iter()
            .find(|scs| scs.suite == suite)
            .copied()
    }

    /// Choose a suite from those the client offered, or `None` if we
    /// share none.
    pub fn choose(&self, offered: &[CipherSuite]) -> Option<&'static SupportedCipherSuite> {
        match self.prefer_server {
            true => choose_ciphersuite_preferring_server(offered, &self.suites),
            false => choose_ciphersuite_preferring_client(offered, &self.suites),
        }
    }
}

fn choose_ciphersuite_preferring_client(
    client_suites: &[CipherSuite],
    server_suites: &[&'static SupportedCipherSuite],
) -> Option<&'static SupportedCipherSuite> {
    for client_suite in client_suites {
        if let Some(selected) = server_suites
            .iter()
            .find(|x| *client_suite == x.suite)
        {
            return Some(*selected);
        }
    }

    None
}

fn choose_ciphersuite_preferring_server(
    client_suites: &[CipherSuite],
    server_suites: &[&'static SupportedCipherSuite],
) -> Option<&'static SupportedCipherSuite> {
    if let Some(selected) = server_suites
        .iter()
        .find(|x| client_suites.contains(&x.suite))
    {
        return Some(*selected);
    }

    None
}
