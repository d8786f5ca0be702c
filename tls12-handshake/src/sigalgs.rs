use crate::error::Error;
use crate::log::debug;
use crate::modules::Module;
use crate::msgs::enums::SignatureScheme;

/// The IANA name of `scheme`, or `"unknown"`.
pub(crate) fn scheme_name(scheme: SignatureScheme) -> &'static str {
    match scheme {
        SignatureScheme::RSA_PKCS1_SHA1 => "rsa_pkcs1_sha1",
        SignatureScheme::ECDSA_SHA1_Legacy => "ecdsa_sha1",
        SignatureScheme::RSA_PKCS1_SHA256 => "rsa_pkcs1_sha256",
        SignatureScheme::RSA_PKCS1_SHA384 => "rsa_pkcs1_sha384",
        SignatureScheme::RSA_PKCS1_SHA512 => "rsa_pkcs1_sha512",
        SignatureScheme::ECDSA_NISTP256_SHA256 => "ecdsa_secp256r1_sha256",
        SignatureScheme::ECDSA_NISTP384_SHA384 => "ecdsa_secp384r1_sha384",
        SignatureScheme::ECDSA_NISTP521_SHA512 => "ecdsa_secp521r1_sha512",
        SignatureScheme::RSA_PSS_SHA256 => "rsa_pss_rsae_sha256",
        SignatureScheme::RSA_PSS_SHA384 => "rsa_pss_rsae_sha384",
        SignatureScheme::RSA_PSS_SHA512 => "rsa_pss_rsae_sha512",
        SignatureScheme::ED25519 => "ed25519",
        SignatureScheme::ED448 => "ed448",
        SignatureScheme::RSA_PSS_PSS_SHA256 => "rsa_pss_pss_sha256",
        SignatureScheme::RSA_PSS_PSS_SHA384 => "rsa_pss_pss_sha384",
        SignatureScheme::RSA_PSS_PSS_SHA512 => "rsa_pss_pss_sha512",
        _ => "unknown",
    }
}

/// The signature schemes this server accepts, in preference order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignatureAlgorithmCatalog {
    schemes: Vec<SignatureScheme>,
}

impl SignatureAlgorithmCatalog {
    /// A reasonable default set of schemes.
    pub const DEFAULT_SCHEMES: &'static [SignatureScheme] = &[
        SignatureScheme::ECDSA_NISTP384_SHA384,
        SignatureScheme::ECDSA_NISTP256_SHA256,
        SignatureScheme::ED25519,
        SignatureScheme::RSA_PSS_SHA512,
        SignatureScheme::RSA_PSS_SHA384,
        SignatureScheme::RSA_PSS_SHA256,
        SignatureScheme::RSA_PKCS1_SHA512,
        SignatureScheme::RSA_PKCS1_SHA384,
        SignatureScheme::RSA_PKCS1_SHA256,
        SignatureScheme::RSA_PKCS1_SHA1,
    ];

    /// What a client supports when it omits signature_algorithms
    /// (RFC 5246, section 7.4.1.4.1).
    pub const IMPLIED_SCHEMES: &'static [SignatureScheme] = &[SignatureScheme::RSA_PKCS1_SHA1];

    /// Module initializer for [`crate::ModuleId::SignatureAlgorithms`].
    pub fn init(schemes: Vec<SignatureScheme>) -> Result<Module, Error> {
        Self::new(schemes).map(Module::SignatureAlgorithms)
    }

    /// Build a catalog from `schemes`, most preferred first.
    pub fn new(schemes: Vec<SignatureScheme>) -> Result<Self, Error> {
        if schemes.is_empty() {
            return Err(Error::General("no signature schemes configured".into()));
        }

        if let Some(unknown) = schemes
            .iter()
            .find(|s| matches!(s, SignatureScheme::Unknown(_)))
        {
            return Err(Error::General(format!(
                "unsupported signature scheme {:?}",
                unknown
            )));
        }

        debug!(
            "Signature schemes: {:?}",
            schemes
                .iter()
                .map(|s| scheme_name(*s))
                .collect::<Vec<_>>()
        );
        Ok(Self { schemes })
    }

    /// The IANA name of `scheme`.
    pub fn name(scheme: SignatureScheme) -> &'static str {
        scheme_name(scheme)
    }

    /// Our schemes, most preferred first.
    pub fn schemes(&self) -> &[SignatureScheme] {
        &self.schemes
    }

    /// Whether we accept `scheme`.
    pub fn supports(&self, scheme: SignatureScheme) -> bool {
        self.schemes.contains(&scheme)
    }

    /// Pick our most preferred scheme that the client also offered.
    ///
    /// `offered` is `None` when the client sent no signature_algorithms
    /// extension, in which case [`Self::IMPLIED_SCHEMES`] apply.
    pub fn choose(&self, offered: Option<&[SignatureScheme]>) -> Option<SignatureScheme> {
        let offered = offered.unwrap_or(Self::IMPLIED_SCHEMES);
        self.schemes
            .iter()
            .find(|ours| offered.contains(ours))
            .copied()
    }
}
