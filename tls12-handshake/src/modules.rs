use std::collections::BTreeMap;
use std::error::Error as StdError;

use crate::certs::{CertificateCriterion, CertificateRecord, CertificateStore};
use crate::error::{Error, OtherError};
use crate::log::debug;
use crate::msgs::enums::CipherSuite;
use crate::sigalgs::SignatureAlgorithmCatalog;
use crate::suites::CipherSuiteCatalog;

/// Identifies a kind of capability module.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum ModuleId {
    /// The [`CipherSuiteCatalog`].
    CipherSuites = 1,
    /// The [`CertificateStore`].
    Certificates = 2,
    /// The [`SignatureAlgorithmCatalog`].
    SignatureAlgorithms = 3,
}

impl ModuleId {
    /// Every module a server needs to run a full handshake.
    pub const ALL: &'static [Self] = &[
        Self::CipherSuites,
        Self::Certificates,
        Self::SignatureAlgorithms,
    ];

    /// A name for log output.
    pub fn name(self) -> &'static str {
        match self {
            Self::CipherSuites => "cipher_suites",
            Self::Certificates => "certificates",
            Self::SignatureAlgorithms => "signature_algorithms",
        }
    }
}

/// An initialized capability module.
#[non_exhaustive]
#[derive(Debug)]
pub enum Module {
    /// Negotiable cipher suites.
    CipherSuites(CipherSuiteCatalog),
    /// Certificates to present.
    Certificates(CertificateStore),
    /// Acceptable signature schemes.
    SignatureAlgorithms(SignatureAlgorithmCatalog),
}

impl Module {
    /// Which kind of module this is.
    pub fn id(&self) -> ModuleId {
        match self {
            Self::CipherSuites(_) => ModuleId::CipherSuites,
            Self::Certificates(_) => ModuleId::Certificates,
            Self::SignatureAlgorithms(_) => ModuleId::SignatureAlgorithms,
        }
    }
}

/// What the handshake can ask of the loaded modules.
pub trait Capabilities: Send + Sync {
    /// The cipher suite catalog, if loaded.
    fn cipher_suites(&self) -> Option<&CipherSuiteCatalog>;

    /// The certificate store, if loaded.
    fn certificates(&self) -> Option<&CertificateStore>;

    /// The signature algorithm catalog, if loaded.
    fn signature_algorithms(&self) -> Option<&SignatureAlgorithmCatalog>;

    /// The name of `suite` if it is one we support.
    fn suite_name(&self, suite: CipherSuite) -> Option<&'static str> {
        self.cipher_suites()?
            .find(suite)
            .map(|scs| scs.name)
    }

    /// The first certificate satisfying `criterion`.
    fn find_certificate(
        &self,
        criterion: &CertificateCriterion<'_>,
    ) -> Result<&CertificateRecord, Error> {
        self.certificates()
            .ok_or(Error::MissingModule(ModuleId::Certificates))?
            .find(criterion)
    }
}

/// Holds one initialized module per [`ModuleId`].
///
/// Populated once at startup; shared read-only afterwards.
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    modules: BTreeMap<ModuleId, Module>,
}

impl ModuleRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `init` with `config` and store the result under `id`.
    ///
    /// Fails with [`Error::DuplicateModule`] without running `init` if `id`
    /// is already present, with [`Error::ModuleInit`] wrapping the failure
    /// of `init`, and with [`Error::ModuleKindMismatch`] if `init` returns
    /// a module of some other kind.
    pub fn init_module<C, E, F>(&mut self, id: ModuleId, init: F, config: C) -> Result<(), Error>
    where
        F: FnOnce(C) -> Result<Module, E>,
        E: StdError + Send + Sync + 'static,
    {
        if self.modules.contains_key(&id) {
            return Err(Error::DuplicateModule(id));
        }

        let module = init(config).map_err(|err| Error::ModuleInit(id, OtherError::new(err)))?;
        if module.id() != id {
            return Err(Error::ModuleKindMismatch {
                expected: id,
                got: module.id(),
            });
        }

        debug!("Module loaded: {}", id.name());
        self.modules.insert(id, module);
        Ok(())
    }

    /// Fails with [`Error::MissingModule`] naming the first id in
    /// `required` that was never initialized.
    pub fn check_all_initialized(&self, required: &[ModuleId]) -> Result<(), Error> {
        match required
            .iter()
            .find(|id| !self.modules.contains_key(*id))
        {
            Some(missing) => Err(Error::MissingModule(*missing)),
            None => Ok(()),
        }
    }

    /// The module stored under `id`.
    pub fn lookup(&self, id: ModuleId) -> Option<&Module> {
        self.modules.get(&id)
    }

    /// The first loaded certificate satisfying `criterion`.
    pub fn find_certificate(
        &self,
        criterion: &CertificateCriterion<'_>,
    ) -> Result<&CertificateRecord, Error> {
        Capabilities::find_certificate(self, criterion)
    }
}

impl Capabilities for ModuleRegistry {
    fn cipher_suites(&self) -> Option<&CipherSuiteCatalog> {
        match self.lookup(ModuleId::CipherSuites)? {
            Module::CipherSuites(catalog) => Some(catalog),
            _ => None,
        }
    }

    fn certificates(&self) -> Option<&CertificateStore> {
        match self.lookup(ModuleId::Certificates)? {
            Module::Certificates(store) => Some(store),
            _ => None,
        }
    }

    fn signature_algorithms(&self) -> Option<&SignatureAlgorithmCatalog> {
        match self.lookup(ModuleId::SignatureAlgorithms)? {
            Module::SignatureAlgorithms(catalog) => Some(catalog),
            _ => None,
        }
    }
}
