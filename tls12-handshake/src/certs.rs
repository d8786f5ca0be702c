use std::path::PathBuf;

use pki_types::pem::PemObject;
use pki_types::{CertificateDer, PrivateKeyDer};
use x509_parser::extensions::GeneralName;
use x509_parser::prelude::{FromDer, X509Certificate};

use crate::error::Error;
use crate::log::debug;
use crate::modules::Module;

/// Where to load one certificate chain and its private key from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CertPaths {
    /// PEM file holding the chain, leaf first.
    pub cert: PathBuf,
    /// PEM file holding the private key.
    pub key: PathBuf,
}

impl CertPaths {
    /// Pair a certificate file with its key file.
    pub fn new(cert: impl Into<PathBuf>, key: impl Into<PathBuf>) -> Self {
        Self {
            cert: cert.into(),
            key: key.into(),
        }
    }
}

/// How to pick a certificate from a [`CertificateStore`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CertificateCriterion<'a> {
    /// The leaf's subject Common Name equals this, ignoring ASCII case.
    CommonName(&'a str),
    /// The leaf is valid for this DNS name: a subjectAltName entry
    /// matches (wildcards cover one label), or there are no DNS names
    /// and the Common Name matches.
    ServerName(&'a str),
    /// Any certificate.
    Any,
}

/// A loaded certificate chain and private key.
#[derive(Debug)]
pub struct CertificateRecord {
    paths: Option<CertPaths>,
    chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
    common_name: Option<String>,
    dns_names: Vec<String>,
}

impl CertificateRecord {
    /// Read the PEM files named by `paths`.
    pub fn load(paths: &CertPaths) -> Result<Self, Error> {
        let chain = CertificateDer::pem_file_iter(&paths.cert)
            .and_then(|iter| iter.collect::<Result<Vec<_>, _>>())
            .map_err(|err| {
                Error::General(format!(
                    "cannot read certificates from {}: {}",
                    paths.cert.display(),
                    err
                ))
            })?;

        let key = PrivateKeyDer::from_pem_file(&paths.key).map_err(|err| {
            Error::General(format!(
                "cannot read private key from {}: {}",
                paths.key.display(),
                err
            ))
        })?;

        let mut record = Self::from_der(chain, key)?;
        record.paths = Some(paths.clone());
        Ok(record)
    }

    /// Build a record from an already-decoded chain and key.
    pub fn from_der(
        chain: Vec<CertificateDer<'static>>,
        key: PrivateKeyDer<'static>,
    ) -> Result<Self, Error> {
        let Some(leaf) = chain.first() else {
            return Err(Error::General("empty certificate chain".into()));
        };

        let (_, cert) = X509Certificate::from_der(leaf.as_ref())
            .map_err(|err| Error::General(format!("cannot parse certificate: {}", err)))?;

        let common_name = cert
            .subject()
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .map(str::to_owned);

        let dns_names = match cert.subject_alternative_name() {
            Ok(Some(san)) => san
                .value
                .general_names
                .iter()
                .filter_map(|name| match name {
                    GeneralName::DNSName(dns) => Some(dns.to_string()),
                    _ => None,
                })
                .collect(),
            Ok(None) => Vec::new(),
            Err(err) => {
                return Err(Error::General(format!(
                    "cannot parse subjectAltName: {}",
                    err
                )))
            }
        };

        Ok(Self {
            paths: None,
            chain,
            key,
            common_name,
            dns_names,
        })
    }

    /// The files this record was loaded from, if any.
    pub fn paths(&self) -> Option<&CertPaths> {
        self.paths.as_ref()
    }

    /// The chain, leaf first.
    pub fn chain(&self) -> &[CertificateDer<'static>] {
        &self.chain
    }

    /// The private key.
    pub fn key(&self) -> &PrivateKeyDer<'static> {
        &self.key
    }

    /// The leaf's subject Common Name.
    pub fn common_name(&self) -> Option<&str> {
        self.common_name.as_deref()
    }

    /// The leaf's DNS subjectAltNames.
    pub fn dns_names(&self) -> &[String] {
        &self.dns_names
    }

    /// Whether this record satisfies `criterion`.
    pub fn matches(&self, criterion: &CertificateCriterion<'_>) -> bool {
        match *criterion {
            CertificateCriterion::Any => true,
            CertificateCriterion::CommonName(cn) => self
                .common_name
                .as_deref()
                .is_some_and(|ours| ours.eq_ignore_ascii_case(cn)),
            CertificateCriterion::ServerName(name) => match self.dns_names.is_empty() {
                true => self
                    .common_name
                    .as_deref()
                    .is_some_and(|ours| dns_name_matches(ours, name)),
                false => self
                    .dns_names
                    .iter()
                    .any(|ours| dns_name_matches(ours, name)),
            },
        }
    }
}

fn dns_name_matches(pattern: &str, name: &str) -> bool {
    let pattern = pattern.trim_end_matches('.');
    let name = name.trim_end_matches('.');

    match pattern.strip_prefix("*.") {
        Some(suffix) => match name.split_once('.') {
            Some((label, rest)) => !label.is_empty() && rest.eq_ignore_ascii_case(suffix),
            None => false,
        },
        None => pattern.eq_ignore_ascii_case(name),
    }
}

/// The certificates this server can present.
///
/// Read-only once built; lookups never mutate it.
#[derive(Debug)]
pub struct CertificateStore {
    records: Vec<CertificateRecord>,
}

impl CertificateStore {
    /// Module initializer for [`crate::ModuleId::Certificates`].
    pub fn init(paths: Vec<CertPaths>) -> Result<Module, Error> {
        Self::load(&paths).map(Module::Certificates)
    }

    /// Load every pair in `paths`.
    pub fn load(paths: &[CertPaths]) -> Result<Self, Error> {
        let records = paths
            .iter()
            .map(CertificateRecord::load)
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_records(records)
    }

    /// Build a store from records already in memory.
    pub fn from_records(records: Vec<CertificateRecord>) -> Result<Self, Error> {
        if records.is_empty() {
            return Err(Error::General("no certificates configured".into()));
        }

        for record in &records {
            debug!(
                "Certificate loaded: CN={:?} DNS={:?}",
                record.common_name(),
                record.dns_names()
            );
        }
        Ok(Self { records })
    }

    /// All records, in load order.
    pub fn records(&self) -> &[CertificateRecord] {
        &self.records
    }

    /// The first record satisfying `criterion`.
    pub fn find(&self, criterion: &CertificateCriterion<'_>) -> Result<&CertificateRecord, Error> {
        self.records
            .iter()
            .find(|record| record.matches(criterion))
            .ok_or(Error::NotFound)
    }
}
