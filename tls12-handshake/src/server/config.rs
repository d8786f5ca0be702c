use std::fmt;

use crate::error::Error;
use crate::extensions::ExtensionRegistry;
use crate::modules::{ModuleId, ModuleRegistry};
use crate::server::{HandshakeStage, MAX_HANDSHAKE_STEPS};

/// Common configuration for every handshake a [`crate::HandshakeEngine`]
/// runs.
///
/// Built once at startup with [`ServerConfig::builder`] and then shared,
/// read-only, between all connections.
pub struct ServerConfig {
    pub(crate) extensions: ExtensionRegistry,
    pub(crate) modules: ModuleRegistry,

    /// The stage a new handshake starts in.
    pub initial_stage: HandshakeStage,

    /// How many steps one handshake may execute.
    pub max_steps: usize,

    /// Whether to send CertificateRequest.
    pub client_auth: bool,

    /// Protocol names we are willing to negotiate with ALPN, in
    /// preference order.  Empty disables ALPN.
    pub alpn_protocols: Vec<Vec<u8>>,
}

impl ServerConfig {
    /// Start building a config.
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder {
            extensions: None,
            modules: ModuleRegistry::new(),
            required_modules: ModuleId::ALL.to_vec(),
            initial_stage: HandshakeStage::ClientHello,
            max_steps: MAX_HANDSHAKE_STEPS,
            client_auth: false,
            alpn_protocols: Vec::new(),
        }
    }

    /// The extension decoders in use.
    pub fn extensions(&self) -> &ExtensionRegistry {
        &self.extensions
    }

    /// The loaded modules.
    pub fn modules(&self) -> &ModuleRegistry {
        &self.modules
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("extensions", &self.extensions)
            .field("initial_stage", &self.initial_stage)
            .field("max_steps", &self.max_steps)
            .field("client_auth", &self.client_auth)
            .field("alpn_protocols", &self.alpn_protocols)
            .finish_non_exhaustive()
    }
}

/// Builder for [`ServerConfig`].
pub struct ServerConfigBuilder {
    extensions: Option<ExtensionRegistry>,
    modules: ModuleRegistry,
    required_modules: Vec<ModuleId>,
    initial_stage: HandshakeStage,
    max_steps: usize,
    client_auth: bool,
    alpn_protocols: Vec<Vec<u8>>,
}

impl ServerConfigBuilder {
    /// Use `extensions` instead of [`ExtensionRegistry::with_defaults`].
    pub fn with_extensions(mut self, extensions: ExtensionRegistry) -> Self {
        self.extensions = Some(extensions);
        self
    }

    /// Use the modules in `modules`.
    pub fn with_modules(mut self, modules: ModuleRegistry) -> Self {
        self.modules = modules;
        self
    }

    /// Require exactly these modules at build time.  By default all of
    /// [`ModuleId::ALL`] are required.
    pub fn with_required_modules(mut self, required: &[ModuleId]) -> Self {
        self.required_modules = required.to_vec();
        self
    }

    /// Start new handshakes at `stage` rather than ClientHello.
    pub fn with_initial_stage(mut self, stage: HandshakeStage) -> Self {
        self.initial_stage = stage;
        self
    }

    /// Allow at most `max_steps` steps per handshake.
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Request a certificate from the client.
    pub fn with_client_auth(mut self) -> Self {
        self.client_auth = true;
        self
    }

    /// Negotiate these ALPN protocols, most preferred first.
    pub fn with_alpn_protocols(mut self, protocols: Vec<Vec<u8>>) -> Self {
        self.alpn_protocols = protocols;
        self
    }

    /// Check everything and produce the config.
    ///
    /// Fails with [`Error::MissingModule`] if a required module was not
    /// initialized.
    pub fn build(self) -> Result<ServerConfig, Error> {
        self.modules
            .check_all_initialized(&self.required_modules)?;

        if self.max_steps == 0 {
            return Err(Error::General("max_steps must be at least one".into()));
        }

        if self.initial_stage == HandshakeStage::Transition {
            return Err(Error::General(
                "a handshake cannot start at the Transition stage".into(),
            ));
        }

        if self
            .alpn_protocols
            .iter()
            .any(|p| p.is_empty() || p.len() > 255)
        {
            return Err(Error::General(
                "ALPN protocol names must be 1 to 255 bytes long".into(),
            ));
        }

        Ok(ServerConfig {
            extensions: match self.extensions {
                Some(extensions) => extensions,
                None => ExtensionRegistry::with_defaults()?,
            },
            modules: self.modules,
            initial_stage: self.initial_stage,
            max_steps: self.max_steps,
            client_auth: self.client_auth,
            alpn_protocols: self.alpn_protocols,
        })
    }
}

impl fmt::Debug for ServerConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfigBuilder")
            .field("required_modules", &self.required_modules)
            .field("initial_stage", &self.initial_stage)
            .field("max_steps", &self.max_steps)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suites::{CipherSuiteCatalog, CipherSuiteConfig};

    #[test]
    fn build_requires_every_module_by_default() {
        assert_eq!(
            ServerConfig::builder().build().unwrap_err(),
            Error::MissingModule(ModuleId::CipherSuites)
        );
    }

    #[test]
    fn required_modules_can_be_narrowed() {
        let mut modules = ModuleRegistry::new();
        modules
            .init_module(
                ModuleId::CipherSuites,
                CipherSuiteCatalog::init,
                CipherSuiteConfig::default(),
            )
            .unwrap();

        let config = ServerConfig::builder()
            .with_modules(modules)
            .with_required_modules(&[ModuleId::CipherSuites])
            .with_initial_stage(HandshakeStage::ServerHelloDone)
            .build()
            .unwrap();
        assert_eq!(config.initial_stage, HandshakeStage::ServerHelloDone);
        assert_eq!(config.max_steps, MAX_HANDSHAKE_STEPS);
        assert_eq!(config.extensions().len(), 7);
    }

    #[test]
    fn nonsense_settings_are_refused() {
        let builder = || ServerConfig::builder().with_required_modules(&[]);

        assert!(builder().with_max_steps(0).build().is_err());
        assert!(builder()
            .with_initial_stage(HandshakeStage::Transition)
            .build()
            .is_err());
        assert!(builder()
            .with_alpn_protocols(vec![Vec::new()])
            .build()
            .is_err());
        assert!(builder().build().is_ok());
    }
}
