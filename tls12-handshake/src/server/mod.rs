mod config;
mod context;
mod engine;
mod hs;
mod state;
mod tls12;

pub use config::{ServerConfig, ServerConfigBuilder};
pub use context::{HandshakeContext, OutboundMessage};
pub use engine::HandshakeEngine;
pub use state::{HandshakeStage, MAX_HANDSHAKE_STEPS};
