#[macro_use]
mod macros;

pub(crate) mod base;
pub(crate) mod codec;
pub(crate) mod enums;
pub(crate) mod handshake;
