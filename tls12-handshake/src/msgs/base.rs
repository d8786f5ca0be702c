use std::fmt;

use pki_types::CertificateDer;

use crate::error::InvalidMessage;
use crate::msgs::codec;
use crate::msgs::codec::{Codec, Reader};

/// An externally length'd payload
#[derive(Clone, Default, Eq, PartialEq)]
pub struct Payload(pub Vec<u8>);

impl Payload {
    /// Wrap `bytes`.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// An empty payload.
    pub fn empty() -> Self {
        Self(Vec::new())
    }
}

impl Codec<'_> for Payload {
    fn encode(&self, bytes: &mut Vec<u8>) {
        bytes.extend_from_slice(&self.0);
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, InvalidMessage> {
        Ok(Self(r.rest().to_vec()))
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        hex(f, &self.0)
    }
}

impl<'a> Codec<'a> for CertificateDer<'a> {
    fn encode(&self, bytes: &mut Vec<u8>) {
        codec::u24(self.as_ref().len() as u32).encode(bytes);
        bytes.extend(self.as_ref());
    }

    fn read(r: &mut Reader<'a>) -> Result<Self, InvalidMessage> {
        let len = usize::from(codec::u24::read(r)?);
        let mut sub = r.sub(len, "CertificateDer")?;
        let body = sub.rest();
        Ok(Self::from(body))
    }
}

/// An arbitrary, unknown-content, u16-length-prefixed payload
#[derive(Clone, Default, Eq, PartialEq)]
pub struct PayloadU16(pub Vec<u8>);

impl PayloadU16 {
    /// Wrap `bytes`.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub(crate) fn encode_slice(slice: &[u8], bytes: &mut Vec<u8>) {
        (slice.len() as u16).encode(bytes);
        bytes.extend_from_slice(slice);
    }
}

impl Codec<'_> for PayloadU16 {
    fn encode(&self, bytes: &mut Vec<u8>) {
        Self::encode_slice(&self.0, bytes);
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, InvalidMessage> {
        Ok(Self(
            codec::read_payload_u16(r, "PayloadU16")?.to_vec(),
        ))
    }
}

impl fmt::Debug for PayloadU16 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        hex(f, &self.0)
    }
}

/// An arbitrary, unknown-content, u8-length-prefixed payload
#[derive(Clone, Default, Eq, PartialEq)]
pub struct PayloadU8(pub Vec<u8>);

impl PayloadU8 {
    /// Wrap `bytes`.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub(crate) fn encode_slice(slice: &[u8], bytes: &mut Vec<u8>) {
        (slice.len() as u8).encode(bytes);
        bytes.extend_from_slice(slice);
    }
}

impl Codec<'_> for PayloadU8 {
    fn encode(&self, bytes: &mut Vec<u8>) {
        Self::encode_slice(&self.0, bytes);
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, InvalidMessage> {
        Ok(Self(
            codec::read_payload_u8(r, "PayloadU8")?.to_vec(),
        ))
    }
}

impl fmt::Debug for PayloadU8 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        hex(f, &self.0)
    }
}

// Format an iterator of u8 into a hex string
pub(crate) fn hex<'a>(
    f: &mut fmt::Formatter<'_>,
    payload: impl IntoIterator<Item = &'a u8>,
) -> fmt::Result {
    for b in payload {
        write!(f, "{:02x}", b)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_u16_reads_exactly_its_length() {
        let bytes = [0x00, 0x02, 0xaa, 0xbb, 0xcc];
        let mut rd = Reader::init(&bytes);
        assert_eq!(PayloadU16::read(&mut rd).unwrap(), PayloadU16::new(vec![0xaa, 0xbb]));
        assert_eq!(rd.left(), 1);
    }

    #[test]
    fn payload_debug_is_hex() {
        assert_eq!(format!("{:?}", PayloadU8::new(vec![0x0f, 0xa0])), "0fa0");
    }

    #[test]
    fn certificate_der_is_u24_prefixed() {
        let cert = CertificateDer::from(&[1u8, 2, 3][..]);
        assert_eq!(cert.get_encoding(), vec![0, 0, 3, 1, 2, 3]);
        assert!(CertificateDer::read_bytes(&[0, 0, 4, 1, 2, 3]).is_err());
    }
}
