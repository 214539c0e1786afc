//! Container file format: a fixed header followed by the bincode-encoded model.
//!
//! ```text
//! offset  size  field
//! 0       4     magic "NIX\0"
//! 4       2     format major (LE)
//! 6       2     format minor (LE)
//! 8       1     flags
//! 9       3     reserved
//! 12      8     body length (LE)
//! 20      4     CRC-32 of body (LE)
//! 24      n     body
//! ```

use crate::error::{NixError, Result};
use crate::store::Store;
use crate::utils::{calculate_checksum, verify_checksum};
use crate::NIX_MAGIC;
use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Size of the fixed header in bytes
pub const HEADER_LEN: usize = 24;

/// Container format version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatVersion {
    pub major: u16,
    pub minor: u16,
}

impl FormatVersion {
    pub const CURRENT: Self = Self { major: 1, minor: 0 };

    pub fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }

    pub fn is_compatible(&self, other: &Self) -> bool {
        self.major == other.major
    }
}

impl Default for FormatVersion {
    fn default() -> Self {
        Self::CURRENT
    }
}

impl fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Decoded container header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version: FormatVersion,
    pub flags: u8,
    pub body_len: u64,
    pub checksum: u32,
}

impl Header {
    fn write_to(&self, out: &mut Vec<u8>) {
        out.put_slice(NIX_MAGIC);
        out.put_u16_le(self.version.major);
        out.put_u16_le(self.version.minor);
        out.put_u8(self.flags);
        out.put_slice(&[0u8; 3]);
        out.put_u64_le(self.body_len);
        out.put_u32_le(self.checksum);
    }

    /// Parse and check the fixed header
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_LEN {
            return Err(NixError::InvalidFormat(format!(
                "file is {} bytes, shorter than the {} byte header",
                data.len(),
                HEADER_LEN
            )));
        }

        let mut buf = &data[..HEADER_LEN];
        let mut magic = [0u8; 4];
        buf.copy_to_slice(&mut magic);
        if &magic != NIX_MAGIC {
            return Err(NixError::InvalidFormat("bad magic number".to_string()));
        }

        let version = FormatVersion::new(buf.get_u16_le(), buf.get_u16_le());
        if !version.is_compatible(&FormatVersion::CURRENT) {
            return Err(NixError::UnsupportedVersion(version.major));
        }

        let flags = buf.get_u8();
        buf.advance(3);
        let body_len = buf.get_u64_le();
        let checksum = buf.get_u32_le();

        Ok(Self {
            version,
            flags,
            body_len,
            checksum,
        })
    }
}

/// Serialize the model into container bytes
pub(crate) fn encode(store: &Store) -> Result<Vec<u8>> {
    let body = bincode::serialize(store)?;
    let header = Header {
        version: FormatVersion::CURRENT,
        flags: 0,
        body_len: body.len() as u64,
        checksum: calculate_checksum(&body),
    };

    let mut out = Vec::with_capacity(HEADER_LEN + body.len());
    header.write_to(&mut out);
    out.extend_from_slice(&body);
    Ok(out)
}

/// Parse container bytes back into the model
pub(crate) fn decode(data: &[u8], verify: bool) -> Result<Store> {
    let header = Header::parse(data)?;
    let body = &data[HEADER_LEN..];
    if body.len() as u64 != header.body_len {
        return Err(NixError::InvalidFormat(format!(
            "body is {} bytes, header says {}",
            body.len(),
            header.body_len
        )));
    }
    if verify {
        verify_checksum(body, header.checksum)?;
    }
    Ok(bincode::deserialize(body)?)
}
