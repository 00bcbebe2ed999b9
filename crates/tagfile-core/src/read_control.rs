//! Read-control digests.
//!
//! When read control is enabled a digest of the payload is stored in the
//! metadata and compared on every load.

use std::fmt;
use std::str::FromStr;

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Digest algorithm used for read control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadControl {
    /// MD5 hex digest (safest, slowest)
    Md5,
    /// CRC-32 hex digest
    #[default]
    Crc32,
    /// Adler-32 hex digest
    Adler32,
    /// Payload length only (fastest)
    Strlen,
}

impl ReadControl {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Md5 => "md5",
            Self::Crc32 => "crc32",
            Self::Adler32 => "adler32",
            Self::Strlen => "strlen",
        }
    }

    /// Compute the digest of `data`.
    pub fn digest(&self, data: &[u8]) -> String {
        match self {
            Self::Md5 => hex::encode(Md5::digest(data)),
            Self::Crc32 => format!("{:08x}", crc32fast::hash(data)),
            Self::Adler32 => format!("{:08x}", adler::adler32_slice(data)),
            Self::Strlen => data.len().to_string(),
        }
    }

    /// Whether `data` matches a previously stored digest.
    pub fn verify(&self, data: &[u8], expected: &str) -> bool {
        self.digest(data) == expected
    }
}

impl fmt::Display for ReadControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReadControl {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "md5" => Ok(Self::Md5),
            "crc32" => Ok(Self::Crc32),
            "adler32" => Ok(Self::Adler32),
            "strlen" => Ok(Self::Strlen),
            other => Err(CoreError::UnknownReadControl(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digests() {
        assert_eq!(
            ReadControl::Md5.digest(b""),
            "d41d8cd98f00b204e9800998ecf8427e"
        );
        assert_eq!(ReadControl::Crc32.digest(b"123456789"), "cbf43926");
        assert_eq!(ReadControl::Adler32.digest(b"Wikipedia"), "11e60398");
        assert_eq!(ReadControl::Strlen.digest(b"data to cache"), "13");
    }

    #[test]
    fn test_verify_detects_change() {
        for control in [
            ReadControl::Md5,
            ReadControl::Crc32,
            ReadControl::Adler32,
            ReadControl::Strlen,
        ] {
            let stored = control.digest(b"payload");
            assert!(control.verify(b"payload", &stored), "{control}");
            assert!(!control.verify(b"payload!", &stored), "{control}");
        }
    }

    #[test]
    fn test_parse() {
        assert_eq!("CRC32".parse::<ReadControl>().unwrap(), ReadControl::Crc32);
        assert_eq!("strlen".parse::<ReadControl>().unwrap(), ReadControl::Strlen);
        assert!("sha1".parse::<ReadControl>().is_err());
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&ReadControl::Adler32).unwrap();
        assert_eq!(json, "\"adler32\"");
        let parsed: ReadControl = serde_json::from_str("\"md5\"").unwrap();
        assert_eq!(parsed, ReadControl::Md5);
    }
}
