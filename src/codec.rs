//! Byte coercion between caller data and the canonical bytes that cross a
//! segment or port.
//!
//! Callers state what they are handing over with a [`Payload`] variant; no
//! runtime inspection of the input happens. On the way back, [`Encoding`]
//! turns raw bytes into text and drops the NUL fill left behind in a
//! fixed-size region.

use crate::error::{Error, Result};
use std::borrow::Cow;
use std::str::FromStr;

/// Text encodings understood by the coercion layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Encoding {
    /// UTF-8.
    #[default]
    Utf8,
    /// UTF-16, little-endian code units.
    Utf16Le,
    /// ISO-8859-1; one byte per character.
    Latin1,
}

impl Encoding {
    /// Canonical name of the encoding.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Utf8 => "utf8",
            Self::Utf16Le => "utf16le",
            Self::Latin1 => "latin1",
        }
    }

    /// Encode text into canonical bytes.
    ///
    /// Latin-1 keeps only the low byte of characters above U+00FF.
    pub fn encode(&self, text: &str) -> Vec<u8> {
        match self {
            Self::Utf8 => text.as_bytes().to_vec(),
            Self::Utf16Le => text.encode_utf16().flat_map(u16::to_le_bytes).collect(),
            Self::Latin1 => text.chars().map(|c| (c as u32 & 0xff) as u8).collect(),
        }
    }

    /// Decode canonical bytes into text, stripping trailing NUL characters.
    ///
    /// Invalid sequences are replaced with U+FFFD. A dangling odd byte at the
    /// end of UTF-16 input is ignored.
    pub fn decode(&self, bytes: &[u8]) -> String {
        match self {
            Self::Utf8 => String::from_utf8_lossy(trim_trailing_nul(bytes)).into_owned(),
            Self::Latin1 => trim_trailing_nul(bytes).iter().map(|&b| b as char).collect(),
            // A zero byte may be half of a code unit, so trim whole units.
            Self::Utf16Le => {
                let units: Vec<u16> = bytes
                    .chunks_exact(2)
                    .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                    .collect();
                let end = units.iter().rposition(|&u| u != 0).map_or(0, |i| i + 1);
                String::from_utf16_lossy(&units[..end])
            }
        }
    }
}

impl std::fmt::Display for Encoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Encoding {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "utf8" | "utf-8" => Ok(Self::Utf8),
            "utf16" | "utf16le" | "utf-16" | "utf-16le" | "ucs2" | "ucs-2" => Ok(Self::Utf16Le),
            "latin1" | "binary" => Ok(Self::Latin1),
            _ => Err(Error::UnsupportedEncoding(s.to_string())),
        }
    }
}

/// Data handed to a segment write or a port send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payload<'a> {
    /// Already-binary data, transferred as is.
    Bytes(&'a [u8]),
    /// Text to encode before transfer.
    Text(&'a str, Encoding),
}

impl<'a> Payload<'a> {
    /// Raw bytes.
    pub fn bytes(data: &'a [u8]) -> Self {
        Self::Bytes(data)
    }

    /// UTF-8 text.
    pub fn utf8(text: &'a str) -> Self {
        Self::Text(text, Encoding::Utf8)
    }

    /// UTF-16LE text.
    pub fn utf16(text: &'a str) -> Self {
        Self::Text(text, Encoding::Utf16Le)
    }

    /// Canonical bytes of this payload. Borrows whenever no re-encoding is
    /// needed.
    pub fn to_bytes(&self) -> Cow<'a, [u8]> {
        match *self {
            Self::Bytes(data) => Cow::Borrowed(data),
            Self::Text(text, Encoding::Utf8) => Cow::Borrowed(text.as_bytes()),
            Self::Text(text, encoding) => Cow::Owned(encoding.encode(text)),
        }
    }

    /// Length of the canonical bytes.
    pub fn encoded_len(&self) -> usize {
        match *self {
            Self::Bytes(data) => data.len(),
            Self::Text(text, Encoding::Utf8) => text.len(),
            Self::Text(text, Encoding::Utf16Le) => text.encode_utf16().count() * 2,
            Self::Text(text, Encoding::Latin1) => text.chars().count(),
        }
    }
}

impl<'a> From<&'a [u8]> for Payload<'a> {
    fn from(data: &'a [u8]) -> Self {
        Self::Bytes(data)
    }
}

impl<'a, const N: usize> From<&'a [u8; N]> for Payload<'a> {
    fn from(data: &'a [u8; N]) -> Self {
        Self::Bytes(data)
    }
}

impl<'a> From<&'a Vec<u8>> for Payload<'a> {
    fn from(data: &'a Vec<u8>) -> Self {
        Self::Bytes(data)
    }
}

impl<'a> From<&'a str> for Payload<'a> {
    fn from(text: &'a str) -> Self {
        Self::utf8(text)
    }
}

impl<'a> From<&'a String> for Payload<'a> {
    fn from(text: &'a String) -> Self {
        Self::utf8(text)
    }
}

/// Slice of `bytes` without its trailing NUL bytes.
pub fn trim_trailing_nul(bytes: &[u8]) -> &[u8] {
    let end = bytes.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    &bytes[..end]
}
