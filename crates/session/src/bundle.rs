//! Inline credential bundles: `<marker><base64(gzip(json))>`.

use std::io::{Read, Write};

use {
    base64::{
        Engine as _,
        alphabet,
        engine::{
            DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig,
            general_purpose::STANDARD,
        },
    },
    flate2::{
        Compression,
        read::{GzDecoder, ZlibDecoder},
        write::GzEncoder,
    },
};

use crate::error::{Error, Result};

/// Standard alphabet, padding optional. Bundles are often pasted with the
/// trailing `=` trimmed.
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Compression formats recognized by their two-byte header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionFormat {
    Gzip,
    Zlib,
}

impl CompressionFormat {
    pub fn detect(bytes: &[u8]) -> Option<Self> {
        match bytes {
            [0x1f, 0x8b, ..] => Some(Self::Gzip),
            // CMF 0x78 with any valid FLG (header checksum divisible by 31).
            [0x78, flg, ..] if (0x78u16 * 256 + u16::from(*flg)) % 31 == 0 => Some(Self::Zlib),
            _ => None,
        }
    }
}

/// Decode the payload that follows the inline marker into credential JSON text.
pub fn decode_inline_bundle(payload: &str) -> Result<String> {
    let compressed = LENIENT.decode(payload.trim())?;
    let format = CompressionFormat::detect(&compressed).ok_or_else(|| {
        Error::UnrecognizedCompression(compressed.iter().take(2).copied().collect())
    })?;

    let mut text = String::new();
    match format {
        CompressionFormat::Gzip => GzDecoder::new(compressed.as_slice()).read_to_string(&mut text),
        CompressionFormat::Zlib => {
            ZlibDecoder::new(compressed.as_slice()).read_to_string(&mut text)
        },
    }
    .map_err(Error::Decompress)?;
    Ok(text)
}

/// Build an inline bundle string from credential JSON text.
pub fn encode_inline_bundle(marker: &str, json: &str) -> Result<String> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(json.as_bytes())?;
    let compressed = encoder.finish()?;
    Ok(format!("{marker}{}", STANDARD.encode(compressed)))
}
