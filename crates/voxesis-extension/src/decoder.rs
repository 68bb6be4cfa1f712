//! Descriptor decoding.
//!
//! Extension descriptors arrive base64-encoded. Packaging tools on
//! non-UTF-8 locales emit GBK, so the decoded bytes are probed as UTF-8
//! first (a leading byte order mark is dropped), then GBK, and finally
//! passed through byte-for-byte so the failure surfaces when the manifest
//! is parsed.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use encoding_rs::GBK;

use crate::error::ExtensionError;

/// Decode a base64 descriptor into JSON text.
///
/// Only malformed base64 is an error here. Text that fails both encoding
/// probes is returned with every byte mapped to the code point of the same
/// value; [`parse_descriptor`] reports it.
pub fn decode_descriptor(blob: &str) -> Result<String, ExtensionError> {
    let bytes = STANDARD
        .decode(blob.trim())
        .map_err(|e| ExtensionError::DecodeFailure(format!("invalid base64: {e}")))?;

    if let Ok(text) = std::str::from_utf8(&bytes) {
        let text = text.strip_prefix('\u{FEFF}').unwrap_or(text);
        if is_json(text) {
            return Ok(text.to_string());
        }
    }

    if let Some(text) = GBK.decode_without_bom_handling_and_without_replacement(&bytes) {
        if is_json(&text) {
            tracing::debug!("descriptor decoded as GBK");
            return Ok(text.into_owned());
        }
    }

    Ok(bytes.iter().map(|&b| char::from(b)).collect())
}

/// Parse decoded descriptor text into a JSON document.
pub fn parse_descriptor(text: &str) -> Result<serde_json::Value, ExtensionError> {
    serde_json::from_str(text).map_err(|e| ExtensionError::DecodeFailure(e.to_string()))
}

fn is_json(text: &str) -> bool {
    serde_json::from_str::<serde::de::IgnoredAny>(text).is_ok()
}
