// SPDX-License-Identifier: Apache-2.0
// Copyright TRex Controller Authors

//! Content-Type dispatched manifest decoding.

use crate::model::TrexWorkload;

/// Errors which can occur when decoding a submitted manifest body.
#[derive(Debug, thiserror::Error)]
#[must_use]
pub enum DecodeError {
    #[error("invalid JSON body: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid YAML body: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

/// Decode a request body into a [`TrexWorkload`] based on its Content-Type.
///
/// `application/json` bodies decode as JSON; everything else is attempted
/// as YAML, which also covers JSON-in-YAML and the CLI's `text/plain`
/// fallback for files without a recognized extension.
///
/// # Errors
///
/// Returns a [`DecodeError`] when the body does not parse in the selected
/// format.
pub fn decode_workload(content_type: &str, body: &[u8]) -> Result<TrexWorkload, DecodeError> {
    if content_type.contains("json") {
        Ok(serde_json::from_slice(body)?)
    } else {
        Ok(serde_yaml_ng::from_slice(body)?)
    }
}
