// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Opaque continuation tokens.
//!
//! A token encodes the collection and the last id served, so a page resumes
//! strictly after it even if documents were added or removed in between.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use census_core::error::{StoreError, StoreResult};

#[derive(Debug, Serialize, Deserialize)]
struct Cursor {
    #[serde(rename = "c")]
    collection: String,
    #[serde(rename = "a")]
    after: String,
}

/// Encodes a token resuming after `last_id`.
pub fn encode(collection: &str, last_id: &str) -> String {
    let cursor = Cursor {
        collection: collection.to_string(),
        after: last_id.to_string(),
    };
    // Serializing two strings cannot fail.
    let json = serde_json::to_vec(&cursor).unwrap_or_default();
    URL_SAFE_NO_PAD.encode(json)
}

/// Decodes a token issued for `collection`, returning the id to resume after.
pub fn decode(collection: &str, token: &str) -> StoreResult<String> {
    let bytes = URL_SAFE_NO_PAD
        .decode(token)
        .map_err(|_| StoreError::invalid_continuation(token))?;
    let cursor: Cursor =
        serde_json::from_slice(&bytes).map_err(|_| StoreError::invalid_continuation(token))?;
    if cursor.collection != collection {
        return Err(StoreError::invalid_continuation(token));
    }
    Ok(cursor.after)
}
