// Copyright 2023 The Matrix.org Foundation C.I.C.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use thiserror::Error;

use crate::store::StoreError;

/// Error representing a failure during key export or import.
#[derive(Debug, Error)]
pub enum KeyExportError {
    /// The export is missing its armor headers, contains garbage around
    /// them, or the armored body isn't valid base64.
    #[error("not a valid key export file")]
    MalformedArmor,

    /// The binary envelope inside the armor is truncated or doesn't follow
    /// the expected layout.
    #[error("the key export is truncated or has an invalid layout")]
    MalformedEnvelope,

    /// The export was created with a format version we don't support.
    #[error("unsupported key export version: {0}")]
    UnsupportedVersion(u8),

    /// The authentication tag doesn't match, or the decrypted payload
    /// couldn't be understood.
    ///
    /// The two cases are deliberately indistinguishable so a tampered
    /// export can't be told apart from a wrong passphrase.
    #[error("wrong passphrase or corrupted file")]
    AuthFailure,

    /// The session store reports that encryption isn't enabled, so there is
    /// nowhere to put imported room keys.
    #[error("encryption is not enabled")]
    EncryptionDisabled,

    /// No session in the store survived the export filter.
    #[error("no session keys to export")]
    EmptyExport,

    /// The key derivation was given parameters it can't work with, an
    /// iteration count or output length of zero.
    #[error("invalid key derivation parameters")]
    BadInput,

    /// The list of room keys couldn't be serialized.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// The session store returned an error.
    #[error(transparent)]
    Store(#[from] StoreError),
}
