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

use ruma::EventEncryptionAlgorithm;
use tracing::{info, warn};

use crate::{
    error::KeyExportError,
    key_export::{decrypt_room_key_export, encrypt_room_key_export, DEFAULT_PBKDF_ROUNDS},
    store::{ExportableSession, SessionStore},
    types::ExportedRoomKey,
};

/// Export every usable inbound group session of the store as an armored,
/// passphrase-protected blob.
///
/// Sessions that can't be reconstructed from their at-rest form, and
/// sessions the store has marked as invalid, are skipped with a warning.
///
/// # Arguments
///
/// * `store` - The session store holding the sessions to export.
///
/// * `passphrase` - The passphrase that will protect the export. The key
///   derivation runs [`DEFAULT_PBKDF_ROUNDS`] rounds of PBKDF2, which
///   takes a noticeable amount of time on purpose.
///
/// # Examples
///
/// ```no_run
/// use megolm_key_export::{export_room_keys, MemoryStore};
/// use ruma::user_id;
///
/// # async {
/// let store = MemoryStore::new(user_id!("@alice:example.org"));
/// let export = export_room_keys(&store, "1234").await.unwrap();
/// # };
/// ```
pub async fn export_room_keys<S: SessionStore>(
    store: &S,
    passphrase: &str,
) -> Result<String, KeyExportError> {
    let pickles = store.list_inbound_sessions().await?;
    let pickle_key = store.user_id().to_owned();

    let mut keys = Vec::new();

    for pickle in &pickles {
        let session = match store.reconstruct(pickle, pickle_key.as_str()) {
            Ok(session) => session,
            Err(e) => {
                warn!(error = ?e, "Couldn't reconstruct a stored group session, skipping it");
                continue;
            }
        };

        if !session.is_valid() {
            warn!(
                room_id = ?session.room_id(),
                session_id = session.session_id(),
                "Skipping an invalid group session"
            );
            continue;
        }

        keys.push(ExportedRoomKey {
            algorithm: EventEncryptionAlgorithm::MegolmV1AesSha2,
            room_id: session.room_id().to_owned(),
            sender_key: session.sender_key().to_owned(),
            session_id: session.session_id().to_owned(),
            session_key: session.export_at_first_known_index(),
            sender_claimed_keys: session.sender_claimed_keys(),
            forwarding_curve25519_key_chain: session.forwarding_curve25519_key_chain(),
        });
    }

    if keys.is_empty() {
        return Err(KeyExportError::EmptyExport);
    }

    encrypt_room_key_export(&keys, passphrase, DEFAULT_PBKDF_ROUNDS)
}

/// Decrypt an armored key export and hand every room key in it to the
/// store.
///
/// Returns the number of room keys the store accepted. Keys the store
/// refused are logged and skipped, a corrupt export aborts the whole
/// import.
///
/// # Arguments
///
/// * `store` - The session store receiving the imported room keys.
///
/// * `data` - The bytes of the key export file.
///
/// * `passphrase` - The passphrase the export was protected with.
///
/// # Examples
///
/// ```no_run
/// use megolm_key_export::{import_room_keys, MemoryStore};
/// use ruma::user_id;
///
/// # async {
/// let store = MemoryStore::new(user_id!("@alice:example.org"));
/// let export = std::fs::read("keys.txt").unwrap();
/// let count = import_room_keys(&store, &export, "1234").await.unwrap();
/// # };
/// ```
pub async fn import_room_keys<S: SessionStore>(
    store: &S,
    data: &[u8],
    passphrase: &str,
) -> Result<usize, KeyExportError> {
    if !store.encryption_enabled() {
        return Err(KeyExportError::EncryptionDisabled);
    }

    let keys = decrypt_room_key_export(data, passphrase)?;

    let total_count = keys.len();
    let mut imported_count = 0;

    for key in keys {
        let room_id = key.room_id.clone();
        let session_id = key.session_id.clone();

        match store.set_inbound_group_session(key, true).await {
            Ok(()) => imported_count += 1,
            Err(e) => {
                warn!(
                    room_id = ?room_id,
                    session_id = session_id,
                    error = ?e,
                    "Couldn't import a room key from a file export"
                );
            }
        }
    }

    info!(total_count, imported_count, "Successfully imported room keys");

    Ok(imported_count)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use assert_matches::assert_matches;
    use ruma::{room_id, user_id, DeviceKeyAlgorithm, UserId};

    use super::*;
    use crate::store::{MemorySession, MemoryStore};

    const PASSPHRASE: &str = "It's a secret to everybody";

    fn alice() -> &'static UserId {
        user_id!("@alice:localhost")
    }

    fn session(session_id: &str) -> MemorySession {
        MemorySession {
            room_id: room_id!("!test:localhost").to_owned(),
            session_id: session_id.to_owned(),
            sender_key: "RF3s+E7RkTQTGF2d8Deol0FkQvgII2aJDf3/Jp5mxVU".to_owned(),
            sender_claimed_keys: BTreeMap::from([(
                DeviceKeyAlgorithm::Ed25519,
                "aU1UcblBSipr1zkqSnQzRcLUulfuI973x+YkA/uDBPc".to_owned(),
            )]),
            forwarding_curve25519_key_chain: vec![],
            session_key: format!("session key material for {session_id}"),
            valid: true,
        }
    }

    #[tokio::test]
    async fn export_import_roundtrip() {
        let store = MemoryStore::new(alice());
        store.add_session(session("S1"));
        store.add_session(session("S2"));

        let export = export_room_keys(&store, PASSPHRASE).await.unwrap();

        let receiving = MemoryStore::new(user_id!("@bob:localhost"));
        let count = import_room_keys(&receiving, export.as_bytes(), PASSPHRASE).await.unwrap();

        assert_eq!(count, 2);

        let imported = receiving.imported_sessions();
        assert_eq!(imported[0].session_id, "S1");
        assert_eq!(imported[1].session_id, "S2");
        assert_eq!(imported[0].algorithm, EventEncryptionAlgorithm::MegolmV1AesSha2);
        assert_eq!(imported[0].session_key, "session key material for S1");
        assert_eq!(
            imported[0].sender_claimed_keys,
            session("S1").sender_claimed_keys,
        );
    }

    #[tokio::test]
    async fn empty_stores_have_nothing_to_export() {
        let store = MemoryStore::new(alice());

        assert_matches!(
            export_room_keys(&store, PASSPHRASE).await,
            Err(KeyExportError::EmptyExport)
        );
    }

    #[tokio::test]
    async fn broken_sessions_are_skipped_on_export() {
        let store = MemoryStore::new(alice());

        let mut invalid = session("S1");
        invalid.valid = false;

        store.add_session(invalid);
        store.add_pickled_session("not a pickled session at all".to_owned());
        store.add_session(session("S3"));

        let export = export_room_keys(&store, PASSPHRASE).await.unwrap();

        let receiving = MemoryStore::new(user_id!("@bob:localhost"));
        let count = import_room_keys(&receiving, export.as_bytes(), PASSPHRASE).await.unwrap();

        assert_eq!(count, 1);
        assert_eq!(receiving.imported_sessions()[0].session_id, "S3");
    }

    #[tokio::test]
    async fn only_broken_sessions_counts_as_an_empty_export() {
        let store = MemoryStore::new(alice());

        let mut invalid = session("S1");
        invalid.valid = false;
        store.add_session(invalid);

        assert_matches!(
            export_room_keys(&store, PASSPHRASE).await,
            Err(KeyExportError::EmptyExport)
        );
    }

    #[tokio::test]
    async fn imports_need_encryption_to_be_enabled() {
        let exporting = MemoryStore::new(alice());
        exporting.add_session(session("S1"));
        let export = export_room_keys(&exporting, PASSPHRASE).await.unwrap();

        let mut receiving = MemoryStore::new(user_id!("@bob:localhost"));
        receiving.set_encryption_enabled(false);

        assert_matches!(
            import_room_keys(&receiving, export.as_bytes(), PASSPHRASE).await,
            Err(KeyExportError::EncryptionDisabled)
        );
        assert!(receiving.imported_sessions().is_empty());
    }

    #[tokio::test]
    async fn the_count_reflects_what_the_store_accepted() {
        let store = MemoryStore::new(alice());
        store.add_session(session("S1"));
        store.add_session(session("S2"));

        let export = export_room_keys(&store, PASSPHRASE).await.unwrap();

        let receiving = MemoryStore::new(user_id!("@bob:localhost"));
        receiving.reject_session_id("S1");

        let count = import_room_keys(&receiving, export.as_bytes(), PASSPHRASE).await.unwrap();

        assert_eq!(count, 1);
        assert_eq!(receiving.imported_sessions()[0].session_id, "S2");
    }

    #[tokio::test]
    async fn an_export_of_zero_keys_imports_zero_keys() {
        // The exporting side refuses to produce such a file, but a foreign
        // one containing an empty list is still well-formed.
        let encrypted = crate::encrypt_room_key_export(&[], PASSPHRASE, 10).unwrap();

        let receiving = MemoryStore::new(alice());
        let count = import_room_keys(&receiving, encrypted.as_bytes(), PASSPHRASE).await.unwrap();

        assert_eq!(count, 0);
        assert!(receiving.imported_sessions().is_empty());
    }

    #[tokio::test]
    async fn wrong_passphrases_import_nothing() {
        let store = MemoryStore::new(alice());
        store.add_session(session("S1"));

        let export = export_room_keys(&store, PASSPHRASE).await.unwrap();

        let receiving = MemoryStore::new(user_id!("@bob:localhost"));
        assert_matches!(
            import_room_keys(&receiving, export.as_bytes(), "not the passphrase").await,
            Err(KeyExportError::AuthFailure)
        );
        assert!(receiving.imported_sessions().is_empty());
    }
}
