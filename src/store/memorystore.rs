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

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::RwLock as StdRwLock,
};

use async_trait::async_trait;
use ruma::{DeviceKeyAlgorithm, OwnedRoomId, OwnedUserId, RoomId, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{ExportableSession, Result, SessionStore, StoreError};
use crate::types::ExportedRoomKey;

#[derive(Debug, Error)]
#[error("the session store rejected the room key")]
struct SessionRejected;

fn default_true() -> bool {
    true
}

/// An inbound group session held by the [`MemoryStore`].
///
/// The memory store keeps nothing secret, so its "pickle" is simply the
/// JSON encoding of this struct.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct MemorySession {
    /// The room this session belongs to.
    pub room_id: OwnedRoomId,
    /// The unique ID of this session.
    pub session_id: String,
    /// The Curve25519 key of the device which initiated this session.
    pub sender_key: String,
    /// The claimed identity keys of the device which initiated this
    /// session.
    #[serde(default)]
    pub sender_claimed_keys: BTreeMap<DeviceKeyAlgorithm, String>,
    /// The chain of Curve25519 keys this session was forwarded through.
    #[serde(default)]
    pub forwarding_curve25519_key_chain: Vec<String>,
    /// The exportable session key.
    pub session_key: String,
    /// Whether the session is still usable.
    #[serde(default = "default_true")]
    pub valid: bool,
}

impl ExportableSession for MemorySession {
    fn is_valid(&self) -> bool {
        self.valid
    }

    fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    fn session_id(&self) -> &str {
        &self.session_id
    }

    fn sender_key(&self) -> &str {
        &self.sender_key
    }

    fn sender_claimed_keys(&self) -> BTreeMap<DeviceKeyAlgorithm, String> {
        self.sender_claimed_keys.clone()
    }

    fn forwarding_curve25519_key_chain(&self) -> Vec<String> {
        self.forwarding_curve25519_key_chain.clone()
    }

    fn export_at_first_known_index(&self) -> String {
        // The memory store only ever holds the session key at the earliest
        // index it knows, there's no ratchet to advance.
        self.session_key.clone()
    }
}

/// An in-memory only session store that forgets everything once dropped.
///
/// Mainly useful for testing and for one-shot tools that convert exports
/// without a real client store behind them.
#[derive(Debug)]
pub struct MemoryStore {
    user_id: OwnedUserId,
    encryption_enabled: bool,
    sessions: StdRwLock<Vec<String>>,
    rejected_sessions: StdRwLock<BTreeSet<String>>,
    imported: StdRwLock<Vec<ExportedRoomKey>>,
}

impl MemoryStore {
    /// Create a new, empty store owned by the given user, with encryption
    /// enabled.
    pub fn new(user_id: &UserId) -> Self {
        Self {
            user_id: user_id.to_owned(),
            encryption_enabled: true,
            sessions: Default::default(),
            rejected_sessions: Default::default(),
            imported: Default::default(),
        }
    }

    /// Flip whether the store reports encryption as enabled.
    pub fn set_encryption_enabled(&mut self, enabled: bool) {
        self.encryption_enabled = enabled;
    }

    /// Add a session that future exports will pick up.
    pub fn add_session(&self, session: MemorySession) {
        let pickle =
            serde_json::to_string(&session).expect("a MemorySession always serializes to JSON");
        self.add_pickled_session(pickle);
    }

    /// Add a raw pickle to the store.
    ///
    /// Anything that doesn't deserialize back into a [`MemorySession`]
    /// will fail reconstruction and be skipped by an export.
    pub fn add_pickled_session(&self, pickle: String) {
        self.sessions.write().unwrap().push(pickle);
    }

    /// Make the store refuse future imports of the given session.
    pub fn reject_session_id(&self, session_id: &str) {
        self.rejected_sessions.write().unwrap().insert(session_id.to_owned());
    }

    /// The room keys the store accepted so far, in import order.
    pub fn imported_sessions(&self) -> Vec<ExportedRoomKey> {
        self.imported.read().unwrap().clone()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    type Pickle = String;
    type Session = MemorySession;

    async fn list_inbound_sessions(&self) -> Result<Vec<String>> {
        Ok(self.sessions.read().unwrap().clone())
    }

    fn reconstruct(&self, pickle: &String, _pickle_key: &str) -> Result<MemorySession> {
        // Nothing in this store is encrypted, the pickle key is unused.
        Ok(serde_json::from_str(pickle)?)
    }

    async fn set_inbound_group_session(
        &self,
        session: ExportedRoomKey,
        _forwarded: bool,
    ) -> Result<()> {
        if self.rejected_sessions.read().unwrap().contains(&session.session_id) {
            return Err(StoreError::backend(SessionRejected));
        }

        self.imported.write().unwrap().push(session);

        Ok(())
    }

    fn encryption_enabled(&self) -> bool {
        self.encryption_enabled
    }

    fn user_id(&self) -> &UserId {
        &self.user_id
    }
}

#[cfg(test)]
mod tests {
    use ruma::user_id;

    use super::*;

    fn session() -> MemorySession {
        MemorySession {
            room_id: ruma::room_id!("!test:localhost").to_owned(),
            session_id: "S1".to_owned(),
            sender_key: "SK".to_owned(),
            sender_claimed_keys: BTreeMap::new(),
            forwarding_curve25519_key_chain: vec![],
            session_key: "AAA".to_owned(),
            valid: true,
        }
    }

    #[tokio::test]
    async fn sessions_roundtrip_through_the_pickle() {
        let store = MemoryStore::new(user_id!("@alice:localhost"));
        store.add_session(session());

        let pickles = store.list_inbound_sessions().await.unwrap();
        assert_eq!(pickles.len(), 1);

        let restored = store.reconstruct(&pickles[0], "@alice:localhost").unwrap();
        assert_eq!(restored.session_id(), "S1");
        assert!(restored.is_valid());
    }

    #[tokio::test]
    async fn garbage_pickles_fail_reconstruction() {
        let store = MemoryStore::new(user_id!("@alice:localhost"));
        store.add_pickled_session("not a session".to_owned());

        let pickles = store.list_inbound_sessions().await.unwrap();
        store
            .reconstruct(&pickles[0], "@alice:localhost")
            .expect_err("garbage shouldn't reconstruct");
    }

    #[tokio::test]
    async fn rejected_sessions_are_refused() {
        let store = MemoryStore::new(user_id!("@alice:localhost"));
        store.reject_session_id("S1");

        let key = ExportedRoomKey {
            algorithm: ruma::EventEncryptionAlgorithm::MegolmV1AesSha2,
            room_id: ruma::room_id!("!test:localhost").to_owned(),
            sender_key: "SK".to_owned(),
            session_id: "S1".to_owned(),
            session_key: "AAA".to_owned(),
            sender_claimed_keys: BTreeMap::new(),
            forwarding_curve25519_key_chain: vec![],
        };

        store.set_inbound_group_session(key, true).await.expect_err("S1 should be refused");
        assert!(store.imported_sessions().is_empty());
    }
}
