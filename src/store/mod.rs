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

//! Types and traits abstracting the session store the codec drives.
//!
//! The codec never persists anything itself. Exporting enumerates the
//! store's inbound group sessions, importing hands every decrypted record
//! back to it. Implement [`SessionStore`] to plug in a real client store;
//! an in-memory implementation is provided for tests and small tools.

use std::{collections::BTreeMap, fmt::Debug};

use async_trait::async_trait;
use ruma::{DeviceKeyAlgorithm, RoomId, UserId};
use thiserror::Error;

use crate::types::ExportedRoomKey;

mod memorystore;

pub use memorystore::{MemorySession, MemoryStore};

/// The session store's error type.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store failed to (de)serialize a session.
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    /// An error occurred in the store's backend.
    #[error(transparent)]
    Backend(Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    /// Create a new [`StoreError::Backend`] from the given error.
    pub fn backend(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Backend(Box::new(error))
    }
}

/// A `Result` alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// A reconstructed inbound group session, ready to be put into an export.
pub trait ExportableSession {
    /// Can this session still be used, or has the store marked it as
    /// broken?
    ///
    /// Invalid sessions are silently skipped during an export.
    fn is_valid(&self) -> bool;

    /// The room this session belongs to.
    fn room_id(&self) -> &RoomId;

    /// The unique ID of this session.
    fn session_id(&self) -> &str;

    /// The Curve25519 key of the device which initiated this session.
    fn sender_key(&self) -> &str;

    /// The claimed identity keys of the device which initiated this
    /// session.
    fn sender_claimed_keys(&self) -> BTreeMap<DeviceKeyAlgorithm, String>;

    /// The chain of Curve25519 keys this session was forwarded through.
    fn forwarding_curve25519_key_chain(&self) -> Vec<String>;

    /// Export the session key at the earliest ratchet index this session
    /// can still decrypt from.
    ///
    /// Exporting at the first known index preserves as much decryptable
    /// message history as possible for whoever imports the key.
    fn export_at_first_known_index(&self) -> String;
}

/// Trait abstracting the store that holds inbound group sessions.
///
/// The codec only ever reads sessions out of it or hands imported room
/// keys back; it doesn't assume anything about how sessions are persisted.
#[async_trait]
pub trait SessionStore: Debug + Send + Sync {
    /// The opaque, at-rest form of an inbound group session.
    type Pickle: Send + Sync;

    /// The live session produced by [`SessionStore::reconstruct`].
    type Session: ExportableSession + Send;

    /// Return every inbound group session the store knows about, in its
    /// at-rest form.
    async fn list_inbound_sessions(&self) -> Result<Vec<Self::Pickle>>;

    /// Turn an at-rest session back into a live one.
    ///
    /// The pickle key unlocks persisted session material; stores that keep
    /// sessions unencrypted may ignore it.
    fn reconstruct(&self, pickle: &Self::Pickle, pickle_key: &str) -> Result<Self::Session>;

    /// Hand an imported room key to the store.
    ///
    /// `forwarded` tells the store that this key went through another
    /// device rather than being received directly from the sender.
    async fn set_inbound_group_session(
        &self,
        session: ExportedRoomKey,
        forwarded: bool,
    ) -> Result<()>;

    /// Does the client this store belongs to have encryption enabled?
    fn encryption_enabled(&self) -> bool;

    /// The ID of the user owning this store, which doubles as the pickle
    /// key during an export.
    fn user_id(&self) -> &UserId;
}
