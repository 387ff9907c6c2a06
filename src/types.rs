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

use std::{collections::BTreeMap, fmt};

use ruma::{DeviceKeyAlgorithm, EventEncryptionAlgorithm, OwnedRoomId};
use serde::{Deserialize, Deserializer, Serialize};

/// An exported version of an inbound group session.
///
/// This is the record each entry of the decrypted JSON payload maps to, and
/// what a session store receives for every imported room key.
#[derive(Clone, Deserialize, Serialize, PartialEq)]
pub struct ExportedRoomKey {
    /// The encryption algorithm the session uses.
    pub algorithm: EventEncryptionAlgorithm,

    /// The room where the session is used.
    pub room_id: OwnedRoomId,

    /// The Curve25519 key of the device which initiated the session
    /// originally.
    pub sender_key: String,

    /// The ID of the session that the key is for.
    pub session_id: String,

    /// The key for the session, exported at its first known ratchet index.
    pub session_key: String,

    /// The claimed identity keys of the device which initiated the session.
    ///
    /// Other clients serialize this as `null` when they have nothing to
    /// claim, so both a missing and a `null` field deserialize to an empty
    /// map.
    #[serde(default, deserialize_with = "null_to_default")]
    pub sender_claimed_keys: BTreeMap<DeviceKeyAlgorithm, String>,

    /// Chain of Curve25519 keys through which this session was forwarded,
    /// via m.forwarded_room_key events.
    #[serde(default)]
    pub forwarding_curve25519_key_chain: Vec<String>,
}

impl fmt::Debug for ExportedRoomKey {
    // Session material stays out of logs.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportedRoomKey")
            .field("algorithm", &self.algorithm)
            .field("room_id", &self.room_id)
            .field("sender_key", &self.sender_key)
            .field("session_id", &self.session_id)
            .field("sender_claimed_keys", &self.sender_claimed_keys)
            .field("forwarding_curve25519_key_chain", &self.forwarding_curve25519_key_chain)
            .finish_non_exhaustive()
    }
}

fn null_to_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use ruma::room_id;
    use serde_json::json;

    use super::*;

    #[test]
    fn null_and_missing_claimed_keys_become_an_empty_map() {
        let with_null = json!({
            "algorithm": "m.megolm.v1.aes-sha2",
            "room_id": "!test:localhost",
            "sender_key": "SK",
            "session_id": "S1",
            "session_key": "AAA",
            "sender_claimed_keys": null,
        });

        let key: ExportedRoomKey = serde_json::from_value(with_null).unwrap();
        assert!(key.sender_claimed_keys.is_empty());
        assert!(key.forwarding_curve25519_key_chain.is_empty());

        let with_missing = json!({
            "algorithm": "m.megolm.v1.aes-sha2",
            "room_id": "!test:localhost",
            "sender_key": "SK",
            "session_id": "S1",
            "session_key": "AAA",
        });

        let key: ExportedRoomKey = serde_json::from_value(with_missing).unwrap();
        assert!(key.sender_claimed_keys.is_empty());
    }

    #[test]
    fn serialization_always_includes_the_claimed_keys() {
        let key = ExportedRoomKey {
            algorithm: EventEncryptionAlgorithm::MegolmV1AesSha2,
            room_id: room_id!("!test:localhost").to_owned(),
            sender_key: "SK".to_owned(),
            session_id: "S1".to_owned(),
            session_key: "AAA".to_owned(),
            sender_claimed_keys: BTreeMap::new(),
            forwarding_curve25519_key_chain: vec![],
        };

        let value = serde_json::to_value(&key).unwrap();
        let object = value.as_object().unwrap();

        assert_eq!(object["algorithm"], "m.megolm.v1.aes-sha2");
        assert!(object.contains_key("sender_claimed_keys"));
        assert!(object.contains_key("forwarding_curve25519_key_chain"));
        assert_eq!(object.len(), 7);
    }

    #[test]
    fn debug_output_redacts_the_session_key() {
        let key = ExportedRoomKey {
            algorithm: EventEncryptionAlgorithm::MegolmV1AesSha2,
            room_id: room_id!("!test:localhost").to_owned(),
            sender_key: "SK".to_owned(),
            session_id: "S1".to_owned(),
            session_key: "very secret ratchet".to_owned(),
            sender_claimed_keys: BTreeMap::new(),
            forwarding_curve25519_key_chain: vec![],
        };

        assert!(!format!("{key:?}").contains("very secret ratchet"));
    }
}
