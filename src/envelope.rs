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

use crate::{
    ciphers::{AesHmacSha2Key, IV_SIZE, MAC_SIZE, SALT_SIZE},
    error::KeyExportError,
};

pub(crate) const VERSION: u8 = 1;

const VERSION_OFFSET: usize = 0;
const SALT_OFFSET: usize = VERSION_OFFSET + 1;
const IV_OFFSET: usize = SALT_OFFSET + SALT_SIZE;
const ROUNDS_OFFSET: usize = IV_OFFSET + IV_SIZE;
const CIPHERTEXT_OFFSET: usize = ROUNDS_OFFSET + 4;

/// An envelope with no ciphertext at all is still structurally valid.
pub(crate) const MIN_SIZE: usize = CIPHERTEXT_OFFSET + MAC_SIZE;

/// The binary structure inside the armor, before the MAC tag is attached.
///
/// All integer fields are big-endian. The layout is fixed:
///
/// ```text
/// version (1) | salt (16) | iv (16) | rounds (4) | ciphertext (n) | mac (32)
/// ```
pub(crate) struct Envelope {
    pub salt: [u8; SALT_SIZE],
    pub iv: [u8; IV_SIZE],
    pub rounds: u32,
    pub ciphertext: Vec<u8>,
}

impl Envelope {
    /// Serialize the envelope and append the HMAC-SHA-256 tag computed over
    /// every serialized byte.
    pub(crate) fn seal(&self, key: &AesHmacSha2Key) -> Vec<u8> {
        let mut payload = Vec::with_capacity(MIN_SIZE + self.ciphertext.len());

        payload.push(VERSION);
        payload.extend_from_slice(&self.salt);
        payload.extend_from_slice(&self.iv);
        payload.extend_from_slice(&self.rounds.to_be_bytes());
        payload.extend_from_slice(&self.ciphertext);

        let mac = key.create_mac_tag(&payload);
        payload.extend_from_slice(&mac);

        payload
    }

    /// Split an envelope into its fields without touching the ciphertext.
    ///
    /// `mac_input` in the result covers everything the tag was computed
    /// over, so the caller can verify it before any decryption happens.
    pub(crate) fn parse(bytes: &[u8]) -> Result<ParsedEnvelope<'_>, KeyExportError> {
        if bytes.len() < MIN_SIZE {
            return Err(KeyExportError::MalformedEnvelope);
        }

        let version = bytes[VERSION_OFFSET];
        if version != VERSION {
            return Err(KeyExportError::UnsupportedVersion(version));
        }

        let mut salt = [0u8; SALT_SIZE];
        let mut iv = [0u8; IV_SIZE];
        let mut mac = [0u8; MAC_SIZE];

        salt.copy_from_slice(&bytes[SALT_OFFSET..IV_OFFSET]);
        iv.copy_from_slice(&bytes[IV_OFFSET..ROUNDS_OFFSET]);

        let rounds = u32::from_be_bytes([
            bytes[ROUNDS_OFFSET],
            bytes[ROUNDS_OFFSET + 1],
            bytes[ROUNDS_OFFSET + 2],
            bytes[ROUNDS_OFFSET + 3],
        ]);

        let mac_offset = bytes.len() - MAC_SIZE;
        mac.copy_from_slice(&bytes[mac_offset..]);

        Ok(ParsedEnvelope {
            salt,
            iv,
            rounds,
            ciphertext: &bytes[CIPHERTEXT_OFFSET..mac_offset],
            mac,
            mac_input: &bytes[..mac_offset],
        })
    }
}

/// The borrowed fields of a parsed envelope.
#[derive(Debug)]
pub(crate) struct ParsedEnvelope<'a> {
    pub salt: [u8; SALT_SIZE],
    pub iv: [u8; IV_SIZE],
    pub rounds: u32,
    pub ciphertext: &'a [u8],
    pub mac: [u8; MAC_SIZE],
    /// The bytes the MAC tag was computed over: the whole envelope minus
    /// the tag itself.
    pub mac_input: &'a [u8],
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn key() -> AesHmacSha2Key {
        AesHmacSha2Key::from_passphrase("1234", 10, b"saltsaltsaltsalt").unwrap()
    }

    #[test]
    fn seal_parse_roundtrip() {
        let envelope = Envelope {
            salt: [1u8; SALT_SIZE],
            iv: [2u8; IV_SIZE],
            rounds: 500_000,
            ciphertext: b"not actually encrypted".to_vec(),
        };

        let sealed = envelope.seal(&key());
        assert_eq!(sealed.len(), MIN_SIZE + envelope.ciphertext.len());

        let parsed = Envelope::parse(&sealed).unwrap();

        assert_eq!(parsed.salt, envelope.salt);
        assert_eq!(parsed.iv, envelope.iv);
        assert_eq!(parsed.rounds, 500_000);
        assert_eq!(parsed.ciphertext, envelope.ciphertext.as_slice());
        assert_eq!(parsed.mac_input, &sealed[..sealed.len() - MAC_SIZE]);

        key().verify_mac(parsed.mac_input, &parsed.mac).expect("the sealed MAC should verify");
    }

    #[test]
    fn empty_ciphertext_is_structurally_valid() {
        let envelope =
            Envelope { salt: [0u8; SALT_SIZE], iv: [0u8; IV_SIZE], rounds: 1, ciphertext: vec![] };

        let sealed = envelope.seal(&key());
        assert_eq!(sealed.len(), MIN_SIZE);

        let parsed = Envelope::parse(&sealed).unwrap();
        assert!(parsed.ciphertext.is_empty());
    }

    #[test]
    fn truncated_envelopes_are_rejected() {
        let sealed = Envelope {
            salt: [0u8; SALT_SIZE],
            iv: [0u8; IV_SIZE],
            rounds: 1,
            ciphertext: vec![],
        }
        .seal(&key());

        assert_matches!(
            Envelope::parse(&sealed[..MIN_SIZE - 1]),
            Err(KeyExportError::MalformedEnvelope)
        );
        assert_matches!(Envelope::parse(&[]), Err(KeyExportError::MalformedEnvelope));
    }

    #[test]
    fn unknown_versions_are_rejected() {
        let mut sealed = Envelope {
            salt: [0u8; SALT_SIZE],
            iv: [0u8; IV_SIZE],
            rounds: 1,
            ciphertext: vec![],
        }
        .seal(&key());

        sealed[0] = 2;

        assert_matches!(Envelope::parse(&sealed), Err(KeyExportError::UnsupportedVersion(2)));
    }
}
