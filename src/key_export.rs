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

use rand::{thread_rng, RngCore};
use zeroize::Zeroize;

use crate::{
    armor,
    ciphers::{AesHmacSha2Key, SALT_SIZE},
    envelope::Envelope,
    error::KeyExportError,
    types::ExportedRoomKey,
};

/// The PBKDF2 iteration count written by [`export_room_keys`], matching
/// what Element and other clients use.
///
/// [`export_room_keys`]: crate::export_room_keys
pub const DEFAULT_PBKDF_ROUNDS: u32 = 500_000;

/// Encrypt a list of room keys into the armored key export format.
///
/// # Arguments
///
/// * `keys` - The room keys that should be encrypted.
///
/// * `passphrase` - The passphrase protecting the export.
///
/// * `rounds` - The PBKDF2 iteration count turning the passphrase into an
///   AES key. More rounds make brute-forcing the passphrase more
///   expensive; [`DEFAULT_PBKDF_ROUNDS`] is what other clients write.
///
/// # Examples
///
/// ```no_run
/// use megolm_key_export::{encrypt_room_key_export, ExportedRoomKey, DEFAULT_PBKDF_ROUNDS};
///
/// # let keys: Vec<ExportedRoomKey> = Vec::new();
/// let encrypted = encrypt_room_key_export(&keys, "1234", DEFAULT_PBKDF_ROUNDS).unwrap();
/// std::fs::write("keys.txt", encrypted).unwrap();
/// ```
pub fn encrypt_room_key_export(
    keys: &[ExportedRoomKey],
    passphrase: &str,
    rounds: u32,
) -> Result<String, KeyExportError> {
    let mut plaintext = serde_json::to_vec(keys)?;
    let ret = encrypt_helper(&plaintext, passphrase, rounds);

    plaintext.zeroize();

    ret
}

/// Decrypt an armored key export into the list of room keys it holds.
///
/// # Arguments
///
/// * `data` - The bytes of the key export file.
///
/// * `passphrase` - The passphrase the export was encrypted with.
///
/// # Examples
///
/// ```no_run
/// use megolm_key_export::decrypt_room_key_export;
///
/// let export = std::fs::read("keys.txt").unwrap();
/// let keys = decrypt_room_key_export(&export, "1234").unwrap();
/// ```
pub fn decrypt_room_key_export(
    data: &[u8],
    passphrase: &str,
) -> Result<Vec<ExportedRoomKey>, KeyExportError> {
    let mut plaintext = decrypt_helper(data, passphrase)?;

    // Decode failures collapse into `AuthFailure`, a tampered file must
    // not be distinguishable from a wrong passphrase.
    let ret = serde_json::from_slice(&plaintext).map_err(|_| KeyExportError::AuthFailure);

    plaintext.zeroize();

    ret
}

fn encrypt_helper(
    plaintext: &[u8],
    passphrase: &str,
    rounds: u32,
) -> Result<String, KeyExportError> {
    let mut salt = [0u8; SALT_SIZE];
    thread_rng().fill_bytes(&mut salt);

    let key = AesHmacSha2Key::from_passphrase(passphrase, rounds, &salt)?;
    let (ciphertext, iv) = key.encrypt(plaintext.to_vec());

    let envelope = Envelope { salt, iv, rounds, ciphertext };

    Ok(armor::wrap(&envelope.seal(&key)))
}

fn decrypt_helper(data: &[u8], passphrase: &str) -> Result<Vec<u8>, KeyExportError> {
    let text = std::str::from_utf8(data).map_err(|_| KeyExportError::MalformedArmor)?;

    let bytes = armor::unwrap(text)?;
    let envelope = Envelope::parse(&bytes)?;

    let key = AesHmacSha2Key::from_passphrase(passphrase, envelope.rounds, &envelope.salt)?;

    key.verify_mac(envelope.mac_input, &envelope.mac)
        .map_err(|_| KeyExportError::AuthFailure)?;

    Ok(key.decrypt(envelope.ciphertext.to_vec(), &envelope.iv))
}
