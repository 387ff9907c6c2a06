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

use aes::{
    cipher::{generic_array::GenericArray, IvSizeUser, KeyIvInit, KeySizeUser, StreamCipher},
    Aes256,
};
use ctr::Ctr128BE;
use hmac::{digest::MacError, Hmac, Mac as _};
use pbkdf2::pbkdf2;
use rand::{thread_rng, RngCore};
use sha2::{Sha256, Sha512};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::KeyExportError;

pub(crate) const SALT_SIZE: usize = 16;
pub(crate) const IV_SIZE: usize = 16;
pub(crate) const KEY_SIZE: usize = 32;
pub(crate) const MAC_SIZE: usize = 32;

type Aes256Ctr = Ctr128BE<Aes256>;

type Aes256Key = GenericArray<u8, <Aes256Ctr as KeySizeUser>::KeySize>;
type Aes256Iv = GenericArray<u8, <Aes256Ctr as IvSizeUser>::IvSize>;

/// Expand a passphrase into key material using PBKDF2-HMAC-SHA-512.
///
/// The key export format needs more output than a single SHA-512 block when
/// both sub-keys are derived at once, which PBKDF2 handles by running its
/// block counter past 1; the `pbkdf2` crate does this for us for any
/// `length`.
pub(crate) fn expand_passphrase(
    passphrase: &str,
    salt: &[u8],
    rounds: u32,
    length: usize,
) -> Result<Zeroizing<Vec<u8>>, KeyExportError> {
    if rounds < 1 || length < 1 {
        return Err(KeyExportError::BadInput);
    }

    let mut key_material = Zeroizing::new(vec![0u8; length]);

    pbkdf2::<Hmac<Sha512>>(passphrase.as_bytes(), salt, rounds, &mut key_material)
        .expect("HMAC-SHA-512 can be keyed with a passphrase of any length");

    Ok(key_material)
}

/// The pair of sub-keys protecting a key export.
///
/// A single PBKDF2 pass produces 64 bytes; the first half keys AES-256-CTR,
/// the second half keys HMAC-SHA-256. The halves must never be swapped,
/// every other client splits them this way round.
#[derive(Debug, Zeroize, ZeroizeOnDrop)]
pub(crate) struct AesHmacSha2Key {
    aes_key: Box<[u8; KEY_SIZE]>,
    mac_key: Box<[u8; KEY_SIZE]>,
}

impl AesHmacSha2Key {
    /// Derive the sub-key pair from a passphrase, a salt, and a PBKDF2
    /// iteration count.
    ///
    /// Fails with [`KeyExportError::BadInput`] if `rounds` is zero.
    pub(crate) fn from_passphrase(
        passphrase: &str,
        rounds: u32,
        salt: &[u8; SALT_SIZE],
    ) -> Result<Self, KeyExportError> {
        let key_material = expand_passphrase(passphrase, salt, rounds, KEY_SIZE * 2)?;

        let mut aes_key = Box::new([0u8; KEY_SIZE]);
        let mut mac_key = Box::new([0u8; KEY_SIZE]);

        aes_key.copy_from_slice(&key_material[..KEY_SIZE]);
        mac_key.copy_from_slice(&key_material[KEY_SIZE..]);

        Ok(Self { aes_key, mac_key })
    }

    /// Encrypt the plaintext in place and return it together with the
    /// freshly generated initialization vector.
    ///
    /// This provides no authenticity. The caller *must* create a MAC tag
    /// over the assembled envelope afterwards.
    pub(crate) fn encrypt(&self, mut plaintext: Vec<u8>) -> (Vec<u8>, [u8; IV_SIZE]) {
        let iv = Self::generate_iv();

        let mut cipher = Aes256Ctr::new(self.aes_key(), Aes256Iv::from_slice(&iv));
        cipher.apply_keystream(&mut plaintext);

        (plaintext, iv)
    }

    /// Decrypt the ciphertext with the given initialization vector.
    ///
    /// This provides no authenticity. The caller *must* have verified the
    /// MAC tag with [`AesHmacSha2Key::verify_mac()`] before calling this.
    pub(crate) fn decrypt(&self, mut ciphertext: Vec<u8>, iv: &[u8; IV_SIZE]) -> Vec<u8> {
        let mut cipher = Aes256Ctr::new(self.aes_key(), Aes256Iv::from_slice(iv.as_slice()));
        cipher.apply_keystream(&mut ciphertext);

        ciphertext
    }

    /// Create the HMAC-SHA-256 tag for the given message.
    pub(crate) fn create_mac_tag(&self, message: &[u8]) -> [u8; MAC_SIZE] {
        let mut hmac = Hmac::<Sha256>::new_from_slice(self.mac_key.as_slice())
            .expect("HMAC-SHA-256 can be keyed with our 32-byte MAC sub-key");
        hmac.update(message);

        hmac.finalize().into_bytes().into()
    }

    /// Compare the given tag with the one we compute for the message.
    ///
    /// The comparison doesn't short-circuit, its runtime depends only on
    /// the tag length.
    pub(crate) fn verify_mac(&self, message: &[u8], mac: &[u8; MAC_SIZE]) -> Result<(), MacError> {
        let mut hmac = Hmac::<Sha256>::new_from_slice(self.mac_key.as_slice())
            .expect("HMAC-SHA-256 can be keyed with our 32-byte MAC sub-key");
        hmac.update(message);

        hmac.verify_slice(mac)
    }

    /// Generate a random initialization vector with bit 63 cleared.
    ///
    /// The Matrix spec asks for the clear bit to paper over AES-CTR counter
    /// carry differences between implementations.
    fn generate_iv() -> [u8; IV_SIZE] {
        let mut rng = thread_rng();
        let mut iv = [0u8; IV_SIZE];

        rng.fill_bytes(&mut iv);

        let mut iv = u128::from_be_bytes(iv);
        iv &= !(1 << 63);

        iv.to_be_bytes()
    }

    fn aes_key(&self) -> &Aes256Key {
        Aes256Key::from_slice(self.aes_key.as_slice())
    }
}
