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

use base64::{
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
    Engine,
};

use crate::error::KeyExportError;

pub(crate) const HEADER: &str = "-----BEGIN MEGOLM SESSION DATA-----";
pub(crate) const FOOTER: &str = "-----END MEGOLM SESSION DATA-----";

/// Wrapped at the classic PEM width.
const LINE_LENGTH: usize = 76;

/// We encode with padding like Element does, but accept unpadded input as
/// well: exports written by older matrix-sdk versions left the padding off.
const BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Wrap the binary envelope in its PEM-style armor.
pub(crate) fn wrap(envelope: &[u8]) -> String {
    let encoded = BASE64.encode(envelope);

    let mut armor = String::with_capacity(
        HEADER.len() + FOOTER.len() + encoded.len() + encoded.len() / LINE_LENGTH + 4,
    );

    armor.push_str(HEADER);

    for line in encoded.as_bytes().chunks(LINE_LENGTH) {
        armor.push('\n');
        armor.push_str(std::str::from_utf8(line).expect("base64 output is ASCII"));
    }

    armor.push('\n');
    armor.push_str(FOOTER);
    armor.push('\n');

    armor
}

/// Strip the armor and decode the binary envelope.
///
/// Lines are trimmed and empty lines dropped first, so `\r\n` line endings
/// and stray whitespace don't matter. After that the first line must be the
/// header, the last one the footer, and everything in between base64.
pub(crate) fn unwrap(armor: &str) -> Result<Vec<u8>, KeyExportError> {
    let mut lines = armor.lines().map(str::trim).filter(|l| !l.is_empty());

    if lines.next() != Some(HEADER) {
        return Err(KeyExportError::MalformedArmor);
    }

    let mut body = String::new();
    let mut saw_footer = false;

    for line in lines {
        if saw_footer {
            // Trailing garbage after the footer.
            return Err(KeyExportError::MalformedArmor);
        } else if line == FOOTER {
            saw_footer = true;
        } else {
            body.push_str(line);
        }
    }

    if !saw_footer || body.is_empty() {
        return Err(KeyExportError::MalformedArmor);
    }

    BASE64.decode(body).map_err(|_| KeyExportError::MalformedArmor)
}
