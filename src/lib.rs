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

#![doc = include_str!("../README.md")]
#![warn(missing_docs, missing_debug_implementations)]

mod armor;
mod ciphers;
mod envelope;
mod error;
mod key_export;
mod pipeline;
pub mod store;
mod types;

pub use error::KeyExportError;
pub use key_export::{decrypt_room_key_export, encrypt_room_key_export, DEFAULT_PBKDF_ROUNDS};
pub use pipeline::{export_room_keys, import_room_keys};
pub use store::{ExportableSession, MemorySession, MemoryStore, SessionStore, StoreError};
pub use types::ExportedRoomKey;

// Enable tracing for tests in this crate
#[cfg(test)]
#[ctor::ctor]
fn init_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .init();
}
