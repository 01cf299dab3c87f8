// This file is part of Gear.
//
// Copyright (C) 2026 Gear Technologies Inc.
// SPDX-License-Identifier: GPL-3.0-or-later WITH Classpath-exception-2.0
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Key storages.

use anyhow::{Context, Result, anyhow, bail};
use beacon_common::{PrivateKey, PublicKey};
use std::{collections::BTreeMap, fs, path::PathBuf, str::FromStr};
use tempfile::TempDir;

/// Storage of the node's private keys, addressed by their public keys.
pub trait KeyStorage: Send + Sync + 'static {
    fn empty() -> Self
    where
        Self: Sized;

    /// Store the key and return its public part.
    fn add_key(&mut self, key: PrivateKey) -> Result<PublicKey>;

    fn get_private_key(&self, key: PublicKey) -> Result<PrivateKey>;

    fn has_key(&self, key: PublicKey) -> Result<bool>;

    fn list_keys(&self) -> Result<Vec<PublicKey>>;

    fn clear_keys(&mut self) -> Result<()>;
}

/// In-memory key storage.
#[derive(Debug, Default)]
pub struct MemoryKeyStorage {
    keys: BTreeMap<PublicKey, PrivateKey>,
}

impl KeyStorage for MemoryKeyStorage {
    fn empty() -> Self {
        Self::default()
    }

    fn add_key(&mut self, key: PrivateKey) -> Result<PublicKey> {
        let public_key = key.public_key();
        self.keys.insert(public_key, key);
        Ok(public_key)
    }

    fn get_private_key(&self, key: PublicKey) -> Result<PrivateKey> {
        self.keys
            .get(&key)
            .copied()
            .ok_or_else(|| anyhow!("key {key} not found"))
    }

    fn has_key(&self, key: PublicKey) -> Result<bool> {
        Ok(self.keys.contains_key(&key))
    }

    fn list_keys(&self) -> Result<Vec<PublicKey>> {
        Ok(self.keys.keys().copied().collect())
    }

    fn clear_keys(&mut self) -> Result<()> {
        self.keys.clear();
        Ok(())
    }
}

/// Key storage keeping one file per key in a directory.
///
/// The file is named after the hex encoded public key and contains the raw
/// 32 bytes of the private key.
#[derive(Debug)]
pub struct FSKeyStorage {
    path: PathBuf,
    // Keeps a temporary directory alive for the lifetime of the storage.
    _tmp: Option<TempDir>,
}

impl FSKeyStorage {
    pub fn from_path(path: PathBuf) -> Result<Self> {
        fs::create_dir_all(&path)
            .with_context(|| format!("failed to create key store dir {}", path.display()))?;
        Ok(Self { path, _tmp: None })
    }

    pub fn tmp() -> Result<Self> {
        let tmp = tempfile::tempdir().context("failed to create temporary key store")?;
        Ok(Self {
            path: tmp.path().to_path_buf(),
            _tmp: Some(tmp),
        })
    }

    fn key_path(&self, key: PublicKey) -> PathBuf {
        self.path.join(key.to_hex())
    }
}

impl KeyStorage for FSKeyStorage {
    fn empty() -> Self {
        Self::tmp().expect("failed to create temporary key store")
    }

    fn add_key(&mut self, key: PrivateKey) -> Result<PublicKey> {
        let public_key = key.public_key();
        fs::write(self.key_path(public_key), key.to_bytes())?;
        Ok(public_key)
    }

    fn get_private_key(&self, key: PublicKey) -> Result<PrivateKey> {
        let bytes = fs::read(self.key_path(key)).with_context(|| format!("key {key} not found"))?;
        let Ok(bytes) = <[u8; 32]>::try_from(bytes.as_slice()) else {
            bail!("invalid key length {} for {key}", bytes.len());
        };
        PrivateKey::from_bytes(bytes)
    }

    fn has_key(&self, key: PublicKey) -> Result<bool> {
        Ok(fs::metadata(self.key_path(key)).is_ok())
    }

    fn list_keys(&self) -> Result<Vec<PublicKey>> {
        let mut keys = vec![];

        for entry in fs::read_dir(&self.path)? {
            let file_name = entry?.file_name();
            match PublicKey::from_str(&file_name.to_string_lossy()) {
                Ok(key) => keys.push(key),
                Err(err) => {
                    tracing::warn!(file = ?file_name, "skipping foreign file in key store: {err}")
                }
            }
        }

        keys.sort();
        Ok(keys)
    }

    fn clear_keys(&mut self) -> Result<()> {
        fs::remove_dir_all(&self.path)?;
        fs::create_dir_all(&self.path)?;
        Ok(())
    }
}
