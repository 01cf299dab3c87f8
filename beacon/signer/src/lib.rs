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

//! Signer library for beacon nodes.
//!
//! The crate keeps the node's secp256k1 keys in a [`KeyStorage`] and signs
//! data with them. [`Identity`] binds the signer to one key and serves as the
//! node's [`Signing`] capability on the network.

mod storage;

pub use storage::{FSKeyStorage, KeyStorage, MemoryKeyStorage};

use anyhow::{Result, bail};
use beacon_common::{Address, Digest, PrivateKey, PublicKey, Signature, Signing, ToDigest};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::{fmt, path::PathBuf, sync::Arc};

/// Signer which signs data using owned key store.
#[derive(Clone)]
pub struct Signer {
    key_store: Arc<RwLock<dyn KeyStorage>>,
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signer").finish_non_exhaustive()
    }
}

impl Signer {
    /// Create a new signer with a key store.
    pub fn new(key_store: impl KeyStorage) -> Self {
        Self {
            key_store: Arc::new(RwLock::new(key_store)),
        }
    }

    /// Create a new signer with a key store location.
    pub fn fs(path: PathBuf) -> Result<Self> {
        Ok(Self::new(FSKeyStorage::from_path(path)?))
    }

    /// Create a new signer with a temporary empty key store in file system.
    pub fn fs_temporary() -> Result<Self> {
        Ok(Self::new(FSKeyStorage::tmp()?))
    }

    /// Create a new signer with an empty memory key store.
    pub fn memory() -> Self {
        Self::new(MemoryKeyStorage::empty())
    }

    pub fn storage(&self) -> RwLockReadGuard<'_, dyn KeyStorage> {
        self.key_store.read()
    }

    pub fn storage_mut(&self) -> RwLockWriteGuard<'_, dyn KeyStorage> {
        self.key_store.write()
    }

    /// Generate a new private key and return a public key for it.
    pub fn generate_key(&self) -> Result<PublicKey> {
        self.storage_mut().add_key(PrivateKey::random())
    }

    /// Create a ECDSA recoverable signature for the digest.
    pub fn sign_digest(&self, public_key: PublicKey, digest: Digest) -> Result<Signature> {
        let private_key = self.storage().get_private_key(public_key)?;
        Signature::create_for_digest(&private_key, digest)
    }

    /// Create a ECDSA recoverable signature for the raw bytes data.
    pub fn sign(&self, public_key: PublicKey, data: &[u8]) -> Result<Signature> {
        self.sign_digest(public_key, data.to_digest())
    }

    /// Get a public key for the provided ethereum address. If no key found a `None` is returned.
    pub fn get_key_by_addr(&self, address: Address) -> Result<Option<PublicKey>> {
        let keys = self.storage().list_keys()?;
        Ok(keys.into_iter().find(|key| key.to_address() == address))
    }

    /// Bind the signer to one of its keys.
    pub fn identity(&self, public_key: PublicKey) -> Result<Identity> {
        if !self.storage().has_key(public_key)? {
            bail!("key {public_key} is not in the key store");
        }

        Ok(Identity {
            signer: self.clone(),
            public_key,
        })
    }
}

/// Network identity of a node: a [`Signer`] together with the key it signs with.
#[derive(Debug, Clone)]
pub struct Identity {
    signer: Signer,
    public_key: PublicKey,
}

impl Identity {
    pub fn address(&self) -> Address {
        self.public_key.to_address()
    }
}

impl Signing for Identity {
    fn public_key(&self) -> PublicKey {
        self.public_key
    }

    fn sign(&self, data: &[u8]) -> Result<Signature> {
        self.signer.sign(self.public_key, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_with_memory_storage() {
        let signer = Signer::memory();
        let public_key = signer.generate_key().unwrap();

        let signature = signer.sign(public_key, b"entry").unwrap();
        signature
            .verify(public_key, b"entry".as_slice().to_digest())
            .unwrap();
    }

    #[test]
    fn find_key_by_address() {
        let signer = Signer::memory();
        let public_key = signer
            .storage_mut()
            .add_key(PrivateKey::from([9; 32]))
            .unwrap();

        assert_eq!(
            signer.get_key_by_addr(public_key.to_address()).unwrap(),
            Some(public_key)
        );
        assert_eq!(signer.get_key_by_addr(Address([0; 20])).unwrap(), None);
    }

    #[test]
    fn identity_requires_known_key() {
        let signer = Signer::memory();
        let unknown = PrivateKey::from([1; 32]).public_key();
        assert!(signer.identity(unknown).is_err());

        let public_key = signer.generate_key().unwrap();
        let identity = signer.identity(public_key).unwrap();
        assert_eq!(identity.public_key(), public_key);
        assert_eq!(identity.address(), public_key.to_address());

        let signature = identity.sign(b"payload").unwrap();
        assert!(identity.verify(&signature, b"payload", public_key));
        assert!(!identity.verify(&signature, b"payload", unknown));
        assert!(!identity.verify(&signature, b"tampered", public_key));
    }
}
