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

//! secp256k1 key types.

use super::Address;
use crate::utils;
use anyhow::{Error, Result, anyhow};
use k256::ecdsa::{SigningKey, VerifyingKey};
use parity_scale_codec::{Decode, Encode};
use std::{fmt, str::FromStr};

/// Private key.
///
/// A 256 bits unsigned integer below the secp256k1 curve order, stored as
/// a 32 bytes big-endian array.
#[derive(Encode, Decode, Clone, Copy, PartialEq, Eq, Hash, derive_more::From)]
pub struct PrivateKey([u8; 32]);

impl PrivateKey {
    /// Generate a new random private key.
    pub fn random() -> Self {
        let signing_key = SigningKey::random(&mut rand::rngs::OsRng);
        let mut bytes = [0; 32];
        bytes.copy_from_slice(&signing_key.to_bytes());
        Self(bytes)
    }

    /// Construct from raw bytes, checking that they form a valid scalar.
    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self> {
        let key = Self(bytes);
        key.signing_key()?;
        Ok(key)
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.0
    }

    /// Get the associated public key.
    ///
    /// # Panics
    /// Panics if the key was constructed from an out of range scalar
    /// with [`From<[u8; 32]>`], which is intended for fixtures only.
    pub fn public_key(&self) -> PublicKey {
        let signing_key = self
            .signing_key()
            .expect("private key is a valid secp256k1 scalar");
        PublicKey::from(signing_key.verifying_key())
    }

    pub(crate) fn signing_key(&self) -> Result<SigningKey> {
        SigningKey::from_slice(&self.0).map_err(|_| anyhow!("invalid secp256k1 private key"))
    }
}

impl FromStr for PrivateKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_bytes(utils::decode_to_array(s)?)
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey(<hidden>)")
    }
}

/// Public key in the 33 bytes compressed SEC1 form.
#[derive(Encode, Decode, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PublicKey([u8; 33]);

impl PublicKey {
    /// Construct from compressed bytes, checking that they encode a curve point.
    pub fn from_bytes(bytes: [u8; 33]) -> Result<Self> {
        VerifyingKey::from_sec1_bytes(&bytes)
            .map_err(|_| anyhow!("invalid compressed public key"))?;
        Ok(Self(bytes))
    }

    /// Construct from a byte slice of any SEC1 encoding.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let key = VerifyingKey::from_sec1_bytes(bytes)
            .map_err(|_| anyhow!("invalid public key bytes"))?;
        Ok(Self::from(&key))
    }

    pub fn to_bytes(self) -> [u8; 33] {
        self.0
    }

    pub fn to_hex(self) -> String {
        hex::encode(self.0)
    }

    pub fn to_address(self) -> Address {
        Address::from(self)
    }

    /// Uncompressed key bytes without the SEC1 tag.
    pub fn to_uncompressed(self) -> [u8; 64] {
        let point = self.verifying_key().to_encoded_point(false);
        let mut bytes = [0; 64];
        bytes.copy_from_slice(&point.as_bytes()[1..]);
        bytes
    }

    pub(crate) fn verifying_key(self) -> VerifyingKey {
        // Every constructor validates the point.
        VerifyingKey::from_sec1_bytes(&self.0).expect("public key is a valid curve point")
    }
}

impl From<&VerifyingKey> for PublicKey {
    fn from(key: &VerifyingKey) -> Self {
        let point = key.to_encoded_point(true);
        let mut bytes = [0; 33];
        bytes.copy_from_slice(point.as_bytes());
        Self(bytes)
    }
}

impl From<PrivateKey> for PublicKey {
    fn from(key: PrivateKey) -> Self {
        key.public_key()
    }
}

impl AsRef<[u8]> for PublicKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl FromStr for PublicKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_bytes(utils::decode_to_array(s)?)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}
