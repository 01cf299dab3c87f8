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

//! Recoverable secp256k1 signatures.

use super::{Address, Digest, PrivateKey, PublicKey, ToDigest};
use anyhow::{Error, Result, anyhow, bail};
use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, VerifyingKey, signature::hazmat::PrehashVerifier};
use parity_scale_codec::{Decode, Encode};
use std::fmt;

/// A recoverable ECDSA signature: `r || s || v`, with `v` in the `{0; 1}` set.
#[derive(Clone, Copy, Encode, Decode, PartialEq, Eq, Hash)]
pub struct Signature([u8; 65]);

impl Signature {
    pub const SIZE: usize = 65;

    /// Create a recoverable signature for the provided digest using the private key.
    pub fn create_for_digest(private_key: &PrivateKey, digest: Digest) -> Result<Self> {
        let signing_key = private_key.signing_key()?;
        let (signature, recovery_id) = signing_key
            .sign_prehash_recoverable(digest.as_ref())
            .map_err(|err| anyhow!("signing failed: {err}"))?;

        let mut bytes = [0; 65];
        bytes[..64].copy_from_slice(&signature.to_bytes());
        bytes[64] = recovery_id.to_byte();
        Ok(Self(bytes))
    }

    /// Create a recoverable signature over keccak-256 of `data`.
    pub fn create<T: ToDigest + ?Sized>(private_key: &PrivateKey, data: &T) -> Result<Self> {
        Self::create_for_digest(private_key, data.to_digest())
    }

    /// Verifies the signature using the public key and digest possibly signed with
    /// the public key.
    pub fn verify(&self, public_key: PublicKey, digest: Digest) -> Result<()> {
        let signature = self.ecdsa()?;
        public_key
            .verifying_key()
            .verify_prehash(digest.as_ref(), &signature)
            .map_err(|_| anyhow!("invalid signature: verification against {public_key} failed"))
    }

    /// Recovers public key which was used to create the signature for the signed digest.
    pub fn recover_from_digest(&self, digest: Digest) -> Result<PublicKey> {
        let signature = self.ecdsa()?;
        let recovery_id =
            RecoveryId::from_byte(self.0[64]).ok_or_else(|| anyhow!("invalid recovery id"))?;
        let key = VerifyingKey::recover_from_prehash(digest.as_ref(), &signature, recovery_id)
            .map_err(|_| anyhow!("invalid signature: public key recovery failed"))?;
        Ok(PublicKey::from(&key))
    }

    /// Verifies that the signature was produced by the owner of `address`.
    pub fn verify_address(&self, address: Address, digest: Digest) -> Result<()> {
        let public_key = self.recover_from_digest(digest)?;
        if public_key.to_address() != address {
            bail!("invalid signature: public key does not match the address");
        }
        self.verify(public_key, digest)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    fn ecdsa(&self) -> Result<EcdsaSignature> {
        EcdsaSignature::from_slice(&self.0[..64])
            .map_err(|_| anyhow!("invalid signature: malformed scalars"))
    }
}

impl From<Signature> for [u8; 65] {
    fn from(signature: Signature) -> Self {
        signature.0
    }
}

impl TryFrom<&[u8]> for Signature {
    type Error = Error;

    fn try_from(data: &[u8]) -> Result<Self> {
        let bytes: [u8; 65] = data
            .try_into()
            .map_err(|_| anyhow!("invalid signature length {}", data.len()))?;
        let signature = Self(bytes);
        signature.ecdsa()?;
        Ok(signature)
    }
}

impl AsRef<[u8]> for Signature {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MESSAGE: &[u8] = b"It's not much of a tail, but I'm sort of attached to it.";

    #[test]
    fn verify_message_signature() {
        let private_key = PrivateKey::random();
        let signature = Signature::create(&private_key, MESSAGE).unwrap();

        signature
            .verify(private_key.public_key(), MESSAGE.to_digest())
            .unwrap();
        assert_eq!(
            signature.recover_from_digest(MESSAGE.to_digest()).unwrap(),
            private_key.public_key()
        );
    }

    #[test]
    fn detect_invalid_message_signature() {
        let private_key = PrivateKey::random();
        let another_key = PrivateKey::random();
        let signature = Signature::create(&private_key, MESSAGE).unwrap();

        let err = signature
            .verify(another_key.public_key(), MESSAGE.to_digest())
            .unwrap_err();
        assert!(err.to_string().starts_with("invalid signature"));
    }

    #[test]
    fn verify_address() {
        let private_key = PrivateKey::from([3; 32]);
        let signature = Signature::create(&private_key, MESSAGE).unwrap();
        let digest = MESSAGE.to_digest();

        signature
            .verify_address(private_key.public_key().to_address(), digest)
            .unwrap();
        signature
            .verify_address(PrivateKey::from([4; 32]).public_key().to_address(), digest)
            .unwrap_err();
    }

    #[test]
    fn bytes_roundtrip() {
        let signature = Signature::create(&PrivateKey::from([1; 32]), MESSAGE).unwrap();
        let bytes: [u8; 65] = signature.into();
        assert_eq!(Signature::try_from(&bytes[..]).unwrap(), signature);
        assert!(Signature::try_from(&bytes[..64]).is_err());
    }
}
