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

//! Keccak-256 digests.

use parity_scale_codec::{Decode, Encode};
use sha3::{Digest as _, Keccak256};

/// Keccak-256 digest of some data.
#[derive(
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Encode,
    Decode,
    derive_more::From,
    derive_more::Into,
    derive_more::Debug,
    derive_more::Display,
)]
#[debug("0x{}", hex::encode(_0))]
#[display("0x{}", hex::encode(_0))]
pub struct Digest(pub [u8; 32]);

impl Digest {
    pub const fn zero() -> Self {
        Self([0; 32])
    }
}

impl AsRef<[u8]> for Digest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Types which can be hashed into a [`Digest`].
pub trait ToDigest {
    fn update_hasher(&self, hasher: &mut Keccak256);

    fn to_digest(&self) -> Digest {
        let mut hasher = Keccak256::new();
        self.update_hasher(&mut hasher);
        Digest(hasher.finalize().into())
    }
}

impl ToDigest for [u8] {
    fn update_hasher(&self, hasher: &mut Keccak256) {
        hasher.update(self);
    }
}

impl ToDigest for Vec<u8> {
    fn update_hasher(&self, hasher: &mut Keccak256) {
        hasher.update(self.as_slice());
    }
}

impl<T: ToDigest + ?Sized> ToDigest for &T {
    fn update_hasher(&self, hasher: &mut Keccak256) {
        (**self).update_hasher(hasher);
    }
}

impl From<&[u8]> for Digest {
    fn from(data: &[u8]) -> Self {
        data.to_digest()
    }
}
