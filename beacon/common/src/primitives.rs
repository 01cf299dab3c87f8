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

//! On-chain group types.

use crate::Address;
use anyhow::{Result, ensure};
use parity_scale_codec::{Decode, Encode};
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of an on-chain relay entry request.
#[derive(
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    derive_more::From,
    derive_more::Display,
)]
pub struct RequestId(pub U256);

impl fmt::Debug for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RequestId({})", self.0)
    }
}

impl From<u64> for RequestId {
    fn from(id: u64) -> Self {
        Self(U256::from(id))
    }
}

/// Serialized group public key as published on-chain.
///
/// The key itself is produced by the DKG and is opaque to the node.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Encode, Decode, derive_more::From)]
pub struct GroupPublicKey(Vec<u8>);

impl GroupPublicKey {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    /// Name of the permanent broadcast channel of the group.
    pub fn channel_name(&self) -> String {
        self.to_hex()
    }
}

impl AsRef<[u8]> for GroupPublicKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for GroupPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

impl fmt::Display for GroupPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

/// Secret share of a group private key.
#[derive(Clone, PartialEq, Eq, Encode, Decode, derive_more::From)]
pub struct SecretShare(Vec<u8>);

impl SecretShare {
    pub fn expose(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for SecretShare {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretShare(<hidden>)")
    }
}

/// Outcome of a successful DKG run: one member's share of the group key.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct ThresholdSigner {
    pub member_index: u32,
    pub group_public_key: GroupPublicKey,
    pub group_private_key_share: SecretShare,
}

impl ThresholdSigner {
    pub fn group_public_key(&self) -> &GroupPublicKey {
        &self.group_public_key
    }
}

/// Stakers selected on-chain to form a group for one relay request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupSelectionResult {
    /// Selected staker addresses, in on-chain order.
    pub selected_stakers: Vec<Address>,
    /// Block height at which the selection ended.
    pub selection_end_block: u64,
}

impl GroupSelectionResult {
    /// Positions the staker holds in the group. A staker with several
    /// virtual stakes may be selected more than once.
    pub fn indexes_of(&self, staker: Address) -> Vec<usize> {
        self.selected_stakers
            .iter()
            .enumerate()
            .filter_map(|(index, selected)| (*selected == staker).then_some(index))
            .collect()
    }
}

/// Group parameters defined by the beacon contracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct ChainConfig {
    /// Number of members in a group.
    pub group_size: usize,
    /// Maximum number of dishonest members the group tolerates.
    pub dishonest_threshold: usize,
}

impl ChainConfig {
    pub fn validate(&self) -> Result<()> {
        ensure!(self.group_size > 0, "group size must be positive");
        ensure!(
            self.dishonest_threshold < self.group_size,
            "dishonest threshold {} must be below group size {}",
            self.dishonest_threshold,
            self.group_size
        );
        Ok(())
    }

    /// Number of members needed to produce a group signature.
    pub fn honest_threshold(&self) -> usize {
        self.dishonest_threshold + 1
    }
}
