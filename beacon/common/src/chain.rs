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

//! Interfaces of the on-chain collaborators of a beacon node.

use crate::{Address, GroupPublicKey, PublicKey, RequestId, Signature, ToDigest};
use anyhow::Result;
use async_trait::async_trait;
use primitive_types::U256;

/// On-chain identity this node uses to prove its stake.
pub trait Staker: Send + Sync {
    /// Address the stake is registered under.
    fn address(&self) -> Address;

    /// Stable textual identifier of the stake.
    fn id(&self) -> String;
}

/// Staker backed by a local secp256k1 key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalStaker {
    public_key: PublicKey,
}

impl LocalStaker {
    pub fn new(public_key: PublicKey) -> Self {
        Self { public_key }
    }

    pub fn public_key(&self) -> PublicKey {
        self.public_key
    }
}

impl Staker for LocalStaker {
    fn address(&self) -> Address {
        self.public_key.to_address()
    }

    fn id(&self) -> String {
        self.address().to_string()
    }
}

/// Relay contract client.
#[async_trait]
pub trait RelayChain: Send + Sync {
    async fn is_entry_in_progress(&self) -> Result<bool>;

    async fn current_request_previous_entry(&self) -> Result<U256>;

    async fn current_request_start_block(&self) -> Result<u64>;

    async fn current_request_group_public_key(&self) -> Result<GroupPublicKey>;

    /// Publish the group public key produced by a DKG run for `request_id`.
    async fn submit_dkg_result(
        &self,
        request_id: RequestId,
        group_public_key: GroupPublicKey,
    ) -> Result<()>;

    /// Publish a new beacon entry signed by `group_public_key`.
    async fn submit_relay_entry(
        &self,
        group_public_key: GroupPublicKey,
        entry: U256,
    ) -> Result<()>;
}

/// Monotonic source of chain heights.
#[async_trait]
pub trait BlockCounter: Send + Sync {
    async fn current_block(&self) -> Result<u64>;

    /// Resolves once the chain reaches `height`.
    async fn wait_for_block_height(&self, height: u64) -> Result<()>;
}

/// Identity-level signing capability.
pub trait Signing: Send + Sync {
    fn public_key(&self) -> PublicKey;

    /// Sign keccak-256 of `data`.
    fn sign(&self, data: &[u8]) -> Result<Signature>;

    fn verify(&self, signature: &Signature, data: &[u8], public_key: PublicKey) -> bool {
        signature.verify(public_key, data.to_digest()).is_ok()
    }
}
