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

//! Relay entry signing interface.

use anyhow::Result;
use async_trait::async_trait;
use beacon_common::{BlockCounter, GroupPublicKey, RelayChain, ThresholdSigner, U256};
use beacon_network::BroadcastChannel;
use std::{fmt, sync::Arc};

/// Request to produce the next beacon entry with one group membership.
#[derive(Clone)]
pub struct EntrySigningRequest {
    pub previous_entry: U256,
    pub group_public_key: GroupPublicKey,
    pub start_block_height: u64,
    pub signer: ThresholdSigner,
    /// Permanent channel of the group.
    pub channel: BroadcastChannel,
    /// Index of the group in the node registry.
    pub group_index: usize,
    pub block_counter: Arc<dyn BlockCounter>,
    pub relay_chain: Arc<dyn RelayChain>,
}

impl fmt::Debug for EntrySigningRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntrySigningRequest")
            .field("previous_entry", &self.previous_entry)
            .field("group_public_key", &self.group_public_key)
            .field("start_block_height", &self.start_block_height)
            .field("member_index", &self.signer.member_index)
            .field("group_index", &self.group_index)
            .finish_non_exhaustive()
    }
}

/// Runs the threshold signing protocol of a group and submits the entry.
#[async_trait]
pub trait EntrySigner: Send + Sync {
    async fn sign_and_submit(&self, request: EntrySigningRequest) -> Result<()>;
}
