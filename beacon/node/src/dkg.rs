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

//! Distributed key generation interface.

use anyhow::Result;
use async_trait::async_trait;
use beacon_common::{BlockCounter, RelayChain, RequestId, Signing, ThresholdSigner, U256};
use beacon_network::{BroadcastChannel, MembershipValidator};
use std::{fmt, sync::Arc};

/// Input of one DKG run, played by one locally selected staker.
#[derive(Clone)]
pub struct DkgParams {
    pub request_id: RequestId,
    /// Entropy of the relay request the group is formed for.
    pub entry: U256,
    /// 0-based position of the local staker in the group selection.
    pub player_index: usize,
    pub group_size: usize,
    pub dishonest_threshold: usize,
    pub membership_validator: MembershipValidator,
    /// Block at which the group selection ended.
    pub start_block_height: u64,
    pub block_counter: Arc<dyn BlockCounter>,
    pub relay_chain: Arc<dyn RelayChain>,
    pub signing: Arc<dyn Signing>,
    /// Channel shared by all runs of the group.
    pub channel: BroadcastChannel,
}

impl fmt::Debug for DkgParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DkgParams")
            .field("request_id", &self.request_id)
            .field("player_index", &self.player_index)
            .field("group_size", &self.group_size)
            .field("dishonest_threshold", &self.dishonest_threshold)
            .field("start_block_height", &self.start_block_height)
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}

/// Runs the DKG protocol. A run may span many blocks; it ends with the
/// player's share of the group key or an error.
#[async_trait]
pub trait DkgExecutor: Send + Sync {
    async fn execute_dkg(&self, params: DkgParams) -> Result<ThresholdSigner>;
}
