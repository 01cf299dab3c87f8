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

//! In-memory doubles of the on-chain collaborators.

use crate::{BlockCounter, GroupPublicKey, RelayChain, RequestId};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use parking_lot::Mutex;
use primitive_types::U256;
use std::sync::Arc;
use tokio::sync::watch;

/// Relay request observed on-chain while an entry is being produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInProgress {
    pub previous_entry: U256,
    pub start_block: u64,
    pub group_public_key: GroupPublicKey,
}

#[derive(Debug, Default)]
struct RelayChainState {
    entry_in_progress: Option<EntryInProgress>,
    dkg_results: Vec<(RequestId, GroupPublicKey)>,
    relay_entries: Vec<(GroupPublicKey, U256)>,
    queries: usize,
}

/// Relay chain keeping all state in memory.
#[derive(Debug, Clone, Default)]
pub struct MockRelayChain {
    state: Arc<Mutex<RelayChainState>>,
}

impl MockRelayChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_entry_in_progress(&self, entry: Option<EntryInProgress>) {
        self.state.lock().entry_in_progress = entry;
    }

    pub fn dkg_results(&self) -> Vec<(RequestId, GroupPublicKey)> {
        self.state.lock().dkg_results.clone()
    }

    pub fn relay_entries(&self) -> Vec<(GroupPublicKey, U256)> {
        self.state.lock().relay_entries.clone()
    }

    /// Number of reads of the current request made so far.
    pub fn queries(&self) -> usize {
        self.state.lock().queries
    }

    fn current(&self) -> Result<EntryInProgress> {
        let mut state = self.state.lock();
        state.queries += 1;
        state
            .entry_in_progress
            .clone()
            .ok_or_else(|| anyhow!("no relay entry in progress"))
    }
}

#[async_trait]
impl RelayChain for MockRelayChain {
    async fn is_entry_in_progress(&self) -> Result<bool> {
        let mut state = self.state.lock();
        state.queries += 1;
        Ok(state.entry_in_progress.is_some())
    }

    async fn current_request_previous_entry(&self) -> Result<U256> {
        self.current().map(|entry| entry.previous_entry)
    }

    async fn current_request_start_block(&self) -> Result<u64> {
        self.current().map(|entry| entry.start_block)
    }

    async fn current_request_group_public_key(&self) -> Result<GroupPublicKey> {
        self.current().map(|entry| entry.group_public_key)
    }

    async fn submit_dkg_result(
        &self,
        request_id: RequestId,
        group_public_key: GroupPublicKey,
    ) -> Result<()> {
        self.state
            .lock()
            .dkg_results
            .push((request_id, group_public_key));
        Ok(())
    }

    async fn submit_relay_entry(&self, group_public_key: GroupPublicKey, entry: U256) -> Result<()> {
        self.state.lock().relay_entries.push((group_public_key, entry));
        Ok(())
    }
}

/// Block counter driven manually by tests.
#[derive(Debug, Clone)]
pub struct MockBlockCounter {
    height: Arc<watch::Sender<u64>>,
}

impl MockBlockCounter {
    pub fn new(height: u64) -> Self {
        Self {
            height: Arc::new(watch::Sender::new(height)),
        }
    }

    /// Move the chain `blocks` blocks forward.
    pub fn advance(&self, blocks: u64) {
        self.height.send_modify(|height| *height += blocks);
    }
}

impl Default for MockBlockCounter {
    fn default() -> Self {
        Self::new(0)
    }
}

#[async_trait]
impl BlockCounter for MockBlockCounter {
    async fn current_block(&self) -> Result<u64> {
        Ok(*self.height.borrow())
    }

    async fn wait_for_block_height(&self, height: u64) -> Result<()> {
        let mut receiver = self.height.subscribe();
        receiver
            .wait_for(|current| *current >= height)
            .await
            .map(|_| ())
            .map_err(|_| anyhow!("block counter stopped"))
    }
}
