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

//! Random beacon node orchestrator.

use crate::{
    config::{NodeConfig, RegistrationMode},
    dkg::{DkgExecutor, DkgParams},
    entry::{EntrySigner, EntrySigningRequest},
    registry::{GroupRegistry, RegistryError},
    storage::GroupStorage,
};
use anyhow::{Context as _, Result};
use beacon_common::{
    BlockCounter, GroupPublicKey, GroupSelectionResult, RelayChain, RequestId, Signing, Staker,
    ThresholdSigner, U256,
};
use beacon_network::{BroadcastChannel, ChannelError, MembershipValidator, Provider};
use std::sync::Arc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{Instrument, Span};

/// External collaborators of the node.
#[derive(Clone)]
pub struct NodeServices {
    pub staker: Arc<dyn Staker>,
    pub signing: Arc<dyn Signing>,
    pub provider: Arc<dyn Provider>,
    pub relay_chain: Arc<dyn RelayChain>,
    pub block_counter: Arc<dyn BlockCounter>,
    pub dkg: Arc<dyn DkgExecutor>,
    pub entry_signer: Arc<dyn EntrySigner>,
}

struct Inner {
    config: NodeConfig,
    services: NodeServices,
    registry: GroupRegistry,
    span: Span,
}

/// Node taking part in random beacon groups on behalf of one staker.
///
/// The node joins groups it is selected for, keeps track of them in a
/// [`GroupRegistry`] and signs relay entries with them.
#[derive(Clone)]
pub struct Node {
    inner: Arc<Inner>,
}

/// Claim on a membership attempt, released when the attempt ends.
struct AttemptClaim {
    inner: Arc<Inner>,
    request_id: RequestId,
}

impl Drop for AttemptClaim {
    fn drop(&mut self) {
        self.inner.registry.flush_pending_group(self.request_id);
    }
}

impl Node {
    /// Create a node with the group storage selected by `config`.
    pub fn new(config: NodeConfig, services: NodeServices) -> Result<Self> {
        let storage = config.group_storage()?;
        Self::with_storage(config, services, storage)
    }

    pub fn with_storage(
        config: NodeConfig,
        services: NodeServices,
        storage: Arc<dyn GroupStorage>,
    ) -> Result<Self> {
        config.validate()?;

        let span = tracing::info_span!("beacon-node", staker = %services.staker.id());

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                services,
                registry: GroupRegistry::new(storage),
                span,
            }),
        })
    }

    pub fn config(&self) -> &NodeConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &GroupRegistry {
        &self.inner.registry
    }

    /// Start joining the group selected for `request_id`, if the local
    /// staker is part of it.
    ///
    /// One DKG run is started per position the staker holds in the selection.
    /// Only one attempt per request runs at a time. Returns the handle of
    /// the attempt, or `None` if nothing was started.
    pub fn join_group_if_eligible(
        &self,
        selection: GroupSelectionResult,
        request_id: RequestId,
        entropy: U256,
    ) -> Option<JoinHandle<()>> {
        let _entered = self.inner.span.enter();

        let group_size = self.inner.config.chain.group_size;
        if selection.selected_stakers.len() > group_size {
            tracing::error!(
                request = %request_id,
                selected = selection.selected_stakers.len(),
                group_size,
                "group selection exceeds group size"
            );
            return None;
        }

        let player_indexes = selection.indexes_of(self.inner.services.staker.address());
        if player_indexes.is_empty() {
            tracing::trace!(request = %request_id, "not selected to the group");
            return None;
        }

        if !self.inner.registry.initialize_pending_group(request_id) {
            tracing::debug!(request = %request_id, "group membership attempt already in progress");
            return None;
        }
        let claim = AttemptClaim {
            inner: self.inner.clone(),
            request_id,
        };

        tracing::info!(request = %request_id, players = ?player_indexes, "eligible for group");

        let node = self.clone();
        let span = self.inner.span.clone();
        Some(tokio::spawn(
            async move {
                node.run_attempt(selection, request_id, entropy, player_indexes)
                    .await;
                drop(claim);
            }
            .instrument(span),
        ))
    }

    async fn run_attempt(
        &self,
        selection: GroupSelectionResult,
        request_id: RequestId,
        entropy: U256,
        player_indexes: Vec<usize>,
    ) {
        let services = &self.inner.services;
        let chain = &self.inner.config.chain;

        let channel_name = format!("{entropy:x}");
        let channel = match services.provider.channel_for(&channel_name).await {
            Ok(channel) => channel,
            Err(err) => {
                tracing::error!(request = %request_id, channel = %channel_name, "failed to open group channel: {err}");
                return;
            }
        };

        let validator = MembershipValidator::new(selection.selected_stakers);
        channel.set_filter(validator.filter());

        let mut runs = JoinSet::new();
        for player_index in player_indexes {
            let params = DkgParams {
                request_id,
                entry: entropy,
                player_index,
                group_size: chain.group_size,
                dishonest_threshold: chain.dishonest_threshold,
                membership_validator: validator.clone(),
                start_block_height: selection.selection_end_block,
                block_counter: services.block_counter.clone(),
                relay_chain: services.relay_chain.clone(),
                signing: services.signing.clone(),
                channel: channel.clone(),
            };
            let dkg = services.dkg.clone();

            tracing::info!(request = %request_id, player_index, "executing DKG");
            runs.spawn(
                async move { (player_index, dkg.execute_dkg(params).await) }
                    .instrument(Span::current()),
            );
        }

        while let Some(joined) = runs.join_next().await {
            match joined {
                Ok((player_index, Ok(signer))) => {
                    if let Err(err) = self.register_dkg_result(request_id, &validator, signer).await {
                        tracing::error!(request = %request_id, player_index, "failed to register group: {err:#}");
                    }
                }
                Ok((player_index, Err(err))) => {
                    tracing::error!(request = %request_id, player_index, "failed to execute DKG: {err:#}");
                }
                Err(err) => {
                    tracing::error!(request = %request_id, "DKG run aborted: {err}");
                }
            }
        }

        // The DKG channel serves this attempt only.
        services.provider.close_channel(&channel_name);
    }

    async fn register_dkg_result(
        &self,
        request_id: RequestId,
        validator: &MembershipValidator,
        signer: ThresholdSigner,
    ) -> Result<()> {
        let group_public_key = signer.group_public_key().clone();
        let channel = self
            .inner
            .services
            .provider
            .channel_for(&group_public_key.channel_name())
            .await
            .context("failed to open permanent group channel")?;
        channel.set_filter(validator.filter());

        tracing::info!(
            request = %request_id,
            group = %group_public_key,
            member = signer.member_index,
            "DKG completed"
        );

        match self.inner.config.registration {
            RegistrationMode::Immediate => {
                self.inner
                    .registry
                    .register_group(signer, channel, validator.clone())?
            }
            RegistrationMode::OnChainConfirmation => self.inner.registry.register_pending_group(
                request_id,
                signer,
                channel,
                validator.clone(),
            )?,
        }

        Ok(())
    }

    /// Relay the traffic of a group the node is not a member of.
    pub async fn forward_signature_shares(
        &self,
        group_public_key: &GroupPublicKey,
    ) -> Result<(), ChannelError> {
        self.inner
            .services
            .provider
            .broadcast_channel_forwarder_for(&group_public_key.channel_name())
            .instrument(self.inner.span.clone())
            .await
    }

    /// Rejoin signing of the relay entry in progress on-chain, if any.
    pub async fn resume_signing_if_eligible(&self) -> Result<()> {
        let relay_chain = &self.inner.services.relay_chain;

        if !relay_chain.is_entry_in_progress().await? {
            tracing::debug!(parent: &self.inner.span, "no relay entry in progress");
            return Ok(());
        }

        let previous_entry = relay_chain.current_request_previous_entry().await?;
        let start_block = relay_chain.current_request_start_block().await?;
        let group_public_key = relay_chain.current_request_group_public_key().await?;

        tracing::info!(
            parent: &self.inner.span,
            group = %group_public_key,
            start_block,
            "resuming relay entry signing"
        );

        self.generate_relay_entry(previous_entry, &group_public_key, start_block);
        Ok(())
    }

    /// Start signing the next relay entry with every local membership of the
    /// group. Returns the number of signing runs started.
    pub fn generate_relay_entry(
        &self,
        previous_entry: U256,
        group_public_key: &GroupPublicKey,
        start_block_height: u64,
    ) -> usize {
        let memberships = self.inner.registry.get_group(group_public_key);
        if memberships.is_empty() {
            tracing::debug!(parent: &self.inner.span, group = %group_public_key, "not a member of the group");
            return 0;
        }

        let services = &self.inner.services;
        for membership in &memberships {
            let request = EntrySigningRequest {
                previous_entry,
                group_public_key: group_public_key.clone(),
                start_block_height,
                signer: membership.signer.clone(),
                channel: membership.channel.clone(),
                group_index: membership.index,
                block_counter: services.block_counter.clone(),
                relay_chain: services.relay_chain.clone(),
            };
            let entry_signer = services.entry_signer.clone();
            let member = membership.signer.member_index;

            tokio::spawn(
                async move {
                    if let Err(err) = entry_signer.sign_and_submit(request).await {
                        tracing::error!(member, "failed to generate relay entry: {err:#}");
                    }
                }
                .instrument(self.inner.span.clone()),
            );
        }

        memberships.len()
    }

    /// Whether the node holds a membership in the group.
    pub fn is_in_group(&self, group_public_key: &GroupPublicKey) -> bool {
        self.inner.registry.is_in_group(group_public_key)
    }

    /// Register a membership directly. Only stakers admitted by
    /// `validator` are accepted on the group channel.
    pub fn register_group(
        &self,
        signer: ThresholdSigner,
        channel: BroadcastChannel,
        validator: MembershipValidator,
    ) -> Result<(), RegistryError> {
        channel.set_filter(validator.filter());
        self.inner.registry.register_group(signer, channel, validator)
    }

    /// Handle the on-chain registration of the group created for
    /// `request_id`. Returns the number of memberships it installed.
    pub fn on_group_registered(
        &self,
        request_id: RequestId,
        group_public_key: GroupPublicKey,
    ) -> Result<usize, RegistryError> {
        self.inner
            .registry
            .confirm_group(request_id, group_public_key)
    }

    /// Restore the group keys and memberships kept in the group storage.
    ///
    /// Group keys keep the indexes they had before the restart. Permanent
    /// channels are reopened with the admission filter of the stored
    /// selection.
    pub async fn load_existing_groups(&self) -> Result<usize> {
        let registry = &self.inner.registry;

        let keys = registry.storage().read_group_keys()?;
        registry.restore_group_keys(keys);

        let records = registry.storage().read_all()?;
        let count = records.len();

        for record in records {
            let channel = self
                .inner
                .services
                .provider
                .channel_for(&record.channel_name)
                .await
                .with_context(|| format!("failed to open channel {}", record.channel_name))?;

            let validator = MembershipValidator::new(record.selected_stakers);
            channel.set_filter(validator.filter());
            registry.restore(record.signer, channel, validator)?;
        }

        tracing::info!(parent: &self.inner.span, count, "loaded existing groups");
        Ok(count)
    }
}
