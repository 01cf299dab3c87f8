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

//! Registry of the groups this node is a member of.
//!
//! Besides the installed memberships the registry keeps:
//!
//! * `known_keys`: every group public key ever registered, in registration
//!   order. A key's position is the group index reported by memberships and
//!   never changes once assigned. New keys are persisted with their index so
//!   positions survive a restart.
//! * `seen`: the same keys as a set, for constant time dedup.
//! * `claimed`: requests with a membership attempt in flight.
//! * `parked`: memberships waiting until the chain confirms their group.
//!
//! All of it lives under one lock, which is never held across I/O or await
//! points.

use crate::storage::{GroupKeyRecord, GroupStorage, MembershipRecord};
use beacon_common::{GroupPublicKey, RequestId, ThresholdSigner};
use beacon_network::{BroadcastChannel, MembershipValidator};
use parking_lot::Mutex;
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("failed to persist membership in group {group}: {source}")]
    Persistence {
        group: GroupPublicKey,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed to persist group key {group}: {source}")]
    KeyPersistence {
        group: GroupPublicKey,
        #[source]
        source: anyhow::Error,
    },
}

/// Membership of the node in a registered group.
#[derive(Debug, Clone)]
pub struct Membership {
    pub signer: ThresholdSigner,
    pub channel: BroadcastChannel,
    /// Stakers admitted to the group's channel.
    pub validator: MembershipValidator,
    /// Position of the group public key in the registry.
    pub index: usize,
}

/// Membership waiting for on-chain confirmation of its group.
#[derive(Debug)]
struct PendingMembership {
    signer: ThresholdSigner,
    channel: BroadcastChannel,
    validator: MembershipValidator,
}

#[derive(Debug, Default)]
struct State {
    groups: HashMap<GroupPublicKey, Vec<Membership>>,
    seen: HashSet<GroupPublicKey>,
    known_keys: Vec<GroupPublicKey>,
    /// Keys appended to `known_keys` but not yet written to storage.
    unsaved_keys: Vec<GroupKeyRecord>,
    claimed: HashSet<RequestId>,
    parked: HashMap<RequestId, Vec<PendingMembership>>,
}

impl State {
    /// Index of the key, appending it if the key is new.
    fn resolve_index(&mut self, key: &GroupPublicKey) -> usize {
        if self.seen.contains(key) {
            if let Some(index) = self.known_index(key) {
                return index;
            }
        }

        let index = self.known_keys.len();
        self.seen.insert(key.clone());
        self.known_keys.push(key.clone());
        self.unsaved_keys.push(GroupKeyRecord {
            index: index as u32,
            group_public_key: key.clone(),
        });
        index
    }

    /// Recently registered keys are the most likely to be looked up, so the
    /// scan goes from the end.
    fn known_index(&self, key: &GroupPublicKey) -> Option<usize> {
        self.known_keys.iter().rposition(|known| known == key)
    }

    fn contains(&self, signer: &ThresholdSigner) -> bool {
        self.groups
            .get(signer.group_public_key())
            .is_some_and(|memberships| {
                memberships
                    .iter()
                    .any(|membership| membership.signer.member_index == signer.member_index)
            })
    }

    /// Install the membership unless one with the same member index is
    /// already there.
    fn install(&mut self, pending: PendingMembership) -> Option<Membership> {
        let PendingMembership {
            signer,
            channel,
            validator,
        } = pending;

        let index = self.resolve_index(signer.group_public_key());
        if self.contains(&signer) {
            return None;
        }

        let membership = Membership {
            signer,
            channel,
            validator,
            index,
        };
        self.groups
            .entry(membership.signer.group_public_key().clone())
            .or_default()
            .push(membership.clone());
        Some(membership)
    }
}

/// Group registry backed by a [`GroupStorage`].
pub struct GroupRegistry {
    state: Mutex<State>,
    storage: Arc<dyn GroupStorage>,
}

impl GroupRegistry {
    pub fn new(storage: Arc<dyn GroupStorage>) -> Self {
        Self {
            state: Mutex::new(State::default()),
            storage,
        }
    }

    pub fn storage(&self) -> &Arc<dyn GroupStorage> {
        &self.storage
    }

    /// Persist and install a membership.
    ///
    /// Registering a membership that is already installed is a no-op. Fails
    /// only if the membership cannot be persisted, in which case it is not
    /// installed either.
    pub fn register_group(
        &self,
        signer: ThresholdSigner,
        channel: BroadcastChannel,
        validator: MembershipValidator,
    ) -> Result<(), RegistryError> {
        if self.state.lock().contains(&signer) {
            return Ok(());
        }

        let pending = PendingMembership {
            signer,
            channel,
            validator,
        };
        self.persist(&pending.signer, &pending.channel, &pending.validator)?;

        if let Some(membership) = self.state.lock().install(pending) {
            tracing::debug!(
                group = %membership.signer.group_public_key(),
                member = membership.signer.member_index,
                index = membership.index,
                "membership registered"
            );
        }

        self.persist_group_keys()
    }

    /// Reinstate the group keys read back from storage, keeping their
    /// indexes. Must run before any membership is installed.
    pub(crate) fn restore_group_keys(&self, keys: Vec<GroupPublicKey>) {
        let mut state = self.state.lock();
        for key in keys {
            if state.seen.insert(key.clone()) {
                state.known_keys.push(key);
            }
        }
    }

    /// Install a previously persisted membership.
    pub(crate) fn restore(
        &self,
        signer: ThresholdSigner,
        channel: BroadcastChannel,
        validator: MembershipValidator,
    ) -> Result<(), RegistryError> {
        self.state.lock().install(PendingMembership {
            signer,
            channel,
            validator,
        });
        self.persist_group_keys()
    }

    /// Claim the membership attempt for `request_id`. Returns `false` if an
    /// attempt is already claimed or memberships are parked on the request.
    pub fn initialize_pending_group(&self, request_id: RequestId) -> bool {
        let mut state = self.state.lock();
        if state.parked.contains_key(&request_id) {
            return false;
        }

        state.claimed.insert(request_id)
    }

    /// Release the claim of `request_id`. Parked memberships stay parked.
    pub fn flush_pending_group(&self, request_id: RequestId) {
        self.state.lock().claimed.remove(&request_id);
    }

    /// Whether an attempt or parked memberships exist for `request_id`.
    pub fn is_pending(&self, request_id: RequestId) -> bool {
        let state = self.state.lock();
        state.claimed.contains(&request_id) || state.parked.contains_key(&request_id)
    }

    /// Number of memberships parked on `request_id`.
    pub fn parked(&self, request_id: RequestId) -> usize {
        self.state
            .lock()
            .parked
            .get(&request_id)
            .map_or(0, Vec::len)
    }

    /// Hand over the result of a DKG run awaiting on-chain confirmation.
    ///
    /// If the group was already confirmed the membership is installed
    /// right away, together with anything parked for the same group.
    /// Otherwise it is parked under `request_id`.
    pub fn register_pending_group(
        &self,
        request_id: RequestId,
        signer: ThresholdSigner,
        channel: BroadcastChannel,
        validator: MembershipValidator,
    ) -> Result<(), RegistryError> {
        let pending = PendingMembership {
            signer,
            channel,
            validator,
        };

        let installed = {
            let mut state = self.state.lock();

            if !state.seen.contains(pending.signer.group_public_key()) {
                state.parked.entry(request_id).or_default().push(pending);
                return Ok(());
            }

            let key = pending.signer.group_public_key().clone();
            let mut ready = vec![pending];
            if let Some(parked) = state.parked.remove(&request_id) {
                let (same_group, other): (Vec<_>, Vec<_>) = parked
                    .into_iter()
                    .partition(|pending| *pending.signer.group_public_key() == key);
                if !other.is_empty() {
                    state.parked.insert(request_id, other);
                }
                ready.extend(same_group);
            }

            Self::install_all(&mut state, ready)
        };

        self.persist_all(&installed)
    }

    /// Record the group confirmed on-chain for `request_id` and install the
    /// memberships parked on it. Returns the number of installed memberships.
    /// On persistence failure the memberships stay installed in memory.
    ///
    /// Parked memberships of a different group are discarded. The claim of a
    /// running attempt is left to the attempt itself.
    pub fn confirm_group(
        &self,
        request_id: RequestId,
        group_public_key: GroupPublicKey,
    ) -> Result<usize, RegistryError> {
        let installed = {
            let mut state = self.state.lock();
            let index = state.resolve_index(&group_public_key);
            let parked = state.parked.remove(&request_id).unwrap_or_default();

            let (ready, mismatched): (Vec<_>, Vec<_>) = parked
                .into_iter()
                .partition(|pending| *pending.signer.group_public_key() == group_public_key);

            for pending in mismatched {
                tracing::warn!(
                    request = %request_id,
                    confirmed = %group_public_key,
                    produced = %pending.signer.group_public_key(),
                    "discarding membership of unconfirmed group"
                );
            }

            tracing::debug!(request = %request_id, group = %group_public_key, index, "group confirmed");

            Self::install_all(&mut state, ready)
        };

        let count = installed.len();
        self.persist_all(&installed)?;
        Ok(count)
    }

    /// Memberships in the group. Empty if the node is not a member.
    pub fn get_group(&self, group_public_key: &GroupPublicKey) -> Vec<Membership> {
        self.state
            .lock()
            .groups
            .get(group_public_key)
            .cloned()
            .unwrap_or_default()
    }

    pub fn is_in_group(&self, group_public_key: &GroupPublicKey) -> bool {
        self.state
            .lock()
            .groups
            .get(group_public_key)
            .is_some_and(|memberships| !memberships.is_empty())
    }

    /// Position of the key among all registered group keys.
    pub fn group_index(&self, group_public_key: &GroupPublicKey) -> Option<usize> {
        self.state.lock().known_index(group_public_key)
    }

    /// All registered group keys, in registration order.
    pub fn group_public_keys(&self) -> Vec<GroupPublicKey> {
        self.state.lock().known_keys.clone()
    }

    fn install_all(state: &mut State, ready: Vec<PendingMembership>) -> Vec<Membership> {
        ready
            .into_iter()
            .filter_map(|pending| state.install(pending))
            .collect()
    }

    fn persist_all(&self, memberships: &[Membership]) -> Result<(), RegistryError> {
        for membership in memberships {
            self.persist(&membership.signer, &membership.channel, &membership.validator)?;
        }
        self.persist_group_keys()
    }

    fn persist(
        &self,
        signer: &ThresholdSigner,
        channel: &BroadcastChannel,
        validator: &MembershipValidator,
    ) -> Result<(), RegistryError> {
        let record = MembershipRecord {
            signer: signer.clone(),
            channel_name: channel.name().to_string(),
            selected_stakers: validator.selected_stakers().to_vec(),
        };

        self.storage
            .save(&record)
            .map_err(|source| RegistryError::Persistence {
                group: signer.group_public_key().clone(),
                source,
            })
    }

    /// Write out newly indexed keys. Keys that fail to persist are retried
    /// on the next call.
    fn persist_group_keys(&self) -> Result<(), RegistryError> {
        let unsaved = std::mem::take(&mut self.state.lock().unsaved_keys);

        let mut records = unsaved.into_iter();
        while let Some(record) = records.next() {
            if let Err(source) = self.storage.save_group_key(&record) {
                let group = record.group_public_key.clone();
                self.state
                    .lock()
                    .unsaved_keys
                    .extend(std::iter::once(record).chain(records));
                return Err(RegistryError::KeyPersistence { group, source });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        storage::MemoryGroupStorage,
        tests::{channel, threshold_signer},
    };
    use beacon_common::Address;
    use ntest::timeout;

    fn registry() -> GroupRegistry {
        GroupRegistry::new(Arc::new(MemoryGroupStorage::default()))
    }

    fn validator() -> MembershipValidator {
        MembershipValidator::new(vec![Address([1; 20]), Address([2; 20])])
    }

    #[tokio::test]
    #[timeout(10_000)]
    async fn claim_is_exclusive() {
        let registry = Arc::new(registry());
        let request_id = RequestId::from(1);

        let mut claims = tokio::task::JoinSet::new();
        for _ in 0..16 {
            let registry = registry.clone();
            claims.spawn(async move { registry.initialize_pending_group(request_id) });
        }

        let mut won = 0;
        while let Some(claimed) = claims.join_next().await {
            if claimed.unwrap() {
                won += 1;
            }
        }
        assert_eq!(won, 1);
        assert!(registry.is_pending(request_id));

        registry.flush_pending_group(request_id);
        assert!(!registry.is_pending(request_id));
        assert!(registry.initialize_pending_group(request_id));

        // Flushing an unclaimed request is a no-op.
        registry.flush_pending_group(RequestId::from(2));
        assert!(!registry.initialize_pending_group(request_id));
    }

    #[tokio::test]
    #[timeout(10_000)]
    async fn register_group_is_idempotent() {
        let registry = registry();
        let channel = channel("group").await;

        registry
            .register_group(threshold_signer(b"first", 0), channel.clone(), validator())
            .unwrap();
        registry
            .register_group(threshold_signer(b"second", 0), channel.clone(), validator())
            .unwrap();
        registry
            .register_group(threshold_signer(b"first", 0), channel.clone(), validator())
            .unwrap();
        registry
            .register_group(threshold_signer(b"first", 4), channel.clone(), validator())
            .unwrap();

        let first = GroupPublicKey::new(b"first");
        let second = GroupPublicKey::new(b"second");

        let memberships = registry.get_group(&first);
        assert_eq!(memberships.len(), 2);
        assert!(memberships.iter().all(|membership| membership.index == 0));
        assert_eq!(registry.get_group(&second)[0].index, 1);

        assert_eq!(registry.group_public_keys(), vec![first.clone(), second.clone()]);
        assert_eq!(registry.group_index(&first), Some(0));
        assert_eq!(registry.group_index(&second), Some(1));

        let records = registry.storage().read_all().unwrap();
        assert_eq!(records.len(), 3);
        assert!(records
            .iter()
            .all(|record| record.selected_stakers == validator().selected_stakers()));
        assert_eq!(
            registry.storage().read_group_keys().unwrap(),
            vec![first.clone(), second.clone()]
        );

        let unknown = GroupPublicKey::new(b"unknown");
        assert!(registry.get_group(&unknown).is_empty());
        assert!(!registry.is_in_group(&unknown));
        assert_eq!(registry.group_index(&unknown), None);
    }

    #[tokio::test]
    #[timeout(10_000)]
    async fn parked_memberships_wait_for_confirmation() {
        let registry = registry();
        let request_id = RequestId::from(1);
        let key = GroupPublicKey::new(b"group");
        let channel = channel("group").await;

        assert!(registry.initialize_pending_group(request_id));
        registry
            .register_pending_group(
                request_id,
                threshold_signer(b"group", 0),
                channel.clone(),
                validator(),
            )
            .unwrap();
        registry
            .register_pending_group(request_id, threshold_signer(b"group", 1), channel, validator())
            .unwrap();
        assert_eq!(registry.parked(request_id), 2);

        // Parked memberships keep the request busy after the attempt ends.
        registry.flush_pending_group(request_id);
        assert!(registry.is_pending(request_id));
        assert!(!registry.initialize_pending_group(request_id));
        assert!(!registry.is_in_group(&key));

        assert_eq!(registry.confirm_group(request_id, key.clone()).unwrap(), 2);
        assert!(!registry.is_pending(request_id));
        assert_eq!(registry.parked(request_id), 0);
        assert_eq!(registry.get_group(&key).len(), 2);
        assert_eq!(registry.storage().read_all().unwrap().len(), 2);
    }

    #[tokio::test]
    #[timeout(10_000)]
    async fn confirmation_keeps_running_claim() {
        let registry = registry();
        let request_id = RequestId::from(1);
        let key = GroupPublicKey::new(b"group");

        assert!(registry.initialize_pending_group(request_id));
        registry
            .register_pending_group(
                request_id,
                threshold_signer(b"group", 0),
                channel("group").await,
                validator(),
            )
            .unwrap();

        // The attempt is still running, so a redelivered request stays
        // rejected after its parked membership got installed.
        assert_eq!(registry.confirm_group(request_id, key.clone()).unwrap(), 1);
        assert!(registry.is_pending(request_id));
        assert!(!registry.initialize_pending_group(request_id));

        registry.flush_pending_group(request_id);
        assert!(!registry.is_pending(request_id));
        assert!(registry.initialize_pending_group(request_id));
    }

    #[tokio::test]
    #[timeout(10_000)]
    async fn late_result_of_confirmed_group() {
        let registry = registry();
        let request_id = RequestId::from(1);
        let channel = channel("group").await;

        registry
            .confirm_group(RequestId::from(0), GroupPublicKey::new(b"older"))
            .unwrap();

        assert!(registry.initialize_pending_group(request_id));
        let key = GroupPublicKey::new(b"group");
        assert_eq!(registry.confirm_group(request_id, key.clone()).unwrap(), 0);
        assert_eq!(registry.confirm_group(request_id, key.clone()).unwrap(), 0);

        registry
            .register_pending_group(request_id, threshold_signer(b"group", 2), channel, validator())
            .unwrap();

        let memberships = registry.get_group(&key);
        assert_eq!(memberships.len(), 1);
        assert_eq!(memberships[0].index, 1);
        assert_eq!(registry.group_public_keys().len(), 2);
        assert_eq!(registry.storage().read_group_keys().unwrap().len(), 2);

        registry.flush_pending_group(request_id);
        assert!(!registry.is_pending(request_id));
    }

    #[tokio::test]
    #[timeout(10_000)]
    async fn mismatched_group_is_discarded() {
        let registry = registry();
        let request_id = RequestId::from(1);
        let channel = channel("group").await;

        assert!(registry.initialize_pending_group(request_id));
        registry
            .register_pending_group(request_id, threshold_signer(b"forged", 0), channel, validator())
            .unwrap();

        let key = GroupPublicKey::new(b"group");
        assert_eq!(registry.confirm_group(request_id, key.clone()).unwrap(), 0);
        assert!(registry.is_pending(request_id));
        assert_eq!(registry.parked(request_id), 0);

        registry.flush_pending_group(request_id);
        assert!(!registry.is_pending(request_id));
        assert!(!registry.is_in_group(&key));
        assert!(!registry.is_in_group(&GroupPublicKey::new(b"forged")));
        assert_eq!(registry.group_public_keys(), vec![key]);
    }

    #[tokio::test]
    #[timeout(10_000)]
    async fn restored_keys_keep_their_indexes() {
        let registry = registry();
        let first = GroupPublicKey::new(b"zz");
        let second = GroupPublicKey::new(b"aa");

        registry.restore_group_keys(vec![first.clone(), second.clone()]);
        registry
            .restore(threshold_signer(b"aa", 0), channel("aa").await, validator())
            .unwrap();

        assert_eq!(registry.get_group(&second)[0].index, 1);
        assert_eq!(registry.group_index(&first), Some(0));

        // Restored keys are already in storage and are not written again.
        assert!(registry.storage().read_group_keys().unwrap().is_empty());

        registry
            .confirm_group(RequestId::from(3), GroupPublicKey::new(b"new"))
            .unwrap();
        assert_eq!(registry.group_index(&GroupPublicKey::new(b"new")), Some(2));
        assert_eq!(
            registry.storage().read_group_keys().unwrap(),
            vec![GroupPublicKey::new(b"new")]
        );
    }
}
