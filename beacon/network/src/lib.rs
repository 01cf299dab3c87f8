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

//! Network layer of the random beacon node.
//!
//! Groups talk over named [`BroadcastChannel`]s opened through a
//! [`Provider`]. A node that is not a member of a group may still relay the
//! group's traffic by forwarding its topic.

mod channel;
mod envelope;
mod transport;
mod validator;

pub use channel::{
    BroadcastChannel, ChannelError, ChannelFilter, HandlerId, Message, Received, TaggedMessage,
};
pub use envelope::SecureEnvelope;
pub use transport::{MemoryTransport, TopicStream, Transport};
pub use validator::MembershipValidator;

use async_trait::async_trait;
use beacon_common::Signing;
use futures::StreamExt;
use parking_lot::Mutex;
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};
use tracing::Instrument;

/// Access to the broadcast network.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Open the channel `name`, or return the already opened one.
    async fn channel_for(&self, name: &str) -> Result<BroadcastChannel, ChannelError>;

    /// Relay traffic of channel `name` without taking part in it.
    /// Subsequent calls for the same name are no-ops.
    async fn broadcast_channel_forwarder_for(&self, name: &str) -> Result<(), ChannelError>;

    /// Forget the opened channel `name`. Its receive task stops once the
    /// last outstanding handle is dropped.
    fn close_channel(&self, name: &str);
}

/// [`Provider`] over a [`Transport`], signing with one node identity.
pub struct NetworkProvider {
    identity: Arc<dyn Signing>,
    transport: Arc<dyn Transport>,
    channels: Mutex<HashMap<String, BroadcastChannel>>,
    forwarded: Mutex<HashSet<String>>,
}

impl NetworkProvider {
    pub fn new(identity: Arc<dyn Signing>, transport: Arc<dyn Transport>) -> Self {
        Self {
            identity,
            transport,
            channels: Mutex::new(HashMap::new()),
            forwarded: Mutex::new(HashSet::new()),
        }
    }

    pub fn identity(&self) -> &Arc<dyn Signing> {
        &self.identity
    }

    /// Whether channel `name` is currently open.
    pub fn is_open(&self, name: &str) -> bool {
        self.channels.lock().contains_key(name)
    }

    /// Whether topic `name` is being forwarded.
    pub fn is_forwarding(&self, name: &str) -> bool {
        self.forwarded.lock().contains(name)
    }
}

#[async_trait]
impl Provider for NetworkProvider {
    async fn channel_for(&self, name: &str) -> Result<BroadcastChannel, ChannelError> {
        if let Some(channel) = self.channels.lock().get(name) {
            return Ok(channel.clone());
        }

        let channel =
            BroadcastChannel::join(name, self.identity.clone(), self.transport.clone()).await?;

        // Another caller may have opened the channel while we were joining.
        Ok(self
            .channels
            .lock()
            .entry(name.to_string())
            .or_insert(channel)
            .clone())
    }

    async fn broadcast_channel_forwarder_for(&self, name: &str) -> Result<(), ChannelError> {
        if !self.forwarded.lock().insert(name.to_string()) {
            return Ok(());
        }

        let mut stream = match self.transport.join(name).await {
            Ok(stream) => stream,
            Err(err) => {
                self.forwarded.lock().remove(name);
                return Err(ChannelError::Transport(err));
            }
        };

        tracing::debug!(channel = %name, "forwarding broadcast channel");

        let span = tracing::debug_span!("forwarder", channel = %name);
        tokio::spawn(
            async move {
                let mut relayed = 0u64;
                while stream.next().await.is_some() {
                    relayed += 1;
                }
                tracing::debug!(relayed, "forwarded topic closed");
            }
            .instrument(span),
        );

        Ok(())
    }

    fn close_channel(&self, name: &str) {
        if self.channels.lock().remove(name).is_some() {
            tracing::debug!(channel = %name, "broadcast channel closed");
        }
    }
}
