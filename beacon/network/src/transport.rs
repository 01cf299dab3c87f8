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

//! Raw publish/subscribe transport beneath broadcast channels.

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::broadcast::{self, error::RecvError};

/// Stream of raw messages published to one topic.
pub type TopicStream = BoxStream<'static, Vec<u8>>;

/// Topic based broadcast medium. Delivers opaque bytes to every subscriber
/// of a topic, including the publisher itself.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Subscribe to `topic`.
    async fn join(&self, topic: &str) -> Result<TopicStream>;

    /// Publish `data` to all current subscribers of `topic`.
    fn publish(&self, topic: &str, data: Vec<u8>) -> Result<()>;
}

/// In-process transport. Every clone shares the same set of topics, so
/// several nodes built over clones of one transport see each other's
/// messages.
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    topics: Arc<Mutex<HashMap<String, broadcast::Sender<Vec<u8>>>>>,
    capacity: usize,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }
}

impl MemoryTransport {
    const DEFAULT_CAPACITY: usize = 1024;

    pub fn new() -> Self {
        Self::default()
    }

    /// Transport keeping up to `capacity` undelivered messages per
    /// subscriber. Slow subscribers lose the oldest ones.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            topics: Default::default(),
            capacity: capacity.max(1),
        }
    }

    fn sender(&self, topic: &str) -> broadcast::Sender<Vec<u8>> {
        self.topics
            .lock()
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn join(&self, topic: &str) -> Result<TopicStream> {
        let receiver = self.sender(topic).subscribe();
        let topic = topic.to_string();

        let stream = stream::unfold(receiver, move |mut receiver| {
            let topic = topic.clone();
            async move {
                loop {
                    match receiver.recv().await {
                        Ok(data) => return Some((data, receiver)),
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::warn!(%topic, skipped, "subscriber lagged behind");
                        }
                        Err(RecvError::Closed) => return None,
                    }
                }
            }
        });

        Ok(stream.boxed())
    }

    fn publish(&self, topic: &str, data: Vec<u8>) -> Result<()> {
        if self.sender(topic).send(data).is_err() {
            tracing::trace!(%topic, "no subscribers, message dropped");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ntest::timeout;

    #[tokio::test]
    #[timeout(10_000)]
    async fn subscribers_share_topic() {
        let transport = MemoryTransport::new();
        let mut first = transport.join("topic").await.unwrap();
        let mut second = transport.clone().join("topic").await.unwrap();
        let mut other = transport.join("other").await.unwrap();

        transport.publish("topic", vec![1, 2, 3]).unwrap();
        transport.publish("other", vec![4]).unwrap();

        assert_eq!(first.next().await.unwrap(), vec![1, 2, 3]);
        assert_eq!(second.next().await.unwrap(), vec![1, 2, 3]);
        assert_eq!(other.next().await.unwrap(), vec![4]);
    }

    #[tokio::test]
    #[timeout(10_000)]
    async fn publish_without_subscribers() {
        let transport = MemoryTransport::new();
        transport.publish("nobody", vec![0]).unwrap();

        let mut late = transport.join("nobody").await.unwrap();
        transport.publish("nobody", vec![1]).unwrap();
        assert_eq!(late.next().await.unwrap(), vec![1]);
    }

    #[tokio::test]
    #[timeout(10_000)]
    async fn lagging_subscriber_keeps_receiving() {
        let transport = MemoryTransport::with_capacity(2);
        let mut stream = transport.join("topic").await.unwrap();

        for i in 0..5u8 {
            transport.publish("topic", vec![i]).unwrap();
        }

        assert_eq!(stream.next().await.unwrap(), vec![3]);
        assert_eq!(stream.next().await.unwrap(), vec![4]);
    }
}
