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

//! Authenticated broadcast channel.
//!
//! Every outgoing message is tagged with its type, signed with the node's
//! identity and wrapped into a [`SecureEnvelope`]. Incoming envelopes pass
//! through a fixed pipeline before any handler sees them:
//!
//! 1. decode the envelope,
//! 2. verify the signature against the embedded sender key,
//! 3. apply the admission filter, if one is installed,
//! 4. decode the payload with the decoder registered for its type tag,
//! 5. invoke every handler registered for that type.
//!
//! A failure at any step drops the message. Drops are only logged locally
//! and the sender learns nothing about the reason.

use crate::{
    envelope::{SecureEnvelope, TaggedPayload},
    transport::{TopicStream, Transport},
};
use beacon_common::{PublicKey, Signing};
use futures::StreamExt;
use parity_scale_codec::{Decode, Encode};
use parking_lot::RwLock;
use std::{
    any::Any,
    collections::HashMap,
    fmt,
    sync::{
        Arc, Weak,
        atomic::{AtomicU64, Ordering},
    },
};
use tokio::sync::mpsc;
use tracing::Instrument;

/// Admission predicate over the authenticated sender key.
pub type ChannelFilter = Arc<dyn Fn(&PublicKey) -> bool + Send + Sync>;

type Handler = Arc<dyn Fn(Message) + Send + Sync>;
type DecodedPayload = Arc<dyn Any + Send + Sync>;
type Decoder =
    Box<dyn Fn(&[u8]) -> Result<DecodedPayload, parity_scale_codec::Error> + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("invalid signature")]
    InvalidSignature,
    #[error("malformed sender identity")]
    MalformedSender,
    #[error("sender {0} is not admitted to the channel")]
    NotAdmitted(PublicKey),
    #[error("no decoder registered for message type {0:?}")]
    UnknownMessageType(String),
    #[error("codec error: {0}")]
    Codec(#[from] parity_scale_codec::Error),
    #[error("failed to sign message: {0}")]
    Signing(anyhow::Error),
    #[error("transport error: {0}")]
    Transport(anyhow::Error),
}

/// Message with a stable type tag, carried over broadcast channels.
pub trait TaggedMessage: Encode + Decode + Send + Sync + 'static {
    /// Tag identifying the message type on the wire.
    const TYPE: &'static str;
}

/// Authenticated and decoded message handed to channel handlers.
#[derive(Clone)]
pub struct Message {
    sender: PublicKey,
    message_type: Arc<str>,
    payload: DecodedPayload,
}

impl Message {
    /// Key the message was signed with.
    pub fn sender(&self) -> PublicKey {
        self.sender
    }

    pub fn message_type(&self) -> &str {
        &self.message_type
    }

    /// Decoded payload, if it is of type `M`.
    pub fn payload<M: 'static>(&self) -> Option<&M> {
        self.payload.downcast_ref()
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("sender", &self.sender)
            .field("message_type", &self.message_type)
            .finish_non_exhaustive()
    }
}

/// Typed message delivered through [`BroadcastChannel::subscribe`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Received<M> {
    pub sender: PublicKey,
    pub message: M,
}

/// Handle of a registered handler, used to unregister it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

struct RegisteredHandler {
    id: HandlerId,
    message_type: String,
    handler: Handler,
}

struct Inner {
    name: String,
    identity: Arc<dyn Signing>,
    transport: Arc<dyn Transport>,
    filter: RwLock<Option<ChannelFilter>>,
    decoders: RwLock<HashMap<String, Decoder>>,
    handlers: RwLock<Vec<RegisteredHandler>>,
    next_handler_id: AtomicU64,
    span: tracing::Span,
}

/// Named broadcast channel shared by the members of one group.
///
/// Cloning yields another handle to the same channel. The receive task stops
/// once all handles are dropped and the next message arrives.
#[derive(Clone)]
pub struct BroadcastChannel {
    inner: Arc<Inner>,
}

impl fmt::Debug for BroadcastChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BroadcastChannel")
            .field("name", &self.inner.name)
            .finish_non_exhaustive()
    }
}

impl BroadcastChannel {
    /// Join topic `name` on the transport and start receiving.
    pub async fn join(
        name: impl Into<String>,
        identity: Arc<dyn Signing>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ChannelError> {
        let name = name.into();
        let stream = transport
            .join(&name)
            .await
            .map_err(ChannelError::Transport)?;

        let channel = Self::new(name, identity, transport);
        let span = channel.inner.span.clone();
        tokio::spawn(Self::receive_loop(Arc::downgrade(&channel.inner), stream).instrument(span));

        Ok(channel)
    }

    fn new(name: String, identity: Arc<dyn Signing>, transport: Arc<dyn Transport>) -> Self {
        let span = tracing::debug_span!("channel", %name);

        Self {
            inner: Arc::new(Inner {
                name,
                identity,
                transport,
                filter: RwLock::new(None),
                decoders: RwLock::new(HashMap::new()),
                handlers: RwLock::new(Vec::new()),
                next_handler_id: AtomicU64::new(0),
                span,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Install the admission filter, replacing the previous one.
    pub fn set_filter(&self, filter: ChannelFilter) {
        *self.inner.filter.write() = Some(filter);
    }

    /// Register the decoder for messages of type `M`. Repeated registration
    /// of the same type is a no-op.
    pub fn register_decoder<M: TaggedMessage>(&self) {
        self.inner
            .decoders
            .write()
            .entry(M::TYPE.to_string())
            .or_insert_with(|| {
                Box::new(|mut bytes: &[u8]| {
                    M::decode(&mut bytes).map(|message| Arc::new(message) as DecodedPayload)
                })
            });
    }

    /// Invoke `handler` for every admitted message of `message_type`.
    pub fn recv(
        &self,
        message_type: impl Into<String>,
        handler: impl Fn(Message) + Send + Sync + 'static,
    ) -> HandlerId {
        let id = HandlerId(self.inner.next_handler_id.fetch_add(1, Ordering::Relaxed));
        self.inner.handlers.write().push(RegisteredHandler {
            id,
            message_type: message_type.into(),
            handler: Arc::new(handler),
        });
        id
    }

    /// Remove a handler. Returns `false` if it was not registered.
    pub fn unregister(&self, id: HandlerId) -> bool {
        let mut handlers = self.inner.handlers.write();
        let before = handlers.len();
        handlers.retain(|registered| registered.id != id);
        handlers.len() != before
    }

    /// Register the decoder for `M` and stream all admitted messages of it.
    pub fn subscribe<M: TaggedMessage + Clone>(&self) -> mpsc::UnboundedReceiver<Received<M>> {
        self.register_decoder::<M>();

        let (sender, receiver) = mpsc::unbounded_channel();
        self.recv(M::TYPE, move |message| {
            if let Some(payload) = message.payload::<M>() {
                let _ = sender.send(Received {
                    sender: message.sender(),
                    message: payload.clone(),
                });
            }
        });

        receiver
    }

    /// Sign and publish `message` to all channel members.
    pub fn send<M: TaggedMessage>(&self, message: &M) -> Result<(), ChannelError> {
        let tagged = TaggedPayload {
            message_type: M::TYPE.to_string(),
            payload: message.encode(),
        };
        let envelope = SecureEnvelope::seal(self.inner.identity.as_ref(), tagged.encode())?;

        self.inner
            .transport
            .publish(&self.inner.name, envelope.encode())
            .map_err(ChannelError::Transport)
    }

    /// Run one raw transport message through the pipeline. Returns the number
    /// of handlers invoked.
    pub(crate) fn deliver(&self, raw: &[u8]) -> Result<usize, ChannelError> {
        let envelope = SecureEnvelope::decode(&mut &raw[..])?;
        let sender = envelope.verify()?;

        let filter = self.inner.filter.read().clone();
        if let Some(filter) = filter {
            if !filter(&sender) {
                return Err(ChannelError::NotAdmitted(sender));
            }
        }

        let tagged = TaggedPayload::decode(&mut envelope.message.as_slice())?;
        let payload = {
            let decoders = self.inner.decoders.read();
            let decoder = decoders
                .get(&tagged.message_type)
                .ok_or_else(|| ChannelError::UnknownMessageType(tagged.message_type.clone()))?;
            decoder(&tagged.payload)?
        };

        let handlers: Vec<Handler> = self
            .inner
            .handlers
            .read()
            .iter()
            .filter(|registered| registered.message_type == tagged.message_type)
            .map(|registered| registered.handler.clone())
            .collect();

        let message = Message {
            sender,
            message_type: tagged.message_type.into(),
            payload,
        };
        for handler in &handlers {
            handler(message.clone());
        }

        Ok(handlers.len())
    }

    async fn receive_loop(inner: Weak<Inner>, mut stream: TopicStream) {
        while let Some(raw) = stream.next().await {
            let Some(inner) = inner.upgrade() else {
                break;
            };

            if let Err(err) = (Self { inner }).deliver(&raw) {
                tracing::trace!("message dropped: {err}");
            }
        }

        tracing::debug!("channel receive loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MembershipValidator, MemoryTransport};
    use beacon_common::PrivateKey;
    use beacon_signer::Signer;
    use ntest::timeout;
    use std::time::Duration;
    use tokio::time;

    #[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
    struct Ping(u32);

    impl TaggedMessage for Ping {
        const TYPE: &'static str = "test/ping";
    }

    #[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
    struct Pong(String);

    impl TaggedMessage for Pong {
        const TYPE: &'static str = "test/pong";
    }

    fn identity(seed: u8) -> Arc<dyn Signing> {
        let signer = Signer::memory();
        let public_key = signer
            .storage_mut()
            .add_key(PrivateKey::from([seed; 32]))
            .unwrap();
        Arc::new(signer.identity(public_key).unwrap())
    }

    async fn channel(
        transport: &MemoryTransport,
        identity: Arc<dyn Signing>,
        name: &str,
    ) -> BroadcastChannel {
        BroadcastChannel::join(name, identity, Arc::new(transport.clone()))
            .await
            .unwrap()
    }

    #[tokio::test]
    #[timeout(10_000)]
    async fn members_receive_each_other() {
        let transport = MemoryTransport::new();
        let alice = identity(1);
        let bob = identity(2);

        let alice_channel = channel(&transport, alice.clone(), "group").await;
        let bob_channel = channel(&transport, bob.clone(), "group").await;

        let mut at_alice = alice_channel.subscribe::<Ping>();
        let mut at_bob = bob_channel.subscribe::<Ping>();

        bob_channel.send(&Ping(7)).unwrap();

        let received = at_alice.recv().await.unwrap();
        assert_eq!(received.sender, bob.public_key());
        assert_eq!(received.message, Ping(7));

        // Self delivery.
        let received = at_bob.recv().await.unwrap();
        assert_eq!(received.sender, bob.public_key());
    }

    #[tokio::test]
    #[timeout(10_000)]
    async fn filter_rejects_outsiders() {
        let transport = MemoryTransport::new();
        let member = identity(1);
        let outsider = identity(2);

        let member_channel = channel(&transport, member.clone(), "group").await;
        let outsider_channel = channel(&transport, outsider, "group").await;

        let validator = MembershipValidator::new(vec![member.public_key().to_address()]);
        member_channel.set_filter(validator.filter());
        let mut pings = member_channel.subscribe::<Ping>();

        outsider_channel.send(&Ping(1)).unwrap();
        member_channel.send(&Ping(2)).unwrap();

        let received = pings.recv().await.unwrap();
        assert_eq!(received.message, Ping(2));
        assert_eq!(received.sender, member.public_key());
        assert!(pings.try_recv().is_err());
    }

    #[test]
    fn pipeline_rejections() {
        let transport: Arc<dyn Transport> = Arc::new(MemoryTransport::new());
        let honest = identity(1);
        let adversary = identity(2);

        let channel = BroadcastChannel::new("group".into(), honest.clone(), transport);
        channel.register_decoder::<Ping>();
        channel.recv(Ping::TYPE, |_| {});

        let tagged = TaggedPayload {
            message_type: Ping::TYPE.into(),
            payload: Ping(1).encode(),
        };
        let envelope = SecureEnvelope::seal(honest.as_ref(), tagged.encode()).unwrap();
        assert_eq!(channel.deliver(&envelope.encode()).unwrap(), 1);

        // Payload altered after signing.
        let mut tampered = envelope.clone();
        tampered.message = TaggedPayload {
            message_type: Ping::TYPE.into(),
            payload: Ping(2).encode(),
        }
        .encode();
        assert!(matches!(
            channel.deliver(&tampered.encode()),
            Err(ChannelError::InvalidSignature)
        ));

        // Valid signature of another key over the same bytes.
        let mut forged = envelope.clone();
        forged.signature = adversary.sign(&forged.message).unwrap().as_ref().to_vec();
        assert!(matches!(
            channel.deliver(&forged.encode()),
            Err(ChannelError::InvalidSignature)
        ));

        assert!(matches!(
            channel.deliver(b"not an envelope"),
            Err(ChannelError::Codec(_))
        ));

        let unknown = TaggedPayload {
            message_type: Pong::TYPE.into(),
            payload: Pong("hi".into()).encode(),
        };
        let envelope = SecureEnvelope::seal(honest.as_ref(), unknown.encode()).unwrap();
        assert!(matches!(
            channel.deliver(&envelope.encode()),
            Err(ChannelError::UnknownMessageType(tag)) if tag == Pong::TYPE
        ));
    }

    #[test]
    fn handlers_by_type() {
        let transport: Arc<dyn Transport> = Arc::new(MemoryTransport::new());
        let identity = identity(1);
        let channel = BroadcastChannel::new("group".into(), identity.clone(), transport);
        channel.register_decoder::<Ping>();
        channel.register_decoder::<Pong>();

        let first = channel.recv(Ping::TYPE, |message| {
            assert_eq!(message.payload::<Ping>(), Some(&Ping(5)));
        });
        channel.recv(Ping::TYPE, |message| {
            assert!(message.payload::<Pong>().is_none());
        });
        channel.recv(Pong::TYPE, |_| {});

        let seal = |message_type: &str, payload: Vec<u8>| {
            let tagged = TaggedPayload {
                message_type: message_type.into(),
                payload,
            };
            SecureEnvelope::seal(identity.as_ref(), tagged.encode())
                .unwrap()
                .encode()
        };

        assert_eq!(channel.deliver(&seal(Ping::TYPE, Ping(5).encode())).unwrap(), 2);
        assert_eq!(
            channel.deliver(&seal(Pong::TYPE, Pong("x".into()).encode())).unwrap(),
            1
        );

        assert!(channel.unregister(first));
        assert!(!channel.unregister(first));
        assert_eq!(channel.deliver(&seal(Ping::TYPE, Ping(5).encode())).unwrap(), 1);

        // Undecodable payload of a known type.
        assert!(matches!(
            channel.deliver(&seal(Ping::TYPE, vec![1])),
            Err(ChannelError::Codec(_))
        ));
    }

    #[tokio::test]
    #[timeout(10_000)]
    async fn receive_loop_survives_garbage() {
        let transport = MemoryTransport::new();
        let identity = identity(1);
        let channel = channel(&transport, identity, "group").await;
        let mut pings = channel.subscribe::<Ping>();

        transport.publish("group", vec![0xde, 0xad]).unwrap();
        channel.send(&Ping(3)).unwrap();

        let received = time::timeout(Duration::from_secs(5), pings.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received.message, Ping(3));
    }
}
