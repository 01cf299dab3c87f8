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

//! Wire envelope of channel messages.

use crate::ChannelError;
use beacon_common::{PublicKey, Signature, Signing, ToDigest};
use parity_scale_codec::{Decode, Encode};

/// Unit transmitted over the raw transport.
///
/// Valid only if `signature` verifies against the key in `sender_id` over
/// the exact `message` bytes.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct SecureEnvelope {
    pub message: Vec<u8>,
    pub sender_id: Vec<u8>,
    pub signature: Vec<u8>,
}

impl SecureEnvelope {
    /// Sign `message` with the local identity and wrap it.
    pub fn seal(identity: &dyn Signing, message: Vec<u8>) -> Result<Self, ChannelError> {
        let signature = identity.sign(&message).map_err(ChannelError::Signing)?;

        Ok(Self {
            message,
            sender_id: identity.public_key().to_bytes().to_vec(),
            signature: signature.as_ref().to_vec(),
        })
    }

    /// Check the signature and return the authenticated sender.
    pub fn verify(&self) -> Result<PublicKey, ChannelError> {
        let sender =
            PublicKey::from_slice(&self.sender_id).map_err(|_| ChannelError::MalformedSender)?;
        let signature = Signature::try_from(self.signature.as_slice())
            .map_err(|_| ChannelError::InvalidSignature)?;

        signature
            .verify(sender, self.message.to_digest())
            .map_err(|_| ChannelError::InvalidSignature)?;

        Ok(sender)
    }
}

/// Channel message before signing: the payload together with its type tag.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub(crate) struct TaggedPayload {
    pub message_type: String,
    pub payload: Vec<u8>,
}
