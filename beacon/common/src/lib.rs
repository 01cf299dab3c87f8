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

//! Random beacon common types and traits.
//!
//! The crate is shared by all beacon node components: it defines the
//! secp256k1 identity primitives, on-chain group types and the interfaces of
//! external collaborators (chain client, block counter, signing capability).

pub mod chain;
pub mod crypto;
#[cfg(feature = "mock")]
pub mod mock;
pub mod primitives;
pub mod utils;

pub use chain::{BlockCounter, LocalStaker, RelayChain, Signing, Staker};
pub use crypto::{Address, Digest, PrivateKey, PublicKey, Signature, ToDigest};
pub use primitives::{
    ChainConfig, GroupPublicKey, GroupSelectionResult, RequestId, SecretShare, ThresholdSigner,
};

pub use primitive_types::U256;
pub use sha3;
