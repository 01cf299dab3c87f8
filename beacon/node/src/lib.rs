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

//! Random beacon node.
//!
//! The node follows on-chain group selections: it runs DKG for the groups
//! its staker is selected to, registers the resulting memberships and later
//! signs relay entries with them.

mod config;
mod dkg;
mod entry;
mod node;
mod registry;
mod storage;


pub use config::{NodeConfig, RegistrationMode};
pub use dkg::{DkgExecutor, DkgParams};
pub use entry::{EntrySigner, EntrySigningRequest};
pub use node::{Node, NodeServices};
pub use registry::{GroupRegistry, Membership, RegistryError};
pub use storage::{
    FsGroupStorage, GroupKeyRecord, GroupStorage, MemoryGroupStorage, MembershipRecord,
};
