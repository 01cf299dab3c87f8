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

//! Group membership checks for incoming channel traffic.

use crate::ChannelFilter;
use beacon_common::{Address, PublicKey};
use std::{collections::HashSet, sync::Arc};

/// Answers whether a sender belongs to a selected group.
///
/// Built from the on-chain selection result, so membership is judged by
/// staker address. Position checks follow the selection order.
#[derive(Debug, Clone)]
pub struct MembershipValidator {
    selected: Arc<[Address]>,
    members: Arc<HashSet<Address>>,
}

impl MembershipValidator {
    pub fn new(selected_stakers: impl Into<Vec<Address>>) -> Self {
        let selected: Vec<Address> = selected_stakers.into();
        let members = selected.iter().copied().collect();

        Self {
            selected: selected.into(),
            members: Arc::new(members),
        }
    }

    /// Whether the key's address is among the selected stakers.
    pub fn is_in_group(&self, public_key: &PublicKey) -> bool {
        self.members.contains(&public_key.to_address())
    }

    /// Whether the key's address was selected at position `index`.
    pub fn is_selected_at_index(&self, index: usize, public_key: &PublicKey) -> bool {
        self.selected
            .get(index)
            .is_some_and(|selected| *selected == public_key.to_address())
    }

    pub fn selected_stakers(&self) -> &[Address] {
        &self.selected
    }

    /// Admission filter accepting only group members.
    pub fn filter(&self) -> ChannelFilter {
        let validator = self.clone();
        Arc::new(move |sender: &PublicKey| validator.is_in_group(sender))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_common::PrivateKey;

    #[test]
    fn membership_and_positions() {
        let a = PrivateKey::from([1; 32]).public_key();
        let b = PrivateKey::from([2; 32]).public_key();
        let outsider = PrivateKey::from([3; 32]).public_key();

        let validator = MembershipValidator::new(vec![a.to_address(), b.to_address(), a.to_address()]);

        assert!(validator.is_in_group(&a));
        assert!(validator.is_in_group(&b));
        assert!(!validator.is_in_group(&outsider));

        assert!(validator.is_selected_at_index(0, &a));
        assert!(validator.is_selected_at_index(2, &a));
        assert!(!validator.is_selected_at_index(1, &a));
        assert!(!validator.is_selected_at_index(3, &b));

        let filter = validator.filter();
        assert!(filter(&b));
        assert!(!filter(&outsider));
    }

    #[test]
    fn empty_selection_admits_nobody() {
        let validator = MembershipValidator::new(Vec::new());
        assert!(!validator.is_in_group(&PrivateKey::from([1; 32]).public_key()));
        assert!(validator.selected_stakers().is_empty());
    }
}
