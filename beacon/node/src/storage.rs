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

//! Persistent storage of group memberships.

use anyhow::{Context, Result};
use beacon_common::{Address, GroupPublicKey, ThresholdSigner};
use parity_scale_codec::{Decode, Encode};
use parking_lot::RwLock;
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::PathBuf,
};

/// Stored form of a membership: the threshold signer, the name of the
/// group's permanent channel and the stakers admitted to it.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct MembershipRecord {
    pub signer: ThresholdSigner,
    pub channel_name: String,
    pub selected_stakers: Vec<Address>,
}

impl MembershipRecord {
    pub fn group_public_key(&self) -> &GroupPublicKey {
        self.signer.group_public_key()
    }

    fn same_membership(&self, other: &Self) -> bool {
        self.signer.member_index == other.signer.member_index
            && self.group_public_key() == other.group_public_key()
    }
}

/// Registered group key together with its position in the registry.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct GroupKeyRecord {
    pub index: u32,
    pub group_public_key: GroupPublicKey,
}

/// Storage of the memberships a node holds and of all group keys it has
/// registered.
///
/// Saving the same membership twice overwrites the first record.
pub trait GroupStorage: Send + Sync {
    fn save(&self, record: &MembershipRecord) -> Result<()>;

    /// All stored records, in a stable order.
    fn read_all(&self) -> Result<Vec<MembershipRecord>>;

    fn save_group_key(&self, record: &GroupKeyRecord) -> Result<()>;

    /// Stored group keys ordered by index. A key is listed once, at its
    /// lowest stored index.
    fn read_group_keys(&self) -> Result<Vec<GroupPublicKey>>;
}

fn ordered_group_keys(mut records: Vec<GroupKeyRecord>) -> Vec<GroupPublicKey> {
    records.sort_by_key(|record| record.index);

    let mut keys: Vec<GroupPublicKey> = Vec::with_capacity(records.len());
    for record in records {
        if !keys.contains(&record.group_public_key) {
            keys.push(record.group_public_key);
        }
    }
    keys
}

/// In-memory group storage, records are kept in insertion order.
#[derive(Debug, Default)]
pub struct MemoryGroupStorage {
    records: RwLock<Vec<MembershipRecord>>,
    group_keys: RwLock<Vec<GroupKeyRecord>>,
}

impl GroupStorage for MemoryGroupStorage {
    fn save(&self, record: &MembershipRecord) -> Result<()> {
        let mut records = self.records.write();
        match records.iter_mut().find(|stored| stored.same_membership(record)) {
            Some(stored) => *stored = record.clone(),
            None => records.push(record.clone()),
        }
        Ok(())
    }

    fn read_all(&self) -> Result<Vec<MembershipRecord>> {
        Ok(self.records.read().clone())
    }

    fn save_group_key(&self, record: &GroupKeyRecord) -> Result<()> {
        self.group_keys.write().push(record.clone());
        Ok(())
    }

    fn read_group_keys(&self) -> Result<Vec<GroupPublicKey>> {
        Ok(ordered_group_keys(self.group_keys.read().clone()))
    }
}

/// Group storage in a directory:
///
/// * `memberships/<group-public-key-hex>-<member-index>`: one scale-encoded
///   [`MembershipRecord`] per file, read back in file name order;
/// * `group-keys`: append-only log of scale-encoded [`GroupKeyRecord`]s.
#[derive(Debug, Clone)]
pub struct FsGroupStorage {
    path: PathBuf,
}

impl FsGroupStorage {
    const MEMBERSHIPS_DIR: &'static str = "memberships";
    const GROUP_KEYS_FILE: &'static str = "group-keys";

    pub fn from_path(path: PathBuf) -> Result<Self> {
        let memberships = path.join(Self::MEMBERSHIPS_DIR);
        fs::create_dir_all(&memberships).with_context(|| {
            format!("failed to create group storage dir {}", memberships.display())
        })?;
        Ok(Self { path })
    }

    fn memberships_path(&self) -> PathBuf {
        self.path.join(Self::MEMBERSHIPS_DIR)
    }

    fn record_path(&self, record: &MembershipRecord) -> PathBuf {
        self.memberships_path().join(format!(
            "{}-{}",
            record.group_public_key().to_hex(),
            record.signer.member_index
        ))
    }
}

impl GroupStorage for FsGroupStorage {
    fn save(&self, record: &MembershipRecord) -> Result<()> {
        let path = self.record_path(record);
        let tmp = path.with_extension("tmp");

        fs::write(&tmp, record.encode())
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &path).with_context(|| format!("failed to write {}", path.display()))
    }

    fn read_all(&self) -> Result<Vec<MembershipRecord>> {
        let mut paths = vec![];
        for entry in fs::read_dir(self.memberships_path())? {
            let path = entry?.path();
            if path.is_file() && path.extension().is_none() {
                paths.push(path);
            }
        }
        paths.sort();

        paths
            .into_iter()
            .map(|path| {
                let bytes = fs::read(&path)?;
                MembershipRecord::decode(&mut bytes.as_slice())
                    .with_context(|| format!("corrupted membership record {}", path.display()))
            })
            .collect()
    }

    fn save_group_key(&self, record: &GroupKeyRecord) -> Result<()> {
        let path = self.path.join(Self::GROUP_KEYS_FILE);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("failed to open {}", path.display()))?;

        file.write_all(&record.encode())
            .and_then(|()| file.sync_data())
            .with_context(|| format!("failed to write {}", path.display()))
    }

    fn read_group_keys(&self) -> Result<Vec<GroupPublicKey>> {
        let path = self.path.join(Self::GROUP_KEYS_FILE);
        if !path.exists() {
            return Ok(vec![]);
        }

        let bytes = fs::read(&path)?;
        let mut input = bytes.as_slice();
        let mut records = vec![];
        while !input.is_empty() {
            let record = GroupKeyRecord::decode(&mut input)
                .with_context(|| format!("corrupted group key log {}", path.display()))?;
            records.push(record);
        }

        Ok(ordered_group_keys(records))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_common::SecretShare;

    fn record(key: &[u8], member_index: u32, share: u8) -> MembershipRecord {
        let group_public_key = GroupPublicKey::new(key);
        MembershipRecord {
            channel_name: group_public_key.channel_name(),
            signer: ThresholdSigner {
                member_index,
                group_public_key,
                group_private_key_share: SecretShare::from(vec![share; 4]),
            },
            selected_stakers: vec![Address([share; 20])],
        }
    }

    fn key_record(index: u32, key: &[u8]) -> GroupKeyRecord {
        GroupKeyRecord {
            index,
            group_public_key: GroupPublicKey::new(key),
        }
    }

    fn check_storage(storage: &dyn GroupStorage) {
        assert!(storage.read_all().unwrap().is_empty());

        let first = record(&[0xaa, 0x01], 0, 1);
        let second = record(&[0xbb, 0x02], 2, 2);
        storage.save(&first).unwrap();
        storage.save(&second).unwrap();

        let records = storage.read_all().unwrap();
        assert_eq!(records, vec![first.clone(), second.clone()]);

        // Same membership replaces the stored one.
        let updated = record(&[0xaa, 0x01], 0, 9);
        storage.save(&updated).unwrap();
        let records = storage.read_all().unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.contains(&updated));
        assert!(!records.contains(&first));
    }

    fn check_group_keys(storage: &dyn GroupStorage) {
        assert!(storage.read_group_keys().unwrap().is_empty());

        // Registration order differs from the byte order of the keys.
        storage.save_group_key(&key_record(1, &[0xaa])).unwrap();
        storage.save_group_key(&key_record(0, &[0xbb])).unwrap();
        storage.save_group_key(&key_record(2, &[0x01])).unwrap();
        storage.save_group_key(&key_record(3, &[0xbb])).unwrap();

        assert_eq!(
            storage.read_group_keys().unwrap(),
            vec![
                GroupPublicKey::new([0xbb]),
                GroupPublicKey::new([0xaa]),
                GroupPublicKey::new([0x01]),
            ]
        );
    }

    #[test]
    fn memory_storage() {
        let storage = MemoryGroupStorage::default();
        check_storage(&storage);
        check_group_keys(&storage);
    }

    #[test]
    fn fs_storage() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsGroupStorage::from_path(dir.path().join("groups")).unwrap();
        check_storage(&storage);
        check_group_keys(&storage);

        let file = dir.path().join("groups/memberships/aa01-0");
        assert!(file.is_file());

        // Reopened storage sees the same records.
        let reopened = FsGroupStorage::from_path(dir.path().join("groups")).unwrap();
        assert_eq!(reopened.read_all().unwrap().len(), 2);
        assert_eq!(reopened.read_group_keys().unwrap().len(), 3);
    }

    #[test]
    fn fs_storage_rejects_corrupted_record() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsGroupStorage::from_path(dir.path().to_path_buf()).unwrap();
        storage.save(&record(&[0x01], 1, 1)).unwrap();
        fs::write(dir.path().join("memberships/01-1"), [0xff]).unwrap();
        assert!(storage.read_all().is_err());

        storage.save_group_key(&key_record(0, &[0x01])).unwrap();
        let mut file = OpenOptions::new()
            .append(true)
            .open(dir.path().join("group-keys"))
            .unwrap();
        file.write_all(&[0x01]).unwrap();
        assert!(storage.read_group_keys().is_err());
    }
}
