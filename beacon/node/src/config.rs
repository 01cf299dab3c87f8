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

//! Node configuration.

use crate::storage::{FsGroupStorage, GroupStorage, MemoryGroupStorage};
use anyhow::{Context as _, Result};
use beacon_common::ChainConfig;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

/// How memberships produced by successful DKG runs enter the registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RegistrationMode {
    /// Register a membership as soon as its DKG run succeeds.
    #[default]
    Immediate,
    /// Park memberships until the chain confirms the group of the request.
    OnChainConfirmation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct NodeConfig {
    #[serde(default)]
    pub registration: RegistrationMode,

    /// Directory of persisted memberships. Memberships are kept in memory
    /// only if unset.
    #[serde(default)]
    pub storage_path: Option<PathBuf>,

    /// Group parameters of the beacon contracts.
    pub chain: ChainConfig,
}

impl NodeConfig {
    pub fn new(chain: ChainConfig) -> Self {
        Self {
            registration: RegistrationMode::default(),
            storage_path: None,
            chain,
        }
    }

    pub fn with_registration(mut self, registration: RegistrationMode) -> Self {
        self.registration = registration;
        self
    }

    pub fn with_storage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage_path = Some(path.into());
        self
    }

    /// Read and validate a TOML config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;

        content
            .parse()
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        self.chain.validate().context("invalid chain config")
    }

    /// Storage of memberships selected by `storage_path`.
    pub fn group_storage(&self) -> Result<Arc<dyn GroupStorage>> {
        Ok(match &self.storage_path {
            Some(path) => Arc::new(FsGroupStorage::from_path(path.clone())?),
            None => Arc::new(MemoryGroupStorage::default()),
        })
    }
}

impl std::str::FromStr for NodeConfig {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}
