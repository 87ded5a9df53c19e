// forge-ldap-sync, an identity reconciliation tool for self-hosted code forges.
// Copyright (C) 2026  Forge Identity Team
//
// This program is free software; you can redistribute it and/or
// modify it under the terms of the GNU General Public License
// as published by the Free Software Foundation; either version 2
// of the License, or (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program; if not, write to the Free Software
// Foundation, Inc., 51 Franklin Street, Fifth Floor, Boston, MA  02110-1301, USA.

use std::fmt;

/// An id for a forge entity. Under dry-run, mutating calls are skipped but
/// bookkeeping proceeds as if they had succeeded, substituting a synthetic
/// `dry:<key>` id for the real one (spec.md §4.4).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EntityId {
    Real(i64),
    Dry(String),
}

impl EntityId {
    pub fn dry(key: impl Into<String>) -> Self {
        EntityId::Dry(format!("dry:{}", key.into()))
    }

    pub fn as_real(&self) -> Option<i64> {
        match self {
            EntityId::Real(id) => Some(*id),
            EntityId::Dry(_) => None,
        }
    }

    pub fn is_dry(&self) -> bool {
        matches!(self, EntityId::Dry(_))
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Real(id) => write!(f, "{id}"),
            EntityId::Dry(key) => write!(f, "{key}"),
        }
    }
}

/// An SSH key as the forge reports it. Non-`ssh-rsa` keys are tracked here
/// too (so they are never mistakenly removed) but ignored by reconciliation
/// (spec.md §4.6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForgeSshKey {
    pub id: EntityId,
    pub open_ssh_key_text: String,
    pub md5_fingerprint: Option<String>,
}

impl ForgeSshKey {
    pub fn is_rsa(&self) -> bool {
        self.open_ssh_key_text.starts_with("ssh-rsa ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForgeUser {
    pub id: EntityId,
    pub username: String,
    pub blocked: bool,
    pub ssh_keys: Vec<ForgeSshKey>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForgeGroup {
    pub id: EntityId,
    pub name: String,
    pub path: String,
    pub full_path: String,
    pub parent_id: Option<EntityId>,
    pub project_count: u64,
    pub subgroup_count: u64,
}
