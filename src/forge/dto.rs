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

//! Wire shapes for the forge's REST API. Kept separate from the in-memory
//! model (`crate::model::forge`) since the two evolve independently: these
//! mirror the API exactly, the model mirrors the reconciler's needs.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct UserDto {
    pub id: i64,
    pub username: String,
    pub blocked: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SshKeyDto {
    pub id: i64,
    pub key: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupDto {
    pub id: i64,
    pub name: String,
    pub path: String,
    pub full_path: String,
    pub parent_id: Option<i64>,
    #[serde(default)]
    pub projects: Vec<serde_json::Value>,
    #[serde(default)]
    pub subgroups_count: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GroupMemberDto {
    pub id: i64,
    pub username: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub email: String,
    pub password: String,
    pub username: String,
    pub name: String,
    pub extern_uid: String,
    pub provider: String,
    pub admin: bool,
    pub can_create_group: bool,
    pub external: bool,
    pub skip_confirmation: bool,
    pub reset_password: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub email: String,
    pub name: String,
    pub extern_uid: String,
    pub provider: String,
    pub admin: bool,
    pub can_create_group: bool,
    pub external: bool,
}

/// The fixed, partial attribute set a forge user is reset to when it is
/// blocked because it dropped out of the directory (spec.md §4.4 step 3).
/// Deliberately narrower than `UpdateUserRequest`: it must never touch
/// `email`/`name`/`externUid` since those are not being reset here.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockedUserUpdate {
    pub admin: bool,
    pub can_create_group: bool,
    pub external: bool,
}

impl Default for BlockedUserUpdate {
    fn default() -> Self {
        Self {
            admin: false,
            can_create_group: false,
            external: true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGroupRequest {
    pub name: String,
    pub path: String,
    pub visibility: String,
    pub parent_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddMemberRequest {
    pub user_id: i64,
    pub access_level: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AddSshKeyRequest {
    pub title: String,
    pub key: String,
}
