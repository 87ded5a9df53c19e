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

/// Request/response shapes for the forge's REST API.
pub mod dto;

use log::debug;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;

use crate::config::InstanceConfig;
use crate::errors::{ForgeError, ForgeErrorKind};
use crate::forge::dto::{
    AddMemberRequest, AddSshKeyRequest, BlockedUserUpdate, CreateGroupRequest, CreateUserRequest,
    GroupDto, GroupMemberDto, SshKeyDto, UpdateUserRequest, UserDto,
};
use crate::model::forge::{EntityId, ForgeGroup, ForgeSshKey, ForgeUser};

const PAGE_SIZE: u32 = 100;

/// The forge operations the reconciler phases depend on (spec.md §4.3-§4.6).
/// `ForgeClient` is the only production implementor; tests substitute an
/// in-memory fake so the diff-and-apply logic can run without a real forge.
#[async_trait::async_trait]
pub trait ForgeApi: Send + Sync {
    async fn list_users(&self) -> Result<Vec<ForgeUser>, ForgeError>;
    async fn list_groups(&self) -> Result<Vec<ForgeGroup>, ForgeError>;
    async fn list_group_members(&self, group_id: i64) -> Result<Vec<GroupMemberDto>, ForgeError>;
    async fn create_user(&self, request: &CreateUserRequest) -> Result<EntityId, ForgeError>;
    async fn update_user(&self, user_id: i64, request: &UpdateUserRequest) -> Result<(), ForgeError>;
    async fn block_user(&self, user_id: i64) -> Result<(), ForgeError>;
    async fn reset_blocked_user_privileges(&self, user_id: i64) -> Result<(), ForgeError>;
    async fn unblock_user(&self, user_id: i64) -> Result<(), ForgeError>;
    async fn create_group(&self, request: &CreateGroupRequest) -> Result<EntityId, ForgeError>;
    async fn delete_group(&self, group_id: i64) -> Result<(), ForgeError>;
    async fn add_member(&self, group_id: i64, user_id: i64, access_level: i64) -> Result<(), ForgeError>;
    async fn remove_member(&self, group_id: i64, user_id: i64) -> Result<(), ForgeError>;
    async fn add_ssh_key(&self, user_id: i64, title: &str, key: &str) -> Result<EntityId, ForgeError>;
    async fn remove_ssh_key(&self, user_id: i64, key_id: i64) -> Result<(), ForgeError>;
}

/// Thin, retry-free facade over the forge's HTTP API. One instance per
/// configured forge instance; holds no mutable state of its own (spec.md §4.3).
pub struct ForgeClient {
    http: Client,
    base_url: String,
}

impl ForgeClient {
    pub fn new(instance: &InstanceConfig) -> Result<Self, ForgeError> {
        let mut headers = reqwest::header::HeaderMap::new();
        let mut token = reqwest::header::HeaderValue::from_str(&instance.token)
            .map_err(|e| ForgeError::new(ForgeErrorKind::Fatal, e.to_string()))?;
        token.set_sensitive(true);
        headers.insert("PRIVATE-TOKEN", token);
        let http = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| ForgeError::new(ForgeErrorKind::Fatal, e.to_string()))?;
        Ok(Self {
            http,
            base_url: format!("{}/api/v4", instance.url.trim_end_matches('/')),
        })
    }

    async fn paginate<T: DeserializeOwned>(
        &self,
        path: &str,
        extra_query: &[(&str, &str)],
    ) -> Result<Vec<T>, ForgeError> {
        let mut out = Vec::new();
        let mut page = 1u32;
        loop {
            let mut query: Vec<(&str, String)> = vec![
                ("per_page", PAGE_SIZE.to_string()),
                ("page", page.to_string()),
            ];
            query.extend(extra_query.iter().map(|(k, v)| (*k, v.to_string())));
            let response = self
                .http
                .get(format!("{}{}", self.base_url, path))
                .query(&query)
                .send()
                .await
                .map_err(transport_error)?;
            let batch: Vec<T> = ensure_success(response).await?.json().await.map_err(|e| {
                ForgeError::new(ForgeErrorKind::Fatal, format!("malformed response body: {e}"))
            })?;
            if batch.is_empty() {
                break;
            }
            let fetched = batch.len();
            out.extend(batch);
            debug!("paginated {} page {}: {} entries", path, page, fetched);
            if fetched < PAGE_SIZE as usize {
                break;
            }
            page += 1;
        }
        Ok(out)
    }

    /// List every user, fetching SSH keys for each (spec.md §4.4 step 1).
    /// Dropping duplicates "by id or by username" is the caller's job (see
    /// `reconcile::users::reconcile_users`), since this is a plain listing
    /// with no ignore-list or builtin-username context of its own.
    pub async fn list_users(&self) -> Result<Vec<ForgeUser>, ForgeError> {
        let dtos: Vec<UserDto> = self.paginate("/users", &[]).await?;
        let mut users = Vec::with_capacity(dtos.len());
        for dto in dtos {
            let ssh_keys = self.list_ssh_keys(dto.id).await?;
            users.push(ForgeUser {
                id: EntityId::Real(dto.id),
                username: dto.username,
                blocked: dto.blocked,
                ssh_keys,
            });
        }
        Ok(users)
    }

    pub async fn list_ssh_keys(&self, user_id: i64) -> Result<Vec<ForgeSshKey>, ForgeError> {
        let dtos: Vec<SshKeyDto> = self
            .paginate(&format!("/users/{user_id}/keys"), &[])
            .await?;
        Ok(dtos
            .into_iter()
            .map(|dto| ForgeSshKey {
                id: EntityId::Real(dto.id),
                md5_fingerprint: crate::fingerprint::md5_fingerprint(&dto.key),
                open_ssh_key_text: dto.key,
            })
            .collect())
    }

    /// List every group, including those reachable via `all_available`
    /// (spec.md §4.5).
    pub async fn list_groups(&self) -> Result<Vec<ForgeGroup>, ForgeError> {
        let dtos: Vec<GroupDto> = self.paginate("/groups", &[("all_available", "true")]).await?;
        Ok(dtos
            .into_iter()
            .map(|dto| ForgeGroup {
                id: EntityId::Real(dto.id),
                name: dto.name,
                path: dto.path,
                full_path: dto.full_path,
                parent_id: dto.parent_id.map(EntityId::Real),
                project_count: dto.projects.len() as u64,
                subgroup_count: dto.subgroups_count.unwrap_or(0),
            })
            .collect())
    }

    pub async fn list_group_members(&self, group_id: i64) -> Result<Vec<GroupMemberDto>, ForgeError> {
        self.paginate(&format!("/groups/{group_id}/members"), &[])
            .await
    }

    pub async fn create_user(&self, request: &CreateUserRequest) -> Result<EntityId, ForgeError> {
        let response = self
            .http
            .post(format!("{}/users", self.base_url))
            .json(request)
            .send()
            .await
            .map_err(transport_error)?;
        if !response.status().is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ForgeError::classify_create_user_error(message));
        }
        let dto: UserDto = response
            .json()
            .await
            .map_err(|e| ForgeError::new(ForgeErrorKind::Fatal, format!("malformed response body: {e}")))?;
        Ok(EntityId::Real(dto.id))
    }

    pub async fn update_user(&self, user_id: i64, request: &UpdateUserRequest) -> Result<(), ForgeError> {
        let response = self
            .http
            .put(format!("{}/users/{}", self.base_url, user_id))
            .json(request)
            .send()
            .await
            .map_err(transport_error)?;
        ensure_success(response).await.map(|_| ())
    }

    pub async fn block_user(&self, user_id: i64) -> Result<(), ForgeError> {
        let response = self
            .http
            .post(format!("{}/users/{}/block", self.base_url, user_id))
            .send()
            .await
            .map_err(transport_error)?;
        ensure_success(response).await.map(|_| ())
    }

    /// Reset the privilege fields of a newly-blocked user, leaving
    /// identity fields (email, name, externUid, provider) untouched
    /// (spec.md §4.4 step 3).
    pub async fn reset_blocked_user_privileges(&self, user_id: i64) -> Result<(), ForgeError> {
        let response = self
            .http
            .put(format!("{}/users/{}", self.base_url, user_id))
            .json(&BlockedUserUpdate::default())
            .send()
            .await
            .map_err(transport_error)?;
        ensure_success(response).await.map(|_| ())
    }

    pub async fn unblock_user(&self, user_id: i64) -> Result<(), ForgeError> {
        let response = self
            .http
            .post(format!("{}/users/{}/unblock", self.base_url, user_id))
            .send()
            .await
            .map_err(transport_error)?;
        ensure_success(response).await.map(|_| ())
    }

    /// Not called by any reconciliation phase: users that drop out of the
    /// directory are blocked (spec.md §4.4 step 3), never deleted. Kept for
    /// symmetry with `delete_group` and because a real forge admin API
    /// exposes it.
    #[allow(dead_code)]
    pub async fn delete_user(&self, user_id: i64) -> Result<(), ForgeError> {
        let response = self
            .http
            .delete(format!("{}/users/{}", self.base_url, user_id))
            .send()
            .await
            .map_err(transport_error)?;
        ensure_success(response).await.map(|_| ())
    }

    pub async fn create_group(&self, request: &CreateGroupRequest) -> Result<EntityId, ForgeError> {
        let response = self
            .http
            .post(format!("{}/groups", self.base_url))
            .json(request)
            .send()
            .await
            .map_err(transport_error)?;
        let dto: GroupDto = ensure_success(response)
            .await?
            .json()
            .await
            .map_err(|e| ForgeError::new(ForgeErrorKind::Fatal, format!("malformed response body: {e}")))?;
        Ok(EntityId::Real(dto.id))
    }

    pub async fn delete_group(&self, group_id: i64) -> Result<(), ForgeError> {
        let response = self
            .http
            .delete(format!("{}/groups/{}", self.base_url, group_id))
            .send()
            .await
            .map_err(transport_error)?;
        ensure_success(response).await.map(|_| ())
    }

    pub async fn add_member(
        &self,
        group_id: i64,
        user_id: i64,
        access_level: i64,
    ) -> Result<(), ForgeError> {
        let request = AddMemberRequest {
            user_id,
            access_level,
        };
        let response = self
            .http
            .post(format!("{}/groups/{}/members", self.base_url, group_id))
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;
        ensure_success(response).await.map(|_| ())
    }

    pub async fn remove_member(&self, group_id: i64, user_id: i64) -> Result<(), ForgeError> {
        let response = self
            .http
            .delete(format!(
                "{}/groups/{}/members/{}",
                self.base_url, group_id, user_id
            ))
            .send()
            .await
            .map_err(transport_error)?;
        ensure_success(response).await.map(|_| ())
    }

    pub async fn add_ssh_key(&self, user_id: i64, title: &str, key: &str) -> Result<EntityId, ForgeError> {
        let request = AddSshKeyRequest {
            title: title.to_string(),
            key: key.to_string(),
        };
        let response = self
            .http
            .post(format!("{}/users/{}/keys", self.base_url, user_id))
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;
        let dto: SshKeyDto = ensure_success(response)
            .await?
            .json()
            .await
            .map_err(|e| ForgeError::new(ForgeErrorKind::Fatal, format!("malformed response body: {e}")))?;
        Ok(EntityId::Real(dto.id))
    }

    pub async fn remove_ssh_key(&self, user_id: i64, key_id: i64) -> Result<(), ForgeError> {
        let response = self
            .http
            .delete(format!("{}/users/{}/keys/{}", self.base_url, user_id, key_id))
            .send()
            .await
            .map_err(transport_error)?;
        ensure_success(response).await.map(|_| ())
    }
}

#[async_trait::async_trait]
impl ForgeApi for ForgeClient {
    async fn list_users(&self) -> Result<Vec<ForgeUser>, ForgeError> {
        ForgeClient::list_users(self).await
    }

    async fn list_groups(&self) -> Result<Vec<ForgeGroup>, ForgeError> {
        ForgeClient::list_groups(self).await
    }

    async fn list_group_members(&self, group_id: i64) -> Result<Vec<GroupMemberDto>, ForgeError> {
        ForgeClient::list_group_members(self, group_id).await
    }

    async fn create_user(&self, request: &CreateUserRequest) -> Result<EntityId, ForgeError> {
        ForgeClient::create_user(self, request).await
    }

    async fn update_user(&self, user_id: i64, request: &UpdateUserRequest) -> Result<(), ForgeError> {
        ForgeClient::update_user(self, user_id, request).await
    }

    async fn block_user(&self, user_id: i64) -> Result<(), ForgeError> {
        ForgeClient::block_user(self, user_id).await
    }

    async fn reset_blocked_user_privileges(&self, user_id: i64) -> Result<(), ForgeError> {
        ForgeClient::reset_blocked_user_privileges(self, user_id).await
    }

    async fn unblock_user(&self, user_id: i64) -> Result<(), ForgeError> {
        ForgeClient::unblock_user(self, user_id).await
    }

    async fn create_group(&self, request: &CreateGroupRequest) -> Result<EntityId, ForgeError> {
        ForgeClient::create_group(self, request).await
    }

    async fn delete_group(&self, group_id: i64) -> Result<(), ForgeError> {
        ForgeClient::delete_group(self, group_id).await
    }

    async fn add_member(&self, group_id: i64, user_id: i64, access_level: i64) -> Result<(), ForgeError> {
        ForgeClient::add_member(self, group_id, user_id, access_level).await
    }

    async fn remove_member(&self, group_id: i64, user_id: i64) -> Result<(), ForgeError> {
        ForgeClient::remove_member(self, group_id, user_id).await
    }

    async fn add_ssh_key(&self, user_id: i64, title: &str, key: &str) -> Result<EntityId, ForgeError> {
        ForgeClient::add_ssh_key(self, user_id, title, key).await
    }

    async fn remove_ssh_key(&self, user_id: i64, key_id: i64) -> Result<(), ForgeError> {
        ForgeClient::remove_ssh_key(self, user_id, key_id).await
    }
}

fn transport_error(err: reqwest::Error) -> ForgeError {
    ForgeError::new(ForgeErrorKind::Fatal, err.to_string())
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ForgeError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    let kind = if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        ForgeErrorKind::Fatal
    } else {
        ForgeErrorKind::Transient
    };
    Err(ForgeError::new(kind, format!("{status}: {message}")))
}
