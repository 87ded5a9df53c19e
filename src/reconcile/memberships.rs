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

use crate::collections::{contains_ci, CiMap};
use crate::errors::AppError;
use crate::forge::ForgeApi;
use crate::model::directory::DirectoryUser;
use crate::model::forge::{EntityId, ForgeGroup, ForgeSshKey, ForgeUser};
use crate::model::is_builtin_username;
use crate::reconcile::{handle_forge_error, mutate, ReconcileContext, Summary};

/// Reconcile one user's SSH keys against the directory (spec.md §4.6),
/// called immediately after creating or updating that user.
pub async fn reconcile_ssh_keys<C: ForgeApi>(
    ctx: &ReconcileContext<'_>,
    client: &C,
    forge_user: &mut ForgeUser,
    directory_user: &DirectoryUser,
    summary: &mut Summary,
) -> Result<(), AppError> {
    let Some(real_user_id) = forge_user.id.as_real() else {
        return Ok(());
    };

    let to_add: Vec<_> = directory_user
        .ssh_keys
        .iter()
        .filter(|dk| {
            !forge_user
                .ssh_keys
                .iter()
                .any(|fk| fk.md5_fingerprint.as_deref() == Some(dk.md5_fingerprint.as_str()))
        })
        .cloned()
        .collect();
    let to_remove: Vec<_> = forge_user
        .ssh_keys
        .iter()
        .filter(|fk| fk.is_rsa())
        .filter(|fk| {
            !directory_user
                .ssh_keys
                .iter()
                .any(|dk| Some(dk.md5_fingerprint.as_str()) == fk.md5_fingerprint.as_deref())
        })
        .cloned()
        .collect();

    for key in to_add {
        let title = format!("synced:{}", key.md5_fingerprint);
        let text = key.open_ssh_key_text.clone();
        let result = crate::reconcile::mutate_for_id(ctx.dry_run, &key.md5_fingerprint, move || async move {
            client.add_ssh_key(real_user_id, &title, &text).await
        })
        .await;
        match result {
            Ok(id) => {
                forge_user.ssh_keys.push(ForgeSshKey {
                    id,
                    open_ssh_key_text: key.open_ssh_key_text,
                    md5_fingerprint: Some(key.md5_fingerprint),
                });
                summary.ssh_keys_added += 1;
            }
            Err(err) => handle_forge_error(
                err,
                ctx.continue_on_fail,
                &format!("add ssh key for user `{}`", directory_user.username),
                summary,
            )?,
        }
    }

    for key in to_remove {
        let Some(real_key_id) = key.id.as_real() else {
            continue;
        };
        let fingerprint = key.md5_fingerprint.clone().unwrap_or_default();
        let result = mutate(ctx.dry_run, move || async move {
            client.remove_ssh_key(real_user_id, real_key_id).await
        })
        .await;
        match result {
            Ok(()) => {
                forge_user
                    .ssh_keys
                    .retain(|k| k.md5_fingerprint.as_deref() != Some(fingerprint.as_str()));
                summary.ssh_keys_removed += 1;
            }
            Err(err) => handle_forge_error(
                err,
                ctx.continue_on_fail,
                &format!("remove ssh key for user `{}`", directory_user.username),
                summary,
            )?,
        }
    }

    Ok(())
}

/// Reconcile group memberships for every final forge group (spec.md §4.6).
pub async fn reconcile_memberships<C: ForgeApi>(
    ctx: &ReconcileContext<'_>,
    client: &C,
    forge_groups: &CiMap<ForgeGroup>,
    group_member_plan: &CiMap<Vec<String>>,
    forge_users: &mut CiMap<ForgeUser>,
    summary: &mut Summary,
) -> Result<(), AppError> {
    let access_level = ctx.config.gitlab.options.new_member_access_level;

    let full_paths: Vec<String> = forge_groups.keys().map(|s| s.to_string()).collect();
    for full_path in full_paths {
        let Some(group) = forge_groups.get(&full_path) else {
            continue;
        };
        let target: Vec<String> = group_member_plan
            .get(&full_path)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|username| forge_users.contains_key(username))
            .collect();

        let existing: Vec<(String, i64)> = if group.id.is_dry() {
            Vec::new()
        } else {
            let Some(real_group_id) = group.id.as_real() else {
                continue;
            };
            client
                .list_group_members(real_group_id)
                .await?
                .into_iter()
                .filter(|m| !is_builtin_username(&m.username))
                .map(|m| (m.username, m.id))
                .collect()
        };
        let existing_usernames: Vec<String> = existing.iter().map(|(u, _)| u.clone()).collect();

        let to_add: Vec<String> = target
            .iter()
            .filter(|u| !contains_ci(&existing_usernames, u))
            .cloned()
            .collect();
        let to_remove: Vec<(String, i64)> = existing
            .into_iter()
            .filter(|(u, _)| !contains_ci(&target, u))
            .collect();

        let real_group_id = group.id.as_real().unwrap_or(0);

        for username in to_add {
            let Some(user) = forge_users.get(&username) else {
                continue;
            };
            let user_id = user.id.as_real().unwrap_or(0);
            let result = mutate(ctx.dry_run, move || async move {
                client.add_member(real_group_id, user_id, access_level).await
            })
            .await;
            match result {
                Ok(()) => summary.memberships_added += 1,
                Err(err) => handle_forge_error(
                    err,
                    ctx.continue_on_fail,
                    &format!("add `{username}` to group `{full_path}`"),
                    summary,
                )?,
            }
        }

        for (username, user_id) in to_remove {
            let result =
                mutate(ctx.dry_run, move || async move { client.remove_member(real_group_id, user_id).await })
                    .await;
            match result {
                Ok(()) => summary.memberships_removed += 1,
                Err(err) => handle_forge_error(
                    err,
                    ctx.continue_on_fail,
                    &format!("remove `{username}` from group `{full_path}`"),
                    summary,
                )?,
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::directory::DirectorySshKey;

    fn ssh_key(fingerprint: &str) -> DirectorySshKey {
        DirectorySshKey {
            open_ssh_key_text: format!("ssh-rsa AAAA {fingerprint}"),
            md5_fingerprint: fingerprint.to_string(),
        }
    }

    #[test]
    fn add_set_excludes_keys_already_present_by_fingerprint() {
        let directory_keys = vec![ssh_key("aa:bb"), ssh_key("cc:dd")];
        let forge_keys = vec![ForgeSshKey {
            id: EntityId::Real(1),
            open_ssh_key_text: "ssh-rsa AAAA aa:bb".to_string(),
            md5_fingerprint: Some("aa:bb".to_string()),
        }];
        let to_add: Vec<_> = directory_keys
            .iter()
            .filter(|dk| {
                !forge_keys
                    .iter()
                    .any(|fk| fk.md5_fingerprint.as_deref() == Some(dk.md5_fingerprint.as_str()))
            })
            .collect();
        assert_eq!(to_add.len(), 1);
        assert_eq!(to_add[0].md5_fingerprint, "cc:dd");
    }

    #[test]
    fn non_rsa_forge_keys_are_never_candidates_for_removal() {
        let key = ForgeSshKey {
            id: EntityId::Real(1),
            open_ssh_key_text: "ssh-ed25519 AAAA comment".to_string(),
            md5_fingerprint: None,
        };
        assert!(!key.is_rsa());
    }
}
