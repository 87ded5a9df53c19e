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

use log::warn;

use crate::collections::{contains_ci, CiMap};
use crate::errors::AppError;
use crate::forge::dto::{CreateUserRequest, UpdateUserRequest};
use crate::forge::ForgeApi;
use crate::model::forge::{EntityId, ForgeUser};
use crate::model::is_builtin_username;
use crate::reconcile::{handle_forge_error, memberships, mutate, mutate_for_id, ReconcileContext, Summary};

/// Run the users phase and return the final forge-side view of users, keyed
/// by username, for later phases to resolve membership ids against
/// (spec.md §4.4).
pub async fn reconcile_users<C: ForgeApi>(
    ctx: &ReconcileContext<'_>,
    client: &C,
    summary: &mut Summary,
) -> Result<CiMap<ForgeUser>, AppError> {
    let options = &ctx.config.gitlab.options;

    let mut found: CiMap<ForgeUser> = CiMap::new();
    let mut seen_ids: Vec<EntityId> = Vec::new();
    for user in client.list_users().await? {
        if is_builtin_username(&user.username) || contains_ci(&options.user_names_to_ignore, &user.username) {
            continue;
        }
        if found.contains_key(&user.username) || seen_ids.contains(&user.id) {
            warn!("skipping duplicate forge user `{}`", user.username);
            continue;
        }
        seen_ids.push(user.id.clone());
        found.insert(user.username.clone(), user);
    }

    let mut created_this_run: Vec<String> = Vec::new();

    // Create: directory users absent from `found`.
    for directory_user in ctx.directory.users.values() {
        if is_builtin_username(&directory_user.username) || found.contains_key(&directory_user.username) {
            continue;
        }
        let request = CreateUserRequest {
            email: directory_user.email.clone(),
            password: crate::password::generate_initial_password(),
            username: directory_user.username.clone(),
            name: directory_user.full_name.clone(),
            extern_uid: directory_user.dn.clone(),
            provider: ctx.instance.ldap_server_name.clone(),
            admin: directory_user.is_admin,
            can_create_group: directory_user.is_admin,
            external: directory_user.is_external,
            skip_confirmation: true,
            reset_password: false,
        };
        let result = mutate_for_id(ctx.dry_run, &directory_user.dn, move || async move {
            client.create_user(&request).await
        })
        .await;
        let id = match result {
            Ok(id) => id,
            Err(err) => {
                handle_forge_error(
                    err,
                    ctx.continue_on_fail,
                    &format!("create user `{}`", directory_user.username),
                    summary,
                )?;
                continue;
            }
        };
        summary.users_created += 1;
        let mut forge_user = ForgeUser {
            id,
            username: directory_user.username.clone(),
            blocked: false,
            ssh_keys: Vec::new(),
        };
        memberships::reconcile_ssh_keys(ctx, client, &mut forge_user, directory_user, summary).await?;
        found.insert(directory_user.username.clone(), forge_user);
        created_this_run.push(directory_user.username.clone());
    }

    // Block: forge users absent from the directory.
    let blocked_targets: Vec<String> = found
        .values()
        .filter(|u| !ctx.directory.users.contains_key(&u.username))
        .map(|u| u.username.clone())
        .collect();
    for username in blocked_targets {
        let Some(forge_user) = found.get(&username) else {
            continue;
        };
        let Some(real_id) = forge_user.id.as_real() else {
            continue;
        };
        let block_result = mutate(ctx.dry_run, move || async move { client.block_user(real_id).await }).await;
        if let Err(err) = block_result {
            handle_forge_error(err, ctx.continue_on_fail, &format!("block user `{username}`"), summary)?;
            continue;
        }
        let update_result = mutate(ctx.dry_run, move || async move {
            client.reset_blocked_user_privileges(real_id).await
        })
        .await;
        if let Err(err) = update_result {
            handle_forge_error(err, ctx.continue_on_fail, &format!("update blocked user `{username}`"), summary)?;
            continue;
        }
        if let Some(forge_user) = found.get_mut(&username) {
            forge_user.blocked = true;
        }
        summary.users_blocked += 1;
    }

    // Update: users present in both directory and forge.
    let update_targets: Vec<String> = ctx
        .directory
        .users
        .values()
        .filter(|d| found.contains_key(&d.username) && !contains_ci(&created_this_run, &d.username))
        .map(|d| d.username.clone())
        .collect();
    for username in update_targets {
        let directory_user = ctx.directory.users.get(&username).expect("present by filter above").clone();
        let was_blocked = found.get(&username).map(|u| u.blocked).unwrap_or(false);
        let real_id = found.get(&username).and_then(|u| u.id.as_real());

        if was_blocked {
            if let Some(real_id) = real_id {
                let unblock_result =
                    mutate(ctx.dry_run, move || async move { client.unblock_user(real_id).await }).await;
                if let Err(err) = unblock_result {
                    handle_forge_error(err, ctx.continue_on_fail, &format!("unblock user `{username}`"), summary)?;
                    continue;
                }
            }
        }

        let request = UpdateUserRequest {
            email: directory_user.email.clone(),
            name: directory_user.full_name.clone(),
            extern_uid: directory_user.dn.clone(),
            provider: ctx.instance.ldap_server_name.clone(),
            admin: directory_user.is_admin,
            can_create_group: directory_user.is_admin,
            external: directory_user.is_external,
        };
        let update_result = if let Some(real_id) = real_id {
            mutate(ctx.dry_run, move || async move {
                client.update_user(real_id, &request).await
            })
            .await
        } else {
            // Dry-run synthetic id from an earlier dry-run create: nothing to call.
            Ok(())
        };
        if let Err(err) = update_result {
            handle_forge_error(err, ctx.continue_on_fail, &format!("update user `{username}`"), summary)?;
            continue;
        }

        if let Some(forge_user) = found.get_mut(&username) {
            forge_user.blocked = false;
            memberships::reconcile_ssh_keys(ctx, client, forge_user, &directory_user, summary).await?;
        }
        summary.users_updated += 1;
    }

    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::forge::ForgeSshKey;

    #[test]
    fn builtin_and_ignored_usernames_are_excluded_from_found() {
        assert!(is_builtin_username("root"));
        assert!(!is_builtin_username("alice"));
    }

    #[test]
    fn forge_user_carries_no_keys_until_reconciled() {
        let user = ForgeUser {
            id: EntityId::Real(1),
            username: "alice".to_string(),
            blocked: false,
            ssh_keys: Vec::<ForgeSshKey>::new(),
        };
        assert!(user.ssh_keys.is_empty());
    }
}
