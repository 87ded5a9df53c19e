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

use log::{info, warn};

use crate::collections::{contains_ci, CiMap};
use crate::errors::AppError;
use crate::forge::dto::CreateGroupRequest;
use crate::forge::ForgeApi;
use crate::model::forge::ForgeGroup;
use crate::model::is_reserved_group_name;
use crate::reconcile::{handle_forge_error, mutate_for_id, ReconcileContext, Summary};
use crate::slug::{slugify_group_name, slugify_group_path};

/// Run the groups phase. Returns the final forge-side group map (keyed by
/// full path) and, alongside it, the plan of which directory usernames each
/// final group should contain once memberships are reconciled (spec.md §4.5).
pub async fn reconcile_groups<C: ForgeApi>(
    ctx: &ReconcileContext<'_>,
    client: &C,
    summary: &mut Summary,
) -> Result<(CiMap<ForgeGroup>, CiMap<Vec<String>>), AppError> {
    let options = &ctx.config.gitlab.options;

    let mut found: CiMap<ForgeGroup> = CiMap::new();
    for group in client.list_groups().await? {
        if is_reserved_group_name(&group.name) || contains_ci(&options.group_names_to_ignore, &group.name) {
            continue;
        }
        if found.contains_key(&group.full_path) {
            warn!("skipping duplicate forge group `{}`", group.full_path);
            continue;
        }
        found.insert(group.full_path.clone(), group);
    }

    let mut member_plan: CiMap<Vec<String>> = CiMap::new();
    let mut expected_full_paths: Vec<String> = Vec::new();

    for directory_group in ctx.directory.groups.values() {
        let (single_name, parent_id, parent_full_path) =
            match directory_group.split_parent_child() {
                Some((parent_name, child_name)) => {
                    let parent_full_path = slugify_group_path(parent_name);
                    let parent_id = if let Some(parent) = found.get(&parent_full_path) {
                        Some(parent.id.clone())
                    } else {
                        let slug_name = slugify_group_name(parent_name);
                        let slug_path = slugify_group_path(parent_name);
                        let request = CreateGroupRequest {
                            name: slug_name.clone(),
                            path: slug_path.clone(),
                            visibility: "private".to_string(),
                            parent_id: None,
                        };
                        let id = mutate_for_id(ctx.dry_run, &parent_full_path, move || async move {
                            client.create_group(&request).await
                        })
                        .await;
                        let id = match id {
                            Ok(id) => id,
                            Err(err) => {
                                handle_forge_error(
                                    err,
                                    ctx.continue_on_fail,
                                    &format!("create parent group `{parent_name}`"),
                                    summary,
                                )?;
                                continue;
                            }
                        };
                        summary.groups_created += 1;
                        found.insert(
                            parent_full_path.clone(),
                            ForgeGroup {
                                id: id.clone(),
                                name: slug_name,
                                path: slug_path.clone(),
                                full_path: slug_path,
                                parent_id: None,
                                project_count: 0,
                                subgroup_count: 0,
                            },
                        );
                        expected_full_paths.push(parent_full_path.clone());
                        if !member_plan.contains_key(&parent_full_path) {
                            member_plan.insert(parent_full_path.clone(), Vec::new());
                        }
                        Some(id)
                    };
                    (child_name, parent_id, Some(parent_full_path))
                }
                None => (directory_group.name.as_str(), None, None),
            };

        let slug_name = slugify_group_name(single_name);
        let slug_path = slugify_group_path(single_name);
        let full_path = match &parent_full_path {
            Some(parent) => format!("{parent}/{slug_path}"),
            None => slug_path.clone(),
        };

        if directory_group.is_empty() && !options.create_empty_groups {
            warn!("skipping empty directory group `{}`", directory_group.name);
            continue;
        }

        if !found.contains_key(&full_path) {
            let request = CreateGroupRequest {
                name: slug_name.clone(),
                path: slug_path.clone(),
                visibility: "private".to_string(),
                parent_id: parent_id.clone().and_then(|id| id.as_real()),
            };
            let id = mutate_for_id(ctx.dry_run, &full_path, move || async move {
                client.create_group(&request).await
            })
            .await;
            let id = match id {
                Ok(id) => id,
                Err(err) => {
                    handle_forge_error(
                        err,
                        ctx.continue_on_fail,
                        &format!("create group `{}`", directory_group.name),
                        summary,
                    )?;
                    continue;
                }
            };
            summary.groups_created += 1;
            found.insert(
                full_path.clone(),
                ForgeGroup {
                    id,
                    name: slug_name,
                    path: slug_path,
                    full_path: full_path.clone(),
                    parent_id,
                    project_count: 0,
                    subgroup_count: 0,
                },
            );
        }

        expected_full_paths.push(full_path.clone());
        member_plan.insert(full_path, directory_group.members.clone());
    }

    // Deletion: forge groups whose full path is no longer expected.
    let deletion_targets: Vec<String> = found
        .keys()
        .filter(|full_path| !contains_ci(&expected_full_paths, full_path))
        .map(|s| s.to_string())
        .collect();
    for full_path in deletion_targets {
        if !options.delete_extra_groups {
            info!("leaving extra forge group `{full_path}` (deleteExtraGroups=false)");
            continue;
        }
        let Some(group) = found.get(&full_path) else {
            continue;
        };
        if group.project_count > 0 || group.subgroup_count > 0 {
            warn!(
                "refusing to delete forge group `{full_path}`: has {} project(s) and {} subgroup(s)",
                group.project_count, group.subgroup_count
            );
            continue;
        }
        let Some(real_id) = group.id.as_real() else {
            continue;
        };
        let delete_result = crate::reconcile::mutate(ctx.dry_run, move || async move {
            client.delete_group(real_id).await
        })
        .await;
        if let Err(err) = delete_result {
            handle_forge_error(err, ctx.continue_on_fail, &format!("delete group `{full_path}`"), summary)?;
            continue;
        }
        found.remove(&full_path);
        summary.groups_deleted += 1;
    }

    Ok((found, member_plan))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_group_names_are_recognized() {
        assert!(is_reserved_group_name("root"));
        assert!(is_reserved_group_name("Users"));
        assert!(!is_reserved_group_name("devs"));
    }

    #[test]
    fn child_full_path_nests_under_slugified_parent() {
        let parent_path = slugify_group_path("Dev Team");
        let child_path = slugify_group_path("Backend");
        assert_eq!(format!("{parent_path}/{child_path}"), "dev-team/backend");
    }
}
