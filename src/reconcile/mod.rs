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

/// Users phase: list, create, block, update (spec.md §4.4).
pub mod users;
/// Groups phase: list, create (parent-then-child), delete (spec.md §4.5).
pub mod groups;
/// Memberships and SSH-key reconciliation (spec.md §4.6).
pub mod memberships;

use std::fmt;
use std::future::Future;

use log::warn;

use crate::config::{Config, InstanceConfig};
use crate::errors::{AppError, ForgeError, ForgeErrorKind};
use crate::forge::ForgeApi;
use crate::model::directory::DirectorySnapshot;
use crate::model::forge::EntityId;
use crate::pacer;

/// Per-phase mutation counters, surfaced at the end of a run instead of the
/// raw mutation log (spec.md §7). Under dry-run these reflect *intended*
/// mutations, even though none were actually issued (spec.md §9 open
/// question (a) — preserved deliberately, not a bug).
#[derive(Debug, Clone, Default)]
pub struct Summary {
    pub users_created: u64,
    pub users_blocked: u64,
    pub users_updated: u64,
    pub groups_created: u64,
    pub groups_deleted: u64,
    pub memberships_added: u64,
    pub memberships_removed: u64,
    pub ssh_keys_added: u64,
    pub ssh_keys_removed: u64,
    pub errors_skipped: u64,
}

impl Summary {
    pub fn merge(&mut self, other: &Summary) {
        self.users_created += other.users_created;
        self.users_blocked += other.users_blocked;
        self.users_updated += other.users_updated;
        self.groups_created += other.groups_created;
        self.groups_deleted += other.groups_deleted;
        self.memberships_added += other.memberships_added;
        self.memberships_removed += other.memberships_removed;
        self.ssh_keys_added += other.ssh_keys_added;
        self.ssh_keys_removed += other.ssh_keys_removed;
        self.errors_skipped += other.errors_skipped;
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} users created, {} users disabled, {} users updated, \
             {} groups created, {} groups deleted, \
             {} memberships added, {} memberships removed, \
             {} ssh keys added, {} ssh keys removed, {} errors skipped",
            self.users_created,
            self.users_blocked,
            self.users_updated,
            self.groups_created,
            self.groups_deleted,
            self.memberships_added,
            self.memberships_removed,
            self.ssh_keys_added,
            self.ssh_keys_removed,
            self.errors_skipped,
        )
    }
}

/// Shared, read-only context for one forge instance's run.
pub struct ReconcileContext<'a> {
    pub config: &'a Config,
    pub instance: &'a InstanceConfig,
    pub directory: &'a DirectorySnapshot,
    pub dry_run: bool,
    pub continue_on_fail: bool,
}

/// Run all phases, in the ordering §5 requires: users, then groups, then
/// memberships and keys.
pub async fn reconcile_instance<C: ForgeApi>(
    ctx: &ReconcileContext<'_>,
    client: &C,
) -> Result<Summary, AppError> {
    let mut summary = Summary::default();

    let mut forge_users = users::reconcile_users(ctx, client, &mut summary).await?;
    let (forge_groups, group_member_plan) =
        groups::reconcile_groups(ctx, client, &mut summary).await?;
    memberships::reconcile_memberships(
        ctx,
        client,
        &forge_groups,
        &group_member_plan,
        &mut forge_users,
        &mut summary,
    )
    .await?;

    Ok(summary)
}

/// Run a mutating call that returns an id, gated by dry-run: under dry-run
/// the call is never issued and bookkeeping proceeds with a synthetic id
/// (spec.md §4.4).
pub(crate) async fn mutate_for_id<F, Fut>(
    dry_run: bool,
    synthetic_key: &str,
    call: F,
) -> Result<EntityId, ForgeError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<EntityId, ForgeError>>,
{
    if dry_run {
        warn!("Operation skipped due to dry run.");
        return Ok(EntityId::dry(synthetic_key));
    }
    let result = call().await;
    pacer::pace(dry_run).await;
    result
}

/// Run a mutating call with no meaningful return value, gated by dry-run.
pub(crate) async fn mutate<F, Fut>(dry_run: bool, call: F) -> Result<(), ForgeError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<(), ForgeError>>,
{
    if dry_run {
        warn!("Operation skipped due to dry run.");
        return Ok(());
    }
    let result = call().await;
    pacer::pace(dry_run).await;
    result
}

/// Decide the fate of a `ForgeError` per spec.md §7: `Fatal` always aborts
/// the instance; `Known` is always a non-fatal skip; `Transient` is a
/// non-fatal skip only when `continueOnFail` is set, otherwise fatal.
pub(crate) fn handle_forge_error(
    err: ForgeError,
    continue_on_fail: bool,
    context: &str,
    summary: &mut Summary,
) -> Result<(), AppError> {
    match err.kind {
        ForgeErrorKind::Fatal => Err(AppError::Forge(err)),
        ForgeErrorKind::Known => {
            warn!("{context}: {err}");
            summary.errors_skipped += 1;
            Ok(())
        }
        ForgeErrorKind::Transient => {
            if continue_on_fail {
                warn!("{context}: {err}");
                summary.errors_skipped += 1;
                Ok(())
            } else {
                Err(AppError::Forge(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use crate::collections::CiMap;
    use crate::config::{
        Config, Encryption, GitlabConfig, GitlabOptions, InstanceConfig, LdapConfig, LdapQueriesConfig,
        LdapServerConfig,
    };
    use crate::forge::dto::{
        CreateGroupRequest, CreateUserRequest, GroupMemberDto, UpdateUserRequest,
    };
    use crate::forge::ForgeApi;
    use crate::model::directory::{DirectoryGroup, DirectorySnapshot, DirectoryUser};
    use crate::model::forge::{EntityId, ForgeGroup, ForgeUser};
    use crate::errors::ForgeError;
    use crate::reconcile::{memberships, users, ReconcileContext, Summary};

    /// An in-memory stand-in for `ForgeClient`, recording every call it
    /// receives so tests can assert both outcome and ordering.
    #[derive(Default)]
    struct FakeForge {
        state: Mutex<FakeState>,
    }

    #[derive(Default)]
    struct FakeState {
        users: Vec<ForgeUser>,
        next_user_id: i64,
        groups: Vec<ForgeGroup>,
        group_members: std::collections::HashMap<i64, Vec<GroupMemberDto>>,
        calls: Vec<String>,
    }

    impl FakeForge {
        fn with_users(users: Vec<ForgeUser>) -> Self {
            let next_user_id = users.iter().filter_map(|u| u.id.as_real()).max().unwrap_or(0) + 1;
            Self {
                state: Mutex::new(FakeState {
                    users,
                    next_user_id,
                    ..Default::default()
                }),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.state.lock().unwrap().calls.clone()
        }
    }

    #[async_trait::async_trait]
    impl ForgeApi for FakeForge {
        async fn list_users(&self) -> Result<Vec<ForgeUser>, ForgeError> {
            Ok(self.state.lock().unwrap().users.clone())
        }

        async fn list_groups(&self) -> Result<Vec<ForgeGroup>, ForgeError> {
            Ok(self.state.lock().unwrap().groups.clone())
        }

        async fn list_group_members(&self, group_id: i64) -> Result<Vec<GroupMemberDto>, ForgeError> {
            Ok(self
                .state
                .lock()
                .unwrap()
                .group_members
                .get(&group_id)
                .cloned()
                .unwrap_or_default())
        }

        async fn create_user(&self, request: &CreateUserRequest) -> Result<EntityId, ForgeError> {
            let mut state = self.state.lock().unwrap();
            state.calls.push(format!("create_user:{}", request.username));
            let id = state.next_user_id;
            state.next_user_id += 1;
            state.users.push(ForgeUser {
                id: EntityId::Real(id),
                username: request.username.clone(),
                blocked: false,
                ssh_keys: Vec::new(),
            });
            Ok(EntityId::Real(id))
        }

        async fn update_user(&self, user_id: i64, _request: &UpdateUserRequest) -> Result<(), ForgeError> {
            self.state.lock().unwrap().calls.push(format!("update_user:{user_id}"));
            Ok(())
        }

        async fn block_user(&self, user_id: i64) -> Result<(), ForgeError> {
            self.state.lock().unwrap().calls.push(format!("block_user:{user_id}"));
            Ok(())
        }

        async fn reset_blocked_user_privileges(&self, user_id: i64) -> Result<(), ForgeError> {
            self.state.lock().unwrap().calls.push(format!("reset_blocked:{user_id}"));
            Ok(())
        }

        async fn unblock_user(&self, user_id: i64) -> Result<(), ForgeError> {
            self.state.lock().unwrap().calls.push(format!("unblock_user:{user_id}"));
            Ok(())
        }

        async fn create_group(&self, _request: &CreateGroupRequest) -> Result<EntityId, ForgeError> {
            unimplemented!("not exercised by the tests in this module")
        }

        async fn delete_group(&self, _group_id: i64) -> Result<(), ForgeError> {
            unimplemented!("not exercised by the tests in this module")
        }

        async fn add_member(&self, group_id: i64, user_id: i64, _access_level: i64) -> Result<(), ForgeError> {
            self.state
                .lock()
                .unwrap()
                .calls
                .push(format!("add_member:{group_id}:{user_id}"));
            Ok(())
        }

        async fn remove_member(&self, group_id: i64, user_id: i64) -> Result<(), ForgeError> {
            self.state
                .lock()
                .unwrap()
                .calls
                .push(format!("remove_member:{group_id}:{user_id}"));
            Ok(())
        }

        async fn add_ssh_key(&self, _user_id: i64, _title: &str, _key: &str) -> Result<EntityId, ForgeError> {
            Ok(EntityId::Real(0))
        }

        async fn remove_ssh_key(&self, _user_id: i64, _key_id: i64) -> Result<(), ForgeError> {
            Ok(())
        }
    }

    fn test_config() -> Config {
        Config {
            ldap: LdapConfig {
                debug: false,
                win_compatibility_mode: false,
                server: LdapServerConfig {
                    host: "ldap.example.com".to_string(),
                    port: 389,
                    version: 3,
                    encryption: Encryption::None,
                    bind_dn: None,
                    bind_password: None,
                },
                queries: LdapQueriesConfig {
                    base_dn: "dc=example,dc=com".to_string(),
                    user_dn: String::new(),
                    group_dn: String::new(),
                    user_filter: "(objectClass=person)".to_string(),
                    group_filter: "(objectClass=groupOfNames)".to_string(),
                    user_unique_attribute: "uid".to_string(),
                    user_match_attribute: "uid".to_string(),
                    user_name_attribute: "cn".to_string(),
                    user_email_attribute: "mail".to_string(),
                    user_ldap_admin_attribute: None,
                    user_ssh_key_attribute: None,
                    group_unique_attribute: "cn".to_string(),
                    group_member_attribute: "member".to_string(),
                },
            },
            gitlab: GitlabConfig {
                debug: false,
                options: GitlabOptions {
                    user_names_to_ignore: Vec::new(),
                    group_names_to_ignore: Vec::new(),
                    group_names_of_administrators: Vec::new(),
                    group_names_of_external: Vec::new(),
                    create_empty_groups: false,
                    delete_extra_groups: false,
                    new_member_access_level: 30,
                },
                instances: Default::default(),
            },
        }
    }

    fn test_instance() -> InstanceConfig {
        InstanceConfig {
            name: "primary".to_string(),
            url: "https://forge.example.com".to_string(),
            token: "secret".to_string(),
            ldap_server_name: "directory".to_string(),
        }
    }

    fn directory_user(username: &str) -> DirectoryUser {
        DirectoryUser {
            dn: format!("uid={username},ou=people,dc=example,dc=com"),
            username: username.to_string(),
            match_id: username.to_string(),
            full_name: username.to_string(),
            email: format!("{username}@example.com"),
            is_admin: false,
            is_external: false,
            ssh_keys: Vec::new(),
        }
    }

    #[tokio::test]
    async fn users_phase_creates_then_blocks_then_updates_in_order() {
        let config = test_config();
        let instance = test_instance();
        let mut directory = DirectorySnapshot::new();
        directory.users.insert("alice", directory_user("alice"));
        directory.users.insert("bob", directory_user("bob"));

        let forge = FakeForge::with_users(vec![
            ForgeUser {
                id: EntityId::Real(1),
                username: "bob".to_string(),
                blocked: false,
                ssh_keys: Vec::new(),
            },
            ForgeUser {
                id: EntityId::Real(2),
                username: "carol".to_string(),
                blocked: false,
                ssh_keys: Vec::new(),
            },
        ]);

        let ctx = ReconcileContext {
            config: &config,
            instance: &instance,
            directory: &directory,
            dry_run: false,
            continue_on_fail: false,
        };
        let mut summary = Summary::default();
        let found = users::reconcile_users(&ctx, &forge, &mut summary).await.expect("users phase");

        assert!(found.contains_key("alice"));
        assert_eq!(summary.users_created, 1);
        assert_eq!(summary.users_blocked, 1);
        assert_eq!(summary.users_updated, 1);

        let calls = forge.calls();
        let create_at = calls.iter().position(|c| c == "create_user:alice").expect("create logged");
        let block_at = calls.iter().position(|c| c == "block_user:2").expect("block logged");
        let update_at = calls.iter().position(|c| c == "update_user:1").expect("update logged");
        assert!(create_at < block_at, "create must precede block: {calls:?}");
        assert!(block_at < update_at, "block must precede update: {calls:?}");
    }

    #[tokio::test]
    async fn memberships_phase_computes_add_and_remove_sets() {
        let config = test_config();
        let instance = test_instance();
        let mut directory = DirectorySnapshot::new();
        directory.groups.insert(
            "eng",
            DirectoryGroup {
                name: "eng".to_string(),
                members: vec!["alice".to_string(), "carol".to_string()],
            },
        );

        let forge = FakeForge::default();
        forge.state.lock().unwrap().group_members.insert(
            10,
            vec![
                GroupMemberDto { id: 1, username: "alice".to_string() },
                GroupMemberDto { id: 2, username: "bob".to_string() },
            ],
        );

        let mut forge_groups: CiMap<ForgeGroup> = CiMap::new();
        forge_groups.insert(
            "eng",
            ForgeGroup {
                id: EntityId::Real(10),
                name: "eng".to_string(),
                path: "eng".to_string(),
                full_path: "eng".to_string(),
                parent_id: None,
                project_count: 0,
                subgroup_count: 0,
            },
        );
        let mut group_member_plan: CiMap<Vec<String>> = CiMap::new();
        group_member_plan.insert("eng", vec!["alice".to_string(), "carol".to_string()]);

        let mut forge_users: CiMap<ForgeUser> = CiMap::new();
        forge_users.insert(
            "alice",
            ForgeUser { id: EntityId::Real(1), username: "alice".to_string(), blocked: false, ssh_keys: Vec::new() },
        );
        forge_users.insert(
            "carol",
            ForgeUser { id: EntityId::Real(3), username: "carol".to_string(), blocked: false, ssh_keys: Vec::new() },
        );

        let ctx = ReconcileContext {
            config: &config,
            instance: &instance,
            directory: &directory,
            dry_run: false,
            continue_on_fail: false,
        };
        let mut summary = Summary::default();
        memberships::reconcile_memberships(
            &ctx,
            &forge,
            &forge_groups,
            &group_member_plan,
            &mut forge_users,
            &mut summary,
        )
        .await
        .expect("memberships phase");

        assert_eq!(summary.memberships_added, 1);
        assert_eq!(summary.memberships_removed, 1);
        let calls = forge.calls();
        assert!(calls.contains(&"add_member:10:3".to_string()));
        assert!(calls.contains(&"remove_member:10:2".to_string()));
        assert!(!calls.iter().any(|c| c.starts_with("add_member:10:1")));
    }
}
