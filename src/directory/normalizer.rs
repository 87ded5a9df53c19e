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
use crate::config::{GitlabOptions, LdapQueriesConfig};
use crate::directory::RawEntry;
use crate::fingerprint::md5_fingerprint;
use crate::model::directory::{DirectoryGroup, DirectorySnapshot, DirectorySshKey, DirectoryUser};
use crate::slug::slugify_username;

/// Turn the two raw LDAP result sets into the canonical snapshot the
/// reconciler consumes (spec.md §4.2).
pub fn normalize(
    raw_users: &[RawEntry],
    raw_groups: &[RawEntry],
    queries: &LdapQueriesConfig,
    options: &GitlabOptions,
) -> DirectorySnapshot {
    let mut users = normalize_users(raw_users, queries, options);
    let groups = normalize_groups(raw_groups, queries, options, &mut users);
    DirectorySnapshot { users, groups }
}

fn first_trimmed(attrs: &RawEntry, name: &str) -> Option<String> {
    let value = attrs.attrs.get(name)?.first()?.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn normalize_users(
    raw_users: &[RawEntry],
    queries: &LdapQueriesConfig,
    options: &GitlabOptions,
) -> CiMap<DirectoryUser> {
    let mut users: CiMap<DirectoryUser> = CiMap::new();

    for entry in raw_users {
        if entry.dn.trim().is_empty() {
            warn!("skipping directory user with empty dn");
            continue;
        }

        let Some(raw_unique) = first_trimmed(entry, &queries.user_unique_attribute) else {
            warn!(
                "skipping directory user '{}': missing `{}`",
                entry.dn, queries.user_unique_attribute
            );
            continue;
        };
        let username = slugify_username(&raw_unique);
        if username != raw_unique {
            warn!(
                "directory user '{}' unique attribute `{}` slugified to `{}`",
                entry.dn, raw_unique, username
            );
        }

        let Some(match_id) = first_trimmed(entry, &queries.user_match_attribute) else {
            warn!(
                "skipping directory user '{}': missing `{}`",
                entry.dn, queries.user_match_attribute
            );
            continue;
        };
        let Some(full_name) = first_trimmed(entry, &queries.user_name_attribute) else {
            warn!(
                "skipping directory user '{}': missing `{}`",
                entry.dn, queries.user_name_attribute
            );
            continue;
        };
        let Some(email) = first_trimmed(entry, &queries.user_email_attribute) else {
            warn!(
                "skipping directory user '{}': missing `{}`",
                entry.dn, queries.user_email_attribute
            );
            continue;
        };

        let is_admin = queries
            .user_ldap_admin_attribute
            .as_ref()
            .and_then(|attr| entry.attrs.get(attr))
            .and_then(|values| values.first())
            .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
            .unwrap_or(false);

        let ssh_keys = queries
            .user_ssh_key_attribute
            .as_ref()
            .and_then(|attr| entry.attrs.get(attr))
            .map(|values| {
                values
                    .iter()
                    .filter(|v| v.starts_with("ssh-rsa "))
                    .filter_map(|v| {
                        md5_fingerprint(v).map(|fp| DirectorySshKey {
                            open_ssh_key_text: v.clone(),
                            md5_fingerprint: fp,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        if users.contains_key(&username) {
            warn!("skipping duplicate directory user `{}`", username);
            continue;
        }

        if contains_ci(&options.user_names_to_ignore, &username) {
            continue;
        }

        users.insert(
            username.clone(),
            DirectoryUser {
                dn: entry.dn.clone(),
                username,
                match_id,
                full_name,
                email,
                is_admin,
                is_external: false,
                ssh_keys,
            },
        );
    }

    users
}

fn normalize_groups(
    raw_groups: &[RawEntry],
    queries: &LdapQueriesConfig,
    options: &GitlabOptions,
    users: &mut CiMap<DirectoryUser>,
) -> CiMap<DirectoryGroup> {
    let mut groups: CiMap<DirectoryGroup> = CiMap::new();

    for entry in raw_groups {
        let Some(name) = first_trimmed(entry, &queries.group_unique_attribute) else {
            warn!(
                "skipping directory group '{}': missing `{}`",
                entry.dn, queries.group_unique_attribute
            );
            continue;
        };

        if contains_ci(&options.group_names_to_ignore, &name) {
            continue;
        }
        if groups.contains_key(&name) {
            warn!("skipping duplicate directory group `{}`", name);
            continue;
        }

        let raw_members = entry
            .attrs
            .get(&queries.group_member_attribute)
            .cloned()
            .unwrap_or_default();
        let mut members = resolve_members(&raw_members, &queries.group_member_attribute, users);
        members.sort();
        members.dedup();

        let is_admin_group = contains_ci(&options.group_names_of_administrators, &name);
        let is_external_group = contains_ci(&options.group_names_of_external, &name);
        if is_admin_group || is_external_group {
            for member in &members {
                if let Some(user) = users.get_mut(member) {
                    if is_admin_group {
                        user.is_admin = true;
                    }
                    if is_external_group {
                        user.is_external = true;
                    }
                }
            }
        }

        groups.insert(name.clone(), DirectoryGroup { name, members });
    }

    groups
}

/// Resolve each raw member reference against `users`, per the schema rule
/// the configured member attribute implies (spec.md §4.2).
fn resolve_members(
    raw_members: &[String],
    member_attribute: &str,
    users: &CiMap<DirectoryUser>,
) -> Vec<String> {
    let lowered = member_attribute.to_lowercase();
    let mut resolved = Vec::new();

    if lowered == "memberuid" {
        for raw in raw_members {
            match users.values().find(|u| u.match_id == *raw) {
                Some(user) => resolved.push(user.username.clone()),
                None => warn!("unresolved group member reference `{}` (by matchId)", raw),
            }
        }
    } else if lowered == "member" || lowered == "uniquemember" {
        for raw in raw_members {
            match users.values().find(|u| u.dn.eq_ignore_ascii_case(raw)) {
                Some(user) => resolved.push(user.username.clone()),
                None => warn!("unresolved group member reference `{}` (by dn)", raw),
            }
        }
    } else if !raw_members.is_empty() {
        warn!(
            "member attribute `{}` matches neither memberUid nor member/uniqueMember schemas; no members resolved",
            member_attribute
        );
    }

    resolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn entry(dn: &str, attrs: &[(&str, &[&str])]) -> RawEntry {
        let mut map = HashMap::new();
        for (k, values) in attrs {
            map.insert(
                k.to_string(),
                values.iter().map(|v| v.to_string()).collect(),
            );
        }
        RawEntry {
            dn: dn.to_string(),
            attrs: map,
        }
    }

    fn queries() -> LdapQueriesConfig {
        LdapQueriesConfig {
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
            user_ssh_key_attribute: Some("sshPublicKey".to_string()),
            group_unique_attribute: "cn".to_string(),
            group_member_attribute: "member".to_string(),
        }
    }

    fn options() -> GitlabOptions {
        GitlabOptions {
            user_names_to_ignore: vec![],
            group_names_to_ignore: vec![],
            group_names_of_administrators: vec![],
            group_names_of_external: vec![],
            create_empty_groups: false,
            delete_extra_groups: false,
            new_member_access_level: 30,
        }
    }

    #[test]
    fn user_missing_required_attribute_is_skipped() {
        let raw = vec![entry("uid=alice,dc=example,dc=com", &[("uid", &["alice"])])];
        let snapshot = normalize_users(&raw, &queries(), &options());
        assert!(snapshot.is_empty());
    }

    #[test]
    fn duplicate_username_keeps_first_occurrence() {
        let raw = vec![
            entry(
                "uid=alice,dc=example,dc=com",
                &[
                    ("uid", &["alice"]),
                    ("cn", &["Alice One"]),
                    ("mail", &["alice@example.com"]),
                ],
            ),
            entry(
                "uid=alice2,dc=example,dc=com",
                &[
                    ("uid", &["alice"]),
                    ("cn", &["Alice Two"]),
                    ("mail", &["alice2@example.com"]),
                ],
            ),
        ];
        let snapshot = normalize_users(&raw, &queries(), &options());
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.get("alice").unwrap().full_name, "Alice One");
    }

    #[test]
    fn ignored_username_is_dropped() {
        let raw = vec![entry(
            "uid=bob,dc=example,dc=com",
            &[
                ("uid", &["bob"]),
                ("cn", &["Bob"]),
                ("mail", &["bob@example.com"]),
            ],
        )];
        let mut opts = options();
        opts.user_names_to_ignore.push("bob".to_string());
        let snapshot = normalize_users(&raw, &queries(), &opts);
        assert!(snapshot.is_empty());
    }

    #[test]
    fn group_membership_propagates_admin_flag_by_dn() {
        let user_raw = vec![entry(
            "uid=alice,dc=example,dc=com",
            &[
                ("uid", &["alice"]),
                ("cn", &["Alice"]),
                ("mail", &["alice@example.com"]),
            ],
        )];
        let mut users = normalize_users(&user_raw, &queries(), &options());

        let group_raw = vec![entry(
            "cn=admins,dc=example,dc=com",
            &[
                ("cn", &["admins"]),
                ("member", &["uid=alice,dc=example,dc=com"]),
            ],
        )];
        let mut opts = options();
        opts.group_names_of_administrators.push("admins".to_string());
        let groups = normalize_groups(&group_raw, &queries(), &opts, &mut users);

        assert_eq!(groups.get("admins").unwrap().members, vec!["alice"]);
        assert!(users.get("alice").unwrap().is_admin);
    }

    #[test]
    fn member_uid_schema_resolves_by_match_id() {
        let mut q = queries();
        q.group_member_attribute = "memberUid".to_string();
        let user_raw = vec![entry(
            "uid=alice,dc=example,dc=com",
            &[
                ("uid", &["alice"]),
                ("cn", &["Alice"]),
                ("mail", &["alice@example.com"]),
            ],
        )];
        let mut users = normalize_users(&user_raw, &queries(), &options());
        let group_raw = vec![entry(
            "cn=devs,dc=example,dc=com",
            &[("cn", &["devs"]), ("memberUid", &["alice"])],
        )];
        let groups = normalize_groups(&group_raw, &q, &options(), &mut users);
        assert_eq!(groups.get("devs").unwrap().members, vec!["alice"]);
    }

    #[test]
    fn unresolved_member_reference_is_dropped() {
        let mut users: CiMap<DirectoryUser> = CiMap::new();
        let group_raw = vec![entry(
            "cn=devs,dc=example,dc=com",
            &[("cn", &["devs"]), ("member", &["uid=ghost,dc=example,dc=com"])],
        )];
        let groups = normalize_groups(&group_raw, &queries(), &options(), &mut users);
        assert!(groups.get("devs").unwrap().members.is_empty());
    }
}
