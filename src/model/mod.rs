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

/// The canonical in-memory identity model produced by ingesting the
/// directory (users, groups, the SSH keys kept on each user).
pub mod directory;
/// The in-memory model of what a forge instance currently holds, built by
/// listing it through the forge client adapter.
pub mod forge;

/// Usernames the forge ships with that are never the subject of a mutating
/// call, regardless of what the directory or ignore lists say (spec.md §3, §8).
pub const BUILTIN_USERNAMES: &[&str] = &["root", "ghost", "support-bot", "alert-bot"];

/// Forge group names that are never the subject of a mutating call
/// (spec.md §4.5, §8).
pub const RESERVED_GROUP_NAMES: &[&str] = &["Root", "Users", "GitLab Instance"];

pub fn is_builtin_username(username: &str) -> bool {
    BUILTIN_USERNAMES
        .iter()
        .any(|b| b.eq_ignore_ascii_case(username))
}

pub fn is_reserved_group_name(name: &str) -> bool {
    RESERVED_GROUP_NAMES
        .iter()
        .any(|r| r.eq_ignore_ascii_case(name))
}
