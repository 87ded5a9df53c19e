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

//! Two slug rules are used across the reconciler: a username slug (keeps
//! case, collapses disallowed runs to a comma) and a pair of group slugs
//! (name-slug keeps case, path-slug lower-cases).

/// Slugify a username: only `A-Z a-z 0-9 - _ .` are kept, any run of
/// non-matching characters collapses to a single `,`.
pub fn slugify_username(raw: &str) -> String {
    collapse_runs(raw, is_username_char, ',')
}

/// Slugify a group name for display: any run of characters outside
/// `[A-Za-z0-9]` becomes a single space, case is preserved, and the result
/// is trimmed. (The source regex `([^A-Za-z0-9]|-_\. )+` unions the
/// non-alphanumeric class with a set of characters already inside it, so it
/// reduces to plain `[^A-Za-z0-9]+` — `-`, `_`, `.` and space are replaced
/// too, not kept.)
pub fn slugify_group_name(raw: &str) -> String {
    collapse_runs(raw, is_alnum_char, ' ').trim().to_string()
}

/// Slugify a group path: any run of characters outside `[A-Za-z0-9]` becomes
/// a single hyphen, the result is lower-cased and trimmed. Same reduction as
/// `slugify_group_name` applies to the source regex `([^A-Za-z0-9]|-_\.)+`.
pub fn slugify_group_path(raw: &str) -> String {
    collapse_runs(raw, is_alnum_char, '-')
        .trim_matches('-')
        .to_lowercase()
}

fn is_username_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')
}

fn is_alnum_char(c: char) -> bool {
    c.is_ascii_alphanumeric()
}

/// Collapse every maximal run of characters that fail `keep` into a single
/// `replacement` character, leaving characters that satisfy `keep` untouched.
fn collapse_runs(raw: &str, keep: impl Fn(char) -> bool, replacement: char) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut in_run = false;
    for c in raw.chars() {
        if keep(c) {
            out.push(c);
            in_run = false;
        } else if !in_run {
            out.push(replacement);
            in_run = true;
        }
    }
    out
}
