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

/// Transforms raw directory entries into the canonical `DirectorySnapshot`
/// (spec.md §4.2).
pub mod normalizer;

use std::collections::HashMap;

use ldap3::{LdapConnAsync, LdapConnSettings, Scope, SearchEntry};
use log::{debug, info, warn};

use crate::config::{Config, Encryption};
use crate::errors::{DirectoryError, DirectoryErrorKind};

/// A directory entry exactly as read off the wire: a DN and an
/// attribute-name-to-values map, duck-typed the way LDAP hands it back
/// (spec.md §4.1, §9 "duck-typed attribute maps").
#[derive(Debug, Clone)]
pub struct RawEntry {
    pub dn: String,
    pub attrs: HashMap<String, Vec<String>>,
}

/// The external collaborator that owns the LDAP transport. The core only
/// depends on these two fetch operations (spec.md §1, §6).
pub struct DirectoryClient<'c> {
    config: &'c Config,
}

impl<'c> DirectoryClient<'c> {
    pub fn new(config: &'c Config) -> Self {
        Self { config }
    }

    /// Issue the user search and return its raw entries.
    pub async fn fetch_raw_users(&self) -> Result<Vec<RawEntry>, DirectoryError> {
        let queries = &self.config.ldap.queries;
        let base = effective_search_base(&queries.user_dn, &queries.base_dn);
        self.search(&base, &queries.user_filter, user_requested_attributes(self.config))
            .await
    }

    /// Issue the group search and return its raw entries.
    pub async fn fetch_raw_groups(&self) -> Result<Vec<RawEntry>, DirectoryError> {
        let queries = &self.config.ldap.queries;
        let base = effective_search_base(&queries.group_dn, &queries.base_dn);
        self.search(
            &base,
            &queries.group_filter,
            vec![
                queries.group_unique_attribute.clone(),
                queries.group_member_attribute.clone(),
            ],
        )
        .await
    }

    async fn search(
        &self,
        base: &str,
        filter: &str,
        attributes: Vec<String>,
    ) -> Result<Vec<RawEntry>, DirectoryError> {
        info!("searching directory at '{}' with filter '{}'", base, filter);
        let mut ldap = self.open_session().await?;
        let attrs: Vec<&str> = attributes.iter().map(String::as_str).collect();
        let search_result = ldap
            .search(base, Scope::Subtree, filter, attrs)
            .await
            .map_err(|e| DirectoryError::new(DirectoryErrorKind::Search, e.to_string()))?
            .success()
            .map_err(|e| DirectoryError::new(DirectoryErrorKind::Search, e.to_string()))?;
        debug!("received {} raw entries", search_result.0.len());
        let win_compatibility_mode = self.config.ldap.win_compatibility_mode;
        let entries = search_result
            .0
            .into_iter()
            .map(SearchEntry::construct)
            .filter(|entry| {
                // Continuation references surface as entries with an empty DN
                // and a "ref" attribute; compatibility mode drops them instead
                // of chasing them (spec.md's "disable referral following").
                if win_compatibility_mode && (entry.dn.is_empty() || entry.attrs.contains_key("ref")) {
                    warn!("ignoring referral continuation in compatibility mode");
                    return false;
                }
                true
            })
            .map(|entry| RawEntry {
                dn: entry.dn,
                attrs: entry.attrs,
            })
            .collect();
        let _ = ldap.unbind().await;
        Ok(entries)
    }

    /// Connect (scheme/port from `encryption`, STARTTLS when `tls`), set the
    /// protocol version, and bind with the configured credentials or
    /// anonymously (spec.md §4.1). Referral following (compatibility mode)
    /// is handled afterwards, by dropping continuation references from the
    /// search results rather than chasing them.
    async fn open_session(&self) -> Result<ldap3::Ldap, DirectoryError> {
        let server = &self.config.ldap.server;
        let scheme = match server.encryption {
            Encryption::None | Encryption::Tls => "ldap",
            Encryption::Ssl => "ldaps",
        };
        let url = format!("{}://{}:{}", scheme, server.host, server.port);

        if server.version != 3 {
            warn!(
                "ldap.server.version {} requested but the directory client always negotiates LDAPv3",
                server.version
            );
        }
        let settings = LdapConnSettings::new();

        info!("connecting to directory server {}", url);
        let (conn, mut ldap) = LdapConnAsync::with_settings(settings, &url)
            .await
            .map_err(|e| DirectoryError::new(DirectoryErrorKind::Connect, e.to_string()))?;
        ldap3::drive!(conn);

        if server.encryption == Encryption::Tls {
            ldap.starttls()
                .await
                .map_err(|e| DirectoryError::new(DirectoryErrorKind::Connect, e.to_string()))?;
        }

        match server.bind_dn.as_ref() {
            Some(bind_dn) => {
                info!("binding to directory as '{}'", bind_dn);
                let password = server.bind_password.as_deref().unwrap_or("");
                let bind_result = ldap
                    .simple_bind(bind_dn, password)
                    .await
                    .map_err(|e| DirectoryError::new(DirectoryErrorKind::Bind, e.to_string()))?;
                bind_result
                    .success()
                    .map_err(|e| DirectoryError::new(DirectoryErrorKind::Bind, e.to_string()))?;
            }
            None => {
                warn!("binding to directory anonymously; no bindDn configured");
            }
        }
        Ok(ldap)
    }
}

fn effective_search_base(scoped_dn: &str, base_dn: &str) -> String {
    if scoped_dn.is_empty() {
        base_dn.to_string()
    } else {
        format!("{scoped_dn},{base_dn}")
    }
}

fn user_requested_attributes(config: &Config) -> Vec<String> {
    let queries = &config.ldap.queries;
    let mut attrs = vec![
        queries.user_unique_attribute.clone(),
        queries.user_match_attribute.clone(),
        queries.user_name_attribute.clone(),
        queries.user_email_attribute.clone(),
    ];
    if let Some(admin_attr) = &queries.user_ldap_admin_attribute {
        attrs.push(admin_attr.clone());
    }
    if let Some(ssh_attr) = &queries.user_ssh_key_attribute {
        attrs.push(ssh_attr.clone());
    }
    attrs.sort();
    attrs.dedup();
    attrs
}
