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

use std::collections::BTreeMap;
use std::path::Path;

use figment::providers::{Env, Format, Yaml};
use figment::Figment;
use serde::Deserialize;

use crate::errors::ConfigError;

pub const CONFIG_FILE: &str = "config.yml";
pub const CONFIG_DIST_FILE: &str = "config.yml.dist";

/// Build the layered figment: `config.yml` (YAML) overridden by
/// `FORGE_SYNC_`-prefixed environment variables, nested keys separated by
/// `__` (e.g. `FORGE_SYNC_LDAP__SERVER__HOST`).
fn read_figment() -> Figment {
    Figment::new()
        .merge(Yaml::file(CONFIG_FILE))
        .merge(Env::prefixed("FORGE_SYNC_").split("__"))
}

/// Load and validate the configuration from `./config.yml`. If the file is
/// missing, points the operator at `config.yml.dist` when present.
pub fn load_config() -> Result<Config, ConfigError> {
    if !Path::new(CONFIG_FILE).exists() {
        return Err(if Path::new(CONFIG_DIST_FILE).exists() {
            ConfigError::MissingFile {
                expected: CONFIG_FILE.to_string(),
                dist: CONFIG_DIST_FILE.to_string(),
            }
        } else {
            ConfigError::MissingFileNoDist {
                expected: CONFIG_FILE.to_string(),
            }
        });
    }
    let raw: RawConfig = read_figment().extract()?;
    Config::try_from(raw)
}

// --- Raw, fully-optional shape that mirrors the YAML exactly (§6 table) ---

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawConfig {
    pub ldap: RawLdap,
    pub gitlab: RawGitlab,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawLdap {
    pub debug: Option<bool>,
    #[serde(rename = "winCompatibilityMode")]
    pub win_compatibility_mode: Option<bool>,
    pub server: RawLdapServer,
    pub queries: RawLdapQueries,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawLdapServer {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub version: Option<u8>,
    pub encryption: Option<String>,
    #[serde(rename = "bindDn")]
    pub bind_dn: Option<String>,
    #[serde(rename = "bindPassword")]
    pub bind_password: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawLdapQueries {
    #[serde(rename = "baseDn")]
    pub base_dn: Option<String>,
    #[serde(rename = "userDn")]
    pub user_dn: Option<String>,
    #[serde(rename = "groupDn")]
    pub group_dn: Option<String>,
    #[serde(rename = "userFilter")]
    pub user_filter: Option<String>,
    #[serde(rename = "groupFilter")]
    pub group_filter: Option<String>,
    #[serde(rename = "userUniqueAttribute")]
    pub user_unique_attribute: Option<String>,
    #[serde(rename = "userMatchAttribute")]
    pub user_match_attribute: Option<String>,
    #[serde(rename = "userNameAttribute")]
    pub user_name_attribute: Option<String>,
    #[serde(rename = "userEmailAttribute")]
    pub user_email_attribute: Option<String>,
    #[serde(rename = "userLdapAdminAttribute")]
    pub user_ldap_admin_attribute: Option<String>,
    #[serde(rename = "userSshKeyAttribute")]
    pub user_ssh_key_attribute: Option<String>,
    #[serde(rename = "groupUniqueAttribute")]
    pub group_unique_attribute: Option<String>,
    #[serde(rename = "groupMemberAttribute")]
    pub group_member_attribute: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawGitlab {
    pub debug: Option<bool>,
    pub options: RawGitlabOptions,
    pub instances: BTreeMap<String, RawInstance>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawGitlabOptions {
    #[serde(rename = "userNamesToIgnore")]
    pub user_names_to_ignore: Option<Vec<String>>,
    #[serde(rename = "groupNamesToIgnore")]
    pub group_names_to_ignore: Option<Vec<String>>,
    #[serde(rename = "groupNamesOfAdministrators")]
    pub group_names_of_administrators: Option<Vec<String>>,
    #[serde(rename = "groupNamesOfExternal")]
    pub group_names_of_external: Option<Vec<String>>,
    #[serde(rename = "createEmptyGroups")]
    pub create_empty_groups: Option<bool>,
    #[serde(rename = "deleteExtraGroups")]
    pub delete_extra_groups: Option<bool>,
    #[serde(rename = "newMemberAccessLevel")]
    pub new_member_access_level: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawInstance {
    pub url: Option<String>,
    pub token: Option<String>,
    #[serde(rename = "ldapServerName")]
    pub ldap_server_name: Option<String>,
}

// --- Fully-defaulted, validated shape the rest of the crate consumes ---

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Encryption {
    None,
    Tls,
    Ssl,
}

impl Encryption {
    fn parse(raw: &str) -> Result<Self, ConfigError> {
        match raw.to_lowercase().as_str() {
            "none" => Ok(Encryption::None),
            "tls" => Ok(Encryption::Tls),
            "ssl" => Ok(Encryption::Ssl),
            other => Err(ConfigError::Invalid {
                field: "ldap.server.encryption".to_string(),
                reason: format!("unknown encryption `{other}`, expected none|tls|ssl"),
            }),
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Encryption::None | Encryption::Tls => 389,
            Encryption::Ssl => 636,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub ldap: LdapConfig,
    pub gitlab: GitlabConfig,
}

#[derive(Debug, Clone)]
pub struct LdapConfig {
    pub debug: bool,
    pub win_compatibility_mode: bool,
    pub server: LdapServerConfig,
    pub queries: LdapQueriesConfig,
}

#[derive(Debug, Clone)]
pub struct LdapServerConfig {
    pub host: String,
    pub port: u16,
    pub version: u8,
    pub encryption: Encryption,
    pub bind_dn: Option<String>,
    pub bind_password: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LdapQueriesConfig {
    pub base_dn: String,
    /// Empty means "search at `base_dn` directly" (spec.md §4.1).
    pub user_dn: String,
    pub group_dn: String,
    pub user_filter: String,
    pub group_filter: String,
    pub user_unique_attribute: String,
    pub user_match_attribute: String,
    pub user_name_attribute: String,
    pub user_email_attribute: String,
    pub user_ldap_admin_attribute: Option<String>,
    pub user_ssh_key_attribute: Option<String>,
    pub group_unique_attribute: String,
    pub group_member_attribute: String,
}

#[derive(Debug, Clone)]
pub struct GitlabConfig {
    pub debug: bool,
    pub options: GitlabOptions,
    pub instances: BTreeMap<String, InstanceConfig>,
}

#[derive(Debug, Clone)]
pub struct GitlabOptions {
    pub user_names_to_ignore: Vec<String>,
    pub group_names_to_ignore: Vec<String>,
    pub group_names_of_administrators: Vec<String>,
    pub group_names_of_external: Vec<String>,
    pub create_empty_groups: bool,
    pub delete_extra_groups: bool,
    pub new_member_access_level: i64,
}

#[derive(Debug, Clone)]
pub struct InstanceConfig {
    pub name: String,
    pub url: String,
    pub token: String,
    pub ldap_server_name: String,
}

fn require(field: &str, value: Option<String>) -> Result<String, ConfigError> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ConfigError::Invalid {
            field: field.to_string(),
            reason: "required field is missing".to_string(),
        }),
    }
}

impl TryFrom<RawConfig> for Config {
    type Error = ConfigError;

    fn try_from(raw: RawConfig) -> Result<Self, Self::Error> {
        Ok(Config {
            ldap: LdapConfig::try_from(raw.ldap)?,
            gitlab: GitlabConfig::try_from(raw.gitlab)?,
        })
    }
}

impl TryFrom<RawLdap> for LdapConfig {
    type Error = ConfigError;

    fn try_from(raw: RawLdap) -> Result<Self, Self::Error> {
        let server = LdapServerConfig::try_from(raw.server)?;
        let queries = LdapQueriesConfig::try_from(raw.queries)?;
        Ok(LdapConfig {
            debug: raw.debug.unwrap_or(false),
            win_compatibility_mode: raw.win_compatibility_mode.unwrap_or(false),
            server,
            queries,
        })
    }
}

impl TryFrom<RawLdapServer> for LdapServerConfig {
    type Error = ConfigError;

    fn try_from(raw: RawLdapServer) -> Result<Self, Self::Error> {
        let host = require("ldap.server.host", raw.host)?;
        let encryption = Encryption::parse(raw.encryption.as_deref().unwrap_or("none"))?;
        let version = raw.version.unwrap_or(3);
        if !(1..=3).contains(&version) {
            return Err(ConfigError::Invalid {
                field: "ldap.server.version".to_string(),
                reason: format!("must be 1-3, got {version}"),
            });
        }
        let port = raw.port.unwrap_or_else(|| encryption.default_port());
        Ok(LdapServerConfig {
            host,
            port,
            version,
            encryption,
            bind_dn: raw.bind_dn.filter(|v| !v.is_empty()),
            bind_password: raw.bind_password,
        })
    }
}

impl TryFrom<RawLdapQueries> for LdapQueriesConfig {
    type Error = ConfigError;

    fn try_from(raw: RawLdapQueries) -> Result<Self, Self::Error> {
        let base_dn = require("ldap.queries.baseDn", raw.base_dn)?;
        let user_filter = require("ldap.queries.userFilter", raw.user_filter)?;
        let group_filter = require("ldap.queries.groupFilter", raw.group_filter)?;
        let user_unique_attribute =
            require("ldap.queries.userUniqueAttribute", raw.user_unique_attribute)?;
        let user_name_attribute =
            require("ldap.queries.userNameAttribute", raw.user_name_attribute)?;
        let user_email_attribute =
            require("ldap.queries.userEmailAttribute", raw.user_email_attribute)?;
        let group_unique_attribute = require(
            "ldap.queries.groupUniqueAttribute",
            raw.group_unique_attribute,
        )?;
        let group_member_attribute = require(
            "ldap.queries.groupMemberAttribute",
            raw.group_member_attribute,
        )?;
        // userMatchAttribute defaults to userUniqueAttribute when omitted (§6).
        let user_match_attribute = raw
            .user_match_attribute
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| user_unique_attribute.clone());

        let user_dn = raw.user_dn.unwrap_or_default();
        if !user_dn.is_empty() && user_dn.ends_with(base_dn.as_str()) {
            log::warn!(
                "ldap.queries.userDn `{}` already ends with baseDn `{}`; the effective search base will repeat it",
                user_dn, base_dn
            );
        }
        let group_dn = raw.group_dn.unwrap_or_default();
        if !group_dn.is_empty() && group_dn.ends_with(base_dn.as_str()) {
            log::warn!(
                "ldap.queries.groupDn `{}` already ends with baseDn `{}`; the effective search base will repeat it",
                group_dn, base_dn
            );
        }

        Ok(LdapQueriesConfig {
            base_dn,
            user_dn,
            group_dn,
            user_filter,
            group_filter,
            user_unique_attribute,
            user_match_attribute,
            user_name_attribute,
            user_email_attribute,
            user_ldap_admin_attribute: raw.user_ldap_admin_attribute,
            user_ssh_key_attribute: raw.user_ssh_key_attribute,
            group_unique_attribute,
            group_member_attribute,
        })
    }
}

impl TryFrom<RawGitlab> for GitlabConfig {
    type Error = ConfigError;

    fn try_from(raw: RawGitlab) -> Result<Self, Self::Error> {
        let options = GitlabOptions {
            user_names_to_ignore: raw.options.user_names_to_ignore.unwrap_or_default(),
            group_names_to_ignore: raw.options.group_names_to_ignore.unwrap_or_default(),
            group_names_of_administrators: raw
                .options
                .group_names_of_administrators
                .unwrap_or_default(),
            group_names_of_external: raw.options.group_names_of_external.unwrap_or_default(),
            create_empty_groups: raw.options.create_empty_groups.unwrap_or(false),
            delete_extra_groups: raw.options.delete_extra_groups.unwrap_or(false),
            new_member_access_level: raw.options.new_member_access_level.unwrap_or(30),
        };
        if raw.instances.is_empty() {
            return Err(ConfigError::Invalid {
                field: "gitlab.instances".to_string(),
                reason: "at least one forge instance must be configured".to_string(),
            });
        }
        let mut instances = BTreeMap::new();
        for (name, raw_instance) in raw.instances {
            let url = require(&format!("gitlab.instances.{name}.url"), raw_instance.url)?;
            let token = require(
                &format!("gitlab.instances.{name}.token"),
                raw_instance.token,
            )?;
            let ldap_server_name = require(
                &format!("gitlab.instances.{name}.ldapServerName"),
                raw_instance.ldap_server_name,
            )?;
            instances.insert(
                name.clone(),
                InstanceConfig {
                    name,
                    url,
                    token,
                    ldap_server_name,
                },
            );
        }
        Ok(GitlabConfig {
            debug: raw.debug.unwrap_or(false),
            options,
            instances,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_raw() -> RawConfig {
        let mut instances = BTreeMap::new();
        instances.insert(
            "primary".to_string(),
            RawInstance {
                url: Some("https://forge.example.com".to_string()),
                token: Some("secret-token".to_string()),
                ldap_server_name: Some("directory".to_string()),
            },
        );
        RawConfig {
            ldap: RawLdap {
                debug: None,
                win_compatibility_mode: None,
                server: RawLdapServer {
                    host: Some("ldap.example.com".to_string()),
                    port: None,
                    version: None,
                    encryption: None,
                    bind_dn: None,
                    bind_password: None,
                },
                queries: RawLdapQueries {
                    base_dn: Some("dc=example,dc=com".to_string()),
                    user_dn: None,
                    group_dn: None,
                    user_filter: Some("(objectClass=person)".to_string()),
                    group_filter: Some("(objectClass=groupOfNames)".to_string()),
                    user_unique_attribute: Some("uid".to_string()),
                    user_match_attribute: None,
                    user_name_attribute: Some("cn".to_string()),
                    user_email_attribute: Some("mail".to_string()),
                    user_ldap_admin_attribute: None,
                    user_ssh_key_attribute: None,
                    group_unique_attribute: Some("cn".to_string()),
                    group_member_attribute: Some("member".to_string()),
                },
            },
            gitlab: RawGitlab {
                debug: None,
                options: RawGitlabOptions::default(),
                instances,
            },
        }
    }

    #[test]
    fn minimal_config_validates_with_documented_defaults() {
        let config = Config::try_from(minimal_raw()).expect("valid config");
        assert_eq!(config.ldap.server.version, 3);
        assert_eq!(config.ldap.server.port, 389);
        assert_eq!(config.ldap.server.encryption, Encryption::None);
        assert_eq!(config.ldap.queries.user_match_attribute, "uid");
        assert_eq!(config.gitlab.options.new_member_access_level, 30);
        assert!(!config.gitlab.options.create_empty_groups);
        assert!(!config.gitlab.options.delete_extra_groups);
        assert_eq!(config.gitlab.instances.len(), 1);
    }

    #[test]
    fn ssl_encryption_defaults_to_port_636() {
        let mut raw = minimal_raw();
        raw.ldap.server.encryption = Some("ssl".to_string());
        let config = Config::try_from(raw).expect("valid config");
        assert_eq!(config.ldap.server.port, 636);
    }

    #[test]
    fn explicit_port_overrides_encryption_default() {
        let mut raw = minimal_raw();
        raw.ldap.server.port = Some(1389);
        let config = Config::try_from(raw).expect("valid config");
        assert_eq!(config.ldap.server.port, 1389);
    }

    #[test]
    fn missing_base_dn_is_rejected() {
        let mut raw = minimal_raw();
        raw.ldap.queries.base_dn = None;
        let err = Config::try_from(raw).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field, .. } if field == "ldap.queries.baseDn"));
    }

    #[test]
    fn empty_instance_map_is_rejected() {
        let mut raw = minimal_raw();
        raw.gitlab.instances.clear();
        let err = Config::try_from(raw).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field, .. } if field == "gitlab.instances"));
    }

    #[test]
    fn unknown_encryption_is_rejected() {
        let mut raw = minimal_raw();
        raw.ldap.server.encryption = Some("rot13".to_string());
        let err = Config::try_from(raw).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field, .. } if field == "ldap.server.encryption"));
    }
}
