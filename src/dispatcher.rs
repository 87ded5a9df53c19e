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

use log::{error, info};

use crate::config::{Config, InstanceConfig};
use crate::directory::normalizer::normalize;
use crate::directory::DirectoryClient;
use crate::errors::{AppError, ConfigError, ReconcileError};
use crate::forge::ForgeClient;
use crate::reconcile::{self, ReconcileContext, Summary};

/// Top-level driver: ingest the directory once, then reconcile each
/// selected forge instance in stable (alphabetical) order (spec.md §4.8, §5).
pub async fn run(
    config: &Config,
    selected_instance: Option<&str>,
    dry_run: bool,
    continue_on_fail: bool,
) -> Result<(), AppError> {
    let instances: Vec<&InstanceConfig> = match selected_instance {
        Some(name) => {
            let instance = config
                .gitlab
                .instances
                .get(name)
                .ok_or_else(|| ConfigError::UnknownInstance(name.to_string()))?;
            vec![instance]
        }
        None => config.gitlab.instances.values().collect(),
    };

    info!("ingesting directory");
    let directory_client = DirectoryClient::new(config);
    let raw_users = directory_client.fetch_raw_users().await?;
    let raw_groups = directory_client.fetch_raw_groups().await?;
    let directory = normalize(&raw_users, &raw_groups, &config.ldap.queries, &config.gitlab.options);
    info!(
        "directory ingestion complete: {} users, {} groups",
        directory.users.len(),
        directory.groups.len()
    );

    let mut total = Summary::default();
    let mut any_instance_failed = false;

    for instance in instances {
        info!("reconciling forge instance `{}` ({})", instance.name, instance.url);
        let client = match ForgeClient::new(instance) {
            Ok(client) => client,
            Err(err) => {
                error!("instance `{}`: failed to build forge client: {err}", instance.name);
                any_instance_failed = true;
                continue;
            }
        };
        let ctx = ReconcileContext {
            config,
            instance,
            directory: &directory,
            dry_run,
            continue_on_fail,
        };
        match reconcile::reconcile_instance(&ctx, &client).await {
            Ok(summary) => {
                info!("instance `{}`: {}", instance.name, summary);
                total.merge(&summary);
            }
            Err(err) => {
                error!("instance `{}`: aborted: {err}", instance.name);
                any_instance_failed = true;
            }
        }
    }

    info!("run complete: {}", total);
    if any_instance_failed {
        return Err(AppError::Reconcile(ReconcileError::new(
            "one or more forge instances failed to reconcile",
        )));
    }
    Ok(())
}
