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

use clap::Parser;
use log::error;

mod collections;
mod config;
mod directory;
mod dispatcher;
mod errors;
mod fingerprint;
mod forge;
mod model;
mod pacer;
mod password;
mod reconcile;
mod slug;

/// Reconcile a self-hosted code forge's users, groups, memberships and SSH
/// keys against an authoritative LDAP directory.
#[derive(Debug, Parser)]
#[command(name = "forge-ldap-sync", version)]
struct Cli {
    /// Suppress all mutating calls; log what would have happened instead.
    #[arg(short = 'd', long = "dryrun")]
    dryrun: bool,

    /// Do not abort a forge instance's run on a recoverable forge error.
    #[arg(long = "continueOnFail")]
    continue_on_fail: bool,

    /// A single configured forge instance to reconcile. All instances are
    /// processed when omitted.
    instance: Option<String>,
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let config = match config::load_config() {
        Ok(config) => config,
        Err(err) => {
            error!("{err}");
            std::process::exit(1);
        }
    };

    let result = dispatcher::run(&config, cli.instance.as_deref(), cli.dryrun, cli.continue_on_fail).await;
    if let Err(err) = result {
        error!("{err}");
        std::process::exit(1);
    }
}
