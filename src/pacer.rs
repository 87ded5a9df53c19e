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

use std::time::Duration;

/// The fixed delay inserted after every mutating forge call in live mode, to
/// avoid tripping the forge's own rate limits.
const MUTATION_PACE: Duration = Duration::from_millis(100);

/// Sleep for the pacing interval unless `dry_run` is set, in which case the
/// delay is skipped entirely. This is the only synchronization primitive in
/// the reconciler - calls are already serialized by single-threaded, ordered
/// iteration (one instance, one phase, one entity at a time).
pub async fn pace(dry_run: bool) {
    if dry_run {
        return;
    }
    tokio::time::sleep(MUTATION_PACE).await;
}
