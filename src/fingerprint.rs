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

use base64::Engine;
use md5::{Digest, Md5};

/// Compute the fingerprint of an OpenSSH public key line: md5 of the
/// base64-decoded second whitespace-delimited field, rendered as lower-case
/// hex in colon-separated byte pairs.
///
/// Returns `None` if the key text does not have a second field or if that
/// field is not valid base64.
pub fn md5_fingerprint(open_ssh_key_text: &str) -> Option<String> {
    let blob_field = open_ssh_key_text.split_whitespace().nth(1)?;
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(blob_field)
        .ok()?;
    let mut hasher = Md5::new();
    hasher.update(&decoded);
    let digest = hasher.finalize();
    Some(
        digest
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect::<Vec<_>>()
            .join(":"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_of_well_formed_key_is_colon_separated_hex() {
        let key = "ssh-rsa AAAAB3NzaC1yc2EAAAADAQABAAAB user@example.com";
        let fp = md5_fingerprint(key).expect("fingerprint");
        assert_eq!(fp.len(), 16 * 3 - 1);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit() || c == ':'));
    }

    #[test]
    fn fingerprint_is_deterministic() {
        let key = "ssh-rsa AAAAB3NzaC1yc2EAAAADAQABAAAB user@example.com";
        assert_eq!(md5_fingerprint(key), md5_fingerprint(key));
    }

    #[test]
    fn different_keys_produce_different_fingerprints() {
        let a = "ssh-rsa AAAAB3NzaC1yc2EAAAADAQABAAAB a@example.com";
        let b = "ssh-rsa AAAAC4NzaC1yc2EAAAADAQABAAAC b@example.com";
        assert_ne!(md5_fingerprint(a), md5_fingerprint(b));
    }

    #[test]
    fn missing_second_field_returns_none() {
        assert_eq!(md5_fingerprint("ssh-rsa"), None);
    }

    #[test]
    fn invalid_base64_returns_none() {
        assert_eq!(md5_fingerprint("ssh-rsa not-base64!!! comment"), None);
    }
}
