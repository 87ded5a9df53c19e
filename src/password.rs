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

use rand::distributions::Alphanumeric;
use rand::{rngs::OsRng, Rng};

const GENERATED_PASSWORD_LENGTH: usize = 12;

/// Generate a 12-character alphanumeric password from a cryptographic RNG,
/// used as the throwaway initial password for newly created forge users
/// (the directory, not this password, is the real authentication source).
pub fn generate_initial_password() -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(GENERATED_PASSWORD_LENGTH)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_has_the_expected_length() {
        assert_eq!(generate_initial_password().len(), GENERATED_PASSWORD_LENGTH);
    }

    #[test]
    fn password_is_alphanumeric() {
        let password = generate_initial_password();
        assert!(password.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn two_generated_passwords_are_very_unlikely_to_collide() {
        assert_ne!(generate_initial_password(), generate_initial_password());
    }
}
