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

use thiserror::Error;

/// Top-level error, mapped to the process exit code in `main`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("directory error: {0}")]
    Directory(#[from] DirectoryError),
    #[error("forge error: {0}")]
    Forge(#[from] ForgeError),
    #[error("internal error: {0}")]
    Reconcile(#[from] ReconcileError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found; copy {dist} to {expected} and adjust it")]
    MissingFile { expected: String, dist: String },
    #[error("config file not found at {expected}")]
    MissingFileNoDist { expected: String },
    #[error("failed to load configuration: {0}")]
    Load(#[from] figment::Error),
    #[error("invalid configuration field `{field}`: {reason}")]
    Invalid { field: String, reason: String },
    #[error("unknown forge instance `{0}`")]
    UnknownInstance(String),
}

/// The directory is authoritative: any of these abort the whole run
/// regardless of `continueOnFail` (spec.md §4.1, §7).
#[derive(Debug, Error)]
pub enum DirectoryErrorKind {
    #[error("connect")]
    Connect,
    #[error("bind")]
    Bind,
    #[error("search")]
    Search,
    #[error("transport")]
    Transport,
}

#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct DirectoryError {
    pub kind: DirectoryErrorKind,
    pub message: String,
}

impl DirectoryError {
    pub fn new(kind: DirectoryErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// The three forge error dispositions from spec.md §7.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ForgeErrorKind {
    /// Single-entity failure on a mutating call. Skipped and logged when
    /// `continueOnFail` is set, otherwise fatal for the instance.
    #[error("transient")]
    Transient,
    /// A recognized, always-demoted error (e.g. duplicate email on create).
    #[error("known")]
    Known,
    /// A transport/auth failure that invalidates the whole instance run.
    #[error("fatal")]
    Fatal,
}

#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct ForgeError {
    pub kind: ForgeErrorKind,
    pub message: String,
}

impl ForgeError {
    pub fn new(kind: ForgeErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Recognize the well-known "Email has already been taken" message on
    /// user creation and demote it to a non-fatal skip (spec.md §4.3).
    pub fn classify_create_user_error(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.contains("Email has already been taken") {
            Self::new(ForgeErrorKind::Known, message)
        } else {
            Self::new(ForgeErrorKind::Transient, message)
        }
    }
}

/// Invariant violations detected while interpreting otherwise well-formed
/// data (e.g. an LDAP attribute that is present but not a list). Logged and
/// the offending entity is skipped; the run continues (spec.md §7, §9).
#[derive(Debug, Error)]
#[error("{detail}")]
pub struct ReconcileError {
    pub detail: String,
}

impl ReconcileError {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}
