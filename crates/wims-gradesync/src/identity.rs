//! Remote identity derivation: class ids, owner tokens, remote logins and
//! the flattened grade item namespace.

use crate::data::LocalUser;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Identifier of a class on the WIMS server: an opaque numeric string
/// assigned by the server at creation and persisted by the host next to the
/// course module.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteClassId(String);

impl RemoteClassId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RemoteClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The binding key a remote class carries to prove it belongs to one local
/// course module. The server checks it on every class-scoped job.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OwnerToken(String);

impl OwnerToken {
    /// Derives the token for a course module. Stable for the lifetime of
    /// the module instance.
    pub fn for_module(course_module_id: u64) -> Self {
        Self(format!("moodle_{course_module_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How remote logins are derived from local users. Chosen once in the
/// service configuration, never per call; switching it orphans every
/// remote account created under the other policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginPolicy {
    /// A constant prefix plus the local user id. Survives profile edits.
    Opaque,
    /// First-name initial plus last name plus the local user id. Readable
    /// on the remote side, but profile edits break the account link.
    Readable,
}

/// The login identifying a person inside a remote class.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteLogin(String);

// WIMS caps login length internally; longer names are truncated before the
// id suffix is appended.
const MAX_NAME_CHARS: usize = 16;

impl RemoteLogin {
    /// Derives the login for a local user under the given policy. Distinct
    /// user ids always yield distinct logins; there is no collision
    /// resolution beyond that.
    pub fn derive(user: &LocalUser, policy: LoginPolicy) -> Self {
        match policy {
            LoginPolicy::Opaque => Self(format!("moodleuser{}", user.id)),
            LoginPolicy::Readable => {
                let initial = user.first_name.chars().next();
                let full: String = initial
                    .into_iter()
                    .chain(user.last_name.chars())
                    .collect::<String>()
                    .to_lowercase();
                let clean: String = full
                    .chars()
                    .filter(char::is_ascii_lowercase)
                    .take(MAX_NAME_CHARS)
                    .collect();
                Self(format!("{clean}{}", user.id))
            }
        }
    }

    /// The reserved supervisor login WIMS binds to the class owner.
    pub fn supervisor() -> Self {
        Self("supervisor".to_string())
    }

    pub fn new(login: impl Into<String>) -> Self {
        Self(login.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RemoteLogin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Builds the remote-login to local-user-id table used by a score
/// synchronisation run. Built once per run, over all active users.
pub fn build_login_lookup(users: &[LocalUser], policy: LoginPolicy) -> HashMap<String, u64> {
    users
        .iter()
        .map(|user| (RemoteLogin::derive(user, policy).0, user.id))
        .collect()
}

/// The two kinds of gradable sheets. They are numbered independently on the
/// server, which is why the grade item namespace needs an offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SheetKind {
    Worksheet,
    Exam,
}

impl SheetKind {
    /// Offset keeping the two id spaces apart in the flat grade item
    /// namespace: worksheet items live in `[1000, 2000)`, exam items in
    /// `[0, 1000)`.
    pub fn item_offset(self) -> u32 {
        match self {
            SheetKind::Worksheet => 1000,
            SheetKind::Exam => 0,
        }
    }
}

impl fmt::Display for SheetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SheetKind::Worksheet => "worksheet",
            SheetKind::Exam => "exam",
        })
    }
}

/// A sheet id too large for the flat grade item namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{kind} id {sheet_id} overflows the grade item namespace")]
pub struct SheetIdOutOfRange {
    pub kind: SheetKind,
    pub sheet_id: u32,
}

/// A gradebook column identifier: sheet kind offset plus sheet id.
///
/// The flat integer is kept for compatibility with gradebook records
/// written by earlier versions; the constructor enforces the bound that
/// keeps the worksheet and exam ranges disjoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GradeItemId(u32);

impl GradeItemId {
    pub fn new(kind: SheetKind, sheet_id: u32) -> Result<Self, SheetIdOutOfRange> {
        if sheet_id >= 1000 {
            return Err(SheetIdOutOfRange { kind, sheet_id });
        }
        Ok(Self(kind.item_offset() + sheet_id))
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for GradeItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
