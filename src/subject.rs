//! Subject identifiers and the four-tier role model.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Stable identifier of an account. Zero is never a valid subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectId(pub i64);

impl SubjectId {
    /// Injected for callers on anonymous-capable operations that present no valid token.
    pub const ANONYMOUS: SubjectId = SubjectId(6666);

    pub fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for SubjectId {
    fn from(id: i64) -> Self {
        SubjectId(id)
    }
}

/// Privilege tier of a subject.
///
/// The numeric ranks are a public contract: they are embedded in every issued
/// token and compared when a caller asks to be checked in at a given role.
/// Ordering always follows the rank.
///
/// | Role       | Rank |
/// |------------|------|
/// | `AppUser`  | 100  |
/// | `WebUser`  | 101  |
/// | `Author`   | 150  |
/// | `WebAdmin` | 200  |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
pub enum Role {
    AppUser,
    Author,
    WebAdmin,
    WebUser,
}

impl Role {
    pub const fn rank(self) -> u16 {
        match self {
            Role::AppUser => 100,
            Role::WebUser => 101,
            Role::Author => 150,
            Role::WebAdmin => 200,
        }
    }

    /// Unknown ranks map to `None`; a token carrying one is rejected.
    pub fn from_rank(rank: u16) -> Option<Role> {
        match rank {
            100 => Some(Role::AppUser),
            101 => Some(Role::WebUser),
            150 => Some(Role::Author),
            200 => Some(Role::WebAdmin),
            _ => None,
        }
    }
}

impl PartialOrd for Role {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Role {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl From<Role> for u16 {
    fn from(role: Role) -> u16 {
        role.rank()
    }
}

impl TryFrom<u16> for Role {
    type Error = String;

    fn try_from(rank: u16) -> Result<Self, Self::Error> {
        Role::from_rank(rank).ok_or_else(|| format!("unknown role rank {rank}"))
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::AppUser => "app_user",
            Role::Author => "author",
            Role::WebAdmin => "web_admin",
            Role::WebUser => "web_user",
        };
        f.write_str(name)
    }
}
