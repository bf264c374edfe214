/// Badge-based permission levels.
///
/// Each badge name maps to an authority level; a user's authority is the
/// highest level among their badges, or -1 when none are recognised.
/// Admin logins pass every check.
use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::irc::event::Badges;

/// Built-in badge → authority table.
pub const DEFAULT_AUTHORITIES: [(&str, i32); 4] = [
    ("broadcaster", 4),
    ("moderator", 3),
    ("vip", 2),
    ("subscriber", 1),
];

/// Authority of a user with no recognised badge.
pub const NO_AUTHORITY: i32 = -1;

/// Minimum tiers a command can require (ordered for comparison).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Role {
    Subscriber,
    Vip,
    Moderator,
    Broadcaster,
}

impl Role {
    /// Badge name this tier corresponds to.
    pub fn badge(self) -> &'static str {
        match self {
            Self::Subscriber => "subscriber",
            Self::Vip => "vip",
            Self::Moderator => "moderator",
            Self::Broadcaster => "broadcaster",
        }
    }

    fn default_authority(self) -> i32 {
        DEFAULT_AUTHORITIES
            .iter()
            .find(|(badge, _)| *badge == self.badge())
            .map_or(NO_AUTHORITY, |(_, level)| *level)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.badge())
    }
}

#[derive(Debug, Clone)]
pub struct PermissionTable {
    authorities: HashMap<String, i32>,
    admins: HashSet<String>,
}

impl Default for PermissionTable {
    fn default() -> Self {
        Self::new(
            DEFAULT_AUTHORITIES
                .iter()
                .map(|(badge, level)| ((*badge).to_owned(), *level))
                .collect(),
            Vec::new(),
        )
    }
}

impl PermissionTable {
    pub fn new(authorities: HashMap<String, i32>, admins: impl IntoIterator<Item = String>) -> Self {
        Self {
            authorities,
            admins: admins.into_iter().map(|a| a.to_lowercase()).collect(),
        }
    }

    pub fn is_admin(&self, identity: &str) -> bool {
        self.admins.contains(&identity.to_lowercase())
    }

    /// Highest authority across `badges`; [`NO_AUTHORITY`] if none is known.
    pub fn authority(&self, badges: &Badges) -> i32 {
        badges
            .keys()
            .map(|badge| self.authorities.get(badge).copied().unwrap_or(NO_AUTHORITY))
            .max()
            .unwrap_or(NO_AUTHORITY)
    }

    /// Authority needed to satisfy `minimum`.
    pub fn required(&self, minimum: Role) -> i32 {
        self.authorities
            .get(minimum.badge())
            .copied()
            .unwrap_or_else(|| minimum.default_authority())
    }

    pub fn has_permission(&self, identity: &str, badges: &Badges, minimum: Role) -> bool {
        self.is_admin(identity) || self.authority(badges) >= self.required(minimum)
    }
}
