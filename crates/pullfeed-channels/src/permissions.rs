//! Effective channel permissions from guild roles and channel overwrites.

use std::collections::HashMap;

use pullfeed_core::Permissions;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverwriteTarget {
    Role(u64),
    Member(u64),
}

/// One channel permission overwrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Overwrite {
    pub target: OverwriteTarget,
    pub allow: u64,
    pub deny: u64,
}

/// Guild-level bits: `@everyone` (role id = guild id) plus the member's roles.
pub fn base_permissions(guild_id: u64, member_roles: &[u64], roles: &HashMap<u64, u64>) -> u64 {
    let everyone = roles.get(&guild_id).copied().unwrap_or(0);
    member_roles
        .iter()
        .filter_map(|id| roles.get(id))
        .fold(everyone, |acc, bits| acc | bits)
}

/// Apply overwrites in platform order: `@everyone`, then all member roles
/// combined, then the member itself. Administrators bypass overwrites.
pub fn channel_permissions(
    guild_id: u64,
    member_id: u64,
    member_roles: &[u64],
    roles: &HashMap<u64, u64>,
    overwrites: &[Overwrite],
) -> Permissions {
    let base = base_permissions(guild_id, member_roles, roles);
    if base & Permissions::ADMINISTRATOR != 0 {
        return Permissions(Permissions::ALL);
    }

    let mut perms = base;
    if let Some(ow) = overwrites
        .iter()
        .find(|o| o.target == OverwriteTarget::Role(guild_id))
    {
        perms = (perms & !ow.deny) | ow.allow;
    }

    let (mut allow, mut deny) = (0u64, 0u64);
    for ow in overwrites {
        if let OverwriteTarget::Role(id) = ow.target
            && id != guild_id
            && member_roles.contains(&id)
        {
            allow |= ow.allow;
            deny |= ow.deny;
        }
    }
    perms = (perms & !deny) | allow;

    if let Some(ow) = overwrites
        .iter()
        .find(|o| o.target == OverwriteTarget::Member(member_id))
    {
        perms = (perms & !ow.deny) | ow.allow;
    }

    Permissions(perms)
}
