// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resolve a `user` config string (spec §6 `user`) to the uid/gid pair
//! `Worker::spawn` drops privileges to.

use nix::unistd::User;
use substrate_core::SpawnError;

/// Resolve a username or numeric uid string to `(uid, gid)`.
pub fn resolve(user: &str) -> Result<(u32, u32), SpawnError> {
    if let Ok(uid) = user.parse::<u32>() {
        return User::from_uid(uid.into())
            .map_err(|e| SpawnError::PrivilegeDropFailed { uid, message: e.to_string() })?
            .map(|u| (u.uid.as_raw(), u.gid.as_raw()))
            .ok_or(SpawnError::PrivilegeDropFailed {
                uid,
                message: "no such uid".to_string(),
            });
    }

    let resolved = User::from_name(user)
        .map_err(|e| SpawnError::PrivilegeDropFailed { uid: 0, message: e.to_string() })?
        .ok_or_else(|| SpawnError::PrivilegeDropFailed {
            uid: 0,
            message: format!("no such user {user:?}"),
        })?;
    Ok((resolved.uid.as_raw(), resolved.gid.as_raw()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_resolves_to_uid_zero() {
        let (uid, gid) = resolve("root").expect("root always exists");
        assert_eq!(uid, 0);
        assert_eq!(gid, 0);
    }

    #[test]
    fn numeric_uid_string_resolves_by_uid() {
        let (uid, _gid) = resolve("0").expect("uid 0 always exists");
        assert_eq!(uid, 0);
    }

    #[test]
    fn unknown_user_name_is_an_error() {
        let err = resolve("no-such-user-substrate-test").unwrap_err();
        assert!(matches!(err, SpawnError::PrivilegeDropFailed { .. }));
    }
}
