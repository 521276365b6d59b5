//! Ownership and mode of the webhook's unix domain socket.

use std::fs;
use std::io::ErrorKind;
use std::os::unix::fs::{FileTypeExt, PermissionsExt};
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use nix::unistd::{Group, User};

use crate::config::SocketPermissions;

/// Resolve a user name through the system user database, falling back to
/// reading it as a numeric uid.
fn resolve_user(owner: &str) -> Result<u32> {
    let user = User::from_name(owner).with_context(|| format!("failed to look up user `{owner}`"))?;
    match user {
        Some(user) => Ok(user.uid.as_raw()),
        None => {
            owner.parse().map_err(|_| anyhow!("invalid user name or id `{owner}` for webhook socket"))
        }
    }
}

fn resolve_group(group: &str) -> Result<u32> {
    let entry =
        Group::from_name(group).with_context(|| format!("failed to look up group `{group}`"))?;
    match entry {
        Some(entry) => Ok(entry.gid.as_raw()),
        None => {
            group.parse().map_err(|_| anyhow!("invalid group name or id `{group}` for webhook socket"))
        }
    }
}

/// Remove a socket left at `path` by an earlier run.
///
/// # Errors
/// Returns an error when `path` holds something other than a socket or
/// cannot be inspected or removed.
pub fn remove_stale_socket(path: &Path) -> Result<()> {
    match fs::symlink_metadata(path) {
        Ok(metadata) if metadata.file_type().is_socket() => fs::remove_file(path)
            .with_context(|| format!("failed to remove stale socket {}", path.display())),
        Ok(_) => bail!("refusing to replace non-socket file {} with webhook socket", path.display()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => {
            Err(err).with_context(|| format!("failed to inspect webhook socket path {}", path.display()))
        }
    }
}

/// Apply owner, group and mode to the socket at `path`.
///
/// # Errors
/// Returns an error when a name cannot be resolved or the file cannot be
/// changed.
pub fn apply_permissions(path: &Path, permissions: &SocketPermissions) -> Result<()> {
    if permissions.owner.is_some() || permissions.group.is_some() {
        let uid = permissions.owner.as_deref().map(resolve_user).transpose()?;
        let gid = permissions.group.as_deref().map(resolve_group).transpose()?;

        std::os::unix::fs::chown(path, uid, gid).with_context(|| {
            format!("failed to set owner/group for webhook socket {}", path.display())
        })?;
        tracing::debug!(
            address = %path.display(),
            owner = permissions.owner.as_deref().unwrap_or_default(),
            group = permissions.group.as_deref().unwrap_or_default(),
            uid = ?uid,
            gid = ?gid,
            "set owner/group for webhook socket"
        );
    }

    if let Some(mode) = permissions.mode {
        fs::set_permissions(path, fs::Permissions::from_mode(mode)).with_context(|| {
            format!("failed to set file mode {mode:o} for webhook socket {}", path.display())
        })?;
        tracing::debug!(address = %path.display(), mode = %format!("{mode:o}"), "set file mode for webhook socket");
    }

    Ok(())
}
