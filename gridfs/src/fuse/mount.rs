//! Mount helpers for starting and stopping a FUSE session.
//!
//! Only Linux is supported. Unprivileged mounts go through fusermount3, which
//! must be on PATH.

use std::path::Path;

use rfuse3::raw::MountHandle;
#[cfg(target_os = "linux")]
use rfuse3::{MountOptions, raw::Session};
#[cfg(target_os = "linux")]
use tracing::info;

use super::GridFuse;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MountSettings {
    /// Mount through fusermount3 instead of calling mount(2) directly.
    pub unprivileged: bool,
    /// Let users other than the mounting one access the tree.
    pub allow_other: bool,
}

#[cfg(target_os = "linux")]
fn mount_options(settings: &MountSettings) -> MountOptions {
    let mut mo = MountOptions::default();
    mo.fs_name("gridfs")
        .uid(unsafe { libc::getuid() })
        .gid(unsafe { libc::getgid() })
        .allow_other(settings.allow_other);
    mo
}

/// Mount `fs` on the empty directory `mount_point`. The returned handle
/// resolves when the session ends and unmounts on `unmount()`.
#[cfg(target_os = "linux")]
pub async fn mount_gridfs(
    fs: GridFuse,
    mount_point: impl AsRef<Path>,
    settings: &MountSettings,
) -> std::io::Result<MountHandle> {
    let mount_point = mount_point.as_ref();
    info!(
        mountpoint = %mount_point.display(),
        unprivileged = settings.unprivileged,
        allow_other = settings.allow_other,
        "mounting"
    );
    let session = Session::new(mount_options(settings));
    if settings.unprivileged {
        session.mount_with_unprivileged(fs, mount_point).await
    } else {
        session.mount(fs, mount_point).await
    }
}

#[cfg(not(target_os = "linux"))]
pub async fn mount_gridfs(
    _fs: GridFuse,
    _mount_point: impl AsRef<Path>,
    _settings: &MountSettings,
) -> std::io::Result<MountHandle> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "FUSE mount is only supported on Linux in this build",
    ))
}
