//! Local file-system operations

use crate::host::{command::args, CommandRunner, FileSystem, HostError};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

const PROC_MOUNTS: &str = "/proc/mounts";

/// File-system collaborator for the local machine
///
/// Ownership, mounts and group membership go through the system tools so
/// that user and group names resolve the same way they do for the operator.
pub struct LocalFileSystem {
    commands: Arc<dyn CommandRunner>,
}

impl LocalFileSystem {
    pub fn new(commands: Arc<dyn CommandRunner>) -> Self {
        Self { commands }
    }

    async fn chown(
        &self,
        path: &Path,
        owner: &str,
        group: &str,
        recursive: bool,
    ) -> Result<(), HostError> {
        let owner_group = format!("{}:{}", owner, group);
        let path = path.to_string_lossy().into_owned();
        let argv = if recursive {
            vec!["-R".to_string(), owner_group, path]
        } else {
            vec![owner_group, path]
        };
        self.commands.output("chown", &argv).await?;
        Ok(())
    }

    async fn set_mode(path: &Path, mode: u32) -> Result<(), HostError> {
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
            .await
            .map_err(|e| HostError::io(path, e))
    }
}

/// Parse the contents of `/proc/mounts` into (mount point, device) pairs
pub fn parse_mounts(content: &str) -> Vec<(PathBuf, String)> {
    content
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let device = fields.next()?;
            let mount_point = fields.next()?;
            Some((PathBuf::from(unescape_mount_field(mount_point)), device.to_string()))
        })
        .collect()
}

/// Mount points encode spaces and tabs as octal escapes (`\040`)
fn unescape_mount_field(field: &str) -> String {
    field
        .replace("\\040", " ")
        .replace("\\011", "\t")
        .replace("\\012", "\n")
        .replace("\\134", "\\")
}

#[async_trait]
impl FileSystem for LocalFileSystem {
    async fn mkdir(
        &self,
        path: &Path,
        owner: &str,
        group: &str,
        mode: u32,
    ) -> Result<(), HostError> {
        tokio::fs::create_dir_all(path)
            .await
            .map_err(|e| HostError::io(path, e))?;
        self.chown(path, owner, group, false).await?;
        Self::set_mode(path, mode).await
    }

    async fn write_file(
        &self,
        path: &Path,
        content: &str,
        owner: &str,
        group: &str,
        mode: u32,
    ) -> Result<(), HostError> {
        debug!("Writing {} ({} bytes)", path.display(), content.len());
        tokio::fs::write(path, content)
            .await
            .map_err(|e| HostError::io(path, e))?;
        self.chown(path, owner, group, false).await?;
        Self::set_mode(path, mode).await
    }

    async fn mount(&self, device: &str, path: &Path, fs_type: &str) -> bool {
        let mount_point = path.to_string_lossy();
        let argv = args(&["-t", fs_type, device, mount_point.as_ref()]);
        match self.commands.output("mount", &argv).await {
            Ok(_) => true,
            Err(e) => {
                debug!("Mounting {} at {} failed: {}", device, path.display(), e);
                false
            }
        }
    }

    async fn unmount(&self, path: &Path) -> Result<(), HostError> {
        let argv = vec![path.to_string_lossy().into_owned()];
        self.commands.output("umount", &argv).await?;
        Ok(())
    }

    async fn list_mounts(&self) -> Result<Vec<(PathBuf, String)>, HostError> {
        let path = Path::new(PROC_MOUNTS);
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| HostError::io(path, e))?;
        Ok(parse_mounts(&content))
    }

    async fn symlink(&self, src: &Path, dst: &Path) -> Result<(), HostError> {
        match tokio::fs::symlink_metadata(dst).await {
            Ok(meta) if meta.file_type().is_symlink() => {
                tokio::fs::remove_file(dst)
                    .await
                    .map_err(|e| HostError::io(dst, e))?;
            }
            Ok(meta) if meta.is_dir() => {
                debug!("{} is a real directory, leaving it in place", dst.display());
                return Ok(());
            }
            Ok(_) => {
                tokio::fs::remove_file(dst)
                    .await
                    .map_err(|e| HostError::io(dst, e))?;
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(HostError::io(dst, e)),
        }

        tokio::fs::symlink(src, dst)
            .await
            .map_err(|e| HostError::io(dst, e))
    }

    async fn copy(&self, src: &Path, dst: &Path) -> Result<(), HostError> {
        let target = if tokio::fs::metadata(dst).await.map(|m| m.is_dir()).unwrap_or(false) {
            match src.file_name() {
                Some(name) => dst.join(name),
                None => return Err(HostError::Filesystem(format!("cannot copy {}", src.display()))),
            }
        } else {
            dst.to_path_buf()
        };

        tokio::fs::copy(src, &target)
            .await
            .map_err(|e| HostError::io(src, e))?;
        Ok(())
    }

    async fn remove_tree(&self, path: &Path) -> Result<(), HostError> {
        match tokio::fs::remove_dir_all(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(HostError::io(path, e)),
        }
    }

    async fn remove_file(&self, path: &Path) -> Result<(), HostError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(HostError::io(path, e)),
        }
    }

    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }

    async fn chown_recursive(
        &self,
        path: &Path,
        owner: &str,
        group: &str,
    ) -> Result<(), HostError> {
        self.chown(path, owner, group, true).await
    }

    async fn add_user_to_group(&self, user: &str, group: &str) -> Result<(), HostError> {
        self.commands.output("gpasswd", &args(&["-a", user, group])).await?;
        Ok(())
    }
}
