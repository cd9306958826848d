//! Scoped attach of a writable image.
//!
//! [`with_mounted`] attaches an image at a fresh mount point, runs a
//! customization callback against it and always detaches afterwards,
//! whether the callback succeeded, failed or panicked. A failed detach is
//! retried once as a forced detach of every mount of the same image.

use super::hdiutil::DiskImageTool;
use crate::bundler::{
    error::{ErrorExt, Result},
    utils::ExecContext,
};
use futures_lite::FutureExt;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};

/// An image bound to a mount point for the duration of a callback.
#[derive(Debug)]
pub struct MountedVolume {
    image: PathBuf,
    mount_point: PathBuf,
}

impl MountedVolume {
    pub fn image(&self) -> &Path {
        &self.image
    }

    /// Root of the mounted volume.
    pub fn mount_point(&self) -> &Path {
        &self.mount_point
    }
}

/// Releases the mount exactly once.
///
/// The async [`release`](MountGuard::release) path is the normal one. If the
/// guard is dropped unreleased (the enclosing future was dropped mid-await)
/// a blocking forced detach runs from `Drop` instead.
struct MountGuard<'a, D: DiskImageTool> {
    tool: &'a D,
    image: PathBuf,
    mount_point: PathBuf,
    released: bool,
}

impl<D: DiskImageTool> MountGuard<'_, D> {
    async fn release(mut self, ctx: &ExecContext) {
        let cleanup = ctx.for_cleanup();
        if let Err(e) = self.tool.detach(&self.mount_point, false, &cleanup).await {
            log::warn!("Failed to detach {}: {}", self.mount_point.display(), e);
            let recovered = force_detach_image(self.tool, &self.image, &cleanup).await;
            log::info!(
                "Forced detach of {} released {} mount(s)",
                self.image.display(),
                recovered
            );
        }
        // Dropped before this point, the blocking detach in `Drop` still runs.
        self.released = true;
        remove_mount_dir(&self.mount_point);
    }
}

impl<D: DiskImageTool> Drop for MountGuard<'_, D> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        log::warn!(
            "Mount of {} abandoned, forcing detach",
            self.image.display()
        );
        if let Err(e) = self.tool.detach_blocking(&self.mount_point) {
            log::warn!("{}", e);
        }
        remove_mount_dir(&self.mount_point);
    }
}

/// Attaches `image`, runs `customize` against the mounted volume and
/// detaches.
///
/// An attach failure is returned before `customize` runs. Once attached,
/// the volume is released on every exit path and the callback's own result
/// (or panic) is what the caller sees; detach problems are only logged.
/// Callers must not mount the same image concurrently.
pub async fn with_mounted<D, T, F>(
    tool: &D,
    ctx: &ExecContext,
    image: &Path,
    customize: F,
) -> Result<T>
where
    D: DiskImageTool,
    F: AsyncFnOnce(&MountedVolume) -> Result<T>,
{
    let mount_point = create_mount_dir()?;

    if let Err(e) = tool.attach(image, &mount_point, ctx).await {
        remove_mount_dir(&mount_point);
        return Err(e);
    }

    let guard = MountGuard {
        tool,
        image: image.to_path_buf(),
        mount_point: mount_point.clone(),
        released: false,
    };
    let volume = MountedVolume {
        image: image.to_path_buf(),
        mount_point,
    };

    let outcome = AssertUnwindSafe(customize(&volume)).catch_unwind().await;
    guard.release(ctx).await;

    match outcome {
        Ok(result) => result,
        Err(panic) => std::panic::resume_unwind(panic),
    }
}

/// Force-detaches every mount of `image` the tool reports.
///
/// Matches by full path or file name. Failures are logged; the return value
/// is the number of mount points successfully detached.
pub async fn force_detach_image<D: DiskImageTool>(
    tool: &D,
    image: &Path,
    ctx: &ExecContext,
) -> usize {
    let attached = match tool.attached_images(ctx).await {
        Ok(attached) => attached,
        Err(e) => {
            log::warn!("Could not list attached images: {}", e);
            return 0;
        }
    };

    let mut detached = 0;
    for mount_point in attached
        .iter()
        .filter(|candidate| candidate.matches(image))
        .flat_map(|candidate| candidate.mount_points.iter())
    {
        match tool.detach(mount_point, true, ctx).await {
            Ok(()) => detached += 1,
            Err(e) => log::warn!("Forced detach of {} failed: {}", mount_point.display(), e),
        }
    }
    detached
}

fn create_mount_dir() -> Result<PathBuf> {
    let dir = tempfile::Builder::new()
        .prefix("dmg-mount-")
        .tempdir()
        .fs_context("creating mount point", std::env::temp_dir())?;
    Ok(dir.keep())
}

/// Removes the mount point only if it is empty, so a volume that is still
/// attached is never wiped.
fn remove_mount_dir(path: &Path) {
    match std::fs::remove_dir(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("Failed to remove mount point {}: {}", path.display(), e),
    }
}
