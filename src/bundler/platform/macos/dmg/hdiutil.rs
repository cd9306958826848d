//! The virtual-disk primitive: create, attach, detach and convert images.
//!
//! [`DiskImageTool`] is the seam between the build pipeline and the block
//! device layer. [`Hdiutil`] drives the native `hdiutil` binary; tests plug
//! in a directory-backed fake.

use crate::bundler::{
    error::{Error, Result},
    settings::{CompressionLevel, ImageFormat},
    utils::{ExecContext, run_tool},
};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;
use wait_timeout::ChildExt;

/// Parameters of `hdiutil create`.
#[derive(Debug, Clone, Copy)]
pub struct CreateRequest<'a> {
    /// Volume name.
    pub title: &'a str,
    /// Folder whose contents become the volume root.
    pub source: &'a Path,
    pub format: ImageFormat,
    pub output: &'a Path,
    /// Pre-declared capacity; `hdiutil` sizes to the source when absent.
    pub size_mb: Option<u64>,
}

/// Parameters of `hdiutil convert`.
#[derive(Debug, Clone, Copy)]
pub struct ConvertRequest<'a> {
    pub source: &'a Path,
    pub format: ImageFormat,
    pub output: &'a Path,
    pub level: Option<CompressionLevel>,
}

/// An image currently attached to the system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachedImage {
    pub image_path: PathBuf,
    pub mount_points: Vec<PathBuf>,
}

impl AttachedImage {
    /// True when this is `image`, by full path or by file name.
    pub fn matches(&self, image: &Path) -> bool {
        self.image_path == image
            || (self.image_path.file_name().is_some()
                && self.image_path.file_name() == image.file_name())
    }
}

/// Operations the build needs from the disk-image layer.
#[allow(async_fn_in_trait)]
pub trait DiskImageTool {
    async fn create(&self, request: &CreateRequest<'_>, ctx: &ExecContext) -> Result<()>;

    /// Binds `image` read-write at `mount_point`.
    async fn attach(&self, image: &Path, mount_point: &Path, ctx: &ExecContext) -> Result<()>;

    async fn detach(&self, mount_point: &Path, force: bool, ctx: &ExecContext) -> Result<()>;

    async fn convert(&self, request: &ConvertRequest<'_>, ctx: &ExecContext) -> Result<()>;

    /// Images attached right now, with their mount points.
    async fn attached_images(&self, ctx: &ExecContext) -> Result<Vec<AttachedImage>>;

    /// Last-resort synchronous forced detach, usable from `Drop`.
    fn detach_blocking(&self, mount_point: &Path) -> Result<()>;
}

/// [`DiskImageTool`] backed by the `hdiutil` command.
#[derive(Debug, Clone)]
pub struct Hdiutil {
    program: PathBuf,
    blocking_timeout: Duration,
}

impl Default for Hdiutil {
    fn default() -> Self {
        Self {
            program: PathBuf::from("hdiutil"),
            blocking_timeout: Duration::from_secs(30),
        }
    }
}

impl Hdiutil {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses a specific `hdiutil` binary.
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    fn program(&self) -> String {
        self.program.to_string_lossy().into_owned()
    }
}

impl DiskImageTool for Hdiutil {
    async fn create(&self, request: &CreateRequest<'_>, ctx: &ExecContext) -> Result<()> {
        log::info!(
            "Creating {} image {}",
            request.format,
            request.output.display()
        );
        run_tool(ctx, &self.program(), create_args(request)).await?;
        Ok(())
    }

    async fn attach(&self, image: &Path, mount_point: &Path, ctx: &ExecContext) -> Result<()> {
        log::debug!("Attaching {} at {}", image.display(), mount_point.display());
        run_tool(ctx, &self.program(), attach_args(image, mount_point)).await?;
        Ok(())
    }

    async fn detach(&self, mount_point: &Path, force: bool, ctx: &ExecContext) -> Result<()> {
        log::debug!("Detaching {} (force: {})", mount_point.display(), force);
        run_tool(ctx, &self.program(), detach_args(mount_point, force)).await?;
        Ok(())
    }

    async fn convert(&self, request: &ConvertRequest<'_>, ctx: &ExecContext) -> Result<()> {
        log::info!(
            "Converting {} to {}",
            request.source.display(),
            request.format
        );
        run_tool(ctx, &self.program(), convert_args(request)).await?;
        Ok(())
    }

    async fn attached_images(&self, ctx: &ExecContext) -> Result<Vec<AttachedImage>> {
        let output = run_tool(ctx, &self.program(), ["info", "-plist"]).await?;
        parse_info_plist(&output.stdout)
    }

    fn detach_blocking(&self, mount_point: &Path) -> Result<()> {
        let mut child = Command::new(&self.program)
            .args(detach_args(mount_point, true))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|error| Error::ToolSpawn {
                command: format!("{} detach {}", self.program(), mount_point.display()),
                error,
            })?;

        match child.wait_timeout(self.blocking_timeout)? {
            Some(status) if status.success() => Ok(()),
            Some(status) => Err(Error::Cleanup(format!(
                "forced detach of {} exited with {}",
                mount_point.display(),
                status
            ))),
            None => {
                let _ = child.kill();
                let _ = child.wait();
                Err(Error::Cleanup(format!(
                    "forced detach of {} timed out after {:?}",
                    mount_point.display(),
                    self.blocking_timeout
                )))
            }
        }
    }
}

fn create_args(request: &CreateRequest<'_>) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "create".into(),
        "-volname".into(),
        request.title.into(),
        "-srcfolder".into(),
        request.source.into(),
        "-ov".into(),
        "-format".into(),
        request.format.as_str().into(),
    ];
    if let Some(size) = request.size_mb {
        args.push("-size".into());
        args.push(format!("{size}m").into());
    }
    args.push(request.output.into());
    args
}

fn attach_args(image: &Path, mount_point: &Path) -> Vec<OsString> {
    vec![
        "attach".into(),
        image.into(),
        "-readwrite".into(),
        "-noverify".into(),
        "-noautoopen".into(),
        "-nobrowse".into(),
        "-mountpoint".into(),
        mount_point.into(),
    ]
}

fn detach_args(mount_point: &Path, force: bool) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["detach".into(), mount_point.into()];
    if force {
        args.push("-force".into());
    }
    args
}

fn convert_args(request: &ConvertRequest<'_>) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "convert".into(),
        request.source.into(),
        "-format".into(),
        request.format.as_str().into(),
        "-ov".into(),
        "-o".into(),
        request.output.into(),
    ];
    if let Some(level) = request.level {
        args.push("-imagekey".into());
        args.push(format!("zlib-level={level}").into());
    }
    args
}

/// Parses `hdiutil info -plist` into attached images.
pub fn parse_info_plist(bytes: &[u8]) -> Result<Vec<AttachedImage>> {
    let value = plist::Value::from_reader(std::io::Cursor::new(bytes))?;
    let images = value
        .as_dictionary()
        .and_then(|d| d.get("images"))
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();

    let attached = images
        .iter()
        .filter_map(|image| image.as_dictionary())
        .filter_map(|image| {
            let image_path = image.get("image-path")?.as_string()?;
            let mount_points = image
                .get("system-entities")
                .and_then(|v| v.as_array())
                .map(|entities| {
                    entities
                        .iter()
                        .filter_map(|e| e.as_dictionary()?.get("mount-point")?.as_string())
                        .map(PathBuf::from)
                        .collect()
                })
                .unwrap_or_default();
            Some(AttachedImage {
                image_path: PathBuf::from(image_path),
                mount_points,
            })
        })
        .collect();
    Ok(attached)
}
