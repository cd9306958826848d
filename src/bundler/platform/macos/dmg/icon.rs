//! Custom icons: Finder attribute flags, resource-fork file icons and
//! `.icns` preparation.

use crate::bundler::{
    error::{Context, Error, ErrorExt, Result},
    utils::{ExecContext, run_tool},
};
use image::imageops::FilterType;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

/// Reserved file at a volume root holding the volume icon.
pub const VOLUME_ICON_FILE: &str = ".VolumeIcon.icns";

/// Edge lengths written into generated `.icns` files.
const ICNS_SIZES: &[u32] = &[16, 32, 128, 256, 512];

/// Finder metadata operations on files and volumes.
#[allow(async_fn_in_trait)]
pub trait FinderAttributes {
    /// Flags `path` (a file or a volume root) as having a custom icon.
    async fn set_custom_icon(&self, path: &Path, ctx: &ExecContext) -> Result<()>;

    /// Hides `path` from Finder.
    async fn set_invisible(&self, path: &Path, ctx: &ExecContext) -> Result<()>;

    /// Sets the `icnC` creator code on a volume icon file.
    async fn set_icon_creator(&self, path: &Path, ctx: &ExecContext) -> Result<()>;

    /// Appends `icon` as the icon resource of `target` and flags it.
    ///
    /// `work_dir` receives intermediate files.
    async fn embed_file_icon(
        &self,
        icon: &Path,
        target: &Path,
        work_dir: &Path,
        ctx: &ExecContext,
    ) -> Result<()>;
}

/// [`FinderAttributes`] using the Xcode command line tools
/// (`SetFile`, `sips`, `DeRez`, `Rez`).
#[derive(Debug, Clone, Default)]
pub struct MacAttributes;

impl FinderAttributes for MacAttributes {
    async fn set_custom_icon(&self, path: &Path, ctx: &ExecContext) -> Result<()> {
        run_tool(ctx, "SetFile", [OsStr::new("-a"), OsStr::new("C"), path.as_os_str()]).await?;
        Ok(())
    }

    async fn set_invisible(&self, path: &Path, ctx: &ExecContext) -> Result<()> {
        run_tool(ctx, "SetFile", [OsStr::new("-a"), OsStr::new("V"), path.as_os_str()]).await?;
        Ok(())
    }

    async fn set_icon_creator(&self, path: &Path, ctx: &ExecContext) -> Result<()> {
        run_tool(ctx, "SetFile", [OsStr::new("-c"), OsStr::new("icnC"), path.as_os_str()]).await?;
        Ok(())
    }

    async fn embed_file_icon(
        &self,
        icon: &Path,
        target: &Path,
        work_dir: &Path,
        ctx: &ExecContext,
    ) -> Result<()> {
        let scratch = tempfile::Builder::new()
            .prefix("file-icon-")
            .tempdir_in(work_dir)
            .fs_context("creating icon scratch directory", work_dir)?;
        let icon_copy = scratch.path().join("icon.icns");
        let rsrc = scratch.path().join("icns.rsrc");

        tokio::fs::copy(icon, &icon_copy)
            .await
            .fs_context("copying icon", icon)?;

        // sips gives the icon file an icon resource of itself, DeRez dumps it.
        run_tool(ctx, "sips", [OsStr::new("-i"), icon_copy.as_os_str()]).await?;
        let resource = run_tool(
            ctx,
            "DeRez",
            [OsStr::new("-only"), OsStr::new("icns"), icon_copy.as_os_str()],
        )
        .await?;
        if resource.stdout.iter().all(u8::is_ascii_whitespace) {
            crate::bail!("DeRez found no icns resource in {}", icon.display());
        }
        tokio::fs::write(&rsrc, &resource.stdout)
            .await
            .fs_context("writing icon resource", &rsrc)?;

        run_tool(
            ctx,
            "Rez",
            [
                OsStr::new("-append"),
                rsrc.as_os_str(),
                OsStr::new("-o"),
                target.as_os_str(),
            ],
        )
        .await?;
        self.set_custom_icon(target, ctx).await
    }
}

/// Returns an `.icns` for `icon`, converting PNG input into `work_dir`.
pub fn prepare_icon(icon: &Path, work_dir: &Path) -> Result<PathBuf> {
    if !icon.is_file() {
        return Err(Error::MissingSource(icon.to_path_buf()));
    }
    let is_png = icon
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("png"));
    if !is_png {
        return Ok(icon.to_path_buf());
    }

    let stem = icon
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "icon".into());
    let output = work_dir.join(format!("{stem}.icns"));
    png_to_icns(icon, &output).with_context(|| format!("converting {} to icns", icon.display()))?;
    Ok(output)
}

fn png_to_icns(png: &Path, output: &Path) -> Result<()> {
    let source = image::open(png)?;
    let mut family = icns::IconFamily::new();
    for &size in ICNS_SIZES {
        let rgba = source.resize_exact(size, size, FilterType::Lanczos3).to_rgba8();
        let image = icns::Image::from_data(icns::PixelFormat::RGBA, size, size, rgba.into_raw())
            .fs_context("encoding icon image", png)?;
        family
            .add_icon(&image)
            .fs_context("adding icon to family", png)?;
    }

    let file = std::fs::File::create(output).fs_context("creating icns file", output)?;
    family
        .write(std::io::BufWriter::new(file))
        .fs_context("writing icns file", output)?;
    log::debug!("Converted {} to {}", png.display(), output.display());
    Ok(())
}

/// The bundle's own icon, from `CFBundleIconFile` in its `Info.plist`.
pub fn app_icon(app: &Path) -> Option<PathBuf> {
    let info = app.join("Contents").join("Info.plist");
    let value = plist::Value::from_file(&info)
        .map_err(|e| log::debug!("No readable {}: {}", info.display(), e))
        .ok()?;
    let name = value
        .as_dictionary()?
        .get("CFBundleIconFile")?
        .as_string()?;

    let mut file = PathBuf::from(name);
    if file.extension().is_none() {
        file.set_extension("icns");
    }
    let path = app.join("Contents").join("Resources").join(file);
    path.is_file().then_some(path)
}
