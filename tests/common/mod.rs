//! Test doubles for the external tools a build drives.
//!
//! `FakeDisk` stores image contents in directories it owns; the image file
//! itself is a small JSON descriptor pointing at that directory. Attaching
//! copies the contents into the mount point and detaching copies them back,
//! so a build observes the same lifecycle it would with `hdiutil`.

#![allow(dead_code)]

use kodegen_bundler_dmg::bundler::{
    Error, ExecContext, FinderAttributes, LayoutWriter, Result, VolumeLayout,
    platform::macos::dmg::{
        AttachedImage, ConvertRequest, CreateRequest, DiskImageTool, LAYOUT_FILE,
    },
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use walkdir::WalkDir;

/// Contents of a fake image file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageRecord {
    pub backing: PathBuf,
    pub title: String,
    pub format: String,
    pub level: Option<u8>,
    pub size_mb: Option<u64>,
}

impl ImageRecord {
    pub fn read(image: &Path) -> ImageRecord {
        serde_json::from_slice(&fs::read(image).unwrap()).unwrap()
    }
}

#[derive(Debug, Default)]
pub struct FakeDisk {
    store: PathBuf,
    pub fail_attach: AtomicBool,
    pub fail_convert: AtomicBool,
    /// Number of non-forced detaches that fail before they start working.
    pub failing_detaches: AtomicUsize,
    /// Non-forced detaches never complete.
    pub hang_detach: AtomicBool,
    ops: Mutex<Vec<String>>,
    attached: Mutex<HashMap<PathBuf, PathBuf>>,
    mount_points: Mutex<Vec<PathBuf>>,
}

impl FakeDisk {
    /// Images are backed by directories under `store`.
    pub fn new(store: &Path) -> Self {
        fs::create_dir_all(store).unwrap();
        Self {
            store: store.to_path_buf(),
            ..Default::default()
        }
    }

    pub fn ops(&self) -> Vec<String> {
        self.ops.lock().unwrap().clone()
    }

    pub fn attached_count(&self) -> usize {
        self.attached.lock().unwrap().len()
    }

    /// Every mount point handed to `attach`.
    pub fn mount_points(&self) -> Vec<PathBuf> {
        self.mount_points.lock().unwrap().clone()
    }

    fn record(&self, op: String) {
        self.ops.lock().unwrap().push(op);
    }

    fn new_backing(&self) -> PathBuf {
        let dir = self.store.join(uuid::Uuid::new_v4().simple().to_string());
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn unmount(&self, mount_point: &Path) -> Result<()> {
        let image = self
            .attached
            .lock()
            .unwrap()
            .remove(mount_point)
            .ok_or_else(|| Error::Cleanup(format!("{} is not mounted", mount_point.display())))?;
        let record = ImageRecord::read(&image);
        fs::remove_dir_all(&record.backing)?;
        fs::create_dir_all(&record.backing)?;
        copy_contents(mount_point, &record.backing);
        clear_dir(mount_point);
        Ok(())
    }
}

impl DiskImageTool for FakeDisk {
    async fn create(&self, request: &CreateRequest<'_>, _ctx: &ExecContext) -> Result<()> {
        self.record(format!("create {}", request.format));
        let backing = self.new_backing();
        copy_contents(request.source, &backing);
        write_record(
            request.output,
            &ImageRecord {
                backing,
                title: request.title.to_string(),
                format: request.format.to_string(),
                level: None,
                size_mb: request.size_mb,
            },
        );
        Ok(())
    }

    async fn attach(&self, image: &Path, mount_point: &Path, _ctx: &ExecContext) -> Result<()> {
        self.record("attach".to_string());
        self.mount_points.lock().unwrap().push(mount_point.to_path_buf());
        if self.fail_attach.load(Ordering::SeqCst) {
            return Err(Error::ToolFailed {
                command: "hdiutil attach".into(),
                status: "exit status: 1".into(),
                output: "hdiutil: attach failed - Resource busy".into(),
            });
        }
        let record = ImageRecord::read(image);
        copy_contents(&record.backing, mount_point);
        self.attached
            .lock()
            .unwrap()
            .insert(mount_point.to_path_buf(), image.to_path_buf());
        Ok(())
    }

    async fn detach(&self, mount_point: &Path, force: bool, _ctx: &ExecContext) -> Result<()> {
        self.record(if force { "detach -force" } else { "detach" }.to_string());
        if !force && self.hang_detach.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if !force {
            let remaining = self.failing_detaches.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failing_detaches.store(remaining - 1, Ordering::SeqCst);
                return Err(Error::ToolFailed {
                    command: "hdiutil detach".into(),
                    status: "exit status: 16".into(),
                    output: "hdiutil: couldn't unmount - Resource busy".into(),
                });
            }
        }
        self.unmount(mount_point)
    }

    async fn convert(&self, request: &ConvertRequest<'_>, _ctx: &ExecContext) -> Result<()> {
        let level = request.level.map(|l| l.get());
        self.record(match level {
            Some(level) => format!("convert {} {}", request.format, level),
            None => format!("convert {}", request.format),
        });
        if self.fail_convert.load(Ordering::SeqCst) {
            return Err(Error::ToolFailed {
                command: "hdiutil convert".into(),
                status: "exit status: 1".into(),
                output: "hdiutil: convert failed".into(),
            });
        }
        let source = ImageRecord::read(request.source);
        let backing = self.new_backing();
        copy_contents(&source.backing, &backing);
        write_record(
            request.output,
            &ImageRecord {
                backing,
                format: request.format.to_string(),
                level,
                ..source
            },
        );
        Ok(())
    }

    async fn attached_images(&self, _ctx: &ExecContext) -> Result<Vec<AttachedImage>> {
        Ok(self
            .attached
            .lock()
            .unwrap()
            .iter()
            .map(|(mount_point, image)| AttachedImage {
                image_path: image.clone(),
                mount_points: vec![mount_point.clone()],
            })
            .collect())
    }

    fn detach_blocking(&self, mount_point: &Path) -> Result<()> {
        self.record("detach_blocking".to_string());
        self.unmount(mount_point)
    }
}

/// Records every Finder attribute change.
#[derive(Debug, Default)]
pub struct FakeAttributes {
    calls: Mutex<Vec<String>>,
}

impl FakeAttributes {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, op: &str, path: &Path) {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.calls.lock().unwrap().push(format!("{op} {name}"));
    }
}

impl FinderAttributes for FakeAttributes {
    async fn set_custom_icon(&self, path: &Path, _ctx: &ExecContext) -> Result<()> {
        self.record("custom-icon", path);
        Ok(())
    }

    async fn set_invisible(&self, path: &Path, _ctx: &ExecContext) -> Result<()> {
        self.record("invisible", path);
        Ok(())
    }

    async fn set_icon_creator(&self, path: &Path, _ctx: &ExecContext) -> Result<()> {
        self.record("icon-creator", path);
        Ok(())
    }

    async fn embed_file_icon(
        &self,
        icon: &Path,
        target: &Path,
        _work_dir: &Path,
        _ctx: &ExecContext,
    ) -> Result<()> {
        assert!(icon.is_file(), "file icon must exist when embedded");
        self.record("file-icon", target);
        Ok(())
    }
}

/// Writes the layout as JSON where Finder would write `.DS_Store`.
#[derive(Debug, Default)]
pub struct RecordingLayout {
    pub warning: Option<String>,
}

impl LayoutWriter for RecordingLayout {
    async fn write_layout(
        &self,
        root: &Path,
        layout: &VolumeLayout,
        _ctx: &ExecContext,
    ) -> Result<Option<String>> {
        fs::write(root.join(LAYOUT_FILE), serde_json::to_vec_pretty(layout).unwrap())?;
        Ok(self.warning.clone())
    }
}

pub fn read_layout(root: &Path) -> serde_json::Value {
    serde_json::from_slice(&fs::read(root.join(LAYOUT_FILE)).unwrap()).unwrap()
}

/// Minimal `.app` bundle with an executable and an Info.plist.
pub fn make_app(dir: &Path, name: &str) -> PathBuf {
    let app = dir.join(format!("{name}.app"));
    fs::create_dir_all(app.join("Contents/MacOS")).unwrap();
    fs::create_dir_all(app.join("Contents/Resources")).unwrap();
    fs::write(app.join("Contents/MacOS").join(name), b"#!/bin/sh\necho hi\n").unwrap();
    fs::write(
        app.join("Contents/Info.plist"),
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<plist version="1.0"><dict><key>CFBundleName</key><string>{name}</string></dict></plist>"#
        ),
    )
    .unwrap();
    app
}

/// Names directly inside `dir`, sorted.
pub fn list_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

fn write_record(path: &Path, record: &ImageRecord) {
    fs::write(path, serde_json::to_vec(record).unwrap()).unwrap();
}

/// Copies the contents of `from` into `to`, recreating symlinks.
pub fn copy_contents(from: &Path, to: &Path) {
    fs::create_dir_all(to).unwrap();
    for entry in WalkDir::new(from).min_depth(1).follow_links(false) {
        let entry = entry.unwrap();
        let dest = to.join(entry.path().strip_prefix(from).unwrap());
        let file_type = entry.file_type();
        if file_type.is_symlink() {
            let target = fs::read_link(entry.path()).unwrap();
            std::os::unix::fs::symlink(target, &dest).unwrap();
        } else if file_type.is_dir() {
            fs::create_dir_all(&dest).unwrap();
        } else {
            fs::copy(entry.path(), &dest).unwrap();
        }
    }
}

fn clear_dir(dir: &Path) {
    for entry in fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        let meta = fs::symlink_metadata(&path).unwrap();
        if meta.is_dir() {
            fs::remove_dir_all(&path).unwrap();
        } else {
            fs::remove_file(&path).unwrap();
        }
    }
}
