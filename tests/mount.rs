mod common;

use common::{FakeDisk, list_names};
use futures_lite::FutureExt;
use kodegen_bundler_dmg::bundler::{
    Error, ExecContext, ImageFormat, MountedVolume,
    platform::macos::dmg::{CreateRequest, DiskImageTool, force_detach_image, with_mounted},
};
use std::fs;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::time::Duration;

async fn writable_image(disk: &FakeDisk, dir: &Path) -> PathBuf {
    let source = dir.join("source");
    fs::create_dir_all(&source).unwrap();
    fs::write(source.join("payload.txt"), b"payload").unwrap();
    let image = dir.join("scratch.dmg");
    disk.create(
        &CreateRequest {
            title: "Scratch",
            source: &source,
            format: ImageFormat::Udrw,
            output: &image,
            size_mb: Some(100),
        },
        &ExecContext::new(),
    )
    .await
    .unwrap();
    image
}

fn assert_released(disk: &FakeDisk) {
    assert_eq!(disk.attached_count(), 0);
    let mount_points = disk.mount_points();
    assert!(!mount_points.is_empty());
    for mount_point in mount_points {
        assert!(!mount_point.exists(), "{} left behind", mount_point.display());
    }
}

#[tokio::test]
async fn changes_persist_after_detach() {
    let tmp = tempfile::tempdir().unwrap();
    let disk = FakeDisk::new(&tmp.path().join("store"));
    let image = writable_image(&disk, tmp.path()).await;
    let ctx = ExecContext::new();

    let names = with_mounted(&disk, &ctx, &image, async |volume: &MountedVolume| {
        fs::write(volume.mount_point().join("added.txt"), b"added")?;
        Ok(list_names(volume.mount_point()))
    })
    .await
    .unwrap();
    assert_eq!(names, vec!["added.txt", "payload.txt"]);
    assert_eq!(disk.ops(), vec!["create UDRW", "attach", "detach"]);
    assert_released(&disk);

    let root = common::ImageRecord::read(&image).backing;
    assert_eq!(fs::read(root.join("added.txt")).unwrap(), b"added");
}

#[tokio::test]
async fn detaches_after_callback_error() {
    let tmp = tempfile::tempdir().unwrap();
    let disk = FakeDisk::new(&tmp.path().join("store"));
    let image = writable_image(&disk, tmp.path()).await;

    let result: Result<(), Error> = with_mounted(
        &disk,
        &ExecContext::new(),
        &image,
        async |_: &MountedVolume| Err(Error::InvalidConfig("layout rejected".into())),
    )
    .await;

    assert!(result.unwrap_err().to_string().contains("layout rejected"));
    assert_released(&disk);
}

#[tokio::test]
async fn detaches_after_callback_panic() {
    let tmp = tempfile::tempdir().unwrap();
    let disk = FakeDisk::new(&tmp.path().join("store"));
    let image = writable_image(&disk, tmp.path()).await;
    let ctx = ExecContext::new();
    let crash = true;

    let outcome = AssertUnwindSafe(with_mounted(&disk, &ctx, &image, async |_: &MountedVolume| {
        if crash {
            panic!("customizer crashed");
        }
        Ok::<(), Error>(())
    }))
    .catch_unwind()
    .await;

    assert!(outcome.is_err());
    assert!(disk.ops().contains(&"detach".to_string()));
    assert_released(&disk);
}

#[tokio::test]
async fn failed_detach_is_forced_and_callback_error_wins() {
    let tmp = tempfile::tempdir().unwrap();
    let disk = FakeDisk::new(&tmp.path().join("store"));
    let image = writable_image(&disk, tmp.path()).await;
    disk.failing_detaches.store(1, Ordering::SeqCst);

    let result: Result<(), Error> = with_mounted(
        &disk,
        &ExecContext::new(),
        &image,
        async |_: &MountedVolume| Err(Error::InvalidConfig("background missing".into())),
    )
    .await;

    assert!(result.unwrap_err().to_string().contains("background missing"));
    assert_eq!(
        disk.ops(),
        vec!["create UDRW", "attach", "detach", "detach -force"]
    );
    assert_released(&disk);
}

#[tokio::test]
async fn release_runs_even_when_cancelled() {
    let tmp = tempfile::tempdir().unwrap();
    let disk = FakeDisk::new(&tmp.path().join("store"));
    let image = writable_image(&disk, tmp.path()).await;
    let ctx = ExecContext::new();

    let result: Result<(), Error> = with_mounted(&disk, &ctx, &image, async |_: &MountedVolume| {
        ctx.cancellation_token().cancel();
        Err(Error::Cancelled {
            command: "osascript".into(),
        })
    })
    .await;

    assert!(result.is_err());
    assert_released(&disk);
}

#[tokio::test]
async fn dropped_during_detach_falls_back_to_blocking_detach() {
    let tmp = tempfile::tempdir().unwrap();
    let disk = FakeDisk::new(&tmp.path().join("store"));
    let image = writable_image(&disk, tmp.path()).await;
    disk.hang_detach.store(true, Ordering::SeqCst);
    let ctx = ExecContext::new();

    let build = with_mounted(&disk, &ctx, &image, async |_: &MountedVolume| {
        Ok::<(), Error>(())
    });
    let outcome = tokio::time::timeout(Duration::from_millis(200), build).await;

    assert!(outcome.is_err());
    assert_eq!(
        disk.ops(),
        vec!["create UDRW", "attach", "detach", "detach_blocking"]
    );
    assert_released(&disk);
}

#[tokio::test]
async fn force_detach_matches_by_file_name() {
    let tmp = tempfile::tempdir().unwrap();
    let disk = FakeDisk::new(&tmp.path().join("store"));
    let image = writable_image(&disk, tmp.path()).await;
    let mount_point = tmp.path().join("mnt");
    fs::create_dir_all(&mount_point).unwrap();
    let ctx = ExecContext::new();
    disk.attach(&image, &mount_point, &ctx).await.unwrap();

    // Same file name, different directory: hdiutil may report a resolved path.
    let alias = Path::new("/private/var/folders/xx").join("scratch.dmg");
    assert_eq!(force_detach_image(&disk, &alias, &ctx).await, 1);
    assert_eq!(disk.attached_count(), 0);
    assert_eq!(force_detach_image(&disk, &image, &ctx).await, 0);
}
