mod common;

use common::{list_names, make_app};
use kodegen_bundler_dmg::bundler::{
    ContentItem, ItemKind, StagingStrategy,
    platform::macos::dmg::{BACKGROUND_DIR, stage, stage_items},
};
use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

struct Sources {
    app: PathBuf,
    docs: PathBuf,
    readme: PathBuf,
    background: PathBuf,
}

fn sources(dir: &Path) -> Sources {
    let app = make_app(dir, "MyApp");
    fs::write(app.join("Contents/.DS_Store"), b"finder junk").unwrap();
    fs::write(app.join("Contents/Resources/build.log"), b"log").unwrap();
    fs::create_dir_all(app.join("Contents/__MACOSX")).unwrap();
    fs::write(app.join("Contents/__MACOSX/._Info.plist"), b"fork").unwrap();

    let docs = dir.join("docs");
    fs::create_dir_all(&docs).unwrap();
    fs::write(docs.join("guide.txt"), b"guide").unwrap();
    fs::write(docs.join("notes.log"), b"kept outside bundles").unwrap();

    let readme = dir.join("README");
    fs::write(&readme, b"readme").unwrap();

    let background = dir.join("bg.png");
    fs::write(&background, b"png").unwrap();

    Sources {
        app,
        docs,
        readme,
        background,
    }
}

fn items(src: &Sources) -> Vec<ContentItem> {
    vec![
        ContentItem::new(ItemKind::Dir, &src.app, 0, 0),
        ContentItem::new(ItemKind::Dir, &src.docs, 0, 0),
        ContentItem::new(ItemKind::File, &src.readme, 0, 0),
        ContentItem::new(ItemKind::Link, "/Applications", 0, 0),
    ]
}

#[test]
fn one_entry_per_item_for_every_strategy() {
    for strategy in StagingStrategy::ALL {
        let tmp = tempfile::tempdir().unwrap();
        let src = sources(&tmp.path().join("src"));
        let root = tmp.path().join("staging");

        let staged = stage_items(&items(&src), Some(&src.background), strategy, &root).unwrap();

        assert_eq!(
            list_names(&root),
            vec![".background", "Applications", "MyApp.app", "README", "docs"],
            "{strategy}"
        );
        assert_eq!(staged.entries.len(), 4);
        assert_eq!(
            fs::read_link(root.join("Applications")).unwrap(),
            PathBuf::from("/Applications")
        );

        // Background is always an independent regular file.
        let background = staged.background.unwrap();
        assert_eq!(background, root.join(BACKGROUND_DIR).join("background.png"));
        let meta = fs::symlink_metadata(&background).unwrap();
        assert!(meta.file_type().is_file(), "{strategy}");
        assert_eq!(meta.nlink(), 1, "{strategy}");
    }
}

#[test]
fn copy_filters_only_inside_app_bundles() {
    let tmp = tempfile::tempdir().unwrap();
    let src = sources(&tmp.path().join("src"));
    let root = tmp.path().join("staging");

    stage_items(&items(&src), None, StagingStrategy::Copy, &root).unwrap();

    let app = root.join("MyApp.app/Contents");
    assert!(app.join("Info.plist").is_file());
    assert!(!app.join(".DS_Store").exists());
    assert!(!app.join("__MACOSX").exists());
    assert!(!app.join("Resources/build.log").exists());
    assert!(root.join("docs/notes.log").is_file());
    assert!(!root.join(BACKGROUND_DIR).exists());
}

#[test]
fn hard_link_shares_inodes() {
    let tmp = tempfile::tempdir().unwrap();
    let src = sources(&tmp.path().join("src"));
    let root = tmp.path().join("staging");

    stage_items(&items(&src), None, StagingStrategy::HardLink, &root).unwrap();

    let original = fs::metadata(&src.readme).unwrap();
    let staged = fs::metadata(root.join("README")).unwrap();
    assert_eq!(original.ino(), staged.ino());

    let plist = src.app.join("Contents/Info.plist");
    assert_eq!(
        fs::metadata(&plist).unwrap().ino(),
        fs::metadata(root.join("MyApp.app/Contents/Info.plist"))
            .unwrap()
            .ino()
    );
}

#[test]
fn safe_hard_link_copies_bundles() {
    let tmp = tempfile::tempdir().unwrap();
    let src = sources(&tmp.path().join("src"));
    let root = tmp.path().join("staging");

    stage_items(&items(&src), None, StagingStrategy::SafeHardLink, &root).unwrap();

    let plist = src.app.join("Contents/Info.plist");
    assert_ne!(
        fs::metadata(&plist).unwrap().ino(),
        fs::metadata(root.join("MyApp.app/Contents/Info.plist"))
            .unwrap()
            .ino()
    );
    assert!(!root.join("MyApp.app/Contents/.DS_Store").exists());
}

#[test]
fn symlink_strategy_links_every_item() {
    let tmp = tempfile::tempdir().unwrap();
    let src = sources(&tmp.path().join("src"));
    let root = tmp.path().join("staging");

    stage_items(&items(&src), None, StagingStrategy::Symlink, &root).unwrap();

    assert_eq!(fs::read_link(root.join("MyApp.app")).unwrap(), src.app);
    assert_eq!(fs::read_link(root.join("README")).unwrap(), src.readme);
}

#[test]
fn duplicate_base_names_are_kept_apart_by_validation() {
    let tmp = tempfile::tempdir().unwrap();
    let src = sources(&tmp.path().join("src"));
    let other = tmp.path().join("other/README");
    fs::create_dir_all(other.parent().unwrap()).unwrap();
    fs::write(&other, b"second").unwrap();

    let config = kodegen_bundler_dmg::bundler::BuildConfigBuilder::new()
        .title("Dup")
        .item(ItemKind::File, &src.readme, 0, 0)
        .item(ItemKind::File, &other, 0, 0)
        .build();
    assert!(config.is_err());
}

#[tokio::test]
async fn async_staging_runs_off_the_runtime() {
    let tmp = tempfile::tempdir().unwrap();
    let src = sources(&tmp.path().join("src"));
    let root = tmp.path().join("staging");

    let staged = stage(
        items(&src),
        Some(src.background.clone()),
        StagingStrategy::Copy,
        root.clone(),
    )
    .await
    .unwrap();
    assert_eq!(staged.root, root);
    assert!(root.join(".background/background.png").is_file());
}
