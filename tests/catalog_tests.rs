use std::fs;
use std::path::Path;

use chrono::{DateTime, TimeZone, Utc};
use gitbup_core::{BackupMetadata, BundleCatalog, BundleIdentity, BundleTier, Error};
use tempfile::tempdir;

const PREFIX: &str = "repo";

fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 7, 19, h, m, s).unwrap()
}

/// Write the bundle file and its metadata sidecar.
fn write_bundle(bundle: &BundleIdentity) -> anyhow::Result<()> {
    fs::write(bundle.bundle_path(), b"# v2 git bundle\n")?;
    bundle.save_metadata(&BackupMetadata::new([bundle.id()], ["root"]))?;
    Ok(())
}

fn names_in(dir: &Path) -> anyhow::Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        names.push(entry?.file_name().to_string_lossy().into_owned());
    }
    names.sort();
    Ok(names)
}

#[test]
fn open_builds_three_tier_chain() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let root = BundleIdentity::new_root(dir.path(), PREFIX, at(1, 0, 0))?;
    let sibling = root.derive(at(1, 30, 0))?;
    let t1 = root.derive(at(2, 0, 0))?;
    let t2 = t1.derive(at(3, 0, 0))?;
    for b in [&root, &sibling, &t1, &t2] {
        write_bundle(b)?;
    }
    fs::write(dir.path().join("notes.txt"), "unrelated")?;

    let catalog = BundleCatalog::open(dir.path(), PREFIX)?;
    assert_eq!(catalog.len(), 4);
    assert_eq!(catalog.latest(), Some(&t2));

    let chain = catalog.chain();
    assert_eq!(chain.depth(), 3);
    assert_eq!(chain.tiers(), &[root.clone(), t1.clone(), t2.clone()]);
    assert!(!chain.is_tier_less());
    for (i, link) in chain.tiers().iter().enumerate() {
        assert_eq!(link.tier(), BundleTier::Tiered(i as u8));
        if i > 0 {
            assert!(link.is_referencing(&chain.tiers()[i - 1]));
        }
    }
    assert!(chain.contains(&root));
    assert!(chain.contains(&t1));
    assert!(chain.contains(&t2));
    assert!(!chain.contains(&sibling));
    Ok(())
}

#[test]
fn empty_folder_gives_empty_chain() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let catalog = BundleCatalog::open(dir.path(), PREFIX)?;
    assert!(catalog.is_empty());
    assert!(catalog.chain().is_empty());
    assert_eq!(catalog.latest(), None);
    Ok(())
}

#[test]
fn discover_ignores_foreign_files_and_is_idempotent() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let mine = BundleIdentity::new_root(dir.path(), PREFIX, at(1, 0, 0))?;
    let other = BundleIdentity::new_root(dir.path(), "other", at(2, 0, 0))?;
    // shares a leading segment with PREFIX, must not match
    let dotted = BundleIdentity::new_root(dir.path(), "repo.backup", at(3, 0, 0))?;
    for b in [&mine, &other, &dotted] {
        write_bundle(b)?;
    }
    fs::write(dir.path().join("repo.garbage.bundle"), "")?;
    fs::create_dir(dir.path().join("repo.20230719-040000.-.t0.bundle"))?;

    let mut catalog = BundleCatalog::open(dir.path(), PREFIX)?;
    assert_eq!(catalog.bundles().collect::<Vec<_>>(), vec![&mine]);
    assert!(catalog.discover()?.is_empty());
    assert_eq!(catalog.len(), 1);

    let next = mine.derive(at(5, 0, 0))?;
    write_bundle(&next)?;
    assert_eq!(catalog.discover()?, vec![next.clone()]);
    assert_eq!(catalog.chain().top(), Some(&next));
    Ok(())
}

#[test]
fn add_requires_files_and_rejects_duplicates() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let mut catalog = BundleCatalog::open(dir.path(), PREFIX)?;

    let root = catalog.next_bundle_at(0, at(1, 0, 0))?;
    assert!(!catalog.add(root.clone())?);
    fs::write(root.bundle_path(), b"")?;
    // metadata still missing
    assert!(!catalog.add(root.clone())?);
    write_bundle(&root)?;
    assert!(catalog.add(root.clone())?);
    assert!(!catalog.add(root.clone())?);
    assert_eq!(catalog.chain().tiers(), &[root.clone()]);

    let elsewhere = tempdir()?;
    let foreign = BundleIdentity::new_root(elsewhere.path(), PREFIX, at(2, 0, 0))?;
    write_bundle(&foreign)?;
    assert!(!catalog.add(foreign)?);

    let other_prefix = BundleIdentity::new_root(dir.path(), "other", at(2, 0, 0))?;
    write_bundle(&other_prefix)?;
    assert!(!catalog.add(other_prefix)?);
    assert_eq!(catalog.len(), 1);
    Ok(())
}

#[test]
fn next_bundle_clamps_tier_to_chain_depth() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let mut catalog = BundleCatalog::open(dir.path(), PREFIX)?;

    let root = catalog.next_bundle_at(3, at(1, 0, 0))?;
    assert_eq!(root.tier(), BundleTier::Tiered(0));
    assert!(root.is_root());
    write_bundle(&root)?;
    assert!(catalog.add(root.clone())?);

    let t1 = catalog.next_bundle_at(5, at(2, 0, 0))?;
    assert_eq!(t1.tier(), BundleTier::Tiered(1));
    assert_eq!(t1.reference_id(), Some(root.id()));
    write_bundle(&t1)?;
    assert!(catalog.add(t1.clone())?);

    // a lower tier replaces the upper part of the chain
    let again = catalog.next_bundle_at(1, at(3, 0, 0))?;
    assert_eq!(again.tier(), BundleTier::Tiered(1));
    assert_eq!(again.reference_id(), Some(root.id()));

    let full = catalog.next_bundle_at(0, at(3, 0, 0))?;
    assert!(full.is_root());

    assert!(matches!(
        catalog.next_bundle_at(10, at(3, 0, 0)),
        Err(Error::Format(_))
    ));
    // same second as the chain top
    assert!(matches!(
        catalog.next_bundle_at(2, at(2, 0, 0)),
        Err(Error::Format(_))
    ));
    Ok(())
}

#[test]
fn discard_refuses_active_chain_members() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let root = BundleIdentity::new_root(dir.path(), PREFIX, at(1, 0, 0))?;
    let t1 = root.derive(at(2, 0, 0))?;
    write_bundle(&root)?;
    write_bundle(&t1)?;
    let mut catalog = BundleCatalog::open(dir.path(), PREFIX)?;
    let before = names_in(dir.path())?;

    for b in [&root, &t1] {
        match catalog.discard(b) {
            Err(Error::ActiveChain(name)) => assert_eq!(name, b.bundle_file_name()),
            other => panic!("expected ActiveChain, got {other:?}"),
        }
    }
    assert_eq!(catalog.len(), 2);
    assert_eq!(catalog.chain().depth(), 2);
    assert_eq!(names_in(dir.path())?, before);

    assert_eq!(catalog.discard_by_id("20991231-235959")?, None);
    Ok(())
}

#[test]
fn discard_unused_soft_deletes_side_branches() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let root = BundleIdentity::new_root(dir.path(), PREFIX, at(1, 0, 0))?;
    let old_t1 = root.derive(at(1, 30, 0))?;
    let old_t2 = old_t1.derive(at(1, 45, 0))?;
    let t1 = root.derive(at(2, 0, 0))?;
    for b in [&root, &old_t1, &old_t2, &t1] {
        write_bundle(b)?;
    }
    let mut catalog = BundleCatalog::open(dir.path(), PREFIX)?;
    assert_eq!(catalog.chain().tiers(), &[root.clone(), t1.clone()]);

    let discarded = catalog.discard_unused()?;
    assert_eq!(discarded, vec![old_t1.clone(), old_t2.clone()]);
    assert_eq!(catalog.len(), 2);
    assert_eq!(catalog.chain().tiers(), &[root.clone(), t1.clone()]);

    for b in [&old_t1, &old_t2] {
        assert!(!b.bundle_path().exists());
        assert!(dir.path().join(format!("{}.bak", b.bundle_file_name())).is_file());
        assert!(dir.path().join(format!("{}.bak", b.meta_file_name())).is_file());
    }
    assert!(root.exists() && t1.exists());
    Ok(())
}

#[test]
fn discarding_twice_replaces_stale_copy() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let root = BundleIdentity::new_root(dir.path(), PREFIX, at(1, 0, 0))?;
    let side = root.derive(at(1, 30, 0))?;
    let t1 = root.derive(at(2, 0, 0))?;
    for b in [&root, &side, &t1] {
        write_bundle(b)?;
    }
    let mut catalog = BundleCatalog::open(dir.path(), PREFIX)?;
    assert_eq!(catalog.discard(&side)?, Some(side.clone()));

    write_bundle(&side)?;
    assert_eq!(catalog.discover()?, vec![side.clone()]);
    assert_eq!(catalog.discard(&side)?, Some(side.clone()));

    let stale: Vec<_> = names_in(dir.path())?
        .into_iter()
        .filter(|n| n.ends_with(".bak"))
        .collect();
    assert_eq!(stale.len(), 2);
    Ok(())
}

#[test]
fn purge_keeps_newest_stale_bundle_per_tier() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let root = BundleIdentity::new_root(dir.path(), PREFIX, at(1, 0, 0))?;
    let s1 = root.derive(at(1, 10, 0))?;
    let s2 = root.derive(at(1, 20, 0))?;
    let s3 = root.derive(at(1, 30, 0))?;
    let old_root = BundleIdentity::new_root(dir.path(), PREFIX, at(0, 30, 0))?;
    let t1 = root.derive(at(2, 0, 0))?;
    for b in [&old_root, &root, &s1, &s2, &s3, &t1] {
        write_bundle(b)?;
    }
    // stale file of another prefix stays untouched
    let foreign = BundleIdentity::new_root(dir.path(), "other", at(0, 10, 0))?;
    fs::write(dir.path().join(format!("{}.bak", foreign.bundle_file_name())), "")?;

    let mut catalog = BundleCatalog::open(dir.path(), PREFIX)?;
    assert_eq!(catalog.discard_unused()?.len(), 4);

    let mut purged = catalog.purge()?;
    purged.sort();
    let mut expected: Vec<_> = [&s1, &s2]
        .iter()
        .flat_map(|b| {
            [
                dir.path().join(format!("{}.bak", b.bundle_file_name())),
                dir.path().join(format!("{}.bak", b.meta_file_name())),
            ]
        })
        .collect();
    expected.sort();
    assert_eq!(purged, expected);

    let remaining: Vec<_> = names_in(dir.path())?
        .into_iter()
        .filter(|n| n.ends_with(".bundle.bak"))
        .collect();
    let mut wanted = vec![
        format!("{}.bak", old_root.bundle_file_name()),
        format!("{}.bak", s3.bundle_file_name()),
        format!("{}.bak", foreign.bundle_file_name()),
    ];
    wanted.sort();
    assert_eq!(remaining, wanted);

    assert!(catalog.purge()?.is_empty());
    Ok(())
}

#[test]
fn purge_groups_tier_less_stale_bundles() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let a = BundleIdentity::new_tier_less_root(dir.path(), PREFIX, at(1, 0, 0))?;
    let b = BundleIdentity::new_tier_less_root(dir.path(), PREFIX, at(2, 0, 0))?;
    let c = BundleIdentity::new_tier_less_root(dir.path(), PREFIX, at(3, 0, 0))?;
    for x in [&a, &b, &c] {
        write_bundle(x)?;
    }
    let mut catalog = BundleCatalog::open(dir.path(), PREFIX)?;
    assert_eq!(catalog.chain().tiers(), &[c.clone()]);
    assert_eq!(catalog.discard_unused()?, vec![a.clone(), b.clone()]);

    let purged = catalog.purge()?;
    assert_eq!(purged.len(), 2);
    assert!(purged.iter().all(|p| p
        .to_string_lossy()
        .contains(a.id())));
    Ok(())
}

#[test]
fn missing_reference_breaks_the_chain() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let root = BundleIdentity::new_root(dir.path(), PREFIX, at(1, 0, 0))?;
    let t1 = root.derive(at(2, 0, 0))?;
    // root is never written
    write_bundle(&t1)?;

    match BundleCatalog::open(dir.path(), PREFIX) {
        Err(Error::BrokenChain { bundle, reference }) => {
            assert_eq!(bundle, t1.bundle_file_name());
            assert_eq!(reference, root.id());
        }
        other => panic!("expected BrokenChain, got {other:?}"),
    }
    Ok(())
}

#[test]
fn tier_gap_is_inconsistent() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let root = BundleIdentity::new_root(dir.path(), PREFIX, at(1, 0, 0))?;
    let t2 = BundleIdentity::new(
        dir.path(),
        PREFIX,
        BundleTier::Tiered(2),
        "20230719-020000",
        Some(root.id().to_string()),
    )?;
    write_bundle(&root)?;
    write_bundle(&t2)?;

    assert!(matches!(
        BundleCatalog::open(dir.path(), PREFIX),
        Err(Error::InconsistentChain { .. })
    ));
    Ok(())
}

#[test]
fn failed_add_leaves_catalog_unchanged() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let root = BundleIdentity::new_root(dir.path(), PREFIX, at(1, 0, 0))?;
    write_bundle(&root)?;
    let mut catalog = BundleCatalog::open(dir.path(), PREFIX)?;

    let dangling = BundleIdentity::new(
        dir.path(),
        PREFIX,
        BundleTier::Tiered(1),
        "20230719-030000",
        Some("20230719-020000".to_string()),
    )?;
    write_bundle(&dangling)?;
    assert!(matches!(
        catalog.add(dangling.clone()),
        Err(Error::BrokenChain { .. })
    ));
    assert_eq!(catalog.len(), 1);
    assert_eq!(catalog.find(dangling.id()), None);
    assert_eq!(catalog.chain().tiers(), &[root.clone()]);

    // same outcome through discovery
    assert!(catalog.discover().is_err());
    assert_eq!(catalog.len(), 1);
    assert_eq!(catalog.chain().tiers(), &[root]);
    Ok(())
}

#[test]
fn tier_less_chain_grows_at_the_top() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let first = BundleIdentity::new_tier_less_root(dir.path(), PREFIX, at(1, 0, 0))?;
    let second = first.derive(at(2, 0, 0))?;
    let third = second.derive(at(3, 0, 0))?;
    for b in [&first, &second, &third] {
        write_bundle(b)?;
    }
    let catalog = BundleCatalog::open(dir.path(), PREFIX)?;
    let chain = catalog.chain();
    assert!(chain.is_tier_less());
    assert_eq!(chain.tiers(), &[first.clone(), second.clone(), third.clone()]);
    assert!(chain.contains(&second));

    let next = catalog.next_bundle_at(4, at(4, 0, 0))?;
    assert_eq!(next.tier(), BundleTier::TierLess);
    assert_eq!(next.reference_id(), Some(third.id()));

    let restart = catalog.next_bundle_at(0, at(4, 0, 0))?;
    assert_eq!(restart.tier(), BundleTier::TierLess);
    assert!(restart.is_root());
    Ok(())
}

#[test]
fn mixed_tier_kinds_are_inconsistent() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let root = BundleIdentity::new_root(dir.path(), PREFIX, at(1, 0, 0))?;
    let tier_less = BundleIdentity::new(
        dir.path(),
        PREFIX,
        BundleTier::TierLess,
        "20230719-020000",
        Some(root.id().to_string()),
    )?;
    write_bundle(&root)?;
    write_bundle(&tier_less)?;
    assert!(matches!(
        BundleCatalog::open(dir.path(), PREFIX),
        Err(Error::InconsistentChain { .. })
    ));
    Ok(())
}

#[test]
fn metadata_sidecar_round_trips() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let bundle = BundleIdentity::new_root(dir.path(), PREFIX, at(1, 0, 0))?;
    let mut meta = BackupMetadata::new(["aaa", "bbb"], ["000"]);
    meta.commit_count = 12;
    bundle.save_metadata(&meta)?;
    assert_eq!(bundle.read_metadata()?, meta);

    let text = fs::read_to_string(bundle.meta_path())?;
    assert!(text.contains("\"git-bundle-tips\""));
    assert!(text.contains("\"git-repo-roots\""));
    assert!(!text.contains("missing-count"));
    Ok(())
}

#[test]
fn add_accepts_bundle_built_from_relative_folder() -> anyhow::Result<()> {
    // created under the current directory so that a relative path reaches it
    let dir = tempfile::tempdir_in(".")?;
    let relative = Path::new(".").join(dir.path().file_name().expect("temp dir name"));
    assert!(relative.is_relative());

    let mut catalog = BundleCatalog::open(&relative, PREFIX)?;
    let bundle = BundleIdentity::new_root(&relative, PREFIX, at(1, 0, 0))?;
    assert!(bundle.folder().is_absolute());
    assert_eq!(bundle.folder(), catalog.folder());

    write_bundle(&bundle)?;
    assert!(catalog.add(bundle.clone())?);
    assert!(catalog.discover()?.is_empty());
    assert_eq!(catalog.chain().tiers(), &[bundle]);
    Ok(())
}

#[test]
fn failed_discard_keeps_files_and_catalog_in_step() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let root = BundleIdentity::new_root(dir.path(), PREFIX, at(1, 0, 0))?;
    let side = root.derive(at(1, 30, 0))?;
    let t1 = root.derive(at(2, 0, 0))?;
    for b in [&root, &side, &t1] {
        write_bundle(b)?;
    }
    let mut catalog = BundleCatalog::open(dir.path(), PREFIX)?;

    // a directory where the stale metadata file would go cannot be replaced
    let blocked = dir.path().join(format!("{}.bak", side.meta_file_name()));
    fs::create_dir(&blocked)?;
    fs::write(blocked.join("keep"), "x")?;

    match catalog.discard(&side) {
        Err(Error::Io { path, .. }) => assert_eq!(path, side.meta_path()),
        other => panic!("expected Io error, got {other:?}"),
    }
    assert_eq!(catalog.find(side.id()), Some(&side));
    assert!(side.exists());
    assert!(!dir.path().join(format!("{}.bak", side.bundle_file_name())).exists());

    fs::remove_dir_all(&blocked)?;
    assert_eq!(catalog.discard(&side)?, Some(side.clone()));
    assert!(!side.bundle_path().exists());
    assert!(!side.meta_path().exists());
    Ok(())
}
