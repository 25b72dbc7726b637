mod common;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use common::{noop, write_zip, PHOTOS_EXPORT};
use filetime::FileTime;
use takeout_scout_core::store::normalize_source_path;
use takeout_scout_core::{
    compare_against_index, find_sources, scan_batch, DiscoveryStore, ScanControl, ScanOptions,
};
use tempfile::TempDir;

fn key(path: &Path) -> String {
    normalize_source_path(path).to_string_lossy().into_owned()
}

#[test]
fn multipart_batch_rolls_up_into_one_group() {
    let work = TempDir::new().unwrap();
    let parts: Vec<PathBuf> = (1..=3)
        .map(|i| work.path().join(format!("export-00{i}.zip")))
        .collect();
    for part in &parts {
        write_zip(part, PHOTOS_EXPORT);
    }
    let backup = work.path().join("backup.zip");
    write_zip(&backup, &[("Takeout/Keep/note.html", b"<p>")]);
    let store = DiscoveryStore::open(work.path().join("store")).unwrap();

    let mut sources = parts.clone();
    sources.push(backup);
    let outcome = scan_batch(
        &sources,
        &ScanOptions::default(),
        &store,
        &ScanControl::default(),
        &noop,
    )
    .unwrap();

    assert_eq!(outcome.failures().count(), 0);
    assert_eq!(outcome.groups.len(), 2);
    let export = outcome.groups.iter().find(|g| g.group == "export").unwrap();
    assert_eq!(export.parts.len(), 3);
    assert_eq!(export.counts.photos, 9);
    assert_eq!(export.service_guess, "Google Photos");
    let backup_group = outcome.groups.iter().find(|g| g.group == "backup").unwrap();
    assert_eq!(backup_group.service_guess, "Keep");

    assert_eq!(outcome.changes.new.len(), 4);
    assert!(outcome.changes.missing.is_empty());
    assert!(outcome.deltas.is_empty());
    assert_eq!(store.index().unwrap().len(), 4);
}

#[test]
fn one_corrupt_source_does_not_stop_the_batch() {
    let work = TempDir::new().unwrap();
    let good = work.path().join("good.zip");
    let bad = work.path().join("bad.zip");
    write_zip(&good, PHOTOS_EXPORT);
    fs::write(&bad, b"garbage").unwrap();
    let store = DiscoveryStore::open(work.path().join("store")).unwrap();

    let outcome = scan_batch(
        &[bad.clone(), good.clone()],
        &ScanOptions::default(),
        &store,
        &ScanControl::default(),
        &noop,
    )
    .unwrap();

    assert!(outcome.results[0].is_err());
    assert!(outcome.results[1].is_ok());
    let failure = outcome.failures().next().unwrap();
    assert_eq!(failure.path, bad);
    assert!(store.load(&good).unwrap().is_some());
    assert!(store.load(&bad).unwrap().is_none());
}

#[test]
fn change_detection_uses_the_pre_batch_index() {
    let work = TempDir::new().unwrap();
    let [a, b, c] = ["a.zip", "b.zip", "c.zip"].map(|n| work.path().join(n));
    for path in [&a, &b, &c] {
        write_zip(path, PHOTOS_EXPORT);
    }
    let store = DiscoveryStore::open(work.path().join("store")).unwrap();
    let options = ScanOptions::default();
    let control = ScanControl::default();

    scan_batch(&[a.clone(), b.clone()], &options, &store, &control, &noop).unwrap();

    let preview = compare_against_index(&store, &[b.clone(), c.clone()]).unwrap();
    assert_eq!(preview.new.iter().cloned().collect::<Vec<_>>(), vec![key(&c)]);
    assert_eq!(preview.missing.iter().cloned().collect::<Vec<_>>(), vec![key(&a)]);

    let outcome = scan_batch(&[b.clone(), c.clone()], &options, &store, &control, &noop).unwrap();
    assert_eq!(outcome.changes, preview);
    assert_eq!(outcome.deltas.len(), 1);
    assert_eq!(outcome.deltas[0].path, key(&b));
    assert!(outcome.deltas[0].is_empty());

    // Missing sources are reported, never pruned.
    assert!(store.load(&a).unwrap().is_some());
}

#[test]
fn modified_source_is_reported_as_changed_with_a_delta() {
    let work = TempDir::new().unwrap();
    let source = work.path().join("export.zip");
    write_zip(&source, PHOTOS_EXPORT);
    let store = DiscoveryStore::open(work.path().join("store")).unwrap();
    let options = ScanOptions::default();
    let control = ScanControl::default();
    scan_batch(&[source.clone()], &options, &store, &control, &noop).unwrap();

    write_zip(&source, &PHOTOS_EXPORT[..4]);
    let later = SystemTime::now() + Duration::from_secs(3600);
    filetime::set_file_mtime(&source, FileTime::from_system_time(later)).unwrap();

    let outcome = scan_batch(&[source.clone()], &options, &store, &control, &noop).unwrap();
    assert!(outcome.changes.changed.contains(&key(&source)));
    let delta = &outcome.deltas[0];
    assert_eq!(delta.file_count, -3);
    assert_eq!(delta.photos, -1);
    assert_eq!(store.load(&source).unwrap().unwrap().scan_count, 2);
}

#[test]
fn found_sources_feed_a_batch() {
    let work = TempDir::new().unwrap();
    let root = work.path().join("downloads");
    fs::create_dir_all(root.join("Takeout/Google Drive")).unwrap();
    fs::write(root.join("Takeout/Google Drive/doc.pdf"), b"%PDF").unwrap();
    write_zip(&root.join("takeout-001.zip"), PHOTOS_EXPORT);

    // A folder holding an extracted export is itself a candidate.
    let sources = find_sources(&root).unwrap();
    assert_eq!(
        sources,
        vec![root.clone(), root.join("Takeout"), root.join("takeout-001.zip")]
    );

    let store = DiscoveryStore::open(work.path().join("store")).unwrap();
    let outcome = scan_batch(
        &sources,
        &ScanOptions::default(),
        &store,
        &ScanControl::default(),
        &noop,
    )
    .unwrap();
    let services: Vec<_> = outcome.reports().map(|r| r.summary.service_guess.as_str()).collect();
    assert_eq!(services, vec!["Google Drive", "Google Drive", "Google Photos"]);
}
