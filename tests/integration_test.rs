use std::fs;
use std::io::Read;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use simlevel::{
    assess, ContentHasher, DirectoryTree, Fingerprint, LevelDefinition, LevelSet, MemoryTree,
    MismatchReason, Sha256Hasher, SimError,
};

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

const RUNSCRIPT: &str = "#!/bin/sh\nexec /usr/bin/python3 \"$@\"\n";
const ENVIRONMENT: &str = "export PATH=/usr/local/bin:/usr/bin:/bin\n";

/// Write a small extracted image.
///
/// Structure:
/// ```
/// root/
///   singularity
///   environment
///   etc/
///     hosts
///     resolv.conf
///   usr/bin/
///     python3
/// ```
fn write_image(root: &Path, resolv: &str, environment: &str) {
    fs::create_dir_all(root.join("etc")).unwrap();
    fs::create_dir_all(root.join("usr/bin")).unwrap();
    fs::write(root.join("singularity"), RUNSCRIPT).unwrap();
    fs::write(root.join("environment"), environment).unwrap();
    fs::write(root.join("etc/hosts"), "127.0.0.1 localhost\n").unwrap();
    fs::write(root.join("etc/resolv.conf"), resolv).unwrap();
    fs::write(root.join("usr/bin/python3"), vec![0x7f, b'E', b'L', b'F', 2, 1, 1]).unwrap();
}

fn image(resolv: &str, environment: &str) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    write_image(dir.path(), resolv, environment);
    dir
}

fn memory_image() -> MemoryTree {
    MemoryTree::new()
        .dir("/etc")
        .dir("/usr")
        .dir("/usr/bin")
        .file("/singularity", RUNSCRIPT)
        .file("/environment", ENVIRONMENT)
        .file("/etc/hosts", "127.0.0.1 localhost\n")
        .file("/etc/resolv.conf", "nameserver 10.0.0.1\n")
        .file("/usr/bin/python3", "ELF")
}

/// Counts calls, then delegates to SHA-256.
#[derive(Clone, Default)]
struct CountingHasher(Arc<AtomicUsize>);

impl ContentHasher for CountingHasher {
    fn fingerprint(&self, reader: &mut dyn Read) -> std::io::Result<Fingerprint> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Sha256Hasher::default().fingerprint(reader)
    }
}

fn level(name: &str, regexp: Option<&str>, skip: &[&str], assess: &[&str]) -> LevelDefinition {
    LevelDefinition::new(name, regexp, skip.iter().copied(), assess.iter().copied()).unwrap()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn tree_against_itself_satisfies_every_level() {
    let dir = image("nameserver 10.0.0.1\n", ENVIRONMENT);
    let report = assess()
        .left(DirectoryTree::new(dir.path()).unwrap())
        .right(DirectoryTree::new(dir.path()).unwrap())
        .run()
        .unwrap();

    assert_eq!(report.levels.len(), 5);
    assert!(report.levels.iter().all(|r| r.satisfied), "{:?}", report.levels);
    assert_eq!(report.best_match().unwrap().level_name, "IDENTICAL");
    assert_eq!(report.overlap.files.information_coefficient(), 1.0);
}

#[test]
fn vacuous_level_is_always_satisfied() {
    let levels = LevelSet::from_json_str(r#"{"NOTHING": {"regexp": ""}, "NEVER": {"regexp": "$^"}}"#)
        .unwrap();
    let left = memory_image();
    let right = MemoryTree::new().file("/completely/different", "x");

    let report = assess().levels(levels).left(left).right(right).run().unwrap();

    assert!(report.is_satisfied("NOTHING"));
    assert!(report.is_satisfied("NEVER"));
}

#[test]
fn skipped_path_never_reported() {
    let levels = LevelSet::from_levels(vec![
        level("ALL", None, &["/etc/resolv.conf"], &[]).with_hash_content(true),
        level("BOTH", None, &["/etc/resolv.conf"], &["/etc/resolv.conf"]),
    ])
    .unwrap();
    let left = memory_image();
    let right = memory_image().file("/etc/resolv.conf", "nameserver 8.8.8.8\n");

    let report = assess().levels(levels).left(left).right(right).run().unwrap();

    for result in &report.levels {
        assert!(result.satisfied, "{} should hold", result.level_name);
        assert!(!result.mismatched_paths().contains(&"/etc/resolv.conf"));
    }
}

#[test]
fn assessed_content_is_compared_despite_pattern() {
    let levels = LevelSet::from_levels(vec![level("USR_ONLY", Some("^/usr/"), &[], &["/environment"])])
        .unwrap();
    let left = memory_image();
    let right = memory_image().file("/environment", "export PATH=/opt/bin\n");

    let report = assess().levels(levels).left(left).right(right).run().unwrap();

    let result = report.level("USR_ONLY").unwrap();
    assert_eq!(result.mismatched_paths(), ["/environment"]);
    assert_eq!(result.mismatches[0].reason, MismatchReason::ContentDiffers);
}

#[test]
fn presence_mismatch_skips_hashing() {
    let counter = CountingHasher::default();
    let levels = LevelSet::from_levels(vec![level("RUNSCRIPT", Some("$^"), &[], &["/singularity"])])
        .unwrap();
    let left = memory_image();
    let right = MemoryTree::new().file("/environment", ENVIRONMENT);

    let report = assess()
        .levels(levels)
        .hasher(counter.clone())
        .left(left)
        .right(right)
        .run()
        .unwrap();

    let result = report.level("RUNSCRIPT").unwrap();
    assert_eq!(result.mismatches[0].reason, MismatchReason::OnlyInLeft);
    assert_eq!(counter.0.load(Ordering::SeqCst), 0);
    assert_eq!(report.stats.fingerprints, 0);
}

#[test]
fn resolv_conf_breaks_identical_but_not_replicate() {
    let a = image("nameserver 10.0.0.1\n", ENVIRONMENT);
    let b = image("nameserver 8.8.8.8\n", ENVIRONMENT);

    let report = assess()
        .left(DirectoryTree::new(a.path()).unwrap())
        .right(DirectoryTree::new(b.path()).unwrap())
        .threads(4)
        .run()
        .unwrap();

    let identical = report.level("IDENTICAL").unwrap();
    assert!(!identical.satisfied);
    assert_eq!(identical.mismatched_paths(), ["/etc/resolv.conf"]);
    assert!(report.is_satisfied("REPLICATE"));
    assert_eq!(report.best_match().unwrap().level_name, "REPLICATE");
}

#[test]
fn environment_change_keeps_runscript() {
    let a = image("nameserver 10.0.0.1\n", ENVIRONMENT);
    let b = image("nameserver 10.0.0.1\n", "export PATH=/opt/conda/bin\n");

    let report = assess()
        .left(DirectoryTree::new(a.path()).unwrap())
        .right(DirectoryTree::new(b.path()).unwrap())
        .run()
        .unwrap();

    assert!(report.is_satisfied("RUNSCRIPT"));
    let environment = report.level("ENVIRONMENT").unwrap();
    assert!(!environment.satisfied);
    assert_eq!(environment.mismatched_paths(), ["/environment"]);
    assert_eq!(
        report.satisfied().collect::<Vec<_>>(),
        ["RUNSCRIPT"],
        "IDENTICAL, REPLICATE and RECIPE all see the environment file"
    );
}

#[test]
fn recipe_ignores_unrelated_files() {
    let levels = LevelSet::from_json_str(
        r#"{
            "RECIPE": {
                "description": "same build recipe",
                "regexp": "$^",
                "assess_content": ["/.singularity.d/Singularity"]
            }
        }"#,
    )
    .unwrap();
    let recipe = "Bootstrap: docker\nFrom: ubuntu:16.04\n";
    let left = memory_image().file("/.singularity.d/Singularity", recipe);
    let right = memory_image()
        .file("/.singularity.d/Singularity", recipe)
        .file("/usr/bin/python3", "a different interpreter")
        .file("/opt/extra", "only here");

    let report = assess().levels(levels).left(left).right(right).run().unwrap();

    let result = report.level("RECIPE").unwrap();
    assert!(result.satisfied, "{:?}", result.mismatches);
}

#[test]
fn unreadable_required_file_is_a_mismatch() {
    let levels = LevelSet::from_levels(vec![
        level("RUNSCRIPT", Some("$^"), &[], &["/singularity"]),
        level("ENVIRONMENT", Some("$^"), &[], &["/environment"]),
    ])
    .unwrap();
    let left = memory_image().unreadable("/singularity");
    let right = memory_image();

    let report = assess().levels(levels).left(left).right(right).run().unwrap();

    let runscript = report.level("RUNSCRIPT").unwrap();
    assert!(matches!(
        runscript.mismatches[0].reason,
        MismatchReason::Unreadable(ref msg) if msg.contains("permission denied")
    ));
    assert!(report.is_satisfied("ENVIRONMENT"));
}

#[test]
fn metadata_does_not_matter() {
    let a = image("nameserver 10.0.0.1\n", ENVIRONMENT);
    std::thread::sleep(std::time::Duration::from_millis(20));
    let b = image("nameserver 10.0.0.1\n", ENVIRONMENT);

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(b.path().join("singularity"), fs::Permissions::from_mode(0o755)).unwrap();
    }

    let report = assess()
        .left(DirectoryTree::new(a.path()).unwrap())
        .right(DirectoryTree::new(b.path()).unwrap())
        .chunk_size(4)
        .run()
        .unwrap();

    assert!(report.is_satisfied("IDENTICAL"));
}

#[test]
fn missing_tree_is_fatal() {
    let err = assess().left(MemoryTree::new()).run().unwrap_err();
    assert!(matches!(err, SimError::MissingTree("right")));
}

#[test]
fn levels_load_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("levels.json");
    fs::write(
        &path,
        r#"{"REPLICATE": {"skip_files": ["/etc/hosts"], "hash_content": true}}"#,
    )
    .unwrap();

    let levels = LevelSet::from_path(&path).unwrap();
    let report = assess()
        .levels(levels)
        .left(memory_image())
        .right(memory_image().file("/etc/hosts", "::1 localhost\n"))
        .threads(1)
        .run()
        .unwrap();

    assert!(report.is_satisfied("REPLICATE"));
}

#[cfg(target_os = "linux")]
#[test]
fn link_targets_differing_in_raw_bytes_break_identical() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let a = image("nameserver 10.0.0.1\n", ENVIRONMENT);
    let b = image("nameserver 10.0.0.1\n", ENVIRONMENT);
    std::os::unix::fs::symlink(OsStr::from_bytes(b"/opt/x\xff"), a.path().join("link")).unwrap();
    std::os::unix::fs::symlink(OsStr::from_bytes(b"/opt/x\xfe"), b.path().join("link")).unwrap();

    let report = assess()
        .left(DirectoryTree::new(a.path()).unwrap())
        .right(DirectoryTree::new(b.path()).unwrap())
        .run()
        .unwrap();

    let identical = report.level("IDENTICAL").unwrap();
    assert_eq!(identical.mismatched_paths(), ["/link"]);
    assert_eq!(identical.mismatches[0].reason, MismatchReason::ContentDiffers);
}

#[cfg(target_os = "linux")]
#[test]
fn names_that_are_not_utf8_never_compare_equal() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let a = image("nameserver 10.0.0.1\n", ENVIRONMENT);
    let b = image("nameserver 10.0.0.1\n", ENVIRONMENT);
    fs::write(a.path().join(OsStr::from_bytes(b"f\xff")), "same").unwrap();
    fs::write(b.path().join(OsStr::from_bytes(b"f\xfe")), "same").unwrap();

    let levels = LevelSet::from_levels(vec![level("PRESENCE", None, &[], &[])]).unwrap();
    let report = assess()
        .levels(levels)
        .left(DirectoryTree::new(a.path()).unwrap())
        .right(DirectoryTree::new(b.path()).unwrap())
        .run()
        .unwrap();

    let result = report.level("PRESENCE").unwrap();
    assert!(!result.satisfied);
    assert!(result
        .mismatches
        .iter()
        .all(|m| matches!(m.reason, MismatchReason::Unreadable(_))));
    assert_eq!(report.errors.len(), 2);
}
