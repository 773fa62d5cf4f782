//! Path-level operations against the default registry.

use std::fs;
use std::path::Path;

use rvfs_fs::{CancelFunc, Filesystem, FsConfig, FsResult, ModuleInfo, NodeId};
use tracing::debug;

use crate::registry::default_registry;

/// Create a new filesystem at `path`. The backend is taken from the
/// `fs-type` config key, or the default type.
pub fn create(path: &Path, config: FsConfig) -> FsResult<Filesystem> {
    Filesystem::create(default_registry()?, path, config)
}

/// Open the filesystem at `path`, whatever backend created it.
pub fn open(path: &Path, config: FsConfig) -> FsResult<Filesystem> {
    Filesystem::open(default_registry()?, path, config)
}

pub fn delete_fs(path: &Path) -> FsResult<()> {
    rvfs_fs::delete_fs(default_registry()?, path)
}

pub fn hotcopy(src: &Path, dest: &Path, clean: bool) -> FsResult<()> {
    rvfs_fs::hotcopy(default_registry()?, src, dest, clean)
}

pub fn recover(path: &Path, cancel: Option<&CancelFunc>) -> FsResult<()> {
    rvfs_fs::recover(default_registry()?, path, cancel)
}

/// The backend type recorded at `path`.
pub fn fs_type(path: &Path) -> FsResult<String> {
    rvfs_fs::registry::read_type_marker(path)
}

pub fn list_modules() -> FsResult<Vec<ModuleInfo>> {
    default_registry()?.list_available()
}

/// One `* fs_<module> : <description>` line per available backend.
pub fn print_modules() -> FsResult<String> {
    default_registry()?.print_modules()
}

/// Parse a node id that a backend of type `fs_type` produced.
pub fn parse_id(fs_type: &str, data: &[u8]) -> FsResult<NodeId> {
    default_registry()?.parse_id(fs_type, data)
}

/// Read a TOML config file. See [`FsConfig::from_toml_str`] for the format.
pub fn load_config(path: &Path) -> FsResult<FsConfig> {
    let text = fs::read_to_string(path)?;
    let config = FsConfig::from_toml_str(&text)?;
    debug!(path = %path.display(), "loaded filesystem config");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use std::ops::ControlFlow;
    use std::sync::{Arc, Mutex};

    use rvfs_fs::{
        collect_locations, FsAccess, FsError, HistoryLocation, LockRequest, LogWarnings, Root,
        TxnFlags, TYPE_MARKER_FILE,
    };
    use rvfs_types::{Checksum, RevisionSpec, Revnum, TextDelta};

    use super::*;

    fn new_fs() -> (tempfile::TempDir, Filesystem) {
        let dir = tempfile::tempdir().unwrap();
        let fs = create(&dir.path().join("repo"), FsConfig::new()).unwrap();
        fs.set_warning(Arc::new(LogWarnings));
        fs.set_access(Some(FsAccess::new("alice")));
        (dir, fs)
    }

    fn commit_with(fs: &Filesystem, edit: impl FnOnce(&Root)) -> Revnum {
        let txn = fs.begin_txn(RevisionSpec::Youngest, TxnFlags::NONE).unwrap();
        edit(&txn.root().unwrap());
        txn.commit().unwrap()
    }

    #[test]
    fn create_without_type_writes_the_default_marker() {
        let (dir, fs) = new_fs();
        let path = dir.path().join("repo");
        let marker = std::fs::read_to_string(path.join(TYPE_MARKER_FILE)).unwrap();
        assert_eq!(marker, "flat\n");
        assert_eq!(fs_type(&path).unwrap(), fs.fs_type());
        drop(fs);

        let reopened = open(&path, FsConfig::new()).unwrap();
        assert_eq!(reopened.fs_type(), rvfs_flat::FS_TYPE);
    }

    #[test]
    fn unknown_type_is_refused_before_touching_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("repo");
        let err = create(&path, FsConfig::new().with("fs-type", "bdb")).unwrap_err();
        assert!(matches!(err, FsError::UnknownBackendType { .. }));
        assert!(!path.exists());
    }

    #[test]
    fn property_commit_on_revision_five() {
        let (_dir, fs) = new_fs();
        commit_with(&fs, |root| root.make_file("/a").unwrap());
        for n in 2..=5u8 {
            commit_with(&fs, |root| root.apply_text("/a", &[n], None).unwrap());
        }
        assert_eq!(fs.youngest_rev().unwrap(), Revnum::new(5));

        let txn = fs.begin_txn(RevisionSpec::Number(Revnum::new(5)), TxnFlags::NONE).unwrap();
        let name = txn.name().to_string();
        txn.root().unwrap().change_node_prop("/a", "color", Some(b"red")).unwrap();
        assert_eq!(txn.commit().unwrap(), Revnum::new(6));

        let r6 = fs.revision_root(RevisionSpec::Number(Revnum::new(6))).unwrap();
        assert_eq!(r6.node_prop("/a", "color").unwrap().unwrap(), b"red");
        assert!(r6.paths_changed().unwrap()["/a"].prop_mod);
        assert!(!fs.list_transactions().unwrap().contains(&name));
    }

    #[test]
    fn two_begins_on_youngest_share_a_base() {
        let (_dir, fs) = new_fs();
        commit_with(&fs, |root| root.make_dir("/d").unwrap());
        let a = fs.begin_txn(RevisionSpec::Youngest, TxnFlags::NONE).unwrap();
        let b = fs.begin_txn(RevisionSpec::Youngest, TxnFlags::NONE).unwrap();
        assert_eq!(a.base_revision(), b.base_revision());
        assert_ne!(a.name(), b.name());

        a.root().unwrap().make_file("/d/x").unwrap();
        assert_eq!(b.root().unwrap().check_path("/d/x").unwrap(), rvfs_types::NodeKind::None);
    }

    #[test]
    fn committed_revisions_refuse_every_mutation() {
        let (_dir, fs) = new_fs();
        commit_with(&fs, |root| {
            root.make_dir("/d").unwrap();
            root.make_file("/d/f").unwrap();
        });
        let r1 = fs.revision_root(RevisionSpec::Youngest).unwrap();
        let r0 = fs.revision_root(RevisionSpec::Number(Revnum::ZERO)).unwrap();
        let delta = TextDelta::compute(b"", b"x");
        let sum = Checksum::of(b"x");

        for root in [&r0, &r1] {
            let results = [
                root.make_dir("/new"),
                root.make_file("/new"),
                root.delete("/d"),
                root.copy(&r1, "/d", "/e"),
                root.revision_link(&r1, "/d"),
                root.change_node_prop("/d", "k", Some(b"v")),
                root.apply_text("/d/f", b"x", None),
                root.apply_textdelta("/d/f", &delta, None, Some(&sum)),
                root.merge(&r1, "/", "/", &r0, "/").map(|_| ()),
            ];
            for result in results {
                assert!(matches!(result, Err(FsError::ReadOnlyRoot { .. })));
            }
        }
        assert_eq!(fs.youngest_rev().unwrap(), Revnum::new(1));
    }

    #[test]
    fn lock_validation_precedes_the_backend() {
        let (_dir, fs) = new_fs();
        commit_with(&fs, |root| root.make_file("/a").unwrap());

        assert!(matches!(
            fs.lock(LockRequest::new("/a").comment("bad\u{1}comment")),
            Err(FsError::UnsafeComment)
        ));
        assert!(matches!(
            fs.lock(LockRequest::new("/a").expires_at(-1)),
            Err(FsError::InvalidParameter(_))
        ));
        assert!(fs.get_lock("/a").unwrap().is_none());
    }

    #[test]
    fn second_locker_is_refused() {
        let (_dir, fs) = new_fs();
        commit_with(&fs, |root| root.make_file("/a").unwrap());

        let first = fs.lock(LockRequest::new("/a")).unwrap();
        assert!(!first.token.is_empty());
        fs.set_access(Some(FsAccess::new("bob")));
        assert!(matches!(
            fs.lock(LockRequest::new("/a")),
            Err(FsError::AlreadyLocked { .. })
        ));

        let mut owners = Vec::new();
        fs.get_locks("/", |lock| {
            owners.push(lock.owner.clone());
            ControlFlow::Break(())
        })
        .unwrap();
        assert_eq!(owners, vec!["alice"]);
    }

    #[test]
    fn history_across_a_copy() {
        let (_dir, fs) = new_fs();
        commit_with(&fs, |root| root.make_file("/a").unwrap());
        commit_with(&fs, |root| root.apply_text("/a", b"1", None).unwrap());
        commit_with(&fs, |root| root.apply_text("/a", b"2", None).unwrap());
        let r3 = fs.revision_root(RevisionSpec::Number(Revnum::new(3))).unwrap();
        commit_with(&fs, |root| root.copy(&r3, "/a", "/b").unwrap());
        commit_with(&fs, |root| root.apply_text("/b", b"3", None).unwrap());

        let r5 = fs.revision_root(RevisionSpec::Youngest).unwrap();
        let start = r5.node_history("/b").unwrap();
        assert_eq!(start.location(), HistoryLocation::new("/b", Revnum::new(5)));
        let at4 = start.prev(false).unwrap().unwrap();
        assert_eq!(at4.location(), HistoryLocation::new("/b", Revnum::new(4)));
        assert!(at4.prev(false).unwrap().is_none());
        let at3 = at4.prev(true).unwrap().unwrap();
        assert_eq!(at3.location(), HistoryLocation::new("/a", Revnum::new(3)));

        let all = collect_locations(&r5, "/b", true, Some(3), None).unwrap();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn node_ids_round_trip_through_the_registry() {
        let (_dir, fs) = new_fs();
        commit_with(&fs, |root| root.make_file("/a").unwrap());
        let r1 = fs.revision_root(RevisionSpec::Youngest).unwrap();
        let id = r1.node_id("/a").unwrap();
        let bytes = id.unparse();
        let parsed = parse_id(fs.fs_type(), &bytes).unwrap();
        assert_eq!(parsed.unparse(), bytes);
        assert!(parsed == id);
    }

    #[test]
    fn hotcopy_recover_and_delete_by_path() {
        let (dir, fs) = new_fs();
        commit_with(&fs, |root| root.make_file("/a").unwrap());
        let src = dir.path().join("repo");
        let dest = dir.path().join("copy");
        hotcopy(&src, &dest, true).unwrap();
        recover(&dest, None).unwrap();

        let copy = open(&dest, FsConfig::new()).unwrap();
        assert_eq!(copy.youngest_rev().unwrap(), Revnum::new(1));
        drop(copy);
        delete_fs(&dest).unwrap();
        assert!(!dest.exists());
    }

    #[test]
    fn path_info_walks_a_committed_tree() {
        let (_dir, fs) = new_fs();
        commit_with(&fs, |root| {
            root.make_dir("/d").unwrap();
            root.make_file("/d/f").unwrap();
            root.apply_text("/d/f", b"abc", None).unwrap();
        });
        fs.lock(LockRequest::new("/d/f")).unwrap();

        let r1 = fs.revision_root(RevisionSpec::Youngest).unwrap();
        let mut infos = Vec::new();
        rvfs_fs::path_info(&fs, &r1, "/", rvfs_fs::Depth::Infinity, |info| {
            infos.push(info);
            Ok(())
        })
        .unwrap();
        let paths: Vec<_> = infos.iter().map(|i| i.path.as_str()).collect();
        assert_eq!(paths, ["/", "/d", "/d/f"]);

        let file = &infos[2];
        assert_eq!(file.size, Some(3));
        assert_eq!(file.last_changed_rev, Some(Revnum::new(1)));
        assert_eq!(file.last_changed_author.as_deref(), Some("alice"));
        assert!(file.last_changed_date.is_some());
        assert_eq!(file.lock.as_ref().unwrap().owner, "alice");
        assert_eq!(file.fs_uuid, fs.get_uuid().unwrap());
    }

    #[test]
    fn modules_are_listed() {
        let modules = list_modules().unwrap();
        assert_eq!(modules.len(), 1);
        assert_eq!(modules[0].fs_type, rvfs_flat::FS_TYPE);
        let printed = print_modules().unwrap();
        assert!(printed.starts_with("* fs_fs : "));
        assert!(printed.ends_with('\n'));
    }

    #[test]
    fn config_loads_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fs.toml");
        std::fs::write(&path, "fs-type = \"flat\"\n[flat]\nfsync = true\n").unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.fs_type(), Some("flat"));
        assert!(config.get_bool(rvfs_flat::CONFIG_FSYNC, false).unwrap());

        let fs = create(&dir.path().join("repo"), config).unwrap();
        fs.set_warning(Arc::new(LogWarnings));
        assert_eq!(fs.youngest_rev().unwrap(), Revnum::ZERO);
    }

    #[test]
    fn warnings_reach_the_installed_sink() {
        let (_dir, fs) = new_fs();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        fs.set_warning(Arc::new(move |err: &FsError| sink.lock().unwrap().push(err.to_string())));
        fs.warn(&FsError::Corrupt("stale transaction".into()));
        assert_eq!(seen.lock().unwrap().as_slice(), ["corrupt filesystem: stale transaction"]);
    }
}
