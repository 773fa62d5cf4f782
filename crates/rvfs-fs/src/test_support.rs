//! In-memory backend used by this crate's unit tests.
//!
//! Trees are kept as path-keyed maps per revision and per transaction. The
//! backend counts the calls the core must not let through (mutations, lock
//! acquisitions) so tests can assert that validation happened first.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use bytes::Bytes;
use chrono::Utc;
use rvfs_types::{
    path, props, Checksum, Lock, NodeKind, PropMap, Revnum, TextDelta, Version,
    PROP_REVISION_AUTHOR, PROP_REVISION_DATE,
};

use crate::backend::{
    DirEntry, FsBackend, FsLibrary, HistoryBackend, NodeIdBackend, PathChange, RootBackend,
    TxnBackend, TxnFlags,
};
use crate::context::{CancelFunc, FsContext};
use crate::error::{FsError, FsResult};
use crate::history::HistoryLocation;
use crate::id::{IdRelation, NodeId};
use crate::init::SharedScope;
use crate::lock::LockRequest;
use crate::registry::{BackendDescriptor, Registry};
use crate::{FsConfig, Filesystem, Root};

pub const VERSION: Version = Version::new(1, 0, 0, "");
pub const DESCRIPTION: &str = "Module for testing the core.";

type Shared = Arc<Mutex<MockState>>;

fn states() -> &'static Mutex<HashMap<PathBuf, Shared>> {
    static STATES: OnceLock<Mutex<HashMap<PathBuf, Shared>>> = OnceLock::new();
    STATES.get_or_init(|| Mutex::new(HashMap::new()))
}

fn mock_init(_: &Version) -> FsResult<Arc<dyn FsLibrary>> {
    Ok(Arc::new(MockLibrary::new(VERSION)))
}

pub fn registry() -> Registry {
    Registry::new(VERSION)
        .with(BackendDescriptor::linked("mock", "mock", mock_init))
        .unwrap()
}

pub fn mock_fs() -> (tempfile::TempDir, Filesystem) {
    let dir = tempfile::tempdir().unwrap();
    let fs = Filesystem::create(
        &registry(),
        &dir.path().join("repo"),
        FsConfig::new().with("fs-type", "mock"),
    )
    .unwrap();
    (dir, fs)
}

pub fn state_of(fs: &Filesystem) -> Shared {
    Arc::clone(&states().lock().unwrap()[fs.path()])
}

/// A revision root over three revisions that each touch `/b`.
pub fn history_root() -> ((tempfile::TempDir, Filesystem), Root) {
    let (dir, fs) = mock_fs();
    for i in 0..3u8 {
        let txn = fs
            .begin_txn(rvfs_types::RevisionSpec::Youngest, TxnFlags::NONE)
            .unwrap();
        let root = txn.root().unwrap();
        if i == 0 {
            root.make_file("/b").unwrap();
        }
        root.apply_text("/b", &[i], None).unwrap();
        txn.commit().unwrap();
    }
    let root = fs.revision_root(rvfs_types::RevisionSpec::Youngest).unwrap();
    ((dir, fs), root)
}

// ----------------------------------------------------------------------
// State
// ----------------------------------------------------------------------

#[derive(Clone, Debug)]
struct MockNode {
    kind: NodeKind,
    contents: Vec<u8>,
    props: PropMap,
    node: u64,
    created_rev: Option<Revnum>,
}

type Tree = BTreeMap<String, MockNode>;

struct MockTxnState {
    base: Revnum,
    tree: Tree,
    props: PropMap,
}

pub struct MockState {
    uuid: String,
    revs: Vec<Tree>,
    rev_props: Vec<PropMap>,
    txns: BTreeMap<String, MockTxnState>,
    locks: BTreeMap<String, Lock>,
    next_txn: u64,
    next_node: u64,
    next_token: u64,
    pub mutations: usize,
    pub lock_calls: usize,
    pub recoveries: usize,
    pub lock_not_implemented: bool,
}

impl MockState {
    fn new(uuid: String) -> Self {
        let mut root = Tree::new();
        root.insert(
            path::ROOT.to_string(),
            MockNode {
                kind: NodeKind::Dir,
                contents: Vec::new(),
                props: PropMap::new(),
                node: 0,
                created_rev: Some(Revnum::ZERO),
            },
        );
        Self {
            uuid,
            revs: vec![root],
            rev_props: vec![PropMap::new()],
            txns: BTreeMap::new(),
            locks: BTreeMap::new(),
            next_txn: 0,
            next_node: 1,
            next_token: 0,
            mutations: 0,
            lock_calls: 0,
            recoveries: 0,
            lock_not_implemented: false,
        }
    }

    fn youngest(&self) -> Revnum {
        Revnum::new(self.revs.len() as u64 - 1)
    }

    fn tree(&self, target: &Target) -> FsResult<&Tree> {
        match target {
            Target::Rev(rev) => self
                .revs
                .get(rev.get() as usize)
                .ok_or(FsError::NoSuchRevision(*rev)),
            Target::Txn(name) => self
                .txns
                .get(name)
                .map(|t| &t.tree)
                .ok_or_else(|| FsError::NoSuchTransaction(name.clone())),
        }
    }

    fn tree_mut(&mut self, target: &Target) -> FsResult<&mut Tree> {
        self.mutations += 1;
        match target {
            Target::Rev(_) => Err(FsError::Internal("mutation reached a revision root".into())),
            Target::Txn(name) => self
                .txns
                .get_mut(name)
                .map(|t| &mut t.tree)
                .ok_or_else(|| FsError::NoSuchTransaction(name.clone())),
        }
    }
}

fn node<'a>(tree: &'a Tree, path: &str) -> FsResult<&'a MockNode> {
    tree.get(path).ok_or_else(|| FsError::NotFound(path.to_string()))
}

fn file<'a>(tree: &'a Tree, path: &str) -> FsResult<&'a MockNode> {
    let n = node(tree, path)?;
    if n.kind != NodeKind::File {
        return Err(FsError::NotFile(path.to_string()));
    }
    Ok(n)
}

// ----------------------------------------------------------------------
// Library
// ----------------------------------------------------------------------

pub struct MockLibrary {
    version: Version,
}

impl MockLibrary {
    pub fn new(version: Version) -> Self {
        Self { version }
    }

    fn state(path: &Path) -> FsResult<Shared> {
        states()
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| FsError::NotFound(path.display().to_string()))
    }
}

impl FsLibrary for MockLibrary {
    fn version(&self) -> Version {
        self.version
    }

    fn description(&self) -> &str {
        DESCRIPTION
    }

    fn create(&self, path: &Path, ctx: Arc<FsContext>) -> FsResult<Box<dyn FsBackend>> {
        let uuid = format!("mock-{}", path.display());
        let state = Arc::new(Mutex::new(MockState::new(uuid)));
        states()
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), Arc::clone(&state));
        Ok(Box::new(MockFs { ctx, state }))
    }

    fn open(&self, path: &Path, ctx: Arc<FsContext>) -> FsResult<Box<dyn FsBackend>> {
        Ok(Box::new(MockFs {
            ctx,
            state: Self::state(path)?,
        }))
    }

    fn delete_fs(&self, path: &Path) -> FsResult<()> {
        states().lock().unwrap().remove(path);
        std::fs::remove_dir_all(path)?;
        Ok(())
    }

    fn hotcopy(&self, src: &Path, dest: &Path, _clean: bool) -> FsResult<()> {
        let src_state = Self::state(src)?;
        let src_state = src_state.lock().unwrap();
        let mut copy = MockState::new(src_state.uuid.clone());
        copy.revs = src_state.revs.clone();
        copy.rev_props = src_state.rev_props.clone();
        std::fs::create_dir_all(dest)?;
        states()
            .lock()
            .unwrap()
            .insert(dest.to_path_buf(), Arc::new(Mutex::new(copy)));
        Ok(())
    }

    fn recover(&self, path: &Path, cancel: Option<&CancelFunc>) -> FsResult<()> {
        crate::context::check(cancel)?;
        Self::state(path)?.lock().unwrap().recoveries += 1;
        Ok(())
    }

    fn parse_id(&self, data: &[u8]) -> FsResult<Arc<dyn NodeIdBackend>> {
        let text = std::str::from_utf8(data)
            .map_err(|_| FsError::InvalidParameter("id is not UTF-8".into()))?;
        let (node, rev) = text
            .split_once('.')
            .ok_or_else(|| FsError::InvalidParameter(format!("malformed id '{text}'")))?;
        let parse = |s: &str| {
            s.parse::<u64>()
                .map_err(|_| FsError::InvalidParameter(format!("malformed id '{text}'")))
        };
        Ok(Arc::new(MockId {
            node: parse(node)?,
            rev: parse(rev)?,
        }))
    }
}

// ----------------------------------------------------------------------
// Handle
// ----------------------------------------------------------------------

struct MockFs {
    ctx: Arc<FsContext>,
    state: Shared,
}

impl FsBackend for MockFs {
    fn serialized_init(&self, scope: &SharedScope) -> FsResult<()> {
        let count = scope.get_or_insert_with("mock:inits", || Ok(Mutex::new(0usize)))?;
        *count.lock().unwrap() += 1;
        Ok(())
    }

    fn youngest_rev(&self) -> FsResult<Revnum> {
        Ok(self.state.lock().unwrap().youngest())
    }

    fn revision_prop(&self, rev: Revnum, name: &str) -> FsResult<Option<Vec<u8>>> {
        Ok(self.revision_proplist(rev)?.remove(name))
    }

    fn revision_proplist(&self, rev: Revnum) -> FsResult<PropMap> {
        let state = self.state.lock().unwrap();
        state
            .rev_props
            .get(rev.get() as usize)
            .cloned()
            .ok_or(FsError::NoSuchRevision(rev))
    }

    fn change_rev_prop(&self, rev: Revnum, name: &str, value: Option<&[u8]>) -> FsResult<()> {
        let mut state = self.state.lock().unwrap();
        let table = state
            .rev_props
            .get_mut(rev.get() as usize)
            .ok_or(FsError::NoSuchRevision(rev))?;
        props::apply_change(table, name, value);
        Ok(())
    }

    fn get_uuid(&self) -> FsResult<String> {
        Ok(self.state.lock().unwrap().uuid.clone())
    }

    fn set_uuid(&self, uuid: &str) -> FsResult<()> {
        self.state.lock().unwrap().uuid = uuid.to_string();
        Ok(())
    }

    fn deltify(&self, _rev: Revnum) -> FsResult<()> {
        Ok(())
    }

    fn revision_root(&self, rev: Revnum) -> FsResult<Box<dyn RootBackend>> {
        Ok(Box::new(MockRoot {
            state: Arc::clone(&self.state),
            target: Target::Rev(rev),
        }))
    }

    fn begin_txn(&self, base: Revnum, _flags: TxnFlags) -> FsResult<Box<dyn TxnBackend>> {
        let mut state = self.state.lock().unwrap();
        let tree = state.tree(&Target::Rev(base))?.clone();
        state.next_txn += 1;
        let name = format!("{}-{}", base, state.next_txn);
        state.txns.insert(
            name.clone(),
            MockTxnState {
                base,
                tree,
                props: PropMap::new(),
            },
        );
        Ok(Box::new(MockTxn {
            state: Arc::clone(&self.state),
            name,
            base,
        }))
    }

    fn open_txn(&self, name: &str) -> FsResult<Box<dyn TxnBackend>> {
        let state = self.state.lock().unwrap();
        let txn = state
            .txns
            .get(name)
            .ok_or_else(|| FsError::NoSuchTransaction(name.to_string()))?;
        Ok(Box::new(MockTxn {
            state: Arc::clone(&self.state),
            name: name.to_string(),
            base: txn.base,
        }))
    }

    fn purge_txn(&self, name: &str) -> FsResult<()> {
        self.state
            .lock()
            .unwrap()
            .txns
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| FsError::NoSuchTransaction(name.to_string()))
    }

    fn list_transactions(&self) -> FsResult<Vec<String>> {
        Ok(self.state.lock().unwrap().txns.keys().cloned().collect())
    }

    fn lock(&self, request: &LockRequest) -> FsResult<Lock> {
        let owner = self.ctx.username().unwrap_or_else(|_| "anonymous".into());
        let mut state = self.state.lock().unwrap();
        state.lock_calls += 1;
        if let Some(existing) = state.locks.get(&request.path) {
            if !request.steal {
                return Err(FsError::AlreadyLocked {
                    path: request.path.clone(),
                    owner: existing.owner.clone(),
                });
            }
        }
        state.next_token += 1;
        let lock = Lock {
            path: request.path.clone(),
            token: request
                .token
                .clone()
                .unwrap_or_else(|| format!("mock-token-{}", state.next_token)),
            owner,
            comment: request.comment.clone(),
            is_dav_comment: request.is_dav_comment,
            creation_date: Utc::now(),
            expiration_date: request.expiration_date()?,
        };
        state.locks.insert(lock.path.clone(), lock.clone());
        Ok(lock)
    }

    fn generate_lock_token(&self) -> FsResult<String> {
        let mut state = self.state.lock().unwrap();
        state.next_token += 1;
        Ok(format!("mock-token-{}", state.next_token))
    }

    fn unlock(&self, path: &str, token: Option<&str>, break_lock: bool) -> FsResult<()> {
        let mut state = self.state.lock().unwrap();
        let lock = state
            .locks
            .get(path)
            .ok_or_else(|| FsError::NoSuchLock(path.to_string()))?;
        if !break_lock && token != Some(lock.token.as_str()) {
            return Err(FsError::BadLockToken {
                path: path.to_string(),
            });
        }
        state.locks.remove(path);
        Ok(())
    }

    fn get_lock(&self, path: &str) -> FsResult<Option<Lock>> {
        let state = self.state.lock().unwrap();
        if state.lock_not_implemented {
            return Err(FsError::NotImplemented("lock lookup".into()));
        }
        Ok(state.locks.get(path).cloned())
    }

    fn get_locks(
        &self,
        path: &str,
        receiver: &mut dyn FnMut(&Lock) -> ControlFlow<()>,
    ) -> FsResult<()> {
        let locks: Vec<Lock> = self.state.lock().unwrap().locks.values().cloned().collect();
        for lock in locks.iter().filter(|l| path::is_ancestor(path, &l.path)) {
            if receiver(lock).is_break() {
                break;
            }
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------
// Transactions and roots
// ----------------------------------------------------------------------

struct MockTxn {
    state: Shared,
    name: String,
    base: Revnum,
}

impl MockTxn {
    fn with_props<T>(&self, f: impl FnOnce(&mut PropMap) -> T) -> FsResult<T> {
        let mut state = self.state.lock().unwrap();
        let txn = state
            .txns
            .get_mut(&self.name)
            .ok_or_else(|| FsError::NoSuchTransaction(self.name.clone()))?;
        Ok(f(&mut txn.props))
    }
}

impl TxnBackend for MockTxn {
    fn name(&self) -> &str {
        &self.name
    }

    fn base_revision(&self) -> Revnum {
        self.base
    }

    fn commit(&self) -> FsResult<Revnum> {
        let mut state = self.state.lock().unwrap();
        let txn = state
            .txns
            .remove(&self.name)
            .ok_or_else(|| FsError::NoSuchTransaction(self.name.clone()))?;
        let rev = state.youngest().next();
        let mut tree = txn.tree;
        for n in tree.values_mut() {
            n.created_rev.get_or_insert(rev);
        }
        let mut rev_props = PropMap::new();
        rev_props.insert(
            PROP_REVISION_DATE.to_string(),
            Utc::now().to_rfc3339().into_bytes(),
        );
        if let Some(author) = txn.props.get(PROP_REVISION_AUTHOR) {
            rev_props.insert(PROP_REVISION_AUTHOR.to_string(), author.clone());
        }
        state.revs.push(tree);
        state.rev_props.push(rev_props);
        Ok(rev)
    }

    fn abort(&self) -> FsResult<()> {
        self.state
            .lock()
            .unwrap()
            .txns
            .remove(&self.name)
            .map(|_| ())
            .ok_or_else(|| FsError::NoSuchTransaction(self.name.clone()))
    }

    fn prop(&self, name: &str) -> FsResult<Option<Vec<u8>>> {
        self.with_props(|p| p.get(name).cloned())
    }

    fn proplist(&self) -> FsResult<PropMap> {
        self.with_props(|p| p.clone())
    }

    fn change_prop(&self, name: &str, value: Option<&[u8]>) -> FsResult<()> {
        self.with_props(|p| props::apply_change(p, name, value))
    }

    fn root(&self) -> FsResult<Box<dyn RootBackend>> {
        Ok(Box::new(MockRoot {
            state: Arc::clone(&self.state),
            target: Target::Txn(self.name.clone()),
        }))
    }
}

#[derive(Clone, Debug)]
enum Target {
    Rev(Revnum),
    Txn(String),
}

struct MockRoot {
    state: Shared,
    target: Target,
}

impl MockRoot {
    fn read<T>(&self, f: impl FnOnce(&Tree) -> FsResult<T>) -> FsResult<T> {
        let state = self.state.lock().unwrap();
        f(state.tree(&self.target)?)
    }

    fn write<T>(&self, f: impl FnOnce(&mut Tree, &mut u64) -> FsResult<T>) -> FsResult<T> {
        let mut state = self.state.lock().unwrap();
        let mut next_node = state.next_node;
        let result = f(state.tree_mut(&self.target)?, &mut next_node);
        state.next_node = next_node;
        result
    }

    fn other(other: &dyn RootBackend) -> FsResult<&MockRoot> {
        other
            .as_any()
            .downcast_ref::<MockRoot>()
            .ok_or_else(|| FsError::InvalidParameter("foreign root".into()))
    }

    fn other_node(other: &dyn RootBackend, path: &str) -> FsResult<MockNode> {
        Self::other(other)?.read(|t| node(t, path).cloned())
    }

    fn add(&self, path: &str, kind: NodeKind) -> FsResult<()> {
        self.write(|tree, next_node| {
            let (parent, _) = path::split(path).ok_or_else(|| FsError::AlreadyExists(path.into()))?;
            if node(tree, &parent)?.kind != NodeKind::Dir {
                return Err(FsError::NotDirectory(parent));
            }
            if tree.contains_key(path) {
                return Err(FsError::AlreadyExists(path.into()));
            }
            *next_node += 1;
            tree.insert(
                path.to_string(),
                MockNode {
                    kind,
                    contents: Vec::new(),
                    props: PropMap::new(),
                    node: *next_node,
                    created_rev: None,
                },
            );
            Ok(())
        })
    }
}

impl RootBackend for MockRoot {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn paths_changed(&self) -> FsResult<BTreeMap<String, PathChange>> {
        Ok(BTreeMap::new())
    }

    fn check_path(&self, path: &str) -> FsResult<NodeKind> {
        self.read(|t| Ok(t.get(path).map_or(NodeKind::None, |n| n.kind)))
    }

    fn node_history(&self, path: &str) -> FsResult<Box<dyn HistoryBackend>> {
        let Target::Rev(start) = self.target else {
            return Err(FsError::Internal("history on a transaction".into()));
        };
        let state = self.state.lock().unwrap();
        let locations = (1..=start.get())
            .rev()
            .filter(|r| state.revs[*r as usize].contains_key(path))
            .map(|r| HistoryLocation::new(path, Revnum::new(r)))
            .collect();
        Ok(Box::new(MockHistory::new(locations, usize::MAX)))
    }

    fn node_id(&self, path: &str) -> FsResult<NodeId> {
        self.read(|t| {
            let n = node(t, path)?;
            let rev = n.created_rev.map_or(u64::MAX, Revnum::get);
            Ok(NodeId::new("mock", Arc::new(MockId { node: n.node, rev })))
        })
    }

    fn node_created_rev(&self, path: &str) -> FsResult<Option<Revnum>> {
        self.read(|t| Ok(node(t, path)?.created_rev))
    }

    fn node_created_path(&self, path: &str) -> FsResult<String> {
        self.read(|t| node(t, path).map(|_| path.to_string()))
    }

    fn node_prop(&self, path: &str, name: &str) -> FsResult<Option<Vec<u8>>> {
        self.read(|t| Ok(node(t, path)?.props.get(name).cloned()))
    }

    fn node_proplist(&self, path: &str) -> FsResult<PropMap> {
        self.read(|t| Ok(node(t, path)?.props.clone()))
    }

    fn change_node_prop(&self, path: &str, name: &str, value: Option<&[u8]>) -> FsResult<()> {
        self.write(|t, _| {
            let n = t
                .get_mut(path)
                .ok_or_else(|| FsError::NotFound(path.to_string()))?;
            props::apply_change(&mut n.props, name, value);
            n.created_rev = None;
            Ok(())
        })
    }

    fn props_changed(&self, path: &str, other: &dyn RootBackend, other_path: &str) -> FsResult<bool> {
        let mine = self.read(|t| node(t, path).cloned())?;
        Ok(mine.props != Self::other_node(other, other_path)?.props)
    }

    fn contents_changed(
        &self,
        path: &str,
        other: &dyn RootBackend,
        other_path: &str,
    ) -> FsResult<bool> {
        let mine = self.read(|t| file(t, path).cloned())?;
        Ok(mine.contents != Self::other_node(other, other_path)?.contents)
    }

    fn copied_from(&self, _path: &str) -> FsResult<Option<(Revnum, String)>> {
        Ok(None)
    }

    fn merge(
        &self,
        _source: &dyn RootBackend,
        _source_path: &str,
        _target_path: &str,
        _ancestor: &dyn RootBackend,
        _ancestor_path: &str,
    ) -> FsResult<Option<String>> {
        self.write(|_, _| Ok(None))
    }

    fn dir_entries(&self, path: &str) -> FsResult<BTreeMap<String, DirEntry>> {
        self.read(|t| {
            if node(t, path)?.kind != NodeKind::Dir {
                return Err(FsError::NotDirectory(path.to_string()));
            }
            let mut entries = BTreeMap::new();
            for (child, n) in t {
                if let Some((parent, name)) = path::split(child) {
                    if parent == path {
                        let rev = n.created_rev.map_or(u64::MAX, Revnum::get);
                        entries.insert(
                            name.clone(),
                            DirEntry {
                                name,
                                kind: n.kind,
                                id: NodeId::new("mock", Arc::new(MockId { node: n.node, rev })),
                            },
                        );
                    }
                }
            }
            Ok(entries)
        })
    }

    fn make_dir(&self, path: &str) -> FsResult<()> {
        self.add(path, NodeKind::Dir)
    }

    fn make_file(&self, path: &str) -> FsResult<()> {
        self.add(path, NodeKind::File)
    }

    fn delete_node(&self, path: &str) -> FsResult<()> {
        self.write(|t, _| {
            node(t, path)?;
            t.retain(|p, _| !path::is_ancestor(path, p));
            Ok(())
        })
    }

    fn copy(&self, from: &dyn RootBackend, from_path: &str, to_path: &str) -> FsResult<()> {
        let subtree: Vec<(String, MockNode)> = Self::other(from)?.read(|t| {
            node(t, from_path)?;
            Ok(t.iter()
                .filter(|(p, _)| path::is_ancestor(from_path, p))
                .map(|(p, n)| (p.clone(), n.clone()))
                .collect())
        })?;
        self.write(|t, _| {
            for (p, n) in subtree {
                let suffix = &p[from_path.len()..];
                t.insert(format!("{}{}", to_path.trim_end_matches('/'), suffix), n);
            }
            Ok(())
        })
    }

    fn revision_link(&self, from: &dyn RootBackend, path: &str) -> FsResult<()> {
        let n = Self::other_node(from, path)?;
        self.write(|t, _| {
            t.insert(path.to_string(), n);
            Ok(())
        })
    }

    fn file_length(&self, path: &str) -> FsResult<u64> {
        self.read(|t| Ok(file(t, path)?.contents.len() as u64))
    }

    fn file_checksum(&self, path: &str) -> FsResult<Checksum> {
        self.read(|t| Ok(Checksum::of(&file(t, path)?.contents)))
    }

    fn file_contents(&self, path: &str) -> FsResult<Bytes> {
        self.read(|t| Ok(Bytes::from(file(t, path)?.contents.clone())))
    }

    fn apply_textdelta(
        &self,
        path: &str,
        delta: &TextDelta,
        _base_checksum: Option<&Checksum>,
        result_checksum: Option<&Checksum>,
    ) -> FsResult<()> {
        let base = self.file_contents(path)?;
        let contents = delta.apply(&base)?;
        self.apply_text(path, &contents, result_checksum)
    }

    fn apply_text(
        &self,
        path: &str,
        contents: &[u8],
        _result_checksum: Option<&Checksum>,
    ) -> FsResult<()> {
        self.write(|t, _| {
            let n = t
                .get_mut(path)
                .ok_or_else(|| FsError::NotFound(path.to_string()))?;
            n.contents = contents.to_vec();
            n.created_rev = None;
            Ok(())
        })
    }

    fn get_file_delta_stream(
        &self,
        source: Option<(&dyn RootBackend, &str)>,
        target_path: &str,
    ) -> FsResult<TextDelta> {
        let source = match source {
            Some((root, p)) => Self::other_node(root, p)?.contents,
            None => Vec::new(),
        };
        let target = self.file_contents(target_path)?;
        Ok(TextDelta::compute(&source, &target))
    }
}

// ----------------------------------------------------------------------
// Ids and history
// ----------------------------------------------------------------------

#[derive(Debug)]
pub struct MockId {
    pub node: u64,
    pub rev: u64,
}

impl NodeIdBackend for MockId {
    fn unparse(&self) -> Vec<u8> {
        format!("{}.{}", self.node, self.rev).into_bytes()
    }

    fn compare(&self, other: &dyn NodeIdBackend) -> IdRelation {
        match other.as_any().downcast_ref::<MockId>() {
            Some(o) if o.node == self.node && o.rev == self.rev => IdRelation::Identical,
            Some(o) if o.node == self.node => IdRelation::Related,
            _ => IdRelation::Unrelated,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Walks a fixed list of locations. Moving onto index `copy_boundary`
/// counts as crossing a copy.
pub struct MockHistory {
    locations: Vec<HistoryLocation>,
    copy_boundary: usize,
    index: usize,
}

impl MockHistory {
    pub fn new(locations: Vec<HistoryLocation>, copy_boundary: usize) -> Self {
        Self {
            locations,
            copy_boundary,
            index: 0,
        }
    }
}

impl HistoryBackend for MockHistory {
    fn location(&self) -> HistoryLocation {
        self.locations[self.index].clone()
    }

    fn prev(&self, cross_copies: bool) -> FsResult<Option<Box<dyn HistoryBackend>>> {
        let next = self.index + 1;
        if next >= self.locations.len() || (next == self.copy_boundary && !cross_copies) {
            return Ok(None);
        }
        Ok(Some(Box::new(MockHistory {
            locations: self.locations.clone(),
            copy_boundary: self.copy_boundary,
            index: next,
        })))
    }
}
