//! The lock table: one JSON file mapping paths to [`Lock`]s.
//!
//! Expired locks are not swept; they are dropped the next time anything
//! looks at their path.

use std::collections::BTreeMap;
use std::ops::ControlFlow;

use chrono::Utc;
use rvfs_fs::{FsContext, FsError, FsResult, LockRequest};
use rvfs_types::{path, Lock, PathChangeKind};
use tracing::debug;
use uuid::Uuid;

use crate::noderev::ChangeRecord;
use crate::repo::Repo;
use crate::tree::{self, RevStore};

pub fn new_token() -> String {
    format!("opaquelocktoken:{}", Uuid::now_v7())
}

pub fn lock(repo: &Repo, ctx: &FsContext, request: &LockRequest) -> FsResult<Lock> {
    let _guard = repo.lock_writes()?;
    let owner = ctx.username()?;

    let youngest = repo.youngest()?;
    let head = repo.revision(youngest)?;
    let node = tree::lookup(&RevStore { repo, file: &head }, &request.path)?
        .ok_or_else(|| FsError::NotFound(request.path.clone()))?;
    if node.contents().is_none() {
        return Err(FsError::NotFile(request.path.clone()));
    }
    if let Some(current) = request.current_rev {
        if current > youngest {
            return Err(FsError::NoSuchRevision(current));
        }
        if node.id.rev().is_some_and(|created| created > current) {
            return Err(FsError::OutOfDate(format!(
                "'{}' has changed since revision {current}",
                request.path
            )));
        }
    }

    let now = Utc::now();
    let mut table = repo.load_locks()?;
    if let Some(existing) = table.get(&request.path) {
        if !existing.is_expired_at(now) && !request.steal {
            return Err(FsError::AlreadyLocked {
                path: request.path.clone(),
                owner: existing.owner.clone(),
            });
        }
    }

    let lock = Lock {
        path: request.path.clone(),
        token: request.token.clone().unwrap_or_else(new_token),
        owner,
        comment: request.comment.clone(),
        is_dav_comment: request.is_dav_comment,
        creation_date: now,
        expiration_date: request.expiration_date()?,
    };
    table.insert(lock.path.clone(), lock.clone());
    repo.save_locks(&table)?;
    debug!(path = %lock.path, stolen = request.steal, "wrote lock table");
    Ok(lock)
}

pub fn unlock(
    repo: &Repo,
    ctx: &FsContext,
    path: &str,
    token: Option<&str>,
    break_lock: bool,
) -> FsResult<()> {
    let _guard = repo.lock_writes()?;
    let mut table = repo.load_locks()?;
    let Some(lock) = table.get(path).cloned() else {
        return Err(FsError::NoSuchLock(path.to_string()));
    };
    if lock.is_expired() {
        table.remove(path);
        repo.save_locks(&table)?;
        return Err(FsError::NoSuchLock(path.to_string()));
    }
    if !break_lock {
        if token != Some(lock.token.as_str()) {
            return Err(FsError::BadLockToken {
                path: path.to_string(),
            });
        }
        let user = ctx.username()?;
        if user != lock.owner {
            return Err(FsError::LockOwnerMismatch {
                path: path.to_string(),
                user,
                owner: lock.owner,
            });
        }
    }
    table.remove(path);
    repo.save_locks(&table)?;
    debug!(path, broken = break_lock, "removed lock from table");
    Ok(())
}

pub fn get_lock(repo: &Repo, path: &str) -> FsResult<Option<Lock>> {
    let _guard = repo.lock_writes()?;
    let mut table = repo.load_locks()?;
    match table.get(path) {
        Some(lock) if lock.is_expired() => {
            table.remove(path);
            repo.save_locks(&table)?;
            Ok(None)
        }
        other => Ok(other.cloned()),
    }
}

pub fn get_locks(
    repo: &Repo,
    path: &str,
    receiver: &mut dyn FnMut(&Lock) -> ControlFlow<()>,
) -> FsResult<()> {
    let now = Utc::now();
    let table = repo.load_locks()?;
    for lock in table.values() {
        if lock.is_expired_at(now) || !path::is_ancestor(path, &lock.path) {
            continue;
        }
        if receiver(lock).is_break() {
            break;
        }
    }
    Ok(())
}

/// Fail if a changed path is locked by someone other than the committer.
/// Deletions and replacements also cover every lock below them.
pub fn verify_commit(
    repo: &Repo,
    ctx: &FsContext,
    changes: &BTreeMap<String, ChangeRecord>,
) -> FsResult<()> {
    let table = repo.load_locks()?;
    if table.is_empty() {
        return Ok(());
    }
    let access = ctx.access();
    let now = Utc::now();
    for (changed, record) in changes {
        let recursive = matches!(record.kind, PathChangeKind::Delete | PathChangeKind::Replace);
        for lock in table.values() {
            let covered = lock.path == *changed || (recursive && path::is_ancestor(changed, &lock.path));
            if !covered || lock.is_expired_at(now) {
                continue;
            }
            let held = access
                .as_ref()
                .is_some_and(|a| a.username == lock.owner && a.holds(&lock.token));
            if !held {
                return Err(FsError::PathLocked {
                    path: lock.path.clone(),
                    owner: lock.owner.clone(),
                });
            }
        }
    }
    Ok(())
}
