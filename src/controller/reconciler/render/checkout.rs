//! # Source Checkout
//!
//! [`CheckoutCache`] lives for one pass and makes every job that needs the same
//! (repoURL, revision) wait on a single fetch. [`GitSourceFetcher`] is the git
//! CLI implementation; it keeps one working copy per (repoURL, revision) under
//! the cache root, shared by every template that renders from it.
//!
//! A [`Checkout`] may hold a read lease on its working copy. Syncing a copy
//! takes the write side, so a pass renders from files that stay unchanged
//! until its cache, and with it the lease, is dropped.

use super::command::run_command;
use super::RenderError;
use crate::observability::metrics;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::sync::{OnceCell, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use tracing::{debug, info, warn};

/// A local working copy, unchanged for as long as this value lives
#[derive(Debug)]
pub struct Checkout {
    path: PathBuf,
    _lease: Option<OwnedRwLockReadGuard<()>>,
}

impl Checkout {
    /// A directory nothing else modifies
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _lease: None,
        }
    }

    pub fn leased(path: impl Into<PathBuf>, lease: OwnedRwLockReadGuard<()>) -> Self {
        Self {
            path: path.into(),
            _lease: Some(lease),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Fetches a repository at a revision into a local checkout
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, repo_url: &str, revision: &str) -> Result<Checkout, RenderError>;
}

type CheckoutKey = (String, String);

/// Per-pass checkout cache
///
/// A failed fetch is not cached; the next caller fetches again.
pub struct CheckoutCache {
    fetcher: Arc<dyn SourceFetcher>,
    entries: Mutex<HashMap<CheckoutKey, Arc<OnceCell<Arc<Checkout>>>>>,
}

impl std::fmt::Debug for CheckoutCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let entries = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        f.debug_struct("CheckoutCache")
            .field("entries", &entries)
            .finish_non_exhaustive()
    }
}

impl CheckoutCache {
    pub fn new(fetcher: Arc<dyn SourceFetcher>) -> Self {
        Self {
            fetcher,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Local checkout of `repo_url` at `revision`, fetched at most once per successful fetch
    pub async fn checkout(&self, repo_url: &str, revision: &str) -> Result<Arc<Checkout>, RenderError> {
        let cell = {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(
                entries
                    .entry((repo_url.to_string(), revision.to_string()))
                    .or_default(),
            )
        };

        cell.get_or_try_init(|| async {
            self.fetcher.fetch(repo_url, revision).await.map(Arc::new)
        })
        .await
        .map(Arc::clone)
    }
}

/// Reader/writer lock per working copy directory
#[derive(Debug, Default)]
struct DirectoryLeases {
    locks: Mutex<HashMap<PathBuf, Arc<RwLock<()>>>>,
}

impl DirectoryLeases {
    /// Waits until no pass holds a lease on `dir`
    async fn exclusive(&self, dir: &Path) -> OwnedRwLockWriteGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(dir.to_path_buf()).or_default())
        };
        lock.write_owned().await
    }
}

/// Git CLI fetcher
pub struct GitSourceFetcher {
    git_binary: String,
    cache_dir: PathBuf,
    timeout: Duration,
    leases: DirectoryLeases,
}

impl std::fmt::Debug for GitSourceFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitSourceFetcher")
            .field("git_binary", &self.git_binary)
            .field("cache_dir", &self.cache_dir)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl GitSourceFetcher {
    pub fn new(git_binary: impl Into<String>, cache_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            git_binary: git_binary.into(),
            cache_dir: cache_dir.into(),
            timeout,
            leases: DirectoryLeases::default(),
        }
    }

    /// Working copy directory for (repo, revision): `{cache_dir}/{md5(repo@revision)}`
    pub fn checkout_dir(&self, repo_url: &str, revision: &str) -> PathBuf {
        let hash = format!("{:x}", md5::compute(format!("{repo_url}@{revision}")));
        self.cache_dir.join(hash)
    }

    async fn git(&self, dir: &Path, args: &[&str], what: &str) -> Result<Vec<u8>, RenderError> {
        let mut command = Command::new(&self.git_binary);
        command
            .arg("-C")
            .arg(dir)
            .args(args)
            .env("GIT_TERMINAL_PROMPT", "0");
        run_command(command, self.timeout, what).await
    }

    async fn init_repository(&self, dir: &Path, repo_url: &str) -> Result<(), RenderError> {
        if dir.exists() {
            warn!(path = %dir.display(), "Removing incomplete checkout before re-initialising");
            tokio::fs::remove_dir_all(dir).await.map_err(|e| {
                RenderError::terminal(format!("failed to remove {}: {e}", dir.display()))
            })?;
        }
        tokio::fs::create_dir_all(dir).await.map_err(|e| {
            RenderError::terminal(format!("failed to create {}: {e}", dir.display()))
        })?;
        self.git(dir, &["init", "--quiet"], "git init").await?;
        self.git(dir, &["remote", "add", "origin", repo_url], "git remote add")
            .await?;
        Ok(())
    }

    async fn sync(&self, dir: &Path, repo_url: &str, revision: &str) -> Result<(), RenderError> {
        if !dir.join(".git").is_dir() {
            self.init_repository(dir, repo_url).await?;
        }
        // Fetching by name works for branches, tags and (on most servers) commit SHAs
        self.git(
            dir,
            &["fetch", "--quiet", "--depth", "1", "origin", revision],
            "git fetch",
        )
        .await?;
        self.git(
            dir,
            &["checkout", "--quiet", "--force", "--detach", "FETCH_HEAD"],
            "git checkout",
        )
        .await?;
        self.git(dir, &["clean", "-ffdxq"], "git clean").await?;
        Ok(())
    }
}

#[async_trait]
impl SourceFetcher for GitSourceFetcher {
    async fn fetch(&self, repo_url: &str, revision: &str) -> Result<Checkout, RenderError> {
        let dir = self.checkout_dir(repo_url, revision);
        let sync_guard = self.leases.exclusive(&dir).await;

        debug!(repo = %repo_url, revision = %revision, path = %dir.display(), "Fetching source");
        let started = Instant::now();
        metrics::increment_checkouts_total();

        match self.sync(&dir, repo_url, revision).await {
            Ok(()) => {
                metrics::observe_checkout_duration(started.elapsed().as_secs_f64());
                info!(repo = %repo_url, revision = %revision, "Checked out source");
                Ok(Checkout::leased(dir, sync_guard.downgrade()))
            }
            Err(e) => {
                metrics::increment_checkout_errors_total();
                warn!(repo = %repo_url, revision = %revision, error = %e, "Source checkout failed");
                Err(e)
            }
        }
    }
}
