use async_trait::async_trait;
use git2::{Repository, Status};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::{AppError, VcsError};
use crate::git::history::{commit_to_message, log_batch, log_range};
use crate::git::VersionControl;
use crate::models::{AttributionLine, CommitMessage};

pub struct GitRepository {
    pub repo: Arc<Mutex<Repository>>,
    pub path: String,
    workdir: PathBuf,
}

impl GitRepository {
    pub fn open<P: AsRef<Path>>(path: P) -> crate::error::Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        let repo = Repository::discover(&path).map_err(|_| AppError::RepoNotFound(path_str.clone()))?;

        let workdir = repo
            .workdir()
            .map(Path::to_path_buf)
            .ok_or_else(|| AppError::RepoNotFound(format!("{} is a bare repository", path_str)))?;
        let workdir = std::fs::canonicalize(&workdir).unwrap_or(workdir);

        Ok(Self {
            repo: Arc::new(Mutex::new(repo)),
            path: path_str,
            workdir,
        })
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Resolve a document path to a repository-relative, forward-slash path.
    pub fn relative_path(&self, path: &str) -> Result<String, VcsError> {
        let candidate = Path::new(path);
        let relative = if candidate.is_absolute() {
            let absolute = std::fs::canonicalize(candidate).unwrap_or_else(|_| candidate.to_path_buf());
            absolute
                .strip_prefix(&self.workdir)
                .map(Path::to_path_buf)
                .map_err(|_| VcsError::NotVersioned(format!("{} is outside the repository", path)))?
        } else {
            candidate.to_path_buf()
        };

        let relative = relative.to_string_lossy().replace('\\', "/");
        if relative.is_empty() {
            return Err(VcsError::NotVersioned(format!("{} is not a file", path)));
        }
        Ok(relative)
    }

    /// Run a blocking git2 operation off the async executor.
    pub async fn with_repo<F, T>(&self, f: F) -> Result<T, VcsError>
    where
        F: FnOnce(&Repository) -> Result<T, VcsError> + Send + 'static,
        T: Send + 'static,
    {
        let repo = Arc::clone(&self.repo);
        tokio::task::spawn_blocking(move || {
            let repo = repo
                .lock()
                .map_err(|_| VcsError::Internal("Lock poisoned".to_string()))?;
            f(&repo)
        })
        .await
        .map_err(|e| VcsError::Internal(format!("git worker failed: {}", e)))?
    }
}

#[async_trait]
impl VersionControl for GitRepository {
    async fn blame(&self, path: &str) -> Result<Vec<AttributionLine>, VcsError> {
        let relative = self.relative_path(path)?;
        self.with_repo(move |repo| {
            let start = std::time::Instant::now();
            let blame = repo.blame_file(Path::new(&relative), None)?;

            let mut lines = Vec::new();
            for hunk in blame.iter() {
                let oid = hunk.final_commit_id();
                let signature = hunk.final_signature();
                let author = signature.name().unwrap_or("Unknown").to_string();
                let date = chrono::DateTime::from_timestamp(signature.when().seconds(), 0)
                    .map(|d| d.to_rfc3339());
                let revision = oid.to_string();

                for offset in 0..hunk.lines_in_hunk() {
                    let line_number = hunk.final_start_line() + offset;
                    if oid.is_zero() {
                        lines.push(AttributionLine::uncommitted(line_number));
                    } else {
                        lines.push(AttributionLine::committed(
                            line_number,
                            &revision,
                            &author,
                            date.as_deref(),
                        ));
                    }
                }
            }

            tracing::info!("Blamed {} ({} lines) in {:?}", relative, lines.len(), start.elapsed());
            Ok(lines)
        })
        .await
    }

    async fn log(&self, from: &str, to: &str, limit: usize) -> Result<Vec<CommitMessage>, VcsError> {
        let (from, to) = (from.to_string(), to.to_string());
        self.with_repo(move |repo| log_range(repo, &from, &to, limit)).await
    }

    async fn log_batch(&self, revisions: &[String]) -> Result<Vec<CommitMessage>, VcsError> {
        let revisions = revisions.to_vec();
        self.with_repo(move |repo| log_batch(repo, &revisions)).await
    }

    async fn info(&self, path: &str) -> Result<(), VcsError> {
        let relative = self.relative_path(path)?;
        self.with_repo(move |repo| {
            let status = repo.status_file(Path::new(&relative))?;
            if status.intersects(Status::WT_NEW | Status::INDEX_NEW | Status::IGNORED) {
                return Err(VcsError::NotVersioned(format!("{} has no committed history", relative)));
            }
            Ok(())
        })
        .await
    }

    async fn show(&self, path: &str, revision: &str) -> Result<String, VcsError> {
        let relative = self.relative_path(path)?;
        let spec = format!("{}:{}", revision, relative);
        self.with_repo(move |repo| {
            let blob = repo.revparse_single(&spec)?.peel_to_blob()?;
            String::from_utf8(blob.content().to_vec())
                .map_err(|_| VcsError::Unparseable(format!("{} is not valid UTF-8", spec)))
        })
        .await
    }
}

/// Head commit message, used by the server banner.
pub fn head_summary(repo: &GitRepository) -> Option<CommitMessage> {
    let repo = repo.repo.lock().ok()?;
    let head = repo.head().ok()?.peel_to_commit().ok()?;
    Some(commit_to_message(&head))
}

pub fn format_relative_time(timestamp: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let diff = now - timestamp;

    if diff < 60 {
        "just now".to_string()
    } else if diff < 3600 {
        let mins = diff / 60;
        format!("{} minute{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if diff < 86400 {
        let hours = diff / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if diff < 2592000 {
        let days = diff / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else if diff < 31536000 {
        let months = diff / 2592000;
        format!("{} month{} ago", months, if months == 1 { "" } else { "s" })
    } else {
        let years = diff / 31536000;
        format!("{} year{} ago", years, if years == 1 { "" } else { "s" })
    }
}
