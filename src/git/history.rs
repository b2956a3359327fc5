use git2::{Repository, Sort};

use crate::error::VcsError;
use crate::models::CommitMessage;

/// First line of a commit message, trimmed.
pub fn commit_to_message(commit: &git2::Commit) -> CommitMessage {
    let summary = commit
        .message()
        .unwrap_or("")
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("")
        .to_string();
    CommitMessage::new(commit.id().to_string(), summary)
}

/// Walk back from `to` until `from` is reached (inclusive) or `limit` messages
/// have been collected.
pub fn log_range(repo: &Repository, from: &str, to: &str, limit: usize) -> Result<Vec<CommitMessage>, VcsError> {
    let to_oid = repo.revparse_single(to)?.peel_to_commit()?.id();
    let from_oid = repo.revparse_single(from)?.peel_to_commit()?.id();

    let mut revwalk = repo.revwalk()?;
    revwalk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME)?;
    revwalk.push(to_oid)?;

    let mut messages = Vec::new();
    for oid in revwalk {
        if messages.len() >= limit {
            break;
        }

        let oid = oid?;
        let commit = repo.find_commit(oid)?;
        messages.push(commit_to_message(&commit));

        if oid == from_oid {
            break;
        }
    }

    Ok(messages)
}

/// Look up each revision directly; one lock acquisition and one call for the
/// whole set.
pub fn log_batch(repo: &Repository, revisions: &[String]) -> Result<Vec<CommitMessage>, VcsError> {
    let mut messages = Vec::with_capacity(revisions.len());

    for revision in revisions {
        let commit = match repo.revparse_single(revision).and_then(|obj| obj.peel_to_commit()) {
            Ok(commit) => commit,
            Err(e)
                if matches!(
                    e.code(),
                    git2::ErrorCode::NotFound | git2::ErrorCode::Ambiguous | git2::ErrorCode::InvalidSpec
                ) =>
            {
                tracing::debug!("Skipping unknown revision {}: {}", revision, e.message());
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        messages.push(commit_to_message(&commit));
    }

    Ok(messages)
}
