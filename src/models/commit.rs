use serde::{Deserialize, Serialize};

/// A revision paired with its commit message, as returned by `log` and
/// `log_batch`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitMessage {
    pub revision: String,
    pub msg: String,
}

impl CommitMessage {
    pub fn new(revision: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            revision: revision.into(),
            msg: msg.into(),
        }
    }
}
