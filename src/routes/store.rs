//! `DecorationHost` for HTTP clients.
//!
//! The annotator pushes decorations and notices; clients poll for them. The
//! store keeps the latest set per document and a bounded queue of notices.

use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};

use crate::annotate::DecorationHost;
use crate::models::{DecorationSet, Notice};

const MAX_QUEUED_NOTICES: usize = 100;

#[derive(Default)]
pub struct DecorationStore {
    decorations: RwLock<HashMap<String, DecorationSet>>,
    notices: Mutex<VecDeque<Notice>>,
}

impl DecorationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, document: &str) -> Option<DecorationSet> {
        self.decorations.read().get(document).cloned()
    }

    pub fn documents(&self) -> Vec<String> {
        let mut documents: Vec<String> = self.decorations.read().keys().cloned().collect();
        documents.sort();
        documents
    }

    /// Take every queued notice, oldest first.
    pub fn drain_notices(&self) -> Vec<Notice> {
        self.notices.lock().drain(..).collect()
    }
}

impl DecorationHost for DecorationStore {
    fn apply(&self, document: &str, decorations: DecorationSet) {
        self.decorations.write().insert(document.to_string(), decorations);
    }

    fn clear(&self, document: &str) {
        self.decorations.write().remove(document);
    }

    fn notify(&self, notice: Notice) {
        let mut notices = self.notices.lock();
        if notices.len() == MAX_QUEUED_NOTICES {
            if let Some(dropped) = notices.pop_front() {
                tracing::warn!("Dropping unread notice for {}", dropped.document());
            }
        }
        notices.push_back(notice);
    }
}
