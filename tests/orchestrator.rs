//! End-to-end behavior of the annotation pipeline against a scripted
//! collaborator and a recording host.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};

use blame_lens::annotate::{Annotator, DecorationHost, ThemeKind};
use blame_lens::config::AnnotationConfig;
use blame_lens::error::{ErrorKind, VcsError};
use blame_lens::git::VersionControl;
use blame_lens::models::{AttributionLine, CommitMessage, DecorationSet, Notice, RenderPhase};

const DOC: &str = "src/lib.rs";

#[derive(Debug)]
enum HostEvent {
    Applied(DecorationSet),
    Cleared(String),
    Notified(Notice),
}

struct RecordingHost {
    tx: mpsc::UnboundedSender<HostEvent>,
}

impl DecorationHost for RecordingHost {
    fn apply(&self, _document: &str, decorations: DecorationSet) {
        let _ = self.tx.send(HostEvent::Applied(decorations));
    }

    fn clear(&self, document: &str) {
        let _ = self.tx.send(HostEvent::Cleared(document.to_string()));
    }

    fn notify(&self, notice: Notice) {
        let _ = self.tx.send(HostEvent::Notified(notice));
    }
}

struct FakeFile {
    content: String,
    lines: Vec<AttributionLine>,
}

#[derive(Default)]
struct FakeVcs {
    files: Mutex<HashMap<String, FakeFile>>,
    messages: Mutex<HashMap<String, String>>,
    info_errors: Mutex<HashMap<String, VcsError>>,
    batch_error: Mutex<Option<VcsError>>,
    blame_gate: Mutex<Option<Arc<Semaphore>>>,
    batch_gate: Mutex<Option<Arc<Semaphore>>>,
    blame_calls: AtomicUsize,
    batch_calls: AtomicUsize,
}

impl FakeVcs {
    fn add_file(&self, path: &str, content: &str, lines: Vec<AttributionLine>) {
        self.files.lock().insert(
            path.to_string(),
            FakeFile {
                content: content.to_string(),
                lines,
            },
        );
    }

    fn add_message(&self, revision: &str, message: &str) {
        self.messages.lock().insert(revision.to_string(), message.to_string());
    }

    fn fail_info(&self, path: &str, err: VcsError) {
        self.info_errors.lock().insert(path.to_string(), err);
    }

    /// Hold blame calls until permits are added.
    fn gate_blame(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.blame_gate.lock() = Some(Arc::clone(&gate));
        gate
    }

    /// Hold message batches until permits are added.
    fn gate_batch(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.batch_gate.lock() = Some(Arc::clone(&gate));
        gate
    }

    fn blame_calls(&self) -> usize {
        self.blame_calls.load(Ordering::SeqCst)
    }

    fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }
}

async fn pass_gate(gate: Option<Arc<Semaphore>>) {
    if let Some(gate) = gate {
        gate.acquire().await.unwrap().forget();
    }
}

#[async_trait]
impl VersionControl for FakeVcs {
    async fn blame(&self, path: &str) -> Result<Vec<AttributionLine>, VcsError> {
        self.blame_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.blame_gate.lock().clone();
        pass_gate(gate).await;

        self.files
            .lock()
            .get(path)
            .map(|f| f.lines.clone())
            .ok_or_else(|| VcsError::NotVersioned(path.to_string()))
    }

    async fn log(&self, _from: &str, _to: &str, _limit: usize) -> Result<Vec<CommitMessage>, VcsError> {
        Ok(Vec::new())
    }

    async fn log_batch(&self, revisions: &[String]) -> Result<Vec<CommitMessage>, VcsError> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.batch_gate.lock().clone();
        pass_gate(gate).await;

        if let Some(err) = self.batch_error.lock().clone() {
            return Err(err);
        }
        let messages = self.messages.lock();
        Ok(revisions
            .iter()
            .filter_map(|rev| messages.get(rev).map(|msg| CommitMessage::new(rev.as_str(), msg.as_str())))
            .collect())
    }

    async fn info(&self, path: &str) -> Result<(), VcsError> {
        match self.info_errors.lock().get(path) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    async fn show(&self, path: &str, _revision: &str) -> Result<String, VcsError> {
        self.files
            .lock()
            .get(path)
            .map(|f| f.content.clone())
            .ok_or_else(|| VcsError::NotVersioned(path.to_string()))
    }
}

struct Harness {
    vcs: Arc<FakeVcs>,
    annotator: Arc<Annotator>,
    events: mpsc::UnboundedReceiver<HostEvent>,
}

impl Harness {
    fn new(config: AnnotationConfig) -> Self {
        let vcs = Arc::new(FakeVcs::default());
        let (tx, events) = mpsc::unbounded_channel();
        let host: Arc<dyn DecorationHost> = Arc::new(RecordingHost { tx });
        let collaborator: Arc<dyn VersionControl> = vcs.clone();
        let annotator = Annotator::new(collaborator, host, config, ThemeKind::Light);
        Self { vcs, annotator, events }
    }

    /// Three lines: alice wrote 1 and 3 in r100, bob wrote 2 in r101.
    fn with_scenario(config: AnnotationConfig) -> Self {
        let harness = Self::new(config);
        harness.vcs.add_file(
            DOC,
            "fn a() {}\nfn b() {}\nfn c() {}\n",
            vec![
                AttributionLine::committed(1, "100", "alice", Some("2024-03-01T10:00:00+00:00")),
                AttributionLine::committed(2, "101", "bob", Some("2024-03-02T10:00:00+00:00")),
                AttributionLine::committed(3, "100", "alice", Some("2024-03-01T10:00:00+00:00")),
            ],
        );
        harness.vcs.add_message("100", "Add a and c");
        harness.vcs.add_message("101", "Add b");
        harness
    }

    async fn next_event(&mut self) -> HostEvent {
        tokio::time::timeout(Duration::from_secs(5), self.events.recv())
            .await
            .expect("timed out waiting for host event")
            .expect("host channel closed")
    }

    async fn next_applied(&mut self) -> DecorationSet {
        match self.next_event().await {
            HostEvent::Applied(set) => set,
            other => panic!("expected decorations, got {:?}", other),
        }
    }

    /// Report what reached the host once background work has settled.
    ///
    /// Every test runs on a paused clock, which only advances when all other
    /// tasks are idle, so the sleep returns after pending work has parked.
    async fn drain(&mut self) -> Vec<HostEvent> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    async fn wait_for_phase(&self, document: &str, phase: RenderPhase) {
        for _ in 0..500 {
            if self.annotator.phase(document) == phase {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!(
            "{} never reached {:?} (stuck at {:?})",
            document,
            phase,
            self.annotator.phase(document)
        );
    }
}

async fn wait_until(condition: impl Fn() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition never held");
}

fn working(lines: &[&str]) -> Vec<String> {
    lines.iter().map(|l| l.to_string()).collect()
}

fn scenario_lines() -> Vec<String> {
    working(&["fn a() {}", "fn b() {}", "fn c() {}"])
}

fn without_messages() -> AnnotationConfig {
    AnnotationConfig {
        fetch_messages: false,
        ..AnnotationConfig::default()
    }
}

fn count_notices(events: &[HostEvent]) -> usize {
    events.iter().filter(|e| matches!(e, HostEvent::Notified(_))).count()
}

#[tokio::test(start_paused = true)]
async fn test_immediate_render_precedes_enrichment() {
    let mut h = Harness::with_scenario(AnnotationConfig::default());
    let gate = h.vcs.gate_batch();

    h.annotator.render_request(DOC, &scenario_lines(), Some(1)).await;

    let first = h.next_applied().await;
    assert!(!first.with_messages);
    assert_eq!(first.len(), 3);
    assert!(first.line(1).unwrap().hover.is_none());
    assert_eq!(h.annotator.phase(DOC), RenderPhase::FetchingMessages);

    gate.add_permits(1);
    let second = h.next_applied().await;
    assert!(second.with_messages);
    assert_eq!(second.line(1).unwrap().hover.as_deref(), Some("Add a and c"));
    assert!(second.line(1).unwrap().inline_text.as_deref().unwrap().contains("Add a and c"));
    assert!(second.line(2).unwrap().inline_text.is_none());
    h.wait_for_phase(DOC, RenderPhase::RenderedWithMessages).await;
    assert_eq!(h.vcs.batch_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_scenario_colors_follow_revisions() {
    let mut h = Harness::with_scenario(without_messages());

    h.annotator.render_request(DOC, &scenario_lines(), None).await;
    let set = h.next_applied().await;

    let color = |n| set.line(n).unwrap().color.clone();
    assert_eq!(color(1), color(3));
    assert_ne!(color(1), color(2));
    assert!(set.line(2).unwrap().gutter_text.as_deref().unwrap().contains("bob"));
    assert_eq!(h.annotator.phase(DOC), RenderPhase::RenderedWithoutMessages);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_requests_share_one_fetch() {
    let mut h = Harness::with_scenario(without_messages());
    let gate = h.vcs.gate_blame();

    let first = {
        let annotator = Arc::clone(&h.annotator);
        tokio::spawn(async move { annotator.render_request(DOC, &scenario_lines(), None).await })
    };
    let second = {
        let annotator = Arc::clone(&h.annotator);
        tokio::spawn(async move { annotator.render_request(DOC, &scenario_lines(), None).await })
    };

    for _ in 0..100 {
        if h.annotator.stats().in_flight_fetches == 1 && h.vcs.blame_calls() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    tokio::time::sleep(Duration::from_millis(20)).await;
    gate.add_permits(2);
    first.await.unwrap();
    second.await.unwrap();

    assert_eq!(h.vcs.blame_calls(), 1);
    assert_eq!(h.next_applied().await.len(), 3);
    assert_eq!(h.annotator.stats().in_flight_fetches, 0);
}

#[tokio::test(start_paused = true)]
async fn test_cached_attribution_is_reused() {
    let mut h = Harness::with_scenario(without_messages());

    h.annotator.render_request(DOC, &scenario_lines(), None).await;
    h.annotator.render_request(DOC, &scenario_lines(), Some(2)).await;
    h.next_applied().await;
    h.next_applied().await;

    assert_eq!(h.vcs.blame_calls(), 1);
    let stats = h.annotator.stats();
    assert_eq!(stats.attribution.entries, 1);
    assert_eq!(stats.attribution.hits, 1);
}

#[tokio::test(start_paused = true)]
async fn test_disable_during_enrichment_discards_messages() {
    let mut h = Harness::with_scenario(AnnotationConfig::default());
    let gate = h.vcs.gate_batch();

    h.annotator.render_request(DOC, &scenario_lines(), None).await;
    assert!(!h.next_applied().await.with_messages);

    h.annotator.set_enabled(DOC, false);
    assert!(matches!(h.next_event().await, HostEvent::Cleared(doc) if doc == DOC));

    gate.add_permits(1);
    h.wait_for_phase(DOC, RenderPhase::Aborted).await;
    let late = h.drain().await;
    assert!(late.is_empty(), "unexpected host events: {:?}", late);

    // Messages still landed in the cache for next time.
    h.annotator.set_enabled(DOC, true);
    h.annotator.render_request(DOC, &scenario_lines(), None).await;
    let set = h.next_applied().await;
    assert!(set.with_messages);
    assert_eq!(h.vcs.batch_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_switching_documents_aborts_enrichment() {
    let mut h = Harness::with_scenario(AnnotationConfig::default());
    let gate = h.vcs.gate_batch();

    h.annotator.render_request(DOC, &scenario_lines(), None).await;
    h.next_applied().await;

    h.annotator.set_active(Some("src/other.rs"));
    gate.add_permits(1);

    h.wait_for_phase(DOC, RenderPhase::Aborted).await;
    assert!(h.drain().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_not_versioned_is_silent() {
    let mut h = Harness::new(AnnotationConfig::default());
    h.vcs
        .fail_info("notes.txt", VcsError::NotVersioned("notes.txt is untracked".to_string()));

    h.annotator.render_request("notes.txt", &working(&["todo"]), None).await;

    assert!(matches!(h.next_event().await, HostEvent::Cleared(doc) if doc == "notes.txt"));
    assert_eq!(count_notices(&h.drain().await), 0);
    assert_eq!(h.vcs.blame_calls(), 0);
    assert_eq!(h.annotator.phase("notes.txt"), RenderPhase::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_auth_failure_notifies_once() {
    let mut h = Harness::with_scenario(AnnotationConfig::default());
    h.vcs
        .fail_info(DOC, VcsError::AuthRequired("authentication failed".to_string()));

    h.annotator.render_request(DOC, &scenario_lines(), None).await;
    h.annotator.render_request(DOC, &scenario_lines(), None).await;

    let events = h.drain().await;
    assert_eq!(count_notices(&events), 1);
    let notice = events
        .iter()
        .find_map(|e| match e {
            HostEvent::Notified(n) => Some(n.clone()),
            _ => None,
        })
        .unwrap();
    match notice {
        Notice::FetchFailed { error, hint, .. } => {
            assert_eq!(error, ErrorKind::AuthRequired);
            assert!(hint.is_some());
        }
        other => panic!("unexpected notice {:?}", other),
    }
    // Failures are not cached: both requests went back to the collaborator.
    assert_eq!(h.annotator.stats().attribution.entries, 0);
}

#[tokio::test(start_paused = true)]
async fn test_internal_failures_escalate_after_three() {
    let mut h = Harness::with_scenario(AnnotationConfig::default());
    h.vcs.fail_info(DOC, VcsError::Internal("blame walker crashed".to_string()));

    for _ in 0..2 {
        h.annotator.render_request(DOC, &scenario_lines(), None).await;
    }
    assert_eq!(count_notices(&h.drain().await), 0);

    for _ in 0..3 {
        h.annotator.render_request(DOC, &scenario_lines(), None).await;
    }
    let events = h.drain().await;
    assert_eq!(count_notices(&events), 1);
    assert!(events.iter().any(|e| matches!(
        e,
        HostEvent::Notified(Notice::RepeatedFailure { failures: 3, .. })
    )));
}

#[tokio::test(start_paused = true)]
async fn test_divergent_working_copy_is_correlated() {
    let mut h = Harness::with_scenario(without_messages());

    let edited = working(&["// header", "fn a() {}", "fn b() {}", "fn c() {}"]);
    h.annotator.render_request(DOC, &edited, None).await;
    let set = h.next_applied().await;

    assert!(set.line(1).is_none());
    assert_eq!(set.line(2).unwrap().revision.as_deref(), Some("100"));
    assert_eq!(set.line(3).unwrap().revision.as_deref(), Some("101"));
    assert_eq!(set.line(4).unwrap().revision.as_deref(), Some("100"));
    assert_eq!(h.annotator.stats().cached_mappings, 1);
}

#[tokio::test(start_paused = true)]
async fn test_invalidate_forces_refetch() {
    let mut h = Harness::with_scenario(without_messages());

    h.annotator.render_request(DOC, &scenario_lines(), None).await;
    h.annotator.invalidate(DOC);
    h.annotator.render_request(DOC, &scenario_lines(), None).await;

    h.next_applied().await;
    h.next_applied().await;
    assert_eq!(h.vcs.blame_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_large_file_is_skipped_with_one_notice() {
    let mut config = AnnotationConfig::default();
    config.large_file.line_threshold = 2;
    let mut h = Harness::with_scenario(config);

    h.annotator.render_request(DOC, &scenario_lines(), None).await;
    h.annotator.render_request(DOC, &scenario_lines(), None).await;

    let events = h.drain().await;
    assert_eq!(count_notices(&events), 1);
    assert!(events.iter().any(|e| matches!(
        e,
        HostEvent::Notified(Notice::LargeFile { line_count: 3, threshold: 2, .. })
    )));
    assert_eq!(h.vcs.blame_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_many_revisions_skip_enrichment() {
    let mut h = Harness::new(AnnotationConfig::default());
    let content: Vec<String> = (1..=101).map(|i| format!("line {}", i)).collect();
    let lines = (1..=101)
        .map(|i| AttributionLine::committed(i, &i.to_string(), "alice", None))
        .collect();
    h.vcs.add_file(DOC, &content.join("\n"), lines);

    h.annotator.render_request(DOC, &content, None).await;

    let set = h.next_applied().await;
    assert_eq!(set.len(), 101);
    assert!(!set.with_messages);
    assert_eq!(h.annotator.phase(DOC), RenderPhase::RenderedWithoutMessages);
    assert_eq!(h.vcs.batch_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_eviction_forces_refetch() {
    let config = AnnotationConfig {
        attribution_cache_capacity: 1,
        ..without_messages()
    };
    let h = Harness::with_scenario(config);
    h.vcs.add_file(
        "src/main.rs",
        "fn main() {}\n",
        vec![AttributionLine::committed(1, "102", "carol", None)],
    );

    h.annotator.render_request(DOC, &scenario_lines(), None).await;
    h.annotator
        .render_request("src/main.rs", &working(&["fn main() {}"]), None)
        .await;
    h.annotator.render_request(DOC, &scenario_lines(), None).await;

    assert_eq!(h.vcs.blame_calls(), 3);
    let stats = h.annotator.stats();
    assert_eq!(stats.attribution.entries, 1);
    assert_eq!(stats.attribution.evictions, 2);
    assert_eq!(stats.tracked_documents, 1);
}

#[tokio::test(start_paused = true)]
async fn test_eviction_keeps_disabled_document_state() {
    let config = AnnotationConfig {
        attribution_cache_capacity: 1,
        ..without_messages()
    };
    let h = Harness::with_scenario(config);
    h.vcs.add_file(
        "src/main.rs",
        "fn main() {}\n",
        vec![AttributionLine::committed(1, "102", "carol", None)],
    );

    h.annotator.render_request(DOC, &scenario_lines(), None).await;
    h.annotator.set_enabled(DOC, false);
    h.annotator
        .render_request("src/main.rs", &working(&["fn main() {}"]), None)
        .await;

    assert!(h.annotator.is_disabled(DOC));
    assert_eq!(h.annotator.stats().tracked_documents, 2);
}

#[tokio::test(start_paused = true)]
async fn test_invalidate_during_fetch_discards_stale_attribution() {
    let mut h = Harness::with_scenario(without_messages());
    let gate = h.vcs.gate_blame();

    let pending = {
        let annotator = Arc::clone(&h.annotator);
        tokio::spawn(async move { annotator.render_request(DOC, &scenario_lines(), None).await })
    };
    let vcs = Arc::clone(&h.vcs);
    wait_until(move || vcs.blame_calls() == 1).await;

    // Saved while blame was running.
    h.annotator.invalidate(DOC);
    gate.add_permits(1);
    pending.await.unwrap();

    let late = h.drain().await;
    assert!(late.is_empty(), "unexpected host events: {:?}", late);
    assert_eq!(h.annotator.stats().attribution.entries, 0);
    assert_eq!(h.annotator.phase(DOC), RenderPhase::Idle);

    gate.add_permits(1);
    h.annotator.render_request(DOC, &scenario_lines(), None).await;
    assert_eq!(h.next_applied().await.len(), 3);
    assert_eq!(h.vcs.blame_calls(), 2);
    assert_eq!(h.annotator.stats().attribution.entries, 1);
}

#[tokio::test(start_paused = true)]
async fn test_clear_during_fetch_skips_render_but_caches() {
    let mut h = Harness::with_scenario(without_messages());
    let gate = h.vcs.gate_blame();

    let pending = {
        let annotator = Arc::clone(&h.annotator);
        tokio::spawn(async move { annotator.render_request(DOC, &scenario_lines(), None).await })
    };
    let vcs = Arc::clone(&h.vcs);
    wait_until(move || vcs.blame_calls() == 1).await;

    h.annotator.clear(DOC);
    assert!(matches!(h.next_event().await, HostEvent::Cleared(doc) if doc == DOC));
    gate.add_permits(1);
    pending.await.unwrap();

    let late = h.drain().await;
    assert!(late.is_empty(), "unexpected host events: {:?}", late);
    assert_eq!(h.annotator.phase(DOC), RenderPhase::Idle);
    assert_eq!(h.annotator.stats().attribution.entries, 1);

    h.annotator.render_request(DOC, &scenario_lines(), None).await;
    assert_eq!(h.next_applied().await.len(), 3);
    assert_eq!(h.vcs.blame_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_joined_batch_fetches_its_own_missing_messages() {
    let mut h = Harness::with_scenario(AnnotationConfig::default());
    let gate = h.vcs.gate_batch();

    // Line 2 deleted, so only r100 is wanted.
    h.annotator
        .render_request(DOC, &working(&["fn a() {}", "fn c() {}"]), None)
        .await;
    assert_eq!(h.next_applied().await.len(), 2);

    h.annotator.render_request(DOC, &scenario_lines(), None).await;
    assert!(!h.next_applied().await.with_messages);

    // Let the second enrichment attach to the batch still fetching r100.
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(h.vcs.batch_calls(), 1);
    gate.add_permits(2);

    let set = h.next_applied().await;
    assert!(set.with_messages);
    assert_eq!(set.line(1).unwrap().hover.as_deref(), Some("Add a and c"));
    assert_eq!(set.line(2).unwrap().hover.as_deref(), Some("Add b"));
    h.wait_for_phase(DOC, RenderPhase::RenderedWithMessages).await;
    assert_eq!(h.vcs.batch_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_debounced_renders_coalesce() {
    let mut h = Harness::with_scenario(without_messages());

    for cursor in 1..=3 {
        h.annotator.schedule_render(DOC, scenario_lines(), Some(cursor));
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(h.vcs.blame_calls(), 0);

    let set = h.next_applied().await;
    assert_eq!(set.len(), 3);
    assert!(h.drain().await.is_empty());
    assert_eq!(h.vcs.blame_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_config_update_changes_rendering() {
    let mut h = Harness::with_scenario(without_messages());

    h.annotator.render_request(DOC, &scenario_lines(), None).await;
    h.next_applied().await;

    let mut config = without_messages();
    config.gutter.template = "${author}".to_string();
    h.annotator.update_config(config).unwrap();
    h.annotator.render_request(DOC, &scenario_lines(), None).await;

    let set = h.next_applied().await;
    assert_eq!(set.line(2).unwrap().gutter_text.as_deref(), Some("bob"));

    let invalid = AnnotationConfig {
        message_cache_capacity: 0,
        ..AnnotationConfig::default()
    };
    assert!(h.annotator.update_config(invalid).is_err());
    assert_eq!(h.annotator.config().gutter.template, "${author}");
}

#[tokio::test(start_paused = true)]
async fn test_disabled_document_ignores_requests() {
    let mut h = Harness::with_scenario(without_messages());

    h.annotator.set_enabled(DOC, false);
    h.annotator.render_request(DOC, &scenario_lines(), None).await;
    assert_eq!(h.vcs.blame_calls(), 0);

    assert!(h.annotator.toggle(DOC));
    h.annotator.render_request(DOC, &scenario_lines(), None).await;

    let events = h.drain().await;
    assert!(matches!(&events[0], HostEvent::Cleared(_)));
    assert!(matches!(&events[1], HostEvent::Applied(set) if set.len() == 3));
}

#[tokio::test(start_paused = true)]
async fn test_clear_removes_decorations() {
    let mut h = Harness::with_scenario(without_messages());

    h.annotator.render_request(DOC, &scenario_lines(), None).await;
    h.next_applied().await;

    h.annotator.clear(DOC);
    assert!(matches!(h.next_event().await, HostEvent::Cleared(doc) if doc == DOC));
    assert_eq!(h.annotator.phase(DOC), RenderPhase::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_open_respects_auto_trigger() {
    let config = AnnotationConfig {
        auto_trigger_on_open: false,
        ..without_messages()
    };
    let h = Harness::with_scenario(config);

    assert!(!h.annotator.open_document(DOC, &scenario_lines()).await);
    assert_eq!(h.vcs.blame_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_enrichment_failure_keeps_plain_decorations() {
    let mut h = Harness::with_scenario(AnnotationConfig::default());
    *h.vcs.batch_error.lock() = Some(VcsError::NetworkUnavailable("connection refused".to_string()));

    h.annotator.render_request(DOC, &scenario_lines(), None).await;
    assert!(!h.next_applied().await.with_messages);

    h.wait_for_phase(DOC, RenderPhase::RenderedWithoutMessages).await;
    let events = h.drain().await;
    assert_eq!(events.len(), 1);
    assert!(matches!(
        &events[0],
        HostEvent::Notified(Notice::FetchFailed {
            error: ErrorKind::NetworkUnavailable,
            ..
        })
    ));
}
