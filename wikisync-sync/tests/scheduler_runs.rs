//! End-to-end runs of the scheduler against an in-memory wiki.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::time::Instant;

use wikisync_core::{
    Credentials, EditRequest, PageRevision, RemoteError, RemoteService, Reviser, WriteReceipt,
    MISSING_TITLE,
};
use wikisync_middleware::{PipelineStep, StepError};
use wikisync_sync::{
    change_cache::{self, fingerprint},
    ChangeCache, ConfigError, Retention, RunConfiguration, Scheduler, SchedulerState, SyncError,
    SyncEvent, WriteOutcome,
};

// ---------------------------------------------------------------------------
// Fake remote
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Edit(String),
    Create(String),
}

#[derive(Default)]
struct FakeWiki {
    pages: Mutex<BTreeMap<String, String>>,
    calls: Mutex<Vec<(Call, Instant)>>,
    submitted: Mutex<Vec<(String, String, String)>>,
    login_error: Option<RemoteError>,
    edit_errors: HashMap<String, RemoteError>,
    create_errors: HashMap<String, RemoteError>,
}

impl FakeWiki {
    fn with_page(self, title: &str, text: &str) -> Self {
        self.pages
            .lock()
            .unwrap()
            .insert(title.to_string(), text.to_string());
        self
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().iter().map(|(c, _)| c.clone()).collect()
    }

    fn page(&self, title: &str) -> Option<String> {
        self.pages.lock().unwrap().get(title).cloned()
    }
}

#[async_trait]
impl RemoteService for FakeWiki {
    async fn login(&self) -> Result<(), RemoteError> {
        match &self.login_error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    async fn edit(&self, title: &str, reviser: Reviser<'_>) -> Result<WriteReceipt, RemoteError> {
        self.calls
            .lock()
            .unwrap()
            .push((Call::Edit(title.to_string()), Instant::now()));
        if let Some(err) = self.edit_errors.get(title) {
            return Err(err.clone());
        }
        let current = match self.page(title) {
            Some(content) => content,
            None => return Err(RemoteError::api(MISSING_TITLE, "The page you specified doesn't exist.")),
        };
        let revision = PageRevision {
            title: title.to_string(),
            content: current,
            revision_id: Some(1),
            timestamp: None,
        };
        match reviser(&revision) {
            EditRequest::NoChange => Ok(WriteReceipt {
                title: title.to_string(),
                revision_id: Some(1),
                no_change: true,
            }),
            EditRequest::Submit { summary, text } => {
                self.submitted
                    .lock()
                    .unwrap()
                    .push((title.to_string(), summary, text.clone()));
                self.pages.lock().unwrap().insert(title.to_string(), text);
                Ok(WriteReceipt {
                    title: title.to_string(),
                    revision_id: Some(2),
                    no_change: false,
                })
            }
        }
    }

    async fn create(
        &self,
        title: &str,
        text: &str,
        summary: &str,
    ) -> Result<WriteReceipt, RemoteError> {
        self.calls
            .lock()
            .unwrap()
            .push((Call::Create(title.to_string()), Instant::now()));
        if let Some(err) = self.create_errors.get(title) {
            return Err(err.clone());
        }
        self.submitted
            .lock()
            .unwrap()
            .push((title.to_string(), summary.to_string(), text.to_string()));
        self.pages
            .lock()
            .unwrap()
            .insert(title.to_string(), text.to_string());
        Ok(WriteReceipt {
            title: title.to_string(),
            revision_id: Some(1),
            no_change: false,
        })
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

const INTERVAL: Duration = Duration::from_millis(500);

fn config(root: &Path) -> RunConfiguration {
    let creds = Credentials {
        username: "Bot@sync".into(),
        password: "secret".into(),
        api_url: "http://wiki.test/api.php".into(),
        user_agent: None,
    };
    let mut config = RunConfiguration::new(creds, root.join("src"), root.join("cache.json"));
    config.edit_interval = INTERVAL;
    config
}

fn write_source(root: &Path, relative: &str, body: &str) {
    let path = root.join("src").join(relative);
    std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    std::fs::write(path, body).expect("write source");
}

fn drain(rx: &mut tokio::sync::broadcast::Receiver<SyncEvent>) -> Vec<SyncEvent> {
    let mut events = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => events.push(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return events,
            Err(TryRecvError::Lagged(_)) => continue,
        }
    }
}

async fn ready(config: RunConfiguration, wiki: FakeWiki) -> Scheduler<FakeWiki> {
    Scheduler::init(config, wiki).await.expect("login")
}

// ---------------------------------------------------------------------------
// Change gating
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn unchanged_content_issues_no_write() {
    let tmp = TempDir::new().expect("tmp");
    write_source(tmp.path(), "Main/Widget/Widget.lua", "hello");
    let cfg = config(tmp.path());
    let cache = ChangeCache::from([("Widget".to_string(), fingerprint("hello"))]);
    change_cache::save(&cfg.cache_file, &cache).expect("seed cache");

    let scheduler = ready(cfg, FakeWiki::default().with_page("Widget", "hello")).await;
    let report = scheduler.run(None).await.expect("run");

    assert!(scheduler.remote().calls().is_empty());
    assert!(report.outcomes.is_empty());
    assert_eq!(report.unchanged, ["Widget"]);
    assert_eq!(scheduler.state(), SchedulerState::Ready);
}

#[tokio::test(start_paused = true)]
async fn changed_content_issues_exactly_one_write_and_updates_cache() {
    let tmp = TempDir::new().expect("tmp");
    write_source(tmp.path(), "Main/Widget/Widget.lua", "hello!");
    let cfg = config(tmp.path());
    let cache_file = cfg.cache_file.clone();
    let cache = ChangeCache::from([("Widget".to_string(), fingerprint("hello"))]);
    change_cache::save(&cache_file, &cache).expect("seed cache");

    let scheduler = ready(cfg, FakeWiki::default().with_page("Widget", "hello")).await;
    let report = scheduler.run(Some("Update widget")).await.expect("run");

    assert_eq!(scheduler.remote().calls(), [Call::Edit("Widget".into())]);
    assert_eq!(
        report.outcomes,
        [WriteOutcome::Edited {
            target_id: "Widget".into(),
            revision_id: Some(2),
        }]
    );
    let submitted = scheduler.remote().submitted.lock().unwrap().clone();
    assert_eq!(
        submitted,
        [(
            "Widget".to_string(),
            "Update widget".to_string(),
            "hello!".to_string()
        )]
    );
    let persisted = change_cache::load(&cache_file);
    assert_eq!(persisted.get("Widget"), Some(&fingerprint("hello!")));
}

#[tokio::test(start_paused = true)]
async fn second_run_over_same_tree_writes_nothing() {
    let tmp = TempDir::new().expect("tmp");
    write_source(tmp.path(), "Main/A.txt", "a\n");
    write_source(tmp.path(), "Main/B.txt", "b");
    let scheduler = ready(config(tmp.path()), FakeWiki::default()).await;

    let first = scheduler.run(None).await.expect("first run");
    assert_eq!(first.written(), 2);
    let calls_after_first = scheduler.remote().calls().len();

    let second = scheduler.run(None).await.expect("second run");
    assert!(second.outcomes.is_empty());
    assert_eq!(second.unchanged, ["A", "B"]);
    assert_eq!(scheduler.remote().calls().len(), calls_after_first);
}

#[tokio::test(start_paused = true)]
async fn remote_already_matching_is_a_no_op_edit_but_still_cached() {
    let tmp = TempDir::new().expect("tmp");
    write_source(tmp.path(), "Main/Widget.lua", "same\n");
    let cfg = config(tmp.path());
    let cache_file = cfg.cache_file.clone();

    let scheduler = ready(cfg, FakeWiki::default().with_page("Widget", "same")).await;
    let report = scheduler.run(None).await.expect("run");

    assert_eq!(
        report.outcomes,
        [WriteOutcome::NoChange {
            target_id: "Widget".into()
        }]
    );
    assert!(scheduler.remote().submitted.lock().unwrap().is_empty());
    assert!(change_cache::load(&cache_file).contains_key("Widget"));
}

// ---------------------------------------------------------------------------
// Missing-title fallback and write failures
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn missing_page_falls_back_to_create_once() {
    let tmp = TempDir::new().expect("tmp");
    write_source(tmp.path(), "Main/X.txt", "fresh");
    let cfg = config(tmp.path());
    let cache_file = cfg.cache_file.clone();

    let scheduler = ready(cfg, FakeWiki::default()).await;
    let report = scheduler.run(None).await.expect("run");

    assert_eq!(
        scheduler.remote().calls(),
        [Call::Edit("X".into()), Call::Create("X".into())]
    );
    assert!(matches!(report.outcomes[0], WriteOutcome::Created { .. }));
    assert_eq!(scheduler.remote().page("X").as_deref(), Some("fresh"));
    assert_eq!(
        change_cache::load(&cache_file).get("X"),
        Some(&fingerprint("fresh"))
    );
}

#[tokio::test(start_paused = true)]
async fn failed_create_is_reported_and_not_cached() {
    let tmp = TempDir::new().expect("tmp");
    write_source(tmp.path(), "Main/X.txt", "fresh");
    let cfg = config(tmp.path());
    let cache_file = cfg.cache_file.clone();
    let wiki = FakeWiki {
        create_errors: HashMap::from([(
            "X".to_string(),
            RemoteError::api("titleblacklist", "blocked"),
        )]),
        ..Default::default()
    };

    let scheduler = ready(cfg, wiki).await;
    let mut rx = scheduler.subscribe();
    let report = scheduler.run(None).await.expect("run completes");

    assert_eq!(report.write_failures(), 1);
    assert!(!change_cache::load(&cache_file).contains_key("X"));
    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(
        e,
        SyncEvent::CreateError { unit, error } if unit.target_id == "X" && error.code() == Some("titleblacklist")
    )));
}

#[tokio::test(start_paused = true)]
async fn edit_error_is_reported_other_pages_still_written_and_retried_next_run() {
    let tmp = TempDir::new().expect("tmp");
    write_source(tmp.path(), "Main/Locked.txt", "new text");
    write_source(tmp.path(), "Main/Open.txt", "new text");
    let cfg = config(tmp.path());
    let cache_file = cfg.cache_file.clone();
    let wiki = FakeWiki {
        edit_errors: HashMap::from([(
            "Locked".to_string(),
            RemoteError::api("protectedpage", "This page has been protected"),
        )]),
        ..Default::default()
    }
    .with_page("Locked", "old")
    .with_page("Open", "old");

    let scheduler = ready(cfg, wiki).await;
    let mut rx = scheduler.subscribe();
    let report = scheduler.run(None).await.expect("run completes");

    assert_eq!(report.written(), 1);
    assert_eq!(report.write_failures(), 1);
    assert!(!scheduler.remote().calls().contains(&Call::Create("Locked".into())));
    let cache = change_cache::load(&cache_file);
    assert!(cache.contains_key("Open"));
    assert!(!cache.contains_key("Locked"));
    assert!(drain(&mut rx)
        .iter()
        .any(|e| matches!(e, SyncEvent::EditError { unit, .. } if unit.target_id == "Locked")));

    let again = scheduler.run(None).await.expect("second run");
    let retried: Vec<_> = again.outcomes.iter().map(|o| o.target_id()).collect();
    assert_eq!(retried, ["Locked"]);
}

// ---------------------------------------------------------------------------
// Pacing
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn writes_are_staggered_by_the_interval() {
    let tmp = TempDir::new().expect("tmp");
    for name in ["A", "B", "C"] {
        write_source(tmp.path(), &format!("Main/{name}.txt"), name);
    }
    let scheduler = ready(config(tmp.path()), FakeWiki::default()).await;

    let start = Instant::now();
    scheduler.run(None).await.expect("run");

    let offsets: Vec<_> = scheduler
        .remote()
        .calls
        .lock()
        .unwrap()
        .iter()
        .filter(|(call, _)| matches!(call, Call::Edit(_)))
        .map(|(_, at)| *at - start)
        .collect();
    assert_eq!(offsets.len(), 3);
    for (k, offset) in offsets.into_iter().enumerate() {
        let due = INTERVAL * (k as u32 + 1);
        assert!(
            offset >= due && offset < due + Duration::from_millis(5),
            "write {k} started at {offset:?}, expected {due:?}"
        );
    }
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

#[tokio::test]
async fn run_before_login_is_not_ready_and_has_no_side_effect() {
    let tmp = TempDir::new().expect("tmp");
    write_source(tmp.path(), "Main/A.txt", "a");
    let cfg = config(tmp.path());
    let cache_file = cfg.cache_file.clone();
    let scheduler = Scheduler::new(cfg, FakeWiki::default());

    let err = scheduler.run(None).await.expect_err("must refuse");
    assert!(matches!(
        err,
        SyncError::NotReady {
            state: SchedulerState::Idle
        }
    ));
    assert_eq!(scheduler.state(), SchedulerState::Idle);
    assert!(!cache_file.exists());
    assert!(scheduler.remote().calls().is_empty());
}

#[tokio::test]
async fn login_failure_moves_to_failed_and_publishes_error() {
    let tmp = TempDir::new().expect("tmp");
    let wiki = FakeWiki {
        login_error: Some(RemoteError::Authentication("Incorrect password".into())),
        ..Default::default()
    };
    let scheduler = Scheduler::new(config(tmp.path()), wiki);
    let mut rx = scheduler.subscribe();

    let err = scheduler.login().await.expect_err("login fails");
    assert!(matches!(err, SyncError::Authentication(_)));
    assert_eq!(scheduler.state(), SchedulerState::Failed);
    assert!(matches!(
        drain(&mut rx).as_slice(),
        [SyncEvent::LoginError { .. }]
    ));

    let err = scheduler.run(None).await.expect_err("not ready");
    assert!(matches!(
        err,
        SyncError::NotReady {
            state: SchedulerState::Failed
        }
    ));
}

#[tokio::test]
async fn missing_source_dir_is_fatal_and_leaves_scheduler_ready() {
    let tmp = TempDir::new().expect("tmp");
    let cfg = config(tmp.path());
    let cache_file = cfg.cache_file.clone();
    let scheduler = ready(cfg, FakeWiki::default()).await;

    let err = scheduler.run(None).await.expect_err("no source");
    assert!(matches!(err, SyncError::SourceMissing { .. }));
    assert_eq!(scheduler.state(), SchedulerState::Ready);
    assert!(!cache_file.exists());
}

#[cfg(target_os = "linux")]
#[tokio::test(start_paused = true)]
async fn file_with_non_utf8_name_is_skipped_and_run_completes() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let tmp = TempDir::new().expect("tmp");
    write_source(tmp.path(), "Main/Good.txt", "good");
    let bad = tmp
        .path()
        .join("src/Main")
        .join(OsStr::from_bytes(b"bad\xff.txt"));
    std::fs::write(&bad, "bad").expect("write badly named file");
    let cfg = config(tmp.path());
    let cache_file = cfg.cache_file.clone();
    let scheduler = ready(cfg, FakeWiki::default()).await;
    let mut rx = scheduler.subscribe();

    let report = scheduler.run(None).await.expect("run");

    assert_eq!(report.discovered, 1);
    assert_eq!(report.written(), 1);
    assert_eq!(scheduler.remote().page("Good").as_deref(), Some("good"));
    assert!(change_cache::load(&cache_file).contains_key("Good"));
    assert_eq!(drain(&mut rx).last(), Some(&SyncEvent::RunEnded));
}

#[tokio::test(start_paused = true)]
async fn cache_save_failure_still_returns_the_report() {
    let tmp = TempDir::new().expect("tmp");
    write_source(tmp.path(), "Main/A.txt", "a");
    std::fs::write(tmp.path().join("blocker"), "not a directory").expect("blocker");
    let mut cfg = config(tmp.path());
    cfg.cache_file = tmp.path().join("blocker").join("cache.json");
    let scheduler = ready(cfg, FakeWiki::default()).await;
    let mut rx = scheduler.subscribe();

    let report = scheduler.run(None).await.expect("run");

    assert_eq!(report.written(), 1);
    assert_eq!(scheduler.remote().page("A").as_deref(), Some("a"));
    assert!(report.cache_error.is_some());
    assert!(!report.is_clean());
    assert_eq!(drain(&mut rx).last(), Some(&SyncEvent::RunEnded));
    assert_eq!(scheduler.state(), SchedulerState::Ready);
}

#[tokio::test(start_paused = true)]
async fn amendments_and_reentry_are_refused_while_running() {
    let tmp = TempDir::new().expect("tmp");
    write_source(tmp.path(), "Main/A.txt", "a");
    let scheduler = Arc::new(ready(config(tmp.path()), FakeWiki::default()).await);

    let running = {
        let scheduler = Arc::clone(&scheduler);
        tokio::spawn(async move { scheduler.run(None).await })
    };
    // The run is now parked in its first paced sleep.
    tokio::time::sleep(INTERVAL / 2).await;
    assert_eq!(scheduler.state(), SchedulerState::Running);

    let err = scheduler
        .add_steps([PipelineStep::from_fn("late", |_, _| Ok(()))])
        .expect_err("refused");
    assert!(matches!(err, ConfigError::RunInProgress));
    assert!(matches!(
        scheduler.set_settings(Default::default()),
        Err(ConfigError::RunInProgress)
    ));
    assert!(matches!(
        scheduler.run(None).await,
        Err(SyncError::NotReady {
            state: SchedulerState::Running
        })
    ));

    running.await.expect("join").expect("run");
    assert_eq!(scheduler.state(), SchedulerState::Ready);
    scheduler
        .add_steps([PipelineStep::from_fn("late", |_, _| Ok(()))])
        .expect("allowed once idle");
    assert_eq!(scheduler.config().steps.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn run_publishes_lifecycle_and_middleware_events() {
    let tmp = TempDir::new().expect("tmp");
    write_source(tmp.path(), "Main/Good.txt", "good");
    write_source(tmp.path(), "Main/Bad.txt", "bad");
    let scheduler = ready(config(tmp.path()), FakeWiki::default()).await;
    scheduler
        .add_steps([PipelineStep::from_fn("reject bad", |unit, _| {
            if unit.content == "bad" {
                return Err(StepError::rejected("bad content"));
            }
            Ok(())
        })])
        .expect("amend");
    let mut rx = scheduler.subscribe();

    let report = scheduler.run(None).await.expect("run");
    assert_eq!(report.failed_units, 1);
    assert_eq!(report.written(), 1);
    assert!(scheduler.remote().page("Bad").is_none());

    let events = drain(&mut rx);
    assert_eq!(events.first(), Some(&SyncEvent::RunStarted));
    assert_eq!(events.last(), Some(&SyncEvent::RunEnded));
    assert!(events.iter().any(|e| matches!(
        e,
        SyncEvent::MiddlewareError { unit, error } if unit.target_id == "Bad" && error.step == "reject bad"
    )));
}

// ---------------------------------------------------------------------------
// Cache retention
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn merge_retains_untouched_entries_replace_drops_them() {
    for (retention, keeps_old) in [(Retention::Merge, true), (Retention::Replace, false)] {
        let tmp = TempDir::new().expect("tmp");
        write_source(tmp.path(), "Main/New.txt", "n");
        let mut cfg = config(tmp.path());
        cfg.retention = retention;
        let cache_file = cfg.cache_file.clone();
        let old = ChangeCache::from([("Gone".to_string(), fingerprint("g"))]);
        change_cache::save(&cache_file, &old).expect("seed");

        let scheduler = ready(cfg, FakeWiki::default()).await;
        scheduler.run(None).await.expect("run");

        let cache = change_cache::load(&cache_file);
        assert!(cache.contains_key("New"));
        assert_eq!(cache.contains_key("Gone"), keeps_old, "{retention:?}");
    }
}
