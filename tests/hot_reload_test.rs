//! End-to-end reload behavior: files on disk, real watch sessions.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use hotreload::reload::MemorySink;
use hotreload::{DefinitionLoader, ReloadContext, ReloadEvent, Settings, Value};
use tempfile::TempDir;
use tokio::sync::broadcast;

fn settings() -> Settings {
    let mut settings = Settings::default();
    // Keeps the polling fallback fast enough for these tests.
    settings.watch.poll_interval_ms = 50;
    settings.watch.idle_tick_ms = 50;
    settings
}

fn context(sink: Arc<MemorySink>) -> ReloadContext {
    ReloadContext::new(settings(), Arc::new(DefinitionLoader), sink)
}

fn write(path: &Path, text: &str) {
    fs::write(path, text).unwrap();
}

/// Poll `rx` until an event matching `accept` arrives or `timeout` passes.
fn wait_for(
    rx: &mut broadcast::Receiver<ReloadEvent>,
    timeout: Duration,
    accept: impl Fn(&ReloadEvent) -> bool,
) -> Option<ReloadEvent> {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        match rx.try_recv() {
            Ok(event) if accept(&event) => return Some(event),
            Ok(_) => {}
            Err(_) => thread::sleep(Duration::from_millis(10)),
        }
    }
    None
}

fn is_reload(event: &ReloadEvent) -> bool {
    matches!(event, ReloadEvent::Reloaded { .. })
}

#[test]
fn test_two_quick_edits_reload_once_and_swap_in_place() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("a.hr");
    write(&path, "fn f() = 1\n");

    let sink = Arc::new(MemorySink::new());
    let context = context(sink.clone());
    let mut events = context.subscribe();

    let unit = context.load(&path).unwrap();
    let f = unit.function("f").unwrap();
    assert_eq!(f.call(&[]).unwrap(), Value::Int(1));

    let _session = context.watch(temp_dir.path()).unwrap();

    write(&path, "fn f() = 2\n");
    write(&path, "fn f() = \"final\"\n");

    let event = wait_for(&mut events, Duration::from_secs(5), is_reload)
        .expect("no reload after editing a.hr");
    assert_eq!(
        event,
        ReloadEvent::Reloaded {
            unit: "a".to_string(),
            generation: 2
        }
    );

    // Both edits settle into a single reload.
    assert!(wait_for(&mut events, Duration::from_millis(600), is_reload).is_none());
    assert_eq!(unit.generation(), 2);

    // The reference taken before the edits runs the final body.
    assert_eq!(f.call(&[]).unwrap(), Value::from("final"));
    assert!(unit.function("f").unwrap().ptr_eq(&f));
    assert!(sink.is_empty());
}

#[test]
fn test_same_directory_shares_one_session() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("b.hr");
    write(&path, "fn f() = 1\n");

    let context = context(Arc::new(MemorySink::new()));
    let unit = context.load(&path).unwrap();
    let mut events = context.subscribe();

    let by_dir = context.watch(temp_dir.path()).unwrap();
    let by_file = context.watch(&path).unwrap();
    assert!(by_dir.ptr_eq(&by_file));
    assert_eq!(context.sessions().sessions().len(), 1);

    context.stop(&by_file);
    assert!(!by_dir.is_running());
    assert!(context.sessions().get(temp_dir.path()).is_none());

    write(&path, "fn f() = 2\n");
    assert!(wait_for(&mut events, Duration::from_millis(600), is_reload).is_none());
    assert_eq!(unit.generation(), 1);
}

#[test]
fn test_failed_compile_keeps_identities() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("c.hr");
    write(&path, "fn f() = 1\nfn g() = f() + 1\n");

    let sink = Arc::new(MemorySink::new());
    let context = context(sink.clone());
    let unit = context.load(&path).unwrap();
    let f = unit.function("f").unwrap();
    let g = unit.function("g").unwrap();

    write(&path, "fn f() = 10\nfn g() = f( + 1\n");
    assert!(context.orchestrator().reload_unit(&unit).is_err());

    assert_eq!(unit.generation(), 1);
    assert_eq!(f.call(&[]).unwrap(), Value::Int(1));
    assert_eq!(g.call(&[]).unwrap(), Value::Int(2));

    let reports = sink.reports();
    assert_eq!(reports.len(), 1);
    let report = &reports[0];
    assert_eq!(report.unit, "c");
    // Only the script's own frame survives trimming.
    assert_eq!(report.frames.len(), 1);
    assert_eq!(report.frames[0].line, Some(2));
    assert!(report.to_string().contains("fn g() = f( + 1"));

    write(&path, "fn f() = 10\nfn g() = f() + 1\n");
    assert_eq!(context.orchestrator().reload_unit(&unit).unwrap(), 2);
    assert_eq!(g.call(&[]).unwrap(), Value::Int(11));
}

#[test]
fn test_class_reload_reinitializes_live_instances() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("shapes.hr");
    write(
        &path,
        "class Square {\n  fn init(side) = set self.side = side\n  fn area() = self.side + self.side\n}\n",
    );

    let context = context(Arc::new(MemorySink::new()));
    let unit = context.load(&path).unwrap();
    let class = unit.class("Square").unwrap();
    let square = class.instantiate(&[Value::Int(3)]).unwrap();
    assert_eq!(square.call_method("area", &[]).unwrap(), Value::Int(6));

    write(
        &path,
        "class Square {\n  label = \"sq\"\n  fn init(side) = set self.side = side\n  fn area() = self.label + \"!\"\n  fn reinit() = set self.migrated = true\n}\n",
    );
    context.orchestrator().reload_unit(&unit).unwrap();

    assert!(unit.class("Square").unwrap().ptr_eq(&class));
    assert!(square.class().ptr_eq(&class));
    assert_eq!(square.get("migrated"), Some(Value::Bool(true)));
    assert_eq!(square.get("side"), Some(Value::Int(3)));
    assert_eq!(square.call_method("area", &[]).unwrap(), Value::from("sq!"));
}

#[test]
fn test_deleted_source_keeps_unit() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("d.hr");
    write(&path, "fn f() = 1\n");

    let context = context(Arc::new(MemorySink::new()));
    let unit = context.load(&path).unwrap();
    let f = unit.function("f").unwrap();
    let mut events = context.subscribe();
    let _session = context.watch(temp_dir.path()).unwrap();

    fs::remove_file(&path).unwrap();
    assert!(wait_for(&mut events, Duration::from_millis(600), |_| true).is_none());

    assert!(context.unit("d").is_some());
    assert_eq!(f.call(&[]).unwrap(), Value::Int(1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_watch_on_runtime_reloads_through_handoff() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("e.hr");
    write(&path, "fn f() = 1\n");

    let context = context(Arc::new(MemorySink::new()));
    let unit = context.load(&path).unwrap();
    let f = unit.function("f").unwrap();
    let mut events = context.subscribe();

    let _session = context
        .watch_on(temp_dir.path(), &tokio::runtime::Handle::current())
        .unwrap();
    write(&path, "fn f() = 2\n");

    let event = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Ok(event @ ReloadEvent::Reloaded { .. }) => return event,
                Ok(_) => continue,
                Err(e) => panic!("event stream ended: {e}"),
            }
        }
    })
    .await
    .expect("no reload through the runtime handoff");

    assert_eq!(event.unit(), "e");
    assert_eq!(f.call(&[]).unwrap(), Value::Int(2));
}
