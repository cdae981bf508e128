#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use songproc_service::protocol::{
    OP_ADD_CHUNK, OP_CHANGE_VOLUME, OP_PAUSE_SONG, OP_PLAY_SONG, OP_PREPARE_NEW_SONG,
    OP_RESUME_SONG, OP_STOP_SERVER, OP_STOP_SONG,
};
use songproc_service::{
    Binder, BindingAddress, ClientState, ProcessLauncher, RemoteBinding, Request, Result,
    ServiceClient, ServiceConfig, ServiceError, StatusKind, StatusLog,
};

#[derive(Debug, Default)]
struct Log {
    binds: u32,
    probes: u32,
    probe_timeouts: Vec<Duration>,
    calls: Vec<u16>,
}

#[derive(Clone)]
struct FakeBinder {
    log: Arc<Mutex<Log>>,
    listening: Arc<AtomicBool>,
    fault_on: Option<u16>,
    refuse_bind: bool,
}

impl FakeBinder {
    fn new() -> Self {
        Self {
            log: Arc::default(),
            listening: Arc::new(AtomicBool::new(true)),
            fault_on: None,
            refuse_bind: false,
        }
    }

    fn refusing_binds() -> Self {
        Self {
            refuse_bind: true,
            ..Self::new()
        }
    }

    fn faulting_on(opcode: u16) -> Self {
        Self {
            fault_on: Some(opcode),
            ..Self::new()
        }
    }

    fn never_listening() -> Self {
        let binder = Self::new();
        binder.listening.store(false, Ordering::SeqCst);
        binder
    }

    fn binds(&self) -> u32 {
        self.log.lock().expect("log lock").binds
    }

    fn probes(&self) -> u32 {
        self.log.lock().expect("log lock").probes
    }

    fn probe_timeouts(&self) -> Vec<Duration> {
        self.log.lock().expect("log lock").probe_timeouts.clone()
    }

    fn calls(&self) -> Vec<u16> {
        self.log.lock().expect("log lock").calls.clone()
    }
}

struct FakeBinding {
    log: Arc<Mutex<Log>>,
    listening: Arc<AtomicBool>,
    fault_on: Option<u16>,
}

impl Binder for FakeBinder {
    type Binding = FakeBinding;

    fn bind(&self, _address: &BindingAddress) -> Result<FakeBinding> {
        self.log.lock().expect("log lock").binds += 1;
        if self.refuse_bind {
            return Err(ServiceError::InvalidAddress("binding refused".to_string()));
        }
        Ok(FakeBinding {
            log: Arc::clone(&self.log),
            listening: Arc::clone(&self.listening),
            fault_on: self.fault_on,
        })
    }
}

impl RemoteBinding for FakeBinding {
    fn is_listening(&mut self, timeout: Duration) -> Result<()> {
        let mut log = self.log.lock().expect("log lock");
        log.probes += 1;
        log.probe_timeouts.push(timeout);
        drop(log);
        if self.listening.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ServiceError::Remote("not listening".to_string()))
        }
    }

    fn call(&mut self, request: &Request) -> Result<()> {
        self.log
            .lock()
            .expect("log lock")
            .calls
            .push(request.opcode());
        if self.fault_on == Some(request.opcode()) {
            return Err(ServiceError::Remote("injected fault".to_string()));
        }
        Ok(())
    }
}

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "sp-client-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

fn started_launcher(tag: &str) -> ProcessLauncher {
    let dir = unique_temp_dir(tag);
    let path = ProcessLauncher::worker_path(&dir);
    std::fs::write(&path, b"#!/bin/sh\nexit 0\n").expect("worker stub should be writable");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .expect("worker stub mode should be settable");

    let mut launcher = ProcessLauncher::with_reporter(StatusLog::new());
    assert!(launcher.start(&dir), "stub worker should start");
    launcher
}

fn run_every_operation<B: Binder>(client: &mut ServiceClient<B>) -> Vec<bool> {
    vec![
        client.register_song(b"MThd"),
        client.play_song(true),
        client.play_song(false),
        client.stop_song(),
        client.set_volume(64),
        client.pause_song(),
        client.resume_song(),
    ]
}

#[test]
fn operations_are_refused_when_worker_not_started() {
    let binder = FakeBinder::new();
    let mut client = ServiceClient::with_binder(
        ProcessLauncher::with_reporter(StatusLog::new()),
        binder.clone(),
        ServiceConfig::default(),
    );

    assert!(!client.connect());
    assert!(run_every_operation(&mut client).iter().all(|ok| !ok));
    assert_eq!(binder.binds(), 0);
    assert_eq!(binder.probes(), 0);
    assert!(binder.calls().is_empty());
}

#[test]
fn operations_are_refused_when_started_but_not_bound() {
    let binder = FakeBinder::new();
    let mut client = ServiceClient::with_binder(
        started_launcher("unbound"),
        binder.clone(),
        ServiceConfig::default(),
    );

    assert!(client.is_started());
    assert!(!client.is_bound());
    assert!(run_every_operation(&mut client).iter().all(|ok| !ok));
    assert!(binder.calls().is_empty());
    client.shutdown();
}

type Operation = fn(&mut ServiceClient<FakeBinder>) -> bool;

#[test]
fn fault_on_any_call_is_contained() {
    let cases: [(u16, Operation); 7] = [
        (OP_PREPARE_NEW_SONG, |c| c.register_song(b"MThd")),
        (OP_ADD_CHUNK, |c| c.register_song(b"MThd")),
        (OP_PLAY_SONG, |c| c.play_song(true)),
        (OP_STOP_SONG, |c| c.stop_song()),
        (OP_CHANGE_VOLUME, |c| c.set_volume(64)),
        (OP_PAUSE_SONG, |c| c.pause_song()),
        (OP_RESUME_SONG, |c| c.resume_song()),
    ];

    for (opcode, operation) in cases {
        let binder = FakeBinder::faulting_on(opcode);
        let mut client = ServiceClient::with_binder(
            started_launcher("fault-each"),
            binder.clone(),
            ServiceConfig::default(),
        );
        assert!(client.connect());

        assert!(!operation(&mut client), "opcode {opcode:#04x} should fail");
        assert_eq!(binder.calls().last(), Some(&opcode));
        assert_eq!(client.state(), ClientState::Ready);

        // The client stays usable for the calls that do not fault.
        let witness = if opcode == OP_STOP_SONG {
            client.set_volume(10)
        } else {
            client.stop_song()
        };
        assert!(witness, "opcode {opcode:#04x} poisoned the session");
        client.shutdown();
    }
}

#[test]
fn faulting_call_reports_false_and_session_continues() {
    let binder = FakeBinder::faulting_on(OP_PLAY_SONG);
    let mut client = ServiceClient::with_binder(
        started_launcher("fault"),
        binder.clone(),
        ServiceConfig::default(),
    );

    assert!(client.connect());
    assert!(!client.play_song(false));
    assert!(client.stop_song());
    assert_eq!(binder.calls(), vec![OP_PLAY_SONG, OP_STOP_SONG]);
    client.shutdown();
}

#[test]
fn readiness_gives_up_after_fifty_probes() {
    let binder = FakeBinder::never_listening();
    let mut client = ServiceClient::with_binder(
        started_launcher("ready"),
        binder.clone(),
        ServiceConfig::default(),
    );

    let begun = Instant::now();
    assert!(!client.connect());
    let elapsed = begun.elapsed();

    assert_eq!(binder.probes(), 50);
    assert!(elapsed >= Duration::from_millis(49 * 10), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_millis(1500), "elapsed {elapsed:?}");
    let window = client.config().ready_window();
    assert!(binder.probe_timeouts().iter().all(|t| *t <= window));

    // The binding built for the attempt is rolled back.
    assert!(!client.is_bound());
    assert!(client.address().is_none());
    assert_eq!(client.state(), ClientState::Uninitialized);
    assert!(client.is_started());

    assert!(run_every_operation(&mut client).iter().all(|ok| !ok));
    assert!(binder.calls().is_empty());
    client.shutdown();
}

#[test]
fn connect_succeeds_once_worker_starts_listening() {
    let binder = FakeBinder::never_listening();
    let config = ServiceConfig {
        ready_max_attempts: 3,
        ..ServiceConfig::default()
    };
    let mut client = ServiceClient::with_binder(started_launcher("late"), binder.clone(), config);

    assert!(!client.connect());
    binder.listening.store(true, Ordering::SeqCst);
    assert!(client.connect());
    assert_eq!(client.state(), ClientState::Ready);
    assert_eq!(binder.binds(), 2);
    assert!(client.play_song(true));
    client.shutdown();
}

#[test]
fn shutdown_without_connect_is_a_noop() {
    let binder = FakeBinder::new();
    let mut client = ServiceClient::with_binder(
        ProcessLauncher::with_reporter(StatusLog::new()),
        binder.clone(),
        ServiceConfig::default(),
    );

    client.shutdown();
    client.shutdown();
    assert!(!client.is_started());
    assert!(!client.is_bound());
    assert_eq!(client.state(), ClientState::ShutDown);
    assert!(binder.calls().is_empty());
}

#[test]
fn shutdown_after_connect_resets_flags() {
    let binder = FakeBinder::new();
    let mut client = ServiceClient::with_binder(
        started_launcher("shutdown"),
        binder.clone(),
        ServiceConfig::default(),
    );

    assert!(client.connect());
    client.shutdown();
    assert_eq!(binder.calls(), vec![OP_STOP_SERVER]);
    assert!(!client.is_started());
    assert!(!client.is_bound());
    assert_eq!(client.state(), ClientState::ShutDown);

    assert!(run_every_operation(&mut client).iter().all(|ok| !ok));
    assert_eq!(binder.calls(), vec![OP_STOP_SERVER]);
}

#[test]
fn register_song_fails_when_chunk_transfer_faults() {
    let binder = FakeBinder::faulting_on(OP_ADD_CHUNK);
    let mut client = ServiceClient::with_binder(
        started_launcher("chunk"),
        binder.clone(),
        ServiceConfig::default(),
    );

    assert!(client.connect());
    assert!(!client.register_song(b"MThd\x00\x00\x00\x06"));
    assert_eq!(binder.calls(), vec![OP_PREPARE_NEW_SONG, OP_ADD_CHUNK]);
    client.shutdown();
}

#[test]
fn register_song_stops_after_failed_prepare() {
    let binder = FakeBinder::faulting_on(OP_PREPARE_NEW_SONG);
    let mut client = ServiceClient::with_binder(
        started_launcher("prepare"),
        binder.clone(),
        ServiceConfig::default(),
    );

    assert!(client.connect());
    assert!(!client.register_song(b"MThd"));
    assert_eq!(binder.calls(), vec![OP_PREPARE_NEW_SONG]);
    client.shutdown();
}

#[test]
fn oversized_song_is_refused_before_any_call() {
    let binder = FakeBinder::new();
    let config = ServiceConfig {
        max_chunk_size: 4,
        ..ServiceConfig::default()
    };
    let mut client = ServiceClient::with_binder(started_launcher("oversize"), binder.clone(), config);

    assert!(client.connect());
    assert!(!client.register_song(b"12345"));
    assert!(client.register_song(b"1234"));
    assert_eq!(binder.calls(), vec![OP_PREPARE_NEW_SONG, OP_ADD_CHUNK]);
    client.shutdown();
}

#[test]
fn missing_worker_reports_warning() {
    let dir = unique_temp_dir("missing");
    let log = StatusLog::new();
    let mut launcher = ProcessLauncher::with_reporter(log.clone());

    assert!(!launcher.start(&dir));
    let entries = log.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].0, StatusKind::Warning);
    assert!(entries[0].1.contains("couldn't be found"));

    let binder = FakeBinder::new();
    let mut client = ServiceClient::with_binder(launcher, binder.clone(), ServiceConfig::default());
    assert!(!client.connect());
    assert_eq!(binder.binds(), 0);
}

#[test]
fn address_composition_failure_leaves_client_unbound() {
    let binder = FakeBinder::new();
    let config = ServiceConfig {
        protocol_sequence: "not a protseq".to_string(),
        ..ServiceConfig::default()
    };
    let mut client = ServiceClient::with_binder(started_launcher("compose"), binder.clone(), config);

    assert!(!client.connect());
    assert!(!client.is_bound());
    assert_eq!(binder.binds(), 0);
    assert!(run_every_operation(&mut client).iter().all(|ok| !ok));
    assert!(binder.calls().is_empty());
    client.shutdown();
}

#[test]
fn binding_failure_leaves_client_unbound() {
    let binder = FakeBinder::refusing_binds();
    let mut client = ServiceClient::with_binder(
        started_launcher("refuse"),
        binder.clone(),
        ServiceConfig::default(),
    );

    assert!(!client.connect());
    assert_eq!(binder.binds(), 1);
    assert_eq!(binder.probes(), 0);
    assert!(!client.is_bound());
    assert!(client.address().is_none());
    assert_eq!(client.state(), ClientState::Uninitialized);
    assert!(run_every_operation(&mut client).iter().all(|ok| !ok));
    assert!(binder.calls().is_empty());
    client.shutdown();
}

#[test]
fn shutdown_after_readiness_timeout_still_stops_worker() {
    let dir = unique_temp_dir("linger");
    let path = ProcessLauncher::worker_path(&dir);
    std::fs::write(&path, b"#!/bin/sh\nexec sleep 30\n").expect("worker stub should be writable");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .expect("worker stub mode should be settable");
    let mut launcher = ProcessLauncher::with_reporter(StatusLog::new());
    assert!(launcher.start(&dir));
    let pid = launcher.pid().expect("started worker should have a pid");

    let binder = FakeBinder::never_listening();
    let config = ServiceConfig {
        ready_max_attempts: 2,
        ..ServiceConfig::default()
    };
    let mut client = ServiceClient::with_binder(launcher, binder.clone(), config);

    assert!(!client.connect());
    assert!(binder.calls().is_empty());

    let begun = Instant::now();
    client.shutdown();
    assert!(begun.elapsed() < Duration::from_secs(5));

    assert_eq!(binder.binds(), 2);
    assert_eq!(binder.calls(), vec![OP_STOP_SERVER]);
    assert!(!client.is_started());
    assert_eq!(client.state(), ClientState::ShutDown);

    let alive = std::process::Command::new("kill")
        .args(["-0", &pid.to_string()])
        .stderr(std::process::Stdio::null())
        .status()
        .expect("kill should run")
        .success();
    assert!(!alive, "worker {pid} still running after shutdown");
}

#[test]
fn play_then_stop_then_shutdown() {
    let binder = FakeBinder::new();
    let mut client = ServiceClient::with_binder(
        started_launcher("happy"),
        binder.clone(),
        ServiceConfig::default(),
    );

    assert!(client.connect());
    assert_eq!(
        client.address().map(ToString::to_string).as_deref(),
        Some("ncalrpc:[2d4dc2f9-ce90-4080-8a00-1cb819086970]")
    );
    assert!(client.play_song(true));
    assert!(client.stop_song());

    client.shutdown();
    assert!(!client.is_started());
    assert!(!client.is_bound());
    assert_eq!(
        binder.calls(),
        vec![OP_PLAY_SONG, OP_STOP_SONG, OP_STOP_SERVER]
    );
}

#[test]
fn reconnect_rebuilds_the_binding() {
    let binder = FakeBinder::new();
    let mut client = ServiceClient::with_binder(
        started_launcher("rebind"),
        binder.clone(),
        ServiceConfig::default(),
    );

    assert!(client.connect());
    assert!(client.connect());
    assert_eq!(binder.binds(), 2);
    assert_eq!(binder.probes(), 2);
    assert!(client.play_song(false));
    client.shutdown();
}
