#![allow(dead_code)]

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::env;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::{Duration, Instant};

use reverie::generation::{Conversation, GenerateError, Generator, ModelClient};
use reverie::io::audio::SilentTones;
use reverie::registry::{Builtins, Registry, ScriptLimits, UnitStore};
use reverie::runtime::host::Host;
use tempfile::TempDir;

pub const CIRCLE_UNIT: &str = r#"
```rhai
fn init() { #{ t: 0.0 } }
fn update(dt) { this.t += dt; }
fn draw() { Render::draw_circle(200, 150, 40); }
fn get_instructions() { "A circle. Nothing to do." }
fn get_next_idea() { ["Make it pulse", "Add a second circle"] }
```
"#;

pub fn live_tests_enabled() -> bool {
    matches!(
        env::var("REVERIE_RUN_LIVE_TESTS")
            .unwrap_or_default()
            .to_ascii_lowercase()
            .as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Replays canned replies in order. An exhausted script answers with an
/// error, as does any `Err` entry.
pub struct ScriptedClient {
    replies: Mutex<VecDeque<Result<String, String>>>,
    gate: Mutex<Option<Receiver<()>>>,
    calls: AtomicUsize,
}

impl ScriptedClient {
    pub fn new(
        replies: impl IntoIterator<Item = Result<String, String>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().collect()),
            gate: Mutex::new(None),
            calls: AtomicUsize::new(0),
        })
    }

    /// For hosts that never generate.
    pub fn idle() -> Arc<Self> {
        Self::new(Vec::new())
    }

    pub fn replying(reply: &str) -> Arc<Self> {
        Self::new([Ok(reply.to_string())])
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Self::new([Err(message.to_string())])
    }

    /// Like [`ScriptedClient::replying`] but every request blocks until the
    /// returned sender fires (or is dropped).
    pub fn gated(reply: &str) -> (Arc<Self>, Sender<()>) {
        let (tx, rx) = mpsc::channel();
        let client = Arc::new(Self {
            replies: Mutex::new(VecDeque::from([Ok(reply.to_string())])),
            gate: Mutex::new(Some(rx)),
            calls: AtomicUsize::new(0),
        });
        (client, tx)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ModelClient for ScriptedClient {
    fn complete(
        &self,
        _conversation: &Conversation,
        _prompt: &str,
    ) -> Result<String, GenerateError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(gate) = self.gate.lock().as_ref() {
            let _ = gate.recv();
        }

        match self.replies.lock().pop_front() {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => Err(GenerateError::Status {
                status: 504,
                body: message,
            }),
            None => Err(GenerateError::Malformed("no scripted reply".into())),
        }
    }

    fn describe(&self) -> String {
        "scripted test client".to_string()
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub host: Host,
}

impl Harness {
    pub fn store(&self) -> UnitStore {
        UnitStore::new(self.dir.path())
    }
}

pub fn harness(client: Arc<dyn ModelClient>) -> Harness {
    harness_with(client, Builtins::new(), ScriptLimits::default())
}

pub fn harness_with(
    client: Arc<dyn ModelClient>,
    builtins: Builtins,
    limits: ScriptLimits,
) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let store = UnitStore::new(dir.path());
    let registry = Registry::new(store.clone(), builtins, limits);
    let generator = Generator::new(client, store, Arc::from("be brief"));
    let host = Host::new(registry, generator, Box::new(SilentTones));
    Harness { dir, host }
}

/// Runs frames until the in-flight generation has been consumed.
pub fn settle(host: &mut Host) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while host.is_generating() {
        assert!(Instant::now() < deadline, "generation never finished");
        host.frame(1.0 / 60.0);
        thread::sleep(Duration::from_millis(2));
    }
}

/// Runs frames until `done` holds or a few seconds pass.
pub fn frames_until(
    host: &mut Host,
    mut done: impl FnMut(&Host) -> bool,
) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        host.frame(1.0 / 60.0);
        if done(host) {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    false
}
