//! Prompt in, persisted unit out.
//!
//! Failures here never reach the caller as errors: every path that does not
//! produce a freshly loaded program produces the default program instead,
//! and the reason is logged.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::core::logging::{info, warn};
use crate::program::LoadedProgram;
use crate::registry::{LoadError, Registry, UnitStore, WriteError};

pub mod client;
pub mod conversation;
pub mod worker;

pub use client::{
    ChatCompletionsClient, ClientConfig, ModelClient, OfflineClient,
};
pub use conversation::{ChatMessage, Conversation, Role};
pub use worker::{GenerationOutcome, GenerationTask, Worker};

pub const DEFAULT_SYSTEM_INSTRUCTIONS: &str =
    include_str!("../../static/system_instructions.txt");

/// Longest slice of the prompt carried into a generated unit name.
pub const MAX_NAME_PROMPT_CHARS: usize = 96;

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("generation is offline: {0}")]
    Offline(String),

    #[error("model request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("model returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed model reply: {0}")]
    Malformed(String),

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("generation worker is gone")]
    WorkerGone,
}

/// `<unix seconds><lowercased alphanumerics of the prompt>`.
pub fn unit_name_for(prompt: &str, unix_seconds: i64) -> String {
    let slug: String = prompt
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .take(MAX_NAME_PROMPT_CHARS)
        .collect();
    format!("{}{}", unix_seconds, slug)
}

pub fn unit_name_now(prompt: &str) -> String {
    unit_name_for(prompt, chrono::Utc::now().timestamp())
}

/// Reads system instructions from `path`, falling back to the built-in text.
pub fn load_system_instructions(path: Option<&Path>) -> Arc<str> {
    let Some(path) = path else {
        return Arc::from(DEFAULT_SYSTEM_INSTRUCTIONS);
    };

    match fs::read_to_string(path) {
        Ok(text) if !text.trim().is_empty() => Arc::from(text),
        Ok(_) => {
            warn!(
                "System instructions at {} are empty; using built-in text",
                path.display()
            );
            Arc::from(DEFAULT_SYSTEM_INSTRUCTIONS)
        }
        Err(err) => {
            warn!(
                "Unable to read system instructions at {}: {}; \
                 using built-in text",
                path.display(),
                err
            );
            Arc::from(DEFAULT_SYSTEM_INSTRUCTIONS)
        }
    }
}

/// Sends the request and persists the reply. The exchange is recorded in
/// `conversation` only once the unit is on disk.
pub fn request_unit(
    client: &dyn ModelClient,
    store: &UnitStore,
    conversation: &mut Conversation,
    prompt: &str,
    name: &str,
) -> Result<PathBuf, GenerateError> {
    let reply = client.complete(conversation, prompt)?;
    let path = store.write(name, &reply)?;
    conversation.push_exchange(prompt, reply);
    Ok(path)
}

pub struct Generator {
    client: Arc<dyn ModelClient>,
    store: UnitStore,
    system_instructions: Arc<str>,
    worker: Worker,
}

impl Generator {
    pub fn new(
        client: Arc<dyn ModelClient>,
        store: UnitStore,
        system_instructions: Arc<str>,
    ) -> Self {
        info!("Generation via {}", client.describe());
        let worker = Worker::start(client.clone(), store.clone());
        Self {
            client,
            store,
            system_instructions,
            worker,
        }
    }

    pub fn new_conversation(&self) -> Conversation {
        Conversation::new(self.system_instructions.clone())
    }

    pub fn request_unit(
        &self,
        conversation: &mut Conversation,
        prompt: &str,
        name: &str,
    ) -> Result<PathBuf, GenerateError> {
        request_unit(
            self.client.as_ref(),
            &self.store,
            conversation,
            prompt,
            name,
        )
    }

    /// Synchronous generation. Blocks for the whole network round trip.
    pub fn generate(
        &self,
        registry: &Registry,
        conversation: &mut Conversation,
        prompt: &str,
    ) -> LoadedProgram {
        let name = unit_name_now(prompt);
        let result = self.request_unit(conversation, prompt, &name);
        self.resolve(registry, &name, result)
    }

    /// Hands `conversation` to the worker; it comes back in the outcome.
    pub fn spawn(
        &self,
        conversation: Conversation,
        prompt: &str,
    ) -> GenerationTask {
        let name = unit_name_now(prompt);
        info!("Dreaming up {} ...", name);
        self.worker.submit(conversation, prompt, &name)
    }

    /// Loads the unit a finished request wrote, or the default program if
    /// anything went wrong along the way.
    pub fn resolve(
        &self,
        registry: &Registry,
        name: &str,
        result: Result<PathBuf, GenerateError>,
    ) -> LoadedProgram {
        let loaded = result
            .and_then(|_| registry.load(name).map_err(GenerateError::from));

        match loaded {
            Ok(loaded) => loaded,
            Err(err) => {
                warn!("Generation of {} failed: {}", name, err);
                registry.load_default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_is_timestamp_plus_alnum_slug() {
        assert_eq!(
            unit_name_for("A ring, like Saturn!", 1767678112),
            "1767678112aringlikesaturn"
        );
        assert_eq!(unit_name_for("", 42), "42");
        assert_eq!(unit_name_for("!!! ???", 7), "7");
    }

    #[test]
    fn name_slug_is_bounded() {
        let prompt = "x".repeat(500);
        let name = unit_name_for(&prompt, 1);
        assert_eq!(name.len(), 1 + MAX_NAME_PROMPT_CHARS);
    }

    #[test]
    fn non_ascii_prompt_characters_are_dropped() {
        assert_eq!(unit_name_for("héllo wörld", 3), "3hllowrld");
    }

    #[test]
    fn system_instructions_fall_back_to_builtin() {
        assert_eq!(
            &*load_system_instructions(None),
            DEFAULT_SYSTEM_INSTRUCTIONS
        );

        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.txt");
        assert_eq!(
            &*load_system_instructions(Some(&missing)),
            DEFAULT_SYSTEM_INSTRUCTIONS
        );

        let custom = dir.path().join("prompt.txt");
        fs::write(&custom, "draw only circles").unwrap();
        assert_eq!(
            &*load_system_instructions(Some(&custom)),
            "draw only circles"
        );
    }
}
