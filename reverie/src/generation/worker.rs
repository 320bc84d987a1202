//! The single background thread that talks to the model.
//!
//! Jobs run strictly one after another. A job only does network I/O and the
//! unit write; constructing the program happens back on the frame thread.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread;

use super::client::ModelClient;
use super::conversation::Conversation;
use super::{GenerateError, request_unit};
use crate::core::logging::{debug, error};
use crate::registry::UnitStore;

/// What a finished job hands back. The conversation is returned whenever the
/// job ran at all; it is `None` only if the worker disappeared.
#[derive(Debug)]
pub struct GenerationOutcome {
    pub name: String,
    pub conversation: Option<Conversation>,
    pub result: Result<PathBuf, GenerateError>,
}

struct Job {
    conversation: Conversation,
    prompt: String,
    name: String,
    reply: Sender<GenerationOutcome>,
}

/// Handle to an in-flight generation. Consumed once by whoever observes its
/// completion.
pub struct GenerationTask {
    prompt: String,
    name: String,
    receiver: Receiver<GenerationOutcome>,
}

impl GenerationTask {
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// Non-blocking. `None` while the job is still running.
    pub fn poll(&self) -> Option<GenerationOutcome> {
        match self.receiver.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(self.gone()),
        }
    }

    fn gone(&self) -> GenerationOutcome {
        GenerationOutcome {
            name: self.name.clone(),
            conversation: None,
            result: Err(GenerateError::WorkerGone),
        }
    }
}

pub struct Worker {
    jobs: Option<Sender<Job>>,
}

impl Worker {
    pub fn start(client: Arc<dyn ModelClient>, store: UnitStore) -> Self {
        let (tx, rx) = mpsc::channel::<Job>();

        let spawned = thread::Builder::new()
            .name("reverie-generation".to_string())
            .spawn(move || {
                for job in rx {
                    let mut conversation = job.conversation;
                    debug!("Generating {} for {:?}", job.name, job.prompt);
                    let result = request_unit(
                        client.as_ref(),
                        &store,
                        &mut conversation,
                        &job.prompt,
                        &job.name,
                    );
                    let _ = job.reply.send(GenerationOutcome {
                        name: job.name,
                        conversation: Some(conversation),
                        result,
                    });
                }
                debug!("Generation worker exiting");
            });

        match spawned {
            Ok(_) => Self { jobs: Some(tx) },
            Err(err) => {
                error!("Unable to start generation worker: {}", err);
                Self { jobs: None }
            }
        }
    }

    /// Queues a job. If the worker is unavailable the returned task
    /// completes immediately with [`GenerateError::WorkerGone`] and hands
    /// the conversation straight back.
    pub fn submit(
        &self,
        conversation: Conversation,
        prompt: &str,
        name: &str,
    ) -> GenerationTask {
        let (reply, receiver) = mpsc::channel();
        let task = GenerationTask {
            prompt: prompt.to_string(),
            name: name.to_string(),
            receiver,
        };

        let job = Job {
            conversation,
            prompt: prompt.to_string(),
            name: name.to_string(),
            reply,
        };

        let Some(jobs) = &self.jobs else {
            fail_job(job);
            return task;
        };

        if let Err(mpsc::SendError(job)) = jobs.send(job) {
            error!("Generation worker has stopped");
            fail_job(job);
        }

        task
    }
}

fn fail_job(job: Job) {
    let _ = job.reply.send(GenerationOutcome {
        name: job.name,
        conversation: Some(job.conversation),
        result: Err(GenerateError::WorkerGone),
    });
}
