//! Serialized background execution of slow engine commands.
//!
//! Model fits and permutation tests block the engine for seconds to hours,
//! and the session cannot evaluate concurrently. One dedicated worker
//! thread owns all slow submissions: jobs queue up in submission order, run
//! one at a time, and each completion comes back to the submitter as a
//! single event on a channel. Interactive callers keep the session for
//! quick metadata queries only (class checks, name listings); anything
//! potentially slow goes through here.
//!
//! There is no cancellation: a submitted command runs to completion or
//! fails. That mirrors the engine protocol, which cannot abort an in-flight
//! evaluation.

use crate::error::RanovaError;
use crate::r_engine::REngine;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Completion event for one submitted command.
#[derive(Debug)]
pub struct AnalysisOutcome {
    /// Caller-chosen label, echoed back so one receiver can serve several
    /// submissions.
    pub label: String,
    /// The command that ran, for display in failure dialogs.
    pub command: String,
    pub result: Result<(), RanovaError>,
}

struct Job {
    label: String,
    command: String,
    reply: Sender<AnalysisOutcome>,
}

pub struct AnalysisWorker {
    jobs: Option<Sender<Job>>,
    thread: Option<JoinHandle<()>>,
}

impl AnalysisWorker {
    pub fn new(engine: Arc<dyn REngine>) -> Self {
        let (jobs, queue): (Sender<Job>, Receiver<Job>) = channel();
        let thread = thread::spawn(move || {
            // Results of fits and tests stay engine-side; only success or
            // the failure message crosses back.
            while let Ok(job) = queue.recv() {
                let result = engine.eval_void(&job.command);
                if let Err(err) = &result {
                    log::warn!("background command '{}' failed: {err}", job.label);
                }
                // The submitter may have dropped its receiver; that just
                // discards the outcome.
                let _ = job.reply.send(AnalysisOutcome {
                    label: job.label,
                    command: job.command,
                    result,
                });
            }
        });
        Self {
            jobs: Some(jobs),
            thread: Some(thread),
        }
    }

    /// Queue one command. Jobs run strictly in submission order; the
    /// outcome arrives on `reply` as one event.
    pub fn submit(
        &self,
        label: impl Into<String>,
        command: impl Into<String>,
        reply: Sender<AnalysisOutcome>,
    ) -> Result<(), RanovaError> {
        let job = Job {
            label: label.into(),
            command: command.into(),
            reply,
        };
        self.jobs
            .as_ref()
            .ok_or_else(|| RanovaError::Transport("analysis worker is shut down".to_string()))?
            .send(job)
            .map_err(|_| RanovaError::Transport("analysis worker is gone".to_string()))
    }

    /// Convenience for callers that want to block on a single command.
    pub fn run_blocking(
        &self,
        label: impl Into<String>,
        command: impl Into<String>,
    ) -> Result<AnalysisOutcome, RanovaError> {
        let (reply, outcome) = channel();
        self.submit(label, command, reply)?;
        outcome
            .recv()
            .map_err(|_| RanovaError::Transport("analysis worker dropped the job".to_string()))
    }

    /// Stop accepting jobs and wait for the queue to drain.
    pub fn shutdown(&mut self) {
        self.jobs.take();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for AnalysisWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}
