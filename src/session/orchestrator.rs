//! Four-state session lifecycle.
//!
//! A [`SessionOrchestrator`] moves through `Upload -> Configure -> Process -> Chat` and owns the
//! document, configuration, transcript and processing progress exclusively. `reset` returns to
//! `Upload` from any state and restores the default configuration.
//!
//! Asynchronous work never runs while the orchestrator is borrowed. Queries are split into
//! [`SessionOrchestrator::begin_query`], [`PendingQuery::execute`] and
//! [`SessionOrchestrator::complete_query`]; processing runs through [`drive_processing`].
//! Both carry the session epoch, which `reset` bumps, so results that arrive after a reset are
//! dropped instead of being applied to a cleared session.

use crate::conversation::{ApiKey, ConversationEngine, ConversationError, Reply, ReplyOutcome};
use crate::document::{Document, DocumentSummary, Upload, UploadError};
use crate::metrics::SessionMetrics;
use crate::pipeline::{ConfigUpdate, ConfigurationError, PipelineConfig};
use crate::sequencer::{
    Clock, ProcessingEvent, ProcessingReport, ProcessingSequencer, SequencerError, stages_for,
};
use crate::session::export::ExportBundle;
use crate::session::progress::ProcessingProgress;
use crate::session::transcript::{Message, Role, Transcript};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::sync::mpsc::unbounded_channel;

/// Lifecycle position of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Waiting for a document.
    Upload,
    /// Editing the pipeline configuration.
    Configure,
    /// Running the simulated ingestion.
    Process,
    /// Answering questions about the document.
    Chat,
}

impl SessionState {
    /// Lowercase name used in messages and JSON.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Configure => "configure",
            Self::Process => "process",
            Self::Chat => "chat",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by orchestrator operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The operation is not allowed in the current state.
    #[error("cannot {action} while the session is in the {state} state")]
    InvalidState {
        /// Attempted operation.
        action: &'static str,
        /// State the session was in.
        state: SessionState,
    },
    /// The upload failed validation.
    #[error(transparent)]
    Upload(#[from] UploadError),
    /// The configuration edit or freeze was rejected.
    #[error(transparent)]
    InvalidConfiguration(#[from] ConfigurationError),
    /// Another question is still waiting for its answer.
    #[error("a query is already in flight")]
    QueryInFlight,
    /// The question was blank.
    #[error("query text must not be empty")]
    EmptyQuery,
    /// Export was switched off in the configuration.
    #[error("export is disabled for this session")]
    ExportDisabled,
    /// The session was reset before the reply arrived.
    #[error("session was reset before the reply arrived")]
    SessionReset,
}

/// A sequencer run bound to the session epoch that started it.
pub struct ProcessingRun {
    epoch: u64,
    sequencer: ProcessingSequencer,
}

impl ProcessingRun {
    /// Epoch the run belongs to.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// The sequencer that will execute the stages.
    pub fn sequencer(&self) -> &ProcessingSequencer {
        &self.sequencer
    }
}

/// Result of [`SessionOrchestrator::begin_query`].
pub enum QueryStart {
    /// No backend call is needed; the assistant message was already appended.
    Refused(Message),
    /// The user message was appended and the backend call is ready to run.
    Pending(PendingQuery),
}

/// A backend call prepared from a snapshot of the session.
pub struct PendingQuery {
    epoch: u64,
    engine: Arc<ConversationEngine>,
    document: Arc<Document>,
    config: PipelineConfig,
    history: Vec<Message>,
    text: String,
}

impl PendingQuery {
    /// Perform the single engine call. Never fails; errors become reply text.
    pub async fn execute(self) -> CompletedQuery {
        let reply = self
            .engine
            .answer(&self.document, &self.history, &self.text, &self.config)
            .await;
        CompletedQuery {
            epoch: self.epoch,
            reply,
        }
    }
}

/// Reply waiting to be applied with [`SessionOrchestrator::complete_query`].
#[derive(Debug, Clone)]
pub struct CompletedQuery {
    epoch: u64,
    /// Text and provenance of the reply.
    pub reply: Reply,
}

/// Serializable view of the whole session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    /// Current lifecycle state.
    pub state: SessionState,
    /// Uploaded document, if any.
    pub document: Option<DocumentSummary>,
    /// Current configuration.
    pub config: PipelineConfig,
    /// Full transcript.
    pub transcript: Vec<Message>,
    /// Processing progress, once processing has started.
    pub processing: Option<ProcessingProgress>,
    /// Last lines of the processing log.
    pub recent_log: Vec<String>,
    /// Whether a question is awaiting its answer.
    pub query_pending: bool,
    /// Whether the engine has a credential.
    pub has_credential: bool,
}

/// Owner of one session's lifecycle and data.
pub struct SessionOrchestrator {
    state: SessionState,
    document: Option<Arc<Document>>,
    config: PipelineConfig,
    transcript: Transcript,
    progress: Option<ProcessingProgress>,
    engine: Arc<ConversationEngine>,
    metrics: Arc<SessionMetrics>,
    epoch: u64,
    query_pending: bool,
}

impl SessionOrchestrator {
    /// New session in the `Upload` state.
    pub fn new(engine: ConversationEngine, metrics: Arc<SessionMetrics>) -> Self {
        Self {
            state: SessionState::Upload,
            document: None,
            config: PipelineConfig::default(),
            transcript: Transcript::new(),
            progress: None,
            engine: Arc::new(engine),
            metrics,
            epoch: 0,
            query_pending: false,
        }
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Uploaded document.
    pub fn document(&self) -> Option<&Document> {
        self.document.as_deref()
    }

    /// Current configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Transcript so far.
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Processing progress of the current run.
    pub fn progress(&self) -> Option<&ProcessingProgress> {
        self.progress.as_ref()
    }

    /// Current epoch; bumped by every reset.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Whether a question is awaiting its answer.
    pub fn query_pending(&self) -> bool {
        self.query_pending
    }

    /// Shared metrics handle.
    pub fn metrics(&self) -> &Arc<SessionMetrics> {
        &self.metrics
    }

    fn require(&self, state: SessionState, action: &'static str) -> Result<(), SessionError> {
        if self.state == state {
            Ok(())
        } else {
            Err(SessionError::InvalidState {
                action,
                state: self.state,
            })
        }
    }

    fn current_document(&self, action: &'static str) -> Result<Arc<Document>, SessionError> {
        self.document.clone().ok_or(SessionError::InvalidState {
            action,
            state: self.state,
        })
    }

    /// Validate and store an upload, moving `Upload -> Configure`.
    ///
    /// A rejected upload leaves the session untouched.
    pub fn accept_upload(&mut self, upload: Upload) -> Result<&Document, SessionError> {
        self.require(SessionState::Upload, "upload a document")?;
        let document = match upload.validate() {
            Ok(document) => document,
            Err(error) => {
                self.metrics.record_upload(false);
                tracing::info!(error = %error, "Upload rejected");
                return Err(error.into());
            }
        };

        self.metrics.record_upload(true);
        tracing::info!(
            name = %document.name(),
            size = document.size(),
            "Document accepted"
        );
        self.state = SessionState::Configure;
        let document = self.document.insert(Arc::new(document));
        Ok(&**document)
    }

    /// Apply a configuration edit. Only allowed in `Configure`.
    pub fn configure(&mut self, update: ConfigUpdate) -> Result<&PipelineConfig, SessionError> {
        self.require(SessionState::Configure, "change the configuration")?;
        self.config.apply(update)?;
        tracing::debug!(config = ?self.config, "Configuration updated");
        Ok(&self.config)
    }

    /// Freeze the configuration and move `Configure -> Process`.
    ///
    /// The returned run must be driven (see [`drive_processing`]) to reach `Chat`. An invalid
    /// configuration keeps the session in `Configure`.
    pub fn start_processing(&mut self, clock: Arc<dyn Clock>) -> Result<ProcessingRun, SessionError> {
        self.require(SessionState::Configure, "start processing")?;
        let document = self.current_document("start processing")?;
        self.config.validate()?;

        let stages = stages_for(&self.config);
        self.progress = Some(ProcessingProgress::new(stages.clone()));
        self.state = SessionState::Process;
        tracing::info!(
            document = %document.name(),
            parser = %self.config.parser,
            chunk_size = self.config.chunk_size,
            overlap = self.config.overlap,
            epoch = self.epoch,
            "Processing started"
        );

        Ok(ProcessingRun {
            epoch: self.epoch,
            sequencer: ProcessingSequencer::new(stages, clock),
        })
    }

    /// Fold a sequencer event into the progress view.
    ///
    /// Events from an older epoch are ignored. [`ProcessingEvent::Completed`] finishes
    /// processing.
    pub fn apply_processing_event(&mut self, epoch: u64, event: ProcessingEvent) {
        if epoch != self.epoch || self.state != SessionState::Process {
            tracing::debug!(epoch, current = self.epoch, "Dropping stale processing event");
            return;
        }
        let completed = matches!(event, ProcessingEvent::Completed);
        if let Some(progress) = self.progress.as_mut() {
            progress.apply(event);
        }
        if completed {
            self.finish_processing(epoch);
        }
    }

    /// Move `Process -> Chat` and seed the transcript.
    ///
    /// Returns `false` without side effects when the epoch is stale or the session is not
    /// processing, so repeated calls are harmless.
    pub fn finish_processing(&mut self, epoch: u64) -> bool {
        if epoch != self.epoch || self.state != SessionState::Process {
            return false;
        }
        let Some(document) = self.document.as_deref() else {
            return false;
        };

        let seed = format!(
            "Database ready. I've ingested \"{}\" using the {} strategy with {}-token chunks. \n\nI am simulating: {}",
            document.name(),
            self.config.parser.short_label(),
            self.config.chunk_size,
            self.config.model
        );
        self.transcript.push(Role::Assistant, seed);
        if let Some(progress) = self.progress.as_mut() {
            progress.completed = true;
            progress.current_stage = None;
        }
        self.state = SessionState::Chat;
        self.metrics.record_processing_completed();
        tracing::info!(document = %document.name(), "Session ready for questions");
        true
    }

    /// Start a question. Only allowed in `Chat`, one at a time.
    ///
    /// Without a credential no user message is recorded; the assistant explains the missing
    /// credential and no backend call is prepared.
    pub fn begin_query(&mut self, text: &str) -> Result<QueryStart, SessionError> {
        self.require(SessionState::Chat, "send a query")?;
        let text = text.trim();
        if text.is_empty() {
            return Err(SessionError::EmptyQuery);
        }
        if self.query_pending {
            return Err(SessionError::QueryInFlight);
        }
        let document = self.current_document("send a query")?;

        if !self.engine.has_credential() {
            self.metrics.record_credential_rejection();
            tracing::warn!("Query refused: no backend credential configured");
            let message = self
                .transcript
                .push(Role::Assistant, ConversationError::MissingCredential.reply_text());
            return Ok(QueryStart::Refused(message.clone()));
        }

        let history = self.transcript.messages().to_vec();
        self.transcript.push(Role::User, text);
        self.query_pending = true;
        Ok(QueryStart::Pending(PendingQuery {
            epoch: self.epoch,
            engine: Arc::clone(&self.engine),
            document,
            config: self.config.clone(),
            history,
            text: text.to_string(),
        }))
    }

    /// Append a finished reply. Returns `None` when the session was reset in the meantime.
    pub fn complete_query(&mut self, completed: CompletedQuery) -> Option<Message> {
        if completed.epoch != self.epoch || self.state != SessionState::Chat {
            self.metrics.record_stale_reply();
            tracing::info!(
                epoch = completed.epoch,
                current = self.epoch,
                "Dropping reply for a reset session"
            );
            return None;
        }

        self.query_pending = false;
        self.metrics
            .record_query(completed.reply.outcome == ReplyOutcome::Failed);
        let message = self.transcript.push(Role::Assistant, completed.reply.text);
        Some(message.clone())
    }

    /// Ask a question and wait for the assistant message.
    ///
    /// Holds `&mut self` across the backend call; shared owners should use the three-step
    /// [`begin_query`](Self::begin_query) flow instead.
    pub async fn ask(&mut self, text: &str) -> Result<Message, SessionError> {
        match self.begin_query(text)? {
            QueryStart::Refused(message) => Ok(message),
            QueryStart::Pending(pending) => {
                let completed = pending.execute().await;
                self.complete_query(completed)
                    .ok_or(SessionError::SessionReset)
            }
        }
    }

    /// Return to `Upload` from any state, restoring default configuration.
    pub fn reset(&mut self) {
        let from = self.state;
        self.state = SessionState::Upload;
        self.document = None;
        self.config = PipelineConfig::default();
        self.transcript = Transcript::new();
        self.progress = None;
        self.query_pending = false;
        self.epoch += 1;
        self.metrics.record_reset();
        tracing::info!(from = %from, epoch = self.epoch, "Session reset");
    }

    /// Replace the backend credential used by future queries.
    pub fn update_credential(&mut self, credential: Option<ApiKey>) {
        tracing::info!(present = credential.is_some(), "Backend credential updated");
        self.engine = Arc::new(self.engine.with_credential(credential));
    }

    /// Build the export bundle. Only allowed in `Chat` with export enabled.
    pub fn export_bundle(&self) -> Result<ExportBundle, SessionError> {
        self.require(SessionState::Chat, "export the session")?;
        if !self.config.export_enabled {
            return Err(SessionError::ExportDisabled);
        }
        let document = self.current_document("export the session")?;
        Ok(ExportBundle::new(
            &document,
            &self.config,
            self.transcript.messages(),
        ))
    }

    /// Serializable view of the session.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            document: self.document.as_ref().map(|document| document.summary()),
            config: self.config.clone(),
            transcript: self.transcript.messages().to_vec(),
            processing: self.progress.clone(),
            recent_log: self
                .progress
                .as_ref()
                .map(|progress| progress.recent_log().to_vec())
                .unwrap_or_default(),
            query_pending: self.query_pending,
            has_credential: self.engine.has_credential(),
        }
    }
}

/// Run a processing sequence and feed its events into a shared session.
pub async fn drive_processing(
    session: Arc<Mutex<SessionOrchestrator>>,
    run: ProcessingRun,
) -> Result<ProcessingReport, SequencerError> {
    drive_processing_observed(session, run, |_| {}).await
}

/// Like [`drive_processing`], also passing every event to `observe` first.
pub async fn drive_processing_observed<F>(
    session: Arc<Mutex<SessionOrchestrator>>,
    run: ProcessingRun,
    mut observe: F,
) -> Result<ProcessingReport, SequencerError>
where
    F: FnMut(&ProcessingEvent) + Send,
{
    let ProcessingRun { epoch, sequencer } = run;
    let (tx, mut rx) = unbounded_channel();

    let forward = async {
        while let Some(event) = rx.recv().await {
            observe(&event);
            session.lock().await.apply_processing_event(epoch, event);
        }
    };
    let (report, ()) = tokio::join!(sequencer.run(tx), forward);
    report
}
