//! Timed, cosmetic processing sequence.
//!
//! The sequencer walks a fixed list of [`Stage`]s strictly one after another, waiting each
//! stage's declared duration on a [`Clock`] and emitting a start and a finish log line per
//! stage. Nothing is parsed, chunked, embedded, or indexed; the sequence only narrates the
//! configured pipeline. While the embedding stage is active, random [`VectorNode`] samples are
//! emitted for display. They never influence progression.
//!
//! Timing goes through the [`Clock`] trait so callers can swap in [`InstantClock`] or drive
//! [`TokioClock`] under tokio's paused test time.

use crate::pipeline::PipelineConfig;
use async_trait::async_trait;
use rand::Rng;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Instant;

/// Pause between the last stage finishing and completion being signalled.
pub const SETTLE_DELAY: Duration = Duration::from_millis(800);
/// Interval between vector samples during the embedding stage.
pub const VECTOR_SAMPLE_INTERVAL: Duration = Duration::from_millis(100);
/// Number of vector samples retained for display.
pub const VECTOR_FIELD_CAPACITY: usize = 20;

const FINISH_LINE: &str = "  Done.";

/// Scheduler abstraction used for every wait in the sequence.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Suspend for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Real timer backed by `tokio::time`; honours paused time in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Clock that never waits; only yields to the scheduler.
#[derive(Debug, Clone, Copy, Default)]
pub struct InstantClock;

#[async_trait]
impl Clock for InstantClock {
    async fn sleep(&self, _duration: Duration) {
        tokio::task::yield_now().await;
    }
}

/// Phase of the simulated ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    /// Reading the PDF.
    Parse,
    /// Splitting text into chunks.
    Chunk,
    /// Generating embeddings.
    Embed,
    /// Building the vector index.
    Index,
}

/// One named, timed phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Stage {
    /// Phase identity.
    pub kind: StageKind,
    /// Display name, including live configuration values.
    pub name: String,
    /// How long the phase pretends to take.
    #[serde(with = "duration_millis")]
    pub duration: Duration,
}

impl Stage {
    fn start_line(&self) -> String {
        format!("> {}...", self.name)
    }
}

/// Build the four-stage table for a configuration.
pub fn stages_for(config: &PipelineConfig) -> Vec<Stage> {
    vec![
        Stage {
            kind: StageKind::Parse,
            name: format!("Parsing with {}", config.parser.short_label()),
            duration: Duration::from_millis(2000),
        },
        Stage {
            kind: StageKind::Chunk,
            name: format!("Chunking ({}t / {}ov)", config.chunk_size, config.overlap),
            duration: Duration::from_millis(1500),
        },
        Stage {
            kind: StageKind::Embed,
            name: "Generating Embeddings".to_string(),
            duration: Duration::from_millis(2000),
        },
        Stage {
            kind: StageKind::Index,
            name: "Building Vector Index".to_string(),
            duration: Duration::from_millis(1000),
        },
    ]
}

/// Ephemeral display point emitted during the embedding stage. Carries no data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VectorNode {
    /// Random identifier for display keys.
    pub id: String,
    /// Horizontal position in percent.
    pub x: f32,
    /// Vertical position in percent.
    pub y: f32,
    /// Whether the point is still animating.
    pub active: bool,
}

impl VectorNode {
    fn random() -> Self {
        let mut rng = rand::thread_rng();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            x: rng.gen_range(0.0..100.0),
            y: rng.gen_range(0.0..100.0),
            active: true,
        }
    }
}

/// Most recent vector samples, bounded to [`VECTOR_FIELD_CAPACITY`].
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct VectorField {
    nodes: VecDeque<VectorNode>,
}

impl VectorField {
    /// Add a sample, evicting the oldest beyond capacity.
    pub fn push(&mut self, node: VectorNode) {
        self.nodes.push_back(node);
        while self.nodes.len() > VECTOR_FIELD_CAPACITY {
            self.nodes.pop_front();
        }
    }

    /// Number of retained samples.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether no samples are retained.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterate oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &VectorNode> {
        self.nodes.iter()
    }
}

/// Notification emitted while the sequence runs.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProcessingEvent {
    /// A stage began.
    StageStarted {
        /// Position in the stage table.
        index: usize,
        /// Log line for the start.
        line: String,
    },
    /// A stage ended.
    StageFinished {
        /// Position in the stage table.
        index: usize,
        /// Log line for the finish.
        line: String,
    },
    /// Cosmetic embedding sample.
    VectorSample(VectorNode),
    /// All stages finished and the settle delay elapsed.
    Completed,
}

/// Errors raised by the sequencer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SequencerError {
    /// The sequence already ran (or is running) for this instance.
    #[error("processing sequence already started")]
    AlreadyStarted,
}

/// Summary returned once completion has been signalled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingReport {
    /// Every log line, in emission order.
    pub log: Vec<String>,
    /// Time spent from start to completion, as observed by tokio's clock.
    pub elapsed: Duration,
}

/// Runs a stage table exactly once.
pub struct ProcessingSequencer {
    stages: Vec<Stage>,
    clock: Arc<dyn Clock>,
    settle_delay: Duration,
    started: AtomicBool,
}

impl ProcessingSequencer {
    /// Create a sequencer over `stages` using `clock` for every wait.
    pub fn new(stages: Vec<Stage>, clock: Arc<dyn Clock>) -> Self {
        Self {
            stages,
            clock,
            settle_delay: SETTLE_DELAY,
            started: AtomicBool::new(false),
        }
    }

    /// Override the settle delay.
    pub fn with_settle_delay(mut self, settle_delay: Duration) -> Self {
        self.settle_delay = settle_delay;
        self
    }

    /// Stage table in execution order.
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Sum of stage durations plus the settle delay.
    pub fn total_duration(&self) -> Duration {
        self.stages.iter().map(|stage| stage.duration).sum::<Duration>() + self.settle_delay
    }

    /// Run every stage in order, then signal completion once.
    ///
    /// A second call on the same instance returns [`SequencerError::AlreadyStarted`] without
    /// emitting anything. Events are best effort: a dropped receiver does not stop the run.
    pub async fn run(
        &self,
        events: UnboundedSender<ProcessingEvent>,
    ) -> Result<ProcessingReport, SequencerError> {
        if self.started.swap(true, Ordering::SeqCst) {
            tracing::warn!("Ignoring duplicate processing start");
            return Err(SequencerError::AlreadyStarted);
        }

        let started_at = Instant::now();
        let mut log = Vec::with_capacity(self.stages.len() * 2);

        for (index, stage) in self.stages.iter().enumerate() {
            let line = stage.start_line();
            tracing::info!(stage = %stage.name, index, "Stage started");
            log.push(line.clone());
            let _ = events.send(ProcessingEvent::StageStarted { index, line });

            if stage.kind == StageKind::Embed {
                self.wait_with_samples(stage.duration, &events).await;
            } else {
                self.clock.sleep(stage.duration).await;
            }

            tracing::debug!(stage = %stage.name, index, "Stage finished");
            log.push(FINISH_LINE.to_string());
            let _ = events.send(ProcessingEvent::StageFinished {
                index,
                line: FINISH_LINE.to_string(),
            });
        }

        self.clock.sleep(self.settle_delay).await;
        let elapsed = started_at.elapsed();
        tracing::info!(elapsed_ms = elapsed.as_millis() as u64, "Processing complete");
        let _ = events.send(ProcessingEvent::Completed);

        Ok(ProcessingReport { log, elapsed })
    }

    async fn wait_with_samples(
        &self,
        duration: Duration,
        events: &UnboundedSender<ProcessingEvent>,
    ) {
        let stage_wait = self.clock.sleep(duration);
        tokio::pin!(stage_wait);
        loop {
            tokio::select! {
                biased;
                _ = &mut stage_wait => break,
                _ = self.clock.sleep(VECTOR_SAMPLE_INTERVAL) => {
                    let _ = events.send(ProcessingEvent::VectorSample(VectorNode::random()));
                }
            }
        }
    }
}

mod duration_millis {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ParserKind;
    use tokio::sync::mpsc::unbounded_channel;

    fn drain(rx: &mut tokio::sync::mpsc::UnboundedReceiver<ProcessingEvent>) -> Vec<ProcessingEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn stage_names_follow_configuration() {
        let config = PipelineConfig {
            chunk_size: 256,
            overlap: 32,
            parser: ParserKind::LangChain,
            ..PipelineConfig::default()
        };
        let stages = stages_for(&config);
        let kinds: Vec<_> = stages.iter().map(|stage| stage.kind).collect();

        assert_eq!(
            kinds,
            vec![StageKind::Parse, StageKind::Chunk, StageKind::Embed, StageKind::Index]
        );
        assert_eq!(stages[0].name, "Parsing with LangChain");
        assert_eq!(stages[1].name, "Chunking (256t / 32ov)");
    }

    #[tokio::test(start_paused = true)]
    async fn emits_two_lines_per_stage_in_order() {
        let sequencer = ProcessingSequencer::new(
            stages_for(&PipelineConfig::default()),
            Arc::new(TokioClock),
        );
        let (tx, mut rx) = unbounded_channel();

        let report = sequencer.run(tx).await.expect("first run");

        assert_eq!(
            report.log,
            vec![
                "> Parsing with Docling...",
                "  Done.",
                "> Chunking (512t / 50ov)...",
                "  Done.",
                "> Generating Embeddings...",
                "  Done.",
                "> Building Vector Index...",
                "  Done.",
            ]
        );

        let events = drain(&mut rx);
        let ordered: Vec<(bool, usize)> = events
            .iter()
            .filter_map(|event| match event {
                ProcessingEvent::StageStarted { index, .. } => Some((true, *index)),
                ProcessingEvent::StageFinished { index, .. } => Some((false, *index)),
                _ => None,
            })
            .collect();
        assert_eq!(
            ordered,
            vec![
                (true, 0),
                (false, 0),
                (true, 1),
                (false, 1),
                (true, 2),
                (false, 2),
                (true, 3),
                (false, 3)
            ]
        );
        let completions = events
            .iter()
            .filter(|event| matches!(event, ProcessingEvent::Completed))
            .count();
        assert_eq!(completions, 1);
        assert_eq!(events.last(), Some(&ProcessingEvent::Completed));
    }

    #[tokio::test(start_paused = true)]
    async fn completion_waits_for_all_stages_and_settle_delay() {
        let stages = vec![
            Stage {
                kind: StageKind::Parse,
                name: "a".into(),
                duration: Duration::from_millis(300),
            },
            Stage {
                kind: StageKind::Index,
                name: "b".into(),
                duration: Duration::from_millis(700),
            },
        ];
        let sequencer = ProcessingSequencer::new(stages, Arc::new(TokioClock))
            .with_settle_delay(Duration::from_millis(50));
        assert_eq!(sequencer.total_duration(), Duration::from_millis(1050));

        let (tx, _rx) = unbounded_channel();
        let report = sequencer.run(tx).await.expect("run");

        assert_eq!(report.log.len(), 4);
        assert!(report.elapsed >= Duration::from_millis(1050));
    }

    #[tokio::test(start_paused = true)]
    async fn second_run_is_refused() {
        let sequencer = ProcessingSequencer::new(
            stages_for(&PipelineConfig::default()),
            Arc::new(TokioClock),
        );
        let (tx, mut rx) = unbounded_channel();
        sequencer.run(tx.clone()).await.expect("first run");
        drain(&mut rx);

        assert_eq!(sequencer.run(tx).await, Err(SequencerError::AlreadyStarted));
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn embedding_stage_emits_vector_samples() {
        let sequencer = ProcessingSequencer::new(
            stages_for(&PipelineConfig::default()),
            Arc::new(TokioClock),
        );
        let (tx, mut rx) = unbounded_channel();
        sequencer.run(tx).await.expect("run");

        let mut field = VectorField::default();
        let mut embed_active = false;
        for event in drain(&mut rx) {
            match event {
                ProcessingEvent::StageStarted { index, .. } => embed_active = index == 2,
                ProcessingEvent::StageFinished { .. } => embed_active = false,
                ProcessingEvent::VectorSample(node) => {
                    assert!(embed_active, "samples only while embedding");
                    assert!((0.0..100.0).contains(&node.x));
                    field.push(node);
                }
                ProcessingEvent::Completed => {}
            }
        }
        assert!(!field.is_empty());
        assert!(field.len() <= VECTOR_FIELD_CAPACITY);
    }

    #[tokio::test]
    async fn instant_clock_completes_without_waiting() {
        let sequencer = ProcessingSequencer::new(
            stages_for(&PipelineConfig::default()),
            Arc::new(InstantClock),
        );
        let (tx, _rx) = unbounded_channel();
        let report = sequencer.run(tx).await.expect("run");
        assert_eq!(report.log.len(), 8);
        assert!(report.elapsed < Duration::from_secs(1));
    }

    #[test]
    fn vector_field_keeps_most_recent_twenty() {
        let mut field = VectorField::default();
        for i in 0..25 {
            field.push(VectorNode {
                id: i.to_string(),
                x: 0.0,
                y: 0.0,
                active: true,
            });
        }
        assert_eq!(field.len(), VECTOR_FIELD_CAPACITY);
        assert_eq!(field.iter().next().map(|node| node.id.as_str()), Some("5"));
    }
}
