//! Live view of a running processing sequence.

use crate::sequencer::{ProcessingEvent, Stage, VectorField};
use serde::Serialize;

/// Number of log lines shown in the compact log overlay.
pub const RECENT_LOG_LINES: usize = 4;

/// Progress accumulated from [`ProcessingEvent`]s.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingProgress {
    /// Stage table being executed.
    pub stages: Vec<Stage>,
    /// Index of the stage currently running.
    pub current_stage: Option<usize>,
    /// Number of stages that finished.
    pub completed_stages: usize,
    /// Every log line so far.
    pub log: Vec<String>,
    /// Cosmetic embedding samples.
    pub vectors: VectorField,
    /// Whether completion was signalled.
    pub completed: bool,
}

impl ProcessingProgress {
    /// Fresh progress for a stage table.
    pub fn new(stages: Vec<Stage>) -> Self {
        Self {
            stages,
            current_stage: None,
            completed_stages: 0,
            log: Vec::new(),
            vectors: VectorField::default(),
            completed: false,
        }
    }

    /// Fold one event into the view.
    pub fn apply(&mut self, event: ProcessingEvent) {
        match event {
            ProcessingEvent::StageStarted { index, line } => {
                self.current_stage = Some(index);
                self.log.push(line);
            }
            ProcessingEvent::StageFinished { index, line } => {
                self.completed_stages = index + 1;
                self.log.push(line);
            }
            ProcessingEvent::VectorSample(node) => self.vectors.push(node),
            ProcessingEvent::Completed => {
                self.current_stage = None;
                self.completed = true;
            }
        }
    }

    /// The last few log lines.
    pub fn recent_log(&self) -> &[String] {
        let start = self.log.len().saturating_sub(RECENT_LOG_LINES);
        &self.log[start..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineConfig;
    use crate::sequencer::stages_for;

    #[test]
    fn tracks_current_stage_and_log() {
        let mut progress = ProcessingProgress::new(stages_for(&PipelineConfig::default()));
        progress.apply(ProcessingEvent::StageStarted {
            index: 0,
            line: "> a...".into(),
        });
        assert_eq!(progress.current_stage, Some(0));

        progress.apply(ProcessingEvent::StageFinished {
            index: 0,
            line: "  Done.".into(),
        });
        progress.apply(ProcessingEvent::StageStarted {
            index: 1,
            line: "> b...".into(),
        });
        assert_eq!(progress.completed_stages, 1);
        assert_eq!(progress.current_stage, Some(1));

        for line in ["  Done.", "> c...", "  Done."] {
            progress.log.push(line.to_string());
        }
        assert_eq!(progress.recent_log(), ["> b...", "  Done.", "> c...", "  Done."]);

        progress.apply(ProcessingEvent::Completed);
        assert!(progress.completed);
        assert_eq!(progress.current_stage, None);
    }
}
