// ABOUTME: Local snapshot of one background job and the rules for updating it
// ABOUTME: Reconciles status responses into the record, rejecting invalid ones

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::error::ProtocolError;
use crate::remote::models::{RemoteStatus, StatusResponse};

const GENERIC_FAILURE: &str = "Processing failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobPhase {
    Idle,
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobPhase::Completed | JobPhase::Failed)
    }

    /// Phases during which the backend is still expected to report progress.
    pub fn is_active(self) -> bool {
        matches!(self, JobPhase::Pending | JobPhase::Processing)
    }
}

impl From<RemoteStatus> for JobPhase {
    fn from(status: RemoteStatus) -> Self {
        match status {
            RemoteStatus::Pending => JobPhase::Pending,
            RemoteStatus::Processing => JobPhase::Processing,
            RemoteStatus::Completed => JobPhase::Completed,
            RemoteStatus::Failed => JobPhase::Failed,
        }
    }
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            JobPhase::Idle => "IDLE",
            JobPhase::Pending => "PENDING",
            JobPhase::Processing => "PROCESSING",
            JobPhase::Completed => "COMPLETED",
            JobPhase::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// The locally held state of a tracked job.
///
/// `outputs` and `elapsed_seconds` are only set when the phase is
/// `Completed`, `failure_reason` only when it is `Failed`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobStatusRecord {
    pub job_id: Option<String>,
    pub phase: JobPhase,
    pub progress: u8,
    pub outputs: Option<BTreeMap<String, String>>,
    pub elapsed_seconds: Option<f64>,
    pub failure_reason: Option<String>,
}

impl Default for JobStatusRecord {
    fn default() -> Self {
        Self::idle()
    }
}

impl JobStatusRecord {
    pub fn idle() -> Self {
        Self {
            job_id: None,
            phase: JobPhase::Idle,
            progress: 0,
            outputs: None,
            elapsed_seconds: None,
            failure_reason: None,
        }
    }

    pub fn pending(job_id: impl Into<String>) -> Self {
        Self {
            job_id: Some(job_id.into()),
            phase: JobPhase::Pending,
            ..Self::idle()
        }
    }

    /// One-line description of the record for display.
    pub fn status_text(&self) -> String {
        match self.phase {
            JobPhase::Idle => "Ready to process".to_string(),
            JobPhase::Pending => "Initializing processing...".to_string(),
            JobPhase::Processing => format!("Processing EEG data ({}%)", self.progress),
            JobPhase::Completed => format!(
                "Processing completed in {:.1} seconds",
                self.elapsed_seconds.unwrap_or_default()
            ),
            JobPhase::Failed => match &self.failure_reason {
                Some(reason) => format!("Processing failed: {}", reason),
                None => GENERIC_FAILURE.to_string(),
            },
        }
    }

    /// Merge a status response into the record.
    ///
    /// The backend is authoritative for phase and progress; only the job id
    /// is kept from the local side. On error the record is left untouched.
    /// Returns whether anything changed.
    pub fn reconcile(&mut self, response: &StatusResponse) -> Result<bool, ProtocolError> {
        let next = self.reconciled(response)?;
        if next == *self {
            return Ok(false);
        }
        *self = next;
        Ok(true)
    }

    fn reconciled(&self, response: &StatusResponse) -> Result<Self, ProtocolError> {
        if let Some(expected) = &self.job_id {
            if !response.job_id.is_empty() && response.job_id != *expected {
                return Err(ProtocolError::JobIdMismatch {
                    expected: expected.clone(),
                    actual: response.job_id.clone(),
                });
            }
        }
        if response.progress > 100 {
            return Err(ProtocolError::ProgressOutOfRange(response.progress));
        }
        let job_id = self
            .job_id
            .clone()
            .unwrap_or_else(|| response.job_id.clone());

        let mut next = Self {
            job_id: Some(job_id.clone()),
            phase: response.status.into(),
            progress: response.progress as u8,
            outputs: None,
            elapsed_seconds: None,
            failure_reason: None,
        };

        match next.phase {
            JobPhase::Completed => {
                let outputs = response
                    .output_files
                    .as_ref()
                    .ok_or_else(|| ProtocolError::MissingOutputs(job_id.clone()))?;
                let elapsed = response
                    .processing_time
                    .ok_or(ProtocolError::MissingProcessingTime(job_id))?;
                next.progress = 100;
                next.outputs = Some(outputs.to_map());
                next.elapsed_seconds = Some(elapsed);
            }
            JobPhase::Failed => {
                // Progress stays where it was last observed.
                if self.phase != JobPhase::Idle {
                    next.progress = self.progress;
                }
                next.failure_reason = Some(
                    response
                        .error
                        .clone()
                        .or_else(|| response.detail.clone())
                        .filter(|msg| !msg.is_empty())
                        .unwrap_or_else(|| GENERIC_FAILURE.to_string()),
                );
            }
            _ => {
                if response.progress < u32::from(self.progress) && self.phase.is_active() {
                    tracing::debug!(
                        "Progress for job {} went backwards: {} -> {}",
                        next.job_id.as_deref().unwrap_or_default(),
                        self.progress,
                        response.progress
                    );
                }
            }
        }

        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::models::OutputFiles;

    fn outputs() -> OutputFiles {
        OutputFiles {
            preprocessed_eeg: "/outputs/job-123/preprocessed_eeg.json".into(),
            music_parameters: "/outputs/job-123/music_parameters.json".into(),
            global_parameters: "/outputs/job-123/global_parameters.json".into(),
            midi_file: "/outputs/job-123/music.mid".into(),
            midi_visualization: "/outputs/job-123/midi.png".into(),
            wave_distribution_plot: "/outputs/job-123/wave_distribution.png".into(),
            wave_heatmap_plot: "/outputs/job-123/wave_heatmap.png".into(),
            music_parameters_plot: "/outputs/job-123/music_parameters.png".into(),
            global_parameters_plot: "/outputs/job-123/global_parameters.png".into(),
        }
    }

    fn response(status: RemoteStatus, progress: u32) -> StatusResponse {
        StatusResponse {
            job_id: "job-123".into(),
            status,
            progress,
            output_files: None,
            processing_time: None,
            error: None,
            detail: None,
        }
    }

    #[test]
    fn test_pending_record() {
        let record = JobStatusRecord::pending("job-123");
        assert_eq!(record.job_id.as_deref(), Some("job-123"));
        assert_eq!(record.phase, JobPhase::Pending);
        assert_eq!(record.progress, 0);
        assert!(record.outputs.is_none());
    }

    #[test]
    fn test_reconcile_processing_then_completed() {
        let mut record = JobStatusRecord::pending("job-123");

        assert!(record.reconcile(&response(RemoteStatus::Processing, 42)).unwrap());
        assert_eq!(record.phase, JobPhase::Processing);
        assert_eq!(record.progress, 42);

        let mut done = response(RemoteStatus::Completed, 100);
        done.output_files = Some(outputs());
        done.processing_time = Some(12.4);
        assert!(record.reconcile(&done).unwrap());

        assert_eq!(record.phase, JobPhase::Completed);
        assert_eq!(record.progress, 100);
        assert_eq!(record.outputs.as_ref().map(|o| o.len()), Some(9));
        assert_eq!(record.elapsed_seconds, Some(12.4));
        assert!(record.failure_reason.is_none());
    }

    #[test]
    fn test_completed_pins_progress() {
        let mut record = JobStatusRecord::pending("job-123");
        let mut done = response(RemoteStatus::Completed, 87);
        done.output_files = Some(outputs());
        done.processing_time = Some(3.0);
        record.reconcile(&done).unwrap();
        assert_eq!(record.progress, 100);
    }

    #[test]
    fn test_completed_without_outputs_is_protocol_error() {
        let mut record = JobStatusRecord::pending("job-123");
        record.reconcile(&response(RemoteStatus::Processing, 60)).unwrap();
        let before = record.clone();

        let mut done = response(RemoteStatus::Completed, 100);
        done.processing_time = Some(1.0);
        let err = record.reconcile(&done).unwrap_err();

        assert_eq!(err, ProtocolError::MissingOutputs("job-123".into()));
        assert_eq!(record, before);
    }

    #[test]
    fn test_completed_without_processing_time_is_protocol_error() {
        let mut record = JobStatusRecord::pending("job-123");
        let mut done = response(RemoteStatus::Completed, 100);
        done.output_files = Some(outputs());
        assert!(matches!(
            record.reconcile(&done),
            Err(ProtocolError::MissingProcessingTime(_))
        ));
        assert_eq!(record.phase, JobPhase::Pending);
    }

    #[test]
    fn test_failed_keeps_last_progress_and_reason() {
        let mut record = JobStatusRecord::pending("job-123");
        record.reconcile(&response(RemoteStatus::Processing, 35)).unwrap();

        let mut failed = response(RemoteStatus::Failed, 0);
        failed.detail = Some("EEG file has no usable channels".into());
        record.reconcile(&failed).unwrap();

        assert_eq!(record.phase, JobPhase::Failed);
        assert_eq!(record.progress, 35);
        assert_eq!(
            record.failure_reason.as_deref(),
            Some("EEG file has no usable channels")
        );
        assert!(record.outputs.is_none());
    }

    #[test]
    fn test_failed_prefers_error_then_falls_back() {
        let mut record = JobStatusRecord::pending("job-123");
        let mut failed = response(RemoteStatus::Failed, 10);
        failed.error = Some("out of memory".into());
        failed.detail = Some("ignored".into());
        record.reconcile(&failed).unwrap();
        assert_eq!(record.failure_reason.as_deref(), Some("out of memory"));

        let mut record = JobStatusRecord::pending("job-123");
        record.reconcile(&response(RemoteStatus::Failed, 10)).unwrap();
        assert_eq!(record.failure_reason.as_deref(), Some("Processing failed"));
    }

    #[test]
    fn test_terminal_reconcile_is_idempotent() {
        let mut record = JobStatusRecord::pending("job-123");
        let mut failed = response(RemoteStatus::Failed, 50);
        failed.error = Some("boom".into());

        assert!(record.reconcile(&failed).unwrap());
        let first = record.clone();
        assert!(!record.reconcile(&failed).unwrap());
        assert_eq!(record, first);
    }

    #[test]
    fn test_mismatched_job_id_is_rejected() {
        let mut record = JobStatusRecord::pending("job-123");
        let mut other = response(RemoteStatus::Processing, 10);
        other.job_id = "job-999".into();
        assert!(matches!(
            record.reconcile(&other),
            Err(ProtocolError::JobIdMismatch { .. })
        ));
    }

    #[test]
    fn test_progress_over_100_is_rejected() {
        let mut record = JobStatusRecord::pending("job-123");
        assert_eq!(
            record.reconcile(&response(RemoteStatus::Processing, 140)),
            Err(ProtocolError::ProgressOutOfRange(140))
        );
    }

    #[test]
    fn test_status_text() {
        let mut record = JobStatusRecord::pending("job-123");
        assert_eq!(record.status_text(), "Initializing processing...");

        record.reconcile(&response(RemoteStatus::Processing, 42)).unwrap();
        assert_eq!(record.status_text(), "Processing EEG data (42%)");

        let mut done = response(RemoteStatus::Completed, 100);
        done.output_files = Some(outputs());
        done.processing_time = Some(12.44);
        record.reconcile(&done).unwrap();
        assert_eq!(record.status_text(), "Processing completed in 12.4 seconds");
    }

    #[test]
    fn test_phase_display_and_classes() {
        assert_eq!(JobPhase::Processing.to_string(), "PROCESSING");
        assert!(JobPhase::Failed.is_terminal());
        assert!(!JobPhase::Idle.is_active());
        assert!(JobPhase::Pending.is_active());
    }
}
