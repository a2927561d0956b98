// ABOUTME: Data structures for backend requests and responses
// ABOUTME: Mirrors the JSON bodies of the upload, process and status endpoints

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub file_id: String,
    pub filename: String,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessResponse {
    #[serde(default)]
    pub job_id: String,
    #[serde(default)]
    pub status: String,
}

/// Job status as reported on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemoteStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub job_id: String,
    pub status: RemoteStatus,
    #[serde(default)]
    pub progress: u32,
    pub output_files: Option<OutputFiles>,
    pub processing_time: Option<f64>,
    pub error: Option<String>,
    pub detail: Option<String>,
}

/// Locations of everything a completed job produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputFiles {
    pub preprocessed_eeg: String,
    pub music_parameters: String,
    pub global_parameters: String,
    pub midi_file: String,
    pub midi_visualization: String,
    pub wave_distribution_plot: String,
    pub wave_heatmap_plot: String,
    pub music_parameters_plot: String,
    pub global_parameters_plot: String,
}

impl OutputFiles {
    pub fn entries(&self) -> [(&'static str, &str); 9] {
        [
            ("preprocessed_eeg", &self.preprocessed_eeg),
            ("music_parameters", &self.music_parameters),
            ("global_parameters", &self.global_parameters),
            ("midi_file", &self.midi_file),
            ("midi_visualization", &self.midi_visualization),
            ("wave_distribution_plot", &self.wave_distribution_plot),
            ("wave_heatmap_plot", &self.wave_heatmap_plot),
            ("music_parameters_plot", &self.music_parameters_plot),
            ("global_parameters_plot", &self.global_parameters_plot),
        ]
    }

    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.entries()
            .into_iter()
            .map(|(name, location)| (name.to_string(), location.to_string()))
            .collect()
    }
}

/// Body carried by non-success responses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    pub detail: Option<String>,
}
