// ABOUTME: Presentation of a completed job's generated artifacts
// ABOUTME: Groups outputs by analysis stage and hands them to pluggable sinks

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::remote::client::{resolve_artifact_url, RemoteClient};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    /// JSON parameter and analysis data
    Data,
    Midi,
    /// Plots and visualizations
    Image,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub name: &'static str,
    pub label: &'static str,
    pub kind: ArtifactKind,
    /// Fully resolved location.
    pub location: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactGroup {
    pub title: &'static str,
    pub artifacts: Vec<Artifact>,
}

const LAYOUT: [(&str, &[(&str, &str, ArtifactKind)]); 3] = [
    (
        "EEG Analysis",
        &[
            ("preprocessed_eeg", "Preprocessed EEG Data", ArtifactKind::Data),
            ("wave_distribution_plot", "Wave Distribution", ArtifactKind::Image),
            ("wave_heatmap_plot", "Wave Heatmap", ArtifactKind::Image),
        ],
    ),
    (
        "Music Generation",
        &[
            ("music_parameters", "Music Parameters", ArtifactKind::Data),
            ("music_parameters_plot", "Music Parameters Plot", ArtifactKind::Image),
            ("midi_file", "MIDI File", ArtifactKind::Midi),
            ("midi_visualization", "MIDI Visualization", ArtifactKind::Image),
        ],
    ),
    (
        "Global Analysis",
        &[
            ("global_parameters", "Global Parameters", ArtifactKind::Data),
            ("global_parameters_plot", "Global Parameters Plot", ArtifactKind::Image),
        ],
    ),
];

/// Arrange a job's outputs into display groups, resolving every location
/// against `base`. Outputs missing from the map are left out.
pub fn group_outputs(outputs: &BTreeMap<String, String>, base: &str) -> Vec<ArtifactGroup> {
    LAYOUT
        .iter()
        .map(|&(title, entries)| ArtifactGroup {
            title,
            artifacts: entries
                .iter()
                .filter_map(|&(name, label, kind)| {
                    outputs.get(name).map(|path| Artifact {
                        name,
                        label,
                        kind,
                        location: resolve_artifact_url(base, path),
                    })
                })
                .collect(),
        })
        .filter(|group| !group.artifacts.is_empty())
        .collect()
}

/// Something that can show or store an artifact given its location.
pub trait ArtifactSink {
    fn render(&mut self, artifact: &Artifact) -> impl Future<Output = Result<()>>;
}

/// Prints artifact labels and locations.
pub struct ConsoleSink<W: Write> {
    out: W,
}

impl<W: Write> ConsoleSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn heading(&mut self, title: &str) -> Result<()> {
        writeln!(self.out, "{}", title)?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> ArtifactSink for ConsoleSink<W> {
    async fn render(&mut self, artifact: &Artifact) -> Result<()> {
        writeln!(self.out, "  {:<24} {}", artifact.label, artifact.location)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ManifestEntry {
    pub name: String,
    pub kind: ArtifactKind,
    pub source: String,
    pub file: String,
    pub sha256: String,
}

/// Downloads artifacts into a directory and records them in `manifest.json`.
pub struct DownloadSink<'a> {
    client: &'a RemoteClient,
    dir: PathBuf,
    entries: Vec<ManifestEntry>,
}

impl<'a> DownloadSink<'a> {
    pub fn new(client: &'a RemoteClient, dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        Ok(Self {
            client,
            dir,
            entries: Vec::new(),
        })
    }

    /// Write the manifest and return its path.
    pub fn finish(self) -> Result<PathBuf> {
        let path = self.dir.join("manifest.json");
        let json = serde_json::to_string_pretty(&self.entries)?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        tracing::info!("Saved {} artifacts to {}", self.entries.len(), self.dir.display());
        Ok(path)
    }
}

impl ArtifactSink for DownloadSink<'_> {
    async fn render(&mut self, artifact: &Artifact) -> Result<()> {
        let file = local_file_name(artifact);
        let sha256 = self
            .client
            .download_artifact(&artifact.location, &self.dir.join(&file))
            .await?;
        self.entries.push(ManifestEntry {
            name: artifact.name.to_string(),
            kind: artifact.kind,
            source: artifact.location.clone(),
            file,
            sha256,
        });
        Ok(())
    }
}

/// `<artifact name>.<extension of the remote file>`, so names never collide.
fn local_file_name(artifact: &Artifact) -> String {
    let path = artifact
        .location
        .split(['?', '#'])
        .next()
        .unwrap_or_default();
    match Path::new(path).extension().and_then(|ext| ext.to_str()) {
        Some(ext) => format!("{}.{}", artifact.name, ext),
        None => artifact.name.to_string(),
    }
}

/// Send every artifact, optionally limited to one kind, through `sink`.
pub async fn render_groups<S: ArtifactSink>(
    groups: &[ArtifactGroup],
    kind: Option<ArtifactKind>,
    sink: &mut S,
) -> Result<usize> {
    let mut rendered = 0;
    for artifact in groups
        .iter()
        .flat_map(|group| group.artifacts.iter())
        .filter(|artifact| kind.is_none_or(|k| artifact.kind == k))
    {
        sink.render(artifact).await?;
        rendered += 1;
    }
    Ok(rendered)
}
