// ABOUTME: Remote backend access module
// ABOUTME: HTTP client and wire models for the EEG processing API

pub mod client;
pub mod models;

pub use client::{resolve_artifact_url, RemoteClient, ResultsOutcome};
pub use models::{OutputFiles, ProcessResponse, RemoteStatus, StatusResponse, UploadResponse};
