// ABOUTME: Library root for the EEG-to-music backend client
// ABOUTME: Exposes the HTTP client, job status poller and artifact presentation

pub mod artifacts;
pub mod config;
pub mod error;
pub mod job;
pub mod remote;

pub use config::ClientConfig;
pub use error::{FetchError, PollError, ProtocolError};
pub use job::{JobPhase, JobPoller, JobStatusRecord, PollerOptions, StatusSource};
pub use remote::{RemoteClient, ResultsOutcome};
