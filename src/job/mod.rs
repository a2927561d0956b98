// ABOUTME: Client-side tracking of background processing jobs
// ABOUTME: Holds the job record model and the status poller that maintains it

pub mod poller;
pub mod record;

pub use poller::{require_job_id, JobPoller, PollerOptions, StatusSource};
pub use record::{JobPhase, JobStatusRecord};
