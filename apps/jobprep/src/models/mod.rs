pub mod job;
pub mod artifacts;

pub use job::{JobPosting, JobRow, JobStatus, Verdict};
pub use artifacts::{BatchRunRow, ContactRow, EmailRow, ResumeRow};
