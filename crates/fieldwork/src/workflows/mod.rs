pub mod escalation;
pub mod grading;
pub mod import;
pub mod notifications;
