//! Identity-document application portal.
//!
//! Citizens submit passport and PAN card applications with supporting files, agency
//! officials review and transition them, and every transition leaves an audit record and
//! a notification for the applicant.

pub mod config;
pub mod error;
pub mod notify;
pub mod storage;
pub mod store;
pub mod telemetry;
pub mod workflows;
