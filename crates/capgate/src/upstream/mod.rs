pub mod adapter;
pub mod audit;

pub use adapter::UpstreamAdapter;
pub use audit::{AuditRecord, AuditSink};
