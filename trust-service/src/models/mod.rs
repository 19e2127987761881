pub mod audit_event;
pub mod grant;

pub use audit_event::{AuditAction, AuditEvent, AuditStatus};
pub use grant::{Grant, GrantOutcome, SensitiveAction};
