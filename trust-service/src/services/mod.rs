//! Services layer: ephemeral state, step-up authorization, credentials,
//! credential sealing, auditing and metrics.

pub mod audit;
mod clock;
mod credentials;
pub mod error;
pub mod metrics;
pub mod step_up;
pub mod store;
mod vault;

pub use audit::{
    record_event, AuditRejectionObserver, AuditSink, MemoryAuditSink, RedisAuditSink,
    TracingAuditSink,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use credentials::{
    credential_key, CredentialDirectory, InMemoryCredentialDirectory, StoreCredentialDirectory,
};
pub use error::StepUpError;
pub use metrics::{get_metrics, init_metrics};
pub use step_up::{StepUpAuthorizer, StepUpPolicy};
pub use store::{EphemeralStore, InMemoryStore, RedisStore};
pub use vault::VaultService;
