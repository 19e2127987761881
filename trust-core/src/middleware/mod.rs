pub mod metrics;
pub mod signature;
pub mod tracing;

pub use self::metrics::metrics_middleware;
pub use self::signature::{
    signature_validation_middleware, RejectionObserver, SignatureConfig, SignatureRejection,
};
pub use self::tracing::request_id_middleware;
