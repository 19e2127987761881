pub mod health;
pub mod metrics;
pub mod step_up;
pub mod vault;

pub use health::health_check;
pub use step_up::{check_grant, consume_grant, invalidate_grants, request_grant};
pub use vault::{inspect_secret, seal_secret};
