//! Step-up authorization: short-lived, single-use grants for one
//! (subject, action, target), gated by a password check with lockout.
//!
//! Per subject the lifecycle is `Normal -> LockedOut -> Normal`; per grant it
//! is `NoGrant -> Granted -> NoGrant` via consumption or expiry. All state
//! lives in the [`EphemeralStore`]; expiry is checked lazily against the
//! injected [`Clock`].

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use metrics::counter;
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::audit::{record_event, AuditSink};
use super::clock::{Clock, SystemClock};
use super::credentials::CredentialDirectory;
use super::error::StepUpError;
use super::store::EphemeralStore;
use crate::models::{AuditAction, AuditEvent, AuditStatus, Grant, GrantOutcome, SensitiveAction};
use crate::utils::{verify_against_placeholder, verify_password, Password};

pub const DEFAULT_GRANT_TTL_SECONDS: u64 = 90;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_LOCKOUT_SECONDS: u64 = 15 * 60;
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct StepUpPolicy {
    pub grant_ttl_seconds: u64,
    pub max_attempts: u32,
    pub lockout_seconds: u64,
    /// Reject grants presented from an IP other than the one they were issued to.
    pub strict_ip_binding: bool,
    pub store_timeout: Duration,
}

impl Default for StepUpPolicy {
    fn default() -> Self {
        Self {
            grant_ttl_seconds: DEFAULT_GRANT_TTL_SECONDS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            lockout_seconds: DEFAULT_LOCKOUT_SECONDS,
            strict_ip_binding: false,
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }
}

fn grant_prefix(subject_id: &str) -> String {
    format!("stepup:grant:{}:", urlencoding::encode(subject_id))
}

fn grant_key(subject_id: &str, action: SensitiveAction, target_id: &str) -> String {
    format!(
        "{}{}:{}",
        grant_prefix(subject_id),
        action.as_str(),
        urlencoding::encode(target_id)
    )
}

fn attempts_key(subject_id: &str) -> String {
    format!("stepup:attempts:{}", urlencoding::encode(subject_id))
}

fn lockout_key(subject_id: &str) -> String {
    format!("stepup:lockout:{}", urlencoding::encode(subject_id))
}

fn seconds_until(until: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    let millis = (until - now).num_milliseconds().max(0);
    ((millis + 999) / 1000).max(1) as u64
}

#[derive(Clone)]
pub struct StepUpAuthorizer {
    store: Arc<dyn EphemeralStore>,
    credentials: Arc<dyn CredentialDirectory>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
    policy: StepUpPolicy,
}

impl StepUpAuthorizer {
    pub fn new(
        store: Arc<dyn EphemeralStore>,
        credentials: Arc<dyn CredentialDirectory>,
        audit: Arc<dyn AuditSink>,
        policy: StepUpPolicy,
    ) -> Self {
        Self {
            store,
            credentials,
            audit,
            clock: Arc::new(SystemClock),
            policy,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn policy(&self) -> &StepUpPolicy {
        &self.policy
    }

    /// Check the password and, on success, issue a grant replacing any live
    /// grant for the same (subject, action, target).
    ///
    /// A locked-out subject is refused without looking at the password.
    #[tracing::instrument(skip(self, password))]
    pub async fn request_grant(
        &self,
        subject_id: &str,
        password: &Password,
        action: SensitiveAction,
        target_id: &str,
        origin_ip: Option<&str>,
    ) -> Result<GrantOutcome, StepUpError> {
        let result = self
            .evaluate_request(subject_id, password, action, target_id, origin_ip)
            .await;

        let (status, metadata, label) = match &result {
            Ok(GrantOutcome::Granted {
                grant_id,
                expires_in,
                ..
            }) => (
                AuditStatus::Success,
                json!({ "grant_id": grant_id, "expires_in": expires_in, "origin_ip": origin_ip }),
                "granted",
            ),
            Ok(GrantOutcome::Denied { attempts_remaining }) => (
                AuditStatus::Failure,
                json!({ "attempts_remaining": attempts_remaining, "origin_ip": origin_ip }),
                "denied",
            ),
            Ok(GrantOutcome::LockedOut { locked_until, .. }) => (
                AuditStatus::Denied,
                json!({ "locked_until": locked_until.to_rfc3339(), "origin_ip": origin_ip }),
                "locked_out",
            ),
            Err(e) => (
                AuditStatus::Failure,
                json!({ "error": e.to_string(), "origin_ip": origin_ip }),
                "error",
            ),
        };

        counter!("stepup_grant_requests_total", "outcome" => label).increment(1);
        record_event(
            self.audit.as_ref(),
            AuditEvent::new(Some(subject_id), AuditAction::StepUpRequested, status)
                .with_target(action.as_str(), target_id)
                .with_metadata(metadata)
                .at(self.clock.now()),
        )
        .await;

        result
    }

    async fn evaluate_request(
        &self,
        subject_id: &str,
        password: &Password,
        action: SensitiveAction,
        target_id: &str,
        origin_ip: Option<&str>,
    ) -> Result<GrantOutcome, StepUpError> {
        if let Some(locked_until) = self.active_lockout(subject_id).await? {
            tracing::info!(subject_id = %subject_id, "Step-up refused while locked out");
            return Ok(self.locked_out(locked_until));
        }

        // Slot is reserved before the password is evaluated.
        let max_attempts = self.policy.max_attempts.max(1);
        let slot = self.reserve_attempt(subject_id).await?;
        if slot > max_attempts {
            tracing::warn!(subject_id = %subject_id, slot, "Step-up attempt over the limit");
            if let Some(locked_until) = self.active_lockout(subject_id).await? {
                return Ok(self.locked_out(locked_until));
            }
            return Ok(GrantOutcome::Denied {
                attempts_remaining: 0,
            });
        }

        if !self.password_matches(subject_id, password).await? {
            return self.register_failure(subject_id, slot, max_attempts).await;
        }

        // A concurrent failure may have locked the subject while this
        // password was being verified.
        if let Some(locked_until) = self.active_lockout(subject_id).await? {
            tracing::warn!(subject_id = %subject_id, "Correct password arrived after lockout");
            return Ok(self.locked_out(locked_until));
        }

        self.guarded("attempts_reset", self.store.delete(&attempts_key(subject_id)))
            .await?;

        let ttl = self.policy.grant_ttl_seconds;
        let grant = Grant::issue(subject_id, action, target_id, origin_ip, self.clock.now(), ttl);
        let payload = serde_json::to_string(&grant).map_err(anyhow::Error::from)?;

        self.guarded(
            "grant_set",
            self.store
                .set_with_expiry(&grant_key(subject_id, action, target_id), &payload, ttl),
        )
        .await?;

        tracing::info!(
            subject_id = %subject_id,
            target_id = %target_id,
            grant_id = %grant.grant_id,
            "Step-up grant issued"
        );

        Ok(GrantOutcome::Granted {
            grant_id: grant.grant_id,
            expires_in: ttl,
            expires_at: grant.expires_at,
        })
    }

    fn locked_out(&self, locked_until: DateTime<Utc>) -> GrantOutcome {
        GrantOutcome::LockedOut {
            locked_until,
            retry_after_seconds: seconds_until(locked_until, self.clock.now()),
        }
    }

    async fn reserve_attempt(&self, subject_id: &str) -> Result<u32, StepUpError> {
        let slot = self
            .guarded(
                "attempts_incr",
                self.store
                    .incr_with_expiry(&attempts_key(subject_id), self.policy.lockout_seconds),
            )
            .await?;
        Ok(u32::try_from(slot.max(0)).unwrap_or(u32::MAX))
    }

    async fn register_failure(
        &self,
        subject_id: &str,
        slot: u32,
        max_attempts: u32,
    ) -> Result<GrantOutcome, StepUpError> {
        if slot < max_attempts {
            tracing::info!(subject_id = %subject_id, failures = slot, "Step-up password rejected");
            return Ok(GrantOutcome::Denied {
                attempts_remaining: max_attempts - slot,
            });
        }

        self.engage_lockout(subject_id).await?;
        Ok(GrantOutcome::Denied {
            attempts_remaining: 0,
        })
    }

    /// Set the lockout marker unless one is already active; returns the
    /// effective end of the lockout.
    ///
    /// The attempt counter stays in place until the lockout ends.
    async fn engage_lockout(&self, subject_id: &str) -> Result<DateTime<Utc>, StepUpError> {
        if let Some(locked_until) = self.active_lockout(subject_id).await? {
            return Ok(locked_until);
        }

        let locked_until = i64::try_from(self.policy.lockout_seconds)
            .ok()
            .and_then(ChronoDuration::try_seconds)
            .and_then(|window| self.clock.now().checked_add_signed(window))
            .ok_or_else(|| anyhow::anyhow!("Lockout window out of range"))?;

        self.guarded(
            "lockout_set",
            self.store.set_with_expiry(
                &lockout_key(subject_id),
                &locked_until.timestamp_millis().to_string(),
                self.policy.lockout_seconds,
            ),
        )
        .await?;

        tracing::warn!(
            subject_id = %subject_id,
            locked_until = %locked_until,
            "Step-up lockout engaged"
        );
        Ok(locked_until)
    }

    async fn active_lockout(&self, subject_id: &str) -> Result<Option<DateTime<Utc>>, StepUpError> {
        let key = lockout_key(subject_id);
        let Some(raw) = self.guarded("lockout_get", self.store.get(&key)).await? else {
            return Ok(None);
        };

        let until = raw
            .parse::<i64>()
            .ok()
            .and_then(DateTime::<Utc>::from_timestamp_millis);

        match until {
            Some(until) if self.clock.now() < until => return Ok(Some(until)),
            Some(_) => {}
            None => {
                tracing::warn!(subject_id = %subject_id, "Discarding unreadable lockout marker");
            }
        }

        self.guarded("lockout_delete", self.store.delete(&key)).await?;
        self.guarded("attempts_reset", self.store.delete(&attempts_key(subject_id)))
            .await?;
        Ok(None)
    }

    async fn password_matches(
        &self,
        subject_id: &str,
        password: &Password,
    ) -> Result<bool, StepUpError> {
        let hash = self
            .guarded("credential_lookup", self.credentials.password_hash(subject_id))
            .await?;

        let password = password.clone();
        let Some(hash) = hash else {
            tracing::warn!(subject_id = %subject_id, "Step-up requested for unknown subject");
            // Same argon2 cost as a real check.
            tokio::task::spawn_blocking(move || verify_against_placeholder(&password))
                .await
                .map_err(|e| anyhow::anyhow!("Password verification task failed: {}", e))?;
            return Ok(false);
        };

        tokio::task::spawn_blocking(move || verify_password(&password, &hash))
            .await
            .map_err(|e| anyhow::anyhow!("Password verification task failed: {}", e))?
            .map_err(|e| {
                tracing::error!(subject_id = %subject_id, error = %e, "Stored password hash unusable");
                StepUpError::Internal(e)
            })
    }

    /// True iff a live grant exists. Expired entries are removed on read.
    pub async fn has_valid_grant(
        &self,
        subject_id: &str,
        action: SensitiveAction,
        target_id: &str,
        current_ip: Option<&str>,
    ) -> Result<bool, StepUpError> {
        let key = grant_key(subject_id, action, target_id);
        let Some(raw) = self.guarded("grant_get", self.store.get(&key)).await? else {
            return Ok(false);
        };

        let grant: Grant = match serde_json::from_str(&raw) {
            Ok(grant) => grant,
            Err(e) => {
                tracing::warn!(subject_id = %subject_id, error = %e, "Discarding unreadable grant");
                self.guarded("grant_delete", self.store.delete(&key)).await?;
                return Ok(false);
            }
        };

        if !grant.is_live(self.clock.now()) {
            self.guarded("grant_delete", self.store.delete(&key)).await?;
            return Ok(false);
        }

        let ip_matches = match (grant.origin_ip.as_deref(), current_ip) {
            (None, _) => true,
            (Some(origin), Some(current)) => origin == current,
            (Some(_), None) => false,
        };

        if !ip_matches {
            tracing::warn!(
                subject_id = %subject_id,
                action = %action,
                target_id = %target_id,
                origin_ip = grant.origin_ip.as_deref().unwrap_or("-"),
                current_ip = current_ip.unwrap_or("-"),
                strict = self.policy.strict_ip_binding,
                "Step-up grant presented from a different IP"
            );
            if self.policy.strict_ip_binding {
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Delete the grant unconditionally; returns whether one existed.
    pub async fn consume_grant(
        &self,
        subject_id: &str,
        action: SensitiveAction,
        target_id: &str,
    ) -> Result<bool, StepUpError> {
        let existed = self
            .guarded(
                "grant_delete",
                self.store.delete(&grant_key(subject_id, action, target_id)),
            )
            .await?;

        if existed {
            counter!("stepup_grants_consumed_total").increment(1);
        }

        let status = if existed {
            AuditStatus::Success
        } else {
            AuditStatus::Failure
        };
        record_event(
            self.audit.as_ref(),
            AuditEvent::new(Some(subject_id), AuditAction::StepUpConsumed, status)
                .with_target(action.as_str(), target_id)
                .with_metadata(json!({ "consumed": existed }))
                .at(self.clock.now()),
        )
        .await;

        Ok(existed)
    }

    /// Drop every grant held by the subject; returns how many were live.
    pub async fn invalidate_all(&self, subject_id: &str) -> Result<u64, StepUpError> {
        let removed = self
            .guarded("grant_delete_all", self.store.delete_prefix(&grant_prefix(subject_id)))
            .await?;

        tracing::info!(subject_id = %subject_id, removed, "Step-up grants invalidated");
        record_event(
            self.audit.as_ref(),
            AuditEvent::new(Some(subject_id), AuditAction::StepUpInvalidated, AuditStatus::Success)
                .with_metadata(json!({ "removed": removed }))
                .at(self.clock.now()),
        )
        .await;

        Ok(removed)
    }

    /// Run a store call under the configured timeout. Errors and timeouts
    /// both fail closed.
    async fn guarded<T, F>(&self, operation: &'static str, fut: F) -> Result<T, StepUpError>
    where
        F: Future<Output = Result<T, anyhow::Error>>,
    {
        match tokio::time::timeout(self.policy.store_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                tracing::error!(operation, error = %e, "Ephemeral store call failed");
                Err(StepUpError::StoreUnavailable(e))
            }
            Err(_) => {
                tracing::error!(operation, "Ephemeral store call timed out");
                Err(StepUpError::StoreTimeout)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_escape_separators() {
        assert_eq!(
            grant_key("a:b", SensitiveAction::Sign, "DOC 42"),
            "stepup:grant:a%3Ab:sign:DOC%2042"
        );
        assert!(!grant_key("a:b", SensitiveAction::Sign, "x").starts_with(&grant_prefix("a")));
        assert_eq!(attempts_key("U"), "stepup:attempts:U");
        assert_eq!(lockout_key("U"), "stepup:lockout:U");
    }

    #[test]
    fn test_seconds_until_rounds_up() {
        let now = Utc::now();
        assert_eq!(seconds_until(now + ChronoDuration::milliseconds(1), now), 1);
        assert_eq!(seconds_until(now + ChronoDuration::milliseconds(1001), now), 2);
        assert_eq!(seconds_until(now - ChronoDuration::seconds(5), now), 1);
    }

    #[test]
    fn test_default_policy() {
        let policy = StepUpPolicy::default();
        assert_eq!(policy.grant_ttl_seconds, 90);
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.lockout_seconds, 900);
        assert!(!policy.strict_ip_binding);
    }
}
