//! Convergence of platform bindings on a terminal status
//!
//! The server moves a binding from `Pending` to `Succeeded`, `Failed` or
//! `Error` on its own schedule. After a create or update is submitted we
//! poll on a fixed cadence until the status leaves `Pending` or the attempt
//! budget runs out. The status returned by the submit counts as attempt 0.

use std::time::Duration;
use thiserror::Error;
use tfplug::context::Context;

use crate::api::{ApiError, GukuApi, PlatformBinding, PlatformBindingStatus};
use crate::clock::{sleep_or_cancel, Clock};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Fetches allowed after the submit
    pub max_attempts: u32,
    /// Wait before each fetch
    pub interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 20,
            interval: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Unable to poll platform binding, got error: {0}")]
    Fetch(#[source] ApiError),

    #[error("Polling platform binding was cancelled")]
    Cancelled,

    /// Terminal failure, or still pending once the budget is spent
    #[error("got status: {0}")]
    NotSucceeded(PlatformBindingStatus),
}

/// Polls `submitted` until it reaches a terminal status. Only a binding that
/// ends up `Succeeded` is returned.
pub async fn await_terminal_status(
    api: &dyn GukuApi,
    clock: &dyn Clock,
    ctx: &Context,
    policy: &PollPolicy,
    submitted: PlatformBinding,
) -> Result<PlatformBinding, ReconcileError> {
    let cluster_id = submitted.cluster_id.clone();
    let binding_id = submitted.id.clone();
    let mut binding = submitted;
    let mut attempt = 0;

    tracing::debug!(
        cluster_id = %cluster_id,
        binding_id = %binding_id,
        status = %binding.status,
        "platform binding submitted"
    );

    while binding.status.is_pending() && attempt < policy.max_attempts {
        attempt += 1;

        sleep_or_cancel(clock, ctx, policy.interval)
            .await
            .map_err(|_| ReconcileError::Cancelled)?;

        binding = api
            .get_platform_binding(&cluster_id, &binding_id)
            .await
            .map_err(ReconcileError::Fetch)?;

        tracing::debug!(
            binding_id = %binding_id,
            attempt,
            max_attempts = policy.max_attempts,
            status = %binding.status,
            "polled platform binding"
        );
    }

    match binding.status {
        PlatformBindingStatus::Succeeded => {
            tracing::info!(binding_id = %binding_id, attempts = attempt, "platform binding succeeded");
            Ok(binding)
        }
        status => {
            tracing::warn!(binding_id = %binding_id, attempts = attempt, %status, "platform binding did not succeed");
            Err(ReconcileError::NotSucceeded(status))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::memory::InMemoryApi;
    use crate::api::NewPlatformBinding;
    use crate::clock::RecordingClock;
    use PlatformBindingStatus::*;

    async fn submit(api: &InMemoryApi, statuses: Vec<PlatformBindingStatus>) -> PlatformBinding {
        api.script_binding_statuses(statuses);
        api.create_platform_binding(&NewPlatformBinding {
            cluster_id: "C-1".to_string(),
            platform_id: "P-1".to_string(),
            platform_version: "1.0.0".to_string(),
            platform_config_id: "PC-1".to_string(),
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn succeeds_after_pending_fetches() {
        for k in 1..=19usize {
            let api = InMemoryApi::new();
            let clock = RecordingClock::new();
            let mut script = vec![Pending; k + 1];
            script.push(Succeeded);
            let submitted = submit(&api, script).await;

            let binding = await_terminal_status(
                &api,
                &clock,
                &Context::new(),
                &PollPolicy::default(),
                submitted,
            )
            .await
            .unwrap();

            assert_eq!(binding.status, Succeeded);
            assert_eq!(api.calls("get_platform_binding"), k + 1, "k = {}", k);
            assert_eq!(clock.sleeps().len(), k + 1);
            assert!(clock.sleeps().iter().all(|d| *d == Duration::from_secs(30)));
        }
    }

    #[tokio::test]
    async fn immediate_success_does_not_poll() {
        let api = InMemoryApi::new();
        let clock = RecordingClock::new();
        let submitted = submit(&api, vec![Succeeded]).await;

        let binding = await_terminal_status(
            &api,
            &clock,
            &Context::new(),
            &PollPolicy::default(),
            submitted,
        )
        .await
        .unwrap();

        assert_eq!(binding.status, Succeeded);
        assert_eq!(api.calls("get_platform_binding"), 0);
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn budget_exhaustion_reports_pending() {
        let api = InMemoryApi::new();
        let clock = RecordingClock::new();
        let submitted = submit(&api, vec![Pending]).await;

        let err = await_terminal_status(
            &api,
            &clock,
            &Context::new(),
            &PollPolicy::default(),
            submitted,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ReconcileError::NotSucceeded(Pending)));
        assert!(err.to_string().contains("Pending"));
        assert_eq!(api.calls("get_platform_binding"), 20);
        assert_eq!(clock.elapsed(), Duration::from_secs(600));
    }

    #[tokio::test]
    async fn terminal_failure_stops_polling() {
        for (status, n) in [(Failed, 3usize), (Error, 20usize)] {
            let api = InMemoryApi::new();
            let clock = RecordingClock::new();
            let mut script = vec![Pending; n];
            script.push(status);
            let submitted = submit(&api, script).await;

            let err = await_terminal_status(
                &api,
                &clock,
                &Context::new(),
                &PollPolicy::default(),
                submitted,
            )
            .await
            .unwrap_err();

            assert!(err.to_string().contains(status.as_str()));
            assert_eq!(api.calls("get_platform_binding"), n);
        }
    }

    #[tokio::test]
    async fn fetch_error_abandons_polling() {
        let api = InMemoryApi::new();
        let clock = RecordingClock::new();
        let submitted = submit(&api, vec![Pending]).await;
        api.fail("get_platform_binding", "gateway exploded");

        let err = await_terminal_status(
            &api,
            &clock,
            &Context::new(),
            &PollPolicy::default(),
            submitted,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ReconcileError::Fetch(_)));
        assert!(err.to_string().contains("gateway exploded"));
        assert_eq!(api.calls("get_platform_binding"), 1);
    }

    #[tokio::test]
    async fn cancellation_stops_before_fetching() {
        let api = InMemoryApi::new();
        let clock = RecordingClock::new();
        let submitted = submit(&api, vec![Pending]).await;
        let ctx = Context::new();
        ctx.cancel();

        let err = await_terminal_status(&api, &clock, &ctx, &PollPolicy::default(), submitted)
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcileError::Cancelled));
        assert_eq!(api.calls("get_platform_binding"), 0);
    }
}
