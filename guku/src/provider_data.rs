//! Provider data structure passed to resources and data sources

use crate::api::GukuApi;
use crate::clock::{Clock, TokioClock};
use crate::reconcile::PollPolicy;
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tfplug::types::Diagnostic;

/// Settle delays and polling cadence; fixed, not user-configurable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    pub cluster_create_settle: Duration,
    pub cluster_delete_settle: Duration,
    pub binding_delete_settle: Duration,
    pub binding_poll: PollPolicy,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            cluster_create_settle: Duration::from_secs(40),
            cluster_delete_settle: Duration::from_secs(30),
            binding_delete_settle: Duration::from_secs(120),
            binding_poll: PollPolicy::default(),
        }
    }
}

#[derive(Clone)]
pub struct GukuProviderData {
    pub client: Arc<dyn GukuApi>,
    pub clock: Arc<dyn Clock>,
    pub timings: Timings,
}

impl GukuProviderData {
    pub fn new(client: Arc<dyn GukuApi>) -> Self {
        Self {
            client,
            clock: Arc::new(TokioClock),
            timings: Timings::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Extracts the data handed to a resource or data source `configure`.
    /// Nothing is configured yet when the host passes no data.
    pub fn from_provider_data(
        data: Option<Arc<dyn Any + Send + Sync>>,
        kind: &str,
    ) -> Result<Option<Self>, Diagnostic> {
        let Some(data) = data else {
            return Ok(None);
        };
        match data.downcast_ref::<GukuProviderData>() {
            Some(provider_data) => Ok(Some(provider_data.clone())),
            None => Err(Diagnostic::error(
                format!("Unexpected {} Configure Type", kind),
                "Expected GukuProviderData, got a different type. Please report this issue to the provider developers.",
            )),
        }
    }
}

pub(crate) fn not_configured() -> Diagnostic {
    Diagnostic::error(
        "Provider not configured",
        "Provider data was not properly configured",
    )
}
