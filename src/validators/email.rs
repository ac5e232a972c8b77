//! Email escalation

use super::Validator;
use crate::alert::{Notifier, VALIDATOR_SUBJECT};
use crate::error::AppResult;
use crate::sensors::{Reading, Sensor};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

/// Sends an alert for every reading the inner policy rejects.
///
/// The decision is always the inner policy's. Delivery failures are logged
/// and never affect the decision.
pub struct EmailOnFailure {
    inner: Box<dyn Validator>,
    notifier: Arc<dyn Notifier>,
}

impl EmailOnFailure {
    /// Registration name
    pub const NAME: &'static str = "send-email";

    /// Wrap `inner`, alerting through `notifier`
    pub fn new(inner: Box<dyn Validator>, notifier: Arc<dyn Notifier>) -> Self {
        Self { inner, notifier }
    }
}

#[async_trait]
impl Validator for EmailOnFailure {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn validate(&mut self, reading: &Reading, sensor: &mut dyn Sensor) -> AppResult<bool> {
        let accepted = self.inner.validate(reading, sensor).await?;
        if !accepted {
            let alias = sensor.record().display_name().to_string();
            let body = format!("Received {reading} from {alias}");
            if let Err(e) = self.notifier.send(VALIDATOR_SUBJECT, &body).await {
                warn!(instrument = %alias, error = %e, "Could not send validator alert");
            }
        }
        Ok(accepted)
    }
}
