//! Instrument reset after repeated rejections

use super::Validator;
use crate::error::AppResult;
use crate::sensors::{Reading, ResetOptions, Sensor};
use async_trait::async_trait;
use tracing::{error, warn};

/// Default number of consecutive rejections before a reset
pub const DEFAULT_RESET_CRITERION: u32 = 5;

/// Resets the instrument once the inner policy rejects `criterion` readings in a row.
///
/// Any accepted reading zeroes the counter. After a reset attempt the counter is
/// zeroed whether the reset succeeded or not; a failed reset is logged and the
/// loop carries on.
pub struct EscalatingReset {
    inner: Box<dyn Validator>,
    criterion: u32,
    consecutive: u32,
    options: ResetOptions,
}

impl EscalatingReset {
    /// Registration name
    pub const NAME: &'static str = "ithx-with-reset";

    /// Wrap `inner`; a criterion of 0 behaves like 1
    pub fn new(inner: Box<dyn Validator>, criterion: u32) -> Self {
        Self {
            inner,
            criterion: criterion.max(1),
            consecutive: 0,
            options: ResetOptions::default(),
        }
    }

    /// Consecutive rejections seen since the last acceptance or reset
    pub fn consecutive_rejections(&self) -> u32 {
        self.consecutive
    }
}

#[async_trait]
impl Validator for EscalatingReset {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn validate(&mut self, reading: &Reading, sensor: &mut dyn Sensor) -> AppResult<bool> {
        if self.inner.validate(reading, sensor).await? {
            self.consecutive = 0;
            return Ok(true);
        }

        self.consecutive += 1;
        if self.consecutive >= self.criterion {
            let alias = sensor.record().display_name().to_string();
            warn!(
                instrument = %alias,
                reason = "reset",
                "The {alias} Omega iServer will reset due to {} bad readings.",
                self.criterion
            );
            if let Err(e) = sensor.reset(&self.options).await {
                error!(instrument = %alias, error = %e, "Reset failed");
            }
            self.consecutive = 0;
        }
        Ok(false)
    }
}
