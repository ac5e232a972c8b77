//! Reading validators: accept/reject policies applied before storage.
//!
//! Validators run in configuration order; the first rejection discards the
//! reading. A rejection is not an error: `validate` returns `Ok(false)` and
//! logs why. `Err` is reserved for contract violations (e.g. a dual-probe
//! policy given a reading of the wrong width) and stops the loop.
//!
//! Policies compose by ownership: [`reset::EscalatingReset`] and
//! [`email::EmailOnFailure`] each own an inner validator, delegate the decision
//! to it and add only their side effect.
//!
//! | Name | Policy | Parameters (defaults) |
//! |---|---|---|
//! | `simple-range` | [`range::SimpleRange`] | `vmin = 10`, `vmax = 30` |
//! | `send-email` | [`email::EmailOnFailure`] over `simple-range` | as `simple-range` |
//! | `ithx-range-checker` | [`range::ProbeRange`] | `tmin = 10`, `tmax = 30`, `hmin = 10`, `hmax = 90`, `dmin = 0`, `dmax = 20` |
//! | `ithx-with-reset` | [`reset::EscalatingReset`] over `ithx-range-checker` | `reset_criterion = 5` plus the range parameters |

pub mod email;
pub mod range;
pub mod reset;

use crate::alert::{DisabledNotifier, Notifier};
use crate::error::AppResult;
use crate::params::Params;
use crate::registry::{NamePattern, Registry};
use crate::sensors::{Reading, Sensor};
use async_trait::async_trait;
use std::sync::Arc;

/// Accept/reject policy for readings
#[async_trait]
pub trait Validator: Send {
    /// Registration name, used in diagnostics
    fn name(&self) -> &str;

    /// Decide whether `reading` from `sensor` may be stored.
    ///
    /// `sensor` supplies field names and identity for diagnostics, and its
    /// reset capability for escalation.
    async fn validate(&mut self, reading: &Reading, sensor: &mut dyn Sensor) -> AppResult<bool>;
}

/// Construction arguments handed to validator constructors
#[derive(Clone)]
pub struct ValidatorArgs {
    /// Parameters from the validator declaration
    pub params: Params,
    /// Alert channel for escalating policies
    pub notifier: Arc<dyn Notifier>,
}

impl ValidatorArgs {
    /// Arguments with the given parameters and alerts disabled
    pub fn new(params: Params) -> Self {
        Self {
            params,
            notifier: Arc::new(DisabledNotifier),
        }
    }

    /// Replace the notifier
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }
}

/// Registry of validators keyed on their configuration name
pub type ValidatorRegistry = Registry<str, ValidatorArgs, Box<dyn Validator>>;

/// Build the registry of built-in validators
pub fn builtin_registry() -> ValidatorRegistry {
    let mut registry = ValidatorRegistry::new("validator");

    registry.register(NamePattern::new(range::SimpleRange::NAME), |_, args| {
        Ok(Box::new(range::SimpleRange::from_params(&args.params)?) as Box<dyn Validator>)
    });
    registry.register(NamePattern::new(email::EmailOnFailure::NAME), |_, args| {
        let inner = range::SimpleRange::from_params(&args.params)?;
        Ok(Box::new(email::EmailOnFailure::new(Box::new(inner), args.notifier.clone()))
            as Box<dyn Validator>)
    });
    registry.register(NamePattern::new(range::ProbeRange::NAME), |_, args| {
        Ok(Box::new(range::ProbeRange::from_params(&args.params)?) as Box<dyn Validator>)
    });
    registry.register(NamePattern::new(reset::EscalatingReset::NAME), |_, args| {
        let inner = range::ProbeRange::from_params(&args.params)?;
        let criterion = args.params.u32_or("reset_criterion", reset::DEFAULT_RESET_CRITERION)?;
        Ok(Box::new(reset::EscalatingReset::new(Box::new(inner), criterion)) as Box<dyn Validator>)
    });

    registry
}
