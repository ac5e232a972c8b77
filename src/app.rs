//! Startup wiring: configuration + registries → a ready [`Controller`].

use crate::alert;
use crate::config::LoggerConfig;
use crate::controller::Controller;
use crate::error::AppResult;
use crate::sensors::{self, SensorRegistry};
use crate::storage::Storage;
use crate::validators::{self, Validator, ValidatorArgs, ValidatorRegistry};
use tracing::info;

/// The registries consulted at startup
pub struct Registries {
    /// Sensor drivers keyed on manufacturer/model
    pub sensors: SensorRegistry,
    /// Validators keyed on name
    pub validators: ValidatorRegistry,
}

impl Registries {
    /// Registries holding the built-in drivers and validators
    pub fn builtin() -> AppResult<Self> {
        Ok(Self {
            sensors: sensors::builtin_registry()?,
            validators: validators::builtin_registry(),
        })
    }
}

/// Resolve the sensor and validators for `serial`, open its store and build the controller.
///
/// Nothing talks to the instrument here; the first connection happens on the
/// first acquisition.
pub fn build_controller(
    config: &LoggerConfig,
    serial: &str,
    registries: &Registries,
) -> AppResult<Controller> {
    let record = config.record(serial)?;
    let sensor = registries.sensors.resolve(record, &())?;
    info!(
        instrument = %record.display_name(),
        manufacturer = %record.manufacturer,
        model = %record.model,
        fields = ?sensor.fields().names().collect::<Vec<_>>(),
        "sensor resolved"
    );

    let notifier = alert::from_config(config.smtp.as_ref())?;
    let validators = config
        .validators
        .iter()
        .map(|declaration| {
            let args = ValidatorArgs::new(declaration.params.clone()).with_notifier(notifier.clone());
            registries.validators.resolve(&declaration.name, &args)
        })
        .collect::<AppResult<Vec<Box<dyn Validator>>>>()?;
    info!(
        validators = ?validators.iter().map(|v| v.name()).collect::<Vec<_>>(),
        "validators resolved"
    );

    let storage = Storage::open(
        &config.storage.log_dir,
        record,
        sensor.fields(),
        config.storage.db_timeout,
    )?;

    Controller::new(sensor, validators, storage, config.polling.interval)
}
