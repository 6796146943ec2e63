use async_trait::async_trait;
use steward_catalog::{Action, DecisionContext, DecisionError, Feature, ObjectDeclaration, TriggerPattern};
use steward_core::{canonical_object_id, FeatureId, IdError, ObjectKind};
use tracing::debug;

use crate::ventilation::VentilationFeature;

/// Absolute humidity in g/m³ from temperature (°C) and relative
/// humidity (%).
///
/// Uses the Magnus-form saturation vapor pressure
/// `6.112 * exp(17.67 * T / (T + 243.5))` hPa.
pub fn absolute_humidity(temperature: f64, relative_humidity: f64) -> f64 {
    let saturation_vp = 6.112 * ((17.67 * temperature) / (temperature + 243.5)).exp();
    (saturation_vp * relative_humidity * 2.1674) / (273.15 + temperature)
}

/// Derives indoor and outdoor absolute humidity from the base climate
/// sensors and publishes them as two sensors of its own, rounded to two
/// decimal places. A side whose temperature or humidity is not yet
/// known is skipped until the next burst.
pub struct AbsoluteHumidityFeature {
    id: FeatureId,
    base: FeatureId,
}

impl AbsoluteHumidityFeature {
    pub const ID: &'static str = "absolute_humidity";

    pub const INDOOR_ABSOLUTE: &'static str = "indoor_absolute_humidity";
    pub const OUTDOOR_ABSOLUTE: &'static str = "outdoor_absolute_humidity";

    pub fn new() -> Result<Self, IdError> {
        Ok(Self {
            id: FeatureId::new(Self::ID)?,
            base: FeatureId::new(VentilationFeature::ID)?,
        })
    }

    fn sensor_action(
        &self,
        ctx: &DecisionContext,
        key: &str,
        value: f64,
    ) -> Result<Action, DecisionError> {
        let object_id = canonical_object_id(ObjectKind::Sensor, &self.id, ctx.device(), key)
            .map_err(|err| DecisionError::Failed(err.to_string()))?;
        Ok(Action::set_state(object_id, format!("{value:.2}")))
    }
}

#[async_trait]
impl Feature for AbsoluteHumidityFeature {
    fn id(&self) -> FeatureId {
        self.id.clone()
    }

    fn title(&self) -> &str {
        "Absolute humidity"
    }

    fn declarations(&self) -> Vec<ObjectDeclaration> {
        vec![
            ObjectDeclaration::new(
                ObjectKind::Sensor,
                Self::INDOOR_ABSOLUTE,
                "{device} indoor absolute humidity",
            )
            .with_unit("g/m³"),
            ObjectDeclaration::new(
                ObjectKind::Sensor,
                Self::OUTDOOR_ABSOLUTE,
                "{device} outdoor absolute humidity",
            )
            .with_unit("g/m³"),
        ]
    }

    fn triggers(&self) -> Vec<TriggerPattern> {
        vec![
            TriggerPattern::new(
                "indoor_temperature",
                self.base.clone(),
                ObjectKind::Sensor,
                VentilationFeature::INDOOR_TEMPERATURE,
            ),
            TriggerPattern::new(
                "indoor_humidity",
                self.base.clone(),
                ObjectKind::Sensor,
                VentilationFeature::INDOOR_HUMIDITY,
            ),
            TriggerPattern::new(
                "outdoor_temperature",
                self.base.clone(),
                ObjectKind::Sensor,
                VentilationFeature::OUTDOOR_TEMPERATURE,
            ),
            TriggerPattern::new(
                "outdoor_humidity",
                self.base.clone(),
                ObjectKind::Sensor,
                VentilationFeature::OUTDOOR_HUMIDITY,
            ),
        ]
    }

    async fn decide(&self, ctx: &DecisionContext) -> Result<Vec<Action>, DecisionError> {
        let mut actions = Vec::new();

        match (ctx.number("indoor_temperature"), ctx.number("indoor_humidity")) {
            (Some(temperature), Some(humidity)) => {
                let value = absolute_humidity(temperature, humidity);
                actions.push(self.sensor_action(ctx, Self::INDOOR_ABSOLUTE, value)?);
            }
            _ => {
                debug!(device = %ctx.device(), "indoor climate pair incomplete, skipping");
            }
        }

        match (
            ctx.number("outdoor_temperature"),
            ctx.number("outdoor_humidity"),
        ) {
            (Some(temperature), Some(humidity)) => {
                let value = absolute_humidity(temperature, humidity);
                actions.push(self.sensor_action(ctx, Self::OUTDOOR_ABSOLUTE, value)?);
            }
            _ => {
                debug!(device = %ctx.device(), "outdoor climate pair incomplete, skipping");
            }
        }

        Ok(actions)
    }
}
