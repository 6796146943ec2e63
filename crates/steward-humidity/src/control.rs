use async_trait::async_trait;
use steward_catalog::{
    Action, DecisionContext, DecisionError, EdgeTrigger, Feature, ObjectDeclaration, TriggerPattern,
};
use steward_core::{canonical_object_id, FeatureId, IdError, ObjectId, ObjectKind, STATE_OFF, STATE_ON};
use tracing::{debug, info};

use crate::absolute::AbsoluteHumidityFeature;
use crate::ventilation::VentilationFeature;

/// Ventilation level the controller drives towards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Demand {
    High,
    Low,
}

impl Demand {
    fn mode(self) -> &'static str {
        match self {
            Self::High => VentilationFeature::MODE_HIGH,
            Self::Low => VentilationFeature::MODE_LOW,
        }
    }
}

/// Threshold controller with an absolute-humidity sanity check.
///
/// While the master switch is on and indoor relative humidity leaves the
/// configured band, the controller drives the ventilation mode select.
/// Venting only runs HIGH when it actually moves moisture in the right
/// direction, judged by comparing indoor and outdoor absolute humidity
/// with a configurable offset. Inside the band nothing is touched, so a
/// manually chosen mode survives until the next threshold crossing.
///
/// A separate edge observer reacts to the master switch turning off by
/// resetting the mode to `auto` and clearing the active indicator. It is
/// deliberately independent of the threshold logic so that a manual
/// disable never loses to a sensor-driven decision racing against it.
pub struct HumidityControlFeature {
    id: FeatureId,
    base: FeatureId,
    source: FeatureId,
}

impl HumidityControlFeature {
    pub const ID: &'static str = "humidity_control";

    pub const SWITCH: &'static str = "humidity_control";
    pub const ACTIVE: &'static str = "humidity_control_active";
    pub const MAX_HUMIDITY: &'static str = "max_humidity";
    pub const MIN_HUMIDITY: &'static str = "min_humidity";
    pub const ABSOLUTE_OFFSET: &'static str = "absolute_offset";

    pub fn new() -> Result<Self, IdError> {
        Ok(Self {
            id: FeatureId::new(Self::ID)?,
            base: FeatureId::new(VentilationFeature::ID)?,
            source: FeatureId::new(AbsoluteHumidityFeature::ID)?,
        })
    }

    fn master_pattern(&self) -> TriggerPattern {
        TriggerPattern::new("master", self.id.clone(), ObjectKind::Switch, Self::SWITCH)
    }

    fn mode_target(&self, ctx: &DecisionContext) -> Result<ObjectId, DecisionError> {
        canonical_object_id(
            ObjectKind::Select,
            &self.base,
            ctx.device(),
            VentilationFeature::MODE,
        )
        .map_err(|err| DecisionError::Failed(err.to_string()))
    }

    fn indicator_target(&self, ctx: &DecisionContext) -> Result<ObjectId, DecisionError> {
        canonical_object_id(ObjectKind::BinarySensor, &self.id, ctx.device(), Self::ACTIVE)
            .map_err(|err| DecisionError::Failed(err.to_string()))
    }
}

#[async_trait]
impl Feature for HumidityControlFeature {
    fn id(&self) -> FeatureId {
        self.id.clone()
    }

    fn title(&self) -> &str {
        "Humidity control"
    }

    fn declarations(&self) -> Vec<ObjectDeclaration> {
        vec![
            ObjectDeclaration::new(ObjectKind::Switch, Self::SWITCH, "{device} humidity control")
                .with_initial(STATE_OFF),
            ObjectDeclaration::new(
                ObjectKind::BinarySensor,
                Self::ACTIVE,
                "{device} humidity control active",
            )
            .with_initial(STATE_OFF),
            ObjectDeclaration::new(
                ObjectKind::Number,
                Self::MAX_HUMIDITY,
                "{device} max humidity",
            )
            .with_unit("%")
            .with_initial("75"),
            ObjectDeclaration::new(
                ObjectKind::Number,
                Self::MIN_HUMIDITY,
                "{device} min humidity",
            )
            .with_unit("%")
            .with_initial("65"),
            ObjectDeclaration::new(
                ObjectKind::Number,
                Self::ABSOLUTE_OFFSET,
                "{device} absolute humidity offset",
            )
            .with_unit("g/m³")
            .with_initial("0.5"),
        ]
    }

    fn triggers(&self) -> Vec<TriggerPattern> {
        vec![
            TriggerPattern::new(
                "humidity",
                self.base.clone(),
                ObjectKind::Sensor,
                VentilationFeature::INDOOR_HUMIDITY,
            ),
            TriggerPattern::new(
                "indoor_absolute",
                self.source.clone(),
                ObjectKind::Sensor,
                AbsoluteHumidityFeature::INDOOR_ABSOLUTE,
            ),
            TriggerPattern::new(
                "outdoor_absolute",
                self.source.clone(),
                ObjectKind::Sensor,
                AbsoluteHumidityFeature::OUTDOOR_ABSOLUTE,
            ),
            self.master_pattern(),
            TriggerPattern::new(
                "max",
                self.id.clone(),
                ObjectKind::Number,
                Self::MAX_HUMIDITY,
            ),
            TriggerPattern::new(
                "min",
                self.id.clone(),
                ObjectKind::Number,
                Self::MIN_HUMIDITY,
            ),
            TriggerPattern::new(
                "offset",
                self.id.clone(),
                ObjectKind::Number,
                Self::ABSOLUTE_OFFSET,
            ),
        ]
    }

    fn edges(&self) -> Vec<EdgeTrigger> {
        vec![EdgeTrigger::new(self.master_pattern(), STATE_OFF)]
    }

    async fn decide(&self, ctx: &DecisionContext) -> Result<Vec<Action>, DecisionError> {
        if !ctx.is_on("master") {
            debug!(device = %ctx.device(), "humidity control is off, leaving mode untouched");
            return Ok(Vec::new());
        }

        let readings = (
            ctx.number("humidity"),
            ctx.number("indoor_absolute"),
            ctx.number("outdoor_absolute"),
            ctx.number("max"),
            ctx.number("min"),
            ctx.number("offset"),
        );
        let (Some(humidity), Some(abs_in), Some(abs_out), Some(max), Some(min), Some(offset)) =
            readings
        else {
            debug!(device = %ctx.device(), "readings incomplete, skipping evaluation");
            return Ok(Vec::new());
        };

        let demand = if humidity > max {
            // Vent hard only when indoor air carries more moisture than
            // what ventilation would pull in.
            if abs_in > abs_out + offset {
                Some(Demand::High)
            } else {
                Some(Demand::Low)
            }
        } else if humidity < min {
            // Too dry: vent hard only when outdoor air is drier still.
            if abs_in < abs_out - offset {
                Some(Demand::High)
            } else {
                Some(Demand::Low)
            }
        } else {
            None
        };

        let Some(demand) = demand else {
            debug!(device = %ctx.device(), humidity, "humidity within the configured band");
            return Ok(Vec::new());
        };

        info!(
            device = %ctx.device(),
            humidity,
            abs_in,
            abs_out,
            mode = demand.mode(),
            "driving ventilation"
        );
        Ok(vec![
            Action::set_state(self.mode_target(ctx)?, demand.mode()),
            Action::set_state(self.indicator_target(ctx)?, STATE_ON),
        ])
    }

    async fn on_edge(
        &self,
        _edge: &EdgeTrigger,
        ctx: &DecisionContext,
    ) -> Result<Vec<Action>, DecisionError> {
        info!(device = %ctx.device(), "humidity control switched off, resetting mode");
        Ok(vec![
            Action::set_state(self.mode_target(ctx)?, VentilationFeature::MODE_AUTO),
            Action::set_state(self.indicator_target(ctx)?, STATE_OFF),
        ])
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use steward_core::{DeviceId, ObjectState};

    use super::*;

    struct Readings {
        master: &'static str,
        humidity: &'static str,
        abs_in: &'static str,
        abs_out: &'static str,
        max: &'static str,
        min: &'static str,
        offset: &'static str,
    }

    impl Default for Readings {
        fn default() -> Self {
            Self {
                master: "on",
                humidity: "70",
                abs_in: "10.0",
                abs_out: "10.0",
                max: "75",
                min: "65",
                offset: "0.5",
            }
        }
    }

    fn ctx(readings: Readings) -> DecisionContext {
        let device: DeviceId = "vent_42".parse().unwrap();
        let mut ctx = DecisionContext::new(device);
        let roles = [
            ("master", "switch.vent_42__humidity_control__humidity_control", readings.master),
            ("humidity", "sensor.vent_42__ventilation__indoor_humidity", readings.humidity),
            (
                "indoor_absolute",
                "sensor.vent_42__absolute_humidity__indoor_absolute_humidity",
                readings.abs_in,
            ),
            (
                "outdoor_absolute",
                "sensor.vent_42__absolute_humidity__outdoor_absolute_humidity",
                readings.abs_out,
            ),
            ("max", "number.vent_42__humidity_control__max_humidity", readings.max),
            ("min", "number.vent_42__humidity_control__min_humidity", readings.min),
            ("offset", "number.vent_42__humidity_control__absolute_offset", readings.offset),
        ];
        for (role, id, value) in roles {
            let object_id: ObjectId = id.parse().unwrap();
            let state = ObjectState::new(object_id.clone(), value, HashMap::new());
            ctx = ctx.with_role(role, object_id, Some(state));
        }
        ctx
    }

    async fn decide(readings: Readings) -> Vec<Action> {
        let feature = HumidityControlFeature::new().unwrap();
        feature.decide(&ctx(readings)).await.unwrap()
    }

    fn mode_of(actions: &[Action]) -> Option<&str> {
        actions.iter().find_map(|action| {
            let Action::SetState { object_id, state } = action;
            object_id
                .to_string()
                .ends_with("__ventilation_mode")
                .then_some(state.as_str())
        })
    }

    fn indicator_of(actions: &[Action]) -> Option<&str> {
        actions.iter().find_map(|action| {
            let Action::SetState { object_id, state } = action;
            object_id
                .to_string()
                .ends_with("__humidity_control_active")
                .then_some(state.as_str())
        })
    }

    #[tokio::test]
    async fn humid_indoors_dry_outdoors_vents_high() {
        let actions = decide(Readings {
            humidity: "80",
            abs_in: "15.0",
            abs_out: "8.0",
            ..Readings::default()
        })
        .await;
        assert_eq!(mode_of(&actions), Some("high"));
        assert_eq!(indicator_of(&actions), Some("on"));
    }

    #[tokio::test]
    async fn offset_boundary_uses_exact_arithmetic() {
        // 15.0 against 14.0 + 0.5: indoor still carries more moisture,
        // so the sanity check passes and the unit vents high.
        let actions = decide(Readings {
            humidity: "80",
            abs_in: "15.0",
            abs_out: "14.0",
            ..Readings::default()
        })
        .await;
        assert_eq!(mode_of(&actions), Some("high"));
    }

    #[tokio::test]
    async fn humid_both_sides_vents_low() {
        let actions = decide(Readings {
            humidity: "80",
            abs_in: "10.0",
            abs_out: "10.0",
            ..Readings::default()
        })
        .await;
        assert_eq!(mode_of(&actions), Some("low"));
        assert_eq!(indicator_of(&actions), Some("on"));
    }

    #[tokio::test]
    async fn dry_indoors_more_humid_outdoors_vents_high() {
        let actions = decide(Readings {
            humidity: "55",
            abs_in: "6.0",
            abs_out: "12.0",
            ..Readings::default()
        })
        .await;
        assert_eq!(mode_of(&actions), Some("high"));
    }

    #[tokio::test]
    async fn dry_both_sides_vents_low() {
        let actions = decide(Readings {
            humidity: "55",
            abs_in: "6.0",
            abs_out: "6.2",
            ..Readings::default()
        })
        .await;
        assert_eq!(mode_of(&actions), Some("low"));
    }

    #[tokio::test]
    async fn inside_the_band_nothing_is_touched() {
        let actions = decide(Readings::default()).await;
        assert!(actions.is_empty());
    }

    #[tokio::test]
    async fn threshold_boundaries_belong_to_the_band() {
        for humidity in ["75", "65"] {
            let actions = decide(Readings {
                humidity,
                abs_in: "15.0",
                abs_out: "8.0",
                ..Readings::default()
            })
            .await;
            assert!(actions.is_empty(), "humidity {humidity} must not act");
        }
    }

    #[tokio::test]
    async fn master_off_suppresses_all_decisions() {
        let actions = decide(Readings {
            master: "off",
            humidity: "95",
            abs_in: "18.0",
            abs_out: "5.0",
            ..Readings::default()
        })
        .await;
        assert!(actions.is_empty());
    }

    #[tokio::test]
    async fn unknown_reading_skips_evaluation() {
        let actions = decide(Readings {
            humidity: "unknown",
            ..Readings::default()
        })
        .await;
        assert!(actions.is_empty());
    }

    #[tokio::test]
    async fn edge_reset_restores_auto_and_clears_indicator() {
        let feature = HumidityControlFeature::new().unwrap();
        let edges = feature.edges();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].to, "off");

        // Sensor readings are extreme on purpose: the reset must ignore
        // them entirely.
        let actions = feature
            .on_edge(
                &edges[0],
                &ctx(Readings {
                    master: "off",
                    humidity: "99",
                    abs_in: "20.0",
                    abs_out: "1.0",
                    ..Readings::default()
                }),
            )
            .await
            .unwrap();
        assert_eq!(mode_of(&actions), Some("auto"));
        assert_eq!(indicator_of(&actions), Some("off"));
    }

    #[tokio::test]
    async fn watches_its_inputs_but_not_its_outputs() {
        let feature = HumidityControlFeature::new().unwrap();
        let triggers = feature.triggers();
        assert_eq!(triggers.len(), 7);
        assert!(triggers
            .iter()
            .all(|pattern| pattern.key != VentilationFeature::MODE
                && pattern.key != HumidityControlFeature::ACTIVE));
    }
}
