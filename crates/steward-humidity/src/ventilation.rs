use steward_catalog::{Feature, ObjectDeclaration};
use steward_core::{FeatureId, IdError, ObjectKind};

/// Base ventilation surface, always enabled.
///
/// Owns the per-device mode select and the four raw climate sensors the
/// optional features build on. Runs no automation itself; the host (or
/// a simulation) is expected to feed the sensors, and either the user
/// or the humidity controller drives the select.
pub struct VentilationFeature {
    id: FeatureId,
}

impl VentilationFeature {
    pub const ID: &'static str = "ventilation";

    pub const MODE: &'static str = "ventilation_mode";
    pub const MODE_AUTO: &'static str = "auto";
    pub const MODE_LOW: &'static str = "low";
    pub const MODE_MEDIUM: &'static str = "medium";
    pub const MODE_HIGH: &'static str = "high";

    pub const INDOOR_TEMPERATURE: &'static str = "indoor_temperature";
    pub const INDOOR_HUMIDITY: &'static str = "indoor_humidity";
    pub const OUTDOOR_TEMPERATURE: &'static str = "outdoor_temperature";
    pub const OUTDOOR_HUMIDITY: &'static str = "outdoor_humidity";

    pub fn new() -> Result<Self, IdError> {
        Ok(Self {
            id: FeatureId::new(Self::ID)?,
        })
    }
}

impl Feature for VentilationFeature {
    fn id(&self) -> FeatureId {
        self.id.clone()
    }

    fn title(&self) -> &str {
        "Ventilation"
    }

    fn always_on(&self) -> bool {
        true
    }

    fn declarations(&self) -> Vec<ObjectDeclaration> {
        vec![
            ObjectDeclaration::new(ObjectKind::Select, Self::MODE, "{device} ventilation mode")
                .with_select_options(vec![
                    Self::MODE_AUTO.to_string(),
                    Self::MODE_LOW.to_string(),
                    Self::MODE_MEDIUM.to_string(),
                    Self::MODE_HIGH.to_string(),
                ])
                .with_initial(Self::MODE_AUTO),
            ObjectDeclaration::new(
                ObjectKind::Sensor,
                Self::INDOOR_TEMPERATURE,
                "{device} indoor temperature",
            )
            .with_unit("°C"),
            ObjectDeclaration::new(
                ObjectKind::Sensor,
                Self::INDOOR_HUMIDITY,
                "{device} indoor humidity",
            )
            .with_unit("%"),
            ObjectDeclaration::new(
                ObjectKind::Sensor,
                Self::OUTDOOR_TEMPERATURE,
                "{device} outdoor temperature",
            )
            .with_unit("°C"),
            ObjectDeclaration::new(
                ObjectKind::Sensor,
                Self::OUTDOOR_HUMIDITY,
                "{device} outdoor humidity",
            )
            .with_unit("%"),
        ]
    }
}
