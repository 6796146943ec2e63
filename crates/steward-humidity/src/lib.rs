//! Humidity-driven ventilation features.
//!
//! Three features that together steer a ventilation unit by comparing
//! indoor and outdoor moisture load: the always-on [`VentilationFeature`]
//! owning the mode select and the raw climate sensors,
//! [`AbsoluteHumidityFeature`] deriving absolute humidity from each
//! temperature/humidity pair, and [`HumidityControlFeature`] driving the
//! mode select between thresholds.

mod absolute;
mod control;
mod ventilation;

pub use absolute::{absolute_humidity, AbsoluteHumidityFeature};
pub use control::HumidityControlFeature;
pub use ventilation::VentilationFeature;
