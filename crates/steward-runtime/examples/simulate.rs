//! Simulated end-to-end run against the in-process registry.
//!
//! Wires the three humidity features into a steward, feeds a burst of
//! climate readings and flips the master switch, printing what the
//! reconciler and the controller do along the way.
//!
//! Run with: cargo run -p steward-runtime --example simulate

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use steward_core::{ChangeContext, ObjectId};
use steward_dispatch::EngineState;
use steward_host::{MemoryRegistry, Registry};
use steward_humidity::{AbsoluteHumidityFeature, HumidityControlFeature, VentilationFeature};
use steward_runtime::StewardBuilder;
use tokio::time::sleep;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

async fn set(registry: &MemoryRegistry, id: &str, value: &str) -> Result<()> {
    let object_id: ObjectId = id.parse()?;
    registry
        .set_state(&object_id, value, ChangeContext::new())
        .await?;
    Ok(())
}

async fn show(registry: &MemoryRegistry, id: &str) -> Result<()> {
    let object_id: ObjectId = id.parse()?;
    match registry.get_state(&object_id).await {
        Some(state) => info!("  {} = {}", object_id, state.state),
        None => info!("  {} is gone", object_id),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting steward simulation");

    let registry = Arc::new(MemoryRegistry::new());
    let steward = StewardBuilder::new(registry.clone(), registry.clone())
        .register(Arc::new(VentilationFeature::new()?))?
        .register(Arc::new(AbsoluteHumidityFeature::new()?))?
        .register(Arc::new(HumidityControlFeature::new()?))?
        .with_device("vent_42".parse()?)
        .with_enabled("absolute_humidity".parse()?)
        .with_enabled("humidity_control".parse()?)
        .build();

    registry.mark_ready();
    let summary = steward.start().await?;
    info!(
        pass = %summary.pass_id,
        created = summary.created.len(),
        removed = summary.removed.len(),
        "initial reconciliation done"
    );

    let mut engine = steward.engine_signal();
    while *engine.borrow_and_update() != EngineState::Active {
        engine.changed().await?;
    }
    info!("dispatch engine active");

    info!("Enabling humidity control and feeding a humid room");
    set(
        &registry,
        "switch.vent_42__humidity_control__humidity_control",
        "on",
    )
    .await?;
    set(&registry, "sensor.vent_42__ventilation__indoor_temperature", "21.5").await?;
    set(&registry, "sensor.vent_42__ventilation__indoor_humidity", "82").await?;
    set(&registry, "sensor.vent_42__ventilation__outdoor_temperature", "4.0").await?;
    set(&registry, "sensor.vent_42__ventilation__outdoor_humidity", "58").await?;

    // Let the burst settle and the decision chain run.
    sleep(Duration::from_millis(1200)).await;
    info!("After the humid burst:");
    show(&registry, "sensor.vent_42__absolute_humidity__indoor_absolute_humidity").await?;
    show(&registry, "sensor.vent_42__absolute_humidity__outdoor_absolute_humidity").await?;
    show(&registry, "select.vent_42__ventilation__ventilation_mode").await?;
    show(
        &registry,
        "binary_sensor.vent_42__humidity_control__humidity_control_active",
    )
    .await?;

    info!("User switches the master off");
    set(
        &registry,
        "switch.vent_42__humidity_control__humidity_control",
        "off",
    )
    .await?;
    sleep(Duration::from_millis(200)).await;
    info!("After the manual disable:");
    show(&registry, "select.vent_42__ventilation__ventilation_mode").await?;
    show(
        &registry,
        "binary_sensor.vent_42__humidity_control__humidity_control_active",
    )
    .await?;

    let summary = steward.reconcile_now().await?;
    info!(noop = summary.is_noop(), "follow-up reconciliation");

    steward.stop().await;
    info!("Simulation finished");
    Ok(())
}
