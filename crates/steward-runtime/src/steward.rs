use std::collections::BTreeSet;
use std::sync::{Arc, PoisonError, RwLock};

use steward_catalog::{CatalogError, Feature, FeatureRegistry, ObjectCatalog};
use steward_core::{DeviceId, FeatureId};
use steward_dispatch::{resolve, DispatchEngine, EngineState, PlanSource, WatchPlan};
use steward_host::{HostSignals, Registry};
use steward_reconcile::{ReconcileError, ReconciliationSummary, Reconciler};
use thiserror::Error;
use tokio::sync::watch;
use tracing::info;

#[derive(Debug, Error)]
pub enum StewardError {
    #[error("unknown feature: {0}")]
    UnknownFeature(FeatureId),
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
}

/// What the steward currently manages: which optional features are
/// toggled on and which devices exist. Guarded separately so the plan
/// source can read it without an async context.
struct Scope {
    toggles: RwLock<BTreeSet<FeatureId>>,
    devices: RwLock<BTreeSet<DeviceId>>,
}

impl Scope {
    fn toggles(&self) -> BTreeSet<FeatureId> {
        self.toggles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn devices(&self) -> BTreeSet<DeviceId> {
        self.devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Re-resolves the watch plan from the live scope on every engine
/// (re)start and retry tick.
struct ScopedPlans {
    features: Arc<FeatureRegistry>,
    scope: Arc<Scope>,
}

impl PlanSource for ScopedPlans {
    fn current_plan(&self) -> WatchPlan {
        let toggles = self.scope.toggles();
        let devices = self.scope.devices();
        let catalog = ObjectCatalog::build(&self.features, &toggles, &devices).catalog;
        let enabled = self.features.enabled(&toggles);
        resolve(&catalog, &self.features, &enabled)
    }
}

/// Assembles a [`Steward`] from host handles, features and config.
pub struct StewardBuilder {
    registry: Arc<dyn Registry>,
    signals: Arc<dyn HostSignals>,
    features: FeatureRegistry,
    config: crate::StewardConfig,
    toggles: BTreeSet<FeatureId>,
    devices: BTreeSet<DeviceId>,
}

impl StewardBuilder {
    pub fn new(registry: Arc<dyn Registry>, signals: Arc<dyn HostSignals>) -> Self {
        Self {
            registry,
            signals,
            features: FeatureRegistry::new(),
            config: crate::StewardConfig::default(),
            toggles: BTreeSet::new(),
            devices: BTreeSet::new(),
        }
    }

    pub fn with_config(mut self, config: crate::StewardConfig) -> Self {
        self.config = config;
        self
    }

    pub fn register(mut self, feature: Arc<dyn Feature>) -> Result<Self, CatalogError> {
        self.features.register(feature)?;
        Ok(self)
    }

    pub fn with_device(mut self, device: DeviceId) -> Self {
        self.devices.insert(device);
        self
    }

    pub fn with_enabled(mut self, feature: FeatureId) -> Self {
        self.toggles.insert(feature);
        self
    }

    pub fn build(self) -> Steward {
        let features = Arc::new(self.features);
        let scope = Arc::new(Scope {
            toggles: RwLock::new(self.toggles),
            devices: RwLock::new(self.devices),
        });
        let plans = Arc::new(ScopedPlans {
            features: features.clone(),
            scope: scope.clone(),
        });
        let engine = DispatchEngine::new(
            self.registry.clone(),
            self.signals,
            plans,
            self.config.dispatch(),
        );
        let reconciler = Reconciler::new(self.registry);

        Steward {
            features,
            scope,
            reconciler,
            engine,
        }
    }
}

/// The assembled extension engine.
///
/// Scope mutations rebuild the catalog from scratch, run a
/// reconciliation pass and swap the engine's watch plan, so the
/// registry and the listeners always follow the same desired set.
pub struct Steward {
    features: Arc<FeatureRegistry>,
    scope: Arc<Scope>,
    reconciler: Reconciler,
    engine: DispatchEngine,
}

impl Steward {
    /// Initial reconciliation pass followed by engine startup. On a
    /// pass failure nothing is started and the caller may retry.
    pub async fn start(&self) -> Result<ReconciliationSummary, StewardError> {
        info!("starting steward");
        let summary = self.reconcile_now().await?;
        self.engine.start().await;
        Ok(summary)
    }

    /// Tear down dispatch. Completed synchronously: no decision logic
    /// runs after this returns.
    pub async fn stop(&self) {
        self.engine.stop().await;
        info!("steward stopped");
    }

    /// Run one reconciliation pass against the current catalog.
    pub async fn reconcile_now(&self) -> Result<ReconciliationSummary, StewardError> {
        let catalog = self.catalog();
        Ok(self.reconciler.run(&catalog).await?)
    }

    /// Rebuild of the desired catalog, for display and diffing.
    pub fn catalog(&self) -> ObjectCatalog {
        ObjectCatalog::build(&self.features, &self.scope.toggles(), &self.scope.devices()).catalog
    }

    /// Toggle an optional feature and bring registry and plan in step.
    pub async fn set_feature_enabled(
        &self,
        feature: &FeatureId,
        enabled: bool,
    ) -> Result<ReconciliationSummary, StewardError> {
        if !self.features.contains(feature) {
            return Err(StewardError::UnknownFeature(feature.clone()));
        }
        {
            let mut toggles = self
                .scope
                .toggles
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            if enabled {
                toggles.insert(feature.clone());
            } else {
                toggles.remove(feature);
            }
        }
        info!(feature = %feature, enabled, "feature toggled");
        self.resync().await
    }

    pub async fn add_device(&self, device: DeviceId) -> Result<ReconciliationSummary, StewardError> {
        {
            let mut devices = self
                .scope
                .devices
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            devices.insert(device.clone());
        }
        info!(device = %device, "device added");
        self.resync().await
    }

    pub async fn remove_device(
        &self,
        device: &DeviceId,
    ) -> Result<ReconciliationSummary, StewardError> {
        {
            let mut devices = self
                .scope
                .devices
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            devices.remove(device);
        }
        info!(device = %device, "device removed");
        self.resync().await
    }

    pub fn devices(&self) -> BTreeSet<DeviceId> {
        self.scope.devices()
    }

    /// Enabled features, always-on ones included.
    pub fn enabled_features(&self) -> BTreeSet<FeatureId> {
        self.features.enabled(&self.scope.toggles())
    }

    pub fn engine_state(&self) -> EngineState {
        self.engine.state()
    }

    /// Watch channel mirroring the engine state.
    pub fn engine_signal(&self) -> watch::Receiver<EngineState> {
        self.engine.state_signal()
    }

    async fn resync(&self) -> Result<ReconciliationSummary, StewardError> {
        let summary = self.reconcile_now().await?;
        self.engine.refresh().await;
        Ok(summary)
    }
}
