use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use indexmap::IndexMap;
use serde::Serialize;
use steward_catalog::{Action, DecisionContext};
use steward_core::{ChangeContext, DeviceId, FeatureId, StateChange};
use steward_host::{HostSignals, Registry};
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, error, info, trace, warn};

use crate::debounce::DebounceWindow;
use crate::resolver::{AutomationBinding, WatchPlan};

/// Startup and teardown phases of the dispatch engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Uninitialized,
    WaitingForHostReady,
    ListenersRegistered,
    Active,
}

impl EngineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::WaitingForHostReady => "waiting_for_host_ready",
            Self::ListenersRegistered => "listeners_registered",
            Self::Active => "active",
        }
    }
}

/// Tunables for debouncing and the resolver retry cadence.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Quiet period after which a device's burst is considered settled.
    pub debounce: Duration,
    /// Interval between re-resolution attempts while no binding exists.
    pub resolver_retry: Duration,
    /// Capacity of each per-device forwarding channel.
    pub channel_capacity: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(500),
            resolver_retry: Duration::from_secs(30),
            channel_capacity: 64,
        }
    }
}

/// Where the engine gets its watch plan from.
///
/// Called once at startup and again on every retry tick; the
/// implementation is expected to re-resolve against its current catalog
/// so late-appearing devices and objects are picked up.
pub trait PlanSource: Send + Sync {
    fn current_plan(&self) -> WatchPlan;
}

impl<F> PlanSource for F
where
    F: Fn() -> WatchPlan + Send + Sync,
{
    fn current_plan(&self) -> WatchPlan {
        self()
    }
}

/// Debounce and dispatch engine.
///
/// Owns one router task draining the registry's change stream, one
/// worker task per device with bindings, and during startup a single
/// bootstrap task that doubles as the retry handle. `stop` flips the
/// shutdown signal and joins every task, so no decision logic can run
/// after it returns.
pub struct DispatchEngine {
    shared: Arc<Shared>,
}

struct Shared {
    registry: Arc<dyn Registry>,
    signals: Arc<dyn HostSignals>,
    plans: Arc<dyn PlanSource>,
    config: DispatchConfig,
    state: watch::Sender<EngineState>,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    shutdown: Option<watch::Sender<bool>>,
    tasks: Vec<JoinHandle<()>>,
}

impl DispatchEngine {
    pub fn new(
        registry: Arc<dyn Registry>,
        signals: Arc<dyn HostSignals>,
        plans: Arc<dyn PlanSource>,
        config: DispatchConfig,
    ) -> Self {
        let (state, _) = watch::channel(EngineState::Uninitialized);
        Self {
            shared: Arc::new(Shared {
                registry,
                signals,
                plans,
                config,
                state,
                inner: Mutex::new(Inner::default()),
            }),
        }
    }

    pub fn state(&self) -> EngineState {
        *self.shared.state.borrow()
    }

    /// Watch channel mirroring the engine state, for callers that want
    /// to await a particular phase.
    pub fn state_signal(&self) -> watch::Receiver<EngineState> {
        self.shared.state.subscribe()
    }

    /// Begin startup. Returns immediately; readiness waiting and plan
    /// resolution happen on the bootstrap task.
    pub async fn start(&self) {
        let mut inner = self.shared.inner.lock().await;
        if inner.shutdown.is_some() {
            warn!("dispatch engine already running");
            return;
        }
        info!("starting dispatch engine");

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        inner.shutdown = Some(shutdown_tx);
        inner
            .tasks
            .push(tokio::spawn(bootstrap(self.shared.clone(), shutdown_rx)));
    }

    /// Tear everything down: pending debounce windows are discarded
    /// without firing and all tasks are joined before returning.
    /// Idempotent; a stopped engine reports `Uninitialized`.
    pub async fn stop(&self) {
        let tasks = {
            let mut inner = self.shared.inner.lock().await;
            let Some(shutdown) = inner.shutdown.take() else {
                return;
            };
            let _ = shutdown.send(true);
            self.shared.state.send_replace(EngineState::Uninitialized);
            std::mem::take(&mut inner.tasks)
        };

        for result in join_all(tasks).await {
            if let Err(err) = result {
                if err.is_panic() {
                    error!("dispatch task panicked during shutdown");
                }
            }
        }
        // A just-spawned bootstrap can publish WaitingForHostReady between
        // the shutdown signal and its first check. It is joined by now,
        // so this write is the last one.
        self.shared.state.send_replace(EngineState::Uninitialized);
        info!("dispatch engine stopped");
    }

    /// Swap the watch plan wholesale after a catalog change: tear the
    /// current tasks down and start over from the plan source. On an
    /// engine that is not running this is a no-op, since the plan is
    /// read fresh at every start.
    pub async fn refresh(&self) {
        {
            let inner = self.shared.inner.lock().await;
            if inner.shutdown.is_none() {
                debug!("dispatch engine not running, nothing to refresh");
                return;
            }
        }
        debug!("refreshing dispatch plan");
        self.stop().await;
        self.start().await;
    }
}

/// Startup task. Also the engine's single retry handle: it loops on the
/// resolver cadence until the plan has at least one binding, registers,
/// and then exits permanently.
async fn bootstrap(shared: Arc<Shared>, mut shutdown: watch::Receiver<bool>) {
    if !shared.signals.is_ready() {
        shared
            .state
            .send_replace(EngineState::WaitingForHostReady);
        info!("waiting for host readiness");

        let mut ready = shared.signals.ready_signal();
        while !*ready.borrow_and_update() {
            tokio::select! {
                changed = ready.changed() => {
                    if changed.is_err() {
                        // Readiness source went away without ever turning
                        // ready. Stay parked until shutdown.
                        warn!("host readiness signal lost; dispatch stays parked");
                        let _ = shutdown.changed().await;
                        return;
                    }
                }
                _ = shutdown.changed() => return,
            }
        }
        debug!("host is ready");
    }

    loop {
        if *shutdown.borrow() {
            return;
        }
        let plan = shared.plans.current_plan();
        for pending in &plan.pending {
            info!(
                feature = %pending.feature,
                device = %pending.device,
                missing = ?pending.missing,
                conflicts = ?pending.conflicts,
                "automation binding pending"
            );
        }
        if plan.is_empty() {
            debug!(
                retry = ?shared.config.resolver_retry,
                "no bindings resolved; will retry"
            );
            tokio::select! {
                _ = time::sleep(shared.config.resolver_retry) => {}
                _ = shutdown.changed() => return,
            }
            continue;
        }

        register(&shared, plan, &shutdown).await;
        return;
    }
}

/// Spawn the router and per-device workers for a resolved plan.
async fn register(shared: &Arc<Shared>, plan: WatchPlan, shutdown: &watch::Receiver<bool>) {
    let mut inner = shared.inner.lock().await;
    if *shutdown.borrow() {
        return;
    }
    shared
        .state
        .send_replace(EngineState::ListenersRegistered);

    // Subscribe before going active so nothing between the two is lost.
    let changes = shared.registry.changes();

    let mut by_device: IndexMap<DeviceId, Vec<AutomationBinding>> = IndexMap::new();
    for binding in &plan.bindings {
        by_device
            .entry(binding.device.clone())
            .or_default()
            .push(binding.clone());
    }

    let mut senders = HashMap::new();
    for (device, bindings) in by_device {
        let (tx, rx) = mpsc::channel(shared.config.channel_capacity);
        senders.insert(device.clone(), tx);
        inner.tasks.push(tokio::spawn(worker_loop(
            device,
            bindings,
            rx,
            shutdown.clone(),
            shared.registry.clone(),
            shared.config.debounce,
        )));
    }

    let bindings = plan.bindings.len();
    let devices = senders.len();
    inner.tasks.push(tokio::spawn(router_loop(
        changes,
        shutdown.clone(),
        plan.bindings,
        senders,
    )));

    shared.state.send_replace(EngineState::Active);
    info!(bindings, devices, "dispatch engine active");
}

/// Event forwarded from the router to a device's worker.
enum WorkerEvent {
    /// A trigger-role change; opens or extends the debounce window.
    Change(StateChange),
    /// A matched edge transition; observers run without debouncing.
    Edge(StateChange),
}

/// Drains the registry change stream and forwards each change to the
/// owning device's worker, classified as edge or debounce traffic.
async fn router_loop(
    mut changes: broadcast::Receiver<StateChange>,
    mut shutdown: watch::Receiver<bool>,
    bindings: Vec<AutomationBinding>,
    senders: HashMap<DeviceId, mpsc::Sender<WorkerEvent>>,
) {
    debug!(bindings = bindings.len(), "dispatch router started");
    loop {
        tokio::select! {
            received = changes.recv() => match received {
                Ok(change) => route_change(&change, &bindings, &senders).await,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "dispatch router lagged behind change stream");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    info!("registry change stream closed");
                    break;
                }
            },
            _ = shutdown.changed() => break,
        }
    }
    debug!("dispatch router stopped");
}

async fn route_change(
    change: &StateChange,
    bindings: &[AutomationBinding],
    senders: &HashMap<DeviceId, mpsc::Sender<WorkerEvent>>,
) {
    // Matched edge transitions, once per device. Unlike debounce traffic
    // these are never dropped; the send waits for queue space.
    let mut edge_notified: Vec<&DeviceId> = Vec::new();
    for binding in bindings {
        if edge_notified.contains(&&binding.device) {
            continue;
        }
        let matched = binding.edges.iter().any(|edge_watch| {
            edge_watch.object_id == change.object_id
                && edge_watch
                    .edge
                    .matches_transition(change.old_value(), change.new_value())
        });
        if !matched {
            continue;
        }
        edge_notified.push(&binding.device);
        if let Some(sender) = senders.get(&binding.device) {
            trace!(device = %binding.device, object = %change.object_id, "edge forwarded");
            if sender.send(WorkerEvent::Edge(change.clone())).await.is_err() {
                debug!(device = %binding.device, "worker gone, edge transition lost");
            }
        }
    }

    // Forward to debounce workers, once per device even when several
    // bindings of that device watch the same object.
    let mut notified: Vec<&DeviceId> = Vec::new();
    for binding in bindings {
        if !binding.watches(&change.object_id) || notified.contains(&&binding.device) {
            continue;
        }
        notified.push(&binding.device);
        if let Some(sender) = senders.get(&binding.device) {
            trace!(device = %binding.device, object = %change.object_id, "change forwarded");
            if let Err(err) = sender.try_send(WorkerEvent::Change(change.clone())) {
                debug!(device = %binding.device, error = %err, "worker queue full, change dropped");
            }
        }
    }
}

/// Owns one device's debounce window. Fires each settled burst exactly
/// once; decisions and edge observers for this device run strictly
/// sequentially, so an edge can never interleave with an in-flight
/// debounced decision.
async fn worker_loop(
    device: DeviceId,
    bindings: Vec<AutomationBinding>,
    mut rx: mpsc::Receiver<WorkerEvent>,
    mut shutdown: watch::Receiver<bool>,
    registry: Arc<dyn Registry>,
    debounce: Duration,
) {
    debug!(device = %device, bindings = bindings.len(), "dispatch worker started");
    let mut window = DebounceWindow::new(device.clone());
    loop {
        match window.deadline() {
            Some(deadline) => {
                tokio::select! {
                    received = rx.recv() => match received {
                        Some(WorkerEvent::Change(change)) => {
                            trace!(device = %device, object = %change.object_id, "burst extended");
                            window.extend(debounce);
                        }
                        Some(WorkerEvent::Edge(change)) => {
                            run_edges(&bindings, &change, &registry).await;
                        }
                        None => break,
                    },
                    _ = time::sleep_until(deadline) => {
                        window.settle();
                        fire_decisions(&device, &bindings, &registry).await;
                    }
                    _ = shutdown.changed() => break,
                }
            }
            None => {
                tokio::select! {
                    received = rx.recv() => match received {
                        Some(WorkerEvent::Change(change)) => {
                            trace!(device = %device, object = %change.object_id, "burst opened");
                            window.extend(debounce);
                        }
                        Some(WorkerEvent::Edge(change)) => {
                            run_edges(&bindings, &change, &registry).await;
                        }
                        None => break,
                    },
                    _ = shutdown.changed() => break,
                }
            }
        }
    }
    debug!(device = %device, "dispatch worker stopped");
}

/// Run every binding's decision once against the current role values.
async fn fire_decisions(
    device: &DeviceId,
    bindings: &[AutomationBinding],
    registry: &Arc<dyn Registry>,
) {
    for binding in bindings {
        let feature_id = binding.feature.id();
        debug!(feature = %feature_id, device = %device, "burst settled, deciding");

        let ctx = gather_context(registry, binding).await;
        let feature = binding.feature.clone();
        let run_ctx = ctx.clone();
        let outcome = tokio::spawn(async move { feature.decide(&run_ctx).await }).await;

        match outcome {
            Ok(Ok(actions)) => {
                apply_actions(registry, actions, ChangeContext::new(), &feature_id, device).await;
            }
            Ok(Err(err)) => {
                warn!(feature = %feature_id, device = %device, error = %err, "decision failed");
            }
            Err(err) if err.is_panic() => {
                error!(feature = %feature_id, device = %device, "decision panicked");
            }
            Err(_) => {}
        }
    }
}

/// Run every matching edge observer for one transition, in binding
/// order.
async fn run_edges(
    bindings: &[AutomationBinding],
    change: &StateChange,
    registry: &Arc<dyn Registry>,
) {
    for binding in bindings {
        for edge_watch in &binding.edges {
            if edge_watch.object_id == change.object_id
                && edge_watch
                    .edge
                    .matches_transition(change.old_value(), change.new_value())
            {
                let ctx = gather_context(registry, binding).await;
                run_edge(binding, edge_watch, &ctx, change.context.clone(), registry).await;
            }
        }
    }
}

async fn run_edge(
    binding: &AutomationBinding,
    edge_watch: &crate::resolver::EdgeWatch,
    ctx: &DecisionContext,
    cause: ChangeContext,
    registry: &Arc<dyn Registry>,
) {
    let feature_id = binding.feature.id();
    debug!(
        feature = %feature_id,
        device = %binding.device,
        object = %edge_watch.object_id,
        to = %edge_watch.edge.to,
        "edge transition matched"
    );

    let feature = binding.feature.clone();
    let edge = edge_watch.edge.clone();
    let run_ctx = ctx.clone();
    let outcome = tokio::spawn(async move { feature.on_edge(&edge, &run_ctx).await }).await;

    match outcome {
        Ok(Ok(actions)) => {
            apply_actions(registry, actions, cause, &feature_id, &binding.device).await;
        }
        Ok(Err(err)) => {
            warn!(feature = %feature_id, device = %binding.device, error = %err, "edge observer failed");
        }
        Err(err) if err.is_panic() => {
            error!(feature = %feature_id, device = %binding.device, "edge observer panicked");
        }
        Err(_) => {}
    }
}

/// Snapshot the current value of every role of a binding.
async fn gather_context(registry: &Arc<dyn Registry>, binding: &AutomationBinding) -> DecisionContext {
    let mut ctx = DecisionContext::new(binding.device.clone());
    for (role, object_id) in &binding.roles {
        let state = registry.get_state(object_id).await;
        ctx = ctx.with_role(role.clone(), object_id.clone(), state);
    }
    ctx
}

async fn apply_actions(
    registry: &Arc<dyn Registry>,
    actions: Vec<Action>,
    cause: ChangeContext,
    feature: &FeatureId,
    device: &DeviceId,
) {
    for action in actions {
        match action {
            Action::SetState { object_id, state } => {
                trace!(feature = %feature, device = %device, object = %object_id, state = %state, "applying action");
                if let Err(err) = registry.set_state(&object_id, &state, cause.child()).await {
                    warn!(
                        feature = %feature,
                        device = %device,
                        object = %object_id,
                        error = %err,
                        "state write failed"
                    );
                }
            }
        }
    }
}
