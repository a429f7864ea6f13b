use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tracing::{error, info, warn};

use super::driver::DriverClient;
use super::events::EventBus;
use super::{ClientState, ConfigurationId, PoolEvent, ScriptDocument};
use crate::config::{CoordinatorConfig, MAX_LEASE_MS};
use crate::error::{CoordinatorError, Result};
use crate::results::RunResults;
use crate::sync::{LockContext, ObjectKey, ObjectRegistry, ObjectScope, ObjectType, ScopeKey};
use crate::writer::ResultsWriter;

const SOURCE: &str = "coordinator";

struct ClientEntry {
    driver: Arc<dyn DriverClient>,
    state: ClientState,
    registered_at: DateTime<Utc>,
    configuration: Option<ConfigurationId>,
    last_results: Option<Arc<RunResults>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClientSnapshot {
    pub name: String,
    pub state: ClientState,
    pub registered_at: DateTime<Utc>,
    pub configuration: Option<ConfigurationId>,
    pub has_results: bool,
}

/// Barrier state of the current script configuration.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PoolStatus {
    pub configuration: Option<ConfigurationId>,
    pub script: Option<String>,
    pub participants: Vec<String>,
    pub expected: usize,
    pub reported: usize,
    pub done: bool,
    pub abandoned: bool,
    pub in_flight: usize,
    pub prepared_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl PoolStatus {
    /// A configuration is open until every participant reports or it is abandoned.
    pub fn is_open(&self) -> bool {
        self.configuration.is_some() && !self.done && !self.abandoned
    }

    fn elapsed_ms(&self) -> i64 {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => (end - start).num_milliseconds(),
            _ => 0,
        }
    }
}

/// What a driver script asks of a named object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockRequest {
    pub name: String,
    #[serde(default = "default_object_type")]
    pub object_type: ObjectType,
    #[serde(default)]
    pub scope: ObjectScope,
    pub lease_ms: Option<u64>,
    pub wait_ms: Option<u64>,
    /// Turn a lapsed wait into `LockTimeout` instead of `Ok(false)`.
    #[serde(default)]
    pub fail_on_timeout: bool,
}

fn default_object_type() -> ObjectType {
    ObjectType::Mutex
}

impl LockRequest {
    pub fn mutex(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            object_type: ObjectType::Mutex,
            scope: ObjectScope::default(),
            lease_ms: None,
            wait_ms: None,
            fail_on_timeout: false,
        }
    }

    pub fn event(name: impl Into<String>) -> Self {
        Self {
            object_type: ObjectType::Event,
            ..Self::mutex(name)
        }
    }

    pub fn scoped(mut self, scope: ObjectScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn lease_ms(mut self, ms: u64) -> Self {
        self.lease_ms = Some(ms);
        self
    }

    pub fn wait_ms(mut self, ms: u64) -> Self {
        self.wait_ms = Some(ms);
        self
    }
}

/// Tracks the driver pool, runs the dispatch protocol and brokers named
/// sync objects for driver scripts.
pub struct Coordinator {
    registry: Arc<ObjectRegistry>,
    clients: RwLock<HashMap<String, ClientEntry>>,
    progress: watch::Sender<PoolStatus>,
    events: EventBus,
    shutdown: watch::Sender<bool>,
    accepting: AtomicBool,
    next_configuration: AtomicU64,
    writers: Vec<Arc<dyn ResultsWriter>>,
    default_lease: Duration,
    default_wait: Duration,
    drain_timeout: Duration,
}

impl Coordinator {
    pub fn new(
        config: &CoordinatorConfig,
        registry: Arc<ObjectRegistry>,
        writers: Vec<Arc<dyn ResultsWriter>>,
    ) -> Self {
        let (progress, _) = watch::channel(PoolStatus::default());
        let (shutdown, _) = watch::channel(false);
        Self {
            registry,
            clients: RwLock::new(HashMap::new()),
            progress,
            events: EventBus::new(),
            shutdown,
            accepting: AtomicBool::new(true),
            next_configuration: AtomicU64::new(1),
            writers,
            default_lease: config.default_lease,
            default_wait: config.default_wait,
            drain_timeout: config.drain_timeout,
        }
    }

    pub fn registry(&self) -> &Arc<ObjectRegistry> {
        &self.registry
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn status(&self) -> PoolStatus {
        self.progress.borrow().clone()
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    fn is_shut_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    fn ensure_accepting(&self) -> Result<()> {
        if self.is_shut_down() || !self.is_accepting() {
            return Err(CoordinatorError::ShutDown);
        }
        Ok(())
    }

    // --- Pool lifecycle ---

    pub async fn register_client(&self, driver: Arc<dyn DriverClient>) -> Result<()> {
        self.ensure_accepting()?;
        let name = driver.name().to_string();
        if name.trim().is_empty() {
            return Err(CoordinatorError::invalid("client name must not be empty"));
        }

        {
            let mut clients = self.clients.write().await;
            if let Some(existing) = clients.get(&name) {
                if existing.state != ClientState::Unregistered {
                    return Err(CoordinatorError::illegal(format!(
                        "client '{}' is already registered ({})",
                        name, existing.state
                    )));
                }
            }
            clients.insert(
                name.clone(),
                ClientEntry {
                    driver,
                    state: ClientState::Registered,
                    registered_at: Utc::now(),
                    configuration: None,
                    last_results: None,
                },
            );
        }

        info!("Client '{}' registered", name);
        self.events.emit(
            SOURCE,
            format!("client {} registered", name),
            PoolEvent::ClientRegistered { client: name },
        );
        Ok(())
    }

    /// First phase of dispatch: opens a configuration over every idle driver
    /// and has each of them set the script up. Setup time is not measured.
    pub async fn prepare_script(&self, script: ScriptDocument) -> Result<ConfigurationId> {
        self.ensure_accepting()?;
        if script.name.trim().is_empty() {
            return Err(CoordinatorError::invalid("script name must not be empty"));
        }

        let (id, participants) = {
            let mut clients = self.clients.write().await;
            let current = self.progress.borrow().clone();
            if current.is_open() {
                return Err(CoordinatorError::illegal(format!(
                    "configuration {} for '{}' is still running",
                    current.configuration.map(|c| c.to_string()).unwrap_or_default(),
                    current.script.unwrap_or_default()
                )));
            }

            let mut idle: Vec<&String> = clients
                .iter()
                .filter(|(_, c)| c.state.is_idle())
                .map(|(name, _)| name)
                .collect();
            if idle.is_empty() {
                return Err(CoordinatorError::illegal("no idle clients to dispatch to"));
            }
            idle.sort();
            let names: Vec<String> = idle.into_iter().cloned().collect();

            let id = ConfigurationId(self.next_configuration.fetch_add(1, Ordering::SeqCst));
            let mut participants = Vec::with_capacity(names.len());
            for name in &names {
                if let Some(entry) = clients.get_mut(name) {
                    entry.state = ClientState::ScriptDispatched;
                    entry.configuration = Some(id);
                    participants.push(entry.driver.clone());
                }
            }

            self.progress.send_replace(PoolStatus {
                configuration: Some(id),
                script: Some(script.name.clone()),
                expected: names.len(),
                participants: names,
                in_flight: 1,
                prepared_at: Some(Utc::now()),
                ..PoolStatus::default()
            });
            (id, participants)
        };

        let names: Vec<String> = participants.iter().map(|d| d.name().to_string()).collect();
        info!(
            "Dispatching '{}' as configuration {} to {} clients",
            script.name,
            id,
            names.len()
        );
        self.events.emit(
            SOURCE,
            format!("script {} dispatched to {} clients", script.name, names.len()),
            PoolEvent::ScriptDispatched {
                configuration: id,
                script: script.name.clone(),
                clients: names,
            },
        );

        let calls = join_all(participants.iter().map(|d| d.prepare_script(id, &script)));
        let outcome = self.race_shutdown(calls).await;
        self.progress.send_modify(|p| p.in_flight = p.in_flight.saturating_sub(1));

        let outcomes = outcome.ok_or(CoordinatorError::ShutDown)?;
        let mut first_error = None;
        for (driver, result) in participants.iter().zip(outcomes) {
            if let Err(e) = result {
                warn!("Prepare of '{}' failed on {}: {}", script.name, driver.name(), e);
                first_error.get_or_insert(e);
            }
        }

        if let Some(e) = first_error {
            self.abandon(id).await;
            return Err(e);
        }
        Ok(id)
    }

    /// Second phase: starts a prepared configuration and stamps its start time.
    /// Allowed while draining for shutdown, since the configuration is already
    /// outstanding.
    pub async fn execute_prepared_script(&self, id: ConfigurationId) -> Result<()> {
        if self.is_shut_down() {
            return Err(CoordinatorError::ShutDown);
        }

        let participants = {
            let mut clients = self.clients.write().await;
            let current = self.progress.borrow().clone();
            if current.configuration != Some(id) || !current.is_open() {
                return Err(CoordinatorError::illegal(format!(
                    "configuration {} is not awaiting execution",
                    id
                )));
            }
            if current.started_at.is_some() {
                return Err(CoordinatorError::illegal(format!(
                    "configuration {} is already executing",
                    id
                )));
            }

            // Executing before the call goes out: a fast driver may report
            // before its execute call returns.
            let mut participants = Vec::new();
            for entry in clients.values_mut() {
                if entry.configuration == Some(id) && entry.state == ClientState::ScriptDispatched {
                    entry.state = ClientState::Executing;
                    participants.push(entry.driver.clone());
                }
            }
            self.progress.send_modify(|p| {
                p.started_at = Some(Utc::now());
                p.in_flight += 1;
            });
            participants
        };

        info!("Executing configuration {} on {} clients", id, participants.len());

        let calls = join_all(participants.iter().map(|d| d.execute_prepared(id)));
        let outcome = self.race_shutdown(calls).await;
        self.progress.send_modify(|p| p.in_flight = p.in_flight.saturating_sub(1));

        let outcomes = outcome.ok_or(CoordinatorError::ShutDown)?;
        let mut first_error = None;
        for (driver, result) in participants.iter().zip(outcomes) {
            if let Err(e) = result {
                warn!("Execute of configuration {} failed on {}: {}", id, driver.name(), e);
                self.drop_participant(id, driver.name()).await;
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Prepare and execute in one call.
    pub async fn execute_script(&self, script: ScriptDocument) -> Result<ConfigurationId> {
        let id = self.prepare_script(script).await?;
        self.execute_prepared_script(id).await?;
        Ok(id)
    }

    /// Accepts one driver's report. The last expected report of a
    /// configuration fires `PoolDone`, once.
    pub async fn record_results(&self, client: &str, results: RunResults) -> Result<()> {
        if results.client_name() != client {
            return Err(CoordinatorError::invalid(format!(
                "results from '{}' reported by '{}'",
                results.client_name(),
                client
            )));
        }
        let results = Arc::new(results);

        let id = {
            let mut clients = self.clients.write().await;
            let entry = clients
                .get_mut(client)
                .ok_or_else(|| CoordinatorError::UnknownClient(client.to_string()))?;
            if entry.state != ClientState::Executing {
                return Err(CoordinatorError::illegal(format!(
                    "client '{}' cannot report results while {}",
                    client, entry.state
                )));
            }
            let (current, script) = {
                let status = self.progress.borrow();
                (status.configuration, status.script.clone())
            };
            if entry.configuration == current {
                let reported = results.script_name();
                if script.as_deref() != Some(reported.as_str()) {
                    return Err(CoordinatorError::invalid(format!(
                        "client '{}' reported '{}' but configuration {} runs '{}'",
                        client,
                        reported,
                        current.map(|c| c.to_string()).unwrap_or_default(),
                        script.unwrap_or_default()
                    )));
                }
            }
            entry.state = ClientState::ReportedResults;
            entry.last_results = Some(results.clone());
            entry.configuration
        };

        info!(
            "Results for '{}' recorded from {} ({} cases)",
            results.script_name(),
            client,
            results.counters().cases
        );
        self.persist(results).await;
        self.registry
            .remove_scope(&ScopeKey::Instance(client.to_string()));

        let mut reported = None;
        let mut finished = None;
        self.progress.send_modify(|p| {
            if p.configuration != id || !p.is_open() {
                return;
            }
            p.reported += 1;
            reported = Some((p.reported, p.expected));
            if p.reported >= p.expected {
                p.done = true;
                p.finished_at = Some(Utc::now());
                finished = Some(p.clone());
            }
        });

        if let (Some(configuration), Some((reported, expected))) = (id, reported) {
            self.events.emit(
                client,
                format!("results recorded ({}/{})", reported, expected),
                PoolEvent::ResultsRecorded {
                    configuration,
                    client: client.to_string(),
                    reported,
                    expected,
                },
            );
        }
        if let Some(done) = finished {
            self.fire_pool_done(&done);
        }
        Ok(())
    }

    /// Blocks until the current configuration's barrier fires. `Ok(false)`
    /// means `timeout` passed first.
    pub async fn wait_for_pool_done(&self, timeout: Duration) -> Result<bool> {
        let mut progress = self.progress.subscribe();
        if progress.borrow().configuration.is_none() {
            return Err(CoordinatorError::illegal("no configuration has been dispatched"));
        }
        let mut shutdown = self.shutdown.subscribe();

        let waited = tokio::select! {
            r = tokio::time::timeout(timeout, progress.wait_for(|p| !p.is_open())) => {
                r.map(|res| res.map(|status| (*status).clone()))
            }
            _ = shutdown.wait_for(|s| *s) => return Err(CoordinatorError::ShutDown),
        };
        match waited {
            Err(_) => Ok(false),
            Ok(Err(_)) => Err(CoordinatorError::ShutDown),
            Ok(Ok(status)) if status.abandoned => Err(CoordinatorError::illegal(format!(
                "configuration {} was abandoned",
                status.configuration.map(|c| c.to_string()).unwrap_or_default()
            ))),
            Ok(Ok(_)) => Ok(true),
        }
    }

    /// `wait = false` tears everything down at once, unblocking lock waiters
    /// and dispatch calls, and tells nobody. `wait = true` drains for at most
    /// the configured drain timeout; see [`Coordinator::shut_down_draining`].
    pub async fn shut_down(&self, wait: bool) -> Result<()> {
        if wait {
            self.shut_down_draining(self.drain_timeout).await?;
        } else {
            self.shut_down_now().await;
        }
        Ok(())
    }

    /// Stops new dispatches, lets the current configuration finish and then
    /// shuts each driver down. If the configuration is still open after
    /// `timeout` this falls back to the immediate teardown and returns
    /// `Ok(false)`.
    pub async fn shut_down_draining(&self, timeout: Duration) -> Result<bool> {
        self.accepting.store(false, Ordering::SeqCst);

        info!("Draining before shutdown (up to {:?})", timeout);
        let mut progress = self.progress.subscribe();
        let mut shutdown = self.shutdown.subscribe();
        let drained = tokio::select! {
            r = tokio::time::timeout(
                timeout,
                progress.wait_for(|p| p.in_flight == 0 && !p.is_open()),
            ) => r.is_ok_and(|res| res.is_ok()),
            _ = shutdown.wait_for(|s| *s) => return Ok(false),
        };
        if !drained {
            let status = self.status();
            warn!(
                "Drain timed out after {:?} ({}/{} reported, {} calls in flight); shutting down immediately",
                timeout, status.reported, status.expected, status.in_flight
            );
            self.shut_down_now().await;
            return Ok(false);
        }

        let drivers: Vec<Arc<dyn DriverClient>> = {
            let clients = self.clients.read().await;
            clients
                .values()
                .filter(|c| c.state != ClientState::Unregistered)
                .map(|c| c.driver.clone())
                .collect()
        };
        let outcomes = join_all(drivers.iter().map(|d| d.shut_down())).await;

        {
            let mut clients = self.clients.write().await;
            for (driver, outcome) in drivers.iter().zip(outcomes) {
                if let Err(e) = outcome {
                    warn!("Client '{}' did not acknowledge shutdown: {}", driver.name(), e);
                }
                if let Some(entry) = clients.get_mut(driver.name()) {
                    entry.state = ClientState::Unregistered;
                    entry.configuration = None;
                }
                self.events.emit(
                    SOURCE,
                    format!("client {} shut down", driver.name()),
                    PoolEvent::ClientShutdown {
                        client: driver.name().to_string(),
                    },
                );
            }
        }

        self.shutdown.send_replace(true);
        self.registry.clear();
        info!("Shutdown complete ({} clients)", drivers.len());
        Ok(true)
    }

    async fn shut_down_now(&self) {
        info!("Shutting down immediately");
        self.accepting.store(false, Ordering::SeqCst);
        self.shutdown.send_replace(true);
        let mut clients = self.clients.write().await;
        for entry in clients.values_mut() {
            entry.state = ClientState::Unregistered;
            entry.configuration = None;
        }
        self.registry.clear();
    }

    pub async fn clients(&self) -> Vec<ClientSnapshot> {
        let clients = self.clients.read().await;
        let mut snapshot: Vec<ClientSnapshot> = clients
            .iter()
            .map(|(name, c)| ClientSnapshot {
                name: name.clone(),
                state: c.state,
                registered_at: c.registered_at,
                configuration: c.configuration,
                has_results: c.last_results.is_some(),
            })
            .collect();
        snapshot.sort_by(|a, b| a.name.cmp(&b.name));
        snapshot
    }

    /// The most recent results `client` reported, if any.
    pub async fn results_for(&self, client: &str) -> Result<Option<Arc<RunResults>>> {
        let clients = self.clients.read().await;
        clients
            .get(client)
            .map(|c| c.last_results.clone())
            .ok_or_else(|| CoordinatorError::UnknownClient(client.to_string()))
    }

    // --- Sync objects ---

    /// Mutex: acquire with a lease. Event: wait for the signal. Either way the
    /// answer is whether the caller got through before its wait ran out.
    pub async fn lock_object(&self, ctx: &LockContext, request: &LockRequest) -> Result<bool> {
        if self.is_shut_down() {
            return Err(CoordinatorError::ShutDown);
        }
        let key = ObjectKey::resolve(request.name.clone(), request.scope, ctx)?;
        let object = self.registry.get_or_create(key.clone(), request.object_type)?;
        let lease = self.lease_for(request)?;
        let wait = request
            .wait_ms
            .map(Duration::from_millis)
            .unwrap_or(self.default_wait);

        let mut shutdown = self.shutdown.subscribe();
        let granted = if let Some(mutex) = object.as_mutex() {
            mutex.acquire(&ctx.client, lease, wait, &mut shutdown).await?
        } else if let Some(event) = object.as_event() {
            event.wait(wait, &mut shutdown).await?
        } else {
            false
        };

        if !granted {
            warn!("{} timed out after {:?} waiting for {}", ctx.client, wait, key);
            if request.fail_on_timeout {
                return Err(CoordinatorError::LockTimeout {
                    name: key.to_string(),
                    waited_ms: u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                });
            }
        }
        Ok(granted)
    }

    /// Mutex: release if held by the caller. Event: signal it.
    pub async fn unlock_object(&self, ctx: &LockContext, request: &LockRequest) -> Result<bool> {
        let key = ObjectKey::resolve(request.name.clone(), request.scope, ctx)?;
        let Some(object) = self.registry.get_object(&key) else {
            warn!("{} unlocked unknown object {}", ctx.client, key);
            return Ok(false);
        };
        if object.object_type() != request.object_type {
            return Err(CoordinatorError::ObjectCollision {
                name: key.name.clone(),
                scope: key.scope.to_string(),
                existing: object.object_type().to_string(),
            });
        }

        if let Some(mutex) = object.as_mutex() {
            Ok(mutex.release(&ctx.client))
        } else if let Some(event) = object.as_event() {
            event.signal();
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub async fn reset_event(&self, ctx: &LockContext, name: &str, scope: ObjectScope) -> Result<()> {
        let key = ObjectKey::resolve(name, scope, ctx)?;
        let object = self.registry.get_or_create(key, ObjectType::Event)?;
        if let Some(event) = object.as_event() {
            event.reset();
        }
        Ok(())
    }

    fn lease_for(&self, request: &LockRequest) -> Result<Duration> {
        match request.lease_ms {
            None => Ok(self.default_lease),
            Some(0) => Err(CoordinatorError::invalid("lease must be longer than 0ms")),
            Some(ms) if ms > MAX_LEASE_MS => Err(CoordinatorError::invalid(format!(
                "lease of {}ms exceeds the {}ms maximum",
                ms, MAX_LEASE_MS
            ))),
            Some(ms) => Ok(Duration::from_millis(ms)),
        }
    }

    // --- Internals ---

    async fn race_shutdown<F: std::future::Future>(&self, fut: F) -> Option<F::Output> {
        let mut shutdown = self.shutdown.subscribe();
        tokio::select! {
            out = fut => Some(out),
            _ = shutdown.wait_for(|s| *s) => None,
        }
    }

    async fn abandon(&self, id: ConfigurationId) {
        let mut clients = self.clients.write().await;
        for entry in clients.values_mut() {
            if entry.configuration == Some(id) {
                entry.state = ClientState::Registered;
                entry.configuration = None;
            }
        }
        self.progress.send_modify(|p| {
            if p.configuration == Some(id) {
                p.abandoned = true;
            }
        });
        warn!("Configuration {} abandoned", id);
    }

    /// Takes a driver whose execute call failed out of the barrier so the
    /// rest of the configuration can still complete.
    async fn drop_participant(&self, id: ConfigurationId, name: &str) {
        {
            let mut clients = self.clients.write().await;
            match clients.get_mut(name) {
                Some(entry)
                    if entry.configuration == Some(id)
                        && entry.state == ClientState::Executing =>
                {
                    entry.state = ClientState::Registered;
                    entry.configuration = None;
                }
                _ => return,
            }
        }

        let mut finished = None;
        self.progress.send_modify(|p| {
            if p.configuration != Some(id) || !p.is_open() {
                return;
            }
            p.participants.retain(|n| n != name);
            p.expected = p.expected.saturating_sub(1);
            if p.expected == 0 {
                p.abandoned = true;
            } else if p.reported >= p.expected {
                p.done = true;
                p.finished_at = Some(Utc::now());
                finished = Some(p.clone());
            }
        });
        if let Some(done) = finished {
            self.fire_pool_done(&done);
        }
    }

    fn fire_pool_done(&self, status: &PoolStatus) {
        let (Some(configuration), Some(script)) = (status.configuration, status.script.clone())
        else {
            return;
        };
        let elapsed_ms = status.elapsed_ms();
        info!(
            "Pool done: '{}' configuration {} finished on {} clients in {}ms",
            script, configuration, status.expected, elapsed_ms
        );
        self.registry.remove_scope(&ScopeKey::Script(script.clone()));
        self.events.emit(
            SOURCE,
            format!("script {} finished on all {} clients", script, status.expected),
            PoolEvent::PoolDone {
                configuration,
                script,
                clients: status.expected,
                elapsed_ms,
            },
        );
    }

    async fn persist(&self, results: Arc<RunResults>) {
        if self.writers.is_empty() {
            return;
        }
        let writers = self.writers.clone();
        let task = tokio::task::spawn_blocking(move || {
            for writer in &writers {
                match writer.write(&results) {
                    Ok(()) => info!(
                        "{} persisted '{}' from {}",
                        writer.name(),
                        results.script_name(),
                        results.client_name()
                    ),
                    Err(e) => error!("{} failed: {}", writer.name(), e),
                }
            }
        });
        if let Err(e) = task.await {
            error!("Results writer task failed: {}", e);
        }
    }
}
