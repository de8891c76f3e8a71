//! The top-level control loop.
//!
//! Owns two periodic schedules: the self-config loop re-fetches the
//! agent's own configuration document at a fixed cadence, and the
//! manager-sync job fans out to every manager at the cadence the config
//! itself dictates. When a re-fetched config changes `scheduler-interval`,
//! the sync job is stopped and respawned at the new period; the
//! AgentConfig pointer is only ever replaced wholesale, so an in-flight
//! sync sees one consistent config throughout.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::sync::{mpsc, watch, RwLock};
use url::Url;

use crate::config::model::AgentConfig;
use crate::config::{self, ConfigVersion};
use crate::error::ButlerError;
use crate::manager::{sync, ManagerState};
use crate::metrics;
use crate::status::StatusFile;
use crate::transport::{self, TransportOptions};
use crate::validator;

/// Startup settings derived from the CLI; fixed for the process lifetime.
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub config_url: String,
    pub self_interval: Duration,
    pub transport_opts: TransportOptions,
    pub default_subs: BTreeMap<String, String>,
}

struct Loaded {
    config: Arc<AgentConfig>,
    version: ConfigVersion,
    raw: Bytes,
    status: Arc<StatusFile>,
    loaded_at: Instant,
}

struct SyncJob {
    stop: watch::Sender<bool>,
    handle: tokio::task::JoinHandle<()>,
}

pub struct Controller {
    settings: ControllerSettings,
    url: Url,
    loaded: RwLock<Option<Loaded>>,
    managers: std::sync::Mutex<HashMap<String, Arc<ManagerState>>>,
    sync_job: tokio::sync::Mutex<Option<SyncJob>>,
    /// Interval the sync job is currently registered at; 0 = none yet.
    prev_sync_interval: AtomicU64,
    fatal_tx: mpsc::UnboundedSender<ButlerError>,
    fatal_rx: tokio::sync::Mutex<Option<mpsc::UnboundedReceiver<ButlerError>>>,
}

/// Point-in-time view for the `/health` endpoint.
#[derive(Debug, Clone)]
pub struct ControllerInfo {
    pub config_version: String,
    pub loaded_ago_seconds: u64,
    pub sync_interval: u64,
    pub managers: Vec<String>,
}

impl Controller {
    pub fn new(settings: ControllerSettings) -> Result<Arc<Self>, ButlerError> {
        let url = Url::parse(&settings.config_url).map_err(|e| ButlerError::UrlParse {
            url: settings.config_url.clone(),
            source: e,
        })?;
        let (fatal_tx, fatal_rx) = mpsc::unbounded_channel();

        Ok(Arc::new(Self {
            settings,
            url,
            loaded: RwLock::new(None),
            managers: std::sync::Mutex::new(HashMap::new()),
            sync_job: tokio::sync::Mutex::new(None),
            prev_sync_interval: AtomicU64::new(0),
            fatal_tx,
            fatal_rx: tokio::sync::Mutex::new(Some(fatal_rx)),
        }))
    }

    /// Drive the agent until shutdown is signalled or a fatal error lands.
    ///
    /// The very first fetch only populates the AgentConfig; the sync job
    /// is installed from the second tick on.
    pub async fn run(
        self: Arc<Self>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), ButlerError> {
        // Startup fetch. Without a config there is nothing to run.
        self.refresh_config().await?;

        let mut fatal_rx = self
            .fatal_rx
            .lock()
            .await
            .take()
            .unwrap_or_else(|| mpsc::unbounded_channel().1);

        let mut ticker = tokio::time::interval(self.settings.self_interval);
        ticker.tick().await; // Skip first immediate tick

        let result = loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => {
                    tracing::info!("shutdown requested");
                    break Ok(());
                }
                fatal = fatal_rx.recv() => {
                    break Err(fatal.unwrap_or_else(|| ButlerError::Transport {
                        url: String::new(),
                        status: 500,
                        detail: "fatal channel closed".into(),
                    }));
                }
            }

            match self.refresh_config().await {
                Ok(()) => self.manage_sync_job().await,
                Err(e) if e.is_fatal() => break Err(e),
                Err(e) => {
                    if self.exit_on_failure().await {
                        tracing::error!(error = %e, "agent config refresh failed and exit-on-failure is set");
                        break Err(e);
                    }
                    tracing::error!(error = %e, "agent config refresh failed, keeping previous config");
                }
            }
        };

        self.stop_sync_job().await;
        result
    }

    /// Re-fetch, validate, and (when changed) swap the agent's own config.
    pub async fn refresh_config(self: &Arc<Self>) -> Result<(), ButlerError> {
        let host = self.url.host_str().unwrap_or_default().to_string();
        let path = self.url.path().to_string();

        let contact_failed = || metrics::set_contact(&host, &path, false);

        let body = match self.fetch_config_document().await {
            Ok(body) => body,
            Err(e) => {
                contact_failed();
                return Err(e);
            }
        };

        // Sentinel extraction + TOML syntax gate before anything else.
        let region = match validator::validate(&body, "butler.toml", "butler-config") {
            Ok(region) => region,
            Err(e) => {
                contact_failed();
                return Err(e);
            }
        };

        let unchanged = {
            let loaded = self.loaded.read().await;
            loaded.as_ref().is_some_and(|l| l.raw == body)
        };

        if unchanged {
            tracing::debug!("agent config unchanged");
        } else {
            let (config, version) =
                match config::load(&region, self.url.as_str(), &self.settings.default_subs) {
                    Ok(loaded) => loaded,
                    Err(e) => {
                        contact_failed();
                        return Err(e);
                    }
                };
            self.install(config, version, body).await;
            tracing::info!("agent config updated");
        }

        metrics::set_contact(&host, &path, true);
        Ok(())
    }

    async fn fetch_config_document(&self) -> Result<Bytes, ButlerError> {
        let transport =
            transport::for_url(self.url.as_str(), &self.settings.transport_opts).await?;
        let response = transport.get(self.url.as_str()).await?;

        if response.status() != 200 {
            return Err(ButlerError::Transport {
                url: self.url.to_string(),
                status: response.status(),
                detail: "unexpected status fetching agent config".into(),
            });
        }
        response.bytes().await
    }

    /// Swap in a new AgentConfig. Manager states are keyed by name and
    /// survive the swap; states for managers no longer listed are dropped.
    async fn install(&self, config: AgentConfig, version: ConfigVersion, raw: Bytes) {
        let status_path = config.globals.status_file.clone();
        let existing_status = {
            let loaded = self.loaded.read().await;
            loaded
                .as_ref()
                .filter(|l| l.config.globals.status_file == status_path)
                .map(|l| Arc::clone(&l.status))
        };
        let status = match existing_status {
            Some(status) => status,
            None => Arc::new(StatusFile::open(status_path).await),
        };

        {
            let mut managers = self.managers.lock().expect("managers lock");
            managers.retain(|name, _| config.manager(name).is_some());
            for manager in &config.managers {
                managers
                    .entry(manager.name.clone())
                    .or_insert_with(|| Arc::new(ManagerState::new(&manager.name)));
            }
        }

        let mut loaded = self.loaded.write().await;
        *loaded = Some(Loaded {
            config: Arc::new(config),
            version,
            raw,
            status,
            loaded_at: Instant::now(),
        });
    }

    /// Install or replace the manager-sync job to match the current
    /// config's `scheduler-interval`.
    pub async fn manage_sync_job(self: &Arc<Self>) {
        let Some(interval) = self.sync_interval().await else {
            return;
        };

        let prev = self.prev_sync_interval.load(Ordering::Acquire);
        if prev == interval {
            return;
        }

        if prev == 0 {
            tracing::info!(interval, "starting manager-sync job");
        } else {
            tracing::info!(prev, interval, "sync interval changed, restarting manager-sync job");
            self.stop_sync_job().await;
        }

        self.spawn_sync_job(interval).await;
        self.prev_sync_interval.store(interval, Ordering::Release);
    }

    async fn spawn_sync_job(self: &Arc<Self>, interval_secs: u64) {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let controller = Arc::clone(self);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
            ticker.tick().await; // Skip first immediate tick

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = stop_rx.changed() => {
                        tracing::debug!("manager-sync job stopping");
                        return;
                    }
                }

                if let Err(e) = controller.run_sync_cycle().await {
                    // Only fatal errors escape the cycle.
                    let _ = controller.fatal_tx.send(e);
                    return;
                }
            }
        });

        *self.sync_job.lock().await = Some(SyncJob {
            stop: stop_tx,
            handle,
        });
    }

    /// Stop the sync job and wait for its in-flight cycle to finish.
    async fn stop_sync_job(&self) {
        let job = self.sync_job.lock().await.take();
        if let Some(job) = job {
            let _ = job.stop.send(true);
            if let Err(e) = job.handle.await {
                tracing::error!(error = %e, "manager-sync job task failed");
            }
        }
    }

    /// Fan out one sync pass to every manager in the current config.
    /// Managers run concurrently and independently; a manager whose
    /// previous sync is still running skips this tick.
    pub async fn run_sync_cycle(self: &Arc<Self>) -> Result<(), ButlerError> {
        let (config, status) = {
            let loaded = self.loaded.read().await;
            let Some(loaded) = loaded.as_ref() else {
                return Ok(());
            };
            (Arc::clone(&loaded.config), Arc::clone(&loaded.status))
        };

        let mut tasks = tokio::task::JoinSet::new();

        for manager in &config.managers {
            let state = self.manager_state(&manager.name);
            let manager = manager.clone();
            let status = Arc::clone(&status);

            tasks.spawn(async move {
                let Some(_guard) = state.try_begin_sync() else {
                    tracing::debug!(manager = %manager.name,
                        "previous sync still running, skipping tick");
                    return Ok(());
                };
                sync::run(&manager, &state, &status).await
            });
        }

        let mut fatal = None;
        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) if e.is_fatal() => fatal = Some(e),
                Ok(Err(e)) => tracing::error!(error = %e, "manager sync failed"),
                Err(e) => tracing::error!(error = %e, "manager sync task panicked"),
            }
        }

        fatal.map_or(Ok(()), Err)
    }

    fn manager_state(&self, name: &str) -> Arc<ManagerState> {
        let mut managers = self.managers.lock().expect("managers lock");
        Arc::clone(
            managers
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(ManagerState::new(name))),
        )
    }

    async fn sync_interval(&self) -> Option<u64> {
        let loaded = self.loaded.read().await;
        loaded
            .as_ref()
            .map(|l| l.config.globals.scheduler_interval)
    }

    async fn exit_on_failure(&self) -> bool {
        let loaded = self.loaded.read().await;
        loaded
            .as_ref()
            .is_some_and(|l| l.config.globals.exit_on_failure)
    }

    /// Interval the sync job is currently registered at; 0 before the
    /// first installation.
    #[must_use]
    pub fn installed_sync_interval(&self) -> u64 {
        self.prev_sync_interval.load(Ordering::Acquire)
    }

    pub async fn info(&self) -> Option<ControllerInfo> {
        let loaded = self.loaded.read().await;
        loaded.as_ref().map(|l| {
            let ConfigVersion::Hash(ref hash) = l.version;
            ControllerInfo {
                config_version: hash.get(..8).unwrap_or(hash).to_string(),
                loaded_ago_seconds: l.loaded_at.elapsed().as_secs(),
                sync_interval: l.config.globals.scheduler_interval,
                managers: l.config.managers.iter().map(|m| m.name.clone()).collect(),
            }
        })
    }
}
