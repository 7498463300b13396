//! Resolution runs: cache lookup, batch dispatch, DoH fallback and
//! publication.
//!
//! A run is identified by its [`RunKey`]. Starting a run with a new key
//! cancels the one in flight; a cancelled run is never published.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use zonegraph_core::name::is_ip_literal;
use zonegraph_core::{
    normalize_name, Area, Record, RecordGraphBuilder, ResolutionResult, ResolutionSnapshot,
    ResolverConfig, Result, ServiceProbe, TcpProbe, TopologyError,
};

use crate::batch::{BatchBackend, BatchBackendResolver};
use crate::cache::{cache_key, ResolutionCache};
use crate::doh::FallbackDohResolver;
use crate::progress::{self, ProgressState, RunProgress};
use crate::resolver::{ExternalResolver, ResolveRequest, ResolverOutput};
use crate::run_key::RunKey;

/// Where the coordinator is in its lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CoordinatorStatus {
    /// Nothing resolved or in flight
    #[default]
    Idle,
    /// A run with this key is in flight
    Resolving(RunKey),
    /// The snapshot for this key is published
    Ready(RunKey),
}

/// Result of [`ResolutionCoordinator::run`]
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// A new snapshot was published
    Published(Arc<ResolutionSnapshot>),
    /// The inputs match the published snapshot; nothing was done
    Unchanged(Arc<ResolutionSnapshot>),
    /// A newer run took over; this run's results were discarded
    Superseded,
}

impl RunOutcome {
    /// Snapshot, unless the run was superseded
    #[must_use]
    pub fn snapshot(&self) -> Option<&Arc<ResolutionSnapshot>> {
        match self {
            Self::Published(s) | Self::Unchanged(s) => Some(s),
            Self::Superseded => None,
        }
    }
}

#[derive(Debug, Clone)]
struct ProbeMemo {
    run_key: RunKey,
    probes: Vec<ServiceProbe>,
    tcp_probes: Vec<TcpProbe>,
}

#[derive(Debug, Default)]
struct CoordinatorState {
    status: CoordinatorStatus,
    desired: Option<RunKey>,
    in_flight: Option<CancellationToken>,
    published: Option<(RunKey, Arc<ResolutionSnapshot>)>,
    refresh: u64,
    probes: Option<ProbeMemo>,
}

/// Results gathered by one run
struct RunIndex<'a> {
    results: BTreeMap<String, ResolutionResult>,
    progress: RunProgress,
    cache: &'a ResolutionCache,
    partition: String,
    run_key: String,
    cancel: CancellationToken,
}

impl RunIndex<'_> {
    /// Index `result` under `requested`, each hop and the terminal.
    ///
    /// Names already indexed keep their first result. Fresh results are
    /// cached under the same names unless the run was cancelled or the
    /// cache was rebound to another run.
    fn absorb(&mut self, requested: &str, result: ResolutionResult, fresh: bool) {
        let requested = normalize_name(requested);
        let mut views = vec![(
            requested.clone(),
            ResolutionResult {
                requested_name: Some(requested.clone()),
                ..result.clone()
            },
        )];
        for hop in &result.chain {
            if let Some(view) = result.from_hop(hop) {
                views.push((hop.clone(), view));
            }
        }
        if !result.terminal.is_empty() && !result.chain.contains(&result.terminal) {
            views.push((
                result.terminal.clone(),
                ResolutionResult {
                    requested_name: Some(result.terminal.clone()),
                    chain: vec![result.terminal.clone()],
                    ..result.clone()
                },
            ));
        }

        let mut writes = Vec::new();
        for (name, view) in views {
            if name.is_empty() {
                continue;
            }
            self.progress.mark_resolved(&name);
            if self.results.contains_key(&name) {
                continue;
            }
            if fresh {
                writes.push((cache_key(&self.partition, &name), view.clone()));
            }
            self.results.insert(name, view);
        }
        if !writes.is_empty()
            && !self.cancel.is_cancelled()
            && !self.cache.put_many_for(&self.run_key, writes)
        {
            debug!(run_key = %self.run_key, "cache rebound by a newer run, results not cached");
        }
    }

    fn absorb_output(&mut self, output: ResolverOutput) {
        for (name, result) in output.results {
            self.absorb(&name, result, true);
        }
    }

    fn contains(&self, name: &str) -> bool {
        self.results.contains_key(name)
    }
}

/// Runs resolutions and owns their cache.
///
/// # Example
///
/// ```rust,no_run
/// use zonegraph_core::{Record, RecordType, ResolverConfig};
/// use zonegraph_resolve::{ResolutionCoordinator, RunOutcome};
///
/// # async fn example() -> zonegraph_core::Result<()> {
/// let config = ResolverConfig::default();
/// let coordinator = ResolutionCoordinator::standard(None, &config)?;
/// let records = vec![Record::new("1", RecordType::Cname, "www", "shop.myshopify.com")];
///
/// if let RunOutcome::Published(snapshot) = coordinator.run(&records, "example.com", &config).await? {
///     println!("{:?}", snapshot.get("shop.myshopify.com"));
/// }
/// # Ok(())
/// # }
/// ```
pub struct ResolutionCoordinator {
    batch: Arc<dyn ExternalResolver>,
    fallback: Arc<dyn ExternalResolver>,
    cache: ResolutionCache,
    state: Mutex<CoordinatorState>,
    progress: Arc<watch::Sender<ProgressState>>,
}

impl std::fmt::Debug for ResolutionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolutionCoordinator")
            .field("batch", &self.batch.name())
            .field("fallback", &self.fallback.name())
            .field("cached", &self.cache.len())
            .finish_non_exhaustive()
    }
}

impl ResolutionCoordinator {
    /// Create a coordinator over a batch resolver and a per-name fallback
    #[must_use]
    pub fn new(batch: Arc<dyn ExternalResolver>, fallback: Arc<dyn ExternalResolver>) -> Self {
        let (tx, _rx) = watch::channel(ProgressState::default());
        Self {
            batch,
            fallback,
            cache: ResolutionCache::default(),
            state: Mutex::new(CoordinatorState::default()),
            progress: Arc::new(tx),
        }
    }

    /// Batch backend (if any) with DoH fallback
    pub fn standard(backend: Option<Arc<dyn BatchBackend>>, config: &ResolverConfig) -> Result<Self> {
        let batch = backend.map_or_else(BatchBackendResolver::unavailable, BatchBackendResolver::new);
        let fallback = FallbackDohResolver::new(config)?;
        Ok(Self::new(Arc::new(batch), Arc::new(fallback)))
    }

    /// Use this cache
    #[must_use]
    pub fn with_cache(mut self, cache: ResolutionCache) -> Self {
        self.cache = cache;
        self
    }

    fn lock(&self) -> MutexGuard<'_, CoordinatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Progress updates
    pub fn subscribe(&self) -> watch::Receiver<ProgressState> {
        self.progress.subscribe()
    }

    /// Current lifecycle state
    pub fn status(&self) -> CoordinatorStatus {
        self.lock().status.clone()
    }

    /// Last published snapshot
    pub fn snapshot(&self) -> Option<Arc<ResolutionSnapshot>> {
        self.lock().published.as_ref().map(|(_, s)| Arc::clone(s))
    }

    /// The cache
    pub const fn cache(&self) -> &ResolutionCache {
        &self.cache
    }

    /// Force the next run to resolve from scratch
    pub fn refresh(&self) {
        let mut state = self.lock();
        state.refresh += 1;
        debug!(refresh = state.refresh, "manual refresh requested");
    }

    /// Forget the published snapshot; the cache is kept
    pub fn invalidate(&self) {
        let mut state = self.lock();
        state.published = None;
        if matches!(state.status, CoordinatorStatus::Ready(_)) {
            state.status = CoordinatorStatus::Idle;
        }
    }

    /// Cancel the run in flight, if any
    pub fn cancel(&self) {
        let mut state = self.lock();
        if let Some(token) = state.in_flight.take() {
            token.cancel();
            state.desired = None;
            state.status = state
                .published
                .as_ref()
                .map_or(CoordinatorStatus::Idle, |(key, _)| CoordinatorStatus::Ready(key.clone()));
            progress::reset(&self.progress);
        }
    }

    /// Resolve every candidate of `records` and publish a snapshot.
    ///
    /// Returns [`RunOutcome::Unchanged`] without touching the network when
    /// the inputs match the published snapshot.
    #[instrument(skip_all, fields(zone = %zone, records = records.len()))]
    pub async fn run(
        &self,
        records: &[Record],
        zone: &str,
        config: &ResolverConfig,
    ) -> Result<RunOutcome> {
        let config = config.clone().validate()?;
        let builder = RecordGraphBuilder::new(records, zone, config.max_hops());
        let candidates = builder.candidate_hostnames();
        let service_hosts = if config.disable_service_discovery {
            Vec::new()
        } else {
            web_service_hosts(&builder)
        };

        let refresh = self.lock().refresh;
        let key = RunKey::compute(records, zone, &config, refresh)?;
        let Some(cancel) = self.begin(&key) else {
            if let Some(snapshot) = self.snapshot() {
                debug!(run_key = %key.short(), "inputs unchanged, keeping published snapshot");
                return Ok(RunOutcome::Unchanged(snapshot));
            }
            return Ok(RunOutcome::Superseded);
        };

        self.cache.bind_run(key.as_str());
        let mut index = RunIndex {
            results: BTreeMap::new(),
            progress: RunProgress::start(Arc::clone(&self.progress), cancel.clone(), &candidates),
            cache: &self.cache,
            partition: config.cache_partition(),
            run_key: key.as_str().to_string(),
            cancel: cancel.clone(),
        };

        for name in &candidates {
            if index.contains(name) {
                continue;
            }
            if let Some(hit) = self.cache.get(&cache_key(&index.partition, name)) {
                index.absorb(name, hit, false);
            }
        }
        let misses: Vec<String> = candidates
            .iter()
            .filter(|name| !index.contains(name))
            .cloned()
            .collect();

        let memo = self
            .lock()
            .probes
            .clone()
            .filter(|memo| memo.run_key == key);
        let need_probes = memo.is_none() && !service_hosts.is_empty();

        info!(
            run_key = %key.short(),
            candidates = candidates.len(),
            hits = candidates.len() - misses.len(),
            misses = misses.len(),
            "resolution run started"
        );

        let mut probes = Vec::new();
        let mut tcp_probes = Vec::new();
        let mut fallback_needed = false;

        if !misses.is_empty() || need_probes {
            let request = ResolveRequest {
                names: misses.clone(),
                service_hosts: if need_probes { service_hosts } else { Vec::new() },
                config: config.clone(),
            };
            let answer = tokio::select! {
                biased;
                () = cancel.cancelled() => return Ok(RunOutcome::Superseded),
                answer = self.batch.resolve(&request, &cancel) => answer,
            };
            match answer {
                Ok(output) => {
                    fallback_needed = output.is_empty() && !misses.is_empty();
                    probes = output.probes.clone();
                    tcp_probes = output.tcp_probes.clone();
                    index.absorb_output(output);
                }
                Err(TopologyError::Cancelled) => return Ok(RunOutcome::Superseded),
                Err(TopologyError::BackendUnavailable(reason)) => {
                    debug!(reason = %reason, "batch backend unavailable, falling back");
                    fallback_needed = !misses.is_empty();
                }
                Err(e) => {
                    warn!(resolver = self.batch.name(), error = %e, "batch resolution failed, falling back");
                    fallback_needed = !misses.is_empty();
                }
            }
        }

        if fallback_needed
            && self
                .fallback_pass(&mut index, misses, &config, &cancel)
                .await
                .is_none()
        {
            return Ok(RunOutcome::Superseded);
        }

        if let Some(memo) = memo {
            probes = memo.probes;
            tcp_probes = memo.tcp_probes;
        }

        for name in &candidates {
            if !index.contains(name) {
                index
                    .results
                    .insert(name.clone(), ResolutionResult::placeholder(name));
                index.progress.mark_resolved(name);
            }
        }

        Ok(self.publish(&key, &cancel, index, probes, tcp_probes))
    }

    /// Register `key` as the desired run and cancel any other.
    ///
    /// Returns `None` when `key` is already published.
    fn begin(&self, key: &RunKey) -> Option<CancellationToken> {
        let mut state = self.lock();
        if matches!(&state.published, Some((published, _)) if published == key) {
            return None;
        }
        if let Some(previous) = state.in_flight.take() {
            previous.cancel();
            progress::reset(&self.progress);
            debug!(run_key = %key.short(), "superseding run in flight");
        }
        let token = CancellationToken::new();
        state.in_flight = Some(token.clone());
        state.desired = Some(key.clone());
        state.status = CoordinatorStatus::Resolving(key.clone());
        Some(token)
    }

    /// Resolve `misses` one name per task, bounded by the configured
    /// concurrency. Names indexed by an earlier answer are skipped.
    ///
    /// Returns `None` if the run was cancelled.
    async fn fallback_pass(
        &self,
        index: &mut RunIndex<'_>,
        misses: Vec<String>,
        config: &ResolverConfig,
        cancel: &CancellationToken,
    ) -> Option<()> {
        let semaphore = Arc::new(Semaphore::new(config.fallback_concurrency.max(1)));
        let mut pending: VecDeque<String> = misses.into();
        let mut tasks: JoinSet<(String, Result<ResolverOutput>)> = JoinSet::new();
        debug!(
            resolver = self.fallback.name(),
            names = pending.len(),
            concurrency = config.fallback_concurrency,
            "fallback pass"
        );

        loop {
            while let Some(name) = pending.front() {
                if index.contains(name) {
                    pending.pop_front();
                    continue;
                }
                let Ok(permit) = Arc::clone(&semaphore).try_acquire_owned() else {
                    break;
                };
                let Some(name) = pending.pop_front() else {
                    break;
                };
                let resolver = Arc::clone(&self.fallback);
                let request = ResolveRequest::single(name.clone(), config.clone());
                let token = cancel.child_token();
                tasks.spawn(async move {
                    let output = resolver.resolve(&request, &token).await;
                    drop(permit);
                    (name, output)
                });
            }

            if tasks.is_empty() {
                return Some(());
            }

            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    tasks.abort_all();
                    return None;
                }
                joined = tasks.join_next() => match joined {
                    Some(Ok((_, Ok(output)))) => index.absorb_output(output),
                    Some(Ok((_, Err(TopologyError::Cancelled)))) => return None,
                    Some(Ok((name, Err(e)))) => {
                        debug!(host = %name, error = %e, "fallback lookup failed");
                    }
                    Some(Err(e)) => warn!(error = %e, "fallback task failed"),
                    None => return Some(()),
                },
            }
        }
    }

    fn publish(
        &self,
        key: &RunKey,
        cancel: &CancellationToken,
        index: RunIndex<'_>,
        probes: Vec<ServiceProbe>,
        tcp_probes: Vec<TcpProbe>,
    ) -> RunOutcome {
        let mut state = self.lock();
        if cancel.is_cancelled() || state.desired.as_ref() != Some(key) {
            debug!(run_key = %key.short(), "discarding stale run");
            return RunOutcome::Superseded;
        }

        let snapshot = Arc::new(ResolutionSnapshot {
            run_key: key.to_string(),
            results: index.results,
            probes: probes.clone(),
            tcp_probes: tcp_probes.clone(),
        });
        state.published = Some((key.clone(), Arc::clone(&snapshot)));
        state.probes = Some(ProbeMemo {
            run_key: key.clone(),
            probes,
            tcp_probes,
        });
        state.in_flight = None;
        state.status = CoordinatorStatus::Ready(key.clone());
        index.progress.finish();

        let done = index.progress.state(false);
        info!(
            run_key = %key.short(),
            names = snapshot.results.len(),
            total = done.total,
            probes = snapshot.probes.len(),
            "resolution run published"
        );
        RunOutcome::Published(snapshot)
    }
}

/// Non-IP owner names in the web area
fn web_service_hosts(builder: &RecordGraphBuilder<'_>) -> Vec<String> {
    let email_path = builder.email_path_names();
    builder
        .owners()
        .iter()
        .filter(|owner| !is_ip_literal(owner))
        .filter(|owner| builder.classify(owner, &email_path).contains(&Area::Web))
        .cloned()
        .collect()
}
