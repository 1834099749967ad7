use crate::{Error, Fingerprint, Invocation, ParamMap, ParamSpec, SimRunner};
use cache::{CacheEntry, CacheStore};
use chrono::Utc;
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;

type RunResult = Result<Arc<Value>, Error>;
type SharedRun = Shared<BoxFuture<'static, RunResult>>;

/// Orchestrates a request from validation to response.
///
/// At most one simulation runs per fingerprint at any time: the cache check
/// and the in-flight lookup happen under one lock, and concurrent requests
/// for a fingerprint already being computed attach to the pending run
/// instead of launching another process. Runs are detached, so once
/// launched they proceed to completion, timeout or failure regardless of
/// who is still waiting.
pub struct JobRegistry {
    spec: ParamSpec,
    runner: SimRunner,
    store: Arc<dyn CacheStore>,
    inflight: Arc<Mutex<hashbrown::HashMap<Fingerprint, SharedRun>>>,
}

impl JobRegistry {
    pub fn new(spec: ParamSpec, runner: SimRunner, store: Arc<dyn CacheStore>) -> Self {
        Self {
            spec,
            runner,
            store,
            inflight: Arc::new(Mutex::new(hashbrown::HashMap::new())),
        }
    }

    pub fn param_spec(&self) -> &ParamSpec {
        &self.spec
    }

    /// Validate, fingerprint, then answer from the cache, an in-flight run,
    /// or a fresh process invocation, in that order.
    pub async fn submit(&self, body: ParamMap) -> RunResult {
        let invocation = self.spec.invocation(&body)?;
        let fingerprint = invocation.fingerprint();

        let run = {
            let mut inflight = self.inflight.lock().await;
            if let Some(run) = inflight.get(&fingerprint) {
                tracing::debug!(%fingerprint, "attaching to in-flight run");
                run.clone()
            } else {
                if self.store.exists(fingerprint.as_str()).await {
                    match self.store.read(fingerprint.as_str()).await {
                        Ok(entry) => {
                            tracing::info!(%fingerprint, "cached");
                            return Ok(Arc::new(entry.result));
                        }
                        Err(error) => {
                            tracing::warn!(
                                %fingerprint,
                                "unreadable cache entry, re-running: {}",
                                error
                            );
                        }
                    }
                }
                let run = self.launch(body, invocation, fingerprint.clone());
                inflight.insert(fingerprint, run.clone());
                run
            }
        };
        run.await
    }

    fn launch(
        &self,
        request: ParamMap,
        invocation: Invocation,
        fingerprint: Fingerprint,
    ) -> SharedRun {
        let runner = self.runner.clone();
        let store = self.store.clone();
        let inflight = self.inflight.clone();
        let task = tokio::spawn(async move {
            let outcome = run_and_persist(runner, store, request, invocation, &fingerprint).await;
            inflight.lock().await.remove(&fingerprint);
            outcome
        });
        async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(error) => Err(Error::Spawn(format!("simulation task aborted: {error}"))),
            }
        }
        .boxed()
        .shared()
    }
}

async fn run_and_persist(
    runner: SimRunner,
    store: Arc<dyn CacheStore>,
    request: ParamMap,
    invocation: Invocation,
    fingerprint: &Fingerprint,
) -> RunResult {
    tracing::info!(%fingerprint, "processing: {}", invocation.command_line());
    let output = runner.run(&invocation).await?;
    tracing::info!(%fingerprint, elapsed_ms = output.elapsed.as_millis() as u64, "finished");

    let entry = CacheEntry {
        request,
        result: output.result,
        elapsed_ms: output.elapsed.as_millis() as u64,
        created_at: Utc::now(),
    };
    let result = Arc::new(entry.result.clone());
    // A failed write must not fail the request; the run just will not be
    // served from cache on retry.
    if let Err(error) = store.write(fingerprint.as_str(), &entry).await {
        tracing::error!(%fingerprint, "failed to persist result: {}", error);
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cache::{FileStore, MemoryStore};
    use serde_json::json;
    use std::io::Write;

    fn body() -> ParamMap {
        json!({
            "hatchers": 6,
            "proposals": 2,
            "hatch_tribute": 0.2,
            "vesting_80p_unlocked": 60,
            "exit_tribute": 0.35,
            "kappa": 2,
            "days_to_80p_of_max_voting_weight": 10,
            "max_proposal_request": 0.2,
            "timesteps_days": 30,
            "random_seed": 42,
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    /// A stand-in simulator: appends one line to `counter` per run, then
    /// prints some diagnostics and a JSON document.
    fn counting_script(dir: &std::path::Path, extra: &str) -> (SimRunner, std::path::PathBuf) {
        let counter = dir.join("runs");
        let script = dir.join("fake_sim.sh");
        let mut file = std::fs::File::create(&script).unwrap();
        writeln!(file, "echo run >> {}", counter.display()).unwrap();
        writeln!(file, "{extra}").unwrap();
        writeln!(file, "echo 'day 1 of simulation'").unwrap();
        writeln!(file, "echo '{{\"funding_pool\": [100.0, 99.5]}}'").unwrap();
        let runner = SimRunner::new("sh").base_args([script.display().to_string()]);
        (runner, counter)
    }

    fn run_count(counter: &std::path::Path) -> usize {
        std::fs::read_to_string(counter)
            .map(|s| s.lines().count())
            .unwrap_or(0)
    }

    #[tokio::test]
    async fn sequential_requests_invoke_once() {
        let dir = tempfile::tempdir().unwrap();
        let (runner, counter) = counting_script(dir.path(), "");
        let store = FileStore::new(dir.path().join("cache")).unwrap();
        let jobs = JobRegistry::new(ParamSpec::default(), runner, Arc::new(store));

        let first = jobs.submit(body()).await.unwrap();
        let second = jobs.submit(body()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(run_count(&counter), 1);
    }

    #[tokio::test]
    async fn concurrent_requests_invoke_once() {
        tracing_subscriber::fmt::try_init().ok();
        let dir = tempfile::tempdir().unwrap();
        // The sleep keeps the first run in flight while the others arrive.
        let (runner, counter) = counting_script(dir.path(), "sleep 0.3");
        let store = MemoryStore::new();
        let jobs = Arc::new(JobRegistry::new(
            ParamSpec::default(),
            runner,
            Arc::new(store),
        ));

        let results = futures_util::future::join_all(
            (0..8).map(|_| {
                let jobs = jobs.clone();
                async move { jobs.submit(body()).await }
            }),
        )
        .await;

        let first = results[0].as_ref().unwrap();
        for result in &results {
            assert_eq!(result.as_ref().unwrap(), first);
        }
        assert_eq!(run_count(&counter), 1);
    }

    #[tokio::test]
    async fn distinct_parameters_run_separately() {
        let dir = tempfile::tempdir().unwrap();
        let (runner, counter) = counting_script(dir.path(), "");
        let jobs = JobRegistry::new(ParamSpec::default(), runner, Arc::new(MemoryStore::new()));

        jobs.submit(body()).await.unwrap();
        let mut other = body();
        other.insert("random_seed".to_owned(), json!(43));
        jobs.submit(other).await.unwrap();
        assert_eq!(run_count(&counter), 2);
    }

    #[tokio::test]
    async fn failed_runs_are_not_cached_and_retry() {
        let dir = tempfile::tempdir().unwrap();
        let counter = dir.path().join("runs");
        let script = dir.path().join("fail.sh");
        std::fs::write(
            &script,
            format!("echo run >> {}\necho 'bad input' >&2\nexit 1\n", counter.display()),
        )
        .unwrap();
        let runner = SimRunner::new("sh").base_args([script.display().to_string()]);
        let store = Arc::new(MemoryStore::new());
        let jobs = JobRegistry::new(ParamSpec::default(), runner, store.clone());

        let err = jobs.submit(body()).await.unwrap_err();
        assert!(matches!(err, Error::Simulation { .. }));
        assert_eq!(store.len().await, 0);

        // The fingerprint is free again: an identical request re-attempts.
        let err = jobs.submit(body()).await.unwrap_err();
        assert!(matches!(err, Error::Simulation { .. }));
        assert_eq!(run_count(&counter), 2);
    }

    #[tokio::test]
    async fn persisted_entry_answers_without_invoking() {
        let dir = tempfile::tempdir().unwrap();
        let (runner, counter) = counting_script(dir.path(), "");
        let store = Arc::new(MemoryStore::new());

        let spec = ParamSpec::default();
        let fingerprint = spec.invocation(&body()).unwrap().fingerprint();
        let entry = CacheEntry {
            request: body(),
            result: json!({ "token_price": [2.5] }),
            elapsed_ms: 17,
            created_at: Utc::now(),
        };
        store.write(fingerprint.as_str(), &entry).await.unwrap();

        let jobs = JobRegistry::new(spec, runner, store);
        let result = jobs.submit(body()).await.unwrap();
        assert_eq!(*result, json!({ "token_price": [2.5] }));
        assert_eq!(run_count(&counter), 0);
    }

    struct FailingStore;

    #[async_trait::async_trait]
    impl CacheStore for FailingStore {
        async fn exists(&self, _fingerprint: &str) -> bool {
            false
        }

        async fn read(&self, fingerprint: &str) -> cache::Result<CacheEntry> {
            Err(cache::Error::NotFound(fingerprint.to_owned()))
        }

        async fn write(&self, _fingerprint: &str, _entry: &CacheEntry) -> cache::Result<()> {
            Err(std::io::Error::other("disk full").into())
        }
    }

    #[tokio::test]
    async fn persistence_failure_still_answers() {
        let dir = tempfile::tempdir().unwrap();
        let (runner, counter) = counting_script(dir.path(), "");
        let jobs = JobRegistry::new(ParamSpec::default(), runner, Arc::new(FailingStore));

        let result = jobs.submit(body()).await.unwrap();
        assert_eq!(*result, json!({ "funding_pool": [100.0, 99.5] }));

        // Nothing was cached, so a retry computes again.
        jobs.submit(body()).await.unwrap();
        assert_eq!(run_count(&counter), 2);
    }

    #[tokio::test]
    async fn validation_rejects_before_any_work() {
        let dir = tempfile::tempdir().unwrap();
        let (runner, counter) = counting_script(dir.path(), "");
        let jobs = JobRegistry::new(ParamSpec::default(), runner, Arc::new(MemoryStore::new()));

        let mut map = body();
        map.remove("kappa");
        let err = jobs.submit(map).await.unwrap_err();
        assert!(matches!(err, Error::MissingParameter(key) if key == "kappa"));
        assert_eq!(run_count(&counter), 0);
    }
}
