// ─── Launch Orchestrator ───
// One launch attempt, start to hand-off:
//
//   resolve ─▶ session ─▶ download ─▶ natives ─▶ plan ─▶ spawn
//
// Every stage failure ends the attempt. Downloaded files and the session set
// are left as they are, so the next attempt picks up from there.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::core::auth::{SessionManager, YggdrasilClient};
use crate::core::downloader::{DownloadOrchestrator, DownloadReport, Fetcher, RetryPolicy};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::events::{LifecycleEvent, Stage};
use crate::core::java::find_java_binary;
use crate::core::launch::{
    self, extract_natives, CommandSpawner, LaunchOptions, LaunchPlan, ProcessSpawner,
    SpawnRequest, SpawnedProcess,
};
use crate::core::state::LauncherContext;
use crate::core::version::VersionResolver;

type FlightKey = (String, PathBuf);

/// What a successful launch handed to the OS.
#[derive(Debug, Clone)]
pub struct LaunchOutcome {
    pub plan: LaunchPlan,
    pub process: SpawnedProcess,
    pub download: DownloadReport,
}

pub struct LaunchOrchestrator {
    ctx: LauncherContext,
    resolver: VersionResolver,
    sessions: Arc<tokio::sync::Mutex<SessionManager>>,
    spawner: Arc<dyn ProcessSpawner>,
    fetch_retry: RetryPolicy,
    resources_base: Option<String>,
    in_flight: Mutex<HashMap<FlightKey, CancellationToken>>,
}

impl LaunchOrchestrator {
    pub fn new(
        ctx: LauncherContext,
        sessions: SessionManager,
        spawner: Arc<dyn ProcessSpawner>,
    ) -> Self {
        let resolver = VersionResolver::new(ctx.http_client.clone(), ctx.layout.clone());
        Self {
            ctx,
            resolver,
            sessions: Arc::new(tokio::sync::Mutex::new(sessions)),
            spawner,
            fetch_retry: RetryPolicy::default(),
            resources_base: None,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Orchestrator with the HTTP identity service, the session file from the
    /// data directory and a real process spawner.
    pub async fn with_defaults(ctx: LauncherContext) -> LauncherResult<Self> {
        let identity = Arc::new(YggdrasilClient::new(ctx.http_client.clone()));
        let sessions = SessionManager::load(identity, ctx.layout.profiles_path()).await?;
        Ok(Self::new(ctx, sessions, Arc::new(CommandSpawner::default())))
    }

    pub fn with_resolver(mut self, resolver: VersionResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_fetch_retry(mut self, retry: RetryPolicy) -> Self {
        self.fetch_retry = retry;
        self
    }

    pub fn with_resources_base(mut self, base: impl Into<String>) -> Self {
        self.resources_base = Some(base.into());
        self
    }

    pub fn context(&self) -> &LauncherContext {
        &self.ctx
    }

    pub fn resolver(&self) -> &VersionResolver {
        &self.resolver
    }

    /// Shared handle for login, logout and selection outside a launch.
    pub fn sessions(&self) -> Arc<tokio::sync::Mutex<SessionManager>> {
        Arc::clone(&self.sessions)
    }

    pub fn is_running(&self, version_id: &str) -> bool {
        self.lock_flights().contains_key(&self.flight_key(version_id))
    }

    /// Cancel every attempt still in flight. Transfers stop at the next
    /// chunk and nothing is spawned.
    pub fn cancel(&self) {
        for (key, token) in self.lock_flights().iter() {
            info!("Cancelling launch of {}", key.0);
            token.cancel();
        }
    }

    /// Prepare `version_id` and start the game. Returns once the process is
    /// handed off; it is never waited on.
    pub async fn launch(
        &self,
        version_id: &str,
        options: &LaunchOptions,
    ) -> LauncherResult<LaunchOutcome> {
        let flight = self.begin(version_id)?;
        self.publish(LifecycleEvent::Started {
            stage: Stage::Launch,
        });

        let result = self.launch_inner(version_id, options, &flight.token).await;

        match &result {
            Ok(outcome) => {
                info!(
                    "Launched {} (pid {:?})",
                    version_id, outcome.process.pid
                );
                self.publish(LifecycleEvent::Succeeded {
                    stage: Stage::Launch,
                });
            }
            Err(e) => {
                warn!("Launch of {} failed: {}", version_id, e);
                self.publish(LifecycleEvent::Failed {
                    stage: Stage::Launch,
                    reason: e.to_string(),
                });
            }
        }
        result
    }

    async fn launch_inner(
        &self,
        version_id: &str,
        options: &LaunchOptions,
        cancel: &CancellationToken,
    ) -> LauncherResult<LaunchOutcome> {
        let descriptor = self.resolver.resolve(version_id).await?;

        let session = {
            let mut sessions = self.sessions.lock().await;
            match sessions.ensure_logged_in().await {
                Ok(session) => session,
                Err(LauncherError::Auth(reason)) => {
                    warn!("No usable session: {}", reason);
                    return Err(LauncherError::NotAuthenticated);
                }
                Err(e) => return Err(e),
            }
        };

        let download = self.downloader().run(&descriptor, &self.ctx.layout, cancel).await?;

        let platform = self.ctx.platform;
        extract_natives(&descriptor, &self.ctx.layout, &platform).await?;
        let plan = launch::build(&descriptor, &self.ctx.layout, &session, options, &platform)?;

        let java = find_java_binary(self.ctx.settings.java_path.as_deref());
        info!("Using {:?} runtime at {:?}", java.source, java.path);
        let request = SpawnRequest::from_plan(&plan, &java.path, &platform, &session.access_token);

        if cancel.is_cancelled() {
            return Err(LauncherError::Cancelled);
        }
        let process = self.spawner.spawn(&request).await.map_err(|e| match e {
            LauncherError::LaunchFailed(_) => e,
            other => LauncherError::LaunchFailed(other.to_string()),
        })?;

        Ok(LaunchOutcome {
            plan,
            process,
            download,
        })
    }

    fn downloader(&self) -> DownloadOrchestrator {
        let fetcher = Fetcher::new(self.ctx.http_client.clone()).with_retry(self.fetch_retry);
        let orchestrator = DownloadOrchestrator::new(fetcher)
            .with_platform(self.ctx.platform)
            .with_concurrency(self.ctx.download_concurrency())
            .with_events(self.ctx.events.clone());
        match &self.resources_base {
            Some(base) => orchestrator.with_resources_base(base.clone()),
            None => orchestrator,
        }
    }

    fn begin(&self, version_id: &str) -> LauncherResult<Flight<'_>> {
        let key = self.flight_key(version_id);
        let mut flights = self.lock_flights();
        if flights.contains_key(&key) {
            return Err(LauncherError::LaunchInProgress {
                version: key.0,
                data_dir: key.1,
            });
        }
        let token = CancellationToken::new();
        flights.insert(key.clone(), token.clone());
        Ok(Flight {
            owner: self,
            key,
            token,
        })
    }

    fn flight_key(&self, version_id: &str) -> FlightKey {
        (version_id.to_string(), self.ctx.layout.root().to_path_buf())
    }

    fn lock_flights(&self) -> std::sync::MutexGuard<'_, HashMap<FlightKey, CancellationToken>> {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish(&self, event: LifecycleEvent) {
        self.ctx.events.publish(event);
    }
}

/// Holds the single-flight slot for one attempt.
struct Flight<'a> {
    owner: &'a LaunchOrchestrator,
    key: FlightKey,
    token: CancellationToken,
}

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        self.owner.lock_flights().remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use httpmock::prelude::*;
    use tokio::sync::Notify;

    use super::*;
    use crate::core::auth::{AuthResponse, AuthState, IdentityService, Session};
    use crate::core::downloader::checksum::sha1_hex;
    use crate::core::error::AuthErrorReason;
    use crate::core::version::{Arch, OsName, Platform};

    const LINUX: Platform = Platform::new(OsName::Linux, Arch::X86_64);
    const JAR: &[u8] = b"client jar";
    const LIB: &[u8] = b"library a";

    struct FakeIdentity;

    #[async_trait]
    impl IdentityService for FakeIdentity {
        async fn authenticate(
            &self,
            username: &str,
            password: &str,
            client_token: &str,
        ) -> LauncherResult<AuthResponse> {
            if password != "secret" {
                return Err(LauncherError::Auth(AuthErrorReason::InvalidCredentials));
            }
            Ok(AuthResponse {
                access_token: "access-123".into(),
                client_token: client_token.into(),
                profile_id: format!("pid-{}", username),
                username: "Steve".into(),
            })
        }

        async fn refresh(&self, _session: &Session) -> LauncherResult<AuthResponse> {
            Err(LauncherError::Auth(AuthErrorReason::TokenRejected))
        }

        async fn validate(&self, _session: &Session) -> LauncherResult<bool> {
            Ok(false)
        }

        async fn invalidate(&self, _session: &Session) -> LauncherResult<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeSpawner {
        requests: Mutex<Vec<SpawnRequest>>,
        fail: bool,
        /// (entered, release): signal on entry, then wait for release.
        gate: Option<(Arc<Notify>, Arc<Notify>)>,
    }

    #[async_trait]
    impl ProcessSpawner for FakeSpawner {
        async fn spawn(&self, request: &SpawnRequest) -> LauncherResult<SpawnedProcess> {
            self.requests.lock().unwrap().push(request.clone());
            if let Some((entered, release)) = &self.gate {
                entered.notify_one();
                release.notified().await;
            }
            if self.fail {
                return Err(LauncherError::LaunchFailed("java: not found".into()));
            }
            Ok(SpawnedProcess { pid: Some(4242) })
        }
    }

    struct Fixture {
        server: MockServer,
        dir: tempfile::TempDir,
    }

    impl Fixture {
        async fn new() -> Self {
            let server = MockServer::start_async().await;
            let manifest = serde_json::json!({
                "latest": {"release": "1.8", "snapshot": "1.8"},
                "versions": [{"id": "1.8", "type": "release", "url": server.url("/1.8.json")}]
            })
            .to_string();
            let descriptor = serde_json::json!({
                "id": "1.8",
                "type": "release",
                "mainClass": "net.minecraft.client.main.Main",
                "assets": "legacy",
                "minecraftArguments": "--username ${auth_player_name} --accessToken ${auth_access_token} --gameDir ${game_directory}",
                "downloads": {"client": {
                    "url": server.url("/client.jar"),
                    "sha1": sha1_hex(JAR),
                    "size": JAR.len()
                }},
                "libraries": [
                    {"name": "com.example:a:1.0",
                     "downloads": {"artifact": {
                        "path": "com/example/a/1.0/a-1.0.jar",
                        "url": server.url("/a-1.0.jar"),
                        "sha1": sha1_hex(LIB),
                        "size": LIB.len()
                     }}}
                ]
            })
            .to_string();

            server
                .mock_async(|when, then| {
                    when.method(GET).path("/manifest.json");
                    then.status(200).body(manifest);
                })
                .await;
            server
                .mock_async(|when, then| {
                    when.method(GET).path("/1.8.json");
                    then.status(200).body(descriptor);
                })
                .await;
            server
                .mock_async(|when, then| {
                    when.method(GET).path("/a-1.0.jar");
                    then.status(200).body(LIB);
                })
                .await;

            Self {
                server,
                dir: tempfile::tempdir().unwrap(),
            }
        }

        async fn serve_jar(&self, delay: Duration) -> httpmock::Mock<'_> {
            self.server
                .mock_async(move |when, then| {
                    when.method(GET).path("/client.jar");
                    then.status(200).delay(delay).body(JAR);
                })
                .await
        }

        async fn sessions(&self, logged_in: bool) -> SessionManager {
            let mut manager = SessionManager::load(
                Arc::new(FakeIdentity),
                self.dir.path().join("launcher_profiles.json"),
            )
            .await
            .unwrap();
            if logged_in {
                manager.login("user@example.com", "secret").await.unwrap();
            }
            manager
        }

        async fn orchestrator(&self, spawner: Arc<FakeSpawner>, logged_in: bool) -> LaunchOrchestrator {
            let ctx = LauncherContext::new(self.dir.path())
                .unwrap()
                .with_platform(LINUX);
            let resolver = VersionResolver::new(reqwest::Client::new(), ctx.layout.clone())
                .with_manifest_url(self.server.url("/manifest.json"))
                .with_retry(RetryPolicy::new(1, Duration::ZERO));
            LaunchOrchestrator::new(ctx, self.sessions(logged_in).await, spawner)
                .with_resolver(resolver)
                .with_fetch_retry(RetryPolicy::new(2, Duration::ZERO))
        }
    }

    #[tokio::test]
    async fn launch_downloads_then_spawns_with_the_session() {
        let fx = Fixture::new().await;
        let jar = fx.serve_jar(Duration::ZERO).await;
        let spawner = Arc::new(FakeSpawner::default());
        let orch = fx.orchestrator(spawner.clone(), true).await;
        let mut sub = orch.context().events.subscribe();

        let outcome = orch
            .launch("1.8", &LaunchOptions::default())
            .await
            .unwrap();

        assert_eq!(outcome.process.pid, Some(4242));
        assert_eq!(outcome.download.tasks.len(), 2);
        jar.assert_hits_async(1).await;

        let requests = spawner.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.working_dir, orch.context().layout.game_dir());
        assert!(request
            .args
            .windows(2)
            .any(|w| w == ["--accessToken", "access-123"]));
        assert!(request.args.contains(&"net.minecraft.client.main.Main".to_string()));
        assert!(!request.display_for_logs().contains("access-123"));

        let events = sub.drain_lifecycle();
        assert_eq!(
            events,
            vec![
                LifecycleEvent::Started { stage: Stage::Launch },
                LifecycleEvent::Started { stage: Stage::Download },
                LifecycleEvent::Succeeded { stage: Stage::Download },
                LifecycleEvent::Succeeded { stage: Stage::Launch },
            ]
        );
        assert!(!orch.is_running("1.8"));
    }

    #[tokio::test]
    async fn no_session_fails_before_downloading() {
        let fx = Fixture::new().await;
        let jar = fx.serve_jar(Duration::ZERO).await;
        let spawner = Arc::new(FakeSpawner::default());
        let orch = fx.orchestrator(spawner.clone(), false).await;

        let err = orch
            .launch("1.8", &LaunchOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, LauncherError::NotAuthenticated));
        jar.assert_hits_async(0).await;
        assert!(spawner.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn spawn_failure_keeps_session_and_cache() {
        let fx = Fixture::new().await;
        let jar = fx.serve_jar(Duration::ZERO).await;
        let spawner = Arc::new(FakeSpawner {
            fail: true,
            ..FakeSpawner::default()
        });
        let orch = fx.orchestrator(spawner, true).await;

        let err = orch
            .launch("1.8", &LaunchOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LauncherError::LaunchFailed(_)));

        let sessions = orch.sessions();
        let sessions = sessions.lock().await;
        assert_eq!(sessions.state(), AuthState::LoggedIn);
        assert_eq!(
            sessions.selected().map(|s| s.profile_id.as_str()),
            Some("pid-user@example.com")
        );
        drop(sessions);

        let layout = &orch.context().layout;
        assert!(layout.client_jar_path("1.8").exists());

        // A retry finds everything cached.
        let _ = orch.launch("1.8", &LaunchOptions::default()).await;
        jar.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn second_launch_of_the_same_version_is_refused() {
        let fx = Fixture::new().await;
        fx.serve_jar(Duration::ZERO).await;
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let spawner = Arc::new(FakeSpawner {
            gate: Some((entered.clone(), release.clone())),
            ..FakeSpawner::default()
        });
        let orch = Arc::new(fx.orchestrator(spawner, true).await);

        let first = {
            let orch = Arc::clone(&orch);
            tokio::spawn(async move { orch.launch("1.8", &LaunchOptions::default()).await })
        };
        entered.notified().await;
        assert!(orch.is_running("1.8"));

        let err = orch
            .launch("1.8", &LaunchOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LauncherError::LaunchInProgress { version, .. } if version == "1.8"));

        release.notify_one();
        first.await.unwrap().unwrap();
        assert!(!orch.is_running("1.8"));
    }

    #[tokio::test]
    async fn cancel_stops_the_attempt_before_spawning() {
        let fx = Fixture::new().await;
        fx.serve_jar(Duration::from_millis(500)).await;
        let spawner = Arc::new(FakeSpawner::default());
        let orch = Arc::new(fx.orchestrator(spawner.clone(), true).await);

        let run = {
            let orch = Arc::clone(&orch);
            tokio::spawn(async move { orch.launch("1.8", &LaunchOptions::default()).await })
        };
        while !orch.is_running("1.8") {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        orch.cancel();

        let err = run.await.unwrap().unwrap_err();
        assert!(matches!(err, LauncherError::Cancelled));
        assert!(spawner.requests.lock().unwrap().is_empty());
        assert!(!orch.context().layout.client_jar_path("1.8").exists());
        assert!(!orch.is_running("1.8"));
    }
}
