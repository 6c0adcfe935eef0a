//! Engine composition and axum router. [`ServeConfig`] is the embedder-supplied
//! wiring (storage path, provider, tool/policy/hook registries); [`Engine`]
//! turns that into the orchestrators the HTTP and WebSocket handlers share;
//! [`AppState`] is what axum hands to every handler.

use std::path::PathBuf;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use mote::config::EngineConfig;
use mote::error::EngineError;
use mote::events::{EngineEvent, EventSink};
use mote::hooks::HookDispatcher;
use mote::orchestrator::acp::AcpOrchestrator;
use mote::orchestrator::standard::{OrchestratorOptions, StandardOrchestrator};
use mote::pda::PdaEngine;
use mote::policy::{ApprovalGate, PolicyEngine};
use mote::prompt::{PromptBuilder, SkillPromptSource};
use mote::provider::LlmClient;
use mote::queue::{cancellation_pair, RunQueue};
use mote::session::{RunState, Scenario, SessionManager, SqliteSessionStore};
use mote::tools::ToolRegistry;
use tokio::sync::mpsc;

use crate::hub::Hub;
use crate::{chat, health, stubs, ws};

/// A [`SkillPromptSource`] with no configured skills; the default when an
/// embedder has no skill manifests to wire in.
pub struct NoSkills;

impl SkillPromptSource for NoSkills {
    fn prompt_fragment(&self, _skill_id: &str) -> Option<String> {
        None
    }
}

/// Everything an embedder supplies to stand up a server: storage location,
/// the LLM provider, and the pieces [`StandardOrchestrator`] dispatches
/// through. Agent/skill/MCP configuration loading is an external
/// collaborator's concern (§1 non-goal); this struct takes already-built
/// registries.
pub struct ServeConfig {
    pub db_path: PathBuf,
    pub provider: Arc<dyn LlmClient>,
    pub tools: Arc<ToolRegistry>,
    pub policy: Arc<PolicyEngine>,
    pub hooks: Arc<HookDispatcher>,
    pub prompt_builder: Arc<PromptBuilder>,
    pub skill_source: Arc<dyn SkillPromptSource>,
    pub engine_config: EngineConfig,
    pub pda_agents: Vec<mote::pda::AgentDef>,
}

impl ServeConfig {
    /// A config with no tools, no policy rules, and no skills, against the
    /// given provider and a fresh database file. Useful for smoke-testing a
    /// fresh server and as the base a real embedder overrides fields on.
    pub fn minimal(db_path: impl Into<PathBuf>, provider: Arc<dyn LlmClient>) -> Self {
        Self {
            db_path: db_path.into(),
            provider,
            tools: Arc::new(ToolRegistry::new()),
            policy: Arc::new(PolicyEngine::new()),
            hooks: Arc::new(HookDispatcher::new()),
            prompt_builder: Arc::new(PromptBuilder::new()),
            skill_source: Arc::new(NoSkills),
            engine_config: EngineConfig::default(),
            pda_agents: Vec::new(),
        }
    }
}

/// The running engine: session manager, run queue, and both orchestrators.
/// Which orchestrator a chat run uses is decided per call from the
/// provider's own [`LlmClient::is_acp`] flag, matching §4.7's framing of ACP
/// as "for providers that manage their own tool execution", not a
/// server-wide mode switch.
pub struct Engine {
    pub sessions: Arc<SessionManager>,
    pub queue: Arc<RunQueue>,
    pub standard: Arc<StandardOrchestrator>,
    pub acp: Arc<AcpOrchestrator>,
    pub pda: Arc<PdaEngine>,
    pub approvals: Arc<ApprovalGate>,
    pub config: EngineConfig,
}

impl Engine {
    pub fn build(cfg: ServeConfig) -> Result<Self, EngineError> {
        let store = SqliteSessionStore::new(&cfg.db_path)?;
        let sessions = Arc::new(SessionManager::new(
            Arc::new(store),
            cfg.engine_config.session_cache_capacity,
        ));
        let approvals = Arc::new(ApprovalGate::new());
        let queue = Arc::new(RunQueue::new(
            cfg.engine_config.queue_capacity,
            std::time::Duration::from_secs(cfg.engine_config.idle_timeout_secs),
        ));

        let standard = Arc::new(StandardOrchestrator {
            sessions: sessions.clone(),
            provider: cfg.provider.clone(),
            tools: cfg.tools.clone(),
            hooks: cfg.hooks.clone(),
            policy: cfg.policy.clone(),
            approvals: approvals.clone(),
            prompt_builder: cfg.prompt_builder.clone(),
            skill_source: cfg.skill_source.clone(),
            compaction: cfg.engine_config.compaction.clone(),
            options: OrchestratorOptions {
                max_iterations: cfg.engine_config.max_iterations,
                retry_backoff_secs: cfg.engine_config.retry_backoff_secs.clone(),
                max_consecutive_tool_errors: cfg.engine_config.max_consecutive_tool_errors,
            },
        });

        let acp = Arc::new(AcpOrchestrator {
            sessions: sessions.clone(),
            provider: cfg.provider.clone(),
            prompt_builder: cfg.prompt_builder.clone(),
            skill_source: cfg.skill_source.clone(),
            compaction: cfg.engine_config.compaction.clone(),
        });

        let mut pda = PdaEngine::new(sessions.clone(), cfg.provider.clone());
        for agent in cfg.pda_agents {
            pda.register(agent);
        }

        Ok(Self {
            sessions,
            queue,
            standard,
            acp,
            pda: Arc::new(pda),
            approvals,
            config: cfg.engine_config,
        })
    }

    /// Enqueues a chat turn on the session's worker and returns the event
    /// stream the caller (HTTP handler or hub) reads from. Returns
    /// immediately; the run itself proceeds on the run queue.
    pub fn start_chat(
        &self,
        session_id: &str,
        message: String,
        per_request_override: Option<String>,
    ) -> Result<mpsc::Receiver<EngineEvent>, EngineError> {
        let (sink, rx) = EventSink::new(self.config.queue_capacity.max(32));
        let sessions = self.sessions.clone();
        let standard = self.standard.clone();
        let acp = self.acp.clone();
        let use_acp = standard.provider.is_acp();
        let session_id_owned = session_id.to_string();

        // Each call gets its own cancellable context rather than sharing the
        // session worker's lifetime token; the worker merges it with that
        // token so either source stops the run.
        let (_ctx_handle, ctx) = cancellation_pair();

        self.queue.enqueue(
            session_id,
            ctx,
            Box::new(move |cancel| {
                Box::pin(async move {
                    sessions
                        .get_or_create(&session_id_owned, Scenario::Chat)
                        .await?;
                    let run = sessions.create_run(&session_id_owned, message.clone()).await?;
                    sessions
                        .transition_run(&run.id, RunState::Running, None, None)
                        .await?;

                    let result = if use_acp {
                        acp.run_once(&session_id_owned, &message, per_request_override, cancel, sink)
                            .await
                    } else {
                        standard
                            .run_once(&session_id_owned, &message, per_request_override, cancel, sink)
                            .await
                    };

                    match &result {
                        Ok(()) => {
                            sessions
                                .transition_run(&run.id, RunState::Completed, None, None)
                                .await?;
                        }
                        Err(e) => {
                            let state = if matches!(e, EngineError::RunCancelled(_)) {
                                RunState::Cancelled
                            } else {
                                RunState::Failed
                            };
                            sessions
                                .transition_run(&run.id, state, None, Some(e.to_string()))
                                .await?;
                        }
                    }
                    result
                })
            }),
        )?;
        Ok(rx)
    }

    /// Enqueues a PDA sub-agent run on the same per-session worker `start_chat`
    /// uses, so a `pda_run` frame can never race a plain chat turn on the same
    /// session. `resume` continues a checkpointed stack instead of starting
    /// `root_agent` fresh; the run's final output is discarded here (not
    /// every caller wants it as a reply) and only surfaces via the event
    /// stream's `Done`.
    pub fn start_pda(
        &self,
        session_id: &str,
        root_agent: &str,
        message: String,
        resume: bool,
    ) -> Result<mpsc::Receiver<EngineEvent>, EngineError> {
        let (sink, rx) = EventSink::new(self.config.queue_capacity.max(32));
        let sessions = self.sessions.clone();
        let pda = self.pda.clone();
        let session_id_owned = session_id.to_string();
        let root_agent_owned = root_agent.to_string();
        let (_ctx_handle, ctx) = cancellation_pair();

        self.queue.enqueue(
            session_id,
            ctx,
            Box::new(move |cancel| {
                Box::pin(async move {
                    sessions
                        .get_or_create(&session_id_owned, Scenario::Chat)
                        .await?;
                    let run = sessions.create_run(&session_id_owned, message.clone()).await?;
                    sessions
                        .transition_run(&run.id, RunState::Running, None, None)
                        .await?;

                    let result = pda
                        .run(&session_id_owned, &root_agent_owned, &message, resume, cancel, sink)
                        .await;

                    match &result {
                        Ok(output) => {
                            sessions
                                .transition_run(
                                    &run.id,
                                    RunState::Completed,
                                    Some(output.clone()),
                                    None,
                                )
                                .await?;
                        }
                        Err(e) => {
                            let state = if matches!(e, EngineError::RunCancelled(_)) {
                                RunState::Cancelled
                            } else {
                                RunState::Failed
                            };
                            sessions
                                .transition_run(&run.id, state, None, Some(e.to_string()))
                                .await?;
                        }
                    }
                    result.map(|_| ())
                })
            }),
        )?;
        Ok(rx)
    }
}

/// Shared state every handler receives.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub hub: Arc<Hub>,
}

impl AppState {
    pub fn new(cfg: ServeConfig) -> Result<Self, EngineError> {
        let engine = Engine::build(cfg)?;
        // The hub resolves `approval_response` frames against the same gate
        // the standard orchestrator's tool dispatch blocks on.
        let hub = Arc::new(Hub::new(engine.approvals.clone()));
        Ok(Self {
            engine: Arc::new(engine),
            hub,
        })
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/health", get(health::health))
        .route("/api/v1/config", get(health::config))
        .route("/api/v1/chat", post(chat::chat))
        .route("/api/v1/chat/stream", post(chat::chat_stream))
        .route("/ws", get(ws::ws_handler))
        .merge(stubs::router())
        .with_state(state)
}
