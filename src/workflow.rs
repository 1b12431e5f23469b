use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Local};
use serde::Serialize;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    agent::{AgentType, Language},
    capabilities::CapabilityMatrix,
    errors::{QaError, Result},
    materialize::{Artifact, materialize},
    notify::{BroadcastSender, Notifier, REVEAL_EVENT, STATE_EVENT},
    panel::Panel,
    service::{
        ContentRequest, FileRequest, FileUpload, GenerationOptions, GenerationService,
        ServiceReply,
    },
    util::now_local,
};

const EMPTY_INPUT: &str = "Please enter text or upload a file";
const NO_CONTENT: &str = "No content to download";
const COMING_SOON: &str = "This feature is coming soon!";
const GENERATED: &str = "Generated successfully!";
pub const GENERATION_FAILED: &str = "Failed to generate content";
const DOWNLOADED: &str = "Downloaded file successfully";
pub const DOWNLOAD_FAILED: &str = "Failed to download file";

const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_REVEAL_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowState {
    Idle,
    Generating,
    Success,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultOrigin {
    Service,
    /// Explanatory text for an agent the backend does not implement yet.
    Placeholder,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerationResult {
    pub content: String,
    pub filename: Option<String>,
    pub message: Option<String>,
    pub agent: AgentType,
    pub language: Option<Language>,
    pub origin: ResultOrigin,
    pub generated_at: DateTime<Local>,
}

impl GenerationResult {
    fn from_reply(reply: ServiceReply, agent: AgentType, language: Option<Language>) -> Self {
        Self {
            content: reply.content,
            filename: reply.filename,
            message: reply.message,
            agent,
            language,
            origin: ResultOrigin::Service,
            generated_at: now_local(),
        }
    }

    fn placeholder(agent: AgentType, language: Option<Language>) -> Self {
        Self {
            content: CapabilityMatrix::unavailable_message(agent, language).to_string(),
            filename: None,
            message: Some(COMING_SOON.to_string()),
            agent,
            language,
            origin: ResultOrigin::Placeholder,
            generated_at: now_local(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub agent: AgentType,
    pub language: Option<Language>,
    pub text: String,
    pub file: Option<FileUpload>,
    pub options: GenerationOptions,
}

impl GenerationRequest {
    pub fn new(agent: AgentType, language: Option<Language>, text: impl Into<String>) -> Self {
        Self {
            agent,
            language: agent.effective_language(language),
            text: text.into(),
            file: None,
            options: GenerationOptions::default(),
        }
    }

    pub fn with_file(mut self, file: FileUpload) -> Self {
        self.file = Some(file);
        self
    }

    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn validate(&self) -> Result<()> {
        match &self.file {
            None if self.text.trim().is_empty() => Err(QaError::validation(EMPTY_INPUT)),
            Some(file) if file.data.is_empty() => Err(QaError::validation(format!(
                "Uploaded file {} is empty",
                file.name
            ))),
            _ => Ok(()),
        }
    }

    fn requirement(&self) -> Option<String> {
        if self.text.trim().is_empty() {
            None
        } else {
            Some(self.text.clone())
        }
    }
}

/// What a dispatch produced. A generated outcome hands the original input
/// back so the caller can act on it.
#[derive(Debug, Clone)]
pub enum DispatchOutcome {
    Generated {
        result: GenerationResult,
        text: String,
        file: Option<FileUpload>,
    },
    Unavailable {
        result: GenerationResult,
    },
}

impl DispatchOutcome {
    pub fn result(&self) -> &GenerationResult {
        match self {
            DispatchOutcome::Generated { result, .. } | DispatchOutcome::Unavailable { result } => {
                result
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkflowSettings {
    /// `None` leaves generation calls unbounded.
    pub generation_timeout: Option<Duration>,
    pub reveal_delay: Duration,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            generation_timeout: Some(DEFAULT_GENERATION_TIMEOUT),
            reveal_delay: DEFAULT_REVEAL_DELAY,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkflowSnapshot {
    pub panel: Panel,
    pub available: bool,
    pub state: WorkflowState,
    pub result: Option<GenerationResult>,
}

struct WorkflowInner {
    state: WorkflowState,
    result: Option<GenerationResult>,
    /// Bumped on every dispatch so delayed reveals can tell they are stale.
    generation: u64,
}

/// Request/response/download lifecycle for one dashboard panel.
pub struct GenerationWorkflow {
    panel: Panel,
    service: Arc<dyn GenerationService>,
    capabilities: Arc<CapabilityMatrix>,
    notifier: Notifier,
    settings: WorkflowSettings,
    inner: Arc<RwLock<WorkflowInner>>,
}

impl GenerationWorkflow {
    pub fn new(
        panel: Panel,
        service: Arc<dyn GenerationService>,
        capabilities: Arc<CapabilityMatrix>,
        notifier: Notifier,
        settings: WorkflowSettings,
    ) -> Self {
        Self {
            panel,
            service,
            capabilities,
            notifier,
            settings,
            inner: Arc::new(RwLock::new(WorkflowInner {
                state: WorkflowState::Idle,
                result: None,
                generation: 0,
            })),
        }
    }

    pub fn panel(&self) -> &Panel {
        &self.panel
    }

    pub fn is_available(&self) -> bool {
        self.capabilities
            .is_available(self.panel.agent, self.panel.language)
    }

    /// Builds a request for this panel's agent and language.
    pub fn request(&self, text: impl Into<String>) -> GenerationRequest {
        GenerationRequest::new(self.panel.agent, self.panel.language, text)
    }

    pub async fn snapshot(&self) -> WorkflowSnapshot {
        let inner = self.inner.read().await;
        WorkflowSnapshot {
            panel: self.panel.clone(),
            available: self.is_available(),
            state: inner.state,
            result: inner.result.clone(),
        }
    }

    pub async fn dispatch(&self, request: GenerationRequest) -> Result<DispatchOutcome> {
        let request_id = Uuid::new_v4();
        let agent = request.agent;
        let language = agent.effective_language(request.language);

        let generation = {
            let mut inner = self.inner.write().await;

            if inner.state == WorkflowState::Generating {
                warn!(target: "workflow", panel = %self.panel.id, %request_id, "dispatch rejected, generation in progress");
                return Err(QaError::Busy);
            }

            if let Err(err) = request.validate() {
                drop(inner);
                self.notifier.error(&err.user_message(EMPTY_INPUT));
                return Err(err);
            }

            if !self.capabilities.is_available(agent, language) {
                let result = GenerationResult::placeholder(agent, language);
                inner.generation += 1;
                inner.state = WorkflowState::Success;
                inner.result = Some(result.clone());
                drop(inner);

                info!(target: "workflow", panel = %self.panel.id, %request_id, %agent, ?language, "agent unavailable, showing placeholder");
                self.notifier.info(COMING_SOON);
                publish_state(&self.notifier, WorkflowState::Success);
                return Ok(DispatchOutcome::Unavailable { result });
            }

            inner.generation += 1;
            inner.state = WorkflowState::Generating;
            inner.result = None;
            inner.generation
        };

        info!(
            target: "workflow",
            panel = %self.panel.id,
            %request_id,
            %agent,
            ?language,
            with_file = request.file.is_some(),
            "dispatching generation request"
        );
        publish_state(&self.notifier, WorkflowState::Generating);

        // Detached: the task settles the state even if this future is dropped.
        let task = GenerationTask {
            panel_id: self.panel.id.clone(),
            request_id,
            generation,
            service: Arc::clone(&self.service),
            inner: Arc::clone(&self.inner),
            notifier: self.notifier.clone(),
            settings: self.settings.clone(),
        };
        let handle = tokio::spawn(task.run(request.clone(), language));

        let result = match handle.await {
            Ok(result) => result?,
            Err(err) => {
                self.inner.write().await.state = WorkflowState::Error;
                self.notifier.error(GENERATION_FAILED);
                publish_state(&self.notifier, WorkflowState::Error);
                return Err(QaError::other(format!("generation task failed: {err}")));
            }
        };

        Ok(DispatchOutcome::Generated {
            result,
            text: request.text,
            file: request.file,
        })
    }

    pub async fn download(&self) -> Result<Artifact> {
        let result = self.inner.read().await.result.clone();
        let Some(result) = result else {
            self.notifier.error(NO_CONTENT);
            return Err(QaError::validation(NO_CONTENT));
        };

        match materialize(self.service.as_ref(), &result, &self.panel.title).await {
            Ok(artifact) => {
                info!(target: "workflow", panel = %self.panel.id, filename = %artifact.filename, bytes = artifact.data.len(), "artifact ready");
                self.notifier.success(DOWNLOADED);
                Ok(artifact)
            }
            Err(err) => {
                warn!(target: "workflow", panel = %self.panel.id, error = %err, "download failed");
                self.notifier.error(&err.user_message(DOWNLOAD_FAILED));
                Err(err)
            }
        }
    }
}

/// One in-flight generation, detached from the dispatching caller.
struct GenerationTask {
    panel_id: String,
    request_id: Uuid,
    generation: u64,
    service: Arc<dyn GenerationService>,
    inner: Arc<RwLock<WorkflowInner>>,
    notifier: Notifier,
    settings: WorkflowSettings,
}

impl GenerationTask {
    async fn run(
        self,
        request: GenerationRequest,
        language: Option<Language>,
    ) -> Result<GenerationResult> {
        let agent = request.agent;

        match self.call_service(&request, language).await {
            Ok(reply) => {
                let result = GenerationResult::from_reply(reply, agent, language);
                {
                    let mut inner = self.inner.write().await;
                    inner.state = WorkflowState::Success;
                    inner.result = Some(result.clone());
                }

                info!(target: "workflow", panel = %self.panel_id, request_id = %self.request_id, filename = ?result.filename, "generation succeeded");
                self.notifier
                    .success(result.message.as_deref().unwrap_or(GENERATED));
                publish_state(&self.notifier, WorkflowState::Success);
                self.schedule_reveal();

                Ok(result)
            }
            Err(err) => {
                {
                    let mut inner = self.inner.write().await;
                    inner.state = WorkflowState::Error;
                    inner.result = None;
                }

                warn!(target: "workflow", panel = %self.panel_id, request_id = %self.request_id, error = %err, "generation failed");
                self.notifier.error(&err.user_message(GENERATION_FAILED));
                publish_state(&self.notifier, WorkflowState::Error);
                Err(err)
            }
        }
    }

    async fn call_service(
        &self,
        request: &GenerationRequest,
        language: Option<Language>,
    ) -> Result<ServiceReply> {
        let call = async {
            match &request.file {
                Some(file) => {
                    let upload = FileRequest {
                        file: file.clone(),
                        agent: request.agent,
                        requirement: request.requirement(),
                        language,
                        options: request.options.clone(),
                    };
                    self.service.generate_with_file(&upload).await
                }
                None => {
                    let content = ContentRequest {
                        requirement: request.text.clone(),
                        agent: request.agent,
                        language,
                        options: request.options.clone(),
                    };
                    self.service.generate_content(&content).await
                }
            }
        };

        match self.settings.generation_timeout {
            Some(limit) => tokio::time::timeout(limit, call).await.map_err(|_| {
                QaError::service(Some(format!(
                    "Generation timed out after {} seconds",
                    limit.as_secs()
                )))
            })?,
            None => call.await,
        }
    }

    fn schedule_reveal(&self) {
        let inner = Arc::clone(&self.inner);
        let notifier = self.notifier.clone();
        let delay = self.settings.reveal_delay;
        let generation = self.generation;

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let inner = inner.read().await;
            if inner.generation == generation && inner.result.is_some() {
                notifier.event(REVEAL_EVENT, json!({ "generation": generation }));
            }
        });
    }
}

fn publish_state(notifier: &Notifier, state: WorkflowState) {
    notifier.event(STATE_EVENT, json!({ "state": state }));
}

/// The workflows of every configured panel, in panel order.
pub struct WorkflowRegistry {
    workflows: Vec<Arc<GenerationWorkflow>>,
}

impl WorkflowRegistry {
    pub fn new(
        panels: Vec<Panel>,
        service: Arc<dyn GenerationService>,
        capabilities: Arc<CapabilityMatrix>,
        broadcaster: &BroadcastSender,
        settings: &WorkflowSettings,
    ) -> Self {
        let workflows = panels
            .into_iter()
            .map(|panel| {
                let notifier = Notifier::new(panel.id.clone(), broadcaster.clone());
                Arc::new(GenerationWorkflow::new(
                    panel,
                    Arc::clone(&service),
                    Arc::clone(&capabilities),
                    notifier,
                    settings.clone(),
                ))
            })
            .collect();

        Self { workflows }
    }

    pub fn get(&self, panel_id: &str) -> Result<Arc<GenerationWorkflow>> {
        self.workflows
            .iter()
            .find(|workflow| workflow.panel().id == panel_id)
            .cloned()
            .ok_or_else(|| QaError::PanelNotFound(panel_id.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<GenerationWorkflow>> {
        self.workflows.iter()
    }
}
