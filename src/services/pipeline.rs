//! Session state machine and the orchestrator that drives it.
//!
//! All state changes go through [`reduce`], a pure function over
//! `(SessionState, Event)`. Events are tagged with the project they were
//! issued for, so results that arrive after a restart fall on the floor
//! instead of landing in the next project.

use crate::config::PipelineConfig;
use crate::error::{
    CREDENTIAL_REQUIRED_MESSAGE, OUTLINE_CREDENTIAL_MESSAGE, OUTLINE_FAILED_MESSAGE, PipelineError,
    ProviderError,
};
use crate::models::{
    Chapter, ChapterBody, ContentType, CoverImage, Outline, PipelineStep, Project, ProjectInput,
    SessionStatus,
};
use crate::services::llm::{
    ChapterRequest, CoverRequest, CredentialProbe, GenerationClient, OutlineRequest,
};
use crate::services::progress::Progress;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub status: SessionStatus,
    pub project: Option<Project>,
}

impl SessionState {
    pub fn project_id(&self) -> Option<Uuid> {
        self.project.as_ref().map(|p| p.id)
    }

    pub fn progress(&self) -> Option<Progress> {
        self.project.as_ref().map(Progress::of)
    }
}

#[derive(Debug, Clone)]
pub enum Event {
    Started {
        project_id: Uuid,
        content_type: ContentType,
    },
    InputSubmitted {
        project_id: Uuid,
    },
    OutlineAccepted {
        project_id: Uuid,
        input: ProjectInput,
        outline: Outline,
    },
    OutlineRejected {
        project_id: Uuid,
        message: String,
    },
    CredentialRejected {
        project_id: Uuid,
        message: String,
    },
    GenerationRequested {
        project_id: Uuid,
    },
    GenerationStarted {
        project_id: Uuid,
    },
    ChapterStarted {
        project_id: Uuid,
        index: usize,
    },
    ChapterWritten {
        project_id: Uuid,
        index: usize,
        content: String,
    },
    CoverSettled {
        project_id: Uuid,
        cover: Option<CoverImage>,
    },
    GenerationCompleted {
        project_id: Uuid,
    },
    Restarted,
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::Started { .. } => "started",
            Event::InputSubmitted { .. } => "input_submitted",
            Event::OutlineAccepted { .. } => "outline_accepted",
            Event::OutlineRejected { .. } => "outline_rejected",
            Event::CredentialRejected { .. } => "credential_rejected",
            Event::GenerationRequested { .. } => "generation_requested",
            Event::GenerationStarted { .. } => "generation_started",
            Event::ChapterStarted { .. } => "chapter_started",
            Event::ChapterWritten { .. } => "chapter_written",
            Event::CoverSettled { .. } => "cover_settled",
            Event::GenerationCompleted { .. } => "generation_completed",
            Event::Restarted => "restarted",
        }
    }
}

/// Clone of `state` if it still belongs to `project_id`.
fn owned_by(state: &SessionState, project_id: Uuid) -> Option<SessionState> {
    (state.project_id() == Some(project_id)).then(|| state.clone())
}

fn status(step: PipelineStep, busy: bool, error: Option<String>) -> SessionStatus {
    SessionStatus { step, busy, error }
}

/// Next state for `event`, or `None` when the event is stale or not valid here.
pub fn reduce(state: &SessionState, event: &Event) -> Option<SessionState> {
    let step = state.status.step;
    let busy = state.status.busy;

    match event {
        Event::Restarted => Some(SessionState::default()),

        Event::Started {
            project_id,
            content_type,
        } => (step == PipelineStep::Home).then(|| SessionState {
            status: status(PipelineStep::Input, false, None),
            project: Some(Project::empty(*project_id, *content_type)),
        }),

        Event::InputSubmitted { project_id } => {
            let mut next = owned_by(state, *project_id)?;
            if step != PipelineStep::Input || busy {
                return None;
            }
            next.status = status(PipelineStep::Input, true, None);
            Some(next)
        }

        Event::OutlineAccepted {
            project_id,
            input,
            outline,
        } => {
            let mut next = owned_by(state, *project_id)?;
            if step != PipelineStep::Input || !busy || outline.chapters.is_empty() {
                return None;
            }
            let project = next.project.as_mut()?;
            project.topic = input.topic.clone();
            project.target_audience = input.audience.clone();
            project.tone = input.tone.clone();
            project.title = outline.title.clone();
            project.chapters = outline
                .chapters
                .iter()
                .cloned()
                .map(Chapter::from_outline)
                .collect();
            next.status = status(PipelineStep::Outline, false, None);
            Some(next)
        }

        Event::OutlineRejected {
            project_id,
            message,
        } => {
            let mut next = owned_by(state, *project_id)?;
            if step != PipelineStep::Input {
                return None;
            }
            next.status = status(PipelineStep::Input, false, Some(message.clone()));
            Some(next)
        }

        Event::CredentialRejected {
            project_id,
            message,
        } => {
            let mut next = owned_by(state, *project_id)?;
            if !matches!(step, PipelineStep::Input | PipelineStep::Outline) {
                return None;
            }
            next.status = status(step, false, Some(message.clone()));
            Some(next)
        }

        Event::GenerationRequested { project_id } => {
            let mut next = owned_by(state, *project_id)?;
            if step != PipelineStep::Outline || busy {
                return None;
            }
            next.status = status(PipelineStep::Outline, true, None);
            Some(next)
        }

        Event::GenerationStarted { project_id } => {
            let mut next = owned_by(state, *project_id)?;
            if step != PipelineStep::Outline || !busy {
                return None;
            }
            next.status = status(PipelineStep::Generation, true, None);
            Some(next)
        }

        Event::ChapterStarted { project_id, index } => {
            let mut next = owned_by(state, *project_id)?;
            if step != PipelineStep::Generation {
                return None;
            }
            let chapters = &mut next.project.as_mut()?.chapters;
            // Chapters are written one at a time.
            if chapters.iter().any(|c| c.generating) {
                return None;
            }
            let chapter = chapters.get_mut(*index)?;
            if chapter.content.is_some() {
                return None;
            }
            chapter.generating = true;
            Some(next)
        }

        Event::ChapterWritten {
            project_id,
            index,
            content,
        } => {
            let mut next = owned_by(state, *project_id)?;
            if step != PipelineStep::Generation {
                return None;
            }
            let chapter = next.project.as_mut()?.chapters.get_mut(*index)?;
            if chapter.content.is_some() {
                return None;
            }
            chapter.content = Some(content.clone());
            chapter.generating = false;
            Some(next)
        }

        Event::CoverSettled { project_id, cover } => {
            let mut next = owned_by(state, *project_id)?;
            if step != PipelineStep::Generation {
                return None;
            }
            next.project.as_mut()?.cover_image = Some(cover.clone()?);
            Some(next)
        }

        Event::GenerationCompleted { project_id } => {
            let mut next = owned_by(state, *project_id)?;
            if step != PipelineStep::Generation {
                return None;
            }
            next.status = status(PipelineStep::Result, false, None);
            Some(next)
        }
    }
}

/// Applies `event` to the shared session. Observers see one atomic
/// replacement per applied event.
fn dispatch(state: &watch::Sender<SessionState>, event: Event) -> bool {
    let applied = state.send_if_modified(|current| match reduce(current, &event) {
        Some(next) => {
            *current = next;
            true
        }
        None => false,
    });
    if !applied {
        debug!(event = event.name(), "event ignored");
    }
    applied
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutcome {
    /// Every chapter has content and the cover has settled.
    Completed { degraded_chapters: Vec<usize> },
    /// The project was discarded by a restart before the run finished.
    Abandoned,
}

#[derive(Clone)]
pub struct Orchestrator {
    client: Arc<dyn GenerationClient>,
    credentials: Arc<dyn CredentialProbe>,
    config: PipelineConfig,
    state: Arc<watch::Sender<SessionState>>,
}

impl Orchestrator {
    pub fn new(
        client: Arc<dyn GenerationClient>,
        credentials: Arc<dyn CredentialProbe>,
        config: PipelineConfig,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::default());
        Orchestrator {
            client,
            credentials,
            config,
            state: Arc::new(state),
        }
    }

    pub fn snapshot(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.state.borrow().status.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    fn dispatch(&self, event: Event) -> bool {
        dispatch(&self.state, event)
    }

    /// The current project, if the session is at `expected` and idle.
    fn idle_project_at(&self, expected: PipelineStep) -> Result<Project, PipelineError> {
        let state = self.state.borrow();
        if state.status.step != expected {
            return Err(PipelineError::InvalidTransition {
                expected,
                actual: state.status.step,
            });
        }
        if state.status.busy {
            return Err(PipelineError::Busy);
        }
        state.project.clone().ok_or(PipelineError::InvalidTransition {
            expected,
            actual: state.status.step,
        })
    }

    fn transition_error(&self, expected: PipelineStep) -> PipelineError {
        PipelineError::InvalidTransition {
            expected,
            actual: self.status().step,
        }
    }

    /// HOME → INPUT with an empty project of the given type.
    pub fn start(&self, content_type: ContentType) -> Result<Uuid, PipelineError> {
        let project_id = Uuid::new_v4();
        if !self.dispatch(Event::Started {
            project_id,
            content_type,
        }) {
            return Err(self.transition_error(PipelineStep::Home));
        }
        info!(%project_id, ?content_type, "project started");
        Ok(project_id)
    }

    /// INPUT → OUTLINE. Awaits the outline call; on failure the session stays
    /// on INPUT with an error the user can retry from.
    pub async fn submit_input(&self, input: ProjectInput) -> Result<(), PipelineError> {
        let input = input.normalized().map_err(PipelineError::InvalidInput)?;
        let project = self.idle_project_at(PipelineStep::Input)?;
        let project_id = project.id;

        if !self.dispatch(Event::InputSubmitted { project_id }) {
            return Err(PipelineError::Busy);
        }

        if !self.credentials.ensure().await {
            warn!(%project_id, "no provider credential for outline");
            if !self.dispatch(Event::CredentialRejected {
                project_id,
                message: OUTLINE_CREDENTIAL_MESSAGE.to_string(),
            }) {
                return Err(PipelineError::Discarded);
            }
            return Err(PipelineError::CredentialUnavailable {
                message: OUTLINE_CREDENTIAL_MESSAGE,
            });
        }

        let request = OutlineRequest {
            topic: input.topic.clone(),
            audience: input.audience.clone(),
            tone: input.tone.clone(),
            content_type: project.content_type,
        };
        let outline = self
            .client
            .generate_outline(&request)
            .await
            .and_then(|outline| {
                if outline.chapters.is_empty() {
                    Err(ProviderError::EmptyOutline)
                } else {
                    Ok(outline)
                }
            });

        match outline {
            Ok(outline) => {
                let chapters = outline.chapters.len();
                if !self.dispatch(Event::OutlineAccepted {
                    project_id,
                    input,
                    outline,
                }) {
                    debug!(%project_id, "outline arrived for a discarded project");
                    return Err(PipelineError::Discarded);
                }
                info!(%project_id, chapters, "outline ready");
                Ok(())
            }
            Err(e) => {
                warn!(%project_id, error = %e, "outline generation failed");
                if !self.dispatch(Event::OutlineRejected {
                    project_id,
                    message: OUTLINE_FAILED_MESSAGE.to_string(),
                }) {
                    return Err(PipelineError::Discarded);
                }
                Err(PipelineError::StructuralFailure(e))
            }
        }
    }

    /// OUTLINE → GENERATION. Checks the credential and flips the step; the
    /// returned run does the actual work.
    pub async fn begin_generation(&self) -> Result<GenerationRun, PipelineError> {
        let project = self.idle_project_at(PipelineStep::Outline)?;
        let project_id = project.id;

        // Clears any previous error while the credential check is pending.
        if !self.dispatch(Event::GenerationRequested { project_id }) {
            return Err(PipelineError::Busy);
        }

        if !self.credentials.ensure().await {
            warn!(%project_id, "no provider credential for generation");
            if !self.dispatch(Event::CredentialRejected {
                project_id,
                message: CREDENTIAL_REQUIRED_MESSAGE.to_string(),
            }) {
                return Err(PipelineError::Discarded);
            }
            return Err(PipelineError::CredentialUnavailable {
                message: CREDENTIAL_REQUIRED_MESSAGE,
            });
        }

        if !self.dispatch(Event::GenerationStarted { project_id }) {
            return Err(PipelineError::Discarded);
        }
        info!(%project_id, chapters = project.chapters.len(), "generation started");

        Ok(GenerationRun {
            orchestrator: self.clone(),
            project,
        })
    }

    /// Outline approval: runs the whole generation phase to RESULT.
    pub async fn confirm_outline(&self) -> Result<GenerationOutcome, PipelineError> {
        let run = self.begin_generation().await?;
        Ok(run.run().await)
    }

    /// Any step → HOME. Discards the project; late results are ignored.
    pub fn restart(&self) {
        let discarded = self.state.borrow().project_id();
        self.dispatch(Event::Restarted);
        if let Some(project_id) = discarded {
            info!(%project_id, "session restarted");
        }
    }

    /// The project, once it has reached RESULT.
    pub fn finished_project(&self) -> Result<Project, PipelineError> {
        let state = self.state.borrow();
        match (&state.status.step, &state.project) {
            (PipelineStep::Result, Some(project)) => Ok(project.clone()),
            _ => Err(PipelineError::NotReady),
        }
    }

    fn spawn_cover(&self, project: &Project) -> JoinHandle<()> {
        let client = Arc::clone(&self.client);
        let state = Arc::clone(&self.state);
        let project_id = project.id;
        let request = CoverRequest {
            title: project.title.clone(),
            topic: project.topic.clone(),
            content_type: project.content_type,
        };
        tokio::spawn(async move {
            let cover = client.generate_cover_image(&request).await;
            debug!(%project_id, ready = cover.is_some(), "cover settled");
            dispatch(&state, Event::CoverSettled { project_id, cover });
        })
    }

    async fn chapter_body(&self, request: &ChapterRequest) -> ChapterBody {
        let attempts = self.config.chapter_retries.saturating_add(1);
        let mut attempt = 1;
        loop {
            let body = self.client.generate_chapter_body(request).await;
            if !body.is_degraded() || attempt >= attempts {
                return body;
            }
            debug!(chapter = %request.chapter_title, attempt, "retrying degraded chapter");
            attempt += 1;
        }
    }

    /// Writes chapters in outline order. Returns the indices that degraded,
    /// or `None` if the project was discarded along the way.
    async fn write_chapters(&self, project: &Project) -> Option<Vec<usize>> {
        let project_id = project.id;
        let mut degraded = Vec::new();

        for (index, chapter) in project.chapters.iter().enumerate() {
            if !self.dispatch(Event::ChapterStarted { project_id, index }) {
                return None;
            }
            let request = ChapterRequest {
                project_title: project.title.clone(),
                chapter_title: chapter.title.clone(),
                chapter_description: chapter.description.clone(),
                tone: project.tone.clone(),
                content_type: project.content_type,
            };
            let body = self.chapter_body(&request).await;
            if let ChapterBody::Degraded { cause, .. } = &body {
                warn!(%project_id, chapter = index, %cause, "chapter degraded to placeholder");
                degraded.push(index);
            }
            if !self.dispatch(Event::ChapterWritten {
                project_id,
                index,
                content: body.into_text(),
            }) {
                return None;
            }
            debug!(%project_id, chapter = index, "chapter written");
        }
        Some(degraded)
    }
}

/// A started generation phase: the cover task and the chapter sequence,
/// joined before RESULT.
#[must_use = "generation does nothing until `run` is awaited"]
pub struct GenerationRun {
    orchestrator: Orchestrator,
    project: Project,
}

impl GenerationRun {
    pub fn project_id(&self) -> Uuid {
        self.project.id
    }

    pub async fn run(self) -> GenerationOutcome {
        let GenerationRun {
            orchestrator,
            project,
        } = self;
        let project_id = project.id;

        let mut cover = orchestrator.spawn_cover(&project);
        let Some(degraded_chapters) = orchestrator.write_chapters(&project).await else {
            cover.abort();
            info!(%project_id, "generation abandoned");
            return GenerationOutcome::Abandoned;
        };

        let mut rx = orchestrator.subscribe();
        let discarded = async {
            let _ = rx.wait_for(|s| s.project_id() != Some(project_id)).await;
        };
        tokio::select! {
            joined = &mut cover => {
                if let Err(e) = joined {
                    warn!(%project_id, error = %e, "cover task did not finish cleanly");
                }
            }
            _ = discarded => {
                cover.abort();
                info!(%project_id, "generation abandoned while the cover was pending");
                return GenerationOutcome::Abandoned;
            }
        }

        if !orchestrator.dispatch(Event::GenerationCompleted { project_id }) {
            info!(%project_id, "generation abandoned");
            return GenerationOutcome::Abandoned;
        }
        info!(
            %project_id,
            degraded = degraded_chapters.len(),
            with_cover = orchestrator.snapshot().project.is_some_and(|p| p.cover_image.is_some()),
            "generation complete"
        );
        GenerationOutcome::Completed { degraded_chapters }
    }
}
