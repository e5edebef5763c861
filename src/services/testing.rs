//! Scripted provider doubles shared by the pipeline and HTTP tests.

use crate::config::PipelineConfig;
use crate::error::ProviderError;
use crate::models::{ChapterBody, CoverImage, Outline, OutlineEntry};
use crate::services::llm::{
    ChapterRequest, CoverRequest, CredentialProbe, GenerationClient, OutlineRequest,
};
use crate::services::pipeline::{Orchestrator, SessionState};
use crate::services::progress::Progress;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use tokio::sync::{Notify, watch};

/// Blocks a scripted call until released, and tells the test when the call began.
#[derive(Clone, Default)]
pub struct Gate {
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
}

impl Gate {
    pub async fn pass(&self) {
        self.entered.notify_one();
        self.release.notified().await;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub percentage: u8,
    pub in_progress: usize,
}

#[derive(Default)]
pub struct ScriptedClient {
    outline: Option<Outline>,
    degraded: HashSet<String>,
    cover: Option<CoverImage>,
    outline_gate: Option<Gate>,
    chapter_gate: Option<(usize, Gate)>,
    cover_gate: Option<Gate>,
    outline_calls: AtomicUsize,
    cover_calls: AtomicUsize,
    chapter_calls: Mutex<Vec<String>>,
    observer: OnceLock<watch::Receiver<SessionState>>,
    observations: Mutex<Vec<Observation>>,
}

impl ScriptedClient {
    pub fn with_outline(title: &str, chapters: &[&str]) -> Self {
        ScriptedClient {
            outline: Some(Outline {
                title: title.to_string(),
                chapters: chapters
                    .iter()
                    .map(|c| OutlineEntry {
                        title: c.to_string(),
                        description: format!("Sobre {c}"),
                    })
                    .collect(),
            }),
            ..Default::default()
        }
    }

    pub fn failing_outline() -> Self {
        ScriptedClient::default()
    }

    pub fn degrade(mut self, chapter: &str) -> Self {
        self.degraded.insert(chapter.to_string());
        self
    }

    pub fn with_cover(mut self) -> Self {
        self.cover = Some(CoverImage {
            mime_type: "image/png".to_string(),
            data: "iVBORw0KGgo=".to_string(),
        });
        self
    }

    pub fn gate_outline(mut self, gate: Gate) -> Self {
        self.outline_gate = Some(gate);
        self
    }

    pub fn gate_chapter(mut self, index: usize, gate: Gate) -> Self {
        self.chapter_gate = Some((index, gate));
        self
    }

    pub fn gate_cover(mut self, gate: Gate) -> Self {
        self.cover_gate = Some(gate);
        self
    }

    /// Lets chapter calls record what the session looked like when they ran.
    pub fn observe(&self, receiver: watch::Receiver<SessionState>) {
        let _ = self.observer.set(receiver);
    }

    pub fn outline_calls(&self) -> usize {
        self.outline_calls.load(Ordering::SeqCst)
    }

    pub fn cover_calls(&self) -> usize {
        self.cover_calls.load(Ordering::SeqCst)
    }

    pub fn chapter_calls(&self) -> Vec<String> {
        self.chapter_calls.lock().unwrap().clone()
    }

    pub fn observations(&self) -> Vec<Observation> {
        self.observations.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationClient for ScriptedClient {
    async fn generate_outline(&self, _request: &OutlineRequest) -> Result<Outline, ProviderError> {
        self.outline_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.outline_gate {
            gate.pass().await;
        }
        tokio::task::yield_now().await;
        self.outline
            .clone()
            .ok_or_else(|| ProviderError::Malformed("scripted failure".to_string()))
    }

    async fn generate_chapter_body(&self, request: &ChapterRequest) -> ChapterBody {
        let index = {
            let mut calls = self.chapter_calls.lock().unwrap();
            calls.push(request.chapter_title.clone());
            calls.len() - 1
        };

        if let Some(rx) = self.observer.get() {
            let state = rx.borrow();
            if let Some(project) = &state.project {
                let progress = Progress::of(project);
                self.observations.lock().unwrap().push(Observation {
                    percentage: progress.percentage,
                    in_progress: progress.in_progress(),
                });
            }
        }

        if let Some((gated, gate)) = &self.chapter_gate {
            if *gated == index {
                gate.pass().await;
            }
        }
        tokio::task::yield_now().await;

        if self.degraded.contains(&request.chapter_title) {
            ChapterBody::Degraded {
                placeholder: crate::services::llm::PLACEHOLDER_FAILED.to_string(),
                cause: "scripted failure".to_string(),
            }
        } else {
            ChapterBody::Generated(format!(
                "Conteúdo de {} ({})",
                request.chapter_title, request.tone
            ))
        }
    }

    async fn generate_cover_image(&self, _request: &CoverRequest) -> Option<CoverImage> {
        self.cover_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.cover_gate {
            gate.pass().await;
        }
        tokio::task::yield_now().await;
        self.cover.clone()
    }
}

pub struct StaticCredentials {
    available: AtomicBool,
    acquirable: bool,
    acquire_calls: AtomicUsize,
}

impl StaticCredentials {
    pub fn available() -> Self {
        StaticCredentials::new(true, false)
    }

    pub fn missing() -> Self {
        StaticCredentials::new(false, false)
    }

    pub fn new(available: bool, acquirable: bool) -> Self {
        StaticCredentials {
            available: AtomicBool::new(available),
            acquirable,
            acquire_calls: AtomicUsize::new(0),
        }
    }

    pub fn revoke(&self) {
        self.available.store(false, Ordering::SeqCst);
    }

    pub fn acquire_calls(&self) -> usize {
        self.acquire_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialProbe for StaticCredentials {
    async fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn acquire(&self) -> bool {
        self.acquire_calls.fetch_add(1, Ordering::SeqCst);
        if self.acquirable {
            self.available.store(true, Ordering::SeqCst);
        }
        self.acquirable
    }
}

pub fn orchestrator(client: &Arc<ScriptedClient>, credentials: &Arc<StaticCredentials>) -> Orchestrator {
    let orchestrator = Orchestrator::new(
        client.clone(),
        credentials.clone(),
        PipelineConfig::default(),
    );
    client.observe(orchestrator.subscribe());
    orchestrator
}

/// Waits until the session satisfies `done`, checking the current snapshot first.
pub async fn wait_until<F>(rx: &mut watch::Receiver<SessionState>, done: F)
where
    F: Fn(&SessionState) -> bool,
{
    loop {
        if done(&*rx.borrow_and_update()) {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}
