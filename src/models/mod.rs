use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_TONE: &str = "Inspirador e Prático";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContentType {
    Ebook,
    Course,
}

impl ContentType {
    /// What a single unit of the outline is called for this kind of project.
    pub fn unit_name(self) -> &'static str {
        match self {
            ContentType::Ebook => "capítulos",
            ContentType::Course => "módulos",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ContentType::Ebook => "e-book",
            ContentType::Course => "curso online",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    pub title: String,
    pub description: String,
    pub content: Option<String>,
    pub generating: bool,
}

impl Chapter {
    pub fn from_outline(entry: OutlineEntry) -> Self {
        Chapter {
            title: entry.title,
            description: entry.description,
            content: None,
            generating: false,
        }
    }

    /// A chapter with non-empty content is complete, whatever `generating` says.
    pub fn is_complete(&self) -> bool {
        self.content.as_deref().is_some_and(|c| !c.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverImage {
    pub mime_type: String,
    /// Base64 encoded image bytes.
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub content_type: ContentType,
    pub topic: String,
    pub target_audience: String,
    pub tone: String,
    pub title: String,
    pub chapters: Vec<Chapter>,
    pub cover_image: Option<CoverImage>,
}

impl Project {
    pub fn empty(id: Uuid, content_type: ContentType) -> Self {
        Project {
            id,
            content_type,
            topic: String::new(),
            target_audience: String::new(),
            tone: String::new(),
            title: String::new(),
            chapters: Vec::new(),
            cover_image: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineStep {
    #[default]
    Home,
    Input,
    Outline,
    Generation,
    Result,
}

impl std::fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PipelineStep::Home => "HOME",
            PipelineStep::Input => "INPUT",
            PipelineStep::Outline => "OUTLINE",
            PipelineStep::Generation => "GENERATION",
            PipelineStep::Result => "RESULT",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct SessionStatus {
    pub step: PipelineStep,
    pub busy: bool,
    pub error: Option<String>,
}

/// What the user submits on the input step.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProjectInput {
    pub topic: String,
    pub audience: String,
    #[serde(default)]
    pub tone: String,
}

impl ProjectInput {
    pub fn new(
        topic: impl Into<String>,
        audience: impl Into<String>,
        tone: impl Into<String>,
    ) -> Self {
        ProjectInput {
            topic: topic.into(),
            audience: audience.into(),
            tone: tone.into(),
        }
    }

    /// Trims every field and applies the default tone. Topic and audience
    /// must not be blank.
    pub fn normalized(self) -> Result<Self, &'static str> {
        let topic = self.topic.trim().to_string();
        let audience = self.audience.trim().to_string();
        if topic.is_empty() {
            return Err("o tema é obrigatório");
        }
        if audience.is_empty() {
            return Err("o público-alvo é obrigatório");
        }
        let tone = match self.tone.trim() {
            "" => DEFAULT_TONE.to_string(),
            tone => tone.to_string(),
        };
        Ok(ProjectInput {
            topic,
            audience,
            tone,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineEntry {
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outline {
    pub title: String,
    pub chapters: Vec<OutlineEntry>,
}

/// Outcome of one chapter-body call. Degraded bodies still carry text the
/// reader can see, so the pipeline keeps going.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChapterBody {
    Generated(String),
    Degraded { placeholder: String, cause: String },
}

impl ChapterBody {
    pub fn is_degraded(&self) -> bool {
        matches!(self, ChapterBody::Degraded { .. })
    }

    pub fn into_text(self) -> String {
        match self {
            ChapterBody::Generated(text) => text,
            ChapterBody::Degraded { placeholder, .. } => placeholder,
        }
    }
}
