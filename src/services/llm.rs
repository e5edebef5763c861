use crate::config::LlmConfig;
use crate::error::ProviderError;
use crate::models::{ChapterBody, ContentType, CoverImage, Outline};
use crate::services::prompts;
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::OnceLock;
use tracing::{debug, warn};

pub const PLACEHOLDER_EMPTY: &str = "Conteúdo não gerado.";
pub const PLACEHOLDER_FAILED: &str = "Erro ao gerar este conteúdo. Tente novamente.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutlineRequest {
    pub topic: String,
    pub audience: String,
    pub tone: String,
    pub content_type: ContentType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterRequest {
    pub project_title: String,
    pub chapter_title: String,
    pub chapter_description: String,
    pub tone: String,
    pub content_type: ContentType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverRequest {
    pub title: String,
    pub topic: String,
    pub content_type: ContentType,
}

/// The three capabilities the pipeline needs from a generative provider.
///
/// Only the outline call fails loudly. Chapter bodies degrade to placeholder
/// text and covers resolve to `None`, so one bad unit never stops the run.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    async fn generate_outline(&self, request: &OutlineRequest) -> Result<Outline, ProviderError>;

    async fn generate_chapter_body(&self, request: &ChapterRequest) -> ChapterBody;

    async fn generate_cover_image(&self, request: &CoverRequest) -> Option<CoverImage>;
}

/// Credential availability check run before any phase that calls the provider.
#[async_trait]
pub trait CredentialProbe: Send + Sync {
    async fn is_available(&self) -> bool;

    /// Tries to obtain a credential. Returns whether one is now available.
    async fn acquire(&self) -> bool;

    async fn ensure(&self) -> bool {
        self.is_available().await || self.acquire().await
    }
}

pub struct LLMClient {
    client: reqwest::Client,
    config: LlmConfig,
}

impl LLMClient {
    pub fn new(config: LlmConfig) -> Self {
        LLMClient {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent", self.config.api_url, model)
    }

    async fn generate_content(
        &self,
        model: &str,
        body: Value,
    ) -> Result<GenerateContentResponse, ProviderError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(ProviderError::MissingCredential)?;

        let response = self
            .client
            .post(self.endpoint(model))
            .header("Content-Type", "application/json")
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let response_text = response.text().await?;
        if !status.is_success() {
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body: response_text,
            });
        }

        serde_json::from_str(&response_text).map_err(|e| ProviderError::Malformed(e.to_string()))
    }

    async fn chapter_text(&self, request: &ChapterRequest) -> Result<Option<String>, ProviderError> {
        let prompt = prompts::chapter_prompt(
            &request.project_title,
            &request.chapter_title,
            &request.chapter_description,
            &request.tone,
            request.content_type,
        );
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }]
        });
        let response = self.generate_content(&self.config.text_model, body).await?;
        Ok(response.text())
    }

    async fn cover(&self, request: &CoverRequest) -> Result<Option<CoverImage>, ProviderError> {
        let prompt = prompts::cover_prompt(&request.title, &request.topic, request.content_type);
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "responseModalities": ["IMAGE"],
                "imageConfig": { "aspectRatio": "3:4", "imageSize": "1K" }
            }
        });
        let response = self.generate_content(&self.config.image_model, body).await?;
        Ok(response.inline_image())
    }
}

#[async_trait]
impl GenerationClient for LLMClient {
    async fn generate_outline(&self, request: &OutlineRequest) -> Result<Outline, ProviderError> {
        let body = json!({
            "systemInstruction": {
                "parts": [{ "text": prompts::outline_system_instruction(request.content_type) }]
            },
            "contents": [{
                "role": "user",
                "parts": [{
                    "text": prompts::outline_prompt(
                        &request.topic,
                        &request.audience,
                        &request.tone,
                        request.content_type,
                    )
                }]
            }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": prompts::outline_schema()
            }
        });

        let response = self.generate_content(&self.config.text_model, body).await?;
        let text = response
            .text()
            .ok_or_else(|| ProviderError::Malformed("response has no text".to_string()))?;
        parse_outline(&text)
    }

    async fn generate_chapter_body(&self, request: &ChapterRequest) -> ChapterBody {
        match self.chapter_text(request).await {
            Ok(Some(text)) => ChapterBody::Generated(text),
            Ok(None) => ChapterBody::Degraded {
                placeholder: PLACEHOLDER_EMPTY.to_string(),
                cause: "provider returned no text".to_string(),
            },
            Err(e) => {
                warn!(chapter = %request.chapter_title, error = %e, "chapter generation failed");
                ChapterBody::Degraded {
                    placeholder: PLACEHOLDER_FAILED.to_string(),
                    cause: e.to_string(),
                }
            }
        }
    }

    async fn generate_cover_image(&self, request: &CoverRequest) -> Option<CoverImage> {
        match self.cover(request).await {
            Ok(image) => {
                if image.is_none() {
                    debug!(title = %request.title, "cover response carried no image");
                }
                image
            }
            Err(e) => {
                warn!(title = %request.title, error = %e, "cover generation failed");
                None
            }
        }
    }
}

#[async_trait]
impl CredentialProbe for LLMClient {
    async fn is_available(&self) -> bool {
        self.config.api_key.is_some()
    }

    async fn acquire(&self) -> bool {
        // A server has nobody to prompt, so re-probing is all it can do.
        self.is_available().await
    }
}

/// Decodes a structured outline, tolerating a Markdown code fence around the JSON.
pub fn parse_outline(text: &str) -> Result<Outline, ProviderError> {
    static FENCE: OnceLock<Option<Regex>> = OnceLock::new();
    let fence = FENCE.get_or_init(|| Regex::new(r"(?s)^\s*```(?:json)?\s*(.*?)\s*```\s*$").ok());

    let json_text = fence
        .as_ref()
        .and_then(|re| re.captures(text))
        .and_then(|captures| captures.get(1))
        .map_or(text, |m| m.as_str());

    let outline: Outline =
        serde_json::from_str(json_text).map_err(|e| ProviderError::Malformed(e.to_string()))?;

    if outline.title.trim().is_empty() {
        return Err(ProviderError::Malformed("outline has no title".to_string()));
    }
    if outline.chapters.is_empty() {
        return Err(ProviderError::EmptyOutline);
    }
    Ok(outline)
}

#[derive(Debug, Default, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    text: Option<String>,
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: Option<String>,
    data: Option<String>,
}

impl GenerateContentResponse {
    fn parts(&self) -> impl Iterator<Item = &Part> {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .into_iter()
            .flat_map(|content| content.parts.iter())
    }

    /// Concatenated text of the first candidate, if there is any.
    fn text(&self) -> Option<String> {
        let text: String = self.parts().filter_map(|p| p.text.as_deref()).collect();
        if text.trim().is_empty() {
            None
        } else {
            Some(text)
        }
    }

    fn inline_image(&self) -> Option<CoverImage> {
        self.parts().find_map(|part| {
            let inline = part.inline_data.as_ref()?;
            let data = inline.data.as_deref().filter(|d| !d.is_empty())?;
            Some(CoverImage {
                mime_type: inline
                    .mime_type
                    .clone()
                    .unwrap_or_else(|| "image/png".to_string()),
                data: data.to_string(),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_json_outline() {
        let outline = parse_outline(
            r#"{"title":"Verde em Casa","chapters":[{"title":"Luz","description":"Onde pôr as plantas"}]}"#,
        )
        .unwrap();
        assert_eq!(outline.title, "Verde em Casa");
        assert_eq!(outline.chapters.len(), 1);
    }

    #[test]
    fn strips_code_fence() {
        let text = "```json\n{\"title\":\"T\",\"chapters\":[{\"title\":\"A\",\"description\":\"a\"},{\"title\":\"B\",\"description\":\"b\"}]}\n```";
        let outline = parse_outline(text).unwrap();
        let titles: Vec<_> = outline.chapters.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, ["A", "B"]);
    }

    #[test]
    fn empty_chapter_list_is_rejected() {
        let err = parse_outline(r#"{"title":"T","chapters":[]}"#).unwrap_err();
        assert!(matches!(err, ProviderError::EmptyOutline));
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(
            parse_outline("Desculpe, não posso ajudar."),
            Err(ProviderError::Malformed(_))
        ));
        assert!(matches!(
            parse_outline(r#"{"title":" ","chapters":[{"title":"A","description":"a"}]}"#),
            Err(ProviderError::Malformed(_))
        ));
    }

    #[test]
    fn response_text_and_image_extraction() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {
                    "parts": [
                        { "text": "Olá " },
                        { "text": "mundo" },
                        { "inlineData": { "mimeType": "image/jpeg", "data": "" } },
                        { "inlineData": { "mimeType": "image/png", "data": "aGVsbG8=" } }
                    ]
                }
            }]
        }))
        .unwrap();
        assert_eq!(response.text().as_deref(), Some("Olá mundo"));
        let image = response.inline_image().unwrap();
        assert_eq!(image.mime_type, "image/png");
        assert_eq!(image.data, "aGVsbG8=");
    }

    #[test]
    fn empty_response_has_no_text_or_image() {
        let response = GenerateContentResponse::default();
        assert!(response.text().is_none());
        assert!(response.inline_image().is_none());
    }

    #[tokio::test]
    async fn missing_key_degrades_units_and_fails_outline() {
        let client = LLMClient::new(LlmConfig::default());
        assert!(!client.ensure().await);

        let outline = client
            .generate_outline(&OutlineRequest {
                topic: "Jardinagem".into(),
                audience: "iniciantes".into(),
                tone: "Inspirador".into(),
                content_type: ContentType::Ebook,
            })
            .await;
        assert!(matches!(outline, Err(ProviderError::MissingCredential)));

        let body = client
            .generate_chapter_body(&ChapterRequest {
                project_title: "T".into(),
                chapter_title: "C".into(),
                chapter_description: "d".into(),
                tone: "Inspirador".into(),
                content_type: ContentType::Ebook,
            })
            .await;
        assert!(body.is_degraded());
        assert_eq!(body.into_text(), PLACEHOLDER_FAILED);

        let cover = client
            .generate_cover_image(&CoverRequest {
                title: "T".into(),
                topic: "Jardinagem".into(),
                content_type: ContentType::Ebook,
            })
            .await;
        assert!(cover.is_none());
    }
}
