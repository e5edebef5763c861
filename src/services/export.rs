use crate::models::{CoverImage, Project};
use anyhow::{Context, Result, anyhow};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use epub_builder::{EpubBuilder, EpubContent, ReferenceType, ZipLibrary};
use regex::Regex;
use std::sync::OnceLock;
use tracing::warn;

pub const SECTION_DELIMITER: &str = "---";

/// Markdown rendering of the whole project. Pure; same project, same bytes.
pub fn to_markdown(project: &Project) -> String {
    let mut content = format!("# {}\n\n", project.title);
    for chapter in &project.chapters {
        content.push_str(&format!(
            "## {}\n\n{}\n\n{}\n\n",
            chapter.title,
            chapter.content.as_deref().unwrap_or_default(),
            SECTION_DELIMITER
        ));
    }
    content
}

fn epub_err<E: std::fmt::Display>(e: E) -> anyhow::Error {
    anyhow!("epub: {e}")
}

pub fn to_epub(project: &Project) -> Result<Vec<u8>> {
    let mut builder = EpubBuilder::new(ZipLibrary::new().map_err(epub_err)?).map_err(epub_err)?;
    builder
        .metadata("title", project.title.as_str())
        .map_err(epub_err)?;
    builder.metadata("lang", "pt-BR").map_err(epub_err)?;

    if let Some(cover) = &project.cover_image {
        match STANDARD.decode(&cover.data) {
            Ok(bytes) => {
                builder
                    .add_cover_image(
                        format!("cover.{}", image_extension(cover)),
                        bytes.as_slice(),
                        cover.mime_type.as_str(),
                    )
                    .map_err(epub_err)?;
            }
            Err(e) => warn!(project_id = %project.id, error = %e, "skipping undecodable cover"),
        }
    }

    for (index, chapter) in project.chapters.iter().enumerate() {
        let xhtml = chapter_xhtml(
            &chapter.title,
            chapter.content.as_deref().unwrap_or_default(),
        );
        builder
            .add_content(
                EpubContent::new(format!("chapter_{}.xhtml", index + 1), xhtml.as_bytes())
                    .title(chapter.title.as_str())
                    .reftype(ReferenceType::Text),
            )
            .map_err(epub_err)?;
    }
    builder.inline_toc();

    let mut out = Vec::new();
    builder
        .generate(&mut out)
        .map_err(epub_err)
        .context("failed to assemble epub")?;
    Ok(out)
}

fn image_extension(cover: &CoverImage) -> &'static str {
    match cover.mime_type.as_str() {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        _ => "png",
    }
}

fn chapter_xhtml(title: &str, markdown: &str) -> String {
    let mut body = format!("<h2>{}</h2>\n", html_escape::encode_text(title));
    for block in markdown.split("\n\n").map(str::trim).filter(|b| !b.is_empty()) {
        let hashes = block.chars().take_while(|&c| c == '#').count();
        if hashes > 0 && block.lines().count() == 1 {
            let level = (hashes + 2).min(6);
            let text = inline_markup(block[hashes..].trim());
            body.push_str(&format!("<h{level}>{text}</h{level}>\n"));
        } else {
            let text = block
                .lines()
                .map(|line| inline_markup(line.trim()))
                .collect::<Vec<_>>()
                .join("<br/>\n");
            body.push_str(&format!("<p>{text}</p>\n"));
        }
    }

    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <html xmlns=\"http://www.w3.org/1999/xhtml\" xmlns:epub=\"http://www.idpf.org/2007/ops\">\n\
         <head><title>{}</title></head>\n<body>\n{}</body>\n</html>\n",
        html_escape::encode_text(title),
        body
    )
}

/// Escapes text and turns `**bold**` into `<strong>`.
fn inline_markup(text: &str) -> String {
    static BOLD: OnceLock<Option<Regex>> = OnceLock::new();
    let escaped = html_escape::encode_text(text);
    match BOLD.get_or_init(|| Regex::new(r"\*\*(.+?)\*\*").ok()) {
        Some(re) => re.replace_all(&escaped, "<strong>$1</strong>").into_owned(),
        None => escaped.into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Chapter, ContentType, OutlineEntry};
    use uuid::Uuid;

    fn finished_project() -> Project {
        let mut project = Project::empty(Uuid::new_v4(), ContentType::Ebook);
        project.title = "Verde em Casa".into();
        project.topic = "Guia de jardinagem".into();
        project.chapters = ["Luz", "Rega"]
            .into_iter()
            .map(|title| {
                let mut chapter = Chapter::from_outline(OutlineEntry {
                    title: title.into(),
                    description: String::new(),
                });
                chapter.content = Some(format!("Texto sobre {title}."));
                chapter
            })
            .collect();
        project
    }

    #[test]
    fn markdown_layout() {
        let markdown = to_markdown(&finished_project());
        assert_eq!(
            markdown,
            "# Verde em Casa\n\n\
             ## Luz\n\nTexto sobre Luz.\n\n---\n\n\
             ## Rega\n\nTexto sobre Rega.\n\n---\n\n"
        );
    }

    #[test]
    fn markdown_is_stable() {
        let project = finished_project();
        assert_eq!(to_markdown(&project), to_markdown(&project));
    }

    #[test]
    fn xhtml_escapes_and_marks_up() {
        let xhtml = chapter_xhtml("Solo & Adubo", "# Introdução\n\nUse **pouca** água <sempre>.");
        assert!(xhtml.contains("<h2>Solo &amp; Adubo</h2>"));
        assert!(xhtml.contains("<h3>Introdução</h3>"));
        assert!(xhtml.contains("<p>Use <strong>pouca</strong> água &lt;sempre&gt;.</p>"));
    }

    #[test]
    fn epub_is_a_zip_archive() {
        let mut project = finished_project();
        project.cover_image = Some(CoverImage {
            mime_type: "image/png".into(),
            data: STANDARD.encode([0x89, b'P', b'N', b'G']),
        });
        let bytes = to_epub(&project).unwrap();
        assert!(bytes.starts_with(b"PK"));
    }
}
