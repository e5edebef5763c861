use crate::models::ContentType;
use serde_json::{Value, json};

pub fn outline_system_instruction(content_type: ContentType) -> String {
    let speciality = match content_type {
        ContentType::Ebook => "best-sellers",
        ContentType::Course => "cursos online de alto impacto",
    };
    format!(
        "Você é um editor experiente especializado em criar {speciality}. \
         Seu objetivo é estruturar um conteúdo lógico, engajador e completo. \
         O idioma deve ser Português do Brasil."
    )
}

pub fn outline_prompt(topic: &str, audience: &str, tone: &str, content_type: ContentType) -> String {
    format!(
        "Crie uma estrutura detalhada para um {label} sobre o tema: \"{topic}\".\n\
         Público-alvo: {audience}.\n\
         Tom de voz: {tone}.\n\n\
         Retorne um título criativo e uma lista de {units}.\n\
         Para cada item, forneça um título e uma breve descrição do que será abordado.",
        label = content_type.label(),
        units = content_type.unit_name(),
    )
}

/// Response schema the provider must honour for outline calls.
pub fn outline_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "title": {
                "type": "STRING",
                "description": "O título principal e chamativo do projeto."
            },
            "chapters": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "title": { "type": "STRING", "description": "Título do capítulo ou módulo." },
                        "description": { "type": "STRING", "description": "Breve resumo do conteúdo deste capítulo." }
                    },
                    "required": ["title", "description"]
                }
            }
        },
        "required": ["title", "chapters"]
    })
}

pub fn chapter_prompt(
    project_title: &str,
    chapter_title: &str,
    chapter_description: &str,
    tone: &str,
    content_type: ContentType,
) -> String {
    let context = match content_type {
        ContentType::Ebook => "um e-book",
        ContentType::Course => "um curso online",
    };
    let shape = match content_type {
        ContentType::Ebook => "Escreva de forma fluida, como um capítulo de livro.",
        ContentType::Course => "Divida o conteúdo em lições claras.",
    };
    format!(
        "Escreva o conteúdo completo para o capítulo/módulo: \"{chapter_title}\" \
         do projeto \"{project_title}\" ({context}).\n\
         Descrição do capítulo: {chapter_description}.\n\
         Tom de voz: {tone}.\n\n\
         O conteúdo deve ser rico, formatado em Markdown (use títulos, listas, negrito para ênfase).\n\
         {shape}\n\
         Mínimo de 600 palavras."
    )
}

pub fn cover_prompt(title: &str, topic: &str, content_type: ContentType) -> String {
    let kind = match content_type {
        ContentType::Ebook => "book",
        ContentType::Course => "online course",
    };
    format!(
        "A professional, high-quality, minimalist cover design for a {kind} titled \"{title}\".\n\
         Topic: {topic}.\n\
         Style: Modern, clean, vector art or high-end photography, cinematic lighting.\n\
         No text on the image other than the title if possible, but preferably just art.\n\
         Aspect ratio 2:3 (vertical book cover)."
    )
}
