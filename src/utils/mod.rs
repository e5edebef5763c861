use regex::Regex;
use std::sync::OnceLock;

const FALLBACK_NAME: &str = "projeto";

/// Download file name for a project title: whitespace runs become `_`, anything
/// that is not ASCII alphanumeric, `_` or `-` is dropped so the name is safe in
/// a `Content-Disposition` header.
pub fn export_file_name(title: &str, extension: &str) -> String {
    static WHITESPACE: OnceLock<Option<Regex>> = OnceLock::new();
    let trimmed = title.trim();
    let underscored = match WHITESPACE.get_or_init(|| Regex::new(r"\s+").ok()) {
        Some(re) => re.replace_all(trimmed, "_").into_owned(),
        None => trimmed.replace(' ', "_"),
    };
    let stem: String = underscored
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    let stem = if stem.trim_matches('_').is_empty() {
        FALLBACK_NAME
    } else {
        stem.as_str()
    };
    format!("{stem}.{extension}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_becomes_underscores() {
        assert_eq!(export_file_name("Verde em  Casa", "md"), "Verde_em_Casa.md");
    }

    #[test]
    fn non_ascii_is_dropped() {
        assert_eq!(
            export_file_name("Jardinagem: Ação & Prática", "epub"),
            "Jardinagem_Ao__Prtica.epub"
        );
    }

    #[test]
    fn empty_title_falls_back() {
        assert_eq!(export_file_name("  ", "md"), "projeto.md");
        assert_eq!(export_file_name("¿¡", "md"), "projeto.md");
    }
}
