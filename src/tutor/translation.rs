//! 翻译层
//!
//! 默认实现只做标注："[Translated to <Language>]: <text>"；不支持的语言原样返回。
//! 真实翻译后端实现同一个 trait 即可替换。

use async_trait::async_trait;

#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str, language: &str) -> String;
}

/// 支持标注的语言代码 -> 显示名
const SUPPORTED_LANGUAGES: &[(&str, &str)] = &[
    ("es", "Spanish"),
    ("fr", "French"),
    ("de", "German"),
    ("it", "Italian"),
    ("pt", "Portuguese"),
    ("zh", "Chinese"),
    ("ja", "Japanese"),
    ("ko", "Korean"),
    ("ar", "Arabic"),
    ("hi", "Hindi"),
    ("ru", "Russian"),
];

/// 语言代码对应的显示名（大小写不敏感，忽略地区后缀，如 "pt-BR"）
pub fn language_name(code: &str) -> Option<&'static str> {
    let base = code
        .split(['-', '_'])
        .next()
        .unwrap_or(code)
        .to_lowercase();
    SUPPORTED_LANGUAGES
        .iter()
        .find(|(c, _)| *c == base)
        .map(|(_, name)| *name)
}

pub fn is_english(code: &str) -> bool {
    code.trim().is_empty() || code.to_lowercase().starts_with("en")
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PlaceholderTranslator;

#[async_trait]
impl Translator for PlaceholderTranslator {
    async fn translate(&self, text: &str, language: &str) -> String {
        if is_english(language) {
            return text.to_string();
        }
        match language_name(language) {
            Some(name) => format!("[Translated to {name}]: {text}"),
            None => text.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_english_passthrough() {
        let t = PlaceholderTranslator;
        assert_eq!(t.translate("hello", "en").await, "hello");
        assert_eq!(t.translate("hello", "en-US").await, "hello");
    }

    #[tokio::test]
    async fn test_supported_language_annotated() {
        let t = PlaceholderTranslator;
        assert_eq!(t.translate("hello", "es").await, "[Translated to Spanish]: hello");
        assert_eq!(t.translate("hello", "pt-BR").await, "[Translated to Portuguese]: hello");
    }

    #[tokio::test]
    async fn test_unsupported_language_passthrough() {
        let t = PlaceholderTranslator;
        assert_eq!(t.translate("hello", "tlh").await, "hello");
    }
}
