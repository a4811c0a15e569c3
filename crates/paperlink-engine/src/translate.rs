use std::sync::Arc;

use async_trait::async_trait;

use paperlink_core::{AppConfig, LanguageClass};

use crate::backend::{ChatMessage, CompletionRequest, RequestKind};
use crate::error::{EngineError, Result};
use crate::extract::prompt::{
    PROMPT_VERSION, TRANSLATION_SYSTEM, name_romanization_prompt, title_translation_prompt,
};
use crate::fingerprint::Fingerprint;
use crate::gateway::ModelGateway;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextKind {
    Title,
    /// Semicolon-separated personal names, romanized rather than translated.
    PersonNames,
}

impl TextKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::PersonNames => "names",
        }
    }
}

#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str, kind: TextKind, target: LanguageClass) -> Result<String>;
}

/// Translation through the model gateway, so it shares caching and budget
/// with extraction.
pub struct LlmTranslator {
    gateway: Arc<ModelGateway>,
    model: String,
    temperature: f64,
    max_tokens: u32,
}

impl LlmTranslator {
    pub fn new(gateway: Arc<ModelGateway>, model: impl Into<String>, temperature: f64) -> Self {
        Self {
            gateway,
            model: model.into(),
            temperature,
            max_tokens: 256,
        }
    }

    pub fn from_config(gateway: Arc<ModelGateway>, config: &AppConfig) -> Self {
        Self::new(gateway, config.llm.model.clone(), config.llm.temperature)
    }

    pub fn fingerprint(&self, text: &str, kind: TextKind, target: LanguageClass) -> Fingerprint {
        Fingerprint::builder("translate")
            .field("prompt", PROMPT_VERSION)
            .text("source", text)
            .field("kind", kind.as_str())
            .field("target", target)
            .field("model", &self.model)
            .finish()
    }
}

#[async_trait]
impl Translator for LlmTranslator {
    async fn translate(&self, text: &str, kind: TextKind, target: LanguageClass) -> Result<String> {
        let source = text.trim();
        if source.is_empty() {
            return Err(EngineError::TranslationFailed("empty source text".to_string()));
        }
        let target_name = match target {
            LanguageClass::En => "English",
            LanguageClass::Zh => "Chinese",
        };
        let prompt = match kind {
            TextKind::Title => title_translation_prompt(source, target_name),
            TextKind::PersonNames => name_romanization_prompt(source),
        };
        let request = CompletionRequest {
            kind: RequestKind::Translation,
            messages: vec![ChatMessage::system(TRANSLATION_SYSTEM), ChatMessage::user(prompt)],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            json_mode: false,
        };

        let fingerprint = self.fingerprint(source, kind, target);
        let response = self
            .gateway
            .complete(&fingerprint, &request)
            .await
            .map_err(|e| EngineError::TranslationFailed(e.to_string()))?;

        let cleaned = clean_translation(&response.completion.content);
        if cleaned.is_empty() {
            self.gateway.cache().invalidate(&fingerprint).await;
            return Err(EngineError::TranslationFailed("empty translation".to_string()));
        }
        Ok(cleaned)
    }
}

/// Stands in when no model is configured; every call fails.
#[derive(Debug, Default)]
pub struct OfflineTranslator;

#[async_trait]
impl Translator for OfflineTranslator {
    async fn translate(&self, _text: &str, _kind: TextKind, _target: LanguageClass) -> Result<String> {
        Err(EngineError::TranslationFailed(
            "no language model configured".to_string(),
        ))
    }
}

/// First non-empty line, without wrapping quotes or a leading label.
fn clean_translation(reply: &str) -> String {
    let line = reply.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("");
    let line = line
        .strip_prefix("Translation:")
        .or_else(|| line.strip_prefix("English:"))
        .unwrap_or(line)
        .trim();
    line.trim_matches(|c: char| matches!(c, '"' | '\'' | '“' | '”' | '`'))
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditLog;
    use crate::budget::BudgetLimits;
    use crate::gateway::tests::{ScriptedBackend, gateway_with, roomy_limits};
    use std::sync::atomic::Ordering;

    fn translator(backend: Arc<ScriptedBackend>, limits: BudgetLimits) -> LlmTranslator {
        let gateway = gateway_with(backend, limits, Arc::new(MemoryAuditLog::default()));
        LlmTranslator::new(Arc::new(gateway), "test-model", 0.1)
    }

    #[tokio::test]
    async fn translates_and_caches() {
        let backend = Arc::new(ScriptedBackend::replying(
            "\"A Deep-Learning Method for Image Classification\"\n",
        ));
        let translator = translator(backend.clone(), roomy_limits());
        for _ in 0..2 {
            let out = translator
                .translate("基于深度学习的图像分类方法", TextKind::Title, LanguageClass::En)
                .await
                .unwrap();
            assert_eq!(out, "A Deep-Learning Method for Image Classification");
        }
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gateway_errors_become_translation_failures() {
        let backend = Arc::new(ScriptedBackend::replying("x"));
        let limits = BudgetLimits {
            daily_api_calls: 0,
            ..roomy_limits()
        };
        let err = translator(backend, limits)
            .translate("标题", TextKind::Title, LanguageClass::En)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::TranslationFailed(_)));
    }

    #[test]
    fn fingerprint_depends_on_kind_and_target() {
        let backend = Arc::new(ScriptedBackend::replying("x"));
        let t = translator(backend, roomy_limits());
        let a = t.fingerprint("张三", TextKind::Title, LanguageClass::En);
        let b = t.fingerprint("张三", TextKind::PersonNames, LanguageClass::En);
        let c = t.fingerprint("张三", TextKind::Title, LanguageClass::Zh);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn cleans_model_chatter() {
        assert_eq!(clean_translation("Translation: “Graph Networks”"), "Graph Networks");
        assert_eq!(clean_translation("\n\n San Zhang; Si Li \n"), "San Zhang; Si Li");
    }
}
