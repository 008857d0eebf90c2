// src/relevance/llm.rs
//! LLM-assisted relevance classification with rule fallback.
//!
//! The model is asked for exactly two lines:
//!
//! ```text
//! RELEVANTE: [SÍ/NO]
//! RAZÓN: [one line]
//! ```
//!
//! Any failure (transport, timeout, HTTP status, decode, malformed reply) is
//! logged and answered by the rule table instead, so callers always get a
//! `ClassificationResult`.

use std::sync::Arc;

use metrics::counter;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use super::rules::RuleTable;
use super::{anon_hash, take_chars, ClassificationResult};
use crate::llm::{CompletionRequest, DynCompletionClient, LlmError};

pub const VERDICT_MARKER: &str = "RELEVANTE:";
pub const VERDICT_YES: &str = "RELEVANTE: SÍ";
pub const REASON_MARKER: &str = "RAZÓN:";

/// Excerpts shorter than this carry no useful signal (usually a stray header).
pub const MIN_EXCERPT_CHARS: usize = 100;
pub const PROMPT_EXCERPT_CHARS: usize = 2000;
const REASON_MAX_CHARS: usize = 300;

pub const DEFAULT_TEMPERATURE: f32 = 0.3;
pub const DEFAULT_MAX_TOKENS: u32 = 150;

const SYSTEM_PROMPT: &str = "Eres un experto en análisis de normativas chilenas.";

pub struct LlmClassifier {
    client: DynCompletionClient,
    model: String,
    temperature: f32,
    max_tokens: u32,
    rules: Arc<RuleTable>,
}

impl LlmClassifier {
    pub fn new(client: DynCompletionClient, model: impl Into<String>, rules: Arc<RuleTable>) -> Self {
        Self {
            client,
            model: model.into(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            rules,
        }
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    pub fn provider_name(&self) -> &'static str {
        self.client.provider_name()
    }

    /// Never fails: on any error the rule table answers.
    pub async fn classify(&self, title: &str, body_excerpt: Option<&str>) -> ClassificationResult {
        counter!("relevance_llm_requests_total").increment(1);
        match self.try_classify(title, body_excerpt).await {
            Ok(res) => {
                debug!(
                    target: "relevance",
                    id = %anon_hash(title),
                    provider = self.client.provider_name(),
                    relevant = res.is_relevant,
                    "llm verdict"
                );
                res
            }
            Err(e) => {
                counter!("relevance_llm_fallbacks_total", "cause" => fallback_cause(&e))
                    .increment(1);
                warn!(
                    target: "relevance",
                    id = %anon_hash(title),
                    provider = self.client.provider_name(),
                    error = %e,
                    "llm classification failed; using rules"
                );
                self.rules.classify(title)
            }
        }
    }

    async fn try_classify(
        &self,
        title: &str,
        body_excerpt: Option<&str>,
    ) -> Result<ClassificationResult, LlmError> {
        let req = CompletionRequest {
            system: SYSTEM_PROMPT.to_string(),
            prompt: build_prompt(title, body_excerpt),
            model: self.model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };
        let reply = self.client.complete(&req).await?;
        parse_reply(&reply, self.client.provider_name())
    }
}

fn fallback_cause(e: &LlmError) -> &'static str {
    match e {
        LlmError::MissingApiKey => "missing_key",
        LlmError::Timeout => "timeout",
        LlmError::Transport(_) => "transport",
        LlmError::Status { .. } => "status",
        LlmError::Decode(_) => "decode",
        LlmError::EmptyCompletion | LlmError::MalformedReply(_) => "reply",
    }
}

/// User prompt: criteria taxonomy, the title, and (when long enough) the head
/// of the document.
pub fn build_prompt(title: &str, body_excerpt: Option<&str>) -> String {
    let mut context = format!("Título: {title}");
    if let Some(text) = body_excerpt {
        if text.chars().count() > MIN_EXCERPT_CHARS {
            context.push_str("\n\nPrimeras líneas del documento:\n");
            context.push_str(take_chars(text, PROMPT_EXCERPT_CHARS));
        }
    }

    format!(
        "Evalúa si la siguiente publicación del Diario Oficial es relevante para un informe diario \
leído por empresas y ciudadanos.

Es RELEVANTE si tiene alcance nacional o afecta a varias regiones, impacta a un sector económico \
completo o a muchas empresas, y además cumple alguno de estos puntos:
1. Crea o modifica leyes, decretos supremos o políticas públicas importantes
2. Establece procedimientos o requisitos de cumplimiento obligatorio
3. Modifica de forma significativa tarifas, precios o impuestos (no ajustes rutinarios)
4. Establece medidas de emergencia nacionales
5. Define estrategias nacionales de desarrollo
6. Abre procesos de consulta ciudadana nacional
7. Convoca licitaciones públicas de gran envergadura (más de 1000 UF)
8. Actualiza o establece programas de regulación ambiental o normas de emisión
9. Define o modifica estándares ambientales
10. Es emitida por el SII (Servicio de Impuestos Internos): siempre relevante
11. Es emitida por la CMF y afecta a empresas IPSA o mercados regulados

NO es relevante si:
1. Es un nombramiento o designación individual
2. Es una rectificación o fe de erratas
3. Afecta solo a una persona, empresa o localidad
4. Es un permiso o concesión individual
5. Es de alcance muy local o específico
6. Es un ajuste rutinario de precios (combustibles, kerosene)
7. Es una medida fitosanitaria local o regional
8. Afecta solo a beneficiarios de un programa específico
9. Es una resolución limitada a una región o comuna

{context}

Responde SOLO con:
{VERDICT_MARKER} [SÍ/NO]
{REASON_MARKER} [Explicación en una línea]"
    )
}

static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex"));
// Same marker as REASON_MARKER, matched in any case like the verdict.
static RE_REASON: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)RAZÓN:").expect("reason regex"));

/// Parse the two-line reply. The verdict is "yes" only on the exact
/// `RELEVANTE: SÍ` marker; the reason is whatever follows the last `RAZÓN:`,
/// collapsed to one line. Both markers match in any letter case.
pub fn parse_reply(reply: &str, provider: &str) -> Result<ClassificationResult, LlmError> {
    let trimmed = reply.trim();
    if trimmed.is_empty() {
        return Err(LlmError::EmptyCompletion);
    }

    let upper = trimmed.to_uppercase();
    if !upper.contains(VERDICT_MARKER) && !upper.contains(REASON_MARKER) {
        return Err(LlmError::MalformedReply(take_chars(trimmed, 80).to_string()));
    }

    let is_relevant = upper.contains(VERDICT_YES);

    let reason = RE_REASON
        .find_iter(trimmed)
        .last()
        .map(|m| one_line(&trimmed[m.end()..]))
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| format!("Evaluado por {provider}"));

    Ok(ClassificationResult {
        is_relevant,
        reason,
    })
}

fn one_line(s: &str) -> String {
    let collapsed = RE_WS.replace_all(s.trim(), " ");
    take_chars(&collapsed, REASON_MAX_CHARS).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockCompletion;
    use crate::relevance::classify_by_rules;

    fn classifier(mock: MockCompletion) -> LlmClassifier {
        LlmClassifier::new(Arc::new(mock), "gpt-4o-mini", Arc::new(RuleTable::builtin()))
    }

    #[test]
    fn parse_yes_with_reason() {
        let r = parse_reply(
            "RELEVANTE: SÍ\nRAZÓN: Modifica el Código Tributario con alcance nacional",
            "OpenAI",
        )
        .unwrap();
        assert!(r.is_relevant);
        assert_eq!(r.reason, "Modifica el Código Tributario con alcance nacional");
    }

    #[test]
    fn parse_no_and_multiline_reason_collapses() {
        let r = parse_reply("RELEVANTE: NO\nRAZÓN:   Nombramiento\n  individual  ", "OpenAI").unwrap();
        assert!(!r.is_relevant);
        assert_eq!(r.reason, "Nombramiento individual");
    }

    #[test]
    fn parse_missing_reason_uses_placeholder() {
        let r = parse_reply("RELEVANTE: SÍ", "OpenAI").unwrap();
        assert!(r.is_relevant);
        assert_eq!(r.reason, "Evaluado por OpenAI");

        let r = parse_reply("RELEVANTE: NO\nRAZÓN:", "mock").unwrap();
        assert_eq!(r.reason, "Evaluado por mock");
    }

    #[test]
    fn parse_lowercase_reply_keeps_reason() {
        let r = parse_reply("relevante: sí\nrazón: Cambia el IVA a nivel nacional", "OpenAI").unwrap();
        assert!(r.is_relevant);
        assert_eq!(r.reason, "Cambia el IVA a nivel nacional");

        let r = parse_reply("Relevante: No\nRazón: Alcance comunal", "OpenAI").unwrap();
        assert!(!r.is_relevant);
        assert_eq!(r.reason, "Alcance comunal");
    }

    #[test]
    fn parse_uses_last_reason_marker() {
        let r = parse_reply("RAZÓN: borrador\nRELEVANTE: SÍ\nRAZÓN: definitiva", "x").unwrap();
        assert_eq!(r.reason, "definitiva");
    }

    #[test]
    fn parse_rejects_unstructured_text() {
        assert_eq!(parse_reply("   ", "x"), Err(LlmError::EmptyCompletion));
        assert!(matches!(
            parse_reply("Creo que sí es relevante.", "x"),
            Err(LlmError::MalformedReply(_))
        ));
    }

    #[test]
    fn prompt_includes_excerpt_only_when_long_enough() {
        let short = build_prompt("LEY N° 21.000", Some("corto"));
        assert!(short.contains("Título: LEY N° 21.000"));
        assert!(!short.contains("Primeras líneas"));

        let long_text = "Á".repeat(2500);
        let long = build_prompt("LEY N° 21.000", Some(&long_text));
        assert!(long.contains("Primeras líneas del documento"));
        assert_eq!(long.matches('Á').count(), PROMPT_EXCERPT_CHARS);
        assert!(long.ends_with("RAZÓN: [Explicación en una línea]"));
    }

    #[tokio::test]
    async fn llm_verdict_is_used_when_reply_is_valid() {
        let c = classifier(MockCompletion::replying(
            "RELEVANTE: NO\nRAZÓN: Afecta solo a una comuna",
        ));
        // The rules would accept this title; the model's verdict wins.
        let r = c.classify("CIRCULAR SII SOBRE DECLARACIÓN DE IMPUESTOS", None).await;
        assert_eq!(r, ClassificationResult::not_relevant("Afecta solo a una comuna"));
    }

    #[tokio::test]
    async fn failures_fall_back_to_rules() {
        let title = "MODIFICA LEY N° 19.496 SOBRE PROTECCIÓN AL CONSUMIDOR";
        for err in [
            LlmError::Timeout,
            LlmError::Transport("connection refused".into()),
            LlmError::Status {
                status: 500,
                body: "boom".into(),
            },
        ] {
            let r = classifier(MockCompletion::failing(err)).classify(title, None).await;
            assert_eq!(r, classify_by_rules(title));
        }

        let r = classifier(MockCompletion::replying("no sé"))
            .classify(title, None)
            .await;
        assert_eq!(r, classify_by_rules(title));
    }
}
