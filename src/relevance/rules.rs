// src/relevance/rules.rs
//! Deterministic relevance rules over a document title.
//!
//! The rule set is plain data: an ordered list of tagged records
//! `{ kind: exclude | include, keywords, reason, vetoes }`. One generic matcher
//! walks it in two passes:
//!
//! 1. every `exclude` rule, in order: first keyword hit rejects the title with the
//!    rule's reason, unless a veto fires (seniority markers such as "MINISTRO"),
//!    in which case only that rule is skipped and the pass continues;
//! 2. every `include` rule, in order: first keyword hit accepts, unless a veto
//!    fires (extracts, municipal or sub-national scope), in which case scanning
//!    continues with the next rule;
//! 3. the "LEY + verb" fallback;
//! 4. the default rejection.
//!
//! Matching is substring-based on the uppercased title. Order is significant:
//! the first rule that matches and survives its vetoes wins.

use std::fs;
use std::path::Path;

use anyhow::Context;
use once_cell::sync::Lazy;
use serde::Deserialize;
use tracing::debug;

use super::{anon_hash, ClassificationResult};

pub const DEFAULT_REASON: &str = "No cumple criterios de relevancia general";
pub const LAW_FALLBACK_REASON: &str = "Ley que establece cambios importantes";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    Exclude,
    Include,
}

/// Skips a matched rule when any `when_any` phrase is present and none of
/// `unless_any` is. An empty `unless_any` means the veto always applies.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Veto {
    pub when_any: Vec<String>,
    #[serde(default)]
    pub unless_any: Vec<String>,
}

impl Veto {
    fn fires(&self, upper: &str) -> bool {
        contains_any(upper, &self.when_any) && !contains_any(upper, &self.unless_any)
    }
}

/// A veto shared by every rule of one kind.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct KindVeto {
    pub applies_to: RuleKind,
    #[serde(flatten)]
    pub veto: Veto,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Rule {
    pub kind: RuleKind,
    pub keywords: Vec<String>,
    pub reason: String,
    #[serde(default)]
    pub vetoes: Vec<Veto>,
}

/// "Standalone word + any verb" heuristic tried after the include pass.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Fallback {
    pub word: String,
    pub with_any: Vec<String>,
    pub reason: String,
}

fn default_reason() -> String {
    DEFAULT_REASON.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RuleTable {
    #[serde(default)]
    pub rules: Vec<Rule>,
    #[serde(default)]
    pub vetoes: Vec<KindVeto>,
    #[serde(default)]
    pub fallback: Option<Fallback>,
    #[serde(default = "default_reason")]
    pub default_reason: String,
}

static BUILTIN: Lazy<RuleTable> = Lazy::new(RuleTable::builtin);

/// Classify a title with the built-in rule table. Pure and infallible.
pub fn classify_by_rules(title: &str) -> ClassificationResult {
    BUILTIN.classify(title)
}

impl RuleTable {
    /// Evaluate `title` against the table.
    pub fn classify(&self, title: &str) -> ClassificationResult {
        let upper = title.to_uppercase();

        if let Some(rule) = self.first_match(RuleKind::Exclude, &upper) {
            debug!(target: "relevance", id = %anon_hash(title), reason = %rule.reason, "excluded by rule");
            return ClassificationResult::not_relevant(rule.reason.clone());
        }

        if let Some(rule) = self.first_match(RuleKind::Include, &upper) {
            debug!(target: "relevance", id = %anon_hash(title), reason = %rule.reason, "included by rule");
            return ClassificationResult::relevant(rule.reason.clone());
        }

        if let Some(fb) = &self.fallback {
            if upper.contains(fb.word.as_str()) && contains_any(&upper, &fb.with_any) {
                debug!(target: "relevance", id = %anon_hash(title), "included by law fallback");
                return ClassificationResult::relevant(fb.reason.clone());
            }
        }

        ClassificationResult::not_relevant(self.default_reason.clone())
    }

    /// Generic matcher: first rule of `kind` (in table order) whose keywords hit
    /// and whose vetoes all stay silent.
    fn first_match(&self, kind: RuleKind, upper: &str) -> Option<&Rule> {
        self.rules
            .iter()
            .filter(|r| r.kind == kind)
            .filter(|r| contains_any(upper, &r.keywords))
            .find(|r| !self.vetoed(r, upper))
    }

    fn vetoed(&self, rule: &Rule, upper: &str) -> bool {
        rule.vetoes.iter().any(|v| v.fires(upper))
            || self
                .vetoes
                .iter()
                .filter(|kv| kv.applies_to == rule.kind)
                .any(|kv| kv.veto.fires(upper))
    }

    pub fn rules_of(&self, kind: RuleKind) -> impl Iterator<Item = &Rule> {
        self.rules.iter().filter(move |r| r.kind == kind)
    }

    /// Parse a table from TOML. Phrases are uppercased so files can be written
    /// in any case.
    pub fn from_toml_str(toml_str: &str) -> anyhow::Result<Self> {
        let mut table: RuleTable = toml::from_str(toml_str)?;
        for (i, rule) in table.rules.iter().enumerate() {
            if rule.keywords.iter().all(|k| k.trim().is_empty()) {
                anyhow::bail!("rule #{i} (`{}`) has no keywords", rule.reason);
            }
        }
        table.normalize();
        Ok(table)
    }

    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading rule table from {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("parsing rule table at {}", path.display()))
    }

    fn normalize(&mut self) {
        fn upper_all(v: &mut [String]) {
            for s in v.iter_mut() {
                *s = s.to_uppercase();
            }
        }
        fn upper_veto(v: &mut Veto) {
            upper_all(&mut v.when_any);
            upper_all(&mut v.unless_any);
        }
        for r in &mut self.rules {
            upper_all(&mut r.keywords);
            r.keywords.retain(|k| !k.trim().is_empty());
            r.vetoes.iter_mut().for_each(upper_veto);
        }
        for kv in &mut self.vetoes {
            upper_veto(&mut kv.veto);
        }
        if let Some(fb) = &mut self.fallback {
            fb.word = fb.word.to_uppercase();
            upper_all(&mut fb.with_any);
        }
    }

    /// The rule set used by the daily Diario Oficial report.
    pub fn builtin() -> Self {
        let mut rules = Vec::with_capacity(EXCLUSIONS.len() + INCLUSIONS.len());
        for (phrase, reason) in EXCLUSIONS {
            rules.push(Rule {
                kind: RuleKind::Exclude,
                keywords: vec![(*phrase).to_string()],
                reason: (*reason).to_string(),
                vetoes: Vec::new(),
            });
        }
        for (keywords, reason) in INCLUSIONS {
            rules.push(Rule {
                kind: RuleKind::Include,
                keywords: strings(keywords),
                reason: (*reason).to_string(),
                vetoes: Vec::new(),
            });
        }

        let vetoes = vec![
            KindVeto {
                applies_to: RuleKind::Exclude,
                veto: Veto {
                    when_any: strings(SENIORITY_MARKERS),
                    unless_any: Vec::new(),
                },
            },
            // Extracts only matter when they announce a tender.
            KindVeto {
                applies_to: RuleKind::Include,
                veto: Veto {
                    when_any: strings(&["EXTRACTO"]),
                    unless_any: strings(&["LICITACIÓN"]),
                },
            },
            KindVeto {
                applies_to: RuleKind::Include,
                veto: Veto {
                    when_any: strings(&["MUNICIPALIDAD DE", "COMUNA DE"]),
                    unless_any: strings(&["CREACIÓN", "APRUEBA PLAN"]),
                },
            },
            KindVeto {
                applies_to: RuleKind::Include,
                veto: Veto {
                    when_any: strings(SUBNATIONAL_MARKERS),
                    unless_any: strings(&["EMERGENCIA", "CREACIÓN", "ESTADO DE"]),
                },
            },
        ];

        Self {
            rules,
            vetoes,
            fallback: Some(Fallback {
                word: " LEY ".to_string(),
                with_any: strings(&["MODIFICA", "ESTABLECE", "CREA"]),
                reason: LAW_FALLBACK_REASON.to_string(),
            }),
            default_reason: DEFAULT_REASON.to_string(),
        }
    }
}

impl Default for RuleTable {
    fn default() -> Self {
        Self::builtin()
    }
}

fn contains_any(upper: &str, phrases: &[String]) -> bool {
    phrases.iter().any(|p| upper.contains(p.as_str()))
}

fn strings(v: &[&str]) -> Vec<String> {
    v.iter().map(|s| (*s).to_string()).collect()
}

/* ----------------------------
Built-in table
---------------------------- */

const SENIORITY_MARKERS: &[&str] = &[
    "MINISTRO",
    "SUBSECRETARIO",
    "DIRECTOR NACIONAL",
    "DEFENSOR NACIONAL",
];

const SUBNATIONAL_MARKERS: &[&str] = &[
    "REGIÓN",
    "REGIONAL",
    "COMUNA",
    "COMUNAL",
    "PROVINCIA",
    "PROVINCIAL",
];

const EXCLUSIONS: &[(&str, &str)] = &[
    ("NOMBRA A DON", "Nombramiento individual"),
    ("NOMBRA A DOÑA", "Nombramiento individual"),
    ("DESIGNA A", "Designación individual"),
    ("ACEPTA RENUNCIA", "Renuncia individual"),
    ("RECTIFICA", "Rectificación menor"),
    ("FE DE ERRATAS", "Corrección menor"),
    ("OTORGA CONCESIÓN", "Concesión individual"),
    ("OTORGA PERMISO", "Permiso individual"),
    ("AUTORIZA A", "Autorización individual"),
    (
        "FIJA PRECIOS DE REFERENCIA Y PARIDAD PARA KEROSENE",
        "Ajuste rutinario de precios",
    ),
    (
        "FIJA PRECIOS DE PARIDAD PARA COMBUSTIBLES",
        "Ajuste rutinario de precios",
    ),
    ("MOSCA DEL MEDITERRÁNEO", "Medida fitosanitaria local"),
    ("REGULACIONES CUARENTENARIAS", "Medida fitosanitaria local"),
    (
        "BONOS DE INCENTIVO AL RETIRO",
        "Beneficio para grupo específico",
    ),
    (
        "TRABAJADORES(AS) BENEFICIARIOS(AS)",
        "Afecta solo a beneficiarios específicos",
    ),
    (
        "CONCURSO PÚBLICO PARA PROVEER CARGO",
        "Concurso para cargo público",
    ),
    (
        "LLAMADO A CONCURSO PÚBLICO PARA PROVEER CARGO",
        "Concurso para cargo público",
    ),
    (
        "CARGO DE TERCER NIVEL JERÁRQUICO",
        "Concurso para cargo público",
    ),
    ("PROVEER CARGO", "Concurso para cargo público"),
];

// Legal amendments sit ahead of the generic "LEY N°" rule so an amending law is
// reported as an amendment rather than as a plain top-level norm.
const INCLUSIONS: &[(&[&str], &str)] = &[
    (
        &[
            "LICITACIÓN PÚBLICA",
            "BASES DE LICITACIÓN",
            "LLAMADO A LICITACIÓN",
            "LLAMA A LICITACIÓN",
            "CONCURSO PÚBLICO PARA LA ASIGNACIÓN",
            "PROYECTO HABILITACIÓN",
        ],
        "Proceso de contratación pública",
    ),
    (
        &["EMERGENCIA NACIONAL", "ESTADO DE CATÁSTROFE", "ESTADO DE EXCEPCIÓN"],
        "Situación de emergencia nacional",
    ),
    (
        &["MANUAL DE PROCEDIMIENTOS NACIONAL", "ESTABLECE PROCEDIMIENTO GENERAL"],
        "Establece nuevos procedimientos generales",
    ),
    (
        &["ESTRATEGIA NACIONAL", "CONSULTA CIUDADANA NACIONAL", "PLAN NACIONAL"],
        "Proceso estratégico nacional",
    ),
    (
        &["FIJA TARIFAS ELÉCTRICAS", "FÓRMULAS TARIFARIAS", "PRECIOS DE NUDO"],
        "Fijación de tarifas de servicios básicos",
    ),
    (
        &["MODIFICA LEY", "MODIFICA CÓDIGO"],
        "Modificación legal importante",
    ),
    (
        &["LEY NÚM", "LEY N°", "DECRETO SUPREMO N°"],
        "Norma de alto nivel",
    ),
    (&["CREACIÓN DE", "CREA NUEVO"], "Creación institucional"),
    (
        &["POLÍTICA NACIONAL", "PLAN NACIONAL", "PROGRAMA NACIONAL"],
        "Política pública nacional",
    ),
    (
        &[
            "TIPO DE CAMBIO",
            "VALOR DE LA UF",
            "VALOR DEL DÓLAR",
            "MODIFICA IMPUESTO",
        ],
        "Medida económica de impacto general",
    ),
    (
        &[
            "SUBSIDIO",
            "CRÉDITOS HIPOTECARIOS",
            "VIVIENDAS NUEVAS",
            "TASA DE INTERÉS",
        ],
        "Subsidio habitacional o medida de vivienda",
    ),
    (
        &[
            "ESTÁNDAR TÉCNICO",
            "PROGRAMA DE HABITABILIDAD",
            "CONSTRUCCIONES RURALES",
            "VIVIENDAS INDUSTRIALIZADAS",
        ],
        "Normativa técnica de construcción",
    ),
    (
        &[
            "SERVICIOS DE TELECOMUNICACIONES",
            "PROYECTO HABILITACIÓN",
            "FONDO DE DESARROLLO",
            "SERVICIOS PÚBLICOS",
            "INFRAESTRUCTURA",
        ],
        "Proyecto de infraestructura o servicios públicos",
    ),
    (
        &["TIPOS DE CAMBIO", "PARIDADES DE MONEDAS"],
        "Información cambiaria",
    ),
    (
        &[
            "PROGRAMA DE REGULACIÓN AMBIENTAL",
            "NORMAS DE EMISIÓN",
            "NORMAS DE CALIDAD AMBIENTAL",
            "PLANES DE DESCONTAMINACIÓN",
            "EVALUACIÓN AMBIENTAL",
            "IMPACTO AMBIENTAL",
            "ESTÁNDARES AMBIENTALES",
            "REGULACIÓN AMBIENTAL",
        ],
        "Regulación o programa ambiental",
    ),
    (
        &[
            "SERVICIO DE IMPUESTOS INTERNOS",
            "SII",
            "DIRECTOR NACIONAL DEL SERVICIO DE IMPUESTOS",
            "CIRCULAR SII",
            "RESOLUCIÓN SII",
            "OFICIO SII",
            "TRIBUTARIO",
            "TRIBUTARIA",
            "CÓDIGO TRIBUTARIO",
            "IMPUESTO A LA RENTA",
            "IVA",
            "FACTURA ELECTRÓNICA",
            "DOCUMENTOS TRIBUTARIOS",
            "FISCALIZACIÓN TRIBUTARIA",
            "CONTRIBUYENTES",
            "DECLARACIÓN DE IMPUESTOS",
            "DEVOLUCIÓN DE IMPUESTOS",
            "CONDONACIÓN",
            "NORMAS TRIBUTARIAS",
            "INTERPRETACIÓN TRIBUTARIA",
        ],
        "Normativa tributaria del SII",
    ),
    (
        &[
            "COMISIÓN PARA EL MERCADO FINANCIERO",
            "CMF",
            "SUPERINTENDENCIA DE VALORES",
            "SUPERINTENDENCIA DE BANCOS",
            "SUPERINTENDENCIA DE PENSIONES",
            "AFP",
            "BOLSA DE COMERCIO",
            "BOLSA DE VALORES",
            "OFERTA PÚBLICA",
            "EMISIÓN DE BONOS",
            "VALORES DE OFERTA PÚBLICA",
            "SOCIEDADES ANÓNIMAS ABIERTAS",
            "IPSA",
            "MERCADO DE VALORES",
            "MERCADO FINANCIERO",
            "INSTITUCIONES FINANCIERAS",
            "COMPAÑÍAS DE SEGUROS",
            "ADMINISTRADORAS DE FONDOS",
        ],
        "Regulación del mercado financiero (CMF)",
    ),
];

/* ----------------------------
Tests
---------------------------- */

#[cfg(test)]
mod tests {
    use super::*;

    const OVERRIDE_TOML: &str = r#"
default_reason = "Fuera de alcance"

[[rules]]
kind = "exclude"
keywords = ["fe de erratas"]
reason = "Corrección"

[[rules]]
kind = "include"
keywords = ["norma de emisión"]
reason = "Ambiental"
vetoes = [{ when_any = ["extracto"] }]

[[vetoes]]
applies_to = "exclude"
when_any = ["ministro"]

[fallback]
word = " decreto "
with_any = ["fija"]
reason = "Decreto general"
"#;

    #[test]
    fn builtin_table_keeps_pass_order() {
        let t = RuleTable::builtin();
        let first_excl = t.rules_of(RuleKind::Exclude).next().unwrap();
        assert_eq!(first_excl.keywords, vec!["NOMBRA A DON".to_string()]);
        let reasons: Vec<_> = t.rules_of(RuleKind::Include).map(|r| r.reason.as_str()).collect();
        assert_eq!(reasons.first(), Some(&"Proceso de contratación pública"));
        assert_eq!(reasons.last(), Some(&"Regulación del mercado financiero (CMF)"));
        let amend = reasons.iter().position(|r| *r == "Modificación legal importante");
        let norm = reasons.iter().position(|r| *r == "Norma de alto nivel");
        assert!(amend < norm);
    }

    #[test]
    fn lowercase_titles_are_normalized() {
        let r = classify_by_rules("fe de erratas del decreto 12");
        assert_eq!(r, ClassificationResult::not_relevant("Corrección menor"));
    }

    #[test]
    fn empty_title_is_not_relevant() {
        assert_eq!(
            classify_by_rules(""),
            ClassificationResult::not_relevant(DEFAULT_REASON)
        );
    }

    #[test]
    fn seniority_skips_every_exclusion_then_includes() {
        // "DESIGNA A" would exclude, but "SUBSECRETARIO" vetoes it; the tax rule then accepts.
        let r = classify_by_rules("DESIGNA A SUBSECRETARIO DE HACIENDA PARA MATERIAS DE IVA");
        assert_eq!(r, ClassificationResult::relevant("Normativa tributaria del SII"));
    }

    #[test]
    fn extract_veto_allows_tender_extracts() {
        let r = classify_by_rules("EXTRACTO LLAMADO A LICITACIÓN OBRAS VIALES");
        assert_eq!(r, ClassificationResult::relevant("Proceso de contratación pública"));

        let r = classify_by_rules("EXTRACTO DE RESOLUCIÓN SOBRE SUBSIDIO");
        assert_eq!(r, ClassificationResult::not_relevant(DEFAULT_REASON));
    }

    #[test]
    fn municipal_veto_lets_plan_approvals_through() {
        let r = classify_by_rules("MUNICIPALIDAD DE LAS CONDES OTORGA SUBSIDIO");
        assert!(!r.is_relevant);
        // "APRUEBA PLAN" clears the municipal veto.
        let r = classify_by_rules("MUNICIPALIDAD DE PROVIDENCIA APRUEBA PLAN DE INFRAESTRUCTURA");
        assert_eq!(
            r,
            ClassificationResult::relevant("Proyecto de infraestructura o servicios públicos")
        );
    }

    #[test]
    fn subnational_veto_yields_to_emergency() {
        let r = classify_by_rules("DECLARA ESTADO DE CATÁSTROFE EN LA REGIÓN DE VALPARAÍSO");
        assert_eq!(r, ClassificationResult::relevant("Situación de emergencia nacional"));
    }

    #[test]
    fn law_fallback_needs_spaced_word_and_verb() {
        let r = classify_by_rules("PROYECTO QUE MODIFICA LA LEY DE PESCA");
        assert_eq!(r, ClassificationResult::relevant(LAW_FALLBACK_REASON));

        // No verb alongside " LEY ".
        let r = classify_by_rules("PUBLICA LA LEY DE PRESUPUESTOS");
        assert!(!r.is_relevant);
    }

    #[test]
    fn override_table_from_toml() {
        let t = RuleTable::from_toml_str(OVERRIDE_TOML).expect("parse override");
        assert_eq!(t.rules[0].keywords, vec!["FE DE ERRATAS".to_string()]);

        assert_eq!(
            t.classify("Fe de erratas"),
            ClassificationResult::not_relevant("Corrección")
        );
        assert_eq!(
            t.classify("Fe de erratas del Ministro"),
            ClassificationResult::not_relevant("Fuera de alcance")
        );
        assert_eq!(
            t.classify("Nueva norma de emisión"),
            ClassificationResult::relevant("Ambiental")
        );
        assert_eq!(
            t.classify("Extracto norma de emisión"),
            ClassificationResult::not_relevant("Fuera de alcance")
        );
        assert_eq!(
            t.classify("El decreto fija plazos"),
            ClassificationResult::relevant("Decreto general")
        );
    }

    #[test]
    fn override_rejects_rules_without_keywords() {
        let bad = r#"
[[rules]]
kind = "include"
keywords = ["  "]
reason = "vacía"
"#;
        assert!(RuleTable::from_toml_str(bad).is_err());
    }
}
