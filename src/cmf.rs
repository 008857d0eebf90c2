//! # CMF material-event scoring
//!
//! Scores "hechos esenciales" (material-event filings published by the CMF)
//! for the digest's market section.
//!
//! - Category by first keyword hit over `"{title} {subject}"`, checked in
//!   priority order CRITICO → IMPORTANTE → MODERADO → RUTINARIO.
//! - Issuer tier: IPSA constituents get a floor of 7.0, other strategic issuers a
//!   small bonus.
//! - Context bonuses for large USD amounts and double-digit result swings.
//! - Investment-fund filings never make the digest.

use serde::{Deserialize, Serialize};
use tracing::info;

/// Minimum score for a filing to be included.
pub const INCLUSION_THRESHOLD: f32 = 7.0;
pub const DEFAULT_MAX_EVENTS: usize = 12;
const MAX_SCORE: f32 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Criticality {
    Critico,
    Importante,
    Moderado,
    Rutinario,
}

impl Criticality {
    pub const ALL: [Criticality; 4] = [
        Criticality::Critico,
        Criticality::Importante,
        Criticality::Moderado,
        Criticality::Rutinario,
    ];

    pub fn weight(self) -> f32 {
        match self {
            Criticality::Critico => 9.0,
            Criticality::Importante => 7.5,
            Criticality::Moderado => 5.5,
            Criticality::Rutinario => 2.0,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Criticality::Critico => "CRITICO",
            Criticality::Importante => "IMPORTANTE",
            Criticality::Moderado => "MODERADO",
            Criticality::Rutinario => "RUTINARIO",
        }
    }

    /// Marker shown next to the filing in the report.
    pub fn icon(self) -> &'static str {
        match self {
            Criticality::Critico => "🔴",
            Criticality::Importante => "🟡",
            Criticality::Moderado => "🟢",
            Criticality::Rutinario => "⚪",
        }
    }

    fn keywords(self) -> &'static [&'static str] {
        match self {
            Criticality::Critico => CRITICO_KEYWORDS,
            Criticality::Importante => IMPORTANTE_KEYWORDS,
            Criticality::Moderado => MODERADO_KEYWORDS,
            Criticality::Rutinario => RUTINARIO_KEYWORDS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialEvent {
    pub title: String,
    #[serde(default)]
    pub subject: String,
    pub entity: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Assessment {
    pub score: f32,
    pub category: Criticality,
    pub is_ipsa: bool,
    pub is_strategic: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredEvent {
    pub event: MaterialEvent,
    pub assessment: Assessment,
}

/// Names match when either contains the other (uppercased, trimmed).
fn listed(entity: &str, list: &[&str]) -> bool {
    let name = entity.trim().to_uppercase();
    if name.is_empty() {
        return false;
    }
    list.iter()
        .any(|e| name.contains(e) || e.contains(name.as_str()))
}

pub fn is_ipsa(entity: &str) -> bool {
    listed(entity, IPSA_ISSUERS)
}

/// IPSA or one of the additional strategic issuers.
pub fn is_strategic(entity: &str) -> bool {
    is_ipsa(entity) || listed(entity, STRATEGIC_ISSUERS)
}

pub fn classify_criticality(title: &str, subject: &str) -> Criticality {
    let text = format!("{title} {subject}").to_lowercase();
    Criticality::ALL
        .into_iter()
        .find(|c| c.keywords().iter().any(|k| text.contains(k)))
        .unwrap_or(Criticality::Rutinario)
}

/// Score one filing. `context` is free text with amounts or impact figures.
pub fn assess(title: &str, subject: &str, entity: &str, context: &str) -> Assessment {
    let category = classify_criticality(title, subject);
    let ipsa = is_ipsa(entity);
    let strategic = ipsa || listed(entity, STRATEGIC_ISSUERS);

    let mut score = category.weight();
    if ipsa {
        score = (score + 2.5).max(INCLUSION_THRESHOLD);
    } else if strategic {
        score += 0.8;
    }

    let ctx = context.to_lowercase();
    let has_any = |words: &[&str]| words.iter().any(|w| ctx.contains(w));
    if has_any(&["millon", "billion", "significativo"]) && has_any(&["usd", "dolares"]) {
        score += 0.5;
    }
    if has_any(&["ebitda", "utilidad", "margen"]) && has_any(&["10%", "20%", "30%", "40%", "50%"]) {
        score += 0.5;
    }

    Assessment {
        score: score.min(MAX_SCORE),
        category,
        is_ipsa: ipsa,
        is_strategic: strategic,
    }
}

pub fn is_fund_filing(ev: &MaterialEvent) -> bool {
    let fields = [
        ev.title.to_lowercase(),
        ev.subject.to_lowercase(),
        ev.entity.to_lowercase(),
    ];
    FUND_KEYWORDS
        .iter()
        .any(|k| fields.iter().any(|f| f.contains(k)))
}

/// Drop fund filings, score the rest, keep those at or above the inclusion
/// threshold, highest first, at most `max_events`.
pub fn filter_material_events(events: Vec<MaterialEvent>, max_events: usize) -> Vec<ScoredEvent> {
    let total = events.len();
    let (funds, rest): (Vec<_>, Vec<_>) = events.into_iter().partition(is_fund_filing);

    let scored: Vec<ScoredEvent> = rest
        .into_iter()
        .map(|ev| {
            let assessment = assess(&ev.title, &ev.subject, &ev.entity, "");
            ScoredEvent { event: ev, assessment }
        })
        .collect();
    let evaluated = scored.len();

    let mut kept: Vec<ScoredEvent> = scored
        .into_iter()
        .filter(|s| s.assessment.score >= INCLUSION_THRESHOLD)
        .collect();
    let above = kept.len();

    kept.sort_by(|a, b| b.assessment.score.total_cmp(&a.assessment.score));
    kept.truncate(max_events);

    info!(
        target: "relevance",
        total,
        funds = funds.len(),
        above_threshold = above,
        below_threshold = evaluated - above,
        selected = kept.len(),
        "cmf material events filtered"
    );
    kept
}

/// Would an institutional investor care? Anything ≥ 7, or ≥ 5 from an IPSA issuer.
pub fn institutional_interest(a: &Assessment) -> bool {
    a.score >= INCLUSION_THRESHOLD || (a.score >= 5.0 && a.is_ipsa)
}

/* ----------------------------
Reference lists
---------------------------- */

// Review twice a year against the IPSA rebalancing.
const IPSA_ISSUERS: &[&str] = &[
    "BANCO DE CHILE",
    "BANCO SANTANDER",
    "BANCO SANTANDER-CHILE",
    "BCI",
    "BANCO CREDITO",
    "BANCO ITAU",
    "ITAU CORPBANCA",
    "SCOTIABANK",
    "CENCOSUD",
    "FALABELLA",
    "RIPLEY",
    "SMU",
    "FORUS",
    "ENEL CHILE",
    "ENEL AMERICAS",
    "COLBUN",
    "ENGIE",
    "AGUAS ANDINAS",
    "SQM",
    "SQM-A",
    "SQM-B",
    "COPEC",
    "CMPC",
    "CAP",
    "MOLIBDENOS",
    "PARQUE ARAUCO",
    "PLAZA",
    "MALL PLAZA",
    "CENCOSUD SHOPPING",
    "ENTEL",
    "WOM",
    "VAPORES",
    "SONDA",
    "CCU",
    "EMBOTELLADORA ANDINA",
    "CONCHA Y TORO",
    "ILC",
    "SECURITY",
    "QUINENCO",
    "ORO BLANCO",
    "BESALCO",
];

const STRATEGIC_ISSUERS: &[&str] = &[
    "LATAM AIRLINES",
    "LAN",
    "LATAM",
    "SKY AIRLINE",
    "JETSMART",
    "CONSORCIO FINANCIERO",
    "GRUPO SECURITY",
    "GRUPO PATIO",
    "GRUPO ANGELINI",
    "GRUPO LUKSIC",
    "HABITAT",
    "CUPRUM",
    "PROVIDA",
    "CAPITAL",
    "MODELO",
    "PLANVITAL",
    "UNO",
    "ENJOY",
    "DREAMS",
    "SUN MONTICELLO",
    "MARINA DEL SOL",
    "SALFACORP",
    "SOCOVESA",
    "INGEVEC",
    "ECHEVERRIA IZQUIERDO",
    "PAZ CORP",
    "MOLLER",
    "ENACO",
    "FUNDAMENTA",
    "ALMAGRO",
    "MANQUEHUE",
    "CRISTALES",
    "CAROZZI",
    "WATTS",
    "MULTIFOODS",
    "AGROSUPER",
    "ARIZTIA",
    "DON POLLO",
    "TRENDY",
    "TUCAPEL",
    "BLUMAR",
    "CAMANCHACA",
    "AUSTRALIS SEAFOODS",
    "MULTIEXPORT",
    "VENTISQUEROS",
    "SALMONES ANTARTICA",
    "AQUACHILE",
    "MASISA",
    "ARAUCO",
    "TRICOT",
    "HITES",
    "LA POLAR",
    "ABCDIN",
    "CORONA",
    "JOHNSON",
    "VTR",
    "MOVISTAR",
    "CLARO",
    "MUNDO",
    "GTDINTERNET",
    "CLINICA LAS CONDES",
    "CLINICA ALEMANA",
    "CLINICA SANTA MARIA",
    "CLINICA DAVILA",
    "REDSALUD",
    "BANMEDICA",
    "CRUZ BLANCA",
    "COLMENA",
    "MASVIDA",
    "VIDA TRES",
    "TRANSBANK",
    "REDBUS",
    "TURBUS",
    "PULLMAN",
    "SOTRASER",
    "PUERTO VENTANAS",
    "PUERTO LIRQUEN",
    "LAUREATE",
    "UNIVERSIDAD ANDRES BELLO",
    "UNIVERSIDAD LAS AMERICAS",
    "DUOC UC",
    "INACAP",
    "ACCIONA",
    "MAINSTREAM",
    "PATTERN ENERGY",
    "AELA ENERGIA",
    "FACTORING SECURITY",
    "TANNER",
    "FORUM",
    "COOPEUCH",
    "CODELCO",
    "METRO",
    "EFE",
    "CORREOS DE CHILE",
];

const CRITICO_KEYWORDS: &[&str] = &[
    // control
    "toma de control",
    "cambio de control",
    "opa",
    "oferta publica de adquisicion",
    "venta de control",
    "controlador",
    "adquisicion de control",
    // M&A
    "fusion",
    "fusión",
    "adquisicion",
    "adquisición",
    "compra de empresa",
    "venta de filial",
    "merger",
    "spin off",
    "division",
    "división",
    "escision",
    "escisión",
    "venta de activos estrategicos",
    "venta de activos estratégicos",
    "constitución de sociedades",
    "constitucion de sociedades",
    // profit warnings
    "profit warning",
    "advertencia de resultados",
    "deterioro significativo",
    "perdida significativa",
    "impacto negativo material",
    "revision a la baja",
    // distress
    "reorganizacion judicial",
    "quiebra",
    "insolvencia",
    "default",
    "incumplimiento de covenant",
    "aceleracion de deuda",
    "cesacion de pagos",
    "reestructuracion de deuda",
    "reestructuracion financiera",
];

const IMPORTANTE_KEYWORDS: &[&str] = &[
    // management
    "renuncia gerente general",
    "renuncia ceo",
    "cambio gerente general",
    "cambio ceo",
    "renuncia cfo",
    "cambio cfo",
    "renuncia presidente",
    "cambio presidente directorio",
    "cambio de administracion",
    "cambio de administración",
    "cambios en la administracion",
    "cambios en la administración",
    "nuevo gerente general",
    "nombra gerente general",
    "designa gerente general",
    "nombramiento gerente",
    "asume como gerente general",
    // share trades
    "compra de acciones",
    "venta de acciones",
    "adquisicion de acciones",
    "adquisición de acciones",
    "enajenacion de acciones",
    "enajenación de acciones",
    "transaccion de acciones",
    "transacción de acciones",
    "compraventa de acciones",
    // investor search
    "busqueda de inversionista",
    "búsqueda de inversionista",
    "busqueda de socio estrategico",
    "búsqueda de socio estratégico",
    "proceso de venta",
    "proceso de búsqueda",
    "inversionista estrategico",
    "inversionista estratégico",
    "socio estrategico",
    "socio estratégico",
    // capital
    "aumento de capital",
    "disminucion de capital",
    "disminución de capital",
    "reduccion de capital",
    "reducción de capital",
    "ampliacion de capital",
    "ampliación de capital",
    // issuances
    "emisión de bonos",
    "emisión de acciones",
    "colocación de bonos",
    "programa de emisión",
    "emisión de deuda",
    "oferta de bonos",
    "oferta pública de bonos",
    "colocación exitosa",
    "colocación de valores",
    "colocación en mercados",
    "colocación internacional",
    "emision de bonos",
    "emision de acciones",
    "colocacion de bonos",
    "programa de emision",
    "emision de deuda",
    "colocacion de valores",
    "colocacion en mercados",
    // contracts
    "contrato material",
    "adjudicacion",
    "licitacion ganada",
    "joint venture",
    "alianza estrategica",
    "contrato significativo",
    "acuerdo comercial relevante",
    "contrato por usd",
    "contrato por uf",
    // investments
    "inversion significativa",
    "adquisicion de activos",
    "compra de propiedad",
    "proyecto de expansion",
    "nueva planta",
    "ampliacion de capacidad",
];

const MODERADO_KEYWORDS: &[&str] = &[
    "fecu",
    "resultados trimestrales",
    "estados financieros",
    "junta de accionistas",
    "junta extraordinaria",
    "citacion a junta",
    "dividendo",
    "reparto de utilidades",
    "politica de dividendos",
    "cambio de director",
    "renuncia de director",
    "nombramiento director",
    "cambio de ejecutivo",
    "modificacion estatutos",
    "reforma estatutos",
];

const RUTINARIO_KEYWORDS: &[&str] = &[
    "cambio de domicilio",
    "cambio de direccion",
    "actualizacion de registro",
    "certificado",
    "inscripcion",
    "comunicacion de hecho",
    "fe de erratas",
    "rectificacion",
    "complemento",
    "aclaracion",
];

const FUND_KEYWORDS: &[&str] = &[
    "fondo",
    "fondos",
    "fund",
    "funds",
    "fip",
    "fia",
    "fondo de inversion",
    "fondo mutuo",
    "mutual fund",
    "investment fund",
    "fondo inmobiliario",
];
