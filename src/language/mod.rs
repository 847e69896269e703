//! Language Module - bilingual relevance gating and query expansion
//!
//! Decides whether a query is within the internal-audit domain before any
//! paid embedding or generation call is made. The gate is deliberately
//! keyword-based: two static dictionaries map each canonical domain concept
//! to its Arabic dialect variants or English synonyms, the query is
//! normalized by folding every variant onto its canonical form, and a query
//! is in-domain iff at least one canonical concept survives in the
//! normalized text. Precision over recall - off-topic queries stop here.

use std::sync::OnceLock;

use regex::Regex;

// ============================================================================
// Concept Dictionaries
// ============================================================================

// Static data, not code: extending coverage to a new dialect or synonym is a
// table edit. Entry order matters - earlier entries fold their variants first.

/// Arabic concepts with dialect and colloquial variants.
const ARABIC_VARIANTS: &[(&str, &[&str])] = &[
    ("تدقيق", &["تدقيق", "مراجعة", "فحص", "كشف", "تفتيش", "مراقبة"]),
    ("مراجعة", &["مراجعة", "تدقيق", "فحص", "كشف", "تفتيش", "مراقبة"]),
    ("داخلي", &["داخلي", "محلي", "ذاتي"]),
    ("مدقق", &["مدقق", "مراجع", "مفتش", "كاشف", "متابع"]),
    ("مراجع", &["مراجع", "مدقق", "مفتش", "كاشف", "متابع"]),
    ("مخاطر", &["مخاطر", "أخطار", "تهديدات", "مشاكل", "مشكلات"]),
    ("ضوابط", &["ضوابط", "إجراءات", "قواعد", "أنظمة", "سياسات"]),
    ("سياسات", &["سياسات", "ضوابط", "إجراءات", "قواعد", "أنظمة"]),
    ("إجراءات", &["إجراءات", "ضوابط", "سياسات", "قواعد", "أنظمة"]),
    ("امتثال", &["امتثال", "التزام", "طاعة", "اتباع", "متابعة"]),
    ("حوكمة", &["حوكمة", "إدارة", "قيادة", "توجيه", "إشراف"]),
    ("أداء", &["أداء", "كفاءة", "فعالية", "إنتاجية", "جودة"]),
    ("كفاءة", &["كفاءة", "أداء", "فعالية", "إنتاجية", "جودة"]),
    ("فعالية", &["فعالية", "أداء", "كفاءة", "إنتاجية", "جودة"]),
    ("جودة", &["جودة", "أداء", "كفاءة", "فعالية", "إنتاجية"]),
    ("معايير", &["معايير", "قواعد", "أصول", "مبادئ", "أسس"]),
    ("تقارير", &["تقارير"]),
    ("توصيات", &["توصيات", "نصائح", "إرشادات", "توجيهات", "اقتراحات"]),
    ("متابعة", &["متابعة", "مراقبة", "تتبع", "إشراف", "رقابة"]),
    ("تخطيط", &["تخطيط", "برمجة", "تنظيم", "ترتيب", "إعداد"]),
    ("تنفيذ", &["تنفيذ", "تطبيق", "إنجاز", "عمل", "ممارسة"]),
    ("إبلاغ", &["إبلاغ", "إخبار", "إعلام", "إشعار", "إعلان"]),
    ("مراقبة", &["مراقبة", "متابعة", "إشراف", "رقابة", "تتبع"]),
    ("تحليل", &["تحليل", "دراسة", "فحص", "بحث", "استقصاء"]),
    ("فحص", &["فحص", "تدقيق", "مراجعة", "كشف", "تفتيش"]),
    ("اختبار", &["اختبار", "تجربة", "فحص", "كشف", "تقييم"]),
    ("تقييم", &["تقييم"]),
    ("قياس", &["قياس", "تقييم", "تحديد", "حساب", "إحصاء"]),
    ("مؤشرات", &["مؤشرات", "دلائل", "علامات", "إشارات", "أدلة"]),
];

/// English concepts with synonyms.
const ENGLISH_VARIANTS: &[(&str, &[&str])] = &[
    (
        "audit",
        &["audit", "review", "examination", "inspection", "assessment", "evaluation"],
    ),
    ("internal", &["internal", "domestic", "in-house", "within", "inside"]),
    ("review", &["review", "audit", "examination", "inspection", "assessment"]),
    ("auditor", &["auditor", "reviewer", "examiner", "inspector", "assessor"]),
    ("risk", &["risk", "hazard", "threat", "danger", "peril"]),
    ("control", &["control", "regulation", "rule", "procedure", "policy"]),
    ("policy", &["policy", "procedure", "rule", "regulation", "guideline"]),
    ("procedure", &["procedure", "process", "method", "technique", "approach"]),
    (
        "compliance",
        &["compliance", "adherence", "conformity", "observance", "obedience"],
    ),
    (
        "governance",
        &["governance", "management", "administration", "oversight", "supervision"],
    ),
    (
        "performance",
        &["performance", "efficiency", "effectiveness", "productivity", "quality"],
    ),
    (
        "efficiency",
        &["efficiency", "performance", "effectiveness", "productivity", "quality"],
    ),
    (
        "effectiveness",
        &["effectiveness", "performance", "efficiency", "productivity", "quality"],
    ),
    (
        "quality",
        &["quality", "performance", "efficiency", "effectiveness", "productivity"],
    ),
    ("standard", &["standard", "criterion", "benchmark", "norm", "requirement"]),
    ("report", &["report", "document", "statement", "summary", "analysis"]),
    (
        "recommendation",
        &["recommendation", "suggestion", "advice", "guidance", "proposal"],
    ),
    ("planning", &["planning", "scheduling", "organizing", "arranging", "preparing"]),
    (
        "execution",
        &["execution", "implementation", "performance", "carrying out", "conducting"],
    ),
    (
        "monitoring",
        &["monitoring", "tracking", "supervision", "oversight", "surveillance"],
    ),
    ("analysis", &["analysis", "examination", "study", "investigation", "research"]),
    ("testing", &["testing", "examination", "evaluation", "assessment", "trial"]),
    ("evaluation", &["evaluation", "assessment", "appraisal", "review", "analysis"]),
    (
        "measurement",
        &["measurement", "assessment", "evaluation", "calculation", "quantification"],
    ),
    ("kpi", &["kpi", "key performance indicator", "metric", "measure", "indicator"]),
];

/// Core terms appended to a query that matched no concept, to widen retrieval
/// recall across both languages.
const EXPANSION_TERMS: &[&str] = &[
    "تدقيق", "مراجعة", "داخلي", "مدقق", "مراجع", "audit", "internal", "review", "auditor",
    "reviewer",
];

/// One canonical concept with its compiled variant matcher.
struct ConceptEntry {
    canonical: &'static str,
    variants: Regex,
}

/// Both dictionaries compiled once, in table order.
fn dictionary() -> &'static [ConceptEntry] {
    static DICT: OnceLock<Vec<ConceptEntry>> = OnceLock::new();
    DICT.get_or_init(|| {
        ARABIC_VARIANTS
            .iter()
            .chain(ENGLISH_VARIANTS.iter())
            .map(|(canonical, variants)| {
                let alternation = variants
                    .iter()
                    .map(|v| regex::escape(v))
                    .collect::<Vec<_>>()
                    .join("|");
                // \b is Unicode-aware, so Arabic word edges match too.
                let pattern = format!(r"\b(?:{alternation})\b");
                ConceptEntry {
                    canonical,
                    variants: Regex::new(&pattern).expect("static dictionary pattern"),
                }
            })
            .collect()
    })
}

// ============================================================================
// Types
// ============================================================================

/// Script classification of a query. Informational only; never affects the
/// gate decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Arabic,
    English,
    Mixed,
    Unknown,
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Language::Arabic => "arabic",
            Language::English => "english",
            Language::Mixed => "mixed",
            Language::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// The Relevance Gate's view of one query. Derived purely from the query
/// string and the static dictionaries; no state outlives the request.
#[derive(Debug, Clone)]
pub struct ConceptAnalysis {
    pub original: String,
    pub normalized: String,
    pub language: Language,
    /// Canonical concepts found in the normalized query, in dictionary order.
    pub concepts: Vec<String>,
    pub is_audit_related: bool,
}

/// How the query was prepared for retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchStrategy {
    /// The query already carried domain concepts; passed through unchanged.
    ConceptBased,
    /// No concepts found; core domain terms appended to widen recall.
    Expanded,
}

impl std::fmt::Display for SearchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchStrategy::ConceptBased => f.write_str("concept-based"),
            SearchStrategy::Expanded => f.write_str("expanded"),
        }
    }
}

/// A query prepared for retrieval, with the analysis that shaped it.
#[derive(Debug, Clone)]
pub struct ExpandedQuery {
    pub analysis: ConceptAnalysis,
    pub enhanced_query: String,
    pub strategy: SearchStrategy,
}

impl ExpandedQuery {
    /// Expansion widens retrieval but does not itself satisfy the gate.
    pub fn is_audit_related(&self) -> bool {
        self.analysis.is_audit_related
    }
}

// ============================================================================
// Normalization & Detection
// ============================================================================

/// Lower-case the query and fold every whole-word dictionary variant onto its
/// canonical concept, both languages, in table order.
pub fn normalize(text: &str) -> String {
    let mut normalized = text.to_lowercase().trim().to_string();
    for entry in dictionary() {
        if entry.variants.is_match(&normalized) {
            normalized = entry
                .variants
                .replace_all(&normalized, entry.canonical)
                .into_owned();
        }
    }
    normalized
}

fn is_arabic_char(c: char) -> bool {
    matches!(
        c,
        '\u{0600}'..='\u{06FF}'
            | '\u{0750}'..='\u{077F}'
            | '\u{08A0}'..='\u{08FF}'
            | '\u{FB50}'..='\u{FDFF}'
            | '\u{FE70}'..='\u{FEFF}'
    )
}

/// Character-class language detection.
pub fn detect_language(text: &str) -> Language {
    let has_arabic = text.chars().any(is_arabic_char);
    let has_english = text.chars().any(|c| c.is_ascii_alphabetic());

    match (has_arabic, has_english) {
        (true, true) => Language::Mixed,
        (true, false) => Language::Arabic,
        (false, true) => Language::English,
        (false, false) => Language::Unknown,
    }
}

/// Canonical concepts present in the normalized text, as substrings, scanned
/// across both dictionaries in table order.
pub fn extract_concepts(normalized: &str) -> Vec<String> {
    dictionary()
        .iter()
        .filter(|entry| normalized.contains(entry.canonical))
        .map(|entry| entry.canonical.to_string())
        .collect()
}

// ============================================================================
// Relevance Gate
// ============================================================================

/// Analyze one query against the concept dictionaries.
pub fn analyze(query: &str) -> ConceptAnalysis {
    let language = detect_language(query);
    let normalized = normalize(query);
    let concepts = extract_concepts(&normalized);
    let is_audit_related = !concepts.is_empty();

    ConceptAnalysis {
        original: query.to_string(),
        normalized,
        language,
        concepts,
        is_audit_related,
    }
}

// ============================================================================
// Query Expander
// ============================================================================

/// Prepare a query for retrieval.
///
/// A query that matched no concept gets the bilingual core terms appended so
/// retrieval still has something to bite on; the gate outcome is unchanged.
/// A concept-matched query passes through untouched.
pub fn expand(query: &str) -> ExpandedQuery {
    let analysis = analyze(query);

    if analysis.concepts.is_empty() {
        let enhanced_query = format!("{} {}", query, EXPANSION_TERMS.join(" "));
        return ExpandedQuery {
            analysis,
            enhanced_query,
            strategy: SearchStrategy::Expanded,
        };
    }

    ExpandedQuery {
        enhanced_query: query.to_string(),
        analysis,
        strategy: SearchStrategy::ConceptBased,
    }
}

// ============================================================================
// Tests
// ============================================================================
