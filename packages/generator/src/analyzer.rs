// ABOUTME: Request analysis picking an advisory domain template and API patterns
// ABOUTME: Keyword scoring over the description combined with caller preferences

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Cross-cutting API pattern the generator can weave into an artifact
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Pattern {
    Pagination,
    Authentication,
    ErrorHandling,
}

impl Pattern {
    pub const ALL: [Pattern; 3] = [
        Pattern::Pagination,
        Pattern::Authentication,
        Pattern::ErrorHandling,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pagination => "pagination",
            Self::Authentication => "authentication",
            Self::ErrorHandling => "error-handling",
        }
    }

    fn keywords(&self) -> &'static [&'static str] {
        match self {
            Self::Pagination => &[
                "paginat*", "page", "cursor", "offset", "infinite scroll", "large collection",
            ],
            Self::Authentication => &[
                "auth", "authenticat*", "authoriz*", "login", "log in", "sign in", "signup",
                "sign up", "jwt", "oauth", "token", "api key", "permission", "password",
                "credential", "secur*",
            ],
            Self::ErrorHandling => &[
                "error", "validat*", "robust", "retry", "fault", "resilien*", "failure",
            ],
        }
    }

    /// Prompt guidance for including this pattern
    pub fn guidance(&self) -> &'static str {
        match self {
            Self::Pagination => {
                "Paginate collection endpoints with limit and cursor query parameters and return a next cursor"
            }
            Self::Authentication => {
                "Define a bearer token security scheme in components.securitySchemes and apply it to protected operations"
            }
            Self::ErrorHandling => {
                "Define a reusable Error schema and document 400, 404 and 500 responses that use it"
            }
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Domain templates scored against the description, in tie-break order.
///
/// Words that double as generic verbs ("store", "order", "tag") are left out.
const TEMPLATES: &[(&str, &[&str])] = &[
    (
        "ecommerce",
        &[
            "shop", "storefront", "cart", "checkout", "product", "catalog", "ecommerce",
            "e commerce", "inventory",
        ],
    ),
    (
        "social",
        &["social", "follow", "friend", "feed", "like", "comment", "profile", "share"],
    ),
    (
        "blog",
        &["blog", "article", "post", "cms", "author", "publish*"],
    ),
    (
        "booking",
        &[
            "booking", "reservation", "appointment", "schedul*", "availability", "calendar",
            "slot",
        ],
    ),
    (
        "fintech",
        &[
            "bank", "transaction", "wallet", "ledger", "transfer", "invoice", "payment", "balance",
        ],
    ),
];

/// Caller preferences steering analysis and the pipeline
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerationPreferences {
    /// Include patterns whose keywords appear in the description
    pub auto_detect_patterns: bool,
    pub include_patterns: BTreeSet<Pattern>,
    pub exclude_patterns: BTreeSet<Pattern>,
    /// Pause for approval after the diff in modify mode
    pub require_diff_approval: bool,
    /// Free-form notes passed to the prompt
    pub notes: BTreeMap<String, String>,
}

impl Default for GenerationPreferences {
    fn default() -> Self {
        Self {
            auto_detect_patterns: true,
            include_patterns: BTreeSet::new(),
            exclude_patterns: BTreeSet::new(),
            require_diff_approval: false,
            notes: BTreeMap::new(),
        }
    }
}

impl GenerationPreferences {
    /// Flatten into the string record kept on the conversation context
    pub fn to_entries(&self) -> BTreeMap<String, String> {
        let join = |set: &BTreeSet<Pattern>| {
            set.iter()
                .map(Pattern::as_str)
                .collect::<Vec<_>>()
                .join(",")
        };

        let mut entries = self.notes.clone();
        entries.insert(
            "autoDetectPatterns".to_string(),
            self.auto_detect_patterns.to_string(),
        );
        entries.insert(
            "requireDiffApproval".to_string(),
            self.require_diff_approval.to_string(),
        );
        if !self.include_patterns.is_empty() {
            entries.insert("includePatterns".to_string(), join(&self.include_patterns));
        }
        if !self.exclude_patterns.is_empty() {
            entries.insert("excludePatterns".to_string(), join(&self.exclude_patterns));
        }
        entries
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TemplateMatch {
    pub name: String,
    pub matched_keywords: Vec<String>,
    pub from_hint: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatternDecision {
    pub pattern: Pattern,
    pub include: bool,
    pub rationale: String,
}

/// One decision surfaced on the informational question event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Decision {
    pub topic: String,
    pub choice: String,
    pub rationale: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Analysis {
    pub template: Option<TemplateMatch>,
    pub patterns: Vec<PatternDecision>,
}

impl Analysis {
    pub fn included_patterns(&self) -> Vec<Pattern> {
        self.patterns
            .iter()
            .filter(|d| d.include)
            .map(|d| d.pattern)
            .collect()
    }

    pub fn decisions(&self) -> Vec<Decision> {
        let mut decisions = Vec::new();

        if let Some(template) = &self.template {
            let rationale = if template.from_hint {
                "requested by the caller".to_string()
            } else {
                format!(
                    "description mentions {}",
                    quote_all(&template.matched_keywords)
                )
            };
            decisions.push(Decision {
                topic: "template".to_string(),
                choice: template.name.clone(),
                rationale,
            });
        }

        for decision in &self.patterns {
            decisions.push(Decision {
                topic: decision.pattern.to_string(),
                choice: if decision.include { "include" } else { "exclude" }.to_string(),
                rationale: decision.rationale.clone(),
            });
        }

        decisions
    }
}

fn quote_all(words: &[String]) -> String {
    words
        .iter()
        .map(|w| format!("'{}'", w))
        .collect::<Vec<_>>()
        .join(", ")
}

struct Tokens {
    words: Vec<String>,
    normalized: String,
}

impl Tokens {
    fn new(text: &str) -> Self {
        let words: Vec<String> = text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_string)
            .collect();
        let normalized = words.join(" ");
        Self { words, normalized }
    }

    /// Phrases match whole-word sequences. A keyword ending in `*` is a
    /// stem matching any word it begins; other keywords match the word
    /// itself or its plural.
    fn matches(&self, keyword: &str) -> bool {
        if keyword.contains(' ') {
            format!(" {} ", self.normalized).contains(&format!(" {} ", keyword))
        } else if let Some(stem) = keyword.strip_suffix('*') {
            self.words.iter().any(|w| w.starts_with(stem))
        } else {
            self.words.iter().any(|w| is_word_or_plural(w, keyword))
        }
    }

    /// Matching keywords, stem markers stripped
    fn matched<'k>(&self, keywords: &[&'k str]) -> Vec<&'k str> {
        keywords
            .iter()
            .copied()
            .filter(|k| self.matches(k))
            .map(|k| k.trim_end_matches('*'))
            .collect()
    }
}

fn is_word_or_plural(word: &str, keyword: &str) -> bool {
    match word.strip_prefix(keyword) {
        Some("") | Some("s") | Some("es") => true,
        _ => keyword
            .strip_suffix('y')
            .and_then(|base| word.strip_prefix(base))
            == Some("ies"),
    }
}

/// Analyze a description under the given preferences
pub fn analyze(
    description: &str,
    template_hint: Option<&str>,
    preferences: &GenerationPreferences,
) -> Analysis {
    let tokens = Tokens::new(description);

    let template = match template_hint.map(str::trim).filter(|h| !h.is_empty()) {
        Some(hint) => Some(TemplateMatch {
            name: hint.to_lowercase(),
            matched_keywords: Vec::new(),
            from_hint: true,
        }),
        None => best_template(&tokens),
    };

    let patterns = Pattern::ALL
        .iter()
        .filter_map(|pattern| decide_pattern(*pattern, &tokens, preferences))
        .collect();

    Analysis { template, patterns }
}

fn best_template(tokens: &Tokens) -> Option<TemplateMatch> {
    let mut best: Option<(&str, Vec<&str>)> = None;
    for &(name, keywords) in TEMPLATES {
        let matched = tokens.matched(keywords);
        let better = match &best {
            Some((_, current)) => matched.len() > current.len(),
            None => !matched.is_empty(),
        };
        if better {
            best = Some((name, matched));
        }
    }

    best.map(|(name, matched)| TemplateMatch {
        name: name.to_string(),
        matched_keywords: matched.into_iter().map(str::to_string).collect(),
        from_hint: false,
    })
}

fn decide_pattern(
    pattern: Pattern,
    tokens: &Tokens,
    preferences: &GenerationPreferences,
) -> Option<PatternDecision> {
    if preferences.exclude_patterns.contains(&pattern) {
        return Some(PatternDecision {
            pattern,
            include: false,
            rationale: "excluded by caller preferences".to_string(),
        });
    }
    if preferences.include_patterns.contains(&pattern) {
        return Some(PatternDecision {
            pattern,
            include: true,
            rationale: "requested by caller preferences".to_string(),
        });
    }

    let matched = tokens.matched(pattern.keywords());
    if matched.is_empty() {
        return None;
    }

    let mentions = quote_all(&matched.iter().map(|s| s.to_string()).collect::<Vec<_>>());
    Some(if preferences.auto_detect_patterns {
        PatternDecision {
            pattern,
            include: true,
            rationale: format!("description mentions {}", mentions),
        }
    } else {
        PatternDecision {
            pattern,
            include: false,
            rationale: format!(
                "description mentions {} but automatic pattern detection is off",
                mentions
            ),
        }
    })
}
