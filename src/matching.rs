use crate::catalog::EntityKind;
use crate::error::EngineError;

use async_trait::async_trait;
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Matching strategies, stored as integer codes for database compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum MatchAlgorithm {
    None,
    Any,
    All,
    Exact,
    Regex,
    Fuzzy,
    Auto,
}

impl TryFrom<u8> for MatchAlgorithm {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(MatchAlgorithm::None),
            1 => Ok(MatchAlgorithm::Any),
            2 => Ok(MatchAlgorithm::All),
            3 => Ok(MatchAlgorithm::Exact),
            4 => Ok(MatchAlgorithm::Regex),
            5 => Ok(MatchAlgorithm::Fuzzy),
            6 => Ok(MatchAlgorithm::Auto),
            other => Err(format!("unknown matching_algorithm code: {other}")),
        }
    }
}

impl From<MatchAlgorithm> for u8 {
    fn from(algorithm: MatchAlgorithm) -> u8 {
        match algorithm {
            MatchAlgorithm::None => 0,
            MatchAlgorithm::Any => 1,
            MatchAlgorithm::All => 2,
            MatchAlgorithm::Exact => 3,
            MatchAlgorithm::Regex => 4,
            MatchAlgorithm::Fuzzy => 5,
            MatchAlgorithm::Auto => 6,
        }
    }
}

/// One matching rule as configured on a tag, correspondent, document type,
/// storage path, or workflow trigger. Field names follow the persisted
/// column names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRule {
    #[serde(rename = "match", default)]
    pub pattern: String,
    #[serde(rename = "matching_algorithm", default = "MatchAlgorithm::none")]
    pub algorithm: MatchAlgorithm,
    #[serde(rename = "is_insensitive", default = "default_true")]
    pub case_insensitive: bool,
}

fn default_true() -> bool {
    true
}

impl MatchAlgorithm {
    fn none() -> Self {
        MatchAlgorithm::None
    }
}

impl Default for MatchRule {
    fn default() -> Self {
        MatchRule::disabled()
    }
}

impl MatchRule {
    pub fn new(pattern: &str, algorithm: MatchAlgorithm) -> Self {
        MatchRule {
            pattern: pattern.to_string(),
            algorithm,
            case_insensitive: true,
        }
    }

    /// A rule that can never match; the default for catalog entities.
    pub fn disabled() -> Self {
        MatchRule {
            pattern: String::new(),
            algorithm: MatchAlgorithm::None,
            case_insensitive: true,
        }
    }

    pub fn is_enabled(&self) -> bool {
        match self.algorithm {
            MatchAlgorithm::None => false,
            // Auto needs no pattern; the classifier supplies the signal.
            MatchAlgorithm::Auto => true,
            _ => !self.pattern.trim().is_empty(),
        }
    }
}

/// Result of evaluating one rule against one text.
///
/// Deterministic algorithms are boolean-valued; a match normalizes to
/// confidence 1.0 so Auto confidences rank against them directly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchOutcome {
    pub matched: bool,
    pub confidence: f32,
}

impl MatchOutcome {
    pub const NO_MATCH: MatchOutcome = MatchOutcome {
        matched: false,
        confidence: 0.0,
    };

    fn hit() -> Self {
        MatchOutcome {
            matched: true,
            confidence: 1.0,
        }
    }

    fn boolean(matched: bool) -> Self {
        if matched {
            Self::hit()
        } else {
            Self::NO_MATCH
        }
    }
}

/// Candidate returned by the external auto classifier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredCandidate {
    pub entity_id: i64,
    pub confidence: f32,
}

/// Boundary to the external ML/AI classifier. The engine never scores
/// documents itself; it only applies the acceptance threshold and a
/// timeout to whatever implementation is injected.
#[async_trait]
pub trait AutoScorer: Send + Sync {
    async fn score(&self, field: EntityKind, text: &str) -> Option<ScoredCandidate>;
}

/// Edit-distance budget per fuzzy term: max(1, floor(len * ratio)).
pub const FUZZY_DISTANCE_RATIO: f64 = 0.2;

const DEFAULT_AUTO_THRESHOLD: f32 = 0.5;
const DEFAULT_AUTO_TIMEOUT_SECS: u64 = 10;

/// Evaluates match rules against document text.
///
/// Deterministic algorithms are pure; `Auto` delegates to the injected
/// [`AutoScorer`] under a timeout. Compiled regexes are cached across
/// evaluations since catalogs routinely reuse the same patterns.
pub struct MatchEvaluator {
    auto_scorer: Option<Arc<dyn AutoScorer>>,
    auto_threshold: f32,
    auto_timeout: Duration,
    compiled_patterns: Mutex<HashMap<(String, bool), regex::Regex>>,
}

impl Default for MatchEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl MatchEvaluator {
    pub fn new() -> Self {
        MatchEvaluator {
            auto_scorer: None,
            auto_threshold: DEFAULT_AUTO_THRESHOLD,
            auto_timeout: Duration::from_secs(DEFAULT_AUTO_TIMEOUT_SECS),
            compiled_patterns: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_auto_scorer(mut self, scorer: Arc<dyn AutoScorer>) -> Self {
        self.auto_scorer = Some(scorer);
        self
    }

    pub fn with_auto_threshold(mut self, threshold: f32) -> Self {
        self.auto_threshold = threshold;
        self
    }

    pub fn with_auto_timeout(mut self, timeout: Duration) -> Self {
        self.auto_timeout = timeout;
        self
    }

    /// Evaluate a deterministic rule against text.
    ///
    /// `Auto` rules yield no match here; callers that carry an entity
    /// identity go through [`MatchEvaluator::evaluate_for`] instead.
    /// An invalid regex is an error so the caller can surface it, but it
    /// always means "no match".
    pub fn evaluate(&self, rule: &MatchRule, text: &str) -> Result<MatchOutcome, EngineError> {
        if !rule.is_enabled() || text.is_empty() {
            return Ok(MatchOutcome::NO_MATCH);
        }

        let (text_cmp, pattern_cmp) = if rule.case_insensitive {
            (text.to_lowercase(), rule.pattern.trim().to_lowercase())
        } else {
            (text.to_string(), rule.pattern.trim().to_string())
        };

        match rule.algorithm {
            MatchAlgorithm::None => Ok(MatchOutcome::NO_MATCH),
            MatchAlgorithm::Any => Ok(MatchOutcome::boolean(
                split_terms(&pattern_cmp)
                    .iter()
                    .any(|term| text_cmp.contains(term)),
            )),
            MatchAlgorithm::All => {
                let terms = split_terms(&pattern_cmp);
                Ok(MatchOutcome::boolean(
                    !terms.is_empty() && terms.iter().all(|term| text_cmp.contains(term)),
                ))
            }
            MatchAlgorithm::Exact => Ok(MatchOutcome::boolean(text_cmp.contains(&pattern_cmp))),
            // Compile with a case-insensitive flag instead of folding, so
            // user-supplied character classes keep their meaning.
            MatchAlgorithm::Regex => {
                let regex = self.compiled_regex(rule.pattern.trim(), rule.case_insensitive)?;
                Ok(MatchOutcome::boolean(regex.is_match(text)))
            }
            MatchAlgorithm::Fuzzy => Ok(MatchOutcome::boolean(fuzzy_match(
                &text_cmp,
                &pattern_cmp,
            ))),
            MatchAlgorithm::Auto => Ok(MatchOutcome::NO_MATCH),
        }
    }

    /// Evaluate a rule on behalf of a specific catalog entity, so `Auto`
    /// can ask the scorer whether the classifier picked that entity.
    pub async fn evaluate_for(
        &self,
        rule: &MatchRule,
        field: EntityKind,
        entity_id: i64,
        text: &str,
    ) -> Result<MatchOutcome, EngineError> {
        if rule.algorithm != MatchAlgorithm::Auto {
            return self.evaluate(rule, text);
        }
        if text.is_empty() {
            return Ok(MatchOutcome::NO_MATCH);
        }

        let scorer = match &self.auto_scorer {
            Some(scorer) => scorer,
            None => {
                log::debug!("auto rule on {field:?} {entity_id} skipped: no scorer configured");
                return Ok(MatchOutcome::NO_MATCH);
            }
        };

        let scored = tokio::time::timeout(self.auto_timeout, scorer.score(field, text))
            .await
            .map_err(|_| EngineError::ExternalTimeout {
                what: "auto scorer",
                seconds: self.auto_timeout.as_secs(),
            })?;

        match scored {
            Some(candidate)
                if candidate.entity_id == entity_id
                    && candidate.confidence >= self.auto_threshold =>
            {
                Ok(MatchOutcome {
                    matched: true,
                    confidence: candidate.confidence.clamp(0.0, 1.0),
                })
            }
            _ => Ok(MatchOutcome::NO_MATCH),
        }
    }

    /// Evaluate a rule that is not bound to a catalog entity (workflow
    /// trigger match rules). `Auto` here asks the scorer for the
    /// document-type dimension and matches when any candidate clears the
    /// acceptance threshold.
    pub async fn evaluate_unscoped(
        &self,
        rule: &MatchRule,
        text: &str,
    ) -> Result<MatchOutcome, EngineError> {
        if rule.algorithm != MatchAlgorithm::Auto {
            return self.evaluate(rule, text);
        }
        if text.is_empty() {
            return Ok(MatchOutcome::NO_MATCH);
        }
        let scorer = match &self.auto_scorer {
            Some(scorer) => scorer,
            None => return Ok(MatchOutcome::NO_MATCH),
        };
        let scored = tokio::time::timeout(
            self.auto_timeout,
            scorer.score(EntityKind::DocumentType, text),
        )
        .await
        .map_err(|_| EngineError::ExternalTimeout {
            what: "auto scorer",
            seconds: self.auto_timeout.as_secs(),
        })?;
        match scored {
            Some(candidate) if candidate.confidence >= self.auto_threshold => Ok(MatchOutcome {
                matched: true,
                confidence: candidate.confidence.clamp(0.0, 1.0),
            }),
            _ => Ok(MatchOutcome::NO_MATCH),
        }
    }

    fn compiled_regex(&self, pattern: &str, insensitive: bool) -> Result<regex::Regex, EngineError> {
        let key = (pattern.to_string(), insensitive);
        let mut cache = self
            .compiled_patterns
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(regex) = cache.get(&key) {
            return Ok(regex.clone());
        }
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(insensitive)
            .build()
            .map_err(|source| EngineError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })?;
        cache.insert(key, regex.clone());
        Ok(regex)
    }
}

/// Split a pattern into terms on runs of whitespace, dropping empties.
fn split_terms(pattern: &str) -> Vec<&str> {
    pattern.split_whitespace().collect()
}

/// Term-level fuzzy containment: the rule matches when any pattern term is
/// within its edit-distance budget of any text token.
fn fuzzy_match(text: &str, pattern: &str) -> bool {
    let tokens: Vec<&str> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();
    if tokens.is_empty() {
        return false;
    }

    split_terms(pattern).iter().any(|term| {
        let budget = fuzzy_budget(term);
        tokens
            .iter()
            .any(|token| levenshtein(term, token) <= budget)
    })
}

fn fuzzy_budget(term: &str) -> usize {
    let proportional = (term.chars().count() as f64 * FUZZY_DISTANCE_RATIO).floor() as usize;
    proportional.max(1)
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            current[j + 1] = substitution
                .min(previous[j + 1] + 1)
                .min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(pattern: &str, algorithm: MatchAlgorithm) -> MatchRule {
        MatchRule::new(pattern, algorithm)
    }

    #[test]
    fn any_matches_when_one_term_is_contained() {
        let evaluator = MatchEvaluator::new();
        let outcome = evaluator
            .evaluate(&rule("invoice receipt", MatchAlgorithm::Any), "Your receipt is attached")
            .unwrap();
        assert!(outcome.matched);
        assert_eq!(outcome.confidence, 1.0);
    }

    #[test]
    fn any_terms_match_as_substrings_not_words() {
        let evaluator = MatchEvaluator::new();
        let outcome = evaluator
            .evaluate(&rule("voice", MatchAlgorithm::Any), "invoice 2024-001")
            .unwrap();
        assert!(outcome.matched, "embedded substrings count");
    }

    #[test]
    fn all_requires_every_term() {
        let evaluator = MatchEvaluator::new();
        let r = rule("electric utility", MatchAlgorithm::All);
        assert!(evaluator
            .evaluate(&r, "electric bill from the utility company")
            .unwrap()
            .matched);
        assert!(!evaluator.evaluate(&r, "electric bill").unwrap().matched);
    }

    #[test]
    fn exact_is_contiguous_substring() {
        let evaluator = MatchEvaluator::new();
        let r = rule("bank of examples", MatchAlgorithm::Exact);
        assert!(evaluator
            .evaluate(&r, "Statement from Bank of Examples dated")
            .unwrap()
            .matched);
        assert!(!evaluator
            .evaluate(&r, "bank statement of examples")
            .unwrap()
            .matched);
    }

    #[test]
    fn none_never_matches_even_on_identical_text() {
        let evaluator = MatchEvaluator::new();
        let r = rule("same text", MatchAlgorithm::None);
        assert!(!evaluator.evaluate(&r, "same text").unwrap().matched);
    }

    #[test]
    fn empty_pattern_and_empty_text_never_match() {
        let evaluator = MatchEvaluator::new();
        assert!(!evaluator
            .evaluate(&rule("", MatchAlgorithm::Any), "some text")
            .unwrap()
            .matched);
        assert!(!evaluator
            .evaluate(&rule("term", MatchAlgorithm::Exact), "")
            .unwrap()
            .matched);
    }

    #[test]
    fn case_sensitivity_is_honored() {
        let evaluator = MatchEvaluator::new();
        let mut r = rule("Invoice", MatchAlgorithm::Exact);
        assert!(evaluator.evaluate(&r, "invoice enclosed").unwrap().matched);
        r.case_insensitive = false;
        assert!(!evaluator.evaluate(&r, "invoice enclosed").unwrap().matched);
    }

    #[test]
    fn regex_uses_search_semantics() {
        let evaluator = MatchEvaluator::new();
        let r = rule(r"inv-\d{4}", MatchAlgorithm::Regex);
        assert!(evaluator
            .evaluate(&r, "reference INV-2024 attached")
            .unwrap()
            .matched);
    }

    #[test]
    fn invalid_regex_is_an_error_not_a_panic() {
        let evaluator = MatchEvaluator::new();
        let r = rule(r"([unclosed", MatchAlgorithm::Regex);
        match evaluator.evaluate(&r, "anything") {
            Err(EngineError::InvalidPattern { pattern, .. }) => {
                assert_eq!(pattern, "([unclosed");
            }
            other => panic!("expected InvalidPattern, got {other:?}"),
        }
    }

    #[test]
    fn fuzzy_matches_within_proportional_distance() {
        let evaluator = MatchEvaluator::new();
        let r = rule("facture", MatchAlgorithm::Fuzzy);
        // "factura" is distance 1 from "facture"; budget is floor(7*0.2)=1.
        assert!(evaluator.evaluate(&r, "factura trouvée").unwrap().matched);
        assert!(!evaluator
            .evaluate(&r, "completely unrelated text")
            .unwrap()
            .matched);
    }

    #[test]
    fn fuzzy_budget_has_floor_of_one() {
        assert_eq!(fuzzy_budget("tax"), 1);
        assert_eq!(fuzzy_budget("facture"), 1);
        assert_eq!(fuzzy_budget("registration"), 2);
    }

    #[test]
    fn levenshtein_basics() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("same", "same"), 0);
    }

    #[test]
    fn algorithm_codes_round_trip() {
        for code in 0u8..=6 {
            let algorithm = MatchAlgorithm::try_from(code).unwrap();
            assert_eq!(u8::from(algorithm), code);
        }
        assert!(MatchAlgorithm::try_from(7).is_err());
    }

    struct FixedScorer {
        candidate: Option<ScoredCandidate>,
    }

    #[async_trait]
    impl AutoScorer for FixedScorer {
        async fn score(&self, _field: EntityKind, _text: &str) -> Option<ScoredCandidate> {
            self.candidate
        }
    }

    #[tokio::test]
    async fn auto_accepts_above_threshold_for_the_scored_entity() {
        let evaluator = MatchEvaluator::new().with_auto_scorer(Arc::new(FixedScorer {
            candidate: Some(ScoredCandidate {
                entity_id: 7,
                confidence: 0.8,
            }),
        }));
        let r = rule("", MatchAlgorithm::Auto);

        let outcome = evaluator
            .evaluate_for(&r, EntityKind::Correspondent, 7, "text")
            .await
            .unwrap();
        assert!(outcome.matched);
        assert!((outcome.confidence - 0.8).abs() < f32::EPSILON);

        // Different entity than the scorer picked: no match.
        let other = evaluator
            .evaluate_for(&r, EntityKind::Correspondent, 8, "text")
            .await
            .unwrap();
        assert!(!other.matched);
    }

    #[tokio::test]
    async fn auto_rejects_below_threshold() {
        let evaluator = MatchEvaluator::new().with_auto_scorer(Arc::new(FixedScorer {
            candidate: Some(ScoredCandidate {
                entity_id: 7,
                confidence: 0.3,
            }),
        }));
        let r = rule("", MatchAlgorithm::Auto);
        let outcome = evaluator
            .evaluate_for(&r, EntityKind::Tag, 7, "text")
            .await
            .unwrap();
        assert!(!outcome.matched);
    }

    #[tokio::test]
    async fn auto_without_scorer_is_a_quiet_no_match() {
        let evaluator = MatchEvaluator::new();
        let r = rule("", MatchAlgorithm::Auto);
        let outcome = evaluator
            .evaluate_for(&r, EntityKind::DocumentType, 1, "text")
            .await
            .unwrap();
        assert!(!outcome.matched);
    }
}
