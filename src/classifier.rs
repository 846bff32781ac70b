use crate::catalog::{Catalog, EntityKind, Matchable};
use crate::error::EngineError;
use crate::matching::{MatchAlgorithm, MatchEvaluator};

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// One classification suggestion for a document. Transient: the caller
/// persists the chosen candidate as a foreign key, never the candidate
/// itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub entity_type: EntityKind,
    pub entity_id: i64,
    pub name: String,
    pub confidence: f32,
    pub rule_used: MatchAlgorithm,
}

/// Ranked suggestions per classifiable dimension, plus configuration
/// diagnostics (e.g. invalid regex rules) for the administrator.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Suggestions {
    pub correspondents: Vec<Candidate>,
    pub document_types: Vec<Candidate>,
    pub tags: Vec<Candidate>,
    pub storage_paths: Vec<Candidate>,
    pub warnings: Vec<String>,
}

impl Suggestions {
    /// Conventional single-valued picks (index 0 of each ranked list).
    pub fn top_correspondent(&self) -> Option<&Candidate> {
        self.correspondents.first()
    }

    pub fn top_document_type(&self) -> Option<&Candidate> {
        self.document_types.first()
    }

    pub fn top_storage_path(&self) -> Option<&Candidate> {
        self.storage_paths.first()
    }
}

/// Chosen classification values in the shape the consumption pipeline
/// persists as `classification_suggestions`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChosenClassification {
    pub correspondent_id: Option<i64>,
    pub document_type_id: Option<i64>,
    pub tag_ids: Vec<i64>,
    pub storage_path_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationOutcome {
    #[serde(rename = "final")]
    pub chosen: ChosenClassification,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_result: Option<ChosenClassification>,
    pub method_used: String,
    pub confidence: f32,
}

/// Runs every configured catalog rule against a document's text and ranks
/// the matches per dimension.
pub struct CandidateResolver {
    evaluator: MatchEvaluator,
}

impl CandidateResolver {
    pub fn new(evaluator: MatchEvaluator) -> Self {
        CandidateResolver { evaluator }
    }

    /// Produce ranked candidates for every dimension. Never fails on
    /// matching errors; broken rules degrade to non-matches and are
    /// reported in `Suggestions::warnings`.
    pub async fn resolve(&self, text: &str, catalog: &Catalog) -> Suggestions {
        let mut suggestions = Suggestions::default();

        suggestions.correspondents = self
            .resolve_dimension(
                EntityKind::Correspondent,
                &catalog.correspondents,
                text,
                &mut suggestions.warnings,
            )
            .await;
        suggestions.document_types = self
            .resolve_dimension(
                EntityKind::DocumentType,
                &catalog.document_types,
                text,
                &mut suggestions.warnings,
            )
            .await;
        suggestions.tags = self
            .resolve_dimension(EntityKind::Tag, &catalog.tags, text, &mut suggestions.warnings)
            .await;
        suggestions.storage_paths = self
            .resolve_dimension(
                EntityKind::StoragePath,
                &catalog.storage_paths,
                text,
                &mut suggestions.warnings,
            )
            .await;

        log::debug!(
            "classification suggestions: {} correspondents, {} types, {} tags, {} paths, {} warnings",
            suggestions.correspondents.len(),
            suggestions.document_types.len(),
            suggestions.tags.len(),
            suggestions.storage_paths.len(),
            suggestions.warnings.len()
        );
        suggestions
    }

    async fn resolve_dimension<E: Matchable>(
        &self,
        kind: EntityKind,
        entries: &[E],
        text: &str,
        warnings: &mut Vec<String>,
    ) -> Vec<Candidate> {
        let mut candidates = Vec::new();

        for entry in entries {
            let rule = entry.match_rule();
            if rule.algorithm == MatchAlgorithm::None {
                continue;
            }
            let outcome = match self.evaluator.evaluate_for(rule, kind, entry.id(), text).await {
                Ok(outcome) => outcome,
                Err(err @ EngineError::InvalidPattern { .. }) => {
                    log::warn!("{} '{}': {err}", kind.as_str(), entry.name());
                    warnings.push(format!("{} '{}': {err}", kind.as_str(), entry.name()));
                    continue;
                }
                Err(err) => {
                    log::warn!(
                        "{} '{}' rule evaluation failed: {err}",
                        kind.as_str(),
                        entry.name()
                    );
                    warnings.push(format!("{} '{}': {err}", kind.as_str(), entry.name()));
                    continue;
                }
            };
            if outcome.matched {
                candidates.push(Candidate {
                    entity_type: kind,
                    entity_id: entry.id(),
                    name: entry.name().to_string(),
                    confidence: outcome.confidence,
                    rule_used: rule.algorithm,
                });
            }
        }

        // Descending confidence, id ascending on ties: identical catalogs
        // must always produce identical orderings.
        candidates.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(Ordering::Equal)
                .then(a.entity_id.cmp(&b.entity_id))
        });
        candidates
    }

    /// Collapse ranked suggestions into the persisted outcome shape.
    pub fn outcome(&self, suggestions: &Suggestions) -> ClassificationOutcome {
        let chosen = ChosenClassification {
            correspondent_id: suggestions.top_correspondent().map(|c| c.entity_id),
            document_type_id: suggestions.top_document_type().map(|c| c.entity_id),
            tag_ids: suggestions.tags.iter().map(|c| c.entity_id).collect(),
            storage_path_id: suggestions.top_storage_path().map(|c| c.entity_id),
        };

        let winners: Vec<&Candidate> = suggestions
            .top_correspondent()
            .into_iter()
            .chain(suggestions.top_document_type())
            .chain(suggestions.tags.iter())
            .chain(suggestions.top_storage_path())
            .collect();

        let auto_used = winners.iter().any(|c| c.rule_used == MatchAlgorithm::Auto);
        let confidence = if winners.is_empty() {
            0.0
        } else {
            winners.iter().map(|c| c.confidence).sum::<f32>() / winners.len() as f32
        };

        let ai_result = if auto_used {
            let auto_only = |cs: &[Candidate]| -> Vec<i64> {
                cs.iter()
                    .filter(|c| c.rule_used == MatchAlgorithm::Auto)
                    .map(|c| c.entity_id)
                    .collect()
            };
            Some(ChosenClassification {
                correspondent_id: auto_only(&suggestions.correspondents).first().copied(),
                document_type_id: auto_only(&suggestions.document_types).first().copied(),
                tag_ids: auto_only(&suggestions.tags),
                storage_path_id: auto_only(&suggestions.storage_paths).first().copied(),
            })
        } else {
            None
        };

        ClassificationOutcome {
            chosen,
            ai_result,
            method_used: if auto_used { "auto" } else { "rules" }.to_string(),
            confidence,
        }
    }
}
