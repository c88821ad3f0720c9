//! Query completion.

use super::{Suggestion, SuggestionType};
use crate::analytics::PopularQueries;
use crate::config::SuggestionConfig;
use crate::optimizer::QueryOptimizer;
use std::sync::Arc;
use tracing::warn;

/// Builds completions from query history and the optimizer.
///
/// Order: popular, then semantic, then the user's recent queries. Texts are
/// de-duplicated case-insensitively, first source wins. Every source is
/// optional and a failing source contributes nothing.
#[derive(Clone)]
pub struct SuggestionEngine {
    popular: Option<Arc<dyn PopularQueries>>,
    optimizer: Option<Arc<dyn QueryOptimizer>>,
    config: SuggestionConfig,
}

impl SuggestionEngine {
    pub fn new(config: SuggestionConfig) -> Self {
        Self {
            popular: None,
            optimizer: None,
            config,
        }
    }

    pub fn with_popular(mut self, popular: Arc<dyn PopularQueries>) -> Self {
        self.popular = Some(popular);
        self
    }

    pub fn with_optimizer(mut self, optimizer: Arc<dyn QueryOptimizer>) -> Self {
        self.optimizer = Some(optimizer);
        self
    }

    pub async fn suggest(&self, partial: &str, user_id: Option<&str>) -> Vec<Suggestion> {
        let partial = partial.split_whitespace().collect::<Vec<_>>().join(" ");
        if partial.is_empty() || self.config.limit == 0 {
            return Vec::new();
        }

        let (popular, semantic, recent) = futures::join!(
            self.popular_candidates(&partial),
            self.semantic_candidates(&partial),
            self.recent_candidates(&partial, user_id),
        );

        let mut out: Vec<Suggestion> = Vec::new();
        let sources = [
            (popular, SuggestionType::Popular, self.config.popular_score),
            (semantic, SuggestionType::Semantic, self.config.semantic_score),
            (recent, SuggestionType::Recent, self.config.recent_score),
        ];
        for (texts, kind, score) in sources {
            for text in texts {
                if out.len() >= self.config.limit {
                    return out;
                }
                let text = text.trim();
                if text.is_empty() || out.iter().any(|s| s.text.eq_ignore_ascii_case(text)) {
                    continue;
                }
                out.push(Suggestion {
                    text: text.to_string(),
                    score,
                    kind,
                });
            }
        }
        out
    }

    async fn popular_candidates(&self, partial: &str) -> Vec<String> {
        let Some(ref popular) = self.popular else {
            return Vec::new();
        };
        popular
            .popular(partial, self.config.limit)
            .await
            .unwrap_or_else(|err| {
                warn!(target: "fedsql.search", error = %err, "popular query lookup failed");
                Vec::new()
            })
    }

    async fn semantic_candidates(&self, partial: &str) -> Vec<String> {
        let Some(ref optimizer) = self.optimizer else {
            return Vec::new();
        };
        if !optimizer.is_available() {
            return Vec::new();
        }
        optimizer
            .semantic_suggestions(partial)
            .await
            .unwrap_or_else(|err| {
                warn!(target: "fedsql.search", error = %err, "semantic suggestions failed");
                Vec::new()
            })
    }

    async fn recent_candidates(&self, partial: &str, user_id: Option<&str>) -> Vec<String> {
        let (Some(popular), Some(user_id)) = (&self.popular, user_id) else {
            return Vec::new();
        };
        popular
            .recent_for_user(user_id, partial, self.config.limit)
            .await
            .unwrap_or_else(|err| {
                warn!(target: "fedsql.search", error = %err, "recent query lookup failed");
                Vec::new()
            })
    }
}
