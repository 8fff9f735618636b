use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use taskhive_types::{NewTemplate, TaskKind, Tier};

/// Query for the task-generation collaborator.
#[derive(Debug, Clone)]
pub struct GenerationQuery {
    pub kind: TaskKind,
    pub location: Option<String>,
}

/// External task-generation collaborator. Best-effort: `Ok(None)` and `Err`
/// both mean "no task generated" to the caller.
#[async_trait]
pub trait TaskGenerator: Send + Sync {
    async fn generate(&self, query: &GenerationQuery) -> anyhow::Result<Option<NewTemplate>>;
}

/// Deterministic local generator rotating through a built-in catalog.
pub struct CatalogGenerator {
    cursor: AtomicUsize,
}

struct CatalogEntry {
    kind: TaskKind,
    description: &'static str,
    instructions: &'static str,
    link: &'static str,
}

const CATALOG: &[CatalogEntry] = &[
    CatalogEntry {
        kind: TaskKind::Comment,
        description: "Leave a positive comment on a video about travel",
        instructions: "Mention one concrete detail from the video",
        link: "https://example.com/watch/travel",
    },
    CatalogEntry {
        kind: TaskKind::Comment,
        description: "Post a supportive comment on the latest page update",
        instructions: "Keep it friendly and on-topic",
        link: "https://example.com/page/latest",
    },
    CatalogEntry {
        kind: TaskKind::Review,
        description: "Write a 4-star review for a local landmark",
        instructions: "At least 80 words, no copied text",
        link: "https://example.com/reviews/landmark",
    },
    CatalogEntry {
        kind: TaskKind::Review,
        description: "Review a newly listed cafe",
        instructions: "Mention the service and one menu item",
        link: "https://example.com/reviews/cafe",
    },
    CatalogEntry {
        kind: TaskKind::Social,
        description: "Share the campaign post to your feed",
        instructions: "Keep the original caption",
        link: "https://example.com/social/campaign",
    },
    CatalogEntry {
        kind: TaskKind::Visit,
        description: "Visit the partner storefront page for two minutes",
        instructions: "Scroll to the bottom of the page",
        link: "https://example.com/partners/storefront",
    },
];

impl Default for CatalogGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl CatalogGenerator {
    pub fn new() -> Self {
        Self {
            cursor: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl TaskGenerator for CatalogGenerator {
    async fn generate(&self, query: &GenerationQuery) -> anyhow::Result<Option<NewTemplate>> {
        let matching: Vec<&CatalogEntry> =
            CATALOG.iter().filter(|e| e.kind == query.kind).collect();
        if matching.is_empty() {
            return Ok(None);
        }

        let pick = self.cursor.fetch_add(1, Ordering::Relaxed) % matching.len();
        let entry = matching[pick];

        let description = match &query.location {
            Some(location) => format!("{} ({})", entry.description, location),
            None => entry.description.to_string(),
        };

        Ok(Some(NewTemplate {
            kind: entry.kind,
            description,
            instructions: entry.instructions.to_string(),
            link: entry.link.to_string(),
            tier: Tier::Basic,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_catalog_rotates_within_kind() {
        let generator = CatalogGenerator::new();
        let query = GenerationQuery {
            kind: TaskKind::Comment,
            location: None,
        };

        let first = generator.generate(&query).await.unwrap().unwrap();
        let second = generator.generate(&query).await.unwrap().unwrap();
        assert_eq!(first.kind, TaskKind::Comment);
        assert_eq!(second.kind, TaskKind::Comment);
        assert_ne!(first.description, second.description);
    }

    #[tokio::test]
    async fn test_location_is_woven_in() {
        let generator = CatalogGenerator::new();
        let query = GenerationQuery {
            kind: TaskKind::Review,
            location: Some("Central Park".to_string()),
        };

        let spec = generator.generate(&query).await.unwrap().unwrap();
        assert!(spec.description.contains("Central Park"));
    }
}
