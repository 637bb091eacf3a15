use super::GameService;
use crate::error::{GameError, GameResult};
use crate::types::*;
use serde::Deserialize;

/// Partial update of an edition; absent fields are left unchanged
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EditionPatch {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub active: Option<bool>,
}

/// Slugs are lowercase ASCII letters, digits and dashes
pub fn validate_slug(slug: &str) -> GameResult<String> {
    let slug = slug.trim();
    if slug.is_empty() {
        return Err(GameError::Validation("slug must not be empty".to_string()));
    }
    if !slug
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(GameError::Validation(format!(
            "slug {:?} may only contain a-z, 0-9 and '-'",
            slug
        )));
    }
    Ok(slug.to_string())
}

fn validate_edition_name(name: &str) -> GameResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(GameError::Validation(
            "edition name must not be empty".to_string(),
        ));
    }
    Ok(name.to_string())
}

impl GameService {
    fn validate_statement_text(&self, text: &str) -> GameResult<String> {
        let text = text.trim();
        if text.is_empty() {
            return Err(GameError::Validation(
                "statement text must not be empty".to_string(),
            ));
        }
        let max = self.config.max_statement_chars;
        if text.chars().count() > max {
            return Err(GameError::Validation(format!(
                "statement text must be at most {} characters",
                max
            )));
        }
        Ok(text.to_string())
    }

    pub async fn list_editions(&self) -> GameResult<Vec<Edition>> {
        Ok(self.store.list_editions().await?)
    }

    pub async fn create_edition(
        &self,
        name: String,
        slug: String,
        active: bool,
    ) -> GameResult<Edition> {
        let edition = Edition {
            id: new_id(),
            name: validate_edition_name(&name)?,
            slug: validate_slug(&slug)?,
            active,
        };
        self.store.insert_edition(edition.clone()).await?;
        tracing::info!(edition_id = %edition.id, slug = %edition.slug, "Created edition");
        Ok(edition)
    }

    pub async fn update_edition(&self, edition_id: &str, patch: EditionPatch) -> GameResult<Edition> {
        let mut edition = self
            .store
            .get_edition(edition_id)
            .await?
            .ok_or_else(|| GameError::NotFound(format!("edition {}", edition_id)))?;

        if let Some(name) = patch.name {
            edition.name = validate_edition_name(&name)?;
        }
        if let Some(slug) = patch.slug {
            edition.slug = validate_slug(&slug)?;
        }
        if let Some(active) = patch.active {
            edition.active = active;
        }

        self.store.update_edition(edition.clone()).await?;
        Ok(edition)
    }

    /// Statements of the edition stay in place
    pub async fn delete_edition(&self, edition_id: &str) -> GameResult<()> {
        if !self.store.delete_edition(edition_id).await? {
            return Err(GameError::NotFound(format!("edition {}", edition_id)));
        }
        tracing::info!(edition_id, "Deleted edition");
        Ok(())
    }

    /// All statements of an edition, soft-deleted ones flagged
    pub async fn list_statements(&self, edition_id: &str) -> GameResult<Vec<Statement>> {
        Ok(self.store.list_statements(edition_id).await?)
    }

    pub async fn create_statement(&self, edition_id: &str, text: String) -> GameResult<Statement> {
        if self.store.get_edition(edition_id).await?.is_none() {
            return Err(GameError::NotFound(format!("edition {}", edition_id)));
        }
        let statement = Statement {
            id: new_id(),
            text: self.validate_statement_text(&text)?,
            edition_id: edition_id.to_string(),
            deleted: false,
        };
        self.store.insert_statement(statement.clone()).await?;
        Ok(statement)
    }

    pub async fn update_statement(&self, statement_id: &str, text: String) -> GameResult<Statement> {
        let mut statement = self.load_statement(statement_id).await?;
        statement.text = self.validate_statement_text(&text)?;
        self.store.update_statement(statement.clone()).await?;
        Ok(statement)
    }

    /// Soft delete: historical rounds keep resolving the text
    pub async fn delete_statement(&self, statement_id: &str) -> GameResult<Statement> {
        let mut statement = self.load_statement(statement_id).await?;
        if !statement.deleted {
            statement.deleted = true;
            self.store.update_statement(statement.clone()).await?;
            tracing::info!(statement_id, "Statement retired");
        }
        Ok(statement)
    }

    async fn load_statement(&self, statement_id: &str) -> GameResult<Statement> {
        self.store
            .get_statement(statement_id)
            .await?
            .ok_or_else(|| GameError::NotFound(format!("statement {}", statement_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::*;

    #[test]
    fn test_slug_rules() {
        assert_eq!(validate_slug(" party-2024 ").unwrap(), "party-2024");
        assert!(validate_slug("").is_err());
        assert!(validate_slug("Party").is_err());
        assert!(validate_slug("a b").is_err());
        assert!(validate_slug("über").is_err());
    }

    #[tokio::test]
    async fn test_duplicate_slug_conflicts() {
        let service = service();
        service
            .create_edition("Classic".to_string(), "classic".to_string(), true)
            .await
            .unwrap();

        let err = service
            .create_edition("Classic 2".to_string(), "classic".to_string(), true)
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_update_edition_patch() {
        let service = service();
        let edition = seed_edition(&service, "classic", 0).await;

        let updated = service
            .update_edition(
                &edition.id,
                EditionPatch {
                    active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(!updated.active);
        assert_eq!(updated.slug, "classic");
    }

    #[tokio::test]
    async fn test_statement_text_limits() {
        let service = service();
        let edition = seed_edition(&service, "classic", 0).await;

        assert!(service
            .create_statement(&edition.id, "  ".to_string())
            .await
            .is_err());
        assert!(service
            .create_statement(&edition.id, "y".repeat(501))
            .await
            .is_err());
        let statement = service
            .create_statement(&edition.id, " Most likely to sing ".to_string())
            .await
            .unwrap();
        assert_eq!(statement.text, "Most likely to sing");
    }

    #[tokio::test]
    async fn test_statement_needs_edition() {
        let service = service();
        let err = service
            .create_statement("missing", "hello".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, GameError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_soft_delete_keeps_statement() {
        let service = service();
        let edition = seed_edition(&service, "classic", 1).await;
        let statements = service.list_statements(&edition.id).await.unwrap();

        let deleted = service.delete_statement(&statements[0].id).await.unwrap();
        assert!(deleted.deleted);
        let statements = service.list_statements(&edition.id).await.unwrap();
        assert_eq!(statements.len(), 1);
        assert!(statements[0].deleted);
    }

    #[tokio::test]
    async fn test_delete_edition_keeps_statements() {
        let service = service();
        let edition = seed_edition(&service, "classic", 2).await;

        service.delete_edition(&edition.id).await.unwrap();
        assert_eq!(service.list_statements(&edition.id).await.unwrap().len(), 2);
        assert!(service.delete_edition(&edition.id).await.is_err());
    }
}
