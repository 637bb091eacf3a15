use super::GameService;
use crate::error::GameResult;
use crate::types::*;
use rand::seq::IndexedRandom;
use std::collections::HashSet;

/// Live statements of an edition that the group has not seen yet
pub fn eligible_pool<'a>(
    statements: &'a [Statement],
    used: &HashSet<StatementId>,
) -> Vec<&'a Statement> {
    statements
        .iter()
        .filter(|s| !s.deleted && !used.contains(&s.id))
        .collect()
}

impl GameService {
    /// Pick the next statement for a group, or `None` when its edition has no
    /// live statements at all.
    ///
    /// When every statement has been used the group's history is cleared and
    /// the full edition is eligible again.
    pub async fn pick_next(&self, group_id: &str) -> GameResult<Option<Statement>> {
        let group = self.load_group(group_id).await?;
        self.pick_for_group(&group).await
    }

    pub(crate) async fn pick_for_group(&self, group: &Group) -> GameResult<Option<Statement>> {
        let statements = self.store.list_statements(&group.edition_id).await?;
        let used = self.store.used_statement_ids(&group.id).await?;

        let mut pool = eligible_pool(&statements, &used);
        if pool.is_empty() {
            pool = eligible_pool(&statements, &HashSet::new());
            if pool.is_empty() {
                tracing::warn!(
                    group_id = %group.id,
                    edition_id = %group.edition_id,
                    "Edition has no statements"
                );
                return Ok(None);
            }
            tracing::info!(
                group_id = %group.id,
                statements = pool.len(),
                "Statement pool exhausted, starting over"
            );
            self.store.clear_used_statements(&group.id).await?;
        }

        let picked = {
            let mut rng = rand::rng();
            pool.choose(&mut rng).map(|s| (*s).clone())
        };
        Ok(picked)
    }
}
