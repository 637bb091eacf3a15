use super::GameService;
use crate::error::{GameError, GameResult};
use crate::types::*;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

pub const MAX_GROUP_NAME_CHARS: usize = 80;

fn clean_name(name: &str) -> GameResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(GameError::Validation("group name must not be empty".to_string()));
    }
    if name.chars().count() > MAX_GROUP_NAME_CHARS {
        return Err(GameError::Validation(format!(
            "group name must be at most {} characters",
            MAX_GROUP_NAME_CHARS
        )));
    }
    Ok(name.to_string())
}

impl GameService {
    /// Create a group drawing from an active edition; the creator owns it
    pub async fn create_group(
        &self,
        owner_id: &str,
        name: String,
        edition_id: &str,
        now: DateTime<Utc>,
    ) -> GameResult<Group> {
        let name = clean_name(&name)?;
        let edition = self
            .store
            .get_edition(edition_id)
            .await?
            .ok_or_else(|| GameError::Validation(format!("unknown edition {}", edition_id)))?;
        if !edition.active {
            return Err(GameError::Validation(format!(
                "edition {} is not active",
                edition.slug
            )));
        }

        let group = Group {
            id: new_id(),
            name,
            owner_id: owner_id.to_string(),
            edition_id: edition.id,
            members: BTreeSet::from([owner_id.to_string()]),
            created_at: now,
        };
        self.store.insert_group(group.clone()).await?;
        tracing::info!(group_id = %group.id, owner_id, edition = %edition.slug, "Created group");
        Ok(group)
    }

    pub async fn groups_for_user(&self, user_id: &str) -> GameResult<Vec<Group>> {
        let groups = self.store.list_groups().await?;
        Ok(groups
            .into_iter()
            .filter(|group| group.is_member(user_id))
            .collect())
    }

    pub async fn get_group(&self, group_id: &str, user_id: &str) -> GameResult<Group> {
        self.member_group(group_id, user_id).await
    }

    pub async fn rename_group(
        &self,
        group_id: &str,
        user_id: &str,
        name: String,
    ) -> GameResult<Group> {
        let mut group = self.owned_group(group_id, user_id).await?;
        group.name = clean_name(&name)?;
        self.store.rename_group(group_id, &group.name).await?;
        Ok(group)
    }

    /// Delete a group together with its whole round history
    pub async fn delete_group(&self, group_id: &str, user_id: &str) -> GameResult<()> {
        self.owned_group(group_id, user_id).await?;
        if !self.store.delete_group(group_id).await? {
            return Err(GameError::NotFound(format!("group {}", group_id)));
        }
        tracing::info!(group_id, "Deleted group");
        Ok(())
    }

    /// Owner adds a member; adding an existing member is a no-op
    pub async fn add_member(
        &self,
        group_id: &str,
        owner_id: &str,
        member_id: &str,
    ) -> GameResult<Group> {
        self.owned_group(group_id, owner_id).await?;
        let member_id = member_id.trim();
        if member_id.is_empty() {
            return Err(GameError::Validation("user id must not be empty".to_string()));
        }
        if self.store.add_member(group_id, member_id).await? {
            tracing::info!(group_id, member_id, "Member added");
        }
        self.load_group(group_id).await
    }

    /// Owner kicks a member, or a member leaves. The owner can do neither to
    /// themselves. Votes and points of the removed member are kept.
    pub async fn remove_member(
        &self,
        group_id: &str,
        actor_id: &str,
        member_id: &str,
    ) -> GameResult<Group> {
        let group = self.load_group(group_id).await?;
        if group.is_owner(member_id) {
            return Err(GameError::Validation(
                "the owner cannot leave the group".to_string(),
            ));
        }
        if actor_id != member_id && !group.is_owner(actor_id) {
            return Err(GameError::Forbidden(
                "only the owner may remove other members".to_string(),
            ));
        }
        if !self.store.remove_member(group_id, member_id).await? {
            return Err(GameError::NotFound(format!(
                "{} is not a member of group {}",
                member_id, group_id
            )));
        }

        tracing::info!(group_id, member_id, kicked = actor_id != member_id, "Member removed");
        self.load_group(group_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::*;

    #[tokio::test]
    async fn test_creator_is_owner_and_member() {
        let service = service();
        let edition = seed_edition(&service, "classic", 1).await;

        let group = service
            .create_group("alice", "  Flatmates ".to_string(), &edition.id, t0())
            .await
            .unwrap();

        assert_eq!(group.name, "Flatmates");
        assert!(group.is_owner("alice"));
        assert!(group.is_member("alice"));
        assert_eq!(service.groups_for_user("alice").await.unwrap().len(), 1);
        assert!(service.groups_for_user("bob").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_inactive_edition_rejected() {
        let service = service();
        let edition = service
            .create_edition("Retired".to_string(), "retired".to_string(), false)
            .await
            .unwrap();

        let err = service
            .create_group("alice", "Flatmates".to_string(), &edition.id, t0())
            .await
            .unwrap_err();
        assert!(matches!(err, GameError::Validation(_)));
    }

    #[tokio::test]
    async fn test_blank_name_rejected() {
        let service = service();
        let edition = seed_edition(&service, "classic", 1).await;

        let err = service
            .create_group("alice", "   ".to_string(), &edition.id, t0())
            .await
            .unwrap_err();
        assert!(matches!(err, GameError::Validation(_)));
    }

    #[tokio::test]
    async fn test_only_owner_manages_members() {
        let service = service();
        let edition = seed_edition(&service, "classic", 1).await;
        let group = seed_group(&service, &edition.id, &["alice", "bob"]).await;

        let err = service.add_member(&group.id, "bob", "carol").await.unwrap_err();
        assert!(matches!(err, GameError::Forbidden(_)));

        let err = service
            .rename_group(&group.id, "bob", "Mine now".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, GameError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_leave_and_kick() {
        let service = service();
        let edition = seed_edition(&service, "classic", 1).await;
        let group = seed_group(&service, &edition.id, &["alice", "bob", "carol"]).await;

        let group_after = service.remove_member(&group.id, "bob", "bob").await.unwrap();
        assert!(!group_after.is_member("bob"));

        let err = service
            .remove_member(&group.id, "carol", "alice")
            .await
            .unwrap_err();
        assert!(matches!(err, GameError::Validation(_)));

        let group_after = service
            .remove_member(&group.id, "alice", "carol")
            .await
            .unwrap();
        assert_eq!(group_after.members.len(), 1);
    }

    #[tokio::test]
    async fn test_owner_cannot_leave() {
        let service = service();
        let edition = seed_edition(&service, "classic", 1).await;
        let group = seed_group(&service, &edition.id, &["alice"]).await;

        let err = service
            .remove_member(&group.id, "alice", "alice")
            .await
            .unwrap_err();
        assert!(matches!(err, GameError::Validation(_)));
    }

    #[tokio::test]
    async fn test_member_cannot_kick_others() {
        let service = service();
        let edition = seed_edition(&service, "classic", 1).await;
        let group = seed_group(&service, &edition.id, &["alice", "bob", "carol"]).await;

        let err = service
            .remove_member(&group.id, "bob", "carol")
            .await
            .unwrap_err();
        assert!(matches!(err, GameError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_delete_group() {
        let service = service();
        let edition = seed_edition(&service, "classic", 2).await;
        let group = seed_group(&service, &edition.id, &["alice", "bob"]).await;
        service.open_round(&group.id, t0()).await.unwrap();

        let err = service.delete_group(&group.id, "bob").await.unwrap_err();
        assert!(matches!(err, GameError::Forbidden(_)));

        service.delete_group(&group.id, "alice").await.unwrap();
        assert!(service.store().get_group(&group.id).await.unwrap().is_none());
        assert!(service.store().list_open_rounds().await.unwrap().is_empty());
    }
}
