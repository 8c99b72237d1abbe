use crate::model::{ProjectId, User, UserId};
use crate::services::{UserError, UserService};
use async_trait::async_trait;
use resource_framework::{
    AliasFactory, DataMap, LoadContext, MapResource, ResourceAlias, ResourceAliases, ResourceKey,
    ALL_KEYS,
};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Every user. Resolves to every cached user, in load order.
pub const ALL_USERS: AliasFactory = AliasFactory::list("users/all");

/// Members of one project by ascending id, see [`project_users`].
pub const PROJECT_USERS: AliasFactory = AliasFactory::list("users/project");

pub fn all_users() -> ResourceKey<UserId> {
    ALL_USERS.key()
}

pub fn project_users(project: ProjectId) -> ResourceKey<UserId> {
    PROJECT_USERS.key_with([("project", project.0)])
}

fn project_of(alias: &ResourceAlias) -> Option<ProjectId> {
    alias.option("project")?.parse().ok().map(ProjectId)
}

/// Users keyed by [`UserId`], fetched through a [`UserService`].
///
/// | Key | Service call | Commit |
/// |-----|--------------|--------|
/// | `Flat(id)` | `fetch_user` | `set` |
/// | `List(ids)` | `fetch_users` | `set` per user found |
/// | [`all_users()`] | `fetch_all` | `replace` |
/// | page of [`all_users()`] | `fetch_page` | `set` per user |
/// | [`project_users`] (or a page of it) | `fetch_project` | `set` per user |
pub struct UsersResource {
    service: Arc<dyn UserService>,
}

impl UsersResource {
    pub fn new(service: Arc<dyn UserService>) -> Self {
        Self { service }
    }

    async fn load_alias(
        &self,
        alias: &ResourceAlias,
        ctx: &LoadContext<'_, Self>,
    ) -> Result<(), UserError> {
        let page = alias.page();
        let root = match (page, alias.parent()) {
            (Some(_), Some(parent)) => parent,
            _ => alias,
        };

        if root.is(&ALL_USERS) || root.is(&ALL_KEYS) {
            match page {
                Some((offset, limit)) => {
                    self.commit(self.service.fetch_page(offset, limit).await?, ctx)
                }
                None => {
                    let users = self.service.fetch_all().await?;
                    let ids = users.iter().map(|user| user.id).collect();
                    ctx.replace(ids, users)?;
                    Ok(())
                }
            }
        } else if root.is(&PROJECT_USERS) {
            let project = project_of(root).ok_or_else(|| {
                UserError::ValidationError(format!("{root} has no valid project option"))
            })?;
            let users = self.service.fetch_project(project).await?;
            let users = match page {
                Some((offset, limit)) => users.into_iter().skip(offset).take(limit).collect(),
                None => users,
            };
            self.commit(users, ctx)
        } else {
            Err(UserError::ValidationError(format!("Unsupported alias {alias}")))
        }
    }

    fn commit(&self, users: Vec<User>, ctx: &LoadContext<'_, Self>) -> Result<(), UserError> {
        debug!(count = users.len(), "Committing users");
        for user in users {
            ctx.set(user.id, user)?;
        }
        Ok(())
    }
}

#[async_trait]
impl MapResource for UsersResource {
    type Key = UserId;
    type Value = User;
    type Error = UserError;
    type Extension = ();

    fn register_aliases(&self, aliases: &ResourceAliases<UserId>, data: &DataMap<UserId, User>) {
        aliases.add(&ALL_USERS, |_| ALL_KEYS.key());

        let data = data.clone();
        aliases.add(&PROJECT_USERS, move |alias| {
            let mut ids: Vec<UserId> = match project_of(alias) {
                Some(project) => data
                    .filter(|_, user| user.project == project)
                    .into_iter()
                    .map(|(id, _)| id)
                    .collect(),
                None => Vec::new(),
            };
            ids.sort();
            ResourceKey::List(ids)
        });
    }

    fn validate_key(&self, key: &UserId) -> bool {
        key.is_valid()
    }

    #[instrument(skip_all, fields(key = %key))]
    async fn loader(
        &self,
        key: &ResourceKey<UserId>,
        ctx: &LoadContext<'_, Self>,
    ) -> Result<(), UserError> {
        match key {
            ResourceKey::Flat(id) => {
                let user = self.service.fetch_user(*id).await?;
                ctx.set(user.id, user)?;
                Ok(())
            }
            ResourceKey::List(ids) => self.commit(self.service.fetch_users(ids).await?, ctx),
            ResourceKey::Alias(alias) | ResourceKey::ListAlias(alias) => {
                self.load_alias(alias, ctx).await
            }
        }
    }
}
