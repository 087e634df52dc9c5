//! Relations between entities
//!
//! Every relation method issues its own query through the entity's
//! `Databaser` and memoises the result under `"<kind>:<related>[:<type>]"`.
//! A memoised value is reused unless the relation is listed in the entity's
//! eager loads, which forces a re-fetch. Loading a relation for many entities
//! queries once per entity.

use std::future::Future;
use std::pin::Pin;

use serde_json::Value as JsonValue;

use super::Entity;
use crate::collection::Collection;
use crate::databaser::ReturnType;
use crate::error::{ModelError, ModelResult};
use crate::query::QueryBuilder;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// How a named relation is resolved
#[derive(Debug, Clone, PartialEq)]
pub enum RelationDef {
    /// `related.foreign_key = self.local_key`, one row
    HasOne {
        related: String,
        foreign_key: String,
        local_key: String,
    },
    /// `related.foreign_key = self.local_key`, every row
    HasMany {
        related: String,
        foreign_key: String,
        local_key: String,
    },
    /// `related.owner_key = self.foreign_key`, one row
    BelongsTo {
        related: String,
        foreign_key: String,
        owner_key: String,
    },
    /// Through a pivot table holding both keys
    BelongsToMany {
        related: String,
        pivot: String,
        foreign_pivot_key: String,
        related_pivot_key: String,
        parent_key: String,
        related_key: String,
    },
    /// `self -> through -> related`
    HasManyThrough {
        related: String,
        through: String,
        first_key: String,
        second_key: String,
        local_key: String,
        second_local_key: String,
    },
    /// `related.{name}_type = self.table AND related.{name}_id = self.key`, one row
    MorphOne { related: String, name: String },
    /// Same as [`MorphOne`](Self::MorphOne), every row
    MorphMany { related: String, name: String },
    /// Owner named by this entity's `{name}_type` / `{name}_id` columns
    MorphTo { name: String },
}

impl RelationDef {
    pub fn has_one(related: &str, foreign_key: &str) -> Self {
        RelationDef::HasOne {
            related: related.to_string(),
            foreign_key: foreign_key.to_string(),
            local_key: super::DEFAULT_PRIMARY_KEY.to_string(),
        }
    }

    pub fn has_many(related: &str, foreign_key: &str) -> Self {
        RelationDef::HasMany {
            related: related.to_string(),
            foreign_key: foreign_key.to_string(),
            local_key: super::DEFAULT_PRIMARY_KEY.to_string(),
        }
    }

    pub fn belongs_to(related: &str, foreign_key: &str) -> Self {
        RelationDef::BelongsTo {
            related: related.to_string(),
            foreign_key: foreign_key.to_string(),
            owner_key: super::DEFAULT_PRIMARY_KEY.to_string(),
        }
    }

    pub fn belongs_to_many(related: &str, pivot: &str, foreign_pivot_key: &str, related_pivot_key: &str) -> Self {
        RelationDef::BelongsToMany {
            related: related.to_string(),
            pivot: pivot.to_string(),
            foreign_pivot_key: foreign_pivot_key.to_string(),
            related_pivot_key: related_pivot_key.to_string(),
            parent_key: super::DEFAULT_PRIMARY_KEY.to_string(),
            related_key: super::DEFAULT_PRIMARY_KEY.to_string(),
        }
    }

    pub fn has_many_through(related: &str, through: &str, first_key: &str, second_key: &str) -> Self {
        RelationDef::HasManyThrough {
            related: related.to_string(),
            through: through.to_string(),
            first_key: first_key.to_string(),
            second_key: second_key.to_string(),
            local_key: super::DEFAULT_PRIMARY_KEY.to_string(),
            second_local_key: super::DEFAULT_PRIMARY_KEY.to_string(),
        }
    }

    pub fn morph_one(related: &str, name: &str) -> Self {
        RelationDef::MorphOne {
            related: related.to_string(),
            name: name.to_string(),
        }
    }

    pub fn morph_many(related: &str, name: &str) -> Self {
        RelationDef::MorphMany {
            related: related.to_string(),
            name: name.to_string(),
        }
    }

    pub fn morph_to(name: &str) -> Self {
        RelationDef::MorphTo { name: name.to_string() }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RelationDef::HasOne { .. } => "hasOne",
            RelationDef::HasMany { .. } => "hasMany",
            RelationDef::BelongsTo { .. } => "belongsTo",
            RelationDef::BelongsToMany { .. } => "belongsToMany",
            RelationDef::HasManyThrough { .. } => "hasManyThrough",
            RelationDef::MorphOne { .. } => "morphOne",
            RelationDef::MorphMany { .. } => "morphMany",
            RelationDef::MorphTo { .. } => "morphTo",
        }
    }

    pub fn is_many(&self) -> bool {
        matches!(
            self,
            RelationDef::HasMany { .. }
                | RelationDef::BelongsToMany { .. }
                | RelationDef::HasManyThrough { .. }
                | RelationDef::MorphMany { .. }
        )
    }

    /// Table the relation reads from, as seen from `owner`
    fn related_table(&self, owner: &Entity) -> Option<String> {
        match self {
            RelationDef::HasOne { related, .. }
            | RelationDef::HasMany { related, .. }
            | RelationDef::BelongsTo { related, .. }
            | RelationDef::BelongsToMany { related, .. }
            | RelationDef::HasManyThrough { related, .. }
            | RelationDef::MorphOne { related, .. }
            | RelationDef::MorphMany { related, .. } => Some(related.clone()),
            RelationDef::MorphTo { name } => owner
                .get(&format!("{}_type", name))
                .map(|v| v.to_string())
                .filter(|t| !t.is_empty()),
        }
    }

    /// Memo key of this relation on `owner`
    pub fn memo_key(&self, owner: &Entity) -> String {
        match self {
            RelationDef::MorphOne { related, .. } | RelationDef::MorphMany { related, .. } => {
                format!("{}:{}:{}", self.kind(), related, owner.table())
            }
            RelationDef::MorphTo { name } => format!(
                "{}:{}:{}",
                self.kind(),
                name,
                self.related_table(owner).unwrap_or_default()
            ),
            _ => format!("{}:{}", self.kind(), self.related_table(owner).unwrap_or_default()),
        }
    }

    /// Query for the related rows, or `None` when the owner's key is unset
    fn build_query(&self, owner: &Entity, qb: QueryBuilder) -> Option<QueryBuilder> {
        let value = |column: &str| owner.get(column).filter(|v| !v.is_null()).cloned();
        let qb = match self {
            RelationDef::HasOne {
                related,
                foreign_key,
                local_key,
            } => qb.select(&["*"]).from(related).where_eq(foreign_key, value(local_key)?).limit(1),
            RelationDef::HasMany {
                related,
                foreign_key,
                local_key,
            } => qb.select(&["*"]).from(related).where_eq(foreign_key, value(local_key)?),
            RelationDef::BelongsTo {
                related,
                foreign_key,
                owner_key,
            } => qb.select(&["*"]).from(related).where_eq(owner_key, value(foreign_key)?).limit(1),
            RelationDef::BelongsToMany {
                related,
                pivot,
                foreign_pivot_key,
                related_pivot_key,
                parent_key,
                related_key,
            } => qb
                .select(&[format!("{}.*", related).as_str()])
                .from(related)
                .join(
                    pivot,
                    &format!("{}.{}", pivot, related_pivot_key),
                    "=",
                    &format!("{}.{}", related, related_key),
                )
                .where_eq(&format!("{}.{}", pivot, foreign_pivot_key), value(parent_key)?),
            RelationDef::HasManyThrough {
                related,
                through,
                first_key,
                second_key,
                local_key,
                second_local_key,
            } => qb
                .select(&[format!("{}.*", related).as_str()])
                .from(related)
                .join(
                    through,
                    &format!("{}.{}", through, second_local_key),
                    "=",
                    &format!("{}.{}", related, second_key),
                )
                .where_eq(&format!("{}.{}", through, first_key), value(local_key)?),
            RelationDef::MorphOne { related, name } | RelationDef::MorphMany { related, name } => {
                let qb = qb
                    .select(&["*"])
                    .from(related)
                    .where_eq(&format!("{}_type", name), owner.table())
                    .where_eq(&format!("{}_id", name), value(owner.primary_key())?);
                if self.is_many() {
                    qb
                } else {
                    qb.limit(1)
                }
            }
            RelationDef::MorphTo { name } => {
                let table = self.related_table(owner)?;
                qb.select(&["*"])
                    .from(&table)
                    .where_eq(super::DEFAULT_PRIMARY_KEY, value(&format!("{}_id", name))?)
                    .limit(1)
            }
        };
        Some(qb)
    }
}

/// Memoised result of a relation
#[derive(Debug, Clone)]
pub enum RelationValue {
    One(Option<Entity>),
    Many(Collection<Entity>),
}

impl RelationValue {
    pub fn as_one(&self) -> Option<&Entity> {
        match self {
            RelationValue::One(entity) => entity.as_ref(),
            RelationValue::Many(_) => None,
        }
    }

    pub fn as_many(&self) -> Option<&Collection<Entity>> {
        match self {
            RelationValue::Many(collection) => Some(collection),
            RelationValue::One(_) => None,
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            RelationValue::One(Some(entity)) => entity.to_json(),
            RelationValue::One(None) => JsonValue::Null,
            RelationValue::Many(collection) => JsonValue::Array(collection.items().iter().map(Entity::to_json).collect()),
        }
    }
}

impl Entity {
    /// Register a relation resolvable by name on this entity only
    pub fn define_relation(&mut self, name: &str, relation: RelationDef) -> &mut Self {
        self.relation_defs.insert(name.to_string(), relation);
        self
    }

    /// Named relation: this entity's own definitions first, then the ones
    /// registered for its table on the `Databaser`
    pub fn relation_def(&self, name: &str) -> Option<RelationDef> {
        self.relation_defs
            .get(name)
            .cloned()
            .or_else(|| self.db.as_ref().and_then(|db| db.relation_def(&self.table, name)))
    }

    /// Memoised value of a named relation, if it has been loaded
    pub fn loaded_relation(&self, name: &str) -> Option<&RelationValue> {
        let def = self.relation_def(name)?;
        self.relations.get(&def.memo_key(self))
    }

    /// Resolve a named relation
    pub async fn relation(&mut self, name: &str) -> ModelResult<RelationValue> {
        let def = self
            .relation_def(name)
            .ok_or_else(|| ModelError::Relationship(format!("relation '{}' is not defined on '{}'", name, self.table)))?;
        self.resolve(name, def).await
    }

    /// Load every relation listed in [`with`](Self::with)
    pub fn load_relations(&mut self) -> BoxFuture<'_, ModelResult<()>> {
        Box::pin(async move {
            for name in self.with.clone() {
                self.relation(&name).await?;
            }
            Ok(())
        })
    }

    /// Forget every memoised relation
    pub fn clear_relations(&mut self) {
        self.relations.clear();
    }

    pub async fn has_one(&mut self, related: &str, foreign_key: &str, local_key: &str) -> ModelResult<Option<Entity>> {
        let def = RelationDef::HasOne {
            related: related.to_string(),
            foreign_key: foreign_key.to_string(),
            local_key: local_key.to_string(),
        };
        Ok(self.resolve(related, def).await?.as_one().cloned())
    }

    pub async fn has_many(&mut self, related: &str, foreign_key: &str, local_key: &str) -> ModelResult<Collection<Entity>> {
        let def = RelationDef::HasMany {
            related: related.to_string(),
            foreign_key: foreign_key.to_string(),
            local_key: local_key.to_string(),
        };
        self.resolve_many(related, def).await
    }

    pub async fn belongs_to(&mut self, related: &str, foreign_key: &str, owner_key: &str) -> ModelResult<Option<Entity>> {
        let def = RelationDef::BelongsTo {
            related: related.to_string(),
            foreign_key: foreign_key.to_string(),
            owner_key: owner_key.to_string(),
        };
        Ok(self.resolve(related, def).await?.as_one().cloned())
    }

    pub async fn belongs_to_many(
        &mut self,
        related: &str,
        pivot: &str,
        foreign_pivot_key: &str,
        related_pivot_key: &str,
    ) -> ModelResult<Collection<Entity>> {
        let def = RelationDef::belongs_to_many(related, pivot, foreign_pivot_key, related_pivot_key);
        self.resolve_many(related, def).await
    }

    pub async fn has_many_through(
        &mut self,
        related: &str,
        through: &str,
        first_key: &str,
        second_key: &str,
    ) -> ModelResult<Collection<Entity>> {
        let def = RelationDef::has_many_through(related, through, first_key, second_key);
        self.resolve_many(related, def).await
    }

    pub async fn morph_one(&mut self, related: &str, name: &str) -> ModelResult<Option<Entity>> {
        let def = RelationDef::morph_one(related, name);
        Ok(self.resolve(related, def).await?.as_one().cloned())
    }

    pub async fn morph_many(&mut self, related: &str, name: &str) -> ModelResult<Collection<Entity>> {
        let def = RelationDef::morph_many(related, name);
        self.resolve_many(related, def).await
    }

    pub async fn morph_to(&mut self, name: &str) -> ModelResult<Option<Entity>> {
        let def = RelationDef::morph_to(name);
        Ok(self.resolve(name, def).await?.as_one().cloned())
    }

    async fn resolve_many(&mut self, name: &str, def: RelationDef) -> ModelResult<Collection<Entity>> {
        match self.resolve(name, def).await? {
            RelationValue::Many(collection) => Ok(collection),
            RelationValue::One(_) => Err(ModelError::Relationship(format!("relation '{}' is not a to-many relation", name))),
        }
    }

    /// Memo lookup, or query + memoise. `name` in the eager loads forces a re-fetch.
    async fn resolve(&mut self, name: &str, def: RelationDef) -> ModelResult<RelationValue> {
        let key = def.memo_key(self);
        let refetch = self.with.iter().any(|w| w == name || *w == key);
        if !refetch {
            if let Some(cached) = self.relations.get(&key) {
                return Ok(cached.clone());
            }
        }

        let db = self.db()?;
        let value = match def.build_query(self, db.builder()) {
            None => {
                if def.is_many() {
                    RelationValue::Many(Collection::from_items(Some(db), Vec::new()))
                } else {
                    RelationValue::One(None)
                }
            }
            Some(qb) => {
                tracing::debug!("Loading relation {} of '{}'", key, self.table);
                let entities = db.run(qb, ReturnType::Orm, &[]).await?.into_entities();
                let collection = entities.unwrap_or_else(|| Collection::from_items(Some(db.clone()), Vec::new()));
                if def.is_many() {
                    RelationValue::Many(collection)
                } else {
                    RelationValue::One(collection.into_items().into_iter().next())
                }
            }
        };
        self.relations.insert(key, value.clone());
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Dialect;
    use crate::row;
    use crate::value::Value;

    fn owner() -> Entity {
        let mut entity = Entity::detached("users");
        entity.fill(row! {"id" => 7, "team_id" => 3, "imageable_type" => "posts", "imageable_id" => 9});
        entity
    }

    fn sql(def: &RelationDef, owner: &Entity) -> Option<(String, Vec<Value>)> {
        def.build_query(owner, QueryBuilder::new(Dialect::MySql))
            .map(|qb| qb.get_query().unwrap())
            .map(|c| (c.query, c.bindings))
    }

    #[test]
    fn test_memo_keys() {
        let user = owner();
        assert_eq!(RelationDef::has_many("posts", "user_id").memo_key(&user), "hasMany:posts");
        assert_eq!(RelationDef::morph_many("images", "imageable").memo_key(&user), "morphMany:images:users");
        assert_eq!(RelationDef::morph_to("imageable").memo_key(&user), "morphTo:imageable:posts");
    }

    #[test]
    fn test_relation_queries() {
        let user = owner();
        assert_eq!(
            sql(&RelationDef::has_many("posts", "user_id"), &user),
            Some(("SELECT * FROM `posts` WHERE `user_id` = ?".to_string(), vec![Value::Int(7)]))
        );
        assert_eq!(
            sql(&RelationDef::belongs_to("teams", "team_id"), &user),
            Some(("SELECT * FROM `teams` WHERE `id` = ? LIMIT ?".to_string(), vec![Value::Int(3), Value::Int(1)]))
        );
        assert_eq!(
            sql(&RelationDef::belongs_to_many("roles", "role_user", "user_id", "role_id"), &user).unwrap().0,
            "SELECT `roles`.* FROM `roles` INNER JOIN `role_user` ON `role_user`.`role_id` = `roles`.`id` WHERE `role_user`.`user_id` = ?"
        );
        assert_eq!(
            sql(&RelationDef::morph_to("imageable"), &user),
            Some(("SELECT * FROM `posts` WHERE `id` = ? LIMIT ?".to_string(), vec![Value::Int(9), Value::Int(1)]))
        );
    }

    #[test]
    fn test_missing_key_skips_query() {
        let user = Entity::detached("users");
        assert_eq!(sql(&RelationDef::has_many("posts", "user_id"), &user), None);
        assert_eq!(sql(&RelationDef::morph_to("imageable"), &user), None);
    }
}
