//! Persistence: save / delete state machine

use std::sync::Arc;

use super::{Entity, CREATED_AT, TIMESTAMP_FORMAT, UPDATED_AT};
use crate::databaser::{Databaser, QueryOutput, ReturnType};
use crate::error::{ModelError, ModelResult};
use crate::events::EntityEvent;
use crate::value::{Row, Value};

fn now() -> Value {
    Value::String(chrono::Local::now().format(TIMESTAMP_FORMAT).to_string())
}

impl Entity {
    /// Build, fill and save a new entity
    pub async fn create<K, V, I>(db: Arc<Databaser>, table: &str, attributes: I) -> ModelResult<Entity>
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut entity = Entity::new(db, table);
        entity.fill(attributes);
        entity.save().await?;
        Ok(entity)
    }

    /// Load the row of `table` whose primary key is `id`
    pub async fn find(db: Arc<Databaser>, table: &str, id: impl Into<Value>) -> ModelResult<Option<Entity>> {
        let id = id.into();
        let row = db
            .q(|qb| qb.select(&["*"]).from(table).where_eq(super::DEFAULT_PRIMARY_KEY, id))
            .first_row()
            .await?;
        Ok(row.map(|row| Entity::from_row(db, table, row)))
    }

    /// Stamp `created_at` (new rows only) and `updated_at`, but only columns
    /// the entity already carries
    fn touch_timestamps(&mut self, is_new: bool) {
        let stamp = now();
        if is_new && self.has(CREATED_AT) {
            self.set(CREATED_AT, stamp.clone());
        }
        if self.has(UPDATED_AT) {
            self.set(UPDATED_AT, stamp);
        }
    }

    /// Insert a new entity or update the dirty columns of a persisted one.
    ///
    /// Fires `saving`, then `creating` for new entities. A clean entity
    /// fires `saved` and `created`/`updated` without touching the database.
    /// Otherwise timestamps are applied, the rules are checked and
    /// `updating` fires for persisted entities before the statement runs.
    pub async fn save(&mut self) -> ModelResult<()> {
        let db = self.db()?;
        let is_new = self.is_new();

        self.fire(EntityEvent::Saving)?;
        if is_new {
            self.fire(EntityEvent::Creating)?;
        }

        if !self.is_dirty() {
            self.fire(EntityEvent::Saved)?;
            return self.fire(if is_new { EntityEvent::Created } else { EntityEvent::Updated });
        }

        self.touch_timestamps(is_new);
        self.validate()?;
        if !is_new {
            self.fire(EntityEvent::Updating)?;
        }

        let dirty = self.get_dirty();
        if is_new {
            self.insert(&db, dirty).await?;
        } else {
            self.update(&db, dirty).await?;
        }

        self.sync_original();
        self.load_relations().await?;
        db.invalidate_table(&self.table).await?;

        self.fire(EntityEvent::Saved)?;
        self.fire(if is_new { EntityEvent::Created } else { EntityEvent::Updated })
    }

    async fn insert(&mut self, db: &Arc<Databaser>, dirty: Row) -> ModelResult<()> {
        let pk = self.primary_key.clone();
        let mut qb = db.builder().insert(&self.table, dirty);
        if qb.dialect().supports_returning() {
            qb = qb.returning(&[pk.as_str()]);
        }

        let id = match db.run(qb, ReturnType::Raw, &[]).await? {
            QueryOutput::Rows(rows) => rows.into_iter().next().and_then(|mut row| row.remove(&pk)),
            QueryOutput::Executed(data) => data.insert_id.map(Value::Int),
            QueryOutput::Entities(_) | QueryOutput::Skipped => None,
        };
        match id {
            Some(id) if !id.is_null() => {
                tracing::debug!("Inserted '{}' row with {} = {}", self.table, pk, id);
                self.attributes.insert(pk, id);
            }
            _ => tracing::debug!("Inserted '{}' row without a generated key", self.table),
        }
        Ok(())
    }

    async fn update(&mut self, db: &Arc<Databaser>, dirty: Row) -> ModelResult<()> {
        let key = self.get_key().cloned().ok_or(ModelError::MissingPrimaryKey)?;
        let qb = db
            .builder()
            .update(&self.table)
            .set_values(dirty)
            .where_eq(&self.primary_key, key);
        db.run(qb, ReturnType::Raw, &[]).await?;
        Ok(())
    }

    /// Soft-delete (mark and save) or hard-delete the row
    pub async fn delete(&mut self) -> ModelResult<()> {
        let key = self.get_key().cloned().ok_or(ModelError::MissingPrimaryKey)?;
        if self.soft_deletes {
            let column = self.deleted_at_column.clone();
            self.set(&column, now());
            return self.save().await;
        }

        let db = self.db()?;
        self.fire(EntityEvent::Deleting)?;
        let qb = db.builder().delete_from(&self.table).where_eq(&self.primary_key, key);
        db.run(qb, ReturnType::Raw, &[]).await?;
        db.invalidate_table(&self.table).await?;
        self.fire(EntityEvent::Deleted)
    }

    /// Issue a real DELETE even when soft deletes are enabled
    pub async fn force_delete(&mut self) -> ModelResult<()> {
        let soft_deletes = self.soft_deletes;
        self.soft_deletes = false;
        let result = self.delete().await;
        self.soft_deletes = soft_deletes;
        result
    }

    /// Clear the soft-delete mark and save
    pub async fn restore(&mut self) -> ModelResult<()> {
        if !self.soft_deletes {
            return Ok(());
        }
        let column = self.deleted_at_column.clone();
        self.set(&column, Value::Null);
        self.save().await
    }

    /// Whether the entity carries a soft-delete mark
    pub fn trashed(&self) -> bool {
        self.soft_deletes && self.get(&self.deleted_at_column).map_or(false, |v| !v.is_null())
    }

    /// Reload attributes from the database and forget memoised relations
    pub async fn refresh(&mut self) -> ModelResult<()> {
        let db = self.db()?;
        let key = self.get_key().cloned().ok_or(ModelError::MissingPrimaryKey)?;
        let (table, pk) = (self.table.clone(), self.primary_key.clone());
        let row = db
            .q(|qb| qb.select(&["*"]).from(&table).where_eq(&pk, key))
            .first_row()
            .await?
            .ok_or_else(|| ModelError::NotFound(table.clone()))?;

        self.attributes = row;
        self.sync_original();
        self.clear_relations();
        self.load_relations().await
    }
}
