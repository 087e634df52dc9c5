//! Active-record persistence against a recording driver

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{databaser, databaser_for, MockDriver};
use dotapp_cache::{CacheConfig, CacheDriver, CacheResult, MemoryBackend};
use dotapp_databaser::{row, Databaser, Entity, EntityEvent, EventError, ModelError, RelationDef, Value};
use parking_lot::Mutex;

/// `users` row 1 plus two `posts` rows owned by it
fn blog() -> MockDriver {
    MockDriver::new().insert_id(42).respond(|sql, bindings| {
        if sql.contains("FROM `users`") {
            vec![row! {
                "id" => 1,
                "name" => "Ada",
                "email" => "ada@example.com",
                "updated_at" => "2024-01-01 00:00:00",
            }]
        } else if sql.contains("FROM `posts`") && bindings.first() == Some(&Value::Int(1)) {
            vec![
                row! {"id" => 10, "user_id" => 1, "title" => "Notes"},
                row! {"id" => 11, "user_id" => 1, "title" => "Engines"},
            ]
        } else {
            Vec::new()
        }
    })
}

async fn ada(db: &Arc<Databaser>) -> Entity {
    Entity::find(db.clone(), "users", 1).await.unwrap().expect("user 1 exists")
}

#[tokio::test]
async fn test_update_sends_only_dirty_columns() {
    let driver = blog();
    let db = databaser(&driver).await;
    let mut user = ada(&db).await;
    assert!(!user.is_dirty());

    user.set("name", "Grace");
    assert_eq!(user.get_dirty(), row! {"name" => "Grace"});
    user.save().await.unwrap();

    let (sql, bindings) = driver.log.last();
    assert_eq!(sql, "UPDATE `users` SET `name` = ?, `updated_at` = ? WHERE `id` = ?");
    assert_eq!(bindings[0], Value::from("Grace"));
    assert_eq!(bindings[2], Value::Int(1));
    assert_ne!(user.get("updated_at"), Some(&Value::from("2024-01-01 00:00:00")));

    assert!(!user.is_dirty());
    assert_eq!(user.get_original(), user.attributes());
}

#[tokio::test]
async fn test_clean_save_skips_database() {
    let driver = blog();
    let db = databaser(&driver).await;
    let mut user = ada(&db).await;
    let before = driver.log.sql().len();

    user.save().await.unwrap();
    assert_eq!(driver.log.sql().len(), before);
}

#[tokio::test]
async fn test_create_takes_generated_key() {
    let driver = blog();
    let db = databaser(&driver).await;

    let user = Entity::create(db.clone(), "users", [("name", "Ada"), ("email", "ada@example.com")])
        .await
        .unwrap();

    assert_eq!(user.get_key(), Some(&Value::Int(42)));
    assert!(!user.is_new());
    assert!(!user.is_dirty());
    assert_eq!(driver.log.last().0, "INSERT INTO `users` (`email`, `name`) VALUES (?, ?)");
}

#[tokio::test]
async fn test_create_uses_returning_where_supported() {
    let driver = MockDriver::new().respond(|sql, _| {
        if sql.starts_with("INSERT") {
            vec![row! {"id" => 7}]
        } else {
            Vec::new()
        }
    });
    let db = databaser_for(&driver, "postgres://localhost/app").await;

    let user = Entity::create(db, "users", [("name", "Ada")]).await.unwrap();

    assert_eq!(user.get_key(), Some(&Value::Int(7)));
    assert_eq!(driver.log.last().0, "INSERT INTO \"users\" (\"name\") VALUES (?) RETURNING \"id\"");
    assert_eq!(driver.log.executes(), 0);
}

#[tokio::test]
async fn test_lifecycle_events_in_order() {
    let driver = blog();
    let db = databaser(&driver).await;
    let fired = Arc::new(Mutex::new(Vec::new()));

    let mut user = db.new_entity("users");
    for event in [
        EntityEvent::Saving,
        EntityEvent::Creating,
        EntityEvent::Created,
        EntityEvent::Updating,
        EntityEvent::Updated,
        EntityEvent::Saved,
    ] {
        let fired = fired.clone();
        user.on(event, move |_| {
            fired.lock().push(event.as_str());
            Ok(())
        });
    }

    user.set("name", "Ada");
    user.save().await.unwrap();
    user.set("name", "Grace");
    user.save().await.unwrap();

    assert_eq!(
        *fired.lock(),
        vec!["saving", "creating", "saved", "created", "saving", "updating", "saved", "updated"]
    );
}

#[tokio::test]
async fn test_failing_handler_aborts_save() {
    let driver = blog();
    let db = databaser(&driver).await;

    let mut user = db.new_entity("users");
    user.set("name", "Ada");
    user.on(EntityEvent::Creating, |entity| {
        Err(EventError::handler_failed(format!("{} is read-only", entity.table())))
    });

    let err = user.save().await.unwrap_err();
    assert!(matches!(err, ModelError::Event(ref msg) if msg.contains("users is read-only")));
    assert!(driver.log.sql().is_empty());
    assert!(user.is_new());
}

#[tokio::test]
async fn test_validation_blocks_invalid_rows() {
    let driver = blog();
    let db = databaser(&driver).await;

    let mut user = db.new_entity("users");
    user.set_rules([("email", "required|email")]);
    user.set("email", "not-an-address");

    assert!(matches!(user.save().await, Err(ModelError::Validation(_))));
    assert!(driver.log.sql().is_empty());
}

#[tokio::test]
async fn test_soft_delete_and_restore() {
    let driver = blog();
    let db = databaser(&driver).await;
    let mut user = ada(&db).await;
    user.set_soft_deletes(true);

    user.delete().await.unwrap();
    assert!(user.trashed());
    let (sql, _) = driver.log.last();
    assert!(sql.starts_with("UPDATE `users` SET `deleted_at` = ?"), "{}", sql);
    assert!(!driver.log.sql().iter().any(|s| s.starts_with("DELETE")));

    user.restore().await.unwrap();
    assert!(!user.trashed());
    assert_eq!(driver.log.last().1[0], Value::Null);

    user.force_delete().await.unwrap();
    assert_eq!(driver.log.last().0, "DELETE FROM `users` WHERE `id` = ?");
    assert!(user.soft_deletes());
}

#[tokio::test]
async fn test_delete_requires_key() {
    let driver = blog();
    let db = databaser(&driver).await;
    let mut user = db.new_entity("users");

    assert!(matches!(user.delete().await, Err(ModelError::MissingPrimaryKey)));
}

#[tokio::test]
async fn test_refresh_reloads_attributes() {
    let driver = blog();
    let db = databaser(&driver).await;
    let mut user = ada(&db).await;

    user.set("name", "Changed");
    user.refresh().await.unwrap();
    assert_eq!(user.get("name"), Some(&Value::from("Ada")));
    assert!(!user.is_dirty());

    let mut ghost = Entity::from_row(db.clone(), "ghosts", row! {"id" => 9});
    assert!(matches!(ghost.refresh().await, Err(ModelError::NotFound(_))));
}

#[tokio::test]
async fn test_save_invalidates_table_cache() {
    let driver = blog();
    let cache: Arc<dyn CacheDriver> = Arc::new(MemoryBackend::new(CacheConfig::default()));
    let db = Databaser::new(common::config("mysql://localhost/app"))
        .with_driver(Arc::new(driver.clone()))
        .with_cache(cache)
        .shared();
    db.select_db("main").await.unwrap();

    let mut users = db.q(|qb| qb.select(&["*"]).from("users")).all().await.unwrap();
    db.q(|qb| qb.select(&["*"]).from("users")).all().await.unwrap();
    assert_eq!(driver.log.fetches(), 1);

    let mut user = users.first().await.unwrap().cloned().expect("one user");
    user.set("name", "Grace");
    user.save().await.unwrap();

    db.q(|qb| qb.select(&["*"]).from("users")).all().await.unwrap();
    assert_eq!(driver.log.fetches(), 2);
}

/// Cache store without pattern deletes
struct KeyValueOnly;

#[async_trait]
impl CacheDriver for KeyValueOnly {
    async fn get(&self, _key: &str) -> CacheResult<Option<Vec<u8>>> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Option<Duration>) -> CacheResult<()> {
        Ok(())
    }

    async fn forget(&self, _key: &str) -> CacheResult<bool> {
        Ok(false)
    }

    async fn flush(&self) -> CacheResult<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_invalidation_needs_pattern_deletes() {
    let driver = blog();
    let db = Databaser::new(common::config("mysql://localhost/app"))
        .with_driver(Arc::new(driver.clone()))
        .with_cache(Arc::new(KeyValueOnly))
        .shared();
    db.select_db("main").await.unwrap();

    let mut user = db.new_entity("users");
    user.set("name", "Ada");
    assert!(matches!(user.save().await, Err(ModelError::Cache(_))));
}

#[tokio::test]
async fn test_relations_are_memoised() {
    let driver = blog();
    let db = databaser(&driver).await;
    db.define_relation("users", "posts", RelationDef::has_many("posts", "user_id"));
    let mut user = ada(&db).await;
    let base = driver.log.fetches();

    let posts = user.relation("posts").await.unwrap();
    assert_eq!(posts.as_many().map(|c| c.items().len()), Some(2));
    user.relation("posts").await.unwrap();
    assert_eq!(driver.log.fetches(), base + 1);
    assert_eq!(driver.log.last().0, "SELECT * FROM `posts` WHERE `user_id` = ?");

    // Listing the relation as an eager load forces a fresh query
    user.with(&["posts"]);
    user.relation("posts").await.unwrap();
    assert_eq!(driver.log.fetches(), base + 2);

    user.clear_relations();
    assert!(user.loaded_relation("posts").is_none());
}

#[tokio::test]
async fn test_belongs_to_and_missing_keys() {
    let driver = blog();
    let db = databaser(&driver).await;

    let mut post = Entity::from_row(db.clone(), "posts", row! {"id" => 10, "user_id" => 1});
    let author = post.belongs_to("users", "user_id", "id").await.unwrap().expect("author");
    assert_eq!(author.get("name"), Some(&Value::from("Ada")));
    assert_eq!(driver.log.last().0, "SELECT * FROM `users` WHERE `id` = ? LIMIT ?");

    let before = driver.log.sql().len();
    let mut orphan = Entity::from_row(db.clone(), "posts", row! {"id" => 12, "user_id" => Value::Null});
    assert!(orphan.belongs_to("users", "user_id", "id").await.unwrap().is_none());
    assert_eq!(driver.log.sql().len(), before);
}

#[tokio::test]
async fn test_eager_loading_through_query() {
    let driver = blog();
    let db = databaser(&driver).await;
    db.define_relation("users", "posts", RelationDef::has_many("posts", "user_id"));

    let users = db
        .q(|qb| qb.select(&["*"]).from("users"))
        .with(&["posts"])
        .all()
        .await
        .unwrap();

    let user = &users.items()[0];
    let posts = user.loaded_relation("posts").and_then(|r| r.as_many()).expect("posts loaded");
    assert_eq!(posts.items().len(), 2);
    assert_eq!(user.to_json()["posts"][1]["title"], "Engines");
}
