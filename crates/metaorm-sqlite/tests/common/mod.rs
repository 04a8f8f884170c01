//! Shared fixtures: a blog schema in SQLite and its catalog.

#![allow(dead_code)]

use std::sync::Arc;

use metaorm_core::proto::{FilterExpr, Identifier, Raw, Value};
use metaorm_core::{
    Backend, CastRegistry, Catalog, Entity, EntityDef, MetaBridge, MetaTableDef, PivotDef,
    RelationDef,
};
use metaorm_sqlite::SqliteBackend;

pub const SCHEMA: &str = r#"
CREATE TABLE posts (
    ID INTEGER PRIMARY KEY AUTOINCREMENT,
    post_title TEXT NOT NULL DEFAULT '',
    post_author INTEGER NOT NULL DEFAULT 0,
    post_type TEXT NOT NULL DEFAULT 'post',
    menu_order INTEGER NOT NULL DEFAULT 0,
    post_date TEXT
);
CREATE TABLE postmeta (
    meta_id INTEGER PRIMARY KEY AUTOINCREMENT,
    post_id INTEGER NOT NULL DEFAULT 0,
    meta_key TEXT,
    meta_value TEXT
);
CREATE INDEX idx_postmeta_post ON postmeta(post_id);
CREATE INDEX idx_postmeta_key ON postmeta(meta_key);

CREATE TABLE users (
    ID INTEGER PRIMARY KEY AUTOINCREMENT,
    user_login TEXT NOT NULL DEFAULT ''
);
CREATE TABLE usermeta (
    umeta_id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL DEFAULT 0,
    meta_key TEXT,
    meta_value TEXT
);

CREATE TABLE comments (
    comment_ID INTEGER PRIMARY KEY AUTOINCREMENT,
    comment_post_ID INTEGER NOT NULL DEFAULT 0,
    user_id INTEGER NOT NULL DEFAULT 0,
    comment_content TEXT NOT NULL DEFAULT '',
    comment_approved TEXT NOT NULL DEFAULT '1'
);
CREATE TABLE commentmeta (
    meta_id INTEGER PRIMARY KEY AUTOINCREMENT,
    comment_id INTEGER NOT NULL DEFAULT 0,
    meta_key TEXT,
    meta_value TEXT
);

CREATE TABLE terms (
    term_id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL DEFAULT ''
);
CREATE TABLE term_relationships (
    object_id INTEGER NOT NULL,
    term_taxonomy_id INTEGER NOT NULL,
    PRIMARY KEY (object_id, term_taxonomy_id)
);
"#;

/// Route `tracing` output to the test harness. `RUST_LOG` selects the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn catalog() -> Catalog {
    let catalog = Catalog::new(Arc::new(CastRegistry::with_builtins()));
    let defs = [
        EntityDef::new("Post", "posts")
            .with_primary_key("ID")
            .with_meta(MetaTableDef::new("postmeta", "post_id"))
            .with_cast("post_author", "integer")
            .with_cast("menu_order", "integer")
            .with_cast("post_date", "datetime")
            .with_meta_cast("price", "integer")
            .with_meta_cast("featured", "boolean")
            .with_meta_cast("weight", "float")
            .with_meta_cast("launch", "date")
            .with_meta_cast("published_at", "datetime")
            .with_meta_cast("sizes", "array")
            .with_meta_cast("specs", "json")
            .with_relation(RelationDef::one_to_one("author", "User", "post_author", "ID"))
            .with_relation(
                RelationDef::one_to_many("comments", "Comment", "ID", "comment_post_ID")
                    .with_constraint(FilterExpr::eq("comment_approved", "1")),
            )
            .with_relation(RelationDef::many_to_many(
                "terms",
                "Term",
                "ID",
                "term_id",
                PivotDef::new("term_relationships", "object_id", "term_taxonomy_id"),
            )),
        EntityDef::new("Page", "posts")
            .with_primary_key("ID")
            .with_meta(MetaTableDef::new("postmeta", "post_id"))
            .with_discriminator("post_type", "page"),
        EntityDef::new("Comment", "comments")
            .with_primary_key("comment_ID")
            .with_meta(MetaTableDef::new("commentmeta", "comment_id"))
            .with_meta_cast("rating", "integer")
            .with_relation(RelationDef::one_to_one("user", "User", "user_id", "ID")),
        EntityDef::new("User", "users")
            .with_primary_key("ID")
            .with_meta(MetaTableDef::new("usermeta", "user_id").with_id_column("umeta_id")),
        EntityDef::new("Term", "terms").with_primary_key("term_id"),
    ];
    for def in defs {
        catalog.register(def).unwrap();
    }
    catalog.validate().unwrap();
    catalog
}

pub struct Blog {
    pub backend: SqliteBackend,
    pub catalog: Catalog,
}

impl Blog {
    pub fn new() -> Self {
        init_tracing();
        let backend = SqliteBackend::open_in_memory().unwrap();
        backend.execute_batch(SCHEMA).unwrap();
        Self {
            backend,
            catalog: catalog(),
        }
    }

    pub fn entity(&self, name: &str) -> Entity {
        Entity::new(self.catalog.model(name).unwrap())
    }

    pub fn user(&self, login: &str) -> Entity {
        let mut user = self.entity("User");
        user.set("user_login", login).unwrap();
        user.save(&self.backend).unwrap();
        user
    }

    pub fn post(&self, title: &str, author: &Entity) -> Entity {
        let mut post = self.entity("Post");
        post.set("post_title", title).unwrap();
        post.set("post_author", id_of(author)).unwrap();
        post.save(&self.backend).unwrap();
        post
    }

    pub fn comment(&self, post: &Entity, user: &Entity, content: &str, approved: bool) -> Entity {
        let mut comment = self.entity("Comment");
        comment.set("comment_post_ID", id_of(post)).unwrap();
        comment.set("user_id", id_of(user)).unwrap();
        comment.set("comment_content", content).unwrap();
        comment
            .set("comment_approved", if approved { "1" } else { "0" })
            .unwrap();
        comment.save(&self.backend).unwrap();
        comment
    }

    pub fn set_meta(&self, entity: &mut Entity, key: &str, value: impl Into<Value>) {
        MetaBridge::new(&self.backend)
            .set_meta(entity, key, value)
            .unwrap();
    }

    /// Insert a meta record directly, bypassing the bridge.
    pub fn insert_meta_row(&self, post_id: i64, key: &str, value: &str) {
        self.backend
            .execute(
                "INSERT INTO postmeta (post_id, meta_key, meta_value) VALUES (?, ?, ?)",
                &[
                    Raw::Integer(post_id),
                    Raw::Text(key.into()),
                    Raw::Text(value.into()),
                ],
            )
            .unwrap();
    }

    /// Number of rows matching a `SELECT COUNT(*) AS n ...` statement.
    pub fn count(&self, sql: &str, bindings: &[Raw]) -> i64 {
        let rows = self.backend.execute(sql, bindings).unwrap();
        rows[0].get("n").and_then(Raw::as_i64).unwrap()
    }

    pub fn meta_rows(&self, post_id: i64, key: &str) -> i64 {
        self.count(
            "SELECT COUNT(*) AS n FROM postmeta WHERE post_id = ? AND meta_key = ?",
            &[Raw::Integer(post_id), Raw::Text(key.into())],
        )
    }
}

pub fn id_of(entity: &Entity) -> i64 {
    match entity.id() {
        Some(Identifier::Int(id)) => *id,
        other => panic!("expected an integer key, got {:?}", other),
    }
}

pub fn title_of(entity: &Entity) -> String {
    entity
        .get("post_title")
        .unwrap()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}
