//! Integration tests against a live Postgres.
//!
//! Run with a scratch database:
//!
//! ```sh
//! DATABASE_URL=postgres://postgres@localhost/driftway_test \
//!     cargo test -p driftway-pg --test live_pg -- --ignored --test-threads=1
//! ```
//!
//! Each test owns its tables and its ledger rows, so the suite can run
//! repeatedly against the same database; single-threaded because the
//! ledger bootstrap is shared.

use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};

use driftway_core::ddl;
use driftway_core::{
    CollectionDescriptor, FieldDescriptor, FieldType, IndexDescriptor, SchemaRegistry, Statement,
};
use driftway_pg::{
    normalize_editable_field, denormalize_editable_field, sync, BackgroundTasks, Downgrade,
    HashGuard, MigrateError, Migration, MigrationContext, MigrationFuture, Runner,
};

async fn pool() -> PgPool {
    let url = std::env::var("DATABASE_URL").expect("set DATABASE_URL to run live tests");
    PgPoolOptions::new()
        .max_connections(4)
        .connect(&url)
        .await
        .expect("failed to connect to test database")
}

async fn exec(pool: &PgPool, sql: &str) {
    sqlx::query(sql).execute(pool).await.expect(sql);
}

async fn exec_stmt(pool: &PgPool, stmt: &Statement) {
    sqlx::query(&stmt.sql).execute(pool).await.expect(&stmt.sql);
}

async fn clear_ledger_rows(pool: &PgPool, pattern: &str) {
    exec(pool, "CREATE TABLE IF NOT EXISTS \"_driftway_migrations\" (\"id\" SERIAL PRIMARY KEY, \"name\" VARCHAR(255) NOT NULL UNIQUE, \"checksum\" VARCHAR(64), \"schemaHash\" VARCHAR(64), \"appliedAt\" TIMESTAMPTZ NOT NULL DEFAULT NOW())").await;
    sqlx::query("DELETE FROM \"_driftway_migrations\" WHERE \"name\" LIKE $1")
        .bind(pattern)
        .execute(pool)
        .await
        .expect("ledger cleanup");
}

async fn column_type(pool: &PgPool, table: &str, column: &str) -> Option<(String, String)> {
    let row = sqlx::query(
        "SELECT data_type, is_nullable FROM information_schema.columns
         WHERE table_schema = 'public' AND table_name = $1 AND column_name = $2",
    )
    .bind(table)
    .bind(column)
    .fetch_optional(pool)
    .await
    .expect("catalog query");
    row.map(|r| (r.get("data_type"), r.get("is_nullable")))
}

// ---------------------------------------------------------------------------
// Builders: idempotence and catalog visibility
// ---------------------------------------------------------------------------

fn books_base() -> CollectionDescriptor {
    CollectionDescriptor::new("Books")
}

fn books_with_toc() -> CollectionDescriptor {
    CollectionDescriptor::new("Books").field(FieldDescriptor::new("tocTitle", FieldType::Text))
}

#[tokio::test]
#[ignore = "requires a running Postgres (DATABASE_URL)"]
async fn add_field_is_idempotent_and_lands_in_catalog() {
    let pool = pool().await;
    exec(&pool, "DROP TABLE IF EXISTS \"Books\"").await;
    exec_stmt(&pool, &ddl::create_table(&books_base())).await;

    let add = ddl::add_field(&books_with_toc(), "tocTitle").unwrap();
    exec_stmt(&pool, &add).await;
    // Second run is a guarded no-op, not an error.
    exec_stmt(&pool, &add).await;

    let (data_type, is_nullable) = column_type(&pool, "Books", "tocTitle").await.unwrap();
    assert_eq!(data_type, "text");
    assert_eq!(is_nullable, "YES");
}

#[tokio::test]
#[ignore = "requires a running Postgres (DATABASE_URL)"]
async fn create_table_is_idempotent() {
    let pool = pool().await;
    exec(&pool, "DROP TABLE IF EXISTS \"ElectionVotes\"").await;

    let votes = CollectionDescriptor::new("ElectionVotes")
        .field(FieldDescriptor::new("electionName", FieldType::Text).not_null())
        .field(FieldDescriptor::new("userId", FieldType::Varchar(27)));
    exec_stmt(&pool, &ddl::create_table(&votes)).await;
    // Table already exists: still succeeds.
    exec_stmt(&pool, &ddl::create_table(&votes)).await;
}

#[tokio::test]
#[ignore = "requires a running Postgres (DATABASE_URL)"]
async fn update_default_value_does_not_backfill_existing_rows() {
    let pool = pool().await;
    exec(&pool, "DROP TABLE IF EXISTS \"Users\"").await;

    let users_v1 =
        CollectionDescriptor::new("Users").field(FieldDescriptor::new("karma", FieldType::Double));
    exec_stmt(&pool, &ddl::create_table(&users_v1)).await;
    exec(
        &pool,
        "INSERT INTO \"Users\" (\"_id\", \"karma\") VALUES ('u1', 5)",
    )
    .await;

    let users_v2 = CollectionDescriptor::new("Users")
        .field(FieldDescriptor::new("karma", FieldType::Double).default("0"));
    exec_stmt(&pool, &ddl::update_default_value(&users_v2, "karma").unwrap()).await;

    // The default is visible in the catalog...
    let default: Option<String> = sqlx::query_scalar(
        "SELECT column_default FROM information_schema.columns
         WHERE table_schema = 'public' AND table_name = 'Users' AND column_name = 'karma'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert!(default.unwrap_or_default().contains('0'));

    // ...existing rows are untouched...
    let existing: f64 = sqlx::query_scalar("SELECT \"karma\" FROM \"Users\" WHERE \"_id\" = 'u1'")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(existing, 5.0);

    // ...and new rows pick the default up.
    exec(&pool, "INSERT INTO \"Users\" (\"_id\") VALUES ('u2')").await;
    let fresh: f64 = sqlx::query_scalar("SELECT \"karma\" FROM \"Users\" WHERE \"_id\" = 'u2'")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(fresh, 0.0);
}

// ---------------------------------------------------------------------------
// Index synchronizer
// ---------------------------------------------------------------------------

#[tokio::test]
#[ignore = "requires a running Postgres (DATABASE_URL)"]
async fn update_indexes_converges_to_a_fixed_point() {
    let pool = pool().await;
    exec(&pool, "DROP TABLE IF EXISTS \"Posts\"").await;

    let posts = CollectionDescriptor::new("Posts")
        .field(FieldDescriptor::new("postedAt", FieldType::Timestamptz))
        .field(FieldDescriptor::new("userId", FieldType::Varchar(27)))
        .index(IndexDescriptor::new(["postedAt"]))
        .index(IndexDescriptor::new(["userId", "postedAt"]));
    let registry = SchemaRegistry::new().collection_def(posts.clone());

    exec_stmt(&pool, &ddl::create_table(&posts)).await;
    // A stray index inside the naming convention: sync should drop it.
    exec(
        &pool,
        "CREATE INDEX IF NOT EXISTS \"idx_posts_legacyid\" ON \"Posts\" (\"_id\")",
    )
    .await;

    let mut conn = pool.acquire().await.unwrap();
    let first = sync::update_indexes(&mut conn, &registry, &posts).await.unwrap();
    assert_eq!(first.indexes_created, 2);
    assert_eq!(first.indexes_dropped, 1);

    let second = sync::update_indexes(&mut conn, &registry, &posts).await.unwrap();
    assert_eq!(second.indexes_created, 0);
    assert_eq!(second.indexes_dropped, 0);
}

#[tokio::test]
#[ignore = "requires a running Postgres (DATABASE_URL)"]
async fn background_queue_builds_custom_indexes_and_reports_completion() {
    let pool = pool().await;
    exec(&pool, "DROP TABLE IF EXISTS \"TagRels\"").await;
    let tag_rels = CollectionDescriptor::new("TagRels")
        .field(FieldDescriptor::new("tagId", FieldType::Varchar(27)))
        .field(FieldDescriptor::new("deleted", FieldType::Bool).default("FALSE"));
    exec_stmt(&pool, &ddl::create_table(&tag_rels)).await;

    let registry = SchemaRegistry::new()
        .collection_def(tag_rels)
        .custom_index(driftway_core::CustomIndex {
            name: "idx_tagrels_tagid_live".to_string(),
            create_sql: "CREATE INDEX IF NOT EXISTS \"idx_tagrels_tagid_live\" ON \"TagRels\" (\"tagId\") WHERE \"deleted\" IS NOT TRUE".to_string(),
        });

    let tasks = BackgroundTasks::new();
    let queued = sync::queue_custom_indexes(&tasks, &pool, &registry);
    assert_eq!(queued, 1);

    let outcomes = tasks.drain().await;
    assert_eq!(outcomes.len(), 1);
    assert!(outcomes[0].result.is_ok());
    assert_eq!(tasks.in_flight(), 0);

    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM pg_indexes WHERE indexname = 'idx_tagrels_tagid_live')",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert!(exists);
}

// ---------------------------------------------------------------------------
// Runner: apply-once, revert, hash guard
// ---------------------------------------------------------------------------

fn essays_base() -> CollectionDescriptor {
    CollectionDescriptor::new("Essays")
}

fn essays_with_subtitle() -> CollectionDescriptor {
    CollectionDescriptor::new("Essays").field(FieldDescriptor::new("subtitle", FieldType::Text))
}

struct CreateEssays;

impl Migration for CreateEssays {
    fn name(&self) -> &str {
        "20240101000000_essays_create"
    }

    fn up<'c>(&'c self, ctx: &'c mut MigrationContext) -> MigrationFuture<'c> {
        Box::pin(async move {
            ctx.execute(&ddl::create_table(&essays_base())).await?;
            Ok(())
        })
    }

    fn down(&self) -> Downgrade {
        Downgrade::Sql(vec![ddl::drop_table(&essays_base())])
    }
}

struct AddEssaySubtitle;

impl Migration for AddEssaySubtitle {
    fn name(&self) -> &str {
        "20240102000000_essays_add_subtitle"
    }

    fn up<'c>(&'c self, ctx: &'c mut MigrationContext) -> MigrationFuture<'c> {
        Box::pin(async move {
            ctx.execute(&ddl::add_field(&essays_with_subtitle(), "subtitle")?)
                .await?;
            Ok(())
        })
    }

    fn down(&self) -> Downgrade {
        Downgrade::Sql(vec![
            ddl::drop_field(&essays_with_subtitle(), "subtitle").expect("declared field"),
        ])
    }
}

#[tokio::test]
#[ignore = "requires a running Postgres (DATABASE_URL)"]
async fn runner_applies_each_migration_once_and_reverts_round_trip() {
    let pool = pool().await;
    exec(&pool, "DROP TABLE IF EXISTS \"Essays\"").await;
    clear_ledger_rows(&pool, "%essays%").await;

    let migrations: Vec<Box<dyn Migration>> =
        vec![Box::new(CreateEssays), Box::new(AddEssaySubtitle)];
    let runner = Runner::new(pool.clone()).hash_guard(HashGuard::Off);

    let report = runner.run(&migrations).await.unwrap();
    assert_eq!(
        report.applied,
        vec![
            "20240101000000_essays_create".to_string(),
            "20240102000000_essays_add_subtitle".to_string(),
        ]
    );
    assert!(column_type(&pool, "Essays", "subtitle").await.is_some());

    // Re-running applies nothing.
    let report = runner.run(&migrations).await.unwrap();
    assert!(report.applied.is_empty());

    // up then down restores the pre-migration column set.
    runner
        .revert(&migrations, "20240102000000_essays_add_subtitle")
        .await
        .unwrap();
    assert!(column_type(&pool, "Essays", "subtitle").await.is_none());

    // The reverted migration is pending again.
    let pending = runner.pending(&migrations).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].name(), "20240102000000_essays_add_subtitle");
}

struct CreateSequencesWithStaleHash;

impl Migration for CreateSequencesWithStaleHash {
    fn name(&self) -> &str {
        "20240103000000_sequences_create"
    }

    fn accepts_schema_hash(&self) -> Option<&str> {
        // Deliberately wrong: no live schema hashes to this.
        Some("00000000000000000000000000000000")
    }

    fn up<'c>(&'c self, ctx: &'c mut MigrationContext) -> MigrationFuture<'c> {
        Box::pin(async move {
            ctx.execute(&ddl::create_table(&CollectionDescriptor::new("Sequences")))
                .await?;
            Ok(())
        })
    }

    fn down(&self) -> Downgrade {
        Downgrade::Sql(vec![ddl::drop_table(&CollectionDescriptor::new("Sequences"))])
    }
}

#[tokio::test]
#[ignore = "requires a running Postgres (DATABASE_URL)"]
async fn hash_mismatch_warns_but_still_runs_under_warn_guard() {
    let pool = pool().await;
    exec(&pool, "DROP TABLE IF EXISTS \"Sequences\"").await;
    clear_ledger_rows(&pool, "%sequences%").await;

    let migrations: Vec<Box<dyn Migration>> = vec![Box::new(CreateSequencesWithStaleHash)];
    let runner = Runner::new(pool.clone()).hash_guard(HashGuard::Warn);

    let report = runner.run(&migrations).await.unwrap();
    assert_eq!(report.applied.len(), 1);
    assert_eq!(report.hash_warnings.len(), 1);
    assert_eq!(
        report.hash_warnings[0].expected,
        "00000000000000000000000000000000"
    );
}

struct CreateDigestsWithStaleHash;

impl Migration for CreateDigestsWithStaleHash {
    fn name(&self) -> &str {
        "20240107000000_digests_create"
    }

    fn accepts_schema_hash(&self) -> Option<&str> {
        Some("00000000000000000000000000000000")
    }

    fn up<'c>(&'c self, ctx: &'c mut MigrationContext) -> MigrationFuture<'c> {
        Box::pin(async move {
            ctx.execute(&ddl::create_table(&CollectionDescriptor::new("Digests")))
                .await?;
            Ok(())
        })
    }

    fn down(&self) -> Downgrade {
        Downgrade::Sql(vec![ddl::drop_table(&CollectionDescriptor::new("Digests"))])
    }
}

#[tokio::test]
#[ignore = "requires a running Postgres (DATABASE_URL)"]
async fn hash_mismatch_aborts_under_strict_guard() {
    let pool = pool().await;
    exec(&pool, "DROP TABLE IF EXISTS \"Digests\"").await;
    clear_ledger_rows(&pool, "%digests%").await;

    let migrations: Vec<Box<dyn Migration>> = vec![Box::new(CreateDigestsWithStaleHash)];
    let runner = Runner::new(pool.clone()).hash_guard(HashGuard::Strict);

    let error = runner.run(&migrations).await.unwrap_err();
    assert!(matches!(error, MigrateError::HashMismatch { .. }));
    assert!(runner
        .applied()
        .await
        .unwrap()
        .iter()
        .all(|m| m.name != "20240107000000_digests_create"));
}

struct IrreversibleMarker;

impl Migration for IrreversibleMarker {
    fn name(&self) -> &str {
        "20240104000000_spotlights_backfill"
    }

    fn up<'c>(&'c self, ctx: &'c mut MigrationContext) -> MigrationFuture<'c> {
        Box::pin(async move {
            ctx.execute(&ddl::create_table(&CollectionDescriptor::new("Spotlights")))
                .await?;
            Ok(())
        })
    }

    fn down(&self) -> Downgrade {
        Downgrade::Irreversible
    }
}

#[tokio::test]
#[ignore = "requires a running Postgres (DATABASE_URL)"]
async fn revert_refuses_irreversible_migrations() {
    let pool = pool().await;
    exec(&pool, "DROP TABLE IF EXISTS \"Spotlights\"").await;
    clear_ledger_rows(&pool, "%spotlights%").await;

    let migrations: Vec<Box<dyn Migration>> = vec![Box::new(IrreversibleMarker)];
    let runner = Runner::new(pool.clone()).hash_guard(HashGuard::Off);
    runner.run(&migrations).await.unwrap();

    let error = runner
        .revert(&migrations, "20240104000000_spotlights_backfill")
        .await
        .unwrap_err();
    assert!(matches!(error, MigrateError::Irreversible(_)));
}

// ---------------------------------------------------------------------------
// Editable-field normalizer
// ---------------------------------------------------------------------------

fn dialogues_registry() -> SchemaRegistry {
    SchemaRegistry::new().collection_def(
        CollectionDescriptor::new("Dialogues")
            .field(FieldDescriptor::new("contents", FieldType::Jsonb).editable()),
    )
}

struct NormalizeDialogueContents;

impl Migration for NormalizeDialogueContents {
    fn name(&self) -> &str {
        "20240105000000_dialogues_normalize_contents"
    }

    fn up<'c>(&'c self, ctx: &'c mut MigrationContext) -> MigrationFuture<'c> {
        Box::pin(async move {
            let registry = dialogues_registry();
            normalize_editable_field(ctx, &registry, "Dialogues", "contents", true).await?;
            Ok(())
        })
    }

    fn down(&self) -> Downgrade {
        Downgrade::Irreversible
    }
}

struct DenormalizeDialogueContents;

impl Migration for DenormalizeDialogueContents {
    fn name(&self) -> &str {
        "20240106000000_dialogues_denormalize_contents"
    }

    fn up<'c>(&'c self, ctx: &'c mut MigrationContext) -> MigrationFuture<'c> {
        Box::pin(async move {
            let registry = dialogues_registry();
            denormalize_editable_field(ctx, &registry, "Dialogues", "contents").await?;
            Ok(())
        })
    }

    fn down(&self) -> Downgrade {
        Downgrade::Irreversible
    }
}

#[tokio::test]
#[ignore = "requires a running Postgres (DATABASE_URL)"]
async fn normalize_then_denormalize_restores_content() {
    let pool = pool().await;
    exec(&pool, "DROP TABLE IF EXISTS \"Dialogues\"").await;
    exec(&pool, "DROP TABLE IF EXISTS \"Revisions\"").await;
    clear_ledger_rows(&pool, "%dialogues%").await;

    let registry = dialogues_registry();
    exec_stmt(
        &pool,
        &ddl::create_table(registry.collection("Dialogues").unwrap()),
    )
    .await;
    exec(
        &pool,
        r#"INSERT INTO "Dialogues" ("_id", "contents") VALUES ('d1', '{"html": "<p>dialogue</p>"}'::jsonb)"#,
    )
    .await;

    let runner = Runner::new(pool.clone()).hash_guard(HashGuard::Off);
    let normalize: Vec<Box<dyn Migration>> = vec![Box::new(NormalizeDialogueContents)];
    runner.run(&normalize).await.unwrap();

    // Source column dropped, revision row created and linked.
    assert!(column_type(&pool, "Dialogues", "contents").await.is_none());
    let revisions: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM \"Revisions\" WHERE \"collectionName\" = 'Dialogues' AND \"fieldName\" = 'contents'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(revisions, 1);
    let linked: bool = sqlx::query_scalar(
        "SELECT \"contents_latest\" IS NOT NULL FROM \"Dialogues\" WHERE \"_id\" = 'd1'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert!(linked);

    let denormalize: Vec<Box<dyn Migration>> = vec![Box::new(DenormalizeDialogueContents)];
    runner.run(&denormalize).await.unwrap();

    // Content equivalent to the pre-normalization value (jsonb equality
    // ignores formatting).
    let restored: bool = sqlx::query_scalar(
        r#"SELECT "contents" = '{"html": "<p>dialogue</p>"}'::jsonb FROM "Dialogues" WHERE "_id" = 'd1'"#,
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert!(restored);
}
