//! Postgres + pgvector graph store
//!
//! Text-only statements go through SeaORM; statements that bind vectors or
//! integer arrays use the underlying sqlx pool with `pgvector`.

use super::*;
use crate::config::DatabaseConfig;
use pgvector::Vector;
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbBackend, Statement,
};
use sqlx::Row;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Clone)]
pub struct PostgresGraphStore {
    db: DatabaseConnection,
}

fn to_db_articles(articles: &ArticleSet) -> Result<Vec<i32>> {
    articles
        .iter()
        .map(|&a| {
            i32::try_from(a).map_err(|_| AppError::Validation {
                message: format!("article number {} out of range", a),
                field: Some("articles".to_string()),
            })
        })
        .collect()
}

fn from_db_articles(articles: Vec<i32>) -> ArticleSet {
    articles
        .into_iter()
        .filter_map(|a| u32::try_from(a).ok())
        .collect()
}

/// pgvector stores a column's dimension as its type modifier; -1 means unconstrained
fn check_column_dimension(type_modifier: Option<i32>, configured: usize) -> Result<()> {
    match type_modifier {
        Some(dimension) if dimension > 0 && dimension as usize != configured => {
            Err(AppError::DimensionMismatch {
                expected: dimension as usize,
                actual: configured,
            })
        }
        _ => Ok(()),
    }
}

impl PostgresGraphStore {
    /// Connect using the database section of the configuration
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        info!("Connecting to graph store...");

        let mut opts = ConnectOptions::new(&config.url);
        opts.max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .sqlx_logging(false);

        let db = Database::connect(opts)
            .await
            .map_err(|e| AppError::DatabaseConnection {
                message: format!("Failed to connect: {}", e),
            })?;

        info!("Graph store connection established");
        Ok(Self { db })
    }

    /// Apply the embedded schema migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(self.pool()).await?;
        info!("Graph schema is up to date");
        Ok(())
    }

    /// Fail when `chunks.embedding` was declared with a different dimension
    pub async fn verify_embedding_dimension(&self, configured: usize) -> Result<()> {
        let type_modifier: Option<i32> = sqlx::query_scalar(
            r#"
            SELECT atttypmod
            FROM pg_attribute
            WHERE attrelid = 'chunks'::regclass AND attname = 'embedding'
            "#,
        )
        .fetch_optional(self.pool())
        .await?;

        check_column_dimension(type_modifier, configured)?;
        debug!(dimension = configured, "Embedding column dimension verified");
        Ok(())
    }

    fn pool(&self) -> &sqlx::PgPool {
        self.db.get_postgres_connection_pool()
    }

    async fn execute(&self, sql: &str, values: Vec<sea_orm::Value>) -> Result<u64> {
        let stmt = Statement::from_sql_and_values(DbBackend::Postgres, sql, values);
        Ok(self.db.execute(stmt).await?.rows_affected())
    }
}

#[async_trait]
impl GraphStore for PostgresGraphStore {
    async fn ping(&self) -> Result<()> {
        self.db
            .execute_unprepared("SELECT 1")
            .await
            .map_err(|e| AppError::DatabaseConnection {
                message: format!("Ping failed: {}", e),
            })?;
        Ok(())
    }

    async fn get_or_create_institution(&self, name: &str) -> Result<InstitutionHandle> {
        self.execute(
            "INSERT INTO institutions (name) VALUES ($1) ON CONFLICT (name) DO NOTHING",
            vec![name.into()],
        )
        .await?;
        Ok(InstitutionHandle {
            name: name.to_string(),
        })
    }

    async fn get_or_create_document(&self, name: &str) -> Result<DocumentHandle> {
        let created = self
            .execute(
                "INSERT INTO documents (name) VALUES ($1) ON CONFLICT (name) DO NOTHING",
                vec![name.into()],
            )
            .await?;
        if created > 0 {
            debug!(document = name, "Created document node");
        }
        Ok(DocumentHandle {
            name: name.to_string(),
        })
    }

    async fn set_document_attributes(
        &self,
        document: &DocumentHandle,
        attributes: &DocumentAttributes,
    ) -> Result<()> {
        let updated = self
            .execute(
                "UPDATE documents SET category = $2, institution = $3 WHERE name = $1",
                vec![
                    document.name.as_str().into(),
                    attributes.category.as_str().into(),
                    attributes.publisher.name.as_str().into(),
                ],
            )
            .await?;

        if updated == 0 {
            return Err(AppError::DocumentNotFound {
                name: document.name.clone(),
            });
        }
        Ok(())
    }

    async fn get_or_create_chunk(
        &self,
        document: &DocumentHandle,
        chunk: &NewChunk,
    ) -> Result<ChunkHandle> {
        let id = chunk_id(&document.name, chunk.ordinal, &chunk.text);
        let ordinal = i32::try_from(chunk.ordinal).map_err(|_| AppError::Validation {
            message: format!("chunk ordinal {} out of range", chunk.ordinal),
            field: Some("ordinal".to_string()),
        })?;

        sqlx::query(
            r#"
            INSERT INTO chunks (id, document, ordinal, content, embedding)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(&id)
        .bind(&document.name)
        .bind(ordinal)
        .bind(&chunk.text)
        .bind(Vector::from(chunk.embedding.clone()))
        .execute(self.pool())
        .await?;

        Ok(ChunkHandle { id })
    }

    async fn set_citation(
        &self,
        chunk: &ChunkHandle,
        target: &DocumentHandle,
        articles: &ArticleSet,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO citations (chunk_id, target, articles)
            VALUES ($1, $2, $3)
            ON CONFLICT (chunk_id, target) DO UPDATE SET articles = EXCLUDED.articles
            "#,
        )
        .bind(&chunk.id)
        .bind(&target.name)
        .bind(to_db_articles(articles)?)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn rewire_citations(&self, malformed: &str, canonical: &str) -> Result<RewireOutcome> {
        if malformed == canonical {
            return Ok(RewireOutcome::Moved(0));
        }

        // One statement: the delete only matches when the canonical row exists
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            WITH canonical AS (
                SELECT name FROM documents WHERE name = $2
            ),
            moved AS (
                DELETE FROM citations c
                USING canonical
                WHERE c.target = $1
                RETURNING c.chunk_id, c.articles
            ),
            inserted AS (
                INSERT INTO citations (chunk_id, target, articles)
                SELECT chunk_id, $2, articles FROM moved
                ON CONFLICT (chunk_id, target) DO UPDATE SET articles = EXCLUDED.articles
                RETURNING 1
            )
            SELECT
                (SELECT COUNT(*) FROM canonical) AS canonical_exists,
                (SELECT COUNT(*) FROM inserted) AS moved
            "#,
            vec![malformed.into(), canonical.into()],
        );

        let row = self.db.query_one(stmt).await?.ok_or_else(|| AppError::Internal {
            message: "rewire statement returned no row".to_string(),
        })?;

        let canonical_exists: i64 = row.try_get("", "canonical_exists")?;
        if canonical_exists == 0 {
            return Ok(RewireOutcome::CanonicalMissing);
        }
        let moved: i64 = row.try_get("", "moved")?;
        Ok(RewireOutcome::Moved(moved.max(0) as u64))
    }

    async fn prune_placeholder(&self, name: &str) -> Result<PruneOutcome> {
        let deleted = self
            .execute(
                r#"
                DELETE FROM documents d
                WHERE d.name = $1
                  AND d.institution IS NULL
                  AND NOT EXISTS (SELECT 1 FROM citations c WHERE c.target = d.name)
                  AND NOT EXISTS (SELECT 1 FROM chunks k WHERE k.document = d.name)
                "#,
                vec![name.into()],
            )
            .await?;

        if deleted > 0 {
            return Ok(PruneOutcome::Deleted);
        }

        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            "SELECT 1 AS present FROM documents WHERE name = $1",
            vec![name.into()],
        );
        match self.db.query_one(stmt).await? {
            Some(_) => Ok(PruneOutcome::Retained),
            None => Ok(PruneOutcome::Absent),
        }
    }

    async fn nearest_chunks(&self, embedding: &[f32], k: usize) -> Result<Vec<SeedChunk>> {
        let rows = sqlx::query(
            r#"
            SELECT
                k.id,
                k.content,
                k.document,
                d.institution,
                1 - (k.embedding <=> $1) AS score
            FROM chunks k
            JOIN documents d ON d.name = k.document
            ORDER BY k.embedding <=> $1
            LIMIT $2
            "#,
        )
        .bind(Vector::from(embedding.to_vec()))
        .bind(k as i64)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok::<_, AppError>(SeedChunk {
                    chunk_id: row.try_get("id")?,
                    text: row.try_get("content")?,
                    document: row.try_get("document")?,
                    institution: row.try_get("institution")?,
                    score: row.try_get::<f64, _>("score")? as f32,
                })
            })
            .collect()
    }

    async fn citations_from(&self, chunk_ids: &[String]) -> Result<Vec<CitationRecord>> {
        if chunk_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            r#"
            SELECT c.chunk_id, k.document AS source_document, c.target, c.articles
            FROM citations c
            JOIN chunks k ON k.id = c.chunk_id
            WHERE c.chunk_id = ANY($1::text[])
            ORDER BY array_position($1::text[], c.chunk_id), c.target
            "#,
        )
        .bind(chunk_ids.to_vec())
        .fetch_all(self.pool())
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok::<_, AppError>(CitationRecord {
                    chunk_id: row.try_get("chunk_id")?,
                    source_document: row.try_get("source_document")?,
                    target_document: row.try_get("target")?,
                    articles: from_db_articles(row.try_get("articles")?),
                })
            })
            .collect()
    }

    async fn chunks_of(&self, document: &str) -> Result<Vec<StoredChunk>> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            "SELECT id, ordinal, content FROM chunks WHERE document = $1 ORDER BY ordinal, id",
            vec![document.into()],
        );

        self.db
            .query_all(stmt)
            .await?
            .into_iter()
            .map(|row| {
                let ordinal: i32 = row.try_get("", "ordinal")?;
                Ok::<_, AppError>(StoredChunk {
                    id: row.try_get("", "id")?,
                    ordinal: ordinal.max(0) as u32,
                    text: row.try_get("", "content")?,
                })
            })
            .collect()
    }
}
