//! Tenant-safe similarity search over document embeddings
//!
//! Ordered by pgvector cosine distance so the partial HNSW index on
//! `documents.embedding` can serve it; the statement repeats the index
//! predicate for the planner to match.

use docvault_store::{EMBEDDING_DIMENSIONS, EMBEDDING_INDEX_PREDICATE};
use pgvector::Vector;
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, Row};
use tracing::debug;

use crate::context::UnitOfWork;
use crate::error::{DataError, DataResult};
use crate::isolation;
use crate::model::{Document, Entity};

/// k-nearest-neighbour request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarityQuery {
    pub embedding: Vec<f32>,
    #[serde(default = "default_k")]
    pub k: usize,
    /// Drop hits whose cosine similarity is below this value
    #[serde(default)]
    pub min_similarity: Option<f32>,
}

fn default_k() -> usize {
    10
}

impl SimilarityQuery {
    pub fn new(embedding: Vec<f32>, k: usize) -> Self {
        Self {
            embedding,
            k,
            min_similarity: None,
        }
    }

    fn validate(&self) -> DataResult<()> {
        if self.embedding.len() != EMBEDDING_DIMENSIONS {
            return Err(DataError::Invalid(format!(
                "expected {EMBEDDING_DIMENSIONS} dimensions, not {}",
                self.embedding.len()
            )));
        }
        // Cosine distance to a zero vector is undefined
        if self.embedding.iter().all(|x| *x == 0.0) {
            return Err(DataError::Invalid("query embedding must not be zero".into()));
        }
        Ok(())
    }
}

/// One search hit
#[derive(Debug, Clone, Serialize)]
pub struct SimilarDocument {
    pub document: Document,
    /// Cosine distance; 0 is identical direction
    pub distance: f32,
}

impl<'r> FromRow<'r, PgRow> for SimilarDocument {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            document: Document::from_row(row)?,
            distance: row.try_get::<f64, _>("distance")? as f32,
        })
    }
}

/// Nearest live documents of the caller's tenant that have an embedding,
/// closest first.
pub async fn similar(uow: &mut UnitOfWork, query: &SimilarityQuery) -> DataResult<Vec<SimilarDocument>> {
    if query.k == 0 {
        return Ok(Vec::new());
    }
    query.validate()?;

    let sql = format!(
        "SELECT *, embedding <=> $2 AS distance FROM {} \
         WHERE {} AND {EMBEDDING_INDEX_PREDICATE} \
         ORDER BY embedding <=> $2 LIMIT $3",
        Document::TABLE,
        isolation::scoped::<Document>(),
    );
    let tenant_id = uow.tenant_id();
    let limit = i64::try_from(query.k).unwrap_or(i64::MAX);
    let rows: Vec<SimilarDocument> = uow
        .fetch_all(
            sqlx::query_as(&sql)
                .bind(tenant_id)
                .bind(Vector::from(query.embedding.clone()))
                .bind(limit),
        )
        .await?;

    let max_distance = query.min_similarity.map(|s| 1.0 - s);
    let hits: Vec<SimilarDocument> = rows
        .into_iter()
        .filter(|hit| max_distance.map_or(true, |max| hit.distance <= max))
        .collect();

    debug!(k = query.k, hits = hits.len(), "similarity search");
    Ok(hits)
}
