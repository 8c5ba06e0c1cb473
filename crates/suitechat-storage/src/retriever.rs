// Document retrieval: vector ranking with keyword fallback.
//
// Tenant scoping rule: tenant-owned chunks union system-tenant chunks.
// The vector path pulls the scoped candidate set and ranks by cosine
// similarity in-process; when no embedder is configured (or it fails) the
// keyword fallback scores one point per matched 3+ char token.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{PgPool, QueryBuilder, Row};
use tracing::warn;
use uuid::Uuid;

use crate::models::{DocChunkRow, DomainKnowledgeChunkRow};

/// Well-known tenant id that owns shared platform material.
pub const SYSTEM_TENANT_ID: Uuid = Uuid::nil();

/// Hard cap on result set size regardless of the caller's top_k.
const TOP_K_CAP: usize = 30;

/// Candidate rows pulled for in-process vector ranking.
const VECTOR_CANDIDATE_LIMIT: i64 = 256;

/// Files larger than this are skipped (not errored) during import.
pub const MAX_IMPORT_BYTES: usize = 256 * 1024;

/// Embedding capability. When unavailable the retriever falls back to
/// keyword search.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Batch embed texts into fixed-dimension vectors.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query text.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| anyhow::anyhow!("embedder returned no vectors"))
    }
}

/// One retrieved chunk, ready for citation.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub title: String,
    pub content: String,
    pub source_path: String,
    pub similarity: Option<f64>,
    pub keyword_hits: Option<i64>,
}

/// Cosine similarity between two vectors; 0.0 when shapes differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Search the tenant's document corpus (plus system-shared chunks).
pub async fn rag_search(
    pool: &PgPool,
    embedder: Option<&dyn Embedder>,
    tenant_id: Uuid,
    query: &str,
    top_k: usize,
    source_filter: Option<&str>,
) -> Result<Vec<RetrievedChunk>> {
    let top_k = top_k.clamp(1, TOP_K_CAP);

    if let Some(embedder) = embedder {
        match embedder.embed_query(query).await {
            Ok(query_vec) => {
                let ranked =
                    vector_search(pool, tenant_id, &query_vec, top_k, source_filter).await?;
                if !ranked.is_empty() {
                    return Ok(ranked);
                }
            }
            Err(err) => {
                warn!(error = %err, "query embedding failed, using keyword fallback");
            }
        }
    }

    keyword_search(pool, tenant_id, query, top_k, source_filter).await
}

async fn vector_search(
    pool: &PgPool,
    tenant_id: Uuid,
    query_vec: &[f32],
    top_k: usize,
    source_filter: Option<&str>,
) -> Result<Vec<RetrievedChunk>> {
    let mut qb = QueryBuilder::new(
        "SELECT id, tenant_id, title, content, source_path, embedding, tags, created_at \
         FROM doc_chunks WHERE embedding IS NOT NULL AND (tenant_id = ",
    );
    qb.push_bind(tenant_id);
    qb.push(" OR tenant_id = ");
    qb.push_bind(SYSTEM_TENANT_ID);
    qb.push(")");
    if let Some(prefix) = source_filter {
        qb.push(" AND source_path ILIKE ");
        qb.push_bind(format!("{prefix}%"));
    }
    qb.push(" LIMIT ");
    qb.push_bind(VECTOR_CANDIDATE_LIMIT);

    let chunks: Vec<DocChunkRow> = qb.build_query_as().fetch_all(pool).await?;

    let mut scored: Vec<(f32, RetrievedChunk)> = chunks
        .into_iter()
        .filter_map(|chunk| {
            let embedding = chunk.embedding.as_ref()?;
            let similarity = cosine_similarity(query_vec, embedding);
            Some((
                similarity,
                RetrievedChunk {
                    title: chunk.title,
                    content: truncate_content(chunk.content),
                    source_path: chunk.source_path,
                    similarity: Some((similarity as f64 * 10_000.0).round() / 10_000.0),
                    keyword_hits: None,
                },
            ))
        })
        .collect();

    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    Ok(scored.into_iter().take(top_k).map(|(_, c)| c).collect())
}

async fn keyword_search(
    pool: &PgPool,
    tenant_id: Uuid,
    query: &str,
    top_k: usize,
    source_filter: Option<&str>,
) -> Result<Vec<RetrievedChunk>> {
    let tokens = keyword_tokens(query);
    if tokens.is_empty() {
        return Ok(Vec::new());
    }

    let mut qb = QueryBuilder::new("SELECT title, content, source_path, (");
    for (i, token) in tokens.iter().enumerate() {
        if i > 0 {
            qb.push(" + ");
        }
        qb.push("(CASE WHEN content ILIKE ");
        qb.push_bind(format!("%{token}%"));
        qb.push(" THEN 1 ELSE 0 END)");
    }
    qb.push(") AS score FROM doc_chunks WHERE (tenant_id = ");
    qb.push_bind(tenant_id);
    qb.push(" OR tenant_id = ");
    qb.push_bind(SYSTEM_TENANT_ID);
    qb.push(") AND (");
    for (i, token) in tokens.iter().enumerate() {
        if i > 0 {
            qb.push(" OR ");
        }
        qb.push("content ILIKE ");
        qb.push_bind(format!("%{token}%"));
    }
    qb.push(")");
    if let Some(prefix) = source_filter {
        qb.push(" AND source_path ILIKE ");
        qb.push_bind(format!("{prefix}%"));
    }
    qb.push(" ORDER BY score DESC LIMIT ");
    qb.push_bind(top_k as i64);

    let rows = qb.build().fetch_all(pool).await?;
    let chunks = rows
        .into_iter()
        .filter_map(|row| {
            Some(RetrievedChunk {
                title: row.try_get("title").ok()?,
                content: truncate_content(row.try_get("content").ok()?),
                source_path: row.try_get("source_path").ok()?,
                similarity: None,
                keyword_hits: row.try_get::<i32, _>("score").ok().map(i64::from),
            })
        })
        .collect();
    Ok(chunks)
}

/// Retrieve shared domain knowledge (not tenant-scoped; deprecated chunks
/// excluded). Same vector-then-keyword ladder as the document corpus.
pub async fn retrieve_domain_knowledge(
    pool: &PgPool,
    embedder: Option<&dyn Embedder>,
    query: &str,
    top_k: usize,
) -> Result<Vec<RetrievedChunk>> {
    let top_k = top_k.clamp(1, TOP_K_CAP);

    if let Some(embedder) = embedder {
        if let Ok(query_vec) = embedder.embed_query(query).await {
            let rows: Vec<DomainKnowledgeChunkRow> = sqlx::query_as(
                r#"
                SELECT id, raw_text, source_uri, topic_tags, embedding, is_deprecated, created_at
                FROM domain_knowledge_chunks
                WHERE is_deprecated = FALSE AND embedding IS NOT NULL
                LIMIT $1
                "#,
            )
            .bind(VECTOR_CANDIDATE_LIMIT)
            .fetch_all(pool)
            .await?;

            let mut scored: Vec<(f32, RetrievedChunk)> = rows
                .into_iter()
                .filter_map(|chunk| {
                    let embedding = chunk.embedding.as_ref()?;
                    let similarity = cosine_similarity(&query_vec, embedding);
                    Some((
                        similarity,
                        RetrievedChunk {
                            title: String::new(),
                            content: truncate_content(chunk.raw_text),
                            source_path: chunk.source_uri.unwrap_or_default(),
                            similarity: Some(similarity as f64),
                            keyword_hits: None,
                        },
                    ))
                })
                .collect();
            scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
            let ranked: Vec<RetrievedChunk> =
                scored.into_iter().take(top_k).map(|(_, c)| c).collect();
            if !ranked.is_empty() {
                return Ok(ranked);
            }
        }
    }

    let tokens = keyword_tokens(query);
    if tokens.is_empty() {
        return Ok(Vec::new());
    }
    let mut qb = QueryBuilder::new("SELECT raw_text, source_uri, (");
    for (i, token) in tokens.iter().enumerate() {
        if i > 0 {
            qb.push(" + ");
        }
        qb.push("(CASE WHEN raw_text ILIKE ");
        qb.push_bind(format!("%{token}%"));
        qb.push(" THEN 1 ELSE 0 END)");
    }
    qb.push(") AS score FROM domain_knowledge_chunks WHERE is_deprecated = FALSE AND (");
    for (i, token) in tokens.iter().enumerate() {
        if i > 0 {
            qb.push(" OR ");
        }
        qb.push("raw_text ILIKE ");
        qb.push_bind(format!("%{token}%"));
    }
    qb.push(") ORDER BY score DESC LIMIT ");
    qb.push_bind(top_k as i64);

    let rows = qb.build().fetch_all(pool).await?;
    Ok(rows
        .into_iter()
        .filter_map(|row| {
            Some(RetrievedChunk {
                title: String::new(),
                content: truncate_content(row.try_get("raw_text").ok()?),
                source_path: row
                    .try_get::<Option<String>, _>("source_uri")
                    .ok()
                    .flatten()
                    .unwrap_or_default(),
                similarity: None,
                keyword_hits: row.try_get::<i32, _>("score").ok().map(i64::from),
            })
        })
        .collect())
}

/// Case-folded tokens of 3+ chars; at most 10, each truncated to 50 chars.
fn keyword_tokens(query: &str) -> Vec<String> {
    let mut tokens: Vec<String> = query
        .split_whitespace()
        .map(|w| w.trim().to_lowercase())
        .filter(|w| w.len() >= 3)
        .map(|w| w.chars().take(50).collect())
        .collect();
    if tokens.is_empty() {
        let whole = query.trim().to_lowercase();
        if !whole.is_empty() {
            tokens.push(whole.chars().take(50).collect());
        }
    }
    tokens.truncate(10);
    tokens
}

fn truncate_content(content: String) -> String {
    if content.chars().count() > 2000 {
        content.chars().take(2000).collect()
    } else {
        content
    }
}

/// Outcome of a single document import attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportOutcome {
    Imported,
    SkippedTooLarge,
    SkippedBinary,
}

/// Admission check for one file: oversized and binary (non-UTF-8) content
/// is skipped, never errored.
pub fn precheck_import(bytes: &[u8]) -> std::result::Result<&str, ImportOutcome> {
    if bytes.len() > MAX_IMPORT_BYTES {
        return Err(ImportOutcome::SkippedTooLarge);
    }
    std::str::from_utf8(bytes).map_err(|_| ImportOutcome::SkippedBinary)
}

/// Import one document file into the tenant corpus.
pub async fn import_doc_file(
    pool: &PgPool,
    embedder: Option<&dyn Embedder>,
    tenant_id: Uuid,
    source_path: &str,
    bytes: &[u8],
) -> Result<ImportOutcome> {
    let content = match precheck_import(bytes) {
        Ok(content) => content,
        Err(outcome) => {
            warn!(source_path = %source_path, size = bytes.len(), "skipping file on import");
            return Ok(outcome);
        }
    };

    let embedding = match embedder {
        Some(embedder) => embedder.embed(&[content.to_string()]).await.ok().and_then(|mut v| v.pop()),
        None => None,
    };

    let title = source_path
        .rsplit('/')
        .next()
        .unwrap_or(source_path)
        .to_string();

    sqlx::query(
        r#"
        INSERT INTO doc_chunks (id, tenant_id, title, content, source_path, embedding, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, NOW())
        "#,
    )
    .bind(Uuid::now_v7())
    .bind(tenant_id)
    .bind(&title)
    .bind(content)
    .bind(source_path)
    .bind(embedding)
    .execute(pool)
    .await?;

    Ok(ImportOutcome::Imported)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_similarity_handles_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn cosine_similarity_of_identical_vectors_is_one() {
        let v = vec![0.3, -0.5, 0.8];
        let sim = cosine_similarity(&v, &v);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn keyword_tokens_drop_short_words_and_casefold() {
        let tokens = keyword_tokens("Show ME the VAT on fees");
        assert_eq!(tokens, vec!["show", "the", "vat", "fees"]);
    }

    #[test]
    fn keyword_tokens_fall_back_to_whole_query() {
        assert_eq!(keyword_tokens("po"), vec!["po"]);
        assert!(keyword_tokens("  ").is_empty());
    }

    #[test]
    fn keyword_tokens_are_capped_at_ten() {
        let query = "alpha bravo charlie delta echo foxtrot golf hotel india juliet kilo lima";
        assert_eq!(keyword_tokens(query).len(), 10);
    }

    #[test]
    fn oversized_files_are_skipped_not_errored() {
        let big = vec![b'a'; MAX_IMPORT_BYTES + 1];
        assert_eq!(precheck_import(&big), Err(ImportOutcome::SkippedTooLarge));

        let exactly = vec![b'a'; MAX_IMPORT_BYTES];
        assert!(precheck_import(&exactly).is_ok());
    }

    #[test]
    fn binary_files_are_skipped_not_errored() {
        let binary = [0xff, 0xfe, 0x00, 0x42];
        assert_eq!(precheck_import(&binary), Err(ImportOutcome::SkippedBinary));
        assert_eq!(precheck_import("plain text".as_bytes()), Ok("plain text"));
    }
}
