//! SQL for the semantic, keyword and fused rankings.
//!
//! Positional parameters shared by the fused statement:
//!
//! | param | value |
//! |-------|-------|
//! | `?1` | query embedding (f32 blob) |
//! | `?2` | FTS5 query |
//! | `?3` | RRF constant `k` |
//! | `?4` | semantic limit |
//! | `?5` | keyword limit |
//! | `?6` | number of fused candidates |

use tabrag_core::Ident;

fn semantic_cte(vec_table: &Ident, embedding: &str, limit: &str) -> String {
    format!(
        "SELECT id, RANK() OVER (ORDER BY distance) AS rank \
         FROM (SELECT id, distance FROM {vec} WHERE embedding MATCH {embedding} AND k = {limit})",
        vec = vec_table.quoted(),
    )
}

fn keyword_cte(fts_table: &Ident, query: &str, limit: &str) -> String {
    let fts = fts_table.quoted();
    format!(
        "SELECT id, RANK() OVER (ORDER BY score) AS rank \
         FROM (SELECT rowid AS id, bm25({fts}) AS score FROM {fts} \
         WHERE {fts} MATCH {query} ORDER BY score LIMIT {limit})",
    )
}

/// Single statement computing both rankings and their reciprocal rank fusion.
///
/// Without keyword terms the keyword side is an empty ranking, so every
/// candidate scores from the semantic side alone.
pub fn hybrid_search_sql(vec_table: &Ident, fts_table: &Ident, with_keywords: bool) -> String {
    let keyword = if with_keywords {
        keyword_cte(fts_table, "?2", "?5")
    } else {
        "SELECT NULL AS id, NULL AS rank WHERE 0".to_string()
    };

    format!(
        "WITH semantic AS ({semantic}), \
         keyword AS ({keyword}), \
         fused AS ( \
             SELECT COALESCE(semantic.id, keyword.id) AS id, \
                    semantic.rank AS semantic_rank, \
                    keyword.rank AS keyword_rank, \
                    COALESCE(1.0 / (?3 + semantic.rank), 0.0) + \
                    COALESCE(1.0 / (?3 + keyword.rank), 0.0) AS score \
             FROM semantic FULL OUTER JOIN keyword ON semantic.id = keyword.id \
         ) \
         SELECT id, semantic_rank, keyword_rank, score FROM fused \
         ORDER BY score DESC, id ASC \
         LIMIT ?6",
        semantic = semantic_cte(vec_table, "?1", "?4"),
    )
}

/// Semantic ranking alone: `?1` embedding, `?2` limit.
pub fn semantic_ranking_sql(vec_table: &Ident) -> String {
    format!("{} ORDER BY rank, id", semantic_cte(vec_table, "?1", "?2"))
}

/// Keyword ranking alone: `?1` FTS5 query, `?2` limit.
pub fn keyword_ranking_sql(fts_table: &Ident) -> String {
    format!("{} ORDER BY rank, id", keyword_cte(fts_table, "?1", "?2"))
}

/// Title and body of the rows whose ids are in the JSON array `?1`.
pub fn source_rows_sql(table: &Ident, title: &Ident, body: &Ident) -> String {
    format!(
        "SELECT id, {title}, {body} FROM {table} WHERE id IN (SELECT value FROM json_each(?1))",
        title = title.quoted(),
        body = body.quoted(),
        table = table.quoted(),
    )
}
