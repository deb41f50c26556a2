//! Word-match retrieval over two columns of a Row Set.
//!
//! Cells are matched and rendered through their `Display` text, so callers
//! wanting the file's exact cells pass a Row Set from `read_csv_text`.

use tracing::info;

use tabrag_core::{LanguageModel, RagError, Result, RowSet, Value};

/// System instruction for naive answers about `subject`.
pub fn naive_system_prompt(subject: &str) -> String {
    format!(
        "You are a helpful assistant that answers questions about {subject} based off a {subject} data set. \
You must use the data set provided after Sources: to answer the questions, \
you should not provide any info that is not in the provided sources."
    )
}

/// Question words: lowercase, `?` removed, parentheses treated as spaces.
pub fn question_words(question: &str) -> Vec<String> {
    question
        .to_lowercase()
        .replace('?', "")
        .replace(['(', ')'], " ")
        .split_whitespace()
        .map(String::from)
        .collect()
}

fn cell_matches(cell: &Value, words: &[String]) -> bool {
    let text = cell.to_string().to_lowercase();
    text.split_whitespace().any(|w| words.iter().any(|q| q == w))
}

/// Rows whose title or body cell shares a whole word with the question.
pub fn naive_matches<'a>(
    rows: &'a RowSet,
    question: &str,
    title_column: &str,
    body_column: &str,
) -> Result<Vec<&'a [Value]>> {
    let column = |name: &str| {
        rows.column_index(name)
            .ok_or_else(|| RagError::invalid_argument(format!("no column named {:?}", name)))
    };
    let title = column(title_column)?;
    let body = column(body_column)?;

    let words = question_words(question);
    Ok(rows
        .rows()
        .iter()
        .filter(|row| cell_matches(&row[title], &words) || cell_matches(&row[body], &words))
        .map(Vec::as_slice)
        .collect())
}

/// Markdown table of `rows` under the Row Set's header.
pub fn render_table(rows: &RowSet, matches: &[&[Value]]) -> String {
    let header = rows.column_names().join(" | ");
    let separator = vec![" --- "; rows.columns().len()].join(" | ");
    let body = matches
        .iter()
        .map(|row| {
            row.iter()
                .map(Value::to_string)
                .collect::<Vec<_>>()
                .join(" | ")
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!("{}\n{}\n{}", header, separator, body)
}

/// Answer `question` from the rows matching it word for word.
pub async fn answer_naive<L: LanguageModel + ?Sized>(
    model: &L,
    rows: &RowSet,
    question: &str,
    title_column: &str,
    body_column: &str,
    subject: &str,
) -> Result<String> {
    let matches = naive_matches(rows, question, title_column, body_column)?;
    info!("Found {} matches", matches.len());

    let table = render_table(rows, &matches);
    let prompt = format!("{}\nSources: {}", question, table);

    model.complete(&naive_system_prompt(subject), &prompt).await
}
