//! Prompt rendering for the language model.

use tabrag_core::SourceRow;

/// System instruction for answers grounded in retrieved sources.
pub const SYSTEM_PROMPT: &str = "You must answer the user's question using only the sources provided. \
If the sources do not contain the answer, say \"I don't know\". \
Each source starts with its title as a markdown heading; cite the title of every source you use in square brackets, e.g. [Kia].";

/// Render sources as markdown blocks, in the given order.
pub fn render_sources(sources: &[SourceRow]) -> String {
    sources
        .iter()
        .map(|s| format!("## {}\n\n{}\n", s.title, s.body))
        .collect()
}

/// User prompt: the question, a `Sources:` separator, then the rendered block.
pub fn user_prompt(question: &str, sources: &str) -> String {
    format!("{}\n\nSources:\n\n{}", question, sources)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(id: i64, title: &str, body: &str) -> SourceRow {
        SourceRow {
            id,
            title: title.to_string(),
            body: body.to_string(),
        }
    }

    #[test]
    fn test_render_sources_keeps_order() {
        let block = render_sources(&[
            source(3, "Kia", "LXS 4dr Sedan"),
            source(1, "Honda", "Premium Package 4dr Sedan"),
        ]);
        assert_eq!(
            block,
            "## Kia\n\nLXS 4dr Sedan\n## Honda\n\nPremium Package 4dr Sedan\n"
        );
    }

    #[test]
    fn test_user_prompt() {
        let prompt = user_prompt("Which sedan?", "## Kia\n\nLXS\n");
        assert_eq!(prompt, "Which sedan?\n\nSources:\n\n## Kia\n\nLXS\n");
    }

    #[test]
    fn test_empty_sources() {
        assert_eq!(render_sources(&[]), "");
        assert_eq!(user_prompt("q", ""), "q\n\nSources:\n\n");
    }

    #[test]
    fn test_system_prompt_rules() {
        assert!(SYSTEM_PROMPT.contains("I don't know"));
        assert!(SYSTEM_PROMPT.contains("square brackets"));
    }
}
