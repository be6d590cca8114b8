//! Batch classification prompt

use crate::types::ArticleInput;

const INSTRUCTIONS: &str = r#"You are a news triage assistant. Classify each news article below.

For every article return one JSON object with exactly these keys:
- "topic": one of Finance, International Relations, Disaster, Environment
- "location": the place the article is about, or null if none is mentioned
- "importance": one of CRITICAL, HIGH, MEDIUM, LOW, based on how urgently someone needs to act on it

### OUTPUT FORMAT
One line per article, in the same order as the input, each line starting with
the article number, a period and the JSON object. No preamble. No markdown.
Example:
1. {"topic": "Finance", "location": "London", "importance": "MEDIUM"}
2. {"topic": "Disaster", "location": null, "importance": "CRITICAL"}

### ARTICLES ({count})
"#;

/// Build the single prompt for a batch, numbering articles from 1.
pub fn build_batch_prompt(articles: &[ArticleInput]) -> String {
    let mut prompt = INSTRUCTIONS.replace("{count}", &articles.len().to_string());
    for (i, article) in articles.iter().enumerate() {
        prompt.push_str(&format!(
            "\n{}. Title: \"{}\"\n   Content: \"{}\"\n",
            i + 1,
            sanitize(&article.title),
            sanitize(&article.content),
        ));
    }
    prompt
}

/// Collapse whitespace and escape quotes so an article cannot fake a block
/// boundary by starting a line with `N. {`.
fn sanitize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace('"', "\\\"")
}
