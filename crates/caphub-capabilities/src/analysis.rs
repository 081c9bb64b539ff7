//! Text-analysis capabilities. These are registered as dynamic and only
//! reach a session once its activation policy grants them.

use std::collections::HashMap;

use caphub_protocol::{CapError, HandlerResult};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::documents::document_body;
use crate::{parse_params, Capability, InvocationContext};

/// Either inline `text` or a `documentId` from the sample table.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TextSource {
    text: Option<String>,
    document_id: Option<String>,
}

impl TextSource {
    fn resolve(&self) -> Result<String, CapError> {
        match (&self.text, &self.document_id) {
            (Some(text), _) => Ok(text.clone()),
            (None, Some(id)) => document_body(id).map(str::to_string),
            (None, None) => Err(CapError::invalid_params("Provide either text or documentId")),
        }
    }
}

fn sentences(text: &str) -> Vec<&str> {
    text.split_inclusive(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// summarizeDocument
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummarizeParams {
    #[serde(flatten)]
    source: TextSource,
    max_sentences: Option<usize>,
}

/// Extractive summary: the leading sentences of the text.
pub struct SummarizeDocument;

impl Capability for SummarizeDocument {
    async fn invoke(&self, params: Value, _ctx: &InvocationContext) -> HandlerResult {
        let p: SummarizeParams = parse_params(params)?;
        let text = p.source.resolve()?;
        let all = sentences(&text);
        let keep = p.max_sentences.unwrap_or(2).max(1);
        Ok(json!({
            "summary": all.iter().take(keep).copied().collect::<Vec<_>>().join(" "),
            "sentences": all.len().min(keep),
            "totalSentences": all.len(),
        }))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// countWordsAndCharacters
// ─────────────────────────────────────────────────────────────────────────────

pub struct CountWordsAndCharacters;

impl Capability for CountWordsAndCharacters {
    async fn invoke(&self, params: Value, _ctx: &InvocationContext) -> HandlerResult {
        let p: TextSource = parse_params(params)?;
        let text = p.resolve()?;
        Ok(json!({
            "words": text.split_whitespace().count(),
            "characters": text.chars().count(),
            "charactersNoSpaces": text.chars().filter(|c| !c.is_whitespace()).count(),
            "lines": text.lines().count(),
        }))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// detectDocumentFormat
// ─────────────────────────────────────────────────────────────────────────────

/// Best-effort format sniffing over the first bytes of the text.
pub fn detect_format(text: &str) -> &'static str {
    let trimmed = text.trim_start();
    if (trimmed.starts_with('{') || trimmed.starts_with('['))
        && serde_json::from_str::<Value>(text).is_ok()
    {
        return "json";
    }
    let lower = trimmed.to_ascii_lowercase();
    if lower.starts_with("<!doctype html") || lower.starts_with("<html") {
        return "html";
    }
    if lower.starts_with("<?xml") {
        return "xml";
    }
    if text.lines().any(|l| {
        let l = l.trim_start();
        l.starts_with("# ") || l.starts_with("## ") || l.starts_with("```") || l.starts_with("- ")
    }) {
        return "markdown";
    }
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.len() > 1 {
        let commas = lines[0].matches(',').count();
        if commas > 0 && lines.iter().all(|l| l.matches(',').count() == commas) {
            return "csv";
        }
    }
    "plain"
}

pub struct DetectDocumentFormat;

impl Capability for DetectDocumentFormat {
    async fn invoke(&self, params: Value, _ctx: &InvocationContext) -> HandlerResult {
        let p: TextSource = parse_params(params)?;
        let text = p.resolve()?;
        Ok(json!({ "format": detect_format(&text) }))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// extractKeywords / compareDocuments
// ─────────────────────────────────────────────────────────────────────────────

const STOPWORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "of", "to", "in", "on", "for", "is", "was", "we", "our",
    "your", "with", "at", "by", "it", "this", "that", "be", "are", "as", "from",
];

fn word_frequencies(text: &str) -> HashMap<String, usize> {
    let mut freq = HashMap::new();
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|w| w.len() > 2 && !STOPWORDS.contains(&w.as_str()))
    {
        *freq.entry(word).or_insert(0) += 1;
    }
    freq
}

#[derive(Deserialize)]
struct KeywordParams {
    #[serde(flatten)]
    source: TextSource,
    limit: Option<usize>,
}

pub struct ExtractKeywords;

impl Capability for ExtractKeywords {
    async fn invoke(&self, params: Value, _ctx: &InvocationContext) -> HandlerResult {
        let p: KeywordParams = parse_params(params)?;
        let text = p.source.resolve()?;
        let mut ranked: Vec<(String, usize)> = word_frequencies(&text).into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        let keywords: Vec<Value> = ranked
            .into_iter()
            .take(p.limit.unwrap_or(5))
            .map(|(word, count)| json!({ "word": word, "count": count }))
            .collect();
        Ok(json!({ "keywords": keywords }))
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompareParams {
    left_id: String,
    right_id: String,
}

/// Jaccard similarity over the non-stopword vocabulary of two documents.
pub struct CompareDocuments;

impl Capability for CompareDocuments {
    async fn invoke(&self, params: Value, _ctx: &InvocationContext) -> HandlerResult {
        let p: CompareParams = parse_params(params)?;
        let left = word_frequencies(document_body(&p.left_id)?);
        let right = word_frequencies(document_body(&p.right_id)?);
        let shared: Vec<&String> = left.keys().filter(|w| right.contains_key(*w)).collect();
        let union = left.len() + right.len() - shared.len();
        let similarity = if union == 0 {
            0.0
        } else {
            shared.len() as f64 / union as f64
        };
        let mut shared_terms: Vec<String> = shared.into_iter().cloned().collect();
        shared_terms.sort();
        Ok(json!({
            "similarity": (similarity * 1000.0).round() / 1000.0,
            "sharedTerms": shared_terms,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats() {
        assert_eq!(detect_format("{\"a\": 1}"), "json");
        assert_eq!(detect_format("<html><body></body></html>"), "html");
        assert_eq!(detect_format("# Title\n\nbody"), "markdown");
        assert_eq!(detect_format("a,b,c\n1,2,3\n4,5,6"), "csv");
        assert_eq!(detect_format("just some words."), "plain");
        assert_eq!(detect_format("{ not json"), "plain");
    }

    #[test]
    fn sentence_split() {
        assert_eq!(sentences("One. Two! Three?"), vec!["One.", "Two!", "Three?"]);
        assert_eq!(sentences("no terminator"), vec!["no terminator"]);
    }

    #[test]
    fn frequencies_skip_stopwords() {
        let freq = word_frequencies("The queue and the queue backlog");
        assert_eq!(freq.get("queue"), Some(&2));
        assert!(!freq.contains_key("the"));
        assert!(!freq.contains_key("and"));
    }
}
