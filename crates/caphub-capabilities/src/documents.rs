//! Sample document table and the static lookup capabilities over it.

use caphub_protocol::{CapError, HandlerResult};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{parse_params, Capability, InvocationContext};

/// A fixed, in-memory sample document.
#[derive(Debug, Clone, Copy)]
pub struct SampleDocument {
    pub id: &'static str,
    pub title: &'static str,
    pub category: &'static str,
    pub body: &'static str,
}

impl SampleDocument {
    pub fn uri(&self) -> String {
        format!("docs://{}", self.id)
    }

    fn summary_json(&self) -> Value {
        json!({
            "id": self.id,
            "title": self.title,
            "category": self.category,
            "uri": self.uri(),
        })
    }

    fn full_json(&self) -> Value {
        json!({
            "id": self.id,
            "title": self.title,
            "category": self.category,
            "uri": self.uri(),
            "content": self.body,
        })
    }
}

pub const DOCUMENTS: &[SampleDocument] = &[
    SampleDocument {
        id: "onboarding",
        title: "Engineering Onboarding Guide",
        category: "handbook",
        body: "# Onboarding\n\nWelcome to the team. Your first week covers tooling setup and code review.\n\n- Install the toolchain\n- Read the architecture notes\n- Pair with a buddy on a small fix",
    },
    SampleDocument {
        id: "incident-2024-03",
        title: "Incident Report: Queue Backlog",
        category: "operations",
        body: "On March 4 the ingest queue backed up for 40 minutes. The root cause was a stuck consumer. We added a liveness probe. Follow-up work tracks consumer lag alerts.",
    },
    SampleDocument {
        id: "pricing",
        title: "Pricing Tiers",
        category: "sales",
        body: "{\"tiers\": [{\"name\": \"starter\", \"price\": 0}, {\"name\": \"team\", \"price\": 20}, {\"name\": \"enterprise\", \"price\": null}]}",
    },
    SampleDocument {
        id: "release-notes",
        title: "Release Notes 2.3",
        category: "product",
        body: "<html><body><h1>Release 2.3</h1><p>Faster search. Session dashboards. Bug fixes across the board.</p></body></html>",
    },
];

pub fn find_document(id: &str) -> Option<&'static SampleDocument> {
    DOCUMENTS.iter().find(|d| d.id == id)
}

/// Resolve a document id to its body, or fail with `ResourceNotFound`.
pub(crate) fn document_body(id: &str) -> Result<&'static str, CapError> {
    find_document(id)
        .map(|d| d.body)
        .ok_or_else(|| CapError::resource_not_found(&format!("docs://{id}")))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tools
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct SearchParams {
    query: String,
    category: Option<String>,
    limit: Option<usize>,
}

/// `searchDocuments`: case-insensitive title/body match.
pub struct SearchDocuments;

impl Capability for SearchDocuments {
    async fn invoke(&self, params: Value, _ctx: &InvocationContext) -> HandlerResult {
        let p: SearchParams = parse_params(params)?;
        let needle = p.query.to_lowercase();
        let matches: Vec<Value> = DOCUMENTS
            .iter()
            .filter(|d| p.category.as_deref().is_none_or(|c| d.category.eq_ignore_ascii_case(c)))
            .filter(|d| {
                d.title.to_lowercase().contains(&needle) || d.body.to_lowercase().contains(&needle)
            })
            .take(p.limit.unwrap_or(10))
            .map(SampleDocument::summary_json)
            .collect();
        Ok(json!({ "count": matches.len(), "documents": matches }))
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DocumentIdParam {
    document_id: String,
}

/// `getDocument`: full document by id.
pub struct GetDocument;

impl Capability for GetDocument {
    async fn invoke(&self, params: Value, _ctx: &InvocationContext) -> HandlerResult {
        let p: DocumentIdParam = parse_params(params)?;
        find_document(&p.document_id)
            .map(SampleDocument::full_json)
            .ok_or_else(|| CapError::resource_not_found(&format!("docs://{}", p.document_id)))
    }
}

/// `listCategories`: distinct categories with document counts.
pub struct ListCategories;

impl Capability for ListCategories {
    async fn invoke(&self, _params: Value, _ctx: &InvocationContext) -> HandlerResult {
        let mut categories: Vec<(&str, usize)> = Vec::new();
        for doc in DOCUMENTS {
            match categories.iter_mut().find(|(c, _)| *c == doc.category) {
                Some((_, n)) => *n += 1,
                None => categories.push((doc.category, 1)),
            }
        }
        let categories: Vec<Value> = categories
            .into_iter()
            .map(|(name, count)| json!({ "name": name, "count": count }))
            .collect();
        Ok(json!({ "categories": categories }))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Resources
// ─────────────────────────────────────────────────────────────────────────────

/// `docs://catalog`: index of every sample document.
pub struct CatalogResource;

impl Capability for CatalogResource {
    async fn invoke(&self, _params: Value, _ctx: &InvocationContext) -> HandlerResult {
        let index: Vec<Value> = DOCUMENTS.iter().map(SampleDocument::summary_json).collect();
        Ok(json!({
            "contents": [{
                "uri": "docs://catalog",
                "mimeType": "application/json",
                "text": Value::Array(index).to_string(),
            }]
        }))
    }
}

/// `docs://<id>`: the raw body of one document.
pub struct DocumentResource {
    pub document: &'static SampleDocument,
}

impl Capability for DocumentResource {
    async fn invoke(&self, _params: Value, _ctx: &InvocationContext) -> HandlerResult {
        Ok(json!({
            "contents": [{
                "uri": self.document.uri(),
                "mimeType": "text/plain",
                "text": self.document.body,
            }]
        }))
    }
}
