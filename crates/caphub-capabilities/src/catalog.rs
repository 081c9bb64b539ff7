//! The default capability set the server boots with.

use crate::analysis::{
    CompareDocuments, CountWordsAndCharacters, DetectDocumentFormat, ExtractKeywords,
    SummarizeDocument,
};
use crate::contract::ParamContract;
use crate::documents::{
    CatalogResource, DocumentResource, GetDocument, ListCategories, SearchDocuments, DOCUMENTS,
};
use crate::prompts::{DocumentReviewPrompt, SummarizeRequestPrompt};
use crate::registry::{CapabilityRegistry, Descriptor, RegistryError};

/// Dynamic tools granted when a session starts talking about documents.
pub const DOCUMENT_TOOLS: &[&str] = &[
    "summarizeDocument",
    "countWordsAndCharacters",
    "detectDocumentFormat",
];

/// Dynamic tools granted when a session asks for deeper analysis.
pub const ANALYSIS_TOOLS: &[&str] = &["extractKeywords", "compareDocuments"];

fn text_source() -> crate::contract::ContractBuilder {
    ParamContract::object()
        .optional("text", "string", "Inline text to analyse")
        .optional("documentId", "string", "Id of a sample document")
}

/// Build the registry with every sample capability.
pub fn default_registry() -> Result<CapabilityRegistry, RegistryError> {
    let mut registry = CapabilityRegistry::new();

    // ── Static tools ────────────────────────────────────────────────────
    registry.register_static(
        Descriptor::tool(
            "searchDocuments",
            "Search the document library by title or content",
            ParamContract::object()
                .required("query", "string", "Text to look for")
                .optional("category", "string", "Restrict to one category")
                .optional("limit", "integer", "Maximum number of results")
                .build(),
        ),
        SearchDocuments,
    )?;
    registry.register_static(
        Descriptor::tool(
            "getDocument",
            "Fetch a document by id",
            ParamContract::object()
                .required("documentId", "string", "Document id")
                .build(),
        ),
        GetDocument,
    )?;
    registry.register_static(
        Descriptor::tool(
            "listCategories",
            "List document categories",
            ParamContract::object().build(),
        ),
        ListCategories,
    )?;

    // ── Dynamic tools ───────────────────────────────────────────────────
    registry.register_dynamic(
        Descriptor::tool(
            "summarizeDocument",
            "Summarize a document or a piece of text",
            text_source()
                .optional("maxSentences", "integer", "Sentences to keep")
                .build(),
        ),
        SummarizeDocument,
    )?;
    registry.register_dynamic(
        Descriptor::tool(
            "countWordsAndCharacters",
            "Count words, characters and lines",
            text_source().build(),
        ),
        CountWordsAndCharacters,
    )?;
    registry.register_dynamic(
        Descriptor::tool(
            "detectDocumentFormat",
            "Detect whether text is JSON, HTML, Markdown, CSV or plain",
            text_source().build(),
        ),
        DetectDocumentFormat,
    )?;
    registry.register_dynamic(
        Descriptor::tool(
            "extractKeywords",
            "Most frequent non-trivial terms",
            text_source()
                .optional("limit", "integer", "Number of keywords")
                .build(),
        ),
        ExtractKeywords,
    )?;
    registry.register_dynamic(
        Descriptor::tool(
            "compareDocuments",
            "Vocabulary overlap between two documents",
            ParamContract::object()
                .required("leftId", "string", "First document id")
                .required("rightId", "string", "Second document id")
                .build(),
        ),
        CompareDocuments,
    )?;

    // ── Resources ───────────────────────────────────────────────────────
    registry.register_static(
        Descriptor::resource("docs://catalog", "Index of all documents"),
        CatalogResource,
    )?;
    for document in DOCUMENTS {
        registry.register_static(
            Descriptor::resource(document.uri(), document.title),
            DocumentResource { document },
        )?;
    }

    // ── Prompts ─────────────────────────────────────────────────────────
    registry.register_static(
        Descriptor::prompt(
            "summarize-request",
            "Ask for a summary of a document",
            ParamContract::object()
                .required("documentId", "string", "Document to summarize")
                .optional("style", "string", "Summary style")
                .build(),
        ),
        SummarizeRequestPrompt,
    )?;
    registry.register_static(
        Descriptor::prompt(
            "document-review",
            "Structured review of a document",
            ParamContract::object()
                .required("documentId", "string", "Document to review")
                .optional("focus", "string", "What to focus on")
                .build(),
        ),
        DocumentReviewPrompt,
    )?;

    Ok(registry)
}
