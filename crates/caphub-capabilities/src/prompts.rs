//! Interaction templates exposed through `prompts/get`.

use caphub_protocol::HandlerResult;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::documents::document_body;
use crate::{parse_params, Capability, InvocationContext};

fn user_message(text: String) -> Value {
    json!({
        "role": "user",
        "content": { "type": "text", "text": text },
    })
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummarizeRequestArgs {
    document_id: String,
    style: Option<String>,
}

/// `summarize-request`: asks for a summary of one sample document.
pub struct SummarizeRequestPrompt;

impl Capability for SummarizeRequestPrompt {
    async fn invoke(&self, params: Value, _ctx: &InvocationContext) -> HandlerResult {
        let args: SummarizeRequestArgs = parse_params(params)?;
        let body = document_body(&args.document_id)?;
        let style = args.style.as_deref().unwrap_or("concise");
        Ok(json!({
            "description": format!("Summarize document {}", args.document_id),
            "messages": [user_message(format!(
                "Please summarize the following document in a {style} style:\n\n{body}"
            ))],
        }))
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReviewArgs {
    document_id: String,
    focus: Option<String>,
}

/// `document-review`: review checklist addressed to the caller.
pub struct DocumentReviewPrompt;

impl Capability for DocumentReviewPrompt {
    async fn invoke(&self, params: Value, ctx: &InvocationContext) -> HandlerResult {
        let args: ReviewArgs = parse_params(params)?;
        let body = document_body(&args.document_id)?;
        let reviewer = ctx
            .identity
            .as_ref()
            .and_then(|i| i.username.clone())
            .unwrap_or_else(|| "reviewer".into());
        let focus = args.focus.as_deref().unwrap_or("clarity and accuracy");
        Ok(json!({
            "description": format!("Review of {}", args.document_id),
            "messages": [user_message(format!(
                "{reviewer}, review this document with a focus on {focus}. \
                 List concrete issues, then suggest edits.\n\n{body}"
            ))],
        }))
    }
}
