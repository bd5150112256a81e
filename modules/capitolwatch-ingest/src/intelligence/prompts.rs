use ai_client::util::{extract_json_object, truncate_to_char_boundary};

use capitolwatch_common::{AnalysisRequest, AnalysisResult, AnalysisSourceType};

/// Content beyond this many bytes is cut before prompting.
const MAX_CONTENT_BYTES: usize = 24_000;

pub const SYSTEM_PROMPT: &str = "You are a nonpartisan legislative analyst. \
Respond with a single JSON object and nothing else, using exactly these keys: \
\"summary\" (string, at most three sentences), \
\"key_points\" (array of short strings), \
\"entities\" (array of people, organizations, bills or places mentioned), \
\"sentiment\" (one of \"positive\", \"negative\", \"neutral\", \"mixed\"), \
\"confidence\" (number between 0 and 1).";

fn instructions(source_type: AnalysisSourceType) -> &'static str {
    match source_type {
        AnalysisSourceType::Bill => {
            "Summarize what this bill does, who it affects, and where it stands in the legislative process."
        }
        AnalysisSourceType::BillText => {
            "Review this bill text. Identify the operative provisions, definitions that change existing law, and effective dates."
        }
        AnalysisSourceType::FiscalNote => {
            "Assess the fiscal impact described in this fiscal note: costs, revenue, affected agencies and fiscal years."
        }
        AnalysisSourceType::Signal => {
            "Assess this public post or article about state legislation: what position it takes, and on which bills or legislators."
        }
        AnalysisSourceType::Document => {
            "Summarize this legislative document and list its main points."
        }
    }
}

/// User prompt for one queued request.
pub fn build_prompt(request: &AnalysisRequest) -> String {
    let content = truncate_to_char_boundary(&request.content, MAX_CONTENT_BYTES);
    format!(
        "{}\n\nSource: {} {}\n\n<content>\n{}\n</content>",
        instructions(request.source_type),
        request.source_type,
        request.source_id,
        content
    )
}

/// Parse provider output into a result. `None` when no well-formed object
/// with a non-empty summary can be recovered.
pub fn parse_result(text: &str) -> Option<AnalysisResult> {
    let json = extract_json_object(text)?;
    let mut result: AnalysisResult = serde_json::from_str(json).ok()?;
    if result.summary.trim().is_empty() {
        return None;
    }
    result.confidence = result.confidence.clamp(0.0, 1.0);
    Some(result)
}
