use serde::de::DeserializeOwned;

use super::errors::PipelineError;

/// Candidate JSON payloads in a model reply that may wrap them in prose or
/// markdown fences: the outer object and array spans, earliest first, then
/// the whole trimmed reply.
pub fn json_candidates(response: &str) -> Vec<&str> {
    let mut spans: Vec<(usize, usize)> = [
        response.find('{').zip(response.rfind('}')),
        response.find('[').zip(response.rfind(']')),
    ]
    .into_iter()
    .flatten()
    .filter(|(start, end)| start < end)
    .collect();
    spans.sort_unstable();

    let mut candidates: Vec<&str> = spans
        .into_iter()
        .map(|(start, end)| &response[start..=end])
        .collect();
    candidates.push(response.trim());
    candidates
}

/// The earliest candidate payload.
pub fn extract_json(response: &str) -> &str {
    json_candidates(response)
        .into_iter()
        .next()
        .unwrap_or_else(|| response.trim())
}

/// Decode the first candidate payload that fits `T`.
pub fn parse_llm_json<T: DeserializeOwned>(what: &str, response: &str) -> Result<T, PipelineError> {
    let mut last_error = None;
    for candidate in json_candidates(response) {
        match serde_json::from_str(candidate) {
            Ok(value) => return Ok(value),
            Err(e) => last_error = Some(e),
        }
    }

    log::debug!("could not decode {} from model reply: {}", what, response);
    Err(PipelineError::parse(
        what,
        last_error.map_or_else(|| "empty reply".to_string(), |e| e.to_string()),
    ))
}
