use serde_json::Value;

use crate::{Error, Result};

const SYSTEM_PROMPT: &str =
	"You are a land title analyst. Answer with a single JSON object and no other text.";

/// Sends one assessment prompt to an OpenAI-compatible chat endpoint and returns the raw reply.
///
/// The reply is not interpreted here; callers parse it so unparseable text can be kept.
pub async fn complete(cfg: &landman_config::LlmProviderConfig, prompt: &str) -> Result<String> {
	let client = crate::client(cfg.timeout_ms)?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let body = serde_json::json!({
		"model": cfg.model,
		"temperature": cfg.temperature,
		"max_tokens": cfg.max_tokens,
		"messages": [
			{ "role": "system", "content": SYSTEM_PROMPT },
			{ "role": "user", "content": prompt },
		],
	});
	let res = client
		.post(&url)
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?;
	let json: Value = res.error_for_status()?.json().await?;

	parse_completion_text(&json)
}

fn parse_completion_text(json: &Value) -> Result<String> {
	json.get("choices")
		.and_then(|v| v.as_array())
		.and_then(|arr| arr.first())
		.and_then(|choice| choice.get("message"))
		.and_then(|msg| msg.get("content"))
		.and_then(|c| c.as_str())
		.map(str::to_string)
		.ok_or_else(|| Error::InvalidResponse {
			message: "Assessment response is missing message content.".to_string(),
		})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn reads_first_choice_content() {
		let json = serde_json::json!({
			"choices": [
				{ "message": { "content": "{\"assessment\": \"exclude\"}" } },
				{ "message": { "content": "ignored" } }
			]
		});

		assert_eq!(
			parse_completion_text(&json).expect("parse failed"),
			"{\"assessment\": \"exclude\"}"
		);
	}

	#[test]
	fn missing_content_is_invalid_response() {
		let json = serde_json::json!({ "choices": [] });

		assert!(matches!(parse_completion_text(&json), Err(Error::InvalidResponse { .. })));
	}
}
