//! Tip generation through an LLM provider
//!
//! Two prompts are issued per song, one for theory and one for trivia. Each
//! reply is cleaned into one tip per line so the overlay can rotate through
//! them.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::{json, Value};

use crate::config::{LlmConfig, LlmProvider};
use crate::error::{Error, Result};
use crate::types::TipEntry;

const SYSTEM_PROMPT: &str =
    "You are a guitar instructor helping a player practicing in Rocksmith 2014. \
Reply with plain sentences, one per line, without numbering or commentary.";

pub type GenerateFuture<'a> = Pin<Box<dyn Future<Output = Result<TipEntry>> + Send + 'a>>;

/// Produces a theory/trivia pair for a song.
///
/// Boxed so the engine can hold any implementation behind `Arc<dyn _>`.
pub trait TipGenerator: Send + Sync {
    fn generate<'a>(&'a self, song: &'a str, artist: &'a str) -> GenerateFuture<'a>;
}

/// Build the generator described by `llm`, or one that always fails when no
/// provider is configured.
pub fn create_generator(
    llm: Option<&LlmConfig>,
    tips_per_kind: usize,
) -> Result<Arc<dyn TipGenerator>> {
    match llm {
        Some(config) => Ok(Arc::new(LlmTipGenerator::new(config, tips_per_kind)?)),
        None => Ok(Arc::new(UnconfiguredGenerator)),
    }
}

/// Placeholder used when no `[llm]` section is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredGenerator;

impl TipGenerator for UnconfiguredGenerator {
    fn generate<'a>(&'a self, _song: &'a str, _artist: &'a str) -> GenerateFuture<'a> {
        Box::pin(async {
            Err(Error::Generator(
                "no LLM provider configured (add an [llm] section)".to_string(),
            ))
        })
    }
}

pub(crate) fn theory_prompt(count: usize, song: &str, artist: &str) -> String {
    format!(
        "Provide {count} concise, single-sentence music theory tips for '{song}' by '{artist}' in Rocksmith 2014."
    )
}

pub(crate) fn trivia_prompt(count: usize, song: &str, artist: &str) -> String {
    format!("Provide {count} short, interesting trivia facts about '{song}' by '{artist}'.")
}

/// Strip blank lines, list markers and numbering from a model reply and
/// keep at most `limit` lines.
pub(crate) fn clean_lines(raw: &str, limit: usize) -> String {
    raw.lines()
        .map(strip_marker)
        .filter(|line| !line.is_empty())
        .take(limit.max(1))
        .collect::<Vec<_>>()
        .join("\n")
}

/// `- tip`, `* tip`, `1. tip` and `2) tip` all become `tip`.
fn strip_marker(line: &str) -> &str {
    let line = line.trim();
    if let Some(rest) = line.strip_prefix(['-', '*', '•']) {
        return rest.trim_start();
    }
    let digits = line.len() - line.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    if digits > 0 {
        if let Some(rest) = line[digits..].strip_prefix(['.', ')']) {
            return rest.trim_start();
        }
    }
    line
}

/// Generator backed by Ollama, Claude or OpenAI.
pub struct LlmTipGenerator {
    model: String,
    provider: LlmProvider,
    endpoint: String,
    api_key: Option<String>,
    tips_per_kind: usize,
    http: reqwest::Client,
}

impl LlmTipGenerator {
    pub fn new(config: &LlmConfig, tips_per_kind: usize) -> Result<Self> {
        let endpoint = config
            .endpoint
            .clone()
            .unwrap_or_else(|| config.provider.default_endpoint().to_string());
        let api_key = match config.provider {
            LlmProvider::Ollama => None,
            LlmProvider::Claude => config
                .api_key
                .clone()
                .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok()),
            LlmProvider::OpenAI => config
                .api_key
                .clone()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok()),
        };

        if matches!(config.provider, LlmProvider::Claude | LlmProvider::OpenAI) && api_key.is_none()
        {
            return Err(Error::Config(
                "llm.api_key (or provider env var) is required".to_string(),
            ));
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| Error::Generator(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            model: config.model.clone(),
            provider: config.provider,
            endpoint,
            api_key,
            tips_per_kind: tips_per_kind.max(1),
            http,
        })
    }

    fn provider_name(&self) -> &'static str {
        match self.provider {
            LlmProvider::Ollama => "ollama",
            LlmProvider::Claude => "claude",
            LlmProvider::OpenAI => "openai",
        }
    }

    /// URL, headers and JSON body for one completion request.
    fn request_parts(&self, prompt: &str) -> Result<(String, HeaderMap, Value)> {
        let base = self.endpoint.trim_end_matches('/');
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        match self.provider {
            LlmProvider::Ollama => Ok((
                format!("{base}/api/generate"),
                headers,
                json!({
                    "model": self.model,
                    "system": SYSTEM_PROMPT,
                    "prompt": prompt,
                    "stream": false,
                }),
            )),
            LlmProvider::Claude => {
                headers.insert(
                    "x-api-key",
                    HeaderValue::from_str(self.api_key.as_deref().unwrap_or_default())
                        .map_err(|e| Error::Generator(format!("invalid claude api key header: {e}")))?,
                );
                headers.insert("anthropic-version", HeaderValue::from_static("2023-06-01"));
                Ok((
                    format!("{base}/v1/messages"),
                    headers,
                    json!({
                        "model": self.model,
                        "max_tokens": 400,
                        "system": SYSTEM_PROMPT,
                        "messages": [{ "role": "user", "content": prompt }],
                    }),
                ))
            }
            LlmProvider::OpenAI => {
                headers.insert(
                    AUTHORIZATION,
                    HeaderValue::from_str(&format!(
                        "Bearer {}",
                        self.api_key.as_deref().unwrap_or_default()
                    ))
                    .map_err(|e| Error::Generator(format!("invalid auth header: {e}")))?,
                );
                Ok((
                    format!("{base}/v1/chat/completions"),
                    headers,
                    json!({
                        "model": self.model,
                        "messages": [
                            { "role": "system", "content": SYSTEM_PROMPT },
                            { "role": "user", "content": prompt }
                        ]
                    }),
                ))
            }
        }
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let name = self.provider_name();
        let (url, headers, body) = self.request_parts(prompt)?;

        let resp = self
            .http
            .post(url)
            .headers(headers)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Generator(format!("{name} request failed: {e}")))?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| Error::Generator(format!("{name} read body failed: {e}")))?;
        if !status.is_success() {
            return Err(Error::Generator(format!(
                "{name} returned {}: {}",
                status.as_u16(),
                text
            )));
        }

        let json: Value = serde_json::from_str(&text)?;
        extract_text(self.provider, &json)
    }
}

/// Pull the reply text out of a provider response body.
fn extract_text(provider: LlmProvider, json: &Value) -> Result<String> {
    let text = match provider {
        LlmProvider::Ollama => json.get("response").and_then(Value::as_str),
        LlmProvider::Claude => json
            .get("content")
            .and_then(Value::as_array)
            .and_then(|arr| arr.first())
            .and_then(|v| v.get("text"))
            .and_then(Value::as_str),
        LlmProvider::OpenAI => json
            .get("choices")
            .and_then(Value::as_array)
            .and_then(|arr| arr.first())
            .and_then(|v| v.get("message"))
            .and_then(|v| v.get("content"))
            .and_then(Value::as_str),
    };
    text.map(ToString::to_string).ok_or_else(|| {
        Error::Generator(match provider {
            LlmProvider::Ollama => "ollama response missing string field `response`".to_string(),
            LlmProvider::Claude => "claude response missing content[0].text".to_string(),
            LlmProvider::OpenAI => {
                "openai response missing choices[0].message.content".to_string()
            }
        })
    })
}

impl TipGenerator for LlmTipGenerator {
    fn generate<'a>(&'a self, song: &'a str, artist: &'a str) -> GenerateFuture<'a> {
        Box::pin(async move {
            let n = self.tips_per_kind;
            let theory_prompt = theory_prompt(n, song, artist);
            let trivia_prompt = trivia_prompt(n, song, artist);

            tracing::debug!(song = %song, provider = self.provider_name(), "Requesting tips");
            let (theory, trivia) =
                tokio::join!(self.complete(&theory_prompt), self.complete(&trivia_prompt));

            let theory = clean_lines(&theory?, n);
            let trivia = clean_lines(&trivia?, n);
            if theory.is_empty() || trivia.is_empty() {
                return Err(Error::Generator(format!(
                    "{} returned no usable tips for '{}'",
                    self.provider_name(),
                    song
                )));
            }

            Ok(TipEntry::new(theory, trivia).with_artist(artist))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn llm(provider: LlmProvider, api_key: Option<&str>) -> LlmConfig {
        LlmConfig {
            provider,
            model: "test-model".to_string(),
            endpoint: Some("http://localhost:9/".to_string()),
            api_key: api_key.map(str::to_string),
            timeout_secs: 5,
        }
    }

    #[test]
    fn test_prompts_name_song_and_artist() {
        assert_eq!(
            theory_prompt(3, "Crazy Train", "Ozzy Osbourne"),
            "Provide 3 concise, single-sentence music theory tips for 'Crazy Train' by 'Ozzy Osbourne' in Rocksmith 2014."
        );
        assert!(trivia_prompt(2, "Paranoid", "Black Sabbath").contains("'Paranoid' by 'Black Sabbath'"));
    }

    #[test]
    fn test_clean_lines_strips_markers() {
        let raw = "1. Use alternate picking.\n\n- Palm mute the verse.\n* Watch the bend\n4) extra";
        assert_eq!(clean_lines("12-bar blues shapes help here.", 3), "12-bar blues shapes help here.");
        assert_eq!(
            clean_lines(raw, 3),
            "Use alternate picking.\nPalm mute the verse.\nWatch the bend"
        );
    }

    #[test]
    fn test_extract_text_per_provider() {
        let ollama = json!({"response": "a"});
        let claude = json!({"content": [{"type": "text", "text": "b"}]});
        let openai = json!({"choices": [{"message": {"content": "c"}}]});

        assert_eq!(extract_text(LlmProvider::Ollama, &ollama).unwrap(), "a");
        assert_eq!(extract_text(LlmProvider::Claude, &claude).unwrap(), "b");
        assert_eq!(extract_text(LlmProvider::OpenAI, &openai).unwrap(), "c");
        assert!(matches!(
            extract_text(LlmProvider::Claude, &ollama),
            Err(Error::Generator(_))
        ));
    }

    #[test]
    fn test_request_parts() {
        let generator = LlmTipGenerator::new(&llm(LlmProvider::Claude, Some("k")), 3).unwrap();
        let (url, headers, body) = generator.request_parts("hello").unwrap();
        assert_eq!(url, "http://localhost:9/v1/messages");
        assert_eq!(headers.get("x-api-key").unwrap(), "k");
        assert_eq!(body["messages"][0]["content"], "hello");

        let generator = LlmTipGenerator::new(&llm(LlmProvider::Ollama, None), 3).unwrap();
        let (url, _, body) = generator.request_parts("hi").unwrap();
        assert_eq!(url, "http://localhost:9/api/generate");
        assert_eq!(body["stream"], false);
    }

    #[test]
    fn test_openai_requires_key() {
        std::env::remove_var("OPENAI_API_KEY");
        let err = LlmTipGenerator::new(&llm(LlmProvider::OpenAI, None), 3)
            .err()
            .unwrap();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn test_unconfigured_generator_fails() {
        let generator = create_generator(None, 3).unwrap();
        let err = generator.generate("Crazy Train", "Ozzy").await.unwrap_err();
        assert!(matches!(err, Error::Generator(_)));
    }
}
