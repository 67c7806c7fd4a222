//! Remote vision screening collaborator
//!
//! A vision-capable chat model gets both images and answers YES or NO on
//! clinical similarity. The ranker treats every failure of this service as an
//! approval (fail-open), so an unreachable endpoint costs accuracy, never
//! availability.

use std::io::Cursor;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use base64::Engine as _;
use image::DynamicImage;
use reqwest::Client;
use serde_json::{json, Value};

/// Yes/no clinical comparison of two chromatograph images.
#[async_trait]
pub trait VisionJudge: Send + Sync {
  async fn compare(&self, query_png: &[u8], candidate_png: &[u8]) -> Result<bool>;
}

/// Configuration for the OpenRouter-backed judge.
#[derive(Debug, Clone)]
pub struct JudgeConfig {
  pub base_url: String,
  pub api_key: String,
  pub model: String,
  pub app_name: String,
  pub site_url: String,
  pub timeout_secs: u64,
}

impl JudgeConfig {
  /// Read configuration from the environment. The API key is required;
  /// everything else has a default.
  pub fn from_env() -> Result<Self> {
    let api_key = std::env::var("OPENROUTER_API_KEY")
      .map_err(|_| anyhow!("OPENROUTER_API_KEY not set; screening requires it"))?;

    Ok(Self {
      base_url: std::env::var("OPENROUTER_BASE_URL")
        .unwrap_or_else(|_| "https://openrouter.ai/api/v1".to_string()),
      api_key,
      model: std::env::var("OPENROUTER_VISION_MODEL")
        .unwrap_or_else(|_| "openai/gpt-4o".to_string()),
      app_name: std::env::var("OPENROUTER_APP_NAME")
        .unwrap_or_else(|_| "hemograph".to_string()),
      site_url: std::env::var("OPENROUTER_SITE_URL")
        .unwrap_or_else(|_| "http://localhost:8000".to_string()),
      timeout_secs: 30,
    })
  }
}

const COMPARISON_PROMPT: &str = "You are a clinical laboratory expert reviewing hemoglobin \
chromatographs.\n\nYou will be shown TWO chromatograph images: a QUERY and a CANDIDATE.\n\n\
Decide whether the two traces are clinically similar enough for the candidate to be useful \
when assessing the query.\n\nFocus on:\n1. The A2 peak height (usually the second peak): \
comparable on both traces?\n2. The F peak height, when present.\n3. The overall hemoglobin \
pattern.\n\nIf the A2 peaks are drastically different (one tiny, one dominant), answer NO. \
If the overall pattern clearly differs, answer NO. Small variations are acceptable.\n\n\
Answer with exactly one word: YES or NO.";

/// Vision judge speaking the OpenRouter chat-completions dialect.
pub struct OpenRouterJudge {
  client: Client,
  config: JudgeConfig,
}

impl OpenRouterJudge {
  pub fn new(config: JudgeConfig) -> Result<Self> {
    let client = Client::builder().timeout(Duration::from_secs(config.timeout_secs)).build()?;
    Ok(Self { client, config })
  }

  fn build_payload(&self, query_png: &[u8], candidate_png: &[u8]) -> Value {
    let encode = |png: &[u8]| {
      format!("data:image/png;base64,{}", base64::engine::general_purpose::STANDARD.encode(png))
    };

    json!({
      "model": self.config.model,
      "messages": [{
        "role": "user",
        "content": [
          { "type": "text", "text": COMPARISON_PROMPT },
          { "type": "image_url", "image_url": { "url": encode(query_png) } },
          { "type": "text", "text": "First image: the QUERY (newly submitted)." },
          { "type": "image_url", "image_url": { "url": encode(candidate_png) } },
          { "type": "text", "text": "Second image: the CANDIDATE (stored record). Clinically similar? YES or NO only:" }
        ]
      }],
      "max_tokens": 10,
      "temperature": 0.3
    })
  }

  fn parse_verdict(reply: &str) -> bool {
    reply.to_uppercase().contains("YES")
  }
}

#[async_trait]
impl VisionJudge for OpenRouterJudge {
  async fn compare(&self, query_png: &[u8], candidate_png: &[u8]) -> Result<bool> {
    let url = format!("{}/chat/completions", self.config.base_url);
    let payload = self.build_payload(query_png, candidate_png);

    let response = self
      .client
      .post(&url)
      .bearer_auth(&self.config.api_key)
      .header("HTTP-Referer", &self.config.site_url)
      .header("X-Title", &self.config.app_name)
      .json(&payload)
      .send()
      .await?;

    if !response.status().is_success() {
      let status = response.status();
      let body = response.text().await.unwrap_or_default();
      return Err(anyhow!("vision screening request failed: {status}: {body}"));
    }

    let data: Value = response.json().await?;
    let reply = data["choices"][0]["message"]["content"]
      .as_str()
      .ok_or_else(|| anyhow!("vision response missing message content"))?;

    Ok(Self::parse_verdict(reply))
  }
}

/// Encode an image as PNG bytes for the screening payload.
pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
  let mut buffer = Vec::new();
  image
    .write_to(&mut Cursor::new(&mut buffer), image::ImageFormat::Png)
    .map_err(|e| anyhow!("failed to encode image as PNG: {e}"))?;
  Ok(buffer)
}
