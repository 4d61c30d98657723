use super::{build_client, catch_error, SpeechApi};

use crate::config::Config;

use anyhow::{anyhow, bail, Context, Result};
use bytes::Bytes;
use fancy_regex::Regex;
use log::debug;
use reqwest::{Client as ReqwestClient, RequestBuilder};
use serde_json::{json, Value};
use std::sync::LazyLock;

const API_BASE: &str = "https://api.elevenlabs.io/v1";
const MODEL_ID: &str = "eleven_monolingual_v1";

pub struct ElevenLabsClient {
    api_key: Option<String>,
    voice_id: Option<String>,
    api_base: Option<String>,
    client: ReqwestClient,
}

impl ElevenLabsClient {
    pub const NAME: &'static str = "elevenlabs";

    pub fn init(config: &Config) -> Result<Self> {
        Ok(Self {
            api_key: config.voice.api_key.clone(),
            voice_id: config.voice.voice_id.clone(),
            api_base: config.voice.api_base.clone(),
            client: build_client(config)?,
        })
    }

    fn request_builder(&self, text: &str) -> Result<RequestBuilder> {
        let api_key = self.api_key.clone().ok_or_else(|| {
            anyhow!("Miss api_key, set the ELEVENLABS_API_KEY environment variable")
        })?;
        let voice_id = self.voice_id.clone().ok_or_else(|| {
            anyhow!("Miss voice_id, set the ELEVENLABS_VOICE_ID environment variable")
        })?;
        let api_base = self.api_base.clone().unwrap_or_else(|| API_BASE.into());

        let body = json!({
            "text": text,
            "model_id": MODEL_ID,
        });

        let url = format!("{api_base}/text-to-speech/{voice_id}");

        debug!("ElevenLabs Request: {url}");

        let builder = self
            .client
            .post(url)
            .header("xi-api-key", api_key)
            .json(&body);

        Ok(builder)
    }
}

#[async_trait::async_trait]
impl SpeechApi for ElevenLabsClient {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn synthesize(&self, text: &str) -> Result<Bytes> {
        let builder = self.request_builder(text)?;
        elevenlabs_send_text(builder)
            .await
            .with_context(|| "Failed to call text-to-speech api")
    }
}

pub async fn elevenlabs_send_text(builder: RequestBuilder) -> Result<Bytes> {
    let res = builder.send().await?;
    let status = res.status();
    if status.is_success() {
        let audio = res.bytes().await?;
        debug!("text-to-speech-data: {} bytes", audio.len());
        Ok(audio)
    } else {
        let data: Value = res.json().await.unwrap_or_default();
        catch_error(&data, status.as_u16())?;
        bail!("Invalid response (status: {status})");
    }
}

static RE_BOLD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*\*(.*?)\*\*").unwrap());
static RE_ITALIC: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*(.*?)\*").unwrap());
static RE_UNDERLINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"__(.*?)__").unwrap());
static RE_UNDERSCORE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"_(.*?)_").unwrap());
static RE_HEADER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"#{1,6}\s+").unwrap());
static RE_CODE_BLOCK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)```.*?```").unwrap());
static RE_INLINE_CODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"`([^`]+)`").unwrap());
static RE_LINK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\([^)]+\)").unwrap());
static RE_SPECIAL_DASH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[•·–—]").unwrap());
static RE_DOTS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\.{2,}").unwrap());
static RE_WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Strips markdown and normalizes punctuation so the narration doesn't read it aloud.
pub fn clean_text_for_speech(text: &str) -> String {
    let text = RE_BOLD.replace_all(text, "$1");
    let text = RE_ITALIC.replace_all(&text, "$1");
    let text = RE_UNDERLINE.replace_all(&text, "$1");
    let text = RE_UNDERSCORE.replace_all(&text, "$1");

    let text = RE_HEADER.replace_all(&text, "");
    let text = RE_CODE_BLOCK.replace_all(&text, "");
    let text = RE_INLINE_CODE.replace_all(&text, "$1");
    let text = RE_LINK.replace_all(&text, "$1");

    let text = text
        .replace('\u{2019}', "'")
        .replace('\u{2018}', "'")
        .replace('\u{201c}', "\"")
        .replace('\u{201d}', "\"");

    let text = RE_SPECIAL_DASH.replace_all(&text, "-");
    let text = RE_DOTS.replace_all(&text, ".");
    let text = RE_WHITESPACE.replace_all(&text, " ");

    let text = text
        .replace(':', ": ")
        .replace(';', ". ")
        .replace('&', "and");

    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text_markdown() {
        assert_eq!(
            clean_text_for_speech("**Give more than you take**: This is the foundation..."),
            "Give more than you take:  This is the foundation."
        );
        assert_eq!(
            clean_text_for_speech(
                "*Success* is nothing more than a few simple disciplines, practiced every day."
            ),
            "Success is nothing more than a few simple disciplines, practiced every day."
        );
        assert_eq!(
            clean_text_for_speech("## Plan\n```\nlet x = 1;\n```\nRead [this](https://example.com) `now`"),
            "Plan Read this now"
        );
    }

    #[test]
    fn test_clean_text_punctuation() {
        assert_eq!(
            clean_text_for_speech(
                "Work harder on yourself than you do on your job & you'll attract more success."
            ),
            "Work harder on yourself than you do on your job and you'll attract more success."
        );
        assert_eq!(
            clean_text_for_speech("Here are **five key principles**: \n• First principle\n• Second principle"),
            "Here are five key principles:  - First principle - Second principle"
        );
        assert_eq!(
            clean_text_for_speech("\u{2018}Don\u{2019}t wish it was easier; wish you were better.\u{2019}"),
            "'Don't wish it was easier.  wish you were better.'"
        );
    }
}
