use super::Message;

use crate::config::Config;

use anyhow::{bail, Context, Result};
use bytes::Bytes;
use log::debug;
use reqwest::{Client as ReqwestClient, ClientBuilder, Proxy};
use serde_json::Value;
use std::{env, time::Duration};

#[async_trait::async_trait]
pub trait ChatApi: Sync + Send {
    fn name(&self) -> &str;

    async fn chat_completions(&self, data: ChatCompletionsData) -> Result<ChatCompletionsOutput>;
}

#[async_trait::async_trait]
pub trait SpeechApi: Sync + Send {
    fn name(&self) -> &str;

    /// Synthesizes the text, returns encoded audio.
    async fn synthesize(&self, text: &str) -> Result<Bytes>;
}

#[derive(Debug, Clone)]
pub struct ChatCompletionsData {
    pub messages: Vec<Message>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<isize>,
}

#[derive(Debug, Clone, Default)]
pub struct ChatCompletionsOutput {
    pub text: String,
    pub id: Option<String>,
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
}

impl ChatCompletionsOutput {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            ..Default::default()
        }
    }
}

pub fn build_client(config: &Config) -> Result<ReqwestClient> {
    let mut builder = ReqwestClient::builder();
    let timeout = config.connect_timeout.unwrap_or(10);
    builder = set_proxy(builder, config.proxy.as_ref())?;
    let client = builder
        .connect_timeout(Duration::from_secs(timeout))
        .build()
        .with_context(|| "Failed to build client")?;
    Ok(client)
}

pub fn set_proxy(builder: ClientBuilder, proxy: Option<&String>) -> Result<ClientBuilder> {
    let proxy = if let Some(proxy) = proxy {
        if proxy.is_empty() || proxy == "false" || proxy == "-" {
            return Ok(builder);
        }
        proxy.clone()
    } else if let Ok(proxy) = env::var("HTTPS_PROXY").or_else(|_| env::var("ALL_PROXY")) {
        proxy
    } else {
        return Ok(builder);
    };
    let builder = builder
        .proxy(Proxy::all(&proxy).with_context(|| format!("Invalid proxy `{proxy}`"))?);
    Ok(builder)
}

pub fn catch_error(data: &Value, status: u16) -> Result<()> {
    if (200..300).contains(&status) {
        return Ok(());
    }
    debug!("Invalid response, status: {status}, data: {data}");
    if let Some(error) = data["error"].as_object() {
        if let (Some(typ), Some(message)) = (
            json_str_from_map(error, "type"),
            json_str_from_map(error, "message"),
        ) {
            bail!("{message} (type: {typ})");
        } else if let (Some(code), Some(message)) = (
            json_str_from_map(error, "code"),
            json_str_from_map(error, "message"),
        ) {
            bail!("{message} (code: {code})");
        }
    } else if let Some(message) = data["detail"]["message"].as_str() {
        bail!("{message}");
    } else if let Some(detail) = data["detail"].as_str() {
        bail!("{detail}");
    } else if let Some(error) = data["error"].as_str() {
        bail!("{error}");
    } else if let Some(message) = data["message"].as_str() {
        bail!("{message}");
    }
    bail!("Invalid response data: {data} (status: {status})");
}

pub fn json_str_from_map<'a>(
    map: &'a serde_json::Map<String, Value>,
    field_name: &str,
) -> Option<&'a str> {
    map.get(field_name).and_then(|v| v.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_catch_error() {
        assert!(catch_error(&json!({}), 200).is_ok());

        let data = json!({"error": {"type": "invalid_request_error", "message": "Incorrect API key provided"}});
        let err = catch_error(&data, 401).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Incorrect API key provided (type: invalid_request_error)"
        );

        let data = json!({"detail": {"status": "invalid_api_key", "message": "Invalid API key"}});
        let err = catch_error(&data, 401).unwrap_err();
        assert_eq!(err.to_string(), "Invalid API key");
    }
}
