use super::{build_client, catch_error, ChatApi, ChatCompletionsData, ChatCompletionsOutput};

use crate::config::Config;

use anyhow::{anyhow, bail, Context, Result};
use log::debug;
use reqwest::{Client as ReqwestClient, RequestBuilder};
use serde_json::{json, Value};

const API_BASE: &str = "https://api.openai.com/v1";

pub struct OpenAIClient {
    model: String,
    api_key: Option<String>,
    api_base: Option<String>,
    client: ReqwestClient,
}

impl OpenAIClient {
    pub const NAME: &'static str = "openai";

    pub fn init(config: &Config) -> Result<Self> {
        Ok(Self {
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            api_base: config.api_base.clone(),
            client: build_client(config)?,
        })
    }

    fn request_builder(&self, data: ChatCompletionsData) -> Result<RequestBuilder> {
        let api_key = self.api_key.clone().ok_or_else(|| {
            anyhow!("Miss api_key, set the OPENAI_API_KEY environment variable")
        })?;
        let api_base = self.api_base.clone().unwrap_or_else(|| API_BASE.into());

        let body = openai_build_chat_body(data, &self.model);

        let url = format!("{api_base}/chat/completions");

        debug!("OpenAI Request: {url} {body}");

        let builder = self.client.post(url).bearer_auth(api_key).json(&body);

        Ok(builder)
    }
}

#[async_trait::async_trait]
impl ChatApi for OpenAIClient {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn chat_completions(&self, data: ChatCompletionsData) -> Result<ChatCompletionsOutput> {
        let builder = self.request_builder(data)?;
        openai_send_message(builder)
            .await
            .with_context(|| "Failed to call chat-completions api")
    }
}

pub async fn openai_send_message(builder: RequestBuilder) -> Result<ChatCompletionsOutput> {
    let res = builder.send().await?;
    let status = res.status();
    let data: Value = res.json().await?;
    if !status.is_success() {
        catch_error(&data, status.as_u16())?;
    }

    debug!("chat-completions-data: {data}");
    openai_extract_chat_completions(&data)
}

pub fn openai_build_chat_body(data: ChatCompletionsData, model: &str) -> Value {
    let ChatCompletionsData {
        messages,
        temperature,
        max_tokens,
    } = data;

    let mut body = json!({
        "model": model,
        "messages": messages,
    });

    if let Some(v) = temperature {
        body["temperature"] = v.into();
    }
    if let Some(v) = max_tokens {
        body["max_tokens"] = v.into();
    }
    body
}

pub fn openai_extract_chat_completions(data: &Value) -> Result<ChatCompletionsOutput> {
    let text = data["choices"][0]["message"]["content"]
        .as_str()
        .unwrap_or_default();
    if text.is_empty() {
        bail!("Invalid response data: {data}");
    }

    let output = ChatCompletionsOutput {
        text: text.to_string(),
        id: data["id"].as_str().map(|v| v.to_string()),
        input_tokens: data["usage"]["prompt_tokens"].as_u64(),
        output_tokens: data["usage"]["completion_tokens"].as_u64(),
    };
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Message;

    #[test]
    fn test_build_chat_body() {
        let data = ChatCompletionsData {
            messages: vec![Message::system("You are a coach."), Message::new("Hello")],
            temperature: Some(0.7),
            max_tokens: Some(1000),
        };
        let body = openai_build_chat_body(data, "gpt-4");
        assert_eq!(
            body,
            json!({
                "model": "gpt-4",
                "messages": [
                    {"role": "system", "content": "You are a coach."},
                    {"role": "user", "content": "Hello"},
                ],
                "temperature": 0.7,
                "max_tokens": 1000,
            })
        );
    }

    #[test]
    fn test_extract_chat_completions() {
        let data = json!({
            "id": "chatcmpl-123",
            "choices": [{"message": {"content": "Work harder on yourself."}}],
            "usage": {"prompt_tokens": 57, "completion_tokens": 17},
        });
        let output = openai_extract_chat_completions(&data).unwrap();
        assert_eq!(output.text, "Work harder on yourself.");
        assert_eq!(output.id.as_deref(), Some("chatcmpl-123"));
        assert_eq!(output.input_tokens, Some(57));
        assert_eq!(output.output_tokens, Some(17));

        assert!(openai_extract_chat_completions(&json!({"choices": []})).is_err());
    }
}
