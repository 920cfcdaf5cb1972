use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use ollama_rs::{
    generation::{completion::request::GenerationRequest, images::Image},
    Ollama,
};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result, Service};
use crate::pipeline::services::{CompletionRequest, ImageCaptioner, TextGenerator};
use crate::settings::OllamaSettings;

const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

const CAPTION_PROMPT: &str = "Describe this image in detail so that it can be answered as a \
    text question. Start from the user's words if they are given, then add what the image shows.";

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatOptions {
    temperature: f32,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    format: &'a Value,
    stream: bool,
    options: ChatOptions,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: String,
}

/// Calls Ollama's `/api/chat` with the reply constrained to a JSON schema.
pub struct OllamaGenerator {
    client: Client,
    endpoint: Url,
    model: String,
    temperature: f32,
}

impl OllamaGenerator {
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the Ollama URL is invalid or the HTTP
    /// client cannot be built.
    pub fn new(settings: &OllamaSettings, model: &str) -> Result<Self> {
        let endpoint = parse_url(&settings.url)?
            .join("api/chat")
            .map_err(|e| Error::Config(format!("invalid Ollama URL: {e}")))?;
        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .build()
            .map_err(|e| Error::Config(e.to_string()))?;
        Ok(Self {
            client,
            endpoint,
            model: model.to_string(),
            temperature: settings.temperature,
        })
    }

    fn messages<'a>(&self, request: &'a CompletionRequest) -> Vec<ChatMessage<'a>> {
        let mut messages = Vec::with_capacity(request.history.len() + 2);
        messages.push(ChatMessage {
            role: "system",
            content: &request.instruction,
        });
        messages.extend(request.history.iter().map(|turn| ChatMessage {
            role: turn.role.as_str(),
            content: &turn.content,
        }));
        messages.push(ChatMessage {
            role: "user",
            content: &request.prompt,
        });
        messages
    }
}

#[async_trait]
impl TextGenerator for OllamaGenerator {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: self.messages(request),
            format: &request.schema,
            stream: false,
            options: ChatOptions {
                temperature: self.temperature,
            },
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&body)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| Error::call(Service::Generation, e))?;
        let reply: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::malformed(Service::Generation, e))?;
        debug!(model = %self.model, schema = %request.schema_name, "Chat completed");

        Ok(reply.message.content)
    }
}

/// Describes images with an Ollama vision model.
pub struct OllamaCaptioner {
    client: Ollama,
    model: String,
}

impl OllamaCaptioner {
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the Ollama URL is invalid.
    pub fn new(settings: &OllamaSettings) -> Result<Self> {
        Ok(Self {
            client: ollama_client(&settings.url)?,
            model: settings.caption_model.clone(),
        })
    }
}

#[async_trait]
impl ImageCaptioner for OllamaCaptioner {
    async fn describe(&self, query: &str, image: &[u8]) -> Result<String> {
        let prompt = if query.trim().is_empty() {
            CAPTION_PROMPT.to_string()
        } else {
            format!("{CAPTION_PROMPT}\n\nUser's words: {query}")
        };
        let request = GenerationRequest::new(self.model.clone(), prompt)
            .add_image(Image::from_base64(general_purpose::STANDARD.encode(image)));

        let response = self
            .client
            .generate(request)
            .await
            .map_err(|e| Error::call(Service::Captioning, e))?;
        debug!(model = %self.model, "Image described");
        Ok(response.response)
    }
}

pub(crate) fn parse_url(url: &str) -> Result<Url> {
    Url::parse(url).map_err(|e| Error::Config(format!("invalid Ollama URL '{url}': {e}")))
}

/// An `ollama-rs` client for the server at `url`.
pub(crate) fn ollama_client(url: &str) -> Result<Ollama> {
    let parsed = parse_url(url)?;
    let host = parsed
        .host_str()
        .ok_or_else(|| Error::Config(format!("Ollama URL '{url}' has no host")))?;
    let port = parsed.port_or_known_default().unwrap_or(11434);
    let base = parse_url(&format!("{}://{host}", parsed.scheme()))?;
    Ok(Ollama::builder().host(base).port(port).build())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::pipeline::types::Turn;

    fn settings(url: &str) -> OllamaSettings {
        OllamaSettings {
            url: url.to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            caption_model: "llava:7b".to_string(),
            temperature: 0.0,
        }
    }

    #[test]
    fn chat_body_orders_instruction_history_and_prompt() {
        let generator = OllamaGenerator::new(&settings("http://127.0.0.1:11434"), "llama3.1:8b")
            .unwrap();
        let request = CompletionRequest {
            schema_name: "TextVerdict".to_string(),
            schema: json!({"type": "object"}),
            instruction: "be brief".to_string(),
            history: vec![Turn::user("hi"), Turn::assistant("hello")],
            prompt: "Question: why?".to_string(),
        };
        let body = ChatRequest {
            model: &generator.model,
            messages: generator.messages(&request),
            format: &request.schema,
            stream: false,
            options: ChatOptions { temperature: 0.0 },
        };

        let body = serde_json::to_value(&body).unwrap();

        assert_eq!(
            generator.endpoint.as_str(),
            "http://127.0.0.1:11434/api/chat"
        );
        assert_eq!(body["model"], "llama3.1:8b");
        assert_eq!(body["format"], json!({"type": "object"}));
        assert_eq!(body["stream"], false);
        let roles: Vec<_> = body["messages"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["role"].as_str().unwrap())
            .collect();
        assert_eq!(roles, ["system", "user", "assistant", "user"]);
        assert_eq!(body["messages"][3]["content"], "Question: why?");
    }

    #[test]
    fn client_keeps_scheme_host_and_port() {
        let client = ollama_client("https://models.internal:8443/ignored/path").unwrap();
        assert_eq!(client.url_str(), "https://models.internal:8443/");

        let default_port = ollama_client("http://localhost").unwrap();
        assert_eq!(default_port.url_str(), "http://localhost/");
    }

    #[test]
    fn invalid_urls_are_config_errors() {
        assert!(matches!(
            OllamaGenerator::new(&settings("not a url"), "m"),
            Err(Error::Config(_))
        ));
        assert!(ollama_client("localhost").is_err());
    }
}
