//! OpenRouter chat-completions client implementing [`TemplatingOracle`].

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};
use url::Url;

use bmecat_shared::{BmecatError, OpenRouterConfig, Result};

use crate::oracle::{ContentPart, OracleRequest, TemplatingOracle};

/// User-Agent string for API requests.
const USER_AGENT: &str = concat!("bmecat/", env!("CARGO_PKG_VERSION"));

/// File name attached to inline PDF parts.
const DOCUMENT_FILE_NAME: &str = "specification.pdf";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f32,
    response_format: ResponseFormat<'a>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: MessageContent<'a>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent<'a> {
    Text(&'a str),
    Parts(Vec<WirePart<'a>>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WirePart<'a> {
    Text { text: &'a str },
    File { file: WireFile },
}

#[derive(Debug, Serialize)]
struct WireFile {
    filename: &'static str,
    file_data: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    json_schema: JsonSchemaFormat<'a>,
}

#[derive(Debug, Serialize)]
struct JsonSchemaFormat<'a> {
    name: &'static str,
    strict: bool,
    schema: &'a serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Templating oracle backed by the OpenRouter API.
#[derive(Debug, Clone)]
pub struct OpenRouterOracle {
    client: Client,
    endpoint: Url,
    api_key: String,
    model: String,
}

impl OpenRouterOracle {
    /// Build a client from config. The key is passed in, never read from config.
    pub fn new(config: &OpenRouterConfig, api_key: impl Into<String>) -> Result<Self> {
        let endpoint = chat_endpoint(&config.base_url)?;
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| BmecatError::Oracle(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            api_key: api_key.into(),
            model: config.default_model.clone(),
        })
    }

    /// Override the configured model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_body<'a>(&'a self, request: &'a OracleRequest) -> ChatRequest<'a> {
        let parts = request
            .parts
            .iter()
            .map(|part| match part {
                ContentPart::Text(text) => WirePart::Text { text },
                ContentPart::Document {
                    mime_type,
                    data_base64,
                } => WirePart::File {
                    file: WireFile {
                        filename: DOCUMENT_FILE_NAME,
                        file_data: format!("data:{mime_type};base64,{data_base64}"),
                    },
                },
            })
            .collect();

        ChatRequest {
            model: &self.model,
            messages: vec![
                Message {
                    role: "system",
                    content: MessageContent::Text(&request.system),
                },
                Message {
                    role: "user",
                    content: MessageContent::Parts(parts),
                },
            ],
            temperature: request.temperature,
            response_format: ResponseFormat {
                kind: "json_schema",
                json_schema: JsonSchemaFormat {
                    name: request.task.as_str(),
                    strict: true,
                    schema: &request.schema,
                },
            },
        }
    }
}

/// Resolve `<base>/chat/completions`, rejecting non-HTTP bases.
fn chat_endpoint(base_url: &str) -> Result<Url> {
    let base = Url::parse(base_url)
        .map_err(|e| BmecatError::config(format!("invalid OpenRouter base URL {base_url}: {e}")))?;
    if !matches!(base.scheme(), "http" | "https") {
        return Err(BmecatError::config(format!(
            "OpenRouter base URL must be http(s): {base_url}"
        )));
    }
    let joined = format!("{}/chat/completions", base.as_str().trim_end_matches('/'));
    Url::parse(&joined).map_err(|e| BmecatError::config(format!("invalid endpoint {joined}: {e}")))
}

impl TemplatingOracle for OpenRouterOracle {
    #[instrument(skip_all, fields(task = request.task.as_str(), model = %self.model))]
    async fn complete(&self, request: &OracleRequest) -> Result<String> {
        let body = self.build_body(request);
        debug!(parts = request.parts.len(), "sending oracle request");

        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| BmecatError::Oracle(format!("request failed: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| BmecatError::Oracle(format!("failed to read response body: {e}")))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorEnvelope>(&text)
                .map(|env| env.error.message)
                .unwrap_or(text);
            return Err(BmecatError::Oracle(format!("HTTP {status}: {message}")));
        }

        let parsed: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| BmecatError::Oracle(format!("unexpected response shape: {e}")))?;
        if let Some(error) = parsed.error {
            return Err(BmecatError::Oracle(error.message));
        }

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();

        info!(bytes = content.len(), "oracle reply received");
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::OracleTask;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> OpenRouterConfig {
        OpenRouterConfig {
            base_url: format!("{}/api/v1", server.uri()),
            timeout_secs: 5,
            ..Default::default()
        }
    }

    fn request() -> OracleRequest {
        OracleRequest {
            task: OracleTask::ArticleTemplate,
            system: "system text".into(),
            parts: vec![
                ContentPart::Text("main prompt".into()),
                ContentPart::Document {
                    mime_type: "application/pdf".into(),
                    data_base64: "JVBERi0=".into(),
                },
            ],
            schema: json!({ "type": "object" }),
            temperature: 0.1,
        }
    }

    #[test]
    fn endpoint_joins_path() {
        assert_eq!(
            chat_endpoint("https://openrouter.ai/api/v1/").unwrap().as_str(),
            "https://openrouter.ai/api/v1/chat/completions"
        );
        assert!(chat_endpoint("ftp://example.com").is_err());
        assert!(chat_endpoint("not a url").is_err());
    }

    #[tokio::test]
    async fn sends_schema_and_pdf_part() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v1/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(json!({
                "model": "google/gemini-2.5-flash",
                "response_format": {
                    "type": "json_schema",
                    "json_schema": { "name": "article_template", "strict": true }
                },
                "messages": [
                    { "role": "system", "content": "system text" },
                    { "role": "user", "content": [
                        { "type": "text", "text": "main prompt" },
                        { "type": "file", "file": {
                            "filename": "specification.pdf",
                            "file_data": "data:application/pdf;base64,JVBERi0="
                        } }
                    ] }
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "role": "assistant", "content": "{\"articleTemplate\":\"<ARTICLE/>\"}" } }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let oracle = OpenRouterOracle::new(&config_for(&server), "test-key").expect("client");
        let reply = oracle.complete(&request()).await.expect("reply");
        assert_eq!(reply, "{\"articleTemplate\":\"<ARTICLE/>\"}");
    }

    #[tokio::test]
    async fn api_error_message_is_surfaced() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": { "code": 400, "message": "The document has no pages." }
            })))
            .mount(&server)
            .await;

        let oracle = OpenRouterOracle::new(&config_for(&server), "k").expect("client");
        let err = oracle.complete(&request()).await.unwrap_err();
        match err {
            BmecatError::Oracle(message) => {
                assert!(message.contains("400"));
                assert!(message.contains("no pages"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn empty_choices_yield_empty_reply() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
            .mount(&server)
            .await;

        let oracle = OpenRouterOracle::new(&config_for(&server), "k")
            .expect("client")
            .with_model("other/model");
        assert_eq!(oracle.model(), "other/model");
        assert_eq!(oracle.complete(&request()).await.expect("reply"), "");
    }

    #[tokio::test]
    async fn field_mapping_schema_goes_out_strict() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v1/chat/completions"))
            .and(body_partial_json(json!({
                "response_format": {
                    "type": "json_schema",
                    "json_schema": {
                        "name": "field_mapping",
                        "strict": true,
                        "schema": {
                            "additionalProperties": false,
                            "properties": {
                                "identifiedFields": { "items": {
                                    "additionalProperties": false,
                                    "required": ["key", "label", "description", "required", "mappedCsvHeader"]
                                } },
                                "featureMappings": { "items": {
                                    "additionalProperties": false,
                                    "required": ["fname", "fvalue", "funit"]
                                } }
                            }
                        }
                    }
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "role": "assistant", "content": "{\"identifiedFields\":[],\"featureMappings\":[]}" } }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let request = crate::prompts::field_mapping_request(
            &["Artikelnummer".into()],
            &crate::prompts::PromptSources::default(),
        );
        let oracle = OpenRouterOracle::new(&config_for(&server), "k").expect("client");
        oracle.complete(&request).await.expect("strict schema accepted");
    }
}
