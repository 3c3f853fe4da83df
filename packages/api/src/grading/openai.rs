use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{
    EssayGrader, GradingError, GradingResult, Rubric, SYSTEM_PROMPT, build_prompt,
    parse_grading_reply,
};

const TEMPERATURE: f32 = 0.3;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Grades essays through an OpenAI compatible `/v1/chat/completions`
/// endpoint in JSON mode.
pub struct OpenAiGrader {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    response_format: ResponseFormat,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct ReplyMessage {
    content: Option<String>,
}

impl OpenAiGrader {
    pub fn new(endpoint: &str, api_key: &str, model: &str) -> Result<Self, GradingError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }
}

#[async_trait::async_trait]
impl EssayGrader for OpenAiGrader {
    #[tracing::instrument(name = "OpenAiGrader::grade", skip(self, essay), fields(rubric = rubric.slug, model = %self.model))]
    async fn grade(&self, rubric: &Rubric, essay: &str) -> Result<GradingResult, GradingError> {
        let prompt = build_prompt(rubric, essay);
        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
            response_format: ResponseFormat {
                kind: "json_object",
            },
            temperature: TEMPERATURE,
        };

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.endpoint))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GradingError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let reply: ChatResponse = response.json().await?;
        let content = reply
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(GradingError::EmptyReply)?;

        let result = parse_grading_reply(&content)?;
        tracing::debug!(overall = result.overall_score, "Grading reply validated");
        Ok(result)
    }
}
