use crate::config::JudgeConfig;
use crate::error::JudgeError;
use crate::models::{Prediction, Record, Verdict};
use anyhow::Context;
use async_openai::types::{
    ChatCompletionNamedToolChoice, ChatCompletionRequestMessage,
    ChatCompletionRequestUserMessageArgs, ChatCompletionTool,
    ChatCompletionToolArgs, ChatCompletionToolChoiceOption, ChatCompletionToolType,
    CreateChatCompletionRequest, CreateChatCompletionRequestArgs, CreateChatCompletionResponse,
    FunctionName, FunctionObjectArgs,
};
use async_openai::{Client, config::OpenAIConfig};
use serde::Deserialize;
use serde_json::{Value, json};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Name of the only tool the judge may call
pub const VERDICT_TOOL: &str = "submit_evaluation";

/// Produces one verdict per record
pub trait Judge: Send + Sync + 'static {
    /// Identifier of the model behind this judge, recorded in the ledger
    fn model(&self) -> &str;

    fn invoke(&self, record: &Record) -> impl Future<Output = Result<Prediction, JudgeError>> + Send;
}

/// Judge backed by an OpenAI-compatible chat completions endpoint
pub struct OpenAiJudge {
    client: Client<OpenAIConfig>,
    config: JudgeConfig,
    /// Last request time, shared by every concurrent call
    last_request: Mutex<Option<Instant>>,
}

impl OpenAiJudge {
    /// Create a judge, reading the API key from the configured environment variable
    pub fn from_config(config: JudgeConfig) -> anyhow::Result<Self> {
        let api_key = std::env::var(&config.env_var_api_key)
            .with_context(|| format!("Environment variable {} not found", config.env_var_api_key))?;

        Ok(Self::with_api_key(config, api_key))
    }

    pub fn with_api_key(config: JudgeConfig, api_key: impl Into<String>) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(&config.api_endpoint);

        Self {
            client: Client::with_config(openai_config),
            config,
            last_request: Mutex::new(None),
        }
    }

    /// Enforce rate limiting for judge requests
    async fn enforce_rate_limit(last_request: &mut Option<Instant>, rate_limit_rps: f64) {
        if rate_limit_rps.is_nan() || rate_limit_rps <= 0.0 {
            return;
        }

        let Ok(min_interval) = Duration::try_from_secs_f64(1.0 / rate_limit_rps) else {
            warn!(rate_limit_rps, "Rate limit interval out of range, not spacing requests");
            return;
        };

        if let Some(last_time) = *last_request {
            let elapsed = last_time.elapsed();
            if elapsed < min_interval {
                sleep(min_interval - elapsed).await;
            }
        }

        *last_request = Some(Instant::now());
    }

    /// Render the prompt template for one record
    fn build_prompt(&self, record: &Record) -> String {
        render_template(&self.config.prompt_template, &record.question, &record.response)
    }

    /// Build the strict function tool that carries the verdict
    fn verdict_tool() -> Result<ChatCompletionTool, JudgeError> {
        let function = FunctionObjectArgs::default()
            .name(VERDICT_TOOL)
            .description("Submit your evaluation verdict")
            .parameters(json!({
                "type": "object",
                "properties": {
                    "verdict": {
                        "type": "string",
                        "enum": ["pass", "fail"],
                        "description": "pass if the response is correct, fail otherwise"
                    }
                },
                "required": ["verdict"],
                "additionalProperties": false
            }))
            .strict(true)
            .build()
            .map_err(|e| JudgeError::Request(e.to_string()))?;

        ChatCompletionToolArgs::default()
            .r#type(ChatCompletionToolType::Function)
            .function(function)
            .build()
            .map_err(|e| JudgeError::Request(e.to_string()))
    }

    /// Build the chat completion request, forcing a call to the verdict tool
    fn build_request(&self, prompt: &str) -> Result<CreateChatCompletionRequest, JudgeError> {
        let user_message: ChatCompletionRequestMessage = ChatCompletionRequestUserMessageArgs::default()
            .content(prompt.to_string())
            .build()
            .map_err(|e| JudgeError::Request(e.to_string()))?
            .into();

        let tool_choice = ChatCompletionToolChoiceOption::Named(ChatCompletionNamedToolChoice {
            r#type: ChatCompletionToolType::Function,
            function: FunctionName {
                name: VERDICT_TOOL.to_string(),
            },
        });

        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(&self.config.model)
            .messages([user_message])
            .tools(vec![Self::verdict_tool()?])
            .tool_choice(tool_choice);
        if let Some(temperature) = self.config.temperature {
            args.temperature(temperature);
        }
        if let Some(max_tokens) = self.config.max_tokens {
            args.max_tokens(max_tokens);
        }

        args.build().map_err(|e| JudgeError::Request(e.to_string()))
    }

    async fn evaluate(&self, record: &Record) -> Result<Prediction, JudgeError> {
        {
            let mut last_request = self.last_request.lock().await;
            Self::enforce_rate_limit(&mut last_request, self.config.rate_limit_rps).await;
        }

        let request = self.build_request(&self.build_prompt(record))?;
        let timeout = Duration::from_secs(self.config.timeout_secs);
        let start = Instant::now();

        let response = tokio::time::timeout(timeout, self.client.chat().create(request))
            .await
            .map_err(|_| JudgeError::Timeout(timeout))?
            .map_err(|e| JudgeError::Api(e.to_string()))?;

        let prediction = extract_prediction(&record.id, &response)?;

        debug!(
            record_id = %record.id,
            verdict = %prediction.verdict,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Judge verdict received"
        );

        Ok(prediction)
    }
}

impl Judge for OpenAiJudge {
    fn model(&self) -> &str {
        &self.config.model
    }

    fn invoke(&self, record: &Record) -> impl Future<Output = Result<Prediction, JudgeError>> + Send {
        self.evaluate(record)
    }
}

/// Substitute `{question}` and `{response}` in a single pass
fn render_template(template: &str, question: &str, response: &str) -> String {
    let mut rendered = String::with_capacity(template.len() + question.len() + response.len());
    let mut rest = template;

    loop {
        let next = [("{question}", question), ("{response}", response)]
            .into_iter()
            .filter_map(|(placeholder, value)| rest.find(placeholder).map(|at| (at, placeholder, value)))
            .min_by_key(|(at, _, _)| *at);

        match next {
            Some((at, placeholder, value)) => {
                rendered.push_str(&rest[..at]);
                rendered.push_str(value);
                rest = &rest[at + placeholder.len()..];
            }
            None => {
                rendered.push_str(rest);
                return rendered;
            }
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct VerdictArguments {
    verdict: Verdict,
}

/// Pull the single structured verdict out of a chat completion
pub fn extract_prediction(
    record_id: &str,
    response: &CreateChatCompletionResponse,
) -> Result<Prediction, JudgeError> {
    let choice = match response.choices.as_slice() {
        [choice] => choice,
        choices => {
            return Err(JudgeError::SchemaViolation(format!(
                "expected exactly one choice, got {}",
                choices.len()
            )));
        }
    };

    let calls = choice.message.tool_calls.as_deref().unwrap_or_default();
    let call = match calls {
        [call] => call,
        [] => {
            return Err(JudgeError::SchemaViolation(
                "response contains no tool call".to_string(),
            ));
        }
        _ => {
            return Err(JudgeError::SchemaViolation(format!(
                "expected exactly one tool call, got {}",
                calls.len()
            )));
        }
    };

    if call.function.name != VERDICT_TOOL {
        return Err(JudgeError::SchemaViolation(format!(
            "unexpected tool '{}'",
            call.function.name
        )));
    }

    let raw: Value = serde_json::from_str(&call.function.arguments)
        .map_err(|e| JudgeError::SchemaViolation(format!("tool arguments are not JSON: {}", e)))?;
    let arguments: VerdictArguments = serde_json::from_value(raw.clone())
        .map_err(|e| JudgeError::SchemaViolation(format!("invalid verdict arguments: {}", e)))?;

    Ok(Prediction {
        record_id: record_id.to_string(),
        verdict: arguments.verdict,
        raw_judge_output: Some(raw),
    })
}
