//! Retrieval-augmented chat against an OpenAI-compatible backend.
//!
//! A [`ChatSession`] holds the running conversation. Each question is
//! answered by retrieving passages, folding them into a system prompt
//! as numbered `[source N]` excerpts, and sending the prompt plus the
//! full history to `/chat/completions`. An empty index degrades to
//! plain chat instead of failing. A failed backend call leaves the
//! history exactly as it was, so the question can be retried.

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::{ConversationTurn, Role, ScoredPassage};
use crate::retrieve::Retriever;
use crate::retry::{retryable_status, CancelToken, RetryError, RetryPolicy};

const BASE_SYSTEM_PROMPT: &str = "You are a helpful assistant. Answer using the provided context \
     excerpts when they are relevant, and cite them as [source N]. If the context does not \
     contain the answer, say so.";

const PLAIN_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: Role,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

/// Thin client for the chat-completions endpoint.
pub struct ChatClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    retry: RetryPolicy,
}

impl ChatClient {
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            model: config.chat_model.clone(),
            retry: RetryPolicy::new(config.max_retries),
        })
    }

    async fn complete(&self, messages: Vec<ChatMessage>, cancel: &CancelToken) -> Result<String> {
        let url = format!("{}/chat/completions", self.endpoint);
        let payload = ChatRequest {
            model: &self.model,
            messages,
        };

        let response: ChatResponse = self
            .retry
            .run(cancel, || {
                let request = self
                    .http
                    .post(&url)
                    .bearer_auth(&self.api_key)
                    .json(&payload);
                let endpoint = url.clone();
                async move {
                    let response = request.send().await.map_err(|e| {
                        RetryError::Transient(Error::BackendUnavailable {
                            endpoint: endpoint.clone(),
                            reason: e.to_string(),
                        })
                    })?;

                    let status = response.status();
                    if retryable_status(status) {
                        return Err(RetryError::Transient(Error::BackendUnavailable {
                            endpoint: endpoint.clone(),
                            reason: format!("status {}", status),
                        }));
                    }
                    if !status.is_success() {
                        return Err(RetryError::Fatal(Error::BackendUnavailable {
                            endpoint: endpoint.clone(),
                            reason: format!("status {}", status),
                        }));
                    }

                    response.json::<ChatResponse>().await.map_err(|e| {
                        RetryError::Fatal(Error::BackendUnavailable {
                            endpoint,
                            reason: format!("malformed chat response: {}", e),
                        })
                    })
                }
            })
            .await?;

        response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| Error::BackendUnavailable {
                endpoint: url,
                reason: "chat response contained no choices".to_string(),
            })
    }
}

/// One answered question.
#[derive(Debug)]
pub struct ChatAnswer {
    pub answer: String,
    /// Passages that were folded into the prompt, best first; empty
    /// when the session degraded to plain chat.
    pub context: Vec<ScoredPassage>,
    /// Distinct source identifiers of the context, in rank order.
    pub citations: Vec<String>,
}

pub struct ChatSession {
    client: ChatClient,
    retriever: Retriever,
    history: Vec<ConversationTurn>,
}

impl ChatSession {
    pub fn new(client: ChatClient, retriever: Retriever) -> Self {
        Self {
            client,
            retriever,
            history: Vec::new(),
        }
    }

    pub fn history(&self) -> &[ConversationTurn] {
        &self.history
    }

    /// Answer `question` with retrieval-augmented context, recording
    /// both turns in the history on success only.
    pub async fn ask(&mut self, question: &str, cancel: &CancelToken) -> Result<ChatAnswer> {
        let context = match self.retriever.retrieve(question, cancel).await {
            Ok(passages) => passages,
            Err(Error::IndexEmpty(path)) => {
                tracing::warn!(index = %path.display(), "index is empty, answering without context");
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        let mut messages = vec![ChatMessage {
            role: Role::System,
            content: build_system_prompt(&context),
        }];
        for turn in &self.history {
            messages.push(ChatMessage {
                role: turn.role,
                content: turn.content.clone(),
            });
        }
        messages.push(ChatMessage {
            role: Role::User,
            content: question.to_string(),
        });

        let answer = self.client.complete(messages, cancel).await?;

        self.history.push(ConversationTurn::user(question));
        self.history.push(ConversationTurn::assistant(&answer));

        let citations = dedup_citations(&context);
        Ok(ChatAnswer {
            answer,
            context,
            citations,
        })
    }
}

fn build_system_prompt(context: &[ScoredPassage]) -> String {
    if context.is_empty() {
        return PLAIN_SYSTEM_PROMPT.to_string();
    }

    let mut prompt = String::from(BASE_SYSTEM_PROMPT);
    prompt.push_str("\n\nContext:\n");
    for (i, scored) in context.iter().enumerate() {
        prompt.push_str(&format!(
            "\n[source {}] ({})\n{}\n",
            i + 1,
            scored.passage.source,
            scored.passage.text
        ));
    }
    prompt
}

/// Distinct sources in rank order, for display alongside the answer.
fn dedup_citations(context: &[ScoredPassage]) -> Vec<String> {
    let mut seen = Vec::new();
    for scored in context {
        if !seen.contains(&scored.passage.source) {
            seen.push(scored.passage.source.clone());
        }
    }
    seen
}
