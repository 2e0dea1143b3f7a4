//! Outbound AI calls: interview questions, context profiles, delegate
//! replies. Each is one HTTP attempt with a 30s bound; a missing key or
//! any failure degrades to static fallback content instead of an error.

use axum::{debug_handler, extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tower_sessions::Session;

use crate::{auth, config::{Config, AI_TIMEOUT}, posts, AppResult, AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/interview", post(interview))
        .route("/context-profile", post(build_context_profile))
        .route("/delegate", post(delegate))
}

/// Structured AI-derived metadata attached to a post. Fixed record with
/// defaults for missing keys; the canonical wire and on-disk key for the
/// thesis field is `core_argument`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextProfile {
    pub intent: String,
    pub tone: String,
    pub assumptions: String,
    pub audience: String,
    pub core_argument: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterviewMessage {
    pub role: String,
    pub content: String,
}

const FALLBACK_QUESTIONS: [&str; 3] = [
    "What is your main goal with this post?",
    "Who exactly are you speaking to?",
    "What assumptions are you making that you haven't said out loud?",
];

const FALLBACK_DELEGATE_REPLY: &str = "I am unable to respond at this moment.";

#[derive(Clone)]
pub struct AiClient {
    http: reqwest::Client,
    openai_api_key: Option<String>,
    gemini_api_key: Option<String>,
}

impl AiClient {
    pub fn new(config: &Config) -> AiClient {
        AiClient {
            http: reqwest::Client::builder()
                .timeout(AI_TIMEOUT)
                .build()
                .unwrap_or_default(),
            openai_api_key: config.openai_api_key.clone(),
            gemini_api_key: config.gemini_api_key.clone(),
        }
    }

    /// Three leading questions that pull the author's hidden context out
    /// of a draft.
    pub async fn interview_questions(&self, draft: &str) -> Vec<String> {
        let Some(key) = &self.openai_api_key else {
            return fallback_questions();
        };

        match self.request_interview_questions(key, draft).await {
            Ok(questions) => questions,
            Err(err) => {
                tracing::warn!("interview question generation failed, using fallback: {err}");
                fallback_questions()
            }
        }
    }

    async fn request_interview_questions(&self, key: &str, draft: &str) -> anyhow::Result<Vec<String>> {
        let prompt = format!(
            "You are an insightful editor. The user wants to post the following draft:\n\n\
             \"{draft}\"\n\n\
             Generate 3 short, sharp, leading questions that uncover:\n\
             1. Their underlying intent or goal.\n\
             2. The unspoken assumptions they are making.\n\
             3. The emotional tone or nuance they want to convey.\n\n\
             Return ONLY a JSON object with a \"questions\" array of 3 strings."
        );

        let body: Value = self
            .http
            .post("https://api.openai.com/v1/chat/completions")
            .bearer_auth(key)
            .json(&json!({
                "model": "gpt-4o-mini",
                "messages": [{"role": "user", "content": prompt}],
                "response_format": {"type": "json_object"},
            }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let content = body["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("missing completion content"))?;
        let parsed: Value = serde_json::from_str(content)?;

        let questions = match &parsed {
            Value::Array(items) => items,
            Value::Object(map) => map
                .get("questions")
                .and_then(Value::as_array)
                .ok_or_else(|| anyhow::anyhow!("unexpected AI response shape"))?,
            _ => anyhow::bail!("unexpected AI response shape"),
        };

        Ok(questions
            .iter()
            .filter_map(|q| q.as_str().map(str::to_owned))
            .take(3)
            .collect())
    }

    /// Distill a draft plus interview transcript into a context profile.
    pub async fn context_profile(
        &self,
        draft: &str,
        interview: &[InterviewMessage],
    ) -> ContextProfile {
        let Some(key) = &self.gemini_api_key else {
            return fallback_profile(draft);
        };

        match self.request_context_profile(key, draft, interview).await {
            Ok(profile) => profile,
            Err(err) => {
                tracing::warn!("context profile generation failed, using fallback: {err}");
                fallback_profile(draft)
            }
        }
    }

    async fn request_context_profile(
        &self,
        key: &str,
        draft: &str,
        interview: &[InterviewMessage],
    ) -> anyhow::Result<ContextProfile> {
        let transcript = interview
            .iter()
            .map(|m| format!("{}: {}", m.role.to_uppercase(), m.content))
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = format!(
            "Analyze the following draft and interview transcript to create a structured \
             Context Profile.\n\nDraft: \"{draft}\"\n\nInterview Transcript:\n{transcript}\n\n\
             Return a JSON object with exactly these fields:\n\
             - intent: The primary goal of the post\n\
             - tone: The emotional nuance\n\
             - assumptions: Underlying premises\n\
             - audience: Target demographic\n\
             - core_argument: The central thesis in one sentence"
        );

        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent?key={key}"
        );

        let body: Value = self
            .http
            .post(url)
            .json(&json!({
                "contents": [{"parts": [{"text": prompt}]}],
                "generationConfig": {"responseMimeType": "application/json"},
            }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let text = body["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("missing generation content"))?;

        Ok(serde_json::from_str(text)?)
    }

    /// Answer a reader's question in the author's stead, grounded in the
    /// post's context profile.
    pub async fn delegate_reply(
        &self,
        original_post: &str,
        profile: &ContextProfile,
        user_query: &str,
        chat_history: &[InterviewMessage],
    ) -> String {
        let Some(key) = &self.openai_api_key else {
            return FALLBACK_DELEGATE_REPLY.to_owned();
        };

        match self
            .request_delegate_reply(key, original_post, profile, user_query, chat_history)
            .await
        {
            Ok(reply) => reply,
            Err(err) => {
                tracing::warn!("delegate reply failed, using fallback: {err}");
                FALLBACK_DELEGATE_REPLY.to_owned()
            }
        }
    }

    async fn request_delegate_reply(
        &self,
        key: &str,
        original_post: &str,
        profile: &ContextProfile,
        user_query: &str,
        chat_history: &[InterviewMessage],
    ) -> anyhow::Result<String> {
        let recent = chat_history.iter().rev().take(5).rev();
        let history = recent
            .map(|m| {
                let who = if m.role == "user" { "Reader" } else { "Author Delegate" };
                format!("{who}: {}", m.content)
            })
            .collect::<Vec<_>>()
            .join("\n");

        let system = format!(
            "You are the AI Delegate for the author of this post.\n\n\
             Original Post: \"{original_post}\"\n\n\
             Author's Context Profile:\n\
             - Intent: {}\n- Tone: {}\n- Assumptions: {}\n- Core Argument: {}\n\n\
             Respond to the Reader's query. Strictly adhere to the author's tone and \
             logic, do not invent facts outside the context, and keep it concise \
             (under 280 characters if possible, max 500).",
            profile.intent, profile.tone, profile.assumptions, profile.core_argument,
        );

        let user = format!("Previous Chat:\n{history}\n\nReader: {user_query}");

        let body: Value = self
            .http
            .post("https://api.openai.com/v1/chat/completions")
            .bearer_auth(key)
            .json(&json!({
                "model": "gpt-4o-mini",
                "messages": [
                    {"role": "system", "content": system},
                    {"role": "user", "content": user},
                ],
                "max_tokens": 300,
            }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        body["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| anyhow::anyhow!("missing completion content"))
    }
}

#[derive(Debug, Deserialize)]
struct InterviewRequest {
    draft: String,
}

#[debug_handler(state = AppState)]
async fn interview(
    State(db_pool): State<SqlitePool>,
    State(ai): State<AiClient>,
    session: Session,
    Json(data): Json<InterviewRequest>,
) -> AppResult<Json<Value>> {
    auth::require_account(&db_pool, &session).await?;
    let questions = ai.interview_questions(&data.draft).await;
    Ok(Json(json!({"questions": questions})))
}

#[derive(Debug, Deserialize)]
struct ContextProfileRequest {
    draft: String,
    #[serde(default)]
    interview: Vec<InterviewMessage>,
}

#[debug_handler(state = AppState)]
async fn build_context_profile(
    State(db_pool): State<SqlitePool>,
    State(ai): State<AiClient>,
    session: Session,
    Json(data): Json<ContextProfileRequest>,
) -> AppResult<Json<ContextProfile>> {
    auth::require_account(&db_pool, &session).await?;
    Ok(Json(ai.context_profile(&data.draft, &data.interview).await))
}

#[derive(Debug, Deserialize)]
struct DelegateRequest {
    post_id: String,
    query: String,
    #[serde(default)]
    history: Vec<InterviewMessage>,
}

/// Answer a reader's question about a post on the author's behalf,
/// grounded in the post's stored context profile.
#[debug_handler(state = AppState)]
async fn delegate(
    State(db_pool): State<SqlitePool>,
    State(ai): State<AiClient>,
    session: Session,
    Json(data): Json<DelegateRequest>,
) -> AppResult<Json<Value>> {
    auth::require_account(&db_pool, &session).await?;

    let post = posts::fetch_post(&db_pool, &data.post_id).await?;
    let profile: ContextProfile = serde_json::from_str(&post.context_profile).unwrap_or_default();

    let reply = ai
        .delegate_reply(&post.content, &profile, &data.query, &data.history)
        .await;

    Ok(Json(json!({"reply": reply})))
}

fn fallback_questions() -> Vec<String> {
    FALLBACK_QUESTIONS.iter().map(|q| (*q).to_owned()).collect()
}

fn fallback_profile(draft: &str) -> ContextProfile {
    ContextProfile {
        intent: "To share an opinion.".to_owned(),
        tone: "Neutral".to_owned(),
        assumptions: "None explicitly stated.".to_owned(),
        audience: "General public".to_owned(),
        core_argument: draft.chars().take(100).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unconfigured_client() -> AiClient {
        AiClient {
            http: reqwest::Client::new(),
            openai_api_key: None,
            gemini_api_key: None,
        }
    }

    #[tokio::test]
    async fn missing_key_yields_fallback_questions() {
        let client = unconfigured_client();
        let questions = client.interview_questions("my draft").await;
        assert_eq!(questions.len(), 3);
        assert_eq!(questions[0], FALLBACK_QUESTIONS[0]);
    }

    #[tokio::test]
    async fn missing_key_yields_fallback_profile() {
        let client = unconfigured_client();
        let draft = "a".repeat(300);
        let profile = client.context_profile(&draft, &[]).await;
        assert_eq!(profile.tone, "Neutral");
        assert_eq!(profile.core_argument.len(), 100);
    }

    #[tokio::test]
    async fn missing_key_yields_fallback_delegate_reply() {
        let client = unconfigured_client();
        let reply = client
            .delegate_reply("post", &ContextProfile::default(), "why?", &[])
            .await;
        assert_eq!(reply, FALLBACK_DELEGATE_REPLY);
    }

    #[test]
    fn context_profile_defaults_missing_keys() {
        let profile: ContextProfile = serde_json::from_str(r#"{"intent": "inform"}"#).unwrap();
        assert_eq!(profile.intent, "inform");
        assert_eq!(profile.core_argument, "");
    }

    #[test]
    fn context_profile_uses_snake_case_on_the_wire() {
        let profile = ContextProfile {
            core_argument: "thesis".to_owned(),
            ..Default::default()
        };
        let value = serde_json::to_value(&profile).unwrap();
        assert_eq!(value["core_argument"], "thesis");
        assert!(value.get("coreArgument").is_none());
    }
}
