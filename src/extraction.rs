//! Post-exchange extraction of learning memory and goals.
//!
//! After a response is delivered, the completed exchange is scanned twice by
//! the completion capability: once for durable learning memory (preferences,
//! struggles, progress) and once for explicit goals. The model is asked for
//! a tagged JSON verdict; anything that fails to decode falls back to
//! `NoSave` — a save result is never synthesized from unparseable text.

use chrono::NaiveDate;
use serde::Deserialize;

use crate::message::Message;
use crate::providers::{collect_stream, CompletionProvider};
use crate::stores::GoalDraft;
use crate::types::EngineError;

const MEMORY_TEMPERATURE: f32 = 0.1;
const MEMORY_MAX_TOKENS: u32 = 200;
const GOAL_TEMPERATURE: f32 = 0.1;
const GOAL_MAX_TOKENS: u32 = 400;

/// Verdict of a memory-extraction pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MemoryVerdict {
    /// A learning-relevant insight worth persisting.
    Save {
        /// Concise third-person summary to append to the memory blob.
        memory: String,
    },
    /// Nothing learning-relevant found (or the verdict was undecodable).
    NoSave,
}

/// Verdict of a goal-extraction pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GoalVerdict {
    /// Explicit goals detected in the exchange.
    Save(Vec<GoalDraft>),
    /// No clear goals (or the verdict was undecodable).
    NoSave,
}

/// Builds the memory-scanner prompt over a completed exchange.
#[must_use]
pub fn build_memory_prompt(user_input: &str, assistant_response: &str) -> String {
    format!(
        r#"### Role
You're a Learning Memory Scanner analyzing conversations to capture CRITICAL information for personalizing future learning experiences.

### Key Focus Areas
Capture ONLY these learning-specific elements:
1. Learning Goals - explicit learning objectives or targets
2. Difficulties/Struggles - concepts or problems causing confusion
3. Knowledge Gaps - missing prerequisites or misunderstandings
4. Learning Preferences - format, style, or pace preferences
5. Progress Updates - milestones or completed topics

### Output Rules
- Return {{"save": false}} if NO learning-relevant details are found.
- For valuable insights, return:
{{"save": true, "memory": "Concise 3rd-person summary (max 15 words) using learning terminology"}}
- Return only one JSON object and nothing else.

### Current Conversation
User: {user_input}
Assistant: {assistant_response}

### Analysis
Scan for LEARNING-SPECIFIC signals. Ignore casual or social content.
Only capture explicit statements about the focus areas."#
    )
}

/// Builds the goal-detection prompt over a completed exchange. `today` lets
/// the model resolve relative deadlines like "next week" to concrete dates.
#[must_use]
pub fn build_goal_prompt(user_input: &str, assistant_response: &str, today: NaiveDate) -> String {
    format!(
        r#"### Role
You're a Goal Detection Assistant analyzing conversations to identify EXPLICIT goals, tasks, or objectives mentioned by the user. Today's date is {today}.

### Detection Rules
Look for direct goal statements ("I want to...", "My goal is..."), task planning ("I plan to...", "By next week I'll..."), learning objectives, project goals, and achievement targets.

### Output Rules
- Return {{"save": false}} if NO clear goals are mentioned.
- For identified goals, return:
{{"save": true, "goals": [{{"title": "Clear, concise goal title (max 50 chars)", "description": "Detailed description of what the user wants to achieve", "deadline": "YYYY-MM-DD or null if not mentioned", "status": "pending"}}]}}
- Convert relative dates to actual dates. Return only one JSON object and nothing else.

### Current Conversation
User: {user_input}
Assistant: {assistant_response}

### Analysis
Scan for EXPLICIT goal statements. Ignore casual questions or general discussions.
Only capture clear, actionable goals."#
    )
}

#[derive(Deserialize)]
struct RawMemoryVerdict {
    save: bool,
    #[serde(default)]
    memory: Option<String>,
}

#[derive(Deserialize)]
struct RawGoalDraft {
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    deadline: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Deserialize)]
struct RawGoalVerdict {
    save: bool,
    #[serde(default)]
    goals: Vec<RawGoalDraft>,
}

/// Decodes a raw model reply into a [`MemoryVerdict`].
///
/// A missing or empty memory text, or any decode failure, yields `NoSave`.
#[must_use]
pub fn parse_memory_verdict(raw: &str) -> MemoryVerdict {
    let Ok(verdict) = serde_json::from_str::<RawMemoryVerdict>(strip_fences(raw)) else {
        return MemoryVerdict::NoSave;
    };
    match (verdict.save, verdict.memory) {
        (true, Some(memory)) if !memory.trim().is_empty() => MemoryVerdict::Save {
            memory: memory.trim().to_string(),
        },
        _ => MemoryVerdict::NoSave,
    }
}

/// Decodes a raw model reply into a [`GoalVerdict`].
///
/// Decode failures and empty goal lists yield `NoSave`. An individual goal's
/// unparseable deadline degrades to no deadline rather than dropping the
/// goal.
#[must_use]
pub fn parse_goal_verdict(raw: &str) -> GoalVerdict {
    let Ok(verdict) = serde_json::from_str::<RawGoalVerdict>(strip_fences(raw)) else {
        return GoalVerdict::NoSave;
    };
    if !verdict.save {
        return GoalVerdict::NoSave;
    }

    let drafts: Vec<GoalDraft> = verdict
        .goals
        .into_iter()
        .filter(|goal| !goal.title.trim().is_empty())
        .map(|goal| GoalDraft {
            title: goal.title.trim().to_string(),
            description: goal.description,
            deadline: goal
                .deadline
                .as_deref()
                .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()),
            status: goal.status,
        })
        .collect();

    if drafts.is_empty() {
        GoalVerdict::NoSave
    } else {
        GoalVerdict::Save(drafts)
    }
}

/// Runs the memory-extraction pass over a completed exchange.
pub async fn extract_memory(
    provider: &dyn CompletionProvider,
    user_input: &str,
    assistant_response: &str,
) -> Result<MemoryVerdict, EngineError> {
    let messages = vec![
        Message::system("You are a memory extraction assistant. Always return valid JSON."),
        Message::user(&build_memory_prompt(user_input, assistant_response)),
    ];
    let stream = provider
        .stream_chat(&messages, MEMORY_TEMPERATURE, MEMORY_MAX_TOKENS)
        .await?;
    let reply = collect_stream(stream).await?;
    Ok(parse_memory_verdict(&reply))
}

/// Runs the goal-extraction pass over a completed exchange.
pub async fn extract_goals(
    provider: &dyn CompletionProvider,
    user_input: &str,
    assistant_response: &str,
    today: NaiveDate,
) -> Result<GoalVerdict, EngineError> {
    let messages = vec![
        Message::system("You are a goal extraction assistant. Always return valid JSON."),
        Message::user(&build_goal_prompt(user_input, assistant_response, today)),
    ];
    let stream = provider
        .stream_chat(&messages, GOAL_TEMPERATURE, GOAL_MAX_TOKENS)
        .await?;
    let reply = collect_stream(stream).await?;
    Ok(parse_goal_verdict(&reply))
}

/// Strips a surrounding markdown code fence, which models often add despite
/// instructions.
fn strip_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}
