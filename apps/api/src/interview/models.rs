use serde::{Deserialize, Serialize};

/// Who produced a turn. Anything other than `"bot"` / `"user"` is `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    Bot,
    User,
    #[serde(other)]
    Other,
}

/// Optional explicit tag for a turn's place in the interview.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnKind {
    Intro,
    Answer,
    Question,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Speaker,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<TurnKind>,
}

/// Shorthand constructors for building histories in tests.
#[cfg(test)]
impl ConversationTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Speaker::User,
            text: text.into(),
            kind: None,
        }
    }

    pub fn bot(text: impl Into<String>) -> Self {
        Self {
            role: Speaker::Bot,
            text: text.into(),
            kind: None,
        }
    }

    pub fn with_kind(mut self, kind: TurnKind) -> Self {
        self.kind = Some(kind);
        self
    }
}

/// Request body for one interview turn. The caller owns the session.
#[derive(Debug, Clone, Deserialize)]
pub struct TurnRequest {
    pub role: String,
    #[serde(default)]
    pub history: Vec<ConversationTurn>,
}

/// How the reply was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplySource {
    Greeting,
    Generated,
    Fallback,
    Finished,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TurnReply {
    pub reply: String,
    pub source: ReplySource,
}
