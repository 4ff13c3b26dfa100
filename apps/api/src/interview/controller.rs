//! Interview Turn Controller: decides the next interviewer utterance.
//!
//! Flow per call (stateless, the caller resends the whole history):
//!   empty history      → greeting (no retrieval, no model call)
//!   otherwise          → latest user answer → retrieve resume context →
//!                        system prompt + history → QuestionGenerator
//!   generation failure → static question for the turn position, or the
//!                        completion message once the list is exhausted
//!
//! `next_turn` never fails: generation-path errors are absorbed here.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::interview::models::{ConversationTurn, ReplySource, Speaker, TurnKind, TurnReply};
use crate::interview::prompts::{GREETING_TEMPLATE, INTERVIEWER_SYSTEM_TEMPLATE, NO_CONTEXT};
use crate::interview::questions::{static_question, COMPLETION_MESSAGE};
use crate::llm_client::prompts::PLAIN_TEXT_INSTRUCTION;
use crate::llm_client::{ChatMessage, ChatRole, GenerationError, QuestionGenerator};
use crate::rag::retrieval::Retriever;

pub struct TurnController {
    retriever: Retriever,
    generator: Arc<dyn QuestionGenerator>,
    top_k: usize,
    generation_timeout: Duration,
}

impl TurnController {
    pub fn new(
        retriever: Retriever,
        generator: Arc<dyn QuestionGenerator>,
        top_k: usize,
        generation_timeout: Duration,
    ) -> Self {
        Self {
            retriever,
            generator,
            top_k,
            generation_timeout,
        }
    }

    /// Produces the next interviewer reply for `role` given the full `history`.
    pub async fn next_turn(&self, role: &str, history: &[ConversationTurn]) -> TurnReply {
        let role = role.trim();

        if history.is_empty() {
            return TurnReply {
                reply: greeting(role),
                source: ReplySource::Greeting,
            };
        }

        let query = latest_user_text(history);
        let context = match self.retriever.retrieve(query, self.top_k).await {
            Ok(chunks) => chunks,
            Err(e) => {
                warn!("Resume retrieval failed, continuing without context: {e}");
                Vec::new()
            }
        };

        let messages = build_messages(role, &context, history);

        match self.generate(&messages).await {
            Ok(question) => TurnReply {
                reply: question,
                source: ReplySource::Generated,
            },
            Err(e) => {
                warn!(
                    "Question generation failed ({}), using static fallback: {e}",
                    self.generator.model_name()
                );
                fallback(role, history)
            }
        }
    }

    async fn generate(&self, messages: &[ChatMessage]) -> Result<String, GenerationError> {
        let text = tokio::time::timeout(self.generation_timeout, self.generator.generate(messages))
            .await
            .map_err(|_| GenerationError::Timeout(self.generation_timeout))??;

        let text = text.trim();
        if text.is_empty() {
            return Err(GenerationError::EmptyOutput);
        }
        Ok(text.to_string())
    }
}

pub fn greeting(role: &str) -> String {
    GREETING_TEMPLATE.replace("{role}", role)
}

/// Text of the most recent `user` turn, or `""` if there is none.
pub fn latest_user_text(history: &[ConversationTurn]) -> &str {
    history
        .iter()
        .rev()
        .find(|turn| turn.role == Speaker::User)
        .map(|turn| turn.text.as_str())
        .unwrap_or("")
}

/// System instruction followed by the history in model roles.
pub fn build_messages(
    role: &str,
    context: &[String],
    history: &[ConversationTurn],
) -> Vec<ChatMessage> {
    let context = if context.is_empty() {
        NO_CONTEXT.to_string()
    } else {
        context.join("\n---\n")
    };
    let system = format!(
        "{}\n\n{}",
        INTERVIEWER_SYSTEM_TEMPLATE
            .replace("{role}", role)
            .replace("{context}", &context),
        PLAIN_TEXT_INSTRUCTION
    );

    let mut messages = Vec::with_capacity(history.len() + 1);
    messages.push(ChatMessage::new(ChatRole::System, system));
    messages.extend(history.iter().map(|turn| {
        let chat_role = match turn.role {
            Speaker::Bot => ChatRole::Assistant,
            Speaker::User | Speaker::Other => ChatRole::User,
        };
        ChatMessage::new(chat_role, turn.text.clone())
    }));
    messages
}

/// Index into the static question list for the current position.
///
/// Untagged history: `len - 1`, the first entry being the introduction.
/// Tagged history: the number of turns tagged `answer`, so missing intros or
/// extra turns do not shift the position.
pub fn fallback_index(history: &[ConversationTurn]) -> usize {
    if history.iter().any(|turn| turn.kind.is_some()) {
        history
            .iter()
            .filter(|turn| turn.kind == Some(TurnKind::Answer))
            .count()
    } else {
        history.len().saturating_sub(1)
    }
}

/// Static question for this position, or the completion message.
pub fn fallback(role: &str, history: &[ConversationTurn]) -> TurnReply {
    let index = fallback_index(history);
    match static_question(role, index) {
        Some(question) => TurnReply {
            reply: question.to_string(),
            source: ReplySource::Fallback,
        },
        None => {
            info!("Static questions exhausted for role '{role}' at index {index}");
            TurnReply {
                reply: COMPLETION_MESSAGE.to_string(),
                source: ReplySource::Finished,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interview::questions::questions_for_role;
    use crate::rag::chunk::ChunkConfig;
    use crate::rag::embedding::{Embedder, HashingEmbedder};
    use crate::rag::index::VectorIndex;
    use crate::rag::ingest::IngestPipeline;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::Mutex;

    /// Records every call; replies with a fixed result.
    struct StubGenerator {
        reply: Result<String, fn() -> GenerationError>,
        calls: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl StubGenerator {
        fn replying(text: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(text.to_string()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn failing(error: fn() -> GenerationError) -> Arc<Self> {
            Arc::new(Self {
                reply: Err(error),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        fn last_call(&self) -> Vec<ChatMessage> {
            self.calls.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl QuestionGenerator for StubGenerator {
        fn model_name(&self) -> &str {
            "stub"
        }

        async fn generate(&self, messages: &[ChatMessage]) -> Result<String, GenerationError> {
            self.calls.lock().unwrap().push(messages.to_vec());
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(make) => Err(make()),
            }
        }
    }

    struct HangingGenerator;

    #[async_trait]
    impl QuestionGenerator for HangingGenerator {
        fn model_name(&self) -> &str {
            "hanging"
        }

        async fn generate(&self, _messages: &[ChatMessage]) -> Result<String, GenerationError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok("too late".to_string())
        }
    }

    fn setup(generator: Arc<dyn QuestionGenerator>) -> (TurnController, IngestPipeline) {
        let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(128));
        let index = Arc::new(VectorIndex::new(Some(128)));
        let retriever = Retriever::new(embedder.clone(), index.clone(), Duration::from_secs(5));
        let pipeline =
            IngestPipeline::new(embedder, index, ChunkConfig::default(), Duration::from_secs(5));
        let controller = TurnController::new(retriever, generator, 3, Duration::from_secs(10));
        (controller, pipeline)
    }

    fn history_of_len(len: usize) -> Vec<ConversationTurn> {
        (0..len)
            .map(|i| {
                if i % 2 == 0 {
                    ConversationTurn::user(format!("answer {i}"))
                } else {
                    ConversationTurn::bot(format!("question {i}"))
                }
            })
            .collect()
    }

    #[tokio::test]
    async fn test_empty_history_greets_without_calling_model() {
        let generator = StubGenerator::replying("unused");
        let (controller, _) = setup(generator.clone());

        let reply = controller.next_turn("software engineer", &[]).await;

        assert_eq!(reply.source, ReplySource::Greeting);
        assert!(reply.reply.contains("software engineer"));
        assert!(reply.reply.starts_with("Hello"));
        assert_eq!(generator.call_count(), 0);
    }

    #[tokio::test]
    async fn test_generated_question_returned_verbatim() {
        let generator = StubGenerator::replying("What motivated your migration?");
        let (controller, _) = setup(generator.clone());
        let history = vec![ConversationTurn::user("I'm Alice, a backend engineer.")];

        let reply = controller.next_turn("software engineer", &history).await;

        assert_eq!(reply.reply, "What motivated your migration?");
        assert_eq!(reply.source, ReplySource::Generated);
        assert_eq!(generator.call_count(), 1);
    }

    #[tokio::test]
    async fn test_prompt_carries_role_context_and_history() {
        let generator = StubGenerator::replying("Next?");
        let (controller, pipeline) = setup(generator.clone());
        pipeline
            .ingest(
                Bytes::from_static(b"Alice led a payments migration at Acme."),
                "alice.txt",
            )
            .await
            .unwrap();

        let history = vec![
            ConversationTurn::bot("Welcome!"),
            ConversationTurn::user("I worked on a payments migration."),
            ConversationTurn {
                role: Speaker::Other,
                text: "note".to_string(),
                kind: None,
            },
        ];
        controller.next_turn("data scientist", &history).await;

        let messages = generator.last_call();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, ChatRole::System);
        assert!(messages[0].content.contains("data scientist"));
        assert!(messages[0]
            .content
            .contains("Alice led a payments migration at Acme."));
        assert_eq!(messages[1].role, ChatRole::Assistant);
        assert_eq!(messages[2].role, ChatRole::User);
        assert_eq!(messages[2].content, "I worked on a payments migration.");
        assert_eq!(messages[3].role, ChatRole::User);
    }

    #[tokio::test]
    async fn test_no_resume_uses_placeholder_context() {
        let generator = StubGenerator::replying("Next?");
        let (controller, _) = setup(generator.clone());
        controller
            .next_turn("software engineer", &[ConversationTurn::user("hi")])
            .await;
        assert!(generator.last_call()[0].content.contains(NO_CONTEXT));
    }

    #[tokio::test]
    async fn test_fallback_follows_history_length() {
        let role = "software engineer";
        let questions = questions_for_role(role);
        let failures: [fn() -> GenerationError; 3] = [
            || GenerationError::ServiceUnavailable("down".to_string()),
            || GenerationError::RateLimited { retries: 3 },
            || GenerationError::EmptyOutput,
        ];

        for make_error in failures {
            let (controller, _) = setup(StubGenerator::failing(make_error));
            for len in 1..=questions.len() + 2 {
                let reply = controller.next_turn(role, &history_of_len(len)).await;
                if len - 1 < questions.len() {
                    assert_eq!(reply.reply, questions[len - 1]);
                    assert_eq!(reply.source, ReplySource::Fallback);
                } else {
                    assert_eq!(reply.reply, COMPLETION_MESSAGE);
                    assert_eq!(reply.source, ReplySource::Finished);
                }
            }
        }
    }

    #[tokio::test]
    async fn test_blank_generation_falls_back() {
        let (controller, _) = setup(StubGenerator::replying("   \n"));
        let reply = controller
            .next_turn("data scientist", &history_of_len(1))
            .await;
        assert_eq!(reply.reply, "How do you handle missing data in a dataset?");
        assert_eq!(reply.source, ReplySource::Fallback);
    }

    #[tokio::test(start_paused = true)]
    async fn test_generation_timeout_falls_back() {
        let (controller, _) = setup(Arc::new(HangingGenerator));
        let reply = controller
            .next_turn("software engineer", &history_of_len(2))
            .await;
        assert_eq!(reply.reply, "How do you ensure code quality?");
    }

    #[tokio::test]
    async fn test_unknown_role_fallback_finishes() {
        let (controller, _) = setup(StubGenerator::failing(|| GenerationError::EmptyOutput));
        let reply = controller.next_turn("astronaut", &history_of_len(1)).await;
        assert_eq!(reply.source, ReplySource::Finished);
    }

    #[test]
    fn test_latest_user_text() {
        let history = vec![
            ConversationTurn::user("first"),
            ConversationTurn::bot("q"),
            ConversationTurn::user("second"),
            ConversationTurn::bot("q2"),
        ];
        assert_eq!(latest_user_text(&history), "second");
        assert_eq!(latest_user_text(&[ConversationTurn::bot("only bot")]), "");
    }

    #[test]
    fn test_tagged_history_counts_answers() {
        let history = vec![
            ConversationTurn::bot("Welcome").with_kind(TurnKind::Question),
            ConversationTurn::user("I'm Alice").with_kind(TurnKind::Intro),
        ];
        assert_eq!(fallback_index(&history), 0);

        let mut history = history;
        history.push(ConversationTurn::bot("Q1").with_kind(TurnKind::Question));
        history.push(ConversationTurn::user("A1").with_kind(TurnKind::Answer));
        assert_eq!(fallback_index(&history), 1);
        assert_eq!(fallback_index(&history_of_len(4)), 3);
    }
}
