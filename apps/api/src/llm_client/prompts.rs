// Shared prompt fragments.
// Each service that needs LLM calls defines its own prompts.rs alongside it;
// this file only holds cross-cutting instructions.

/// Keeps replies speakable: the answer is shown and read aloud as-is.
pub const PLAIN_TEXT_INSTRUCTION: &str = "\
    Respond with plain conversational text only. \
    Do NOT use markdown, bullet points, headings or numbered lists. \
    Do NOT prefix the reply with a speaker label.";
