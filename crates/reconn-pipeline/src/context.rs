//! Builds the turn sequence sent to the language model.

use reconn_types::{ConversationRow, Turn};

/// Default response-length cap attached to every completion request.
pub const MAX_REPLY_TOKENS: u32 = 50;

/// Default number of most recent exchanges replayed as context.
pub const HISTORY_LIMIT: u32 = 10;

pub struct ContextAssembler;

impl ContextAssembler {
    /// Orders the persona's system prompt, its recent exchanges, and the new
    /// utterance into chat turns.
    ///
    /// `recent_desc` is newest first, as the row store returns it. Each row
    /// contributes one user turn (transcription preferred over text) and,
    /// when it has one, the reply as an assistant turn right after.
    pub fn build(
        context_prompt: &str,
        recent_desc: &[ConversationRow],
        new_utterance: &str,
    ) -> Vec<Turn> {
        let mut turns = Vec::with_capacity(recent_desc.len() * 2 + 2);
        turns.push(Turn::system(context_prompt));
        for row in recent_desc.iter().rev() {
            if let Some(said) = row.user_utterance() {
                turns.push(Turn::user(said));
            }
            if let Some(reply) = row.reply() {
                turns.push(Turn::assistant(reply));
            }
        }
        turns.push(Turn::user(new_utterance));
        turns
    }
}
