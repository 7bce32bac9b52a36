//! Completion relay trait (port)

use std::pin::Pin;

use futures::stream::Stream;
#[cfg(test)]
use mockall::automock;

use crate::domain::ConversationId;

/// One item of a relayed completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayFragment {
    /// Incremental model output, never empty.
    Delta(String),
    /// Client-visible error text. Always the last item of its stream.
    Failed(String),
}

impl RelayFragment {
    pub fn text(&self) -> &str {
        match self {
            Self::Delta(text) | Self::Failed(text) => text,
        }
    }
}

/// Finite, single-use stream of fragments for one turn.
pub type RelayStream = Pin<Box<dyn Stream<Item = RelayFragment> + Send>>;

#[cfg_attr(test, automock)]
pub trait CompletionProvider: Send + Sync {
    /// Starts one streamed completion for `prompt`. Nothing is sent upstream
    /// until the returned stream is first polled. Upstream failures arrive as
    /// a trailing [`RelayFragment::Failed`], never as a silent end.
    fn stream(&self, conversation_id: &ConversationId, prompt: &str) -> RelayStream;
}
