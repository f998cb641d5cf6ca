//! Read-only query views over a finished analysis, plus the rendered
//! response shape the wire server transmits for `WatchIP`.

use crate::eval::{Message, SymbolicState};
use serde::Serialize;

impl<'m> SymbolicState<'m> {
    /// The full ordered message log, each paired with its emission IP.
    pub fn messages(&self) -> &[(Option<u64>, Message)] {
        &self.messages
    }

    /// The full ordered warning log.
    pub fn warnings(&self) -> &[(Option<u64>, String)] {
        &self.warnings
    }

    /// The messages emitted at `ip`, in emission order.
    pub fn messages_at(&self, ip: u64) -> &[Message] {
        self.messages_by_ip.get(&ip).map(|msgs| msgs.as_slice()).unwrap_or(&[])
    }
}

/// Expression formatting options supplied by the querying client.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct RenderOptions {
    /// Elide subtrees deeper than this; `None` renders everything.
    pub max_depth: Option<usize>,
}

/// The response payload for a `WatchIP` query.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MessagesResponse {
    pub messages: Vec<String>,
}

/// Answer a `WatchIP { ip, limit }` query: the messages emitted at `ip`, in
/// emission order, rendered with the caller's options. A `limit` of 0 means
/// no limit.
pub fn watch_ip(
    state: &SymbolicState,
    ip: u64,
    limit: usize,
    opts: &RenderOptions,
) -> MessagesResponse {
    let msgs = state.messages_at(ip);
    let take = if limit == 0 { msgs.len() } else { limit };
    MessagesResponse {
        messages: msgs.iter().take(take).map(|m| m.render(opts.max_depth)).collect(),
    }
}
