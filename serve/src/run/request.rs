//! Request-preparation side effects for a `Run` request: append the user's
//! initial message to the per-thread message store, when one is configured
//! and the request carries a `thread_id`.

use std::sync::Arc;

use loom::Message;

/// Appends the initial user message to the per-thread message store when
/// both `thread_id` and a store are set. Store errors are logged, not fatal
/// to the run.
pub(super) async fn try_append_initial_user_message(
    user_message_store: Option<&Arc<dyn loom::UserMessageStore>>,
    thread_id: Option<&str>,
    message: &str,
) -> bool {
    let Some(store) = user_message_store else { return false };
    let Some(thread_id) = thread_id else { return false };
    let msg = Message::user(message);
    match store.append(thread_id, &msg).await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("user_message_store append initial user: {}", e);
            false
        }
    }
}
