//! Handle `UserMessages` request: list stored messages for a thread.

use std::sync::Arc;

use loom::Message;

use crate::protocol::{ErrorResponse, ServerResponse, UserMessageItem, UserMessagesRequest, UserMessagesResponse};

/// Handles user_messages request: lists messages from the store for the given thread.
/// When store is None or NoOp, returns empty messages and has_more: false (no error).
/// When thread_id is missing (empty), returns an error response.
pub(crate) async fn handle_user_messages(
    r: UserMessagesRequest,
    user_message_store: Option<Arc<dyn loom::UserMessageStore>>,
) -> ServerResponse {
    if r.thread_id.is_empty() {
        return ServerResponse::Error(ErrorResponse {
            id: Some(r.id.clone()),
            error: "thread_id is required".to_string(),
        });
    }
    let Some(store) = user_message_store else {
        return ServerResponse::UserMessages(UserMessagesResponse {
            id: r.id.clone(),
            thread_id: r.thread_id.clone(),
            messages: vec![],
            has_more: Some(false),
        });
    };
    match store.list(&r.thread_id, r.before, r.limit).await {
        Ok(messages) => {
            let items: Vec<UserMessageItem> = messages.iter().map(message_to_item).collect();
            ServerResponse::UserMessages(UserMessagesResponse {
                id: r.id.clone(),
                thread_id: r.thread_id.clone(),
                messages: items,
                has_more: Some(false),
            })
        }
        Err(e) => ServerResponse::Error(ErrorResponse {
            id: Some(r.id.clone()),
            error: e.to_string(),
        }),
    }
}

fn message_to_item(m: &Message) -> UserMessageItem {
    UserMessageItem {
        role: format!("{:?}", m.role).to_lowercase(),
        content: m.content.clone(),
    }
}
