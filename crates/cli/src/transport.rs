//! Console chat transport.
//!
//! The simplest `ChatTransport`: replies go to stdout. Edits cannot rewrite
//! a terminal line that has already scrolled away, so they print as update
//! lines tagged with the message id.

use async_trait::async_trait;
use deskhand_core::error::TransportError;
use deskhand_core::history::UserId;
use deskhand_core::interfaces::{ChatTransport, MessageId};
use std::sync::atomic::{AtomicU64, Ordering};

/// Terminal-backed transport for local use.
#[derive(Default)]
pub struct ConsoleTransport {
    next_id: AtomicU64,
}

#[async_trait]
impl ChatTransport for ConsoleTransport {
    async fn send(&self, _user_id: &UserId, text: &str) -> Result<MessageId, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        println!("{text}");
        Ok(MessageId(format!("console-{id}")))
    }

    async fn edit(&self, message_id: &MessageId, text: &str) -> Result<(), TransportError> {
        println!("[{message_id}] {text}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_returns_distinct_ids() {
        let transport = ConsoleTransport::default();
        let user = UserId::new("local");
        let a = transport.send(&user, "one").await.unwrap();
        let b = transport.send(&user, "two").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn edit_accepts_any_id() {
        let transport = ConsoleTransport::default();
        transport
            .edit(&MessageId("console-1".into()), "updated")
            .await
            .unwrap();
    }
}
