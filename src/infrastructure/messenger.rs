use crate::domain::event::Reply;
use crate::domain::ports::Messenger;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Prints replies to stderr. Used by the replay driver, where stdout is
/// reserved for the snapshot report.
#[derive(Default, Clone)]
pub struct ConsoleMessenger;

impl ConsoleMessenger {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Messenger for ConsoleMessenger {
    async fn send(&self, reply: Reply) -> Result<()> {
        match reply {
            Reply::Text { chat, body } => eprintln!("-> {chat}: {body}"),
            Reply::MediaNote {
                chat,
                blob,
                duration_cap_secs,
            } => eprintln!(
                "-> {chat}: [kruzhok {} ({duration_cap_secs}s)]",
                blob.as_str()
            ),
        }
        Ok(())
    }
}

/// Captures every reply for inspection. Test double.
#[derive(Default, Clone)]
pub struct RecordingMessenger {
    sent: Arc<Mutex<Vec<Reply>>>,
}

impl RecordingMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<Reply> {
        self.sent.lock().await.clone()
    }

    pub async fn sent_to(&self, chat: i64) -> Vec<Reply> {
        self.sent
            .lock()
            .await
            .iter()
            .filter(|r| r.chat() == chat)
            .cloned()
            .collect()
    }

    pub async fn texts_to(&self, chat: i64) -> Vec<String> {
        self.sent
            .lock()
            .await
            .iter()
            .filter_map(|r| match r {
                Reply::Text { chat: c, body } if *c == chat => Some(body.clone()),
                _ => None,
            })
            .collect()
    }

    pub async fn media_notes_to(&self, chat: i64) -> usize {
        self.sent
            .lock()
            .await
            .iter()
            .filter(|r| matches!(r, Reply::MediaNote { chat: c, .. } if *c == chat))
            .count()
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send(&self, reply: Reply) -> Result<()> {
        self.sent.lock().await.push(reply);
        Ok(())
    }
}
