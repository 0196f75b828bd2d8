use anyhow::anyhow;
use chrono::Utc;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use dollclub_shared::types::{ConversationId, UserId};
use dollclub_store::{Conversation, MessageBody, PrivateMessage};

use crate::events::{emit, ClientEvent};
use crate::{Client, ClientError};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationDto {
    pub id: String,
    pub participant_id: String,
    pub participant_name: Option<String>,
    pub unread_count: u32,
    pub online: bool,
    pub created_at: String,
}

impl From<Conversation> for ConversationDto {
    fn from(c: Conversation) -> Self {
        Self {
            id: c.id.0.to_string(),
            participant_id: c.participant_id.0,
            participant_name: c.participant_name,
            unread_count: c.unread_count,
            online: c.online,
            created_at: c.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDto {
    pub id: String,
    pub conversation_id: String,
    pub outgoing: bool,
    #[serde(flatten)]
    pub body: MessageBody,
    pub timestamp: String,
}

impl From<PrivateMessage> for MessageDto {
    fn from(m: PrivateMessage) -> Self {
        Self {
            id: m.id.to_string(),
            conversation_id: m.conversation_id.0.to_string(),
            outgoing: m.outgoing,
            body: m.body,
            timestamp: m.timestamp.to_rfc3339(),
        }
    }
}

impl Client {
    /// Send a private message.  Messaging is local-only: the message is
    /// stored durably in the local database and surfaced to subscribers.
    pub fn send_private_message(
        &self,
        to: &UserId,
        participant_name: Option<&str>,
        body: MessageBody,
    ) -> Result<MessageDto, ClientError> {
        let db = self.db.lock().map_err(|_| anyhow!("db lock poisoned"))?;

        let conversation = db.upsert_conversation(to, participant_name)?;
        let message = PrivateMessage {
            id: Uuid::new_v4(),
            conversation_id: conversation.id,
            outgoing: true,
            body,
            timestamp: Utc::now(),
        };
        db.insert_message(&message)?;

        info!(conversation = %conversation.id.0, "Private message sent");
        emit(
            &self.events,
            ClientEvent::NewPrivateMessage {
                conversation_id: conversation.id,
            },
        );

        Ok(MessageDto::from(message))
    }

    /// Record a message received from the other participant.  Bumps the
    /// conversation's unread counter.
    pub fn record_incoming_message(
        &self,
        from: &UserId,
        participant_name: Option<&str>,
        body: MessageBody,
    ) -> Result<MessageDto, ClientError> {
        let db = self.db.lock().map_err(|_| anyhow!("db lock poisoned"))?;

        let conversation = db.upsert_conversation(from, participant_name)?;
        let message = PrivateMessage {
            id: Uuid::new_v4(),
            conversation_id: conversation.id,
            outgoing: false,
            body,
            timestamp: Utc::now(),
        };
        db.insert_message(&message)?;

        emit(
            &self.events,
            ClientEvent::NewPrivateMessage {
                conversation_id: conversation.id,
            },
        );

        Ok(MessageDto::from(message))
    }

    pub fn conversations(&self) -> Result<Vec<ConversationDto>, ClientError> {
        let db = self.db.lock().map_err(|_| anyhow!("db lock poisoned"))?;
        let conversations = db.list_conversations()?;
        Ok(conversations.into_iter().map(ConversationDto::from).collect())
    }

    /// Messages of one conversation, most recent first.
    pub fn messages(
        &self,
        conversation_id: ConversationId,
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> Result<Vec<MessageDto>, ClientError> {
        let db = self.db.lock().map_err(|_| anyhow!("db lock poisoned"))?;
        let messages = db.messages_for_conversation(
            conversation_id,
            limit.unwrap_or(50),
            offset.unwrap_or(0),
        )?;
        Ok(messages.into_iter().map(MessageDto::from).collect())
    }

    /// Clear the unread counter of a conversation.
    pub fn mark_conversation_read(&self, conversation_id: ConversationId) -> Result<(), ClientError> {
        let db = self.db.lock().map_err(|_| anyhow!("db lock poisoned"))?;
        db.mark_read(conversation_id)?;
        Ok(())
    }

    /// Update the presence dot shown next to a conversation.
    pub fn set_conversation_online(
        &self,
        conversation_id: ConversationId,
        online: bool,
    ) -> Result<(), ClientError> {
        let db = self.db.lock().map_err(|_| anyhow!("db lock poisoned"))?;
        db.set_online(conversation_id, online)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use tokio::sync::mpsc;

    use dollclub_net::{
        EndpointConfig, FeedCommand, FeedNotification, RemoteClient, RemoteConfig,
        UserAccountStore,
    };
    use dollclub_store::Database;

    use crate::broadcast::BroadcastController;
    use crate::feed_store::FeedSyncStore;
    use crate::state::AuthUser;
    use crate::Client;

    struct TestHarness {
        client: Client,
        _dir: tempfile::TempDir,
        _feed_cmd_rx: mpsc::Receiver<FeedCommand>,
        _feed_notif_tx: mpsc::Sender<FeedNotification>,
    }

    fn test_client() -> TestHarness {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("test.db")).unwrap();

        let remote = RemoteClient::new(RemoteConfig {
            api_url: "https://api.test".into(),
            realtime_url: "wss://rt.test".into(),
            app_id: "test".into(),
            auth_token: "tok".into(),
        });
        let (events, _rx) = crate::events::event_channel();
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let (notif_tx, notif_rx) = mpsc::channel(8);

        let user = AuthUser {
            id: UserId("me".into()),
            display_name: Some("Me".into()),
        };

        let client = Client {
            user: user.clone(),
            db: Mutex::new(db),
            accounts: UserAccountStore::new(remote.clone()),
            feed: FeedSyncStore::new(user.id, cmd_tx, notif_rx, events.clone()),
            broadcast: BroadcastController::new(remote, EndpointConfig::default(), events.clone()),
            events,
        };

        TestHarness {
            client,
            _dir: dir,
            _feed_cmd_rx: cmd_rx,
            _feed_notif_tx: notif_tx,
        }
    }

    #[tokio::test]
    async fn sent_messages_appear_in_the_conversation() {
        let h = test_client();
        let other = UserId("companion-1".into());

        let sent = h
            .client
            .send_private_message(
                &other,
                Some("Mei"),
                MessageBody::Text {
                    text: "good evening".into(),
                },
            )
            .unwrap();
        assert!(sent.outgoing);

        let conversations = h.client.conversations().unwrap();
        assert_eq!(conversations.len(), 1);
        assert_eq!(conversations[0].participant_name.as_deref(), Some("Mei"));
        // Own messages never count as unread.
        assert_eq!(conversations[0].unread_count, 0);

        let conv_id = ConversationId(Uuid::parse_str(&conversations[0].id).unwrap());
        let messages = h.client.messages(conv_id, None, None).unwrap();
        assert_eq!(messages.len(), 1);
    }

    #[tokio::test]
    async fn incoming_messages_bump_unread_until_read() {
        let h = test_client();
        let other = UserId("companion-1".into());

        h.client
            .record_incoming_message(
                &other,
                None,
                MessageBody::Sticker {
                    sticker_id: "heart-2".into(),
                },
            )
            .unwrap();
        h.client
            .record_incoming_message(
                &other,
                None,
                MessageBody::Voice {
                    media_ref: "blob://v9".into(),
                    duration_ms: 1_800,
                },
            )
            .unwrap();

        let conversations = h.client.conversations().unwrap();
        assert_eq!(conversations[0].unread_count, 2);

        let conv_id = ConversationId(Uuid::parse_str(&conversations[0].id).unwrap());
        h.client.mark_conversation_read(conv_id).unwrap();
        assert_eq!(h.client.conversations().unwrap()[0].unread_count, 0);
    }

    #[tokio::test]
    async fn presence_flag_round_trips() {
        let h = test_client();
        let other = UserId("companion-1".into());

        h.client
            .send_private_message(&other, None, MessageBody::Text { text: "hi".into() })
            .unwrap();
        let conversations = h.client.conversations().unwrap();
        assert!(!conversations[0].online);

        let conv_id = ConversationId(Uuid::parse_str(&conversations[0].id).unwrap());
        h.client.set_conversation_online(conv_id, true).unwrap();
        assert!(h.client.conversations().unwrap()[0].online);
    }
}
