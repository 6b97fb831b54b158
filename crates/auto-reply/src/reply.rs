use {
    async_trait::async_trait,
    tracing::info,
    volery_common::types::{MsgContext, ReplyPayload},
};

/// Produce a reply for an inbound message.
///
/// The gateway wires the real agent pipeline behind this trait; channels only
/// hold an `Arc<dyn AutoReply>` and never see session or provider state.
#[async_trait]
pub trait AutoReply: Send + Sync {
    async fn get_reply(&self, msg: &MsgContext) -> anyhow::Result<ReplyPayload>;
}

/// Fallback implementation: echo the inbound text back.
pub struct EchoReply;

#[async_trait]
impl AutoReply for EchoReply {
    async fn get_reply(&self, msg: &MsgContext) -> anyhow::Result<ReplyPayload> {
        info!(
            channel = %msg.channel,
            account_id = %msg.account_id,
            from = %msg.from,
            sender = msg.sender_name.as_deref().unwrap_or("unknown"),
            chat_type = ?msg.chat_type,
            session_key = %msg.session_key,
            "incoming message: {}",
            msg.body,
        );

        Ok(ReplyPayload {
            text: format!(
                "Echo: {}",
                if msg.body.is_empty() {
                    "(no text)"
                } else {
                    &msg.body
                }
            ),
            reply_to_id: Some(msg.message_id.clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use {super::*, volery_common::types::ChatType};

    fn msg(body: &str) -> MsgContext {
        MsgContext {
            channel: "lark".into(),
            account_id: "default".into(),
            from: "oc_1".into(),
            sender_name: Some("ou_alice".into()),
            body: body.into(),
            chat_type: ChatType::Dm,
            message_id: "om_1".into(),
            reply_to_id: None,
            session_key: "lark:default:oc_1".into(),
        }
    }

    #[tokio::test]
    async fn echoes_body() {
        let reply = EchoReply.get_reply(&msg("hello")).await.unwrap();
        assert_eq!(reply.text, "Echo: hello");
        assert_eq!(reply.reply_to_id.as_deref(), Some("om_1"));
    }

    #[tokio::test]
    async fn empty_body_gets_placeholder() {
        let reply = EchoReply.get_reply(&msg("")).await.unwrap();
        assert_eq!(reply.text, "Echo: (no text)");
    }
}
