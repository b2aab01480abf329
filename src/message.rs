//! 入站消息模型
//!
//! 宿主推送的消息记录字段松散（字段可能缺失，部分字段可能是 `{"string": ...}` 包装），
//! 这里先反序列化为 [`RawMessage`]，再按消息类型转换为带明确字段的 [`InboundMessage`]。

use crate::ForwardResult;
use serde::{Deserialize, Serialize};

pub const MSG_TYPE_TEXT: i64 = 1;
pub const MSG_TYPE_IMAGE: i64 = 3;
pub const MSG_TYPE_CARD: i64 = 42;
pub const MSG_TYPE_VIDEO: i64 = 43;

/// 群聊会话 ID 后缀
pub const GROUP_SUFFIX: &str = "@chatroom";

/// 可能以纯字符串或 `{"string": "..."}` 形式出现的字段
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WxString {
    Plain(String),
    Wrapped {
        #[serde(default)]
        string: String,
    },
}

impl WxString {
    pub fn as_str(&self) -> &str {
        match self {
            WxString::Plain(s) => s,
            WxString::Wrapped { string } => string,
        }
    }
}

impl From<&str> for WxString {
    fn from(s: &str) -> Self {
        WxString::Plain(s.to_string())
    }
}

/// 宿主推送的原始消息记录
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct RawMessage {
    pub msg_type: Option<i64>,
    pub from_wxid: Option<String>,
    pub sender_wxid: Option<String>,
    pub to_wxid: Option<String>,
    pub is_group: Option<bool>,
    pub from_user_name: Option<WxString>,
    pub to_user_name: Option<WxString>,
    pub content: Option<WxString>,
    pub image: Option<String>,
    pub video: Option<String>,
    pub xml: Option<String>,
}

impl RawMessage {
    pub fn from_json(s: &str) -> ForwardResult<Self> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn content_str(&self) -> &str {
        self.content.as_ref().map(WxString::as_str).unwrap_or("")
    }

    /// 名片消息预处理：补全 FromWxid / ToWxid，判断群聊并提取实际发送者
    pub fn preprocess_card(&mut self) {
        if self.from_wxid.is_none() {
            self.from_wxid = Some(
                self.from_user_name
                    .as_ref()
                    .map(|v| v.as_str().to_string())
                    .unwrap_or_default(),
            );
        }
        if self.to_wxid.is_none() {
            self.to_wxid = Some(
                self.to_user_name
                    .as_ref()
                    .map(|v| v.as_str().to_string())
                    .unwrap_or_default(),
            );
        }

        let from_wxid = self.from_wxid.clone().unwrap_or_default();
        if from_wxid.ends_with(GROUP_SUFFIX) {
            self.is_group = Some(true);
            // 群聊中名片内容格式为 "发送者id:\n<xml...>"
            let sender = self
                .content_str()
                .split_once(":\n")
                .map(|(prefix, _)| prefix.trim().to_string())
                .unwrap_or_else(|| from_wxid.clone());
            debug!(target: "Card", "群聊名片消息，发送者: {}", sender);
            self.sender_wxid = Some(sender);
        } else {
            self.is_group = Some(false);
            self.sender_wxid = Some(from_wxid);
        }

        debug!(
            target: "Card",
            "名片消息预处理完成: FromWxid={:?}, ToWxid={:?}, SenderWxid={:?}, IsGroup={:?}",
            self.from_wxid,
            self.to_wxid,
            self.sender_wxid,
            self.is_group
        );
    }
}

/// 消息的来源信息，所有字段都有确定的缺省值
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envelope {
    pub msg_type: Option<i64>,
    /// 会话 ID（私聊为对方，群聊为群）
    pub from_wxid: String,
    /// 实际发送者，缺失时回退为 from_wxid
    pub sender_wxid: String,
    pub to_wxid: String,
    pub is_group: bool,
}

impl Envelope {
    /// 群聊消息的群 ID
    pub fn room_wxid(&self) -> Option<&str> {
        self.is_group.then_some(self.from_wxid.as_str())
    }

    pub fn msg_type_display(&self) -> String {
        self.msg_type
            .map(|t| t.to_string())
            .unwrap_or_else(|| "未知类型".to_string())
    }

    pub fn from_display(&self) -> &str {
        if self.from_wxid.is_empty() {
            "未知来源"
        } else {
            &self.from_wxid
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Text,
    Image,
    Video,
    Card,
    Other,
}

impl MessageKind {
    pub fn from_msg_type(msg_type: Option<i64>) -> Self {
        match msg_type {
            Some(MSG_TYPE_TEXT) => MessageKind::Text,
            Some(MSG_TYPE_IMAGE) => MessageKind::Image,
            Some(MSG_TYPE_VIDEO) => MessageKind::Video,
            Some(MSG_TYPE_CARD) => MessageKind::Card,
            _ => MessageKind::Other,
        }
    }
}

/// 按消息类型区分的入站消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    Text {
        envelope: Envelope,
        /// 空字符串表示没有可转发的内容
        content: String,
    },
    Image {
        envelope: Envelope,
        /// Base64 图片数据，优先取 Image 字段，其次 Content
        data: Option<String>,
    },
    Video {
        envelope: Envelope,
        /// Base64 视频数据，优先取 Video 字段，其次 Content
        data: Option<String>,
        /// CDN 视频 XML，优先取 Xml 字段，其次 Content
        xml: Option<String>,
    },
    Card {
        envelope: Envelope,
        /// 未剥离前缀的名片 XML
        xml: String,
    },
    Other {
        envelope: Envelope,
    },
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|s| !s.is_empty()).map(str::to_string)
}

impl InboundMessage {
    pub fn from_raw(mut raw: RawMessage) -> Self {
        let kind = MessageKind::from_msg_type(raw.msg_type);
        if kind == MessageKind::Card {
            raw.preprocess_card();
        }

        let from_wxid = raw.from_wxid.clone().unwrap_or_default();
        let envelope = Envelope {
            msg_type: raw.msg_type,
            sender_wxid: raw.sender_wxid.clone().unwrap_or_else(|| from_wxid.clone()),
            to_wxid: raw.to_wxid.clone().unwrap_or_default(),
            is_group: raw.is_group.unwrap_or(false),
            from_wxid,
        };

        let content = non_empty(Some(raw.content_str()));

        match kind {
            MessageKind::Text => InboundMessage::Text {
                envelope,
                content: content.unwrap_or_default(),
            },
            MessageKind::Image => InboundMessage::Image {
                envelope,
                data: non_empty(raw.image.as_deref()).or(content),
            },
            MessageKind::Video => InboundMessage::Video {
                envelope,
                data: non_empty(raw.video.as_deref()).or_else(|| content.clone()),
                xml: non_empty(raw.xml.as_deref()).or(content),
            },
            MessageKind::Card => InboundMessage::Card {
                envelope,
                xml: content.unwrap_or_default(),
            },
            MessageKind::Other => InboundMessage::Other { envelope },
        }
    }

    pub fn envelope(&self) -> &Envelope {
        match self {
            InboundMessage::Text { envelope, .. }
            | InboundMessage::Image { envelope, .. }
            | InboundMessage::Video { envelope, .. }
            | InboundMessage::Card { envelope, .. }
            | InboundMessage::Other { envelope } => envelope,
        }
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            InboundMessage::Text { .. } => MessageKind::Text,
            InboundMessage::Image { .. } => MessageKind::Image,
            InboundMessage::Video { .. } => MessageKind::Video,
            InboundMessage::Card { .. } => MessageKind::Card,
            InboundMessage::Other { .. } => MessageKind::Other,
        }
    }
}

impl From<RawMessage> for InboundMessage {
    fn from(raw: RawMessage) -> Self {
        InboundMessage::from_raw(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_wrapped_fields() {
        let raw = RawMessage::from_json(
            r#"{"MsgType":42,"FromUserName":{"string":"wxid_a"},"Content":{"string":"<msg/>"}}"#,
        )
        .unwrap();
        assert_eq!(raw.msg_type, Some(42));
        assert_eq!(raw.from_wxid, None);
        assert_eq!(raw.from_user_name.as_ref().unwrap().as_str(), "wxid_a");
        assert_eq!(raw.content_str(), "<msg/>");
    }

    #[test]
    fn group_card_extracts_sender_from_prefix() {
        let mut raw = RawMessage {
            msg_type: Some(MSG_TYPE_CARD),
            from_wxid: Some("9988@chatroom".into()),
            content: Some("sender42:\n<msg username=\"id1\" nickname=\"A\"/>".into()),
            ..Default::default()
        };
        raw.preprocess_card();
        assert_eq!(raw.is_group, Some(true));
        assert_eq!(raw.sender_wxid.as_deref(), Some("sender42"));
        assert_eq!(raw.to_wxid.as_deref(), Some(""));
    }

    #[test]
    fn group_card_without_prefix_falls_back_to_room() {
        let mut raw = RawMessage {
            msg_type: Some(MSG_TYPE_CARD),
            from_user_name: Some(WxString::Wrapped {
                string: "9988@chatroom".into(),
            }),
            content: Some("<msg username=\"id1\" nickname=\"A\"/>".into()),
            ..Default::default()
        };
        raw.preprocess_card();
        assert_eq!(raw.from_wxid.as_deref(), Some("9988@chatroom"));
        assert_eq!(raw.sender_wxid.as_deref(), Some("9988@chatroom"));
        assert_eq!(raw.is_group, Some(true));
    }

    #[test]
    fn private_card_sender_is_origin() {
        let mut raw = RawMessage {
            msg_type: Some(MSG_TYPE_CARD),
            from_wxid: Some("wxid_friend".into()),
            sender_wxid: Some("stale".into()),
            is_group: Some(true),
            ..Default::default()
        };
        raw.preprocess_card();
        assert_eq!(raw.is_group, Some(false));
        assert_eq!(raw.sender_wxid.as_deref(), Some("wxid_friend"));
    }

    #[test]
    fn image_prefers_image_field_then_content() {
        let raw = RawMessage {
            msg_type: Some(MSG_TYPE_IMAGE),
            image: Some(String::new()),
            content: Some("QUJD".into()),
            ..Default::default()
        };
        match InboundMessage::from_raw(raw) {
            InboundMessage::Image { data, .. } => assert_eq!(data.as_deref(), Some("QUJD")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn video_carries_both_payload_candidates() {
        let raw = RawMessage {
            msg_type: Some(MSG_TYPE_VIDEO),
            video: Some("AAAA".into()),
            content: Some("<msg><videomsg cdnvideourl=\"x\"/></msg>".into()),
            ..Default::default()
        };
        match InboundMessage::from_raw(raw) {
            InboundMessage::Video { data, xml, .. } => {
                assert_eq!(data.as_deref(), Some("AAAA"));
                assert!(xml.unwrap().contains("cdnvideourl"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn envelope_defaults_sender_to_origin() {
        let msg = InboundMessage::from_raw(RawMessage {
            msg_type: Some(MSG_TYPE_TEXT),
            from_wxid: Some("wxid_a".into()),
            content: Some("hi".into()),
            ..Default::default()
        });
        let env = msg.envelope();
        assert_eq!(env.sender_wxid, "wxid_a");
        assert!(!env.is_group);
        assert_eq!(env.room_wxid(), None);
        assert_eq!(msg.kind(), MessageKind::Text);
    }

    #[test]
    fn unknown_type_is_other() {
        let msg = InboundMessage::from_raw(RawMessage {
            msg_type: Some(49),
            ..Default::default()
        });
        assert_eq!(msg.kind(), MessageKind::Other);
        assert_eq!(msg.envelope().msg_type_display(), "49");
        assert_eq!(msg.envelope().from_display(), "未知来源");
    }
}
