// lib.rs
//
// ================================================================================
// MessageForwarder - 消息转发插件
//
// 监听文本、图片、视频、名片消息，按监听源过滤后转发给配置的用户或群聊。
// 结构：配置 | 监听过滤 | 临时文件 | 视频封面 | 名片解析 | 分类型处理
// ================================================================================

#[macro_use]
pub mod log;

pub mod api;
pub mod card;
pub mod config;
pub mod filter;
pub mod forwarder;
pub mod host;
pub mod message;
pub mod plugin;
pub mod temp;
pub mod thumbnail;

/// 统一错误类型
pub type ForwardError = Box<dyn std::error::Error + Send + Sync>;

pub type ForwardResult<T> = Result<T, ForwardError>;

pub mod prelude {
    pub use crate::api::{WechatApi, WechatClient};
    pub use crate::card::{Card, parse_card};
    pub use crate::config::{AppConfig, ConfigManager, ForwarderConfig, ListenMode, TargetType};
    pub use crate::filter::allowed;
    pub use crate::forwarder::{ForwardOutcome, MessageForwarder, NO_THUMBNAIL, forward};
    pub use crate::host::PluginHost;
    pub use crate::message::{Envelope, InboundMessage, MessageKind, RawMessage};
    pub use crate::plugin::{EventResult, Plugin};
    pub use crate::temp::{ScratchDir, TempFile};
    pub use crate::thumbnail::ThumbnailExtractor;
    pub use crate::{ForwardError, ForwardResult};
    pub use async_trait::async_trait;
}
