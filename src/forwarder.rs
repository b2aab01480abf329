//! 消息转发插件
//!
//! 每条消息按类型交给对应的处理函数，经监听源过滤后调用宿主 API 发往配置的目标。
//! 所有处理函数都是错误的隔离边界，失败只记录日志，不会传回宿主。

use crate::ForwardResult;
use crate::api::WechatApi;
use crate::card::parse_card;
use crate::config::{ConfigManager, ForwarderConfig, ForwarderSection};
use crate::filter::allowed;
use crate::log::{self, Level};
use crate::message::{Envelope, InboundMessage, RawMessage};
use crate::plugin::{EventResult, Plugin};
use crate::temp::ScratchDir;
use crate::thumbnail::ThumbnailExtractor;
use async_trait::async_trait;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

/// 没有封面时传给 send_video 的占位值
pub const NO_THUMBNAIL: &str = "None";

const DEFAULT_TEMP_DIR: &str = "temp";

/// 转发步骤的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardOutcome {
    Sent,
    /// 来源不在监听范围内
    Filtered,
    /// 未配置转发目标
    NoTarget,
    /// 宿主 API 调用失败（已记录）
    Failed,
}

/// 通用转发步骤：过滤 -> 检查目标 -> 调用发送函数
pub async fn forward<F, Fut>(
    envelope: &Envelope,
    config: &ForwarderConfig,
    send: F,
) -> ForwardOutcome
where
    F: FnOnce(String) -> Fut,
    Fut: Future<Output = ForwardResult<()>>,
{
    if !allowed(envelope, config) {
        debug!("消息来自未监听的源，跳过转发: {}", envelope.from_display());
        return ForwardOutcome::Filtered;
    }

    let Some(target) = config.target() else {
        warn!("未配置转发目标WXID，无法转发消息。");
        return ForwardOutcome::NoTarget;
    };
    let target = target.to_string();

    match send(target.clone()).await {
        Ok(()) => {
            info!(
                "成功转发消息: {} from {} to {}",
                envelope.msg_type_display(),
                envelope.from_display(),
                target
            );
            ForwardOutcome::Sent
        }
        Err(e) => {
            error!("转发消息失败: {}", e);
            ForwardOutcome::Failed
        }
    }
}

/// CDN 视频消息：XML 中含 `<msg>` 与 cdnvideourl
pub fn is_cdn_video(xml: &str) -> bool {
    xml.contains("<msg>") && xml.to_lowercase().contains("cdnvideourl")
}

pub struct MessageForwarder {
    config: Arc<ConfigManager>,
    /// 临时目录与转码工具，启用插件时按配置重建
    media: RwLock<ThumbnailExtractor>,
}

/// 按 `[forwarder]` 中的 temp_dir 与 ffmpeg_path 构造
fn build_media(section: &ForwarderSection) -> ForwardResult<ThumbnailExtractor> {
    let scratch = ScratchDir::ensure(
        section
            .temp_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_TEMP_DIR)),
    )?;
    Ok(ThumbnailExtractor::new(section.ffmpeg_path.clone(), scratch))
}

impl MessageForwarder {
    pub async fn new(config: Arc<ConfigManager>) -> ForwardResult<Self> {
        let media = build_media(&config.get().await.forwarder)?;
        Ok(Self::with_media(config, media))
    }

    pub fn with_media(config: Arc<ConfigManager>, media: ThumbnailExtractor) -> Self {
        Self {
            config,
            media: RwLock::new(media),
        }
    }

    /// 当前使用的临时目录与转码工具
    pub async fn media(&self) -> ThumbnailExtractor {
        self.media.read().await.clone()
    }

    /// 按消息类型分发
    pub async fn handle(&self, api: &dyn WechatApi, message: &InboundMessage) {
        let cfg = self.config.forwarder().await;
        match message {
            InboundMessage::Text { envelope, content } => {
                self.handle_text(api, &cfg, envelope, content).await
            }
            InboundMessage::Image { envelope, data } => {
                self.handle_image(api, &cfg, envelope, data.as_deref()).await
            }
            InboundMessage::Video {
                envelope,
                data,
                xml,
            } => {
                self.handle_video(api, &cfg, envelope, data.as_deref(), xml.as_deref())
                    .await
            }
            InboundMessage::Card { envelope, xml } => {
                self.handle_card(api, &cfg, envelope, xml).await
            }
            InboundMessage::Other { envelope } => {
                debug!("收到其他类型消息: MsgType={}", envelope.msg_type_display());
            }
        }
    }

    pub async fn handle_text(
        &self,
        api: &dyn WechatApi,
        cfg: &ForwarderConfig,
        envelope: &Envelope,
        content: &str,
    ) {
        if content.is_empty() {
            debug!("文本消息内容为空，跳过转发");
            return;
        }
        forward(envelope, cfg, |to| async move {
            api.send_text(&to, content).await
        })
        .await;
    }

    pub async fn handle_image(
        &self,
        api: &dyn WechatApi,
        cfg: &ForwarderConfig,
        envelope: &Envelope,
        data: Option<&str>,
    ) {
        let Some(data) = data else {
            warn!("图片消息缺少Base64内容，无法转发。");
            return;
        };

        let outcome = forward(envelope, cfg, |to| async move {
            api.send_image(&to, data).await
        })
        .await;
        if outcome == ForwardOutcome::Sent {
            success!("图片消息转发成功 (使用Base64)");
        }
    }

    pub async fn handle_video(
        &self,
        api: &dyn WechatApi,
        cfg: &ForwarderConfig,
        envelope: &Envelope,
        data: Option<&str>,
        xml: Option<&str>,
    ) {
        if let Some(xml) = xml.filter(|x| is_cdn_video(x)) {
            info!("检测到 CDN 视频消息，尝试直接转发");
            let outcome = forward(envelope, cfg, |to| async move {
                api.send_cdn_video(&to, xml).await
            })
            .await;
            // 宿主调用失败已在 forward 中记录，不再走 Base64 方式
            if outcome == ForwardOutcome::Sent {
                success!("CDN 视频消息转发成功");
            }
            return;
        }

        self.forward_video_base64(api, cfg, envelope, data).await;
    }

    async fn forward_video_base64(
        &self,
        api: &dyn WechatApi,
        cfg: &ForwarderConfig,
        envelope: &Envelope,
        data: Option<&str>,
    ) {
        let Some(data) = data else {
            warn!("视频消息缺少Base64内容，无法转发。");
            return;
        };

        info!("开始处理视频消息，Base64数据长度: {}", data.len());

        // video_file 离开作用域时删除临时视频
        let media = self.media().await;
        let video_file = match media.scratch().save_base64(data, ".mp4").await {
            Ok(f) => f,
            Err(e) => {
                error!("保存视频Base64数据到临时文件失败: {}", e);
                return;
            }
        };
        info!("视频文件已保存到: {}", video_file.path().display());

        let thumbnail = media.extract_first_frame(video_file.path()).await;
        let has_thumbnail = thumbnail.is_some();
        let thumbnail = thumbnail.as_deref().unwrap_or(NO_THUMBNAIL);

        let outcome = forward(envelope, cfg, |to| async move {
            api.send_video(&to, data, thumbnail).await
        })
        .await;

        if outcome == ForwardOutcome::Sent {
            if has_thumbnail {
                success!("视频消息转发成功 (带缩略图)");
            } else {
                success!("视频消息转发成功 (无缩略图)");
            }
        }
    }

    pub async fn handle_card(
        &self,
        api: &dyn WechatApi,
        cfg: &ForwarderConfig,
        envelope: &Envelope,
        xml: &str,
    ) {
        if xml.is_empty() {
            warn!(target: "Card", "名片消息缺少XML内容，无法转发。");
            return;
        }

        let Some(card) = parse_card(xml) else {
            warn!(target: "Card", "无法解析名片XML内容，跳过转发。");
            return;
        };

        let card_ref = &card;
        let outcome = forward(envelope, cfg, |to| async move {
            api.share_card(&to, card_ref).await
        })
        .await;

        if outcome == ForwardOutcome::Sent {
            success!(
                target: "Card",
                "名片消息转发成功: {} ({})",
                card.nickname,
                card.wxid
            );
        }
    }
}

#[async_trait]
impl Plugin for MessageForwarder {
    fn id(&self) -> &str {
        "message_forwarder"
    }

    fn name(&self) -> &str {
        "MessageForwarder"
    }

    fn description(&self) -> &str {
        "消息转发插件"
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn priority(&self) -> i32 {
        10
    }

    async fn on_enable(&self) -> ForwardResult<()> {
        let cfg = self.config.reload().await?;
        if let Some(level) = Level::parse(&cfg.log.level) {
            log::set_level(level);
        }
        let media = build_media(&cfg.forwarder)?;
        debug!(
            "临时目录: {}, 转码工具: {}",
            media.scratch().path().display(),
            media.program()
        );
        *self.media.write().await = media;
        Ok(())
    }

    async fn on_message(&self, api: &dyn WechatApi, message: RawMessage) -> EventResult {
        let message = InboundMessage::from_raw(message);
        self.handle(api, &message).await;
        EventResult::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ListenMode;

    fn envelope(from: &str) -> Envelope {
        Envelope {
            msg_type: Some(1),
            from_wxid: from.to_string(),
            sender_wxid: from.to_string(),
            to_wxid: String::new(),
            is_group: false,
        }
    }

    fn config(target: Option<&str>, mode: ListenMode) -> ForwarderConfig {
        ForwarderConfig {
            target_id: target.map(str::to_string),
            listen_mode: mode,
            listen_user_ids: ["wxid_ok".to_string()].into_iter().collect(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn forward_passes_target_to_sender() {
        let cfg = config(Some("wxid_target"), ListenMode::All);
        let mut seen = None;
        let outcome = forward(&envelope("wxid_a"), &cfg, |to| {
            seen = Some(to);
            async { Ok(()) }
        })
        .await;
        assert_eq!(outcome, ForwardOutcome::Sent);
        assert_eq!(seen.as_deref(), Some("wxid_target"));
    }

    #[tokio::test]
    async fn forward_skips_filtered_sources() {
        let cfg = config(Some("wxid_target"), ListenMode::User);
        let mut called = false;
        let outcome = forward(&envelope("wxid_other"), &cfg, |_| {
            called = true;
            async { Ok(()) }
        })
        .await;
        assert_eq!(outcome, ForwardOutcome::Filtered);
        assert!(!called);
    }

    #[tokio::test]
    async fn forward_requires_target() {
        let cfg = config(Some(""), ListenMode::All);
        let mut called = false;
        let outcome = forward(&envelope("wxid_ok"), &cfg, |_| {
            called = true;
            async { Ok(()) }
        })
        .await;
        assert_eq!(outcome, ForwardOutcome::NoTarget);
        assert!(!called);
    }

    #[tokio::test]
    async fn forward_absorbs_send_errors() {
        let cfg = config(Some("wxid_target"), ListenMode::All);
        let outcome = forward(&envelope("wxid_ok"), &cfg, |_| async {
            Err::<(), _>("network down".into())
        })
        .await;
        assert_eq!(outcome, ForwardOutcome::Failed);
    }

    #[test]
    fn detects_cdn_video_xml() {
        assert!(is_cdn_video(
            "<msg><videomsg CDNVideoUrl=\"30570201\" length=\"1\"/></msg>"
        ));
        assert!(!is_cdn_video("<msg><videomsg length=\"1\"/></msg>"));
        assert!(!is_cdn_video("AAAAGGZ0eXBtcDQy"));
    }
}
