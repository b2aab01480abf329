//! 宿主 API 客户端
//!
//! [`WechatApi`] 是转发插件依赖的发送接口；[`WechatClient`] 通过宿主暴露的
//! HTTP 接口实现它。测试中可以用内存实现替换。

use crate::ForwardResult;
use crate::card::Card;
use crate::config::BotConfig;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use url::Url;

#[async_trait]
pub trait WechatApi: Send + Sync {
    /// 发送文本消息
    async fn send_text(&self, to_wxid: &str, content: &str) -> ForwardResult<()>;

    /// 发送 Base64 图片
    async fn send_image(&self, to_wxid: &str, image: &str) -> ForwardResult<()>;

    /// 发送 Base64 视频，`thumbnail` 为 Base64 封面或字面量 "None"
    async fn send_video(&self, to_wxid: &str, video: &str, thumbnail: &str) -> ForwardResult<()>;

    /// 通过 CDN XML 转发视频，无需重新上传
    async fn send_cdn_video(&self, to_wxid: &str, xml: &str) -> ForwardResult<()>;

    /// 分享名片
    async fn share_card(&self, to_wxid: &str, card: &Card) -> ForwardResult<()>;
}

/// 宿主接口的通用响应
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ApiResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: Option<String>,
}

/// 基于 HTTP 的客户端，请求 `http://{host}:{port}/api/...`
#[derive(Debug, Clone)]
pub struct WechatClient {
    client: reqwest::Client,
    base: Url,
    wxid: String,
}

impl WechatClient {
    pub fn new(base: &str, wxid: impl Into<String>) -> ForwardResult<Self> {
        let mut base = Url::parse(base)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self {
            client: reqwest::Client::new(),
            base,
            wxid: wxid.into(),
        })
    }

    pub fn from_config(cfg: &BotConfig) -> ForwardResult<Self> {
        Self::new(&format!("http://{}:{}/api/", cfg.host, cfg.port), &cfg.wxid)
    }

    /// 机器人自身 wxid
    pub fn wxid(&self) -> &str {
        &self.wxid
    }

    fn endpoint(&self, action: &str) -> ForwardResult<Url> {
        Ok(self.base.join(action)?)
    }

    /// 调用接口，`Success` 为 false 时返回错误
    async fn call_api(&self, action: &str, params: Value) -> ForwardResult<()> {
        if self.wxid.is_empty() {
            return Err("Bot未登录".into());
        }

        let url = self.endpoint(action)?;
        debug!(target: "Api", "调用 {} 接口", url);

        let resp: ApiResponse = self
            .client
            .post(url)
            .json(&params)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if resp.success {
            Ok(())
        } else {
            let msg = resp.message.unwrap_or_else(|| "未知错误".to_string());
            Err(format!("{} 调用失败: {}", action, msg).into())
        }
    }
}

#[async_trait]
impl WechatApi for WechatClient {
    async fn send_text(&self, to_wxid: &str, content: &str) -> ForwardResult<()> {
        self.call_api(
            "Msg/SendTxt",
            json!({
                "Wxid": self.wxid,
                "ToWxid": to_wxid,
                "Content": content,
                "Type": 1,
                "At": "",
            }),
        )
        .await
    }

    async fn send_image(&self, to_wxid: &str, image: &str) -> ForwardResult<()> {
        self.call_api(
            "Msg/UploadImg",
            json!({
                "Wxid": self.wxid,
                "ToWxid": to_wxid,
                "Base64": image,
            }),
        )
        .await
    }

    async fn send_video(&self, to_wxid: &str, video: &str, thumbnail: &str) -> ForwardResult<()> {
        self.call_api(
            "Msg/SendVideo",
            json!({
                "Wxid": self.wxid,
                "ToWxid": to_wxid,
                "Base64": video,
                "ImageBase64": thumbnail,
            }),
        )
        .await
    }

    async fn send_cdn_video(&self, to_wxid: &str, xml: &str) -> ForwardResult<()> {
        self.call_api(
            "Msg/SendCDNVideo",
            json!({
                "Wxid": self.wxid,
                "ToWxid": to_wxid,
                "Content": xml,
            }),
        )
        .await
    }

    async fn share_card(&self, to_wxid: &str, card: &Card) -> ForwardResult<()> {
        self.call_api(
            "Msg/ShareCard",
            json!({
                "Wxid": self.wxid,
                "ToWxid": to_wxid,
                "CardWxId": card.wxid,
                "CardNickName": card.nickname,
                "CardAlias": card.alias,
            }),
        )
        .await?;
        info!(
            target: "Api",
            "ShareCard 调用成功: 对方wxid:{} 名片wxid:{} 名片昵称:{}",
            to_wxid,
            card.wxid,
            card.nickname
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn card() -> Card {
        Card {
            wxid: "wxid_card".into(),
            nickname: "Alice".into(),
            alias: "alice01".into(),
        }
    }

    async fn client(server: &MockServer) -> WechatClient {
        WechatClient::new(&format!("{}/api", server.uri()), "wxid_bot").unwrap()
    }

    #[tokio::test]
    async fn share_card_posts_expected_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/Msg/ShareCard"))
            .and(body_partial_json(json!({
                "Wxid": "wxid_bot",
                "ToWxid": "wxid_target",
                "CardWxId": "wxid_card",
                "CardNickName": "Alice",
                "CardAlias": "alice01",
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"Success": true, "Message": ""})),
            )
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .await
            .share_card("wxid_target", &card())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn unsuccessful_response_carries_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/Msg/ShareCard"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"Success": false, "Message": "not friends"})),
            )
            .mount(&server)
            .await;

        let err = client(&server)
            .await
            .share_card("wxid_target", &card())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not friends"));
    }

    #[tokio::test]
    async fn missing_message_defaults_to_unknown_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Success": false})))
            .mount(&server)
            .await;

        let err = client(&server)
            .await
            .send_text("wxid_target", "hi")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("未知错误"));
    }

    #[tokio::test]
    async fn send_text_targets_send_txt() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/Msg/SendTxt"))
            .and(body_partial_json(json!({"ToWxid": "wxid_target", "Content": "hello"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Success": true})))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .await
            .send_text("wxid_target", "hello")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn http_error_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        assert!(
            client(&server)
                .await
                .send_image("wxid_target", "QUJD")
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn requires_bot_wxid() {
        let client = WechatClient::new("http://127.0.0.1:9/api", "").unwrap();
        let err = client.share_card("wxid_target", &card()).await.unwrap_err();
        assert!(err.to_string().contains("Bot未登录"));
    }

    #[test]
    fn builds_endpoint_from_config() {
        let cfg = BotConfig {
            host: "10.0.0.2".into(),
            port: 9011,
            wxid: "wxid_bot".into(),
        };
        let client = WechatClient::from_config(&cfg).unwrap();
        assert_eq!(
            client.endpoint("Msg/ShareCard").unwrap().as_str(),
            "http://10.0.0.2:9011/api/Msg/ShareCard"
        );
    }
}
