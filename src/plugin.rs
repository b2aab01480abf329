use crate::ForwardResult;
use crate::api::WechatApi;
use crate::message::RawMessage;
use async_trait::async_trait;

/// 事件处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventResult {
    /// 继续传递给后续插件
    #[default]
    Continue,
    /// 停止传递（事件已被处理）
    Stop,
}

/// 插件接口
///
/// `on_message` 不返回错误：插件自行记录并吞掉处理过程中的所有失败，
/// 宿主的消息循环不会因为单个插件出错而中断。
#[async_trait]
pub trait Plugin: Send + Sync {
    /// 插件唯一标识
    fn id(&self) -> &str;

    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    fn version(&self) -> &str {
        "0.1.0"
    }

    /// 数字越小越先执行
    fn priority(&self) -> i32 {
        100
    }

    /// 插件启用时调用
    async fn on_enable(&self) -> ForwardResult<()> {
        Ok(())
    }

    /// 插件停用时调用
    async fn on_disable(&self) -> ForwardResult<()> {
        Ok(())
    }

    async fn on_message(&self, api: &dyn WechatApi, message: RawMessage) -> EventResult;
}
