//! 最小宿主：按优先级调用插件，并从逐行 JSON 输入中读取消息

use crate::ForwardResult;
use crate::api::WechatApi;
use crate::message::RawMessage;
use crate::plugin::{EventResult, Plugin};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::task::JoinSet;

pub struct PluginHost {
    plugins: Vec<Arc<dyn Plugin>>,
    api: Arc<dyn WechatApi>,
}

impl PluginHost {
    pub fn new(api: Arc<dyn WechatApi>) -> Self {
        Self {
            plugins: Vec::new(),
            api,
        }
    }

    pub fn plugin(mut self, plugin: impl Plugin + 'static) -> Self {
        self.plugins.push(Arc::new(plugin));
        self.plugins.sort_by_key(|p| p.priority());
        self
    }

    pub fn plugins(&self) -> &[Arc<dyn Plugin>] {
        &self.plugins
    }

    /// 启用全部插件，单个插件失败不影响其他插件
    pub async fn enable_all(&self) {
        for plugin in &self.plugins {
            match plugin.on_enable().await {
                Ok(()) => info!(
                    target: "Host",
                    "插件 {} v{} 已启用",
                    plugin.name(),
                    plugin.version()
                ),
                Err(e) => error!(target: "Host", "插件 {} 启用失败: {}", plugin.name(), e),
            }
        }
    }

    pub async fn disable_all(&self) {
        for plugin in &self.plugins {
            if let Err(e) = plugin.on_disable().await {
                error!(target: "Host", "插件 {} 停用失败: {}", plugin.name(), e);
            }
        }
    }

    /// 依次交给各插件处理，直到某个插件返回 Stop
    pub async fn dispatch(&self, message: RawMessage) {
        for plugin in &self.plugins {
            if plugin.on_message(self.api.as_ref(), message.clone()).await == EventResult::Stop {
                debug!(target: "Host", "插件 {} 拦截了消息", plugin.name());
                break;
            }
        }
    }

    /// 逐行读取 JSON 消息记录，每条消息在独立任务中处理
    /// 读到 `/exit` 或输入结束时返回，返回值为已分发的消息数
    pub async fn run_lines<R>(self: Arc<Self>, reader: R) -> ForwardResult<usize>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = reader.lines();
        let mut tasks = JoinSet::new();
        let mut dispatched = 0usize;

        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if line == "/exit" {
                break;
            }

            let message = match RawMessage::from_json(line) {
                Ok(m) => m,
                Err(e) => {
                    warn!(target: "Host", "无法解析消息记录: {}", e);
                    continue;
                }
            };

            dispatched += 1;
            let host = self.clone();
            tasks.spawn(async move { host.dispatch(message).await });
        }

        while let Some(res) = tasks.join_next().await {
            if let Err(e) = res {
                error!(target: "Host", "消息处理任务异常退出: {}", e);
            }
        }

        Ok(dispatched)
    }
}
