use crate::ForwardResult;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

/// 配置文件整体结构
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub log: LogConfig,
    /// 宿主 API 客户端连接信息
    #[serde(default)]
    pub bot: BotConfig,
    /// 转发目标
    #[serde(default)]
    pub forwarder: ForwarderSection,
    /// 监听源
    #[serde(default)]
    pub listen_source: ListenSourceSection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BotConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// 机器人自身 wxid，调用 ShareCard 时必需
    #[serde(default)]
    pub wxid: String,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    9000
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            wxid: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ForwarderSection {
    #[serde(default = "default_target_type")]
    pub target_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_user_wxid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_group_wxid: Option<String>,
    /// 临时文件目录，默认为工作目录下的 temp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_dir: Option<PathBuf>,
    /// 转码工具路径
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg_path: String,
}

fn default_target_type() -> String {
    "user".to_string()
}

fn default_ffmpeg() -> String {
    "ffmpeg".to_string()
}

impl Default for ForwarderSection {
    fn default() -> Self {
        Self {
            target_type: default_target_type(),
            target_user_wxid: None,
            target_group_wxid: None,
            temp_dir: None,
            ffmpeg_path: default_ffmpeg(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListenSourceSection {
    #[serde(default = "default_listen_type")]
    pub listen_type: String,
    #[serde(default)]
    pub listen_user_wxids: Vec<String>,
    #[serde(default)]
    pub listen_group_wxids: Vec<String>,
}

fn default_listen_type() -> String {
    "all".to_string()
}

impl Default for ListenSourceSection {
    fn default() -> Self {
        Self {
            listen_type: default_listen_type(),
            listen_user_wxids: Vec::new(),
            listen_group_wxids: Vec::new(),
        }
    }
}

// ============================================================================
// 解析后的转发配置
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetType {
    User,
    Group,
    Unknown(String),
}

impl TargetType {
    pub fn parse(s: &str) -> Self {
        match s {
            "user" => TargetType::User,
            "group" => TargetType::Group,
            other => TargetType::Unknown(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenMode {
    All,
    User,
    Group,
    Unknown(String),
}

impl ListenMode {
    pub fn parse(s: &str) -> Self {
        match s {
            "all" => ListenMode::All,
            "user" => ListenMode::User,
            "group" => ListenMode::Group,
            other => ListenMode::Unknown(other.to_string()),
        }
    }
}

/// 过滤与转发使用的只读配置快照
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwarderConfig {
    pub target_type: TargetType,
    pub target_id: Option<String>,
    pub listen_mode: ListenMode,
    pub listen_user_ids: HashSet<String>,
    pub listen_group_ids: HashSet<String>,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            target_type: TargetType::User,
            target_id: None,
            listen_mode: ListenMode::All,
            listen_user_ids: HashSet::new(),
            listen_group_ids: HashSet::new(),
        }
    }
}

impl ForwarderConfig {
    /// 有效的目标 ID，空字符串视为未配置
    pub fn target(&self) -> Option<&str> {
        self.target_id.as_deref().filter(|s| !s.is_empty())
    }
}

impl AppConfig {
    pub fn forwarder_config(&self) -> ForwarderConfig {
        let target_type = TargetType::parse(&self.forwarder.target_type);
        let target_id = match target_type {
            TargetType::User => self.forwarder.target_user_wxid.clone(),
            TargetType::Group => self.forwarder.target_group_wxid.clone(),
            TargetType::Unknown(_) => None,
        };

        ForwarderConfig {
            target_type,
            target_id,
            listen_mode: ListenMode::parse(&self.listen_source.listen_type),
            listen_user_ids: self.listen_source.listen_user_wxids.iter().cloned().collect(),
            listen_group_ids: self.listen_source.listen_group_wxids.iter().cloned().collect(),
        }
    }
}

// ============================================================================
// 配置管理器
// ============================================================================

pub struct ConfigManager {
    path: PathBuf,
    config: RwLock<AppConfig>,
}

impl ConfigManager {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            config: RwLock::new(AppConfig::default()),
        }
    }

    /// 以给定配置构造，不关联磁盘文件内容
    pub fn with_config<P: AsRef<Path>>(path: P, config: AppConfig) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            config: RwLock::new(config),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 加载配置。文件不存在时记录警告并使用默认值（转发目标为空）
    pub async fn load(&self) -> ForwardResult<AppConfig> {
        let cfg = if tokio::fs::try_exists(&self.path).await? {
            let content = tokio::fs::read_to_string(&self.path).await?;
            toml::from_str::<AppConfig>(&content)
                .map_err(|e| format!("配置文件 {} 解析失败: {}", self.path.display(), e))?
        } else {
            warn!(
                target: "Config",
                "配置文件 {} 不存在，请检查配置。转发目标未设置",
                self.path.display()
            );
            AppConfig::default()
        };

        let fwd = cfg.forwarder_config();
        info!(
            target: "Config",
            "转发配置加载成功，目标类型: {:?}, 目标WXID: {:?}",
            fwd.target_type,
            fwd.target_id
        );
        info!(
            target: "Config",
            "监听源配置加载成功，监听类型: {:?}, 监听用户: {:?}, 监听群聊: {:?}",
            fwd.listen_mode,
            cfg.listen_source.listen_user_wxids,
            cfg.listen_source.listen_group_wxids
        );

        *self.config.write().await = cfg.clone();
        Ok(cfg)
    }

    /// 重新加载配置（插件启用时调用）
    pub async fn reload(&self) -> ForwardResult<AppConfig> {
        self.load().await
    }

    /// 获取当前配置（只读副本）
    pub async fn get(&self) -> AppConfig {
        self.config.read().await.clone()
    }

    /// 获取当前转发配置快照
    pub async fn forwarder(&self) -> ForwarderConfig {
        self.config.read().await.forwarder_config()
    }

    /// 原子写入默认配置模板（写临时文件 -> Rename 覆盖）
    pub async fn write_default(&self) -> ForwardResult<()> {
        let cfg = AppConfig::default();
        let content = toml::to_string_pretty(&cfg)?;
        let path = self.path.clone();
        let tmp_path = self.path.with_extension("tmp");

        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)?;
            }

            let mut file = std::fs::File::create(&tmp_path)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
            std::fs::rename(&tmp_path, &path)?;
            Ok(())
        })
        .await??;

        *self.config.write().await = cfg;
        Ok(())
    }
}
