use anyhow::anyhow;
use clap::Parser;
use msg_forwarder::log::{self, Level};
use msg_forwarder::prelude::*;
use msg_forwarder::{error, info};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::BufReader;

/// 消息转发插件
#[derive(Parser, Debug)]
#[command(name = "msg-forwarder", version, about = "消息转发插件")]
struct Args {
    /// 配置文件路径
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// 生成默认配置后退出
    #[arg(long)]
    init: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let manager = Arc::new(ConfigManager::new(&args.config));

    if args.init {
        manager
            .write_default()
            .await
            .map_err(|e| anyhow!("写入默认配置失败: {}", e))?;
        info!("已生成默认配置: {}", args.config.display());
        return Ok(());
    }

    let cfg = manager
        .load()
        .await
        .map_err(|e| anyhow!("加载配置失败: {}", e))?;
    if let Some(level) = Level::parse(&cfg.log.level) {
        log::set_level(level);
    }

    let client = WechatClient::from_config(&cfg.bot).map_err(|e| anyhow!("API 地址无效: {}", e))?;
    let forwarder = MessageForwarder::new(manager.clone())
        .await
        .map_err(|e| anyhow!("初始化转发插件失败: {}", e))?;

    let host = Arc::new(PluginHost::new(Arc::new(client)).plugin(forwarder));
    host.enable_all().await;

    info!("等待消息输入（每行一条 JSON 记录，/exit 退出）");

    let reader = BufReader::new(tokio::io::stdin());
    tokio::select! {
        res = host.clone().run_lines(reader) => match res {
            Ok(count) => info!("输入结束，共处理 {} 条消息", count),
            Err(e) => error!("读取输入错误: {}", e),
        },
        _ = tokio::signal::ctrl_c() => {
            info!("收到退出信号");
        }
    }

    host.disable_all().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_config_path_and_init_flag() {
        let args = Args::try_parse_from(["msg-forwarder", "-c", "/etc/fwd.toml", "--init"]).unwrap();
        assert_eq!(args.config, PathBuf::from("/etc/fwd.toml"));
        assert!(args.init);

        let args = Args::try_parse_from(["msg-forwarder"]).unwrap();
        assert_eq!(args.config, PathBuf::from("config.toml"));
        assert!(!args.init);
    }

    #[test]
    fn rejects_unknown_arguments() {
        assert!(Args::try_parse_from(["msg-forwarder", "--bogus"]).is_err());
        assert!(Args::try_parse_from(["msg-forwarder", "--config"]).is_err());
    }
}
