use crate::ForwardResult;
use base64::{Engine as _, engine::general_purpose};
use std::path::{Path, PathBuf};

/// 备用临时目录名（位于系统临时目录下）
const FALLBACK_DIR_NAME: &str = "MessageForwarder_temp";

/// 临时文件守卫，离开作用域时删除文件（包括任务被取消的情况）
#[derive(Debug)]
pub struct TempFile {
    path: PathBuf,
}

impl TempFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if !self.path.exists() {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(target: "Temp", "清理临时文件: {}", self.path.display()),
            Err(e) => error!(
                target: "Temp",
                "清理临时文件失败: {} - {}",
                self.path.display(),
                e
            ),
        }
    }
}

/// 临时文件目录
#[derive(Debug, Clone)]
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    /// 确保目录存在，创建失败时回退到系统临时目录
    pub fn ensure(preferred: impl Into<PathBuf>) -> ForwardResult<Self> {
        let preferred = preferred.into();
        match std::fs::create_dir_all(&preferred) {
            Ok(()) => Ok(Self { path: preferred }),
            Err(e) => {
                error!(
                    target: "Temp",
                    "创建临时目录失败: {} - {}",
                    preferred.display(),
                    e
                );
                let fallback = std::env::temp_dir().join(FALLBACK_DIR_NAME);
                std::fs::create_dir_all(&fallback)?;
                warn!(target: "Temp", "使用备用临时目录: {}", fallback.display());
                Ok(Self { path: fallback })
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 以当前时间（秒）命名文件
    /// 同一秒内的两次调用会得到相同路径
    pub fn timestamped(&self, prefix: &str, extension: &str) -> PathBuf {
        let secs = chrono::Local::now().timestamp();
        self.path.join(format!("{}_{}{}", prefix, secs, extension))
    }

    /// 将 Base64 数据解码后写入临时文件
    /// 解码失败时不会创建任何文件
    pub async fn save_base64(&self, data: &str, extension: &str) -> ForwardResult<TempFile> {
        let bytes = decode_base64(data)?;

        let file = TempFile::new(self.timestamped("temp", extension));
        // 写入失败时 file 被 drop，残留文件随之清理
        tokio::fs::write(file.path(), &bytes).await?;

        debug!(
            target: "Temp",
            "Base64数据成功保存到临时文件: {} ({} 字节)",
            file.path().display(),
            bytes.len()
        );
        Ok(file)
    }
}

/// 解码 Base64，忽略换行等空白字符
pub fn decode_base64(data: &str) -> ForwardResult<Vec<u8>> {
    let cleaned: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    general_purpose::STANDARD
        .decode(cleaned.as_bytes())
        .map_err(|e| format!("Base64 解码失败: {}", e).into())
}

pub fn encode_base64(bytes: &[u8]) -> String {
    general_purpose::STANDARD.encode(bytes)
}
