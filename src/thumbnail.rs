use crate::temp::{ScratchDir, TempFile, encode_base64};
use std::path::Path;
use tokio::process::Command;

/// 视频封面提取器，调用外部转码工具截取 1 秒处的一帧
#[derive(Debug, Clone)]
pub struct ThumbnailExtractor {
    program: String,
    scratch: ScratchDir,
}

impl ThumbnailExtractor {
    pub fn new(program: impl Into<String>, scratch: ScratchDir) -> Self {
        Self {
            program: program.into(),
            scratch,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn scratch(&self) -> &ScratchDir {
        &self.scratch
    }

    /// 提取首帧并返回 Base64 编码的图片
    /// 任何失败（启动失败、非零退出码、输出缺失或为空）都返回 None
    pub async fn extract_first_frame(&self, video_path: &Path) -> Option<String> {
        // 守卫在所有返回路径上清理缩略图文件
        let thumbnail = TempFile::new(self.scratch.timestamped("temp_thumbnail", ".jpg"));

        debug!(
            target: "Thumbnail",
            "执行命令: {} -i {} -ss 00:00:01 -vframes 1 {} -y",
            self.program,
            video_path.display(),
            thumbnail.path().display()
        );

        let output = match Command::new(&self.program)
            .arg("-i")
            .arg(video_path)
            .args(["-ss", "00:00:01", "-vframes", "1"])
            .arg(thumbnail.path())
            .arg("-y")
            .kill_on_drop(true)
            .output()
            .await
        {
            Ok(o) => o,
            Err(e) => {
                error!(
                    target: "Thumbnail",
                    "提取视频首帧失败: {} - {}",
                    video_path.display(),
                    e
                );
                return None;
            }
        };

        if !output.status.success() {
            error!(
                target: "Thumbnail",
                "提取封面失败 (返回码: {:?}): {}",
                output.status.code(),
                String::from_utf8_lossy(&output.stderr).trim()
            );
            return None;
        }

        let bytes = match tokio::fs::read(thumbnail.path()).await {
            Ok(b) if !b.is_empty() => b,
            _ => {
                error!(
                    target: "Thumbnail",
                    "缩略图文件不存在或为空: {}",
                    thumbnail.path().display()
                );
                return None;
            }
        };

        info!(target: "Thumbnail", "成功生成视频缩略图，大小: {} 字节", bytes.len());
        Some(encode_base64(&bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch() -> (tempfile::TempDir, ScratchDir) {
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchDir::ensure(dir.path()).unwrap();
        (dir, scratch)
    }

    #[tokio::test]
    async fn missing_program_yields_no_thumbnail() {
        let (_dir, scratch) = scratch();
        let extractor = ThumbnailExtractor::new("/nonexistent/transcoder-binary", scratch);
        let video = extractor.scratch.path().join("video.mp4");
        assert!(extractor.extract_first_frame(&video).await.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_yields_no_thumbnail() {
        let (_dir, scratch) = scratch();
        let extractor = ThumbnailExtractor::new("false", scratch.clone());
        let video = scratch.path().join("video.mp4");
        assert!(extractor.extract_first_frame(&video).await.is_none());
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn success_without_output_yields_no_thumbnail() {
        let (_dir, scratch) = scratch();
        // `true` 忽略参数并以 0 退出，但不会生成输出文件
        let extractor = ThumbnailExtractor::new("true", scratch);
        let video = extractor.scratch.path().join("video.mp4");
        assert!(extractor.extract_first_frame(&video).await.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn encodes_produced_frame_and_cleans_up() {
        use std::os::unix::fs::PermissionsExt;

        let (dir, scratch) = scratch();
        // 模拟转码工具：把固定内容写到倒数第二个参数（输出路径）
        let script = dir.path().join("fake-ffmpeg.sh");
        std::fs::write(
            &script,
            "#!/bin/sh\nfor a in \"$@\"; do prev=\"$last\"; last=\"$a\"; done\nprintf 'JPEG' > \"$prev\"\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let work = scratch.path().join("work");
        std::fs::create_dir(&work).unwrap();
        let extractor = ThumbnailExtractor::new(
            script.to_string_lossy().into_owned(),
            ScratchDir::ensure(&work).unwrap(),
        );

        let thumb = extractor
            .extract_first_frame(&scratch.path().join("video.mp4"))
            .await;
        assert_eq!(thumb.as_deref(), Some(encode_base64(b"JPEG").as_str()));
        assert_eq!(std::fs::read_dir(&work).unwrap().count(), 0);
    }
}
