use image::GrayImage;
use std::io::{Cursor, Write};
use std::process::{Child, Command, Stdio};
use tracing::debug;

use super::{OcrEngine, OcrMode};
use crate::config::OcrConfig;
use crate::utils::{ReportError, ReportResult};

/// 调用本地 tesseract 可执行文件，图片经 stdin 传入，文本从 stdout 读出
pub struct TesseractEngine {
    config: OcrConfig,
}

impl TesseractEngine {
    pub fn new(config: OcrConfig) -> Self {
        Self { config }
    }

    fn build_args(&self, mode: OcrMode) -> Vec<String> {
        let mut args = vec![
            "stdin".to_string(),
            "stdout".to_string(),
            "-l".to_string(),
            self.config.language.clone(),
            "--psm".to_string(),
            mode.psm().to_string(),
        ];
        if let Some(oem) = self.config.oem {
            args.push("--oem".to_string());
            args.push(oem.to_string());
        }
        if let Some(dpi) = self.config.dpi {
            args.push("--dpi".to_string());
            args.push(dpi.to_string());
        }
        args
    }
}

impl OcrEngine for TesseractEngine {
    fn recognize(&self, region: &GrayImage, mode: OcrMode) -> ReportResult<String> {
        let mut png = Vec::new();
        region
            .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .map_err(|e| ReportError::Ocr(format!("区域编码PNG失败: {}", e)))?;

        let args = self.build_args(mode);
        debug!("{} {}", self.config.tesseract_cmd, args.join(" "));

        let mut child = Command::new(&self.config.tesseract_cmd)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ReportError::Ocr(format!("无法启动 {} (是否已安装?): {}", self.config.tesseract_cmd, e)))?;

        // tesseract 读完整张图片后才输出，先写后等不会造成管道死锁
        feed_stdin(&mut child, &png)?;

        let output = child.wait_with_output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ReportError::Ocr(format!("tesseract 执行失败: {}", stderr.trim())));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// 把数据写入子进程 stdin 并关闭管道。写入失败时结束并回收子进程，避免留下僵尸进程
fn feed_stdin(child: &mut Child, data: &[u8]) -> ReportResult<()> {
    let Some(mut stdin) = child.stdin.take() else {
        return Ok(());
    };
    if let Err(e) = stdin.write_all(data) {
        drop(stdin);
        let _ = child.kill();
        let _ = child.wait();
        return Err(ReportError::Ocr(format!("向 tesseract 写入图片失败: {}", e)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn config() -> OcrConfig {
        OcrConfig {
            tesseract_cmd: "tesseract".to_string(),
            language: "eng".to_string(),
            oem: None,
            dpi: None,
        }
    }

    #[test]
    fn test_args_follow_mode() {
        let engine = TesseractEngine::new(config());
        assert_eq!(
            engine.build_args(OcrMode::Block),
            vec!["stdin", "stdout", "-l", "eng", "--psm", "6"]
        );
        assert_eq!(engine.build_args(OcrMode::Line)[5], "7");
    }

    #[test]
    fn test_optional_args() {
        let engine = TesseractEngine::new(OcrConfig {
            oem: Some(1),
            dpi: Some(300),
            ..config()
        });
        let args = engine.build_args(OcrMode::Line);
        assert!(args.ends_with(&[
            "--oem".to_string(),
            "1".to_string(),
            "--dpi".to_string(),
            "300".to_string(),
        ]));
    }

    #[test]
    fn test_missing_binary_is_ocr_error() {
        let engine = TesseractEngine::new(OcrConfig {
            tesseract_cmd: "/nonexistent/bin/tesseract-not-here".to_string(),
            ..config()
        });
        let region = GrayImage::from_pixel(8, 8, Luma([255]));
        let err = engine.recognize(&region, OcrMode::Block).unwrap_err();
        assert!(matches!(err, ReportError::Ocr(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_write_reaps_child() {
        let mut child = Command::new("sh")
            .args(["-c", "exit 3"])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(200));

        let data = vec![0u8; 4 * 1024 * 1024];
        let err = feed_stdin(&mut child, &data).unwrap_err();
        assert!(matches!(err, ReportError::Ocr(_)));
        assert!(child.stdin.is_none());
        // 已被回收时 try_wait 直接返回记录的退出状态
        assert!(child.try_wait().unwrap().is_some());
    }

    #[cfg(unix)]
    #[test]
    fn test_feed_without_stdin_is_noop() {
        let mut child = Command::new("true").stdin(Stdio::null()).spawn().unwrap();
        assert!(feed_stdin(&mut child, b"png").is_ok());
        child.wait().unwrap();
    }
}
