use reqwest::{Client, StatusCode};
use tracing::{info, warn};
use std::time::Duration;

use crate::config::FetchConfig;
use crate::utils::{ReportError, ReportResult};

/// 下载远程报告图片
pub struct ImageFetcher {
    client: Client,
    max_retries: u32,
}

impl ImageFetcher {
    pub fn new(config: &FetchConfig) -> ReportResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.as_str())
            .build()?;

        Ok(Self {
            client,
            max_retries: config.max_retries.max(1),
        })
    }

    /// 下载图片字节。网络错误、429 和 5xx 会重试，其余错误状态直接返回。
    pub async fn fetch(&self, url: &str) -> ReportResult<Vec<u8>> {
        info!("下载图片: {}", url);

        let mut last_error = None;
        for attempt in 1..=self.max_retries {
            if attempt > 1 {
                let delay = Duration::from_millis(500 * 2u64.pow(attempt - 1));
                info!("等待 {}ms 后重试 (第 {}/{} 次)", delay.as_millis(), attempt, self.max_retries);
                tokio::time::sleep(delay).await;
            }

            let response = match self.client.get(url).send().await {
                Ok(resp) => resp,
                Err(e) => {
                    warn!("请求失败 (第 {}/{} 次): {}", attempt, self.max_retries, e);
                    last_error = Some(e);
                    continue;
                }
            };

            let status = response.status();
            if is_retryable(status) && attempt < self.max_retries {
                warn!("服务端返回 {} (第 {}/{} 次)", status, attempt, self.max_retries);
                continue;
            }

            let bytes = response.error_for_status()?.bytes().await?;
            info!("图片下载完成: {} 字节", bytes.len());
            return Ok(bytes.to_vec());
        }

        match last_error {
            Some(e) => Err(e.into()),
            None => Err(ReportError::Download(url.to_string())),
        }
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// 从 URL 路径取文件名，用于日志和错误信息
pub fn source_name(url: &str) -> String {
    url.split(['?', '#'])
        .next()
        .and_then(|path| path.rsplit('/').next())
        .filter(|name| !name.is_empty())
        .unwrap_or(url)
        .to_string()
}
