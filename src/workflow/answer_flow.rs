//! 答案生成流程 - 流程层
//!
//! 核心职责：定义“一个问题”的完整生成流程
//!
//! 流程顺序：
//! 1. 调用生成服务（可选超时）
//! 2. 失败时按配置有限次重试（默认不重试）
//! 3. 可选的展示格式转换

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::RemoteError;
use crate::services::AnswerGenerator;
use crate::utils::truncate_text;
use crate::workflow::answer_ctx::AnswerCtx;

/// 生成文本 → 展示格式
pub type AnswerFormatter = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// 重试策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 首次失败后最多再尝试的次数
    pub max_retries: u32,
    /// 第一次重试前的等待时间，之后每次翻倍
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    fn delay(&self, retry: u32) -> Duration {
        self.backoff
            .saturating_mul(1u32 << retry.saturating_sub(1).min(16))
    }
}

/// 答案生成流程
///
/// - 编排单个问题的生成、超时和重试
/// - 不持有数据集，只返回结果
pub struct AnswerFlow {
    generator: Arc<dyn AnswerGenerator>,
    system_prompt: String,
    timeout: Option<Duration>,
    retry: RetryPolicy,
    formatter: Option<AnswerFormatter>,
}

impl AnswerFlow {
    pub fn new(generator: Arc<dyn AnswerGenerator>, system_prompt: impl Into<String>) -> Self {
        Self {
            generator,
            system_prompt: system_prompt.into(),
            timeout: None,
            retry: RetryPolicy::default(),
            formatter: None,
        }
    }

    /// 按配置创建流程
    pub fn from_config(config: &Config, generator: Arc<dyn AnswerGenerator>) -> Self {
        Self::new(generator, config.generation_prompt.clone())
            .with_timeout(config.request_timeout())
            .with_retry(RetryPolicy {
                max_retries: config.max_retries,
                backoff: config.retry_backoff(),
            })
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_formatter(mut self, formatter: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        self.formatter = Some(Arc::new(formatter));
        self
    }

    /// 为一个问题生成答案
    ///
    /// 无论重试多少次，最终最多只返回一个答案
    pub async fn run(&self, ctx: &AnswerCtx, question_text: &str) -> Result<String, RemoteError> {
        debug!("{} 问题: {}", ctx, truncate_text(question_text, 80));

        let mut retries = 0;
        loop {
            match self.attempt(question_text).await {
                Ok(text) => {
                    info!("{} ✓ 答案生成成功 ({} 字符)", ctx, text.chars().count());
                    return Ok(match &self.formatter {
                        Some(format) => format(&text),
                        None => text,
                    });
                }
                Err(e) if retries < self.retry.max_retries => {
                    retries += 1;
                    let delay = self.retry.delay(retries);
                    warn!(
                        "{} ⚠️ 生成失败: {}，{:?} 后第 {}/{} 次重试",
                        ctx, e, delay, retries, self.retry.max_retries
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    warn!("{} ❌ 生成失败: {}", ctx, e);
                    return Err(e);
                }
            }
        }
    }

    async fn attempt(&self, question_text: &str) -> Result<String, RemoteError> {
        let call = self.generator.generate(&self.system_prompt, question_text);
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| RemoteError::timeout(limit))?,
            None => call.await,
        }
    }
}
