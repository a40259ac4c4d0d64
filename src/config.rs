use std::path::Path;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;

use crate::error::{AppError, AppResult};

/// 默认时间戳格式，源文件解析和快照编码共用
pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// 配对策略
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PairingStrategy {
    /// 单次扫描：索引问题，缓存先于问题出现的答案
    #[default]
    SinglePass,
    /// 两次完整扫描源文件
    TwoPass,
}

/// 程序配置文件
#[derive(Clone, Debug, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// 只保留此时间之后创建的帖子
    pub cutoff_date: String,
    /// 源数据文件（Posts.xml）
    pub source_path: String,
    /// 预计记录数（仅用于进度显示）
    pub expected_record_count: u64,
    /// 时间戳格式
    pub timestamp_format: String,
    /// 配对结果检查点
    pub snapshot_path: String,
    /// 最终输出文件
    pub output_path: String,
    /// 输出文件非空时是否允许覆盖
    pub overwrite_output: bool,
    /// 生成失败时是否保存部分结果
    pub persist_partial: bool,
    /// 必须包含的标签
    pub required_tags: Vec<String>,
    /// 随机抽样数量
    pub sample_size: Option<usize>,
    /// 抽样随机种子
    pub sample_seed: Option<u64>,
    pub pairing_strategy: PairingStrategy,
    // --- 生成服务配置 ---
    pub generation_prompt: String,
    pub generation_model: String,
    pub api_key: String,
    pub api_base_url: String,
    /// 同时进行的生成请求数量
    pub concurrency: usize,
    /// 单次请求超时（秒），不设置则不限
    pub request_timeout_secs: Option<u64>,
    /// 失败后的最大重试次数
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cutoff_date: "2021-09-30".to_string(),
            source_path: "data/cooking/Posts.xml".to_string(),
            expected_record_count: 0,
            timestamp_format: DEFAULT_TIMESTAMP_FORMAT.to_string(),
            snapshot_path: "raw_pairs.json".to_string(),
            output_path: "pairs.json".to_string(),
            overwrite_output: false,
            persist_partial: true,
            required_tags: Vec::new(),
            sample_size: None,
            sample_seed: None,
            pairing_strategy: PairingStrategy::default(),
            generation_prompt: "you are a helpful AI assistant who helps to answer Stack Exchange \
                                questions. You are given a question and you must answer it."
                .to_string(),
            generation_model: "gpt-3.5-turbo".to_string(),
            api_key: String::new(),
            api_base_url: "https://api.openai.com/v1".to_string(),
            concurrency: 1,
            request_timeout_secs: None,
            max_retries: 0,
            retry_backoff_ms: 500,
        }
    }
}

impl Config {
    /// 从 TOML 文件加载配置，再用环境变量覆盖
    pub fn load(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let config = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|e| AppError::io(path, e))?;
            Self::from_toml_str(&content)?
        } else {
            tracing::warn!("⚠️ 配置文件 {} 不存在，使用默认配置", path.display());
            Self::default()
        };
        let config = config.with_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> AppResult<Self> {
        toml::from_str(content).map_err(|e| AppError::Config(e.to_string()))
    }

    /// 环境变量覆盖（变量名为配置项的大写下划线形式）
    pub fn with_env_overrides(self) -> AppResult<Self> {
        let mut config = self;
        override_string("CUTOFF_DATE", &mut config.cutoff_date);
        override_string("SOURCE_PATH", &mut config.source_path);
        override_parsed("EXPECTED_RECORD_COUNT", &mut config.expected_record_count)?;
        override_string("TIMESTAMP_FORMAT", &mut config.timestamp_format);
        override_string("SNAPSHOT_PATH", &mut config.snapshot_path);
        override_string("OUTPUT_PATH", &mut config.output_path);
        override_parsed("OVERWRITE_OUTPUT", &mut config.overwrite_output)?;
        override_parsed("PERSIST_PARTIAL", &mut config.persist_partial)?;
        if let Ok(tags) = std::env::var("REQUIRED_TAGS") {
            config.required_tags = tags
                .split(',')
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect();
        }
        if let Ok(value) = std::env::var("SAMPLE_SIZE") {
            config.sample_size = Some(parse_env("SAMPLE_SIZE", &value)?);
        }
        if let Ok(value) = std::env::var("SAMPLE_SEED") {
            config.sample_seed = Some(parse_env("SAMPLE_SEED", &value)?);
        }
        override_string("GENERATION_PROMPT", &mut config.generation_prompt);
        override_string("GENERATION_MODEL", &mut config.generation_model);
        override_string("API_KEY", &mut config.api_key);
        override_string("API_BASE_URL", &mut config.api_base_url);
        override_parsed("CONCURRENCY", &mut config.concurrency)?;
        if let Ok(value) = std::env::var("REQUEST_TIMEOUT_SECS") {
            config.request_timeout_secs = Some(parse_env("REQUEST_TIMEOUT_SECS", &value)?);
        }
        override_parsed("MAX_RETRIES", &mut config.max_retries)?;
        override_parsed("RETRY_BACKOFF_MS", &mut config.retry_backoff_ms)?;
        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.concurrency == 0 {
            return Err(AppError::Config("concurrency 必须至少为 1".to_string()));
        }
        if self.timestamp_format.trim().is_empty() {
            return Err(AppError::Config("timestampFormat 不能为空".to_string()));
        }
        self.cutoff()?;
        Ok(())
    }

    /// 截止时间，接受完整时间戳或 `YYYY-MM-DD`
    pub fn cutoff(&self) -> AppResult<NaiveDateTime> {
        let raw = self.cutoff_date.trim();
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, &self.timestamp_format) {
            return Ok(ts);
        }
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .ok_or_else(|| AppError::format("cutoffDate", raw, "不是有效的日期"))
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// 生成失败时保存部分结果的路径
    pub fn partial_output_path(&self) -> String {
        match self.output_path.strip_suffix(".json") {
            Some(stem) => format!("{stem}.partial.json"),
            None => format!("{}.partial.json", self.output_path),
        }
    }
}

fn override_string(var_name: &str, target: &mut String) {
    if let Ok(value) = std::env::var(var_name) {
        *target = value;
    }
}

fn override_parsed<T: std::str::FromStr>(var_name: &str, target: &mut T) -> AppResult<()> {
    if let Ok(value) = std::env::var(var_name) {
        *target = parse_env(var_name, &value)?;
    }
    Ok(())
}

fn parse_env<T: std::str::FromStr>(var_name: &str, value: &str) -> AppResult<T> {
    value.trim().parse().map_err(|_| {
        AppError::Config(format!(
            "环境变量 {} 解析失败: 值 '{}' 无法转换为 {}",
            var_name,
            value,
            std::any::type_name::<T>()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_toml_camel_case_keys() {
        let config = Config::from_toml_str(
            r#"
            cutoffDate = "2021-09-30T00:00:00"
            sourcePath = "data/cooking/Posts.xml"
            expectedRecordCount = 88706
            concurrency = 16
            requiredTags = ["bread"]
            sampleSize = 50
            pairingStrategy = "twoPass"
            requestTimeoutSecs = 120
            "#,
        )
        .unwrap();

        assert_eq!(config.expected_record_count, 88706);
        assert_eq!(config.concurrency, 16);
        assert_eq!(config.required_tags, vec!["bread".to_string()]);
        assert_eq!(config.sample_size, Some(50));
        assert_eq!(config.pairing_strategy, PairingStrategy::TwoPass);
        assert_eq!(config.request_timeout(), Some(Duration::from_secs(120)));
        // 未出现的配置项取默认值
        assert_eq!(config.timestamp_format, DEFAULT_TIMESTAMP_FORMAT);
        assert_eq!(config.max_retries, 0);
    }

    #[test]
    fn test_cutoff_accepts_timestamp_and_plain_date() {
        let mut config = Config::default();
        config.cutoff_date = "2021-09-30".to_string();
        let plain = config.cutoff().unwrap();
        config.cutoff_date = "2021-09-30T00:00:00.000".to_string();
        let full = config.cutoff().unwrap();
        assert_eq!(plain, full);

        config.cutoff_date = "yesterday".to_string();
        assert!(matches!(config.cutoff(), Err(AppError::Format { .. })));
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let config = Config {
            concurrency: 0,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(AppError::Config(_))));
    }

    #[test]
    fn test_partial_output_path() {
        let config = Config {
            output_path: "out/pairs.json".to_string(),
            ..Config::default()
        };
        assert_eq!(config.partial_output_path(), "out/pairs.partial.json");
    }
}
