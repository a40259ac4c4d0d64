//! 流水线 - 编排层
//!
//! ## 职责
//!
//! 本模块是整个应用的入口，按顺序串联各个阶段：
//!
//! 1. **配对**：检查点存在时直接载入，否则读取源文件配对并写入检查点
//! 2. **筛选**：按标签筛选，再随机抽样
//! 3. **生成答案**：先检查输出文件可写，再合并上次保存的部分结果，
//!    委托 `EnrichmentEngine` 生成其余答案，失败时按配置保存部分结果
//! 4. **输出**：写入最终结果文件，删除部分结果
//!
//! ## 设计特点
//!
//! - **显式传递**：数据集作为值在阶段之间传递，不使用全局状态
//! - **阶段上下文**：每个阶段的错误都带上阶段名称
//! - **检查点只写一次**：已有检查点不会被覆盖

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::config::Config;
use crate::infrastructure::SnapshotStore;
use crate::models::Dataset;
use crate::orchestrator::enrichment::EnrichmentEngine;
use crate::services::{selection, AnswerGenerator, LlmService, PairingEngine};
use crate::utils::logging;

/// 应用主结构
pub struct App {
    config: Config,
    generator: Arc<dyn AnswerGenerator>,
}

impl App {
    /// 初始化应用，使用配置中的 LLM 服务生成答案
    pub fn initialize(config: Config) -> Result<Self> {
        config.validate().context("配置校验失败")?;
        let generator = Arc::new(LlmService::new(&config));
        Ok(Self::with_generator(config, generator))
    }

    /// 使用指定的生成服务创建应用
    pub fn with_generator(config: Config, generator: Arc<dyn AnswerGenerator>) -> Self {
        Self { config, generator }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// 运行完整流水线，返回写入输出文件的数据集
    pub async fn run(&self) -> Result<Dataset> {
        logging::log_startup(&self.config);

        logging::log_stage("阶段 1/3: 配对");
        let dataset = self
            .load_or_build_dataset()
            .await
            .context("配对阶段失败")?;

        logging::log_stage("阶段 2/3: 筛选");
        let selected = self.select(&dataset);
        if selected.is_empty() {
            warn!("⚠️ 筛选后没有剩余的问答对");
        }

        // 生成前先确认输出文件可写，避免生成的答案无处保存
        let output = self.output_store();
        output
            .ensure_writable(self.config.overwrite_output)
            .context("输出文件检查失败")?;

        logging::log_stage("阶段 3/3: 生成答案");
        let resumed = self.resume_partial(selected).context("载入部分结果失败")?;
        let enriched = self.enrich(resumed).await.context("答案生成阶段失败")?;

        output
            .save(&enriched, self.config.overwrite_output)
            .context("写入输出文件失败")?;
        self.partial_store().remove().context("删除部分结果失败")?;

        logging::print_final_stats(
            enriched.len(),
            enriched.answered_count(),
            &self.config.output_path,
        );
        Ok(enriched)
    }

    /// 载入检查点；不存在时读取源文件配对并写入检查点
    pub async fn load_or_build_dataset(&self) -> Result<Dataset> {
        let checkpoint = self.checkpoint_store();
        if let Some(dataset) = checkpoint.load()? {
            info!(
                "♻️ 检查点 {} 已存在，跳过源文件扫描",
                checkpoint.path().display()
            );
            return Ok(dataset);
        }

        // 读取和配对是同步的，放到阻塞线程上执行
        let engine = PairingEngine::new(&self.config)?;
        let dataset = tokio::task::spawn_blocking(move || engine.run())
            .await
            .context("配对任务异常退出")??;

        checkpoint.save(&dataset, false)?;
        Ok(dataset)
    }

    /// 按配置筛选和抽样
    pub fn select(&self, dataset: &Dataset) -> Dataset {
        let mut selected = if self.config.required_tags.is_empty() {
            dataset.clone()
        } else {
            selection::filter_by_tags(dataset, self.config.required_tags.as_slice())
        };
        if let Some(k) = self.config.sample_size {
            selected = selection::random_sample(&selected, k, self.config.sample_seed);
        }
        info!("✓ 筛选完成: {} → {} 个问答对", dataset.len(), selected.len());
        selected
    }

    /// 把上次失败时保存的答案合并到选中的问答对，已有答案的问题不再请求
    pub fn resume_partial(&self, mut dataset: Dataset) -> Result<Dataset> {
        let partial = self.partial_store();
        let Some(previous) = partial.load()? else {
            return Ok(dataset);
        };

        let mut restored = 0;
        for pair in previous.pairs().filter(|pair| pair.has_generated_answer()) {
            if let Some(target) = dataset.get_mut(pair.id()) {
                if !target.has_generated_answer() {
                    target.generated_answer = pair.generated_answer.clone();
                    restored += 1;
                }
            }
        }
        info!(
            "♻️ 从 {} 恢复 {} 个已生成的答案",
            partial.path().display(),
            restored
        );
        Ok(dataset)
    }

    /// 生成答案；失败时保存部分结果后返回错误
    pub async fn enrich(&self, dataset: Dataset) -> Result<Dataset> {
        let engine = EnrichmentEngine::from_config(&self.config, self.generator.clone());
        let report = engine.enrich(dataset).await;

        if !report.is_success() && self.config.persist_partial {
            let partial = self.partial_store();
            partial
                .save(&report.dataset, true)
                .context("保存部分结果失败")?;
            warn!(
                "💾 已完成的 {} 个答案保存至 {}",
                report.dataset.answered_count(),
                partial.path().display()
            );
        }

        Ok(report.into_result()?)
    }

    fn checkpoint_store(&self) -> SnapshotStore {
        SnapshotStore::new(&self.config.snapshot_path, &self.config.timestamp_format)
    }

    fn output_store(&self) -> SnapshotStore {
        SnapshotStore::new(&self.config.output_path, &self.config.timestamp_format)
    }

    fn partial_store(&self) -> SnapshotStore {
        SnapshotStore::new(
            self.config.partial_output_path(),
            &self.config.timestamp_format,
        )
    }
}
