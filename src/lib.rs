//! # SO Answer Pairs
//!
//! 从 Stack Exchange 数据转储中提取问答对，并为每个问题生成答案
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 文件读写，只暴露能力
//! - `PostReader` - 流式读取 Posts.xml，逐条产出帖子
//! - `SnapshotStore` - 数据集的 JSON 快照（检查点和最终输出）
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"
//! - `PairingEngine` - 问题与答案配对
//! - `selection` - 标签筛选、随机抽样、并行变换
//! - `LlmService` - 为单个问题生成答案
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个问题"的完整生成流程
//! - `AnswerCtx` - 上下文封装（问题ID + 提交顺序）
//! - `AnswerFlow` - 流程编排（超时 → 重试 → 格式转换）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/pipeline` - 串联各阶段，管理检查点
//! - `orchestrator/enrichment` - 并发生成答案并合并结果
//!
//! ## 模块结构

pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::{Config, PairingStrategy};
pub use error::{AppError, AppResult, RemoteError};
pub use infrastructure::{PostReader, SnapshotStore};
pub use models::{Dataset, Pair, Post, PostKind};
pub use orchestrator::{AnswerState, App, EnrichmentEngine, EnrichmentReport};
pub use services::{AnswerGenerator, LlmService, PairingCriteria, PairingEngine};
pub use workflow::{AnswerCtx, AnswerFlow, RetryPolicy};
