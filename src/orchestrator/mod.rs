//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责阶段串联和并发调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `pipeline` - 流水线
//! - 管理应用生命周期（初始化、运行）
//! - 检查点的载入与写入
//! - 筛选、生成答案、写入输出
//! - 输出全局统计信息
//!
//! ### `enrichment` - 答案生成引擎
//! - 控制并发数量（Semaphore）
//! - 通过通道收集结果并按问题ID合并
//! - 出现失败后停止提交
//!
//! ## 层次关系
//!
//! ```text
//! pipeline (处理整个 Dataset)
//!     ↓
//! enrichment (处理 Vec<Pair>)
//!     ↓
//! workflow::AnswerFlow (处理单个问题)
//!     ↓
//! services (能力层：pairing / selection / llm)
//!     ↓
//! infrastructure (基础设施：PostReader / SnapshotStore)
//! ```
//!
//! ## 设计原则
//!
//! 1. **单一职责**：pipeline 管阶段，enrichment 管并发
//! 2. **单点修改**：只有协调循环修改数据集
//! 3. **向下依赖**：编排层 → workflow → services → infrastructure

pub mod enrichment;
pub mod pipeline;

// 重新导出主要类型
pub use enrichment::{AnswerState, EnrichmentEngine, EnrichmentReport};
pub use pipeline::App;
