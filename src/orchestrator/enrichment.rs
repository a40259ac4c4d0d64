//! 答案生成引擎 - 编排层
//!
//! ## 职责
//!
//! 为数据集中的每个问答对调用一次生成服务，并把结果合并回数据集。
//!
//! ## 核心功能
//!
//! 1. **并发控制**：使用 Semaphore 限制同时进行的请求数量
//! 2. **按序提交**：提交顺序即数据集的遍历顺序，完成顺序不限
//! 3. **按ID合并**：任务通过通道返回 `(问题ID, 结果)`，只有协调循环修改数据集
//! 4. **失败即停**：出现失败后不再提交新请求，已在进行的请求允许完成
//!
//! ## 状态
//!
//! 每个问答对：`Pending → InFlight → {Completed | Failed}`

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult, RemoteError};
use crate::models::Dataset;
use crate::services::AnswerGenerator;
use crate::utils::logging;
use crate::workflow::{AnswerCtx, AnswerFlow};

/// 单个问答对的生成状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerState {
    Pending,
    InFlight,
    Completed,
    Failed,
}

/// 一次生成运行的结果
///
/// 失败时 `dataset` 仍包含所有已完成的答案
#[derive(Debug)]
pub struct EnrichmentReport {
    pub dataset: Dataset,
    pub states: BTreeMap<String, AnswerState>,
    /// 第一个失败的问题ID及原因
    pub failure: Option<(String, RemoteError)>,
}

impl EnrichmentReport {
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    pub fn state(&self, id: &str) -> Option<AnswerState> {
        self.states.get(id).copied()
    }

    pub fn completed_ids(&self) -> impl Iterator<Item = &str> {
        self.ids_in(AnswerState::Completed)
    }

    pub fn count(&self, state: AnswerState) -> usize {
        self.ids_in(state).count()
    }

    fn ids_in(&self, state: AnswerState) -> impl Iterator<Item = &str> {
        self.states
            .iter()
            .filter(move |(_, s)| **s == state)
            .map(|(id, _)| id.as_str())
    }

    /// 转换为结果：有失败时返回 `AppError::Remote`
    pub fn into_result(self) -> AppResult<Dataset> {
        match self.failure {
            Some((question_id, source)) => Err(AppError::remote(question_id, source)),
            None => Ok(self.dataset),
        }
    }
}

/// 答案生成引擎
pub struct EnrichmentEngine {
    flow: Arc<AnswerFlow>,
    concurrency: usize,
}

impl EnrichmentEngine {
    pub fn new(flow: AnswerFlow, concurrency: usize) -> Self {
        Self {
            flow: Arc::new(flow),
            concurrency: concurrency.max(1),
        }
    }

    /// 按配置创建（并发数、超时、重试）
    pub fn from_config(config: &Config, generator: Arc<dyn AnswerGenerator>) -> Self {
        Self::new(AnswerFlow::from_config(config, generator), config.concurrency)
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// 为数据集生成答案
    ///
    /// 已有答案的问答对直接视为完成，不发送请求
    pub async fn enrich(&self, mut dataset: Dataset) -> EnrichmentReport {
        let mut states = BTreeMap::new();
        let mut queue = VecDeque::new();
        for (id, pair) in &dataset {
            if pair.has_generated_answer() {
                states.insert(id.clone(), AnswerState::Completed);
            } else {
                states.insert(id.clone(), AnswerState::Pending);
                queue.push_back((id.clone(), pair.question.question_text()));
            }
        }

        let total = queue.len();
        let skipped = dataset.len() - total;
        info!(
            "🤖 开始生成答案: {} 个待生成，{} 个已有答案，并发数 {}",
            total, skipped, self.concurrency
        );

        let progress = logging::progress_bar("生成答案", total as u64);
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let (tx, mut rx) = mpsc::unbounded_channel::<(String, Result<String, RemoteError>)>();
        let mut handles = Vec::with_capacity(total);
        let mut failure: Option<(String, RemoteError)> = None;
        let mut position = 0;

        let merge = |(id, result): (String, Result<String, RemoteError>),
                     dataset: &mut Dataset,
                     states: &mut BTreeMap<String, AnswerState>,
                     failure: &mut Option<(String, RemoteError)>| {
            progress.inc(1);
            match result {
                Ok(text) => {
                    if let Some(pair) = dataset.get_mut(&id) {
                        pair.generated_answer = text;
                    }
                    states.insert(id, AnswerState::Completed);
                }
                Err(e) => {
                    states.insert(id.clone(), AnswerState::Failed);
                    if failure.is_none() {
                        error!("[问题 #{}] ❌ 生成失败，停止提交新请求: {}", id, e);
                        *failure = Some((id, e));
                    }
                }
            }
        };

        loop {
            while let Ok(message) = rx.try_recv() {
                merge(message, &mut dataset, &mut states, &mut failure);
            }
            if failure.is_some() || queue.is_empty() {
                break;
            }

            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };
            // 等待名额期间可能已有失败
            while let Ok(message) = rx.try_recv() {
                merge(message, &mut dataset, &mut states, &mut failure);
            }
            if failure.is_some() {
                break;
            }
            let Some((id, question_text)) = queue.pop_front() else {
                break;
            };

            position += 1;
            states.insert(id.clone(), AnswerState::InFlight);
            let ctx = AnswerCtx::new(id.clone(), position, total);
            let flow = self.flow.clone();
            let tx = tx.clone();

            let handle = tokio::spawn(async move {
                let result = flow.run(&ctx, &question_text).await;
                // 先发送结果再释放名额，协调循环拿到名额时能看到此结果
                let _ = tx.send((id, result));
                drop(permit);
            });
            handles.push((position, handle));
        }

        drop(tx);
        while let Some(message) = rx.recv().await {
            merge(message, &mut dataset, &mut states, &mut failure);
        }

        for (position, handle) in handles {
            if let Err(e) = handle.await {
                error!("[任务 {}] 执行失败: {}", position, e);
            }
        }

        // 异常退出的任务没有返回结果
        for (id, state) in states.iter_mut() {
            if *state == AnswerState::InFlight {
                *state = AnswerState::Failed;
                if failure.is_none() {
                    failure = Some((
                        id.clone(),
                        RemoteError::Rejected("生成任务异常退出".into()),
                    ));
                }
            }
        }
        progress.finish_and_clear();

        let report = EnrichmentReport {
            dataset,
            states,
            failure,
        };
        if report.is_success() {
            info!(
                "✓ 答案生成完成: {}/{}",
                report.count(AnswerState::Completed),
                report.states.len()
            );
        } else {
            warn!(
                "⚠️ 答案生成中止: 完成 {}，未开始 {}",
                report.count(AnswerState::Completed),
                report.count(AnswerState::Pending)
            );
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Pair, Post, PostKind};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// 记录同时进行的请求数，标题在 `fail_on` 中时失败
    #[derive(Default)]
    struct Stub {
        fail_on: HashSet<String>,
        delay: Duration,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        seen: Mutex<Vec<String>>,
    }

    impl Stub {
        fn failing(ids: &[&str]) -> Self {
            Self {
                fail_on: ids.iter().map(|id| id.to_string()).collect(),
                ..Default::default()
            }
        }

        fn delayed(delay: Duration) -> Self {
            Self {
                delay,
                ..Default::default()
            }
        }

        fn seen(&self) -> Vec<String> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AnswerGenerator for Stub {
        async fn generate(&self, _system: &str, question: &str) -> Result<String, RemoteError> {
            let title = question.lines().next().unwrap_or_default().to_string();
            self.seen.lock().unwrap().push(title.clone());

            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            // 按标题错开完成时间，让完成顺序与提交顺序不同
            let jitter = title.bytes().map(u64::from).sum::<u64>() % 7;
            tokio::time::sleep(self.delay + Duration::from_millis(jitter)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.fail_on.contains(&title) {
                Err(RemoteError::Rejected(format!("content rejected for {title}")))
            } else {
                Ok(format!("generated for {title}"))
            }
        }
    }

    fn dataset(n: usize) -> Dataset {
        Dataset::try_from_pairs((1..=n).map(|i| {
            let mut question = Post::new(format!("Q{i}"), PostKind::Question);
            question.title = Some(format!("Q{i}"));
            question.body = Some("<p>body</p>".into());
            Pair::new(question)
        }))
        .unwrap()
    }

    fn engine(stub: Arc<Stub>, concurrency: usize) -> EnrichmentEngine {
        EnrichmentEngine::new(AnswerFlow::new(stub, "prompt"), concurrency)
    }

    #[tokio::test]
    async fn test_all_pairs_answered() {
        let stub = Arc::new(Stub::default());
        let report = engine(stub.clone(), 2).enrich(dataset(4)).await;

        assert!(report.is_success());
        assert_eq!(report.completed_ids().count(), 4);
        assert_eq!(
            report.dataset.get("Q3").unwrap().generated_answer,
            "generated for Q3"
        );
        assert_eq!(stub.seen().len(), 4);
    }

    #[tokio::test]
    async fn test_concurrency_bound_respected() {
        let stub = Arc::new(Stub::delayed(Duration::from_millis(20)));
        let report = engine(stub.clone(), 3).enrich(dataset(10)).await;

        assert!(report.is_success());
        assert_eq!(stub.peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_concurrency_does_not_change_results() {
        let sequential = engine(Arc::new(Stub::default()), 1)
            .enrich(dataset(12))
            .await
            .into_result()
            .unwrap();
        let parallel = engine(Arc::new(Stub::default()), 8)
            .enrich(dataset(12))
            .await
            .into_result()
            .unwrap();
        assert_eq!(sequential, parallel);
    }

    #[tokio::test]
    async fn test_sequential_failure_stops_submission() {
        let stub = Arc::new(Stub::failing(&["Q3"]));
        let report = engine(stub.clone(), 1).enrich(dataset(5)).await;

        let (id, cause) = report.failure.clone().unwrap();
        assert_eq!(id, "Q3");
        assert_eq!(cause, RemoteError::Rejected("content rejected for Q3".into()));

        assert_eq!(stub.seen(), vec!["Q1", "Q2", "Q3"]);
        assert_eq!(report.state("Q1"), Some(AnswerState::Completed));
        assert_eq!(report.state("Q2"), Some(AnswerState::Completed));
        assert_eq!(report.state("Q3"), Some(AnswerState::Failed));
        assert_eq!(report.state("Q4"), Some(AnswerState::Pending));
        assert_eq!(report.state("Q5"), Some(AnswerState::Pending));
        // 已完成的结果保留
        assert_eq!(report.dataset.answered_count(), 2);
    }

    #[tokio::test]
    async fn test_parallel_failure_keeps_other_completions() {
        let stub = Arc::new(Stub::failing(&["Q3"]));
        let report = engine(stub, 8).enrich(dataset(5)).await;

        assert_eq!(report.failure.as_ref().map(|(id, _)| id.as_str()), Some("Q3"));
        let completed: Vec<&str> = report.completed_ids().collect();
        assert_eq!(completed, vec!["Q1", "Q2", "Q4", "Q5"]);
        assert!(report.dataset.get("Q3").unwrap().generated_answer.is_empty());

        match report.into_result() {
            Err(AppError::Remote { question_id, .. }) => assert_eq!(question_id, "Q3"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_existing_answers_are_skipped() {
        let mut source = dataset(3);
        source.get_mut("Q2").unwrap().generated_answer = "kept".into();

        let stub = Arc::new(Stub::default());
        let report = engine(stub.clone(), 2).enrich(source).await;

        assert!(report.is_success());
        assert_eq!(report.dataset.get("Q2").unwrap().generated_answer, "kept");
        let mut seen = stub.seen();
        seen.sort();
        assert_eq!(seen, vec!["Q1", "Q3"]);
    }

    #[tokio::test]
    async fn test_empty_dataset() {
        let report = engine(Arc::new(Stub::default()), 4)
            .enrich(Dataset::new())
            .await;
        assert!(report.is_success());
        assert!(report.states.is_empty());
    }
}
