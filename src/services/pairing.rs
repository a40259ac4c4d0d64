//! 配对服务 - 业务能力层
//!
//! 从无序的帖子流中还原“问题 → 答案”关系。答案可能出现在所属问题之前或之后，
//! 一个问题的多个答案可能分散在文件各处。
//!
//! 筛选条件：
//! - 问题：创建时间晚于截止时间、`AnswerCount > 0`、正文不含链接/图片
//! - 答案：创建时间晚于截止时间、正文不含链接/图片、所属问题已被收录
//!
//! 最后删除没有任何答案的问题。

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use chrono::NaiveDateTime;
use tracing::{debug, info};

use crate::config::{Config, PairingStrategy};
use crate::error::AppResult;
use crate::infrastructure::PostReader;
use crate::models::{Dataset, Pair, Post, PostKind};

/// 收录条件
#[derive(Debug, Clone, Copy)]
pub struct PairingCriteria {
    /// 只收录严格晚于此时间创建的帖子
    pub cutoff: NaiveDateTime,
}

impl PairingCriteria {
    pub fn new(cutoff: NaiveDateTime) -> Self {
        Self { cutoff }
    }

    pub fn accepts_question(&self, post: &Post) -> bool {
        post.is_question()
            && post.created_after(self.cutoff)
            && post.answer_count.is_some_and(|n| n > 0)
            && !post.has_rich_content()
    }

    /// 答案自身是否满足条件（不检查所属问题）
    pub fn accepts_answer(&self, post: &Post) -> bool {
        post.is_answer()
            && post.parent_id.is_some()
            && post.created_after(self.cutoff)
            && !post.has_rich_content()
    }
}

/// 配对引擎
pub struct PairingEngine {
    criteria: PairingCriteria,
    source_path: PathBuf,
    expected_total: u64,
    timestamp_format: String,
    strategy: PairingStrategy,
}

impl PairingEngine {
    pub fn new(config: &Config) -> AppResult<Self> {
        Ok(Self {
            criteria: PairingCriteria::new(config.cutoff()?),
            source_path: PathBuf::from(&config.source_path),
            expected_total: config.expected_record_count,
            timestamp_format: config.timestamp_format.clone(),
            strategy: config.pairing_strategy,
        })
    }

    pub fn criteria(&self) -> PairingCriteria {
        self.criteria
    }

    /// 读取源文件并生成数据集
    pub fn run(&self) -> AppResult<Dataset> {
        info!(
            "🔍 开始配对 ({:?})，截止时间: {}",
            self.strategy, self.criteria.cutoff
        );
        let dataset = match self.strategy {
            PairingStrategy::SinglePass => pair_single_pass(self.open()?, &self.criteria)?,
            PairingStrategy::TwoPass => {
                let mut dataset = collect_questions(self.open()?, &self.criteria)?;
                attach_answers(&mut dataset, self.open()?, &self.criteria)?;
                prune(&mut dataset);
                dataset
            }
        };
        info!("✓ 配对完成，共 {} 个问答对", dataset.len());
        Ok(dataset)
    }

    fn open(&self) -> AppResult<PostReader<std::io::BufReader<std::fs::File>>> {
        PostReader::open(&self.source_path, self.expected_total, &self.timestamp_format)
    }
}

/// 第一遍：为每个符合条件的问题建立空的问答对
pub fn collect_questions(
    posts: impl IntoIterator<Item = AppResult<Post>>,
    criteria: &PairingCriteria,
) -> AppResult<Dataset> {
    let mut dataset = Dataset::new();
    for post in posts {
        let post = post?;
        if criteria.accepts_question(&post) {
            dataset.insert(Pair::new(post))?;
        }
    }
    debug!("第一遍扫描: 收录 {} 个问题", dataset.len());
    Ok(dataset)
}

/// 第二遍：按文件顺序把答案追加到所属问题
///
/// 返回追加的答案数量
pub fn attach_answers(
    dataset: &mut Dataset,
    posts: impl IntoIterator<Item = AppResult<Post>>,
    criteria: &PairingCriteria,
) -> AppResult<usize> {
    let mut attached = 0;
    for post in posts {
        let post = post?;
        if !criteria.accepts_answer(&post) {
            continue;
        }
        let Some(pair) = post.parent_id.as_deref().and_then(|id| dataset.get_mut(id)) else {
            continue;
        };
        pair.answers.push(post);
        attached += 1;
    }
    debug!("第二遍扫描: 追加 {} 个答案", attached);
    Ok(attached)
}

/// 删除没有答案的问答对，返回删除数量
pub fn prune(dataset: &mut Dataset) -> usize {
    let before = dataset.len();
    dataset.retain(|pair| !pair.answers.is_empty());
    let removed = before - dataset.len();
    debug!("删除 {} 个没有答案的问题", removed);
    removed
}

/// 单遍扫描配对
///
/// 问题按ID建立索引；所属问题尚未出现的答案先缓存，问题出现后放在最前面，
/// 因此答案顺序与两遍扫描完全一致。
pub fn pair_single_pass(
    posts: impl IntoIterator<Item = AppResult<Post>>,
    criteria: &PairingCriteria,
) -> AppResult<Dataset> {
    let mut dataset = Dataset::new();
    let mut seen_questions: HashSet<String> = HashSet::new();
    let mut early_answers: HashMap<String, Vec<Post>> = HashMap::new();

    for post in posts {
        let post = post?;
        match post.kind {
            PostKind::Question => {
                let buffered = early_answers.remove(&post.id);
                seen_questions.insert(post.id.clone());
                if criteria.accepts_question(&post) {
                    let mut pair = Pair::new(post);
                    pair.answers = buffered.unwrap_or_default();
                    dataset.insert(pair)?;
                }
            }
            PostKind::Answer => {
                if !criteria.accepts_answer(&post) {
                    continue;
                }
                let Some(parent_id) = post.parent_id.clone() else {
                    continue;
                };
                if let Some(pair) = dataset.get_mut(&parent_id) {
                    pair.answers.push(post);
                } else if !seen_questions.contains(&parent_id) {
                    early_answers.entry(parent_id).or_default().push(post);
                }
            }
        }
    }

    if !early_answers.is_empty() {
        debug!("丢弃 {} 个找不到问题的答案组", early_answers.len());
    }
    prune(&mut dataset);
    Ok(dataset)
}
