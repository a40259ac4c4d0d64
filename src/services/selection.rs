//! 筛选服务 - 业务能力层
//!
//! 对数据集做不修改原数据的变换，每个操作都返回新的数据集

use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::models::{Dataset, Pair};

/// 保留问题包含全部指定标签的问答对（大小写不敏感）
pub fn filter_by_tags<S: AsRef<str>>(dataset: &Dataset, tags: &[S]) -> Dataset {
    let filtered = filter(dataset, |pair| pair.has_tags(tags));
    let wanted: Vec<&str> = tags.iter().map(AsRef::as_ref).collect();
    info!("✓ 标签 {:?} 筛选后剩余 {} 个问答对", wanted, filtered.len());
    filtered
}

/// 无放回随机抽取 `min(k, len)` 个问答对
///
/// 提供 `seed` 时结果可复现
pub fn random_sample(dataset: &Dataset, k: usize, seed: Option<u64>) -> Dataset {
    let amount = k.min(dataset.len());
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let chosen: HashSet<usize> = rand::seq::index::sample(&mut rng, dataset.len(), amount)
        .into_iter()
        .collect();
    let mut position = 0;
    let sampled = filter(dataset, |_| {
        let keep = chosen.contains(&position);
        position += 1;
        keep
    });
    info!("🎲 随机抽取 {} 个问答对", sampled.len());
    sampled
}

/// 每个问答对只保留最早的答案
pub fn keep_earliest_answer(dataset: &Dataset) -> Dataset {
    let mut reduced = dataset.clone();
    for (_, pair) in dataset {
        if let (Some(earliest), Some(target)) = (pair.earliest_answer(), reduced.get_mut(pair.id()))
        {
            target.answers = vec![earliest.clone()];
        }
    }
    reduced
}

/// 按条件筛选
///
/// 按数据集顺序逐个调用 `predicate`
pub fn filter(dataset: &Dataset, mut predicate: impl FnMut(&Pair) -> bool) -> Dataset {
    let mut filtered = dataset.clone();
    filtered.retain(|pair| predicate(pair));
    filtered
}

/// 对每个问答对做变换；变换后ID重复时返回 `DuplicateKey`
pub fn map(dataset: &Dataset, transform: impl Fn(&Pair) -> Pair) -> AppResult<Dataset> {
    Dataset::try_from_pairs(dataset.pairs().map(transform))
}

/// 并行筛选
///
/// 所有工作线程的结果汇总后才返回，并记录结果数量
pub fn par_filter<F>(dataset: &Dataset, predicate: F, threads: usize) -> AppResult<Dataset>
where
    F: Fn(&Pair) -> bool + Sync + Send,
{
    let pairs: Vec<&Pair> = dataset.pairs().collect();
    let kept: Vec<Pair> = thread_pool(threads)?.install(|| {
        pairs
            .par_iter()
            .filter(|pair| predicate(pair))
            .map(|pair| (*pair).clone())
            .collect()
    });
    let filtered = Dataset::try_from_pairs(kept)?;
    info!(
        "✓ 并行筛选完成 ({} 线程): {} → {} 个问答对",
        threads,
        dataset.len(),
        filtered.len()
    );
    Ok(filtered)
}

/// 并行变换；变换后ID重复时返回 `DuplicateKey`
pub fn par_map<F>(dataset: &Dataset, transform: F, threads: usize) -> AppResult<Dataset>
where
    F: Fn(&Pair) -> Pair + Sync + Send,
{
    let pairs: Vec<&Pair> = dataset.pairs().collect();
    let mapped: Vec<Pair> =
        thread_pool(threads)?.install(|| pairs.par_iter().map(|pair| transform(pair)).collect());
    let mapped = Dataset::try_from_pairs(mapped)?;
    info!("✓ 并行变换完成 ({} 线程): {} 个问答对", threads, mapped.len());
    Ok(mapped)
}

fn thread_pool(threads: usize) -> AppResult<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads.max(1))
        .build()
        .map_err(|e| AppError::Config(format!("无法创建线程池: {e}")))
}
