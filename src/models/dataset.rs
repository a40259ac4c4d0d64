use std::collections::btree_map::{self, BTreeMap};

use crate::error::{AppError, AppResult};
use crate::models::pair::Pair;

/// 数据集：问题ID → 问答对
///
/// 按ID排序存储，遍历、提交和序列化的顺序都可复现
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dataset {
    pairs: BTreeMap<String, Pair>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从问答对列表构建，ID重复时失败
    pub fn try_from_pairs(pairs: impl IntoIterator<Item = Pair>) -> AppResult<Self> {
        let mut dataset = Self::new();
        for pair in pairs {
            dataset.insert(pair)?;
        }
        Ok(dataset)
    }

    /// 插入问答对；ID已存在时返回 `DuplicateKey`
    pub fn insert(&mut self, pair: Pair) -> AppResult<()> {
        match self.pairs.entry(pair.id().to_string()) {
            btree_map::Entry::Occupied(entry) => Err(AppError::DuplicateKey {
                id: entry.key().clone(),
            }),
            btree_map::Entry::Vacant(entry) => {
                entry.insert(pair);
                Ok(())
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&Pair> {
        self.pairs.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Pair> {
        self.pairs.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.pairs.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.pairs.keys().map(String::as_str)
    }

    pub fn pairs(&self) -> impl Iterator<Item = &Pair> {
        self.pairs.values()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Pair> {
        self.pairs.iter()
    }

    /// 原地保留满足条件的问答对
    pub fn retain(&mut self, mut keep: impl FnMut(&Pair) -> bool) {
        self.pairs.retain(|_, pair| keep(pair));
    }

    /// 已生成答案的数量
    pub fn answered_count(&self) -> usize {
        self.pairs.values().filter(|p| p.has_generated_answer()).count()
    }
}

impl IntoIterator for Dataset {
    type Item = Pair;
    type IntoIter = btree_map::IntoValues<String, Pair>;

    fn into_iter(self) -> Self::IntoIter {
        self.pairs.into_values()
    }
}

impl<'a> IntoIterator for &'a Dataset {
    type Item = (&'a String, &'a Pair);
    type IntoIter = btree_map::Iter<'a, String, Pair>;

    fn into_iter(self) -> Self::IntoIter {
        self.pairs.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::post::{Post, PostKind};

    #[test]
    fn test_insert_duplicate_key_fails() {
        let mut dataset = Dataset::new();
        dataset
            .insert(Pair::new(Post::new("Q1", PostKind::Question)))
            .unwrap();
        let err = dataset
            .insert(Pair::new(Post::new("Q1", PostKind::Question)))
            .unwrap_err();
        assert!(matches!(err, AppError::DuplicateKey { ref id } if id == "Q1"));
        assert_eq!(dataset.len(), 1);
    }

    #[test]
    fn test_iteration_order_is_by_id() {
        let dataset = Dataset::try_from_pairs(
            ["Q3", "Q1", "Q2"]
                .into_iter()
                .map(|id| Pair::new(Post::new(id, PostKind::Question))),
        )
        .unwrap();
        let ids: Vec<&str> = dataset.ids().collect();
        assert_eq!(ids, vec!["Q1", "Q2", "Q3"]);
    }
}
