//! 快照存储 - 基础设施层
//!
//! 将数据集写成单个 JSON 文档并能原样读回，既是配对阶段的检查点，也是最终输出。
//!
//! 顶层结构：`{ "<问题ID>": { "question": {...}, "answers": [...], "generatedAnswer": "..." } }`
//!
//! - 文件不存在或内容为空（含仅空白）视为“没有历史结果”
//! - 目标文件非空且未允许覆盖时返回 `OutputExists`
//! - 写入先落到同目录临时文件再重命名，失败时不会留下半个文件

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::{AppError, AppResult};
use crate::models::{parse_timestamp, Dataset, Pair, Post, PostKind};

/// 快照中的帖子
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostRecord {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    parent_id: Option<String>,
    accepted_answer_id: Option<String>,
    creation_date: Option<String>,
    score: Option<i64>,
    view_count: Option<u64>,
    body: Option<String>,
    title: Option<String>,
    tags: Option<BTreeSet<String>>,
    answer_count: Option<u32>,
    comment_count: Option<u32>,
    favorite_count: Option<u32>,
    owner_user_id: Option<String>,
    last_activity_date: Option<String>,
}

/// 快照中的问答对
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PairRecord {
    question: PostRecord,
    answers: Vec<PostRecord>,
    generated_answer: String,
}

/// 快照存储
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
    timestamp_format: String,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>, timestamp_format: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            timestamp_format: timestamp_format.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 读取已有快照
    ///
    /// 文件不存在或为空时返回 `None`
    pub fn load(&self) -> AppResult<Option<Dataset>> {
        let Some(content) = self.read_existing()? else {
            debug!("快照 {} 不存在或为空", self.path.display());
            return Ok(None);
        };
        let dataset = self.decode(&content)?;
        info!(
            "✓ 从 {} 载入 {} 个问答对",
            self.path.display(),
            dataset.len()
        );
        Ok(Some(dataset))
    }

    /// 保存数据集
    ///
    /// 目标文件非空且 `overwrite` 为 false 时返回 `OutputExists`，文件保持不变
    pub fn save(&self, dataset: &Dataset, overwrite: bool) -> AppResult<()> {
        let document = self.encode(dataset)?;
        self.write_document(&document, overwrite)?;
        info!(
            "💾 已保存 {} 个问答对到 {}",
            dataset.len(),
            self.path.display()
        );
        Ok(())
    }

    /// 以 JSON 数组导出（报告生成器使用的格式）
    pub fn export_list(&self, dataset: &Dataset, overwrite: bool) -> AppResult<()> {
        let records: Vec<PairRecord> = dataset
            .pairs()
            .map(|pair| self.encode_pair(pair))
            .collect();
        let document = serde_json::to_string(&records).map_err(|e| self.json_error(e))?;
        self.write_document(&document, overwrite)?;
        info!(
            "💾 已导出 {} 个问答对到 {}",
            records.len(),
            self.path.display()
        );
        Ok(())
    }

    pub fn encode(&self, dataset: &Dataset) -> AppResult<String> {
        let records: BTreeMap<&str, PairRecord> = dataset
            .iter()
            .map(|(id, pair)| (id.as_str(), self.encode_pair(pair)))
            .collect();
        serde_json::to_string(&records).map_err(|e| self.json_error(e))
    }

    pub fn decode(&self, content: &str) -> AppResult<Dataset> {
        let records: BTreeMap<String, PairRecord> =
            serde_json::from_str(content).map_err(|e| self.json_error(e))?;

        let mut dataset = Dataset::new();
        for (key, record) in records {
            let pair = self.decode_pair(record)?;
            if pair.id() != key {
                return Err(AppError::format(
                    "question.id",
                    pair.id(),
                    format!("与快照键 {key} 不一致"),
                ));
            }
            dataset.insert(pair)?;
        }
        Ok(dataset)
    }

    fn read_existing(&self) -> AppResult<Option<String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) if content.trim().is_empty() => Ok(None),
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::io(&self.path, e)),
        }
    }

    /// 检查能否写入：目标非空且 `overwrite` 为 false 时返回 `OutputExists`
    pub fn ensure_writable(&self, overwrite: bool) -> AppResult<()> {
        if !overwrite && self.read_existing()?.is_some() {
            return Err(AppError::OutputExists {
                path: self.path.display().to_string(),
            });
        }
        Ok(())
    }

    /// 删除快照文件，文件不存在时忽略
    pub fn remove(&self) -> AppResult<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                debug!("已删除 {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::io(&self.path, e)),
        }
    }

    fn write_document(&self, document: &str, overwrite: bool) -> AppResult<()> {
        self.ensure_writable(overwrite)?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(|e| AppError::io(&dir, e))?;

        let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| AppError::io(&dir, e))?;
        tmp.write_all(document.as_bytes())
            .and_then(|_| tmp.flush())
            .map_err(|e| AppError::io(tmp.path(), e))?;
        tmp.persist(&self.path)
            .map_err(|e| AppError::io(&self.path, e.error))?;
        Ok(())
    }

    fn encode_pair(&self, pair: &Pair) -> PairRecord {
        PairRecord {
            question: self.encode_post(&pair.question),
            answers: pair.answers.iter().map(|a| self.encode_post(a)).collect(),
            generated_answer: pair.generated_answer.clone(),
        }
    }

    fn encode_post(&self, post: &Post) -> PostRecord {
        PostRecord {
            id: post.id.clone(),
            kind: post.kind.as_str().to_string(),
            parent_id: post.parent_id.clone(),
            accepted_answer_id: post.accepted_answer_id.clone(),
            creation_date: post.creation_date.map(|ts| self.format_timestamp(ts)),
            score: post.score,
            view_count: post.view_count,
            body: post.body.clone(),
            title: post.title.clone(),
            tags: post.tags.clone(),
            answer_count: post.answer_count,
            comment_count: post.comment_count,
            favorite_count: post.favorite_count,
            owner_user_id: post.owner_user_id.clone(),
            last_activity_date: post.last_activity_date.map(|ts| self.format_timestamp(ts)),
        }
    }

    fn decode_pair(&self, record: PairRecord) -> AppResult<Pair> {
        Ok(Pair {
            question: self.decode_post(record.question)?,
            answers: record
                .answers
                .into_iter()
                .map(|a| self.decode_post(a))
                .collect::<AppResult<Vec<_>>>()?,
            generated_answer: record.generated_answer,
        })
    }

    fn decode_post(&self, record: PostRecord) -> AppResult<Post> {
        let kind = PostKind::parse(&record.kind)
            .ok_or_else(|| AppError::format("type", record.kind.as_str(), "未知的帖子类型"))?;
        Ok(Post {
            id: record.id,
            kind,
            parent_id: record.parent_id,
            accepted_answer_id: record.accepted_answer_id,
            creation_date: self.parse_optional("creationDate", record.creation_date)?,
            score: record.score,
            view_count: record.view_count,
            body: record.body,
            title: record.title,
            tags: record.tags,
            answer_count: record.answer_count,
            comment_count: record.comment_count,
            favorite_count: record.favorite_count,
            owner_user_id: record.owner_user_id,
            last_activity_date: self
                .parse_optional("lastActivityDate", record.last_activity_date)?,
        })
    }

    fn format_timestamp(&self, ts: NaiveDateTime) -> String {
        ts.format(&self.timestamp_format).to_string()
    }

    fn parse_optional(&self, field: &str, raw: Option<String>) -> AppResult<Option<NaiveDateTime>> {
        raw.map(|raw| parse_timestamp(field, &raw, &self.timestamp_format))
            .transpose()
    }

    fn json_error(&self, source: serde_json::Error) -> AppError {
        AppError::Snapshot {
            path: self.path.display().to_string(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_TIMESTAMP_FORMAT;
    use crate::models::decode_tags;
    use tempfile::tempdir;

    fn ts(raw: &str) -> NaiveDateTime {
        parse_timestamp("test", raw, DEFAULT_TIMESTAMP_FORMAT).unwrap()
    }

    fn sample_dataset() -> Dataset {
        let mut question = Post::new("Q1", PostKind::Question);
        question.creation_date = Some(ts("2022-03-04T05:06:07.891"));
        question.title = Some("Why is my loaf flat?".into());
        question.body = Some("<p>It spreads out.</p>".into());
        question.tags = Some(decode_tags("<bread><shaping>").unwrap());
        question.answer_count = Some(1);
        question.score = Some(0);
        question.view_count = Some(0);

        let mut answer = Post::new("A1", PostKind::Answer);
        answer.parent_id = Some("Q1".into());
        answer.creation_date = Some(ts("2022-03-05T00:00:00.123456"));
        answer.score = Some(-2);
        answer.body = Some("<p>Use a banneton.</p>".into());

        let mut pair = Pair::new(question);
        pair.answers.push(answer);
        pair.generated_answer = "<p>Try a stiffer dough.</p>".into();

        let bare = Pair::new(Post::new("Q2", PostKind::Question));
        Dataset::try_from_pairs([pair, bare]).unwrap()
    }

    #[test]
    fn test_round_trip_preserves_unset_and_zero() {
        let store = SnapshotStore::new("unused.json", DEFAULT_TIMESTAMP_FORMAT);
        let dataset = sample_dataset();
        let decoded = store.decode(&store.encode(&dataset).unwrap()).unwrap();
        assert_eq!(decoded, dataset);

        let q1 = decoded.get("Q1").unwrap();
        assert_eq!(q1.question.score, Some(0));
        assert_eq!(q1.question.favorite_count, None);
        let q2 = decoded.get("Q2").unwrap();
        assert_eq!(q2.question.tags, None);
        assert_eq!(q2.question.creation_date, None);
    }

    #[test]
    fn test_document_shape() {
        let store = SnapshotStore::new("unused.json", DEFAULT_TIMESTAMP_FORMAT);
        let json: serde_json::Value =
            serde_json::from_str(&store.encode(&sample_dataset()).unwrap()).unwrap();
        let q1 = &json["Q1"];
        assert_eq!(q1["question"]["id"], "Q1");
        assert_eq!(q1["question"]["type"], "question");
        assert_eq!(q1["question"]["creationDate"], "2022-03-04T05:06:07.891");
        assert_eq!(q1["answers"][0]["parentId"], "Q1");
        assert_eq!(q1["generatedAnswer"], "<p>Try a stiffer dough.</p>");
        assert!(q1["question"]["favoriteCount"].is_null());
    }

    #[test]
    fn test_load_missing_or_empty_is_none() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("raw_pairs.json");
        let store = SnapshotStore::new(&path, DEFAULT_TIMESTAMP_FORMAT);
        assert!(store.load().unwrap().is_none());

        std::fs::write(&path, "  \n").unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_save_refuses_to_clobber_non_empty_output() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pairs.json");
        let original = r#"{"Q1": {"question": {}, "answers": [], "generatedAnswer": ""}}"#;
        std::fs::write(&path, original).unwrap();

        let store = SnapshotStore::new(&path, DEFAULT_TIMESTAMP_FORMAT);
        let err = store.save(&sample_dataset(), false).unwrap_err();
        assert!(matches!(err, AppError::OutputExists { .. }));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), original);

        store.save(&sample_dataset(), true).unwrap();
        assert_eq!(store.load().unwrap().unwrap(), sample_dataset());
    }

    #[test]
    fn test_ensure_writable_and_remove() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pairs.json");
        let store = SnapshotStore::new(&path, DEFAULT_TIMESTAMP_FORMAT);
        store.ensure_writable(false).unwrap();
        store.remove().unwrap();

        store.save(&sample_dataset(), false).unwrap();
        assert!(matches!(
            store.ensure_writable(false),
            Err(AppError::OutputExists { .. })
        ));
        store.ensure_writable(true).unwrap();

        store.remove().unwrap();
        assert!(!path.exists());
        store.ensure_writable(false).unwrap();
    }

    #[test]
    fn test_save_into_empty_file_is_allowed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pairs.json");
        std::fs::write(&path, "").unwrap();
        let store = SnapshotStore::new(&path, DEFAULT_TIMESTAMP_FORMAT);
        store.save(&sample_dataset(), false).unwrap();
        assert_eq!(store.load().unwrap().unwrap().len(), 2);
    }

    #[test]
    fn test_export_list_writes_array() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("report_pairs.json");
        let store = SnapshotStore::new(&path, DEFAULT_TIMESTAMP_FORMAT);
        store.export_list(&sample_dataset(), false).unwrap();
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json.as_array().map(Vec::len), Some(2));
        assert_eq!(json[0]["question"]["id"], "Q1");
    }

    #[test]
    fn test_decode_rejects_mismatched_key() {
        let store = SnapshotStore::new("unused.json", DEFAULT_TIMESTAMP_FORMAT);
        let encoded = store.encode(&sample_dataset()).unwrap().replacen("\"Q2\":", "\"Q9\":", 1);
        assert!(matches!(store.decode(&encoded), Err(AppError::Format { .. })));
    }

    #[test]
    fn test_decode_bad_timestamp_is_format_error() {
        let store = SnapshotStore::new("unused.json", DEFAULT_TIMESTAMP_FORMAT);
        let encoded = store
            .encode(&sample_dataset())
            .unwrap()
            .replace("2022-03-04T05:06:07.891", "March 4th");
        assert!(matches!(store.decode(&encoded), Err(AppError::Format { .. })));
    }
}
