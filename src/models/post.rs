//! 帖子（问题 / 答案）

use std::collections::BTreeSet;
use std::sync::LazyLock;

use chrono::NaiveDateTime;
use regex::Regex;

use crate::error::{AppError, AppResult};

/// 视为“富内容”的标记：链接和图片
const RICH_CONTENT_MARKERS: [&str; 3] = ["<a", "</a>", "<img"];

static ANGLE_TAGS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(<[^<>]+>)+$").expect("static tag pattern"));

/// 帖子类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PostKind {
    Question,
    Answer,
}

impl PostKind {
    /// 从源文件的 `PostTypeId` 解析，其它类型返回 None
    pub fn from_type_id(raw: &str) -> Option<Self> {
        match raw.trim() {
            "1" => Some(PostKind::Question),
            "2" => Some(PostKind::Answer),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PostKind::Question => "question",
            PostKind::Answer => "answer",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "question" => Some(PostKind::Question),
            "answer" => Some(PostKind::Answer),
            _ => None,
        }
    }
}

/// 单条帖子记录
///
/// 源文件中缺失的字段保持为 `None`，不会推断成 0 或空字符串
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub id: String,
    pub kind: PostKind,
    /// 仅答案有：所属问题的ID
    pub parent_id: Option<String>,
    pub accepted_answer_id: Option<String>,
    pub creation_date: Option<NaiveDateTime>,
    pub score: Option<i64>,
    pub view_count: Option<u64>,
    pub body: Option<String>,
    /// 仅问题有
    pub title: Option<String>,
    /// 仅问题有，小写
    pub tags: Option<BTreeSet<String>>,
    pub answer_count: Option<u32>,
    pub comment_count: Option<u32>,
    pub favorite_count: Option<u32>,
    pub owner_user_id: Option<String>,
    pub last_activity_date: Option<NaiveDateTime>,
}

impl Post {
    /// 只有ID和类型的空记录，其余字段均未设置
    pub fn new(id: impl Into<String>, kind: PostKind) -> Self {
        Self {
            id: id.into(),
            kind,
            parent_id: None,
            accepted_answer_id: None,
            creation_date: None,
            score: None,
            view_count: None,
            body: None,
            title: None,
            tags: None,
            answer_count: None,
            comment_count: None,
            favorite_count: None,
            owner_user_id: None,
            last_activity_date: None,
        }
    }

    pub fn is_question(&self) -> bool {
        self.kind == PostKind::Question
    }

    pub fn is_answer(&self) -> bool {
        self.kind == PostKind::Answer
    }

    pub fn body_text(&self) -> &str {
        self.body.as_deref().unwrap_or_default()
    }

    /// 正文是否包含链接或图片标记
    pub fn has_rich_content(&self) -> bool {
        let body = self.body_text();
        RICH_CONTENT_MARKERS.iter().any(|marker| body.contains(marker))
    }

    /// 创建时间严格晚于 cutoff；未设置创建时间视为不满足
    pub fn created_after(&self, cutoff: NaiveDateTime) -> bool {
        self.creation_date.is_some_and(|date| date > cutoff)
    }

    /// 是否包含指定标签（大小写不敏感）
    pub fn has_tag(&self, tag: &str) -> bool {
        let wanted = tag.trim().to_lowercase();
        self.tags
            .as_ref()
            .is_some_and(|tags| tags.iter().any(|t| t.to_lowercase() == wanted))
    }

    /// 发送给生成服务的问题文本
    pub fn question_text(&self) -> String {
        format!(
            "{}\n\n{}",
            self.title.as_deref().unwrap_or_default(),
            self.body_text()
        )
    }
}

/// 按配置的格式解析时间戳
pub fn parse_timestamp(field: &str, raw: &str, format: &str) -> AppResult<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw.trim(), format)
        .map_err(|e| AppError::format(field, raw, format!("不符合时间格式 {format}: {e}")))
}

/// 解码标签字符串
///
/// 支持 `<a><b>` 和 `|a|b|` 两种格式，结果为小写标签集合
pub fn decode_tags(raw: &str) -> AppResult<BTreeSet<String>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(BTreeSet::new());
    }

    let tokens: Vec<&str> = if trimmed.starts_with('<') {
        if !ANGLE_TAGS.is_match(trimmed) {
            return Err(AppError::format("Tags", raw, "标签分隔符不完整"));
        }
        trimmed
            .trim_start_matches('<')
            .trim_end_matches('>')
            .split("><")
            .collect()
    } else if trimmed.starts_with('|') && trimmed.ends_with('|') {
        trimmed.split('|').filter(|t| !t.is_empty()).collect()
    } else {
        return Err(AppError::format("Tags", raw, "无法识别的标签格式"));
    };

    Ok(tokens
        .into_iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_angle_tags() {
        let tags = decode_tags("<Bread><sourdough><baking>").unwrap();
        let expected: BTreeSet<String> = ["bread", "sourdough", "baking"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(tags, expected);
    }

    #[test]
    fn test_decode_pipe_tags() {
        let tags = decode_tags("|bread|yeast|").unwrap();
        assert!(tags.contains("bread"));
        assert!(tags.contains("yeast"));
        assert_eq!(tags.len(), 2);
    }

    #[test]
    fn test_decode_broken_tags_fails() {
        assert!(matches!(
            decode_tags("<bread><yeast"),
            Err(AppError::Format { .. })
        ));
        assert!(matches!(decode_tags("bread"), Err(AppError::Format { .. })));
        assert!(decode_tags("").unwrap().is_empty());
    }

    #[test]
    fn test_rich_content_markers() {
        let mut post = Post::new("1", PostKind::Question);
        post.body = Some("<p>plain</p>".into());
        assert!(!post.has_rich_content());
        post.body = Some(r#"<p>see <a href="x">here</a></p>"#.into());
        assert!(post.has_rich_content());
        post.body = Some(r#"<img src="loaf.png"/>"#.into());
        assert!(post.has_rich_content());
        post.body = None;
        assert!(!post.has_rich_content());
    }

    #[test]
    fn test_unset_creation_date_never_after_cutoff() {
        let cutoff = NaiveDateTime::parse_from_str("2021-09-30T00:00:00", "%Y-%m-%dT%H:%M:%S")
            .unwrap();
        let mut post = Post::new("1", PostKind::Answer);
        assert!(!post.created_after(cutoff));
        post.creation_date = Some(cutoff);
        assert!(!post.created_after(cutoff));
        post.creation_date = Some(cutoff + chrono::Duration::seconds(1));
        assert!(post.created_after(cutoff));
    }

    #[test]
    fn test_has_tag_is_case_insensitive() {
        let mut post = Post::new("1", PostKind::Question);
        post.tags = Some(decode_tags("<bread>").unwrap());
        assert!(post.has_tag("BREAD"));
        assert!(!post.has_tag("pasta"));
    }
}
