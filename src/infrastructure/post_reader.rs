//! 帖子流式读取器 - 基础设施层
//!
//! 逐行解析 Posts.xml，每次只持有当前一个 `<row>` 节点的内存，
//! 解析完成后立即清空缓冲区，因此可以处理远大于内存的文件。
//!
//! 只产出问题和答案；其它类型以及缺少 `PostTypeId` 的节点直接跳过。
//! 读取器本身不缓存任何内容，需要两次扫描时请重新打开文件。

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;

use indicatif::ProgressBar;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::models::{decode_tags, parse_timestamp, Post, PostKind};
use crate::utils::logging;

/// 流式帖子读取器
pub struct PostReader<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    timestamp_format: String,
    progress: ProgressBar,
    rows_seen: u64,
    /// 当前未闭合的节点层数
    depth: usize,
    finished: bool,
}

impl PostReader<BufReader<File>> {
    /// 打开源文件
    ///
    /// # 参数
    /// - `path`: 源文件路径
    /// - `expected_total`: 预计记录数，仅用于进度条
    /// - `timestamp_format`: 时间戳格式
    pub fn open(
        path: impl AsRef<Path>,
        expected_total: u64,
        timestamp_format: &str,
    ) -> AppResult<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| AppError::io(path, e))?;
        debug!("打开源文件: {}", path.display());

        let mut reader = Self::new(BufReader::new(file), timestamp_format);
        reader.progress = logging::progress_bar(
            &format!("Reading posts from {}", path.display()),
            expected_total,
        );
        Ok(reader)
    }
}

impl<R: BufRead> PostReader<R> {
    /// 从任意 `BufRead` 创建读取器（不显示进度）
    pub fn new(source: R, timestamp_format: &str) -> Self {
        Self {
            reader: Reader::from_reader(source),
            buf: Vec::new(),
            timestamp_format: timestamp_format.to_string(),
            progress: ProgressBar::hidden(),
            rows_seen: 0,
            depth: 0,
            finished: false,
        }
    }

    /// 已读取的 `<row>` 节点数（包括被跳过的）
    pub fn rows_seen(&self) -> u64 {
        self.rows_seen
    }

    /// 当前节点缓冲区的容量
    pub fn buffer_capacity(&self) -> usize {
        self.buf.capacity()
    }

    fn finish(&mut self) {
        self.finished = true;
        self.progress.finish_and_clear();
    }
}

impl<R: BufRead> Iterator for PostReader<R> {
    type Item = AppResult<Post>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        loop {
            // 上一个节点的内存在这里释放
            self.buf.clear();
            let offset = self.reader.buffer_position() as u64;

            let step = match self.reader.read_event_into(&mut self.buf) {
                Ok(Event::Start(ref node)) => {
                    self.depth += 1;
                    if node.local_name().as_ref() != b"row" {
                        continue;
                    }
                    self.rows_seen += 1;
                    self.progress.inc(1);
                    Some(parse_row(node, &self.timestamp_format, offset))
                }
                Ok(Event::Empty(ref row)) if row.local_name().as_ref() == b"row" => {
                    self.rows_seen += 1;
                    self.progress.inc(1);
                    Some(parse_row(row, &self.timestamp_format, offset))
                }
                Ok(Event::End(_)) => {
                    self.depth = self.depth.saturating_sub(1);
                    continue;
                }
                // 文件被截断：仍有未闭合的节点
                Ok(Event::Eof) if self.depth > 0 => Some(Err(AppError::malformed_source(
                    offset,
                    format!("文件意外结束，{} 个节点未闭合", self.depth),
                ))),
                Ok(Event::Eof) => None,
                Ok(_) => continue,
                Err(e) => Some(Err(AppError::malformed_source(
                    self.reader.error_position() as u64,
                    e,
                ))),
            };

            let Some(parsed) = step else {
                debug!("源文件读取完成，共 {} 个节点", self.rows_seen);
                self.finish();
                return None;
            };

            match parsed {
                Ok(Some(post)) => return Some(Ok(post)),
                Ok(None) => continue,
                Err(e) => {
                    self.finish();
                    return Some(Err(e));
                }
            }
        }
    }
}

/// 一个 `<row>` 上与帖子相关的属性
#[derive(Default)]
struct RowAttributes {
    id: Option<String>,
    post_type_id: Option<String>,
    parent_id: Option<String>,
    accepted_answer_id: Option<String>,
    creation_date: Option<String>,
    score: Option<String>,
    view_count: Option<String>,
    body: Option<String>,
    title: Option<String>,
    tags: Option<String>,
    answer_count: Option<String>,
    comment_count: Option<String>,
    favorite_count: Option<String>,
    owner_user_id: Option<String>,
    last_activity_date: Option<String>,
}

fn parse_row(row: &BytesStart<'_>, timestamp_format: &str, offset: u64) -> AppResult<Option<Post>> {
    let mut attrs = RowAttributes::default();

    for attr in row.attributes() {
        let attr = attr.map_err(|e| AppError::malformed_source(offset, e))?;
        let slot = match attr.key.as_ref() {
            b"Id" => &mut attrs.id,
            b"PostTypeId" => &mut attrs.post_type_id,
            b"ParentId" => &mut attrs.parent_id,
            b"AcceptedAnswerId" => &mut attrs.accepted_answer_id,
            b"CreationDate" => &mut attrs.creation_date,
            b"Score" => &mut attrs.score,
            b"ViewCount" => &mut attrs.view_count,
            b"Body" => &mut attrs.body,
            b"Title" => &mut attrs.title,
            b"Tags" => &mut attrs.tags,
            b"AnswerCount" => &mut attrs.answer_count,
            b"CommentCount" => &mut attrs.comment_count,
            b"FavoriteCount" => &mut attrs.favorite_count,
            b"OwnerUserId" => &mut attrs.owner_user_id,
            b"LastActivityDate" => &mut attrs.last_activity_date,
            _ => continue,
        };
        let value = attr
            .unescape_value()
            .map_err(|e| AppError::malformed_source(offset, e))?;
        *slot = Some(value.into_owned());
    }

    let Some(kind) = attrs.post_type_id.as_deref().and_then(PostKind::from_type_id) else {
        return Ok(None);
    };
    let id = attrs
        .id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| AppError::malformed_source(offset, "row 节点缺少 Id 属性"))?;

    let mut post = Post::new(id, kind);
    post.parent_id = non_empty(attrs.parent_id);
    post.accepted_answer_id = non_empty(attrs.accepted_answer_id);
    post.creation_date = optional_timestamp("CreationDate", attrs.creation_date, timestamp_format)?;
    post.score = optional_number("Score", attrs.score)?;
    post.view_count = optional_number("ViewCount", attrs.view_count)?;
    post.body = attrs.body;
    post.title = attrs.title;
    post.tags = attrs.tags.as_deref().map(decode_tags).transpose()?;
    post.answer_count = optional_number("AnswerCount", attrs.answer_count)?;
    post.comment_count = optional_number("CommentCount", attrs.comment_count)?;
    post.favorite_count = optional_number("FavoriteCount", attrs.favorite_count)?;
    post.owner_user_id = non_empty(attrs.owner_user_id);
    post.last_activity_date =
        optional_timestamp("LastActivityDate", attrs.last_activity_date, timestamp_format)?;

    Ok(Some(post))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn optional_number<T>(field: &str, raw: Option<String>) -> AppResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match non_empty(raw) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| AppError::format(field, raw.as_str(), e)),
        None => Ok(None),
    }
}

fn optional_timestamp(
    field: &str,
    raw: Option<String>,
    format: &str,
) -> AppResult<Option<chrono::NaiveDateTime>> {
    non_empty(raw)
        .map(|raw| parse_timestamp(field, &raw, format))
        .transpose()
}
