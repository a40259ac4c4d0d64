use crate::models::post::Post;

/// 问答对：一个问题及其答案，外加生成的答案
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pair {
    pub question: Post,
    /// 按源文件中出现的顺序排列
    pub answers: Vec<Post>,
    /// 生成的答案，空字符串表示尚未生成
    pub generated_answer: String,
}

impl Pair {
    pub fn new(question: Post) -> Self {
        Self {
            question,
            answers: Vec::new(),
            generated_answer: String::new(),
        }
    }

    /// 问答对的标识即问题ID
    pub fn id(&self) -> &str {
        &self.question.id
    }

    /// 问题是否包含所有指定标签（大小写不敏感）
    pub fn has_tags<S: AsRef<str>>(&self, tags: &[S]) -> bool {
        tags.iter().all(|tag| self.question.has_tag(tag.as_ref()))
    }

    pub fn has_generated_answer(&self) -> bool {
        !self.generated_answer.is_empty()
    }

    /// 创建时间最早的答案
    ///
    /// 时间相同时取先出现的；未设置创建时间的答案排在最后
    pub fn earliest_answer(&self) -> Option<&Post> {
        self.answers
            .iter()
            .min_by_key(|answer| (answer.creation_date.is_none(), answer.creation_date))
    }
}
