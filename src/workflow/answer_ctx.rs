//! 答案生成上下文
//!
//! 封装“我正在处理第几个问题、它的ID是什么”这一信息

use std::fmt::Display;

/// 答案生成上下文
#[derive(Debug, Clone)]
pub struct AnswerCtx {
    /// 问题ID
    pub question_id: String,

    /// 提交顺序（从1开始，仅用于日志显示）
    pub position: usize,

    /// 本次需要生成的问题总数
    pub total: usize,
}

impl AnswerCtx {
    pub fn new(question_id: impl Into<String>, position: usize, total: usize) -> Self {
        Self {
            question_id: question_id.into(),
            position,
            total,
        }
    }
}

impl Display for AnswerCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[问题 #{} {}/{}]",
            self.question_id, self.position, self.total
        )
    }
}
