pub mod answer_ctx;
pub mod answer_flow;

pub use answer_ctx::AnswerCtx;
pub use answer_flow::{AnswerFlow, AnswerFormatter, RetryPolicy};
