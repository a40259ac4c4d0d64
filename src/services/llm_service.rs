//! LLM 服务 - 业务能力层
//!
//! 只负责“根据问题生成答案”这一能力，不关心并发和流程
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 支持自定义 API 端点和模型
//! - 兼容 OpenAI API 的服务（如 Azure, Gemini, Doubao 等）

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::RemoteError;

/// 答案生成能力
///
/// 任何失败都视为不可恢复，由调用方决定是否重试
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    async fn generate(&self, system_prompt: &str, question: &str) -> Result<String, RemoteError>;
}

/// LLM 服务
///
/// 职责：
/// - 调用 LLM API 为单个问题生成答案
/// - 不出现 Dataset
/// - 不关心并发和重试
pub struct LlmService {
    client: Client<OpenAIConfig>,
    model_name: String,
}

impl LlmService {
    /// 创建新的 LLM 服务
    pub fn new(config: &Config) -> Self {
        // 配置 OpenAI 客户端（兼容 OpenAI API 的服务）
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.api_key)
            .with_api_base(&config.api_base_url);

        Self {
            client: Client::with_config(openai_config),
            model_name: config.generation_model.clone(),
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    fn build_messages(
        system_prompt: &str,
        question: &str,
    ) -> Result<Vec<ChatCompletionRequestMessage>, RemoteError> {
        let system_msg = ChatCompletionRequestSystemMessageArgs::default()
            .content(system_prompt)
            .build()
            .map_err(|e| RemoteError::Rejected(e.to_string()))?;
        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(question)
            .build()
            .map_err(|e| RemoteError::Rejected(e.to_string()))?;

        Ok(vec![
            ChatCompletionRequestMessage::System(system_msg),
            ChatCompletionRequestMessage::User(user_msg),
        ])
    }
}

#[async_trait]
impl AnswerGenerator for LlmService {
    async fn generate(&self, system_prompt: &str, question: &str) -> Result<String, RemoteError> {
        debug!("调用 LLM API，模型: {}", self.model_name);
        debug!("问题长度: {} 字符", question.len());

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(Self::build_messages(system_prompt, question)?)
            .build()
            .map_err(|e| RemoteError::Rejected(e.to_string()))?;

        let response = self.client.chat().create(request).await.map_err(|e| {
            warn!("LLM API 调用失败: {}", e);
            RemoteError::Rejected(e.to_string())
        })?;

        debug!("LLM API 调用成功");

        response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| RemoteError::EmptyContent {
                model: self.model_name.clone(),
            })
    }
}
