pub mod llm_service;
pub mod pairing;
pub mod selection;

pub use llm_service::{AnswerGenerator, LlmService};
pub use pairing::{PairingCriteria, PairingEngine};
