pub mod gateway;
pub mod groq;

pub use gateway::{
    ChatMessage, ChatRole, LlmGateway, LlmGatewayError, LlmGatewayFuture, LlmGatewayRequest,
    LlmGatewayResponse, LlmTokenUsage, ResponseFormat,
};
pub use groq::{
    GROQ_API_KEY_ENV, GroqGateway, GroqGatewayConfig, GroqModelRoute, MISSING_API_KEY_MESSAGE,
    is_missing_api_key,
};
