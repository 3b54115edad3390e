pub mod canonical;
pub mod extract;
pub mod gemini;
pub mod language;
pub mod openai_chat;
