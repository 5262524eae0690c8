pub mod conversation_service;
pub mod message_service;
pub mod reaction_service;
