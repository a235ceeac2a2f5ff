pub mod agent_context_repository;
pub mod approval_repository;
pub mod message_repository;
pub mod session_repository;

pub use agent_context_repository::AgentContextRepository;
pub use approval_repository::ApprovalRepository;
pub use message_repository::MessageRepository;
pub use session_repository::SessionRepository;
