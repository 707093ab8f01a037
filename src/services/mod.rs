pub mod session_service;

pub use session_service::{LoginOutcome, SessionService, TokenBundle, UserSummary};
