pub mod availability;
pub mod calendar_parser;
pub mod captcha_locator;
pub mod captcha_solver;
pub mod checker_context;
pub mod config;
pub mod error;
pub mod form;
pub mod history;
pub mod model;
pub mod notifier;
pub mod page_state;
pub mod requests;
pub mod scheduler;
pub mod session_client;
pub mod slot_parser;
pub mod telegram;

mod ratelimit;
mod text_manipulators;

pub use availability::{AvailabilityEngine, SessionCache};
pub use checker_context::CheckerContext;
pub use error::{SessionError, SessionResult};
pub use model::{SessionInfo, UserInfo, Website};
pub use scheduler::CheckLane;
pub use session_client::SessionClient;
pub use slot_parser::Slot;
