//! Messaging between the controller, page contexts and the dashboard.

pub mod dashboard;
pub mod messages;
pub mod page_context;

pub use dashboard::{DashboardState, StatusView};
pub use messages::{Envelope, Message, Reply, RunAck, request};
pub use page_context::{PageContext, PageContextHandle};
