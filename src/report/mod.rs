pub mod builder;
pub mod mailer;
pub mod queue;

pub use builder::{ReportRequest, ReportRow, SessionReport};
pub use mailer::{HttpMailer, LogMailer, ReportMailer};
pub use queue::{DeliveryOutcome, ReportQueue, ReportSettings};
