//! Contact form submission: payload parsing, spam and abuse gates, and dispatch to the
//! delivery chain.

mod handler;
mod payload;
mod rate_limit;

pub use handler::{ContactError, ContactHandler, DeliveryDiagnostics, Submission};
pub use payload::{client_ip, Inquiry, InquiryPayload};
pub use rate_limit::{RateDecision, RateLimiter};
