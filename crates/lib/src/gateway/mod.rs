//! Gateway: HTTP surface for the site.
//!
//! `POST /api/contact` relays contact form submissions; `GET /` is a health probe and
//! `GET /api/site` exposes front-end settings.

mod protocol;
mod server;

pub use protocol::{ContactResponse, HealthResponse, SiteResponse};
pub use server::{router, run_gateway, GatewayState};
