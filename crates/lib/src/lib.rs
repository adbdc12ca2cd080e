//! Contact relay core library — configuration, the contact submission handler, mail
//! delivery strategies, and the HTTP gateway used by the CLI.

pub mod config;
pub mod contact;
pub mod delivery;
pub mod gateway;
pub mod init;
