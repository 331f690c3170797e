//! instance-scout discovers, classifies and ranks Misskey instances.
//!
//! A release ledger is harvested from the upstream forges once per run;
//! every configured instance is then probed, identity-checked, gated on
//! known vulnerabilities, scored and language-classified concurrently,
//! bounded by a single global request cap.

pub mod config;
pub mod crawler;
pub mod fetch;
pub mod lang;
pub mod version;
