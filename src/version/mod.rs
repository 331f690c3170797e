//! Release ledger construction and version resolution
//!
//! Release tags are harvested from several upstream forges
//! ([`sources`]), normalized and merged into a single position-ranked
//! catalog ([`ledger`]) that instance evaluations resolve reported
//! version strings against ([`resolver`]).

pub mod error;
pub mod ledger;
pub mod resolver;
pub mod semver;
pub mod sources;
pub mod vulnerability;
