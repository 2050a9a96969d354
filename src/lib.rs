//! Tier Sale Bot Library
//!
//! Prepares a set of accounts for a tiered token sale (funds check, spending
//! approval, gas budget) and buys every configured tier once the sale
//! opens, each account on its own task.

pub mod accounts;
pub mod clock;
pub mod config;
pub mod countdown;
pub mod errors;
pub mod gateway;
pub mod metrics;
pub mod orchestrator;
pub mod policy;
pub mod preparer;
pub mod purchase;
pub mod structured_logging;
pub mod tiers;

pub use accounts::AccountJob;
pub use clock::{Clock, SystemClock};
pub use config::Config;
pub use gateway::{ChainGateway, EvmGateway};
pub use orchestrator::{JobOutcome, PurchaseOrchestrator, RunSummary};
pub use policy::PurchasePolicy;
