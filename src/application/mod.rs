//! Application layer: the entitlement ledger, session registry, payment
//! workflow, referral accounting, and the orchestrator that drives them from
//! inbound messenger events.

pub mod ledger;
pub mod orchestrator;
pub mod payments;
pub mod referrals;
pub mod sessions;
