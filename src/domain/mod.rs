pub mod entitlement;
pub mod event;
pub mod payment;
pub mod ports;
pub mod session;
