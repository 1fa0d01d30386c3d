//! CAS (Central Authentication Service) ticket-validation flow.

pub mod flow;
mod xml;

pub use flow::{CasFlow, NAMESPACE};
