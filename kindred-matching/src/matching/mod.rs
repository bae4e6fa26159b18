pub mod date_plan;
pub mod eligibility;
pub mod index;
pub mod lifecycle;
pub mod orchestrator;
pub mod retry;
pub mod scorer;
pub mod selector;
