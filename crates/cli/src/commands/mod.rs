pub mod doctor;
pub mod gateway;
pub mod onboard;
pub mod reclaim;
pub mod route;
pub mod rule;
pub mod status;
