pub mod accounts;
pub mod admin;
pub mod generate;
pub mod password;
pub mod plan;
pub mod throttle;
pub mod token;
