pub mod auth;
pub mod daily_logs;
pub mod health;
pub mod insights;
pub mod users;
pub mod weight;
pub mod ws;
