pub mod auth;
pub mod conversation;
pub mod db;
pub mod error;
pub mod inbox;
pub mod message;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod user;
