//! 图书目录后端库
//! 凭据认证与请求安全管道

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod pipeline;
pub mod repository;
pub mod routes;
pub mod services;
pub mod telemetry;
