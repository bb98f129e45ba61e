//! 数据模型模块
//! 用户身份与认证请求/响应

pub mod auth;
pub mod user;
