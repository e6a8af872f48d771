//! HTTP handlers for gonggu-auth.

pub mod admin;
pub mod kakao;
pub mod profile;
pub mod webhook;
