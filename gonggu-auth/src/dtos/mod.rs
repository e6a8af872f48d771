pub mod admin;
pub mod kakao;
pub mod profile;
