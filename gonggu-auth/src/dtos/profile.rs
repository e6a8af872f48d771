use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Deserialize)]
pub struct NicknameQuery {
    pub nickname: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NicknameAvailability {
    pub available: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SetNicknameRequest {
    #[validate(length(min = 2, max = 20, message = "Nickname must be 2 to 20 characters"))]
    pub nickname: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TermsRequest {
    pub user_terms: Option<bool>,
    pub organizer_terms: Option<bool>,
}
