use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct KakaoStartQuery {
    pub switch: Option<String>,
}

impl KakaoStartQuery {
    pub fn switch_account(&self) -> bool {
        matches!(self.switch.as_deref(), Some("true") | Some("1"))
    }
}

#[derive(Debug, Deserialize)]
pub struct KakaoCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}
