use axum::{
    extract::{FromRequest, Request},
    Json,
};
use serde::de::DeserializeOwned;
use service_core::error::AppError;
use validator::Validate;

pub struct ValidatedJson<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate + 'static,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Json parse error: {}", e)))?;

        value.validate()?;

        Ok(ValidatedJson(value))
    }
}

/// Characters a nickname may not contain. Length is checked by the request
/// DTO; a `/` would also break the reservation document path.
pub fn validate_nickname(nickname: &str) -> Result<(), AppError> {
    let length = nickname.chars().count();
    if !(2..=20).contains(&length) {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Nickname must be 2 to 20 characters"
        )));
    }
    if nickname.chars().any(|c| c == '/' || c.is_whitespace() || c.is_control()) {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Nickname contains invalid characters"
        )));
    }
    // Reserved as document ids by the nickname reservation store.
    let dots_only = nickname.chars().all(|c| c == '.');
    let double_underscored = length > 4 && nickname.starts_with("__") && nickname.ends_with("__");
    if dots_only || double_underscored {
        return Err(AppError::BadRequest(anyhow::anyhow!("Nickname is not allowed")));
    }
    Ok(())
}
