//! Usage: `/users` routes (public profile, own profile update, avatar upload).

use super::models::{ActionAck, UpdateProfile, UserProfile};
use crate::session::{id_segment, AuthSession, MultipartPart, PendingRequest};
use crate::shared::error::{AppError, AppResult};
use crate::shared::error_code::ErrorCode;
use bytes::Bytes;

const PICTURE_FIELD: &str = "image";

pub async fn get_profile(session: &AuthSession, user_id: &str) -> AppResult<UserProfile> {
    let path = format!("/users/{}", id_segment(user_id)?);
    session.send_json(PendingRequest::get(path)).await
}

pub async fn update_profile(session: &AuthSession, data: &UpdateProfile) -> AppResult<UserProfile> {
    session
        .send_json(PendingRequest::put("/users/profile").json(data)?)
        .await
}

pub async fn upload_profile_picture(
    session: &AuthSession,
    data: Bytes,
    file_name: &str,
    mime: &str,
) -> AppResult<ActionAck> {
    if data.is_empty() {
        return Err(AppError::from_code(
            ErrorCode::InvalidInput,
            "profile picture is empty",
        ));
    }
    let part = MultipartPart {
        name: PICTURE_FIELD.to_string(),
        file_name: Some(file_name.to_string()),
        mime: Some(mime.to_string()),
        data,
    };
    session
        .send_json(PendingRequest::post("/users/profile/picture").multipart(vec![part]))
        .await
}
