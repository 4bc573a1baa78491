//! Identity-provider boundary.
//!
//! Authentication is the host application's job; whatever fronts this
//! service resolves the caller and forwards their id in a trusted header.
//! The engine only parses it.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap, StatusCode},
};
use uuid::Uuid;

pub const STUDENT_ID_HEADER: &str = "x-student-id";
pub const INSTRUCTOR_ID_HEADER: &str = "x-instructor-id";

/// The student taking an attempt.
pub struct StudentIdentity(pub Uuid);

/// The instructor authoring questionnaires, grading and reading analytics.
pub struct InstructorIdentity(pub Uuid);

fn header_uuid(headers: &HeaderMap, name: &str) -> Result<Uuid, StatusCode> {
    let raw = headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;
    Uuid::parse_str(raw.trim()).map_err(|_| {
        tracing::warn!("malformed {name} header");
        StatusCode::UNAUTHORIZED
    })
}

#[async_trait]
impl<S> FromRequestParts<S> for StudentIdentity
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        header_uuid(&parts.headers, STUDENT_ID_HEADER).map(StudentIdentity)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for InstructorIdentity
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        header_uuid(&parts.headers, INSTRUCTOR_ID_HEADER).map(InstructorIdentity)
    }
}
