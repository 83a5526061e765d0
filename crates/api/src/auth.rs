//! Caller identity forwarded by the gateway.
//!
//! The gateway authenticates requests and passes the result on as headers:
//! `x-user-id` carries the preferred username, which for customers is their
//! numeric customer id, and `x-user-roles` a comma separated role list.

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;
use common::CustomerId;

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLES_HEADER: &str = "x-user-roles";
pub const ADMIN_ROLE: &str = "admin";

/// The authenticated caller of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claims {
    pub subject: String,
    pub roles: Vec<String>,
}

impl Claims {
    pub fn new(subject: impl Into<String>, roles: &[&str]) -> Self {
        Self {
            subject: subject.into(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.roles.iter().any(|r| r == ADMIN_ROLE)
    }

    /// Returns the caller's customer id, if the subject is one.
    pub fn customer_id(&self) -> Option<CustomerId> {
        self.subject.parse().ok()
    }

    /// Returns whether the caller may read data belonging to `customer_id`.
    pub fn can_access(&self, customer_id: CustomerId) -> bool {
        self.is_admin() || self.customer_id() == Some(customer_id)
    }

    fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

        let subject = header(USER_ID_HEADER)
            .map(str::trim)
            .filter(|s| !s.is_empty())?
            .to_string();
        let roles = header(USER_ROLES_HEADER)
            .map(|roles| {
                roles
                    .split(',')
                    .map(str::trim)
                    .filter(|r| !r.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Some(Self { subject, roles })
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Claims {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Self::from_headers(&parts.headers)
            .ok_or_else(|| ApiError::Unauthorized("Unauthorized".to_string()))
    }
}
