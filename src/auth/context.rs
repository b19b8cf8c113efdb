use actix_web::{FromRequest, HttpMessage, HttpRequest, dev::Payload};
use futures::future::{Ready, ready};

use crate::model::role::{DataScope, Role};

pub const ROLE_HEADER: &str = "X-User-Role";
pub const EMPLOYEE_HEADER: &str = "X-Employee-Id";

/// Caller identity announced by the upstream UI. Authentication happens
/// before requests reach this service; the values are advisory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserContext {
    /// Unknown or missing roles fall back to `Role::Employee`.
    pub role: Role,

    /// Present only if the caller is linked to an employee record
    pub employee_id: Option<u64>,
}

impl UserContext {
    pub fn from_headers(req: &HttpRequest) -> Self {
        let header = |name: &str| req.headers().get(name).and_then(|h| h.to_str().ok());

        Self {
            role: header(ROLE_HEADER)
                .and_then(Role::from_header)
                .unwrap_or(Role::Employee),
            employee_id: header(EMPLOYEE_HEADER).and_then(|v| v.trim().parse().ok()),
        }
    }

    pub fn data_scope(&self) -> DataScope {
        self.role.data_scope()
    }
}

impl FromRequest for UserContext {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let context = req
            .extensions()
            .get::<UserContext>()
            .copied()
            .unwrap_or_else(|| UserContext::from_headers(req));
        ready(Ok(context))
    }
}
