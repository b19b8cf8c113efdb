use actix_web::middleware::Next;
use actix_web::{
    Error, HttpMessage,
    body::BoxBody,
    dev::{ServiceRequest, ServiceResponse},
};

use crate::auth::context::UserContext;

/// Resolves the caller context once per request and stores it in the
/// request extensions for handlers.
pub async fn user_context_middleware(
    req: ServiceRequest,
    next: Next<BoxBody>,
) -> Result<ServiceResponse<BoxBody>, Error> {
    let context = UserContext::from_headers(req.request());

    tracing::debug!(
        method = %req.method(),
        path = %req.path(),
        role = %context.role,
        employee_id = ?context.employee_id,
        scope = %context.data_scope(),
        "Biometric request"
    );

    req.extensions_mut().insert(context);

    next.call(req).await
}
