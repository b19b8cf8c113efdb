use crate::{api::biometric, auth::middleware::user_context_middleware, error::PipelineError};
use actix_governor::{
    Governor, GovernorConfig, GovernorConfigBuilder, PeerIpKeyExtractor,
    governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use anyhow::anyhow;

pub type RateLimit = GovernorConfig<PeerIpKeyExtractor, NoOpMiddleware>;

/// Per-IP budget of `requests_per_min`, refilled evenly across the minute.
pub fn build_limiter(requests_per_min: u32) -> anyhow::Result<RateLimit> {
    let requests_per_min = requests_per_min.max(1);
    let per_ms = (60_000 / requests_per_min as u64).max(1);

    GovernorConfigBuilder::default()
        .milliseconds_per_request(per_ms)
        .burst_size(requests_per_min)
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        .ok_or_else(|| anyhow!("invalid rate limit of {requests_per_min} requests per minute"))
}

pub fn configure(cfg: &mut web::ServiceConfig, api_prefix: &str, limiter: &RateLimit) {
    cfg.service(
        web::scope(&format!("{}/biometric", api_prefix.trim_end_matches('/')))
            .wrap(from_fn(user_context_middleware))
            .wrap(Governor::new(limiter)) // rate limiting
            .configure(biometric_routes),
    );
}

pub fn biometric_routes(cfg: &mut web::ServiceConfig) {
    cfg
        // extractor failures use the same JSON error body as the handlers
        .app_data(web::JsonConfig::default().error_handler(|err, _req| {
            PipelineError::Validation(err.to_string()).into()
        }))
        .app_data(web::QueryConfig::default().error_handler(|err, _req| {
            PipelineError::Validation(err.to_string()).into()
        }))
        // /connect
        .service(web::resource("/connect").route(web::post().to(biometric::connect_device)))
        // /devices
        .service(web::resource("/devices").route(web::get().to(biometric::list_devices)))
        // /devices/{device_id}
        .service(
            web::resource("/devices/{device_id}")
                .route(web::delete().to(biometric::delete_device)),
        )
        // /sync-all
        .service(web::resource("/sync-all").route(web::post().to(biometric::sync_all_devices)))
        // /sync/{device_id}
        .service(web::resource("/sync/{device_id}").route(web::post().to(biometric::sync_device)))
        // /process
        .service(web::resource("/process").route(web::post().to(biometric::process_logs)))
        // /unmapped
        .service(web::resource("/unmapped").route(web::get().to(biometric::unmapped)))
        // /status
        .service(web::resource("/status").route(web::get().to(biometric::status)))
        // /gateway/test
        .service(web::resource("/gateway/test").route(web::get().to(biometric::test_gateway)));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limiter_accepts_low_and_zero_budgets() {
        assert!(build_limiter(1000).is_ok());
        assert!(build_limiter(1).is_ok());
        assert!(build_limiter(0).is_ok());
    }
}
