/*
 * Responsibility
 * - GET /api/resource
 * - Only reachable once the access middleware accepted token + proof
 */
use axum::Json;
use tracing::info;

use crate::api::dto::resource::{ResourceResponse, VerifyBreakdown};
use crate::api::extractors::AuthCtxExtractor;

pub async fn get_resource(AuthCtxExtractor(ctx): AuthCtxExtractor) -> Json<ResourceResponse> {
    info!(
        subject = %ctx.subject,
        jkt = %ctx.dpop_jkt,
        jti = %ctx.dpop_jti,
        "resource served"
    );

    Json(ResourceResponse {
        data: "Success",
        subject: ctx.subject,
        actor: ctx.actor,
        server_verify_ms: ctx.timings.total_ms,
        breakdown: VerifyBreakdown {
            token_verify_ms: ctx.timings.token_verify_ms,
            dpop_verify_ms: ctx.timings.dpop_verify_ms,
            jti_check_ms: ctx.timings.jti_check_ms,
        },
    })
}
