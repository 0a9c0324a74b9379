use actix_web::{web, HttpResponse};
use metrics::counter;
use serde::{Deserialize, Serialize};
use sweep_relay_domain::services::telemetry::API_REQUESTS_TOTAL;

use crate::state::AppState;

pub const DEFAULT_SEND_DETAILS_LIMIT: usize = 20;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct SendDetailsQuery {
    pub limit: Option<usize>,
}

/// Most recent send-detail records, newest first.
pub async fn send_details_handler(
    state: web::Data<AppState>,
    query: web::Query<SendDetailsQuery>,
) -> HttpResponse {
    let limit = query.limit.unwrap_or(DEFAULT_SEND_DETAILS_LIMIT);
    counter!(API_REQUESTS_TOTAL, "endpoint" => "send_details").increment(1);
    HttpResponse::Ok().json(state.store().recent_send_details(Some(limit)))
}
