use actix_web::{web::Data, HttpResponse};
use metrics::counter;
use sweep_relay_domain::services::telemetry::API_REQUESTS_TOTAL;

use crate::state::AppState;

/// Full log buffer, newest first.
pub async fn logs_handler(state: Data<AppState>) -> HttpResponse {
    counter!(API_REQUESTS_TOTAL, "endpoint" => "logs").increment(1);
    HttpResponse::Ok().json(state.store().recent_logs(None))
}
