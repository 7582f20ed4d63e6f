use actix_web::web;

use super::handlers;

/// Configures the API routes
///
/// # Arguments
///
/// * `cfg` - The service configuration
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(handlers::get_blockchain))
        .route("/peer", web::get().to(handlers::peers))
        .route("/block/{height}/{hash}", web::post().to(handlers::get_block))
        .route("/show", web::get().to(handlers::show))
        .route("/upload", web::get().to(handlers::upload))
        .route("/heartbeat/receive", web::post().to(handlers::heartbeat_receive))
        .route("/start", web::get().to(handlers::start));
}
