use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use clap::Parser;
use log::{error, info};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use std::io;
use std::time::Duration;

use ledger_node::config::NodeConfig;
use ledger_node::{api, blockchain, Node};

/// Read and write timeout for client connections
const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::get_blockchain,
        api::handlers::peers,
        api::handlers::get_block,
        api::handlers::show,
        api::handlers::upload,
        api::handlers::heartbeat_receive,
        api::handlers::start
    ),
    components(
        schemas(
            blockchain::Block,
            blockchain::Header,
            blockchain::ChainSnapshot,
            api::handlers::StartResponse
        )
    ),
    tags(
        (name = "ledger", description = "Ledger node sync endpoints")
    ),
    info(
        title = "Ledger Node API",
        version = "0.1.0",
        description = "Fork-tolerant proof-of-work ledger node",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    )
)]
struct ApiDoc;

#[actix_web::main]
async fn main() -> io::Result<()> {
    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = NodeConfig::parse();
    let self_id = config.self_id();

    let node = Node::new(self_id.clone(), config.difficulty).map_err(|err| {
        error!("Failed to initialize node: {}", err);
        io::Error::new(io::ErrorKind::Other, err.to_string())
    })?;

    if !config.peers.is_empty() {
        let report = node.bootstrap(&config.peers).await;
        info!(
            "Bootstrap finished: {} block(s) accepted, chain height {}",
            report.accepted,
            node.store().height()
        );
    }

    let node = web::Data::new(node);

    info!(
        "Node {} listening on {}:{} (difficulty {})",
        self_id, config.host, config.port, config.difficulty
    );

    // Start HTTP server
    let server = HttpServer::new(move || {
        // Configure CORS
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        // Configure OpenAPI documentation
        let openapi = ApiDoc::openapi();

        App::new()
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .app_data(node.clone())
            .configure(api::configure_routes)
            // Swagger UI
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", openapi.clone())
            )
    })
    .client_request_timeout(CLIENT_TIMEOUT)
    .client_disconnect_timeout(CLIENT_TIMEOUT)
    .bind((config.host.as_str(), config.port))
    .map_err(|err| {
        error!("Cannot bind {}:{}: {}", config.host, config.port, err);
        err
    })?;

    server.run().await
}
