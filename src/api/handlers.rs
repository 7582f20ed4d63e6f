use actix_web::{http::header::ContentType, web, HttpResponse, Responder};
use futures::StreamExt;
use log::{info, warn};
use rand::Rng;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::blockchain::codec::{decode_block, encode_block, encode_chain};
use crate::blockchain::Block;
use crate::node::Node;

/// Shared node handle
pub type NodeData = web::Data<Node>;

/// Header carrying the store's verdict on a received block
pub const INSERT_OUTCOME_HEADER: &str = "X-Insert-Outcome";

/// Heartbeat bodies are cut off after this many bytes (1 MiB)
pub const HEARTBEAT_BODY_LIMIT: usize = 1 << 20;

/// Query for the peer endpoint
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PeerQuery {
    /// Id (`ip:port`) of the caller; this node's own id when omitted
    pub id: Option<String>,
}

/// Query for the start endpoint
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StartQuery {
    /// Payload of the block to mine; a random number when omitted
    pub payload: Option<String>,
}

/// Response for the start endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct StartResponse {
    /// The message
    pub status: String,

    /// The height being mined
    pub height: u32,
}

/// Get the full chain store
///
/// Returns every stored block grouped by height, pretty-printed
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Chain store dump", body = crate::blockchain::ChainSnapshot),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn get_blockchain(node: NodeData) -> impl Responder {
    match serde_json::to_string_pretty(&node.store().snapshot()) {
        Ok(body) => HttpResponse::Ok()
            .content_type(ContentType::json())
            .body(body),
        Err(err) => HttpResponse::InternalServerError().json(serde_json::json!({
            "error": format!("Failed to serialize chain: {}", err)
        })),
    }
}

/// Register a peer
///
/// Adds the caller's id to the peer list and returns the list
#[utoipa::path(
    get,
    path = "/peer",
    params(PeerQuery),
    responses(
        (status = 200, description = "Known peers", body = Vec<String>)
    )
)]
pub async fn peers(node: NodeData, query: web::Query<PeerQuery>) -> impl Responder {
    let id = query
        .id
        .clone()
        .unwrap_or_else(|| node.self_id().to_string());

    if node.peers().register(&id) {
        info!("Registered peer {}", id);
    }

    HttpResponse::Ok().json(node.peers().ids())
}

/// Look up a block
///
/// Finds the block with the given identity hash at the given height
#[utoipa::path(
    post,
    path = "/block/{height}/{hash}",
    params(
        ("height" = String, Path, description = "Block height"),
        ("hash" = String, Path, description = "Identity hash")
    ),
    responses(
        (status = 200, description = "Block found", body = Block),
        (status = 204, description = "No such block"),
        (status = 500, description = "Malformed height")
    )
)]
pub async fn get_block(node: NodeData, path: web::Path<(String, String)>) -> impl Responder {
    let (height, hash) = path.into_inner();

    let height: u32 = match height.parse() {
        Ok(height) => height,
        Err(err) => {
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("Invalid height {:?}: {}", height, err)
            }));
        }
    };

    match node.store().get_block(height, &hash) {
        Some(block) => HttpResponse::Ok()
            .content_type(ContentType::json())
            .body(encode_block(&block)),
        None => HttpResponse::NoContent().finish(),
    }
}

/// Show the chain
///
/// Returns a human-readable summary of the store, the miner and the peers
#[utoipa::path(
    get,
    path = "/show",
    responses(
        (status = 200, description = "Chain summary", body = String)
    )
)]
pub async fn show(node: NodeData) -> impl Responder {
    let mut summary = node.store().show();
    summary.push_str(&format!("Miner {}: {:?}\n", node.miner().id(), node.miner().state()));
    if let Some(outcome) = node.miner().last_outcome() {
        match outcome.result {
            Ok(hash) => summary.push_str(&format!(
                "Last round: mined {} at height {}\n",
                hash, outcome.height
            )),
            Err(err) => summary.push_str(&format!(
                "Last round: height {} failed: {}\n",
                outcome.height, err
            )),
        }
    }
    summary.push_str(&format!("Peers: {}\n", node.peers().ids().join(", ")));

    HttpResponse::Ok()
        .content_type(ContentType::plaintext())
        .body(summary)
}

/// Export the chain
///
/// Returns every stored block in wire encoding, by height
#[utoipa::path(
    get,
    path = "/upload",
    responses(
        (status = 200, description = "Encoded blocks", body = Vec<String>),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn upload(node: NodeData) -> impl Responder {
    let blobs: Result<Vec<String>, _> = encode_chain(node.store())
        .into_iter()
        .map(String::from_utf8)
        .collect();

    match blobs {
        Ok(blobs) => HttpResponse::Ok().json(blobs),
        Err(err) => HttpResponse::InternalServerError().json(serde_json::json!({
            "error": format!("Failed to encode chain: {}", err)
        })),
    }
}

/// Receive a block from a peer
///
/// Decodes the first 1 MiB of the body and offers the block to the store;
/// the block is echoed back whatever the store decided
#[utoipa::path(
    post,
    path = "/heartbeat/receive",
    request_body = Block,
    responses(
        (status = 201, description = "Block processed", body = Block),
        (status = 422, description = "Malformed block")
    )
)]
pub async fn heartbeat_receive(node: NodeData, mut payload: web::Payload) -> impl Responder {
    let mut body = Vec::new();
    while let Some(chunk) = payload.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(err) => {
                warn!("Failed to read heartbeat body: {}", err);
                return HttpResponse::UnprocessableEntity().json(serde_json::json!({
                    "error": err.to_string()
                }));
            }
        };

        let room = HEARTBEAT_BODY_LIMIT - body.len();
        body.extend_from_slice(&chunk[..chunk.len().min(room)]);
        if body.len() == HEARTBEAT_BODY_LIMIT {
            break;
        }
    }

    let block = match decode_block(&body) {
        Ok(block) => block,
        Err(err) => {
            warn!("Rejected heartbeat body: {}", err);
            return HttpResponse::UnprocessableEntity().json(serde_json::json!({
                "error": err.to_string()
            }));
        }
    };

    let outcome = node.receive_block(block.clone());

    HttpResponse::Created()
        .insert_header((INSERT_OUTCOME_HEADER, outcome.as_str()))
        .json(block)
}

/// Start mining
///
/// Begins a mining round in the background; the mined block is pushed to
/// the known peers once accepted
#[utoipa::path(
    get,
    path = "/start",
    params(StartQuery),
    responses(
        (status = 202, description = "Mining round started", body = StartResponse),
        (status = 409, description = "A mining round is already running")
    )
)]
pub async fn start(node: NodeData, query: web::Query<StartQuery>) -> impl Responder {
    let payload = query
        .into_inner()
        .payload
        .unwrap_or_else(|| rand::thread_rng().gen_range(0..100_000).to_string());

    match node.start_mining(payload) {
        Ok((height, _round)) => HttpResponse::Accepted().json(StartResponse {
            status: "started".to_string(),
            height,
        }),
        Err(err) => HttpResponse::Conflict().json(serde_json::json!({
            "error": err.to_string()
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::configure_routes;
    use crate::blockchain::chain::tests::mined_block;
    use actix_web::http::StatusCode;
    use actix_web::{test, App};

    fn test_node() -> Node {
        Node::new("127.0.0.1:8080".to_string(), 0).unwrap()
    }

    macro_rules! test_app {
        ($node:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new($node.clone()))
                    .configure(configure_routes),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn test_get_blockchain() {
        let node = test_node();
        let app = test_app!(node);

        let req = test::TestRequest::get().uri("/").to_request();
        let body = test::call_and_read_body(&app, req).await;
        let text = std::str::from_utf8(&body).unwrap();

        // Indented dump
        assert!(text.contains("\n  "));
        let json: serde_json::Value = serde_json::from_str(text).unwrap();
        assert_eq!(json["Length"], 1);
        assert_eq!(json["Chain"]["1"][0]["Value"], "Genesis");
    }

    #[actix_web::test]
    async fn test_peer_registration() {
        let node = test_node();
        let app = test_app!(node);

        for _ in 0..2 {
            let req = test::TestRequest::get()
                .uri("/peer?id=10.0.0.7:8080")
                .to_request();
            let ids: Vec<String> = test::call_and_read_body_json(&app, req).await;
            assert_eq!(ids, vec!["10.0.0.7:8080"]);
        }

        let req = test::TestRequest::get().uri("/peer").to_request();
        let ids: Vec<String> = test::call_and_read_body_json(&app, req).await;
        assert_eq!(ids, vec!["10.0.0.7:8080", "127.0.0.1:8080"]);
    }

    #[actix_web::test]
    async fn test_block_lookup() {
        let node = test_node();
        let genesis = node.store().get(1)[0].clone();
        let app = test_app!(node);

        let req = test::TestRequest::post()
            .uri(&format!("/block/1/{}", genesis.hash()))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = test::read_body(resp).await;
        assert_eq!(decode_block(&body).unwrap(), genesis);

        let req = test::TestRequest::post().uri("/block/2/missing").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);

        let req = test::TestRequest::post().uri("/block/two/missing").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[actix_web::test]
    async fn test_show() {
        let node = test_node();
        let app = test_app!(node);

        let req = test::TestRequest::get().uri("/show").to_request();
        let body = test::call_and_read_body(&app, req).await;
        let text = std::str::from_utf8(&body).unwrap();

        assert!(text.starts_with("Chain height 1"));
        assert!(text.contains("Miner 127.0.0.1:8080: Idle"));
    }

    #[actix_web::test]
    async fn test_upload_round_trips() {
        let node = test_node();
        let genesis = node.store().get(1)[0].hash().to_string();
        node.receive_block(mined_block(2, &genesis, "b2", 0));
        let app = test_app!(node);

        let req = test::TestRequest::get().uri("/upload").to_request();
        let blobs: Vec<String> = test::call_and_read_body_json(&app, req).await;
        assert_eq!(blobs.len(), 2);

        let (decoded, _) = crate::blockchain::codec::decode_chain(&blobs, 0).unwrap();
        assert_eq!(decoded.blocks(), node.store().blocks());
    }

    #[actix_web::test]
    async fn test_heartbeat_twice_does_not_duplicate() {
        let node = test_node();
        let genesis = node.store().get(1)[0].hash().to_string();
        let b2 = mined_block(2, &genesis, "b2", 0);
        let app = test_app!(node);

        for expected in ["accepted", "duplicate"] {
            let req = test::TestRequest::post()
                .uri("/heartbeat/receive")
                .set_payload(encode_block(&b2))
                .to_request();
            let resp = test::call_service(&app, req).await;

            assert_eq!(resp.status(), StatusCode::CREATED);
            assert_eq!(resp.headers().get(INSERT_OUTCOME_HEADER).unwrap(), expected);
            let echoed: Block = test::read_body_json(resp).await;
            assert_eq!(echoed, b2);
        }

        assert_eq!(node.store().get(2), vec![b2]);
    }

    #[actix_web::test]
    async fn test_heartbeat_orphan_is_reported() {
        let node = test_node();
        let orphan = mined_block(2, "unknown-parent", "b2'", 0);
        let app = test_app!(node);

        let req = test::TestRequest::post()
            .uri("/heartbeat/receive")
            .set_payload(encode_block(&orphan))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::CREATED);
        assert_eq!(resp.headers().get(INSERT_OUTCOME_HEADER).unwrap(), "no_parent");
        assert_eq!(node.store().height(), 1);
    }

    #[actix_web::test]
    async fn test_heartbeat_malformed_body() {
        let node = test_node();
        let app = test_app!(node);

        let req = test::TestRequest::post()
            .uri("/heartbeat/receive")
            .set_payload("{\"Header\": 42")
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let json: serde_json::Value = test::read_body_json(resp).await;
        assert!(json["error"].as_str().unwrap().starts_with("Malformed input"));
    }

    #[actix_web::test]
    async fn test_heartbeat_reads_first_mebibyte() {
        let node = test_node();
        let genesis = node.store().get(1)[0].hash().to_string();
        let b2 = mined_block(2, &genesis, "b2", 0);
        let app = test_app!(node);

        // Trailing padding past the limit is never read
        let mut padded = encode_block(&b2);
        padded.resize(HEARTBEAT_BODY_LIMIT + 1024, b' ');
        padded.extend_from_slice(b"garbage");

        let req = test::TestRequest::post()
            .uri("/heartbeat/receive")
            .set_payload(padded)
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::CREATED);
        assert_eq!(resp.headers().get(INSERT_OUTCOME_HEADER).unwrap(), "accepted");
        assert_eq!(node.store().get(2), vec![b2]);
    }

    #[actix_web::test]
    async fn test_heartbeat_cut_off_block_is_malformed() {
        let node = test_node();
        let genesis = node.store().get(1)[0].hash().to_string();
        let huge = mined_block(2, &genesis, &"x".repeat(HEARTBEAT_BODY_LIMIT), 0);
        let app = test_app!(node);

        let req = test::TestRequest::post()
            .uri("/heartbeat/receive")
            .set_payload(encode_block(&huge))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(node.store().height(), 1);
    }

    #[actix_web::test]
    async fn test_start_mines_a_block() {
        let node = test_node();
        let mut outcomes = node.miner().subscribe_outcomes();
        let app = test_app!(node);

        let req = test::TestRequest::get().uri("/start?payload=42").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        let started: StartResponse = test::read_body_json(resp).await;
        assert_eq!(started.status, "started");
        assert_eq!(started.height, 2);

        outcomes.wait_for(Option::is_some).await.unwrap();

        let mined = node.store().get(2);
        assert_eq!(mined.len(), 1);
        assert_eq!(mined[0].value, "42");

        let req = test::TestRequest::get().uri("/show").to_request();
        let body = test::call_and_read_body(&app, req).await;
        let text = std::str::from_utf8(&body).unwrap();
        assert!(text.contains("Miner 127.0.0.1:8080: Idle"));
        assert!(text.contains(&format!("Last round: mined {} at height 2", mined[0].hash())));
    }

    #[actix_web::test]
    async fn test_start_while_mining() {
        // Unreachable difficulty keeps the first round busy
        let node = Node::new("127.0.0.1:8080".to_string(), 100).unwrap();
        let app = test_app!(node);

        let req = test::TestRequest::get().uri("/start").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::ACCEPTED);

        let req = test::TestRequest::get().uri("/start").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CONFLICT);

        node.miner().cancel();
    }
}
