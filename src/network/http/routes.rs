use std::convert::Infallible;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::error;
use warp::http::Response;
use warp::http::StatusCode;
use warp::hyper::body::Bytes;
use warp::Filter;
use warp::Rejection;
use warp::Reply;

use crate::constants::INTERNAL_PREFIX;
use crate::network::PeerHandler;
use crate::network::RpcRequest;
use crate::network::StageRequest;
use crate::network::VersionRequest;
use crate::network::WireReply;

fn with_handler(
    handler: Arc<dyn PeerHandler>,
) -> impl Filter<Extract = (Arc<dyn PeerHandler>,), Error = Infallible> + Clone {
    warp::any().map(move || handler.clone())
}

fn encode<T: Serialize>(reply: WireReply<T>) -> warp::reply::Response {
    match bincode::serialize(&reply) {
        Ok(body) => Response::builder()
            .header("content-type", "application/octet-stream")
            .body(body.into())
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()),
        Err(e) => {
            error!(error = %e, "failed to encode peer reply");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn decode<T: DeserializeOwned>(body: &Bytes) -> WireReply<T> {
    bincode::deserialize(body).map_err(|e| format!("Decoding failed: {e}"))
}

fn route(
    name: &'static str,
    handler: Arc<dyn PeerHandler>,
) -> impl Filter<Extract = (Arc<dyn PeerHandler>, Bytes), Error = Rejection> + Clone {
    warp::post()
        .and(warp::path(INTERNAL_PREFIX))
        .and(warp::path(name))
        .and(warp::path::end())
        .and(with_handler(handler))
        .and(warp::body::bytes())
}

/// Internal routes answering [`crate::network::HttpTransport`] requests.
pub fn peer_routes(
    handler: Arc<dyn PeerHandler>,
) -> impl Filter<Extract = (warp::reply::Response,), Error = Rejection> + Clone {
    let ping = route("ping", handler.clone()).then(|h: Arc<dyn PeerHandler>, _body: Bytes| async move {
        encode(Ok::<_, String>(h.handle_ping().await))
    });

    let stage = route("stage", handler.clone()).then(|h: Arc<dyn PeerHandler>, body: Bytes| async move {
        let reply = match decode::<StageRequest>(&body) {
            Ok(req) => h.handle_stage(req).await.map_err(|e| e.root_message()),
            Err(e) => Err(e),
        };
        encode(reply)
    });

    let commit = route("commit", handler.clone()).then(|h: Arc<dyn PeerHandler>, body: Bytes| async move {
        let reply = match decode::<VersionRequest>(&body) {
            Ok(req) => h.handle_commit(req.version).await.map_err(|e| e.root_message()),
            Err(e) => Err(e),
        };
        encode(reply)
    });

    let abort = route("abort", handler.clone()).then(|h: Arc<dyn PeerHandler>, body: Bytes| async move {
        let reply = match decode::<VersionRequest>(&body) {
            Ok(req) => h.handle_abort(req.version).await.map_err(|e| e.root_message()),
            Err(e) => Err(e),
        };
        encode(reply)
    });

    let fetch = route("fetch", handler.clone()).then(|h: Arc<dyn PeerHandler>, _body: Bytes| async move {
        encode(h.handle_fetch().await.map_err(|e| e.root_message()))
    });

    let rpc = route("rpc", handler).then(|h: Arc<dyn PeerHandler>, body: Bytes| async move {
        let reply = match decode::<RpcRequest>(&body) {
            Ok(req) => Ok(h.handle_rpc(req).await),
            Err(e) => Err(e),
        };
        encode(reply)
    });

    ping.or(stage)
        .unify()
        .or(commit)
        .unify()
        .or(abort)
        .unify()
        .or(fetch)
        .unify()
        .or(rpc)
        .unify()
}
