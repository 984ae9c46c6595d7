//! Operator HTTP surface served next to the peer routes.
//!
//! - `POST /login`, `POST /logout`: session cookie management
//! - `GET|PUT /admin/config`: custom config sections
//! - `POST /admin/api`: `{method, params}` dispatch to the node API, answered
//!   with `{data}` or `{errors: [{message}]}`
//! - `GET /metrics`
//! - `/internal/*`: peer protocol

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use serde_json::json;
use serde_json::Value;
use tracing::debug;
use warp::http::header::SET_COOKIE;
use warp::http::HeaderValue;
use warp::http::StatusCode;
use warp::hyper::body::Bytes;
use warp::reply::Response;
use warp::Filter;
use warp::Rejection;
use warp::Reply;

use super::JoinServerRequest;
use super::Node;
use super::UserRequest;
use crate::auth::AuthOutcome;
use crate::auth::Session;
use crate::constants::SESSION_COOKIE;
use crate::metrics::metrics_route;
use crate::network::peer_routes;
use crate::network::PeerHandler;
use crate::roles::CallOptions;
use crate::topology::AuthParamsPatch;
use crate::topology::Label;
use crate::topology::ReplicasetPatch;
use crate::topology::ShardingGroupPatch;
use crate::Error;
use crate::Result;

/// Body limit of operator requests
const MAX_BODY_BYTES: u64 = 16 * 1024 * 1024;

/// One call of the admin API.
///
/// `params` is required for every method that takes arguments, even when all
/// of them are optional: `{"method": "servers", "params": {}}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "snake_case")]
pub enum AdminRequest {
    JoinServer(JoinServerRequest),
    EditServer {
        uuid: String,
        #[serde(default)]
        uri: Option<String>,
        #[serde(default)]
        labels: Option<Vec<Label>>,
    },
    ExpelServer {
        uuid: String,
    },
    EditReplicaset(ReplicasetPatch),
    SetFailover {
        enabled: bool,
    },
    ProbeServer {
        uri: String,
    },
    DisableServers {
        uuids: Vec<String>,
    },
    EnableServers {
        uuids: Vec<String>,
    },
    EditShardingGroup(ShardingGroupPatch),
    BootstrapSharding,
    UploadConfig(Value),
    GetConfig,
    EditAuthParams(AuthParamsPatch),
    AddUser(UserRequest),
    EditUser(UserRequest),
    RemoveUser {
        username: String,
    },
    ListUsers,
    AuthParams,
    Servers {
        #[serde(default)]
        uuid: Option<String>,
    },
    Replicasets {
        #[serde(default)]
        uuid: Option<String>,
    },
    ClusterSelf,
    FailoverEnabled,
    KnownRoles,
    CanBootstrapSharding,
    ShardingGroups,
    ShardingBucketCount,
    ShardingKnownGroups,
    Call {
        role: String,
        method: String,
        #[serde(default)]
        args: Value,
        #[serde(default)]
        leader_only: bool,
        #[serde(default)]
        prefer_local: bool,
    },
}

#[derive(Debug, Serialize)]
struct ApiError {
    message: String,
}

fn to_json<T: Serialize>(value: T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

/// Runs one admin call on behalf of `actor`.
pub async fn dispatch(
    node: &Node,
    req: AdminRequest,
    actor: Option<&str>,
) -> Result<Value> {
    match req {
        AdminRequest::JoinServer(req) => to_json(node.join_server(req).await?),
        AdminRequest::EditServer { uuid, uri, labels } => {
            node.edit_server(&uuid, uri, labels).await?;
            Ok(Value::Bool(true))
        }
        AdminRequest::ExpelServer { uuid } => {
            node.expel_server(&uuid).await?;
            Ok(Value::Bool(true))
        }
        AdminRequest::EditReplicaset(patch) => {
            node.edit_replicaset(patch).await?;
            Ok(Value::Bool(true))
        }
        AdminRequest::SetFailover { enabled } => to_json(node.set_failover(enabled).await?),
        AdminRequest::ProbeServer { uri } => {
            node.probe_server(&uri).await?;
            Ok(Value::Bool(true))
        }
        AdminRequest::DisableServers { uuids } => to_json(node.disable_servers(&uuids).await?),
        AdminRequest::EnableServers { uuids } => to_json(node.enable_servers(&uuids).await?),
        AdminRequest::EditShardingGroup(patch) => {
            node.edit_sharding_group(patch).await?;
            Ok(Value::Bool(true))
        }
        AdminRequest::BootstrapSharding => to_json(node.bootstrap_sharding().await?),
        AdminRequest::UploadConfig(config) => {
            node.upload_config(&config.to_string()).await?;
            Ok(Value::Bool(true))
        }
        AdminRequest::GetConfig => Ok(serde_json::from_str(&node.get_config())?),
        AdminRequest::EditAuthParams(params) => to_json(node.edit_auth_params(params, actor).await?),
        AdminRequest::AddUser(req) => to_json(node.add_user(req).await?),
        AdminRequest::EditUser(req) => to_json(node.edit_user(req).await?),
        AdminRequest::RemoveUser { username } => to_json(node.remove_user(&username, actor).await?),
        AdminRequest::ListUsers => to_json(node.list_users()),
        AdminRequest::AuthParams => to_json(node.auth_params()),
        AdminRequest::Servers { uuid } => to_json(node.servers(uuid.as_deref())),
        AdminRequest::Replicasets { uuid } => to_json(node.replicasets(uuid.as_deref())),
        AdminRequest::ClusterSelf => to_json(node.cluster_self()),
        AdminRequest::FailoverEnabled => to_json(node.failover_enabled()),
        AdminRequest::KnownRoles => to_json(node.known_roles()),
        AdminRequest::CanBootstrapSharding => to_json(node.can_bootstrap_sharding()),
        AdminRequest::ShardingGroups => to_json(node.sharding_groups()),
        AdminRequest::ShardingBucketCount => to_json(node.sharding_bucket_count()),
        AdminRequest::ShardingKnownGroups => to_json(node.sharding_known_groups()),
        AdminRequest::Call {
            role,
            method,
            args,
            leader_only,
            prefer_local,
        } => {
            let opts = CallOptions {
                leader_only,
                prefer_local,
                timeout: None,
            };
            node.call(&role, &method, args, opts).await
        }
    }
}

fn with_node(node: Arc<Node>) -> impl Filter<Extract = (Arc<Node>,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || node.clone())
}

fn session_cookie(session: &Session) -> String {
    format!(
        "{SESSION_COOKIE}={}; Max-Age={}; Path=/; HttpOnly",
        session.id, session.max_age
    )
}

fn set_cookie(
    mut resp: Response,
    cookie: String,
) -> Response {
    if let Ok(value) = HeaderValue::from_str(&cookie) {
        resp.headers_mut().insert(SET_COOKIE, value);
    }
    resp
}

/// Attaches a reissued session cookie, if the gate renewed one
fn finish(
    resp: Response,
    outcome: &AuthOutcome,
) -> Response {
    match &outcome.renewed {
        Some(session) => set_cookie(resp, session_cookie(session)),
        None => resp,
    }
}

fn error_reply(
    status: StatusCode,
    e: &Error,
) -> Response {
    let body = json!({ "class_name": e.class_name(), "err": e.to_string() });
    warp::reply::with_status(warp::reply::json(&body), status).into_response()
}

fn login(
    node: Arc<Node>,
    form: HashMap<String, String>,
) -> Response {
    let username = form.get("username").map(String::as_str).unwrap_or_default();
    let password = form.get("password").map(String::as_str).unwrap_or_default();
    match node.gate().login(username, password) {
        Ok(session) => {
            let resp = StatusCode::OK.into_response();
            set_cookie(resp, session_cookie(&session))
        }
        Err(_) => StatusCode::FORBIDDEN.into_response(),
    }
}

fn logout(
    node: Arc<Node>,
    session_id: Option<String>,
) -> Response {
    if let Some(id) = session_id {
        node.gate().logout(&id);
    }
    let resp = StatusCode::OK.into_response();
    set_cookie(resp, format!("{SESSION_COOKIE}=; Max-Age=0; Path=/"))
}

fn get_config(
    node: Arc<Node>,
    session_id: Option<String>,
    authorization: Option<String>,
) -> Response {
    match node.gate().authorize(session_id.as_deref(), authorization.as_deref()) {
        Ok(outcome) => {
            let reply = warp::reply::with_header(node.get_config(), "content-type", "application/json");
            finish(reply.into_response(), &outcome)
        }
        Err(e) => error_reply(StatusCode::UNAUTHORIZED, &e),
    }
}

async fn put_config(
    node: Arc<Node>,
    session_id: Option<String>,
    authorization: Option<String>,
    body: Bytes,
) -> Response {
    let outcome = match node.gate().authorize(session_id.as_deref(), authorization.as_deref()) {
        Ok(outcome) => outcome,
        Err(e) => return error_reply(StatusCode::UNAUTHORIZED, &e),
    };
    let document = match std::str::from_utf8(&body) {
        Ok(document) => document,
        Err(e) => {
            let e = Error::Validation(format!("Config is not UTF-8: {e}"));
            return finish(error_reply(StatusCode::BAD_REQUEST, &e), &outcome);
        }
    };
    match node.upload_config(document).await {
        Ok(()) => finish(StatusCode::OK.into_response(), &outcome),
        Err(e) => {
            debug!(error = %e, "config upload rejected");
            finish(error_reply(StatusCode::BAD_REQUEST, &e), &outcome)
        }
    }
}

async fn admin_api(
    node: Arc<Node>,
    session_id: Option<String>,
    authorization: Option<String>,
    body: Bytes,
) -> Response {
    let outcome = match node.gate().authorize(session_id.as_deref(), authorization.as_deref()) {
        Ok(outcome) => outcome,
        Err(e) => return error_reply(StatusCode::UNAUTHORIZED, &e),
    };
    let reply = match serde_json::from_slice::<AdminRequest>(&body) {
        Ok(req) => dispatch(&node, req, outcome.username.as_deref()).await,
        Err(e) => Err(Error::from(e)),
    };
    let body = match reply {
        Ok(data) => json!({ "data": data }),
        Err(e) => json!({ "errors": [ApiError { message: e.to_string() }] }),
    };
    finish(warp::reply::json(&body).into_response(), &outcome)
}

/// Every route of a node: operator surface, metrics and peer protocol.
pub fn routes(node: Arc<Node>) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    let cookie = warp::cookie::optional::<String>(SESSION_COOKIE);
    let authorization = warp::header::optional::<String>("authorization");

    let login_route = warp::post()
        .and(warp::path("login"))
        .and(warp::path::end())
        .and(with_node(node.clone()))
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::form::<HashMap<String, String>>())
        .map(login);

    let logout_route = warp::post()
        .and(warp::path("logout"))
        .and(warp::path::end())
        .and(with_node(node.clone()))
        .and(cookie.clone())
        .map(logout);

    let admin_config = warp::path("admin").and(warp::path("config")).and(warp::path::end());

    let get_config_route = warp::get()
        .and(admin_config.clone())
        .and(with_node(node.clone()))
        .and(cookie.clone())
        .and(authorization.clone())
        .map(get_config);

    let put_config_route = warp::put()
        .and(admin_config.clone())
        .and(with_node(node.clone()))
        .and(cookie.clone())
        .and(authorization.clone())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::bytes())
        .then(put_config);

    let admin_api_route = warp::post()
        .and(warp::path("admin"))
        .and(warp::path("api"))
        .and(warp::path::end())
        .and(with_node(node.clone()))
        .and(cookie.clone())
        .and(authorization.clone())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::bytes())
        .then(admin_api);

    let metrics = metrics_route().map(|body: String| body.into_response());

    let handler: Arc<dyn PeerHandler> = node;

    login_route
        .or(logout_route)
        .unify()
        .or(get_config_route)
        .unify()
        .or(put_config_route)
        .unify()
        .or(admin_api_route)
        .unify()
        .or(metrics)
        .unify()
        .or(peer_routes(handler))
        .unify()
}
