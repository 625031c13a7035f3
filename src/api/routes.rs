use warp::Filter;

use super::websocket;
use crate::session::SessionCoordinator;

/// WebSocket endpoint clients use for room and signaling traffic
pub fn session_websocket_route(
    coordinator: SessionCoordinator,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path("session")
        .and(warp::path::end())
        .and(warp::ws())
        .and(with_coordinator(coordinator))
        .map(|ws: warp::ws::Ws, coordinator: SessionCoordinator| {
            ws.on_upgrade(move |socket| websocket::handle_session_websocket(socket, coordinator))
        })
}

pub fn session_health_check(
    coordinator: SessionCoordinator,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("session" / "health")
        .and(warp::get())
        .and(with_coordinator(coordinator))
        .and_then(|coordinator: SessionCoordinator| async move {
            let (connections, rooms) = coordinator
                .inspect(|store| (store.connection_count(), store.room_count()))
                .await;
            Ok::<_, warp::Rejection>(warp::reply::json(&serde_json::json!({
                "status": "healthy",
                "service": "Session Relay",
                "version": env!("CARGO_PKG_VERSION"),
                "connections": connections,
                "rooms": rooms
            })))
        })
}

/// ICE configuration handed to browsers before they build peer connections
pub fn session_config_endpoint(
    stun_server_url: String,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("session" / "config")
        .and(warp::get())
        .map(move || {
            warp::reply::json(&serde_json::json!({
                "iceServers": [{ "urls": stun_server_url.clone() }]
            }))
        })
}

/// All routes with CORS open to any origin
pub fn routes(
    coordinator: SessionCoordinator,
    stun_server_url: String,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    let cors = warp::cors()
        .allow_any_origin()
        .allow_methods(vec!["GET", "POST"])
        .allow_header("content-type");

    session_websocket_route(coordinator.clone())
        .or(session_health_check(coordinator))
        .or(session_config_endpoint(stun_server_url))
        .with(cors)
        .with(warp::trace::request())
}

fn with_coordinator(
    coordinator: SessionCoordinator,
) -> impl Filter<Extract = (SessionCoordinator,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || coordinator.clone())
}
