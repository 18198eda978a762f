// Server-sent event endpoint for order status updates.

use axum::{
    extract::State,
    http::HeaderName,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
};
use futures::StreamExt;
use shop_stream::{ChannelConnection, KEEP_ALIVE_TEXT};
use std::convert::Infallible;

use crate::auth::CurrentUser;
use crate::state::AppState;

/// Opens an event stream for the caller. The connection stays registered
/// until the response body is dropped, which happens when the client goes
/// away or the server shuts down.
pub async fn stream_orders(State(state): State<AppState>, user: CurrentUser) -> Response {
    let (connection, payloads) = ChannelConnection::open();
    tracing::info!("📡 Order stream opened for {} ({})", user.user_id, payloads.id());
    state.registry.subscribe(user.user_id, connection);

    let shutdown = state.shutdown.clone();
    let events = payloads
        .map(|payload| Ok::<_, Infallible>(Event::default().data(payload)))
        .take_until(async move { shutdown.cancelled().await });

    let sse = Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(state.settings.keep_alive())
            .text(KEEP_ALIVE_TEXT),
    );

    // nginx buffers event streams unless told otherwise
    ([(HeaderName::from_static("x-accel-buffering"), "no")], sse).into_response()
}
