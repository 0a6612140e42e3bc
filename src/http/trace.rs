// author: kodeholic (powered by Claude)
// Trace SSE 스트림 핸들러
//
// GET /trace           - 전체 매칭/세션 이벤트 스트림
// GET /trace/{user_id} - 해당 유저가 관련된 이벤트만

use axum::{
    extract::{Path, State},
    response::{IntoResponse, Sse},
};
use axum::response::sse::{Event, KeepAlive};
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;

use super::state::HttpState;

pub async fn trace_stream(
    State(state): State<HttpState>,
    user_filter: Option<Path<String>>,
) -> impl IntoResponse {
    let rx     = state.trace_hub.subscribe();
    let filter = user_filter.map(|Path(id)| id);

    // lagged 구독자는 밀린 이벤트를 버리고 계속 진행
    let stream = BroadcastStream::new(rx)
        .filter_map(move |result| {
            let event = result.ok()?;
            if let Some(uid) = &filter {
                if !event.involves(uid) {
                    return None;
                }
            }
            let json = serde_json::to_string(&event).ok()?;
            Some(Ok::<Event, std::convert::Infallible>(
                Event::default().event(event.kind.as_str()).data(json)
            ))
        });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
