//! Server-Sent Events stream of ledger changes

use std::convert::Infallible;

use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use serde::Deserialize;
use tokio_stream::{wrappers::BroadcastStream, Stream, StreamExt};
use utoipa::IntoParams;

use crate::{error::AppResult, services::events::LedgerEvent, AppState};

use super::parse_class;

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct EventsQuery {
    /// Only stream events of this asset class
    pub class: Option<String>,
}

/// Stream ledger events to a connected desk
#[utoipa::path(
    get,
    path = "/events",
    tag = "events",
    params(EventsQuery),
    responses(
        (status = 200, description = "text/event-stream of ledger events", content_type = "text/event-stream")
    )
)]
pub async fn stream_events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let class = query.class.as_deref().map(parse_class).transpose()?;

    let receiver = state.services.events.subscribe();
    tracing::debug!(
        "Event stream opened ({} subscribers)",
        state.services.events.subscriber_count()
    );

    let stream = BroadcastStream::new(receiver).filter_map(move |message| match message {
        Ok(event) if class.map_or(true, |c| c == event.class) => to_sse(&event),
        Ok(_) => None,
        Err(e) => {
            tracing::warn!("Event stream lagging: {}", e);
            None
        }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn to_sse(event: &LedgerEvent) -> Option<Result<Event, Infallible>> {
    match Event::default()
        .id(event.id.to_string())
        .event(event.event_type.as_str())
        .json_data(event)
    {
        Ok(sse) => Some(Ok(sse)),
        Err(e) => {
            tracing::error!("Failed to encode ledger event: {}", e);
            None
        }
    }
}
