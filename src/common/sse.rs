use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::stream::{self, Stream};
use serde::Serialize;
use tokio::sync::mpsc::UnboundedReceiver;

/// Turns a subscriber receiver into an SSE body. The stream ends once the
/// sending side is dropped, which closes the connection.
pub fn event_stream<T>(rx: UnboundedReceiver<T>) -> Sse<impl Stream<Item = Result<Event, axum::Error>>>
where
    T: Serialize + Send + 'static,
{
    let stream = stream::unfold(rx, |mut rx| async move {
        let item = rx.recv().await?;
        Some((Event::default().json_data(&item), rx))
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
