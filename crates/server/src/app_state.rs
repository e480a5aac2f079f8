use server_api::ApiContext;
use shared::protocol::ServerEvent;
use tokio::sync::broadcast;

/// Shared by every handler. `events` is the bus each `/ws` connection
/// subscribes to before it is acknowledged.
#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) api: ApiContext,
    pub(crate) events: broadcast::Sender<ServerEvent>,
}

impl AppState {
    pub(crate) fn new(api: ApiContext, event_buffer: usize) -> Self {
        let (events, _) = broadcast::channel(event_buffer.max(1));
        Self { api, events }
    }

    /// Fans a change out to connected subscribers; having none is fine.
    pub(crate) fn publish(&self, event: ServerEvent) {
        let _ = self.events.send(event);
    }
}
