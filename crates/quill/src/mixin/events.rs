use crate::Application;
use crate::mixin::Mixin;
use crate::service::{ServiceBuilder, ServiceMethod};
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, OnceLock};
use tokio::sync::broadcast;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Created,
    Updated,
    Patched,
    Removed,
}

impl EventKind {
    fn for_method(method: ServiceMethod) -> Option<Self> {
        match method {
            ServiceMethod::Get => None,
            ServiceMethod::Create => Some(Self::Created),
            ServiceMethod::Update => Some(Self::Updated),
            ServiceMethod::Patch => Some(Self::Patched),
            ServiceMethod::Remove => Some(Self::Removed),
        }
    }
}

/// Published after a mutating service method completed successfully
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceEvent {
    /// the normalized path of the service
    pub path: String,
    pub kind: EventKind,
    /// what the method returned, `null` when it returned nothing
    pub data: Value,
}

/// Publishes a [`ServiceEvent`] on the application's event channel for every successful
/// `create`, `update`, `patch` and `remove`.
///
/// Installed by default. Failed calls publish nothing, and publishing with no subscriber is
/// not an error.
#[derive(Debug, Default, Clone, Copy)]
pub struct EventMixin;

impl Mixin for EventMixin {
    fn apply(&self, app: &Application, service: &mut ServiceBuilder) {
        let path = Arc::new(OnceLock::<String>::new());

        {
            let path = Arc::clone(&path);
            service.on_prepare(move |_app, location| {
                if path.set(location.to_owned()).is_err() {
                    trace!(location, "service path already recorded for events");
                }
            });
        }

        for method in ServiceMethod::ALL {
            let Some(kind) = EventKind::for_method(method) else { continue };
            let sender = app.event_sender();
            let path = Arc::clone(&path);

            service.wrap_method(method, move |previous, call| {
                let sender = sender.clone();
                let path = Arc::clone(&path);
                async move {
                    let result = previous(call).await?;
                    let event = ServiceEvent {
                        path: path.get().cloned().unwrap_or_default(),
                        kind,
                        data: result.clone().unwrap_or(Value::Null),
                    };
                    if sender.send(event).is_err() {
                        trace!(?kind, "no subscriber for service event");
                    }
                    Ok(result)
                }
            });
        }
    }
}

pub(crate) fn channel(capacity: usize) -> broadcast::Sender<ServiceEvent> {
    broadcast::channel(capacity).0
}
