//! An in-memory todo list served under `/todos`, single items under `/todos/{id}`.
//!
//! ```sh
//! curl -X POST localhost:3030/todos -H 'content-type: application/json' -d '{"text": "buy milk"}'
//! curl localhost:3030/todos
//! curl -X PATCH localhost:3030/todos/0 -H 'content-type: application/json' -d '{"done": true}'
//! ```

use async_trait::async_trait;
use quill::rest::rest;
use quill::{AppConfig, Application, MethodSet, Params, Service, ServiceError, ServiceMethod, ServiceResult};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tracing::info;

struct Todos {
    items: Arc<Mutex<Vec<Value>>>,
    methods: MethodSet,
}

impl Todos {
    fn index(id: Option<&str>) -> Result<usize, ServiceError> {
        let id = id.ok_or_else(|| ServiceError::bad_request("an id is required"))?;
        id.parse().map_err(|e| ServiceError::bad_request(format!("invalid id `{id}`: {e}")))
    }
}

#[async_trait]
impl Service for Todos {
    fn methods(&self) -> MethodSet {
        self.methods
    }

    async fn get(&self, _params: Params) -> ServiceResult {
        let items = self.items.lock().map_err(|e| ServiceError::general(e.to_string()))?;
        Ok(Some(Value::Array(items.clone())))
    }

    async fn create(&self, data: Value, _params: Params) -> ServiceResult {
        let mut items = self.items.lock().map_err(|e| ServiceError::general(e.to_string()))?;
        items.push(data.clone());
        Ok(Some(data))
    }

    async fn patch(&self, id: Option<String>, data: Value, _params: Params) -> ServiceResult {
        let index = Self::index(id.as_deref())?;
        let mut items = self.items.lock().map_err(|e| ServiceError::general(e.to_string()))?;
        let item = items.get_mut(index).ok_or_else(|| ServiceError::not_found(format!("no todo with id {index}")))?;

        if let (Some(item), Value::Object(changes)) = (item.as_object_mut(), data) {
            item.extend(changes);
        }
        Ok(Some(item.clone()))
    }

    async fn remove(&self, _params: Params) -> ServiceResult {
        let mut items = self.items.lock().map_err(|e| ServiceError::general(e.to_string()))?;
        items.clear();
        Ok(None)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::default().with_env_overrides()?;
    quill::logging::init_from_config(&config)?;

    let mut app = Application::with_config(config);
    let mut events = app.events();
    app.configure(rest())?;
    let items = Arc::new(Mutex::new(Vec::new()));
    let list = MethodSet::empty().with(ServiceMethod::Get).with(ServiceMethod::Create).with(ServiceMethod::Remove);
    app.add_service("todos", Todos { items: Arc::clone(&items), methods: list })?;
    app.add_service("todos/{id}", Todos { items, methods: MethodSet::empty().with(ServiceMethod::Patch) })?;
    app.configure_router_use()?;

    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            info!(path = %event.path, kind = ?event.kind, "todo changed");
        }
    });

    let handle = app.listen_configured().await?;
    handle.wait().await?;
    Ok(())
}
