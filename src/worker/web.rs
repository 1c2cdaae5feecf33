//! Service worker entry point and host bindings.

use super::http::{FetchRequest, Network, NetworkError, Response};
use super::js::{js_error, request_from_js, request_to_js, response_from_js, response_to_js};
use super::lifecycle::{HostError, WorkerHost};
use super::messages::{ClearCacheAck, ClientMessage, ReplyPort, WorkerMessage};
use super::service::ServiceWorker;
use crate::config::WorkerConfig;
use crate::storage::BrowserCacheStorage;
use js_sys::{Array, Promise, Reflect};
use std::rc::Rc;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::{future_to_promise, JsFuture};
use web_sys::{
    Client, ExtendableEvent, ExtendableMessageEvent, FetchEvent, MessagePort,
    ServiceWorkerGlobalScope,
};

type BrowserWorker = ServiceWorker<BrowserCacheStorage, BrowserNetwork, BrowserHost>;

/// `fetch` from the worker scope.
#[derive(Clone)]
pub struct BrowserNetwork {
    scope: ServiceWorkerGlobalScope,
}

impl Network for BrowserNetwork {
    async fn fetch(&self, request: &FetchRequest) -> Result<Response, NetworkError> {
        let native =
            request_to_js(request).map_err(|e| NetworkError::Transport(js_error(&e)))?;
        let value = JsFuture::from(self.scope.fetch_with_request(&native))
            .await
            .map_err(|e| NetworkError::Transport(js_error(&e)))?;
        let response: web_sys::Response = value
            .dyn_into()
            .map_err(|_| NetworkError::Transport("fetch did not yield a Response".to_string()))?;
        response_from_js(response).await
    }
}

fn host_error(value: JsValue) -> HostError {
    HostError(js_error(&value))
}

/// Worker-scope lifecycle calls.
#[derive(Clone)]
pub struct BrowserHost {
    scope: ServiceWorkerGlobalScope,
}

impl WorkerHost for BrowserHost {
    async fn skip_waiting(&self) -> Result<(), HostError> {
        let promise = self.scope.skip_waiting().map_err(host_error)?;
        JsFuture::from(promise).await.map_err(host_error)?;
        Ok(())
    }

    async fn claim_clients(&self) -> Result<(), HostError> {
        JsFuture::from(self.scope.clients().claim())
            .await
            .map_err(host_error)?;
        Ok(())
    }

    async fn notify_clients(&self, message: ClientMessage) -> Result<(), HostError> {
        let value =
            serde_wasm_bindgen::to_value(&message).map_err(|e| HostError(e.to_string()))?;
        let list = JsFuture::from(self.scope.clients().match_all())
            .await
            .map_err(host_error)?;

        for client in Array::from(&list).iter() {
            let client: Client = client
                .dyn_into()
                .map_err(|_| HostError("matchAll yielded a non-client".to_string()))?;
            client.post_message(&value).map_err(host_error)?;
        }
        Ok(())
    }
}

struct MessagePortReply(MessagePort);

impl ReplyPort for MessagePortReply {
    fn post_ack(&self, ack: ClearCacheAck) {
        let result = serde_wasm_bindgen::to_value(&ack)
            .map_err(|e| e.to_string())
            .and_then(|value| self.0.post_message(&value).map_err(|e| js_error(&e)));
        if let Err(e) = result {
            log::warn!("Failed to acknowledge CLEAR_CACHE: {}", e);
        }
    }
}

fn listen<E, F>(scope: &ServiceWorkerGlobalScope, name: &str, handler: F) -> Result<(), JsValue>
where
    E: JsCast + 'static,
    F: Fn(E) -> Result<(), JsValue> + 'static,
{
    let event_name = name.to_string();
    let closure = Closure::wrap(Box::new(move |event: JsValue| {
        if let Err(e) = handler(event.unchecked_into()) {
            log::error!("{} handler failed: {}", event_name, js_error(&e));
        }
    }) as Box<dyn FnMut(JsValue)>);

    scope.add_event_listener_with_callback(name, closure.as_ref().unchecked_ref())?;
    closure.forget(); // lives as long as the worker
    Ok(())
}

fn storage_rejection(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&e.to_string())
}

fn on_fetch(worker: &Rc<BrowserWorker>, event: FetchEvent) -> Result<(), JsValue> {
    let request = request_from_js(&event.request());
    let Some(class) = worker.router().classify(&request) else {
        return Ok(());
    };

    let worker = worker.clone();
    let lifetime = event.clone();
    let promise = future_to_promise(async move {
        let handled = worker.router().respond(class, &request).await;

        if let Some(revalidation) = handled.revalidation {
            let refresh = future_to_promise(async move {
                revalidation.await;
                Ok(JsValue::UNDEFINED)
            });
            if let Err(e) = lifetime.wait_until(&refresh) {
                log::debug!("Could not extend fetch lifetime: {}", js_error(&e));
            }
        }

        match handled.response {
            Some(response) => response_to_js(&response).map(JsValue::from),
            None => Ok(web_sys::Response::error().into()),
        }
    });

    event.respond_with(&promise)
}

fn on_message(worker: &Rc<BrowserWorker>, event: ExtendableMessageEvent) -> Result<(), JsValue> {
    let message: WorkerMessage = match serde_wasm_bindgen::from_value(event.data()) {
        Ok(message) => message,
        Err(e) => {
            log::debug!("Ignoring unreadable message: {}", e);
            return Ok(());
        }
    };
    let port = event
        .ports()
        .get(0)
        .dyn_into::<MessagePort>()
        .ok()
        .map(MessagePortReply);

    let worker = worker.clone();
    let promise = future_to_promise(async move {
        let reply = port.as_ref().map(|port| port as &dyn ReplyPort);
        worker
            .on_message(message, reply)
            .await
            .map_err(storage_rejection)?;
        Ok(JsValue::UNDEFINED)
    });
    event.wait_until(&promise)
}

/// Registers the worker's event listeners on the global scope.
#[wasm_bindgen]
pub fn start_service_worker() -> Result<(), JsValue> {
    crate::logging::init();

    let scope: ServiceWorkerGlobalScope = js_sys::global().dyn_into()?;
    let store = BrowserCacheStorage::new(scope.caches()?);
    let network = BrowserNetwork {
        scope: scope.clone(),
    };
    let host = BrowserHost {
        scope: scope.clone(),
    };
    let worker = Rc::new(ServiceWorker::new(
        WorkerConfig::default(),
        store,
        network,
        host,
    ));

    let w = worker.clone();
    listen(&scope, "install", move |event: ExtendableEvent| {
        let w = w.clone();
        let promise = future_to_promise(async move {
            let report = w.on_install().await.map_err(storage_rejection)?;
            if !report.is_complete() {
                log::warn!("Installed without {:?}", report.failed);
            }
            Ok(JsValue::UNDEFINED)
        });
        event.wait_until(&promise)
    })?;

    let w = worker.clone();
    listen(&scope, "activate", move |event: ExtendableEvent| {
        let w = w.clone();
        let promise = future_to_promise(async move {
            w.on_activate().await.map_err(storage_rejection)?;
            Ok(JsValue::UNDEFINED)
        });
        event.wait_until(&promise)
    })?;

    let w = worker.clone();
    listen(&scope, "fetch", move |event: FetchEvent| on_fetch(&w, event))?;

    let w = worker.clone();
    listen(&scope, "message", move |event: ExtendableMessageEvent| {
        on_message(&w, event)
    })?;

    let w = worker.clone();
    listen(&scope, "sync", move |event: ExtendableEvent| {
        let tag = Reflect::get(&event, &JsValue::from_str("tag"))?
            .as_string()
            .unwrap_or_default();
        let w = w.clone();
        let promise = future_to_promise(async move {
            let position = w.on_sync(&tag).await;
            serde_wasm_bindgen::to_value(&position).map_err(storage_rejection)
        });
        event.wait_until(&promise)
    })?;

    let w = worker;
    let registration = scope.registration();
    listen(&scope, "push", move |event: ExtendableEvent| {
        let template = w.push_notification();
        let shown: Promise =
            registration.show_notification_with_options(&template.title, &template.to_options())?;
        event.wait_until(&shown)
    })?;

    log::info!("Service worker ready");
    Ok(())
}
