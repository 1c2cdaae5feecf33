//! Conversions between host request/response objects and the worker's own
//! values.

use super::http::{FetchRequest, NetworkError, RequestMode, Response, ResponseType};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;

/// Renders a thrown JS value for a log line or error message.
pub(crate) fn js_error(value: &JsValue) -> String {
    value.as_string().unwrap_or_else(|| format!("{:?}", value))
}

fn headers_from_js(headers: &web_sys::Headers) -> Vec<(String, String)> {
    let mut out = Vec::new();
    if let Ok(Some(entries)) = js_sys::try_iter(headers) {
        for entry in entries.flatten() {
            let pair = js_sys::Array::from(&entry);
            if let (Some(name), Some(value)) = (pair.get(0).as_string(), pair.get(1).as_string()) {
                out.push((name.to_ascii_lowercase(), value));
            }
        }
    }
    out
}

/// Reads an intercepted request. The host object is kept for replay.
pub(crate) fn request_from_js(request: &web_sys::Request) -> FetchRequest {
    let mode = match request.mode() {
        web_sys::RequestMode::Navigate => RequestMode::Navigate,
        web_sys::RequestMode::SameOrigin => RequestMode::SameOrigin,
        web_sys::RequestMode::NoCors => RequestMode::NoCors,
        _ => RequestMode::Cors,
    };

    FetchRequest {
        url: request.url(),
        method: request.method(),
        mode,
        headers: headers_from_js(&request.headers()),
        native: Some(Clone::clone(request)),
    }
}

/// Builds a host request, replaying the intercepted one when available.
pub(crate) fn request_to_js(request: &FetchRequest) -> Result<web_sys::Request, JsValue> {
    if let Some(native) = &request.native {
        return Ok(Clone::clone(native));
    }

    let init = web_sys::RequestInit::new();
    init.set_method(&request.method);
    let headers = web_sys::Headers::new()?;
    for (name, value) in &request.headers {
        headers.append(name, value)?;
    }
    init.set_headers(&headers);
    web_sys::Request::new_with_str_and_init(&request.url, &init)
}

/// Reads a host response.
///
/// The body is read from a host-side copy so the original stays unread and
/// can still be handed to the document.
pub(crate) async fn response_from_js(native: web_sys::Response) -> Result<Response, NetworkError> {
    let response_type = match native.type_() {
        web_sys::ResponseType::Basic => ResponseType::Basic,
        web_sys::ResponseType::Cors => ResponseType::Cors,
        web_sys::ResponseType::Opaque | web_sys::ResponseType::Opaqueredirect => {
            ResponseType::Opaque
        }
        web_sys::ResponseType::Error => ResponseType::Error,
        _ => ResponseType::Default,
    };

    let body = match response_type {
        ResponseType::Opaque | ResponseType::Error => Vec::new(),
        _ => {
            let copy = native.clone().map_err(|e| NetworkError::Body(js_error(&e)))?;
            let promise = copy
                .array_buffer()
                .map_err(|e| NetworkError::Body(js_error(&e)))?;
            let buffer = JsFuture::from(promise)
                .await
                .map_err(|e| NetworkError::Body(js_error(&e)))?;
            js_sys::Uint8Array::new(&buffer).to_vec()
        }
    };

    Ok(Response {
        status: native.status(),
        status_text: native.status_text(),
        headers: headers_from_js(&native.headers()),
        body,
        response_type,
        native: Some(native),
    })
}

/// Returns the host response to answer a fetch with.
pub(crate) fn response_to_js(response: &Response) -> Result<web_sys::Response, JsValue> {
    match &response.native {
        Some(native) => Ok(Clone::clone(native)),
        None => fresh_response_to_js(response),
    }
}

/// Builds a new host response from the stored fields, never reusing the
/// original host object (whose body may already be on its way to the page).
pub(crate) fn fresh_response_to_js(response: &Response) -> Result<web_sys::Response, JsValue> {
    let init = web_sys::ResponseInit::new();
    init.set_status(response.status);
    init.set_status_text(&response.status_text);

    let headers = web_sys::Headers::new()?;
    for (name, value) in &response.headers {
        headers.append(name, value)?;
    }
    init.set_headers(&headers);

    if response.body.is_empty() {
        web_sys::Response::new_with_opt_str_and_init(None, &init)
    } else {
        let body = js_sys::Uint8Array::from(response.body.as_slice());
        web_sys::Response::new_with_opt_buffer_source_and_init(Some(&body), &init)
    }
}
