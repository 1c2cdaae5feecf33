//! Query entry points for the map page.

use super::layer::LayerSet;
use super::presentation::{
    corners, AttributeQueryInput, MapView, QueryOutcome, QuerySession, ResultOverlay,
};
use geo_types::{Coord, Rect};
use serde::Serialize;
use wasm_bindgen::prelude::*;

/// The page's map, driven through callbacks.
///
/// The view is not read back from the page: each spatial query passes the
/// current bounds in.
struct CallbackMap {
    view: Rect<f64>,
    show_overlay: js_sys::Function,
    clear_overlay: js_sys::Function,
    fit_bounds: js_sys::Function,
}

impl CallbackMap {
    fn call(name: &str, callback: &js_sys::Function, arg: Option<&serde_json::Value>) {
        let serializer = serde_wasm_bindgen::Serializer::json_compatible();
        let arg = match arg.map(|v| v.serialize(&serializer)).transpose() {
            Ok(arg) => arg.unwrap_or(JsValue::UNDEFINED),
            Err(e) => {
                log::warn!("Could not encode {} argument: {}", name, e);
                return;
            }
        };
        if let Err(e) = callback.call1(&JsValue::NULL, &arg) {
            log::warn!("{} callback failed: {:?}", name, e);
        }
    }
}

impl MapView for CallbackMap {
    fn viewport(&self) -> Rect<f64> {
        self.view
    }

    fn fit_bounds(&mut self, bounds: Rect<f64>) {
        let corners = serde_json::json!(corners(bounds));
        Self::call("fitBounds", &self.fit_bounds, Some(&corners));
    }

    fn show_overlay(&mut self, overlay: &ResultOverlay) {
        Self::call("showOverlay", &self.show_overlay, Some(&overlay.to_json()));
    }

    fn clear_overlay(&mut self) {
        Self::call("clearOverlay", &self.clear_overlay, None);
    }
}

/// Layers loaded into the page, queried by index.
///
/// Results reach the map through the callbacks given at construction;
/// each query returns `{count, rejected, notice}`.
#[wasm_bindgen]
pub struct FeatureQuery {
    layers: LayerSet,
    session: QuerySession<CallbackMap>,
}

fn report(outcome: QueryOutcome) -> Result<JsValue, JsValue> {
    serde_wasm_bindgen::to_value(&outcome.report()).map_err(|e| JsValue::from_str(&e.to_string()))
}

#[wasm_bindgen]
impl FeatureQuery {
    /// `showOverlay({style, bounds, data})`, `clearOverlay()` and
    /// `fitBounds([[south, west], [north, east]])`.
    #[wasm_bindgen(constructor)]
    pub fn new(
        show_overlay: js_sys::Function,
        clear_overlay: js_sys::Function,
        fit_bounds: js_sys::Function,
    ) -> Self {
        crate::logging::init();
        let map = CallbackMap {
            view: Rect::new(Coord { x: 0.0, y: 0.0 }, Coord { x: 0.0, y: 0.0 }),
            show_overlay,
            clear_overlay,
            fit_bounds,
        };
        Self {
            layers: LayerSet::new(),
            session: QuerySession::new(map),
        }
    }

    /// Loads a GeoJSON layer and returns its index.
    #[wasm_bindgen(js_name = addLayer)]
    pub fn add_layer(&mut self, name: &str, geojson: &str) -> Result<usize, JsValue> {
        self.layers
            .load_layer(name, geojson)
            .map_err(|e| JsValue::from_str(&e))
    }

    /// Property keys of a layer, for the field chooser.
    #[wasm_bindgen(js_name = fieldNames)]
    pub fn field_names(&self, layer: usize) -> Result<JsValue, JsValue> {
        let names = self
            .layers
            .get(layer)
            .map(|l| l.field_names())
            .unwrap_or_default();
        serde_wasm_bindgen::to_value(&names).map_err(|e| JsValue::from_str(&e.to_string()))
    }

    #[wasm_bindgen(js_name = attributeQuery)]
    pub fn attribute_query(
        &mut self,
        layer: Option<usize>,
        field: String,
        operator: String,
        value: String,
    ) -> Result<JsValue, JsValue> {
        let input = AttributeQueryInput {
            layer,
            field,
            operator,
            value,
        };
        report(self.session.run_attribute(&self.layers, &input))
    }

    /// Queries the selected layers against the given view.
    #[wasm_bindgen(js_name = bboxQuery)]
    pub fn bbox_query(
        &mut self,
        selected: &[u32],
        west: f64,
        south: f64,
        east: f64,
        north: f64,
    ) -> Result<JsValue, JsValue> {
        self.session.map_mut().view =
            Rect::new(Coord { x: west, y: south }, Coord { x: east, y: north });
        let selected: Vec<usize> = selected.iter().map(|&i| i as usize).collect();
        report(self.session.run_spatial(&self.layers, &selected))
    }

    /// Removes the result overlay.
    pub fn clear(&mut self) {
        self.session.clear();
    }
}
