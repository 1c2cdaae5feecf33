//! Vector layers loaded from GeoJSON.

use geo_types::{Coord, Geometry, GeometryCollection, Rect};
use geojson::{GeoJson, JsonObject, Position, Value};
use serde_json::Value as JsonValue;

/// Where a feature sits, as seen by the spatial query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Footprint {
    /// A single point, tested by containment.
    Point(Coord<f64>),
    /// The bounding box of anything else, tested by intersection.
    Extent(Rect<f64>),
}

/// A geometry with its attributes.
///
/// Coordinates are `x = longitude`, `y = latitude`, as in GeoJSON.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub geometry: Geometry<f64>,
    /// Attributes vary per feature and may be missing entirely.
    pub properties: Option<JsonObject>,
}

impl Feature {
    pub fn new(geometry: impl Into<Geometry<f64>>) -> Self {
        Self {
            geometry: geometry.into(),
            properties: None,
        }
    }

    pub fn with_property(mut self, key: &str, value: impl Into<JsonValue>) -> Self {
        self.properties
            .get_or_insert_with(JsonObject::new)
            .insert(key.to_string(), value.into());
        self
    }

    /// The attribute value, treating JSON `null` as absent.
    pub fn property(&self, field: &str) -> Option<&JsonValue> {
        self.properties
            .as_ref()
            .and_then(|props| props.get(field))
            .filter(|value| !value.is_null())
    }

    /// `None` for empty geometries, which no spatial query can match.
    pub fn footprint(&self) -> Option<Footprint> {
        match &self.geometry {
            Geometry::Point(point) => Some(Footprint::Point(point.0)),
            geometry => bounding_rect(geometry).map(Footprint::Extent),
        }
    }

    /// The bounding box of the geometry, points included.
    pub fn bounds(&self) -> Option<Rect<f64>> {
        bounding_rect(&self.geometry)
    }

    /// Converts back to a GeoJSON feature.
    pub fn to_geojson(&self) -> geojson::Feature {
        geojson::Feature {
            bbox: None,
            geometry: Some(geojson::Geometry::new(Value::from(&self.geometry))),
            id: None,
            properties: self.properties.clone(),
            foreign_members: None,
        }
    }
}

/// Smallest rectangle holding every coordinate of `geometry`.
pub fn bounding_rect(geometry: &Geometry<f64>) -> Option<Rect<f64>> {
    let mut coords = Vec::new();
    collect_coords(geometry, &mut coords);
    union_of(coords.into_iter().map(|c| Rect::new(c, c)))
}

/// Smallest rectangle holding all of `rects`.
pub fn union_of(rects: impl IntoIterator<Item = Rect<f64>>) -> Option<Rect<f64>> {
    rects.into_iter().reduce(|a, b| {
        Rect::new(
            Coord {
                x: a.min().x.min(b.min().x),
                y: a.min().y.min(b.min().y),
            },
            Coord {
                x: a.max().x.max(b.max().x),
                y: a.max().y.max(b.max().y),
            },
        )
    })
}

fn collect_coords(geometry: &Geometry<f64>, out: &mut Vec<Coord<f64>>) {
    match geometry {
        Geometry::Point(p) => out.push(p.0),
        Geometry::Line(l) => out.extend([l.start, l.end]),
        Geometry::LineString(ls) => out.extend(ls.0.iter().copied()),
        Geometry::Polygon(p) => out.extend(p.exterior().0.iter().copied()),
        Geometry::MultiPoint(mp) => out.extend(mp.0.iter().map(|p| p.0)),
        Geometry::MultiLineString(mls) => {
            out.extend(mls.0.iter().flat_map(|ls| ls.0.iter().copied()))
        }
        Geometry::MultiPolygon(mp) => {
            out.extend(mp.0.iter().flat_map(|p| p.exterior().0.iter().copied()))
        }
        Geometry::GeometryCollection(gc) => {
            for g in &gc.0 {
                collect_coords(g, out);
            }
        }
        Geometry::Rect(r) => out.extend([r.min(), r.max()]),
        Geometry::Triangle(t) => out.extend(t.to_array()),
    }
}

/// A named set of features.
#[derive(Debug, Clone, Default)]
pub struct Layer {
    pub name: String,
    pub features: Vec<Feature>,
}

impl Layer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            features: Vec::new(),
        }
    }

    pub fn with_features(mut self, features: Vec<Feature>) -> Self {
        self.features = features;
        self
    }

    /// Loads features from GeoJSON text.
    ///
    /// Features without a usable geometry are skipped, as the map never
    /// draws them.
    pub fn from_geojson(name: impl Into<String>, geojson_str: &str) -> Result<Self, String> {
        let geojson: GeoJson = geojson_str
            .parse()
            .map_err(|e| format!("Failed to parse GeoJSON: {}", e))?;

        let mut layer = Layer::new(name);
        match geojson {
            GeoJson::FeatureCollection(fc) => {
                for feature in fc.features {
                    layer.push_geojson(feature);
                }
            }
            GeoJson::Feature(feature) => layer.push_geojson(feature),
            GeoJson::Geometry(geometry) => {
                if let Some(geometry) = convert_value(geometry.value) {
                    layer.features.push(Feature::new(geometry));
                }
            }
        }

        log::debug!("Loaded {} features into {}", layer.features.len(), layer.name);
        Ok(layer)
    }

    fn push_geojson(&mut self, feature: geojson::Feature) {
        let Some(geometry) = feature.geometry.and_then(|g| convert_value(g.value)) else {
            return;
        };
        self.features.push(Feature {
            geometry,
            properties: feature.properties,
        });
    }

    /// Property keys across all features, in first-seen order.
    pub fn field_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for props in self.features.iter().filter_map(|f| f.properties.as_ref()) {
            for key in props.keys() {
                if !names.contains(key) {
                    names.push(key.clone());
                }
            }
        }
        names
    }

    pub fn bounds(&self) -> Option<Rect<f64>> {
        union_of(self.features.iter().filter_map(Feature::bounds))
    }
}

fn positions_ok(positions: &[Position]) -> bool {
    positions.iter().all(|p| p.len() >= 2)
}

fn rings_ok(rings: &[Vec<Position>]) -> bool {
    !rings.is_empty() && rings.iter().all(|ring| positions_ok(ring))
}

/// Whether every position has two ordinates and every polygon a ring.
fn well_formed(value: &Value) -> bool {
    match value {
        Value::Point(position) => position.len() >= 2,
        Value::MultiPoint(positions) | Value::LineString(positions) => positions_ok(positions),
        Value::MultiLineString(lines) => lines.iter().all(|l| positions_ok(l)),
        Value::Polygon(rings) => rings_ok(rings),
        Value::MultiPolygon(polygons) => polygons.iter().all(|rings| rings_ok(rings)),
        Value::GeometryCollection(geometries) => geometries.iter().all(|g| well_formed(&g.value)),
    }
}

/// Converts a GeoJSON geometry, rejecting malformed positions and empty
/// polygons. Malformed members of a collection are dropped on their own.
fn convert_value(value: Value) -> Option<Geometry<f64>> {
    match value {
        Value::GeometryCollection(geometries) => {
            let converted: Vec<Geometry<f64>> = geometries
                .into_iter()
                .filter_map(|g| convert_value(g.value))
                .collect();
            Some(Geometry::GeometryCollection(GeometryCollection(converted)))
        }
        value if well_formed(&value) => match Geometry::<f64>::try_from(&value) {
            Ok(geometry) => Some(geometry),
            Err(e) => {
                log::debug!("Skipping geometry: {}", e);
                None
            }
        },
        _ => None,
    }
}

/// Loaded layers, addressed by their position in the layer list.
#[derive(Debug, Clone, Default)]
pub struct LayerSet {
    layers: Vec<Layer>,
}

impl LayerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a layer and returns its index.
    pub fn push(&mut self, layer: Layer) -> usize {
        self.layers.push(layer);
        self.layers.len() - 1
    }

    /// Loads a layer from GeoJSON text and returns its index.
    pub fn load_layer(&mut self, name: &str, geojson_str: &str) -> Result<usize, String> {
        let layer = Layer::from_geojson(name, geojson_str)?;
        Ok(self.push(layer))
    }

    pub fn get(&self, index: usize) -> Option<&Layer> {
        self.layers.get(index)
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Layer> {
        self.layers.iter()
    }

    /// Layer names in index order, for layer choosers.
    pub fn names(&self) -> Vec<&str> {
        self.layers.iter().map(|l| l.name.as_str()).collect()
    }
}
