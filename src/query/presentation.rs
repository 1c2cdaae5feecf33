//! Showing query results on the map.
//!
//! A [`QuerySession`] owns the single result overlay. Every run clears the
//! previous overlay before scanning, so starting a query is also how an
//! earlier one is discarded.

use super::engine::{run_attribute_query, run_spatial_bbox_query, QueryResultSet};
use super::layer::{Feature, LayerSet};
use geo_types::Rect;
use geojson::FeatureCollection;
use serde::Serialize;
use serde_json::json;
use std::fmt;

/// Outline style of highlighted results.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HighlightStyle {
    pub color: &'static str,
    pub weight: u32,
    pub fill: bool,
    /// Radius of the circle drawn for point features.
    pub point_radius: f64,
}

impl HighlightStyle {
    pub const ATTRIBUTE: Self = Self {
        color: "#ff0000",
        weight: 3,
        fill: false,
        point_radius: 6.0,
    };

    pub const SPATIAL: Self = Self {
        color: "#0078ff",
        weight: 3,
        fill: false,
        point_radius: 6.0,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Attribute,
    Spatial,
}

impl QueryKind {
    pub fn style(&self) -> HighlightStyle {
        match self {
            Self::Attribute => HighlightStyle::ATTRIBUTE,
            Self::Spatial => HighlightStyle::SPATIAL,
        }
    }

    fn empty_notice(&self) -> Notice {
        match self {
            Self::Attribute => Notice::NoResults,
            Self::Spatial => Notice::NoResultsInView,
        }
    }
}

/// Highlighted copy of a query's matches.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultOverlay {
    pub kind: QueryKind,
    pub style: HighlightStyle,
    pub features: Vec<Feature>,
    pub bounds: Option<Rect<f64>>,
}

impl ResultOverlay {
    pub fn new(kind: QueryKind, results: &QueryResultSet<'_>) -> Self {
        Self {
            kind,
            style: kind.style(),
            features: results.iter().cloned().collect(),
            bounds: results.bounds(),
        }
    }

    pub fn to_feature_collection(&self) -> FeatureCollection {
        FeatureCollection {
            bbox: None,
            features: self.features.iter().map(Feature::to_geojson).collect(),
            foreign_members: None,
        }
    }

    /// The overlay as handed to the page's map: `{style, bounds, data}`, with
    /// bounds as `[[south, west], [north, east]]`.
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "style": self.style,
            "bounds": self.bounds.map(corners),
            "data": self.to_feature_collection(),
        })
    }
}

/// `[[south, west], [north, east]]`, the corner order map libraries take.
pub fn corners(rect: Rect<f64>) -> [[f64; 2]; 2] {
    [[rect.min().y, rect.min().x], [rect.max().y, rect.max().x]]
}

/// Transient message shown to the user instead of results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    NoResults,
    NoResultsInView,
    MissingFields,
    LayerNotFound,
    NoLayerSelected,
}

impl Notice {
    pub fn message(&self) -> &'static str {
        match self {
            Self::NoResults => "Aucun résultat",
            Self::NoResultsInView => "Aucun résultat dans la vue actuelle",
            Self::MissingFields => "Remplissez tous les champs",
            Self::LayerNotFound => "Couche introuvable",
            Self::NoLayerSelected => "Choisissez au moins une couche",
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// The map as seen by the query tools.
pub trait MapView {
    /// Currently visible rectangle.
    fn viewport(&self) -> Rect<f64>;
    fn fit_bounds(&mut self, bounds: Rect<f64>);
    fn show_overlay(&mut self, overlay: &ResultOverlay);
    fn clear_overlay(&mut self);
}

/// Raw form input for an attribute query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeQueryInput {
    pub layer: Option<usize>,
    pub field: String,
    pub operator: String,
    pub value: String,
}

/// What a query run produced.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    /// Matches were highlighted and framed.
    Shown { count: usize },
    /// The query ran and matched nothing.
    Empty(Notice),
    /// The input was rejected and nothing ran.
    Rejected(Notice),
}

impl QueryOutcome {
    pub fn notice(&self) -> Option<Notice> {
        match self {
            Self::Shown { .. } => None,
            Self::Empty(notice) | Self::Rejected(notice) => Some(*notice),
        }
    }

    pub fn report(&self) -> OutcomeReport {
        OutcomeReport {
            count: match self {
                Self::Shown { count } => *count,
                _ => 0,
            },
            rejected: matches!(self, Self::Rejected(_)),
            notice: self.notice().map(|n| n.message()),
        }
    }
}

/// [`QueryOutcome`] in the shape returned to the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutcomeReport {
    pub count: usize,
    /// The input was refused before any scan.
    pub rejected: bool,
    /// Message to show instead of results.
    pub notice: Option<&'static str>,
}

/// Runs queries against a map and keeps its result overlay.
pub struct QuerySession<M> {
    map: M,
    overlay: Option<ResultOverlay>,
}

impl<M: MapView> QuerySession<M> {
    pub fn new(map: M) -> Self {
        Self { map, overlay: None }
    }

    pub fn map(&self) -> &M {
        &self.map
    }

    pub fn map_mut(&mut self) -> &mut M {
        &mut self.map
    }

    pub fn overlay(&self) -> Option<&ResultOverlay> {
        self.overlay.as_ref()
    }

    pub fn clear(&mut self) {
        self.map.clear_overlay();
        self.overlay = None;
    }

    pub fn run_attribute(&mut self, layers: &LayerSet, input: &AttributeQueryInput) -> QueryOutcome {
        let Some(index) = input.layer else {
            return QueryOutcome::Rejected(Notice::MissingFields);
        };
        if input.field.is_empty() || input.value.is_empty() {
            return QueryOutcome::Rejected(Notice::MissingFields);
        }
        let Some(layer) = layers.get(index) else {
            return QueryOutcome::Rejected(Notice::LayerNotFound);
        };

        self.clear();
        let results = run_attribute_query(layer, &input.field, &input.operator, &input.value);
        self.present(QueryKind::Attribute, &results)
    }

    /// Queries the selected layers against the map's current view.
    pub fn run_spatial(&mut self, layers: &LayerSet, selected: &[usize]) -> QueryOutcome {
        if selected.is_empty() {
            return QueryOutcome::Rejected(Notice::NoLayerSelected);
        }

        self.clear();
        let view = self.map.viewport();
        let results = run_spatial_bbox_query(layers, selected, view);
        self.present(QueryKind::Spatial, &results)
    }

    fn present(&mut self, kind: QueryKind, results: &QueryResultSet<'_>) -> QueryOutcome {
        if results.is_empty() {
            return QueryOutcome::Empty(kind.empty_notice());
        }

        let overlay = ResultOverlay::new(kind, results);
        self.map.show_overlay(&overlay);
        if let Some(bounds) = overlay.bounds {
            self.map.fit_bounds(bounds);
        }
        self.overlay = Some(overlay);
        QueryOutcome::Shown {
            count: results.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::layer::Layer;
    use geo_types::{point, Coord};

    #[derive(Default)]
    struct RecordingMap {
        view: Option<Rect<f64>>,
        calls: Vec<String>,
        shown: Option<ResultOverlay>,
    }

    impl MapView for RecordingMap {
        fn viewport(&self) -> Rect<f64> {
            self.view.unwrap_or(Rect::new(
                Coord { x: -16.3, y: 15.5 },
                Coord { x: -16.1, y: 15.7 },
            ))
        }

        fn fit_bounds(&mut self, bounds: Rect<f64>) {
            self.calls.push(format!("fit {:?}", bounds.min()));
        }

        fn show_overlay(&mut self, overlay: &ResultOverlay) {
            self.calls.push(format!("show {}", overlay.features.len()));
            self.shown = Some(overlay.clone());
        }

        fn clear_overlay(&mut self) {
            self.calls.push("clear".to_string());
            self.shown = None;
        }
    }

    fn layers() -> LayerSet {
        let mut layers = LayerSet::new();
        layers.push(Layer::new("communes").with_features(vec![
            Feature::new(point!(x: -16.2, y: 15.6))
                .with_property("nom", "Louga")
                .with_property("population", "104349"),
            Feature::new(point!(x: -15.0, y: 15.0))
                .with_property("nom", "Kébémer")
                .with_property("population", "abc"),
        ]));
        layers
    }

    fn input(field: &str, operator: &str, value: &str) -> AttributeQueryInput {
        AttributeQueryInput {
            layer: Some(0),
            field: field.to_string(),
            operator: operator.to_string(),
            value: value.to_string(),
        }
    }

    #[test]
    fn test_attribute_results_are_highlighted_and_framed() {
        let mut session = QuerySession::new(RecordingMap::default());
        let outcome = session.run_attribute(&layers(), &input("nom", "=", "Louga"));

        assert_eq!(outcome, QueryOutcome::Shown { count: 1 });
        assert_eq!(session.map().calls[0], "clear");
        assert_eq!(session.map().calls[1], "show 1");
        assert!(session.map().calls[2].starts_with("fit"));
        assert_eq!(session.overlay().unwrap().style.color, "#ff0000");
    }

    #[test]
    fn test_absent_field_reports_no_results() {
        let mut session = QuerySession::new(RecordingMap::default());
        let outcome = session.run_attribute(&layers(), &input("superficie", ">", "1"));

        assert_eq!(outcome, QueryOutcome::Empty(Notice::NoResults));
        assert_eq!(outcome.notice().unwrap().message(), "Aucun résultat");
        assert!(session.overlay().is_none());
    }

    #[test]
    fn test_new_query_replaces_previous_overlay() {
        let mut session = QuerySession::new(RecordingMap::default());
        let layers = layers();
        session.run_attribute(&layers, &input("nom", "contains", "louga"));
        assert!(session.map().shown.is_some());

        let outcome = session.run_attribute(&layers, &input("nom", "=", "Dakar"));
        assert_eq!(outcome, QueryOutcome::Empty(Notice::NoResults));
        assert!(session.map().shown.is_none());
        assert!(session.overlay().is_none());
    }

    #[test]
    fn test_input_validation() {
        let mut session = QuerySession::new(RecordingMap::default());
        let layers = layers();

        let mut missing = input("nom", "=", "");
        assert_eq!(
            session.run_attribute(&layers, &missing),
            QueryOutcome::Rejected(Notice::MissingFields)
        );
        missing.layer = None;
        missing.value = "x".to_string();
        assert_eq!(
            session.run_attribute(&layers, &missing),
            QueryOutcome::Rejected(Notice::MissingFields)
        );

        let mut unknown = input("nom", "=", "Louga");
        unknown.layer = Some(4);
        assert_eq!(
            session.run_attribute(&layers, &unknown),
            QueryOutcome::Rejected(Notice::LayerNotFound)
        );

        assert_eq!(
            session.run_spatial(&layers, &[]),
            QueryOutcome::Rejected(Notice::NoLayerSelected)
        );
        assert!(session.map().calls.is_empty());
    }

    #[test]
    fn test_spatial_query_uses_current_view() {
        let mut session = QuerySession::new(RecordingMap::default());
        let layers = layers();

        let outcome = session.run_spatial(&layers, &[0]);
        assert_eq!(outcome, QueryOutcome::Shown { count: 1 });
        assert_eq!(session.overlay().unwrap().style, HighlightStyle::SPATIAL);

        session.map.view = Some(Rect::new(Coord { x: 0.0, y: 0.0 }, Coord { x: 1.0, y: 1.0 }));
        let outcome = session.run_spatial(&layers, &[0]);
        assert_eq!(
            outcome.notice().unwrap().message(),
            "Aucun résultat dans la vue actuelle"
        );
    }

    #[test]
    fn test_overlay_exports_geojson() {
        let mut session = QuerySession::new(RecordingMap::default());
        session.run_attribute(&layers(), &input("population", ">", "1000"));

        let collection = session.overlay().unwrap().to_feature_collection();
        assert_eq!(collection.features.len(), 1);
        let props = collection.features[0].properties.as_ref().unwrap();
        assert_eq!(props["nom"], "Louga");
    }

    #[test]
    fn test_outcome_report_carries_notice() {
        let mut session = QuerySession::new(RecordingMap::default());
        let layers = layers();

        let shown = session.run_attribute(&layers, &input("nom", "=", "Louga")).report();
        assert_eq!(
            shown,
            OutcomeReport {
                count: 1,
                rejected: false,
                notice: None
            }
        );

        let empty = session.run_attribute(&layers, &input("nom", "=", "Dakar")).report();
        assert_eq!(empty.notice, Some("Aucun résultat"));
        assert!(!empty.rejected);

        let refused = session.run_spatial(&layers, &[]).report();
        assert_eq!(refused.notice, Some("Choisissez au moins une couche"));
        assert!(refused.rejected);

        let json = serde_json::to_value(&refused).unwrap();
        assert_eq!(json["count"], 0);
    }

    #[test]
    fn test_overlay_json_for_the_page() {
        let mut session = QuerySession::new(RecordingMap::default());
        session.run_spatial(&layers(), &[0]);

        let json = session.overlay().unwrap().to_json();
        assert_eq!(json["style"]["color"], "#0078ff");
        assert_eq!(json["style"]["pointRadius"], 6.0);
        assert_eq!(json["bounds"][0][0], 15.6);
        assert_eq!(json["bounds"][0][1], -16.2);
        assert_eq!(json["data"]["type"], "FeatureCollection");
        assert_eq!(json["data"]["features"].as_array().unwrap().len(), 1);
    }
}
