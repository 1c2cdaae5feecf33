//! Attribute and spatial queries over loaded layers.
//!
//! Both scans are synchronous and visit features in layer order, so results
//! come back in scan order. Neither fails: a query that matches nothing
//! returns an empty set.

use super::layer::{union_of, Feature, Footprint, Layer, LayerSet};
use super::predicate::{AttributePredicate, QueryPredicate};
use geo_types::{Coord, Rect};

/// Features matched by a query, borrowed from their layers.
#[derive(Debug, Clone, Default)]
pub struct QueryResultSet<'a> {
    matches: Vec<&'a Feature>,
}

impl<'a> QueryResultSet<'a> {
    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a Feature> + '_ {
        self.matches.iter().copied()
    }

    pub fn features(&self) -> &[&'a Feature] {
        &self.matches
    }

    /// Bounding box of every match, used to frame the view.
    pub fn bounds(&self) -> Option<Rect<f64>> {
        union_of(self.matches.iter().filter_map(|f| f.bounds()))
    }
}

/// Runs `field <operator> value` over every feature of `layer`.
pub fn run_attribute_query<'a>(
    layer: &'a Layer,
    field: &str,
    operator: &str,
    value: &str,
) -> QueryResultSet<'a> {
    run_predicate(layer, &AttributePredicate::new(field, operator, value))
}

pub fn run_predicate<'a>(layer: &'a Layer, predicate: &AttributePredicate) -> QueryResultSet<'a> {
    let matches: Vec<&Feature> = layer
        .features
        .iter()
        .filter(|feature| predicate.matches(feature))
        .collect();

    log::info!(
        "{} {} {:?} on {}: {} of {} features",
        predicate.field,
        predicate.operator,
        predicate.value,
        layer.name,
        matches.len(),
        layer.features.len()
    );
    QueryResultSet { matches }
}

/// Collects features of the selected layers that touch `view`.
///
/// Layers are visited in selection order without de-duplication; indices
/// with no layer behind them are skipped. The rectangle's edges count as
/// inside.
pub fn run_spatial_bbox_query<'a>(
    layers: &'a LayerSet,
    selected: &[usize],
    view: Rect<f64>,
) -> QueryResultSet<'a> {
    let mut matches = Vec::new();
    for &index in selected {
        let Some(layer) = layers.get(index) else {
            log::warn!("Skipping unknown layer index {}", index);
            continue;
        };
        matches.extend(
            layer
                .features
                .iter()
                .filter(|feature| touches(view, feature)),
        );
    }

    log::info!(
        "Spatial query over {} layers: {} features in view",
        selected.len(),
        matches.len()
    );
    QueryResultSet { matches }
}

/// Runs either kind of query. An attribute query on a missing layer matches
/// nothing.
pub fn run_query<'a>(layers: &'a LayerSet, query: &QueryPredicate) -> QueryResultSet<'a> {
    match query {
        QueryPredicate::Attribute { layer, predicate } => layers
            .get(*layer)
            .map(|layer| run_predicate(layer, predicate))
            .unwrap_or_default(),
        QueryPredicate::SpatialBBox {
            layers: selected,
            bounds,
        } => run_spatial_bbox_query(layers, selected, *bounds),
    }
}

fn touches(view: Rect<f64>, feature: &Feature) -> bool {
    match feature.footprint() {
        Some(Footprint::Point(point)) => contains(view, point),
        Some(Footprint::Extent(extent)) => intersects(view, extent),
        None => false,
    }
}

/// Inclusive point-in-rectangle test.
pub fn contains(rect: Rect<f64>, point: Coord<f64>) -> bool {
    point.x >= rect.min().x
        && point.x <= rect.max().x
        && point.y >= rect.min().y
        && point.y <= rect.max().y
}

/// Inclusive rectangle overlap test; touching edges intersect.
pub fn intersects(a: Rect<f64>, b: Rect<f64>) -> bool {
    a.min().x <= b.max().x
        && a.max().x >= b.min().x
        && a.min().y <= b.max().y
        && a.max().y >= b.min().y
}
