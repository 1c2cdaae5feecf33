//! In-memory feature queries.
//!
//! Layers are loaded from GeoJSON into a [`LayerSet`]. An attribute query
//! filters one layer with a loosely typed predicate; a spatial query collects
//! the features of several layers that touch the current view. Results are
//! borrowed [`QueryResultSet`]s, which a [`QuerySession`] turns into a
//! highlighted overlay on a [`MapView`].

pub mod engine;
pub mod layer;
pub mod predicate;
pub mod presentation;

#[cfg(target_arch = "wasm32")]
mod web;

pub use engine::{
    run_attribute_query, run_predicate, run_query, run_spatial_bbox_query, QueryResultSet,
};
pub use layer::{Feature, Footprint, Layer, LayerSet};
pub use predicate::{AttributePredicate, Operator, QueryPredicate};
pub use presentation::{
    AttributeQueryInput, HighlightStyle, MapView, Notice, OutcomeReport, QueryKind, QueryOutcome,
    QuerySession, ResultOverlay,
};

#[cfg(target_arch = "wasm32")]
pub use web::FeatureQuery;
