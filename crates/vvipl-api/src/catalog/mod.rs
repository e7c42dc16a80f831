//! Parts catalog module.
//!
//! Collects the full parts catalog of a model by fetching its diagram
//! list and then the parts map of every diagram, merged by part number.

mod aggregator;
mod types;

pub use aggregator::{
    AggregateOptions, EP_GET_DIAGRAM_PARTS, EP_GET_DIAGRAMS, build_catalog, fetch_diagram_parts,
    fetch_diagrams,
};
pub use types::{Diagram, DiagramId, ModelRef, Part, PartsCatalog};
