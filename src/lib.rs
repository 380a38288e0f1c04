pub mod config;
pub mod geometry;
pub mod layout;
pub mod measure;
pub mod metadata;
pub mod model;
pub mod relationships;
pub mod routing;
pub mod selection;
pub mod serialization;
pub mod svg;
pub mod viewport;

use wasm_bindgen::prelude::*;

use geometry::Rect;
use layout::{GridLayoutOptions, calculate_grid_layout};
use metadata::Catalog;
use model::CellSnapshot;
use routing::{RouterOptions, RouterRequest, RoutingWorker};
use serialization::{deserialize_diagram, parse_diagram};
use svg::SvgRenderer;
use viewport::ViewportOptions;

/// Initialize panic hook for better error messages in WASM
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(target_arch = "wasm32")]
    console_error_panic_hook::set_once();
}

fn options_from<T: serde::de::DeserializeOwned + Default>(json: Option<String>) -> Result<T, String> {
    match json.as_deref() {
        Some(json) if !json.trim().is_empty() => serde_json::from_str(json).map_err(|e| e.to_string()),
        _ => Ok(T::default()),
    }
}

/// Grid positions for `count` new entities as `[x0, y0, x1, y1, ...]`.
/// `existing` holds the boxes already on the canvas as `[x, y, w, h, ...]`.
#[wasm_bindgen(js_name = "calculateGridLayout")]
pub fn grid_layout(count: usize, existing: &[f64], options: Option<String>) -> Result<js_sys::Float64Array, String> {
    let options: GridLayoutOptions = options_from(options)?;
    let existing: Vec<Rect> = existing
        .chunks_exact(4)
        .map(|c| Rect::new(c[0], c[1], c[2], c[3]))
        .collect();
    let result = calculate_grid_layout(count, &options, &existing);
    let flat: Vec<f64> = result.positions.iter().flat_map(|p| [p.x, p.y]).collect();
    Ok(js_sys::Float64Array::from(flat.as_slice()))
}

/// Route every link among `cells` (a JSON array of cell snapshots) in one
/// pass. Returns the `routed` response as JSON.
#[wasm_bindgen(js_name = "routeCells")]
pub fn route_cells(cells: &str, options: Option<String>) -> Result<String, String> {
    let cells: Vec<CellSnapshot> = serde_json::from_str(cells).map_err(|e| e.to_string())?;
    let mut worker = RoutingWorker::new(options_from::<RouterOptions>(options)?);
    worker.handle(RouterRequest::Reset { cells });
    worker.process().to_json().map_err(|e| e.to_string())
}

/// Relationships between two entities, seen from `source`, as JSON.
#[wasm_bindgen(js_name = "relationshipsBetween")]
pub fn relationships_between(metadata: &str, source: &str, target: &str) -> Result<String, String> {
    let catalog = Catalog::from_json(metadata).map_err(|e| e.to_string())?;
    let (Some(a), Some(b)) = (catalog.entity(source), catalog.entity(target)) else {
        return Err(format!("Entity not found: {} or {}", source, target));
    };
    serde_json::to_string(&relationships::relationships_between(a, b)).map_err(|e| e.to_string())
}

/// Render a saved diagram to SVG
#[wasm_bindgen(js_name = "diagramToSvg")]
pub fn render_diagram(metadata: &str, diagram: &str) -> Result<String, String> {
    let catalog = Catalog::from_json(metadata).map_err(|e| e.to_string())?;
    let doc = parse_diagram(diagram).map_err(|e| e.to_string())?;
    let (graph, _) = deserialize_diagram(&doc, &catalog, ViewportOptions::default());
    Ok(SvgRenderer::default().render(&graph))
}
