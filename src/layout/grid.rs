//! Grid placement for entities added to a diagram.
//!
//! New entities go to the right of what is already on the canvas, wrapping
//! to the next row when the container width runs out. A cell is skipped when
//! it comes within a quarter padding of an existing box.

use crate::geometry::{Point, Rect, Size};
use serde::Deserialize;

use super::{LayoutNode, Placement};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GridLayoutOptions {
    pub container_width: f64,
    pub container_height: f64,
    pub entity_width: f64,
    pub entity_height: f64,
    pub padding: f64,
    pub margin: f64,
}

impl Default for GridLayoutOptions {
    fn default() -> Self {
        Self {
            container_width: 1920.0,
            container_height: 1080.0,
            entity_width: 200.0,
            entity_height: 80.0,
            padding: 40.0,
            margin: 40.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct GridLayoutResult {
    pub positions: Vec<Point>,
    pub grid_width: f64,
    pub grid_height: f64,
    pub columns: usize,
    pub rows: usize,
}

/// Max columns that fit the container, at least one.
pub fn max_columns(options: &GridLayoutOptions) -> usize {
    let cell = options.entity_width + options.padding;
    let fit = ((options.container_width - options.margin * 2.0 + options.padding) / cell).floor();
    if fit.is_finite() && fit >= 1.0 { fit as usize } else { 1 }
}

fn is_occupied(candidate: &Rect, occupied: &[Rect], buffer: f64) -> bool {
    occupied.iter().any(|pos| {
        !(candidate.right() + buffer < pos.x
            || candidate.x > pos.right() + buffer
            || candidate.bottom() + buffer < pos.y
            || candidate.y > pos.bottom() + buffer)
    })
}

/// Top-left positions for `count` new entities.
///
/// Cells that collide with `existing` (or with an entity placed earlier in
/// the same call) are skipped. After `max_columns * 10` rejected cells the
/// entity is placed at the current cell anyway.
pub fn calculate_grid_layout(
    count: usize,
    options: &GridLayoutOptions,
    existing: &[Rect],
) -> GridLayoutResult {
    if count == 0 {
        return GridLayoutResult::default();
    }

    let GridLayoutOptions {
        container_width,
        entity_width: width,
        entity_height: height,
        padding,
        margin,
        ..
    } = *options;

    let mut start_column = 0usize;
    let mut start_row = 0usize;
    if !existing.is_empty() {
        let max_x = existing.iter().map(Rect::right).fold(f64::MIN, f64::max);
        let max_y = existing.iter().map(Rect::bottom).fold(f64::MIN, f64::max);

        start_column = ((max_x + padding - margin) / (width + padding)).floor().max(0.0) as usize;
        if start_column as f64 * (width + padding) + margin + width > container_width {
            start_column = 0;
            start_row = ((max_y + padding - margin) / (height + padding)).floor().max(0.0) as usize;
        }
    }

    let max_columns = max_columns(options);
    let max_attempts = max_columns * 10;
    let buffer = padding / 4.0;
    let cell_at = |column: usize, row: usize| {
        Point::new(
            margin + column as f64 * (width + padding),
            margin + row as f64 * (height + padding),
        )
    };

    let mut occupied: Vec<Rect> = existing.to_vec();
    let mut positions = Vec::with_capacity(count);
    let mut column = start_column;
    let mut row = start_row;

    for _ in 0..count {
        let mut found = None;
        let mut attempts = 0;
        while found.is_none() && attempts < max_attempts {
            if column >= max_columns {
                column = 0;
                row += 1;
            }
            let p = cell_at(column, row);
            if !is_occupied(&Rect::new(p.x, p.y, width, height), &occupied, buffer) {
                found = Some(p);
            }
            column += 1;
            attempts += 1;
        }

        let p = match found {
            Some(p) => p,
            None => {
                tracing::warn!(column, row, "no free grid cell, placing anyway");
                let p = cell_at(column, row);
                column += 1;
                p
            }
        };
        occupied.push(Rect::new(p.x, p.y, width, height));
        positions.push(p);
    }

    let columns = count.min(max_columns);
    GridLayoutResult {
        positions,
        grid_width: columns as f64 * width + (columns as f64 - 1.0) * padding,
        grid_height: (row + 1) as f64 * (height + padding) - padding,
        columns,
        rows: row + 1,
    }
}

/// Grid placement as a [`Placement`]. The cell grows to the largest node so
/// that boxes placed together never overlap.
#[derive(Debug, Clone, Default)]
pub struct GridLayout {
    pub options: GridLayoutOptions,
}

impl GridLayout {
    pub fn new(options: GridLayoutOptions) -> Self {
        Self { options }
    }

    fn options_for(&self, sizes: impl IntoIterator<Item = Size>) -> GridLayoutOptions {
        let mut options = self.options.clone();
        for size in sizes {
            options.entity_width = options.entity_width.max(size.width);
            options.entity_height = options.entity_height.max(size.height);
        }
        options
    }

    /// Lay out `nodes` from scratch, ignoring where they are now.
    pub fn arrange(&self, nodes: &mut [LayoutNode]) {
        let options = self.options_for(nodes.iter().map(|n| Size::new(n.width, n.height)));
        let result = calculate_grid_layout(nodes.len(), &options, &[]);
        for (node, p) in nodes.iter_mut().zip(result.positions) {
            node.x = p.x;
            node.y = p.y;
        }
    }
}

impl Placement for GridLayout {
    fn place(&self, sizes: &[Size], existing: &[Rect]) -> Vec<Point> {
        let options = self.options_for(sizes.iter().copied());
        calculate_grid_layout(sizes.len(), &options, existing).positions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boxes(result: &GridLayoutResult, options: &GridLayoutOptions) -> Vec<Rect> {
        result
            .positions
            .iter()
            .map(|p| Rect::new(p.x, p.y, options.entity_width, options.entity_height))
            .collect()
    }

    #[test]
    fn test_empty_layout() {
        let result = calculate_grid_layout(0, &GridLayoutOptions::default(), &[]);
        assert!(result.positions.is_empty());
        assert_eq!(result.columns, 0);
        assert_eq!(result.rows, 0);
    }

    #[test]
    fn test_first_row_positions() {
        let options = GridLayoutOptions::default();
        let result = calculate_grid_layout(3, &options, &[]);
        assert_eq!(
            result.positions,
            vec![Point::new(40.0, 40.0), Point::new(280.0, 40.0), Point::new(520.0, 40.0)]
        );
        assert_eq!(result.columns, 3);
        assert_eq!(result.rows, 1);
        assert_eq!(result.grid_width, 3.0 * 200.0 + 2.0 * 40.0);
    }

    #[test]
    fn test_wraps_after_max_columns() {
        let options = GridLayoutOptions::default();
        // (1920 - 80 + 40) / 240 = 7.83
        assert_eq!(max_columns(&options), 7);
        let result = calculate_grid_layout(8, &options, &[]);
        assert_eq!(result.positions[7], Point::new(40.0, 160.0));
        assert_eq!(result.rows, 2);
        assert_eq!(result.grid_height, 2.0 * 120.0 - 40.0);
    }

    #[test]
    fn test_narrow_container_still_has_one_column() {
        let options = GridLayoutOptions {
            container_width: 100.0,
            ..Default::default()
        };
        assert_eq!(max_columns(&options), 1);
        let result = calculate_grid_layout(2, &options, &[]);
        assert_eq!(result.positions[1], Point::new(40.0, 160.0));
    }

    #[test]
    fn test_starts_right_of_existing() {
        let options = GridLayoutOptions::default();
        let existing = [Rect::new(40.0, 40.0, 200.0, 80.0)];
        let result = calculate_grid_layout(1, &options, &existing);
        // floor((240 + 40 - 40) / 240) = 1
        assert_eq!(result.positions[0], Point::new(280.0, 40.0));
    }

    #[test]
    fn test_moves_to_next_row_when_existing_fills_width() {
        let options = GridLayoutOptions::default();
        let existing = [Rect::new(1700.0, 40.0, 200.0, 80.0)];
        let result = calculate_grid_layout(1, &options, &existing);
        assert_eq!(result.positions[0].x, 40.0);
        assert!(result.positions[0].y >= 120.0);
        assert!(!Rect::new(result.positions[0].x, result.positions[0].y, 200.0, 80.0)
            .intersects(&existing[0]));
    }

    #[test]
    fn test_skips_cells_near_existing_boxes() {
        let options = GridLayoutOptions::default();
        // a box sitting on cell (2, 0), with the first cells free
        let existing = [
            Rect::new(40.0, 40.0, 10.0, 10.0),
            Rect::new(520.0, 40.0, 200.0, 80.0),
        ];
        let result = calculate_grid_layout(2, &options, &existing);
        let placed = boxes(&result, &options);
        for b in &placed {
            for e in &existing {
                assert!(!b.intersects(e));
            }
        }
        assert!(!placed[0].intersects(&placed[1]));
    }

    #[test]
    fn test_placement_uses_largest_node() {
        let grid = GridLayout::default();
        let sizes = [Size::new(480.0, 170.0), Size::new(480.0, 98.0)];
        let positions = grid.place(&sizes, &[]);
        assert_eq!(positions[1].x - positions[0].x, 480.0 + 40.0);
        let a = Rect::from_parts(positions[0], sizes[0]);
        let b = Rect::from_parts(positions[1], sizes[1]);
        assert!(!a.intersects(&b));
    }
}
