//! Hub-centred arrangement: the entity with the most relationships goes to
//! the middle of the canvas, the rest on a square grid around it.

use crate::geometry::Point;
use serde::Deserialize;
use std::f64::consts::PI;

use super::LayoutNode;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SmartLayoutOptions {
    pub grid_spacing: f64,
    pub center_offset: f64,
    pub canvas_width: f64,
    pub canvas_height: f64,
}

impl Default for SmartLayoutOptions {
    fn default() -> Self {
        Self {
            grid_spacing: 180.0,
            center_offset: 40.0,
            canvas_width: 1920.0,
            canvas_height: 1080.0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SmartLayout {
    options: SmartLayoutOptions,
}

impl SmartLayout {
    pub fn new(options: SmartLayoutOptions) -> Self {
        Self { options }
    }

    fn canvas_center(&self) -> Point {
        Point::new(self.options.canvas_width / 2.0, self.options.canvas_height / 2.0)
    }

    pub fn arrange(&self, nodes: &mut [LayoutNode]) {
        self.arrange_around(nodes, self.canvas_center());
    }

    /// Same as [`arrange`](Self::arrange) with an explicit centre point.
    pub fn arrange_around(&self, nodes: &mut [LayoutNode], center: Point) {
        match nodes.len() {
            0 => return,
            1 => {
                nodes[0].center_on(center);
                return;
            }
            _ => {}
        }

        // first one wins on ties
        let mut hub = 0;
        for (i, node) in nodes.iter().enumerate() {
            if node.relationship_count > nodes[hub].relationship_count {
                hub = i;
            }
        }
        nodes[hub].center_on(center);

        let rest: Vec<usize> = (0..nodes.len()).filter(|&i| i != hub).collect();
        let spacing = self.options.grid_spacing;
        let grid_size = (rest.len() as f64).sqrt().ceil() as usize;
        let span = (grid_size - 1) as f64 * spacing;
        let start_x = center.x - span / 2.0;
        let start_y = center.y - span / 2.0 - self.options.center_offset;

        let mut placed = 0;
        'grid: for row in 0..grid_size {
            for col in 0..grid_size {
                if placed == rest.len() {
                    break 'grid;
                }
                let cell = Point::new(start_x + col as f64 * spacing, start_y + row as f64 * spacing);
                if cell.distance(&center) < spacing * 0.8 {
                    continue;
                }
                nodes[rest[placed]].center_on(cell);
                placed += 1;
            }
        }

        // cells skipped near the hub leave some nodes over; put them on a ring
        let overflow = &rest[placed..];
        if !overflow.is_empty() {
            let radius = (grid_size + 1) as f64 * spacing / 2.0;
            let step = 2.0 * PI / overflow.len() as f64;
            for (k, &i) in overflow.iter().enumerate() {
                let angle = k as f64 * step;
                nodes[i].center_on(Point::new(
                    center.x + radius * angle.cos(),
                    center.y + radius * angle.sin(),
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::test_support::node;

    #[test]
    fn test_single_node_centered() {
        let mut nodes = vec![node("a", 200.0, 80.0, 0)];
        SmartLayout::default().arrange(&mut nodes);
        assert_eq!(nodes[0].center(), Point::new(960.0, 540.0));
    }

    #[test]
    fn test_hub_in_center() {
        let mut nodes = vec![
            node("a", 100.0, 50.0, 1),
            node("hub", 100.0, 50.0, 9),
            node("c", 100.0, 50.0, 2),
        ];
        SmartLayout::default().arrange(&mut nodes);
        assert_eq!(nodes[1].center(), Point::new(960.0, 540.0));
        for other in [&nodes[0], &nodes[2]] {
            assert!(other.center().distance(&nodes[1].center()) >= 180.0 * 0.8);
        }
    }

    #[test]
    fn test_overflow_goes_to_ring() {
        // one remaining node: 1x1 grid whose only cell is 40 above the hub
        let mut nodes = vec![node("hub", 100.0, 50.0, 5), node("b", 100.0, 50.0, 0)];
        SmartLayout::default().arrange(&mut nodes);
        let offset = nodes[1].center();
        // ring radius (1 + 1) * 180 / 2 at angle 0
        assert_eq!(offset, Point::new(960.0 + 180.0, 540.0));
    }

    #[test]
    fn test_empty_is_noop() {
        let mut nodes: Vec<LayoutNode> = Vec::new();
        SmartLayout::default().arrange(&mut nodes);
        assert!(nodes.is_empty());
    }
}
