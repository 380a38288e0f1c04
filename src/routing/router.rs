//! Orthogonal edge routing.
//!
//! A route leaves each endpoint horizontally, on the side of its port (or
//! the side facing the other node), and joins the two exits with one
//! vertical channel. When the channel or its horizontal legs run through a
//! node, the channel is nudged sideways; failing that a horizontal channel
//! between the nodes is tried, and as a last resort the route goes over the
//! top of everything.

use crate::geometry::{Point, Rect};
use crate::model::{CellSnapshot, ElementSnapshot, Endpoint, LinkSnapshot, PortSide};
use serde::Deserialize;
use std::collections::HashMap;

const MAX_NUDGE_STEPS: usize = 100;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RouterOptions {
    pub shape_buffer_distance: f64, // clearance around every node
    pub ideal_nudging_distance: f64, // channel step, also the lane spacing
    pub port_overflow: usize,        // parallel links that get a lane of their own
    pub self_loop_offset: f64,
    pub debounce_ms: u64,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            shape_buffer_distance: 20.0,
            ideal_nudging_distance: 10.0,
            port_overflow: 8,
            self_loop_offset: 25.0,
            debounce_ms: 100,
        }
    }
}

/// Offset of `lane` when `total` parallel links share a channel, centred on
/// the channel.
#[inline]
pub fn calculate_lane_offset(lane: usize, total: usize, lane_spacing: f64) -> f64 {
    if total <= 1 {
        0.0
    } else {
        (lane as f64 - (total - 1) as f64 / 2.0) * lane_spacing
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor {
    pub point: Point,
    pub side: PortSide,
}

impl Anchor {
    fn direction(&self) -> f64 {
        match self.side {
            PortSide::Left => -1.0,
            PortSide::Right => 1.0,
        }
    }

    fn exit(&self, stub: f64) -> Point {
        Point::new(self.point.x + self.direction() * stub, self.point.y)
    }
}

/// Where a link end attaches: the port if it exists, otherwise the middle
/// of the side facing `toward`.
pub fn anchor_for(element: &ElementSnapshot, port: Option<&str>, toward: Point) -> Anchor {
    let bbox = element.bbox();
    if let Some(p) = port.and_then(|id| element.ports.iter().find(|p| p.id == id)) {
        let x = match p.side {
            PortSide::Left => bbox.x,
            PortSide::Right => bbox.right(),
        };
        return Anchor {
            point: Point::new(x, bbox.y + p.y),
            side: p.side,
        };
    }
    let center = bbox.center();
    if toward.x >= center.x {
        Anchor {
            point: Point::new(bbox.right(), center.y),
            side: PortSide::Right,
        }
    } else {
        Anchor {
            point: Point::new(bbox.x, center.y),
            side: PortSide::Left,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct OrthogonalRouter {
    options: RouterOptions,
}

impl OrthogonalRouter {
    pub fn new(options: RouterOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &RouterOptions {
        &self.options
    }

    /// Vertices (bend points, endpoints excluded) for one link.
    /// `lane` is `(index, total)` among links between the same two nodes.
    pub fn route(
        &self,
        source: &ElementSnapshot,
        source_port: Option<&str>,
        target: &ElementSnapshot,
        target_port: Option<&str>,
        obstacles: &[Rect],
        lane: (usize, usize),
    ) -> Vec<Point> {
        let total = lane.1.min(self.options.port_overflow.max(1));
        let offset = calculate_lane_offset(lane.0 % total.max(1), total, self.options.ideal_nudging_distance);

        if source.id == target.id {
            return self.route_self_ref(source, source_port, target_port, lane.0);
        }

        let a = anchor_for(source, source_port, target.bbox().center());
        let b = anchor_for(target, target_port, source.bbox().center());
        let buffer = self.options.shape_buffer_distance;
        let inflated: Vec<Rect> = obstacles.iter().map(|r| r.inflate(buffer)).collect();
        let (a_exit, b_exit) = (a.exit(buffer), b.exit(buffer));

        let path = self
            .vertical_channel(a_exit, b_exit, offset, &inflated)
            .or_else(|| self.horizontal_channel(a_exit, b_exit, offset, &inflated))
            .unwrap_or_else(|| self.detour(a_exit, b_exit, &inflated));

        let mut full = Vec::with_capacity(path.len() + 2);
        full.push(a.point);
        full.extend(path);
        full.push(b.point);
        let simplified = simplify(&full);
        if simplified.len() < 2 {
            return Vec::new();
        }
        simplified[1..simplified.len() - 1].to_vec()
    }

    /// A -> (x, A.y) -> (x, B.y) -> B, nudging x away from the midpoint.
    fn vertical_channel(&self, a: Point, b: Point, offset: f64, obstacles: &[Rect]) -> Option<Vec<Point>> {
        let mid = (a.x + b.x) / 2.0 + offset;
        nudged(mid, self.options.ideal_nudging_distance).find_map(|x| {
            let path = vec![a, Point::new(x, a.y), Point::new(x, b.y), b];
            is_clear(&path, obstacles).then_some(path)
        })
    }

    /// A -> (A.x, y) -> (B.x, y) -> B, for nodes stacked above each other.
    fn horizontal_channel(&self, a: Point, b: Point, offset: f64, obstacles: &[Rect]) -> Option<Vec<Point>> {
        let mid = (a.y + b.y) / 2.0 + offset;
        nudged(mid, self.options.ideal_nudging_distance).find_map(|y| {
            let path = vec![a, Point::new(a.x, y), Point::new(b.x, y), b];
            is_clear(&path, obstacles).then_some(path)
        })
    }

    fn detour(&self, a: Point, b: Point, obstacles: &[Rect]) -> Vec<Point> {
        let top = obstacles
            .iter()
            .map(|r| r.y)
            .fold(a.y.min(b.y), f64::min)
            - self.options.shape_buffer_distance;
        vec![a, Point::new(a.x, top), Point::new(b.x, top), b]
    }

    /// Loop on the right side when both ends face right, otherwise over the
    /// top of the node.
    pub fn route_self_ref(
        &self,
        node: &ElementSnapshot,
        source_port: Option<&str>,
        target_port: Option<&str>,
        lane: usize,
    ) -> Vec<Point> {
        let bbox = node.bbox();
        let loop_offset = self.options.self_loop_offset + lane as f64 * self.options.ideal_nudging_distance;
        let right_of = Point::new(bbox.right() + 1.0, bbox.center().y);

        let mut start = anchor_for(node, source_port, right_of);
        let mut end = anchor_for(node, target_port, right_of);
        if source_port.is_none() {
            start.point.y = bbox.y + bbox.height * 0.3;
        }
        if target_port.is_none() {
            end.point.y = bbox.y + bbox.height * 0.7;
        }

        match (start.side, end.side) {
            (PortSide::Right, PortSide::Right) | (PortSide::Left, PortSide::Left) => {
                let x = start.point.x + start.direction() * loop_offset;
                vec![Point::new(x, start.point.y), Point::new(x, end.point.y)]
            }
            _ => {
                let top = bbox.y - loop_offset;
                let sx = start.point.x + start.direction() * loop_offset;
                let ex = end.point.x + end.direction() * loop_offset;
                vec![
                    Point::new(sx, start.point.y),
                    Point::new(sx, top),
                    Point::new(ex, top),
                    Point::new(ex, end.point.y),
                ]
            }
        }
    }

    /// Route every link in a cell set. Returns link id -> vertices; links
    /// with a missing endpoint are left out.
    pub fn route_all<'a>(&self, cells: impl IntoIterator<Item = &'a CellSnapshot>) -> HashMap<String, Vec<Point>> {
        let mut elements: HashMap<&str, &ElementSnapshot> = HashMap::new();
        let mut links: Vec<&LinkSnapshot> = Vec::new();
        for cell in cells {
            match cell {
                CellSnapshot::Entity(e) => {
                    elements.insert(e.id.as_str(), e);
                }
                // containers wrap their members, routing around them is pointless
                CellSnapshot::Selection(_) => {}
                CellSnapshot::Link(l) => links.push(l),
            }
        }
        links.sort_by(|a, b| a.id.cmp(&b.id));

        let lanes = assign_lanes(&links);
        let mut routed = HashMap::new();
        for link in links {
            let (Some(source), Some(target)) = (
                elements.get(link.source.id.as_str()),
                elements.get(link.target.id.as_str()),
            ) else {
                tracing::warn!(link = %link.id, "link endpoint missing, not routed");
                continue;
            };
            let obstacles: Vec<Rect> = elements
                .values()
                .filter(|e| e.id != source.id && e.id != target.id)
                .map(|e| e.bbox())
                .chain([source.bbox(), target.bbox()])
                .collect();
            let lane = lanes.get(link.id.as_str()).copied().unwrap_or((0, 1));
            let vertices = self.route(
                source,
                port_of(&link.source),
                target,
                port_of(&link.target),
                &obstacles,
                lane,
            );
            routed.insert(link.id.clone(), vertices);
        }
        routed
    }
}

fn port_of(end: &Endpoint) -> Option<&str> {
    end.port.as_deref()
}

/// Lane (index, total) per link among links joining the same node pair.
fn assign_lanes<'a>(links: &[&'a LinkSnapshot]) -> HashMap<&'a str, (usize, usize)> {
    let mut groups: HashMap<(&str, &str), Vec<&str>> = HashMap::new();
    for link in links {
        let (s, t) = (link.source.id.as_str(), link.target.id.as_str());
        let key = if s <= t { (s, t) } else { (t, s) };
        groups.entry(key).or_default().push(link.id.as_str());
    }
    let mut lanes = HashMap::new();
    for ids in groups.values() {
        for (i, id) in ids.iter().enumerate() {
            lanes.insert(*id, (i, ids.len()));
        }
    }
    lanes
}

/// `start`, then alternately further left and right of it.
fn nudged(start: f64, step: f64) -> impl Iterator<Item = f64> {
    let step = if step > 0.0 { step } else { 1.0 };
    std::iter::once(start).chain((1..=MAX_NUDGE_STEPS).flat_map(move |k| {
        let d = k as f64 * step;
        [start + d, start - d]
    }))
}

fn is_clear(path: &[Point], obstacles: &[Rect]) -> bool {
    path.windows(2)
        .all(|seg| obstacles.iter().all(|r| !r.crossed_by_segment(seg[0], seg[1])))
}

/// Drop repeated points and middle points of straight runs.
pub fn simplify(points: &[Point]) -> Vec<Point> {
    let mut out: Vec<Point> = Vec::with_capacity(points.len());
    for &p in points {
        if out.last() == Some(&p) {
            continue;
        }
        if out.len() >= 2 {
            let a = out[out.len() - 2];
            let b = out[out.len() - 1];
            let collinear = (a.x == b.x && b.x == p.x) || (a.y == b.y && b.y == p.y);
            if collinear {
                out.pop();
            }
        }
        out.push(p);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Size;
    use crate::model::Port;

    fn element(id: &str, x: f64, y: f64, w: f64, h: f64) -> ElementSnapshot {
        ElementSnapshot {
            id: id.to_string(),
            position: Point::new(x, y),
            size: Size::new(w, h),
            ports: Vec::new(),
            parent: None,
        }
    }

    fn path_of(source: &ElementSnapshot, target: &ElementSnapshot, vertices: &[Point]) -> Vec<Point> {
        let a = anchor_for(source, None, target.bbox().center());
        let b = anchor_for(target, None, source.bbox().center());
        let mut p = vec![a.point];
        p.extend_from_slice(vertices);
        p.push(b.point);
        p
    }

    #[test]
    fn test_lane_offset() {
        assert_eq!(calculate_lane_offset(0, 1, 10.0), 0.0);
        assert_eq!(calculate_lane_offset(0, 2, 10.0), -5.0);
        assert_eq!(calculate_lane_offset(1, 2, 10.0), 5.0);
        assert_eq!(calculate_lane_offset(1, 3, 10.0), 0.0);
    }

    #[test]
    fn test_aligned_nodes_route_straight() {
        let router = OrthogonalRouter::default();
        let a = element("a", 0.0, 0.0, 200.0, 80.0);
        let b = element("b", 400.0, 0.0, 200.0, 80.0);
        let vertices = router.route(&a, None, &b, None, &[a.bbox(), b.bbox()], (0, 1));
        assert!(vertices.is_empty());
    }

    #[test]
    fn test_offset_nodes_use_mid_channel() {
        let router = OrthogonalRouter::default();
        let a = element("a", 0.0, 0.0, 200.0, 80.0);
        let b = element("b", 400.0, 200.0, 200.0, 80.0);
        let vertices = router.route(&a, None, &b, None, &[a.bbox(), b.bbox()], (0, 1));
        assert_eq!(vertices, vec![Point::new(300.0, 40.0), Point::new(300.0, 240.0)]);
    }

    #[test]
    fn test_channel_nudged_around_obstacle() {
        let router = OrthogonalRouter::default();
        let a = element("a", 0.0, 0.0, 200.0, 80.0);
        let b = element("b", 600.0, 300.0, 200.0, 80.0);
        let blocker = Rect::new(360.0, 100.0, 80.0, 120.0);
        let obstacles = [a.bbox(), b.bbox(), blocker];
        let vertices = router.route(&a, None, &b, None, &obstacles, (0, 1));

        let path = path_of(&a, &b, &vertices);
        for seg in path.windows(2) {
            assert!(!blocker.inflate(20.0).crossed_by_segment(seg[0], seg[1]));
            assert!(seg[0].x == seg[1].x || seg[0].y == seg[1].y, "not orthogonal");
        }
    }

    #[test]
    fn test_stacked_nodes_use_horizontal_channel() {
        let router = OrthogonalRouter::default();
        let mut a = element("a", 0.0, 0.0, 200.0, 80.0);
        a.ports.push(Port {
            id: "port-lookup".into(),
            side: PortSide::Right,
            y: 40.0,
        });
        let mut b = element("b", 0.0, 300.0, 200.0, 80.0);
        b.ports.push(Port {
            id: "port-key".into(),
            side: PortSide::Left,
            y: 40.0,
        });
        let vertices = router.route(&a, Some("port-lookup"), &b, Some("port-key"), &[a.bbox(), b.bbox()], (0, 1));
        assert_eq!(
            vertices,
            vec![
                Point::new(220.0, 40.0),
                Point::new(220.0, 190.0),
                Point::new(-20.0, 190.0),
                Point::new(-20.0, 340.0),
            ]
        );
    }

    #[test]
    fn test_self_loop_on_right() {
        let router = OrthogonalRouter::default();
        let a = element("a", 0.0, 0.0, 200.0, 100.0);
        let vertices = router.route(&a, None, &a, None, &[a.bbox()], (0, 1));
        assert_eq!(vertices, vec![Point::new(225.0, 30.0), Point::new(225.0, 70.0)]);
    }

    #[test]
    fn test_parallel_links_get_lanes() {
        let router = OrthogonalRouter::default();
        let a = element("a", 0.0, 0.0, 200.0, 80.0);
        let b = element("b", 400.0, 200.0, 200.0, 80.0);
        let first = router.route(&a, None, &b, None, &[a.bbox(), b.bbox()], (0, 2));
        let second = router.route(&a, None, &b, None, &[a.bbox(), b.bbox()], (1, 2));
        assert_eq!(first[0].x, 295.0);
        assert_eq!(second[0].x, 305.0);
    }

    #[test]
    fn test_route_all_skips_dangling_links() {
        let router = OrthogonalRouter::default();
        let cells = vec![
            CellSnapshot::Entity(element("a", 0.0, 0.0, 200.0, 80.0)),
            CellSnapshot::Entity(element("b", 400.0, 200.0, 200.0, 80.0)),
            CellSnapshot::Link(LinkSnapshot {
                id: "l1".into(),
                source: Endpoint::node("a"),
                target: Endpoint::node("b"),
                vertices: Vec::new(),
            }),
            CellSnapshot::Link(LinkSnapshot {
                id: "l2".into(),
                source: Endpoint::node("a"),
                target: Endpoint::node("gone"),
                vertices: Vec::new(),
            }),
        ];
        let routed = router.route_all(&cells);
        assert_eq!(routed.len(), 1);
        assert_eq!(routed["l1"].len(), 2);
    }

    #[test]
    fn test_simplify() {
        let pts = [
            Point::new(0.0, 0.0),
            Point::new(5.0, 0.0),
            Point::new(5.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 5.0),
        ];
        assert_eq!(
            simplify(&pts),
            vec![Point::new(0.0, 0.0), Point::new(10.0, 0.0), Point::new(10.0, 5.0)]
        );
    }
}
