//! Force-directed arrangement.
//!
//! Linked nodes attract, all nodes repel, a weak centring force keeps the
//! cluster on the canvas and a collision force keeps boxes apart. A small
//! pull towards the grid keeps rows and columns aligned so orthogonal routes
//! stay straight. The simulation is deterministic: no random jitter.

use crate::geometry::Point;
use serde::Deserialize;
use std::collections::HashMap;

use super::{LayoutEdge, LayoutNode};

const ALPHA_MIN: f64 = 0.001;
const VELOCITY_DECAY: f64 = 0.6;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ForceLayoutOptions {
    pub grid_size: f64,
    pub spacing: f64,
    pub link_distance: f64,
    pub link_strength: f64,
    pub charge_strength: f64,
    pub center_strength: f64,
    pub collide_strength: f64,
    pub orthogonal_bias: f64,
    pub iterations: usize,
    pub canvas_width: f64,
    pub canvas_height: f64,
}

impl Default for ForceLayoutOptions {
    fn default() -> Self {
        Self {
            grid_size: 40.0,
            spacing: 180.0,
            link_distance: 200.0,
            link_strength: 0.5,
            charge_strength: -300.0,
            center_strength: 0.05,
            collide_strength: 0.8,
            orthogonal_bias: 0.3,
            iterations: 300,
            canvas_width: 1920.0,
            canvas_height: 1080.0,
        }
    }
}

#[derive(Debug, Clone)]
struct Body {
    x: f64,
    y: f64,
    vx: f64,
    vy: f64,
    radius: f64,
}

#[derive(Debug, Clone, Default)]
pub struct ForceLayout {
    options: ForceLayoutOptions,
}

impl ForceLayout {
    pub fn new(options: ForceLayoutOptions) -> Self {
        Self { options }
    }

    pub fn arrange(&self, nodes: &mut [LayoutNode], edges: &[LayoutEdge]) {
        if nodes.is_empty() {
            return;
        }
        let o = &self.options;
        let mut bodies = self.initial_bodies(nodes);

        let index: HashMap<&str, usize> = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.as_str(), i))
            .collect();
        let links: Vec<(usize, usize, f64)> = edges
            .iter()
            .filter_map(|e| {
                let s = *index.get(e.from.as_str())?;
                let t = *index.get(e.to.as_str())?;
                (s != t).then_some((s, t, e.weight))
            })
            .collect();
        let mut link_count = vec![0usize; nodes.len()];
        for &(s, t, _) in &links {
            link_count[s] += 1;
            link_count[t] += 1;
        }

        let center = Point::new(o.canvas_width / 2.0, o.canvas_height / 2.0);
        let iterations = o.iterations.max(1);
        let alpha_decay = 1.0 - ALPHA_MIN.powf(1.0 / iterations as f64);
        let mut alpha = 1.0;

        for _ in 0..iterations {
            alpha += -alpha * alpha_decay;

            self.apply_links(&mut bodies, &links, &link_count, alpha);
            self.apply_charge(&mut bodies, alpha);
            self.apply_collide(&mut bodies);
            self.apply_orthogonal_bias(&mut bodies, alpha);

            for b in bodies.iter_mut() {
                b.vx *= VELOCITY_DECAY;
                b.vy *= VELOCITY_DECAY;
                b.x += b.vx;
                b.y += b.vy;
            }
            self.apply_center(&mut bodies, center);
        }

        for (node, body) in nodes.iter_mut().zip(&bodies) {
            let (x, y) = if body.x.is_finite() && body.y.is_finite() {
                (self.snap(body.x), self.snap(body.y))
            } else {
                tracing::warn!(node = %node.id, "invalid force layout position");
                (center.x, center.y)
            };
            node.center_on(Point::new(x, y));
        }
        self.resolve_overlaps(nodes);
    }

    /// Start from the current centres. Nodes sharing a centre are spread on
    /// a phyllotaxis spiral so forces have a direction to act on.
    fn initial_bodies(&self, nodes: &[LayoutNode]) -> Vec<Body> {
        let golden = std::f64::consts::PI * (3.0 - 5f64.sqrt());
        let mut bodies: Vec<Body> = Vec::with_capacity(nodes.len());
        for (i, node) in nodes.iter().enumerate() {
            let mut c = node.center();
            if bodies.iter().any(|b| b.x == c.x && b.y == c.y) {
                let r = 10.0 * (0.5 + i as f64).sqrt();
                let angle = i as f64 * golden;
                c = Point::new(c.x + r * angle.cos(), c.y + r * angle.sin());
            }
            bodies.push(Body {
                x: c.x,
                y: c.y,
                vx: 0.0,
                vy: 0.0,
                radius: node.width.max(node.height) / 2.0 + self.options.spacing / 2.0,
            });
        }
        bodies
    }

    fn apply_links(&self, bodies: &mut [Body], links: &[(usize, usize, f64)], count: &[usize], alpha: f64) {
        for &(s, t, weight) in links {
            let strength = self.options.link_strength * weight;
            let mut dx = bodies[t].x + bodies[t].vx - bodies[s].x - bodies[s].vx;
            let mut dy = bodies[t].y + bodies[t].vy - bodies[s].y - bodies[s].vy;
            let mut l = (dx * dx + dy * dy).sqrt();
            if l == 0.0 {
                continue;
            }
            l = (l - self.options.link_distance) / l * alpha * strength;
            dx *= l;
            dy *= l;
            let bias = count[s] as f64 / (count[s] + count[t]) as f64;
            bodies[t].vx -= dx * bias;
            bodies[t].vy -= dy * bias;
            bodies[s].vx += dx * (1.0 - bias);
            bodies[s].vy += dy * (1.0 - bias);
        }
    }

    fn apply_charge(&self, bodies: &mut [Body], alpha: f64) {
        let n = bodies.len();
        for i in 0..n {
            for j in 0..n {
                if i == j {
                    continue;
                }
                let dx = bodies[j].x - bodies[i].x;
                let dy = bodies[j].y - bodies[i].y;
                let l2 = (dx * dx + dy * dy).max(1.0);
                let w = self.options.charge_strength * alpha / l2;
                bodies[i].vx += dx * w;
                bodies[i].vy += dy * w;
            }
        }
    }

    fn apply_collide(&self, bodies: &mut [Body]) {
        let n = bodies.len();
        for i in 0..n {
            for j in (i + 1)..n {
                let (ri, rj) = (bodies[i].radius, bodies[j].radius);
                let min = ri + rj;
                let dx = bodies[i].x + bodies[i].vx - bodies[j].x - bodies[j].vx;
                let dy = bodies[i].y + bodies[i].vy - bodies[j].y - bodies[j].vy;
                let l2 = dx * dx + dy * dy;
                if l2 >= min * min || l2 == 0.0 {
                    continue;
                }
                let l = l2.sqrt();
                let push = (min - l) / l * self.options.collide_strength;
                let (px, py) = (dx * push, dy * push);
                let share = rj * rj / (ri * ri + rj * rj);
                bodies[i].vx += px * share;
                bodies[i].vy += py * share;
                bodies[j].vx -= px * (1.0 - share);
                bodies[j].vy -= py * (1.0 - share);
            }
        }
    }

    fn apply_orthogonal_bias(&self, bodies: &mut [Body], alpha: f64) {
        let strength = self.options.orthogonal_bias;
        if strength <= 0.0 {
            return;
        }
        for b in bodies.iter_mut() {
            b.vx += (self.snap(b.x) - b.x) * strength * alpha;
            b.vy += (self.snap(b.y) - b.y) * strength * alpha;
        }
    }

    fn apply_center(&self, bodies: &mut [Body], center: Point) {
        let n = bodies.len() as f64;
        let mean_x = bodies.iter().map(|b| b.x).sum::<f64>() / n;
        let mean_y = bodies.iter().map(|b| b.y).sum::<f64>() / n;
        let sx = (mean_x - center.x) * self.options.center_strength;
        let sy = (mean_y - center.y) * self.options.center_strength;
        for b in bodies.iter_mut() {
            b.x -= sx;
            b.y -= sy;
        }
    }

    fn snap(&self, value: f64) -> f64 {
        let grid = self.options.grid_size;
        if grid > 0.0 { (value / grid).round() * grid } else { value }
    }

    /// Snapping can push boxes back into each other; shift later nodes right
    /// one grid step at a time until they are clear.
    fn resolve_overlaps(&self, nodes: &mut [LayoutNode]) {
        let step = self.options.grid_size.max(1.0);
        for i in 1..nodes.len() {
            loop {
                let bbox = nodes[i].bbox();
                if !nodes[..i].iter().any(|n| n.bbox().intersects(&bbox)) {
                    break;
                }
                nodes[i].x += step;
            }
        }
    }
}
