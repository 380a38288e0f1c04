//! Layered layout for entity hierarchies.
//!
//! Links point from the lookup side to the referenced entity, so following
//! them gives a parent/child ordering. Layers come from a longest-path walk
//! from nodes without incoming links, layers are reordered by barycentre to
//! cut crossings, and each layer is laid out in rows of `columns_per_row`.

use serde::Deserialize;
use std::collections::{HashMap, HashSet, VecDeque};

use super::{LayoutEdge, LayoutNode};

const MAX_ORDERING_ITERATIONS: usize = 10;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HierarchicalLayoutOptions {
    pub horizontal_spacing: f64,
    pub vertical_spacing: f64,
    pub columns_per_row: usize,
    pub top_padding: f64,
    pub left_padding: f64,
    pub high_connectivity_spacing_multiplier: f64,
    pub high_connectivity_threshold: usize,
    pub min_gap: f64, // clearance kept between neighbouring boxes
}

impl Default for HierarchicalLayoutOptions {
    fn default() -> Self {
        Self {
            horizontal_spacing: 250.0,
            vertical_spacing: 300.0,
            columns_per_row: 5,
            top_padding: 100.0,
            left_padding: 150.0,
            high_connectivity_spacing_multiplier: 1.5,
            high_connectivity_threshold: 3,
            min_gap: 40.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Degree {
    incoming: usize,
    outgoing: usize,
}

impl Degree {
    fn total(&self) -> usize {
        self.incoming + self.outgoing
    }
}

#[derive(Debug, Clone, Default)]
pub struct HierarchicalLayout {
    options: HierarchicalLayoutOptions,
}

impl HierarchicalLayout {
    pub fn new(options: HierarchicalLayoutOptions) -> Self {
        Self { options }
    }

    pub fn arrange(&self, nodes: &mut [LayoutNode], edges: &[LayoutEdge]) {
        if nodes.is_empty() {
            return;
        }
        let index: HashMap<&str, usize> = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.as_str(), i))
            .collect();
        // (from, to, weight) by node index, self loops dropped
        let links: Vec<(usize, usize, f64)> = edges
            .iter()
            .filter_map(|e| {
                let from = *index.get(e.from.as_str())?;
                let to = *index.get(e.to.as_str())?;
                (from != to).then_some((from, to, e.weight))
            })
            .collect();

        let mut degrees = vec![Degree::default(); nodes.len()];
        for &(from, to, _) in &links {
            degrees[from].outgoing += 1;
            degrees[to].incoming += 1;
        }

        let mut layers = build_layers(nodes.len(), &links, &degrees);
        tracing::debug!(layers = layers.len(), "hierarchical layers built");
        minimize_crossings(&mut layers, &links, &degrees);
        self.place(nodes, &layers, &degrees);
    }

    fn place(&self, nodes: &mut [LayoutNode], layers: &[Vec<usize>], degrees: &[Degree]) {
        let o = &self.options;
        let columns = o.columns_per_row.max(1);
        let mut y = o.top_padding;

        for layer in layers {
            for row in layer.chunks(columns) {
                let mut x = o.left_padding;
                let mut max_height: f64 = 0.0;
                for &i in row {
                    let node = &mut nodes[i];
                    node.x = x;
                    node.y = y;
                    max_height = max_height.max(node.height);

                    let mut step = o.horizontal_spacing.max(node.width + o.min_gap);
                    if degrees[i].total() >= o.high_connectivity_threshold {
                        step *= o.high_connectivity_spacing_multiplier;
                    }
                    x += step;
                }
                y += o.vertical_spacing.max(max_height + o.min_gap);
            }
        }
    }
}

/// Longest-path layering from the nodes without incoming links. When every
/// node has an incoming link, fall back to connectivity: most connected
/// first, sqrt(n) nodes per layer.
fn build_layers(count: usize, links: &[(usize, usize, f64)], degrees: &[Degree]) -> Vec<Vec<usize>> {
    let sources: Vec<usize> = (0..count).filter(|&i| degrees[i].incoming == 0).collect();
    if sources.is_empty() {
        return fallback_layers(count, degrees);
    }

    let mut layer = vec![0usize; count];
    let mut visited: HashSet<usize> = HashSet::new();
    let mut queue: VecDeque<usize> = sources.into();
    while let Some(node) = queue.pop_front() {
        if !visited.insert(node) {
            continue;
        }
        for &(from, to, _) in links {
            if from == node {
                layer[to] = layer[to].max(layer[node] + 1);
                queue.push_back(to);
            }
        }
    }

    group_by_layer(&layer)
}

fn fallback_layers(count: usize, degrees: &[Degree]) -> Vec<Vec<usize>> {
    let mut order: Vec<usize> = (0..count).collect();
    order.sort_by(|a, b| degrees[*b].total().cmp(&degrees[*a].total()));
    let per_layer = ((count as f64).sqrt().ceil() as usize).max(1);
    order.chunks(per_layer).map(<[usize]>::to_vec).collect()
}

/// Node indices per layer, empty layers removed, layer order ascending.
fn group_by_layer(layer_of: &[usize]) -> Vec<Vec<usize>> {
    let mut levels: HashMap<usize, Vec<usize>> = HashMap::new();
    for (node, &layer) in layer_of.iter().enumerate() {
        levels.entry(layer).or_default().push(node);
    }
    let mut keys: Vec<usize> = levels.keys().copied().collect();
    keys.sort();
    keys.into_iter().filter_map(|k| levels.remove(&k)).collect()
}

fn minimize_crossings(layers: &mut [Vec<usize>], links: &[(usize, usize, f64)], degrees: &[Degree]) {
    if layers.len() < 2 {
        return;
    }
    for layer in layers.iter_mut() {
        center_by_connectivity(layer, degrees);
    }

    let connection = |a: usize, b: usize| -> f64 {
        links
            .iter()
            .filter(|&&(from, to, _)| (from == a && to == b) || (from == b && to == a))
            .map(|&(_, _, w)| w.max(1.0))
            .sum()
    };

    for _ in 0..MAX_ORDERING_ITERATIONS {
        let mut changed = false;
        for i in 1..layers.len() {
            let adjacent = layers[i - 1].clone();
            changed |= order_by_barycenter(&mut layers[i], &adjacent, degrees, &connection);
        }
        for i in (0..layers.len() - 1).rev() {
            let adjacent = layers[i + 1].clone();
            changed |= order_by_barycenter(&mut layers[i], &adjacent, degrees, &connection);
        }
        if !changed {
            break;
        }
    }
}

/// Most connected nodes end up in the middle of the layer.
fn center_by_connectivity(layer: &mut Vec<usize>, degrees: &[Degree]) {
    layer.sort_by(|a, b| degrees[*b].total().cmp(&degrees[*a].total()));
    let mut reordered: VecDeque<usize> = VecDeque::with_capacity(layer.len());
    for (k, &node) in layer.iter().enumerate() {
        if k % 2 == 0 {
            reordered.push_back(node);
        } else {
            reordered.push_front(node);
        }
    }
    *layer = reordered.into();
}

fn order_by_barycenter(
    layer: &mut Vec<usize>,
    adjacent: &[usize],
    degrees: &[Degree],
    connection: &impl Fn(usize, usize) -> f64,
) -> bool {
    let mut keyed: Vec<(f64, usize)> = layer
        .iter()
        .enumerate()
        .map(|(current, &node)| {
            let mut weighted = 0.0;
            let mut total = 0.0;
            for (pos, &other) in adjacent.iter().enumerate() {
                let count = connection(node, other);
                if count > 0.0 {
                    let weight = count * (1.0 + degrees[other].total() as f64 * 0.1);
                    weighted += pos as f64 * weight;
                    total += weight;
                }
            }
            let barycenter = if total > 0.0 { weighted / total } else { current as f64 };
            (barycenter, node)
        })
        .collect();
    keyed.sort_by(|a, b| a.0.total_cmp(&b.0));

    let reordered: Vec<usize> = keyed.into_iter().map(|(_, node)| node).collect();
    let changed = reordered != *layer;
    *layer = reordered;
    changed
}
