//! The routing worker: a mirror of the editor graph that reroutes links
//! after every burst of changes.

use crate::geometry::Point;
use crate::model::CellSnapshot;
use std::collections::HashMap;
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use super::protocol::{RouterRequest, RouterResponse};
use super::router::{OrthogonalRouter, RouterOptions};

#[derive(Debug, Default)]
pub struct RoutingWorker {
    router: OrthogonalRouter,
    cells: Vec<CellSnapshot>,
    /// Links whose vertices the router changed since the last reply.
    changed: HashMap<String, CellSnapshot>,
}

impl RoutingWorker {
    pub fn new(options: RouterOptions) -> Self {
        Self {
            router: OrthogonalRouter::new(options),
            cells: Vec::new(),
            changed: HashMap::new(),
        }
    }

    pub fn cells(&self) -> &[CellSnapshot] {
        &self.cells
    }

    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    pub fn has_pending(&self, id: &str) -> bool {
        self.changed.contains_key(id)
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.cells.iter().position(|c| c.id() == id)
    }

    /// Apply one request to the mirror. Routing waits for [`process`](Self::process).
    pub fn handle(&mut self, request: RouterRequest) {
        match request {
            RouterRequest::Reset { cells } => {
                tracing::debug!(cells = cells.len(), "router reset");
                self.cells = cells;
                self.changed.clear();
            }
            RouterRequest::Add { cell } => match self.position(cell.id()) {
                Some(i) => self.cells[i] = cell,
                None => self.cells.push(cell),
            },
            RouterRequest::Change { cell } => {
                let Some(i) = self.position(cell.id()) else {
                    tracing::warn!(cell = %cell.id(), "cell not found in router graph, skipping change");
                    return;
                };
                self.cells[i] = cell;
            }
            RouterRequest::Remove { id } => {
                self.changed.remove(&id);
                if let Some(i) = self.position(&id) {
                    self.cells.remove(i);
                }
            }
        }
    }

    /// Reroute every link, remembering those whose vertices changed.
    pub fn route(&mut self) {
        let routed: HashMap<String, Vec<Point>> = self.router.route_all(&self.cells);
        for cell in self.cells.iter_mut() {
            let CellSnapshot::Link(link) = cell else {
                continue;
            };
            let Some(vertices) = routed.get(&link.id) else {
                continue;
            };
            if &link.vertices != vertices {
                link.vertices = vertices.clone();
                self.changed.insert(link.id.clone(), CellSnapshot::Link(link.clone()));
            }
        }
    }

    /// Reply with the links changed since the last reply.
    pub fn take_routed(&mut self) -> RouterResponse {
        let mut cells: Vec<CellSnapshot> = self.changed.drain().map(|(_, c)| c).collect();
        cells.sort_by(|a, b| a.id().cmp(b.id()));
        tracing::debug!(links = cells.len(), "routed");
        RouterResponse::Routed { cells }
    }

    pub fn process(&mut self) -> RouterResponse {
        self.route();
        self.take_routed()
    }

    /// Serve requests until the request channel closes. After a request
    /// arrives, further requests are collected until none has come for the
    /// debounce period, then one reply covers the whole burst.
    pub fn run(mut self, requests: Receiver<RouterRequest>, responses: Sender<RouterResponse>) {
        let debounce = Duration::from_millis(self.router.options().debounce_ms);
        while let Ok(first) = requests.recv() {
            self.handle(first);
            let mut closed = false;
            loop {
                match requests.recv_timeout(debounce) {
                    Ok(next) => self.handle(next),
                    Err(RecvTimeoutError::Timeout) => break,
                    Err(RecvTimeoutError::Disconnected) => {
                        closed = true;
                        break;
                    }
                }
            }
            self.route();

            // requests that arrived while routing; removed links must not be reported
            let mut late = false;
            while let Ok(next) = requests.try_recv() {
                self.handle(next);
                late = true;
            }
            if late {
                self.route();
            }

            if responses.send(self.take_routed()).is_err() || closed {
                break;
            }
        }
        tracing::debug!("routing worker stopped");
    }
}
