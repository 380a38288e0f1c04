//! Editor side of the routing worker.

use crate::model::{ChangeOrigin, DiagramGraph, GraphEvent};
use std::collections::HashSet;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::protocol::{RouterRequest, RouterResponse};
use super::router::RouterOptions;
use super::worker::RoutingWorker;
use super::RouterError;

pub struct RoutingBridge {
    requests: Option<Sender<RouterRequest>>,
    responses: Receiver<RouterResponse>,
    handle: Option<JoinHandle<()>>,
}

impl RoutingBridge {
    /// Start the worker thread.
    pub fn spawn(options: RouterOptions) -> Result<Self, RouterError> {
        let (req_tx, req_rx) = mpsc::channel();
        let (resp_tx, resp_rx) = mpsc::channel();
        let worker = RoutingWorker::new(options);
        let handle = thread::Builder::new()
            .name("edge-router".into())
            .spawn(move || worker.run(req_rx, resp_tx))?;
        Ok(Self {
            requests: Some(req_tx),
            responses: resp_rx,
            handle: Some(handle),
        })
    }

    fn send(&self, request: RouterRequest) -> Result<(), RouterError> {
        let sender = self.requests.as_ref().ok_or(RouterError::Disconnected)?;
        sender.send(request).map_err(|_| RouterError::Disconnected)
    }

    /// Replace the worker's graph with the full current graph. Pending
    /// journal entries are covered by the snapshot and dropped.
    pub fn reset(&self, graph: &mut DiagramGraph) -> Result<(), RouterError> {
        graph.drain_events();
        self.send(RouterRequest::Reset {
            cells: graph.snapshot(),
        })
    }

    /// Forward journaled changes. Returns the number of requests sent.
    pub fn sync(&self, graph: &mut DiagramGraph) -> Result<usize, RouterError> {
        let events = graph.drain_events();
        let mut sent = 0;
        let mut changed: HashSet<String> = HashSet::new();
        for event in events {
            let request = match event {
                GraphEvent::Add(id) => graph.cell_snapshot(&id).map(|cell| RouterRequest::Add { cell }),
                GraphEvent::Change(id) => {
                    // snapshots reflect the current state, one per cell is enough
                    if !changed.insert(id.clone()) {
                        continue;
                    }
                    graph.cell_snapshot(&id).map(|cell| RouterRequest::Change { cell })
                }
                GraphEvent::Remove(id) => Some(RouterRequest::Remove { id }),
            };
            if let Some(request) = request {
                self.send(request)?;
                sent += 1;
            }
        }
        Ok(sent)
    }

    fn apply(graph: &mut DiagramGraph, response: RouterResponse) -> usize {
        let mut applied = 0;
        for link in response.links() {
            match graph.set_vertices(&link.id, link.vertices.clone(), ChangeOrigin::Router) {
                Ok(()) => applied += 1,
                Err(err) => tracing::debug!(link = %link.id, %err, "routed link no longer in diagram"),
            }
        }
        applied
    }

    /// Apply every routing result that has arrived, without blocking.
    /// Returns the number of links updated.
    pub fn apply_routed(&self, graph: &mut DiagramGraph) -> usize {
        let mut applied = 0;
        loop {
            match self.responses.try_recv() {
                Ok(response) => applied += Self::apply(graph, response),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    tracing::error!("routing worker stopped unexpectedly");
                    break;
                }
            }
        }
        applied
    }

    /// Block until one routing result arrives, then apply it along with
    /// anything else already queued.
    pub fn wait_routed(&self, graph: &mut DiagramGraph, timeout: Duration) -> Result<usize, RouterError> {
        let response = self.responses.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => RouterError::Timeout(timeout),
            RecvTimeoutError::Disconnected => RouterError::Disconnected,
        })?;
        Ok(Self::apply(graph, response) + self.apply_routed(graph))
    }

    /// Stop the worker and wait for it to exit.
    pub fn shutdown(mut self) -> Result<(), RouterError> {
        self.stop()
    }

    fn stop(&mut self) -> Result<(), RouterError> {
        self.requests.take();
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| RouterError::Panicked),
            None => Ok(()),
        }
    }
}

impl Drop for RoutingBridge {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            tracing::error!(%err, "routing worker did not stop cleanly");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;
    use crate::metadata::fixtures::sample_catalog;
    use crate::model::DiagramKind;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn options() -> RouterOptions {
        RouterOptions {
            debounce_ms: 10,
            ..Default::default()
        }
    }

    fn linked_graph() -> DiagramGraph {
        let catalog = sample_catalog();
        let mut graph = DiagramGraph::new(DiagramKind::Detailed);
        graph
            .add_entity(catalog.entity("account").unwrap(), None, Point::new(0.0, 0.0))
            .unwrap();
        graph
            .add_entity(catalog.entity("contact").unwrap(), None, Point::new(700.0, 300.0))
            .unwrap();
        graph.link_all(&catalog);
        graph
    }

    #[test]
    fn test_reset_then_routed_vertices_applied() {
        let mut graph = linked_graph();
        let bridge = RoutingBridge::spawn(options()).unwrap();
        bridge.reset(&mut graph).unwrap();

        let applied = bridge.wait_routed(&mut graph, TIMEOUT).unwrap();
        assert_eq!(applied, 1);
        assert!(!graph.links()[0].vertices.is_empty());
        // applying routed vertices does not echo back to the router
        assert!(!graph.has_pending_events());
    }

    #[test]
    fn test_sync_forwards_moves() {
        let mut graph = linked_graph();
        let bridge = RoutingBridge::spawn(options()).unwrap();
        bridge.reset(&mut graph).unwrap();
        bridge.wait_routed(&mut graph, TIMEOUT).unwrap();
        let before = graph.links()[0].vertices.clone();

        let contact = graph.node_by_schema("contact").unwrap().id.clone();
        graph.translate_node(&contact, 0.0, 200.0).unwrap();
        graph.translate_node(&contact, 0.0, 100.0).unwrap();
        assert_eq!(bridge.sync(&mut graph).unwrap(), 1);

        bridge.wait_routed(&mut graph, TIMEOUT).unwrap();
        assert_ne!(graph.links()[0].vertices, before);
    }

    #[test]
    fn test_removed_entity_leaves_no_links() {
        let mut graph = linked_graph();
        let bridge = RoutingBridge::spawn(options()).unwrap();
        bridge.reset(&mut graph).unwrap();
        bridge.wait_routed(&mut graph, TIMEOUT).unwrap();

        assert!(graph.remove_entity("contact"));
        assert_eq!(bridge.sync(&mut graph).unwrap(), 2);
        let applied = bridge.wait_routed(&mut graph, TIMEOUT).unwrap();
        assert_eq!(applied, 0);
        assert!(graph.links().is_empty());
    }

    #[test]
    fn test_apply_routed_does_not_block() {
        let mut graph = linked_graph();
        let bridge = RoutingBridge::spawn(options()).unwrap();
        assert_eq!(bridge.apply_routed(&mut graph), 0);
        bridge.shutdown().unwrap();
    }
}
