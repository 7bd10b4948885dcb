//! Asynchronous loading of mesh assets.
//!
//! Decoding runs on a single worker thread; results are drained by the main loop
//! through [`MeshLoader::poll`].

use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread;

use datacubes_render::{load_mesh_asset, MeshData, RenderError};

use crate::scene::MeshRequest;

/// A decoded (or failed) asset.
#[derive(Debug)]
pub struct LoadedMesh {
    pub datacube_id: u32,
    pub uri: String,
    pub mesh: Result<MeshData, RenderError>,
}

/// Handle to the mesh worker thread. Dropping it stops the worker after its current load.
pub struct MeshLoader {
    requests: Option<Sender<MeshRequest>>,
    results: Receiver<LoadedMesh>,
    worker: Option<thread::JoinHandle<()>>,
}

impl MeshLoader {
    #[must_use]
    pub fn new() -> Self {
        let (request_tx, request_rx) = mpsc::channel::<MeshRequest>();
        let (result_tx, result_rx) = mpsc::channel();
        let worker = thread::Builder::new()
            .name("datacubes-mesh-loader".into())
            .spawn(move || {
                for request in request_rx {
                    let mesh = load_mesh_asset(&request.uri);
                    let loaded = LoadedMesh {
                        datacube_id: request.datacube_id,
                        uri: request.uri,
                        mesh,
                    };
                    if result_tx.send(loaded).is_err() {
                        break;
                    }
                }
            });
        let worker = match worker {
            Ok(handle) => Some(handle),
            Err(error) => {
                log::warn!("mesh loader thread could not be started: {error}");
                None
            }
        };
        Self {
            requests: worker.is_some().then_some(request_tx),
            results: result_rx,
            worker,
        }
    }

    /// Queues a load. Requests are served in order.
    pub fn request(&self, request: MeshRequest) {
        log::debug!("loading mesh asset {} for datacube {}", request.uri, request.datacube_id);
        let Some(requests) = &self.requests else {
            log::warn!("mesh asset {} dropped: no loader thread", request.uri);
            return;
        };
        if requests.send(request).is_err() {
            log::warn!("mesh loader thread has stopped");
        }
    }

    /// Returns every load finished since the last call, without blocking.
    pub fn poll(&self) -> Vec<LoadedMesh> {
        let mut finished = Vec::new();
        loop {
            match self.results.try_recv() {
                Ok(loaded) => finished.push(loaded),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        finished
    }

    /// Blocks until the next load finishes. Returns `None` if the worker is gone.
    pub fn wait(&self) -> Option<LoadedMesh> {
        self.results.recv().ok()
    }
}

impl Default for MeshLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MeshLoader {
    fn drop(&mut self) {
        // Closing the request channel ends the worker loop
        self.requests = None;
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_asset_reports_error() {
        let loader = MeshLoader::new();
        loader.request(MeshRequest {
            datacube_id: 3,
            uri: "does/not/exist.glb".into(),
        });
        let loaded = loader.wait().unwrap();
        assert_eq!(loaded.datacube_id, 3);
        assert!(loaded.mesh.is_err());
        assert!(loader.poll().is_empty());
    }

    #[test]
    fn test_poll_without_requests_is_empty() {
        let loader = MeshLoader::new();
        assert!(loader.poll().is_empty());
    }
}
