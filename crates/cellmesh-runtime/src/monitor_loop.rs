//! Drives `cellmesh_invoke::InvocationMonitor::scan` on a fixed cadence
//! in a dedicated background thread. `InvocationMonitor` itself owns no
//! thread (see its module docs) — something has to call `scan`
//! periodically, and this is that something for a real node.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cellmesh_invoke::InvocationMonitor;

pub struct MonitorLoop {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl MonitorLoop {
    pub fn start(monitor: InvocationMonitor, interval: Duration) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_for_thread = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("cellmesh-invocation-monitor".to_string())
            .spawn(move || {
                while !stop_for_thread.load(Ordering::SeqCst) {
                    thread::sleep(interval);
                    monitor.scan();
                }
            })
            .expect("failed to spawn invocation monitor thread");
        Self {
            stop,
            handle: Some(handle),
        }
    }

    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for MonitorLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellmesh_invoke::InvocationRegistry;

    #[test]
    fn starts_and_stops_cleanly() {
        let monitor = InvocationMonitor::new(Arc::new(InvocationRegistry::new()));
        let mut loop_handle = MonitorLoop::start(monitor, Duration::from_millis(5));
        thread::sleep(Duration::from_millis(20));
        loop_handle.stop();
    }
}
