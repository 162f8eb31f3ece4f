//! Host execution loop
//!
//! Stands in for the host application's own frame loop: a dedicated thread
//! that runs the host's per-tick work and then drains the dispatch queue.

use std::{
    io,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use tracing::{info, warn};

use crate::dispatch::DispatchQueue;

pub struct HostLoop {
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl HostLoop {
    pub fn spawn<F>(queue: Arc<DispatchQueue>, tick: Duration, mut on_tick: F) -> io::Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);

        let handle = thread::Builder::new()
            .name("host-loop".to_string())
            .spawn(move || {
                info!(tick_ms = tick.as_millis(), "host loop started");
                while !stop_flag.load(Ordering::Acquire) {
                    on_tick();
                    queue.drain();
                    thread::sleep(tick);
                }
                info!("host loop stopped");
            })?;

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("host loop thread panicked");
            }
        }
    }
}

impl Drop for HostLoop {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    #[tokio::test]
    async fn drains_queue_on_host_thread() {
        let queue = Arc::new(DispatchQueue::default());
        let ticks = Arc::new(AtomicUsize::new(0));
        let tick_counter = Arc::clone(&ticks);

        let host = HostLoop::spawn(Arc::clone(&queue), Duration::from_millis(1), move || {
            tick_counter.fetch_add(1, Ordering::SeqCst);
        })
        .expect("spawn host loop");

        let name = queue
            .dispatch(|| thread::current().name().map(str::to_string))
            .await
            .expect("dispatch");
        host.stop();

        assert_eq!(name.as_deref(), Some("host-loop"));
        assert!(ticks.load(Ordering::SeqCst) > 0);
    }
}
