use std::{
    future::Future,
    io,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

/// Shutdown signal shared between the CLI and long running stages.
/// Any clone can trigger it; every clone observes it.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    triggered: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.triggered.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Triggers once `signal` fires. If the listener cannot be installed the
    /// future never completes and the flag is left alone.
    pub async fn trigger_on<F>(&self, signal: F)
    where
        F: Future<Output = io::Result<()>>,
    {
        match signal.await {
            Ok(()) => {
                log::info!("Interrupted, shutting down");
                self.trigger();
            }
            Err(e) => {
                log::warn!("Unable to listen for interrupts: {}", e);
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let shutdown = Shutdown::new();
        let observer = shutdown.clone();
        assert!(!observer.is_triggered());
        shutdown.trigger();
        assert!(observer.is_triggered());
    }

    fn block_on<F: Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(future)
    }

    #[test]
    fn signal_triggers_shutdown() {
        let shutdown = Shutdown::new();
        block_on(shutdown.trigger_on(async { Ok(()) }));
        assert!(shutdown.is_triggered());
    }

    #[test]
    fn failed_listener_never_triggers() {
        let shutdown = Shutdown::new();
        let finished = block_on(async {
            tokio::select! {
                biased;
                _ = shutdown.trigger_on(async { Err(io::Error::other("no handler")) }) => true,
                _ = tokio::task::yield_now() => false,
            }
        });
        assert!(!finished);
        assert!(!shutdown.is_triggered());
    }
}
