use std::sync::atomic::{AtomicUsize, Ordering};

pub trait ParallelProcessor {
    fn init_parallel_processing(threads: Option<usize>) {
        let threads = threads.unwrap_or_else(num_cpus::get);
        // The global pool can only be built once per process.
        match rayon::ThreadPoolBuilder::new().num_threads(threads).build_global() {
            Ok(()) => log::debug!("Configured global thread pool with {} threads", threads),
            Err(e) => log::debug!("Keeping existing thread pool: {}", e),
        }
        log::info!("Using {} CPU threads for processing", rayon::current_num_threads());
    }

    fn get_progress_counter(label: &'static str, total: usize) -> ProgressCounter {
        ProgressCounter::new(label, total)
    }
}

/// Thread-safe counter that logs every `interval` items and at completion.
#[derive(Debug)]
pub struct ProgressCounter {
    label: &'static str,
    processed: AtomicUsize,
    total: usize,
    interval: usize,
}

impl ProgressCounter {
    pub fn new(label: &'static str, total: usize) -> Self {
        Self {
            label,
            processed: AtomicUsize::new(0),
            total,
            interval: (total / 20).max(25),
        }
    }

    pub fn tick(&self) -> usize {
        let processed = self.processed.fetch_add(1, Ordering::SeqCst) + 1;
        if processed % self.interval == 0 || processed == self.total {
            log::info!(
                "{}: {}/{} files ({:.1}%)",
                self.label,
                processed,
                self.total,
                (processed as f64 / self.total.max(1) as f64) * 100.0
            );
        }
        processed
    }

    pub fn processed(&self) -> usize {
        self.processed.load(Ordering::SeqCst)
    }
}
