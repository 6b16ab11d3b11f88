//! Stress tests for segdex.
//!
//! These runs push many small and large batches through an index, from one
//! thread or several, and count how many saves succeed.

use crate::fixtures::test_document;
use segdex_core::{DocumentId, IndexTransaction, SearchIndex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of batches to save.
    pub operations: usize,
    /// Number of concurrent threads (for concurrent tests).
    pub threads: usize,
    /// Documents per batch.
    pub batch_size: usize,
    /// Number of distinct document ids.
    pub document_count: usize,
    /// Length of each document body.
    pub body_size: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 1_000,
            threads: 4,
            batch_size: 3,
            document_count: 500,
            body_size: 128,
        }
    }
}

fn document_id(n: usize) -> String {
    format!("stress-{n:06}")
}

fn add_batch(first: usize, config: &StressConfig) -> IndexTransaction {
    let body = "x".repeat(config.body_size);
    let mut txn = IndexTransaction::new();
    for n in first..first + config.batch_size {
        let id = document_id(n % config.document_count);
        // Duplicate ids inside one batch replace each other.
        let _ = txn.add(test_document(&id, &body));
    }
    txn
}

fn remove_batch(first: usize, config: &StressConfig) -> IndexTransaction {
    let mut txn = IndexTransaction::new();
    for n in first..first + config.batch_size {
        let _ = txn.remove(DocumentId::new(document_id(n % config.document_count)));
    }
    txn
}

/// Saves `config.operations` add batches one after another.
pub fn stress_sequential_saves(index: &SearchIndex, config: &StressConfig) -> StressTestResult {
    let start = Instant::now();
    let mut successful = 0usize;
    let mut failed = 0usize;

    for i in 0..config.operations {
        match index.save(&add_batch(i * config.batch_size, config)) {
            Ok(_) => successful += 1,
            Err(_) => failed += 1,
        }
    }

    StressTestResult::new(successful, failed, start.elapsed())
}

/// Interleaves adds, removals, reader opens and flushes.
pub fn stress_mixed_operations(index: &SearchIndex, config: &StressConfig) -> StressTestResult {
    let start = Instant::now();
    let mut successful = 0usize;
    let mut failed = 0usize;

    for i in 0..config.operations {
        let first = i * config.batch_size;
        let result = match i % 4 {
            0 | 1 => index.save(&add_batch(first, config)).map(|_| ()),
            2 => index.save(&remove_batch(first, config)).map(|_| ()),
            _ if i % 20 == 3 => index.flush(),
            _ => index.reader().map(|_| ()),
        };

        match result {
            Ok(()) => successful += 1,
            Err(_) => failed += 1,
        }
    }

    StressTestResult::new(successful, failed, start.elapsed())
}

/// Saves from `config.threads` threads at once, each mostly over its own
/// slice of ids.
pub fn stress_concurrent_saves(index: &SearchIndex, config: &StressConfig) -> StressTestResult {
    let successful = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);
    let ops_per_thread = config.operations / config.threads.max(1);
    let ids_per_thread = config.document_count / config.threads.max(1);

    let start = Instant::now();

    thread::scope(|scope| {
        for t in 0..config.threads {
            let successful = &successful;
            let failed = &failed;
            scope.spawn(move || {
                let base = t * ids_per_thread;
                for i in 0..ops_per_thread {
                    let first = base + (i * config.batch_size) % ids_per_thread.max(1);
                    let txn = if i % 5 == 4 {
                        remove_batch(first, config)
                    } else {
                        add_batch(first, config)
                    };
                    match index.save(&txn) {
                        Ok(_) => {
                            successful.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(_) => {
                            failed.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            });
        }
    });

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}

/// Saves from several threads while one thread keeps opening readers.
pub fn stress_concurrent_readers(index: &SearchIndex, config: &StressConfig) -> StressTestResult {
    let successful = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);
    let writers = config.threads.max(2) - 1;
    let ops_per_thread = config.operations / writers;

    let start = Instant::now();

    thread::scope(|scope| {
        for t in 0..writers {
            let successful = &successful;
            let failed = &failed;
            scope.spawn(move || {
                for i in 0..ops_per_thread {
                    let first = (t * ops_per_thread + i) * config.batch_size;
                    match index.save(&add_batch(first, config)) {
                        Ok(_) => successful.fetch_add(1, Ordering::Relaxed),
                        Err(_) => failed.fetch_add(1, Ordering::Relaxed),
                    };
                }
            });
        }

        let successful = &successful;
        let failed = &failed;
        scope.spawn(move || {
            for _ in 0..ops_per_thread {
                match index.reader() {
                    Ok(reader) if reader.num_docs() <= config.document_count => {
                        successful.fetch_add(1, Ordering::Relaxed)
                    }
                    _ => failed.fetch_add(1, Ordering::Relaxed),
                };
            }
        });
    });

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}
