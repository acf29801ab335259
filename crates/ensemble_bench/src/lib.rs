//! Benchmark utilities.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use ensemble_core::TransactionOp;
use rand::Rng;

/// Generate random node data of the specified size.
pub fn random_data(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

/// Generate a batch of creates under `parent`, unique per `round`.
pub fn create_batch(parent: &str, round: u64, count: usize, payload_size: usize) -> Vec<TransactionOp> {
    (0..count)
        .map(|i| {
            TransactionOp::create(format!("{parent}/r{round}-{i}"))
                .with_data(random_data(payload_size))
                .build()
        })
        .collect()
}
