//! AES-256-CTR encrypt/decrypt workload
//!
//! Each chunk is transformed independently with the counter advanced to the
//! chunk's first block, so the concatenated output equals one sequential
//! pass over the whole buffer whatever the worker count or chunking.

use std::time::Duration;

use ctr::cipher::{KeyIvInit, StreamCipher};
use tracing::{debug, info};

use crate::bench::partition::{Claim, PartitionPlan, WorkSpec};
use crate::bench::progress::{ProgressSink, ScaledSink};
use crate::bench::runner::{BenchmarkRunner, Transform};
use crate::config::CryptoConfig;
use crate::io::buffer::{alloc_buffer, alloc_pattern, DisjointMut, MemoryLock};
use crate::{BenchError, Result, TransformError};

/// AES-256 in big-endian 128-bit counter mode
pub type Aes256Ctr = ctr::Ctr128BE<aes::Aes256>;

/// Cipher block size in bytes; chunk boundaries are aligned to it
pub const BLOCK_SIZE: u64 = 16;

/// Key and initial counter block
#[derive(Clone, PartialEq, Eq)]
pub struct CtrKey {
    key: [u8; 32],
    iv: [u8; 16],
}

impl CtrKey {
    pub fn new(key: [u8; 32], iv: [u8; 16]) -> Self {
        Self { key, iv }
    }

    /// Key and IV with every byte set to a constant
    pub fn filled(key_byte: u8, iv_byte: u8) -> Self {
        Self::new([key_byte; 32], [iv_byte; 16])
    }

    /// Counter block for the keystream block `blocks` past the initial one
    pub fn counter_at(&self, blocks: u128) -> [u8; 16] {
        advance_counter(&self.iv, blocks)
    }
}

impl std::fmt::Debug for CtrKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CtrKey").finish_non_exhaustive()
    }
}

/// Add `blocks` to a big-endian 128-bit counter, wrapping on overflow
pub fn advance_counter(counter: &[u8; 16], blocks: u128) -> [u8; 16] {
    u128::from_be_bytes(*counter).wrapping_add(blocks).to_be_bytes()
}

/// Counter block for the unit at global `offset`
pub fn counter_for_offset(base: &[u8; 16], offset: u64, unit_size: u64) -> [u8; 16] {
    advance_counter(base, u128::from(offset / unit_size))
}

/// XOR `input` with the keystream starting at counter block `counter`
pub fn apply_keystream(
    key: &CtrKey,
    counter: &[u8; 16],
    input: &[u8],
    output: &mut [u8],
) -> std::result::Result<(), TransformError> {
    if input.len() != output.len() {
        return Err(TransformError::Other(format!(
            "input of {} bytes does not fit output of {} bytes",
            input.len(),
            output.len()
        )));
    }
    let mut cipher = Aes256Ctr::new_from_slices(&key.key, counter)
        .map_err(|e| TransformError::PrimitiveInit(e.to_string()))?;
    output.copy_from_slice(input);
    cipher
        .try_apply_keystream(output)
        .map_err(|e| TransformError::Other(format!("keystream exhausted: {}", e)))
}

/// Single-threaded reference transform over the whole input
pub fn apply_sequential(key: &CtrKey, base_block: u128, input: &[u8]) -> Result<Vec<u8>> {
    let mut output = alloc_buffer(input.len())?;
    apply_keystream(key, &key.counter_at(base_block), input, &mut output)?;
    Ok(output)
}

fn block_of(claim: &Claim) -> u128 {
    u128::from(claim.chunk().first_block(BLOCK_SIZE))
}

/// One-way CTR transform of `input` into a shared output buffer
pub struct CtrApply<'a> {
    key: &'a CtrKey,
    base_block: u128,
    input: &'a [u8],
    output: DisjointMut<'a, u8>,
}

impl<'a> CtrApply<'a> {
    pub fn new(
        key: &'a CtrKey,
        base_block: u128,
        input: &'a [u8],
        output: &'a mut [u8],
        plan: PartitionPlan,
    ) -> Result<Self> {
        Ok(Self {
            key,
            base_block,
            input,
            output: DisjointMut::new(output, plan)?,
        })
    }
}

impl Transform for CtrApply<'_> {
    fn apply(&self, claim: &Claim) -> std::result::Result<(), TransformError> {
        let counter = self.key.counter_at(self.base_block + block_of(claim));
        let mut output = self.output.take(claim)?;
        apply_keystream(self.key, &counter, &self.input[claim.chunk().to_range()], &mut output)
    }
}

/// Encrypt then decrypt each chunk, checked by round-trip equality
pub struct CtrRoundTrip<'a> {
    key: &'a CtrKey,
    base_block: u128,
    input: &'a [u8],
    encrypted: DisjointMut<'a, u8>,
    decrypted: DisjointMut<'a, u8>,
}

impl<'a> CtrRoundTrip<'a> {
    pub fn new(
        key: &'a CtrKey,
        base_block: u128,
        input: &'a [u8],
        encrypted: &'a mut [u8],
        decrypted: &'a mut [u8],
        plan: PartitionPlan,
    ) -> Result<Self> {
        Ok(Self {
            key,
            base_block,
            input,
            encrypted: DisjointMut::new(encrypted, plan)?,
            decrypted: DisjointMut::new(decrypted, plan)?,
        })
    }
}

impl Transform for CtrRoundTrip<'_> {
    fn apply(&self, claim: &Claim) -> std::result::Result<(), TransformError> {
        let counter = self.key.counter_at(self.base_block + block_of(claim));
        let mut encrypted = self.encrypted.take(claim)?;
        apply_keystream(self.key, &counter, &self.input[claim.chunk().to_range()], &mut encrypted)?;
        let mut decrypted = self.decrypted.take(claim)?;
        apply_keystream(self.key, &counter, &encrypted, &mut decrypted)
    }

    fn verify(self) -> Result<()> {
        let input = self.input;
        let unchanged = self
            .encrypted
            .into_regions()
            .into_iter()
            .all(|(chunk, region)| *region == input[chunk.to_range()]);
        if !input.is_empty() && unchanged {
            return Err(BenchError::CorrectnessMismatch(
                "ciphertext equals plaintext".to_string(),
            ));
        }
        for (chunk, region) in self.decrypted.into_regions() {
            verify_round_trip(&input[chunk.to_range()], region).map_err(|_| {
                BenchError::CorrectnessMismatch(format!(
                    "round trip differs in bytes {}..{}",
                    chunk.start, chunk.end
                ))
            })?;
        }
        Ok(())
    }
}

/// Check that `decrypted` reproduces `original`
pub fn verify_round_trip(original: &[u8], decrypted: &[u8]) -> Result<()> {
    if original.len() != decrypted.len() {
        return Err(BenchError::CorrectnessMismatch(format!(
            "decrypted length {} != original length {}",
            decrypted.len(),
            original.len()
        )));
    }
    match original.iter().zip(decrypted).position(|(a, b)| a != b) {
        Some(offset) => Err(BenchError::CorrectnessMismatch(format!(
            "round trip differs at byte {}",
            offset
        ))),
        None => Ok(()),
    }
}

/// Multi-pass AES-256-CTR benchmark
#[derive(Debug, Clone)]
pub struct CryptoWorkload {
    size_bytes: usize,
    passes: u32,
    key: CtrKey,
}

impl CryptoWorkload {
    pub fn new(size_bytes: usize, passes: u32, key: CtrKey) -> Self {
        Self {
            size_bytes,
            passes,
            key,
        }
    }

    pub fn from_config(config: &CryptoConfig) -> Self {
        Self::new(
            config.size_bytes as usize,
            config.passes,
            CtrKey::filled(config.key_byte, config.iv_byte),
        )
    }

    /// Keystream blocks consumed by one pass
    pub fn blocks_per_pass(&self) -> u128 {
        (self.size_bytes as u128).div_ceil(u128::from(BLOCK_SIZE))
    }

    /// Run every pass and return the summed parallel-phase time
    pub fn run(&self, runner: &BenchmarkRunner<'_>, workers: usize, sink: &dyn ProgressSink) -> Result<Duration> {
        let spec = WorkSpec::new(self.size_bytes as u64, BLOCK_SIZE).with_workers(workers);
        let plan = runner.plan(&spec);

        let input = alloc_pattern(self.size_bytes)?;
        let mut encrypted = alloc_buffer(self.size_bytes)?;
        let mut decrypted = alloc_buffer(self.size_bytes)?;
        let _locks = [
            MemoryLock::new(&input),
            MemoryLock::new(&encrypted),
            MemoryLock::new(&decrypted),
        ];
        debug!(bytes = self.size_bytes, passes = self.passes, workers, "Crypto buffers ready");

        let passes = self.passes.max(1) as usize;
        let mut total = Duration::ZERO;
        for pass in 0..passes {
            let base_block = pass as u128 * self.blocks_per_pass();
            let transform = CtrRoundTrip::new(
                &self.key,
                base_block,
                &input,
                &mut encrypted,
                &mut decrypted,
                plan,
            )?;
            let scaled = ScaledSink::step(sink, pass, passes);
            let report = runner.execute(&spec, &transform, &scaled)?;
            transform.verify()?;
            total += report.elapsed;
        }

        info!(
            workers,
            passes,
            duration_ms = total.as_millis() as u64,
            "Crypto benchmark complete"
        );
        Ok(total)
    }
}
