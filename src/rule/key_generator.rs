//! Key generators for auto-generated insert columns.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

use parking_lot::Mutex;
use serde_json::Value;

use crate::error::{ShardingError, ShardingResult};

pub trait KeyGenerator: Send + Sync + fmt::Debug {
    fn generate_key(&self) -> ShardingResult<Value>;
}

/// 2016-11-01T00:00:00Z in milliseconds
pub const SNOWFLAKE_EPOCH_MS: i64 = 1_477_958_400_000;

const WORKER_ID_BITS: u32 = 10;
const SEQUENCE_BITS: u32 = 12;
const MAX_WORKER_ID: i64 = (1 << WORKER_ID_BITS) - 1;
const SEQUENCE_MASK: i64 = (1 << SEQUENCE_BITS) - 1;

#[derive(Debug, Default)]
struct SnowflakeState {
    last_millis: i64,
    sequence: i64,
}

/// 64-bit ids: 41 bits of milliseconds since the epoch, 10 bits of worker id
/// and a 12 bit per-millisecond sequence. Ids from one generator are strictly
/// increasing.
#[derive(Debug)]
pub struct SnowflakeKeyGenerator {
    worker_id: i64,
    state: Mutex<SnowflakeState>,
}

impl SnowflakeKeyGenerator {
    pub fn new(worker_id: i64) -> ShardingResult<Self> {
        if !(0..=MAX_WORKER_ID).contains(&worker_id) {
            return Err(ShardingError::config(format!(
                "Snowflake worker_id must be between 0 and {}, got {}",
                MAX_WORKER_ID, worker_id
            )));
        }
        Ok(Self {
            worker_id,
            state: Mutex::new(SnowflakeState::default()),
        })
    }

    fn current_millis() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    /// Split an id back into (millis since epoch, worker id, sequence).
    pub fn decompose(id: i64) -> (i64, i64, i64) {
        (
            id >> (WORKER_ID_BITS + SEQUENCE_BITS),
            (id >> SEQUENCE_BITS) & MAX_WORKER_ID,
            id & SEQUENCE_MASK,
        )
    }

    pub fn next_id(&self) -> i64 {
        let mut state = self.state.lock();
        // A clock that steps backwards keeps issuing from the last seen millisecond
        let mut now = Self::current_millis().max(state.last_millis);
        if now == state.last_millis {
            state.sequence = (state.sequence + 1) & SEQUENCE_MASK;
            if state.sequence == 0 {
                while now <= state.last_millis {
                    std::hint::spin_loop();
                    now = Self::current_millis();
                }
            }
        } else {
            state.sequence = 0;
        }
        state.last_millis = now;
        ((now - SNOWFLAKE_EPOCH_MS) << (WORKER_ID_BITS + SEQUENCE_BITS))
            | (self.worker_id << SEQUENCE_BITS)
            | state.sequence
    }
}

impl KeyGenerator for SnowflakeKeyGenerator {
    fn generate_key(&self) -> ShardingResult<Value> {
        Ok(Value::from(self.next_id()))
    }
}

/// Random v4 UUIDs without hyphens.
#[derive(Debug, Default)]
pub struct UuidKeyGenerator;

impl KeyGenerator for UuidKeyGenerator {
    fn generate_key(&self) -> ShardingResult<Value> {
        Ok(Value::String(uuid::Uuid::new_v4().simple().to_string()))
    }
}

/// A process-local counter, mostly useful for tests and single-node setups.
#[derive(Debug)]
pub struct IncrementKeyGenerator {
    next: AtomicI64,
}

impl IncrementKeyGenerator {
    pub fn new(start: i64) -> Self {
        Self {
            next: AtomicI64::new(start),
        }
    }
}

impl Default for IncrementKeyGenerator {
    fn default() -> Self {
        Self::new(1)
    }
}

impl KeyGenerator for IncrementKeyGenerator {
    fn generate_key(&self) -> ShardingResult<Value> {
        Ok(Value::from(self.next.fetch_add(1, Ordering::SeqCst)))
    }
}
