//! flowline write-path metrics.
//!
//! Counters for block pool traffic, submitted writes, drain scheduling, and
//! backpressure events. Automatically exposed via Prometheus when registered
//! with an admin server.

use metriken::{Counter, Gauge, metric};

// ── Block pool ───────────────────────────────────────────────────

#[metric(
    name = "flowline/blocks/leased",
    description = "Total blocks leased from the pool"
)]
pub static BLOCKS_LEASED: Counter = Counter::new();

#[metric(
    name = "flowline/blocks/returned",
    description = "Total blocks returned to the pool"
)]
pub static BLOCKS_RETURNED: Counter = Counter::new();

#[metric(
    name = "flowline/blocks/in_use",
    description = "Blocks currently leased out"
)]
pub static BLOCKS_IN_USE: Gauge = Gauge::new();

// ── Bytes ────────────────────────────────────────────────────────

#[metric(
    name = "flowline/bytes/accepted",
    description = "Total bytes accepted from producers"
)]
pub static BYTES_ACCEPTED: Counter = Counter::new();

#[metric(
    name = "flowline/bytes/submitted",
    description = "Total bytes handed to the async write primitive"
)]
pub static BYTES_SUBMITTED: Counter = Counter::new();

// ── Writes ───────────────────────────────────────────────────────

#[metric(
    name = "flowline/writes/submitted",
    description = "Batched write requests submitted"
)]
pub static WRITES_SUBMITTED: Counter = Counter::new();

#[metric(
    name = "flowline/writes/errors",
    description = "Write completions reporting an error"
)]
pub static WRITE_ERRORS: Counter = Counter::new();

#[metric(
    name = "flowline/writes/deferred",
    description = "Producer writes deferred by the pre-completion budget"
)]
pub static WRITES_DEFERRED: Counter = Counter::new();

// ── Drain scheduling ─────────────────────────────────────────────

#[metric(
    name = "flowline/drains/posted",
    description = "Drain tasks posted to the event loop"
)]
pub static DRAINS_POSTED: Counter = Counter::new();

#[metric(
    name = "flowline/drains/empty",
    description = "Drains that found no accumulated batch"
)]
pub static DRAINS_EMPTY: Counter = Counter::new();

// ── Teardown ─────────────────────────────────────────────────────

#[metric(
    name = "flowline/fin/sent",
    description = "Shutdown-send (half-close) requests submitted"
)]
pub static FINS_SENT: Counter = Counter::new();
