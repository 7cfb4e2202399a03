//! Relational Store (spec.md §4.10, §6)
//! Mission: Durable, queryable history of every emitted signal and its convergence
//! trajectory, independent of the in-memory trackers' lifetime.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::models::{
    CloseReason, ConvergenceRecord, ConvergenceSnapshot, PairId, SignalStatus, ValidatedSignal, VenueId,
};

/// One open (`closed_at IS NULL`) convergence record's identity, enough to
/// re-fetch both venues' current quotes for a convergence tick.
#[derive(Debug, Clone)]
pub struct OpenConvergenceRow {
    pub signal_id: Uuid,
    pub symbol: String,
    pub pair_id: PairId,
    pub low_venue: VenueId,
    pub high_venue: VenueId,
}

pub struct SignalStore {
    conn: Connection,
}

impl SignalStore {
    pub fn open(path: &str) -> Result<Self, PipelineError> {
        let conn = Connection::open(path).map_err(PipelineError::from)?;
        conn.pragma_update(None, "journal_mode", "WAL").map_err(PipelineError::from)?;
        conn.pragma_update(None, "foreign_keys", "ON").map_err(PipelineError::from)?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, PipelineError> {
        let conn = Connection::open_in_memory().map_err(PipelineError::from)?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<(), PipelineError> {
        self.conn
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS signals (
                    id TEXT PRIMARY KEY,
                    pair_id TEXT NOT NULL,
                    symbol TEXT NOT NULL,
                    signal_type TEXT NOT NULL,
                    strategy_type TEXT NOT NULL,
                    low_venue TEXT NOT NULL,
                    high_venue TEXT NOT NULL,
                    nominal_pct TEXT NOT NULL,
                    real_pct TEXT NOT NULL,
                    net_pct TEXT NOT NULL,
                    position_size_usd TEXT NOT NULL,
                    suggested_position_usd TEXT NOT NULL,
                    status TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    payload_json TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_signals_symbol ON signals(symbol);
                CREATE INDEX IF NOT EXISTS idx_signals_created_at ON signals(created_at);
                CREATE INDEX IF NOT EXISTS idx_signals_status ON signals(status);
                CREATE INDEX IF NOT EXISTS idx_signals_strategy_ts ON signals(strategy_type, created_at);
                CREATE INDEX IF NOT EXISTS idx_signals_symbol_ts ON signals(symbol, created_at);

                CREATE TABLE IF NOT EXISTS spread_convergence (
                    signal_id TEXT PRIMARY KEY REFERENCES signals(id),
                    symbol TEXT NOT NULL,
                    pair_id TEXT NOT NULL,
                    low_venue TEXT NOT NULL,
                    high_venue TEXT NOT NULL,
                    initial_spread_pct TEXT NOT NULL,
                    current_spread_pct TEXT NOT NULL,
                    min_spread_pct TEXT NOT NULL,
                    max_spread_pct TEXT NOT NULL,
                    converged INTEGER NOT NULL,
                    converged_at TEXT,
                    diverged INTEGER NOT NULL,
                    diverged_at TEXT,
                    consecutive_under_floor INTEGER NOT NULL,
                    checks_count INTEGER NOT NULL,
                    started_at TEXT NOT NULL,
                    last_checked_at TEXT NOT NULL,
                    closed_at TEXT,
                    close_reason TEXT
                );
                CREATE INDEX IF NOT EXISTS idx_spread_convergence_symbol ON spread_convergence(symbol);
                CREATE INDEX IF NOT EXISTS idx_spread_convergence_pair_id ON spread_convergence(pair_id);
                CREATE INDEX IF NOT EXISTS idx_spread_convergence_started_at ON spread_convergence(started_at);
                CREATE INDEX IF NOT EXISTS idx_spread_convergence_active ON spread_convergence(signal_id) WHERE closed_at IS NULL;

                CREATE TABLE IF NOT EXISTS convergence_snapshots (
                    signal_id TEXT NOT NULL REFERENCES signals(id),
                    snapshot_seq INTEGER NOT NULL,
                    ts TEXT NOT NULL,
                    low_venue_bid TEXT NOT NULL,
                    low_venue_ask TEXT NOT NULL,
                    high_venue_bid TEXT NOT NULL,
                    high_venue_ask TEXT NOT NULL,
                    spread_pct TEXT NOT NULL,
                    low_venue_depth_usd TEXT NOT NULL,
                    high_venue_depth_usd TEXT NOT NULL,
                    PRIMARY KEY (signal_id, snapshot_seq)
                );

                -- Referenced only by the funding-rate alerter and z-score
                -- pairs engine, neither of which is part of this pipeline.
                -- Schema kept present so those engines can migrate onto the
                -- same database without an additional migration.
                CREATE TABLE IF NOT EXISTS funding_log (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    venue_id TEXT NOT NULL,
                    symbol TEXT NOT NULL,
                    funding_rate_pct TEXT NOT NULL,
                    recorded_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS zscore_log (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    pair_id TEXT NOT NULL,
                    zscore TEXT NOT NULL,
                    recorded_at TEXT NOT NULL
                );",
            )
            .map_err(PipelineError::from)
    }

    pub fn insert_signal(&self, signal: &ValidatedSignal) -> Result<(), PipelineError> {
        let payload = serde_json::to_string(signal)
            .map_err(|e| PipelineError::DataIntegrity(format!("serializing signal: {e}")))?;
        self.conn
            .execute(
                "INSERT INTO signals (
                    id, pair_id, symbol, signal_type, strategy_type, low_venue, high_venue,
                    nominal_pct, real_pct, net_pct, position_size_usd, suggested_position_usd,
                    status, created_at, payload_json
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                params![
                    signal.id.to_string(),
                    signal.pair_id.0,
                    signal.symbol,
                    format!("{:?}", signal.signal_type),
                    signal.strategy_type.as_str(),
                    signal.low_venue.0,
                    signal.high_venue.0,
                    signal.spread.nominal_pct.to_string(),
                    signal.spread.real_pct.to_string(),
                    signal.spread.net_pct.to_string(),
                    signal.position_size_usd.to_string(),
                    signal.suggested_position_usd.to_string(),
                    status_str(signal.status),
                    signal.created_at.to_rfc3339(),
                    payload,
                ],
            )
            .map_err(PipelineError::from)?;
        Ok(())
    }

    pub fn recent_signals(&self, limit: u32) -> Result<Vec<ValidatedSignal>, PipelineError> {
        let mut stmt = self
            .conn
            .prepare("SELECT payload_json FROM signals ORDER BY created_at DESC LIMIT ?1")
            .map_err(PipelineError::from)?;
        let rows = stmt
            .query_map(params![limit], |row| row.get::<_, String>(0))
            .map_err(PipelineError::from)?;

        let mut out = Vec::new();
        for row in rows {
            let payload = row.map_err(PipelineError::from)?;
            let signal: ValidatedSignal = serde_json::from_str(&payload)
                .map_err(|e| PipelineError::DataIntegrity(format!("deserializing signal: {e}")))?;
            out.push(signal);
        }
        Ok(out)
    }

    /// `symbol`/`pair_id`/`low_venue`/`high_venue` identify the signal this
    /// record tracks; they never change across ticks but are re-supplied on
    /// every upsert rather than threaded through `ConvergenceRecord`, which
    /// models only the tracking state itself (spec.md §4.10).
    pub fn upsert_convergence(
        &self,
        record: &ConvergenceRecord,
        symbol: &str,
        pair_id: &PairId,
        low_venue: &VenueId,
        high_venue: &VenueId,
    ) -> Result<(), PipelineError> {
        self.conn
            .execute(
                "INSERT INTO spread_convergence (
                    signal_id, symbol, pair_id, low_venue, high_venue,
                    initial_spread_pct, current_spread_pct, min_spread_pct, max_spread_pct,
                    converged, converged_at, diverged, diverged_at, consecutive_under_floor,
                    checks_count, started_at, last_checked_at, closed_at, close_reason
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)
                ON CONFLICT(signal_id) DO UPDATE SET
                    current_spread_pct = excluded.current_spread_pct,
                    min_spread_pct = excluded.min_spread_pct,
                    max_spread_pct = excluded.max_spread_pct,
                    converged = excluded.converged,
                    converged_at = excluded.converged_at,
                    diverged = excluded.diverged,
                    diverged_at = excluded.diverged_at,
                    consecutive_under_floor = excluded.consecutive_under_floor,
                    checks_count = excluded.checks_count,
                    last_checked_at = excluded.last_checked_at,
                    closed_at = excluded.closed_at,
                    close_reason = excluded.close_reason",
                params![
                    record.signal_id.to_string(),
                    symbol,
                    pair_id.0,
                    low_venue.0,
                    high_venue.0,
                    record.initial_spread_pct.to_string(),
                    record.current_spread_pct.to_string(),
                    record.min_spread_pct.to_string(),
                    record.max_spread_pct.to_string(),
                    record.converged as i64,
                    record.converged_at.map(|t| t.to_rfc3339()),
                    record.diverged as i64,
                    record.diverged_at.map(|t| t.to_rfc3339()),
                    record.consecutive_under_floor,
                    record.checks_count,
                    record.started_at.to_rfc3339(),
                    record.last_checked_at.to_rfc3339(),
                    record.closed_at.map(|t| t.to_rfc3339()),
                    record.close_reason.as_ref().map(close_reason_str),
                ],
            )
            .map_err(PipelineError::from)?;
        Ok(())
    }

    /// Every convergence record not yet closed, for the periodic convergence
    /// tick to re-evaluate (spec.md §4.10).
    pub fn open_convergence_rows(&self) -> Result<Vec<OpenConvergenceRow>, PipelineError> {
        let mut stmt = self
            .conn
            .prepare("SELECT signal_id, symbol, pair_id, low_venue, high_venue FROM spread_convergence WHERE closed_at IS NULL")
            .map_err(PipelineError::from)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })
            .map_err(PipelineError::from)?;

        let mut out = Vec::new();
        for row in rows {
            let (signal_id, symbol, pair_id, low_venue, high_venue) = row.map_err(PipelineError::from)?;
            out.push(OpenConvergenceRow {
                signal_id: Uuid::parse_str(&signal_id)
                    .map_err(|e| PipelineError::DataIntegrity(format!("parsing signal_id: {e}")))?,
                symbol,
                pair_id: PairId(pair_id),
                low_venue: VenueId(low_venue),
                high_venue: VenueId(high_venue),
            });
        }
        Ok(out)
    }

    pub fn insert_snapshot(&self, snapshot: &ConvergenceSnapshot) -> Result<(), PipelineError> {
        self.conn
            .execute(
                "INSERT INTO convergence_snapshots (
                    signal_id, snapshot_seq, ts, low_venue_bid, low_venue_ask, high_venue_bid,
                    high_venue_ask, spread_pct, low_venue_depth_usd, high_venue_depth_usd
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    snapshot.signal_id.to_string(),
                    snapshot.snapshot_seq,
                    snapshot.ts.to_rfc3339(),
                    snapshot.low_venue_bid.to_string(),
                    snapshot.low_venue_ask.to_string(),
                    snapshot.high_venue_bid.to_string(),
                    snapshot.high_venue_ask.to_string(),
                    snapshot.spread_pct.to_string(),
                    snapshot.low_venue_depth_usd.to_string(),
                    snapshot.high_venue_depth_usd.to_string(),
                ],
            )
            .map_err(PipelineError::from)?;
        Ok(())
    }

    pub fn signal_status(&self, signal_id: Uuid) -> Result<Option<(bool, Option<DateTime<Utc>>)>, PipelineError> {
        self.conn
            .query_row(
                "SELECT converged, closed_at FROM spread_convergence WHERE signal_id = ?1",
                params![signal_id.to_string()],
                |row| {
                    let converged: i64 = row.get(0)?;
                    let closed_at: Option<String> = row.get(1)?;
                    Ok((converged != 0, closed_at.and_then(|s| DateTime::parse_from_rfc3339(&s).ok().map(|t| t.with_timezone(&Utc)))))
                },
            )
            .optional()
            .map_err(PipelineError::from)
    }
}

fn status_str(status: SignalStatus) -> &'static str {
    match status {
        SignalStatus::Sent => "sent",
        SignalStatus::Suppressed => "suppressed",
        SignalStatus::Failed => "failed",
    }
}

fn close_reason_str(reason: &CloseReason) -> &'static str {
    match reason {
        CloseReason::Converged => "converged",
        CloseReason::Timeout => "timeout",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        LiquiditySnapshot, PairId, PriceSnapshot, SafetyVerdict, SignalType, SpreadBreakdown, StrategyType,
        TimingSnapshot,
    };
    use rust_decimal_macros::dec;

    fn signal() -> ValidatedSignal {
        ValidatedSignal {
            id: Uuid::new_v4(),
            pair_id: PairId::new("BTC", &"low".into(), &"high".into()),
            symbol: "BTC".to_string(),
            signal_type: SignalType::Auto,
            strategy_type: StrategyType::Df,
            low_venue: "low".into(),
            high_venue: "high".into(),
            prices: PriceSnapshot {
                low_venue_bid: dec!(49990),
                low_venue_ask: dec!(50000),
                high_venue_bid: dec!(52500),
                high_venue_ask: dec!(52510),
                low_venue_exec: dec!(50100),
                high_venue_exec: dec!(52400),
            },
            spread: SpreadBreakdown {
                nominal_pct: dec!(5.0),
                real_pct: dec!(4.8),
                slippage_loss_pct: dec!(0.2),
                fees_pct: dec!(0.36),
                net_pct: dec!(4.44),
            },
            liquidity: LiquiditySnapshot { exit_usd: dec!(100000), entry_usd: dec!(50000) },
            timing: TimingSnapshot {
                low_venue_latency_ms: 50,
                high_venue_latency_ms: 60,
                latency_diff_ms: 10,
                max_latency_ms: 60,
                fresh: true,
            },
            position_size_usd: dec!(25000),
            suggested_position_usd: dec!(25000),
            safety_checks: SafetyVerdict { passed: true, results: vec![] },
            lagging_info: None,
            actions: vec!["buy".to_string()],
            links: vec!["https://example".to_string()],
            created_at: Utc::now(),
            status: SignalStatus::Sent,
        }
    }

    #[test]
    fn insert_and_fetch_recent_signal_roundtrips() {
        let store = SignalStore::open_in_memory().unwrap();
        let s = signal();
        store.insert_signal(&s).unwrap();
        let recent = store.recent_signals(10).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].id, s.id);
    }

    #[test]
    fn convergence_upsert_then_update() {
        let store = SignalStore::open_in_memory().unwrap();
        let s = signal();
        store.insert_signal(&s).unwrap();
        let mut record = ConvergenceRecord::new(s.id, dec!(5.0), Utc::now());
        store.upsert_convergence(&record, &s.symbol, &s.pair_id, &s.low_venue, &s.high_venue).unwrap();

        record.current_spread_pct = dec!(0.1);
        record.converged = true;
        record.converged_at = Some(Utc::now());
        record.closed_at = record.converged_at;
        record.close_reason = Some(CloseReason::Converged);
        store.upsert_convergence(&record, &s.symbol, &s.pair_id, &s.low_venue, &s.high_venue).unwrap();

        let status = store.signal_status(s.id).unwrap().unwrap();
        assert!(status.0);
        assert!(status.1.is_some());
    }

    #[test]
    fn missing_signal_status_is_none() {
        let store = SignalStore::open_in_memory().unwrap();
        assert!(store.signal_status(Uuid::new_v4()).unwrap().is_none());
    }
}
