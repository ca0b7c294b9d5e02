//! Halt / resume state fed by the limit-up/limit-down stream.
//!
//! One record per symbol ever seen. The table is unbounded.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// LULD indicator code for a trading pause.
pub const HALT_CODE: i64 = 17;
/// LULD indicator code for a resumption.
pub const RESUME_CODE: i64 = 18;

/// Last halt-related event for a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HaltEvent {
    /// Trading paused.
    Halt,
    /// Trading resumed.
    Resume,
}

impl HaltEvent {
    /// Map an indicator code to an event. Other codes are ignored.
    #[must_use]
    pub const fn from_code(code: i64) -> Option<Self> {
        match code {
            HALT_CODE => Some(Self::Halt),
            RESUME_CODE => Some(Self::Resume),
            _ => None,
        }
    }

    /// Event name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Halt => "HALT",
            Self::Resume => "RESUME",
        }
    }
}

/// Halt state for one symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HaltRecord {
    /// Currently halted.
    pub halted: bool,
    /// Last event applied.
    pub last_event: HaltEvent,
    /// Event time, epoch milliseconds.
    pub timestamp: Option<i64>,
    /// Free-form reason.
    pub reason: Option<String>,
}

/// Shared per-symbol halt table.
#[derive(Debug, Default)]
pub struct HaltStore {
    records: RwLock<HashMap<String, HaltRecord>>,
}

impl HaltStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply every indicator code of one LULD message in order.
    ///
    /// Returns the last event applied, if any code was relevant.
    pub fn apply_indicators(
        &self,
        symbol: &str,
        codes: &[i64],
        timestamp: Option<i64>,
        reason: Option<&str>,
    ) -> Option<HaltEvent> {
        let symbol = symbol.trim().to_uppercase();
        if symbol.is_empty() {
            return None;
        }

        let mut applied = None;
        let mut records = self.records.write();
        for event in codes.iter().filter_map(|c| HaltEvent::from_code(*c)) {
            records.insert(
                symbol.clone(),
                HaltRecord {
                    halted: event == HaltEvent::Halt,
                    last_event: event,
                    timestamp,
                    reason: reason.map(ToString::to_string),
                },
            );
            applied = Some(event);
        }
        applied
    }

    /// Record for a symbol.
    #[must_use]
    pub fn get(&self, symbol: &str) -> Option<HaltRecord> {
        self.records.read().get(&symbol.to_uppercase()).cloned()
    }

    /// Whether a symbol is currently halted.
    #[must_use]
    pub fn is_halted(&self, symbol: &str) -> bool {
        self.get(symbol).is_some_and(|r| r.halted)
    }

    /// Symbols currently halted, sorted.
    #[must_use]
    pub fn halted_symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self
            .records
            .read()
            .iter()
            .filter(|(_, r)| r.halted)
            .map(|(s, _)| s.clone())
            .collect();
        symbols.sort();
        symbols
    }

    /// Number of symbols tracked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Whether no symbol has been seen.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}
