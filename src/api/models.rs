//! Wire Models
//!
//! JSON shapes exchanged with HTTP and WebSocket clients.

use super::errors::ErrorBody;
use crate::game::{GameSnapshot, Multiplier, Phase, RoundResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Service status response
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub status: String,
    pub version: String,
    pub phase: Phase,
    pub players: usize,
    pub rounds_played: u64,
    pub connections: i64,
}

/// Recent crash points and settled rounds, newest first
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub recent_games: Vec<Multiplier>,
    pub game_history: Vec<RoundResult>,
}

/// Numbers from browsers arrive either as JSON numbers or numeric strings
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum WireNumber {
    Number(f64),
    Text(String),
}

impl WireNumber {
    /// NaN when the text does not parse, which the ledger rejects
    pub fn value(&self) -> f64 {
        match self {
            WireNumber::Number(n) => *n,
            WireNumber::Text(s) => s.trim().parse().unwrap_or(f64::NAN),
        }
    }
}

/// Commands a WebSocket client can send
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientCommand {
    RegisterPlayer {
        username: String,
    },
    PlaceBet {
        bet: WireNumber,
    },
    CashOut,
    SetAutoCashout {
        /// `null` or missing clears the threshold
        #[serde(default)]
        multiplier: Option<WireNumber>,
    },
    Ping,
}

impl ClientCommand {
    pub fn action(&self) -> &'static str {
        match self {
            ClientCommand::RegisterPlayer { .. } => "register_player",
            ClientCommand::PlaceBet { .. } => "place_bet",
            ClientCommand::CashOut => "cash_out",
            ClientCommand::SetAutoCashout { .. } => "set_auto_cashout",
            ClientCommand::Ping => "ping",
        }
    }
}

/// Private reply to one client command
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResponse {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub request_id: Option<Value>,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl CommandResponse {
    pub fn success(request_id: Option<Value>, data: Value) -> Self {
        Self {
            kind: "response",
            request_id,
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(request_id: Option<Value>, error: ErrorBody) -> Self {
        Self {
            kind: "response",
            request_id,
            ok: false,
            data: None,
            error: Some(error),
        }
    }
}

/// First frame every WebSocket client receives
#[derive(Debug, Clone, Serialize)]
pub struct InitState<'a> {
    pub event: &'static str,
    pub data: &'a GameSnapshot,
}

impl<'a> InitState<'a> {
    pub fn new(data: &'a GameSnapshot) -> Self {
        Self {
            event: "init_state",
            data,
        }
    }
}
