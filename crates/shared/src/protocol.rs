use serde::{Deserialize, Serialize};

use crate::domain::{CaptureState, Mode, SessionId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRequest {
    pub session_id: SessionId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartSessionResponse {
    pub session_id: SessionId,
    pub mode: Mode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArmCaptureResponse {
    pub armed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<CaptureState>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderFinalResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_path: Option<String>,
    pub final_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrintResponse {
    pub success: bool,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorUtilityResponse {
    pub status: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanvasInfo {
    pub width: u32,
    pub height: u32,
    pub bar_height: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    pub incoming_exists: bool,
    pub incoming_folder: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canvas: Option<CanvasInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}
