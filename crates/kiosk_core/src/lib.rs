//! Session orchestration for the photo booth kiosk.

pub mod clients;
pub mod commands;
pub mod error;
pub mod events;
pub mod http;
pub mod mode_selector;
pub mod orchestrator;
pub mod policy;
pub mod timers;

pub use clients::{
    CacheBuster, CaptureDeviceClient, Collaborators, OperatorClient, PrintClient, PrintOutcome,
    QrClient, RenderClient, SessionBackend, StartedSession,
};
pub use commands::{Intent, KioskCommand, OperatorCommand};
pub use error::{ClientError, DispatchError, Fault, SessionStartFault};
pub use events::{KioskEvent, RejectReason, Session, SessionSnapshot};
pub use http::{HttpBackend, DEFAULT_REQUEST_TIMEOUT};
pub use orchestrator::{KioskHandle, Orchestrator, OrchestratorConfig};
pub use policy::{
    AbortSessionPolicy, CapturePollPolicy, FaultAction, FaultPolicy, FlowStep, FlowTimings,
};
