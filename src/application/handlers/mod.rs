//! OCPP message handlers

mod ocpp_v16;
mod ocpp_v16_handler;

pub use ocpp_v16::{is_cs_to_cp_action, CP_TO_CS_ACTIONS};
pub use ocpp_v16_handler::{OcppHandlerV16, OcppServices, SessionState};
