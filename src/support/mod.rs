pub mod ocpp_frame;
pub mod shutdown;
pub mod telemetry;
pub mod timer;
