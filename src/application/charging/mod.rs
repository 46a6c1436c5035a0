//! Charging: the transaction state machine and its parsers

pub mod capabilities;
pub mod machine;
pub mod measurands;

pub use capabilities::derive_capabilities;
pub use machine::{BootInfo, StartRequest, StopRequest, TransactionMachine};
pub use measurands::{parse_meter_values, MeterValue, SampledValue};
