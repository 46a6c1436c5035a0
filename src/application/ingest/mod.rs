//! Third-party webhook ingest

mod external;

pub use external::{ExternalEvent, ExternalEventIngest, SharedExternalEventIngest};
