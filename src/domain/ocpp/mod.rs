mod version;

pub use version::OcppVersion;
