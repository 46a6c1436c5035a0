//! Capability summary from charger configuration keys

use std::collections::BTreeMap;

use crate::domain::{Capabilities, ConfigEntry};

pub const SUPPORTED_FEATURE_PROFILES: &str = "SupportedFeatureProfiles";
pub const NUMBER_OF_CONNECTORS: &str = "NumberOfConnectors";
pub const CHARGE_PROFILE_MAX_STACK_LEVEL: &str = "ChargeProfileMaxStackLevel";
pub const LOCAL_AUTH_LIST_ENABLED: &str = "LocalAuthListEnabled";

pub fn derive_capabilities(configuration: &BTreeMap<String, ConfigEntry>) -> Capabilities {
    let value = |key: &str| configuration.get(key).and_then(|e| e.value.as_deref());

    let feature_profiles: Vec<String> = value(SUPPORTED_FEATURE_PROFILES)
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();
    let has_profile = |name: &str| feature_profiles.iter().any(|p| p.eq_ignore_ascii_case(name));

    Capabilities {
        connector_count: value(NUMBER_OF_CONNECTORS).and_then(|v| v.trim().parse().ok()),
        smart_charging: has_profile("SmartCharging")
            || configuration.contains_key(CHARGE_PROFILE_MAX_STACK_LEVEL),
        reservation: has_profile("Reservation"),
        local_auth_list: has_profile("LocalAuthListManagement")
            || value(LOCAL_AUTH_LIST_ENABLED).is_some_and(|v| v.eq_ignore_ascii_case("true")),
        feature_profiles,
    }
}
