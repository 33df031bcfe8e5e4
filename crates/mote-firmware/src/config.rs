//! Configuration baked in at build time, see `build.rs`

use mote_core::config::{ConfigError, NodeConfig};

pub const WIFI_SSID: &str = match option_env!("WIFI_SSID") {
    Some(ssid) => ssid,
    None => "",
};

pub const WIFI_PASSWORD: &str = match option_env!("WIFI_PASSWORD") {
    Some(password) => password,
    None => "",
};

fn baked(key: &str) -> Option<&'static str> {
    match key {
        "MOTE_NODE_NAME" => option_env!("MOTE_NODE_NAME"),
        "MOTE_CLIENT_ID" => option_env!("MOTE_CLIENT_ID"),
        "MOTE_SAMPLE_INTERVAL_SECS" => option_env!("MOTE_SAMPLE_INTERVAL_SECS"),
        "MOTE_PUSH_INTERVAL_SECS" => option_env!("MOTE_PUSH_INTERVAL_SECS"),
        "MOTE_BROKER" => option_env!("MOTE_BROKER"),
        "MOTE_COAP_PORT" => option_env!("MOTE_COAP_PORT"),
        "MOTE_MAP_STYLE" => option_env!("MOTE_MAP_STYLE"),
        "MOTE_QOS" => option_env!("MOTE_QOS"),
        _ => None,
    }
}

pub fn node_config() -> Result<NodeConfig, ConfigError> {
    NodeConfig::from_lookup(baked)
}
