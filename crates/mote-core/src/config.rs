//! Node configuration
//!
//! Values are read through a key lookup (`MOTE_*` keys) so the same parser
//! serves the simulator (environment + `.env`) and the firmware (values baked
//! in at build time).

use core::net::SocketAddr;
use core::str::FromStr;

use embassy_time::Duration;
use thiserror_no_std::Error;

use crate::relay::MapStyle;
use crate::relay::push::QoS;

/// Number of samples kept per metric
pub const SAMPLE_WINDOW: usize = 6;

/// Upper bound of a pull response payload
pub const MAX_PAYLOAD: usize = 255;

/// Upper bound of a published payload
pub const MAX_PUBLISH_PAYLOAD: usize = 64;

/// Default UDP port of the CoAP server
pub const COAP_PORT: u16 = 5683;

/// Default UDP port of an MQTT-SN gateway
pub const MQTTSN_PORT: u16 = 1883;

/// Maximum length of the node name and client id, bounded by MQTT-SN's
/// client id limit
pub const MAX_NAME_LEN: usize = 23;

const DEFAULT_SAMPLE_INTERVAL_SECS: u64 = 5;
const DEFAULT_NODE_NAME: &str = "mote";

pub type NodeName = heapless::String<MAX_NAME_LEN>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {key}")]
    InvalidValue { key: &'static str },
    #[error("Value for {key} exceeds {max} bytes")]
    TooLong { key: &'static str, max: usize },
}

/// Runtime configuration of a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    /// Namespace prefix of published topics
    pub node_name: NodeName,
    /// Client id presented to the MQTT-SN gateway
    pub client_id: NodeName,
    /// Time between two sampling passes
    pub sample_interval: Duration,
    /// Period of the automatic push trigger, if any
    pub push_interval: Option<Duration>,
    /// MQTT-SN gateway; pushes are only logged when unset
    pub broker: Option<SocketAddr>,
    /// UDP port the CoAP server binds to
    pub coap_port: u16,
    /// Structured payload flavor
    pub map_style: MapStyle,
    /// Delivery guarantee of published values
    pub qos: QoS,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let mut node_name = NodeName::new();
        // DEFAULT_NODE_NAME is shorter than MAX_NAME_LEN
        let _ = node_name.push_str(DEFAULT_NODE_NAME);
        Self {
            client_id: node_name.clone(),
            node_name,
            sample_interval: Duration::from_secs(DEFAULT_SAMPLE_INTERVAL_SECS),
            push_interval: None,
            broker: None,
            coap_port: COAP_PORT,
            map_style: MapStyle::Legacy,
            qos: QoS::AtMostOnce,
        }
    }
}

impl NodeConfig {
    /// Build a configuration from `MOTE_*` keys, falling back to defaults for
    /// missing ones.
    ///
    /// | key | meaning |
    /// |-----|---------|
    /// | `MOTE_NODE_NAME` | topic namespace |
    /// | `MOTE_CLIENT_ID` | MQTT-SN client id (defaults to the node name) |
    /// | `MOTE_SAMPLE_INTERVAL_SECS` | sampling period |
    /// | `MOTE_PUSH_INTERVAL_SECS` | periodic push, `0` disables |
    /// | `MOTE_BROKER` | gateway socket address, e.g. `[fd17:cafe:cafe:3::1]:1885` |
    /// | `MOTE_COAP_PORT` | CoAP server port |
    /// | `MOTE_MAP_STYLE` | `legacy` or `json` |
    /// | `MOTE_QOS` | publish QoS, `0` or `1` |
    pub fn from_lookup<F, S>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<S>,
        S: AsRef<str>,
    {
        let mut config = Self::default();

        if let Some(name) = lookup("MOTE_NODE_NAME") {
            config.node_name = bounded("MOTE_NODE_NAME", name.as_ref())?;
            config.client_id = config.node_name.clone();
        }
        if let Some(id) = lookup("MOTE_CLIENT_ID") {
            config.client_id = bounded("MOTE_CLIENT_ID", id.as_ref())?;
        }
        if let Some(secs) = lookup("MOTE_SAMPLE_INTERVAL_SECS") {
            let secs: u64 = parse("MOTE_SAMPLE_INTERVAL_SECS", secs.as_ref())?;
            if secs == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "MOTE_SAMPLE_INTERVAL_SECS",
                });
            }
            config.sample_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = lookup("MOTE_PUSH_INTERVAL_SECS") {
            let secs: u64 = parse("MOTE_PUSH_INTERVAL_SECS", secs.as_ref())?;
            config.push_interval = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(broker) = lookup("MOTE_BROKER") {
            let broker = broker.as_ref().trim();
            if !broker.is_empty() {
                config.broker = Some(parse("MOTE_BROKER", broker)?);
            }
        }
        if let Some(port) = lookup("MOTE_COAP_PORT") {
            config.coap_port = parse("MOTE_COAP_PORT", port.as_ref())?;
        }
        if let Some(style) = lookup("MOTE_MAP_STYLE") {
            config.map_style = match style.as_ref().trim() {
                "legacy" => MapStyle::Legacy,
                "json" => MapStyle::Json,
                _ => return Err(ConfigError::InvalidValue { key: "MOTE_MAP_STYLE" }),
            };
        }
        if let Some(qos) = lookup("MOTE_QOS") {
            config.qos = match qos.as_ref().trim() {
                "0" => QoS::AtMostOnce,
                "1" => QoS::AtLeastOnce,
                _ => return Err(ConfigError::InvalidValue { key: "MOTE_QOS" }),
            };
        }

        Ok(config)
    }

    pub fn with_node_name(mut self, name: &str) -> Result<Self, ConfigError> {
        self.node_name = bounded("node_name", name)?;
        Ok(self)
    }

    pub fn with_broker(mut self, broker: SocketAddr) -> Self {
        self.broker = Some(broker);
        self
    }

    pub fn with_sample_interval(mut self, interval: Duration) -> Self {
        self.sample_interval = interval;
        self
    }

    pub fn with_push_interval(mut self, interval: Duration) -> Self {
        self.push_interval = Some(interval);
        self
    }

    pub fn with_map_style(mut self, style: MapStyle) -> Self {
        self.map_style = style;
        self
    }
}

fn bounded(key: &'static str, value: &str) -> Result<NodeName, ConfigError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ConfigError::InvalidValue { key });
    }
    NodeName::from_str(value).map_err(|_| ConfigError::TooLong {
        key,
        max: MAX_NAME_LEN,
    })
}

fn parse<T: FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue { key })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup_from<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<&'a str> {
        move |key| pairs.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
    }

    #[test]
    fn test_defaults_without_keys() {
        let config = NodeConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config, NodeConfig::default());
        assert_eq!(config.node_name, "mote");
        assert_eq!(config.sample_interval, Duration::from_secs(5));
        assert!(config.broker.is_none());
    }

    #[test]
    fn test_all_keys() {
        let config = NodeConfig::from_lookup(lookup_from(&[
            ("MOTE_NODE_NAME", "monica"),
            ("MOTE_SAMPLE_INTERVAL_SECS", "10"),
            ("MOTE_PUSH_INTERVAL_SECS", "30"),
            ("MOTE_BROKER", "[fd17:cafe:cafe:3::1]:1885"),
            ("MOTE_COAP_PORT", "5684"),
            ("MOTE_MAP_STYLE", "json"),
            ("MOTE_QOS", "1"),
        ]))
        .unwrap();

        assert_eq!(config.node_name, "monica");
        assert_eq!(config.client_id, "monica");
        assert_eq!(config.sample_interval, Duration::from_secs(10));
        assert_eq!(config.push_interval, Some(Duration::from_secs(30)));
        assert_eq!(config.broker.unwrap().port(), 1885);
        assert_eq!(config.coap_port, 5684);
        assert_eq!(config.map_style, MapStyle::Json);
        assert_eq!(config.qos, QoS::AtLeastOnce);
    }

    #[test]
    fn test_setters() {
        let broker: SocketAddr = "192.0.2.7:1885".parse().unwrap();
        let config = NodeConfig::default()
            .with_node_name("greenhouse")
            .unwrap()
            .with_broker(broker)
            .with_sample_interval(Duration::from_secs(2))
            .with_push_interval(Duration::from_secs(60))
            .with_map_style(MapStyle::Json);

        assert_eq!(config.node_name, "greenhouse");
        assert_eq!(config.client_id, "mote");
        assert_eq!(config.broker, Some(broker));
        assert_eq!(config.sample_interval, Duration::from_secs(2));
        assert_eq!(config.push_interval, Some(Duration::from_secs(60)));
        assert_eq!(config.map_style, MapStyle::Json);
        assert!(NodeConfig::default().with_node_name("  ").is_err());
    }

    #[test]
    fn test_zero_push_interval_disables_push() {
        let config =
            NodeConfig::from_lookup(lookup_from(&[("MOTE_PUSH_INTERVAL_SECS", "0")])).unwrap();
        assert_eq!(config.push_interval, None);
    }

    #[test]
    fn test_rejects_malformed_values() {
        assert_eq!(
            NodeConfig::from_lookup(lookup_from(&[("MOTE_BROKER", "not-an-address")])),
            Err(ConfigError::InvalidValue { key: "MOTE_BROKER" })
        );
        assert_eq!(
            NodeConfig::from_lookup(lookup_from(&[("MOTE_QOS", "2")])),
            Err(ConfigError::InvalidValue { key: "MOTE_QOS" })
        );
        assert_eq!(
            NodeConfig::from_lookup(lookup_from(&[("MOTE_SAMPLE_INTERVAL_SECS", "0")])),
            Err(ConfigError::InvalidValue {
                key: "MOTE_SAMPLE_INTERVAL_SECS"
            })
        );
        assert_eq!(
            NodeConfig::from_lookup(lookup_from(&[(
                "MOTE_NODE_NAME",
                "a-node-name-that-is-far-too-long"
            )])),
            Err(ConfigError::TooLong {
                key: "MOTE_NODE_NAME",
                max: MAX_NAME_LEN
            })
        );
    }
}
