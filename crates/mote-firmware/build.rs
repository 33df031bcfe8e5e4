//! Bakes node configuration and Wi-Fi credentials into the image.
//!
//! Keys are read from a `.env` file next to this crate (or any parent
//! directory) and from the build environment; the firmware picks them up with
//! `option_env!`.

const BAKED_PREFIXES: [&str; 2] = ["MOTE_", "WIFI_"];

fn main() {
    println!("cargo:rustc-link-arg=-Tlinkall.x");

    match dotenvy::dotenv_iter() {
        Ok(entries) => {
            for entry in entries {
                let (key, value) = match entry {
                    Ok(pair) => pair,
                    Err(e) => panic!("Malformed .env entry: {e}"),
                };
                if BAKED_PREFIXES.iter().any(|prefix| key.starts_with(prefix)) {
                    println!("cargo:rustc-env={key}={value}");
                }
            }
        }
        Err(e) if e.not_found() => {
            println!("cargo:warning=No .env found, using build environment only");
        }
        Err(e) => panic!("Cannot read .env: {e}"),
    }

    println!("cargo:rerun-if-changed=.env");
    for key in [
        "WIFI_SSID",
        "WIFI_PASSWORD",
        "MOTE_NODE_NAME",
        "MOTE_CLIENT_ID",
        "MOTE_SAMPLE_INTERVAL_SECS",
        "MOTE_PUSH_INTERVAL_SECS",
        "MOTE_BROKER",
        "MOTE_COAP_PORT",
        "MOTE_MAP_STYLE",
        "MOTE_QOS",
    ] {
        println!("cargo:rerun-if-env-changed={key}");
    }
}
