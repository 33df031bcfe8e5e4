//! Datagram framing used by the binaries
//!
//! The relay itself is transport agnostic. These codecs turn UDP datagrams
//! into relay requests ([`coap`]) and push publications into gateway frames
//! ([`mqttsn`]), without allocating.

pub mod coap;
pub mod mqttsn;
