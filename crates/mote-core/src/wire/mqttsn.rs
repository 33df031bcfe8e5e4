//! MQTT-SN v1.2 framing for a publish-only client
//!
//! Encodes the messages a sensor node sends (CONNECT, REGISTER, PUBLISH,
//! PINGREQ, DISCONNECT) and decodes the gateway's acknowledgements. Topics are
//! always normal, gateway-registered topic ids. QoS 2 and subscriptions are
//! not supported.

use thiserror_no_std::Error;

use crate::relay::push::{QoS, TopicId};

pub const PROTOCOL_ID: u8 = 0x01;

/// Longest client id allowed by the protocol
pub const MAX_CLIENT_ID_LEN: usize = 23;

pub mod msg_type {
    pub const CONNECT: u8 = 0x04;
    pub const CONNACK: u8 = 0x05;
    pub const REGISTER: u8 = 0x0A;
    pub const REGACK: u8 = 0x0B;
    pub const PUBLISH: u8 = 0x0C;
    pub const PUBACK: u8 = 0x0D;
    pub const PINGREQ: u8 = 0x16;
    pub const PINGRESP: u8 = 0x17;
    pub const DISCONNECT: u8 = 0x18;
}

mod flag {
    pub const QOS_1: u8 = 0x20;
    pub const CLEAN_SESSION: u8 = 0x04;
    pub const TOPIC_NORMAL: u8 = 0x00;
}

/// Gateway verdict carried by CONNACK, REGACK and PUBACK
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnCode {
    Accepted,
    Congestion,
    InvalidTopicId,
    NotSupported,
    Reserved(u8),
}

impl From<u8> for ReturnCode {
    fn from(code: u8) -> Self {
        match code {
            0x00 => Self::Accepted,
            0x01 => Self::Congestion,
            0x02 => Self::InvalidTopicId,
            0x03 => Self::NotSupported,
            other => Self::Reserved(other),
        }
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MqttSnError {
    #[error("Output buffer too small")]
    BufferTooSmall,
    #[error("Frame shorter than announced")]
    Truncated,
    #[error("Invalid length header")]
    BadLength,
    #[error("Unexpected message type {0:#04x}")]
    UnexpectedType(u8),
    #[error("Gateway rejected the request: {0:?}")]
    Rejected(ReturnCode),
    #[error("Client id must be 1 to 23 bytes")]
    BadClientId,
}

/// A decoded gateway message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    ConnAck,
    RegAck { topic_id: TopicId, msg_id: u16 },
    PubAck { topic_id: TopicId, msg_id: u16 },
    PingResp,
    Disconnect,
}

/// Write a frame of type `msg_type` whose body is the concatenation of `body`.
///
/// Frames shorter than 256 bytes use the one byte length header, longer ones
/// the three byte form.
fn frame(out: &mut [u8], msg_type: u8, body: &[&[u8]]) -> Result<usize, MqttSnError> {
    let body_len: usize = body.iter().map(|part| part.len()).sum();
    let short = body_len + 2;
    let (header_len, total) = if short < 256 {
        (2, short)
    } else {
        (4, body_len + 4)
    };
    if total > usize::from(u16::MAX) {
        return Err(MqttSnError::BadLength);
    }
    let dst = out.get_mut(..total).ok_or(MqttSnError::BufferTooSmall)?;

    if header_len == 2 {
        dst[0] = total as u8;
        dst[1] = msg_type;
    } else {
        dst[0] = 0x01;
        dst[1..3].copy_from_slice(&(total as u16).to_be_bytes());
        dst[3] = msg_type;
    }

    let mut pos = header_len;
    for part in body {
        dst[pos..pos + part.len()].copy_from_slice(part);
        pos += part.len();
    }
    Ok(total)
}

pub fn encode_connect(
    client_id: &str,
    keep_alive_secs: u16,
    clean_session: bool,
    out: &mut [u8],
) -> Result<usize, MqttSnError> {
    if client_id.is_empty() || client_id.len() > MAX_CLIENT_ID_LEN {
        return Err(MqttSnError::BadClientId);
    }
    let flags = if clean_session { flag::CLEAN_SESSION } else { 0 };
    frame(
        out,
        msg_type::CONNECT,
        &[
            &[flags, PROTOCOL_ID],
            &keep_alive_secs.to_be_bytes(),
            client_id.as_bytes(),
        ],
    )
}

pub fn encode_register(
    topic_name: &str,
    msg_id: u16,
    out: &mut [u8],
) -> Result<usize, MqttSnError> {
    frame(
        out,
        msg_type::REGISTER,
        &[&0u16.to_be_bytes(), &msg_id.to_be_bytes(), topic_name.as_bytes()],
    )
}

/// PUBLISH to a registered topic. `msg_id` is only meaningful for QoS 1.
pub fn encode_publish(
    topic_id: TopicId,
    msg_id: u16,
    qos: QoS,
    payload: &[u8],
    out: &mut [u8],
) -> Result<usize, MqttSnError> {
    let (flags, msg_id) = match qos {
        QoS::AtMostOnce => (flag::TOPIC_NORMAL, 0),
        QoS::AtLeastOnce => (flag::QOS_1 | flag::TOPIC_NORMAL, msg_id),
    };
    frame(
        out,
        msg_type::PUBLISH,
        &[&[flags], &topic_id.to_be_bytes(), &msg_id.to_be_bytes(), payload],
    )
}

pub fn encode_pingreq(out: &mut [u8]) -> Result<usize, MqttSnError> {
    frame(out, msg_type::PINGREQ, &[])
}

pub fn encode_disconnect(out: &mut [u8]) -> Result<usize, MqttSnError> {
    frame(out, msg_type::DISCONNECT, &[])
}

/// Split a frame into its type and body
fn split(data: &[u8]) -> Result<(u8, &[u8]), MqttSnError> {
    let (total, header_len) = match data {
        [] => return Err(MqttSnError::Truncated),
        [0x01, hi, lo, ..] => (usize::from(u16::from_be_bytes([*hi, *lo])), 4),
        [0x01, ..] => return Err(MqttSnError::Truncated),
        [len, ..] => (usize::from(*len), 2),
    };
    if total < header_len {
        return Err(MqttSnError::BadLength);
    }
    let frame = data.get(..total).ok_or(MqttSnError::Truncated)?;
    let msg_type = *frame.get(header_len - 1).ok_or(MqttSnError::Truncated)?;
    Ok((msg_type, &frame[header_len..]))
}

/// Decode a gateway message, turning non-accepted return codes into
/// [`MqttSnError::Rejected`]
pub fn decode(data: &[u8]) -> Result<Reply, MqttSnError> {
    let (kind, body) = split(data)?;

    let accepted = |code: u8| match ReturnCode::from(code) {
        ReturnCode::Accepted => Ok(()),
        other => Err(MqttSnError::Rejected(other)),
    };

    match kind {
        msg_type::CONNACK => {
            let [code] = body else {
                return Err(MqttSnError::BadLength);
            };
            accepted(*code)?;
            Ok(Reply::ConnAck)
        }
        msg_type::REGACK | msg_type::PUBACK => {
            let [t_hi, t_lo, m_hi, m_lo, code] = body else {
                return Err(MqttSnError::BadLength);
            };
            accepted(*code)?;
            let topic_id = u16::from_be_bytes([*t_hi, *t_lo]);
            let msg_id = u16::from_be_bytes([*m_hi, *m_lo]);
            Ok(if kind == msg_type::REGACK {
                Reply::RegAck { topic_id, msg_id }
            } else {
                Reply::PubAck { topic_id, msg_id }
            })
        }
        msg_type::PINGRESP => Ok(Reply::PingResp),
        msg_type::DISCONNECT => Ok(Reply::Disconnect),
        other => Err(MqttSnError::UnexpectedType(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect() {
        let mut out = [0u8; 32];
        let len = encode_connect("monica", 60, true, &mut out).unwrap();
        assert_eq!(
            &out[..len],
            &[12, 0x04, 0x04, 0x01, 0x00, 0x3C, b'm', b'o', b'n', b'i', b'c', b'a']
        );

        assert_eq!(
            encode_connect("", 60, true, &mut out),
            Err(MqttSnError::BadClientId)
        );
        assert_eq!(
            encode_connect("a-client-id-longer-than-23", 60, true, &mut out),
            Err(MqttSnError::BadClientId)
        );
    }

    #[test]
    fn test_register_and_publish() {
        let mut out = [0u8; 64];
        let len = encode_register("mote/info", 7, &mut out).unwrap();
        assert_eq!(&out[..6], &[15, 0x0A, 0, 0, 0, 7]);
        assert_eq!(&out[6..len], b"mote/info");

        let len = encode_publish(0x0102, 9, QoS::AtMostOnce, b"{}", &mut out).unwrap();
        assert_eq!(&out[..len], &[9, 0x0C, 0x00, 0x01, 0x02, 0, 0, b'{', b'}']);

        let len = encode_publish(0x0102, 9, QoS::AtLeastOnce, b"{}", &mut out).unwrap();
        assert_eq!(&out[..len], &[9, 0x0C, 0x20, 0x01, 0x02, 0, 9, b'{', b'}']);
    }

    #[test]
    fn test_long_frames_use_three_byte_length() {
        let payload = [b'x'; 300];
        let mut out = [0u8; 320];
        let len = encode_publish(1, 0, QoS::AtMostOnce, &payload, &mut out).unwrap();
        assert_eq!(len, 309);
        assert_eq!(&out[..4], &[0x01, 0x01, 0x35, 0x0C]);

        let mut small = [0u8; 16];
        assert_eq!(
            encode_publish(1, 0, QoS::AtMostOnce, &payload, &mut small),
            Err(MqttSnError::BufferTooSmall)
        );
    }

    #[test]
    fn test_ping_and_disconnect() {
        let mut out = [0u8; 4];
        let len = encode_pingreq(&mut out).unwrap();
        assert_eq!(&out[..len], &[2, 0x16]);
        let len = encode_disconnect(&mut out).unwrap();
        assert_eq!(&out[..len], &[2, 0x18]);
    }

    #[test]
    fn test_decode_acks() {
        assert_eq!(decode(&[3, 0x05, 0x00]), Ok(Reply::ConnAck));
        assert_eq!(
            decode(&[7, 0x0B, 0x00, 0x2A, 0x00, 0x07, 0x00]),
            Ok(Reply::RegAck {
                topic_id: 42,
                msg_id: 7
            })
        );
        assert_eq!(
            decode(&[7, 0x0D, 0x00, 0x2A, 0x00, 0x08, 0x00]),
            Ok(Reply::PubAck {
                topic_id: 42,
                msg_id: 8
            })
        );
        assert_eq!(decode(&[2, 0x17]), Ok(Reply::PingResp));
    }

    #[test]
    fn test_decode_rejections_and_garbage() {
        assert_eq!(
            decode(&[3, 0x05, 0x01]),
            Err(MqttSnError::Rejected(ReturnCode::Congestion))
        );
        assert_eq!(
            decode(&[7, 0x0B, 0, 0, 0, 1, 0x02]),
            Err(MqttSnError::Rejected(ReturnCode::InvalidTopicId))
        );
        assert_eq!(decode(&[]), Err(MqttSnError::Truncated));
        assert_eq!(decode(&[5, 0x05, 0x00]), Err(MqttSnError::Truncated));
        assert_eq!(decode(&[1, 0x05]), Err(MqttSnError::BadLength));
        assert_eq!(decode(&[4, 0x05, 0x00, 0x00]), Err(MqttSnError::BadLength));
        assert_eq!(decode(&[2, 0x04]), Err(MqttSnError::UnexpectedType(0x04)));
    }
}
