//! Bounded payload encoders shared by the pull and push paths
//!
//! Every encoder writes into a caller-provided byte slice and fails with
//! [`RelayError::PayloadTooLarge`] instead of writing past its end. A failed
//! encoding leaves unspecified bytes in the slice; callers only ship the
//! returned length.

use core::fmt::{self, Write};
use core::net::IpAddr;

use super::{ContentFormat, RelayError};
use crate::aggregator::Climate;
use crate::metric::Metric;
use crate::value::{SCALE, ScaledValue};

/// Flavor of the structured single-line maps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MapStyle {
    /// Single-quoted, unquoted keys: `{sensor: 'temperature',unit: 'C',...}`.
    /// Understood by the existing dashboards but not valid JSON.
    #[default]
    Legacy,
    /// Strict JSON: `{"sensor":"temperature","unit":"C",...}`
    Json,
}

impl MapStyle {
    /// Content format a map of this style is served with. Legacy maps are not
    /// JSON and go out as plain text.
    pub const fn content_format(self) -> ContentFormat {
        match self {
            Self::Legacy => ContentFormat::Text,
            Self::Json => ContentFormat::Json,
        }
    }
}

/// [`fmt::Write`] adapter over a fixed byte slice
pub struct PayloadWriter<'a> {
    buf: &'a mut [u8],
    len: usize,
}

impl<'a> PayloadWriter<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, len: 0 }
    }

    /// Bytes written so far
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.len
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

impl Write for PayloadWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let bytes = s.as_bytes();
        if bytes.len() > self.remaining() {
            return Err(fmt::Error);
        }
        self.buf[self.len..self.len + bytes.len()].copy_from_slice(bytes);
        self.len += bytes.len();
        Ok(())
    }
}

/// Run `f` against a fresh writer over `out`, returning the encoded length
fn encode_with(
    out: &mut [u8],
    f: impl FnOnce(&mut PayloadWriter<'_>) -> fmt::Result,
) -> Result<usize, RelayError> {
    let mut writer = PayloadWriter::new(out);
    f(&mut writer).map_err(|_| RelayError::PayloadTooLarge)?;
    Ok(writer.len())
}

/// Plain decimal with two fraction digits, e.g. `23.71`
pub fn decimal(value: ScaledValue, out: &mut [u8]) -> Result<usize, RelayError> {
    encode_with(out, |w| write!(w, "{}", value))
}

/// Map describing one metric reading, the value as a quoted scaled integer
pub fn metric_map(
    style: MapStyle,
    metric: Metric,
    value: ScaledValue,
    out: &mut [u8],
) -> Result<usize, RelayError> {
    encode_with(out, |w| match style {
        MapStyle::Legacy => write!(
            w,
            "{{sensor: '{}',unit: '{}',factor: {},value: '{}'}}",
            metric.name(),
            metric.unit(),
            SCALE,
            value.raw()
        ),
        MapStyle::Json => write!(
            w,
            "{{\"sensor\":\"{}\",\"unit\":\"{}\",\"factor\":{},\"value\":\"{}\"}}",
            metric.name(),
            metric.unit(),
            SCALE,
            value.raw()
        ),
    })
}

/// Temperature and humidity as raw scaled integers
pub fn climate_map(style: MapStyle, climate: Climate, out: &mut [u8]) -> Result<usize, RelayError> {
    let (t, h) = (climate.temperature.raw(), climate.humidity.raw());
    encode_with(out, |w| match style {
        MapStyle::Legacy => write!(w, "{{'temperature': {}, 'humidity': {}}}", t, h),
        MapStyle::Json => write!(w, "{{\"temperature\":{},\"humidity\":{}}}", t, h),
    })
}

/// Node address, or an empty map while none is known
pub fn info_map(style: MapStyle, addr: Option<IpAddr>, out: &mut [u8]) -> Result<usize, RelayError> {
    encode_with(out, |w| match (addr, style) {
        (None, _) => w.write_str("{}"),
        (Some(addr), MapStyle::Legacy) => write!(w, "{{'addr': '{}'}}", addr),
        (Some(addr), MapStyle::Json) => write!(w, "{{\"addr\":\"{}\"}}", addr),
    })
}
