//! Resource discovery rendering
//!
//! Produces the `/.well-known/core` document: a comma separated list of
//! `<path>;attrs` entries. Resources without link attributes are not
//! advertised.

use core::fmt::Write;

use super::Resource;
use super::encode::PayloadWriter;

/// Length of the `<path>;attrs` entry for `resource`
fn entry_len(resource: &Resource, attrs: &str) -> usize {
    resource.path.len() + attrs.len() + 3
}

/// Render the advertised entries of `resources` into `out`.
///
/// Rendering stops before the first entry that does not fit completely, so
/// the output is always a well-formed (possibly shortened) document.
pub fn render(resources: &[Resource], out: &mut [u8]) -> usize {
    let mut writer = PayloadWriter::new(out);

    for resource in resources {
        let Some(attrs) = resource.link_attrs else {
            continue;
        };
        let separator = usize::from(!writer.is_empty());
        if separator + entry_len(resource, attrs) > writer.remaining() {
            break;
        }
        // Fits, checked above
        let _ = write!(
            writer,
            "{}<{}>;{}",
            if separator == 1 { "," } else { "" },
            resource.path,
            attrs
        );
    }

    writer.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::RESOURCES;

    const FULL: &str = "</.well-known/core>;ct=40,</temperature>;ct=0,</humidity>;ct=0,\
                        </airquality>;ct=0,</climate>;ct=50,</info>;ct=50";

    #[test]
    fn test_full_document() {
        let mut out = [0u8; 255];
        let len = render(&RESOURCES, &mut out);
        assert_eq!(core::str::from_utf8(&out[..len]).unwrap(), FULL);
    }

    #[test]
    fn test_led_is_not_advertised() {
        let mut out = [0u8; 255];
        let len = render(&RESOURCES, &mut out);
        let document = core::str::from_utf8(&out[..len]).unwrap();
        assert!(!document.contains("led"));
    }

    #[test]
    fn test_truncates_at_entry_boundary() {
        // Room for the first two entries and part of the third
        let mut out = [0u8; 52];
        let len = render(&RESOURCES, &mut out);
        assert_eq!(
            core::str::from_utf8(&out[..len]).unwrap(),
            "</.well-known/core>;ct=40,</temperature>;ct=0"
        );

        let mut none = [0u8; 5];
        assert_eq!(render(&RESOURCES, &mut none), 0);
    }
}
