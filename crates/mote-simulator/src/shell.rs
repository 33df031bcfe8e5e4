//! Line-oriented operator shell on stdin
//!
//! | Command           | Effect                                      |
//! |-------------------|---------------------------------------------|
//! | `get <metric>`    | print the current aggregate of a metric     |
//! | `put led <c>`     | LED command: `1`, `0`, `r`, `g` or `b`      |
//! | `climate`         | print the climate map                       |
//! | `info`            | print the info map                          |
//! | `wkc`             | print the discovery document                |
//! | `samples <metric>`| dump the raw sample window, oldest first    |
//! | `btn`             | request a push cycle (the simulated button) |
//! | `help`            | list commands                               |
//! | `quit`            | stop reading commands                       |

use std::io::{self, BufRead, Write};

use log::{info, warn};
use mote_core::actuator::{Indicator, LedCommand};
use mote_core::config::MAX_PAYLOAD;
use mote_core::net::AddressSource;
use mote_core::relay::link_format;
use mote_core::relay::{PushRequest, PushTrigger, RESOURCES, TelemetryRelay};
use mote_core::{Metric, Telemetry};

const HELP: &str = "commands: get <metric>, put led <1|0|r|g|b>, climate, info, wkc, \
                    samples <metric>, btn, help, quit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct Shell<'a, A, I> {
    relay: &'a TelemetryRelay<'a, A, I>,
    telemetry: &'a Telemetry,
    trigger: &'a PushTrigger,
}

impl<'a, A, I> Shell<'a, A, I>
where
    A: AddressSource,
    I: Indicator,
{
    pub fn new(
        relay: &'a TelemetryRelay<'a, A, I>,
        telemetry: &'a Telemetry,
        trigger: &'a PushTrigger,
    ) -> Self {
        Self {
            relay,
            telemetry,
            trigger,
        }
    }

    /// Read commands from stdin until `quit` or end of input
    pub fn run(&self) {
        let stdin = io::stdin();
        let mut stdout = io::stdout();
        for line in stdin.lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    warn!("Shell input failed: {}", e);
                    break;
                }
            };
            match self.execute(&line, &mut stdout) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Quit) => break,
                Err(e) => {
                    warn!("Shell output failed: {}", e);
                    break;
                }
            }
        }
        info!("Shell stopped, node keeps serving");
    }

    pub fn execute(&self, line: &str, out: &mut impl Write) -> io::Result<Flow> {
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            return Ok(Flow::Continue);
        };

        match (command, words.next(), words.next()) {
            ("get", Some(name), None) => match Metric::from_name(name) {
                Some(metric) => {
                    let value = self.relay.aggregator().current_value(metric);
                    writeln!(out, "{}: {} {}", metric, value, metric.unit())?;
                }
                None => writeln!(out, "unknown metric '{}'", name)?,
            },
            ("put", Some("led"), Some(arg)) => match LedCommand::from_payload(arg.as_bytes()) {
                Some(led) => {
                    self.relay.actuate(led);
                    writeln!(out, "ok")?;
                }
                None => writeln!(out, "usage: put led <1|0|r|g|b>")?,
            },
            ("climate", None, None) => {
                let mut buf = [0u8; MAX_PAYLOAD];
                match self.relay.encode_climate(&mut buf) {
                    Ok(len) => writeln!(out, "{}", String::from_utf8_lossy(&buf[..len]))?,
                    Err(e) => writeln!(out, "error: {}", e)?,
                }
            }
            ("info", None, None) => {
                let mut buf = [0u8; MAX_PAYLOAD];
                match self.relay.encode_info(&mut buf) {
                    Ok(len) => writeln!(out, "{}", String::from_utf8_lossy(&buf[..len]))?,
                    Err(e) => writeln!(out, "error: {}", e)?,
                }
            }
            ("wkc", None, None) => {
                let mut buf = [0u8; MAX_PAYLOAD];
                let len = link_format::render(&RESOURCES, &mut buf);
                writeln!(out, "{}", String::from_utf8_lossy(&buf[..len]))?;
            }
            ("samples", Some(name), None) => match Metric::from_name(name) {
                Some(metric) => {
                    let samples = self.telemetry.buffer(metric).snapshot();
                    writeln!(out, "{}: {:?}", metric, samples)?;
                }
                None => writeln!(out, "unknown metric '{}'", name)?,
            },
            ("btn", None, None) => {
                if self.trigger.request(PushRequest::Shell) {
                    writeln!(out, "push requested")?;
                } else {
                    writeln!(out, "push already pending")?;
                }
            }
            ("help", None, None) => writeln!(out, "{}", HELP)?,
            ("quit", None, None) => return Ok(Flow::Quit),
            _ => writeln!(out, "unknown command, try 'help'")?,
        }
        Ok(Flow::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mote_core::actuator::{LedChannel, LedState};
    use mote_core::net::NodeAddresses;

    fn run(shell: &Shell<'_, NodeAddresses, LedState>, line: &str) -> (Flow, String) {
        let mut out = Vec::new();
        let flow = shell.execute(line, &mut out).unwrap();
        (flow, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_get_and_put() {
        let telemetry: Telemetry = Telemetry::new();
        telemetry.seed(Metric::Humidity, 4512);
        let addresses = NodeAddresses::new();
        let trigger = PushTrigger::new();
        let relay = TelemetryRelay::new(&telemetry, &addresses, LedState::new());
        let shell = Shell::new(&relay, &telemetry, &trigger);

        assert_eq!(run(&shell, "get humidity").1, "humidity: 45.12 %\n");
        assert_eq!(run(&shell, "get pressure").1, "unknown metric 'pressure'\n");

        assert_eq!(run(&shell, "put led g").1, "ok\n");
        assert!(relay.with_indicator(|led| led.is_on(LedChannel::Green)));
        assert!(run(&shell, "put led x").1.starts_with("usage"));
    }

    #[test]
    fn test_push_and_quit() {
        let telemetry: Telemetry = Telemetry::new();
        let addresses = NodeAddresses::new();
        let trigger = PushTrigger::new();
        let relay = TelemetryRelay::new(&telemetry, &addresses, LedState::new());
        let shell = Shell::new(&relay, &telemetry, &trigger);

        assert_eq!(run(&shell, "btn").1, "push requested\n");
        assert_eq!(trigger.try_next(), Some(PushRequest::Shell));
        assert_eq!(run(&shell, "   ").0, Flow::Continue);
        assert_eq!(run(&shell, "quit").0, Flow::Quit);
    }

    #[test]
    fn test_discovery_listing() {
        let telemetry: Telemetry = Telemetry::new();
        let addresses = NodeAddresses::new();
        let trigger = PushTrigger::new();
        let relay = TelemetryRelay::new(&telemetry, &addresses, LedState::new());
        let shell = Shell::new(&relay, &telemetry, &trigger);

        let (_, listing) = run(&shell, "wkc");
        assert!(listing.starts_with("</.well-known/core>;ct=40,</temperature>;ct=0"));
        assert!(!listing.contains("led"));
    }
}
