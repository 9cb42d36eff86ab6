/*
   Copyright 2020 Ilya Grishkov

   Licensed under the Apache License, Version 2.0 (the "License");
   you may not use this file except in compliance with the License.
   You may obtain a copy of the License at

       http://www.apache.org/licenses/LICENSE-2.0

   Unless required by applicable law or agreed to in writing, software
   distributed under the License is distributed on an "AS IS" BASIS,
   WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
   See the License for the specific language governing permissions and
   limitations under the License.
*/

use async_std::channel::Receiver;
use std::io::{self, Write};
use std::net::IpAddr;
use std::time::Duration;
use tracing::debug;

use crate::engine::ProbeOutcome;

/// Streaming renderer grouping probe outcomes by TTL, then by responding address.
///
/// Each TTL starts a new line labelled with the TTL right-aligned to the width
/// of the largest TTL. Consecutive replies from one address share a line; a
/// different address starts a new line. Lost probes render as `*`.
///
/// Outcomes of one TTL must arrive contiguously. Nothing is buffered, so a TTL
/// that shows up again after another one starts a second block.
#[derive(Debug, Clone)]
pub struct HopReport {
    label_width: usize,
    current_ttl: Option<u8>,
    current_address: Option<IpAddr>,
}

impl HopReport {
    pub fn new(max_ttl: u8) -> Self {
        HopReport {
            label_width: max_ttl.to_string().len(),
            current_ttl: None,
            current_address: None,
        }
    }

    /// Advances the report by one outcome and returns the text to append.
    pub fn render(&mut self, outcome: &ProbeOutcome) -> String {
        let mut out = String::new();

        if self.current_ttl != Some(outcome.ttl) {
            out.push_str(&format!("\n{:>width$}", outcome.ttl, width = self.label_width));
            self.current_ttl = Some(outcome.ttl);
            self.current_address = None;
        }

        match &outcome.result {
            Err(_) => out.push_str(" *"),
            Ok(reply) => {
                if self.current_address != Some(reply.address) {
                    if self.current_address.is_some() {
                        out.push('\n');
                    }
                    out.push_str(&format!(" {} ", reply.address));
                    self.current_address = Some(reply.address);
                }
                out.push_str(&format!(" {:.2} ms", as_millis_f64(reply.rtt)));
            }
        }
        out
    }

    /// Text closing the report once the stream has ended.
    pub fn finish(&self) -> &'static str {
        "\n"
    }
}

fn as_millis_f64(duration: Duration) -> f64 {
    duration.as_nanos() as f64 / 1_000_000.0
}

/// Renders outcomes from `results` into `out` until the sender side closes.
///
/// Every fragment is flushed as soon as it is rendered.
pub async fn drain<W: Write>(
    results: Receiver<ProbeOutcome>,
    mut report: HopReport,
    mut out: W,
) -> io::Result<W> {
    let mut received = 0usize;
    while let Ok(outcome) = results.recv().await {
        received += 1;
        out.write_all(report.render(&outcome).as_bytes())?;
        out.flush()?;
    }
    debug!(received, "probe stream closed");
    out.write_all(report.finish().as_bytes())?;
    out.flush()?;
    Ok(out)
}
