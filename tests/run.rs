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

use async_std::channel::Sender;
use async_std::task::block_on;
use hoptrace::error::{EngineResult, LocalAddressError};
use hoptrace::{
    EngineError, LocalAddress, Options, ProbeConfig, ProbeEngine, ProbeFailure, ProbeOutcome,
    RunError,
};
use std::io::{self, Write};
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct Loopback;

impl LocalAddress for Loopback {
    fn local_address(&self) -> Result<IpAddr, LocalAddressError> {
        Ok("127.0.0.1".parse().unwrap())
    }
}

/// Engine replaying a fixed list of outcomes, optionally failing at the end.
struct ScriptedEngine {
    outcomes: Vec<ProbeOutcome>,
    fail: bool,
    seen: Arc<Mutex<Option<ProbeConfig>>>,
}

impl ScriptedEngine {
    fn new(outcomes: Vec<ProbeOutcome>) -> Self {
        ScriptedEngine { outcomes, fail: false, seen: Arc::new(Mutex::new(None)) }
    }
}

impl ProbeEngine for ScriptedEngine {
    fn run(&mut self, config: &ProbeConfig, results: Sender<ProbeOutcome>) -> EngineResult<()> {
        *self.seen.lock().unwrap() = Some(config.clone());
        for outcome in self.outcomes.drain(..) {
            block_on(results.send(outcome)).map_err(|_| EngineError::ResultsClosed)?;
        }
        if self.fail {
            return Err(EngineError::UnsupportedAddressFamily(config.destination_address));
        }
        Ok(())
    }
}

/// Writer that stays readable after being moved into a run.
#[derive(Clone, Debug, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn reply(ttl: u8, addr: &str, millis: u64) -> ProbeOutcome {
    ProbeOutcome::reply(ttl, addr.parse().unwrap(), Duration::from_millis(millis), 56)
}

fn lost(ttl: u8) -> ProbeOutcome {
    ProbeOutcome::failure(ttl, ProbeFailure::Timeout)
}

fn config() -> ProbeConfig {
    Options::default()
        .with_destination_address("10.0.0.9")
        .with_max_ttl(30)
        .resolve(&Loopback)
        .unwrap()
}

#[test]
fn test_full_run_renders_report() {
    let engine = ScriptedEngine::new(vec![
        reply(1, "192.168.1.1", 1),
        reply(1, "192.168.1.1", 2),
        reply(1, "192.168.1.1", 3),
        lost(2),
        lost(2),
        lost(2),
        reply(3, "10.0.0.1", 5),
        reply(3, "10.0.0.2", 6),
        reply(3, "10.0.0.2", 7),
        reply(4, "10.0.0.9", 8),
        reply(4, "10.0.0.9", 8),
        reply(4, "10.0.0.9", 9),
    ]);
    let seen = engine.seen.clone();

    let out = block_on(hoptrace::run(config(), engine, Vec::new())).unwrap();
    let expected = "\n 1 192.168.1.1  1.00 ms 2.00 ms 3.00 ms\
                    \n 2 * * *\
                    \n 3 10.0.0.1  5.00 ms\
                    \n 10.0.0.2  6.00 ms 7.00 ms\
                    \n 4 10.0.0.9  8.00 ms 8.00 ms 9.00 ms\n";
    assert_eq!(String::from_utf8(out).unwrap(), expected);

    let seen = seen.lock().unwrap().clone().unwrap();
    assert_eq!(seen.source_address, "127.0.0.1".parse::<IpAddr>().unwrap());
    assert_eq!(seen.source_port, seen.destination_port);
}

#[test]
fn test_engine_error_is_reported_after_report() {
    let mut engine = ScriptedEngine::new(vec![reply(1, "192.168.1.1", 1), lost(2)]);
    engine.fail = true;
    let buffer = SharedBuffer::default();

    let err = block_on(hoptrace::run(config(), engine, buffer.clone())).unwrap_err();
    assert!(matches!(err, RunError::Engine(EngineError::UnsupportedAddressFamily(_))));
    assert_eq!(buffer.contents(), "\n 1 192.168.1.1  1.00 ms\n 2 *\n");
}

#[test]
fn test_engine_without_outcomes() {
    let engine = ScriptedEngine::new(Vec::new());
    let out = block_on(hoptrace::run(config(), engine, Vec::new())).unwrap();
    assert_eq!(out, b"\n");
}
