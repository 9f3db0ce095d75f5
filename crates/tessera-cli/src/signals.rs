// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Forwards SIGINT and SIGTERM to the running orchestrator so worker process
//! groups are killed before the driver exits.

use anyhow::Result;
use std::sync::Arc;
use tessera_runtime::InterruptHandle;

/// Installs the handlers and starts a thread that interrupts `handle` on the
/// first signal received.
#[cfg(unix)]
pub fn forward_to(handle: Arc<InterruptHandle>) -> Result<()> {
    use std::thread;
    use std::time::Duration;

    const POLL_INTERVAL: Duration = Duration::from_millis(50);

    unix::install()?;
    thread::Builder::new()
        .name("tessera-signals".to_string())
        .spawn(move || loop {
            if let Some(signal) = unix::take_pending() {
                log::warn!("Received {signal}; terminating workers");
                handle.interrupt();
                return;
            }
            thread::sleep(POLL_INTERVAL);
        })?;
    Ok(())
}

#[cfg(not(unix))]
pub fn forward_to(_handle: Arc<InterruptHandle>) -> Result<()> {
    log::debug!("Signal forwarding is not supported on this platform");
    Ok(())
}

#[cfg(unix)]
mod unix {
    use nix::libc::c_int;
    use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
    use std::sync::atomic::{AtomicI32, Ordering};

    static PENDING: AtomicI32 = AtomicI32::new(0);

    // Only async-signal-safe work is allowed here.
    extern "C" fn record(signal: c_int) {
        PENDING.store(signal, Ordering::SeqCst);
    }

    pub fn install() -> nix::Result<()> {
        let action = SigAction::new(SigHandler::Handler(record), SaFlags::SA_RESTART, SigSet::empty());
        for signal in [Signal::SIGINT, Signal::SIGTERM] {
            // SAFETY: the handler only stores to an atomic.
            unsafe { sigaction(signal, &action) }?;
        }
        Ok(())
    }

    pub fn take_pending() -> Option<&'static str> {
        match PENDING.swap(0, Ordering::SeqCst) {
            0 => None,
            raw => Some(Signal::try_from(raw).map(Signal::as_str).unwrap_or("signal")),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use nix::sys::signal::{raise, Signal};
    use std::thread;
    use std::time::{Duration, Instant};

    #[test]
    fn termination_signal_interrupts_the_handle() {
        let handle = Arc::new(InterruptHandle::new());
        forward_to(Arc::clone(&handle)).unwrap();

        raise(Signal::SIGTERM).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while !handle.is_requested() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert!(handle.is_requested());
    }
}
