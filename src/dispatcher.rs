//! Command Dispatcher (§4.4): reads one fixed-width command token per
//! iteration, activates the bus, invokes the matching Packet Protocol
//! routine, reports status, and drains any residual host input before
//! returning to wait for the next command.

use embedded_hal::delay::DelayNs;

use crate::fault::Fault;
use crate::hal::{GpioByte, HostLink};
use crate::port::PortDriver;
use crate::protocol;

/// Every command token is exactly this many bytes; the last is forced to a
/// NUL terminator so the first 10 bytes can be compared as a string.
const TOKEN_LEN: usize = 11;

const CMD_WRITE_ROM: &[u8] = b"WRITE ROM\0";
const CMD_READ_SRAM: &[u8] = b"READ SRAM\0";
const CMD_WRITE_SRAM: &[u8] = b"WRITE SRAM";

/// Owns the fault latch and the Port Driver for the lifetime of the device;
/// `run` never returns.
pub struct Dispatcher<D, S, C, L, H, DL>
where
    D: GpioByte,
    S: GpioByte,
    C: GpioByte,
    L: GpioByte,
    H: HostLink,
    DL: DelayNs,
{
    port: PortDriver<D, S, C, L>,
    host: H,
    delay: DL,
    fault: Fault,
}

impl<D, S, C, L, H, DL> Dispatcher<D, S, C, L, H, DL>
where
    D: GpioByte,
    S: GpioByte,
    C: GpioByte,
    L: GpioByte,
    H: HostLink,
    DL: DelayNs,
{
    pub fn new(port: PortDriver<D, S, C, L>, host: H, delay: DL) -> Self {
        Self {
            port,
            host,
            delay,
            fault: Fault::new(),
        }
    }

    /// Runs one full iteration: read token, activate, execute, deactivate,
    /// report, drain, pump. Never panics on malformed or unknown input.
    pub fn run_once(&mut self) {
        let mut token = [0u8; TOKEN_LEN];
        self.host.receive_exact(&mut token);
        token[TOKEN_LEN - 1] = 0;
        log::debug!("dispatcher: token {:?}", &token[..TOKEN_LEN - 1]);

        self.port.activate();

        if token_matches(&token, CMD_WRITE_ROM) {
            let mut args = [0u8; 3];
            self.host.receive_exact(&mut args);
            let total_blocks = ((args[0] as u16) << 8) | args[1] as u16;
            let emu_mode_select = args[2];
            log::info!(
                "dispatcher: WRITE ROM blocks={} emu_mode={}",
                total_blocks,
                emu_mode_select
            );
            let _ = protocol::write_rom(
                &mut self.port,
                &self.fault,
                &mut self.host,
                total_blocks,
                emu_mode_select,
            );
        } else if token_matches(&token, CMD_READ_SRAM) {
            log::info!("dispatcher: READ SRAM");
            let _ = protocol::read_sram(&mut self.port, &self.fault, &mut self.host, &mut self.delay);
        } else if token_matches(&token, CMD_WRITE_SRAM) {
            let mut args = [0u8; 2];
            self.host.receive_exact(&mut args);
            let total_bytes = ((args[0] as u16) << 8) | args[1] as u16;
            log::info!("dispatcher: WRITE SRAM bytes={}", total_bytes);
            let _ = protocol::write_sram(&mut self.port, &self.fault, &mut self.host, total_bytes);
        } else {
            log::warn!("dispatcher: unknown command token");
            self.host.send_data(b"UNKNOWN COMMAND\n");
            self.host.flush();
        }

        self.port.deactivate();

        if self.fault.is_set() {
            log::warn!("dispatcher: fault latch set, reporting TIMEOUT");
            self.host.send_data(b"TIMEOUT\n");
            self.host.flush();
            self.fault.clear();
        }

        self.drain_residual_input();
        self.host.task_pump();
    }

    /// Runs `run_once` forever. The entry point's only call into core logic.
    pub fn run(&mut self) -> ! {
        loop {
            self.run_once();
        }
    }

    /// Discards any bytes still buffered from the host after an operation
    /// completes, pumping USB between reads so the endpoint keeps draining.
    fn drain_residual_input(&mut self) {
        while self.host.bytes_received() > 0 {
            let _ = self.host.receive_byte();
            self.host.task_pump();
        }
    }
}

/// Compares the first `pattern.len()` bytes of `token` against `pattern`,
/// treating the command set as fixed-width prefixes (§3, §6).
fn token_matches(token: &[u8; TOKEN_LEN], pattern: &[u8]) -> bool {
    &token[..pattern.len()] == pattern
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::mcu_gpio::test_support::FakeGpio;

    struct FakeHost {
        inbound: heapless::Deque<u8, 64>,
        outbound: heapless::Vec<u8, 256>,
        pumps: u32,
    }

    impl FakeHost {
        fn with_bytes(bytes: &[u8]) -> Self {
            let mut inbound = heapless::Deque::new();
            for &b in bytes {
                inbound.push_back(b).unwrap();
            }
            Self {
                inbound,
                outbound: heapless::Vec::new(),
                pumps: 0,
            }
        }

        fn outbound_str(&self) -> &str {
            core::str::from_utf8(&self.outbound).unwrap()
        }
    }

    impl HostLink for FakeHost {
        fn receive_byte(&mut self) -> Option<u8> {
            self.inbound.pop_front()
        }

        fn bytes_received(&self) -> usize {
            self.inbound.len()
        }

        fn send_data(&mut self, buf: &[u8]) {
            for &b in buf {
                let _ = self.outbound.push(b);
            }
        }

        fn flush(&mut self) {}

        fn task_pump(&mut self) {
            self.pumps += 1;
        }
    }

    struct NoDelay;
    impl DelayNs for NoDelay {
        fn delay_ns(&mut self, _ns: u32) {}
    }

    fn port() -> PortDriver<FakeGpio, FakeGpio, FakeGpio, FakeGpio> {
        PortDriver::new(
            FakeGpio::new(),
            FakeGpio::new(),
            FakeGpio::new(),
            FakeGpio::new(),
        )
    }

    #[test]
    fn unknown_command_reports_and_drains() {
        // Scenario 6 (§8): a garbage token gets UNKNOWN COMMAND and whatever
        // residual bytes follow it are drained rather than misparsed as a
        // later token.
        let mut input = heapless::Vec::<u8, 64>::new();
        input.extend_from_slice(b"GARBAGETOK\0").unwrap();
        input.extend_from_slice(&[0xAA, 0xBB, 0xCC]).unwrap();
        let host = FakeHost::with_bytes(&input);
        let mut dispatcher = Dispatcher::new(port(), host, NoDelay);

        dispatcher.run_once();

        assert_eq!(dispatcher.host.outbound_str(), "UNKNOWN COMMAND\n");
        assert_eq!(dispatcher.host.bytes_received(), 0);
        assert!(dispatcher.host.pumps > 0);
    }

    #[test]
    fn token_matches_exact_prefix_only() {
        let mut token = [0u8; TOKEN_LEN];
        token[..10].copy_from_slice(b"WRITE ROM ");
        assert!(!token_matches(&token, CMD_WRITE_ROM));

        let mut token = [0u8; TOKEN_LEN];
        token[..10].copy_from_slice(CMD_WRITE_ROM);
        assert!(token_matches(&token, CMD_WRITE_ROM));
    }

    #[test]
    fn write_sram_parses_big_endian_length() {
        let mut input = heapless::Vec::<u8, 64>::new();
        input.extend_from_slice(CMD_WRITE_SRAM).unwrap();
        input.push(0).unwrap();
        input.extend_from_slice(&[0x00, 0x10]).unwrap(); // 16 bytes
        let host = FakeHost::with_bytes(&input);
        let port = port();
        // raw input 0x80 normalizes to busy=0, so the first send_byte inside
        // write_sram's header never sees busy=1 and faults immediately,
        // rather than run_once hanging in send_block's empty-host loop.
        port.status_gpio().input.set(0x80);
        let mut dispatcher = Dispatcher::new(port, host, NoDelay);

        dispatcher.run_once();

        assert!(dispatcher.host.outbound_str().ends_with("TIMEOUT\n"));
    }
}
