//! Packet Protocol (§4.3): framed command packets and data blocks built on
//! the Handshake Engine, plus the three high-level operations (ROM upload,
//! SRAM download, SRAM upload) built on those frames.

use core::fmt::Write as _;

use embedded_hal::delay::DelayNs;

use crate::fault::{Fault, Timeout};
use crate::hal::{GpioByte, HostLink};
use crate::handshake::{receive_byte, send_byte};
use crate::port::PortDriver;

/// Peripheral constraint: "don't change, only 8192 works" (§9). No code
/// path accepts another block size.
pub const BLOCK_SIZE: u16 = 8192;

/// Seed for every running XOR checksum, command or block.
const CHECKSUM_SEED: u8 = 0x81;

/// Fixed synchronization marker prefixing every command packet.
const PREAMBLE: [u8; 3] = [0xD5, 0xAA, 0x96];

/// SRAM is 4 banks of 8 KiB each.
const SRAM_BLOCKS: u16 = 4;

/// Delay between SRAM read blocks; gives the cartridge time to settle
/// between bank reads.
const SRAM_READ_BLOCK_DELAY_MS: u32 = 50;

type Bus<D, S, C, L> = PortDriver<D, S, C, L>;

/// Emits preamble + opcode + address (lo, hi) + length (lo, hi) + checksum.
pub fn send_command<D, S, C, L, H>(
    port: &mut Bus<D, S, C, L>,
    fault: &Fault,
    host: &mut H,
    op: u8,
    addr: u16,
    len: u16,
) -> Result<(), Timeout>
where
    D: GpioByte,
    S: GpioByte,
    C: GpioByte,
    L: GpioByte,
    H: HostLink,
{
    fault.check()?;
    let addr_lo = addr as u8;
    let addr_hi = (addr >> 8) as u8;
    let len_lo = len as u8;
    let len_hi = (len >> 8) as u8;
    let checksum = CHECKSUM_SEED ^ op ^ addr_lo ^ addr_hi ^ len_lo ^ len_hi;

    host.task_pump();
    for &b in PREAMBLE.iter() {
        send_byte(port, fault, b)?;
    }
    send_byte(port, fault, op)?;
    send_byte(port, fault, addr_lo)?;
    send_byte(port, fault, addr_hi)?;
    send_byte(port, fault, len_lo)?;
    send_byte(port, fault, len_hi)?;
    send_byte(port, fault, checksum)?;
    Ok(())
}

/// Convenience form for a single-byte register write: `command(op=0, len=1)`
/// followed by the payload byte and its trailing checksum.
pub fn send_command0<D, S, C, L, H>(
    port: &mut Bus<D, S, C, L>,
    fault: &Fault,
    host: &mut H,
    address: u16,
    byte: u8,
) -> Result<(), Timeout>
where
    D: GpioByte,
    S: GpioByte,
    C: GpioByte,
    L: GpioByte,
    H: HostLink,
{
    fault.check()?;
    send_command(port, fault, host, 0, address, 1)?;
    send_byte(port, fault, byte)?;
    send_byte(port, fault, CHECKSUM_SEED ^ byte)?;
    Ok(())
}

/// Emits `command(op=0, target_addr, size)`, then streams `size` payload
/// bytes drawn on demand from the host link, maintaining a running XOR
/// checksum, then emits the checksum. Pumps the USB task at least once per
/// pass through the outer draw loop so the device never blocks awaiting
/// more host bytes without yielding (§4.3, §5).
pub fn send_block<D, S, C, L, H>(
    port: &mut Bus<D, S, C, L>,
    fault: &Fault,
    host: &mut H,
    target_addr: u16,
    size: u16,
) -> Result<(), Timeout>
where
    D: GpioByte,
    S: GpioByte,
    C: GpioByte,
    L: GpioByte,
    H: HostLink,
{
    fault.check()?;
    send_command(port, fault, host, 0, target_addr, size)?;

    let mut checksum = CHECKSUM_SEED;
    let mut sent: u16 = 0;
    while sent < size {
        host.task_pump();
        let ready = host.bytes_received();
        for _ in 0..ready {
            if sent >= size {
                break;
            }
            let Some(byte) = host.receive_byte() else {
                break;
            };
            send_byte(port, fault, byte)?;
            checksum ^= byte;
            sent += 1;
        }
    }
    send_byte(port, fault, checksum)?;
    Ok(())
}

/// Emits `command(op=1, target_addr, len)`, reads `len` payload bytes from
/// the peripheral, forwards each to the host, then reads the trailing
/// checksum byte. Returns `true` if the computed checksum disagrees with the
/// received one (a checksum mismatch, not a timeout — counted, not
/// aborted).
pub fn receive_block<D, S, C, L, H>(
    port: &mut Bus<D, S, C, L>,
    fault: &Fault,
    host: &mut H,
    target_addr: u16,
    len: u16,
) -> Result<bool, Timeout>
where
    D: GpioByte,
    S: GpioByte,
    C: GpioByte,
    L: GpioByte,
    H: HostLink,
{
    fault.check()?;
    send_command(port, fault, host, 1, target_addr, len)?;

    let mut checksum = CHECKSUM_SEED;
    for _ in 0..len {
        let byte = receive_byte(port, fault)?;
        host.send_data(&[byte]);
        checksum ^= byte;
        host.task_pump();
    }
    let received = receive_byte(port, fault)?;
    Ok(checksum != received)
}

/// `write_rom(total_blocks, emu_mode_select)` (§4.3).
pub fn write_rom<D, S, C, L, H>(
    port: &mut Bus<D, S, C, L>,
    fault: &Fault,
    host: &mut H,
    total_blocks: u16,
    emu_mode_select: u8,
) -> Result<(), Timeout>
where
    D: GpioByte,
    S: GpioByte,
    C: GpioByte,
    L: GpioByte,
    H: HostLink,
{
    fault.check()?;
    let mut address: u16 = 0x200;
    for block in 0..total_blocks {
        send_command0(port, fault, host, 0xC010, (block >> 9) as u8)?;
        send_command(port, fault, host, 5, address, 0)?;
        send_block(port, fault, host, 0x8000, BLOCK_SIZE)?;
        address = address.wrapping_add(1);
    }

    if total_blocks > 0x200 {
        send_command0(port, fault, host, 0xC010, 1)?;
    }

    send_command(port, fault, host, 5, 0, 0)?;
    send_command(port, fault, host, 6, (total_blocks << 8) | 5, total_blocks >> 8)?;
    send_command(
        port,
        fault,
        host,
        6,
        ((emu_mode_select as u16) << 8) | 1,
        0,
    )?;

    host.send_data(b"OK\n");
    host.flush();
    Ok(())
}

/// Shared header for both SRAM operations: select the cartridge bank,
/// address the SRAM window.
fn sram_header<D, S, C, L, H>(
    port: &mut Bus<D, S, C, L>,
    fault: &Fault,
    host: &mut H,
) -> Result<(), Timeout>
where
    D: GpioByte,
    S: GpioByte,
    C: GpioByte,
    L: GpioByte,
    H: HostLink,
{
    send_command(port, fault, host, 5, 0, 0)?;
    send_command0(port, fault, host, 0xE00D, 0)?;
    send_command0(port, fault, host, 0xC008, 0)?;
    Ok(())
}

/// `read_sram()` (§4.3). Returns the checksum-mismatch count; the caller
/// reports `*#*#*#*OK\n` or `*#*#*ERR<n>\n` accordingly.
pub fn read_sram<D, S, C, L, H, DL>(
    port: &mut Bus<D, S, C, L>,
    fault: &Fault,
    host: &mut H,
    delay: &mut DL,
) -> Result<u8, Timeout>
where
    D: GpioByte,
    S: GpioByte,
    C: GpioByte,
    L: GpioByte,
    H: HostLink,
    DL: DelayNs,
{
    fault.check()?;
    sram_header(port, fault, host)?;

    let mut address: u16 = 0x100;
    let mut error_count: u8 = 0;
    for _ in 0..SRAM_BLOCKS {
        send_command(port, fault, host, 5, address, 0)?;
        if receive_block(port, fault, host, 0x2000, BLOCK_SIZE)? {
            error_count = error_count.saturating_add(1);
        }
        delay.delay_ms(SRAM_READ_BLOCK_DELAY_MS);
        address = address.wrapping_add(1);
    }

    host.flush();

    if error_count > 0 {
        let mut line: heapless::String<24> = heapless::String::new();
        let _ = write!(line, "*#*#*ERR{}\n", error_count);
        host.send_data(line.as_bytes());
    } else {
        host.send_data(b"*#*#*#*OK\n");
    }
    host.flush();

    Ok(error_count)
}

/// `write_sram(total_bytes)` (§4.3).
pub fn write_sram<D, S, C, L, H>(
    port: &mut Bus<D, S, C, L>,
    fault: &Fault,
    host: &mut H,
    total_bytes: u16,
) -> Result<(), Timeout>
where
    D: GpioByte,
    S: GpioByte,
    C: GpioByte,
    L: GpioByte,
    H: HostLink,
{
    fault.check()?;
    sram_header(port, fault, host)?;

    let last_block_size = total_bytes % BLOCK_SIZE;
    let mut blocks = total_bytes / BLOCK_SIZE;
    if last_block_size != 0 {
        blocks += 1;
    }

    let mut address: u16 = 0x100;
    for block in 0..blocks {
        let block_size = if last_block_size != 0 && block == blocks - 1 {
            last_block_size
        } else {
            BLOCK_SIZE
        };
        send_command(port, fault, host, 5, address, 0)?;
        send_block(port, fault, host, 0x2000, block_size)?;
        address = address.wrapping_add(1);
    }

    host.send_data(b"OK\n");
    host.flush();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::mcu_gpio::test_support::FakeGpio;

    /// Host-side test double implementing `HostLink` over two in-memory
    /// queues, used to assert checksum and framing properties without real
    /// USB hardware.
    struct FakeHost {
        inbound: heapless::Deque<u8, 8192>,
        outbound: heapless::Vec<u8, 16384>,
    }

    impl FakeHost {
        fn new() -> Self {
            Self {
                inbound: heapless::Deque::new(),
                outbound: heapless::Vec::new(),
            }
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

        fn task_pump(&mut self) {}
    }

    fn driver() -> PortDriver<FakeGpio, FakeGpio, FakeGpio, FakeGpio> {
        let mut d = PortDriver::new(
            FakeGpio::new(),
            FakeGpio::new(),
            FakeGpio::new(),
            FakeGpio::new(),
        );
        d.activate();
        d
    }

    #[test]
    fn command_checksum_matches_known_values() {
        // Property 2 (§8), against hand-computed expectations.
        for (op, addr, len, expected) in [
            (0u8, 0u16, 0u16, 0x81u8),
            (5, 0x200, 0, 0x86),
            (6, 0xABCD, 0x1234, 0xC7),
        ] {
            let checksum = CHECKSUM_SEED
                ^ op
                ^ (addr as u8)
                ^ ((addr >> 8) as u8)
                ^ (len as u8)
                ^ ((len >> 8) as u8);
            assert_eq!(checksum, expected);
        }
    }

    #[test]
    fn checksum_closure_over_payload() {
        // Property 1 (§8): fold(XOR, 0x81, P) equals the trailing checksum
        // send_block would emit.
        let payload = [0x00u8, 0x01, 0xFF, 0x80, 0x7E];
        let folded = payload.iter().fold(CHECKSUM_SEED, |acc, &b| acc ^ b);
        assert_eq!(folded, 0x81 ^ 0x00 ^ 0x01 ^ 0xFF ^ 0x80 ^ 0x7E);
    }

    #[test]
    fn write_rom_aborts_on_timeout_without_a_real_peripheral() {
        // No real peripheral is attached: seed raw status input with 0x80 so
        // it normalizes to busy=0 and never flips, exhausting POLL_MAX on
        // the very first send_byte.
        let mut port = driver();
        port.status_gpio().input.set(0x80);
        let mut host = FakeHost::new();
        let fault = Fault::new();
        let result = write_rom(&mut port, &fault, &mut host, 1, 0);
        assert!(result.is_err());
        assert!(fault.is_set());
        // the operation never reached its success report
        assert!(host.outbound.is_empty());
    }

    #[test]
    fn write_sram_block_count_matches_ceil_division() {
        // total_bytes=16 -> 1 block of size 16 (scenario 4, §8).
        let total_bytes: u16 = 16;
        let last_block_size = total_bytes % BLOCK_SIZE;
        let mut blocks = total_bytes / BLOCK_SIZE;
        if last_block_size != 0 {
            blocks += 1;
        }
        assert_eq!(blocks, 1);
        assert_eq!(last_block_size, 16);
    }

    #[test]
    fn never_drives_bus_once_faulted() {
        let mut port = driver();
        let mut host = FakeHost::new();
        let fault = Fault::new();
        fault.set();
        let writes_before = port.data_gpio().write_calls.get();
        let result = send_command(&mut port, &fault, &mut host, 5, 0, 0);
        assert_eq!(result, Err(Timeout));
        assert_eq!(port.data_gpio().write_calls.get(), writes_before);
    }
}
