//! Simulated SMBus host and PSE chip.
//!
//! A fully safe stand-in for the hardware path: the host register block with
//! its write-1-to-clear status latches and idle/complete sentinels, and the
//! quad-port PSE chip behind it. Protocol and bit-arithmetic tests run
//! against this instead of real I/O ports.
//!
//! Clones share one underlying bus, so several engines (or several threads)
//! can be pointed at the same simulated hardware.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::io::PortIo;
use crate::regs::{Register, PSE_ADDR, PSE_ID, SMBUS_BASE};
use crate::smbus::{
    CNT_KILL, CNT_START, SMB_HST_CMD, SMB_HST_CNT, SMB_HST_DAT0, SMB_HST_STS, SMB_XMIT_SLVA,
    STS_BYTE_DONE, STS_DEV_ERR, STS_FAILED, STS_INTR, STS_INUSE,
};

/// Register file of the simulated chip.
#[derive(Debug)]
struct ChipRegs {
    device_id: u8,
    power_status: u8,
    operating_mode: u8,
    disconnect_enable: u8,
    detect_class_enable: u8,
}

impl ChipRegs {
    fn read(&self, command: u8) -> u8 {
        match Register::from_code(command) {
            Some(Register::PowerStatus) => self.power_status,
            Some(Register::OperatingMode) => self.operating_mode,
            Some(Register::DisconnectEnable) => self.disconnect_enable,
            Some(Register::DetectClassEnable) => self.detect_class_enable,
            Some(Register::DeviceId) => self.device_id,
            // PowerEnable is write-only; unmapped commands float low.
            Some(Register::PowerEnable) | None => 0x00,
        }
    }

    fn write(&mut self, command: u8, value: u8) {
        match Register::from_code(command) {
            Some(Register::PowerEnable) => {
                // Push-button: low nibble powers ports on, high nibble powers
                // them off; off wins when both bits are raised for a port.
                let on = value & 0x0F;
                let off = value >> 4;
                self.power_status = (self.power_status | on) & !off & 0x0F;
            }
            Some(Register::OperatingMode) => self.operating_mode = value,
            Some(Register::DisconnectEnable) => self.disconnect_enable = value,
            Some(Register::DetectClassEnable) => self.detect_class_enable = value,
            // Read-only or unmapped.
            Some(Register::PowerStatus) | Some(Register::DeviceId) | None => {}
        }
    }
}

#[derive(Debug)]
struct SimState {
    cnt: u8,
    cmd: u8,
    slva: u8,
    dat0: u8,
    /// Raised write-1-to-clear status bits.
    latches: u8,
    /// Host status pinned busy; no sentinel is ever reached.
    wedged: bool,
    /// Chip acknowledges its bus address.
    present: bool,
    /// Once this many device writes land, the chip stops acknowledging.
    vanish_after_writes: Option<usize>,
    regs: ChipRegs,
    device_writes: Vec<(u8, u8)>,
}

impl SimState {
    fn execute(&mut self) {
        if !self.present || (self.slva & 0xFE) != PSE_ADDR {
            self.latches |= STS_DEV_ERR;
            return;
        }
        if self.slva & 1 != 0 {
            self.dat0 = self.regs.read(self.cmd);
        } else {
            self.regs.write(self.cmd, self.dat0);
            self.device_writes.push((self.cmd, self.dat0));
            if let Some(limit) = self.vanish_after_writes {
                if self.device_writes.len() >= limit {
                    self.present = false;
                }
            }
        }
        self.latches |= STS_INTR;
    }
}

/// Safe simulated bus: SMBus host block plus the PSE chip behind it.
#[derive(Clone, Debug)]
pub struct SimBus {
    state: Arc<Mutex<SimState>>,
}

impl SimBus {
    /// A healthy bus with a powered-down quad-port chip at the usual address.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                cnt: 0,
                cmd: 0,
                slva: 0,
                dat0: 0,
                latches: 0,
                wedged: false,
                present: true,
                vanish_after_writes: None,
                regs: ChipRegs {
                    device_id: PSE_ID,
                    power_status: 0,
                    operating_mode: 0,
                    disconnect_enable: 0,
                    detect_class_enable: 0,
                },
                device_writes: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pins the host status register busy so every poll phase times out.
    pub fn wedge(&self) {
        self.lock().wedged = true;
    }

    /// Makes the chip stop acknowledging its bus address.
    pub fn vanish(&self) {
        self.lock().present = false;
    }

    /// Undoes [`vanish`](Self::vanish).
    pub fn reappear(&self) {
        let mut st = self.lock();
        st.present = true;
        st.vanish_after_writes = None;
    }

    /// Lets `count` more device writes land, then the chip stops
    /// acknowledging. For partial-failure sequences.
    pub fn vanish_after_writes(&self, count: usize) {
        let mut st = self.lock();
        let landed = st.device_writes.len();
        st.vanish_after_writes = Some(landed + count);
    }

    /// Raises status latch bits as a prior transaction would have left them.
    pub fn raise_latches(&self, bits: u8) {
        self.lock().latches |= bits;
    }

    /// Replaces the identification byte reported by the chip.
    pub fn set_device_id(&self, id: u8) {
        self.lock().regs.device_id = id;
    }

    /// Reads a chip register directly, bypassing the bus.
    pub fn chip_reg(&self, reg: Register) -> u8 {
        let st = self.lock();
        match reg {
            Register::PowerStatus => st.regs.power_status,
            Register::OperatingMode => st.regs.operating_mode,
            Register::DisconnectEnable => st.regs.disconnect_enable,
            Register::DetectClassEnable => st.regs.detect_class_enable,
            Register::DeviceId => st.regs.device_id,
            Register::PowerEnable => 0x00,
        }
    }

    /// Seeds a chip register directly, bypassing the bus and the push-button
    /// semantics of `PowerEnable`.
    pub fn set_chip_reg(&self, reg: Register, value: u8) {
        let mut st = self.lock();
        match reg {
            Register::PowerStatus => st.regs.power_status = value,
            Register::OperatingMode => st.regs.operating_mode = value,
            Register::DisconnectEnable => st.regs.disconnect_enable = value,
            Register::DetectClassEnable => st.regs.detect_class_enable = value,
            Register::DeviceId => st.regs.device_id = value,
            Register::PowerEnable => {}
        }
    }

    /// Every `(command, data)` pair that reached the chip over the bus.
    pub fn device_writes(&self) -> Vec<(u8, u8)> {
        self.lock().device_writes.clone()
    }
}

impl Default for SimBus {
    fn default() -> Self {
        Self::new()
    }
}

impl PortIo for SimBus {
    fn inb(&mut self, addr: u16) -> u8 {
        let st = self.lock();
        match addr.wrapping_sub(SMBUS_BASE) {
            SMB_HST_STS => {
                if st.wedged {
                    0x01
                } else {
                    STS_INUSE | st.latches
                }
            }
            SMB_HST_CNT => st.cnt,
            SMB_HST_CMD => st.cmd,
            SMB_XMIT_SLVA => st.slva,
            SMB_HST_DAT0 => st.dat0,
            _ => 0xFF,
        }
    }

    fn outb(&mut self, addr: u16, value: u8) {
        let mut st = self.lock();
        match addr.wrapping_sub(SMBUS_BASE) {
            SMB_HST_STS => st.latches &= !value,
            SMB_HST_CNT => {
                if value & CNT_KILL != 0 {
                    st.latches &= !(STS_BYTE_DONE | STS_FAILED);
                }
                st.cnt = value & !(CNT_START | CNT_KILL);
                if value & CNT_START != 0 {
                    st.execute();
                }
            }
            SMB_HST_CMD => st.cmd = value,
            SMB_XMIT_SLVA => st.slva = value,
            SMB_HST_DAT0 => st.dat0 = value,
            _ => {}
        }
    }
}
