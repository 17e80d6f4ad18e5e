//! Simulated I2C bus and sensor models for integration tests.
//!
//! Each device answers the same byte-level protocol the real part does, so
//! the drivers under test run unmodified.  Tests keep `Rc` handles to the
//! models to change readings, inject faults or inspect what was written.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use airsense::app::ports::Clock;
use airsense::sensors::co;
use airsense::sensors::sensirion::{decode_words, encode_words};
use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::{ErrorKind, ErrorType, I2c, NoAcknowledgeSource, Operation};

// ── Bus ───────────────────────────────────────────────────────

pub trait SimDevice {
    fn write(&mut self, bytes: &[u8]) -> Result<(), ErrorKind>;
    fn read(&mut self, buf: &mut [u8]) -> Result<(), ErrorKind>;
}

#[derive(Default)]
struct BusState {
    devices: BTreeMap<u8, Rc<RefCell<dyn SimDevice>>>,
    offline: BTreeSet<u8>,
}

/// Cloneable handle; every clone drives the same devices.
#[derive(Clone, Default)]
pub struct SimBus {
    state: Rc<RefCell<BusState>>,
}

#[allow(dead_code)]
impl SimBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach<T: SimDevice + 'static>(&self, addr: u8, dev: &Rc<RefCell<T>>) {
        let dev: Rc<RefCell<dyn SimDevice>> = dev.clone();
        self.state.borrow_mut().devices.insert(addr, dev);
    }

    /// Make `addr` stop acknowledging, as if the part was unplugged.
    pub fn set_offline(&self, addr: u8, offline: bool) {
        let mut s = self.state.borrow_mut();
        if offline {
            s.offline.insert(addr);
        } else {
            s.offline.remove(&addr);
        }
    }

    fn device(&self, addr: u8) -> Result<Rc<RefCell<dyn SimDevice>>, ErrorKind> {
        let s = self.state.borrow();
        if s.offline.contains(&addr) {
            return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
        }
        s.devices
            .get(&addr)
            .cloned()
            .ok_or(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address))
    }
}

impl ErrorType for SimBus {
    type Error = ErrorKind;
}

impl I2c for SimBus {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        let dev = self.device(address)?;
        let mut dev = dev.borrow_mut();
        for op in operations {
            match op {
                Operation::Write(bytes) => dev.write(bytes)?,
                Operation::Read(buf) => dev.read(buf)?,
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoDelay;

impl DelayNs for NoDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}

// ── Clock ─────────────────────────────────────────────────────

pub struct FakeClock {
    now_ms: Cell<u64>,
    epoch: Cell<Option<u32>>,
}

#[allow(dead_code)]
impl FakeClock {
    pub fn new(now_ms: u64, epoch: Option<u32>) -> Self {
        Self {
            now_ms: Cell::new(now_ms),
            epoch: Cell::new(epoch),
        }
    }

    /// Move both clocks forward.
    pub fn advance(&self, ms: u64) {
        self.now_ms.set(self.now_ms.get() + ms);
        if let Some(e) = self.epoch.get() {
            self.epoch.set(Some(e + (ms / 1000) as u32));
        }
    }

    pub fn set_epoch(&self, epoch: Option<u32>) {
        self.epoch.set(epoch);
    }
}

impl Clock for FakeClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.get()
    }

    fn epoch_secs(&self) -> Option<u32> {
        self.epoch.get()
    }
}

// ── Sensirion command helpers ─────────────────────────────────

/// Split a command write into the command word and its parameter words.
fn parse_command(bytes: &[u8]) -> Result<(u16, Vec<u16>), ErrorKind> {
    if bytes.len() < 2 {
        return Err(ErrorKind::Other);
    }
    let cmd = u16::from_be_bytes([bytes[0], bytes[1]]);
    let mut params = vec![0u16; (bytes.len() - 2) / 3];
    decode_words(&bytes[2..], &mut params).map_err(|_| ErrorKind::Other)?;
    Ok((cmd, params))
}

fn reply_words(pending: &mut Vec<u16>, buf: &mut [u8]) -> Result<(), ErrorKind> {
    if pending.is_empty() || buf.len() != pending.len() * 3 {
        return Err(ErrorKind::Other);
    }
    encode_words(pending, buf).map_err(|_| ErrorKind::Other)?;
    pending.clear();
    Ok(())
}

// ── SEN66 ─────────────────────────────────────────────────────

pub struct SimSen66 {
    pub measuring: bool,
    pub data_ready: bool,
    /// PM1, PM2.5, PM4, PM10, RH, T, VOC, NOx, CO2 as raw words.
    pub values: [u16; 9],
    pub asc: u16,
    pub voc_state: [u16; 4],
    pub frc_response: u16,
    pub temp_offset_raw: i16,
    pub ambient_pressure_hpa: Option<u16>,
    pub status: u32,
    /// Commands answered with a NACK regardless of mode.
    pub rejected: BTreeSet<u16>,
    pub commands: Vec<u16>,
    pending: Vec<u16>,
}

impl Default for SimSen66 {
    fn default() -> Self {
        Self {
            measuring: false,
            data_ready: true,
            values: [12, 35, 40, 41, 4550, 4500, 1000, 10, 612],
            asc: 1,
            voc_state: [0x0102, 0x0304, 0x0506, 0x0708],
            frc_response: 0x8000 + 25,
            temp_offset_raw: 0,
            ambient_pressure_hpa: None,
            status: 0,
            rejected: BTreeSet::new(),
            commands: Vec::new(),
            pending: Vec::new(),
        }
    }
}

#[allow(dead_code)]
impl SimSen66 {
    pub fn count(&self, cmd: u16) -> usize {
        self.commands.iter().filter(|&&c| c == cmd).count()
    }
}

impl SimDevice for SimSen66 {
    fn write(&mut self, bytes: &[u8]) -> Result<(), ErrorKind> {
        if bytes.is_empty() {
            return Ok(());
        }
        let (cmd, params) = parse_command(bytes)?;
        self.commands.push(cmd);
        if self.rejected.contains(&cmd) {
            return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data));
        }
        match (cmd, params.as_slice()) {
            (0x0021, []) => self.measuring = true,
            (0x0104, []) => self.measuring = false,
            (0x0202, []) => {
                let ready = u16::from(self.measuring && self.data_ready);
                self.pending = vec![ready];
            }
            (0x0300, []) => self.pending = self.values.to_vec(),
            (0xD206, []) => self.pending = vec![(self.status >> 16) as u16, self.status as u16],
            (0x6707, [_target]) if !self.measuring => self.pending = vec![self.frc_response],
            (0x6711, [v]) if !self.measuring => self.asc = *v,
            (0x6711, []) if !self.measuring => self.pending = vec![self.asc],
            (0x6720, [hpa]) => self.ambient_pressure_hpa = Some(*hpa),
            (0x6181, [a, b, c, d]) if !self.measuring => self.voc_state = [*a, *b, *c, *d],
            (0x6181, []) => self.pending = self.voc_state.to_vec(),
            (0x60B2, [offset, _, _, _]) => self.temp_offset_raw = *offset as i16,
            (0xD304, []) => {
                self.measuring = false;
                self.temp_offset_raw = 0;
                self.ambient_pressure_hpa = None;
            }
            // Real parts NACK commands that are illegal in the current mode.
            _ => return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data)),
        }
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<(), ErrorKind> {
        reply_words(&mut self.pending, buf)
    }
}

// ── SFA30 ─────────────────────────────────────────────────────

pub struct SimSfa30 {
    pub measuring: bool,
    /// HCHO (x5), RH (x100), T (x200).
    pub values: [u16; 3],
    pub commands: Vec<u16>,
    pending: Vec<u16>,
}

impl Default for SimSfa30 {
    fn default() -> Self {
        Self {
            measuring: false,
            values: [60, 4800, 4400],
            commands: Vec::new(),
            pending: Vec::new(),
        }
    }
}

impl SimSfa30 {
    pub fn count(&self, cmd: u16) -> usize {
        self.commands.iter().filter(|&&c| c == cmd).count()
    }
}

impl SimDevice for SimSfa30 {
    fn write(&mut self, bytes: &[u8]) -> Result<(), ErrorKind> {
        if bytes.is_empty() {
            return Ok(());
        }
        let (cmd, _) = parse_command(bytes)?;
        self.commands.push(cmd);
        match cmd {
            0x0006 => self.measuring = true,
            0x0104 | 0xD304 => self.measuring = false,
            0x0327 if self.measuring => self.pending = self.values.to_vec(),
            _ => return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data)),
        }
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<(), ErrorKind> {
        reply_words(&mut self.pending, buf)
    }
}

// ── CO module ─────────────────────────────────────────────────

pub struct SimCo {
    pub raw: u16,
    pub decimals: u8,
    pub gas_type: u8,
    pub passive: bool,
    pub reads: usize,
    pub corrupt_checksum: bool,
    pending: Option<[u8; co::FRAME_LEN]>,
}

impl Default for SimCo {
    fn default() -> Self {
        Self {
            raw: 35,
            decimals: 1,
            gas_type: co::GAS_TYPE_CO,
            passive: false,
            reads: 0,
            corrupt_checksum: false,
            pending: None,
        }
    }
}

impl SimCo {
    fn respond(&mut self, mut frame: [u8; co::FRAME_LEN]) {
        frame[0] = 0xFF;
        frame[8] = co::checksum(&frame);
        if self.corrupt_checksum {
            frame[8] = frame[8].wrapping_add(1);
        }
        self.pending = Some(frame);
    }
}

impl SimDevice for SimCo {
    fn write(&mut self, bytes: &[u8]) -> Result<(), ErrorKind> {
        if bytes.is_empty() {
            return Ok(());
        }
        if bytes.len() != co::FRAME_LEN || bytes[0] != 0xFF {
            return Err(ErrorKind::Other);
        }
        match bytes[2] {
            0x78 => {
                self.passive = bytes[3] == 0x04;
                self.respond([0, 0x78, 1, 0, 0, 0, 0, 0, 0]);
            }
            0x86 => {
                self.reads += 1;
                let [hi, lo] = self.raw.to_be_bytes();
                self.respond([0, 0x86, hi, lo, self.gas_type, self.decimals, 0, 0, 0]);
            }
            _ => return Err(ErrorKind::Other),
        }
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<(), ErrorKind> {
        let frame = self.pending.take().ok_or(ErrorKind::Other)?;
        if buf.len() != frame.len() {
            return Err(ErrorKind::Other);
        }
        buf.copy_from_slice(&frame);
        Ok(())
    }
}

// ── Register-mapped pressure sensors ──────────────────────────

/// Register file shared by the BMP280 and DPS310 models: a one-byte write
/// sets the pointer, longer writes store registers, reads auto-increment.
#[derive(Default)]
struct Registers {
    map: BTreeMap<u8, u8>,
    pointer: u8,
    writes: Vec<(u8, u8)>,
}

impl Registers {
    fn write(&mut self, bytes: &[u8]) {
        if let Some((&reg, values)) = bytes.split_first() {
            self.pointer = reg;
            for (i, &v) in values.iter().enumerate() {
                let r = reg.wrapping_add(i as u8);
                self.writes.push((r, v));
                self.map.insert(r, v);
            }
        }
    }

    fn read(&mut self, buf: &mut [u8]) {
        for (i, b) in buf.iter_mut().enumerate() {
            *b = self
                .map
                .get(&self.pointer.wrapping_add(i as u8))
                .copied()
                .unwrap_or(0);
        }
    }
}

pub struct SimBmp280 {
    regs: Registers,
}

/// Datasheet example: adc_T 519888 / adc_P 415148 → 25.08 C, 1006.53 hPa.
pub const BMP280_DATASHEET_HPA: f32 = 1006.53;

impl Default for SimBmp280 {
    fn default() -> Self {
        let mut regs = Registers::default();
        regs.map.insert(0xD0, 0x58);
        let calib: [u16; 12] = [
            27504,
            26435,
            (-1000i16) as u16,
            36477,
            (-10685i16) as u16,
            3024,
            2855,
            140,
            (-7i16) as u16,
            15500,
            (-14600i16) as u16,
            6000,
        ];
        for (i, v) in calib.iter().enumerate() {
            let [lo, hi] = v.to_le_bytes();
            regs.map.insert(0x88 + 2 * i as u8, lo);
            regs.map.insert(0x89 + 2 * i as u8, hi);
        }
        let mut s = Self { regs };
        s.set_adc(415_148, 519_888);
        s
    }
}

impl SimBmp280 {
    pub fn set_adc(&mut self, adc_p: u32, adc_t: u32) {
        for (base, v) in [(0xF7u8, adc_p), (0xFA, adc_t)] {
            self.regs.map.insert(base, (v >> 12) as u8);
            self.regs.map.insert(base + 1, (v >> 4) as u8);
            self.regs.map.insert(base + 2, ((v & 0x0F) << 4) as u8);
        }
    }

    pub fn ctrl_meas(&self) -> Option<u8> {
        self.regs.map.get(&0xF4).copied()
    }
}

impl SimDevice for SimBmp280 {
    fn write(&mut self, bytes: &[u8]) -> Result<(), ErrorKind> {
        self.regs.write(bytes);
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<(), ErrorKind> {
        self.regs.read(buf);
        Ok(())
    }
}

/// DPS310 with c0 = 50 (25 C), c00 = 100 000 Pa and c10 = 100 000, so the
/// raw pressure result maps linearly onto pascals.
pub struct SimDps310 {
    regs: Registers,
    /// PRS_RDY | TMP_RDY while a finished conversion is waiting.
    results_ready: bool,
}

const DPS310_C00: i32 = 100_000;
const DPS310_C10: i32 = 100_000;
const DPS310_KP: f32 = 7_864_320.0;

impl Default for SimDps310 {
    fn default() -> Self {
        let mut regs = Registers::default();
        regs.map.insert(0x0D, 0x10);
        regs.map.insert(0x08, 0xF0);
        regs.map.insert(0x28, 0x80);

        let c0: u32 = 50;
        let c00 = DPS310_C00 as u32 & 0xF_FFFF;
        let c10 = DPS310_C10 as u32 & 0xF_FFFF;
        let coef = [
            (c0 >> 4) as u8,
            ((c0 & 0x0F) << 4) as u8,
            0,
            (c00 >> 12) as u8,
            (c00 >> 4) as u8,
            (((c00 & 0x0F) << 4) | (c10 >> 16)) as u8,
            (c10 >> 8) as u8,
            c10 as u8,
        ];
        for (i, b) in coef.iter().enumerate() {
            regs.map.insert(0x10 + i as u8, *b);
        }
        let mut s = Self {
            regs,
            results_ready: true,
        };
        s.set_pressure_hpa(1000.0);
        s
    }
}

#[allow(dead_code)]
impl SimDps310 {
    pub fn set_pressure_hpa(&mut self, hpa: f32) {
        let raw = ((hpa * 100.0 - DPS310_C00 as f32) / DPS310_C10 as f32 * DPS310_KP).round() as i32;
        let raw = raw as u32 & 0xFF_FFFF;
        self.regs.map.insert(0x00, (raw >> 16) as u8);
        self.regs.map.insert(0x01, (raw >> 8) as u8);
        self.regs.map.insert(0x02, raw as u8);
    }

    /// With `false` the ready flags stay clear and the result registers
    /// read as zero, as right after power-up.
    pub fn set_results_ready(&mut self, ready: bool) {
        self.results_ready = ready;
        if !ready {
            for reg in 0x00..=0x05 {
                self.regs.map.remove(&reg);
            }
        }
        self.refresh_status();
    }

    fn refresh_status(&mut self) {
        let ready = if self.results_ready { 0x30 } else { 0x00 };
        let mode = self.regs.map.get(&0x08).copied().unwrap_or(0) & 0x0F;
        self.regs.map.insert(0x08, 0xC0 | ready | mode);
    }

    pub fn mode(&self) -> Option<u8> {
        self.regs
            .writes
            .iter()
            .rev()
            .find(|(r, _)| *r == 0x08)
            .map(|(_, v)| *v)
    }
}

impl SimDevice for SimDps310 {
    fn write(&mut self, bytes: &[u8]) -> Result<(), ErrorKind> {
        self.regs.write(bytes);
        // MEAS_CFG keeps its ready flags whatever mode is written.
        self.refresh_status();
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<(), ErrorKind> {
        self.regs.read(buf);
        Ok(())
    }
}

// ── Rig ───────────────────────────────────────────────────────

/// Every sensor on one bus, with handles for the test.
pub struct Rig {
    pub bus: SimBus,
    pub sen66: Rc<RefCell<SimSen66>>,
    pub sfa30: Rc<RefCell<SimSfa30>>,
    pub co: Rc<RefCell<SimCo>>,
    pub bmp280: Rc<RefCell<SimBmp280>>,
    pub dps310: Rc<RefCell<SimDps310>>,
}

#[allow(dead_code)]
impl Rig {
    /// All devices created; only the ones in `attach` are on the bus.
    pub fn new() -> Self {
        Self {
            bus: SimBus::new(),
            sen66: Rc::default(),
            sfa30: Rc::default(),
            co: Rc::default(),
            bmp280: Rc::default(),
            dps310: Rc::default(),
        }
    }

    /// SEN66, SFA30, CO module and BMP280; no DPS310.
    pub fn standard() -> Self {
        let rig = Self::new();
        rig.bus.attach(0x6B, &rig.sen66);
        rig.bus.attach(0x5D, &rig.sfa30);
        rig.bus.attach(0x74, &rig.co);
        rig.bus.attach(0x76, &rig.bmp280);
        rig
    }
}
