//! Golden-vector runner.
//!
//! A vector file is a JSON array of cases, optionally gzip-compressed
//! (`*.json.gz`). Each case gives the instruction bytes, the state before
//! and the state after:
//!
//! ```json
//! {
//!   "name": "add al,1",
//!   "bytes": [4, 1],
//!   "initial": { "regs": { "ax": 255 }, "ram": [], "io": [] },
//!   "final": { "regs": { "ax": 0, "ip": 2, "flags": 61527 }, "ram": [] },
//!   "length": 2
//! }
//! ```
//!
//! Registers missing from `final.regs` are expected to be unchanged.
//! `length` defaults to the number of bytes; `fault` names the fault the
//! case must raise instead (`"invalid_opcode"` or `"stream_exhausted"`).

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use anyhow::{bail, Context, Result};
use flate2::read::GzDecoder;
use log::{debug, info};
use serde::Deserialize;

use crate::vm::cpu::{CpuType, Emulator};
use crate::vm::fifo::{Fifo, DEFAULT_CAPACITY};
use crate::vm::registers::{Reg, SegmentType};
use crate::vm::Fault;

const MAX_REPORTED: usize = 10;

// ── JSON deserialization types ──────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct TestCase {
    pub name: String,
    pub bytes: Vec<u8>,
    pub initial: State,
    #[serde(rename = "final")]
    pub final_state: State,
    #[serde(default)]
    pub length: Option<usize>,
    #[serde(default)]
    pub fault: Option<ExpectedFault>,
    /// Flag bits left undefined by the instruction are masked out.
    #[serde(default = "all_flags")]
    pub flags_mask: u16,
}

fn all_flags() -> u16 {
    0xFFFF
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct State {
    #[serde(default)]
    pub regs: HashMap<String, u16>,
    #[serde(default)]
    pub ram: Vec<(u16, u8)>,
    #[serde(default)]
    pub io: Vec<(u16, u8)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpectedFault {
    InvalidOpcode,
    StreamExhausted,
}

impl ExpectedFault {
    fn matches(self, fault: &Fault) -> bool {
        matches!(
            (self, fault),
            (Self::InvalidOpcode, Fault::InvalidOpcode { .. })
                | (Self::StreamExhausted, Fault::StreamExhausted { .. })
        )
    }
}

// ── Configuration and results ───────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub cpu: CpuType,
    pub filter: Option<String>,
    pub stop_on_fail: bool,
}

impl Config {
    fn selects(&self, case: &TestCase) -> bool {
        self.filter
            .as_deref()
            .map_or(true, |filter| case.name.contains(filter))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub failures: Vec<String>,
}

impl Summary {
    pub fn merge(&mut self, other: Summary) {
        self.passed += other.passed;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.failures.extend(other.failures);
    }

    pub fn total(&self) -> usize {
        self.passed + self.failed
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} passed", self.passed, self.total())?;
        if self.skipped > 0 {
            write!(f, ", {} filtered out", self.skipped)?;
        }
        Ok(())
    }
}

// ── Register names ──────────────────────────────────────────────────────

#[derive(Clone, Copy)]
enum Slot {
    General(Reg),
    Segment(SegmentType),
    Ip,
    Flags,
}

const REG_NAMES: [(&str, Slot); 14] = [
    ("ax", Slot::General(Reg::AX)),
    ("bx", Slot::General(Reg::BX)),
    ("cx", Slot::General(Reg::CX)),
    ("dx", Slot::General(Reg::DX)),
    ("sp", Slot::General(Reg::SP)),
    ("bp", Slot::General(Reg::BP)),
    ("si", Slot::General(Reg::SI)),
    ("di", Slot::General(Reg::DI)),
    ("cs", Slot::Segment(SegmentType::CS)),
    ("ds", Slot::Segment(SegmentType::DS)),
    ("es", Slot::Segment(SegmentType::ES)),
    ("ss", Slot::Segment(SegmentType::SS)),
    ("ip", Slot::Ip),
    ("flags", Slot::Flags),
];

fn slot(name: &str) -> Option<Slot> {
    REG_NAMES
        .iter()
        .find(|(known, _)| *known == name)
        .map(|&(_, slot)| slot)
}

fn read_slot(vm: &Emulator, slot: Slot) -> u16 {
    match slot {
        Slot::General(reg) => vm.registers.get(reg),
        Slot::Segment(segment) => vm.registers.segment(segment),
        Slot::Ip => vm.registers.ip(),
        Slot::Flags => vm.registers.get_flags(),
    }
}

fn write_slot(vm: &mut Emulator, slot: Slot, value: u16) {
    match slot {
        Slot::General(reg) => vm.registers.set(reg, value),
        Slot::Segment(segment) => vm.registers.set_segment(segment, value),
        Slot::Ip => vm.registers.set_ip(value),
        Slot::Flags => vm.registers.set_flags(value),
    }
}

// ── Loading ─────────────────────────────────────────────────────────────

/// Reads every case of a vector file, decompressing `.gz` files.
pub fn load_vectors(path: &Path) -> Result<Vec<TestCase>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut json = String::new();

    if path.extension().is_some_and(|ext| ext == "gz") {
        GzDecoder::new(reader)
            .read_to_string(&mut json)
            .with_context(|| format!("failed to decompress {}", path.display()))?;
    } else {
        reader
            .read_to_string(&mut json)
            .with_context(|| format!("failed to read {}", path.display()))?;
    }

    let cases: Vec<TestCase> = serde_json::from_str(&json)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    for case in &cases {
        validate(case).with_context(|| format!("{}: case '{}'", path.display(), case.name))?;
    }
    Ok(cases)
}

fn validate(case: &TestCase) -> Result<()> {
    for name in case.initial.regs.keys().chain(case.final_state.regs.keys()) {
        if slot(name).is_none() {
            bail!("unknown register '{}'", name);
        }
    }
    Ok(())
}

// ── Core test runner ────────────────────────────────────────────────────

fn setup_vm(case: &TestCase, cpu: CpuType) -> Emulator {
    let mut vm = Emulator::new(cpu);
    for (name, &value) in &case.initial.regs {
        if let Some(slot) = slot(name) {
            write_slot(&mut vm, slot, value);
        }
    }
    for &(offset, value) in &case.initial.ram {
        vm.memory.write_byte(offset, value);
    }
    for &(port, value) in &case.initial.io {
        vm.io.write_byte(port, value);
    }
    vm
}

/// Runs one case and lists every difference from the expected final state.
pub fn run_case(case: &TestCase, cpu: CpuType) -> std::result::Result<(), Vec<String>> {
    let mut vm = setup_vm(case, cpu);
    let initial = vm.clone();

    let mut stream = Fifo::new(case.bytes.len().max(DEFAULT_CAPACITY));
    if let Err(error) = stream.extend_from_slice(&case.bytes) {
        return Err(vec![format!("stream: {}", error)]);
    }

    let mut mismatches = Vec::new();
    let outcome = vm.emulate(&mut stream);

    match (outcome, case.fault) {
        (Ok(length), None) => {
            let expected = case.length.unwrap_or(case.bytes.len());
            if length != expected {
                mismatches.push(format!("length: expected={} actual={}", expected, length));
            }
        }
        (Err(fault), Some(expected)) if expected.matches(&fault) => {}
        (Err(fault), expected) => {
            mismatches.push(format!("fault: expected={:?} actual={}", expected, fault));
        }
        (Ok(length), Some(expected)) => {
            mismatches.push(format!("fault: expected={:?} actual=Ok({})", expected, length));
        }
    }

    for &(name, slot) in &REG_NAMES {
        let expected = case
            .final_state
            .regs
            .get(name)
            .copied()
            .unwrap_or_else(|| read_slot(&initial, slot));
        let actual = read_slot(&vm, slot);
        let mask = match slot {
            Slot::Flags => case.flags_mask,
            _ => 0xFFFF,
        };
        if actual & mask != expected & mask {
            mismatches.push(format!(
                "{}: expected={:#06X} actual={:#06X}",
                name, expected, actual
            ));
        }
    }

    for &(offset, expected) in &case.final_state.ram {
        let actual = vm.memory.read_byte(offset);
        if actual != expected {
            mismatches.push(format!(
                "RAM[{:#06X}]: expected={:#04X} actual={:#04X}",
                offset, expected, actual
            ));
        }
    }

    for &(port, expected) in &case.final_state.io {
        let actual = vm.io.read_byte(port);
        if actual != expected {
            mismatches.push(format!(
                "IO[{:#06X}]: expected={:#04X} actual={:#04X}",
                port, expected, actual
            ));
        }
    }

    if mismatches.is_empty() {
        Ok(())
    } else {
        Err(mismatches)
    }
}

/// Runs the selected cases of an already loaded vector set.
pub fn run_cases(label: &str, cases: &[TestCase], config: &Config) -> Summary {
    let mut summary = Summary::default();

    for (i, case) in cases.iter().enumerate() {
        if !config.selects(case) {
            summary.skipped += 1;
            continue;
        }
        match run_case(case, config.cpu) {
            Ok(()) => summary.passed += 1,
            Err(mismatches) => {
                summary.failed += 1;
                debug!("[{}] #{} '{}' failed", label, i, case.name);
                if summary.failures.len() < MAX_REPORTED {
                    summary.failures.push(format!(
                        "[{}] #{} '{}': {}",
                        label,
                        i,
                        case.name,
                        mismatches.join("; ")
                    ));
                }
                if config.stop_on_fail {
                    break;
                }
            }
        }
    }
    summary
}

/// Loads and runs one vector file.
pub fn run_file(path: &Path, config: &Config) -> Result<Summary> {
    let cases = load_vectors(path)?;
    let label = path
        .file_name()
        .map_or_else(|| path.display().to_string(), |name| name.to_string_lossy().into_owned());
    let summary = run_cases(&label, &cases, config);
    info!("{}: {}", label, summary);
    Ok(summary)
}
