//! Workload exit traces.
//!
//! Each catalog resource is modeled as a sequence of execution segments. A
//! segment retires a number of instructions and then raises one exit.

use crate::config::catalog::CpuType;

/// The exit raised at the end of a segment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TraceExit {
    /// A classic exit with its raw cause string.
    Classic(&'static str),
    /// A hypercall with the given code and an empty payload.
    Hypercall(u32),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Segment {
    pub instructions: u64,
    pub exit: TraceExit,
}

const fn classic(instructions: u64, cause: &'static str) -> Segment {
    Segment {
        instructions,
        exit: TraceExit::Classic(cause),
    }
}

const fn hypercall(instructions: u64, code: u32) -> Segment {
    Segment {
        instructions,
        exit: TraceExit::Hypercall(code),
    }
}

const LAST_THREAD: &str = "exiting with last active thread context";
const M5_EXIT: &str = "m5_exit instruction encountered";

const HELLO: &[Segment] = &[classic(150_000, LAST_THREAD)];

const M5_EXIT_ONLY: &[Segment] = &[classic(2_000_000, M5_EXIT)];

const MATRIX_MULTIPLY: &[Segment] = &[
    classic(40_000_000, "m5_workbegin instruction encountered"),
    classic(2_400_000_000, "m5_workend instruction encountered"),
    classic(5_000_000, LAST_THREAD),
];

const NPB_CG: &[Segment] = &[
    hypercall(900_000_000, 1),
    hypercall(300_000_000, 2),
    hypercall(50_000_000, 4),
    hypercall(12_000_000_000, 5),
    hypercall(20_000_000, 3),
];

/// Returns the exit trace of a workload resource.
///
/// Unknown resources run as a short program that exits with its last thread.
pub fn trace_for(resource: &str) -> &'static [Segment] {
    match resource {
        "x86-hello64-static" | "arm-hello64-static" | "riscv-hello" => HELLO,
        "x86-m5-exit" | "arm-m5-exit" | "riscv-m5-exit" => M5_EXIT_ONLY,
        "x86-matrix-multiply" => MATRIX_MULTIPLY,
        "x86-npb-cg-size-s" => NPB_CG,
        _ => HELLO,
    }
}

/// Average cycles per instruction of a CPU model, in thousandths.
pub fn cpi_milli(cpu: CpuType) -> u64 {
    match cpu {
        CpuType::Atomic => 1000,
        CpuType::Kvm => 400,
        CpuType::Minor => 1300,
        CpuType::O3 => 700,
        CpuType::Timing => 1600,
    }
}

/// The CPU model a switchable processor alternates with.
pub fn switch_partner(cpu: CpuType) -> CpuType {
    match cpu {
        CpuType::Atomic => CpuType::Timing,
        _ => CpuType::Atomic,
    }
}
