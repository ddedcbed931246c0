//! CLI configuration surface. Mirrors `prime_shield_analyzer`'s
//! `config::Config` shape (a `clap::Parser` struct converted into a plain
//! run spec before touching any library logic) — CLI argument parsing
//! itself is out of scope, so this stays a thin conversion layer.

use clap::{Parser, ValueEnum};

use crate::error::{CoreError, CoreResult};
use crate::orchestrator::{Mode, RunSpec};
use crate::topology::CoreSchedulingMode;
use crate::wheel::WheelType;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum WheelArg {
    #[value(name = "30")]
    Mod30,
    #[value(name = "210")]
    Mod210,
    #[value(name = "1155")]
    Mod1155,
}

impl From<WheelArg> for WheelType {
    fn from(arg: WheelArg) -> Self {
        match arg {
            WheelArg::Mod30 => WheelType::Mod30,
            WheelArg::Mod210 => WheelType::Mod210,
            WheelArg::Mod1155 => WheelType::Mod1155,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ModeArg {
    Count,
    Enumerate,
    Nth,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SchedulingModeArg {
    Auto,
    BigOnly,
    AllCores,
    Legacy,
}

impl From<SchedulingModeArg> for CoreSchedulingMode {
    fn from(arg: SchedulingModeArg) -> Self {
        match arg {
            SchedulingModeArg::Auto => CoreSchedulingMode::Auto,
            SchedulingModeArg::BigOnly => CoreSchedulingMode::BigOnly,
            SchedulingModeArg::AllCores => CoreSchedulingMode::AllCores,
            SchedulingModeArg::Legacy => CoreSchedulingMode::Legacy,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "calcprime", about = "Count, enumerate, or locate primes in [from, to)")]
pub struct RunOptions {
    /// Inclusive lower bound of the range.
    #[arg(long)]
    pub from: u64,

    /// Exclusive upper bound of the range.
    #[arg(long)]
    pub to: u64,

    /// Worker thread count; 0 lets the runtime choose.
    #[arg(long, default_value_t = 0)]
    pub threads: usize,

    #[arg(long, value_enum, default_value = "30")]
    pub wheel: WheelArg,

    #[arg(long, value_enum, default_value = "count")]
    pub mode: ModeArg,

    /// Governs thread count and per-worker batch sizing; see spec §6.
    #[arg(long, value_enum, default_value = "auto")]
    pub scheduling_mode: SchedulingModeArg,

    /// Required when `--mode nth`: the 1-indexed prime to locate.
    #[arg(long)]
    pub n: Option<u64>,

    /// Segment size override, in bytes.
    #[arg(long)]
    pub segment_bytes: Option<u64>,

    /// Tile size override, in bytes.
    #[arg(long)]
    pub tile_bytes: Option<u64>,
}

impl RunOptions {
    pub fn into_run_spec(self) -> CoreResult<RunSpec> {
        let mode = match self.mode {
            ModeArg::Count => Mode::Count,
            ModeArg::Enumerate => Mode::Enumerate,
            ModeArg::Nth => {
                let n = self.n.ok_or(CoreError::InvalidRange {
                    from: self.from,
                    to: self.to,
                    reason: "--mode nth requires --n",
                })?;
                Mode::Nth(n)
            }
        };

        Ok(RunSpec {
            from: self.from,
            to: self.to,
            threads: self.threads,
            wheel: self.wheel.into(),
            segment_override: self.segment_bytes,
            tile_override: self.tile_bytes,
            mode,
            scheduling_mode: self.scheduling_mode.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nth_mode_without_n_is_rejected() {
        let opts = RunOptions {
            from: 0,
            to: 100,
            threads: 0,
            wheel: WheelArg::Mod30,
            mode: ModeArg::Nth,
            scheduling_mode: SchedulingModeArg::Auto,
            n: None,
            segment_bytes: None,
            tile_bytes: None,
        };
        assert!(opts.into_run_spec().is_err());
    }

    #[test]
    fn count_mode_converts_cleanly() {
        let opts = RunOptions {
            from: 0,
            to: 1000,
            threads: 4,
            wheel: WheelArg::Mod210,
            mode: ModeArg::Count,
            scheduling_mode: SchedulingModeArg::AllCores,
            n: None,
            segment_bytes: None,
            tile_bytes: None,
        };
        let spec = opts.into_run_spec().unwrap();
        assert_eq!(spec.mode, Mode::Count);
        assert_eq!(spec.threads, 4);
        assert!(matches!(spec.scheduling_mode, CoreSchedulingMode::AllCores));
    }
}
