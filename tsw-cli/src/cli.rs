//! Command line definitions

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tsw_core::{InitialInput, SwitchMode};

use crate::config::{AppConfig, InputConfig, OutputConfig};

/// tswitch - live transport stream input switch
#[derive(Debug, Parser)]
#[command(
    name = "tswitch",
    version,
    about = "Forward one of several transport stream inputs to a single output",
    after_help = "Remote commands (UDP, one per datagram): next, prev, <index>, exit"
)]
pub struct Cli {
    /// Path to a JSON config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Input transport stream file, repeat for several inputs
    #[arg(short, long = "input", value_name = "FILE")]
    pub inputs: Vec<PathBuf>,

    /// Add simulated inputs
    #[arg(long, value_name = "COUNT")]
    pub sim: Option<usize>,

    /// Output transport stream file
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Switching mode: standard, fast, delayed or sequential
    #[arg(short, long)]
    pub mode: Option<SwitchMode>,

    /// Index of the first input to use
    #[arg(long, value_name = "INDEX", conflicts_with = "first_success")]
    pub first_input: Option<usize>,

    /// Start with the first input that starts successfully
    #[arg(long)]
    pub first_success: bool,

    /// Terminate when the current input ends
    #[arg(short, long)]
    pub terminate: bool,

    /// Terminate after this many input cycles
    #[arg(long, value_name = "COUNT")]
    pub cycles: Option<u64>,

    /// Listen for remote commands on this UDP address
    #[arg(short, long, value_name = "ADDR")]
    pub remote: Option<SocketAddr>,

    /// Send switch events as JSON datagrams to this UDP address
    #[arg(long, value_name = "ADDR")]
    pub event_udp: Option<SocketAddr>,

    /// Read commands from standard input
    #[arg(long)]
    pub console: bool,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Apply command line overrides on top of a loaded config
    pub fn apply(&self, config: &mut AppConfig) {
        let options = &mut config.switch;
        if let Some(mode) = self.mode {
            options.mode = mode;
        }
        if let Some(index) = self.first_input {
            options.initial = InitialInput::Index(index);
        }
        if self.first_success {
            options.initial = InitialInput::FirstSuccess;
        }
        if self.terminate {
            options.terminate_on_end = true;
        }
        if self.cycles.is_some() {
            options.cycle_limit = self.cycles;
        }

        config.inputs.extend(
            self.inputs
                .iter()
                .map(|path| InputConfig::File { path: path.clone() }),
        );
        if let Some(count) = self.sim {
            let first = config.inputs.len();
            config
                .inputs
                .extend((first..first + count).map(InputConfig::sim));
        }
        if let Some(path) = &self.output {
            config.output = OutputConfig::File { path: path.clone() };
        }
        if self.remote.is_some() {
            config.remote = self.remote;
        }
        if self.event_udp.is_some() {
            config.event_udp = self.event_udp;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("tswitch").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_overrides() {
        let cli = parse(&[
            "-i", "a.ts", "-i", "b.ts", "--mode", "fast", "--first-input", "1", "--cycles", "3",
            "-o", "out.ts",
        ]);
        let mut config = AppConfig::default();
        cli.apply(&mut config);

        assert_eq!(config.inputs.len(), 2);
        assert_eq!(config.switch.mode, SwitchMode::Fast);
        assert_eq!(config.switch.initial, InitialInput::Index(1));
        assert_eq!(config.switch.cycle_limit, Some(3));
        assert_eq!(
            config.output,
            OutputConfig::File {
                path: PathBuf::from("out.ts")
            }
        );
    }

    #[test]
    fn test_sim_inputs_get_distinct_pids() {
        let cli = parse(&["-i", "a.ts", "--sim", "2"]);
        let mut config = AppConfig::default();
        cli.apply(&mut config);

        let pids: Vec<u16> = config
            .inputs
            .iter()
            .filter_map(|input| match input {
                InputConfig::Sim(sim) => Some(sim.pid),
                _ => None,
            })
            .collect();
        assert_eq!(pids, vec![0x200, 0x300]);
    }

    #[test]
    fn test_first_input_conflicts_with_first_success() {
        let result = Cli::try_parse_from(["tswitch", "--first-input", "1", "--first-success"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_mode_rejected() {
        assert!(Cli::try_parse_from(["tswitch", "--mode", "instant"]).is_err());
    }
}
