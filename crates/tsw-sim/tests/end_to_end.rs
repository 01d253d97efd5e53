//! End-to-end tests with threaded workers
//!
//! These tests run the real input and output workers on simulated
//! sources and a capturing sink, covering:
//! - Switching between live inputs under load
//! - Failover on runtime and start failures
//! - End of stream, cycling and termination

use std::sync::Arc;
use std::time::Duration;

use tsw_core::{
    Coordinator, InitialInput, InputExecutor, InputWorker, OutputWorker, SwitchMode,
    SwitchOptions, TsPacket,
};
use tsw_sim::{packet_sequence, CaptureHandle, CaptureSink, SimSource, SimSourceConfig};

const TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// Helper Functions
// ============================================================================

mod helpers {
    use super::*;

    /// Endless source on `pid`
    pub fn endless(pid: u16) -> SimSourceConfig {
        SimSourceConfig {
            name: format!("sim 0x{:X}", pid),
            pid,
            batch_interval_us: 500,
            ..Default::default()
        }
    }

    /// Source producing `packets` packets per session
    pub fn finite(pid: u16, packets: u64) -> SimSourceConfig {
        SimSourceConfig {
            packets: Some(packets),
            ..endless(pid)
        }
    }

    pub fn build(
        options: SwitchOptions,
        sources: Vec<SimSourceConfig>,
        sink: CaptureSink,
    ) -> Arc<Coordinator> {
        let inputs: Vec<Box<dyn InputExecutor>> = sources
            .into_iter()
            .map(|config| {
                let name = config.name.clone();
                Box::new(InputWorker::new(
                    name,
                    SimSource::from_config(config),
                    options.buffer_packets,
                    options.batch_packets,
                )) as Box<dyn InputExecutor>
            })
            .collect();
        let output = Box::new(OutputWorker::new("capture", sink));
        Coordinator::new(options, inputs, output).expect("valid options")
    }

    /// Build and start a switch with a capturing sink
    pub fn run(
        options: SwitchOptions,
        sources: Vec<SimSourceConfig>,
    ) -> (Arc<Coordinator>, CaptureHandle) {
        let (sink, capture) = CaptureSink::new();
        let switch = build(options, sources, sink);
        switch.start().expect("start");
        (switch, capture)
    }

    pub fn count_pid(packets: &[TsPacket], pid: u16) -> usize {
        packets.iter().filter(|p| p.pid() == pid).count()
    }

    /// Within each run of one PID, sequence numbers increase by one
    pub fn assert_contiguous_runs(packets: &[TsPacket]) {
        for pair in packets.windows(2) {
            if pair[0].pid() != pair[1].pid() {
                continue;
            }
            let (s0, n0) = packet_sequence(&pair[0]);
            let (s1, n1) = packet_sequence(&pair[1]);
            assert_eq!(s0, s1, "session changed inside a run");
            assert_eq!(n0 + 1, n1, "gap or duplicate on PID 0x{:X}", pair[0].pid());
        }
    }

    pub fn shutdown(switch: &Coordinator) {
        switch.stop(true);
        switch.wait_for_termination();
    }
}

use helpers::*;

// ============================================================================
// Switching Tests
// ============================================================================

mod switching_tests {
    use super::*;

    #[test]
    fn test_switch_under_load() {
        let (switch, capture) = run(
            SwitchOptions::default(),
            vec![endless(0x100), endless(0x200), endless(0x300)],
        );

        assert!(capture.wait_for(200, TIMEOUT));
        switch.set_input(1).unwrap();
        assert!(capture.wait_until(TIMEOUT, |p| count_pid(p, 0x200) >= 200));
        switch.next_input();
        assert!(capture.wait_until(TIMEOUT, |p| count_pid(p, 0x300) >= 200));

        shutdown(&switch);
        assert_eq!(switch.exit_status(), Some(true));
        assert!(capture.is_closed());

        let packets = capture.packets();
        assert_eq!(capture.pid_runs(), vec![0x100, 0x200, 0x300]);
        assert_contiguous_runs(&packets);

        // A new input is forwarded from its first packet
        let first_b = packets.iter().find(|p| p.pid() == 0x200).unwrap();
        assert_eq!(packet_sequence(first_b), (1, 0));
    }

    #[test]
    fn test_fast_mode_switches_between_running_inputs() {
        let options = SwitchOptions {
            mode: SwitchMode::Fast,
            ..Default::default()
        };
        let (switch, capture) = run(options, vec![endless(0x100), endless(0x200)]);

        assert!(capture.wait_for(100, TIMEOUT));
        switch.set_input(1).unwrap();
        assert!(capture.wait_until(TIMEOUT, |p| count_pid(p, 0x200) >= 100));
        switch.set_input(0).unwrap();
        assert!(capture.wait_until(TIMEOUT, |p| {
            p.last().is_some_and(|last| last.pid() == 0x100) && count_pid(p, 0x200) >= 100
        }));

        // Every input kept running
        assert!(switch.input_states().iter().all(|s| s.state.is_active()));
        shutdown(&switch);
        assert_eq!(capture.pid_runs(), vec![0x100, 0x200, 0x100]);
    }

    #[test]
    fn test_sequential_mode() {
        let options = SwitchOptions {
            mode: SwitchMode::Sequential,
            ..Default::default()
        };
        let (switch, capture) = run(options, vec![endless(0x100), endless(0x200)]);

        assert!(capture.wait_for(100, TIMEOUT));
        switch.next_input();
        assert!(capture.wait_until(TIMEOUT, |p| count_pid(p, 0x200) >= 100));
        shutdown(&switch);

        assert_eq!(capture.pid_runs(), vec![0x100, 0x200]);
        assert_eq!(switch.cycle(), 0);
    }
}

// ============================================================================
// Failure Tests
// ============================================================================

mod failure_tests {
    use super::*;

    #[test]
    fn test_single_input_failure_terminates() {
        let source = SimSourceConfig {
            fail_after: Some(300),
            ..endless(0x100)
        };
        let (switch, capture) = run(SwitchOptions::default(), vec![source]);

        switch.wait_for_termination();
        assert_eq!(switch.exit_status(), Some(false));
        assert!(capture.is_closed());
        assert!(capture.len() <= 300);
    }

    #[test]
    fn test_runtime_failure_fails_over() {
        let source = SimSourceConfig {
            fail_after: Some(300),
            ..endless(0x100)
        };
        let (switch, capture) = run(SwitchOptions::default(), vec![source, endless(0x200)]);

        assert!(capture.wait_until(TIMEOUT, |p| count_pid(p, 0x200) >= 100));
        assert!(!switch.is_terminating());
        assert_eq!(switch.current_input(), 1);
        shutdown(&switch);
        assert_eq!(capture.pid_runs(), vec![0x100, 0x200]);
    }

    #[test]
    fn test_first_success_skips_broken_input() {
        let broken = SimSourceConfig {
            fail_open: true,
            ..endless(0x100)
        };
        let options = SwitchOptions {
            initial: InitialInput::FirstSuccess,
            ..Default::default()
        };
        let (switch, capture) = run(options, vec![broken, endless(0x200)]);

        assert!(capture.wait_for(100, TIMEOUT));
        shutdown(&switch);
        assert_eq!(capture.pid_runs(), vec![0x200]);
    }

    #[test]
    fn test_switch_to_broken_input_keeps_current() {
        let broken = SimSourceConfig {
            fail_open: true,
            ..endless(0x200)
        };
        let (switch, capture) = run(SwitchOptions::default(), vec![endless(0x100), broken]);

        assert!(capture.wait_for(100, TIMEOUT));
        switch.set_input(1).unwrap();
        let before = capture.len();
        assert!(capture.wait_for(before + 100, TIMEOUT));

        assert_eq!(switch.current_input(), 0);
        assert!(!switch.is_terminating());
        shutdown(&switch);
        assert_eq!(capture.pid_runs(), vec![0x100]);
    }

    #[test]
    fn test_output_failure_terminates() {
        let (sink, capture) = CaptureSink::new();
        let switch = build(
            SwitchOptions::default(),
            vec![endless(0x100)],
            sink.fail_after(100),
        );
        switch.start().unwrap();

        switch.wait_for_termination();
        assert_eq!(switch.exit_status(), Some(false));
        assert!(capture.len() <= 100);
    }

    #[test]
    fn test_output_open_failure_fails_start() {
        let (sink, _capture) = CaptureSink::new();
        let switch = build(
            SwitchOptions::default(),
            vec![endless(0x100)],
            sink.fail_open(),
        );

        assert!(switch.start().is_err());
        switch.wait_for_termination();
        assert_eq!(switch.exit_status(), Some(false));
    }
}

// ============================================================================
// End Of Stream Tests
// ============================================================================

mod end_of_stream_tests {
    use super::*;

    #[test]
    fn test_terminate_on_end() {
        let options = SwitchOptions {
            terminate_on_end: true,
            ..Default::default()
        };
        let (switch, capture) = run(options, vec![finite(0x100, 1_000), endless(0x200)]);

        switch.wait_for_termination();
        assert_eq!(switch.exit_status(), Some(true));

        let packets = capture.packets();
        assert!(packets.len() <= 1_000);
        assert!(packets.iter().all(|p| p.pid() == 0x100));
        assert_contiguous_runs(&packets);
    }

    #[test]
    fn test_cycle_limit() {
        let options = SwitchOptions {
            cycle_limit: Some(2),
            ..Default::default()
        };
        let a = SimSource::from_config(finite(0x100, 200));
        let b = SimSource::from_config(finite(0x200, 200));
        let (stats_a, stats_b) = (a.stats(), b.stats());

        let (sink, capture) = CaptureSink::new();
        let inputs: Vec<Box<dyn InputExecutor>> = vec![
            Box::new(InputWorker::new("a", a, 512, 64)),
            Box::new(InputWorker::new("b", b, 512, 64)),
        ];
        let switch =
            Coordinator::new(options, inputs, Box::new(OutputWorker::new("capture", sink)))
                .unwrap();
        switch.start().unwrap();

        switch.wait_for_termination();
        assert_eq!(switch.exit_status(), Some(true));
        assert_eq!(switch.cycle(), 2);
        assert_eq!(stats_a.opens(), 2);
        assert_eq!(stats_b.opens(), 2);
        assert_eq!(stats_a.opens(), stats_a.closes());

        let runs = capture.pid_runs();
        assert!(runs.iter().all(|pid| *pid == 0x100 || *pid == 0x200));
    }

    #[test]
    fn test_single_input_restarts_at_end() {
        let a = SimSource::from_config(finite(0x100, 100));
        let stats = a.stats();
        let (sink, capture) = CaptureSink::new();
        let switch = Coordinator::new(
            SwitchOptions::default(),
            vec![Box::new(InputWorker::new("a", a, 512, 64))],
            Box::new(OutputWorker::new("capture", sink)),
        )
        .unwrap();
        switch.start().unwrap();

        assert!(capture.wait_until(TIMEOUT, |p| {
            p.iter().any(|packet| packet_sequence(packet).0 >= 3)
        }));
        assert!(stats.opens() >= 3);
        assert!(switch.cycle() >= 2);
        shutdown(&switch);
        assert_eq!(capture.pid_runs(), vec![0x100]);
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

mod proptest_tests {
    use proptest::prelude::*;
    use tsw_core::PacketSource;

    use super::*;

    proptest! {
        #[test]
        fn sim_source_batches_cover_session(total in 1u64..2_000, max in 1usize..300) {
            let mut source = SimSource::from_config(SimSourceConfig {
                packets: Some(total),
                batch_interval_us: 0,
                ..Default::default()
            });
            source.open().unwrap();

            let mut expected = 0u64;
            while let Some(batch) = source.read_batch(max).unwrap() {
                prop_assert!(!batch.is_empty());
                prop_assert!(batch.len() <= max);
                for packet in &batch {
                    prop_assert_eq!(packet_sequence(packet), (1, expected));
                    expected += 1;
                }
            }
            prop_assert_eq!(expected, total);
        }
    }
}
