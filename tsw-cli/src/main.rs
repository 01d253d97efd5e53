//! tswitch - Transport Stream Input Switch
//!
//! Forwards exactly one of several transport stream inputs to a single
//! output and switches between inputs on operator command, at end of
//! input or on input failure.

mod cli;
mod config;
mod console;
mod file_io;
mod notify;
mod remote;

use std::process::ExitCode;

use anyhow::{bail, Context};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tsw_core::{
    Coordinator, InputExecutor, InputWorker, OutputExecutor, OutputWorker, SwitchOptions,
};
use tsw_sim::SimSource;

use cli::Cli;
use config::{AppConfig, InputConfig, OutputConfig};
use file_io::{FileSink, FileSource, NullSink};
use remote::RemoteControl;

const DEFAULT_LOG_FILTER: &str = "tswitch=info,tsw_core=info,tsw_sim=info";
const VERBOSE_LOG_FILTER: &str = "tswitch=debug,tsw_core=debug,tsw_sim=debug";

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        VERBOSE_LOG_FILTER
    } else {
        DEFAULT_LOG_FILTER
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Run the switch to completion. Returns the exit status.
fn run(cli: Cli) -> anyhow::Result<bool> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    cli.apply(&mut config);
    if config.inputs.is_empty() {
        bail!("no input configured, use --input, --sim or a config file");
    }
    config
        .switch
        .validate(config.inputs.len())
        .context("invalid switch options")?;

    info!(
        "Starting tswitch: {} inputs, {} mode ({})",
        config.inputs.len(),
        config.switch.mode.name(),
        config.switch.mode.description()
    );

    let inputs = build_inputs(&config.inputs, &config.switch);
    let output = build_output(&config.output);
    let switch = Coordinator::new(config.switch.clone(), inputs, output)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("tswitch-rt")
        .enable_all()
        .build()
        .context("cannot create async runtime")?;

    // Subscribe before starting so no event is missed
    runtime.spawn(notify::report_events(
        switch.clone(),
        switch.subscribe(),
        config.event_udp,
    ));

    let remote = match config.remote {
        Some(addr) => Some(
            runtime
                .block_on(RemoteControl::bind(addr, config.remote_allow.clone()))
                .with_context(|| format!("cannot listen on {}", addr))?,
        ),
        None => None,
    };

    switch.start().context("cannot start input switch")?;

    if let Some(remote) = remote {
        runtime.spawn(remote.run(switch.clone()));
    }

    {
        let switch = switch.clone();
        runtime.spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupted");
                switch.stop(true);
            }
        });
    }

    if cli.console {
        if let Err(e) = console::spawn(switch.clone()) {
            switch.stop(false);
            switch.wait_for_termination();
            return Err(e).context("cannot start console");
        }
    }

    switch.wait_for_termination();
    runtime.shutdown_background();

    let success = switch.exit_status().unwrap_or(false);
    info!(
        "tswitch terminated ({}), {} input cycles",
        if success { "success" } else { "failure" },
        switch.cycle()
    );
    Ok(success)
}

fn build_inputs(inputs: &[InputConfig], options: &SwitchOptions) -> Vec<Box<dyn InputExecutor>> {
    inputs
        .iter()
        .map(|input| -> Box<dyn InputExecutor> {
            let name = input.name();
            match input {
                InputConfig::File { path } => Box::new(InputWorker::new(
                    name,
                    FileSource::new(path),
                    options.buffer_packets,
                    options.batch_packets,
                )),
                InputConfig::Sim(sim) => Box::new(InputWorker::new(
                    name,
                    SimSource::from_config(sim.clone()),
                    options.buffer_packets,
                    options.batch_packets,
                )),
            }
        })
        .collect()
}

fn build_output(output: &OutputConfig) -> Box<dyn OutputExecutor> {
    match output {
        OutputConfig::File { path } => Box::new(OutputWorker::new(
            path.display().to_string(),
            FileSink::new(path),
        )),
        OutputConfig::Null => Box::new(OutputWorker::new("null", NullSink)),
    }
}
