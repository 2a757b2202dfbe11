//! Operator runtime
//!
//! Dispatches the `seed` and `run` commands: seeding goes through the funding planner, load runs
//! go through a client factory from the registry and the transactor group, optionally with the
//! live rate display on top.
use crate::{
    cli::{Cli, Command, RunArgs, SeedArgs, Ui},
    display::{display_task, RunView},
    driver::TransactorGroup,
    error::RuntimeError,
};
use clap::Parser;
use perpx_load::{ClientRegistry, FundingPlanner, LedgerClient, SeedReport};
use perpx_load_core::RunStatistics;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn, Instrument};

/// Operator runtime for `perpx-load`.
///
/// # Example
///
/// ```no_run
/// use perpx_load_runtime::LoadRuntime;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     LoadRuntime::new().with_args().run().await?;
///     Ok(())
/// }
/// ```
pub struct LoadRuntime {
    command: Option<Command>,
    registry: Option<ClientRegistry>,
    trap_interrupts: bool,
}

impl Default for LoadRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadRuntime {
    pub fn new() -> Self {
        LoadRuntime {
            command: None,
            registry: None,
            trap_interrupts: true,
        }
    }

    /// Parse the command from the process arguments.
    pub fn with_args(self) -> Self {
        self.command(Cli::parse().command)
    }

    pub fn command(mut self, command: Command) -> Self {
        if let Command::Run(args) = &command {
            self.trap_interrupts = !args.no_trap_interrupts;
        }
        self.command = Some(command);
        self
    }

    /// Use a custom set of client factories instead of the built-in bank transfer factory.
    pub fn registry(mut self, registry: ClientRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn trap_interrupts(mut self, trap: bool) -> Self {
        self.trap_interrupts = trap;
        self
    }

    /// The UI the selected command renders with, for choosing a log filter before running.
    pub fn ui(&self) -> Ui {
        match &self.command {
            Some(Command::Run(args)) => args.ui,
            _ => Ui::Plain,
        }
    }

    /// Whether Ctrl+C is handled by the runtime. The live display always handles it, so the
    /// terminal is restored on an interrupt.
    pub fn traps_interrupts(&self) -> bool {
        self.trap_interrupts || self.ui() == Ui::Tui
    }

    pub async fn run(self) -> Result<(), RuntimeError> {
        let cancel = CancellationToken::new();
        if self.traps_interrupts() {
            spawn_interrupt_handler(cancel.clone());
        }

        match self.command {
            Some(Command::Seed(args)) => {
                let report = seed(args, cancel).await?;
                print_seed_report(&report);
            }
            Some(Command::Run(args)) => {
                let registry = self
                    .registry
                    .unwrap_or_else(|| ClientRegistry::with_defaults(cancel.clone()));
                let stats = load(args, registry, cancel).await?;
                print_run_statistics(&stats);
            }
            None => {
                return Err(RuntimeError::Config(
                    perpx_load_core::ConfigError::Invalid("no command given".to_string()),
                ))
            }
        }
        Ok(())
    }
}

fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(
        async move {
            tokio::select! {
                res = tokio::signal::ctrl_c() => match res {
                    Ok(()) => {
                        info!("Interrupted, stopping");
                        cancel.cancel();
                    }
                    Err(err) => warn!("Unable to listen for Ctrl+C: {err}"),
                },
                _ = cancel.cancelled() => {}
            }
        }
        .in_current_span(),
    );
}

#[instrument(name = "seed", skip_all, fields(workers = args.workers))]
async fn seed(args: SeedArgs, cancel: CancellationToken) -> Result<SeedReport, RuntimeError> {
    let config = args.into_config()?;
    let ledger = LedgerClient::new(&config.rest_url)?;
    let planner = FundingPlanner::new(ledger, config)?.with_cancellation(cancel);
    Ok(planner.run().await?)
}

#[instrument(name = "run", skip_all, fields(factory = %args.client_factory))]
async fn load(
    args: RunArgs,
    registry: ClientRegistry,
    cancel: CancellationToken,
) -> Result<RunStatistics, RuntimeError> {
    let config = args.load_config()?;
    let factory = registry.get(&args.client_factory)?;
    let group = TransactorGroup::new(config.clone(), factory).with_cancellation(cancel.clone());

    let display = (args.ui == Ui::Tui).then(|| {
        let view = RunView {
            started: Instant::now(),
            limit: config.duration,
            connections: config.connections,
            rate: config.rate.get(),
        };
        tokio::spawn(display_task(group.counters(), view, cancel.clone()).in_current_span())
    });

    let res = group.run().await;
    cancel.cancel();

    // The terminal is restored before any error reaches the operator.
    if let Some(display) = display {
        display.await??;
    }
    res
}

fn print_seed_report(report: &SeedReport) {
    if report.batches.is_empty() {
        println!(
            "All {} worker accounts already funded (seed {}).",
            report.checked, report.seed_address
        );
        return;
    }
    println!(
        "Funded {} of {} worker accounts in {} batches from {} ({} already funded).",
        report.funded(),
        report.checked,
        report.batches.len(),
        report.seed_address,
        report.already_funded
    );
    for batch in &report.batches {
        println!("  batch {}: {} at height {}", batch.index, batch.hash, batch.height);
    }
}

fn print_run_statistics(stats: &RunStatistics) {
    println!(
        "Sent {} transactions over {} connections in {} ({:.1} tx/s, {} errors).",
        stats.total_txs,
        stats.connections,
        humantime::format_duration(Duration::from_secs(stats.elapsed.as_secs())),
        stats.mean_tps(),
        stats.errors
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use perpx_load::RegistryError;

    fn command(args: &[&str]) -> Command {
        Cli::try_parse_from(std::iter::once("perpx-load").chain(args.iter().copied()))
            .unwrap()
            .command
    }

    #[test]
    fn run_flags_configure_runtime() {
        let runtime =
            LoadRuntime::new().command(command(&["run", "--ui", "tui", "--no-trap-interrupts"]));
        assert_eq!(runtime.ui(), Ui::Tui);
        assert!(!runtime.trap_interrupts);
        assert!(runtime.traps_interrupts());

        let runtime = LoadRuntime::new().command(command(&["run", "--no-trap-interrupts"]));
        assert!(!runtime.traps_interrupts());

        let runtime = LoadRuntime::new().command(command(&["seed"]));
        assert_eq!(runtime.ui(), Ui::Plain);
        assert!(runtime.traps_interrupts());
    }

    #[tokio::test]
    async fn unknown_client_factory() {
        let res = LoadRuntime::new()
            .command(command(&["run", "-N", "1", "--client-factory", "perpx-clob"]))
            .trap_interrupts(false)
            .run()
            .await;
        assert!(matches!(
            res,
            Err(RuntimeError::Registry(RegistryError::Unknown(name))) if name == "perpx-clob"
        ));
    }

    #[tokio::test]
    async fn missing_command() {
        let res = LoadRuntime::new().trap_interrupts(false).run().await;
        assert!(matches!(res, Err(RuntimeError::Config(_))));
    }
}
