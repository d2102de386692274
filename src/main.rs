use clap::Parser;
use miette::{IntoDiagnostic, Result};
use mpesa_reconciler::bootstrap::{self, Storage};
use mpesa_reconciler::config::{Cli, Command, ExportLedgerArgs, ServeArgs};
use mpesa_reconciler::infrastructure::in_memory::StaticIdentity;
use mpesa_reconciler::infrastructure::mpesa::MpesaClient;
use mpesa_reconciler::infrastructure::notifier::TracingNotifier;
use mpesa_reconciler::interfaces::csv::ledger_writer::LedgerWriter;
use mpesa_reconciler::interfaces::http::http_serve;
use mpesa_reconciler::telemetry;
use std::fs::File;
use std::io;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init().into_diagnostic()?;

    match Cli::parse().command {
        Command::Serve(args) => serve(args).await,
        Command::ExportLedger(args) => export_ledger(args).await,
    }
}

async fn serve(args: ServeArgs) -> Result<()> {
    let storage = Storage::open(args.db_path.as_deref()).into_diagnostic()?;
    if let Some(path) = &args.appointments {
        let file = File::open(path).into_diagnostic()?;
        bootstrap::seed_appointments(&storage.appointments, file)
            .await
            .into_diagnostic()?;
    }

    let identity = Arc::new(StaticIdentity::new(args.admins()));
    let gateway = Arc::new(MpesaClient::new(args.mpesa.into()).into_diagnostic()?);
    let state = bootstrap::build_state(&storage, gateway, identity, Arc::new(TracingNotifier));

    let sweep = args
        .stale_after_minutes
        .map(|minutes| bootstrap::spawn_expiry_sweep(Arc::clone(&state.payments), minutes));

    let served = http_serve::start(state, &args.server).await;
    if let Some(sweep) = sweep {
        sweep.abort();
    }
    served.into_diagnostic()
}

async fn export_ledger(args: ExportLedgerArgs) -> Result<()> {
    let storage = Storage::open(args.db_path.as_deref()).into_diagnostic()?;
    let entries = storage.ledger.all_entries().await.into_diagnostic()?;

    let stdout = io::stdout();
    let mut writer = LedgerWriter::new(stdout.lock());
    writer.write_entries(entries).into_diagnostic()?;
    Ok(())
}
