mod bootstrap;

use std::path::Path;

use anyhow::{Context, Result};
use income_core::models::MonthKey;
use income_core::parsing::split_list;
use income_core::settings::{Command, Settings, ValidateCommand};
use income_data::analysis::{
    build_band_report, build_dashboard_payload, to_json, write_json, BandReportRequest,
    DashboardRequest,
};
use income_data::bcb::ipca_from_bcb;
use income_data::deflate::{apply_deflator, emit_factors, DeflateOptions};
use income_data::reader::read_ipca_csv;
use income_data::validate::{vd4020_components, vd4020_vs_principal};
use serde::Serialize;

/// Exit status of any fatal error.
const EXIT_FAILURE: i32 = 2;

fn main() {
    if let Err(e) = run() {
        eprintln!("ERROR: {e:#}");
        std::process::exit(EXIT_FAILURE);
    }
}

fn run() -> Result<()> {
    let settings = Settings::load_with_last_used();

    bootstrap::ensure_directories()?;
    bootstrap::setup_logging(&settings.log_level, settings.log_file.as_ref())?;

    tracing::info!("pnad-income v{} starting", env!("CARGO_PKG_VERSION"));
    if let Some(source) = settings.source() {
        tracing::info!(
            "Input: {}, IPCA: {}, minimum wage: {}",
            source.input.display(),
            source.ipca_csv.display(),
            source.salario_minimo_csv.display()
        );
    }

    match &settings.command {
        Command::Dashboard(args) => {
            let request = DashboardRequest::from_args(args)?;
            let payload = build_dashboard_payload(&request)
                .with_context(|| format!("building dashboard from {}", args.source.input.display()))?;
            emit(&payload, args.source.compact, args.source.out.as_deref())?;
        }

        Command::BandReport(args) => {
            let request = BandReportRequest::from_args(args)?;
            let report = build_band_report(&request)
                .with_context(|| format!("building band report from {}", args.source.input.display()))?;
            emit(&report, args.source.compact, args.source.out.as_deref())?;
        }

        Command::EmitFactors(args) => {
            let target = MonthKey::parse(&args.target)?;
            let factors = read_ipca_csv(&args.ipca_csv)?.deflators_to(target)?;
            emit_factors(&factors, &args.out)?;
        }

        Command::ApplyDeflator(args) => {
            let target = MonthKey::parse(&args.target)?;
            let factors = read_ipca_csv(&args.ipca_csv)?.deflators_to(target)?;
            let options = DeflateOptions {
                columns: args.columns.as_deref().map(split_list).unwrap_or_default(),
                date_col: args.date_col.clone(),
                year_col: args.year_col.clone(),
                quarter_col: args.quarter_col.clone(),
                min_wage: args.min_wage,
                label: args.label.clone(),
            };
            let summary = apply_deflator(&args.input, &args.out, &factors, &options)
                .with_context(|| format!("deflating {}", args.input.display()))?;
            tracing::info!(
                "Deflated {} rows ({}) to {}",
                summary.rows,
                summary.columns.join(", "),
                target
            );
        }

        Command::IpcaFromBcb(args) => {
            ipca_from_bcb(&args.input, &args.out)
                .with_context(|| format!("converting {}", args.input.display()))?;
        }

        Command::Validate(ValidateCommand::Components(args)) => {
            let report = vd4020_components(
                &args.input,
                &args.target,
                &split_list(&args.components),
                args.tol,
                args.limit,
            )?;
            emit(&report, false, None)?;
        }

        Command::Validate(ValidateCommand::VsPrincipal(args)) => {
            let report = vd4020_vs_principal(
                &args.input,
                &args.target,
                &args.principal,
                args.secondary_money.as_deref(),
                args.tol,
                args.limit,
            )?;
            emit(&report, false, None)?;
        }
    }

    Ok(())
}

/// Print `value` as JSON to stdout, or write it to `out`.
fn emit<T: Serialize>(value: &T, compact: bool, out: Option<&Path>) -> Result<()> {
    let json = to_json(value, compact)?;
    match out {
        Some(path) => {
            write_json(path, &json)?;
            tracing::info!("Wrote {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}
