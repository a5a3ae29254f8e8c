use clap::{Args, CommandFactory, FromArgMatches, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::bands::DEFAULT_BAND_SPEC;

// ── Settings (CLI) ─────────────────────────────────────────────────────────────

/// Household income distribution by minimum-wage bands from PNAD Continua
#[derive(Parser, Debug, Clone)]
#[command(
    name = "pnad-income",
    about = "Household income distribution by minimum-wage bands from PNAD Continua microdata",
    version
)]
pub struct Settings {
    #[command(subcommand)]
    pub command: Command,

    /// Logging level
    #[arg(long, global = true, default_value = "INFO", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"])]
    pub log_level: String,

    /// Log file path (logs go to stderr when omitted)
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Clear saved configuration
    #[arg(long, global = true)]
    pub clear: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// National, state and macro-region statistics with distributions and cross-tabs
    Dashboard(DashboardArgs),

    /// Household income distribution by minimum-wage bands (Brazil or UF)
    #[command(name = "renda-por-faixa-sm")]
    BandReport(BandReportArgs),

    /// Emit monthly deflation factors to a target month
    EmitFactors(EmitFactorsArgs),

    /// Append deflated and minimum-wage-multiple columns to an income CSV
    ApplyDeflator(ApplyDeflatorArgs),

    /// Convert a BCB monthly series (JSON) into a date,index CSV
    IpcaFromBcb(BcbArgs),

    /// Income consistency checks over a labeled CSV
    #[command(subcommand)]
    Validate(ValidateCommand),
}

/// Inputs and options shared by the aggregation commands.
#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    /// Input labeled CSV with dom_id
    #[arg(long, default_value = "data/outputs/base_labeled.csv")]
    pub input: PathBuf,

    /// IPCA CSV file path
    #[arg(long, env = "PNAD_IPCA_CSV", default_value = "data/outputs/ipca.csv")]
    pub ipca_csv: PathBuf,

    /// Monthly nominal minimum wage CSV (date,value)
    #[arg(
        long,
        env = "PNAD_SALARIO_MINIMO_CSV",
        default_value = "data/originals/salario_minimo.csv"
    )]
    pub salario_minimo_csv: PathBuf,

    /// Target month YYYY-MM (default: latest in IPCA series)
    #[arg(long, default_value = "")]
    pub target: String,

    /// Band specification, e.g. "0-2;2-5;5-10;10+"
    #[arg(long, default_value = DEFAULT_BAND_SPEC)]
    pub ranges: String,

    /// State ordering
    #[arg(long, default_value = "renda_desc", value_parser = ["renda_desc", "renda_asc", "alfabetica", "codigo"])]
    pub uf_order: String,

    /// Optional UF filter (code or label), comma-separated
    #[arg(long, default_value = "")]
    pub state: String,

    /// Income column name. Default auto: VD4020 then VD4019
    #[arg(long)]
    pub income_col: Option<String>,

    /// Weight column name. Default auto: V1028 then V1027
    #[arg(long)]
    pub weight_col: Option<String>,

    /// Diagnostic mode without sample weights (not for official estimates)
    #[arg(long)]
    pub unweighted: bool,

    /// Write the JSON payload to a file instead of stdout
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Emit compact JSON
    #[arg(long)]
    pub compact: bool,
}

#[derive(Args, Debug, Clone)]
pub struct DashboardArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Minimum-wage comparison mode
    #[arg(long, default_value = "alvo", value_parser = ["both", "periodo", "alvo"])]
    pub sm_mode: String,
}

#[derive(Args, Debug, Clone)]
pub struct BandReportArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Aggregate for the whole country or per state
    #[arg(long, default_value = "pais", value_parser = ["pais", "uf"])]
    pub group_by: String,
}

#[derive(Args, Debug, Clone)]
pub struct EmitFactorsArgs {
    /// CSV with monthly IPCA index levels
    #[arg(long, env = "PNAD_IPCA_CSV")]
    pub ipca_csv: PathBuf,

    /// Target month YYYY-MM
    #[arg(long, default_value = "2025-07")]
    pub target: String,

    /// Output CSV path for deflators
    #[arg(long)]
    pub out: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct ApplyDeflatorArgs {
    /// Input CSV path
    #[arg(long = "in")]
    pub input: PathBuf,

    /// Output CSV path
    #[arg(long)]
    pub out: PathBuf,

    /// CSV with monthly IPCA index levels
    #[arg(long, env = "PNAD_IPCA_CSV")]
    pub ipca_csv: PathBuf,

    /// Target month YYYY-MM
    #[arg(long, default_value = "2025-07")]
    pub target: String,

    /// Current minimum wage in BRL
    #[arg(long, default_value = "1518.0")]
    pub min_wage: f64,

    /// Comma-separated columns to deflate; default auto-detect VD4019/VD4020
    #[arg(long)]
    pub columns: Option<String>,

    /// Column with YYYY-MM; else derive from Ano/Trimestre
    #[arg(long)]
    pub date_col: Option<String>,

    /// Year column name (auto-detect if omitted)
    #[arg(long)]
    pub year_col: Option<String>,

    /// Quarter column name (auto-detect if omitted)
    #[arg(long)]
    pub quarter_col: Option<String>,

    /// Suffix of the deflated columns (default: target without '-')
    #[arg(long)]
    pub label: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct BcbArgs {
    /// BCB series JSON (list of {"data", "valor"})
    #[arg(long = "in")]
    pub input: PathBuf,

    /// Output CSV path (date,index)
    #[arg(long)]
    pub out: PathBuf,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ValidateCommand {
    /// Check VD4020 approximately equals the sum of component columns
    #[command(name = "vd4020-components")]
    Components(ComponentsArgs),

    /// Check VD4020 >= principal job income, and equality without secondary income
    #[command(name = "vd4020-vs-principal")]
    VsPrincipal(VsPrincipalArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ComponentsArgs {
    /// Input CSV (e.g. base_labeled.csv)
    #[arg(long = "in")]
    pub input: PathBuf,

    /// Target column (e.g. VD4020__rendim_efetivo_qq_trabalho)
    #[arg(long)]
    pub target: String,

    /// Comma-separated component columns to sum
    #[arg(long)]
    pub components: String,

    /// Absolute tolerance for equality (BRL)
    #[arg(long, default_value = "1.0")]
    pub tol: f64,

    /// Optional row limit for speed (0 = no limit)
    #[arg(long, default_value = "0")]
    pub limit: usize,
}

#[derive(Args, Debug, Clone)]
pub struct VsPrincipalArgs {
    #[arg(long = "in")]
    pub input: PathBuf,

    #[arg(long)]
    pub target: String,

    /// Principal job effective income column (e.g. VD4017__...)
    #[arg(long)]
    pub principal: String,

    /// Secondary job effective money column (e.g. V405912__...)
    #[arg(long)]
    pub secondary_money: Option<String>,

    /// Absolute tolerance (BRL)
    #[arg(long, default_value = "1.0")]
    pub tol: f64,

    #[arg(long, default_value = "0")]
    pub limit: usize,
}

// ── LastUsedParams ─────────────────────────────────────────────────────────────

/// Persisted last-used parameters saved to `~/.pnad-income/last_used.json`.
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct LastUsedParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipca_csv: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub salario_minimo_csv: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ranges: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uf_order: Option<String>,
}

impl LastUsedParams {
    /// Return the default path to the persisted config file.
    /// Uses `~/.pnad-income/last_used.json`.
    pub fn config_path() -> PathBuf {
        Self::config_path_in(&dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
    }

    /// Return the config path rooted at `base_dir` (used for testing).
    pub fn config_path_in(base_dir: &Path) -> PathBuf {
        base_dir.join(".pnad-income").join("last_used.json")
    }

    /// Load persisted params from an explicit path.
    /// Returns `Default` when the file is absent or cannot be parsed.
    pub fn load_from(path: &Path) -> Self {
        let Ok(content) = std::fs::read_to_string(path) else {
            return Self::default();
        };
        serde_json::from_str(&content).unwrap_or_default()
    }

    /// Atomically write params to an explicit path, creating parent
    /// directories if needed.
    pub fn save_to(&self, path: &Path) -> Result<(), std::io::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, path)?;

        Ok(())
    }

    /// Delete the config file at an explicit path if it exists.
    pub fn clear_at(path: &Path) -> Result<(), std::io::Error> {
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    /// Fill fields of `source` that were not given explicitly.
    fn apply_to(&self, source: &mut SourceArgs, matches: &clap::ArgMatches) {
        if !is_arg_explicitly_set(matches, "ipca_csv") {
            if let Some(v) = &self.ipca_csv {
                source.ipca_csv = v.clone();
            }
        }
        if !is_arg_explicitly_set(matches, "salario_minimo_csv") {
            if let Some(v) = &self.salario_minimo_csv {
                source.salario_minimo_csv = v.clone();
            }
        }
        if !is_arg_explicitly_set(matches, "ranges") {
            if let Some(v) = &self.ranges {
                source.ranges = v.clone();
            }
        }
        if !is_arg_explicitly_set(matches, "uf_order") {
            if let Some(v) = &self.uf_order {
                source.uf_order = v.clone();
            }
        }
    }
}

impl From<&SourceArgs> for LastUsedParams {
    fn from(s: &SourceArgs) -> Self {
        LastUsedParams {
            ipca_csv: Some(s.ipca_csv.clone()),
            salario_minimo_csv: Some(s.salario_minimo_csv.clone()),
            ranges: Some(s.ranges.clone()),
            uf_order: Some(s.uf_order.clone()),
        }
    }
}

// ── Settings impl ──────────────────────────────────────────────────────────────

impl Settings {
    /// Parse CLI arguments, merge with last-used params where no explicit
    /// value was provided, and persist the result.
    pub fn load_with_last_used() -> Self {
        Self::load_with_last_used_impl(std::env::args_os().collect(), &LastUsedParams::config_path())
    }

    /// Full implementation – accepts args and an explicit config path so that
    /// tests can redirect to a temporary directory.
    pub fn load_with_last_used_impl(args: Vec<std::ffi::OsString>, config_path: &Path) -> Self {
        let matches = Settings::command().get_matches_from(args);
        let mut settings = Settings::from_arg_matches(&matches).unwrap_or_else(|e| e.exit());

        if settings.debug {
            settings.log_level = "DEBUG".to_string();
        }

        if settings.clear {
            let _ = LastUsedParams::clear_at(config_path);
            return settings;
        }

        let Some((_, sub_matches)) = matches.subcommand() else {
            return settings;
        };
        let source = match &mut settings.command {
            Command::Dashboard(args) => &mut args.source,
            Command::BandReport(args) => &mut args.source,
            _ => return settings,
        };

        LastUsedParams::load_from(config_path).apply_to(source, sub_matches);

        let _ = LastUsedParams::from(&*source).save_to(config_path);

        settings
    }

    /// Shared source options of the aggregation commands, if any.
    pub fn source(&self) -> Option<&SourceArgs> {
        match &self.command {
            Command::Dashboard(args) => Some(&args.source),
            Command::BandReport(args) => Some(&args.source),
            _ => None,
        }
    }
}

// ── Helper: check if an arg was explicitly set ────────────────────────────────

/// Returns `true` when `name` was supplied on the command line or through its
/// environment variable (not a default value).
fn is_arg_explicitly_set(matches: &clap::ArgMatches, name: &str) -> bool {
    matches!(
        matches.value_source(name),
        Some(clap::parser::ValueSource::CommandLine) | Some(clap::parser::ValueSource::EnvVariable)
    )
}

// ── Tests ──────────────────────────────────────────────────────────────────────
