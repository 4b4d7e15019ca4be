//! CLI estimate harness for exercising the transaction engine offline
//!
//! This tool allows testing:
//! - Transferable balance of a record snapshot
//! - Fee estimates, consolidation included
//! - Consolidation plans and sweeps

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use serde_json::json;
use tracing::{info, warn};
use veil_core::logging::set_reveal_sensitive;
use veil_core::{
    records_from_json, AccountSnapshotProvider, Amount, CachingFeeOracle, FeeLevel, FeeOracle,
    FeeStrategy, KnownTxOut, SharedAccount, StaticFeeOracle, TokenId, TransactionEstimator,
    TxOutSelector,
};
use veil_params::EngineConfig;

#[derive(Parser)]
#[command(name = "estimate-harness")]
#[command(about = "Veil transaction estimate harness", long_about = None)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct CommonArgs {
    /// Engine configuration (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Spendable record snapshot (JSON array)
    #[arg(short, long, global = true, default_value = "records.json")]
    records: PathBuf,

    /// Token to estimate for
    #[arg(short, long, global = true, default_value = "0")]
    token: u64,

    /// Fee level: minimum, standard or priority
    #[arg(short, long, global = true, default_value = "minimum")]
    level: FeeLevel,

    /// Print amounts in logs instead of redacting them
    #[arg(long, global = true)]
    reveal_amounts: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Largest amount a single recipient could receive
    Transferable,

    /// Fee estimate for sending an amount
    Fee {
        /// Amount in the token's smallest unit
        amount: u64,
    },

    /// Consolidation transactions needed before sending an amount
    Defrag {
        /// Amount in the token's smallest unit
        amount: u64,
    },

    /// Records and fee for sending the whole balance
    Sweep,
}

struct Harness {
    account: SharedAccount,
    oracle: Arc<CachingFeeOracle<StaticFeeOracle>>,
    estimator: TransactionEstimator<SharedAccount, CachingFeeOracle<StaticFeeOracle>>,
}

impl Harness {
    fn load(common: &CommonArgs) -> anyhow::Result<Self> {
        let config = match &common.config {
            Some(path) => EngineConfig::from_file(path)?,
            None => EngineConfig::default(),
        };
        let params = config.protocol_params();
        let records = load_records(&common.records)?;
        info!("Loaded {} records on {}", records.len(), params.network.name);

        let account = SharedAccount::from_records(records);
        let oracle = Arc::new(CachingFeeOracle::from_config(
            StaticFeeOracle::from_config(&config),
            &config,
        ));
        let estimator = TransactionEstimator::from_shared(
            Arc::new(account.clone()),
            Arc::clone(&oracle),
            TxOutSelector::from_params(&params),
        );
        Ok(Self {
            account,
            oracle,
            estimator,
        })
    }

    fn snapshot(&self, token_id: TokenId) -> Vec<KnownTxOut> {
        self.account.spendable_records(token_id)
    }

    async fn fee_strategy(
        &self,
        level: FeeLevel,
        token_id: TokenId,
    ) -> anyhow::Result<Arc<dyn FeeStrategy>> {
        Ok(self.oracle.fee_strategy(level, token_id).await?)
    }
}

fn load_records(path: &Path) -> anyhow::Result<Vec<KnownTxOut>> {
    let json = std::fs::read_to_string(path)?;
    Ok(records_from_json(&json)?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    set_reveal_sensitive(cli.common.reveal_amounts);

    let harness = Harness::load(&cli.common)?;
    let token_id = TokenId::new(cli.common.token);
    let level = cli.common.level;

    match cli.command {
        Commands::Transferable => run_transferable(&harness, token_id, level).await?,
        Commands::Fee { amount } => {
            run_fee(&harness, Amount::new(amount, token_id), level).await?;
        }
        Commands::Defrag { amount } => {
            run_defrag(&harness, Amount::new(amount, token_id), level).await?;
        }
        Commands::Sweep => run_sweep(&harness, token_id, level).await?,
    }

    Ok(())
}

async fn run_transferable(
    harness: &Harness,
    token_id: TokenId,
    level: FeeLevel,
) -> anyhow::Result<()> {
    let amount = harness.estimator.amount_transferable(token_id, level).await?;
    println!("{}", json!({ "token_id": token_id.value(), "amount_transferable": amount }));
    Ok(())
}

async fn run_fee(harness: &Harness, amount: Amount, level: FeeLevel) -> anyhow::Result<()> {
    let estimate = harness.estimator.estimate(amount, level).await?;
    if estimate.requires_defrag {
        warn!(
            "Send needs {} consolidation transactions first",
            estimate.defrag_transactions
        );
    }
    println!("{}", serde_json::to_string_pretty(&estimate)?);
    Ok(())
}

async fn run_defrag(harness: &Harness, amount: Amount, level: FeeLevel) -> anyhow::Result<()> {
    let records = harness.snapshot(amount.token_id);
    let strategy = harness.fee_strategy(level, amount.token_id).await?;
    let steps = harness
        .estimator
        .selector()
        .select_inputs_for_defragmentation(amount, strategy.as_ref(), &records)?;

    if steps.is_empty() {
        info!("No consolidation needed");
    }
    let plan: Vec<_> = steps
        .iter()
        .map(|step| {
            json!({
                "inputs": step.inputs.iter().map(|r| r.global_index).collect::<Vec<_>>(),
                "fee": step.fee,
                "output_value": step.output_value,
            })
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}

async fn run_sweep(harness: &Harness, token_id: TokenId, level: FeeLevel) -> anyhow::Result<()> {
    let records = harness.snapshot(token_id);
    let strategy = harness.fee_strategy(level, token_id).await?;
    let sweep = harness
        .estimator
        .selector()
        .select_inputs_for_sweep(token_id, strategy.as_ref(), &records)?;

    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "inputs": sweep.inputs.iter().map(|r| r.global_index).collect::<Vec<_>>(),
            "fee": sweep.fee,
            "amount": sweep.amount,
        }))?
    );
    Ok(())
}
