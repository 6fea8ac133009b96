use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use order_lifecycle::{
    AppConfig, AppState, LifecycleOperations, LifecycleResult, OrderId, OrderSnapshot, OrderStatus, OrderType,
    OtpStage, PaymentMethod,
};

/// Rider-side order lifecycle tracker.
///
/// Reads backend settings from LIFECYCLE_* environment variables.
#[derive(Parser, Debug)]
#[command(name = "order-tracker", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone)]
struct OrderArgs {
    /// Backend order or ride id
    #[arg(long)]
    order_id: String,
    /// taxi, porter, food, grocery or ecommerce
    #[arg(long)]
    order_type: OrderType,
    /// cash, cod, card, upi or wallet
    #[arg(long, default_value = "cash")]
    payment: PaymentMethod,
    /// Last status known to the caller; refreshed from the backend before acting
    #[arg(long, default_value = "pending")]
    status: OrderStatus,
    /// Amount to collect for COD orders
    #[arg(long)]
    cod_amount: Option<f64>,
}

impl OrderArgs {
    fn snapshot(&self) -> OrderSnapshot {
        let mut snapshot = OrderSnapshot::new(self.order_id.as_str(), self.order_type, self.payment)
            .with_status(self.status);
        snapshot.cod_amount = self.cod_amount;
        snapshot
    }
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum StageArg {
    Pickup,
    Delivery,
}

impl From<StageArg> for OtpStage {
    fn from(stage: StageArg) -> Self {
        match stage {
            StageArg::Pickup => OtpStage::Pickup,
            StageArg::Delivery => OtpStage::Delivery,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Poll an order until it reaches a terminal status
    Track(OrderArgs),
    /// Accept a pending order
    Accept(OrderArgs),
    /// Verify a pickup or delivery OTP
    VerifyOtp {
        #[command(flatten)]
        order: OrderArgs,
        #[arg(long, value_enum)]
        stage: StageArg,
        #[arg(long)]
        otp: String,
    },
    /// Mark an accepted order as picked up
    Pickup {
        #[command(flatten)]
        order: OrderArgs,
        #[arg(long)]
        otp: Option<String>,
    },
    /// Record cash collected for a COD order
    CollectCod {
        #[command(flatten)]
        order: OrderArgs,
        #[arg(long)]
        otp: Option<String>,
    },
    /// Mark an order as delivered
    Deliver {
        #[command(flatten)]
        order: OrderArgs,
        #[arg(long)]
        otp: Option<String>,
    },
    /// Cancel an order
    Cancel {
        #[command(flatten)]
        order: OrderArgs,
        #[arg(long)]
        reason: String,
    },
}

impl Commands {
    fn order(&self) -> &OrderArgs {
        match self {
            Commands::Track(order) | Commands::Accept(order) => order,
            Commands::VerifyOtp { order, .. }
            | Commands::Pickup { order, .. }
            | Commands::CollectCod { order, .. }
            | Commands::Deliver { order, .. }
            | Commands::Cancel { order, .. } => order,
        }
    }
}

#[tokio::main]
async fn main() -> LifecycleResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_env()?;
    tracing::debug!("Loaded configuration: {:?}", config);

    let state = AppState::new(config).await?;
    let result = run(&state, cli.command).await;
    state.shutdown().await?;
    result
}

async fn run(state: &AppState, command: Commands) -> LifecycleResult<()> {
    let service = state.lifecycle_service.clone();
    let order_id = OrderId::new(command.order().order_id.as_str());

    if !matches!(command, Commands::Track(_)) {
        let snapshot = command.order().snapshot();
        snapshot.validate()?;
        state.cache.insert_if_absent(snapshot).await;
        if let Err(err) = service.refresh(&order_id).await {
            tracing::warn!("Could not refresh order {} before acting: {}", order_id, err);
        }
    }

    let snapshot = match command {
        Commands::Track(order) => {
            service.track(order.snapshot()).await?;
            wait_until_untracked(state, &order_id).await;
            service.snapshot(&order_id).await?
        }
        Commands::Accept(_) => service.accept(&order_id).await?,
        Commands::VerifyOtp { stage, otp, .. } => service.verify_otp(&order_id, stage.into(), &otp).await?,
        Commands::Pickup { otp, .. } => service.mark_picked_up(&order_id, otp.as_deref()).await?,
        Commands::CollectCod { otp, .. } => service.collect_cod(&order_id, otp.as_deref()).await?,
        Commands::Deliver { otp, .. } => service.mark_delivered(&order_id, otp.as_deref()).await?,
        Commands::Cancel { reason, .. } => service.cancel(&order_id, &reason).await?,
    };

    print_snapshot(&snapshot)
}

async fn wait_until_untracked(state: &AppState, order_id: &OrderId) {
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, stopping tracker");
                state.poller.untrack(order_id).await;
                break;
            }
            _ = tokio::time::sleep(state.config.poll_interval) => {
                if !state.poller.is_tracking(order_id).await {
                    break;
                }
            }
        }
    }
}

fn print_snapshot(snapshot: &OrderSnapshot) -> LifecycleResult<()> {
    println!("{}", serde_json::to_string_pretty(snapshot)?);
    Ok(())
}
